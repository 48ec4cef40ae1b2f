//! Submission workflow: one dispatch function per event, one engine to commit it.
//!
//! `transition` is pure. It takes the persisted request state, a host
//! snapshot and the roster, and returns the next state together with roster
//! changes, an optional ledger entry and a list of effects. `Engine` loads the
//! inputs, commits the outcome and only then runs the effects.

pub mod effect;
pub mod engine;
pub mod messages;
pub mod transition;

use chrono::Duration;

use crate::roster::ScoreBounds;

pub use effect::Effect;
pub use engine::{Engine, SweepReport};
pub use transition::{Context, Outcome, has_word, transition};

/// Labels, projects and bookkeeping amounts the workflow applies
#[derive(Debug, Clone)]
pub struct WorkflowRules {
    pub valid_projects: Vec<String>,
    /// Extension of the submission artifact, e.g. `.pdf`
    pub artifact_extension: String,
    pub error_label: String,
    pub update_label: String,
    /// Score taken from the reviewer when the review is merged
    pub review_decrement: i64,
    /// Score added to invitees who let their invitation time out
    pub timeout_penalty: i64,
    /// Score added to members of the requester's institution
    pub institution_increment: i64,
    pub bounds: ScoreBounds,
    /// Idle time after which the responsible actor is pinged
    pub stale_after: Duration,
}

impl Default for WorkflowRules {
    fn default() -> Self {
        Self {
            valid_projects: vec![
                "ERGA-BGE".to_string(),
                "ERGA-Pilot".to_string(),
                "ERGA-Community".to_string(),
            ],
            artifact_extension: ".pdf".to_string(),
            error_label: "Error!".to_string(),
            update_label: "Update".to_string(),
            review_decrement: 1,
            timeout_penalty: 1,
            institution_increment: 1,
            bounds: ScoreBounds::default(),
            stale_after: Duration::hours(168),
        }
    }
}

impl WorkflowRules {
    /// Canonical spelling of a declared project, if it is a valid one
    pub fn project(&self, declared: &str) -> Option<&str> {
        self.valid_projects
            .iter()
            .find(|p| p.eq_ignore_ascii_case(declared.trim()))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_lookup_is_case_insensitive() {
        let rules = WorkflowRules::default();
        assert_eq!(rules.project("erga-bge"), Some("ERGA-BGE"));
        assert_eq!(rules.project(" ERGA-Pilot "), Some("ERGA-Pilot"));
        assert_eq!(rules.project("DToL"), None);
    }
}
