//! Adjusted-score calculation for reviewer selection.
//!
//! Candidates are ranked by adjusted score (higher = owed a call sooner):
//! - Calling score from the roster
//! - New-reviewer bonus (+50 if never reviewed)
//! - Priority bonus (+50 if the project is a priority track and the
//!   candidate's institution is in the bonus set)
//! - Supervisor penalty (-5, supervisors are soft-deprioritized as reviewers)

use super::institution::InstitutionTable;
use crate::domain::ReviewerRecord;

/// Bonus for people who have never reviewed.
pub const NEW_REVIEWER_BONUS: i64 = 50;
/// Bonus for priority-track institutions.
pub const PRIORITY_BONUS: i64 = 50;
/// Penalty for supervisors.
pub const SUPERVISOR_PENALTY: i64 = 5;

/// Scoring configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringPolicy {
    pub new_reviewer_bonus: i64,
    pub priority_bonus: i64,
    pub supervisor_penalty: i64,
    /// Project tags that activate the priority bonus
    pub priority_tags: Vec<String>,
    /// Institutions (any spelling) that receive the priority bonus
    pub priority_institutions: Vec<String>,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            new_reviewer_bonus: NEW_REVIEWER_BONUS,
            priority_bonus: PRIORITY_BONUS,
            supervisor_penalty: SUPERVISOR_PENALTY,
            priority_tags: vec!["ERGA-BGE".to_string()],
            priority_institutions: vec![],
        }
    }
}

impl ScoringPolicy {
    /// True if the project tag switches on the priority bonus
    pub fn is_priority_project(&self, project: Option<&str>) -> bool {
        project.is_some_and(|p| self.priority_tags.iter().any(|t| t.eq_ignore_ascii_case(p.trim())))
    }

    fn in_bonus_set(&self, institution: &str, institutions: &InstitutionTable) -> bool {
        let canonical = institutions.canonicalize(institution);
        self.priority_institutions
            .iter()
            .any(|i| institutions.canonicalize(i) == canonical)
    }

    /// Adjusted score of a record for a request on `project`
    pub fn adjusted_score(&self, record: &ReviewerRecord, project: Option<&str>, institutions: &InstitutionTable) -> i64 {
        let mut score = record.calling_score;

        if record.last_review.is_never() {
            score += self.new_reviewer_bonus;
        }

        if self.is_priority_project(project) && self.in_bonus_set(&record.institution, institutions) {
            score += self.priority_bonus;
        }

        if record.is_supervisor {
            score -= self.supervisor_penalty;
        }

        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LastReview;
    use chrono::NaiveDate;

    fn reviewed(id: &str, score: i64) -> ReviewerRecord {
        let mut r = ReviewerRecord::new(id, id, "Uni X");
        r.calling_score = score;
        r.last_review = LastReview::On(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        r
    }

    #[test]
    fn test_plain_score() {
        let policy = ScoringPolicy::default();
        let t = InstitutionTable::default();
        assert_eq!(policy.adjusted_score(&reviewed("a", 90), None, &t), 90);
    }

    #[test]
    fn test_new_reviewer_bonus() {
        let policy = ScoringPolicy::default();
        let t = InstitutionTable::default();
        let mut r = reviewed("a", 100);
        r.last_review = LastReview::Never;
        assert_eq!(policy.adjusted_score(&r, None, &t), 150);
    }

    #[test]
    fn test_supervisor_penalty() {
        let policy = ScoringPolicy::default();
        let t = InstitutionTable::default();
        let mut r = reviewed("a", 100);
        r.is_supervisor = true;
        assert_eq!(policy.adjusted_score(&r, None, &t), 95);
    }

    #[test]
    fn test_priority_bonus_needs_tag_and_institution() {
        let policy = ScoringPolicy {
            priority_institutions: vec!["uni x".to_string()],
            ..ScoringPolicy::default()
        };
        let t = InstitutionTable::default();
        let r = reviewed("a", 10);

        assert_eq!(policy.adjusted_score(&r, Some("ERGA-BGE"), &t), 60);
        assert_eq!(policy.adjusted_score(&r, Some("erga-bge"), &t), 60);
        assert_eq!(policy.adjusted_score(&r, Some("ERGA-Pilot"), &t), 10);
        assert_eq!(policy.adjusted_score(&r, None, &t), 10);

        let mut other = r.clone();
        other.institution = "Uni Y".to_string();
        assert_eq!(policy.adjusted_score(&other, Some("ERGA-BGE"), &t), 10);
    }

    #[test]
    fn test_all_adjustments_combine() {
        let policy = ScoringPolicy {
            priority_institutions: vec!["Uni X".to_string()],
            ..ScoringPolicy::default()
        };
        let t = InstitutionTable::default();
        let mut r = reviewed("a", 0);
        r.last_review = LastReview::Never;
        r.is_supervisor = true;
        assert_eq!(policy.adjusted_score(&r, Some("ERGA-BGE"), &t), 95);
    }
}
