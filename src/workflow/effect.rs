//! Effects (side effects as data).
//!
//! Transitions return effects instead of calling the host. The engine runs
//! them only after the roster, ledger and request state are committed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Comment { body: String },
    AddLabel { label: String },
    RemoveLabel { label: String },
    /// Make the supervisor the request's assignee
    SetAssignee { login: String },
    /// Formally request a review from the confirmed reviewer
    RequestReviewer { login: String },
    /// Re-extract and re-render the report from the final source document
    RegenerateReport { artifact: String },
    /// Post to the external channel; failures are logged only
    Notify { text: String },
}

impl Effect {
    pub fn comment(body: impl Into<String>) -> Self {
        Effect::Comment { body: body.into() }
    }

    pub fn add_label(label: impl Into<String>) -> Self {
        Effect::AddLabel { label: label.into() }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Effect::Comment { .. } => "comment",
            Effect::AddLabel { .. } => "add_label",
            Effect::RemoveLabel { .. } => "remove_label",
            Effect::SetAssignee { .. } => "set_assignee",
            Effect::RequestReviewer { .. } => "request_reviewer",
            Effect::RegenerateReport { .. } => "regenerate_report",
            Effect::Notify { .. } => "notify",
        }
    }
}
