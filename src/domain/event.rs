//! Events that drive a request through the workflow.

use serde::{Deserialize, Serialize};

/// What the host action reported for a request update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAction {
    Opened,
    Reopened,
    Edited,
    Synchronize,
}

impl OpenAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "opened" => Some(OpenAction::Opened),
            "reopened" => Some(OpenAction::Reopened),
            "edited" => Some(OpenAction::Edited),
            "synchronize" | "synchronized" => Some(OpenAction::Synchronize),
            _ => None,
        }
    }
}

/// One external trigger, consumed by a single dispatch function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Request opened, or body/artifacts changed
    Opened { action: OpenAction },
    /// Someone commented on the request
    Commented { author: String, text: String },
    /// A review was submitted
    ReviewSubmitted { reviewer: String },
    /// Request closed, possibly merged
    Closed { merged: bool },
    /// Periodic escalation check
    Sweep,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Opened { .. } => "open",
            Event::Commented { .. } => "comment",
            Event::ReviewSubmitted { .. } => "review",
            Event::Closed { .. } => "close",
            Event::Sweep => "sweep",
        }
    }
}
