//! Persisted per-request workflow state
//!
//! Who was invited, when, and how they answered lives here instead of being
//! re-derived from comment text. Comments are notifications only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::HasId;

/// Lifecycle phase of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not yet validated
    New,
    /// Supervisor prompted, waiting for an OK
    AwaitingSupervisorAck,
    /// A reviewer candidate was invited, waiting for yes/no
    AwaitingReviewerOffer,
    /// Reviewer confirmed, review not yet submitted
    ReviewerAssigned,
    /// Review submitted, waiting for merge
    UnderReview,
    Closed { merged: bool },
    /// Automatic progress halted
    Error,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Closed { .. })
    }

    /// Phases in which a reviewer has already been confirmed
    pub fn has_reviewer(&self) -> bool {
        matches!(self, Phase::ReviewerAssigned | Phase::UnderReview)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::New => "new",
            Phase::AwaitingSupervisorAck => "awaiting_supervisor_ack",
            Phase::AwaitingReviewerOffer => "awaiting_reviewer_offer",
            Phase::ReviewerAssigned => "reviewer_assigned",
            Phase::UnderReview => "under_review",
            Phase::Closed { merged: true } => "closed_merged",
            Phase::Closed { merged: false } => "closed_unmerged",
            Phase::Error => "error",
        }
    }
}

/// How an invited reviewer answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationResponse {
    Accepted,
    Declined,
    /// Reply-by passed without an answer
    TimedOut,
}

/// One reviewer invitation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub invitee: String,
    pub invited_at: DateTime<Utc>,
    pub reply_by: DateTime<Utc>,
    pub response: Option<InvitationResponse>,
}

impl Invitation {
    pub fn is_pending(&self) -> bool {
        self.response.is_none()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && now > self.reply_by
    }
}

/// Why a request stopped progressing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Researcher must fix the request body or files
    Validation,
    /// Supervisor must intervene
    Halted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    /// Phase the request was in when it failed
    #[serde(default)]
    pub from: Option<Phase>,
}

/// Durable workflow state of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestState {
    /// Request number on the host, as a string key
    pub id: String,
    pub phase: Phase,
    pub researcher: String,
    pub project: Option<String>,
    pub affiliation: Option<String>,
    pub subject: Option<String>,
    /// Supervisor who was prompted but has not acknowledged yet
    pub supervisor_candidate: Option<String>,
    pub supervisor: Option<String>,
    pub invitations: Vec<Invitation>,
    pub reviewer: Option<String>,
    pub acknowledged: bool,
    pub last_ping_at: Option<DateTime<Utc>>,
    pub error: Option<ErrorInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HasId for RequestState {
    fn id(&self) -> &str {
        &self.id
    }
}

impl RequestState {
    pub fn new(number: u64, researcher: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: number.to_string(),
            phase: Phase::New,
            researcher: researcher.to_string(),
            project: None,
            affiliation: None,
            subject: None,
            supervisor_candidate: None,
            supervisor: None,
            invitations: vec![],
            reviewer: None,
            acknowledged: false,
            last_ping_at: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn pending_invitation(&self) -> Option<&Invitation> {
        self.invitations.iter().rev().find(|i| i.is_pending())
    }

    pub fn pending_invitation_mut(&mut self) -> Option<&mut Invitation> {
        self.invitations.iter_mut().rev().find(|i| i.is_pending())
    }

    /// Everyone invited so far on this request
    pub fn invitees(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for invitation in &self.invitations {
            if !seen.iter().any(|s| s.eq_ignore_ascii_case(&invitation.invitee)) {
                seen.push(invitation.invitee.clone());
            }
        }
        seen
    }

    /// Invitees whose reply-by lapsed
    pub fn timed_out_invitees(&self) -> Vec<String> {
        self.invitations
            .iter()
            .filter(|i| i.response == Some(InvitationResponse::TimedOut))
            .map(|i| i.invitee.clone())
            .collect()
    }

    /// Invitees other than the confirmed reviewer
    pub fn other_invitees(&self) -> Vec<String> {
        self.invitees()
            .into_iter()
            .filter(|i| {
                self.reviewer
                    .as_deref()
                    .is_none_or(|r| !r.eq_ignore_ascii_case(i))
            })
            .collect()
    }

    /// Who should hear about the request next
    pub fn responsible_actor(&self) -> Option<&str> {
        match self.phase {
            Phase::AwaitingSupervisorAck => self.supervisor_candidate.as_deref(),
            Phase::AwaitingReviewerOffer => self.pending_invitation().map(|i| i.invitee.as_str()),
            Phase::ReviewerAssigned => self.reviewer.as_deref(),
            Phase::UnderReview | Phase::Error => self.supervisor.as_deref(),
            Phase::New | Phase::Closed { .. } => None,
        }
    }

    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        let from = match self.phase {
            Phase::Error => self.error.as_ref().and_then(|e| e.from),
            phase => Some(phase),
        };
        self.phase = Phase::Error;
        self.error = Some(ErrorInfo {
            kind,
            message: message.into(),
            from,
        });
    }

    /// Review phase to return to once a validation error raised during review is fixed
    pub fn review_to_resume(&self) -> Option<Phase> {
        if !self.is_validation_error() {
            return None;
        }
        self.error.as_ref().and_then(|e| e.from).filter(|p| p.has_reviewer())
    }

    pub fn is_halted(&self) -> bool {
        self.phase == Phase::Error && self.error.as_ref().is_some_and(|e| e.kind == ErrorKind::Halted)
    }

    pub fn is_validation_error(&self) -> bool {
        self.phase == Phase::Error
            && self
                .error
                .as_ref()
                .is_some_and(|e| e.kind == ErrorKind::Validation)
    }
}
