//! Domain types for Earbot
//!
//! - ReviewerRecord / LedgerEntry: roster rows and completed-review history
//! - RequestSnapshot: what the host reports about a request
//! - RequestState: the engine's own durable view of a request
//! - Event: the external triggers the workflow reacts to

pub mod event;
pub mod request;
pub mod reviewer;
pub mod state;

pub use event::{Event, OpenAction};
pub use request::{ChangedFile, Comment, FileStatus, RequestSnapshot, RequestStatus, Review};
pub use reviewer::{LastReview, LedgerEntry, ReviewerRecord};
pub use state::{ErrorInfo, ErrorKind, Invitation, InvitationResponse, Phase, RequestState};
