//! Storage layer for per-request workflow state.
//!
//! Request state is kept in append-only JSONL collections so that concurrent
//! invocations working on different requests never overwrite each other.

mod jsonl;
mod requests;
mod traits;

pub use jsonl::JsonlStorage;
pub use requests::{REQUESTS_COLLECTION, RequestStore};
pub use traits::{Filter, HasId, Storage};
