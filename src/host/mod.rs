//! Code-review host abstraction.
//!
//! The engine never talks to the host directly; it reads a `RequestSnapshot`
//! and applies effects through this trait. `GithubHost` speaks the GitHub REST
//! API, `MemoryHost` keeps everything in memory for tests and dry runs.

pub mod github;
pub mod memory;

use async_trait::async_trait;

use crate::domain::RequestSnapshot;
use crate::error::Result;

pub use github::{GithubConfig, GithubHost};
pub use memory::{HostAction, MemoryHost};

/// Read and mutate review requests on the hosting service
#[async_trait]
pub trait RequestHost: Send + Sync {
    /// Current view of a request: body, labels, comments, reviews, files
    async fn snapshot(&self, number: u64) -> Result<RequestSnapshot>;

    /// Numbers of all open requests
    async fn list_open(&self) -> Result<Vec<u64>>;

    async fn post_comment(&self, number: u64, body: &str) -> Result<()>;

    async fn add_label(&self, number: u64, label: &str) -> Result<()>;

    async fn remove_label(&self, number: u64, label: &str) -> Result<()>;

    /// Make `login` the request's assignee (the supervisor)
    async fn set_assignee(&self, number: u64, login: &str) -> Result<()>;

    /// Ask `login` for a formal review
    async fn request_reviewer(&self, number: u64, login: &str) -> Result<()>;
}
