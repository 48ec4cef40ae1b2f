//! Request-state storage helpers.

use super::traits::{Filter, Storage};
use crate::domain::{Phase, RequestState};
use crate::error::Result;

/// Collection name for request state.
pub const REQUESTS_COLLECTION: &str = "requests";

/// Helper for request-state queries.
pub struct RequestStore<'a, S: Storage> {
    storage: &'a S,
}

impl<'a, S: Storage> RequestStore<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    /// State of request `number`, if the engine has seen it before.
    pub fn get(&self, number: u64) -> Result<Option<RequestState>> {
        self.storage.get(REQUESTS_COLLECTION, &number.to_string())
    }

    /// Persist a new version of a request's state.
    pub fn save(&self, state: &RequestState) -> Result<()> {
        self.storage.put(REQUESTS_COLLECTION, state)
    }

    pub fn find_by_phase(&self, phase: Phase) -> Result<Vec<RequestState>> {
        let phase = serde_json::to_value(phase)?;
        self.storage.query(REQUESTS_COLLECTION, &[Filter::eq("phase", phase)])
    }

    /// Requests whose automatic progress is halted.
    pub fn find_halted(&self) -> Result<Vec<RequestState>> {
        self.find_by_phase(Phase::Error)
    }

    pub fn list_all(&self) -> Result<Vec<RequestState>> {
        self.storage.list(REQUESTS_COLLECTION)
    }

    /// Drop superseded versions from the backing file.
    pub fn compact(&self) -> Result<usize> {
        self.storage.compact(REQUESTS_COLLECTION)
    }
}
