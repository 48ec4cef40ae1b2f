//! Earbot - reviewer assignment for assembly report submissions
//!
//! Earbot walks each submitted request through validation, supervisor
//! confirmation, fair reviewer selection with reply-by deadlines, and the
//! bookkeeping that follows a merged review.

pub mod deadline;
pub mod domain;
pub mod error;
pub mod host;
pub mod notify;
pub mod report;
pub mod roster;
pub mod selection;
pub mod storage;
pub mod summary;
pub mod workflow;

pub use error::{EarbotError, Result};
