//! Scoring and selection of reviewers and supervisors.
//!
//! - `institution`: canonical institution tags for eligibility checks
//! - `score`: adjusted-score formula
//! - `select`: eligibility, ranking and the tie-break cascade

pub mod institution;
pub mod score;
pub mod select;

pub use institution::InstitutionTable;
pub use score::ScoringPolicy;
pub use select::{Candidate, Selection, SelectionRequest, Selector, TieBreak};
