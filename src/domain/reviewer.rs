//! Reviewer roster records and ledger entries

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Date of a reviewer's most recent completed review.
///
/// `Never` orders after every concrete date, so an ascending sort puts the
/// oldest reviews first and people who never reviewed last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LastReview {
    On(NaiveDate),
    Never,
}

impl LastReview {
    /// Sentinel used in the roster table
    pub const UNSET: &'static str = "NA";

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case(Self::UNSET) || raw.is_empty() {
            return Some(LastReview::Never);
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().map(LastReview::On)
    }

    pub fn render(&self) -> String {
        match self {
            LastReview::On(date) => date.format("%Y-%m-%d").to_string(),
            LastReview::Never => Self::UNSET.to_string(),
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, LastReview::Never)
    }
}

/// One person able to review or supervise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerRecord {
    /// Code-host handle, compared case-insensitively
    pub id: String,
    pub full_name: String,
    /// Institution as written in the roster (canonicalized at selection time)
    pub institution: String,
    pub total_reviews: u32,
    pub last_review: LastReview,
    /// Eligible at all
    pub active: bool,
    /// Holding an open assignment
    pub busy: bool,
    /// Fairness counter; higher means the person is owed a call sooner
    pub calling_score: i64,
    pub is_supervisor: bool,
}

impl ReviewerRecord {
    pub fn new(id: &str, full_name: &str, institution: &str) -> Self {
        Self {
            id: id.to_string(),
            full_name: full_name.to_string(),
            institution: institution.to_string(),
            total_reviews: 0,
            last_review: LastReview::Never,
            active: true,
            busy: false,
            calling_score: 0,
            is_supervisor: false,
        }
    }

    /// Case-insensitive identity check against a handle
    pub fn is(&self, handle: &str) -> bool {
        self.id.eq_ignore_ascii_case(handle.trim_start_matches('@'))
    }

    pub fn key(&self) -> String {
        self.id.to_lowercase()
    }
}

/// Append-only record of a completed, merged review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub reviewer_name: String,
    pub institution: String,
    pub subject: String,
    pub link: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_review_parse() {
        assert_eq!(LastReview::parse("NA"), Some(LastReview::Never));
        assert_eq!(LastReview::parse(""), Some(LastReview::Never));
        assert_eq!(
            LastReview::parse("2024-03-01"),
            Some(LastReview::On(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()))
        );
        assert_eq!(LastReview::parse("yesterday"), None);
    }

    #[test]
    fn test_last_review_never_sorts_after_dates() {
        let old = LastReview::On(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let recent = LastReview::On(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());
        let mut values = vec![LastReview::Never, recent, old];
        values.sort();
        assert_eq!(values, vec![old, recent, LastReview::Never]);
    }

    #[test]
    fn test_last_review_render() {
        assert_eq!(LastReview::Never.render(), "NA");
        let date = LastReview::On(NaiveDate::from_ymd_opt(2023, 11, 5).unwrap());
        assert_eq!(date.render(), "2023-11-05");
    }

    #[test]
    fn test_record_identity_is_case_insensitive() {
        let record = ReviewerRecord::new("DiegoDP", "Diego De Panis", "LIB");
        assert!(record.is("diegodp"));
        assert!(record.is("@DIEGODP"));
        assert!(!record.is("diego"));
        assert_eq!(record.key(), "diegodp");
    }
}
