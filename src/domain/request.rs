//! Snapshot of a review request as seen on the code-review host
//!
//! The host owns the request; the engine only reads a snapshot at the start of
//! an invocation and mutates it through `RequestHost` effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open/closed/merged status of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Open,
    Closed,
    Merged,
}

/// How a file differs from the target branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    Other,
}

impl FileStatus {
    pub fn from_host(status: &str) -> Self {
        match status {
            "added" => FileStatus::Added,
            "modified" | "changed" => FileStatus::Modified,
            "removed" => FileStatus::Removed,
            "renamed" => FileStatus::Renamed,
            _ => FileStatus::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    pub status: FileStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// Posted by a bot account
    pub automated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub author: String,
    pub submitted_at: DateTime<Utc>,
}

/// Everything the engine reads about one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub number: u64,
    pub url: String,
    /// The researcher who opened the request
    pub author: String,
    pub body: String,
    pub labels: Vec<String>,
    pub assignee: Option<String>,
    pub requested_reviewers: Vec<String>,
    /// Chronological
    pub reviews: Vec<Review>,
    /// Chronological
    pub comments: Vec<Comment>,
    pub status: RequestStatus,
    pub files: Vec<ChangedFile>,
    pub created_at: DateTime<Utc>,
}

impl RequestSnapshot {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }

    /// Value of a `- Name: value` line in the body, if present and non-empty
    pub fn declared_field(&self, name: &str) -> Option<String> {
        declared_field(&self.body, name)
    }

    /// True if an automated comment with exactly this body already exists
    pub fn has_automated_comment(&self, body: &str) -> bool {
        self.comments
            .iter()
            .any(|c| c.automated && c.body.trim() == body.trim())
    }

    /// Most recent human or bot activity on the request
    pub fn last_activity(&self) -> DateTime<Utc> {
        let comments = self.comments.iter().map(|c| c.created_at);
        let reviews = self.reviews.iter().map(|r| r.submitted_at);
        comments
            .chain(reviews)
            .fold(self.created_at, |latest, t| latest.max(t))
    }

    /// Most recent review, if any
    pub fn latest_review(&self) -> Option<&Review> {
        self.reviews.iter().max_by_key(|r| r.submitted_at)
    }

    pub fn has_review_by(&self, handle: &str) -> bool {
        self.reviews.iter().any(|r| r.author.eq_ignore_ascii_case(handle))
    }

    /// Changed files that are submission artifacts (e.g. the report PDF)
    pub fn artifacts<'a>(&'a self, extension: &'a str) -> impl Iterator<Item = &'a ChangedFile> + 'a {
        self.files
            .iter()
            .filter(move |f| f.path.to_lowercase().ends_with(&extension.to_lowercase()))
            .filter(|f| f.status != FileStatus::Removed)
    }
}

/// Parse a `- Name: value` declaration out of a request body
pub fn declared_field(body: &str, name: &str) -> Option<String> {
    let prefix = format!("- {}:", name);
    body.lines()
        .map(str::trim)
        .filter(|line| line.starts_with(&prefix))
        .filter_map(|line| line.split_once(':').map(|(_, value)| value.trim()))
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    pub fn snapshot(body: &str) -> RequestSnapshot {
        RequestSnapshot {
            number: 42,
            url: "https://github.com/ERGA-consortium/EARs/pull/42".to_string(),
            author: "researcher".to_string(),
            body: body.to_string(),
            labels: vec![],
            assignee: None,
            requested_reviewers: vec![],
            reviews: vec![],
            comments: vec![],
            status: RequestStatus::Open,
            files: vec![ChangedFile {
                path: "Assembly_Reports/Apis/iyApiMel1/iyApiMel1_EAR.pdf".to_string(),
                status: FileStatus::Added,
            }],
            created_at: at(2024, 5, 6, 9),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    const BODY: &str = "Please review.\n\n- Project: ERGA-BGE\n- Species: Apis mellifera\n- Affiliation: Uni X\n- Notes:\n";

    #[test]
    fn test_declared_field_found() {
        assert_eq!(declared_field(BODY, "Project").as_deref(), Some("ERGA-BGE"));
        assert_eq!(declared_field(BODY, "Species").as_deref(), Some("Apis mellifera"));
        assert_eq!(declared_field(BODY, "Affiliation").as_deref(), Some("Uni X"));
    }

    #[test]
    fn test_declared_field_empty_or_missing() {
        assert_eq!(declared_field(BODY, "Notes"), None);
        assert_eq!(declared_field(BODY, "ToLID"), None);
    }

    #[test]
    fn test_declared_field_keeps_colons_in_value() {
        let body = "- Affiliation: Dept: Genomics";
        assert_eq!(declared_field(body, "Affiliation").as_deref(), Some("Dept: Genomics"));
    }

    #[test]
    fn test_last_activity_uses_latest_comment_or_review() {
        let mut snap = snapshot(BODY);
        assert_eq!(snap.last_activity(), at(2024, 5, 6, 9));

        snap.comments.push(Comment {
            author: "bot".to_string(),
            body: "hi".to_string(),
            created_at: at(2024, 5, 8, 10),
            automated: true,
        });
        snap.reviews.push(Review {
            author: "rev".to_string(),
            submitted_at: at(2024, 5, 7, 10),
        });
        assert_eq!(snap.last_activity(), at(2024, 5, 8, 10));
    }

    #[test]
    fn test_artifacts_filter_by_extension() {
        let mut snap = snapshot(BODY);
        snap.files.push(ChangedFile {
            path: "README.md".to_string(),
            status: FileStatus::Modified,
        });
        snap.files.push(ChangedFile {
            path: "old/report.PDF".to_string(),
            status: FileStatus::Removed,
        });
        let artifacts: Vec<_> = snap.artifacts(".pdf").collect();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].status, FileStatus::Added);
    }

    #[test]
    fn test_has_automated_comment_ignores_humans() {
        let mut snap = snapshot(BODY);
        snap.comments.push(Comment {
            author: "researcher".to_string(),
            body: "Thanks!".to_string(),
            created_at: at(2024, 5, 6, 10),
            automated: false,
        });
        assert!(!snap.has_automated_comment("Thanks!"));
    }
}
