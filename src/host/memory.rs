//! In-memory `RequestHost` for tests and offline runs.
//!
//! Effects are applied to the stored snapshots and also recorded in order, so
//! tests can assert both the resulting request and what was done to it.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::RequestHost;
use crate::domain::{Comment, RequestSnapshot, RequestStatus, Review};
use crate::error::{EarbotError, Result};

/// One mutation performed through the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    Comment { number: u64, body: String },
    AddLabel { number: u64, label: String },
    RemoveLabel { number: u64, label: String },
    SetAssignee { number: u64, login: String },
    RequestReviewer { number: u64, login: String },
}

#[derive(Debug, Default)]
struct Inner {
    requests: BTreeMap<u64, RequestSnapshot>,
    actions: Vec<HostAction>,
    broken: HashSet<u64>,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct MemoryHost {
    bot_login: String,
    inner: Mutex<Inner>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new("earbot")
    }
}

impl MemoryHost {
    pub fn new(bot_login: impl Into<String>) -> Self {
        Self {
            bot_login: bot_login.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| EarbotError::Collaborator(format!("memory host poisoned: {}", e)))
    }

    fn with_request<T>(&self, number: u64, f: impl FnOnce(&mut RequestSnapshot, DateTime<Utc>) -> T) -> Result<T> {
        let mut inner = self.lock()?;
        if inner.broken.contains(&number) {
            return Err(EarbotError::Collaborator(format!("request #{} unavailable", number)));
        }
        let now = inner.now.unwrap_or_else(Utc::now);
        let request = inner
            .requests
            .get_mut(&number)
            .ok_or_else(|| EarbotError::Collaborator(format!("request #{} not found", number)))?;
        Ok(f(request, now))
    }

    fn record(&self, action: HostAction) -> Result<()> {
        self.lock()?.actions.push(action);
        Ok(())
    }

    /// Add or replace a request
    pub fn insert(&self, snapshot: RequestSnapshot) -> Result<()> {
        self.lock()?.requests.insert(snapshot.number, snapshot);
        Ok(())
    }

    /// Clock used to timestamp bot comments
    pub fn set_now(&self, now: DateTime<Utc>) -> Result<()> {
        self.lock()?.now = Some(now);
        Ok(())
    }

    /// Simulate a human comment
    pub fn push_comment(&self, number: u64, author: &str, body: &str, at: DateTime<Utc>) -> Result<()> {
        self.with_request(number, |r, _| {
            r.comments.push(Comment {
                author: author.to_string(),
                body: body.to_string(),
                created_at: at,
                automated: false,
            })
        })
    }

    pub fn push_review(&self, number: u64, author: &str, at: DateTime<Utc>) -> Result<()> {
        self.with_request(number, |r, _| {
            r.reviews.push(Review {
                author: author.to_string(),
                submitted_at: at,
            })
        })
    }

    pub fn set_status(&self, number: u64, status: RequestStatus) -> Result<()> {
        self.with_request(number, |r, _| r.status = status)
    }

    pub fn set_body(&self, number: u64, body: &str) -> Result<()> {
        self.with_request(number, |r, _| r.body = body.to_string())
    }

    /// Make every call for this request fail with a collaborator error
    pub fn break_request(&self, number: u64) -> Result<()> {
        self.lock()?.broken.insert(number);
        Ok(())
    }

    pub fn get(&self, number: u64) -> Option<RequestSnapshot> {
        self.inner.lock().ok()?.requests.get(&number).cloned()
    }

    /// Every action performed so far, in order
    pub fn actions(&self) -> Vec<HostAction> {
        self.inner.lock().map(|i| i.actions.clone()).unwrap_or_default()
    }

    /// Bodies of comments the bot posted on a request
    pub fn bot_comments(&self, number: u64) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                HostAction::Comment { number: n, body } if n == number => Some(body),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RequestHost for MemoryHost {
    async fn snapshot(&self, number: u64) -> Result<RequestSnapshot> {
        self.with_request(number, |r, _| r.clone())
    }

    async fn list_open(&self) -> Result<Vec<u64>> {
        Ok(self
            .lock()?
            .requests
            .values()
            .filter(|r| r.status == RequestStatus::Open)
            .map(|r| r.number)
            .collect())
    }

    async fn post_comment(&self, number: u64, body: &str) -> Result<()> {
        let bot = self.bot_login.clone();
        self.with_request(number, |r, now| {
            r.comments.push(Comment {
                author: bot,
                body: body.to_string(),
                created_at: now,
                automated: true,
            })
        })?;
        self.record(HostAction::Comment {
            number,
            body: body.to_string(),
        })
    }

    async fn add_label(&self, number: u64, label: &str) -> Result<()> {
        self.with_request(number, |r, _| {
            if !r.has_label(label) {
                r.labels.push(label.to_string());
            }
        })?;
        self.record(HostAction::AddLabel {
            number,
            label: label.to_string(),
        })
    }

    async fn remove_label(&self, number: u64, label: &str) -> Result<()> {
        self.with_request(number, |r, _| r.labels.retain(|l| !l.eq_ignore_ascii_case(label)))?;
        self.record(HostAction::RemoveLabel {
            number,
            label: label.to_string(),
        })
    }

    async fn set_assignee(&self, number: u64, login: &str) -> Result<()> {
        self.with_request(number, |r, _| r.assignee = Some(login.to_string()))?;
        self.record(HostAction::SetAssignee {
            number,
            login: login.to_string(),
        })
    }

    async fn request_reviewer(&self, number: u64, login: &str) -> Result<()> {
        self.with_request(number, |r, _| {
            if !r.requested_reviewers.iter().any(|l| l.eq_ignore_ascii_case(login)) {
                r.requested_reviewers.push(login.to_string());
            }
        })?;
        self.record(HostAction::RequestReviewer {
            number,
            login: login.to_string(),
        })
    }
}
