//! Roster store: reviewer/supervisor records plus the append-only review ledger.
//!
//! The roster file is always rewritten whole. Writes are check-and-set against
//! the content hash observed at load, taken under a short-lived lock file and
//! finished with a temp-file rename, so a racing invocation gets a
//! `VersionConflict` instead of silently losing an update. `transact` retries
//! the read-modify-write cycle on conflict.

mod ledger;
mod table;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::error::{EarbotError, Result};

pub use ledger::Ledger;
pub use table::{Column, Roster, RosterRow, join_cells, split_line};

/// A value paired with the version of the resource it was read from
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub version: String,
}

/// Retry and locking knobs for roster writes
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub stale_lock_after: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_backoff: Duration::from_millis(200),
            stale_lock_after: Duration::from_secs(60),
        }
    }
}

/// Inclusive bounds applied to every calling-score update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreBounds {
    pub floor: Option<i64>,
    pub ceiling: Option<i64>,
}

impl Default for ScoreBounds {
    fn default() -> Self {
        Self {
            floor: Some(0),
            ceiling: None,
        }
    }
}

impl ScoreBounds {
    pub fn clamp(&self, score: i64) -> i64 {
        let score = self.floor.map_or(score, |f| score.max(f));
        self.ceiling.map_or(score, |c| score.min(c))
    }
}

/// A single mutation of one roster record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterChange {
    SetBusy { id: String, busy: bool },
    AdjustScore { id: String, delta: i64 },
    /// Count a completed review and stamp its date
    RecordReview { id: String, date: NaiveDate },
}

impl RosterChange {
    pub fn id(&self) -> &str {
        match self {
            RosterChange::SetBusy { id, .. }
            | RosterChange::AdjustScore { id, .. }
            | RosterChange::RecordReview { id, .. } => id,
        }
    }
}

impl Roster {
    /// Apply changes in order. Changes naming people who are not on the
    /// roster are skipped; the number of applied changes is returned.
    pub fn apply(&mut self, changes: &[RosterChange], bounds: ScoreBounds) -> usize {
        let mut applied = 0;
        for change in changes {
            let Some(record) = self.get_mut(change.id()) else {
                warn!("Roster has no entry for '{}', skipping {:?}", change.id(), change);
                continue;
            };
            match change {
                RosterChange::SetBusy { busy, .. } => record.busy = *busy,
                RosterChange::AdjustScore { delta, .. } => {
                    record.calling_score = bounds.clamp(record.calling_score.saturating_add(*delta));
                }
                RosterChange::RecordReview { date, .. } => {
                    record.total_reviews = record.total_reviews.saturating_add(1);
                    record.last_review = crate::domain::LastReview::On(*date);
                }
            }
            applied += 1;
        }
        applied
    }
}

/// File-backed roster with optimistic concurrency
#[derive(Debug, Clone)]
pub struct RosterStore {
    path: PathBuf,
    options: StoreOptions,
}

impl RosterStore {
    pub fn new(path: impl AsRef<Path>, options: StoreOptions) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        fs::read(&self.path)
            .map_err(|e| EarbotError::StoreUnavailable(format!("{}: {}", self.path.display(), e)))
    }

    /// Load the roster and the version it was read at
    pub fn load(&self) -> Result<Versioned<Roster>> {
        let bytes = self.read_bytes()?;
        let text = String::from_utf8(bytes)
            .map_err(|e| EarbotError::StoreUnavailable(format!("{}: {}", self.path.display(), e)))?;
        let roster = Roster::parse(&text, &self.path.display().to_string())?;
        Ok(Versioned {
            version: content_version(text.as_bytes()),
            value: roster,
        })
    }

    /// Replace the whole roster if it is still at `expected_version`.
    ///
    /// Returns the new version.
    pub fn save(&self, roster: &Roster, expected_version: &str) -> Result<String> {
        let _lock = LockGuard::acquire(&self.lock_path(), self.options.stale_lock_after)?;

        let current = content_version(&self.read_bytes()?);
        if current != expected_version {
            return Err(EarbotError::VersionConflict(format!(
                "{} changed since it was loaded",
                self.path.display()
            )));
        }

        let rendered = roster.render();
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(rendered.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let version = content_version(rendered.as_bytes());
        debug!("Roster saved at version {}", &version[..12.min(version.len())]);
        Ok(version)
    }

    /// Read-modify-write with retry on version conflict.
    ///
    /// `f` may run more than once and must derive everything from the roster
    /// it is handed. Nothing is written if `f` leaves the roster unchanged or
    /// returns an error.
    pub async fn transact<T, F>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(&mut Roster) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            let Versioned { value: mut roster, version } = self.load()?;
            let before = roster.clone();
            let out = f(&mut roster)?;
            if roster == before {
                return Ok(out);
            }

            match self.save(&roster, &version) {
                Ok(_) => {
                    info!("Roster updated ({})", self.path.display());
                    return Ok(out);
                }
                Err(EarbotError::VersionConflict(msg)) if attempt < self.options.max_retries => {
                    attempt += 1;
                    warn!("Roster write conflict ({}), retry {}/{}", msg, attempt, self.options.max_retries);
                    tokio::time::sleep(self.options.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// SHA-256 of the resource bytes, hex encoded
pub fn content_version(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Exclusive lock file removed on drop
struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    fn acquire(path: &Path, stale_after: Duration) -> Result<Self> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let age = fs::metadata(path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|modified| SystemTime::now().duration_since(modified).ok());
                if age.is_some_and(|age| age > stale_after) {
                    warn!("Removing stale roster lock {}", path.display());
                    fs::remove_file(path)?;
                    return Self::acquire(path, stale_after);
                }
                Err(EarbotError::VersionConflict(format!("{} is held", path.display())))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ROSTER: &str = "Github ID,Full Name,Institution,Total Reviews,Last Review,Active,Busy,Calling Score,Supervisor\n\
alice,Alice Smith,Uni X,3,2024-01-15,Y,N,100,N\n\
bob,Bob Jones,Uni Y,0,NA,Y,N,1,Y\n";

    fn create_store(content: &str) -> (RosterStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reviewers_list.csv");
        fs::write(&path, content).unwrap();
        let options = StoreOptions {
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
            stale_lock_after: Duration::from_secs(60),
        };
        (RosterStore::new(path, options), temp_dir)
    }

    #[test]
    fn test_load_missing_is_store_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let store = RosterStore::new(temp_dir.path().join("nope.csv"), StoreOptions::default());
        assert!(matches!(store.load(), Err(EarbotError::StoreUnavailable(_))));
    }

    #[test]
    fn test_save_load_round_trip_is_identical() {
        let (store, _temp) = create_store(ROSTER);
        let loaded = store.load().unwrap();
        let version = store.save(&loaded.value, &loaded.version).unwrap();
        assert_eq!(version, loaded.version);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), ROSTER);
    }

    #[test]
    fn test_save_rejects_stale_version() {
        let (store, _temp) = create_store(ROSTER);
        let first = store.load().unwrap();
        let mut second = store.load().unwrap();

        second.value.get_mut("bob").unwrap().busy = true;
        store.save(&second.value, &second.version).unwrap();

        let err = store.save(&first.value, &first.version).unwrap_err();
        assert!(matches!(err, EarbotError::VersionConflict(_)));
        assert!(store.load().unwrap().value.get("bob").unwrap().busy);
    }

    #[test]
    fn test_save_fails_while_lock_held() {
        let (store, _temp) = create_store(ROSTER);
        let loaded = store.load().unwrap();
        fs::write(store.lock_path(), "123").unwrap();
        let err = store.save(&loaded.value, &loaded.version).unwrap_err();
        assert!(matches!(err, EarbotError::VersionConflict(_)));
    }

    #[test]
    fn test_lock_released_after_save() {
        let (store, _temp) = create_store(ROSTER);
        let loaded = store.load().unwrap();
        store.save(&loaded.value, &loaded.version).unwrap();
        assert!(!store.lock_path().exists());
    }

    #[tokio::test]
    async fn test_transact_applies_and_persists() {
        let (store, _temp) = create_store(ROSTER);
        let applied = store
            .transact(|roster| {
                Ok(roster.apply(
                    &[RosterChange::SetBusy {
                        id: "ALICE".to_string(),
                        busy: true,
                    }],
                    ScoreBounds::default(),
                ))
            })
            .await
            .unwrap();
        assert_eq!(applied, 1);
        assert!(store.load().unwrap().value.get("alice").unwrap().busy);
    }

    #[tokio::test]
    async fn test_transact_without_changes_does_not_write() {
        let (store, _temp) = create_store(ROSTER);
        let before = fs::metadata(store.path()).unwrap().modified().unwrap();
        store.transact(|roster| Ok(roster.len())).await.unwrap();
        let after = fs::metadata(store.path()).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_transact_retries_after_concurrent_write() {
        let (store, _temp) = create_store(ROSTER);
        let mut calls = 0;
        store
            .transact(|roster| {
                calls += 1;
                if calls == 1 {
                    // another invocation sneaks in between our load and save
                    let mut other = store.load().unwrap();
                    other.value.get_mut("bob").unwrap().calling_score = 50;
                    store.save(&other.value, &other.version).unwrap();
                }
                roster.apply(
                    &[RosterChange::SetBusy {
                        id: "alice".to_string(),
                        busy: true,
                    }],
                    ScoreBounds::default(),
                );
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(calls, 2);
        let roster = store.load().unwrap().value;
        assert!(roster.get("alice").unwrap().busy);
        assert_eq!(roster.get("bob").unwrap().calling_score, 50);
    }

    #[tokio::test]
    async fn test_transact_error_leaves_file_untouched() {
        let (store, _temp) = create_store(ROSTER);
        let result: Result<()> = store
            .transact(|roster| {
                roster.get_mut("alice").unwrap().busy = true;
                Err(EarbotError::Validation("nope".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), ROSTER);
    }

    #[test]
    fn test_apply_clamps_score_at_floor() {
        let mut roster = Roster::parse(ROSTER, "test").unwrap();
        let changes = vec![
            RosterChange::AdjustScore {
                id: "bob".to_string(),
                delta: -5,
            },
            RosterChange::AdjustScore {
                id: "nobody".to_string(),
                delta: 1,
            },
        ];
        assert_eq!(roster.apply(&changes, ScoreBounds::default()), 1);
        assert_eq!(roster.get("bob").unwrap().calling_score, 0);

        let unbounded = ScoreBounds {
            floor: None,
            ceiling: None,
        };
        roster.apply(&changes[..1], unbounded);
        assert_eq!(roster.get("bob").unwrap().calling_score, -5);
    }

    #[test]
    fn test_apply_record_review() {
        let mut roster = Roster::parse(ROSTER, "test").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        roster.apply(
            &[RosterChange::RecordReview {
                id: "alice".to_string(),
                date,
            }],
            ScoreBounds::default(),
        );
        let alice = roster.get("alice").unwrap();
        assert_eq!(alice.total_reviews, 4);
        assert_eq!(alice.last_review, crate::domain::LastReview::On(date));
    }

    #[test]
    fn test_score_bounds_ceiling() {
        let bounds = ScoreBounds {
            floor: Some(0),
            ceiling: Some(200),
        };
        assert_eq!(bounds.clamp(250), 200);
        assert_eq!(bounds.clamp(-3), 0);
        assert_eq!(bounds.clamp(42), 42);
    }
}
