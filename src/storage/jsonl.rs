//! JSONL-based append-only storage with in-memory caching.
//!
//! Each write appends one line. On load the last line for an id wins, so two
//! invocations writing different requests never clobber each other.
//! `compact` rewrites the file and must only run while no other process is
//! writing; the engine never calls it on its own.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use log::debug;
use serde::{Serialize, de::DeserializeOwned};

use super::traits::{Filter, HasId, Storage};
use crate::error::{EarbotError, Result};

/// Latest version per id, plus first-seen order
#[derive(Debug, Default)]
struct Collection {
    order: Vec<String>,
    latest: HashMap<String, serde_json::Value>,
    lines: usize,
}

impl Collection {
    fn insert(&mut self, id: String, value: serde_json::Value) {
        if !self.latest.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.latest.insert(id, value);
        self.lines += 1;
    }

    fn iter(&self) -> impl Iterator<Item = &serde_json::Value> {
        self.order.iter().filter_map(|id| self.latest.get(id))
    }
}

/// JSONL-based storage with in-memory caching.
pub struct JsonlStorage {
    base_path: PathBuf,
    cache: RwLock<HashMap<String, Collection>>,
}

fn lock_err(e: impl std::fmt::Display) -> EarbotError {
    EarbotError::StoreUnavailable(e.to_string())
}

fn not_loaded(collection: &str) -> EarbotError {
    EarbotError::StoreUnavailable(format!("Collection not loaded: {}", collection))
}

impl JsonlStorage {
    /// Create a new JsonlStorage at the given path.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Get the file path for a collection.
    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", collection))
    }

    /// Load a collection into cache if not already loaded.
    fn ensure_loaded(&self, collection: &str) -> Result<()> {
        {
            let cache = self.cache.read().map_err(lock_err)?;
            if cache.contains_key(collection) {
                return Ok(());
            }
        }

        let mut cache = self.cache.write().map_err(lock_err)?;
        if cache.contains_key(collection) {
            return Ok(());
        }

        let loaded = self.read_collection(collection)?;
        cache.insert(collection.to_string(), loaded);
        Ok(())
    }

    /// Read every line of a collection's file, regardless of what is cached.
    fn read_collection(&self, collection: &str) -> Result<Collection> {
        let path = self.collection_path(collection);
        let mut loaded = Collection::default();
        if path.exists() {
            let file = File::open(&path)?;
            let reader = BufReader::new(file);
            for (n, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: serde_json::Value = serde_json::from_str(&line)?;
                let id = record
                    .get("id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        EarbotError::StoreUnavailable(format!("{}:{}: record has no id", path.display(), n + 1))
                    })?
                    .to_string();
                loaded.insert(id, record);
            }
        }
        debug!(
            "Loaded {} records ({} lines) from {}",
            loaded.latest.len(),
            loaded.lines,
            path.display()
        );
        Ok(loaded)
    }

    /// Append a record to the JSONL file.
    fn append_to_file(&self, collection: &str, record: &serde_json::Value) -> Result<()> {
        let path = self.collection_path(collection);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }
}

impl Storage for JsonlStorage {
    fn put<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        self.ensure_loaded(collection)?;

        let value = serde_json::to_value(record)?;

        // Append to file first (source of truth)
        self.append_to_file(collection, &value)?;

        let mut cache = self.cache.write().map_err(lock_err)?;
        cache
            .get_mut(collection)
            .ok_or_else(|| not_loaded(collection))?
            .insert(record.id().to_string(), value);

        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(lock_err)?;
        let records = cache.get(collection).ok_or_else(|| not_loaded(collection))?;

        match records.latest.get(id) {
            Some(record) => Ok(Some(serde_json::from_value(record.clone())?)),
            None => Ok(None),
        }
    }

    fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(lock_err)?;
        let records = cache.get(collection).ok_or_else(|| not_loaded(collection))?;

        let mut results = Vec::new();
        for record in records.iter() {
            if filters.iter().all(|f| f.matches(record)) {
                results.push(serde_json::from_value(record.clone())?);
            }
        }

        Ok(results)
    }

    fn list<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        self.query(collection, &[])
    }

    fn compact(&self, collection: &str) -> Result<usize> {
        let mut cache = self.cache.write().map_err(lock_err)?;

        // Other processes may have appended since this instance cached the file
        let records = self.read_collection(collection)?;
        let dropped = records.lines - records.latest.len();
        if dropped > 0 {
            let path = self.collection_path(collection);
            let tmp = path.with_extension("jsonl.tmp");
            {
                let mut file = File::create(&tmp)?;
                for record in records.iter() {
                    writeln!(file, "{}", serde_json::to_string(record)?)?;
                }
                file.sync_all()?;
            }
            fs::rename(&tmp, &path)?;
        }

        let mut compacted = records;
        compacted.lines = compacted.latest.len();
        cache.insert(collection.to_string(), compacted);

        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestRecord {
        id: String,
        name: String,
        status: String,
    }

    impl HasId for TestRecord {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn record(id: &str, name: &str, status: &str) -> TestRecord {
        TestRecord {
            id: id.to_string(),
            name: name.to_string(),
            status: status.to_string(),
        }
    }

    fn create_test_storage() -> (JsonlStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = JsonlStorage::new(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    #[test]
    fn test_put_and_get() {
        let (storage, _temp) = create_test_storage();
        let r = record("1", "test", "active");

        storage.put("test", &r).unwrap();
        let retrieved: Option<TestRecord> = storage.get("test", "1").unwrap();

        assert_eq!(retrieved, Some(r));
    }

    #[test]
    fn test_get_not_found() {
        let (storage, _temp) = create_test_storage();
        let retrieved: Option<TestRecord> = storage.get("test", "nonexistent").unwrap();
        assert_eq!(retrieved, None);
    }

    #[test]
    fn test_latest_version_wins_and_file_is_append_only() {
        let (storage, temp) = create_test_storage();
        storage.put("test", &record("1", "test", "active")).unwrap();
        storage.put("test", &record("1", "test", "completed")).unwrap();

        let retrieved: Option<TestRecord> = storage.get("test", "1").unwrap();
        assert_eq!(retrieved.unwrap().status, "completed");

        let text = fs::read_to_string(temp.path().join("test.jsonl")).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().next().unwrap().contains("active"));
    }

    #[test]
    fn test_query_sees_only_latest_versions() {
        let (storage, _temp) = create_test_storage();
        storage.put("test", &record("1", "alice", "active")).unwrap();
        storage.put("test", &record("2", "bob", "inactive")).unwrap();
        storage.put("test", &record("3", "charlie", "active")).unwrap();
        storage.put("test", &record("1", "alice", "inactive")).unwrap();

        let active: Vec<TestRecord> = storage.query("test", &[Filter::eq("status", "active")]).unwrap();
        assert_eq!(active, vec![record("3", "charlie", "active")]);
    }

    #[test]
    fn test_list_keeps_first_written_order() {
        let (storage, _temp) = create_test_storage();
        storage.put("test", &record("b", "one", "x")).unwrap();
        storage.put("test", &record("a", "two", "x")).unwrap();
        storage.put("test", &record("b", "one", "y")).unwrap();

        let all: Vec<TestRecord> = storage.list("test").unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();

        {
            let storage = JsonlStorage::new(temp_dir.path()).unwrap();
            storage.put("test", &record("1", "test", "active")).unwrap();
            storage.put("test", &record("1", "test", "done")).unwrap();
        }

        {
            let storage = JsonlStorage::new(temp_dir.path()).unwrap();
            let retrieved: Option<TestRecord> = storage.get("test", "1").unwrap();
            assert_eq!(retrieved.unwrap().status, "done");
        }
    }

    #[test]
    fn test_compact_drops_superseded_lines() {
        let (storage, temp) = create_test_storage();
        storage.put("test", &record("1", "a", "v1")).unwrap();
        storage.put("test", &record("2", "b", "v1")).unwrap();
        storage.put("test", &record("1", "a", "v2")).unwrap();
        storage.put("test", &record("1", "a", "v3")).unwrap();

        assert_eq!(storage.compact("test").unwrap(), 2);
        assert_eq!(storage.compact("test").unwrap(), 0);

        let text = fs::read_to_string(temp.path().join("test.jsonl")).unwrap();
        assert_eq!(text.lines().count(), 2);

        let reopened = JsonlStorage::new(temp.path()).unwrap();
        let one: Option<TestRecord> = reopened.get("test", "1").unwrap();
        assert_eq!(one.unwrap().status, "v3");
    }

    #[test]
    fn test_compact_keeps_lines_appended_by_another_instance() {
        let temp_dir = TempDir::new().unwrap();
        let first = JsonlStorage::new(temp_dir.path()).unwrap();
        let second = JsonlStorage::new(temp_dir.path()).unwrap();

        first.put("test", &record("1", "a", "v1")).unwrap();
        first.put("test", &record("1", "a", "v2")).unwrap();
        // second instance writes after the first one cached the collection
        second.put("test", &record("2", "b", "v1")).unwrap();
        second.put("test", &record("1", "a", "v3")).unwrap();

        assert_eq!(first.compact("test").unwrap(), 2);

        let text = fs::read_to_string(temp_dir.path().join("test.jsonl")).unwrap();
        assert_eq!(text.lines().count(), 2);

        let one: Option<TestRecord> = first.get("test", "1").unwrap();
        assert_eq!(one.unwrap().status, "v3");
        let two: Option<TestRecord> = first.get("test", "2").unwrap();
        assert_eq!(two.unwrap().name, "b");
    }

    #[test]
    fn test_line_without_id_is_rejected() {
        let (storage, temp) = create_test_storage();
        fs::write(temp.path().join("test.jsonl"), "{\"name\":\"x\"}\n").unwrap();
        let result: Result<Vec<TestRecord>> = storage.list("test");
        assert!(matches!(result, Err(EarbotError::StoreUnavailable(_))));
    }

    #[test]
    fn test_empty_collection() {
        let (storage, _temp) = create_test_storage();
        let all: Vec<TestRecord> = storage.list("empty").unwrap();
        assert!(all.is_empty());
    }
}
