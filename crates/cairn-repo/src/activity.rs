//! The activity store: a durable keyed map from activity id to
//! transaction name.
//!
//! The commit saga spans many independent requests, so this mapping must
//! outlive any single request and tolerate concurrent access from
//! unrelated workers.

#![expect(
    clippy::missing_errors_doc,
    reason = "Store errors are I/O failures of the chosen backing"
)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{RepoError, RepoResult};

/// Keyed storage for activity records.
pub trait ActivityStore: Send + Sync {
    /// Looks up the transaction bound to an activity.
    fn get(&self, activity_id: &str) -> RepoResult<Option<String>>;

    /// Records a new activity. Returns `false` without modifying anything
    /// when the id already exists.
    fn put_new(&self, activity_id: &str, txn_name: &str) -> RepoResult<bool>;

    /// Removes an activity, returning the transaction it was bound to.
    fn remove(&self, activity_id: &str) -> RepoResult<Option<String>>;

    fn contains(&self, activity_id: &str) -> RepoResult<bool> {
        Ok(self.get(activity_id)?.is_some())
    }
}

/// Process-local store for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryActivityStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryActivityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActivityStore for MemoryActivityStore {
    fn get(&self, activity_id: &str) -> RepoResult<Option<String>> {
        Ok(self.entries.lock().get(activity_id).cloned())
    }

    fn put_new(&self, activity_id: &str, txn_name: &str) -> RepoResult<bool> {
        let mut entries = self.entries.lock();
        if entries.contains_key(activity_id) {
            return Ok(false);
        }
        entries.insert(activity_id.to_string(), txn_name.to_string());
        Ok(true)
    }

    fn remove(&self, activity_id: &str) -> RepoResult<Option<String>> {
        Ok(self.entries.lock().remove(activity_id))
    }
}

/// Directory-of-files store: one file per activity id, holding the
/// transaction name. Survives server restarts.
#[derive(Debug)]
pub struct FsActivityStore {
    root: PathBuf,
    // Serializes create-vs-remove races within this process; cross-process
    // exclusivity comes from create_new.
    guard: Mutex<()>,
}

impl FsActivityStore {
    /// Opens (and creates if needed) the store directory.
    ///
    /// ## Errors
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> RepoResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            guard: Mutex::new(()),
        })
    }

    fn entry_path(&self, activity_id: &str) -> RepoResult<PathBuf> {
        if !is_safe_id(activity_id) {
            return Err(RepoError::Storage(format!(
                "invalid activity id: {activity_id:?}"
            )));
        }
        Ok(self.root.join(activity_id))
    }
}

/// Activity ids are uuid-shaped tokens; anything that could escape the
/// store directory is rejected outright.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl ActivityStore for FsActivityStore {
    fn get(&self, activity_id: &str) -> RepoResult<Option<String>> {
        let path = self.entry_path(activity_id)?;
        match std::fs::read_to_string(&path) {
            Ok(txn_name) => Ok(Some(txn_name.trim_end().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put_new(&self, activity_id: &str, txn_name: &str) -> RepoResult<bool> {
        let path = self.entry_path(activity_id)?;
        let _guard = self.guard.lock();
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                use std::io::Write as _;
                file.write_all(txn_name.as_bytes())?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, activity_id: &str) -> RepoResult<Option<String>> {
        let path = self.entry_path(activity_id)?;
        let _guard = self.guard.lock();
        let existing = match std::fs::read_to_string(&path) {
            Ok(txn_name) => txn_name.trim_end().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        std::fs::remove_file(&path)?;
        Ok(Some(existing))
    }
}

impl FsActivityStore {
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryActivityStore::new();
        assert!(store.put_new("abc-123", "txn-1").unwrap());
        assert!(!store.put_new("abc-123", "txn-2").unwrap());
        assert_eq!(store.get("abc-123").unwrap().as_deref(), Some("txn-1"));
        assert_eq!(store.remove("abc-123").unwrap().as_deref(), Some("txn-1"));
        assert!(store.get("abc-123").unwrap().is_none());
    }

    #[test]
    fn fs_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FsActivityStore::open(dir.path()).unwrap();
            assert!(store.put_new("abc-123", "txn-9").unwrap());
        }
        let reopened = FsActivityStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("abc-123").unwrap().as_deref(), Some("txn-9"));
    }

    #[test]
    fn fs_store_rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsActivityStore::open(dir.path()).unwrap();
        assert!(store.put_new("abc", "txn-1").unwrap());
        assert!(!store.put_new("abc", "txn-2").unwrap());
        assert_eq!(store.get("abc").unwrap().as_deref(), Some("txn-1"));
    }

    #[test]
    fn fs_store_rejects_traversal_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsActivityStore::open(dir.path()).unwrap();
        assert!(store.put_new("../escape", "txn-1").is_err());
        assert!(store.get("a/b").is_err());
    }
}
