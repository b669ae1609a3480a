//! hdvault storage layer
//!
//! Named secret records addressed by slash-separated paths such as
//! `hdwallets/<name>`. Two backends:
//! - [`SledStore`]: persistent, every write flushed to disk
//! - [`MemoryStore`]: process-local, for tests and throwaway sessions

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Invalid path: {0:?}")]
    InvalidPath(String),
}

/// Keyed record store.
pub trait SecretStore: Send + Sync {
    /// Immediate children of `prefix`, sorted. Keys nested deeper are
    /// reported once as `child/`.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Insert or replace the record at `path`.
    fn put(&self, path: &str, value: &[u8]) -> Result<(), StorageError>;
}

impl<T: SecretStore + ?Sized> SecretStore for Arc<T> {
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        (**self).list(prefix)
    }

    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(path)
    }

    fn put(&self, path: &str, value: &[u8]) -> Result<(), StorageError> {
        (**self).put(path, value)
    }
}

fn check_path(path: &str) -> Result<(), StorageError> {
    if path.is_empty() || path.starts_with('/') || path.ends_with('/') || path.contains("//") {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Reduce full keys under `prefix` to their first path segment.
fn children<I>(prefix: &str, keys: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out = BTreeSet::new();
    for key in keys {
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };
        match rest.find('/') {
            Some(idx) => out.insert(rest[..=idx].to_string()),
            None => out.insert(rest.to_string()),
        };
    }
    out.into_iter().filter(|k| !k.is_empty()).collect()
}

/// sled-backed store
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref())?;
        log::debug!("Opened secret store at {}", path.as_ref().display());
        Ok(Self { db })
    }
}

impl SecretStore for SledStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(children(prefix, keys))
    }

    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        check_path(path)?;
        Ok(self.db.get(path.as_bytes())?.map(|v| v.to_vec()))
    }

    fn put(&self, path: &str, value: &[u8]) -> Result<(), StorageError> {
        check_path(path)?;
        self.db.insert(path.as_bytes(), value)?;
        // Records must survive a crash right after creation
        self.db.flush()?;
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl SecretStore for MemoryStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let records = self.records.read();
        let keys = records
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone());
        Ok(children(prefix, keys))
    }

    fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        check_path(path)?;
        Ok(self.records.read().get(path).cloned())
    }

    fn put(&self, path: &str, value: &[u8]) -> Result<(), StorageError> {
        check_path(path)?;
        self.records.write().insert(path.to_string(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exercise(store: &dyn SecretStore) {
        assert!(store.list("hdwallets/").unwrap().is_empty());
        assert_eq!(store.get("hdwallets/missing").unwrap(), None);

        store.put("hdwallets/bravo", b"2").unwrap();
        store.put("hdwallets/alpha", b"1").unwrap();
        store.put("hdwallets/nested/deep", b"3").unwrap();
        store.put("hdwallets/nested/deeper", b"4").unwrap();
        store.put("other/alpha", b"x").unwrap();

        assert_eq!(
            store.list("hdwallets/").unwrap(),
            vec!["alpha", "bravo", "nested/"]
        );
        assert_eq!(store.list("hdwallets/nested/").unwrap(), vec!["deep", "deeper"]);
        assert_eq!(store.get("hdwallets/alpha").unwrap(), Some(b"1".to_vec()));

        store.put("hdwallets/alpha", b"updated").unwrap();
        assert_eq!(store.get("hdwallets/alpha").unwrap(), Some(b"updated".to_vec()));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        exercise(&store);
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_sled_store() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path().join("db")).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_sled_store_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");

        {
            let store = SledStore::open(&path).unwrap();
            store.put("hdwallets/kept", b"value").unwrap();
        }

        let reopened = SledStore::open(&path).unwrap();
        assert_eq!(reopened.get("hdwallets/kept").unwrap(), Some(b"value".to_vec()));
        assert_eq!(reopened.list("hdwallets/").unwrap(), vec!["kept"]);
    }

    #[test]
    fn test_unopenable_location_is_a_database_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"occupied").unwrap();

        assert!(matches!(
            SledStore::open(file.join("db")),
            Err(StorageError::DatabaseError(_))
        ));
    }

    #[test]
    fn test_invalid_paths() {
        let store = MemoryStore::new();
        for path in ["", "/abs", "trailing/", "a//b"] {
            assert!(matches!(
                store.put(path, b"x"),
                Err(StorageError::InvalidPath(_))
            ));
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_shared_through_arc() {
        let store: Arc<dyn SecretStore> = Arc::new(MemoryStore::new());
        let clone = Arc::clone(&store);
        clone.put("hdwallets/shared", b"1").unwrap();
        assert_eq!(store.list("hdwallets/").unwrap(), vec!["shared"]);
    }
}
