//! Mmap-Backed Persistent Store
//!
//! The store keeps every entry in a `HashMap` and mirrors the whole map to
//! a single backing file through a memory-mapped region. Each mutation
//! re-serializes the map as one JSON document and copies it into the
//! region, so a reader of the file always sees a complete snapshot.
//!
//! ## Resize Protocol
//!
//! A mapping cannot outlive a change to the file's length, so growing (or
//! shrinking) the snapshot follows a fixed sequence, kept in one place
//! (`ensure_region`): release the mapping, `set_len` the file, map it
//! again. File and region are resized to the exact document length on
//! every persist, which keeps the on-disk bytes identical to the document
//! and makes reload byte-exact. The alternative — growing the region but
//! never shrinking it — leaves stale bytes after the live document
//! whenever the store shrinks, and pushes the cleanup burden onto the
//! decoder.
//!
//! ## Concurrency
//!
//! One mutex guards the map, the file handle, and the region together.
//! Get, set, delete, and close each hold it for their full duration, so
//! every store operation is atomic relative to every other.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use memmap2::MmapMut;
use thiserror::Error;
use tracing::{debug, info};

/// Region size used when the backing file is brand new (one page).
pub const INITIAL_REGION_SIZE: u64 = 4096;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Get or delete on a key that isn't present
    #[error("no value exists for key {0}")]
    NotFound(String),

    /// Any operation after `close`
    #[error("store is closed")]
    Closed,

    /// A thread panicked while holding the store lock
    #[error("store lock poisoned")]
    LockPoisoned,

    /// File open/stat/resize/map/flush failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot could not be encoded, or the backing file holds
    /// something that is not a snapshot
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Mutable state behind the store's lock: the map and the persistence
/// resources it is mirrored to. `file`/`mmap` are `None` once the store
/// has been closed.
struct StoreInner {
    map: HashMap<String, String>,
    file: Option<File>,
    mmap: Option<MmapMut>,
}

/// A persistent key-value store backed by a memory-mapped file.
///
/// # Thread Safety
///
/// Designed to be wrapped in an `Arc` and shared across connection
/// handler tasks. Every operation takes the internal lock, so operations
/// from different tasks are totally ordered.
///
/// # Example
///
/// ```no_run
/// use mapkv::storage::Store;
///
/// # fn main() -> Result<(), mapkv::storage::StoreError> {
/// let store = Store::open("mapkv.db")?;
/// store.set("name", "Ada")?;
/// assert_eq!(store.get("name")?, "Ada");
/// store.close()?;
/// # Ok(())
/// # }
/// ```
pub struct Store {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl Store {
    /// Opens the store at `path`, creating the backing file if absent.
    ///
    /// An empty file is extended to one page before mapping, because a
    /// zero-length file cannot be mapped. A non-empty file is decoded
    /// into the map; a file holding anything other than a snapshot fails
    /// the open.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let size = file.metadata()?.len();
        if size == 0 {
            file.set_len(INITIAL_REGION_SIZE)?;
        }

        // Safety: the store owns the file for the process's lifetime and
        // all access to the mapping goes through the mutex around it.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let map = if size > 0 {
            decode_snapshot(&mmap)?
        } else {
            HashMap::new()
        };

        info!(
            path = %path.display(),
            keys = map.len(),
            region = mmap.len(),
            "store opened"
        );

        Ok(Self {
            path,
            inner: Mutex::new(StoreInner {
                map,
                file: Some(file),
                mmap: Some(mmap),
            }),
        })
    }

    /// Returns the value stored at `key`. Pure read, no side effects.
    pub fn get(&self, key: &str) -> Result<String, StoreError> {
        let inner = self.lock()?;
        if inner.file.is_none() {
            return Err(StoreError::Closed);
        }

        inner
            .map
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Inserts or overwrites `key`, then persists the whole map.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.file.is_none() {
            return Err(StoreError::Closed);
        }

        inner.map.insert(key.into(), value.into());
        persist(&mut inner)
    }

    /// Removes `key` if present, then persists the whole map.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.file.is_none() {
            return Err(StoreError::Closed);
        }

        if inner.map.remove(key).is_none() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        persist(&mut inner)
    }

    /// Flushes and releases the mapped region and the file handle.
    ///
    /// Every operation after a successful close, including a second
    /// close, fails with [`StoreError::Closed`].
    pub fn close(&self) -> Result<(), StoreError> {
        let mut inner = self.lock()?;

        let mmap = inner.mmap.take().ok_or(StoreError::Closed)?;
        mmap.flush()?;
        drop(mmap);
        inner.file = None;

        debug!(path = %self.path.display(), "store closed");
        Ok(())
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.map.len())
    }

    /// Returns true if the map holds no entries.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Serializes the map and writes the document into the mapped region,
/// resizing file and region first when the document length changed.
fn persist(inner: &mut StoreInner) -> Result<(), StoreError> {
    let document = serde_json::to_vec(&inner.map)?;

    ensure_region(inner, document.len())?;

    let mmap = inner.mmap.as_mut().ok_or(StoreError::Closed)?;
    mmap[..document.len()].copy_from_slice(&document);
    mmap.flush()?;

    Ok(())
}

/// The named resize step: release the mapping, resize the file to `len`,
/// map it again. No-op when the region already has the target length.
fn ensure_region(inner: &mut StoreInner, len: usize) -> Result<(), StoreError> {
    let current = inner.mmap.as_ref().map(|m| m.len());
    if current == Some(len) {
        return Ok(());
    }

    let file = inner.file.as_ref().ok_or(StoreError::Closed)?;

    // The old mapping must not outlive the length change.
    inner.mmap = None;
    file.set_len(len as u64)?;
    let mmap = unsafe { MmapMut::map_mut(file)? };
    inner.mmap = Some(mmap);

    debug!(from = ?current, to = len, "region remapped");
    Ok(())
}

/// Decodes the snapshot document out of the mapped region.
///
/// A region sized at open but never written is all NUL bytes, and the
/// region may carry NUL padding after the document until the first
/// persist truncates it; both are trimmed before decoding. An empty
/// document is an empty map.
fn decode_snapshot(region: &[u8]) -> Result<HashMap<String, String>, StoreError> {
    let end = region.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    let document = &region[..end];

    if document.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(serde_json::from_slice(document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("kv.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_set_and_get() {
        let (_dir, store) = temp_store();

        store.set("key", "value").unwrap();
        assert_eq!(store.get("key").unwrap(), "value");
    }

    #[test]
    fn test_get_missing_key() {
        let (_dir, store) = temp_store();

        let err = store.get("nonexistent").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(ref k) if k == "nonexistent"));
    }

    #[test]
    fn test_overwrite() {
        let (_dir, store) = temp_store();

        store.set("key", "first").unwrap();
        store.set("key", "second").unwrap();
        assert_eq!(store.get("key").unwrap(), "second");
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_delete() {
        let (_dir, store) = temp_store();

        store.set("key", "value").unwrap();
        store.delete("key").unwrap();
        assert!(matches!(store.get("key"), Err(StoreError::NotFound(_))));

        // Already deleted
        assert!(matches!(store.delete("key"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_empty_value() {
        let (_dir, store) = temp_store();

        store.set("key", "").unwrap();
        assert_eq!(store.get("key").unwrap(), "");
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");

        let store = Store::open(&path).unwrap();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        store.close().unwrap();
        drop(store);

        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.get("a").unwrap(), "1");
        assert_eq!(reopened.get("b").unwrap(), "2");
        assert_eq!(reopened.len().unwrap(), 2);
    }

    #[test]
    fn test_fresh_file_is_sized_to_one_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");

        let store = Store::open(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), INITIAL_REGION_SIZE);

        // The first persist truncates to the exact document length.
        store.set("a", "1").unwrap();
        let expected = serde_json::to_vec(&HashMap::from([(
            "a".to_string(),
            "1".to_string(),
        )]))
        .unwrap();
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            expected.len() as u64
        );
    }

    #[test]
    fn test_reopen_before_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");

        // Opened and closed without ever writing: the file is page-sized
        // NUL padding, which decodes as an empty map.
        let store = Store::open(&path).unwrap();
        store.close().unwrap();

        let reopened = Store::open(&path).unwrap();
        assert!(reopened.is_empty().unwrap());
    }

    #[test]
    fn test_growth_beyond_initial_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        let store = Store::open(&path).unwrap();

        let value = "v".repeat(64);
        for i in 0..200 {
            store.set(format!("key:{}", i), value.clone()).unwrap();
        }

        assert!(std::fs::metadata(&path).unwrap().len() > INITIAL_REGION_SIZE);
        for i in 0..200 {
            assert_eq!(store.get(&format!("key:{}", i)).unwrap(), value);
        }

        // Everything survives a reload as well.
        store.close().unwrap();
        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.len().unwrap(), 200);
        assert_eq!(reopened.get("key:0").unwrap(), value);
        assert_eq!(reopened.get("key:199").unwrap(), value);
    }

    #[test]
    fn test_shrink_truncates_to_exact_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        let store = Store::open(&path).unwrap();

        store.set("big", "x".repeat(8192)).unwrap();
        store.set("small", "1").unwrap();
        store.delete("big").unwrap();

        let expected = serde_json::to_vec(&HashMap::from([(
            "small".to_string(),
            "1".to_string(),
        )]))
        .unwrap();
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            expected.len() as u64
        );

        // No stale tail: the shrunken file reloads byte-exact.
        store.close().unwrap();
        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.len().unwrap(), 1);
        assert_eq!(reopened.get("small").unwrap(), "1");
    }

    #[test]
    fn test_corrupt_snapshot_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        std::fs::write(&path, b"this is not a snapshot").unwrap();

        let err = Store::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Snapshot(_)));
    }

    #[test]
    fn test_closed_store_rejects_operations() {
        let (_dir, store) = temp_store();
        store.set("key", "value").unwrap();
        store.close().unwrap();

        assert!(matches!(store.get("key"), Err(StoreError::Closed)));
        assert!(matches!(store.set("key", "v"), Err(StoreError::Closed)));
        assert!(matches!(store.delete("key"), Err(StoreError::Closed)));
        assert!(matches!(store.close(), Err(StoreError::Closed)));
    }

    #[test]
    fn test_concurrent_writers_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("kv.db")).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.set("contested", format!("writer:{}", i)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // The final value is exactly one of the written values, never an
        // interleaving.
        let value = store.get("contested").unwrap();
        assert!((0..8).any(|i| value == format!("writer:{}", i)));

        // And the persisted snapshot agrees with the map.
        store.close().unwrap();
        let reopened = Store::open(store.path()).unwrap();
        assert_eq!(reopened.get("contested").unwrap(), value);
    }

    #[test]
    fn test_concurrent_writers_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("kv.db")).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store
                            .set(format!("key:{}:{}", t, i), format!("value:{}", i))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len().unwrap(), 200);
        assert_eq!(store.get("key:3:49").unwrap(), "value:49");
    }
}
