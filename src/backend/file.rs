//! File Backend Module
//!
//! One JSON document per key under the cache directory. Writes go to a
//! process-unique temporary file first and are renamed into place, so a
//! concurrent reader never observes a partially written document and the
//! last writer wins across processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::backend::StorageBackend;
use crate::entry::{CacheEntry, Metadata};
use crate::error::StorageError;
use crate::{FILE_PREFIX, FILE_SUFFIX};

// == File Backend ==
/// Entry storage as one document per key on the local filesystem.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    strict: bool,
    /// Distinguishes temporary files written by this handle.
    tmp_counter: AtomicU64,
}

impl FileBackend {
    // == Constructor ==
    /// Opens the backend rooted at `dir`, creating the directory if needed.
    ///
    /// # Arguments
    /// * `dir` - Directory that holds the cache documents
    /// * `strict` - Surface corrupt documents instead of self-healing
    pub fn open(dir: &Path, strict: bool) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        debug!("File backend opened at {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            strict,
            tmp_counter: AtomicU64::new(0),
        })
    }

    /// Path of the stored document for `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{key}{FILE_SUFFIX}"))
    }

    /// A temporary path unique to this process and write.
    fn tmp_path(&self, key: &str) -> PathBuf {
        let serial = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!(".{key}.{}.{serial}.tmp", process::id()))
    }

    /// Decodes a document, applying the corruption contract: strict mode
    /// surfaces the error, otherwise the document is removed and reported
    /// absent so the next write heals it.
    fn decode(&self, key: &str, path: &Path, bytes: &[u8]) -> Result<Option<CacheEntry>, StorageError> {
        match serde_json::from_slice::<CacheEntry>(bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) if self.strict => Err(StorageError::Corrupt {
                key: key.to_string(),
                reason: err.to_string(),
            }),
            Err(err) => {
                warn!("Removing corrupt cache document '{}': {}", key, err);
                if let Err(remove_err) = fs::remove_file(path) {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        return Err(remove_err.into());
                    }
                }
                Ok(None)
            }
        }
    }
}

impl StorageBackend for FileBackend {
    fn put(&self, key: &str, entry: &CacheEntry) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(entry).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })?;

        // Write-then-rename commits the document atomically.
        let tmp = self.tmp_path(key);
        fs::write(&tmp, &bytes)?;
        if let Err(err) = fs::rename(&tmp, self.entry_path(key)) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        let path = self.entry_path(key);
        match fs::read(&path) {
            Ok(bytes) => self.decode(key, &path, &bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match fs::metadata(self.entry_path(key)) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn touch(&self, key: &str, metadata: &Metadata) -> Result<(), StorageError> {
        match self.get(key)? {
            Some(mut entry) => {
                entry.metadata = metadata.clone();
                self.put(key, &entry)
            }
            None => Ok(()),
        }
    }

    fn scan(&self) -> Result<Vec<(String, Metadata)>, StorageError> {
        let mut found = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(key) = name
                .strip_prefix(FILE_PREFIX)
                .and_then(|n| n.strip_suffix(FILE_SUFFIX))
            else {
                continue;
            };

            match fs::read(&path) {
                Ok(bytes) => {
                    if let Some(entry) = self.decode(key, &path, &bytes)? {
                        found.push((key.to_string(), entry.metadata));
                    }
                }
                // A concurrent delete between listing and reading is fine.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(found)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(value: serde_json::Value) -> CacheEntry {
        CacheEntry::new(Metadata::new(Utc::now()), value)
    }

    fn open_in(dir: &TempDir) -> FileBackend {
        FileBackend::open(dir.path(), false).unwrap()
    }

    #[test]
    fn test_put_creates_document() {
        let dir = TempDir::new().unwrap();
        let backend = open_in(&dir);

        backend.put("square_abc", &entry(json!(9))).unwrap();

        let path = backend.entry_path("square_abc");
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("cache_"));
    }

    #[test]
    fn test_put_and_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let backend = open_in(&dir);
        let stored = entry(json!({"answer": 42}));

        backend.put("k1", &stored).unwrap();
        let loaded = backend.get("k1").unwrap().unwrap();
        assert_eq!(loaded, stored);
    }

    #[test]
    fn test_get_absent() {
        let dir = TempDir::new().unwrap();
        let backend = open_in(&dir);
        assert!(backend.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_exists() {
        let dir = TempDir::new().unwrap();
        let backend = open_in(&dir);

        assert!(!backend.exists("k1").unwrap());
        backend.put("k1", &entry(json!(1))).unwrap();
        assert!(backend.exists("k1").unwrap());
    }

    #[test]
    fn test_delete_is_noop_when_absent() {
        let dir = TempDir::new().unwrap();
        let backend = open_in(&dir);
        backend.delete("nope").unwrap();
    }

    #[test]
    fn test_overwrite_leaves_single_document() {
        let dir = TempDir::new().unwrap();
        let backend = open_in(&dir);

        backend.put("k1", &entry(json!("old"))).unwrap();
        backend.put("k1", &entry(json!("new"))).unwrap();

        assert_eq!(backend.get("k1").unwrap().unwrap().value, json!("new"));
        let documents = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_str()
                    .is_some_and(|n| n.starts_with(FILE_PREFIX))
            })
            .count();
        assert_eq!(documents, 1);
    }

    #[test]
    fn test_no_leftover_tmp_files() {
        let dir = TempDir::new().unwrap();
        let backend = open_in(&dir);

        backend.put("k1", &entry(json!(1))).unwrap();
        backend.put("k1", &entry(json!(2))).unwrap();

        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_str()
                    .is_some_and(|n| n.ends_with(".tmp"))
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_corrupt_document_self_heals() {
        let dir = TempDir::new().unwrap();
        let backend = open_in(&dir);

        let path = backend.entry_path("bad");
        fs::write(&path, b"{ not json").unwrap();

        assert!(backend.get("bad").unwrap().is_none());
        assert!(!path.exists(), "corrupt document should be removed");
    }

    #[test]
    fn test_corrupt_document_strict_mode() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path(), true).unwrap();

        let path = backend.entry_path("bad");
        fs::write(&path, b"{ not json").unwrap();

        let result = backend.get("bad");
        assert!(matches!(result, Err(StorageError::Corrupt { .. })));
        assert!(path.exists(), "strict mode must not remove the document");
    }

    #[test]
    fn test_touch_rewrites_metadata_only() {
        let dir = TempDir::new().unwrap();
        let backend = open_in(&dir);
        let original = entry(json!([1, 2]));

        backend.put("k1", &original).unwrap();
        let refreshed = original
            .metadata
            .refreshed(Utc::now() + chrono::Duration::hours(1));
        backend.touch("k1", &refreshed).unwrap();

        let loaded = backend.get("k1").unwrap().unwrap();
        assert_eq!(loaded.value, json!([1, 2]));
        assert_eq!(loaded.metadata.updated_at, refreshed.updated_at);
    }

    #[test]
    fn test_scan_skips_foreign_files() {
        let dir = TempDir::new().unwrap();
        let backend = open_in(&dir);

        backend.put("k1", &entry(json!(1))).unwrap();
        backend.put("k2", &entry(json!(2))).unwrap();
        fs::write(dir.path().join("notes.txt"), b"unrelated").unwrap();

        let mut keys: Vec<String> = backend
            .scan()
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["k1", "k2"]);
    }

    #[test]
    fn test_scan_heals_corrupt_documents() {
        let dir = TempDir::new().unwrap();
        let backend = open_in(&dir);

        backend.put("good", &entry(json!(1))).unwrap();
        fs::write(backend.entry_path("bad"), b"garbage").unwrap();

        let keys: Vec<String> = backend
            .scan()
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec!["good"]);
        assert!(!backend.entry_path("bad").exists());
    }
}
