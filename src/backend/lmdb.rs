//! LMDB Backend Module
//!
//! Entry storage in an embedded LMDB database: the document-store option
//! without an external server. One write transaction per mutation gives the
//! same atomic-commit guarantee the file backend gets from rename.

use std::fs;
use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tracing::{debug, warn};

use crate::backend::StorageBackend;
use crate::entry::{CacheEntry, Metadata};
use crate::error::StorageError;

// == LMDB Backend ==
/// Entry storage in a single LMDB database under the cache directory.
pub struct LmdbBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
    strict: bool,
}

impl LmdbBackend {
    // == Constructor ==
    /// Opens (or creates) the database under `dir`.
    ///
    /// # Arguments
    /// * `dir` - Directory that holds the LMDB environment
    /// * `map_size_mb` - Memory-map size in megabytes; bounds the database
    /// * `strict` - Surface corrupt records instead of self-healing
    pub fn open(dir: &Path, map_size_mb: usize, strict: bool) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;

        // SAFETY: opening an LMDB environment is unsafe because the same
        // path must not be memory-mapped twice by one process. heed refuses
        // a second open of a live environment, and this backend keeps the
        // only handle.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(dir)?
        };

        let mut wtxn = env.write_txn()?;
        let db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, None)?;
        wtxn.commit()?;

        debug!(
            "LMDB backend opened at {} with {} MB map",
            dir.display(),
            map_size_mb
        );
        Ok(Self { env, db, strict })
    }

    /// Decodes a record, applying the corruption contract.
    fn decode(&self, key: &str, bytes: &[u8]) -> Result<Option<CacheEntry>, StorageError> {
        match serde_json::from_slice::<CacheEntry>(bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) if self.strict => Err(StorageError::Corrupt {
                key: key.to_string(),
                reason: err.to_string(),
            }),
            Err(err) => {
                warn!("Removing corrupt cache record '{}': {}", key, err);
                self.delete(key)?;
                Ok(None)
            }
        }
    }

    fn encode(key: &str, entry: &CacheEntry) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(entry).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })
    }
}

impl StorageBackend for LmdbBackend {
    fn put(&self, key: &str, entry: &CacheEntry) -> Result<(), StorageError> {
        let bytes = Self::encode(key, entry)?;
        let mut wtxn = self.env.write_txn()?;
        self.db.put(&mut wtxn, key.as_bytes(), &bytes)?;
        wtxn.commit()?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        let rtxn = self.env.read_txn()?;
        let raw = self.db.get(&rtxn, key.as_bytes())?.map(<[u8]>::to_vec);
        drop(rtxn);

        match raw {
            Some(bytes) => self.decode(key, &bytes),
            None => Ok(None),
        }
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let rtxn = self.env.read_txn()?;
        Ok(self.db.get(&rtxn, key.as_bytes())?.is_some())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut wtxn = self.env.write_txn()?;
        self.db.delete(&mut wtxn, key.as_bytes())?;
        wtxn.commit()?;
        Ok(())
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
        let mut corrupt = Vec::new();

        let rtxn = self.env.read_txn()?;
        for item in self.db.iter(&rtxn)? {
            let (key_bytes, value_bytes) = item?;
            let key = String::from_utf8_lossy(key_bytes).into_owned();
            match serde_json::from_slice::<CacheEntry>(value_bytes) {
                Ok(entry) => found.push((key, entry.metadata)),
                Err(err) if self.strict => {
                    return Err(StorageError::Corrupt {
                        key,
                        reason: err.to_string(),
                    })
                }
                Err(err) => {
                    warn!("Removing corrupt cache record '{}': {}", key, err);
                    corrupt.push(key);
                }
            }
        }
        drop(rtxn);

        for key in corrupt {
            self.delete(&key)?;
        }
        Ok(found)
    }
}
