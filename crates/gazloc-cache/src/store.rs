//! Durable snapshot storage for the vendor set.
//!
//! The store persists whole snapshots only. It does not deduplicate writes;
//! the reconciler only saves after a transition that actually changed the set.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use gazloc_core::VendorSet;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Slot holding the serialized vendor set.
pub const VENDORS_SLOT: &str = "vendors_data";

/// Slot holding the "onboarding finished" flag read by the calling screens.
pub const ONBOARDING_SLOT: &str = "onboarding_complete";

/// Current on-disk snapshot format.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Persistence boundary of the reconciler.
pub trait CacheStore: Send + Sync + 'static {
    /// Returns the last saved snapshot, or `None` when nothing was ever saved.
    fn load(&self) -> impl Future<Output = Result<Option<VendorSet>, StorageError>> + Send;

    /// Overwrites the stored snapshot with `vendors`.
    fn save(&self, vendors: &VendorSet) -> impl Future<Output = Result<(), StorageError>> + Send;
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    vendors: &'a VendorSet,
}

#[derive(Deserialize)]
struct SnapshotIn {
    version: u32,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
    vendors: serde_json::Value,
}

/// File-backed store: one JSON file per slot inside `dir`.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{slot}.json"))
    }

    /// Reads the onboarding flag. An absent slot reads as `false`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the slot exists but cannot be read or parsed.
    pub async fn is_onboarding_complete(&self) -> Result<bool, StorageError> {
        let path = self.slot_path(ONBOARDING_SLOT);
        match read_slot(&path).await? {
            Some(bytes) => serde_json::from_slice::<bool>(&bytes).map_err(|e| {
                StorageError::Corrupt {
                    path: path.display().to_string(),
                    source: e,
                }
            }),
            None => Ok(false),
        }
    }

    /// Writes the onboarding flag.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the slot cannot be written.
    pub async fn set_onboarding_complete(&self, complete: bool) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(&complete).map_err(StorageError::Encode)?;
        self.write_slot(ONBOARDING_SLOT, &bytes).await
    }

    /// Writes to a temporary sibling and renames it over the slot so a crash
    /// mid-write never leaves a truncated snapshot behind.
    async fn write_slot(&self, slot: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let io_err = |path: &Path, source: std::io::Error| StorageError::Io {
            path: path.display().to_string(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_err(&self.dir, e))?;

        let path = self.slot_path(slot);
        let tmp = self.dir.join(format!("{slot}.json.tmp"));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_err(&path, e))?;
        Ok(())
    }
}

async fn read_slot(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

impl CacheStore for FileCacheStore {
    async fn load(&self) -> Result<Option<VendorSet>, StorageError> {
        let path = self.slot_path(VENDORS_SLOT);
        let Some(bytes) = read_slot(&path).await? else {
            tracing::debug!(path = %path.display(), "no cached vendor snapshot");
            return Ok(None);
        };

        let corrupt = |source| StorageError::Corrupt {
            path: path.display().to_string(),
            source,
        };

        let snapshot: SnapshotIn = serde_json::from_slice(&bytes).map_err(corrupt)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StorageError::IncompatibleVersion {
                path: path.display().to_string(),
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        let vendors: VendorSet = serde_json::from_value(snapshot.vendors).map_err(corrupt)?;

        tracing::debug!(
            path = %path.display(),
            vendors = vendors.len(),
            saved_at = ?snapshot.saved_at,
            "loaded cached vendor snapshot"
        );
        Ok(Some(vendors))
    }

    async fn save(&self, vendors: &VendorSet) -> Result<(), StorageError> {
        let snapshot = SnapshotOut {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            vendors,
        };
        let bytes = serde_json::to_vec(&snapshot).map_err(StorageError::Encode)?;
        self.write_slot(VENDORS_SLOT, &bytes).await?;
        tracing::debug!(vendors = vendors.len(), "vendor snapshot saved");
        Ok(())
    }
}

/// Process-local store with the same contract as [`FileCacheStore`].
///
/// Used when caching is disabled and by tests, which can make saves fail
/// and count how many writes happened.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    slot: Mutex<Option<VendorSet>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `vendors`, as if saved by a previous run.
    #[must_use]
    pub fn with_snapshot(vendors: VendorSet) -> Self {
        Self {
            slot: Mutex::new(Some(vendors)),
            ..Self::default()
        }
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<VendorSet> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CacheStore for MemoryCacheStore {
    async fn load(&self) -> Result<Option<VendorSet>, StorageError> {
        Ok(self.snapshot())
    }

    async fn save(&self, vendors: &VendorSet) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory store configured to fail saves".to_string(),
            ));
        }
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(vendors.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl<T: CacheStore> CacheStore for std::sync::Arc<T> {
    fn load(&self) -> impl Future<Output = Result<Option<VendorSet>, StorageError>> + Send {
        (**self).load()
    }

    fn save(&self, vendors: &VendorSet) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).save(vendors)
    }
}

#[cfg(test)]
mod tests {
    use gazloc_core::VendorRecord;

    use super::*;

    fn sample() -> VendorSet {
        VendorSet::from_records([VendorRecord::new(1, "A"), VendorRecord::new(2, "B")])
    }

    #[tokio::test]
    async fn memory_store_starts_empty() {
        let store = MemoryCacheStore::new();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryCacheStore::new();
        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(sample()));
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn memory_store_failed_save_keeps_previous_snapshot() {
        let store = MemoryCacheStore::with_snapshot(sample());
        store.set_fail_saves(true);
        let err = store.save(&VendorSet::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert_eq!(store.snapshot(), Some(sample()));
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn arc_store_delegates() {
        let store = std::sync::Arc::new(MemoryCacheStore::new());
        let shared = std::sync::Arc::clone(&store);
        shared.save(&sample()).await.unwrap();
        assert_eq!(store.snapshot(), Some(sample()));
    }
}
