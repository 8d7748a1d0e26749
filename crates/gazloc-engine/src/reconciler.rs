//! Owner of the authoritative [`VendorSet`].
//!
//! Every mutation goes through here: cache adoption, full snapshots from the
//! remote, and incremental change events. A mutation that changes the set is
//! persisted as a whole snapshot; a no-op is neither persisted nor reported.

use gazloc_cache::{CacheStore, StorageError};
use gazloc_core::{ChangeEvent, VendorSet};

/// Where the current set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    Empty,
    Cache,
    Remote,
}

/// Outcome of one reconciliation step.
#[derive(Debug, Default)]
pub struct Transition {
    pub changed: bool,
    /// Set when the change was applied in memory but could not be saved.
    pub storage_error: Option<StorageError>,
}

/// Applies `event` to `set`. Returns whether the set changed.
///
/// `Inserted` is ignored when the id is present, `Updated` inserts when it
/// is absent, and `Deleted` of an unknown id is a no-op.
pub fn merge(set: &mut VendorSet, event: ChangeEvent) -> bool {
    match event {
        ChangeEvent::Inserted(record) => set.insert(record),
        ChangeEvent::Updated(record) => {
            if set.get(&record.id) == Some(&record) {
                false
            } else {
                set.upsert(record);
                true
            }
        }
        ChangeEvent::Deleted(id) => set.remove(&id).is_some(),
    }
}

#[derive(Debug)]
pub struct Reconciler<S> {
    store: S,
    vendors: VendorSet,
    origin: SnapshotOrigin,
}

impl<S: CacheStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            vendors: VendorSet::new(),
            origin: SnapshotOrigin::Empty,
        }
    }

    #[must_use]
    pub fn vendors(&self) -> &VendorSet {
        &self.vendors
    }

    #[must_use]
    pub fn origin(&self) -> SnapshotOrigin {
        self.origin
    }

    /// Holds data from the cache or the remote and can rank.
    #[must_use]
    pub fn is_warm(&self) -> bool {
        self.origin != SnapshotOrigin::Empty
    }

    /// Adopts the cached snapshot, if any. Returns whether one was adopted.
    ///
    /// # Errors
    ///
    /// Returns the [`StorageError`] from the store; the set stays empty and
    /// the caller proceeds as on a first run.
    pub async fn adopt_cache(&mut self) -> Result<bool, StorageError> {
        match self.store.load().await? {
            Some(cached) => {
                tracing::info!(vendors = cached.len(), "adopted cached vendor set");
                self.vendors = cached;
                self.origin = SnapshotOrigin::Cache;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reconciles a full listing from the remote.
    ///
    /// A cold reconciler adopts and persists unconditionally. A warm one
    /// replaces its set only when the listing differs structurally.
    pub async fn reconcile_snapshot(&mut self, fetched: VendorSet) -> Transition {
        if self.is_warm() && fetched == self.vendors {
            tracing::debug!(vendors = fetched.len(), "remote listing matches current set");
            self.origin = SnapshotOrigin::Remote;
            return Transition::default();
        }

        let was_warm = self.is_warm();
        self.vendors = fetched;
        self.origin = SnapshotOrigin::Remote;
        tracing::info!(
            vendors = self.vendors.len(),
            replaced_cached = was_warm,
            "adopted remote vendor listing"
        );
        self.persist().await
    }

    /// Applies one change event in arrival order.
    pub async fn apply_event(&mut self, event: ChangeEvent) -> Transition {
        let id = event.id().clone();
        if !merge(&mut self.vendors, event) {
            tracing::debug!(vendor = %id, "change event was a no-op");
            return Transition::default();
        }
        tracing::debug!(vendor = %id, vendors = self.vendors.len(), "change event applied");
        self.persist().await
    }

    async fn persist(&self) -> Transition {
        let storage_error = match self.store.save(&self.vendors).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist vendor set, keeping it in memory");
                Some(e)
            }
        };
        Transition {
            changed: true,
            storage_error,
        }
    }
}
