pub mod error;
pub mod store;

pub use error::StorageError;
pub use store::{
    CacheStore, FileCacheStore, MemoryCacheStore, ONBOARDING_SLOT, SNAPSHOT_VERSION, VENDORS_SLOT,
};
