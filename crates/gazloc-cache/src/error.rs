use thiserror::Error;

/// Failures of the local cache. None of them are fatal: callers log the
/// error and carry on as if the cache were empty.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode cache snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("corrupt cache slot {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache slot {path} has format version {found}, expected {expected}")]
    IncompatibleVersion {
        path: String,
        found: u32,
        expected: u32,
    },

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}
