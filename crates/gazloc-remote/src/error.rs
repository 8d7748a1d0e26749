use thiserror::Error;

/// Network-side failures of the remote directory. Recovered by retry or
/// resubscription; never fatal to the caller.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by remote directory (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("change feed {url} closed by server")]
    StreamClosed { url: String },

    #[error("invalid remote URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// A single row or envelope that could not be interpreted at all.
///
/// Field-level problems never surface as errors: the field is dropped and
/// the record kept. Only rows lacking an identity end up here, and callers
/// log and skip them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("vendor row is not a JSON object")]
    NotAnObject,

    #[error("vendor row has no usable id")]
    MissingId,

    #[error("change envelope is not valid JSON: {0}")]
    InvalidEnvelope(String),
}
