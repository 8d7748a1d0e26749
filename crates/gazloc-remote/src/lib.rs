//! Remote vendor directory: full listing plus a change feed.

pub mod client;
pub mod error;
pub(crate) mod retry;
pub mod source;
pub mod subscription;
pub mod wire;

pub use client::{RemoteConfig, RemoteDirectoryClient};
pub use error::{ParseError, RemoteError};
pub use source::RemoteDirectory;
pub use subscription::Subscription;
