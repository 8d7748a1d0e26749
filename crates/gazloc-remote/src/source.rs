use std::future::Future;

use gazloc_core::{ChangeEvent, VendorSet};

use crate::error::RemoteError;
use crate::subscription::Subscription;

/// The authoritative vendor list plus its change feed.
///
/// Implemented over HTTP by [`crate::RemoteDirectoryClient`]; tests supply
/// in-process fakes.
pub trait RemoteDirectory: Send + Sync + 'static {
    /// Full listing of the vendor table.
    fn fetch_all(&self) -> impl Future<Output = Result<VendorSet, RemoteError>> + Send;

    /// Opens the change feed. Events are delivered in server order through
    /// `on_event`; disconnects are reported through `on_error` and the feed
    /// reopens itself until the returned handle is cancelled.
    fn subscribe<E, F>(&self, on_event: E, on_error: F) -> Subscription
    where
        E: FnMut(ChangeEvent) + Send + 'static,
        F: FnMut(RemoteError) + Send + 'static;
}
