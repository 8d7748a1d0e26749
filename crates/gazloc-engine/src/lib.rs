//! Vendor directory engine: reconciliation, location tracking, ranking,
//! search, quotes, and the session that drives them.

pub mod directory;
pub mod error;
pub mod location;
pub mod quote;
pub mod ranking;
pub mod reconciler;
pub mod search;

pub use directory::{DirectoryBuilder, DirectoryHandle, DirectoryStatus, LocationStatus};
pub use error::{DirectoryError, LocationError, QuoteError};
pub use location::{
    ChannelPositionSource, Fix, FixFeed, FixSender, LocationTracker, PermissionStatus,
    PositionSource, TrackerHandle, WatchOptions,
};
pub use quote::{quote_order, OrderQuote};
pub use ranking::{rank, rank_set, Filters, RankedVendor};
pub use reconciler::{merge, Reconciler, SnapshotOrigin, Transition};
pub use search::{ranked_view, FuzzyMatcher, DEFAULT_FUZZY_THRESHOLD};
