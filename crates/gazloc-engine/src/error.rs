use gazloc_cache::StorageError;
use gazloc_core::VendorId;
use gazloc_remote::RemoteError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("quantity must be at least 1")]
    ZeroQuantity,

    #[error("vendor {vendor} does not offer {brand} / {bottle_type}")]
    NotOffered {
        vendor: VendorId,
        brand: String,
        bottle_type: String,
    },

    #[error("vendor {vendor} lists no price for {brand} / {bottle_type}")]
    NoPrice {
        vendor: VendorId,
        brand: String,
        bottle_type: String,
    },

    #[error("total for {quantity} x {unit_price} is out of range")]
    TotalOverflow { unit_price: Decimal, quantity: u32 },
}

/// Everything a directory session reports to its error listeners.
///
/// None of these stop the session. Network and storage failures leave the
/// vendor set as it was; a location failure only disables distance ranking.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("remote directory error: {0}")]
    Network(#[from] RemoteError),

    #[error("cache error: {0}")]
    Storage(#[from] StorageError),

    #[error("location error: {0}")]
    Location(#[from] LocationError),

    #[error("unknown vendor {0}")]
    UnknownVendor(VendorId),

    #[error("directory session is closed")]
    Closed,
}
