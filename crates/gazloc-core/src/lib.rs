pub mod app_config;
pub mod catalog;
pub mod config;
pub mod geo;
pub mod model;

use thiserror::Error;

pub use app_config::AppConfig;
pub use catalog::{load_catalog, parse_catalog, BottleTypeEntry, BrandEntry, Catalog, DefaultFilter};
pub use config::{load_app_config, load_app_config_from_env};
pub use geo::{distance, format_distance, EARTH_RADIUS_M};
pub use model::{names_match, ChangeEvent, Position, VendorId, VendorRecord, VendorSet};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read catalogue file {path}: {source}")]
    CatalogFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalogue file: {0}")]
    CatalogFileParse(#[source] serde_yaml::Error),

    #[error("catalogue validation failed: {0}")]
    Validation(String),
}
