//! Product catalogue: the gas brands and bottle sizes the directory knows
//! about, plus the filter the listing starts with.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::names_match;
use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandEntry {
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleTypeEntry {
    /// Wire key stored in vendor rows (`large`, `small`).
    pub key: String,
    /// Display label shown to customers.
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultFilter {
    #[serde(default)]
    pub brands: Vec<String>,
    #[serde(default)]
    pub bottle_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    pub brands: Vec<BrandEntry>,
    pub bottle_types: Vec<BottleTypeEntry>,
    #[serde(default)]
    pub default_filter: DefaultFilter,
}

impl Catalog {
    /// Canonical spelling of a brand, matched case-insensitively.
    #[must_use]
    pub fn brand(&self, name: &str) -> Option<&BrandEntry> {
        self.brands.iter().find(|b| names_match(&b.name, name))
    }

    /// Bottle type by key or by display label.
    #[must_use]
    pub fn bottle_type(&self, key_or_label: &str) -> Option<&BottleTypeEntry> {
        self.bottle_types
            .iter()
            .find(|t| names_match(&t.key, key_or_label) || names_match(&t.label, key_or_label))
    }
}

/// Load and validate the product catalogue from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_catalog(path: &Path) -> Result<Catalog, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_catalog(&content)
}

/// Parse and validate a catalogue from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_catalog(content: &str) -> Result<Catalog, ConfigError> {
    let catalog: Catalog = serde_yaml::from_str(content).map_err(ConfigError::CatalogFileParse)?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

fn validate_catalog(catalog: &Catalog) -> Result<(), ConfigError> {
    if catalog.brands.is_empty() {
        return Err(ConfigError::Validation(
            "catalogue must list at least one brand".to_string(),
        ));
    }

    let mut seen_brands = HashSet::new();
    for brand in &catalog.brands {
        if brand.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "brand name must be non-empty".to_string(),
            ));
        }
        if !seen_brands.insert(brand.name.trim().to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate brand name: '{}'",
                brand.name
            )));
        }
    }

    let mut seen_types = HashSet::new();
    for bottle_type in &catalog.bottle_types {
        if bottle_type.key.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "bottle type '{}' has an empty key",
                bottle_type.label
            )));
        }
        if !seen_types.insert(bottle_type.key.trim().to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate bottle type key: '{}'",
                bottle_type.key
            )));
        }
    }

    for brand in &catalog.default_filter.brands {
        if catalog.brand(brand).is_none() {
            return Err(ConfigError::Validation(format!(
                "default filter references unknown brand '{brand}'"
            )));
        }
    }
    for key in &catalog.default_filter.bottle_types {
        if !catalog
            .bottle_types
            .iter()
            .any(|t| names_match(&t.key, key))
        {
            return Err(ConfigError::Validation(format!(
                "default filter references unknown bottle type '{key}'"
            )));
        }
    }

    Ok(())
}
