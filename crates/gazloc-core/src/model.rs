//! Vendor directory domain types.
//!
//! [`VendorSet`] is the authoritative id → record mapping. It keeps the order
//! in which records were first inserted ("natural order") so that rankings
//! without a distance claim, and ties between vendors without coordinates,
//! stay stable across recomputations.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque vendor identity, stable across sync.
///
/// The remote store hands out integer keys, but string keys are accepted so
/// that a migration to UUIDs does not invalidate existing caches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VendorId {
    Int(i64),
    Text(String),
}

impl std::fmt::Display for VendorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VendorId::Int(id) => write!(f, "{id}"),
            VendorId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for VendorId {
    fn from(id: i64) -> Self {
        VendorId::Int(id)
    }
}

impl From<&str> for VendorId {
    fn from(id: &str) -> Self {
        VendorId::Text(id.to_owned())
    }
}

impl std::str::FromStr for VendorId {
    type Err = std::convert::Infallible;

    /// Integers parse to [`VendorId::Int`]; anything else is kept as text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(trimmed
            .parse::<i64>()
            .map_or_else(|_| VendorId::Text(trimmed.to_owned()), VendorId::Int))
    }
}

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    /// Builds a position, rejecting non-finite or out-of-range coordinates.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let position = Self {
            latitude,
            longitude,
        };
        position.is_valid().then_some(position)
    }

    /// `true` when both coordinates are finite and within WGS-84 bounds.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// One vendor of bottled gas as known to the directory.
///
/// Nested offer maps are kept exactly as received. Nothing here assumes that
/// `prices` agrees with `brands` or `bottle_types`; use [`VendorRecord::offers`]
/// and [`VendorRecord::price`] to read them consistently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorRecord {
    pub id: VendorId,
    #[serde(default)]
    pub name: String,
    /// Free-text location label ("Akpakpa, près du marché").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub brands: BTreeSet<String>,
    /// brand → bottle type → offered.
    #[serde(default)]
    pub bottle_types: BTreeMap<String, BTreeMap<String, bool>>,
    /// brand → bottle type → unit price.
    #[serde(default)]
    pub prices: BTreeMap<String, BTreeMap<String, Decimal>>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl VendorRecord {
    /// Creates a record with only an id and a display name.
    #[must_use]
    pub fn new(id: impl Into<VendorId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location_label: None,
            latitude: None,
            longitude: None,
            brands: BTreeSet::new(),
            bottle_types: BTreeMap::new(),
            prices: BTreeMap::new(),
            image_urls: Vec::new(),
            tel: None,
            email: None,
        }
    }

    #[must_use]
    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    #[must_use]
    pub fn with_location_label(mut self, label: impl Into<String>) -> Self {
        self.location_label = Some(label.into());
        self
    }

    /// Registers a consistent offer: brand membership, type flag and price.
    #[must_use]
    pub fn with_offer(mut self, brand: &str, bottle_type: &str, price: Decimal) -> Self {
        self.brands.insert(brand.to_owned());
        self.bottle_types
            .entry(brand.to_owned())
            .or_default()
            .insert(bottle_type.to_owned(), true);
        self.prices
            .entry(brand.to_owned())
            .or_default()
            .insert(bottle_type.to_owned(), price);
        self
    }

    /// The record's position, if both coordinates are present and valid.
    #[must_use]
    pub fn position(&self) -> Option<Position> {
        Position::new(self.latitude?, self.longitude?)
    }

    /// Whether this vendor offers `bottle_type` bottles of `brand`.
    ///
    /// An explicit `bottle_types` flag wins. Without one, a listed price
    /// counts as an offer. A non-empty `brands` set must contain the brand.
    #[must_use]
    pub fn offers(&self, brand: &str, bottle_type: &str) -> bool {
        if !self.brands.is_empty() && !self.brands.iter().any(|b| names_match(b, brand)) {
            return false;
        }
        match lookup(&self.bottle_types, brand).and_then(|types| lookup(types, bottle_type)) {
            Some(flag) => *flag,
            None => lookup(&self.prices, brand)
                .and_then(|types| lookup(types, bottle_type))
                .is_some(),
        }
    }

    /// Unit price for an offered brand/type pair.
    #[must_use]
    pub fn price(&self, brand: &str, bottle_type: &str) -> Option<Decimal> {
        if !self.offers(brand, bottle_type) {
            return None;
        }
        lookup(&self.prices, brand)
            .and_then(|types| lookup(types, bottle_type))
            .copied()
    }

    /// Every brand/type pair this vendor actually offers.
    #[must_use]
    pub fn offered_pairs(&self) -> Vec<(&str, &str)> {
        let mut candidates: BTreeSet<(&str, &str)> = BTreeSet::new();
        for (brand, types) in &self.bottle_types {
            candidates.extend(types.keys().map(|t| (brand.as_str(), t.as_str())));
        }
        for (brand, types) in &self.prices {
            candidates.extend(types.keys().map(|t| (brand.as_str(), t.as_str())));
        }
        candidates
            .into_iter()
            .filter(|(brand, bottle_type)| self.offers(brand, bottle_type))
            .collect()
    }
}

/// Case-insensitive, whitespace-trimmed comparison used for brand and
/// bottle-type names.
#[must_use]
pub fn names_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn lookup<'a, V>(map: &'a BTreeMap<String, V>, key: &str) -> Option<&'a V> {
    map.get(key)
        .or_else(|| map.iter().find(|(k, _)| names_match(k, key)).map(|(_, v)| v))
}

/// An incremental change notification from the remote store.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Inserted(VendorRecord),
    Updated(VendorRecord),
    Deleted(VendorId),
}

impl ChangeEvent {
    #[must_use]
    pub fn id(&self) -> &VendorId {
        match self {
            ChangeEvent::Inserted(record) | ChangeEvent::Updated(record) => &record.id,
            ChangeEvent::Deleted(id) => id,
        }
    }
}

/// The authoritative id → record mapping, in natural (insertion) order.
///
/// Equality is value-level and ignores order: two sets are equal when they
/// hold the same ids mapped to equal records.
#[derive(Debug, Clone, Default)]
pub struct VendorSet {
    records: Vec<VendorRecord>,
    index: HashMap<VendorId, usize>,
}

impl VendorSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from records; a repeated id replaces the earlier record
    /// but keeps its position.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = VendorRecord>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.upsert(record);
        }
        set
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &VendorId) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &VendorId) -> Option<&VendorRecord> {
        self.index.get(id).map(|&idx| &self.records[idx])
    }

    /// Adds a record whose id is not yet present. Returns `false` (and leaves
    /// the set untouched) when the id already exists.
    pub fn insert(&mut self, record: VendorRecord) -> bool {
        if self.index.contains_key(&record.id) {
            return false;
        }
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
        true
    }

    /// Replaces the record with the same id in place, or appends it.
    /// Returns the previous record, if any.
    pub fn upsert(&mut self, record: VendorRecord) -> Option<VendorRecord> {
        match self.index.get(&record.id) {
            Some(&idx) => Some(std::mem::replace(&mut self.records[idx], record)),
            None => {
                self.index.insert(record.id.clone(), self.records.len());
                self.records.push(record);
                None
            }
        }
    }

    /// Removes a record, preserving the relative order of the rest.
    pub fn remove(&mut self, id: &VendorId) -> Option<VendorRecord> {
        let idx = self.index.remove(id)?;
        let removed = self.records.remove(idx);
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    /// Records in natural order.
    pub fn iter(&self) -> std::slice::Iter<'_, VendorRecord> {
        self.records.iter()
    }

    #[must_use]
    pub fn into_records(self) -> Vec<VendorRecord> {
        self.records
    }
}

impl PartialEq for VendorSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .records
                .iter()
                .all(|record| other.get(&record.id) == Some(record))
    }
}

impl FromIterator<VendorRecord> for VendorSet {
    fn from_iter<T: IntoIterator<Item = VendorRecord>>(iter: T) -> Self {
        Self::from_records(iter)
    }
}

impl<'a> IntoIterator for &'a VendorSet {
    type Item = &'a VendorRecord;
    type IntoIter = std::slice::Iter<'a, VendorRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl Serialize for VendorSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.records)
    }
}

impl<'de> Deserialize<'de> for VendorSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<VendorRecord>::deserialize(deserializer).map(Self::from_records)
    }
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
