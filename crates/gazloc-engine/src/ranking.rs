use std::cmp::Ordering;

use gazloc_core::{distance, names_match, Catalog, Position, VendorRecord, VendorSet};

/// Selected brand / bottle-type combinations.
///
/// The selection is the cross product of both lists; an empty list on
/// either side means "any". Both empty lets every vendor through, including
/// vendors that offer nothing yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub brands: Vec<String>,
    pub bottle_types: Vec<String>,
}

impl Filters {
    #[must_use]
    pub fn new<B, T>(brands: B, bottle_types: T) -> Self
    where
        B: IntoIterator,
        B::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            brands: brands.into_iter().map(Into::into).collect(),
            bottle_types: bottle_types.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// The catalogue's default selection.
    #[must_use]
    pub fn from_catalog(catalog: &Catalog) -> Self {
        Self::new(
            catalog.default_filter.brands.iter().cloned(),
            catalog.default_filter.bottle_types.iter().cloned(),
        )
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.brands.is_empty() && self.bottle_types.is_empty()
    }

    #[must_use]
    pub fn matches(&self, record: &VendorRecord) -> bool {
        if self.is_empty() {
            return true;
        }
        let selected = |wanted: &[String], name: &str| {
            wanted.is_empty() || wanted.iter().any(|w| names_match(w, name))
        };
        record
            .offered_pairs()
            .into_iter()
            .any(|(brand, kind)| selected(&self.brands, brand) && selected(&self.bottle_types, kind))
    }
}

/// One row of a ranked view.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedVendor {
    pub record: VendorRecord,
    /// Meters from the current position, when both ends are known.
    pub distance_m: Option<f64>,
}

/// Filters `vendors` and orders them for display.
///
/// With a valid position the result is ascending by distance, vendors
/// without coordinates last. Ties and the no-position case keep natural
/// order.
#[must_use]
pub fn rank<'a>(
    vendors: impl IntoIterator<Item = &'a VendorRecord>,
    position: Option<Position>,
    filters: &Filters,
) -> Vec<RankedVendor> {
    let origin = position.filter(Position::is_valid);
    let mut ranked: Vec<RankedVendor> = vendors
        .into_iter()
        .filter(|record| filters.matches(record))
        .map(|record| RankedVendor {
            distance_m: origin.zip(record.position()).map(|(a, b)| distance(a, b)),
            record: record.clone(),
        })
        .collect();

    if origin.is_some() {
        // stable: equal keys keep natural order
        ranked.sort_by(|a, b| match (a.distance_m, b.distance_m) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
    }
    ranked
}

/// [`rank`] over a whole set.
#[must_use]
pub fn rank_set(set: &VendorSet, position: Option<Position>, filters: &Filters) -> Vec<RankedVendor> {
    rank(set.iter(), position, filters)
}
