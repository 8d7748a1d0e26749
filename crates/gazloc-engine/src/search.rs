//! Approximate text search over vendor name, location label and brands.
//!
//! Scoring is Jaro-Winkler similarity on normalised tokens. Each query token
//! takes its best score against the searchable fields (a substring hit counts
//! as 1.0); the record score is the mean over query tokens. A record matches
//! when `1 - score <= threshold`.

use gazloc_core::{Position, VendorRecord, VendorSet};

use crate::ranking::{rank, Filters, RankedVendor};

/// Maximum dissimilarity accepted by default.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatcher {
    threshold: f64,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_FUZZY_THRESHOLD)
    }
}

impl FuzzyMatcher {
    /// `threshold` is clamped to `0.0..=1.0`; a non-finite value falls back
    /// to the default.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        let threshold = if threshold.is_finite() {
            threshold.clamp(0.0, 1.0)
        } else {
            DEFAULT_FUZZY_THRESHOLD
        };
        Self { threshold }
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Similarity of `record` to `query` in `0.0..=1.0`. A blank query
    /// scores 1.0.
    #[must_use]
    pub fn score(&self, query: &str, record: &VendorRecord) -> f64 {
        let query = normalize(query);
        let tokens: Vec<&str> = query.split_whitespace().collect();
        if tokens.is_empty() {
            return 1.0;
        }

        let fields: Vec<String> = std::iter::once(record.name.as_str())
            .chain(record.location_label.as_deref())
            .chain(record.brands.iter().map(String::as_str))
            .map(normalize)
            .filter(|f| !f.is_empty())
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let count = tokens.len() as f64;
        tokens
            .iter()
            .map(|token| best_token_score(token, &fields))
            .sum::<f64>()
            / count
    }

    #[must_use]
    pub fn matches(&self, query: &str, record: &VendorRecord) -> bool {
        1.0 - self.score(query, record) <= self.threshold
    }
}

fn best_token_score(token: &str, fields: &[String]) -> f64 {
    let mut best = 0.0_f64;
    for field in fields {
        if field.contains(token) {
            return 1.0;
        }
        best = best.max(strsim::jaro_winkler(token, field));
        for word in field.split_whitespace() {
            best = best.max(strsim::jaro_winkler(token, word));
        }
    }
    best
}

/// Lowercases and strips the accents common in West African French place
/// and business names, so "Dépôt" and "depot" compare equal.
fn normalize(text: &str) -> String {
    text.trim()
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'à' | 'â' | 'ä' | 'á' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' | 'í' => 'i',
            'ô' | 'ö' | 'ó' => 'o',
            'ù' | 'û' | 'ü' | 'ú' => 'u',
            'ç' => 'c',
            '-' | '_' | ',' | '.' | '\'' => ' ',
            other => other,
        })
        .collect()
}

/// The full consumer view: search narrows, filters select, distance orders.
/// A blank query does not narrow.
#[must_use]
pub fn ranked_view(
    vendors: &VendorSet,
    position: Option<Position>,
    query: &str,
    filters: &Filters,
    matcher: &FuzzyMatcher,
) -> Vec<RankedVendor> {
    if query.trim().is_empty() {
        return rank(vendors.iter(), position, filters);
    }
    let hits = vendors.iter().filter(|record| matcher.matches(query, record));
    rank(hits, position, filters)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn sample() -> VendorSet {
        VendorSet::from_records([
            VendorRecord::new(1, "Dépôt Akpakpa")
                .with_location_label("Akpakpa, Cotonou")
                .with_offer("ORIX", "large", Decimal::new(3500, 0)),
            VendorRecord::new(2, "Gaz Express")
                .with_location_label("Porto-Novo")
                .with_offer("BENIN PETRO", "small", Decimal::new(1800, 0)),
            VendorRecord::new(3, "Chez Maman Sika").with_location_label("Godomey"),
        ])
    }

    fn names(view: &[RankedVendor]) -> Vec<&str> {
        view.iter().map(|r| r.record.name.as_str()).collect()
    }

    #[test]
    fn misspelled_brand_still_matches() {
        let view = ranked_view(&sample(), None, "oriks", &Filters::any(), &FuzzyMatcher::default());
        assert_eq!(names(&view), ["Dépôt Akpakpa"]);
    }

    #[test]
    fn nonsense_query_returns_nothing() {
        let view = ranked_view(&sample(), None, "xyz123", &Filters::any(), &FuzzyMatcher::default());
        assert!(view.is_empty());
    }

    #[test]
    fn blank_query_returns_filtered_set() {
        let set = sample();
        assert_eq!(ranked_view(&set, None, "   ", &Filters::any(), &FuzzyMatcher::default()).len(), 3);
        let orix = ranked_view(&set, None, "", &Filters::new(["ORIX"], ["large"]), &FuzzyMatcher::default());
        assert_eq!(names(&orix), ["Dépôt Akpakpa"]);
    }

    #[test]
    fn location_label_and_accents_are_searchable() {
        let set = sample();
        let m = FuzzyMatcher::default();
        assert_eq!(names(&ranked_view(&set, None, "porto novo", &Filters::any(), &m)), ["Gaz Express"]);
        assert_eq!(names(&ranked_view(&set, None, "depot", &Filters::any(), &m)), ["Dépôt Akpakpa"]);
    }

    #[test]
    fn substring_scores_full_similarity() {
        let record = VendorRecord::new(1, "Gaz Express");
        assert!((FuzzyMatcher::default().score("expr", &record) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_threshold_requires_exact_tokens() {
        let strict = FuzzyMatcher::new(0.0);
        let record = VendorRecord::new(1, "Gaz Express");
        assert!(strict.matches("express", &record));
        assert!(!strict.matches("expres5", &record));
    }

    #[test]
    fn threshold_is_clamped() {
        assert!((FuzzyMatcher::new(4.0).threshold() - 1.0).abs() < f64::EPSILON);
        assert!((FuzzyMatcher::new(f64::NAN).threshold() - DEFAULT_FUZZY_THRESHOLD).abs() < f64::EPSILON);
    }
}
