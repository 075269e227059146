// src/filter.rs
//
// Pure evaluation of a listing against a task's filter criteria. No side
// effects; safe to call concurrently from every worker of every task.

use serde::{Deserialize, Serialize};

use crate::listing::Listing;

/// Immutable once a task starts. Price/area bounds are inclusive; word
/// lists match case-insensitively as substrings over title + description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[serde(default)]
    pub min_price: Option<u64>,
    #[serde(default)]
    pub max_price: Option<u64>,
    #[serde(default)]
    pub min_area: Option<f64>,
    #[serde(default)]
    pub max_area: Option<f64>,
    /// Reject on any match.
    #[serde(default)]
    pub stop_words: Vec<String>,
    /// When non-empty, at least one must match.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// When non-empty, the listing location must contain one of these.
    #[serde(default)]
    pub locations: Vec<String>,
}

impl FilterCriteria {
    pub fn validate(&self) -> Result<(), String> {
        if let (Some(lo), Some(hi)) = (self.min_price, self.max_price) {
            if lo > hi {
                return Err(format!("min_price {lo} exceeds max_price {hi}"));
            }
        }
        if let (Some(lo), Some(hi)) = (self.min_area, self.max_area) {
            if lo > hi {
                return Err(format!("min_area {lo} exceeds max_area {hi}"));
            }
        }
        for a in [self.min_area, self.max_area].into_iter().flatten() {
            if !a.is_finite() || a < 0.0 {
                return Err(format!("area bound {a} is not a valid size"));
            }
        }
        Ok(())
    }

    /// Short-circuit, cheapest first: price → area → stop-words →
    /// required keywords → location.
    pub fn matches(&self, listing: &Listing) -> bool {
        if let Some(min) = self.min_price {
            if listing.price.is_none_or(|p| p < min) {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if listing.price.is_some_and(|p| p > max) {
                return false;
            }
        }
        if let Some(min) = self.min_area {
            if listing.area.is_none_or(|a| a < min) {
                return false;
            }
        }
        if let Some(max) = self.max_area {
            if listing.area.is_some_and(|a| a > max) {
                return false;
            }
        }

        let haystack = text_haystack(listing);
        if self.stop_words.iter().any(|w| contains_ci(&haystack, w)) {
            return false;
        }
        if !self.keywords.is_empty() && !self.keywords.iter().any(|w| contains_ci(&haystack, w)) {
            return false;
        }
        if !self.locations.is_empty() {
            let loc = listing.location.as_deref().unwrap_or("").to_lowercase();
            if !self.locations.iter().any(|l| contains_ci(&loc, l)) {
                return false;
            }
        }
        true
    }
}

fn text_haystack(listing: &Listing) -> String {
    let mut s = listing.title.to_lowercase();
    if let Some(d) = &listing.description {
        s.push(' ');
        s.push_str(&d.to_lowercase());
    }
    s
}

fn contains_ci(haystack_lower: &str, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    !needle.is_empty() && haystack_lower.contains(&needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::SourceKind;

    fn listing(price: Option<u64>, area: Option<f64>, title: &str) -> Listing {
        Listing {
            source: SourceKind::Avito,
            source_id: "1".into(),
            title: title.into(),
            description: None,
            price,
            area,
            location: Some("Москва, Арбат".into()),
            url: "https://example".into(),
            published_at: None,
        }
    }

    #[test]
    fn price_below_minimum_always_rejected() {
        let f = FilterCriteria {
            min_price: Some(50_000),
            keywords: vec!["квартира".into()],
            ..Default::default()
        };
        // matches the required keyword, still rejected by price
        assert!(!f.matches(&listing(Some(40_000), None, "квартира у метро")));
        // missing price counts as below minimum
        assert!(!f.matches(&listing(None, None, "квартира у метро")));
    }

    #[test]
    fn stop_word_beats_required_keyword() {
        let f = FilterCriteria {
            stop_words: vec!["Залог".into()],
            keywords: vec!["студия".into()],
            ..Default::default()
        };
        assert!(!f.matches(&listing(Some(1), None, "Студия, залог 2 месяца")));
        assert!(f.matches(&listing(Some(1), None, "Студия без депозита")));
    }

    #[test]
    fn keyword_policy_is_any_of() {
        let f = FilterCriteria {
            keywords: vec!["балкон".into(), "лоджия".into()],
            ..Default::default()
        };
        assert!(f.matches(&listing(None, None, "Квартира с лоджией и балконом")));
        assert!(f.matches(&listing(None, None, "есть балкон")));
        assert!(!f.matches(&listing(None, None, "без удобств")));
    }

    #[test]
    fn area_bounds_are_inclusive_range() {
        let f = FilterCriteria {
            min_area: Some(30.0),
            max_area: Some(60.0),
            ..Default::default()
        };
        assert!(f.matches(&listing(None, Some(45.5), "ok")));
        assert!(!f.matches(&listing(None, Some(29.9), "small")));
        assert!(!f.matches(&listing(None, Some(61.0), "big")));
        // unknown area fails a lower bound, passes a pure upper bound
        assert!(!f.matches(&listing(None, None, "unknown")));
        let upper_only = FilterCriteria {
            max_area: Some(60.0),
            ..Default::default()
        };
        assert!(upper_only.matches(&listing(None, None, "unknown")));
    }

    #[test]
    fn location_constraint_is_substring() {
        let f = FilterCriteria {
            locations: vec!["арбат".into()],
            ..Default::default()
        };
        assert!(f.matches(&listing(None, None, "x")));
        let g = FilterCriteria {
            locations: vec!["Тверская".into()],
            ..Default::default()
        };
        assert!(!g.matches(&listing(None, None, "x")));
    }

    #[test]
    fn empty_criteria_accept_everything() {
        assert!(FilterCriteria::default().matches(&listing(None, None, "anything")));
    }

    #[test]
    fn validate_rejects_inverted_ranges() {
        let f = FilterCriteria {
            min_price: Some(10),
            max_price: Some(5),
            ..Default::default()
        };
        assert!(f.validate().is_err());
        let g = FilterCriteria {
            min_area: Some(-1.0),
            ..Default::default()
        };
        assert!(g.validate().is_err());
    }
}
