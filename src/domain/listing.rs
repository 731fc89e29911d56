//! Listing-side value types: candidates, variants and price observations

use serde::{Deserialize, Serialize};

use crate::domain::model_query::{ModelQuery, normalize_text};

/// A search-result (or opened product page) that may refer to the queried model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    /// `true` when category metadata places the listing in the phone category
    /// (or says nothing either way)
    pub category_signal: bool,
    pub is_accessory: bool,
}

/// Keyword-driven category and accessory classification.
///
/// Category is decided from structural metadata first (breadcrumbs); the
/// leading page text is only consulted when breadcrumbs are silent, and an
/// undecided listing counts as in-category.
#[derive(Debug, Clone)]
pub struct ListingClassifier {
    accessory_keywords: Vec<String>,
    category_keywords: Vec<String>,
    foreign_category_keywords: Vec<String>,
}

/// Leading slice of body text inspected for foreign-category hints.
const FOREIGN_HINT_WINDOW: usize = 500;
/// Leading slice of body text in which a phone keyword overrides a foreign hint.
const PHONE_HINT_WINDOW: usize = 300;

impl ListingClassifier {
    pub fn new(
        accessory_keywords: Vec<String>,
        category_keywords: Vec<String>,
        foreign_category_keywords: Vec<String>,
    ) -> Self {
        let lower = |v: Vec<String>| -> Vec<String> { v.into_iter().map(|k| k.to_lowercase()).collect() };
        Self {
            accessory_keywords: lower(accessory_keywords),
            category_keywords: lower(category_keywords),
            foreign_category_keywords: lower(foreign_category_keywords),
        }
    }

    /// Whether the title names an accessory rather than a handset.
    pub fn is_accessory(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.accessory_keywords.iter().any(|k| title.contains(k.as_str()))
    }

    /// Category signal from breadcrumbs, falling back to the leading page text.
    pub fn category_signal(&self, breadcrumbs: &[String], body_text: &str) -> bool {
        if !breadcrumbs.is_empty() {
            let trail = breadcrumbs.join(" ").to_lowercase();
            if self.category_keywords.iter().any(|k| trail.contains(k.as_str())) {
                return true;
            }
            if self.foreign_category_keywords.iter().any(|k| trail.contains(k.as_str())) {
                return false;
            }
        }

        let body = body_text.to_lowercase();
        let head = prefix_chars(&body, FOREIGN_HINT_WINDOW);
        let phone_head = prefix_chars(&body, PHONE_HINT_WINDOW);
        let foreign = self.foreign_category_keywords.iter().any(|k| head.contains(k.as_str()));
        let phone = self.category_keywords.iter().any(|k| phone_head.contains(k.as_str()));

        !(foreign && !phone)
    }

    /// Build a candidate from raw listing data.
    pub fn classify(&self, title: &str, url: &str, breadcrumbs: &[String], body_text: &str) -> Candidate {
        Candidate {
            title: title.trim().to_string(),
            url: url.to_string(),
            category_signal: self.category_signal(breadcrumbs, body_text),
            is_accessory: self.is_accessory(title),
        }
    }
}

fn prefix_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Entry point to one purchasable configuration of an accepted candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantLink {
    pub url: String,
    pub label: Option<String>,
    /// `true` when this is the candidate page itself (no variants were found)
    pub is_self: bool,
}

/// Prices extracted from one variant page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub candidate_url: String,
    pub variant_label: Option<String>,
    pub selling_price: u64,
    pub reference_price: Option<u64>,
}

/// Stock state reported by a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Availability {
    InStock,
    OutOfStock,
    #[default]
    Unknown,
}

impl Availability {
    /// Classify a free-form availability text.
    pub fn from_text(text: &str) -> Self {
        const OUT: [&str; 4] = ["out of stock", "unavailable", "sold out", "currently not available"];
        const IN: [&str; 5] = ["in stock", "only", "add to cart", "buy now", "available"];

        let text = normalize_text(text);

        if OUT.iter().any(|k| text.contains(k)) {
            Self::OutOfStock
        } else if IN.iter().any(|k| text.contains(k)) {
            Self::InStock
        } else {
            Self::Unknown
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InStock => "InStock",
            Self::OutOfStock => "OutOfStock",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated price point for a model.
///
/// Construction goes through the sanity checker, so `selling_price` is
/// inside the plausible band and `reference_price`, when present, is
/// strictly above it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub model: ModelQuery,
    pub selling_price: u64,
    pub reference_price: Option<u64>,
    pub candidate_url: String,
    pub variant_label: Option<String>,
    pub availability: Availability,
}

impl PriceObservation {
    pub fn from_variant(model: &ModelQuery, variant: Variant, availability: Availability) -> Self {
        Self {
            model: model.clone(),
            selling_price: variant.selling_price,
            reference_price: variant.reference_price,
            candidate_url: variant.candidate_url,
            variant_label: variant.variant_label,
            availability,
        }
    }
}
