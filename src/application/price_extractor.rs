//! Price extraction and sanity checking
//!
//! Each price field has an ordered list of selector strategies; the first
//! strategy that yields a plausible value wins. A selling price outside the
//! plausible band is discarded (never clamped). A bad reference price only
//! costs the reference value, never the selling price it came with.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::domain::{
    Availability, ExtractionFailure, Page, PageSource, ReferenceRejection, SelectorSet, Variant,
};
use crate::infrastructure::config::{PriceBounds, PricingConfig};
use crate::infrastructure::site_profiles::SiteProfile;

/// First digit run, commas allowed as grouping separators
static PRICE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d,]*").expect("price regex is valid"));

/// Minimum number of digits for a text to count as a phone price
const MIN_PRICE_DIGITS: usize = 4;

/// Turns a displayed price text into an integer amount.
#[derive(Debug, Clone)]
pub struct PriceTextParser {
    max_len: usize,
    promo_keywords: Vec<String>,
}

impl PriceTextParser {
    pub fn new(max_len: usize, promo_keywords: &[String]) -> Self {
        Self {
            max_len,
            promo_keywords: promo_keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// Integer part of the first number in `text`.
    ///
    /// Returns `None` for over-long texts, promotional texts ("Save ₹2,000")
    /// and numbers with fewer than four digits.
    pub fn parse(&self, text: &str) -> Option<u64> {
        let text = text.trim();
        if text.is_empty() || text.chars().count() > self.max_len {
            return None;
        }

        let lower = text.to_lowercase();
        if self.promo_keywords.iter().any(|k| lower.contains(k.as_str())) {
            return None;
        }

        let digits: String = PRICE_DIGITS.find(text)?.as_str().chars().filter(char::is_ascii_digit).collect();
        if digits.len() < MIN_PRICE_DIGITS {
            return None;
        }
        digits.parse().ok()
    }
}

/// Plausibility rules for extracted prices.
#[derive(Debug, Clone, Copy)]
pub struct PriceSanityChecker {
    bounds: PriceBounds,
    mrp_multiplier_cap: f64,
}

impl PriceSanityChecker {
    pub const fn new(bounds: PriceBounds, mrp_multiplier_cap: f64) -> Self {
        Self { bounds, mrp_multiplier_cap }
    }

    pub fn check_selling(&self, value: u64, url: &str) -> Result<u64, ExtractionFailure> {
        if self.bounds.contains(value) {
            Ok(value)
        } else {
            Err(ExtractionFailure::ImplausiblePrice {
                value,
                min: self.bounds.min,
                max: self.bounds.max,
                url: url.to_string(),
            })
        }
    }

    pub fn check_reference(&self, reference: u64, selling: u64) -> Result<u64, ReferenceRejection> {
        if reference <= selling {
            return Err(ReferenceRejection::NotAboveSelling { reference, selling });
        }
        let cap = (selling as f64 * self.mrp_multiplier_cap).floor() as u64;
        if reference > cap {
            return Err(ReferenceRejection::AboveCap { reference, selling, cap });
        }
        Ok(reference)
    }
}

/// Prices pulled from one variant page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub variant: Variant,
    /// Set when a reference value was found but failed the sanity check
    pub reference_rejection: Option<ReferenceRejection>,
}

#[derive(Debug, Clone)]
pub struct PriceExtractor {
    parser: PriceTextParser,
    checker: PriceSanityChecker,
}

impl PriceExtractor {
    pub fn new(pricing: &PricingConfig) -> Self {
        Self {
            parser: PriceTextParser::new(pricing.max_price_text_len, &pricing.promo_keywords),
            checker: PriceSanityChecker::new(pricing.price_bounds, pricing.mrp_multiplier_cap),
        }
    }

    pub const fn checker(&self) -> &PriceSanityChecker {
        &self.checker
    }

    /// Extract selling and reference prices from a variant page.
    pub fn extract(
        &self,
        source: &dyn PageSource,
        page: &Page,
        profile: &SiteProfile,
        candidate_url: &str,
        variant_label: Option<&str>,
    ) -> Result<Extracted, ExtractionFailure> {
        let mut implausible = None;
        let mut selling = None;

        'strategies: for strategy in profile.selling_price.split() {
            for text in texts(source, page, &strategy) {
                let Some(value) = self.parser.parse(&text) else {
                    continue;
                };
                match self.checker.check_selling(value, &page.url) {
                    Ok(value) => {
                        selling = Some(value);
                        break 'strategies;
                    }
                    Err(failure) => {
                        debug!("Discarding implausible price {} from '{}'", value, strategy.strategies[0]);
                        implausible.get_or_insert(failure);
                    }
                }
            }
        }

        let Some(selling_price) = selling else {
            return Err(implausible.unwrap_or_else(|| ExtractionFailure::NoPrice { url: page.url.clone() }));
        };

        let (reference_price, reference_rejection) = self.reference(source, page, &profile.reference_price, selling_price);
        if let Some(rejection) = &reference_rejection {
            warn!("⚠️ Dropping reference price on {}: {}", page.url, rejection);
        }

        Ok(Extracted {
            variant: Variant {
                candidate_url: candidate_url.to_string(),
                variant_label: variant_label.map(str::to_string),
                selling_price,
                reference_price,
            },
            reference_rejection,
        })
    }

    fn reference(
        &self,
        source: &dyn PageSource,
        page: &Page,
        selectors: &SelectorSet,
        selling: u64,
    ) -> (Option<u64>, Option<ReferenceRejection>) {
        let mut rejection = None;
        for strategy in selectors.split() {
            for text in texts(source, page, &strategy) {
                let Some(value) = self.parser.parse(&text) else {
                    continue;
                };
                match self.checker.check_reference(value, selling) {
                    Ok(value) => return (Some(value), None),
                    Err(e) => rejection = Some(e),
                }
            }
        }
        (None, rejection)
    }

    /// Stock state of a page from the availability strategies.
    pub fn availability(&self, source: &dyn PageSource, page: &Page, profile: &SiteProfile) -> Availability {
        profile
            .availability
            .split()
            .map(|strategy| Availability::from_text(&texts(source, page, &strategy).join(" ")))
            .find(|a| *a != Availability::Unknown)
            .unwrap_or_default()
    }
}

/// Texts for one strategy; a broken selector counts as no match.
fn texts(source: &dyn PageSource, page: &Page, selectors: &SelectorSet) -> Vec<String> {
    source.extract_text(page, selectors).unwrap_or_else(|e| {
        warn!("Selector strategy failed on {}: {}", page.url, e);
        Vec::new()
    })
}
