//! Candidate validation
//!
//! Decides whether a listing is an in-category product for the queried
//! model. Structural checks (accessory, category) always run first; the
//! textual test is either a fuzzy token-overlap score (price sources, which
//! aggregate across variants) or a strict prefix match (single-valued fields
//! such as launch dates, where a neighbouring sub-variant would be wrong).

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::domain::{Candidate, ModelQuery, RejectionReason, normalize_text};
use crate::infrastructure::config::MatchingConfig;
use crate::infrastructure::site_profiles::MatchMode;

/// Storage / battery capacity tokens such as `128 gb`, `8gb ram`, `5000mah`.
static CAPACITY_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d+\s*(?:gb|tb|mb|mah)\b(?:\s+(?:ram|rom|storage))?").expect("capacity regex is valid")
});

/// Tolerance for comparing a ratio against the threshold
const RATIO_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept,
    Reject(RejectionReason),
}

impl Verdict {
    pub const fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

#[derive(Debug, Clone)]
pub struct CandidateValidator {
    mode: MatchMode,
    threshold: f64,
    reject_unrequested_variants: bool,
    allowed_qualifiers: HashSet<String>,
    variant_keywords: HashSet<String>,
    noise_words: HashSet<String>,
}

impl CandidateValidator {
    pub fn new(mode: MatchMode, matching: &MatchingConfig) -> Self {
        let set = |words: &[String]| -> HashSet<String> { words.iter().map(|w| normalize_text(w)).collect() };
        Self {
            mode,
            threshold: matching.match_threshold,
            reject_unrequested_variants: matching.reject_unrequested_variants,
            allowed_qualifiers: set(&matching.allowed_qualifiers),
            variant_keywords: set(&matching.variant_keywords),
            noise_words: set(&matching.noise_words),
        }
    }

    pub const fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Accept or reject `candidate` for `query`.
    pub fn validate(&self, candidate: &Candidate, query: &ModelQuery) -> Verdict {
        let verdict = self.decide(candidate, query);
        if let Verdict::Reject(reason) = &verdict {
            debug!("❌ Rejected '{}' for '{}': {}", candidate.title, query, reason);
        }
        verdict
    }

    fn decide(&self, candidate: &Candidate, query: &ModelQuery) -> Verdict {
        if candidate.is_accessory {
            return Verdict::Reject(RejectionReason::Accessory);
        }
        if !candidate.category_signal {
            return Verdict::Reject(RejectionReason::WrongCategory);
        }

        match self.mode {
            MatchMode::TokenOverlap => self.token_overlap(&candidate.title, query),
            MatchMode::StrictPrefix => self.strict_prefix(&candidate.title, query),
        }
    }

    /// Share of query tokens present in the title, after noise and capacity
    /// tokens are removed from both sides.
    pub fn overlap_ratio(&self, title: &str, query: &ModelQuery) -> f64 {
        let (query_tokens, title_tokens) = self.scoring_tokens(title, query);
        if query_tokens.is_empty() {
            return 0.0;
        }
        let title_set: HashSet<&str> = title_tokens.iter().map(String::as_str).collect();
        let hits = query_tokens.iter().filter(|t| title_set.contains(t.as_str())).count();
        hits as f64 / query_tokens.len() as f64
    }

    fn scoring_tokens(&self, title: &str, query: &ModelQuery) -> (Vec<String>, Vec<String>) {
        let query_all = tokens(&query.normalized());
        let title_all = tokens(title);

        let query_kept = self.without_noise(&query_all);
        if query_kept.is_empty() {
            // The query is made of noise words only; compare unfiltered.
            return (query_all, title_all);
        }
        (query_kept, self.without_noise(&title_all))
    }

    fn without_noise(&self, tokens: &[String]) -> Vec<String> {
        tokens.iter().filter(|t| !self.noise_words.contains(*t)).cloned().collect()
    }

    fn token_overlap(&self, title: &str, query: &ModelQuery) -> Verdict {
        let ratio = self.overlap_ratio(title, query);
        if ratio + RATIO_EPSILON < self.threshold {
            return Verdict::Reject(RejectionReason::BelowThreshold {
                ratio,
                threshold: self.threshold,
            });
        }

        if self.reject_unrequested_variants {
            let requested: HashSet<&str> = query.search_tokens().iter().map(String::as_str).collect();
            if let Some(token) = tokens(title)
                .into_iter()
                .find(|t| self.variant_keywords.contains(t) && !requested.contains(t.as_str()))
            {
                return Verdict::Reject(RejectionReason::UnrequestedVariant { token });
            }
        }

        Verdict::Accept
    }

    fn strict_prefix(&self, title: &str, query: &ModelQuery) -> Verdict {
        let title_tokens = tokens(title);
        let mut query_tokens = tokens(&query.normalized());
        if query_tokens.is_empty() {
            query_tokens = query.search_tokens().to_vec();
        }

        if !title_tokens.starts_with(&query_tokens) {
            return Verdict::Reject(RejectionReason::PrefixMismatch);
        }

        // Qualifiers such as "5g" may follow the model name; the first
        // token after them must not name another sub-variant.
        let next = title_tokens[query_tokens.len()..]
            .iter()
            .find(|t| !self.allowed_qualifiers.contains(*t));

        match next {
            Some(token) if self.variant_keywords.contains(token) => {
                Verdict::Reject(RejectionReason::UnrequestedVariant { token: token.clone() })
            }
            _ => Verdict::Accept,
        }
    }
}

/// Normalized tokens with capacity specs removed.
fn tokens(text: &str) -> Vec<String> {
    let normalized = normalize_text(text);
    CAPACITY_TOKEN
        .replace_all(&normalized, " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
