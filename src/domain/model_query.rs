//! Normalized search query derived from a canonical model name.

use serde::{Deserialize, Serialize};

use crate::domain::errors::IngestError;

/// Lower-case, strip punctuation, collapse whitespace.
///
/// Every non-alphanumeric character becomes a token separator, so
/// `"Galaxy S23-FE (5G)"` normalizes to `"galaxy s23 fe 5g"`.
pub fn normalize_text(raw: &str) -> String {
    let mut lowered = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_alphanumeric() {
            lowered.extend(c.to_lowercase().filter(|l| l.is_alphanumeric()));
        } else {
            lowered.push(' ');
        }
    }
    lowered
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapse interior whitespace of a model name without changing its case.
///
/// This is the identifier used to track a model across runs.
pub fn model_key(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Immutable query for one model, built once from the input list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelQuery {
    /// Model name as it appeared in the input, whitespace-collapsed
    canonical_name: String,
    /// Ordered normalized tokens used for matching
    search_tokens: Vec<String>,
}

impl ModelQuery {
    /// Build a query from a canonical model name.
    ///
    /// Names that normalize to nothing (empty, whitespace, punctuation only)
    /// are rejected with [`IngestError::InvalidModelName`].
    pub fn from_name(name: &str) -> Result<Self, IngestError> {
        let normalized = normalize_text(name);
        if normalized.is_empty() {
            return Err(IngestError::InvalidModelName {
                row: None,
                value: name.to_string(),
            });
        }

        Ok(Self {
            canonical_name: model_key(name),
            search_tokens: normalized.split(' ').map(str::to_string).collect(),
        })
    }

    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    pub fn search_tokens(&self) -> &[String] {
        &self.search_tokens
    }

    /// Space-joined normalized form of the query.
    pub fn normalized(&self) -> String {
        self.search_tokens.join(" ")
    }

    /// Phrase typed into a site search box, with an optional category hint.
    pub fn search_phrase(&self, hint: Option<&str>) -> String {
        match hint {
            Some(hint) => format!("{} {}", self.canonical_name, hint),
            None => self.canonical_name.clone(),
        }
    }
}

impl std::fmt::Display for ModelQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical_name)
    }
}
