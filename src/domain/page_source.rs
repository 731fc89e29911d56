//! Page-fetch capability interface
//!
//! The engine never talks to a browser or HTTP client directly. It asks a
//! [`PageSource`] to search, open pages and pull text or links out of them
//! using ordered selector strategies. Live backends and recorded-fixture
//! backends implement the same trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::listing::Candidate;
use crate::domain::model_query::ModelQuery;

/// Faults raised by a page backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("page operation timed out after {seconds}s: {url}")]
    Timeout { url: String, seconds: u64 },

    #[error("browsing session is unresponsive: {0}")]
    Unresponsive(String),

    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("navigation failed for {url}: {reason}")]
    Navigation { url: String, reason: String },

    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
}

impl PageError {
    pub fn timeout(url: &str, seconds: u64) -> Self {
        Self::Timeout { url: url.to_string(), seconds }
    }

    pub fn navigation(url: &str, reason: impl Into<String>) -> Self {
        Self::Navigation { url: url.to_string(), reason: reason.into() }
    }

    /// Faults that say something about the health of the session itself
    /// rather than about one page.
    pub const fn is_session_fault(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unresponsive(_))
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub html: String,
}

impl Page {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self { url: url.into(), html: html.into() }
    }
}

/// An anchor found on a page, with its href resolved against the page URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub text: String,
}

/// Result of one search request.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// URL the search was issued against, kept for the output's audit trail
    pub url: String,
    /// Listings in page order
    pub candidates: Vec<Candidate>,
}

/// Ordered extraction strategies for one field.
///
/// Strategies are CSS selectors tried in order; callers decide what counts
/// as a plausible value and move on to the next strategy otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSet {
    pub field: String,
    pub strategies: Vec<String>,
}

impl SelectorSet {
    pub fn new(field: impl Into<String>, strategies: &[&str]) -> Self {
        Self {
            field: field.into(),
            strategies: strategies.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// One selector set per strategy, preserving order.
    pub fn split(&self) -> impl Iterator<Item = Self> + '_ {
        self.strategies.iter().map(|s| Self {
            field: self.field.clone(),
            strategies: vec![s.clone()],
        })
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Capability interface over a concrete fetch backend.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Short source name, e.g. `"flipkart"`.
    fn name(&self) -> &str;

    /// Run a site search for the query; `hint` is appended to the phrase
    /// when set (e.g. a category word).
    async fn search(&self, query: &ModelQuery, hint: Option<&str>) -> Result<SearchPage, PageError>;

    /// Fetch a page. Must honor the backend's page timeout.
    async fn open(&self, url: &str) -> Result<Page, PageError>;

    /// Trimmed, non-empty texts matched by the first strategy that matches
    /// anything.
    fn extract_text(&self, page: &Page, selectors: &SelectorSet) -> Result<Vec<String>, PageError>;

    /// Links matched by the first strategy that matches anything, in page order.
    fn extract_links(&self, page: &Page, selectors: &SelectorSet) -> Result<Vec<Link>, PageError>;

    /// Discard the current session and start a fresh one.
    async fn reset(&mut self) -> Result<(), PageError>;

    /// Keep a copy of a page nothing useful could be read from. Backends
    /// without storage ignore it.
    async fn save_snapshot(&self, _page: &Page, _label: &str) {}
}
