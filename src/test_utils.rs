//! Test utilities for the harvesting engine
//!
//! [`FixturePageSource`] serves recorded HTML from memory so pipelines,
//! supervision and resume can be exercised without a network. Failures can
//! be scripted per URL, and a [`FixtureRecorder`] stays readable after the
//! source has been moved into a supervisor.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::{Link, ListingClassifier, ModelQuery, Page, PageError, PageSource, SearchPage, SelectorSet};
use crate::infrastructure::config::MatchingConfig;
use crate::infrastructure::html_extract;

type FailureQueue = Arc<Mutex<HashMap<String, VecDeque<PageError>>>>;

/// In-memory [`PageSource`] backed by recorded pages.
pub struct FixturePageSource {
    name: String,
    pages: HashMap<String, String>,
    searches: HashMap<String, Vec<(String, String)>>,
    classifier: ListingClassifier,
    failures: FailureQueue,
    resets: Arc<AtomicUsize>,
    reset_failures: Arc<AtomicUsize>,
    opened: Arc<Mutex<Vec<String>>>,
    snapshots: Arc<Mutex<Vec<String>>>,
}

/// Read-only view on a fixture's counters.
#[derive(Clone)]
pub struct FixtureRecorder {
    resets: Arc<AtomicUsize>,
    opened: Arc<Mutex<Vec<String>>>,
    snapshots: Arc<Mutex<Vec<String>>>,
}

impl FixtureRecorder {
    /// Reset attempts so far, failed ones included.
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    /// URLs opened successfully, in order.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// URLs of pages handed over for snapshotting.
    pub fn snapshots(&self) -> Vec<String> {
        self.snapshots.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

fn search_key(phrase: &str) -> String {
    phrase.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

impl FixturePageSource {
    pub fn new(name: &str) -> Self {
        let matching = MatchingConfig::default();
        Self {
            name: name.to_string(),
            pages: HashMap::new(),
            searches: HashMap::new(),
            classifier: ListingClassifier::new(
                matching.accessory_keywords,
                matching.category_keywords,
                matching.foreign_category_keywords,
            ),
            failures: Arc::default(),
            resets: Arc::default(),
            reset_failures: Arc::default(),
            opened: Arc::default(),
            snapshots: Arc::default(),
        }
    }

    #[must_use]
    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Register search results (title, url) for a search phrase.
    #[must_use]
    pub fn with_search(mut self, phrase: &str, results: &[(&str, &str)]) -> Self {
        let results = results.iter().map(|(t, u)| ((*t).to_string(), (*u).to_string())).collect();
        self.searches.insert(search_key(phrase), results);
        self
    }

    /// URL a search for `phrase` is reported under.
    pub fn search_url(&self, phrase: &str) -> String {
        format!("fixture://{}/search?q={}", self.name, search_key(phrase).replace(' ', "+"))
    }

    /// Make the next request for `url` fail with `error`. Calls queue up.
    pub fn fail_next(&self, url: &str, error: PageError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.entry(url.to_string()).or_default().push_back(error);
        }
    }

    /// Make the next `count` resets fail.
    pub fn fail_resets(&self, count: usize) {
        self.reset_failures.store(count, Ordering::SeqCst);
    }

    pub fn recorder(&self) -> FixtureRecorder {
        FixtureRecorder {
            resets: Arc::clone(&self.resets),
            opened: Arc::clone(&self.opened),
            snapshots: Arc::clone(&self.snapshots),
        }
    }

    fn scripted_failure(&self, url: &str) -> Option<PageError> {
        self.failures.lock().ok()?.get_mut(url)?.pop_front()
    }
}

#[async_trait]
impl PageSource for FixturePageSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &ModelQuery, hint: Option<&str>) -> Result<SearchPage, PageError> {
        let phrase = query.search_phrase(hint);
        let url = self.search_url(&phrase);
        if let Some(error) = self.scripted_failure(&url) {
            return Err(error);
        }

        let candidates = self
            .searches
            .get(&search_key(&phrase))
            .map(|results| {
                results
                    .iter()
                    .map(|(title, href)| self.classifier.classify(title, href, &[], ""))
                    .collect()
            })
            .unwrap_or_default();
        Ok(SearchPage { url, candidates })
    }

    async fn open(&self, url: &str) -> Result<Page, PageError> {
        if let Some(error) = self.scripted_failure(url) {
            return Err(error);
        }
        let html = self.pages.get(url).ok_or_else(|| PageError::Http {
            status: 404,
            url: url.to_string(),
        })?;
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(url.to_string());
        }
        Ok(Page::new(url, html.as_str()))
    }

    fn extract_text(&self, page: &Page, selectors: &SelectorSet) -> Result<Vec<String>, PageError> {
        html_extract::extract_text(&page.html, selectors)
    }

    fn extract_links(&self, page: &Page, selectors: &SelectorSet) -> Result<Vec<Link>, PageError> {
        html_extract::extract_links(&page.html, &page.url, selectors)
    }

    async fn reset(&mut self) -> Result<(), PageError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        let pending = self.reset_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.reset_failures.store(pending - 1, Ordering::SeqCst);
            return Err(PageError::Unresponsive("fixture reset failed".into()));
        }
        Ok(())
    }

    async fn save_snapshot(&self, page: &Page, _label: &str) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.push(page.url.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let source = FixturePageSource::new("fx").with_page("fixture://a", "<p>a</p>");
        source.fail_next("fixture://a", PageError::timeout("fixture://a", 5));
        let recorder = source.recorder();

        assert!(source.open("fixture://a").await.unwrap_err().is_timeout());
        assert_eq!(source.open("fixture://a").await.unwrap().html, "<p>a</p>");
        assert_eq!(recorder.opened(), vec!["fixture://a".to_string()]);
    }

    #[tokio::test]
    async fn test_search_classifies_results() {
        let source = FixturePageSource::new("fx").with_search(
            "Pixel 8",
            &[("Google Pixel 8 (Obsidian, 128 GB)", "fixture://p8"), ("Pixel 8 Back Cover", "fixture://case")],
        );
        let query = ModelQuery::from_name("Pixel 8").unwrap();
        let page = source.search(&query, None).await.unwrap();

        assert_eq!(page.url, "fixture://fx/search?q=pixel+8");
        assert_eq!(page.candidates.len(), 2);
        assert!(!page.candidates[0].is_accessory);
        assert!(page.candidates[1].is_accessory);
    }
}
