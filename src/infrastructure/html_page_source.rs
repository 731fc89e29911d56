//! Live page source over plain HTTP
//!
//! Fetches pages with the rate-limited [`HttpClient`] and extracts with
//! static CSS selectors. One client is one session: `reset` drops it (and
//! its cookie jar) and builds a fresh one under a different identity.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Local;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::domain::{
    Link, ListingClassifier, ModelQuery, Page, PageError, PageSource, SearchPage, SelectorSet,
};
use crate::infrastructure::html_extract;
use crate::infrastructure::http_client::{HttpClient, HttpClientConfig};
use crate::infrastructure::site_profiles::SiteProfile;

pub struct HtmlPageSource {
    profile: SiteProfile,
    client: HttpClient,
    client_config: HttpClientConfig,
    classifier: ListingClassifier,
    snapshot_dir: Option<PathBuf>,
}

impl HtmlPageSource {
    pub fn new(
        profile: SiteProfile,
        client_config: HttpClientConfig,
        classifier: ListingClassifier,
    ) -> Result<Self, PageError> {
        let client = HttpClient::new(client_config.clone())?;
        info!("🌐 Page source ready for {} ({})", profile.display_name, profile.base_url);
        Ok(Self {
            profile,
            client,
            client_config,
            classifier,
            snapshot_dir: None,
        })
    }

    /// Write snapshots of unusable pages into `dir`.
    #[must_use]
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }
}

/// File name for a snapshot: timestamp, site and a filesystem-safe label.
pub fn snapshot_file_name(site: &str, label: &str) -> String {
    let label: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let label = label.split('_').filter(|p| !p.is_empty()).collect::<Vec<_>>().join("_");
    format!("{}_{}_{}.html", Local::now().format("%Y%m%d_%H%M%S%3f"), site, label)
}

async fn write_snapshot(dir: &Path, name: &str, page: &Page) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    let content = format!("<!-- {} -->\n{}", page.url, page.html);
    fs::write(&path, content).await?;
    Ok(path)
}

#[async_trait]
impl PageSource for HtmlPageSource {
    fn name(&self) -> &str {
        &self.profile.name
    }

    async fn search(&self, query: &ModelQuery, hint: Option<&str>) -> Result<SearchPage, PageError> {
        let url = self.profile.search_url(&query.search_phrase(hint));
        let fetched = self.client.get_text(&url).await?;

        let listings = html_extract::extract_listings(
            &fetched.body,
            &fetched.url,
            &self.profile.result_links,
            &self.profile.result_titles,
        )?;
        let mut seen = HashSet::new();
        let candidates = listings
            .into_iter()
            .filter(|l| seen.insert(l.href.clone()))
            .map(|l| self.classifier.classify(&l.text, &l.href, &[], ""))
            .collect::<Vec<_>>();

        debug!("Search {} returned {} listing(s)", url, candidates.len());
        Ok(SearchPage { url, candidates })
    }

    async fn open(&self, url: &str) -> Result<Page, PageError> {
        let fetched = self.client.get_text(url).await?;
        Ok(Page::new(fetched.url, fetched.body))
    }

    fn extract_text(&self, page: &Page, selectors: &SelectorSet) -> Result<Vec<String>, PageError> {
        html_extract::extract_text(&page.html, selectors)
    }

    fn extract_links(&self, page: &Page, selectors: &SelectorSet) -> Result<Vec<Link>, PageError> {
        html_extract::extract_links(&page.html, &page.url, selectors)
    }

    async fn reset(&mut self) -> Result<(), PageError> {
        let identity = self.client_config.pick_identity(Some(self.client.identity()));
        self.client = HttpClient::with_identity(self.client_config.clone(), identity)?;
        Ok(())
    }

    async fn save_snapshot(&self, page: &Page, label: &str) {
        let Some(dir) = &self.snapshot_dir else {
            return;
        };
        let name = snapshot_file_name(&self.profile.name, label);
        match write_snapshot(dir, &name, page).await {
            Ok(path) => info!("📸 Saved page snapshot {}", path.display()),
            Err(e) => warn!("⚠️ Could not save snapshot of {}: {}", page.url, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;
    use crate::infrastructure::config::{MatchingConfig, NetworkConfig, SessionConfig};

    fn client_config() -> HttpClientConfig {
        let mut config = HttpClientConfig::from_settings(&NetworkConfig::default(), &SessionConfig::default());
        config.request_delay_ms = 0;
        config.request_jitter_ms = 0;
        config.max_requests_per_second = 100;
        config.user_agents = vec!["ua-a".into(), "ua-b".into(), "ua-c".into()];
        config
    }

    fn source() -> HtmlPageSource {
        let matching = MatchingConfig::default();
        let classifier = ListingClassifier::new(
            matching.accessory_keywords,
            matching.category_keywords,
            matching.foreign_category_keywords,
        );
        HtmlPageSource::new(SiteProfile::builtin("flipkart").unwrap(), client_config(), classifier).unwrap()
    }

    /// Serves `/old` as a redirect to `/new/page`, which links to `v2`.
    fn redirecting_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for stream in listener.incoming().take(2) {
                let mut stream = stream.unwrap();
                let mut buf = [0u8; 2048];
                let n = stream.read(&mut buf).unwrap();
                let request = String::from_utf8_lossy(&buf[..n]);
                let response = if request.starts_with("GET /old ") {
                    "HTTP/1.1 302 Found\r\nLocation: /new/page\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                } else {
                    let body = r#"<html><body><a class="v" href="v2">256 GB</a></body></html>"#;
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    )
                };
                stream.write_all(response.as_bytes()).unwrap();
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_links_resolve_against_redirect_target() {
        let base = redirecting_server();
        let source = source();

        let page = source.open(&format!("{base}/old")).await.unwrap();
        assert_eq!(page.url, format!("{base}/new/page"));

        let links = source.extract_links(&page, &SelectorSet::new("variants", &["a.v"])).unwrap();
        assert_eq!(links[0].href, format!("{base}/new/v2"));
    }

    #[tokio::test]
    async fn test_reset_changes_identity() {
        let mut source = source();
        for _ in 0..5 {
            let before = source.client().identity().clone();
            source.reset().await.unwrap();
            assert_ne!(source.client().identity().user_agent, before.user_agent);
        }
    }

    #[tokio::test]
    async fn test_snapshots_are_written_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let page = Page::new("https://www.flipkart.com/p/1", "<html><body>blocked</body></html>");

        source().save_snapshot(&page, "Apple iPhone 15").await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let source = source().with_snapshot_dir(dir.path().join("snapshots"));
        source.save_snapshot(&page, "Apple iPhone 15").await;
        let files: Vec<_> = std::fs::read_dir(dir.path().join("snapshots")).unwrap().collect();
        assert_eq!(files.len(), 1);
        let path = files[0].as_ref().unwrap().path();
        assert!(path.to_string_lossy().ends_with("_flipkart_apple_iphone_15.html"));
        assert!(std::fs::read_to_string(path).unwrap().contains("blocked"));
    }
}
