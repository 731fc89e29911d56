//! Selector-driven extraction over raw HTML
//!
//! `scraper::Html` is not `Send`, so every helper here parses, extracts and
//! drops the document synchronously; async callers never hold it across an
//! `.await`.

use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

use crate::domain::{Link, PageError, SelectorSet};

/// Attributes that may carry a link target, in preference order.
const LINK_ATTRS: [&str; 3] = ["href", "data-dp-url", "data-url"];

/// Compile every strategy in a set, skipping (and logging) broken ones.
///
/// Fails only when the set is non-empty and nothing compiled.
fn compile_selectors(set: &SelectorSet) -> Result<Vec<Selector>, PageError> {
    let mut selectors = Vec::with_capacity(set.strategies.len());
    let mut errors = Vec::new();

    for strategy in &set.strategies {
        match Selector::parse(strategy) {
            Ok(selector) => selectors.push(selector),
            Err(e) => {
                warn!(field = %set.field, "Failed to compile selector '{}': {}", strategy, e);
                errors.push(format!("'{strategy}': {e}"));
            }
        }
    }

    if selectors.is_empty() && !set.strategies.is_empty() {
        return Err(PageError::InvalidSelector {
            selector: set.strategies.join(" | "),
            reason: errors.join(", "),
        });
    }

    Ok(selectors)
}

/// Visible text of an element with text nodes joined by single spaces.
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve `href` against the page URL; drops fragments-only and script links.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }

    match Url::parse(href) {
        Ok(url) => Some(url.to_string()),
        Err(_) => Url::parse(base).ok()?.join(href).ok().map(|u| u.to_string()),
    }
}

fn link_target<'a>(element: &ElementRef<'a>) -> Option<&'a str> {
    LINK_ATTRS.iter().find_map(|attr| element.value().attr(attr))
}

/// Texts matched by the first strategy that matches anything.
pub fn extract_text(html: &str, set: &SelectorSet) -> Result<Vec<String>, PageError> {
    let selectors = compile_selectors(set)?;
    let document = Html::parse_document(html);

    for selector in &selectors {
        let texts: Vec<String> = document
            .select(selector)
            .map(|e| element_text(&e))
            .filter(|t| !t.is_empty())
            .collect();
        if !texts.is_empty() {
            return Ok(texts);
        }
    }

    Ok(Vec::new())
}

/// Links matched by the first strategy that yields any resolvable target.
pub fn extract_links(html: &str, base_url: &str, set: &SelectorSet) -> Result<Vec<Link>, PageError> {
    let selectors = compile_selectors(set)?;
    let document = Html::parse_document(html);

    for selector in &selectors {
        let links: Vec<Link> = document
            .select(selector)
            .filter_map(|e| {
                let href = resolve_url(base_url, link_target(&e)?)?;
                Some(Link { href, text: element_text(&e) })
            })
            .collect();
        if !links.is_empty() {
            return Ok(links);
        }
    }

    Ok(Vec::new())
}

/// Search-result anchors with their listing titles.
///
/// The title comes from the first `titles` strategy matching inside the
/// anchor, then the anchor's `title` attribute, then its full text.
pub fn extract_listings(
    html: &str,
    base_url: &str,
    anchors: &SelectorSet,
    titles: &SelectorSet,
) -> Result<Vec<Link>, PageError> {
    let anchor_selectors = compile_selectors(anchors)?;
    let title_selectors = compile_selectors(titles)?;
    let document = Html::parse_document(html);

    for selector in &anchor_selectors {
        let listings: Vec<Link> = document
            .select(selector)
            .filter_map(|anchor| {
                let href = resolve_url(base_url, link_target(&anchor)?)?;
                let title = title_selectors
                    .iter()
                    .find_map(|ts| anchor.select(ts).map(|e| element_text(&e)).find(|t| !t.is_empty()))
                    .or_else(|| anchor.value().attr("title").map(|t| t.trim().to_string()))
                    .unwrap_or_else(|| element_text(&anchor));
                Some(Link { href, text: title })
            })
            .filter(|link| !link.text.is_empty())
            .collect();
        if !listings.is_empty() {
            return Ok(listings);
        }
    }

    Ok(Vec::new())
}
