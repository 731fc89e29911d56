//! Variant enumeration for an accepted candidate

use std::collections::HashSet;

use url::Url;

use crate::domain::{Link, VariantLink};

/// Picks the variant entry points of a product page.
#[derive(Debug, Clone, Copy)]
pub struct VariantEnumerator {
    max_variants: usize,
}

impl VariantEnumerator {
    pub const fn new(max_variants: usize) -> Self {
        Self { max_variants }
    }

    /// Variant links in page order, de-duplicated by their query-less URL
    /// and truncated to the cap.
    ///
    /// A page without variant links yields the page itself as the only
    /// variant.
    pub fn enumerate(&self, page_url: &str, links: &[Link]) -> Vec<VariantLink> {
        let mut seen = HashSet::new();
        let variants: Vec<VariantLink> = links
            .iter()
            .filter(|link| seen.insert(base_url(&link.href)))
            .take(self.max_variants)
            .map(|link| VariantLink {
                url: link.href.clone(),
                label: (!link.text.is_empty()).then(|| link.text.clone()),
                is_self: base_url(&link.href) == base_url(page_url),
            })
            .collect();

        if variants.is_empty() {
            return vec![VariantLink {
                url: page_url.to_string(),
                label: None,
                is_self: true,
            }];
        }
        variants
    }
}

/// URL without query string and fragment.
pub fn base_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw.split(['?', '#']).next().unwrap_or(raw).to_string(),
    }
}
