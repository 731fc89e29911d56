//! Built-in site profiles
//!
//! A profile is everything site-specific: where to search, how strictly to
//! match titles, and an ordered list of CSS strategies per field. Markup on
//! these sites changes often, so every field carries several fallbacks,
//! newest layout first.

use serde::{Deserialize, Serialize};

use crate::domain::SelectorSet;

/// How candidate titles are compared with the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Fuzzy share-of-tokens test, for price aggregation
    TokenOverlap,
    /// Title must start with the query, for single-valued fields
    StrictPrefix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteProfile {
    pub name: String,
    /// Name recorded in output rows, e.g. `"GSMArena"`
    pub display_name: String,
    pub base_url: String,
    /// Search URL with a `{query}` placeholder
    pub search_url_template: String,
    pub match_mode: MatchMode,

    /// Result anchors on the search page
    pub result_links: SelectorSet,
    /// Title element inside a result anchor
    pub result_titles: SelectorSet,

    pub title: SelectorSet,
    pub selling_price: SelectorSet,
    pub reference_price: SelectorSet,
    pub availability: SelectorSet,
    pub variant_links: SelectorSet,
    pub breadcrumbs: SelectorSet,
    /// Text block searched for launch information
    pub launch_text: SelectorSet,
}

impl SiteProfile {
    /// Search URL for a phrase, percent-encoded.
    pub fn search_url(&self, phrase: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(phrase.as_bytes()).collect();
        self.search_url_template.replace("{query}", &encoded)
    }

    /// Look up a built-in profile by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "flipkart" => Some(flipkart()),
            "amazon" => Some(amazon()),
            "gsmarena" => Some(gsmarena()),
            _ => None,
        }
    }

    pub const fn builtin_names() -> &'static [&'static str] {
        &["flipkart", "amazon", "gsmarena"]
    }
}

fn flipkart() -> SiteProfile {
    SiteProfile {
        name: "flipkart".into(),
        display_name: "Flipkart".into(),
        base_url: "https://www.flipkart.com".into(),
        search_url_template: "https://www.flipkart.com/search?q={query}".into(),
        match_mode: MatchMode::TokenOverlap,
        result_links: SelectorSet::new(
            "result_links",
            &["a.CGtC98", "a.wjcEIp", "a._1fQZEK", "a.s1Q9rs", "a.IRpwTa", "a[href*='/p/itm']"],
        ),
        result_titles: SelectorSet::new("result_titles", &["div.KzDlHZ", "div._4rR01T", "div.RG5Slk"]),
        title: SelectorSet::new("title", &["span.VU-ZEz", "span.B_NuCI", "h1 span", "h1"]),
        selling_price: SelectorSet::new(
            "selling_price",
            &["div.Nx9bqj.CxhGGd", "div._30jeq3._16Jk6d", "div.Nx9bqj", "div._30jeq3"],
        ),
        reference_price: SelectorSet::new(
            "reference_price",
            &["div.yRaY8j.A6\\+E6v", "div._3I9_wc._2p6lqe", "div.yRaY8j", "div._3I9_wc"],
        ),
        availability: SelectorSet::new("availability", &["div.Z8JjpR", "div._16FRp0", "div.nyRpc8"]),
        variant_links: SelectorSet::new(
            "variant_links",
            &["li.aJWdJI a", "ul.hSEbzK a", "a.CDDksN", "a._1fGeJ5", "div._3Oikkn a"],
        ),
        breadcrumbs: SelectorSet::new("breadcrumbs", &["div.r2CdBx a", "div._1MR4o5 a", "nav a"]),
        launch_text: SelectorSet::new("launch_text", &["body"]),
    }
}

fn amazon() -> SiteProfile {
    SiteProfile {
        name: "amazon".into(),
        display_name: "Amazon".into(),
        base_url: "https://www.amazon.in".into(),
        search_url_template: "https://www.amazon.in/s?k={query}".into(),
        match_mode: MatchMode::TokenOverlap,
        result_links: SelectorSet::new(
            "result_links",
            &[
                "div.s-main-slot div[data-component-type='s-search-result'] h2 a",
                "a.a-link-normal.s-link-style.a-text-normal",
                "div.s-result-item h2 a",
            ],
        ),
        result_titles: SelectorSet::new("result_titles", &["span.a-text-normal", "span"]),
        title: SelectorSet::new("title", &["#productTitle", "span#title", "h1"]),
        selling_price: SelectorSet::new(
            "selling_price",
            &[
                "#corePriceDisplay_desktop_feature_div .priceToPay .a-offscreen",
                "#corePrice_feature_div .a-price .a-offscreen",
                "#corePriceDisplay_desktop_feature_div .a-price-whole",
                "#priceblock_dealprice",
                "#priceblock_ourprice",
            ],
        ),
        reference_price: SelectorSet::new(
            "reference_price",
            &[
                "#corePriceDisplay_desktop_feature_div .a-price.a-text-price .a-offscreen",
                ".basisPrice .a-offscreen",
                ".a-price[data-a-strike='true'] .a-offscreen",
                "#listPrice",
            ],
        ),
        availability: SelectorSet::new("availability", &["#availability span", "#availability", "#outOfStock"]),
        variant_links: SelectorSet::new(
            "variant_links",
            &[
                "#inline-twister-expander-content-size_name li[data-asin] a",
                "#variation_size_name li[data-dp-url]",
                "#variation_color_name li[data-dp-url]",
                "#twister li a",
            ],
        ),
        breadcrumbs: SelectorSet::new(
            "breadcrumbs",
            &["#wayfinding-breadcrumbs_feature_div a", "#wayfinding-breadcrumbs_container a"],
        ),
        launch_text: SelectorSet::new("launch_text", &["#productDetails_detailBullets_sections1", "body"]),
    }
}

fn gsmarena() -> SiteProfile {
    SiteProfile {
        name: "gsmarena".into(),
        display_name: "GSMArena".into(),
        base_url: "https://www.gsmarena.com/".into(),
        search_url_template: "https://www.gsmarena.com/results.php3?sQuickSearch=yes&sName={query}".into(),
        match_mode: MatchMode::StrictPrefix,
        result_links: SelectorSet::new("result_links", &["div.makers a"]),
        result_titles: SelectorSet::new("result_titles", &["strong", "span"]),
        title: SelectorSet::new("title", &["h1.specs-phone-name-title", "h1"]),
        selling_price: SelectorSet::new("selling_price", &[]),
        reference_price: SelectorSet::new("reference_price", &[]),
        availability: SelectorSet::new("availability", &[]),
        variant_links: SelectorSet::new("variant_links", &[]),
        breadcrumbs: SelectorSet::new("breadcrumbs", &[]),
        launch_text: SelectorSet::new("launch_text", &["#specs-list", "body"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_is_encoded() {
        let profile = SiteProfile::builtin("amazon").unwrap();
        assert_eq!(
            profile.search_url("Apple iPhone 15 mobile"),
            "https://www.amazon.in/s?k=Apple+iPhone+15+mobile"
        );
    }

    #[test]
    fn test_builtin_profiles_have_selectors() {
        for name in SiteProfile::builtin_names() {
            let profile = SiteProfile::builtin(name).unwrap();
            assert!(!profile.result_links.is_empty(), "{name}");
            assert!(!profile.title.is_empty(), "{name}");
        }
        assert_eq!(SiteProfile::builtin("gsmarena").unwrap().match_mode, MatchMode::StrictPrefix);
        assert!(SiteProfile::builtin("ebay").is_none());
    }
}
