//! Launch-date extraction from reference page text
//!
//! The page text is narrowed to a window around the first launch anchor
//! word, then date patterns are tried from most to least specific. Month
//! words must be real month names, so "2023 Battery" is never a date.

use once_cell::sync::Lazy;
use regex::Regex;

/// Anchor words in priority order
const ANCHORS: [&str; 4] = ["announced", "launched", "release date", "release"];

/// Characters kept before and after the anchor
const WINDOW_BEFORE: usize = 120;
const WINDOW_AFTER: usize = 260;

const MONTH: &str = "(?:january|february|march|april|may|june|july|august|september|october|november|december|\
                     jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)";

/// Most specific first; the first pattern that matches wins.
static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        format!(r"(?i)\b(\d{{4}}\s*,?\s*{MONTH}\.?\s+\d{{1,2}})\b"),
        format!(r"(?i)\b(\d{{1,2}}\s+{MONTH}\.?\s*,?\s*\d{{4}})\b"),
        format!(r"(?i)\b({MONTH}\.?\s+\d{{1,2}}\s*,?\s*\d{{4}})\b"),
        format!(r"(?i)\b(\d{{4}}\s*,?\s*{MONTH})\b"),
        format!(r"(?i)\b({MONTH}\.?\s*,?\s*\d{{4}})\b"),
        r"\b((?:19|20)\d{2})\b".to_string(),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("date regex is valid"))
    .collect()
});

#[derive(Debug, Clone, Copy, Default)]
pub struct LaunchDateExtractor;

impl LaunchDateExtractor {
    pub const fn new() -> Self {
        Self
    }

    /// The most specific date found near a launch anchor, as written on
    /// the page (whitespace collapsed).
    pub fn extract(&self, text: &str) -> Option<String> {
        let window = launch_window(text);
        DATE_PATTERNS
            .iter()
            .find_map(|re| re.captures(window))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

/// Slice of `text` around the first anchor word, or all of it.
fn launch_window(text: &str) -> &str {
    let lowered = text.to_ascii_lowercase();
    let Some(idx) = ANCHORS.iter().find_map(|a| lowered.find(a)) else {
        return text;
    };

    let start = floor_boundary(text, idx.saturating_sub(WINDOW_BEFORE));
    let end = floor_boundary(text, (idx + WINDOW_AFTER).min(text.len()));
    &text[start..end]
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("Launch Announced 2021, September 14. Status Available. Released 2021, September 24", Some("2021, September 14"))]
    #[case("Launched on 14 March 2023 in India", Some("14 March 2023"))]
    #[case("Release date: Oct 4, 2023", Some("Oct 4, 2023"))]
    #[case("Announced 2019, February", Some("2019, February"))]
    #[case("Launched in June 2020", Some("June 2020"))]
    #[case("Announced 2018. Battery 3000 mAh", Some("2018"))]
    #[case("Announced Not officially announced yet", None)]
    fn test_date_patterns(#[case] text: &str, #[case] expected: Option<&str>) {
        assert_eq!(LaunchDateExtractor::new().extract(text).as_deref(), expected);
    }

    #[test]
    fn test_month_words_must_be_months() {
        assert_eq!(LaunchDateExtractor::new().extract("Announced 2023 Battery 5000 mAh").as_deref(), Some("2023"));
    }

    #[test]
    fn test_window_excludes_far_text() {
        let text = format!("Model year 2015 {} Announced 2022, January 5", "x".repeat(300));
        assert_eq!(LaunchDateExtractor::new().extract(&text).as_deref(), Some("2022, January 5"));
    }

    #[test]
    fn test_window_respects_char_boundaries() {
        let text = format!("{}₹ Announced 2020, May 1 {}", "é".repeat(70), "ü".repeat(200));
        assert_eq!(LaunchDateExtractor::new().extract(&text).as_deref(), Some("2020, May 1"));
    }

    #[test]
    fn test_announced_takes_priority_over_release() {
        let text = format!("Release 2019, March 1 {} Announced 2018, December 10", ".".repeat(150));
        assert_eq!(LaunchDateExtractor::new().extract(&text).as_deref(), Some("2018, December 10"));
    }
}
