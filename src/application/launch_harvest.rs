//! Per-model launch-date lookup on a reference source
//!
//! The first search result whose title strictly matches the model is opened
//! and its launch text searched for a date.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::application::candidate_validator::CandidateValidator;
use crate::application::launch_date::LaunchDateExtractor;
use crate::application::session_supervisor::ModelProcessor;
use crate::domain::{LaunchRecord, ModelQuery, PageError, PageSource};
use crate::infrastructure::config::MatchingConfig;
use crate::infrastructure::site_profiles::SiteProfile;

pub struct LaunchHarvester {
    profile: SiteProfile,
    validator: CandidateValidator,
    extractor: LaunchDateExtractor,
}

impl LaunchHarvester {
    pub fn new(profile: SiteProfile, matching: &MatchingConfig) -> Self {
        Self {
            validator: CandidateValidator::new(profile.match_mode, matching),
            extractor: LaunchDateExtractor::new(),
            profile,
        }
    }
}

#[async_trait]
impl ModelProcessor for LaunchHarvester {
    type Output = LaunchRecord;

    async fn process(&self, source: &dyn PageSource, query: &ModelQuery) -> Result<LaunchRecord, PageError> {
        let model = query.canonical_name();
        let results = match source.search(query, None).await {
            Ok(page) => page,
            Err(e) if e.is_session_fault() => return Err(e),
            Err(e) => {
                warn!("⚠️ Search failed for '{}': {}", query, e);
                return Ok(LaunchRecord::new(model, None, None, None));
            }
        };

        let Some(candidate) = results
            .candidates
            .iter()
            .find(|c| self.validator.validate(c, query).is_accept())
        else {
            warn!("❌ No matching device page for '{}'", query);
            return Ok(LaunchRecord::new(model, None, None, None));
        };
        info!("🔗 '{}' matched '{}' -> {}", query, candidate.title, candidate.url);

        let source_name = Some(self.profile.display_name.clone());
        let url = Some(candidate.url.clone());
        let page = match source.open(&candidate.url).await {
            Ok(page) => page,
            Err(e) if e.is_session_fault() => return Err(e),
            Err(e) => {
                warn!("⚠️ Could not open {}: {}", candidate.url, e);
                return Ok(LaunchRecord::new(model, None, source_name, url));
            }
        };

        let text = source
            .extract_text(&page, &self.profile.launch_text)
            .unwrap_or_default()
            .join(" ");
        let date = self.extractor.extract(&text);
        match &date {
            Some(date) => info!("✅ '{}' launched {}", query, date),
            None => warn!("⚠️ No launch date on {}", candidate.url),
        }
        Ok(LaunchRecord::new(model, date, source_name, url))
    }

    fn skipped(&self, model: &str, _reason: &str) -> LaunchRecord {
        LaunchRecord::skipped(model)
    }
}
