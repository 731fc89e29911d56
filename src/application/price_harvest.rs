//! Per-model price harvesting on a retail source
//!
//! search → validate candidates (search page) → open each accepted
//! candidate → validate again on the product page → enumerate variants →
//! extract and check prices per variant → drop outliers → aggregate.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::application::aggregator::aggregate_with_representative;
use crate::application::candidate_validator::{CandidateValidator, Verdict};
use crate::application::outlier_filter::OutlierFilter;
use crate::application::price_extractor::PriceExtractor;
use crate::application::session_supervisor::ModelProcessor;
use crate::application::variant_enumerator::VariantEnumerator;
use crate::domain::{
    Candidate, ListingClassifier, ModelOutcome, ModelQuery, Page, PageError, PageSource, PriceObservation,
    SelectorSet,
};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::site_profiles::SiteProfile;

pub struct PriceHarvester {
    profile: SiteProfile,
    validator: CandidateValidator,
    classifier: ListingClassifier,
    enumerator: VariantEnumerator,
    extractor: PriceExtractor,
    outlier_filter: OutlierFilter,
    search_hint: Option<String>,
    max_candidates: usize,
    body: SelectorSet,
}

impl PriceHarvester {
    pub fn new(profile: SiteProfile, config: &AppConfig) -> Self {
        let matching = &config.matching;
        let hint = config.harvest.search_hint.trim();
        Self {
            validator: CandidateValidator::new(profile.match_mode, matching),
            classifier: ListingClassifier::new(
                matching.accessory_keywords.clone(),
                matching.category_keywords.clone(),
                matching.foreign_category_keywords.clone(),
            ),
            enumerator: VariantEnumerator::new(config.harvest.max_variants_per_candidate),
            extractor: PriceExtractor::new(&config.pricing),
            outlier_filter: OutlierFilter::from_config(&config.pricing),
            search_hint: (!hint.is_empty()).then(|| hint.to_string()),
            max_candidates: config.harvest.max_candidates_per_model,
            body: SelectorSet::new("body", &["body"]),
            profile,
        }
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    /// Accepted candidates for one search, in result order.
    async fn search(
        &self,
        source: &dyn PageSource,
        query: &ModelQuery,
        hint: Option<&str>,
        search_urls: &mut Vec<String>,
    ) -> Result<Vec<Candidate>, PageError> {
        let page = match source.search(query, hint).await {
            Ok(page) => page,
            Err(e) if e.is_session_fault() => return Err(e),
            Err(e) => {
                warn!("⚠️ Search failed for '{}': {}", query, e);
                search_urls.push(self.profile.search_url(&query.search_phrase(hint)));
                return Ok(Vec::new());
            }
        };
        search_urls.push(page.url);

        let mut seen = HashSet::new();
        let accepted: Vec<Candidate> = page
            .candidates
            .into_iter()
            .filter(|c| seen.insert(c.url.clone()))
            .take(self.max_candidates)
            .filter(|c| self.validator.validate(c, query).is_accept())
            .collect();

        info!("🔍 '{}'{}: {} candidate(s) accepted", query, hint.map(|h| format!(" (+{h})")).unwrap_or_default(), accepted.len());
        Ok(accepted)
    }

    /// Re-validate an opened page against the query using its own title
    /// and category metadata.
    fn page_matches(&self, source: &dyn PageSource, page: &Page, query: &ModelQuery, fallback_title: &str) -> bool {
        let first_text = |set: &SelectorSet| {
            set.split()
                .find_map(|s| source.extract_text(page, &s).ok().and_then(|t| t.into_iter().next()))
        };
        let title = first_text(&self.profile.title).unwrap_or_else(|| fallback_title.to_string());
        let breadcrumbs = source.extract_text(page, &self.profile.breadcrumbs).unwrap_or_default();
        let body = first_text(&self.body).unwrap_or_default();

        let candidate = self.classifier.classify(&title, &page.url, &breadcrumbs, &body);
        match self.validator.validate(&candidate, query) {
            Verdict::Accept => true,
            Verdict::Reject(reason) => {
                info!("❌ Page {} rejected for '{}': {}", page.url, query, reason);
                false
            }
        }
    }

    /// Observations from one accepted candidate.
    async fn harvest_candidate(
        &self,
        source: &dyn PageSource,
        query: &ModelQuery,
        candidate: &Candidate,
    ) -> Result<Vec<PriceObservation>, PageError> {
        let page = match open(source, &candidate.url).await? {
            Some(page) => page,
            None => return Ok(Vec::new()),
        };
        if !self.page_matches(source, &page, query, &candidate.title) {
            return Ok(Vec::new());
        }

        let links = source.extract_links(&page, &self.profile.variant_links).unwrap_or_else(|e| {
            warn!("⚠️ Variant links unavailable on {}: {}", page.url, e);
            Vec::new()
        });
        let variants = self.enumerator.enumerate(&page.url, &links);
        debug!("{} variant(s) on {}", variants.len(), page.url);

        let mut observations = Vec::new();
        for variant in variants {
            let variant_page = if variant.is_self {
                page.clone()
            } else {
                match open(source, &variant.url).await? {
                    Some(p) if self.page_matches(source, &p, query, &candidate.title) => p,
                    _ => continue,
                }
            };

            match self.extractor.extract(
                source,
                &variant_page,
                &self.profile,
                &candidate.url,
                variant.label.as_deref(),
            ) {
                Ok(extracted) => {
                    let availability = self.extractor.availability(source, &variant_page, &self.profile);
                    info!(
                        "✅ {} {}: ₹{} (MRP {})",
                        query,
                        variant.label.as_deref().unwrap_or("default"),
                        extracted.variant.selling_price,
                        extracted.variant.reference_price.map_or_else(|| "-".to_string(), |r| r.to_string())
                    );
                    observations.push(PriceObservation::from_variant(query, extracted.variant, availability));
                }
                Err(failure) => {
                    info!("⚠️ Discarding variant {}: {}", variant.url, failure);
                    source.save_snapshot(&variant_page, query.canonical_name()).await;
                }
            }
        }
        Ok(observations)
    }
}

/// Open a page; session faults propagate, other failures skip the page.
async fn open(source: &dyn PageSource, url: &str) -> Result<Option<Page>, PageError> {
    match source.open(url).await {
        Ok(page) => Ok(Some(page)),
        Err(e) if e.is_session_fault() => Err(e),
        Err(e) => {
            warn!("⚠️ Could not open {}: {}", url, e);
            Ok(None)
        }
    }
}

#[async_trait]
impl ModelProcessor for PriceHarvester {
    type Output = ModelOutcome;

    async fn process(&self, source: &dyn PageSource, query: &ModelQuery) -> Result<ModelOutcome, PageError> {
        let mut search_urls = Vec::new();
        let mut accepted = self.search(source, query, None, &mut search_urls).await?;
        if accepted.is_empty() {
            if let Some(hint) = self.search_hint.as_deref() {
                accepted = self.search(source, query, Some(hint), &mut search_urls).await?;
            }
        }

        let mut observations = Vec::new();
        for candidate in &accepted {
            observations.extend(self.harvest_candidate(source, query, candidate).await?);
        }

        let first_accepted = observations.first().map(|o| o.candidate_url.clone());
        let filtered = self.outlier_filter.filter_by(observations, |o| o.selling_price);
        for dropped in &filtered.dropped {
            warn!("🔍 Outlier ₹{} dropped for '{}' ({})", dropped.selling_price, query, dropped.candidate_url);
        }

        let outcome = aggregate_with_representative(
            query.canonical_name(),
            &filtered.kept,
            first_accepted.as_deref(),
            search_urls,
        );
        match &outcome {
            ModelOutcome::Found(r) => info!("✅ '{}': ₹{} - ₹{}", query, r.low_price, r.high_price),
            _ => warn!("❌ No match found for '{}'", query),
        }
        Ok(outcome)
    }

    fn skipped(&self, model: &str, reason: &str) -> ModelOutcome {
        ModelOutcome::Skipped {
            model: model.to_string(),
            reason: reason.to_string(),
        }
    }
}
