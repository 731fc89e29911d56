//! Per-model results written to the output sinks

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::listing::Availability;

/// Coarse status of a per-model record, for run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Found,
    NotFound,
    Skipped,
}

/// A per-model result that can be tracked by the checkpoint manager.
pub trait ModelRecord: Serialize + DeserializeOwned {
    fn model(&self) -> &str;
    fn status(&self) -> RecordStatus;
}

/// Summary of all accepted observations for one model on one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub model: String,
    pub low_price: u64,
    pub high_price: u64,
    pub max_reference_price: Option<u64>,
    pub representative_url: String,
    pub availability: Availability,
    pub search_urls: Vec<String>,
}

/// What happened to one model on a price source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ModelOutcome {
    Found(AggregateResult),
    NotFound { model: String, search_urls: Vec<String> },
    Skipped { model: String, reason: String },
}

impl ModelRecord for ModelOutcome {
    fn model(&self) -> &str {
        match self {
            Self::Found(result) => &result.model,
            Self::NotFound { model, .. } | Self::Skipped { model, .. } => model,
        }
    }

    fn status(&self) -> RecordStatus {
        match self {
            Self::Found(_) => RecordStatus::Found,
            Self::NotFound { .. } => RecordStatus::NotFound,
            Self::Skipped { .. } => RecordStatus::Skipped,
        }
    }
}

/// Flat row shape for the price sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRow {
    pub model: String,
    pub low_price: u64,
    pub high_price: u64,
    pub mrp: u64,
    pub representative_url: String,
    pub availability: String,
    pub search_urls: String,
}

impl From<&ModelOutcome> for PriceRow {
    fn from(outcome: &ModelOutcome) -> Self {
        match outcome {
            ModelOutcome::Found(r) => Self {
                model: r.model.clone(),
                low_price: r.low_price,
                high_price: r.high_price,
                mrp: r.max_reference_price.unwrap_or(0),
                representative_url: r.representative_url.clone(),
                availability: r.availability.to_string(),
                search_urls: r.search_urls.join(", "),
            },
            ModelOutcome::NotFound { model, search_urls } => Self {
                model: model.clone(),
                low_price: 0,
                high_price: 0,
                mrp: 0,
                representative_url: "URL not available".to_string(),
                availability: "Not found".to_string(),
                search_urls: search_urls.join(", "),
            },
            ModelOutcome::Skipped { model, reason } => Self {
                model: model.clone(),
                low_price: 0,
                high_price: 0,
                mrp: 0,
                representative_url: "URL not available".to_string(),
                availability: format!("Skipped: {reason}"),
                search_urls: String::new(),
            },
        }
    }
}

/// Launch-date lookup status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchAvailability {
    Found,
    NoExactDate,
    NotFound,
}

impl LaunchAvailability {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Found => "Found",
            Self::NoExactDate => "NoExactDate",
            Self::NotFound => "NotFound",
        }
    }
}

/// Launch date for one model from the reference source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRecord {
    pub model: String,
    pub launch_date: Option<String>,
    pub source: Option<String>,
    pub url: Option<String>,
    pub availability: LaunchAvailability,
    /// `false` when the model was skipped because the session could not recover
    pub scraped: bool,
}

impl LaunchRecord {
    /// Derive the availability label from what the lookup produced.
    pub fn new(model: &str, launch_date: Option<String>, source: Option<String>, url: Option<String>) -> Self {
        let availability = match (&launch_date, &source) {
            (Some(_), _) => LaunchAvailability::Found,
            (None, Some(_)) => LaunchAvailability::NoExactDate,
            (None, None) => LaunchAvailability::NotFound,
        };
        Self {
            model: model.to_string(),
            launch_date,
            source,
            url,
            availability,
            scraped: true,
        }
    }

    pub fn skipped(model: &str) -> Self {
        Self {
            model: model.to_string(),
            launch_date: None,
            source: None,
            url: None,
            availability: LaunchAvailability::NotFound,
            scraped: false,
        }
    }
}

impl ModelRecord for LaunchRecord {
    fn model(&self) -> &str {
        &self.model
    }

    fn status(&self) -> RecordStatus {
        if !self.scraped {
            RecordStatus::Skipped
        } else if self.availability == LaunchAvailability::Found {
            RecordStatus::Found
        } else {
            RecordStatus::NotFound
        }
    }
}
