//! Error taxonomy for the harvesting engine
//!
//! Each enum maps to one failure class with its own blast radius:
//! rejections and extraction failures cost one candidate or one variant,
//! session errors cost at most one model, checkpoint errors end the run,
//! and ingestion errors cost one input row.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::page_source::PageError;

/// Why a candidate listing was not accepted for a model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RejectionReason {
    #[error("listing is an accessory")]
    Accessory,

    #[error("listing is outside the phone category")]
    WrongCategory,

    #[error("title overlap {ratio:.2} is below threshold {threshold:.2}")]
    BelowThreshold { ratio: f64, threshold: f64 },

    #[error("title does not start with the requested model")]
    PrefixMismatch,

    #[error("title names variant '{token}' that was not requested")]
    UnrequestedVariant { token: String },
}

/// A variant page that produced no usable selling price.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionFailure {
    #[error("no numeric price found on {url}")]
    NoPrice { url: String },

    #[error("selling price {value} outside plausible band [{min}, {max}] on {url}")]
    ImplausiblePrice { value: u64, min: u64, max: u64, url: String },
}

/// A reference (MRP) value dropped while the selling price was kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceRejection {
    #[error("reference price {reference} is not above selling price {selling}")]
    NotAboveSelling { reference: u64, selling: u64 },

    #[error("reference price {reference} exceeds cap {cap} for selling price {selling}")]
    AboveCap { reference: u64, selling: u64, cap: u64 },
}

/// Session-level failures surfaced by the session supervisor.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("session timed out: {0}")]
    Timeout(String),

    #[error("session unrecoverable after {restarts} restart attempt(s): {last_error}")]
    Unrecoverable { restarts: u32, last_error: String },
}

/// Checkpoint persistence failures. Any write failure ends the run.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("failed to write checkpoint {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read checkpoint {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("checkpoint {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Input rows that could not become a model query.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid model name {value:?}{}", .row.map(|r| format!(" at row {r}")).unwrap_or_default())]
    InvalidModelName { row: Option<usize>, value: String },

    #[error("input {path} has no usable model column")]
    MissingModelColumn { path: PathBuf },

    #[error("input {path} has a quoted field opened at line {line} that never closes")]
    UnterminatedQuote { path: PathBuf, line: usize },

    #[error("failed to read input {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Umbrella error for the engine's public entry points.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error(transparent)]
    Rejected(#[from] RejectionReason),

    #[error(transparent)]
    Extraction(#[from] ExtractionFailure),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Page(#[from] PageError),
}

impl HarvestError {
    /// Whether the run has to stop because of this error.
    ///
    /// Only checkpoint failures are fatal for the whole run; everything
    /// else is contained to a candidate, variant, row or model.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Checkpoint(_))
    }
}
