//! Domain module - value types and capability interfaces
//!
//! Everything in here is free of I/O: the harvesting engine in
//! `application` works purely against these types and the [`PageSource`]
//! trait, which lets tests swap in recorded fixtures for a live site.

pub mod aggregate;
pub mod errors;
pub mod listing;
pub mod model_query;
pub mod page_source;
pub mod run_state;
pub mod session_health;

// Re-export commonly used items for convenience
pub use aggregate::{
    AggregateResult, LaunchAvailability, LaunchRecord, ModelOutcome, ModelRecord, PriceRow, RecordStatus,
};
pub use errors::{
    CheckpointError, ExtractionFailure, HarvestError, IngestError, ReferenceRejection,
    RejectionReason, SessionError,
};
pub use listing::{Availability, Candidate, ListingClassifier, PriceObservation, Variant, VariantLink};
pub use model_query::{ModelQuery, model_key, normalize_text};
pub use page_source::{Link, Page, PageError, PageSource, SearchPage, SelectorSet};
pub use run_state::RunState;
pub use session_health::{HealthState, SessionHealth};
