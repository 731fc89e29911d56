//! Application layer - the harvesting engine
//!
//! Per-model pipelines (prices and launch dates), the matching and
//! extraction stages they are built from, and the run loop that drives a
//! model list under checkpointing and session supervision.

pub mod aggregator;
pub mod candidate_validator;
pub mod checkpoint_manager;
pub mod ingestion;
pub mod launch_date;
pub mod launch_harvest;
pub mod outlier_filter;
pub mod price_extractor;
pub mod price_harvest;
pub mod query_generator;
pub mod run_loop;
pub mod session_supervisor;
pub mod variant_enumerator;

// Re-export commonly used items
pub use aggregator::aggregate;
pub use candidate_validator::{CandidateValidator, Verdict};
pub use checkpoint_manager::{Checkpoint, CheckpointManager, ProgressStore, ResumeMode, RunPhase};
pub use ingestion::{ModelList, load_models, select_error_list};
pub use launch_date::LaunchDateExtractor;
pub use launch_harvest::LaunchHarvester;
pub use outlier_filter::{FilterOutcome, OutlierFilter};
pub use price_extractor::{PriceExtractor, PriceSanityChecker, PriceTextParser};
pub use price_harvest::PriceHarvester;
pub use query_generator::QueryGenerator;
pub use run_loop::{HarvestRun, RunSignal, RunSignalSender, RunSignals, RunSummary};
pub use session_supervisor::{ModelProcessor, SessionSupervisor, Supervised};
pub use variant_enumerator::VariantEnumerator;
