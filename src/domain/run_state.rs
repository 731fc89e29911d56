//! Run progress value passed through the run loop

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Progress of one harvesting run.
///
/// `pending_models` keeps input order and never contains a model that is
/// also in `processed_models`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    /// blake3 of the input model list this state was created for
    pub input_fingerprint: String,
    pub processed_models: BTreeSet<String>,
    pub pending_models: Vec<String>,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
}

impl RunState {
    /// Fresh state for an input list; models flagged by a prior run are
    /// considered processed already.
    pub fn new(models: &[String], already_processed: impl IntoIterator<Item = String>) -> Self {
        let processed_models: BTreeSet<String> = already_processed.into_iter().collect();
        let pending_models = models
            .iter()
            .filter(|m| !processed_models.contains(*m))
            .cloned()
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            input_fingerprint: fingerprint(models),
            processed_models,
            pending_models,
            last_checkpoint_at: None,
        }
    }

    /// Mark a model processed and drop it from the pending queue.
    pub fn mark_processed(&mut self, model: &str) {
        self.processed_models.insert(model.to_string());
        self.pending_models.retain(|m| m != model);
    }

    /// Keep a model (back) in the pending queue, e.g. after it was skipped.
    pub fn mark_unprocessed(&mut self, model: &str) {
        self.processed_models.remove(model);
        if !self.pending_models.iter().any(|m| m == model) {
            self.pending_models.push(model.to_string());
        }
    }

    pub fn is_processed(&self, model: &str) -> bool {
        self.processed_models.contains(model)
    }

    /// Input models minus processed ones, in input order.
    pub fn pending_from(&self, models: &[String]) -> Vec<String> {
        models
            .iter()
            .filter(|m| !self.processed_models.contains(*m))
            .cloned()
            .collect()
    }
}

/// Stable fingerprint of an ordered model list.
pub fn fingerprint(models: &[String]) -> String {
    let mut hasher = blake3::Hasher::new();
    for model in models {
        hasher.update(model.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("Model {i}")).collect()
    }

    #[test]
    fn test_prior_flags_are_excluded_from_pending() {
        let input = models(4);
        let state = RunState::new(&input, vec!["Model 2".to_string()]);
        assert_eq!(state.pending_models, vec!["Model 1", "Model 3", "Model 4"]);
    }

    #[test]
    fn test_mark_processed_keeps_order() {
        let input = models(5);
        let mut state = RunState::new(&input, Vec::new());
        state.mark_processed("Model 3");
        state.mark_processed("Model 1");
        assert_eq!(state.pending_models, vec!["Model 2", "Model 4", "Model 5"]);
        assert!(state.is_processed("Model 1"));
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let a = vec!["A".to_string(), "B".to_string()];
        let b = vec!["B".to_string(), "A".to_string()];
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
    }
}
