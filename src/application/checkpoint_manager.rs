//! Checkpoint / resume management
//!
//! The manager owns the [`RunState`] and the per-model results of a run.
//! `record` updates a model's result and its processed flag in one step,
//! and every save persists both together, so a checkpoint never holds a
//! result without its flag or the other way round.
//!
//! Phases: `Idle -> Running -> (Saving -> Running)* -> Completed | Interrupted`.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::run_state::fingerprint;
use crate::domain::{CheckpointError, ModelRecord, RecordStatus, RunState};

/// Persisted snapshot: run progress plus every result recorded so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "R: Serialize + DeserializeOwned")]
pub struct Checkpoint<R> {
    pub state: RunState,
    pub results: Vec<R>,
}

/// Storage for checkpoints. `persist` must be atomic with respect to
/// concurrent readers.
#[async_trait]
pub trait ProgressStore<R>: Send + Sync {
    async fn load(&self) -> Result<Option<Checkpoint<R>>, CheckpointError>;
    async fn persist(&self, checkpoint: &Checkpoint<R>) -> Result<(), CheckpointError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Saving,
    Completed,
    Interrupted,
}

/// How prior progress is treated when a run opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Ignore any checkpoint and prior-run flags
    Fresh,
    /// Continue where the last checkpoint (or the input flags) left off
    Resume,
    /// Re-run the given models even if processed; keep other results
    Retry,
}

pub struct CheckpointManager<R, S> {
    store: S,
    checkpoint: Checkpoint<R>,
    phase: RunPhase,
    interval: usize,
    since_save: usize,
}

impl<R, S> CheckpointManager<R, S>
where
    R: ModelRecord + Clone + Send + Sync,
    S: ProgressStore<R>,
{
    /// Open a run over `models` (input order).
    ///
    /// `prior_processed` are models the input already flags as done.
    pub async fn open(
        store: S,
        models: &[String],
        prior_processed: Vec<String>,
        mode: ResumeMode,
        interval: usize,
    ) -> Result<Self, CheckpointError> {
        let checkpoint = match mode {
            ResumeMode::Fresh => {
                info!("🆕 Fresh start: ignoring previous progress");
                Checkpoint {
                    state: RunState::new(models, Vec::new()),
                    results: Vec::new(),
                }
            }
            ResumeMode::Resume => match store.load().await? {
                Some(mut loaded) => {
                    if loaded.state.input_fingerprint != fingerprint(models) {
                        warn!("⚠️ Input list changed since the checkpoint was written; resuming by model name");
                    }
                    loaded.state.processed_models.extend(prior_processed);
                    loaded.state.pending_models = loaded.state.pending_from(models);
                    loaded.state.input_fingerprint = fingerprint(models);
                    info!(
                        "🔄 Resuming run {}: {} processed, {} pending",
                        loaded.state.run_id,
                        loaded.state.processed_models.len(),
                        loaded.state.pending_models.len()
                    );
                    loaded
                }
                None => Checkpoint {
                    state: RunState::new(models, prior_processed),
                    results: Vec::new(),
                },
            },
            ResumeMode::Retry => {
                let mut results = Vec::new();
                let mut state = RunState::new(models, Vec::new());
                if let Some(loaded) = store.load().await? {
                    state.processed_models = loaded.state.processed_models;
                    for model in models {
                        state.processed_models.remove(model);
                    }
                    state.run_id = loaded.state.run_id;
                    results = loaded.results;
                }
                info!("🔁 Retrying {} model(s)", state.pending_models.len());
                Checkpoint { state, results }
            }
        };

        Ok(Self {
            store,
            checkpoint,
            phase: RunPhase::Idle,
            interval: interval.max(1),
            since_save: 0,
        })
    }

    pub fn begin(&mut self) {
        self.phase = RunPhase::Running;
    }

    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    pub const fn state(&self) -> &RunState {
        &self.checkpoint.state
    }

    pub fn results(&self) -> &[R] {
        &self.checkpoint.results
    }

    /// Pending models in input order.
    pub fn pending(&self) -> Vec<String> {
        self.checkpoint.state.pending_models.clone()
    }

    /// Record a model's result. Completed lookups are marked processed; a
    /// skipped model keeps its row but stays pending, so the next resume
    /// tries it again.
    pub fn record(&mut self, result: R) {
        let model = result.model().to_string();
        let skipped = result.status() == RecordStatus::Skipped;
        match self.checkpoint.results.iter().position(|r| r.model() == model) {
            Some(idx) => self.checkpoint.results[idx] = result,
            None => self.checkpoint.results.push(result),
        }
        if skipped {
            debug!("'{}' was skipped and stays pending", model);
            self.checkpoint.state.mark_unprocessed(&model);
        } else {
            self.checkpoint.state.mark_processed(&model);
        }
        self.since_save += 1;
    }

    /// Whether the periodic save interval has been reached.
    pub const fn save_due(&self) -> bool {
        self.since_save >= self.interval
    }

    /// Persist the current state and results.
    pub async fn save(&mut self) -> Result<(), CheckpointError> {
        let resume_phase = self.phase;
        self.phase = RunPhase::Saving;
        self.checkpoint.state.last_checkpoint_at = Some(Utc::now());

        let result = self.store.persist(&self.checkpoint).await;
        self.phase = resume_phase;
        result?;

        self.since_save = 0;
        info!(
            "💾 Checkpoint saved: {} processed, {} pending",
            self.checkpoint.state.processed_models.len(),
            self.checkpoint.state.pending_models.len()
        );
        Ok(())
    }

    /// Final save, then move to `Completed` or `Interrupted`.
    pub async fn finish(&mut self, interrupted: bool) -> Result<(), CheckpointError> {
        self.save().await?;
        self.phase = if interrupted { RunPhase::Interrupted } else { RunPhase::Completed };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::domain::LaunchRecord;

    /// In-memory store that counts writes.
    #[derive(Clone, Default)]
    struct MemoryStore {
        saved: Arc<Mutex<Option<Checkpoint<LaunchRecord>>>>,
        writes: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl ProgressStore<LaunchRecord> for MemoryStore {
        async fn load(&self) -> Result<Option<Checkpoint<LaunchRecord>>, CheckpointError> {
            Ok(self.saved.lock().unwrap().clone())
        }

        async fn persist(&self, checkpoint: &Checkpoint<LaunchRecord>) -> Result<(), CheckpointError> {
            *self.saved.lock().unwrap() = Some(checkpoint.clone());
            *self.writes.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn models(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("Phone {i}")).collect()
    }

    fn found(model: &str) -> LaunchRecord {
        LaunchRecord::new(model, Some("2023".into()), Some("GSMArena".into()), None)
    }

    #[tokio::test]
    async fn test_periodic_save_interval() {
        let store = MemoryStore::default();
        let input = models(5);
        let mut manager = CheckpointManager::open(store.clone(), &input, Vec::new(), ResumeMode::Resume, 2)
            .await
            .unwrap();
        manager.begin();

        manager.record(found("Phone 1"));
        assert!(!manager.save_due());
        manager.record(found("Phone 2"));
        assert!(manager.save_due());
        manager.save().await.unwrap();
        assert!(!manager.save_due());
        assert_eq!(manager.phase(), RunPhase::Running);
        assert_eq!(*store.writes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resume_skips_processed_and_keeps_results() {
        let store = MemoryStore::default();
        let input = models(4);
        let mut first = CheckpointManager::open(store.clone(), &input, Vec::new(), ResumeMode::Resume, 100)
            .await
            .unwrap();
        first.begin();
        first.record(found("Phone 2"));
        first.finish(true).await.unwrap();
        assert_eq!(first.phase(), RunPhase::Interrupted);

        let resumed = CheckpointManager::open(store.clone(), &input, vec!["Phone 4".into()], ResumeMode::Resume, 100)
            .await
            .unwrap();
        assert_eq!(resumed.pending(), vec!["Phone 1", "Phone 3"]);
        assert_eq!(resumed.results().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_reprocesses_and_replaces_rows() {
        let store = MemoryStore::default();
        let input = models(3);
        let mut first = CheckpointManager::open(store.clone(), &input, Vec::new(), ResumeMode::Fresh, 100)
            .await
            .unwrap();
        for m in &input {
            first.record(LaunchRecord::new(m, None, None, None));
        }
        first.finish(false).await.unwrap();

        let retry_list = vec!["Phone 2".to_string()];
        let mut retry = CheckpointManager::open(store.clone(), &retry_list, Vec::new(), ResumeMode::Retry, 100)
            .await
            .unwrap();
        assert_eq!(retry.pending(), vec!["Phone 2"]);

        retry.record(found("Phone 2"));
        assert_eq!(retry.results().len(), 3);
        assert_eq!(retry.results()[1].status(), RecordStatus::Found);
        assert!(retry.state().is_processed("Phone 1"));
    }

    #[tokio::test]
    async fn test_skipped_models_stay_pending_for_resume() {
        let store = MemoryStore::default();
        let input = models(3);
        let mut first = CheckpointManager::open(store.clone(), &input, Vec::new(), ResumeMode::Resume, 100)
            .await
            .unwrap();
        first.record(found("Phone 1"));
        first.record(LaunchRecord::skipped("Phone 2"));
        first.finish(true).await.unwrap();
        assert!(!first.state().is_processed("Phone 2"));
        assert_eq!(first.results().len(), 2);

        let resumed = CheckpointManager::open(store.clone(), &input, Vec::new(), ResumeMode::Resume, 100)
            .await
            .unwrap();
        assert_eq!(resumed.pending(), vec!["Phone 2", "Phone 3"]);
        assert_eq!(resumed.results()[1].status(), RecordStatus::Skipped);
    }
}
