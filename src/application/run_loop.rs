//! Sequential per-model run loop
//!
//! Models are processed strictly in input order by one worker. Operator
//! signals (manual save, stop) arrive on a channel and are only looked at
//! between models, so an in-flight model is never cut short.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::checkpoint_manager::{CheckpointManager, ProgressStore};
use crate::application::query_generator::QueryGenerator;
use crate::application::session_supervisor::{ModelProcessor, SessionSupervisor, Supervised};
use crate::domain::{HarvestError, ModelRecord, RecordStatus};

/// Operator requests delivered to a running harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSignal {
    /// Persist progress at the next model boundary
    Save,
    /// Save and stop at the next model boundary
    Stop,
}

/// Sending half, handed to signal listeners.
#[derive(Debug, Clone)]
pub struct RunSignalSender {
    tx: UnboundedSender<RunSignal>,
    cancel: CancellationToken,
}

impl RunSignalSender {
    pub fn request_save(&self) {
        let _ = self.tx.send(RunSignal::Save);
    }

    pub fn request_stop(&self) {
        let _ = self.tx.send(RunSignal::Stop);
        self.cancel.cancel();
    }

    /// True once the receiving run has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Token cancelled once a stop has been requested.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Receiving half, polled by the run loop without blocking.
#[derive(Debug)]
pub struct RunSignals {
    rx: UnboundedReceiver<RunSignal>,
    cancel: CancellationToken,
}

/// Pending requests collected at one model boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requests {
    pub save: bool,
    pub stop: bool,
}

impl RunSignals {
    pub fn channel() -> (RunSignalSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        (
            RunSignalSender { tx, cancel: cancel.clone() },
            Self { rx, cancel },
        )
    }

    /// Drain every queued request.
    pub fn poll(&mut self) -> Requests {
        let mut requests = Requests {
            save: false,
            stop: self.cancel.is_cancelled(),
        };
        while let Ok(signal) = self.rx.try_recv() {
            match signal {
                RunSignal::Save => requests.save = true,
                RunSignal::Stop => requests.stop = true,
            }
        }
        requests
    }
}

/// Totals for one run, logged at completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub found: usize,
    pub not_found: usize,
    pub skipped: usize,
    pub interrupted: bool,
}

impl RunSummary {
    fn count(&mut self, status: RecordStatus) {
        self.processed += 1;
        match status {
            RecordStatus::Found => self.found += 1,
            RecordStatus::NotFound => self.not_found += 1,
            RecordStatus::Skipped => self.skipped += 1,
        }
    }
}

/// One harvesting run over the pending models of a checkpoint.
pub struct HarvestRun<P: ModelProcessor, S> {
    processor: P,
    supervisor: SessionSupervisor,
    checkpoint: CheckpointManager<P::Output, S>,
    generator: QueryGenerator,
    test_limit: Option<usize>,
}

impl<P, S> HarvestRun<P, S>
where
    P: ModelProcessor,
    S: ProgressStore<P::Output>,
{
    pub fn new(
        processor: P,
        supervisor: SessionSupervisor,
        checkpoint: CheckpointManager<P::Output, S>,
        generator: QueryGenerator,
    ) -> Self {
        Self {
            processor,
            supervisor,
            checkpoint,
            generator,
            test_limit: None,
        }
    }

    /// Process only the first `limit` pending models.
    #[must_use]
    pub fn with_test_limit(mut self, limit: Option<usize>) -> Self {
        self.test_limit = limit;
        self
    }

    pub const fn checkpoint(&self) -> &CheckpointManager<P::Output, S> {
        &self.checkpoint
    }

    /// Run every pending model, then save a final checkpoint.
    ///
    /// Only checkpoint failures end the run early with an error.
    pub async fn execute(&mut self, signals: &mut RunSignals) -> Result<RunSummary, HarvestError> {
        let mut pending = self.checkpoint.pending();
        if let Some(limit) = self.test_limit {
            info!("🧪 Test mode: limiting run to {} model(s)", limit);
            pending.truncate(limit);
        }

        let total = pending.len();
        info!("🚀 Starting run on {}: {} model(s) pending", self.supervisor.source().name(), total);
        self.checkpoint.begin();

        let mut summary = RunSummary::default();
        for (idx, model) in pending.iter().enumerate() {
            let requests = signals.poll();
            if requests.save {
                info!("💾 Manual save requested");
                self.checkpoint.save().await?;
            }
            if requests.stop {
                warn!("🛑 Stop requested; {} model(s) left pending", total - idx);
                summary.interrupted = true;
                break;
            }

            info!("[{}/{}] 📱 {}", idx + 1, total, model);
            let record = self.process_model(model).await;
            summary.count(record.status());
            self.checkpoint.record(record);

            if self.checkpoint.save_due() {
                self.checkpoint.save().await?;
            }
            self.supervisor.after_model().await;
        }

        self.checkpoint.finish(summary.interrupted).await?;
        info!(
            "🎉 Run {}: {} processed, {} found, {} not found, {} skipped, {} session restart(s)",
            if summary.interrupted { "interrupted" } else { "completed" },
            summary.processed,
            summary.found,
            summary.not_found,
            summary.skipped,
            self.supervisor.total_restarts()
        );
        Ok(summary)
    }

    async fn process_model(&mut self, model: &str) -> P::Output {
        let query = match self.generator.generate(model) {
            Ok(query) => query,
            Err(e) => {
                warn!("⏭️ Skipping '{}': {}", model, e);
                return self.processor.skipped(model, &e.to_string());
            }
        };

        match self.supervisor.run_model(&self.processor, &query).await {
            Supervised::Completed(record) => record,
            Supervised::Skipped(e) => {
                warn!("⏭️ Skipping '{}': {}", model, e);
                self.processor.skipped(model, &e.to_string())
            }
            Supervised::Failed(e) => {
                warn!("⏭️ Skipping '{}' after page error: {}", model, e);
                self.processor.skipped(model, &e.to_string())
            }
        }
    }
}
