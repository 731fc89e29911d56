//! Session-health supervision around the per-model loop
//!
//! The supervisor owns the page source and its [`SessionHealth`]. A model
//! is processed against the current session; a first timeout marks the
//! session suspect and the model is retried once, a second timeout (or an
//! unresponsive session) triggers a restart and one more attempt on the
//! fresh session. A model whose fresh-session attempt still fails is
//! skipped, never the whole run.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::domain::{HealthState, ModelQuery, ModelRecord, PageError, PageSource, SessionError, SessionHealth};
use crate::infrastructure::config::SessionConfig;
use crate::infrastructure::retry_calculator::RetryCalculator;

/// Per-model work driven by the run loop.
#[async_trait]
pub trait ModelProcessor: Send + Sync {
    type Output: ModelRecord + Clone + Send + Sync;

    /// Process one model against the current session.
    ///
    /// Only session faults (timeouts, unresponsive session) should be
    /// returned as errors; page-level problems are expected to end in a
    /// not-found result instead.
    async fn process(&self, source: &dyn PageSource, query: &ModelQuery) -> Result<Self::Output, PageError>;

    /// Record for a model that could not be processed.
    fn skipped(&self, model: &str, reason: &str) -> Self::Output;
}

/// Outcome of one supervised model.
#[derive(Debug, Clone)]
pub enum Supervised<T> {
    Completed(T),
    /// The session could not serve this model
    Skipped(SessionError),
    /// A non-session error escaped the processor
    Failed(PageError),
}

pub struct SessionSupervisor {
    source: Box<dyn PageSource>,
    health: SessionHealth,
    restart_budget: u32,
    backoff: RetryCalculator,
    refresh_interval: usize,
    since_refresh: usize,
    total_restarts: u32,
}

impl SessionSupervisor {
    pub fn new(source: Box<dyn PageSource>, session: &SessionConfig, refresh_interval: usize) -> Self {
        Self {
            source,
            health: SessionHealth::new(),
            restart_budget: session.restart_budget.max(1),
            backoff: RetryCalculator::new(
                session.restart_budget,
                session.restart_base_delay_ms,
                session.restart_max_delay_ms,
                2.0,
                true,
            ),
            refresh_interval,
            since_refresh: 0,
            total_restarts: 0,
        }
    }

    pub fn source(&self) -> &dyn PageSource {
        self.source.as_ref()
    }

    pub const fn health(&self) -> &SessionHealth {
        &self.health
    }

    /// Successful restarts over the supervisor's lifetime.
    pub const fn total_restarts(&self) -> u32 {
        self.total_restarts
    }

    /// Run one model under supervision.
    pub async fn run_model<P: ModelProcessor>(&mut self, processor: &P, query: &ModelQuery) -> Supervised<P::Output> {
        if self.health.state == HealthState::Fatal {
            // A previous model exhausted the budget; give this one a fresh try.
            self.health.rearm();
        }
        if self.health.needs_restart() {
            if let Err(e) = self.restart().await {
                return Supervised::Skipped(e);
            }
        }

        let mut restarted = false;
        loop {
            let fault = match processor.process(self.source.as_ref(), query).await {
                Ok(output) => {
                    self.health.on_success();
                    return Supervised::Completed(output);
                }
                Err(e) if !e.is_session_fault() => return Supervised::Failed(e),
                Err(e) => e,
            };

            let state = if fault.is_timeout() {
                self.health.on_timeout()
            } else {
                self.health.on_unresponsive()
            };
            warn!("⚠️ Session fault on '{}' ({:?}): {}", query, state, fault);

            if restarted {
                return Supervised::Skipped(if fault.is_timeout() {
                    SessionError::Timeout(fault.to_string())
                } else {
                    SessionError::Unrecoverable {
                        restarts: 1,
                        last_error: fault.to_string(),
                    }
                });
            }

            match state {
                HealthState::Healthy | HealthState::Suspect => {
                    info!("🔁 Retrying '{}' on the current session", query);
                }
                HealthState::Restarting => {
                    if let Err(e) = self.restart().await {
                        return Supervised::Skipped(e);
                    }
                    restarted = true;
                    info!("🔁 Retrying '{}' on a fresh session", query);
                }
                HealthState::Fatal => {
                    return Supervised::Skipped(SessionError::Unrecoverable {
                        restarts: self.health.failed_restarts,
                        last_error: fault.to_string(),
                    });
                }
            }
        }
    }

    /// Count a finished model and refresh the session when due.
    pub async fn after_model(&mut self) {
        self.since_refresh += 1;
        if self.refresh_interval == 0 || self.since_refresh < self.refresh_interval {
            return;
        }
        info!("🔄 Periodic session refresh after {} models", self.since_refresh);
        if let Err(e) = self.restart().await {
            error!("❌ Periodic session refresh failed: {}", e);
        }
    }

    /// Replace the session, retrying with backoff until the budget runs out.
    async fn restart(&mut self) -> Result<(), SessionError> {
        self.since_refresh = 0;
        let mut attempt = 0;
        loop {
            match self.source.reset().await {
                Ok(()) => {
                    self.health.on_restart_succeeded();
                    self.total_restarts += 1;
                    info!("✅ Session restarted on {}", self.source.name());
                    return Ok(());
                }
                Err(e) => {
                    if self.health.on_restart_failed(self.restart_budget) == HealthState::Fatal {
                        error!("❌ Session restart budget exhausted: {}", e);
                        return Err(SessionError::Unrecoverable {
                            restarts: self.health.failed_restarts,
                            last_error: e.to_string(),
                        });
                    }
                    attempt += 1;
                    let delay = self.backoff.calculate_delay(attempt);
                    warn!("🔄 Session restart attempt {} failed, retrying in {:?}: {}", attempt, delay, e);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
