//! Health state machine for one browsing session
//!
//! ```text
//! Healthy --timeout--> Suspect --timeout | unresponsive--> Restarting
//! Restarting --restart ok--> Healthy
//! Restarting --restart failed, budget exhausted--> Fatal
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Suspect,
    Restarting,
    Fatal,
}

/// Health bookkeeping bound to one session instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHealth {
    pub state: HealthState,
    pub consecutive_timeouts: u32,
    /// Failed restart attempts since the last successful one
    pub failed_restarts: u32,
}

impl Default for SessionHealth {
    fn default() -> Self {
        Self {
            state: HealthState::Healthy,
            consecutive_timeouts: 0,
            failed_restarts: 0,
        }
    }
}

impl SessionHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// An operation completed normally.
    pub fn on_success(&mut self) {
        if matches!(self.state, HealthState::Healthy | HealthState::Suspect) {
            self.state = HealthState::Healthy;
            self.consecutive_timeouts = 0;
        }
    }

    /// An operation exceeded its timeout.
    pub fn on_timeout(&mut self) -> HealthState {
        self.consecutive_timeouts += 1;
        self.state = match self.state {
            HealthState::Healthy => HealthState::Suspect,
            HealthState::Suspect | HealthState::Restarting => HealthState::Restarting,
            HealthState::Fatal => HealthState::Fatal,
        };
        self.state
    }

    /// The backend reported the session as dead; skip straight to a restart.
    pub fn on_unresponsive(&mut self) -> HealthState {
        if self.state != HealthState::Fatal {
            self.state = HealthState::Restarting;
        }
        self.state
    }

    /// A fresh session is up.
    pub fn on_restart_succeeded(&mut self) {
        self.state = HealthState::Healthy;
        self.consecutive_timeouts = 0;
        self.failed_restarts = 0;
    }

    /// A restart attempt failed; `budget` is the number of attempts allowed.
    pub fn on_restart_failed(&mut self, budget: u32) -> HealthState {
        self.failed_restarts += 1;
        self.state = if self.failed_restarts >= budget {
            HealthState::Fatal
        } else {
            HealthState::Restarting
        };
        self.state
    }

    /// Ask for a restart again after a fatal state, e.g. at the next model.
    pub fn rearm(&mut self) {
        if self.state == HealthState::Fatal {
            self.state = HealthState::Restarting;
            self.failed_restarts = 0;
        }
    }

    pub const fn needs_restart(&self) -> bool {
        matches!(self.state, HealthState::Restarting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_timeouts_lead_to_restart_and_recover() {
        let mut health = SessionHealth::new();
        assert_eq!(health.on_timeout(), HealthState::Suspect);
        assert_eq!(health.on_timeout(), HealthState::Restarting);
        assert_eq!(health.consecutive_timeouts, 2);

        health.on_restart_succeeded();
        assert_eq!(health.state, HealthState::Healthy);
        assert_eq!(health.consecutive_timeouts, 0);
    }

    #[test]
    fn test_success_clears_suspicion() {
        let mut health = SessionHealth::new();
        health.on_timeout();
        health.on_success();
        assert_eq!(health, SessionHealth::new());
    }

    #[test]
    fn test_unresponsive_skips_suspect() {
        let mut health = SessionHealth::new();
        assert_eq!(health.on_unresponsive(), HealthState::Restarting);
    }

    #[test]
    fn test_restart_budget_exhaustion_is_fatal() {
        let mut health = SessionHealth::new();
        health.on_unresponsive();
        assert_eq!(health.on_restart_failed(2), HealthState::Restarting);
        assert_eq!(health.on_restart_failed(2), HealthState::Fatal);

        health.on_timeout();
        assert_eq!(health.state, HealthState::Fatal);

        health.rearm();
        assert!(health.needs_restart());
    }
}
