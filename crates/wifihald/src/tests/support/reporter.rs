//! Health reporter double that records lifecycle events for assertions.

use std::sync::{Mutex, PoisonError};

use wifihal::LoopExit;
use wifihal_config::Config;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::process::TerminationSignal;

/// Lifecycle events observed during a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    EventLoopStarted,
    EventLoopStopped(LoopExit),
    ShutdownRequested(TerminationSignal),
    CleanupFinished { completed: bool },
}

impl HealthEvent {
    /// Short label used by feature files, e.g. `event_loop_stopped:shutdown`.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::BootstrapStarting => "bootstrap_starting".to_owned(),
            Self::BootstrapSucceeded => "bootstrap_succeeded".to_owned(),
            Self::BootstrapFailed(_) => "bootstrap_failed".to_owned(),
            Self::EventLoopStarted => "event_loop_started".to_owned(),
            Self::EventLoopStopped(LoopExit::Shutdown) => "event_loop_stopped:shutdown".to_owned(),
            Self::EventLoopStopped(LoopExit::HangUp) => "event_loop_stopped:hang_up".to_owned(),
            Self::EventLoopStopped(other) => format!("event_loop_stopped:{other:?}"),
            Self::ShutdownRequested(signal) => format!("shutdown_requested:{signal}"),
            Self::CleanupFinished { completed: true } => "cleanup_finished".to_owned(),
            Self::CleanupFinished { completed: false } => "cleanup_timed_out".to_owned(),
        }
    }
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Labels of the recorded events, in order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.events().iter().map(HealthEvent::label).collect()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn event_loop_started(&self) {
        self.record(HealthEvent::EventLoopStarted);
    }

    fn event_loop_stopped(&self, exit: LoopExit) {
        self.record(HealthEvent::EventLoopStopped(exit));
    }

    fn shutdown_requested(&self, signal: TerminationSignal) {
        self.record(HealthEvent::ShutdownRequested(signal));
    }

    fn cleanup_finished(&self, completed: bool) {
        self.record(HealthEvent::CleanupFinished { completed });
    }
}
