//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use wifihal::LoopExit;
use wifihal_config::Config;

use crate::bootstrap::BootstrapError;
use crate::process::TerminationSignal;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked once the engine is open and ready.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the event loop thread is running.
    fn event_loop_started(&self);

    /// Invoked when the event loop returns.
    fn event_loop_stopped(&self, exit: LoopExit);

    /// Invoked when a termination signal starts engine cleanup.
    fn shutdown_requested(&self, signal: TerminationSignal);

    /// Invoked when cleanup has finished, or gave up waiting.
    fn cleanup_finished(&self, completed: bool);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn event_loop_started(&self) {
        (**self).event_loop_started();
    }

    fn event_loop_stopped(&self, exit: LoopExit) {
        (**self).event_loop_stopped(exit);
    }

    fn shutdown_requested(&self, signal: TerminationSignal) {
        (**self).shutdown_requested(signal);
    }

    fn cleanup_finished(&self, completed: bool) {
        (**self).cleanup_finished(completed);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            family = %config.family_name(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn event_loop_started(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "event_loop_started",
            "event loop running"
        );
    }

    fn event_loop_stopped(&self, exit: LoopExit) {
        match exit {
            LoopExit::Shutdown => tracing::info!(
                target: HEALTH_TARGET,
                event = "event_loop_stopped",
                exit = ?exit,
                "event loop stopped"
            ),
            _ => tracing::warn!(
                target: HEALTH_TARGET,
                event = "event_loop_stopped",
                exit = ?exit,
                "event loop stopped without a shutdown request"
            ),
        }
    }

    fn shutdown_requested(&self, signal: TerminationSignal) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_requested",
            signal = signal.name(),
            "shutdown requested; cancelling commands and stopping the event loop"
        );
    }

    fn cleanup_finished(&self, completed: bool) {
        if completed {
            tracing::info!(
                target: HEALTH_TARGET,
                event = "cleanup_finished",
                "engine cleanup completed"
            );
        } else {
            tracing::error!(
                target: HEALTH_TARGET,
                event = "cleanup_finished",
                "engine cleanup did not complete in time"
            );
        }
    }
}
