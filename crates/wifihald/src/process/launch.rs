//! Runs the engine between bootstrap and a shutdown signal.

use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use wifihal::{Hal, LoopExit};

use crate::bootstrap::{
    ConfigLoader, HalOpener, SystemConfigLoader, SystemHalOpener, bootstrap_with,
};
use crate::health::{HealthReporter, StructuredHealthReporter};

use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::{EVENT_THREAD_NAME, PROCESS_TARGET, SHUTDOWN_TIMEOUT};

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<L, O, S> {
    pub(crate) loader: L,
    pub(crate) opener: O,
    pub(crate) shutdown: S,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) shutdown_timeout: Duration,
}

/// Runs the daemon using the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap fails, the event loop cannot be
/// started, or shutdown does not finish cleanly.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(LaunchPlan {
        loader: SystemConfigLoader,
        opener: SystemHalOpener,
        shutdown: SystemShutdownSignal,
        reporter: Arc::new(StructuredHealthReporter::new()),
        shutdown_timeout: SHUTDOWN_TIMEOUT,
    })
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<L, O, S>(plan: LaunchPlan<L, O, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    O: HalOpener,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        opener,
        shutdown,
        reporter,
        shutdown_timeout,
    } = plan;

    let daemon = bootstrap_with(&loader, Arc::clone(&reporter), &opener)?;
    let hal = daemon.hal();
    let event_loop = spawn_event_loop(&hal, Arc::clone(&reporter))?;

    info!(target: PROCESS_TARGET, "waiting for a termination signal");
    let waited = shutdown.wait();
    match &waited {
        Ok(signal) => reporter.shutdown_requested(*signal),
        Err(error) => {
            warn!(target: PROCESS_TARGET, %error, "shutting down without a signal");
        }
    }

    let completed = clean_up(&hal, shutdown_timeout);
    reporter.cleanup_finished(completed);
    if !completed {
        return Err(LaunchError::CleanupTimedOut {
            timeout: shutdown_timeout,
        });
    }
    event_loop
        .join()
        .map_err(|_| LaunchError::EventLoopPanicked)?;
    // Cleanup runs either way; a listener failure still fails the launch.
    waited?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}

/// Starts the event loop thread and returns once it owns the loop, or has
/// already returned.
fn spawn_event_loop(
    hal: &Arc<Hal>,
    reporter: Arc<dyn HealthReporter>,
) -> Result<JoinHandle<LoopExit>, LaunchError> {
    let (started_tx, started_rx) = mpsc::channel();
    let loop_hal = Arc::clone(hal);
    let start_reporter = Arc::clone(&reporter);
    let handle = thread::Builder::new()
        .name(EVENT_THREAD_NAME.to_owned())
        .spawn(move || {
            let exit = loop_hal.run_event_loop_notifying(move || {
                start_reporter.event_loop_started();
                started_tx.send(()).ok();
            });
            reporter.event_loop_stopped(exit);
            exit
        })
        .map_err(|source| LaunchError::SpawnEventLoop { source })?;
    if started_rx.recv().is_err() {
        warn!(target: PROCESS_TARGET, "event loop returned before starting");
    }
    Ok(handle)
}

/// Runs the two-phase cleanup and waits for its completion callback.
fn clean_up(hal: &Hal, timeout: Duration) -> bool {
    let (done_tx, done_rx) = mpsc::channel();
    hal.cleanup(move || {
        done_tx.send(()).ok();
    });
    done_rx.recv_timeout(timeout).is_ok()
}
