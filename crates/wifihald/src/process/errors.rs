//! Error surface for running the daemon process.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::bootstrap::BootstrapError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrap failed before the event loop was started.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The event loop thread could not be spawned.
    #[error("failed to spawn the event loop thread: {source}")]
    SpawnEventLoop {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Waiting for a shutdown signal failed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
    /// Cleanup did not report completion within the shutdown budget.
    #[error("engine cleanup did not complete within {timeout:?}")]
    CleanupTimedOut {
        /// Budget that elapsed.
        timeout: Duration,
    },
    /// The event loop thread panicked.
    #[error("the event loop thread panicked")]
    EventLoopPanicked,
}
