//! Termination signals that start the engine's cleanup.

use std::fmt;
use std::io;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{debug, info};

use super::PROCESS_TARGET;

/// Process signals that end the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// `SIGTERM`, sent by the service manager.
    Terminate,
    /// `SIGINT`, usually an interactive stop.
    Interrupt,
    /// `SIGQUIT`.
    Quit,
    /// `SIGHUP`. The daemon has no reloadable state, so it stops.
    HangUp,
}

impl TerminationSignal {
    /// Every signal the daemon listens for.
    pub const ALL: [Self; 4] = [Self::Terminate, Self::Interrupt, Self::Quit, Self::HangUp];

    /// Maps a raw signal number onto a termination signal.
    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|signal| signal.raw() == raw)
    }

    /// Raw signal number.
    #[must_use]
    pub const fn raw(self) -> i32 {
        match self {
            Self::Terminate => SIGTERM,
            Self::Interrupt => SIGINT,
            Self::Quit => SIGQUIT,
            Self::HangUp => SIGHUP,
        }
    }

    /// Conventional signal name, e.g. `SIGTERM`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Terminate => "SIGTERM",
            Self::Interrupt => "SIGINT",
            Self::Quit => "SIGQUIT",
            Self::HangUp => "SIGHUP",
        }
    }
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Blocks the launch sequence until the daemon should tear the engine down.
pub trait ShutdownSignal: Send + Sync {
    /// Returns the signal that requested shutdown.
    fn wait(&self) -> Result<TerminationSignal, ShutdownError>;
}

/// Failures while listening for termination signals.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The listener stopped before any termination signal arrived.
    #[error("signal listener closed before a termination signal arrived")]
    ListenerClosed,
}

/// Listens for [`TerminationSignal::ALL`] on the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<TerminationSignal, ShutdownError> {
        let mut signals = Signals::new(TerminationSignal::ALL.map(TerminationSignal::raw))
            .map_err(|source| ShutdownError::Install { source })?;
        debug!(target: PROCESS_TARGET, "termination signal handlers installed");
        let signal = signals
            .forever()
            .find_map(TerminationSignal::from_raw)
            .ok_or(ShutdownError::ListenerClosed)?;
        info!(
            target: PROCESS_TARGET,
            %signal,
            "termination signal received; starting engine cleanup"
        );
        Ok(signal)
    }
}
