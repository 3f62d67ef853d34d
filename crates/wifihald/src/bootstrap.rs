//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use wifihal::{Hal, HalError};
use wifihal_config::{Config, ConfigValidationError};

use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a configuration resolved ahead of time.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Opens the engine once configuration and telemetry are in place.
pub trait HalOpener: Send + Sync {
    /// Builds a ready engine for `config`.
    fn open(&self, config: &Config) -> Result<Hal, HalError>;
}

/// Opener that talks to the kernel through [`Hal::initialize`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHalOpener;

impl HalOpener for SystemHalOpener {
    fn open(&self, config: &Config) -> Result<Hal, HalError> {
        Hal::initialize(config)
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Configuration loaded but is inconsistent.
    #[error("invalid configuration: {source}")]
    InvalidConfiguration {
        /// First inconsistency found.
        #[source]
        source: ConfigValidationError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The engine could not be opened.
    #[error("failed to open the wifi HAL engine: {source}")]
    Engine {
        /// Underlying engine error.
        #[source]
        source: HalError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    hal: Arc<Hal>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Shared handle to the running engine.
    #[must_use]
    pub fn hal(&self) -> Arc<Hal> {
        Arc::clone(&self.hal)
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Reporter that observed the bootstrap.
    #[must_use]
    pub fn reporter(&self) -> Arc<dyn HealthReporter> {
        Arc::clone(&self.reporter)
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// # Errors
///
/// Returns the first stage that failed; the reporter has already been told.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    opener: &dyn HalOpener,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    let fail = |error: BootstrapError| {
        reporter.bootstrap_failed(&error);
        error
    };

    let config = loader
        .load()
        .map_err(|source| fail(BootstrapError::Configuration { source }))?;
    config
        .validate()
        .map_err(|source| fail(BootstrapError::InvalidConfiguration { source }))?;
    let telemetry = telemetry::initialise(&config)
        .map_err(|source| fail(BootstrapError::Telemetry { source }))?;
    let hal = opener
        .open(&config)
        .map_err(|source| fail(BootstrapError::Engine { source }))?;

    reporter.bootstrap_succeeded(&config);
    Ok(Daemon {
        config,
        hal: Arc::new(hal),
        telemetry,
        reporter,
    })
}
