//! Configuration loaders covering the success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use wifihal_config::{Config, LogFormat};

use crate::bootstrap::ConfigLoader;

/// Loader whose outcome is chosen by the scenario.
#[derive(Debug, Clone)]
pub enum TestConfigLoader {
    /// Returns a consistent configuration.
    Valid,
    /// Command-line parsing fails.
    Unparseable,
    /// Both channels ask for the same port slot.
    ConflictingSlots,
}

impl TestConfigLoader {
    /// Configuration handed out by [`TestConfigLoader::Valid`].
    #[must_use]
    pub fn valid_config() -> Config {
        Config {
            log_filter: "warn".to_owned(),
            log_format: LogFormat::Compact,
            ..Config::default()
        }
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        match self {
            Self::Valid => Ok(Self::valid_config()),
            Self::Unparseable => Config::load_from_iter([
                OsString::from("wifihald"),
                OsString::from("--command-port-slot"),
                OsString::from("not-a-number"),
            ]),
            Self::ConflictingSlots => Ok(Config {
                event_port_slot: Config::default().command_port_slot,
                ..Self::valid_config()
            }),
        }
    }
}
