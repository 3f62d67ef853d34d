//! Daemon wrapper around the wifi HAL engine.
//!
//! The daemon loads configuration through [`wifihal_config`], installs
//! structured telemetry, opens the engine and runs its event loop on a
//! dedicated thread. A termination signal triggers the engine's two-phase
//! cleanup; the process waits for the completion callback, bounded by a
//! shutdown budget, before joining the loop thread and exiting.
//!
//! Configuration loading, engine opening and signal handling sit behind
//! traits so the whole lifecycle can be exercised without a kernel.

mod bootstrap;
mod health;
mod process;
mod telemetry;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, HalOpener, StaticConfigLoader, SystemConfigLoader,
    SystemHalOpener, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, ShutdownError, TerminationSignal, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
