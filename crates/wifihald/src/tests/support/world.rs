//! Scenario world for the bootstrap and lifecycle features.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use crate::bootstrap::{BootstrapError, Daemon, bootstrap_with};
use crate::process::LaunchError;
use crate::process::launch::{LaunchPlan, run_daemon_with};

use super::{EventChannel, FakeHalOpener, RecordingHealthReporter, TestConfigLoader, TestShutdown};

const TEST_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// State threaded through BDD steps.
pub struct TestWorld {
    loader: TestConfigLoader,
    events: EventChannel,
    opener_fails: bool,
    shutdown: TestShutdown,
    pub reporter: Arc<RecordingHealthReporter>,
    daemon: Option<Daemon>,
    bootstrap_error: Option<BootstrapError>,
    launch_result: Option<Result<(), LaunchError>>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            loader: TestConfigLoader::Valid,
            events: EventChannel::Quiet,
            opener_fails: false,
            shutdown: TestShutdown::Immediate,
            reporter: Arc::new(RecordingHealthReporter::default()),
            daemon: None,
            bootstrap_error: None,
            launch_result: None,
        }
    }

    pub fn use_loader(&mut self, loader: TestConfigLoader) {
        self.loader = loader;
    }

    pub fn use_events(&mut self, events: EventChannel) {
        self.events = events;
    }

    pub fn fail_engine_open(&mut self) {
        self.opener_fails = true;
    }

    pub fn use_shutdown(&mut self, shutdown: TestShutdown) {
        self.shutdown = shutdown;
    }

    fn opener(&self) -> FakeHalOpener {
        if self.opener_fails {
            FakeHalOpener::failing()
        } else {
            FakeHalOpener::new(self.events)
        }
    }

    /// Runs bootstrap only, keeping the daemon for inspection.
    pub fn bootstrap(&mut self) {
        let opener = self.opener();
        match bootstrap_with(&self.loader, self.reporter.clone(), &opener) {
            Ok(daemon) => self.daemon = Some(daemon),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// Runs the whole daemon lifecycle up to its exit.
    pub fn run(&mut self) {
        let plan = LaunchPlan {
            loader: self.loader.clone(),
            opener: self.opener(),
            shutdown: self.shutdown,
            reporter: self.reporter.clone(),
            shutdown_timeout: TEST_SHUTDOWN_TIMEOUT,
        };
        self.launch_result = Some(run_daemon_with(plan));
    }

    pub const fn daemon(&self) -> Option<&Daemon> {
        self.daemon.as_ref()
    }

    pub const fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    pub const fn launch_result(&self) -> Option<&Result<(), LaunchError>> {
        self.launch_result.as_ref()
    }
}

impl Drop for TestWorld {
    fn drop(&mut self) {
        if let Some(daemon) = self.daemon.take() {
            daemon.hal().cleanup(|| {});
        }
    }
}

/// Fixture used by scenario functions.
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
