//! `wifihald` entry point.

use std::process::ExitCode;

// Telemetry may not be installed yet when bootstrap fails.
#[expect(clippy::print_stderr, reason = "last-resort report before exit")]
fn main() -> ExitCode {
    match wifihald::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("wifihald: {error}");
            ExitCode::FAILURE
        }
    }
}
