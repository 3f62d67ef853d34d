//! Daemon test suites.
