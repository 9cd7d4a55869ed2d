//! Observability for load test runs.
//!
//! Everything in the crate logs through `tracing`: phase transitions at `info`,
//! scheduling decisions at `debug`, worker failures and leak suspicions at `warn`
//! and abandoned requests at `error`. Install a subscriber with [`init_logging`]
//! or bring your own.

pub mod logging;

pub use logging::{init_logging, LoggingConfig, LoggingGuard};
