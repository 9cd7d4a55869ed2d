//! Generate load against async operations, measure it, and catch regressions.
//!
//! Stampede drives a caller-supplied operation under a controlled concurrency or a
//! fixed arrival rate, records every call, and turns the outcomes into latency
//! percentiles, throughput and error statistics. Reports can be stored as named
//! baselines and later runs compared against them to classify regressions,
//! improvements and trends.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use stampede::analysis::{AnalyzerConfig, LoadTestMeasurement, MeasurementSet, PerformanceAnalyzer};
//! use stampede::generator::{GeneratorConfig, LoadGenerator};
//! use stampede::{target, LoadTestSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = reqwest_like_client();
//!     let target = target::from_fn(move || {
//!         let client = client.clone();
//!         async move { client.get("/health").await }
//!     });
//!
//!     let spec = LoadTestSpec::concurrency("health", 32, Duration::from_secs(30))
//!         .with_ramp_up(Duration::from_secs(5))
//!         .with_ramp_down(Duration::from_secs(2));
//!
//!     let generator = LoadGenerator::new(GeneratorConfig::default());
//!     let report = generator.run(&spec, target).await?;
//!     println!("{} requests, p95 {:.1}ms", report.total_requests, report.latency.p95_ms);
//!
//!     let mut analyzer = PerformanceAnalyzer::new(AnalyzerConfig::default());
//!     let current = MeasurementSet::new().with_load_test(LoadTestMeasurement::from(&report));
//!     analyzer.create_baseline("health", "1.0.0", current.clone());
//!     let result = analyzer.analyze("health", &current)?;
//!     println!("score: {}", result.overall_score);
//!     Ok(())
//! }
//! # #[derive(Clone)]
//! # struct Client;
//! # impl Client { async fn get(&self, _: &str) -> anyhow::Result<()> { Ok(()) } }
//! # fn reqwest_like_client() -> Client { Client }
//! ```
//!
//! # Architecture Overview
//!
//! - **[`generator::LoadGenerator`]** - Runs the warmup, ramp-up, sustained, ramp-down
//!   and cooldown phases against one [`target::Target`] on the current runtime
//! - **[`coordinator::DistributedCoordinator`]** - Splits a test across worker threads,
//!   each with its own runtime and generator, and merges the outcomes
//! - **[`sampler::ResourceSampler`]** - Samples process CPU, memory and load average
//! - **[`metrics`]** - Percentiles, throughput windows, outliers and correlation
//! - **[`analysis::PerformanceAnalyzer`]** - Baselines, regressions, trends and
//!   bottlenecks
//!
//! # Module Organization
//!
//! - [`types`] - Specs, outcomes, reports and resource samples
//! - [`target`] - The operation under test and closure adapters
//! - [`config`] - File and environment configuration
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types

pub mod analysis;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod generator;
pub mod metrics;
pub mod sampler;
pub mod target;
pub mod telemetry;
pub mod types;
pub mod utils;

pub use analysis::PerformanceAnalyzer;
pub use coordinator::DistributedCoordinator;
pub use error::StampedeError;
pub use generator::LoadGenerator;
pub use target::Target;
pub use types::*;

pub type Result<T> = std::result::Result<T, StampedeError>;
