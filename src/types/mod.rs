//! Core data model shared by the generator, coordinator and analyzer.

pub mod outcome;
pub mod report;
pub mod resources;
pub mod spec;

pub use outcome::*;
pub use report::*;
pub use resources::*;
pub use spec::*;

/// Identifier of a single load test run
pub type RunId = uuid::Uuid;
