//! # Morpho Core
//!
//! Error definitions and tracing setup shared by the Morpho crates.
//! Nothing in here knows about jobs; the scheduler lives in `morpho-jobs`.

pub mod error;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use result::*;
pub use telemetry::{init_telemetry, TelemetryConfig};
