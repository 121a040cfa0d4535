//! Xlatbench Common - shared types for the benchmark tester
//!
//! This crate provides the core types, the configuration surface, and the
//! error taxonomy used across the xlatbench workspace.
//!
//! Key features:
//! - Plain-old-data types with public fields for hot-path access
//! - serde-backed configuration with full cross-field validation
//! - A single typed error enum covering every failure the tester reports

pub mod config;
pub mod error;
pub mod params;
pub mod types;

// Re-export commonly used items
pub use config::Config;
pub use error::{BenchError, BenchResult};
pub use params::{LatencyParams, StatefulParams, TestParams};
pub use types::{
    Direction, EnumMode, FourTuple, IpVersion, MacAddr, PortRange, StatefulMode, TupleSelect,
    VarMode,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
