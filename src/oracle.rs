//! Boundary to the external legality and execution oracle.
//!
//! The oracle compiles the backend code of a schedule against the original
//! program and runs it. This crate only defines the contract; failures of
//! the oracle itself surface as [`OracleError::ExecutionCrashed`] and are
//! never read as an illegal schedule.

use crate::schedule::Schedule;

pub use crate::utils::errors::OracleError;

/// External legality checker and benchmark runner.
pub trait LegalityOracle {
    /// Whether the schedule preserves the program semantics.
    fn check(&self, schedule: &Schedule) -> anyhow::Result<bool>;

    /// Execution time samples of the scheduled program.
    fn run(&self, schedule: &Schedule, n_samples: usize) -> anyhow::Result<Vec<f64>>;
}
