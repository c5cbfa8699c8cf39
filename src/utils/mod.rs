//! Utility modules shared across the crate.
//!
//! - Error types
//! - Integer matrices for the generic matrix transformation

pub mod errors;
pub mod matrix;

// Re-exports
pub use errors::*;
pub use matrix::TransformMatrix;
