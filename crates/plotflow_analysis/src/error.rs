// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for analysis and fitting.

use thiserror::Error;

/// Errors raised by analysis units
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// A required capability was not provided by the concrete analysis
    #[error("Capability not implemented: {0}")]
    NotImplementedCapability(&'static str),

    /// The optimizer failed to converge
    #[error("Fit diverged after {iterations} iterations: {reason}")]
    FitDivergence {
        /// Iterations performed before giving up
        iterations: usize,
        /// Human readable cause
        reason: String,
    },

    /// No usable data points
    #[error("No usable data points")]
    EmptyData,

    /// Coordinates and data are not aligned
    #[error("Length mismatch: {coordinates} coordinate points, {data} data points")]
    LengthMismatch {
        /// Number of coordinate points
        coordinates: usize,
        /// Number of data points
        data: usize,
    },

    /// A parameter name that the model does not declare
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// A parameter with neither a guessed nor a supplied value
    #[error("No initial value for parameter: {0}")]
    MissingInitialValue(String),
}

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;
