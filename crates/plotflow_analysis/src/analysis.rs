// SPDX-License-Identifier: MIT OR Apache-2.0
//! The analysis unit contract.

use crate::error::{AnalysisError, Result};
use crate::result::AnalysisOutput;

/// One or more coordinate axes of equal length
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Coordinates {
    axes: Vec<Vec<f64>>,
}

impl Coordinates {
    /// Coordinates with a single axis
    pub fn single(values: Vec<f64>) -> Self {
        Self { axes: vec![values] }
    }

    /// Coordinates with several axes; all must have the same length
    pub fn multi(axes: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(first) = axes.first() {
            if let Some(other) = axes.iter().find(|a| a.len() != first.len()) {
                return Err(AnalysisError::LengthMismatch {
                    coordinates: first.len(),
                    data: other.len(),
                });
            }
        }
        Ok(Self { axes })
    }

    /// Number of axes
    pub fn dimensions(&self) -> usize {
        self.axes.len()
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.axes.first().map_or(0, Vec::len)
    }

    /// Whether there are no points
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values of one axis
    pub fn axis(&self, index: usize) -> Option<&[f64]> {
        self.axes.get(index).map(Vec::as_slice)
    }

    /// Values of the first axis (empty when there are no axes)
    pub fn first(&self) -> &[f64] {
        self.axis(0).unwrap_or(&[])
    }
}

impl From<Vec<f64>> for Coordinates {
    fn from(values: Vec<f64>) -> Self {
        Self::single(values)
    }
}

/// Coordinates and aligned data stored by an analysis unit
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisInput {
    /// Coordinate axes
    pub coordinates: Coordinates,
    /// Data values, one per coordinate point
    pub data: Vec<f64>,
}

impl AnalysisInput {
    /// Create an input after checking that data and coordinates are aligned
    pub fn new(coordinates: impl Into<Coordinates>, data: Vec<f64>) -> Result<Self> {
        let coordinates = coordinates.into();
        check_aligned(&coordinates, &data)?;
        Ok(Self { coordinates, data })
    }
}

/// Fails unless `data` has one value per coordinate point and is not empty
pub fn check_aligned(coordinates: &Coordinates, data: &[f64]) -> Result<()> {
    if coordinates.len() != data.len() {
        return Err(AnalysisError::LengthMismatch {
            coordinates: coordinates.len(),
            data: data.len(),
        });
    }
    if data.is_empty() {
        return Err(AnalysisError::EmptyData);
    }
    Ok(())
}

/// A stateless computation over coordinates and data.
///
/// `analyze` must be a pure function of its arguments; `run` binds the
/// unit's stored input.
pub trait Analysis {
    /// Explicit per-call parameters
    type Options: Default;
    /// What the analysis produces
    type Output: AnalysisOutput;

    /// The stored coordinates and data
    fn input(&self) -> &AnalysisInput;

    /// Analyze the given coordinates and data
    fn analyze(
        &self,
        _coordinates: &Coordinates,
        _data: &[f64],
        _options: &Self::Options,
    ) -> Result<Self::Output> {
        Err(AnalysisError::NotImplementedCapability("analyze"))
    }

    /// Analyze the stored input
    fn run(&self, options: &Self::Options) -> Result<Self::Output> {
        let input = self.input();
        self.analyze(&input.coordinates, &input.data, options)
    }
}
