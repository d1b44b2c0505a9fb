// SPDX-License-Identifier: MIT OR Apache-2.0
//! Locate the maximum of a data trace.

use crate::analysis::{check_aligned, Analysis, AnalysisInput, Coordinates};
use crate::error::{AnalysisError, Result};
use crate::result::{AnalysisResult, Parameter};

/// Finds the largest data value and the coordinate where it occurs.
///
/// Produces `max_val` and `max_pos` (taken from the first coordinate axis).
/// NaN entries are skipped; ties resolve to the first occurrence.
#[derive(Debug, Clone)]
pub struct FindMax {
    input: AnalysisInput,
}

impl FindMax {
    /// Create the analysis over the given input
    pub fn new(coordinates: impl Into<Coordinates>, data: Vec<f64>) -> Result<Self> {
        Ok(Self {
            input: AnalysisInput::new(coordinates, data)?,
        })
    }
}

impl Analysis for FindMax {
    type Options = ();
    type Output = AnalysisResult;

    fn input(&self) -> &AnalysisInput {
        &self.input
    }

    fn analyze(&self, coordinates: &Coordinates, data: &[f64], _options: &()) -> Result<AnalysisResult> {
        check_aligned(coordinates, data)?;

        let mut best: Option<(usize, f64)> = None;
        for (i, &value) in data.iter().enumerate() {
            if value.is_nan() {
                continue;
            }
            match best {
                Some((_, current)) if value <= current => {}
                _ => best = Some((i, value)),
            }
        }
        let (index, max_val) = best.ok_or(AnalysisError::EmptyData)?;

        let mut result = AnalysisResult::new();
        result.add(Parameter::new("max_val", max_val));
        result.add(Parameter::new("max_pos", coordinates.first()[index]));
        Ok(result)
    }
}
