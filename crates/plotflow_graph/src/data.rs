// SPDX-License-Identifier: MIT OR Apache-2.0
//! Labeled data containers flowing between nodes.
//!
//! A [`DataDict`] holds named fields. Fields that declare axes are
//! *dependents*; the fields they name are their axes. Tabular data stores
//! one record per index; meshgrid data additionally carries a grid shape and
//! stores every field flattened in row-major order over that grid.
//!
//! Node code only relies on the operations exposed here: dependent lookup,
//! axis names, raw values, shapes, copies and structural validation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Layout of a data container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    /// Flat records, all fields of equal length
    Tabular,
    /// Values on a regular grid of known shape
    Meshgrid,
}

/// A named field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataField {
    /// Raw values (row-major for meshgrid data)
    pub values: Vec<f64>,
    /// Axis names; empty for independent fields
    #[serde(default)]
    pub axes: Vec<String>,
    /// Physical unit
    #[serde(default)]
    pub unit: String,
}

impl DataField {
    /// Create an independent field
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            axes: Vec::new(),
            unit: String::new(),
        }
    }

    /// Declare the axes this field depends on
    pub fn with_axes<S: AsRef<str>>(mut self, axes: &[S]) -> Self {
        self.axes = axes.iter().map(|a| a.as_ref().to_string()).collect();
        self
    }

    /// Set the unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Structural problems found by [`DataDict::validate`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    /// A dependent names an axis that is not a field
    #[error("Dependent '{dependent}' refers to unknown axis '{axis}'")]
    UnknownAxis {
        /// Dependent name
        dependent: String,
        /// Missing axis
        axis: String,
    },

    /// A field does not have the expected number of values
    #[error("Field '{field}' has {found} values, expected {expected}")]
    LengthMismatch {
        /// Field name
        field: String,
        /// Expected length
        expected: usize,
        /// Actual length
        found: usize,
    },

    /// A dependent's axes do not match the grid dimensionality
    #[error("Dependent '{dependent}' has {axes} axes but the grid has {dimensions} dimensions")]
    DimensionMismatch {
        /// Dependent name
        dependent: String,
        /// Number of declared axes
        axes: usize,
        /// Grid dimensionality
        dimensions: usize,
    },
}

/// Ordered collection of named fields with declared axis relationships
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDict {
    kind: DataKind,
    #[serde(default)]
    shape: Vec<usize>,
    fields: IndexMap<String, DataField>,
}

impl DataDict {
    /// Create an empty tabular container
    pub fn tabular() -> Self {
        Self {
            kind: DataKind::Tabular,
            shape: Vec::new(),
            fields: IndexMap::new(),
        }
    }

    /// Create an empty meshgrid container of the given shape
    pub fn meshgrid(shape: Vec<usize>) -> Self {
        Self {
            kind: DataKind::Meshgrid,
            shape,
            fields: IndexMap::new(),
        }
    }

    /// Create a meshgrid whose axis fields span the outer product of `axes`
    pub fn meshgrid_from_axes<S: Into<String>>(axes: Vec<(S, Vec<f64>)>) -> Self {
        let shape: Vec<usize> = axes.iter().map(|(_, v)| v.len()).collect();
        let total: usize = shape.iter().product();
        let mut data = Self::meshgrid(shape.clone());

        for (dim, (name, values)) in axes.into_iter().enumerate() {
            let inner: usize = shape[dim + 1..].iter().product();
            let grid = (0..total)
                .map(|flat| values[(flat / inner) % shape[dim]])
                .collect();
            data.fields.insert(name.into(), DataField::new(grid));
        }
        data
    }

    /// Add an independent field
    pub fn with_axis(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.fields.insert(name.into(), DataField::new(values));
        self
    }

    /// Add a dependent field over the given axes
    pub fn with_dependent<S: AsRef<str>>(mut self, name: impl Into<String>, values: Vec<f64>, axes: &[S]) -> Self {
        self.fields.insert(name.into(), DataField::new(values).with_axes(axes));
        self
    }

    /// Insert or replace a field
    pub fn insert_field(&mut self, name: impl Into<String>, field: DataField) {
        self.fields.insert(name.into(), field);
    }

    /// Container layout
    pub fn kind(&self) -> DataKind {
        self.kind
    }

    /// Grid shape (empty for tabular data)
    pub fn grid_shape(&self) -> &[usize] {
        &self.shape
    }

    /// Whether the container carries no values at all
    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|f| f.values.is_empty())
    }

    /// Whether `name` is a dependent field
    pub fn has_dependent(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|f| !f.axes.is_empty())
    }

    /// Names of all dependent fields, in insertion order
    pub fn dependents(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(_, f)| !f.axes.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Axis names of a dependent
    pub fn axes_of(&self, dependent: &str) -> Option<&[String]> {
        self.fields
            .get(dependent)
            .filter(|f| !f.axes.is_empty())
            .map(|f| f.axes.as_slice())
    }

    /// Every axis used by any dependent, in first-seen order
    pub fn axes(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for field in self.fields.values() {
            for axis in &field.axes {
                if !out.contains(axis) {
                    out.push(axis.clone());
                }
            }
        }
        out
    }

    /// Get a field
    pub fn field(&self, name: &str) -> Option<&DataField> {
        self.fields.get(name)
    }

    /// Field names in insertion order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Raw values of a field
    pub fn values(&self, name: &str) -> Option<&[f64]> {
        self.fields.get(name).map(|f| f.values.as_slice())
    }

    /// Mutable raw values of a field
    pub fn values_mut(&mut self, name: &str) -> Option<&mut Vec<f64>> {
        self.fields.get_mut(name).map(|f| &mut f.values)
    }

    /// Shape of a field: the grid shape for meshgrids, `[len]` otherwise
    pub fn shape_of(&self, name: &str) -> Option<Vec<usize>> {
        let field = self.fields.get(name)?;
        Some(match self.kind {
            DataKind::Meshgrid => self.shape.clone(),
            DataKind::Tabular => vec![field.values.len()],
        })
    }

    /// Shapes of every field
    pub fn shapes(&self) -> IndexMap<String, Vec<usize>> {
        self.fields
            .keys()
            .filter_map(|name| self.shape_of(name).map(|s| (name.clone(), s)))
            .collect()
    }

    /// Independent copy of the container
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Check the structural invariants of the container
    pub fn validate(&self) -> Result<(), DataError> {
        for (name, field) in &self.fields {
            if let Some(axis) = field.axes.iter().find(|a| !self.fields.contains_key(a.as_str())) {
                return Err(DataError::UnknownAxis {
                    dependent: name.clone(),
                    axis: axis.clone(),
                });
            }
        }

        let expected = match self.kind {
            DataKind::Meshgrid => Some(self.shape.iter().product()),
            DataKind::Tabular => self.fields.values().next().map(|f| f.values.len()),
        };
        if let Some(expected) = expected {
            for (name, field) in &self.fields {
                if field.values.len() != expected {
                    return Err(DataError::LengthMismatch {
                        field: name.clone(),
                        expected,
                        found: field.values.len(),
                    });
                }
            }
        }

        if self.kind == DataKind::Meshgrid {
            for (name, field) in &self.fields {
                if !field.axes.is_empty() && field.axes.len() != self.shape.len() {
                    return Err(DataError::DimensionMismatch {
                        dependent: name.clone(),
                        axes: field.axes.len(),
                        dimensions: self.shape.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Mean of a meshgrid field along grid dimension `axis`, broadcast back
    /// to the full grid so every element holds the mean of its line.
    ///
    /// Returns `None` for tabular data, unknown fields or dimensions.
    pub fn broadcast_mean(&self, name: &str, axis: usize) -> Option<Vec<f64>> {
        if self.kind != DataKind::Meshgrid || axis >= self.shape.len() {
            return None;
        }
        let values = self.values(name)?;
        let len = self.shape[axis];
        let inner: usize = self.shape[axis + 1..].iter().product();
        if len == 0 || values.len() != self.shape.iter().product::<usize>() {
            return None;
        }

        let outer = values.len() / (len * inner);
        let mut means = vec![0.0; outer * inner];
        for o in 0..outer {
            for i in 0..inner {
                let sum: f64 = (0..len).map(|a| values[(o * len + a) * inner + i]).sum();
                means[o * inner + i] = sum / len as f64;
            }
        }

        Some(
            (0..values.len())
                .map(|flat| {
                    let o = flat / (len * inner);
                    let i = flat % inner;
                    means[o * inner + i]
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> DataDict {
        DataDict::meshgrid_from_axes(vec![("x", vec![0.0, 1.0, 2.0]), ("y", vec![10.0, 20.0, 30.0])])
            .with_dependent("z", (1..=9).map(f64::from).collect(), &["x", "y"])
    }

    #[test]
    fn test_meshgrid_from_axes_layout() {
        let data = grid();
        assert_eq!(data.grid_shape(), &[3, 3]);
        assert_eq!(data.values("x").unwrap(), &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
        assert_eq!(data.values("y").unwrap(), &[10.0, 20.0, 30.0, 10.0, 20.0, 30.0, 10.0, 20.0, 30.0]);
        assert!(data.validate().is_ok());
    }

    #[test]
    fn test_dependents_and_axes() {
        let data = grid();
        assert!(data.has_dependent("z"));
        assert!(!data.has_dependent("x"));
        assert!(!data.has_dependent("nope"));
        assert_eq!(data.dependents(), vec!["z".to_string()]);
        assert_eq!(data.axes_of("z").unwrap(), &["x".to_string(), "y".to_string()]);
        assert_eq!(data.axes(), vec!["x".to_string(), "y".to_string()]);
        assert_eq!(data.shape_of("z"), Some(vec![3, 3]));
    }

    #[test]
    fn test_broadcast_mean() {
        let data = grid();
        let along_y = data.broadcast_mean("z", 1).unwrap();
        assert_eq!(along_y, vec![2.0, 2.0, 2.0, 5.0, 5.0, 5.0, 8.0, 8.0, 8.0]);
        let along_x = data.broadcast_mean("z", 0).unwrap();
        assert_eq!(along_x, vec![4.0, 5.0, 6.0, 4.0, 5.0, 6.0, 4.0, 5.0, 6.0]);
        assert!(data.broadcast_mean("z", 2).is_none());
    }

    #[test]
    fn test_validation_errors() {
        let bad_axis = DataDict::tabular()
            .with_axis("x", vec![1.0, 2.0])
            .with_dependent("y", vec![1.0, 2.0], &["t"]);
        assert!(matches!(bad_axis.validate(), Err(DataError::UnknownAxis { .. })));

        let bad_len = DataDict::tabular()
            .with_axis("x", vec![1.0, 2.0])
            .with_dependent("y", vec![1.0], &["x"]);
        assert!(matches!(bad_len.validate(), Err(DataError::LengthMismatch { .. })));

        let bad_dims = DataDict::meshgrid(vec![2])
            .with_axis("x", vec![1.0, 2.0])
            .with_axis("y", vec![1.0, 2.0])
            .with_dependent("z", vec![1.0, 2.0], &["x", "y"]);
        assert!(matches!(bad_dims.validate(), Err(DataError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_copy_is_independent() {
        let original = grid();
        let mut copy = original.copy();
        copy.values_mut("z").unwrap()[0] = 100.0;
        assert_eq!(original.values("z").unwrap()[0], 1.0);
        assert!(DataDict::tabular().is_empty());
        assert!(!original.is_empty());
    }
}
