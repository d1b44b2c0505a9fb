// SPDX-License-Identifier: MIT OR Apache-2.0
//! Averaging along one grid axis.
//!
//! Both nodes only act on meshgrid data whose dependents use the selected
//! axis; anything else passes through unchanged.

use crate::data::{DataDict, DataKind};
use crate::node::{Node, NodeCategory, NodeCore, NodeError, NodeOutput, NodeType};
use crate::option::OptionSpec;
use std::any::Any;

/// Name of the option selecting the axis to average over
pub const AVERAGING_AXIS: &str = "averagingAxis";

/// Mean of every dependent along `axis`, broadcast to the full grid
fn axis_means(data: &DataDict, axis: Option<&str>) -> Vec<(String, Vec<f64>)> {
    let Some(axis) = axis else { return Vec::new() };
    if data.kind() != DataKind::Meshgrid {
        return Vec::new();
    }
    data.dependents()
        .into_iter()
        .filter_map(|dep| {
            let index = data.axes_of(&dep)?.iter().position(|a| a == axis)?;
            let means = data.broadcast_mean(&dep, index)?;
            Some((dep, means))
        })
        .collect()
}

fn averaging_core(name: &str, node_name: &str) -> NodeCore {
    NodeCore::new(name, node_name)
        .with_option(AVERAGING_AXIS, OptionSpec::text(None))
        .with_ui(true)
}

/// Removes the mean along the selected axis from every dependent
#[derive(Debug)]
pub struct SubtractAverage {
    core: NodeCore,
}

impl SubtractAverage {
    /// Type identifier
    pub const TYPE_ID: &'static str = "SubtractAverage";

    /// Create an instance
    pub fn new(name: &str) -> Self {
        Self {
            core: averaging_core(name, Self::TYPE_ID),
        }
    }

    /// Node type for registries
    pub fn node_type() -> NodeType {
        NodeType::new(Self::TYPE_ID, "Subtract average", NodeCategory::Transform, |name| {
            Box::new(Self::new(name))
        })
        .with_description("Subtract the mean along one axis of gridded data")
    }
}

impl Node for SubtractAverage {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn process(&mut self, data_in: Option<&DataDict>) -> Result<Option<NodeOutput>, NodeError> {
        let Some(mut data) = self.core.accept(data_in) else {
            return Ok(None);
        };
        let axis = self.core.options().text(AVERAGING_AXIS)?.map(str::to_string);
        for (dep, means) in axis_means(&data, axis.as_deref()) {
            if let Some(values) = data.values_mut(&dep) {
                values.iter_mut().zip(means).for_each(|(v, m)| *v -= m);
            }
        }
        Ok(Some(NodeOutput::data_out(data)))
    }
}

/// Replaces every dependent by its mean along the selected axis
#[derive(Debug)]
pub struct AverageAxis {
    core: NodeCore,
}

impl AverageAxis {
    /// Type identifier
    pub const TYPE_ID: &'static str = "AverageAxis";

    /// Create an instance
    pub fn new(name: &str) -> Self {
        Self {
            core: averaging_core(name, Self::TYPE_ID),
        }
    }

    /// Node type for registries
    pub fn node_type() -> NodeType {
        NodeType::new(Self::TYPE_ID, "Average axis", NodeCategory::Transform, |name| {
            Box::new(Self::new(name))
        })
        .with_description("Average gridded data along one axis, keeping the grid shape")
    }
}

impl Node for AverageAxis {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn process(&mut self, data_in: Option<&DataDict>) -> Result<Option<NodeOutput>, NodeError> {
        let Some(mut data) = self.core.accept(data_in) else {
            return Ok(None);
        };
        let axis = self.core.options().text(AVERAGING_AXIS)?.map(str::to_string);
        for (dep, means) in axis_means(&data, axis.as_deref()) {
            if let Some(values) = data.values_mut(&dep) {
                *values = means;
            }
        }
        Ok(Some(NodeOutput::data_out(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::OptionValue;

    fn grid() -> DataDict {
        DataDict::meshgrid_from_axes(vec![("x", vec![0.0, 1.0, 2.0]), ("y", vec![0.0, 0.5, 1.0])])
            .with_dependent("z", (1..=9).map(f64::from).collect(), &["x", "y"])
    }

    fn rows(values: &[f64]) -> Vec<Vec<f64>> {
        values.chunks(3).map(<[f64]>::to_vec).collect()
    }

    #[test]
    fn test_average_along_y_makes_rows_constant() {
        let mut node = AverageAxis::new("avg");
        node.set_option(AVERAGING_AXIS, OptionValue::from("y")).unwrap();
        let data = grid();
        let output = node.process(Some(&data)).unwrap().unwrap();
        let out = output.data().unwrap();

        assert_eq!(out.shape_of("z"), Some(vec![3, 3]));
        assert_eq!(
            rows(out.values("z").unwrap()),
            vec![vec![2.0, 2.0, 2.0], vec![5.0, 5.0, 5.0], vec![8.0, 8.0, 8.0]]
        );
        assert_eq!(data.values("z").unwrap()[0], 1.0);
    }

    #[test]
    fn test_subtract_average_along_y() {
        let mut node = SubtractAverage::new("sub");
        node.set_option(AVERAGING_AXIS, OptionValue::from("y")).unwrap();
        let output = node.process(Some(&grid())).unwrap().unwrap();
        assert_eq!(
            rows(output.data().unwrap().values("z").unwrap()),
            vec![vec![-1.0, 0.0, 1.0]; 3]
        );
    }

    #[test]
    fn test_passes_through_without_matching_axis() {
        let data = grid();
        let mut node = SubtractAverage::new("sub");
        let unset = node.process(Some(&data)).unwrap().unwrap();
        assert_eq!(unset.data(), Some(&data));

        node.set_option(AVERAGING_AXIS, OptionValue::from("t")).unwrap();
        let unknown = node.process(Some(&data)).unwrap().unwrap();
        assert_eq!(unknown.data(), Some(&data));

        let table = DataDict::tabular()
            .with_axis("y", vec![0.0, 1.0])
            .with_dependent("z", vec![1.0, 3.0], &["y"]);
        node.set_option(AVERAGING_AXIS, OptionValue::from("y")).unwrap();
        let tabular = node.process(Some(&table)).unwrap().unwrap();
        assert_eq!(tabular.data(), Some(&table));
    }
}
