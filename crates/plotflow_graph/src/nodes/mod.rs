// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in node types.

pub mod average;
pub mod fit;
pub mod scale;

pub use average::{AverageAxis, SubtractAverage, AVERAGING_AXIS};
pub use fit::{FindMaxNode, FitNode, DEPENDENT, DRY};
pub use scale::{scale_type, SCALE};

use crate::node::NodeRegistry;
use plotflow_analysis::{T1Decay, T2Ramsey};

/// Registry holding every built-in node type
pub fn builtin_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(SubtractAverage::node_type());
    registry.register(AverageAxis::node_type());
    registry.register(scale_type());
    registry.register(FitNode::<T1Decay>::node_type());
    registry.register(FitNode::<T2Ramsey>::node_type());
    registry.register(FindMaxNode::node_type());
    registry
}
