// SPDX-License-Identifier: MIT OR Apache-2.0
//! Linear rescaling of dependents, declared as an auto node.

use crate::autonode::AutoNodeBuilder;
use crate::node::{NodeCategory, NodeType};
use crate::option::OptionSpec;

/// Type identifier of the scale node
pub const SCALE: &str = "Scale";

/// `value * factor + offset` on every dependent; edits apply immediately
pub fn scale_type() -> NodeType {
    AutoNodeBuilder::new(SCALE)
        .category(NodeCategory::Transform)
        .description("Multiply dependents by a factor and add an offset")
        .option("factor", OptionSpec::float(1.0))
        .option("offset", OptionSpec::float(0.0))
        .confirm(false)
        .build(|options, mut data| {
            let factor = options.float("factor")?.unwrap_or(1.0);
            let offset = options.float("offset")?.unwrap_or(0.0);
            for dep in data.dependents() {
                if let Some(values) = data.values_mut(&dep) {
                    values.iter_mut().for_each(|v| *v = *v * factor + offset);
                }
            }
            Ok(Some(data))
        })
}
