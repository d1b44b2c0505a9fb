// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node types generated from a processing function and option declarations.
//!
//! ```ignore
//! let scale = AutoNodeBuilder::new("Scale")
//!     .option("factor", OptionSpec::float(1.0))
//!     .confirm(false)
//!     .build(|options, mut data| {
//!         let factor = options.float("factor")?.unwrap_or(1.0);
//!         for dep in data.dependents() {
//!             if let Some(values) = data.values_mut(&dep) {
//!                 values.iter_mut().for_each(|v| *v *= factor);
//!             }
//!         }
//!         Ok(Some(data))
//!     });
//! ```

use crate::data::DataDict;
use crate::node::{Node, NodeCategory, NodeCore, NodeError, NodeOutput, NodeType};
use crate::option::{OptionRegistry, OptionSpec};
use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Processing function of an auto-generated node
pub type ProcessFn = Rc<dyn Fn(&OptionRegistry, DataDict) -> Result<Option<DataDict>, NodeError>>;

/// Declares an auto-generated node type
#[derive(Debug, Clone)]
pub struct AutoNodeBuilder {
    id: String,
    node_name: String,
    category: NodeCategory,
    description: String,
    options: IndexMap<String, OptionSpec>,
    confirm: bool,
    use_ui: bool,
}

impl AutoNodeBuilder {
    /// Start a declaration; the type id defaults to the node name
    pub fn new(node_name: impl Into<String>) -> Self {
        let node_name = node_name.into();
        Self {
            id: node_name.clone(),
            node_name,
            category: NodeCategory::Custom,
            description: String::new(),
            options: IndexMap::new(),
            confirm: true,
            use_ui: true,
        }
    }

    /// Set the type id
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the category
    pub fn category(mut self, category: NodeCategory) -> Self {
        self.category = category;
        self
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare an option
    pub fn option(mut self, name: impl Into<String>, spec: OptionSpec) -> Self {
        self.options.insert(name.into(), spec);
        self
    }

    /// Whether option edits wait for a confirm action
    pub fn confirm(mut self, confirm: bool) -> Self {
        self.confirm = confirm;
        self
    }

    /// Whether a UI companion is built for instances
    pub fn use_ui(mut self, use_ui: bool) -> Self {
        self.use_ui = use_ui;
        self
    }

    /// Produce the node type
    pub fn build<F>(self, process: F) -> NodeType
    where
        F: Fn(&OptionRegistry, DataDict) -> Result<Option<DataDict>, NodeError> + 'static,
    {
        let process: ProcessFn = Rc::new(process);
        let Self {
            id,
            node_name,
            category,
            description,
            options,
            confirm,
            use_ui,
        } = self;

        let type_name = node_name.clone();
        NodeType::new(id, type_name, category, move |name| {
            let core = NodeCore::new(name, node_name.as_str())
                .with_options(&options)
                .with_confirm(confirm)
                .with_ui(use_ui);
            Box::new(AutoNode {
                core,
                process: process.clone(),
            })
        })
        .with_description(description)
    }
}

/// Instance of an auto-generated node type
pub struct AutoNode {
    core: NodeCore,
    process: ProcessFn,
}

impl Node for AutoNode {
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
        let Some(data) = self.core.accept(data_in) else {
            return Ok(None);
        };
        let result = (self.process)(self.core.options(), data)?;
        Ok(result.map(NodeOutput::data_out))
    }
}

impl fmt::Debug for AutoNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoNode").field("core", &self.core).finish_non_exhaustive()
    }
}
