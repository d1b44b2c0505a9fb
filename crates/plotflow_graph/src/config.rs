// SPDX-License-Identifier: MIT OR Apache-2.0
//! Declarative flowchart configuration in RON.
//!
//! ```ron
//! (
//!     nodes: [
//!         (name: "avg", node_type: "AverageAxis", options: {"averagingAxis": "y"}),
//!         (name: "scale", node_type: "Scale", options: {"factor": 2.0}),
//!     ],
//! )
//! ```
//!
//! Without connections or terminals the nodes form a linear chain with the
//! terminals `dataIn` and `dataOut`.

use crate::flowchart::{Flowchart, FlowchartError};
use crate::node::NodeRegistry;
use crate::option::OptionValue;
use crate::port::{DATA_IN, DATA_OUT};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or building a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Malformed RON
    #[error("Failed to parse flowchart config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// The configuration could not be written
    #[error("Failed to serialize flowchart config: {0}")]
    Serialize(#[from] ron::Error),

    /// No registered node type with this id
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Building the flowchart failed
    #[error(transparent)]
    Flowchart(#[from] FlowchartError),

    /// Reading or writing the file failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One node of a configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Instance name
    pub name: String,
    /// Registered type id
    pub node_type: String,
    /// Option values applied after creation
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub options: IndexMap<String, OptionValue>,
}

impl NodeConfig {
    /// Node of the given type without option overrides
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: node_type.into(),
            options: IndexMap::new(),
        }
    }

    /// Set an option value
    pub fn with_option(mut self, option: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.insert(option.into(), value.into());
        self
    }
}

fn data_out() -> String {
    DATA_OUT.to_string()
}

fn data_in() -> String {
    DATA_IN.to_string()
}

/// One connection of a configuration; ports default to `dataOut -> dataIn`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Source node
    pub from: String,
    /// Source port
    #[serde(default = "data_out")]
    pub from_port: String,
    /// Target node
    pub to: String,
    /// Target port
    #[serde(default = "data_in")]
    pub to_port: String,
}

/// A terminal bound to a node port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Terminal name
    pub name: String,
    /// Node instance name
    pub node: String,
    /// Port name
    pub port: String,
}

/// Serializable description of a flowchart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowchartConfig {
    /// Nodes in declaration order
    pub nodes: Vec<NodeConfig>,
    /// Connections between nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<ConnectionConfig>,
    /// Input terminals
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<TerminalConfig>,
    /// Output terminals
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<TerminalConfig>,
}

impl FlowchartConfig {
    /// Linear chain of the given nodes
    pub fn linear(nodes: Vec<NodeConfig>) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }

    /// Whether the nodes form an implicit linear chain
    pub fn is_linear(&self) -> bool {
        self.connections.is_empty() && self.inputs.is_empty() && self.outputs.is_empty()
    }

    /// Serialize to RON format
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Deserialize from RON format
    pub fn from_ron(s: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(s)
    }

    /// Save the configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let ron_str = self.to_ron()?;
        std::fs::write(path, ron_str)?;
        Ok(())
    }

    /// Load a configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_ron(&contents)?)
    }

    /// Instantiate the flowchart with node types from `registry`
    pub fn build(&self, registry: &NodeRegistry) -> Result<Flowchart, ConfigError> {
        let mut flowchart = Flowchart::new();
        for node in &self.nodes {
            let node_type = registry
                .get(&node.node_type)
                .ok_or_else(|| ConfigError::UnknownNodeType(node.node_type.clone()))?;
            flowchart.insert_node(node_type, &node.name)?;
            for (option, value) in &node.options {
                flowchart.set_option(&node.name, option, value.clone())?;
            }
        }

        if self.is_linear() {
            for pair in self.nodes.windows(2) {
                flowchart.connect(&pair[0].name, DATA_OUT, &pair[1].name, DATA_IN)?;
            }
            if let (Some(first), Some(last)) = (self.nodes.first(), self.nodes.last()) {
                flowchart.add_input_terminal(DATA_IN, &first.name, DATA_IN)?;
                flowchart.add_output_terminal(DATA_OUT, &last.name, DATA_OUT)?;
            }
        }
        for c in &self.connections {
            flowchart.connect(&c.from, &c.from_port, &c.to, &c.to_port)?;
        }
        for t in &self.inputs {
            flowchart.add_input_terminal(&t.name, &t.node, &t.port)?;
        }
        for t in &self.outputs {
            flowchart.add_output_terminal(&t.name, &t.node, &t.port)?;
        }

        tracing::info!(
            "Built flowchart with {} nodes and {} connections",
            flowchart.node_count(),
            flowchart.connection_count()
        );
        Ok(flowchart)
    }
}
