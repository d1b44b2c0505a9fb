// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node inputs/outputs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the default input port
pub const DATA_IN: &str = "dataIn";

/// Name of the default output port
pub const DATA_OUT: &str = "dataOut";

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    /// Input port
    Input,
    /// Output port
    Output,
}

/// A named port on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// Port name, unique per node and direction
    pub name: String,
    /// Port direction
    pub direction: PortDirection,
}

impl Port {
    /// Create a new input port
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Input,
        }
    }

    /// Create a new output port
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Output,
        }
    }

    /// Check if a connection from this port to `other` is valid
    pub fn can_connect(&self, other: &Port) -> bool {
        self.direction == PortDirection::Output && other.direction == PortDirection::Input
    }
}

/// A port of a specific node instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    /// Node instance name
    pub node: String,
    /// Port name
    pub port: String,
}

impl PortRef {
    /// Reference `port` on `node`
    pub fn new(node: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.port)
    }
}
