// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) definitions for the flowchart.

use crate::port::PortRef;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A connection from an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Unique connection ID
    pub id: ConnectionId,
    /// Source node name
    pub from_node: String,
    /// Source port name
    pub from_port: String,
    /// Target node name
    pub to_node: String,
    /// Target port name
    pub to_port: String,
}

impl Connection {
    /// Create a new connection
    pub fn new(
        from_node: impl Into<String>,
        from_port: impl Into<String>,
        to_node: impl Into<String>,
        to_port: impl Into<String>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            from_node: from_node.into(),
            from_port: from_port.into(),
            to_node: to_node.into(),
            to_port: to_port.into(),
        }
    }

    /// Source end
    pub fn source(&self) -> PortRef {
        PortRef::new(self.from_node.as_str(), self.from_port.as_str())
    }

    /// Target end
    pub fn target(&self) -> PortRef {
        PortRef::new(self.to_node.as_str(), self.to_port.as_str())
    }

    /// Check if this connection involves a specific node
    pub fn involves_node(&self, node: &str) -> bool {
        self.from_node == node || self.to_node == node
    }

    /// Check if this connection feeds the given input port
    pub fn feeds(&self, node: &str, port: &str) -> bool {
        self.to_node == node && self.to_port == port
    }
}
