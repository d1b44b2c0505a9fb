// SPDX-License-Identifier: MIT OR Apache-2.0
//! Flowchart evaluation bookkeeping.

use crate::connection::{Connection, ConnectionId};
use crate::data::DataDict;
use crate::node::{NodeInputs, NodeOutput};
use crate::port::{Port, PortRef};
use indexmap::IndexMap;

/// Context for one evaluation pass.
///
/// Holds the outputs produced so far and resolves where each input port
/// gets its data from: an upstream output, an input terminal, or nothing.
pub struct EvaluationContext<'a> {
    connections: &'a IndexMap<ConnectionId, Connection>,
    input_terminals: &'a IndexMap<String, Vec<PortRef>>,
    inputs: &'a IndexMap<String, DataDict>,
    /// Outputs by node name; `None` when the node produced nothing
    outputs: IndexMap<String, Option<NodeOutput>>,
    /// Evaluation order
    order: Vec<String>,
}

impl<'a> EvaluationContext<'a> {
    /// Create a new evaluation context
    pub fn new(
        connections: &'a IndexMap<ConnectionId, Connection>,
        input_terminals: &'a IndexMap<String, Vec<PortRef>>,
        inputs: &'a IndexMap<String, DataDict>,
        order: Vec<String>,
    ) -> Self {
        Self {
            connections,
            input_terminals,
            inputs,
            outputs: IndexMap::new(),
            order,
        }
    }

    /// Get the input data for a port
    pub fn get_input(&self, node: &str, port: &str) -> Option<&DataDict> {
        if let Some(connection) = self.connections.values().find(|c| c.feeds(node, port)) {
            return self
                .outputs
                .get(&connection.from_node)?
                .as_ref()?
                .get(&connection.from_port);
        }

        let terminal = self
            .input_terminals
            .iter()
            .find(|(_, targets)| targets.iter().any(|t| t.node == node && t.port == port))
            .map(|(name, _)| name)?;
        self.inputs.get(terminal)
    }

    /// Gather the data of every declared input port of a node
    pub fn inputs_for(&self, node: &str, ports: &[Port]) -> NodeInputs<'_> {
        ports
            .iter()
            .map(|port| (port.name.clone(), self.get_input(node, &port.name)))
            .collect()
    }

    /// Set the output for a node
    pub fn set_output(&mut self, node: impl Into<String>, output: Option<NodeOutput>) {
        self.outputs.insert(node.into(), output);
    }

    /// Output of a node, if it produced one
    pub fn output(&self, node: &str) -> Option<&NodeOutput> {
        self.outputs.get(node)?.as_ref()
    }

    /// Get the evaluation order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Consume the context, returning all outputs
    pub fn into_outputs(self) -> IndexMap<String, Option<NodeOutput>> {
        self.outputs
    }
}
