// SPDX-License-Identifier: MIT OR Apache-2.0
//! Flowchart: a directed acyclic graph of nodes with named terminals.
//!
//! Data enters through input terminals, flows along connections from output
//! ports to input ports, and leaves through output terminals. Every call to
//! [`Flowchart::output`] re-runs each node exactly once in topological order.

use crate::companion::{CompanionEdit, NodeCompanion, WidgetRegistry};
use crate::connection::{Connection, ConnectionId};
use crate::data::DataDict;
use crate::evaluation::EvaluationContext;
use crate::node::{Node, NodeError, NodeType};
use crate::option::{OptionError, OptionValue};
use crate::port::{Port, PortDirection, PortRef, DATA_IN, DATA_OUT};
use crate::signal::{NodeOptionObserver, StaleMarker};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// A dataflow graph of named nodes
pub struct Flowchart {
    /// Nodes by instance name
    nodes: IndexMap<String, Box<dyn Node>>,
    /// Connections between nodes
    connections: IndexMap<ConnectionId, Connection>,
    /// Input terminals and the ports they feed
    input_terminals: IndexMap<String, Vec<PortRef>>,
    /// Output terminals and the ports they read
    output_terminals: IndexMap<String, PortRef>,
    /// Data currently set on input terminals
    inputs: IndexMap<String, DataDict>,
    stale: Rc<StaleMarker>,
    observers: Vec<Rc<dyn NodeOptionObserver>>,
}

impl Flowchart {
    /// Create a new empty flowchart
    pub fn new() -> Self {
        let stale = Rc::new(StaleMarker::default());
        stale.mark();
        Self {
            nodes: IndexMap::new(),
            connections: IndexMap::new(),
            input_terminals: IndexMap::new(),
            output_terminals: IndexMap::new(),
            inputs: IndexMap::new(),
            stale,
            observers: Vec::new(),
        }
    }

    /// Chain nodes `dataOut -> dataIn` in the given order.
    ///
    /// The input terminal `dataIn` feeds the first node and the output
    /// terminal `dataOut` reads the last one.
    pub fn linear(nodes: &[(&str, &NodeType)]) -> Result<Self, FlowchartError> {
        let mut flowchart = Self::new();
        for (name, node_type) in nodes {
            flowchart.insert_node(node_type, name)?;
        }
        for pair in nodes.windows(2) {
            flowchart.connect(pair[0].0, DATA_OUT, pair[1].0, DATA_IN)?;
        }
        if let (Some((first, _)), Some((last, _))) = (nodes.first(), nodes.last()) {
            flowchart.add_input_terminal(DATA_IN, first, DATA_IN)?;
            flowchart.add_output_terminal(DATA_OUT, last, DATA_OUT)?;
        }
        Ok(flowchart)
    }

    /// Add a node instance
    pub fn add_node(&mut self, mut node: Box<dyn Node>) -> Result<(), FlowchartError> {
        let name = node.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(FlowchartError::DuplicateNode(name));
        }
        node.core_mut().subscribe(self.stale.clone());
        for observer in &self.observers {
            node.core_mut().subscribe(observer.clone());
        }
        tracing::debug!("Added node {} ({})", name, node.node_name());
        self.nodes.insert(name, node);
        self.stale.mark();
        Ok(())
    }

    /// Create a node of the given type and add it
    pub fn insert_node(&mut self, node_type: &NodeType, name: &str) -> Result<(), FlowchartError> {
        self.add_node(node_type.create(name))
    }

    /// Remove a node together with its connections and terminal bindings
    pub fn remove_node(&mut self, name: &str) -> Result<Box<dyn Node>, FlowchartError> {
        let mut node = self
            .nodes
            .shift_remove(name)
            .ok_or_else(|| FlowchartError::NodeNotFound(name.to_string()))?;

        self.connections.retain(|_, c| !c.involves_node(name));
        for targets in self.input_terminals.values_mut() {
            targets.retain(|t| t.node != name);
        }
        self.output_terminals.retain(|_, source| source.node != name);

        let stale: Rc<dyn NodeOptionObserver> = self.stale.clone();
        node.core_mut().unsubscribe(&stale);
        for observer in &self.observers {
            node.core_mut().unsubscribe(observer);
        }
        node.core_mut().remember(None);
        tracing::debug!("Removed node {}", name);
        self.stale.mark();
        Ok(node)
    }

    /// Get a node by name
    pub fn node(&self, name: &str) -> Option<&dyn Node> {
        self.nodes.get(name).map(|n| &**n)
    }

    /// Get a mutable node by name
    pub fn node_mut(&mut self, name: &str) -> Option<&mut (dyn Node + 'static)> {
        self.nodes.get_mut(name).map(|n| &mut **n)
    }

    /// Get a node as its concrete type
    pub fn node_as<T: Node + 'static>(&self, name: &str) -> Option<&T> {
        self.nodes.get(name)?.as_any().downcast_ref::<T>()
    }

    /// Get a mutable node as its concrete type
    pub fn node_as_mut<T: Node + 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.nodes.get_mut(name)?.as_any_mut().downcast_mut::<T>()
    }

    /// All nodes, in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &dyn Node)> {
        self.nodes.iter().map(|(name, node)| (name.as_str(), &**node))
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Set an option of a node
    pub fn set_option(&mut self, node: &str, option: &str, value: OptionValue) -> Result<(), FlowchartError> {
        self.node_mut(node)
            .ok_or_else(|| FlowchartError::NodeNotFound(node.to_string()))?
            .set_option(option, value)?;
        Ok(())
    }

    /// Connect an output port to an input port
    pub fn connect(
        &mut self,
        from_node: &str,
        from_port: &str,
        to_node: &str,
        to_port: &str,
    ) -> Result<ConnectionId, FlowchartError> {
        let from = self.find_port(from_node, from_port, PortDirection::Output)?;
        let to = self.find_port(to_node, to_port, PortDirection::Input)?;
        if !from.can_connect(&to) {
            return Err(FlowchartError::IncompatiblePorts {
                from: PortRef::new(from_node, from_port),
                to: PortRef::new(to_node, to_port),
            });
        }

        if self.is_fed(to_node, to_port) {
            return Err(FlowchartError::PortAlreadyConnected(PortRef::new(to_node, to_port)));
        }

        if from_node == to_node {
            return Err(FlowchartError::SelfLoop(from_node.to_string()));
        }

        let connection = Connection::new(from_node, from_port, to_node, to_port);
        let id = connection.id;
        tracing::debug!("Connecting {} -> {}", connection.source(), connection.target());
        self.connections.insert(id, connection);
        if self.topological_order().is_err() {
            self.connections.shift_remove(&id);
            return Err(FlowchartError::CycleDetected);
        }

        self.stale.mark();
        Ok(id)
    }

    /// Remove a connection
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Option<Connection> {
        let removed = self.connections.shift_remove(&connection_id);
        if removed.is_some() {
            self.stale.mark();
        }
        removed
    }

    /// Get a connection by ID
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id)
    }

    /// Get all connections
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Get the number of connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Feed an input port from the named input terminal
    pub fn add_input_terminal(&mut self, name: &str, node: &str, port: &str) -> Result<(), FlowchartError> {
        let target = self.find_port(node, port, PortDirection::Input)?;
        if !Port::output(name).can_connect(&target) {
            return Err(FlowchartError::PortNotFound(PortRef::new(node, port)));
        }
        if self.is_fed(node, port) {
            return Err(FlowchartError::PortAlreadyConnected(PortRef::new(node, port)));
        }
        self.input_terminals
            .entry(name.to_string())
            .or_default()
            .push(PortRef::new(node, port));
        self.stale.mark();
        Ok(())
    }

    /// Expose an output port as the named output terminal
    pub fn add_output_terminal(&mut self, name: &str, node: &str, port: &str) -> Result<(), FlowchartError> {
        let source = self.find_port(node, port, PortDirection::Output)?;
        if !source.can_connect(&Port::input(name)) {
            return Err(FlowchartError::PortNotFound(PortRef::new(node, port)));
        }
        self.output_terminals.insert(name.to_string(), PortRef::new(node, port));
        Ok(())
    }

    /// Input terminal names
    pub fn input_terminals(&self) -> impl Iterator<Item = &str> {
        self.input_terminals.keys().map(String::as_str)
    }

    /// Output terminal names
    pub fn output_terminals(&self) -> impl Iterator<Item = &str> {
        self.output_terminals.keys().map(String::as_str)
    }

    /// Set the data of an input terminal
    pub fn set_input(&mut self, terminal: &str, data: DataDict) -> Result<(), FlowchartError> {
        if !self.input_terminals.contains_key(terminal) {
            return Err(FlowchartError::TerminalNotFound(terminal.to_string()));
        }
        self.inputs.insert(terminal.to_string(), data);
        self.stale.mark();
        Ok(())
    }

    /// Remove the data of an input terminal
    pub fn clear_input(&mut self, terminal: &str) -> Option<DataDict> {
        let removed = self.inputs.shift_remove(terminal);
        if removed.is_some() {
            self.stale.mark();
        }
        removed
    }

    /// Whether options, inputs or topology changed since the last `output`
    pub fn is_stale(&self) -> bool {
        self.stale.is_stale()
    }

    /// Get nodes in topological order (for evaluation)
    pub fn topological_order(&self) -> Result<Vec<String>, CycleError> {
        let mut visited = HashSet::new();
        let mut temp_mark = HashSet::new();
        let mut order = Vec::new();

        for name in self.nodes.keys() {
            if !visited.contains(name.as_str()) {
                self.visit(name, &mut visited, &mut temp_mark, &mut order)?;
            }
        }

        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        visited: &mut HashSet<&'a str>,
        temp_mark: &mut HashSet<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<(), CycleError> {
        if temp_mark.contains(name) {
            return Err(CycleError);
        }
        if visited.contains(name) {
            return Ok(());
        }

        temp_mark.insert(name);

        // Upstream nodes first
        for connection in self.connections.values() {
            if connection.to_node == name {
                self.visit(&connection.from_node, visited, temp_mark, order)?;
            }
        }

        temp_mark.remove(name);
        visited.insert(name);
        order.push(name.to_string());

        Ok(())
    }

    /// Evaluate every node once and return the data of each output terminal.
    ///
    /// A node failing with [`NodeError::InvalidInputShape`] produces nothing,
    /// so its consumers receive no input; other branches are unaffected. Any
    /// other node error aborts the evaluation.
    pub fn output(&mut self) -> Result<IndexMap<String, Option<DataDict>>, FlowchartError> {
        let order = self.topological_order().map_err(|_| FlowchartError::CycleDetected)?;
        let Self {
            nodes,
            connections,
            input_terminals,
            output_terminals,
            inputs,
            stale,
            ..
        } = self;

        let mut ctx = EvaluationContext::new(connections, input_terminals, inputs, order);
        let order = ctx.order().to_vec();
        for name in &order {
            let Some(node) = nodes.get_mut(name) else { continue };
            let result = {
                let ports = node.inputs();
                let node_inputs = ctx.inputs_for(name, &ports);
                tracing::trace!("Evaluating node {}", name);
                node.process_inputs(&node_inputs)
            };

            let output = match result {
                Ok(output) => output,
                Err(NodeError::InvalidInputShape { reason, .. }) => {
                    tracing::warn!("Node {} skipped: {}", name, reason);
                    None
                }
                Err(source) => {
                    return Err(FlowchartError::Node {
                        node: name.clone(),
                        source,
                    })
                }
            };
            node.core_mut().remember(output.clone());
            ctx.set_output(name.as_str(), output);
        }

        let outputs = ctx.into_outputs();
        let result = output_terminals
            .iter()
            .map(|(terminal, source)| {
                let data = outputs
                    .get(&source.node)
                    .and_then(Option::as_ref)
                    .and_then(|o| o.get(&source.port))
                    .cloned();
                (terminal.clone(), data)
            })
            .collect();

        stale.clear();
        Ok(result)
    }

    /// Attach an observer to every current and future node
    pub fn subscribe(&mut self, observer: Rc<dyn NodeOptionObserver>) {
        for node in self.nodes.values_mut() {
            node.core_mut().subscribe(observer.clone());
        }
        self.observers.push(observer);
    }

    /// Build and attach the UI companion of a node
    pub fn attach_companion(&mut self, name: &str, registry: &WidgetRegistry) -> Result<Rc<NodeCompanion>, FlowchartError> {
        let node = self
            .nodes
            .get_mut(name)
            .ok_or_else(|| FlowchartError::NodeNotFound(name.to_string()))?;
        if !node.core().use_ui() {
            return Err(FlowchartError::NoCompanion(name.to_string()));
        }
        let companion = NodeCompanion::build(&**node, registry);
        node.core_mut().subscribe(companion.clone());
        Ok(companion)
    }

    /// Apply the edits queued by a companion; returns how many were applied
    pub fn apply_companion_edits(&mut self, companion: &NodeCompanion) -> Result<usize, FlowchartError> {
        let edits = companion.take_edits();
        let count = edits.len();
        for edit in edits {
            let node = self
                .node_mut(companion.node())
                .ok_or_else(|| FlowchartError::NodeNotFound(companion.node().to_string()))?;
            match edit {
                CompanionEdit::Live(option, value) => node.set_option(&option, value)?,
                CompanionEdit::Confirmed(changes) => node.core_mut().apply_batch(changes)?,
            }
        }
        Ok(count)
    }

    /// Look up a port by name, trying the `preferred` direction first
    fn find_port(&self, node: &str, port: &str, preferred: PortDirection) -> Result<Port, FlowchartError> {
        let target = self
            .nodes
            .get(node)
            .ok_or_else(|| FlowchartError::NodeNotFound(node.to_string()))?;
        let (first, second) = match preferred {
            PortDirection::Input => (target.inputs(), target.outputs()),
            PortDirection::Output => (target.outputs(), target.inputs()),
        };
        first
            .into_iter()
            .chain(second)
            .find(|p| p.name == port)
            .ok_or_else(|| FlowchartError::PortNotFound(PortRef::new(node, port)))
    }

    fn is_fed(&self, node: &str, port: &str) -> bool {
        self.connections.values().any(|c| c.feeds(node, port))
            || self
                .input_terminals
                .values()
                .flatten()
                .any(|t| t.node == node && t.port == port)
    }
}

impl Default for Flowchart {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Flowchart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flowchart")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("connections", &self.connections.len())
            .field("input_terminals", &self.input_terminals)
            .field("output_terminals", &self.output_terminals)
            .field("stale", &self.stale.is_stale())
            .finish_non_exhaustive()
    }
}

/// Errors raised by flowchart operations
#[derive(Debug, thiserror::Error)]
pub enum FlowchartError {
    /// A node with this name already exists
    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(PortRef),

    /// The ports exist but do not run from an output to an input
    #[error("Cannot connect {from} to {to}")]
    IncompatiblePorts {
        /// Source port
        from: PortRef,
        /// Target port
        to: PortRef,
    },

    /// Input port is already fed
    #[error("Port already connected: {0}")]
    PortAlreadyConnected(PortRef),

    /// Self-loop not allowed
    #[error("Self-loop not allowed on node {0}")]
    SelfLoop(String),

    /// The connection would close a cycle
    #[error("Flowchart contains a cycle")]
    CycleDetected,

    /// Terminal not found
    #[error("Terminal not found: {0}")]
    TerminalNotFound(String),

    /// The node does not use a UI companion
    #[error("Node {0} has no UI companion")]
    NoCompanion(String),

    /// Option access failed
    #[error(transparent)]
    Option(#[from] OptionError),

    /// A node failed during evaluation
    #[error("Node {node} failed: {source}")]
    Node {
        /// Node instance name
        node: String,
        /// Underlying error
        #[source]
        source: NodeError,
    },
}

/// Error when the flowchart contains a cycle
#[derive(Debug, thiserror::Error)]
#[error("Flowchart contains a cycle")]
pub struct CycleError;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeCategory, NodeCore, NodeOutput};
    use crate::option::OptionSpec;
    use plotflow_analysis::AnalysisError;
    use std::any::Any;
    use std::cell::RefCell;

    type Trace = Rc<RefCell<Vec<String>>>;

    /// Adds `offset` to every dependent, records each run in a shared trace
    #[derive(Debug)]
    struct Recorder {
        core: NodeCore,
        trace: Trace,
        fail: Option<NodeError>,
    }

    impl Node for Recorder {
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
            self.trace.borrow_mut().push(self.core.name().to_string());
            let Some(mut data) = self.core.accept(data_in) else {
                return Ok(None);
            };
            if let Some(err) = &self.fail {
                return Err(err.clone());
            }
            let offset = self.core.options().float("offset")?.unwrap_or(0.0);
            for dep in data.dependents() {
                if let Some(values) = data.values_mut(&dep) {
                    values.iter_mut().for_each(|v| *v += offset);
                }
            }
            Ok(Some(NodeOutput::data_out(data)))
        }
    }

    fn recorder_type(id: &str, trace: &Trace, fail: Option<NodeError>) -> NodeType {
        let trace = trace.clone();
        NodeType::new(id, "Recorder", NodeCategory::Utility, move |name| {
            Box::new(Recorder {
                core: NodeCore::new(name, "Recorder")
                    .with_option("offset", OptionSpec::float(1.0))
                    .with_ui(true)
                    .with_confirm(false),
                trace: trace.clone(),
                fail: fail.clone(),
            })
        })
    }

    fn sample() -> DataDict {
        DataDict::tabular()
            .with_axis("x", vec![0.0, 1.0])
            .with_dependent("y", vec![10.0, 20.0], &["x"])
    }

    #[test]
    fn test_each_node_runs_once_upstream_first() {
        let trace = Trace::default();
        let recorder = recorder_type("recorder", &trace, None);
        let mut flowchart = Flowchart::new();
        for name in ["c", "b", "a"] {
            flowchart.insert_node(&recorder, name).unwrap();
        }
        flowchart.connect("a", DATA_OUT, "b", DATA_IN).unwrap();
        flowchart.connect("b", DATA_OUT, "c", DATA_IN).unwrap();
        flowchart.add_input_terminal(DATA_IN, "a", DATA_IN).unwrap();
        flowchart.add_output_terminal(DATA_OUT, "c", DATA_OUT).unwrap();
        flowchart.set_input(DATA_IN, sample()).unwrap();

        let out = flowchart.output().unwrap();
        assert_eq!(*trace.borrow(), vec!["a", "b", "c"]);
        assert_eq!(out[DATA_OUT].as_ref().unwrap().values("y").unwrap(), &[13.0, 23.0]);
        assert!(flowchart.node("b").unwrap().last_output().is_some());
    }

    #[test]
    fn test_output_is_deterministic() {
        let trace = Trace::default();
        let recorder = recorder_type("recorder", &trace, None);
        let mut flowchart = Flowchart::linear(&[("a", &recorder), ("b", &recorder)]).unwrap();
        flowchart.set_input(DATA_IN, sample()).unwrap();
        let first = flowchart.output().unwrap();
        let second = flowchart.output().unwrap();
        assert_eq!(first, second);
        assert_eq!(trace.borrow().len(), 4);
    }

    #[test]
    fn test_invalid_shape_isolated_to_branch() {
        let trace = Trace::default();
        let recorder = recorder_type("recorder", &trace, None);
        let broken = recorder_type("broken", &trace, Some(NodeError::invalid_input("bad", "no 2D data")));
        let mut flowchart = Flowchart::new();
        flowchart.insert_node(&recorder, "src").unwrap();
        flowchart.insert_node(&broken, "bad").unwrap();
        flowchart.insert_node(&recorder, "after_bad").unwrap();
        flowchart.insert_node(&recorder, "good").unwrap();
        flowchart.connect("src", DATA_OUT, "bad", DATA_IN).unwrap();
        flowchart.connect("bad", DATA_OUT, "after_bad", DATA_IN).unwrap();
        flowchart.connect("src", DATA_OUT, "good", DATA_IN).unwrap();
        flowchart.add_input_terminal(DATA_IN, "src", DATA_IN).unwrap();
        flowchart.add_output_terminal("bad", "after_bad", DATA_OUT).unwrap();
        flowchart.add_output_terminal("good", "good", DATA_OUT).unwrap();
        flowchart.set_input(DATA_IN, sample()).unwrap();

        let out = flowchart.output().unwrap();
        assert_eq!(out["bad"], None);
        assert_eq!(out["good"].as_ref().unwrap().values("y").unwrap(), &[12.0, 22.0]);
    }

    #[test]
    fn test_other_node_errors_abort() {
        let trace = Trace::default();
        let broken = recorder_type("broken", &trace, Some(NodeError::Analysis(AnalysisError::EmptyData)));
        let mut flowchart = Flowchart::linear(&[("fit", &broken)]).unwrap();
        flowchart.set_input(DATA_IN, sample()).unwrap();
        let err = flowchart.output().unwrap_err();
        assert!(matches!(err, FlowchartError::Node { ref node, .. } if node == "fit"));
    }

    #[test]
    fn test_cycles_are_rejected() {
        let trace = Trace::default();
        let recorder = recorder_type("recorder", &trace, None);
        let mut flowchart = Flowchart::linear(&[("a", &recorder), ("b", &recorder)]).unwrap();
        let before = flowchart.connection_count();

        let err = flowchart.connect("b", DATA_OUT, "a", DATA_IN).unwrap_err();
        assert!(matches!(err, FlowchartError::PortAlreadyConnected(_)));

        let mut open = Flowchart::new();
        open.insert_node(&recorder, "a").unwrap();
        open.insert_node(&recorder, "b").unwrap();
        open.connect("a", DATA_OUT, "b", DATA_IN).unwrap();
        assert!(matches!(
            open.connect("b", DATA_OUT, "a", DATA_IN),
            Err(FlowchartError::CycleDetected)
        ));
        assert_eq!(open.connection_count(), 1);
        assert_eq!(flowchart.connection_count(), before);
    }

    #[test]
    fn test_connection_validation() {
        let trace = Trace::default();
        let recorder = recorder_type("recorder", &trace, None);
        let mut flowchart = Flowchart::new();
        flowchart.insert_node(&recorder, "a").unwrap();
        flowchart.insert_node(&recorder, "b").unwrap();

        assert!(matches!(
            flowchart.insert_node(&recorder, "a"),
            Err(FlowchartError::DuplicateNode(_))
        ));
        assert!(matches!(
            flowchart.connect("a", DATA_OUT, "a", DATA_IN),
            Err(FlowchartError::SelfLoop(_))
        ));
        assert!(matches!(
            flowchart.connect("a", "nope", "b", DATA_IN),
            Err(FlowchartError::PortNotFound(_))
        ));
        assert!(matches!(
            flowchart.connect("a", DATA_IN, "b", DATA_IN),
            Err(FlowchartError::IncompatiblePorts { ref from, .. }) if from.port == DATA_IN
        ));
        assert!(matches!(
            flowchart.connect("a", DATA_OUT, "b", DATA_OUT),
            Err(FlowchartError::IncompatiblePorts { ref to, .. }) if to.port == DATA_OUT
        ));
        assert!(matches!(
            flowchart.add_input_terminal("raw", "a", DATA_OUT),
            Err(FlowchartError::PortNotFound(_))
        ));
        assert!(matches!(
            flowchart.add_output_terminal("out", "b", DATA_IN),
            Err(FlowchartError::PortNotFound(_))
        ));
        assert_eq!(flowchart.connection_count(), 0);
        assert!(matches!(
            flowchart.connect("a", DATA_OUT, "z", DATA_IN),
            Err(FlowchartError::NodeNotFound(_))
        ));
        assert!(matches!(
            flowchart.set_input("missing", sample()),
            Err(FlowchartError::TerminalNotFound(_))
        ));
    }

    #[test]
    fn test_disconnect_unfeeds_the_port() {
        let trace = Trace::default();
        let recorder = recorder_type("recorder", &trace, None);
        let mut flowchart = Flowchart::linear(&[("a", &recorder), ("b", &recorder)]).unwrap();
        flowchart.set_input(DATA_IN, sample()).unwrap();
        let id = flowchart.connections().next().unwrap().id;
        assert_eq!(flowchart.connection(id).unwrap().target(), PortRef::new("b", DATA_IN));

        flowchart.output().unwrap();
        let removed = flowchart.disconnect(id).unwrap();
        assert_eq!(removed.source(), PortRef::new("a", DATA_OUT));
        assert!(flowchart.is_stale());
        assert!(flowchart.disconnect(id).is_none());

        let out = flowchart.output().unwrap();
        assert_eq!(out[DATA_OUT], None);
        flowchart.connect("a", DATA_OUT, "b", DATA_IN).unwrap();
        assert!(flowchart.output().unwrap()[DATA_OUT].is_some());
    }

    #[test]
    fn test_remove_node_drops_edges_and_terminals() {
        let trace = Trace::default();
        let recorder = recorder_type("recorder", &trace, None);
        let mut flowchart = Flowchart::linear(&[("a", &recorder), ("b", &recorder)]).unwrap();
        let removed = flowchart.remove_node("b").unwrap();
        assert_eq!(removed.name(), "b");
        assert_eq!(flowchart.connection_count(), 0);
        assert_eq!(flowchart.output_terminals().count(), 0);
        assert!(flowchart.remove_node("b").is_err());
    }

    #[test]
    fn test_staleness_tracks_changes() {
        let trace = Trace::default();
        let recorder = recorder_type("recorder", &trace, None);
        let mut flowchart = Flowchart::linear(&[("a", &recorder)]).unwrap();
        assert!(flowchart.is_stale());

        flowchart.output().unwrap();
        assert!(!flowchart.is_stale());

        flowchart.set_option("a", "offset", OptionValue::Float(5.0)).unwrap();
        assert!(flowchart.is_stale());
        flowchart.output().unwrap();

        flowchart.set_input(DATA_IN, sample()).unwrap();
        assert!(flowchart.is_stale());
        let out = flowchart.output().unwrap();
        assert_eq!(out[DATA_OUT].as_ref().unwrap().values("y").unwrap(), &[15.0, 25.0]);
    }

    #[test]
    fn test_typed_access() {
        let trace = Trace::default();
        let recorder = recorder_type("recorder", &trace, None);
        let mut flowchart = Flowchart::linear(&[("a", &recorder)]).unwrap();
        assert!(flowchart.node_as::<Recorder>("a").is_some());
        flowchart.node_as_mut::<Recorder>("a").unwrap().fail = Some(NodeError::NotImplementedCapability("x"));
        assert!(flowchart.output().is_ok());
        flowchart.set_input(DATA_IN, sample()).unwrap();
        assert!(flowchart.output().is_err());
    }

    #[test]
    fn test_companion_edits_reach_the_node() {
        let trace = Trace::default();
        let recorder = recorder_type("recorder", &trace, None);
        let mut flowchart = Flowchart::linear(&[("a", &recorder)]).unwrap();
        let companion = flowchart.attach_companion("a", &WidgetRegistry::default()).unwrap();
        assert_eq!(companion.value("offset"), Some(OptionValue::Float(1.0)));

        companion.user_edit("offset", &OptionValue::Float(4.0));
        assert_eq!(flowchart.apply_companion_edits(&companion).unwrap(), 1);
        assert_eq!(
            flowchart.node("a").unwrap().option("offset").unwrap(),
            Some(&OptionValue::Float(4.0))
        );
        assert_eq!(companion.refresh_count(), 0);

        flowchart.set_option("a", "offset", OptionValue::Float(6.0)).unwrap();
        assert_eq!(companion.value("offset"), Some(OptionValue::Float(6.0)));
    }
}
