// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the flowchart framework.
//!
//! A node is a processing unit with declared ports and options. Concrete
//! nodes embed a [`NodeCore`] holding the shared state (instance name,
//! option registry, observers, bookkeeping of the last accepted input) and
//! implement [`Node`], overriding [`Node::process`] where they transform data.

use crate::data::{DataDict, DataKind};
use crate::option::{OptionError, OptionRegistry, OptionSpec, OptionValue};
use crate::port::{Port, DATA_IN, DATA_OUT};
use crate::signal::{DataStructureChange, NodeEvent, NodeOptionObserver, NodeSignals};
use indexmap::IndexMap;
use plotflow_analysis::AnalysisError;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Errors raised while processing a node
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    /// The node does not provide this capability
    #[error("Capability not implemented: {0}")]
    NotImplementedCapability(&'static str),

    /// The input does not have the structure the node needs
    #[error("Invalid input shape for node '{node}': {reason}")]
    InvalidInputShape {
        /// Node instance name
        node: String,
        /// What is wrong with the input
        reason: String,
    },

    /// Option access failed
    #[error(transparent)]
    Option(#[from] OptionError),

    /// An analysis run by the node failed
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl NodeError {
    /// Build an [`NodeError::InvalidInputShape`]
    pub fn invalid_input(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInputShape {
            node: node.into(),
            reason: reason.into(),
        }
    }
}

/// Structure of the last accepted input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeState {
    /// Container kind
    pub data_type: Option<DataKind>,
    /// Axes of the first dependent
    pub data_axes: Vec<String>,
    /// Dependent names
    pub data_dependents: Vec<String>,
    /// Shapes of every field
    pub data_shapes: IndexMap<String, Vec<usize>>,
}

impl NodeState {
    /// Describe the structure of `data`
    pub fn describe(data: &DataDict) -> Self {
        let data_dependents = data.dependents();
        let data_axes = data_dependents
            .first()
            .and_then(|d| data.axes_of(d))
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        Self {
            data_type: Some(data.kind()),
            data_axes,
            data_dependents,
            data_shapes: data.shapes(),
        }
    }

    /// Facets that differ between `self` and `other`
    pub fn diff(&self, other: &NodeState) -> Vec<DataStructureChange> {
        let mut changes = Vec::new();
        if self.data_type != other.data_type {
            changes.push(DataStructureChange::Type);
        }
        if self.data_axes != other.data_axes {
            changes.push(DataStructureChange::Axes);
        }
        if self.data_dependents != other.data_dependents {
            changes.push(DataStructureChange::Dependents);
        }
        if self.data_shapes != other.data_shapes {
            changes.push(DataStructureChange::Shapes);
        }
        changes
    }
}

/// Result of processing a node: data per output port
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutput {
    ports: IndexMap<String, Option<DataDict>>,
}

impl NodeOutput {
    /// Create a new empty output
    pub fn new() -> Self {
        Self::default()
    }

    /// Output carrying `data` on the default port
    pub fn data_out(data: DataDict) -> Self {
        let mut output = Self::new();
        output.set(DATA_OUT, Some(data));
        output
    }

    /// Set the data of an output port
    pub fn set(&mut self, port: impl Into<String>, data: Option<DataDict>) {
        self.ports.insert(port.into(), data);
    }

    /// Get the data of an output port
    pub fn get(&self, port: &str) -> Option<&DataDict> {
        self.ports.get(port).and_then(Option::as_ref)
    }

    /// Data on the default port
    pub fn data(&self) -> Option<&DataDict> {
        self.get(DATA_OUT)
    }

    /// Port names present in this output
    pub fn ports(&self) -> impl Iterator<Item = &str> {
        self.ports.keys().map(String::as_str)
    }
}

/// Input data of a node keyed by input port name
pub type NodeInputs<'a> = IndexMap<String, Option<&'a DataDict>>;

/// State shared by every node implementation
#[derive(Debug)]
pub struct NodeCore {
    name: String,
    node_name: String,
    state: NodeState,
    options: OptionRegistry,
    signals: NodeSignals,
    use_ui: bool,
    confirm: bool,
    last_output: Option<NodeOutput>,
}

impl NodeCore {
    /// Create the core of node instance `name` of kind `node_name`
    pub fn new(name: impl Into<String>, node_name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            options: OptionRegistry::new(name.clone()),
            name,
            node_name: node_name.into(),
            state: NodeState::default(),
            signals: NodeSignals::default(),
            use_ui: false,
            confirm: true,
            last_output: None,
        }
    }

    /// Declare an option
    pub fn with_option(mut self, name: impl Into<String>, spec: OptionSpec) -> Self {
        self.options.declare(name, spec);
        self
    }

    /// Use a prepared option registry
    pub fn with_options(mut self, specs: &IndexMap<String, OptionSpec>) -> Self {
        self.options = OptionRegistry::from_specs(self.name.clone(), specs);
        self
    }

    /// Whether a UI companion should be built for this node
    pub fn with_ui(mut self, use_ui: bool) -> Self {
        self.use_ui = use_ui;
        self
    }

    /// Default confirm flag of the node's options
    pub fn with_confirm(mut self, confirm: bool) -> Self {
        self.confirm = confirm;
        self
    }

    /// Instance name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name of the node kind
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Structure of the last accepted input
    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// Option registry
    pub fn options(&self) -> &OptionRegistry {
        &self.options
    }

    /// Whether a UI companion should be built
    pub fn use_ui(&self) -> bool {
        self.use_ui
    }

    /// Default confirm flag
    pub fn confirm(&self) -> bool {
        self.confirm
    }

    /// Set one option through the notifying setter
    pub fn set_option(&mut self, option: &str, value: OptionValue) -> Result<(), OptionError> {
        self.options.setter(option, &self.signals)?.set(value)
    }

    /// Apply several option values with a single notification
    pub fn apply_batch(&mut self, changes: Vec<(String, OptionValue)>) -> Result<(), OptionError> {
        self.options.apply_batch(changes, &self.signals)
    }

    /// Attach an observer
    pub fn subscribe(&mut self, observer: Rc<dyn NodeOptionObserver>) {
        self.signals.subscribe(observer);
    }

    /// Detach an observer
    pub fn unsubscribe(&mut self, observer: &Rc<dyn NodeOptionObserver>) {
        self.signals.unsubscribe(observer);
    }

    /// First step of every `process`.
    ///
    /// Returns a copy of the input when there is something to process.
    /// Absent, empty or structurally invalid input yields `None`; in that
    /// case the bookkeeping of the previous successful run is kept.
    pub fn accept(&mut self, data_in: Option<&DataDict>) -> Option<DataDict> {
        let data = self.admissible(data_in)?;
        Some(self.commit(data))
    }

    /// [`NodeCore::accept`] for nodes that need more than a valid container.
    ///
    /// `check` inspects the input before any bookkeeping changes. An
    /// [`NodeError::InvalidInputShape`] from it is logged and yields
    /// `Ok(None)` with the previous bookkeeping intact; other errors are
    /// returned as is.
    pub fn accept_checked<T>(
        &mut self,
        data_in: Option<&DataDict>,
        check: impl FnOnce(&NodeCore, &DataDict) -> Result<T, NodeError>,
    ) -> Result<Option<(DataDict, T)>, NodeError> {
        let Some(data) = self.admissible(data_in) else {
            return Ok(None);
        };
        match check(self, data) {
            Ok(checked) => Ok(Some((self.commit(data), checked))),
            Err(NodeError::InvalidInputShape { reason, .. }) => {
                tracing::warn!("Node {} rejected input: {}", self.name, reason);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn admissible<'d>(&self, data_in: Option<&'d DataDict>) -> Option<&'d DataDict> {
        let data = match data_in {
            Some(data) if !data.is_empty() => data,
            _ => return None,
        };
        if let Err(err) = data.validate() {
            tracing::warn!("Node {} received invalid data: {}", self.name, err);
            return None;
        }
        Some(data)
    }

    fn commit(&mut self, data: &DataDict) -> DataDict {
        let state = NodeState::describe(data);
        let changes = self.state.diff(&state);
        self.state = state;
        for change in changes {
            tracing::trace!("Node {} input structure changed: {:?}", self.name, change);
            self.signals.emit(&NodeEvent::DataStructureChanged {
                node: self.name.clone(),
                change,
            });
        }
        data.copy()
    }

    /// Store the latest output
    pub fn remember(&mut self, output: Option<NodeOutput>) {
        self.last_output = output;
    }

    /// Latest output stored by the flowchart
    pub fn last_output(&self) -> Option<&NodeOutput> {
        self.last_output.as_ref()
    }
}

/// A processing unit in a flowchart
pub trait Node: fmt::Debug {
    /// Shared node state
    fn core(&self) -> &NodeCore;

    /// Mutable shared node state
    fn core_mut(&mut self) -> &mut NodeCore;

    /// Upcast for typed access
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed access
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Declared input ports
    fn inputs(&self) -> Vec<Port> {
        vec![Port::input(DATA_IN)]
    }

    /// Declared output ports
    fn outputs(&self) -> Vec<Port> {
        vec![Port::output(DATA_OUT)]
    }

    /// Process the default input.
    ///
    /// The base behavior records the input structure and forwards a copy.
    fn process(&mut self, data_in: Option<&DataDict>) -> Result<Option<NodeOutput>, NodeError> {
        Ok(self.core_mut().accept(data_in).map(NodeOutput::data_out))
    }

    /// Process data from every input port.
    ///
    /// Single-input nodes forward to [`Node::process`]; nodes with several
    /// inputs must override this.
    fn process_inputs(&mut self, inputs: &NodeInputs<'_>) -> Result<Option<NodeOutput>, NodeError> {
        let ports = self.inputs();
        if ports.len() > 1 {
            return Err(NodeError::NotImplementedCapability("process_inputs"));
        }
        let data_in = ports
            .first()
            .and_then(|port| inputs.get(&port.name).copied().flatten());
        self.process(data_in)
    }

    /// Instance name
    fn name(&self) -> &str {
        self.core().name()
    }

    /// Display name of the node kind
    fn node_name(&self) -> &str {
        self.core().node_name()
    }

    /// Structure of the last accepted input
    fn state(&self) -> &NodeState {
        self.core().state()
    }

    /// Option registry
    fn options(&self) -> &OptionRegistry {
        self.core().options()
    }

    /// Current value of one option
    fn option(&self, name: &str) -> Result<Option<&OptionValue>, OptionError> {
        self.core().options().get(name)
    }

    /// Set one option through the notifying setter
    fn set_option(&mut self, option: &str, value: OptionValue) -> Result<(), OptionError> {
        self.core_mut().set_option(option, value)
    }

    /// Latest output stored by the flowchart
    fn last_output(&self) -> Option<&NodeOutput> {
        self.core().last_output()
    }
}

/// Node type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Reshaping and arithmetic on data
    Transform,
    /// Curve fits and other analyses
    Analysis,
    /// Utility nodes
    Utility,
    /// Custom/user-defined
    Custom,
}

/// Creates a node instance with the given name
pub type NodeFactory = Rc<dyn Fn(&str) -> Box<dyn Node>>;

/// Node type definition
#[derive(Clone)]
pub struct NodeType {
    /// Unique type identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    factory: NodeFactory,
}

impl NodeType {
    /// Create a node type
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: NodeCategory,
        factory: impl Fn(&str) -> Box<dyn Node> + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            description: String::new(),
            factory: Rc::new(factory),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Create an instance named `name`
    pub fn create(&self, name: &str) -> Box<dyn Node> {
        (self.factory)(name)
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Registry of available node types
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    /// Registered node types by ID
    types: IndexMap<String, NodeType>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            types: IndexMap::new(),
        }
    }

    /// Register a node type
    pub fn register(&mut self, node_type: NodeType) {
        self.types.insert(node_type.id.clone(), node_type);
    }

    /// Get a node type by ID
    pub fn get(&self, id: &str) -> Option<&NodeType> {
        self.types.get(id)
    }

    /// Get all registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeType> {
        self.types.values()
    }

    /// Get types by category
    pub fn types_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeType> {
        self.types.values().filter(move |t| t.category == category)
    }

    /// Create a node named `name` from a type ID
    pub fn create_node(&self, type_id: &str, name: &str) -> Option<Box<dyn Node>> {
        self.get(type_id).map(|t| t.create(name))
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
