// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dataflow flowcharts for `plotflow`.
//!
//! Nodes are named processing units with declared options. They are wired
//! into a [`Flowchart`] whose input terminals receive [`DataDict`]s and whose
//! output terminals report the processed result.
//!
//! ## Architecture
//!
//! - [`option`]: typed option declarations and the notifying setter
//! - [`signal`]: option and data structure change notifications
//! - [`node`]: the [`Node`] contract, node types and the registry
//! - [`autonode`]: nodes declared from a process function
//! - [`companion`]: headless UI companions that mirror node options
//! - [`flowchart`]: wiring, cycle checks and ordered evaluation
//! - [`config`]: declarative flowcharts in RON
//! - [`nodes`]: built-in averaging, scaling and analysis nodes

pub mod autonode;
pub mod companion;
pub mod config;
pub mod connection;
pub mod data;
pub mod evaluation;
pub mod flowchart;
pub mod node;
pub mod nodes;
pub mod option;
pub mod port;
pub mod signal;

pub use autonode::{AutoNode, AutoNodeBuilder};
pub use companion::{CompanionEdit, NodeCompanion, Widget, WidgetRegistry};
pub use config::{ConfigError, FlowchartConfig, NodeConfig};
pub use connection::{Connection, ConnectionId};
pub use data::{DataDict, DataError, DataField, DataKind};
pub use flowchart::{Flowchart, FlowchartError};
pub use node::{Node, NodeCategory, NodeCore, NodeError, NodeOutput, NodeRegistry, NodeState, NodeType};
pub use nodes::builtin_registry;
pub use option::{OptionError, OptionKind, OptionRegistry, OptionSpec, OptionValue};
pub use port::{Port, PortDirection, PortRef, DATA_IN, DATA_OUT};
pub use signal::{DataStructureChange, EventLog, NodeEvent, NodeOptionObserver, NodeSignals, StaleMarker};
