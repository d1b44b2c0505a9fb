// SPDX-License-Identifier: MIT OR Apache-2.0
//! Change notifications emitted by nodes.
//!
//! Nodes only know the [`NodeOptionObserver`] interface. UI companions,
//! flowcharts and hosts implement it to learn about option mutations and
//! changes in the structure of the data a node sees.

use crate::option::OptionValue;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Facet of the incoming data structure that changed between two runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStructureChange {
    /// Container kind
    Type,
    /// Axes of the first dependent
    Axes,
    /// Set of dependents
    Dependents,
    /// Field shapes
    Shapes,
}

/// Notification emitted by a node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// A single option was set
    OptionChanged {
        /// Node instance name
        node: String,
        /// Option name
        option: String,
        /// New value
        value: OptionValue,
    },
    /// Several options were applied at once
    OptionsConfirmed {
        /// Node instance name
        node: String,
        /// Applied values, in application order
        changes: Vec<(String, OptionValue)>,
    },
    /// The structure of the accepted input changed
    DataStructureChanged {
        /// Node instance name
        node: String,
        /// What changed
        change: DataStructureChange,
    },
}

impl NodeEvent {
    /// Name of the emitting node
    pub fn node(&self) -> &str {
        match self {
            Self::OptionChanged { node, .. }
            | Self::OptionsConfirmed { node, .. }
            | Self::DataStructureChanged { node, .. } => node,
        }
    }

    /// Whether the event reflects an option mutation
    pub fn is_option_change(&self) -> bool {
        !matches!(self, Self::DataStructureChanged { .. })
    }

    /// Whether the event touches `(node, option)`
    pub fn concerns(&self, node: &str, option: &str) -> bool {
        match self {
            Self::OptionChanged { node: n, option: o, .. } => n == node && o == option,
            Self::OptionsConfirmed { node: n, changes } => n == node && changes.iter().any(|(o, _)| o == option),
            Self::DataStructureChanged { .. } => false,
        }
    }
}

/// Observer of node notifications.
///
/// Notifications are delivered synchronously while the emitting node is
/// mutably borrowed, so an observer cannot call back into that node.
pub trait NodeOptionObserver {
    /// Handle a notification
    fn notify(&self, event: &NodeEvent);
}

/// Observer list owned by a node
#[derive(Clone, Default)]
pub struct NodeSignals {
    observers: Vec<Rc<dyn NodeOptionObserver>>,
}

impl NodeSignals {
    /// Add an observer
    pub fn subscribe(&mut self, observer: Rc<dyn NodeOptionObserver>) {
        self.observers.push(observer);
    }

    /// Remove an observer, compared by address
    pub fn unsubscribe(&mut self, observer: &Rc<dyn NodeOptionObserver>) {
        self.observers
            .retain(|o| !std::ptr::addr_eq(Rc::as_ptr(o), Rc::as_ptr(observer)));
    }

    /// Deliver an event to every observer in subscription order
    pub fn emit(&self, event: &NodeEvent) {
        for observer in &self.observers {
            observer.notify(event);
        }
    }

    /// Number of observers
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether nobody listens
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for NodeSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSignals")
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Flags that something changed since the last evaluation
#[derive(Debug, Default)]
pub struct StaleMarker {
    stale: Cell<bool>,
}

impl StaleMarker {
    /// Whether a change was seen since the last `clear`
    pub fn is_stale(&self) -> bool {
        self.stale.get()
    }

    /// Record a change
    pub fn mark(&self) {
        self.stale.set(true);
    }

    /// Forget recorded changes
    pub fn clear(&self) {
        self.stale.set(false);
    }
}

impl NodeOptionObserver for StaleMarker {
    fn notify(&self, event: &NodeEvent) {
        if event.is_option_change() {
            self.mark();
        }
    }
}

/// Observer that records every event, for hosts and tests
#[derive(Debug, Default)]
pub struct EventLog {
    events: RefCell<Vec<NodeEvent>>,
}

impl EventLog {
    /// Snapshot of recorded events
    pub fn events(&self) -> Vec<NodeEvent> {
        self.events.borrow().clone()
    }

    /// Drain recorded events
    pub fn take(&self) -> Vec<NodeEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// Number of recorded events touching `(node, option)`
    pub fn count_for(&self, node: &str, option: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.concerns(node, option))
            .count()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl NodeOptionObserver for EventLog {
    fn notify(&self, event: &NodeEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
