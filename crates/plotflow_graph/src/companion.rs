// SPDX-License-Identifier: MIT OR Apache-2.0
//! Headless UI companions for node options.
//!
//! A [`NodeCompanion`] mirrors the options of one node in a set of widgets.
//! Widgets are produced by constructors looked up by option kind in an
//! injected [`WidgetRegistry`]. Each constructor registers a getter/setter
//! pair with the companion so the companion can read and refresh widget
//! values without knowing their concrete type.
//!
//! Edits flow in two directions:
//! - user edits are queued as [`CompanionEdit`]s, immediately for live
//!   options or as one batch on [`NodeCompanion::confirm`];
//! - option notifications from the node refresh the widgets, except for
//!   echoes of values the companion itself sent.

use crate::node::Node;
use crate::option::{OptionKind, OptionSpec, OptionValue};
use crate::signal::{NodeEvent, NodeOptionObserver};
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Minimal widget surface used by companions
pub trait Widget: fmt::Debug {
    /// Current value
    fn value(&self) -> OptionValue;

    /// Display a value; values of the wrong kind are ignored
    fn set_value(&self, value: &OptionValue);
}

/// Integer stepper
#[derive(Debug, Default)]
pub struct SpinBox {
    value: Cell<i64>,
}

impl Widget for SpinBox {
    fn value(&self) -> OptionValue {
        OptionValue::Int(self.value.get())
    }

    fn set_value(&self, value: &OptionValue) {
        if let Some(v) = value.as_i64() {
            self.value.set(v);
        }
    }
}

/// Decimal stepper
#[derive(Debug, Default)]
pub struct DoubleSpinBox {
    value: Cell<f64>,
}

impl Widget for DoubleSpinBox {
    fn value(&self) -> OptionValue {
        OptionValue::Float(self.value.get())
    }

    fn set_value(&self, value: &OptionValue) {
        if let Some(v) = value.as_f64() {
            self.value.set(v);
        }
    }
}

/// Builds the widget of one option and registers it with the companion
pub type WidgetConstructor = fn(&NodeCompanion, &str, &OptionSpec, bool) -> Option<Rc<dyn Widget>>;

/// Register `widget` as the editor of `option`
fn install(companion: &NodeCompanion, option: &str, confirm: bool, widget: Rc<dyn Widget>) -> Rc<dyn Widget> {
    let getter = widget.clone();
    let setter = widget.clone();
    companion.register_getter(option, move || getter.value());
    companion.register_setter(option, move |value| setter.set_value(value));
    if !confirm {
        companion.mark_live(option);
    }
    widget
}

/// Widget constructor for integer options
pub fn spin_box(companion: &NodeCompanion, option: &str, _spec: &OptionSpec, confirm: bool) -> Option<Rc<dyn Widget>> {
    Some(install(companion, option, confirm, Rc::new(SpinBox::default())))
}

/// Widget constructor for float options
pub fn double_spin_box(
    companion: &NodeCompanion,
    option: &str,
    _spec: &OptionSpec,
    confirm: bool,
) -> Option<Rc<dyn Widget>> {
    Some(install(companion, option, confirm, Rc::new(DoubleSpinBox::default())))
}

/// Maps option kinds to widget constructors
#[derive(Debug, Clone)]
pub struct WidgetRegistry {
    constructors: IndexMap<OptionKind, WidgetConstructor>,
}

impl WidgetRegistry {
    /// Registry without any constructor
    pub fn empty() -> Self {
        Self {
            constructors: IndexMap::new(),
        }
    }

    /// Register or replace the constructor of a kind
    pub fn register(&mut self, kind: OptionKind, constructor: WidgetConstructor) {
        self.constructors.insert(kind, constructor);
    }

    /// Constructor of a kind
    pub fn get(&self, kind: &OptionKind) -> Option<WidgetConstructor> {
        self.constructors.get(kind).copied()
    }
}

impl Default for WidgetRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(OptionKind::Int, spin_box);
        registry.register(OptionKind::Float, double_spin_box);
        registry
    }
}

/// Change requested by a companion
#[derive(Debug, Clone, PartialEq)]
pub enum CompanionEdit {
    /// Set a single option now
    Live(String, OptionValue),
    /// Apply several options as one batch
    Confirmed(Vec<(String, OptionValue)>),
}

type Getter = Rc<dyn Fn() -> OptionValue>;
type Setter = Rc<dyn Fn(&OptionValue)>;

/// Headless UI adapter for one node
pub struct NodeCompanion {
    node: String,
    widgets: RefCell<IndexMap<String, Rc<dyn Widget>>>,
    getters: RefCell<IndexMap<String, Getter>>,
    setters: RefCell<IndexMap<String, Setter>>,
    live: RefCell<Vec<String>>,
    shown: RefCell<Vec<String>>,
    last_echoed: RefCell<IndexMap<String, OptionValue>>,
    outbox: RefCell<Vec<CompanionEdit>>,
    refreshes: Cell<usize>,
}

impl NodeCompanion {
    /// Empty companion for the named node
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            widgets: RefCell::default(),
            getters: RefCell::default(),
            setters: RefCell::default(),
            live: RefCell::default(),
            shown: RefCell::default(),
            last_echoed: RefCell::default(),
            outbox: RefCell::default(),
            refreshes: Cell::new(0),
        }
    }

    /// Build the widgets of every option of `node` and seed their values.
    ///
    /// Options whose kind has no constructor get no widget; they stay
    /// settable on the node.
    pub fn build(node: &dyn Node, registry: &WidgetRegistry) -> Rc<Self> {
        let companion = Rc::new(Self::new(node.name()));
        let default_confirm = node.core().confirm();
        let options = node.options();

        for name in options.names() {
            let Ok(spec) = options.spec(name) else { continue };
            let Some(constructor) = registry.get(&spec.kind) else {
                tracing::debug!("No widget for option {}.{} of kind {}", node.name(), name, spec.kind);
                continue;
            };
            if let Some(widget) = constructor(&companion, name, spec, spec.needs_confirm(default_confirm)) {
                companion.widgets.borrow_mut().insert(name.to_string(), widget);
            }
            if let Ok(Some(value)) = options.get(name) {
                companion.set_value(name, value);
            }
        }
        companion
    }

    /// Name of the companion's node
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Widget of an option
    pub fn widget(&self, option: &str) -> Option<Rc<dyn Widget>> {
        self.widgets.borrow().get(option).cloned()
    }

    /// Options that have a widget
    pub fn widget_names(&self) -> Vec<String> {
        self.widgets.borrow().keys().cloned().collect()
    }

    /// Register how to read the value of an option
    pub fn register_getter(&self, option: &str, getter: impl Fn() -> OptionValue + 'static) {
        self.getters.borrow_mut().insert(option.to_string(), Rc::new(getter));
    }

    /// Register how to display a value of an option
    pub fn register_setter(&self, option: &str, setter: impl Fn(&OptionValue) + 'static) {
        self.setters.borrow_mut().insert(option.to_string(), Rc::new(setter));
    }

    /// Send edits of `option` to the node without waiting for confirmation
    pub fn mark_live(&self, option: &str) {
        let mut live = self.live.borrow_mut();
        if !live.iter().any(|o| o == option) {
            live.push(option.to_string());
        }
    }

    /// Whether edits of `option` are sent immediately
    pub fn is_live(&self, option: &str) -> bool {
        self.live.borrow().iter().any(|o| o == option)
    }

    /// Whether any widget waits for confirmation
    pub fn has_confirm_button(&self) -> bool {
        self.widgets.borrow().keys().any(|name| !self.is_live(name))
    }

    /// Value shown for an option
    pub fn value(&self, option: &str) -> Option<OptionValue> {
        let getter = self.getters.borrow().get(option).cloned()?;
        Some(getter())
    }

    /// Display a value without producing an edit
    pub fn set_value(&self, option: &str, value: &OptionValue) -> bool {
        let setter = self.setters.borrow().get(option).cloned();
        match setter {
            Some(setter) => {
                setter(value);
                let mut shown = self.shown.borrow_mut();
                if !shown.iter().any(|o| o == option) {
                    shown.push(option.to_string());
                }
                true
            }
            None => false,
        }
    }

    /// Whether the widget of `option` shows a node or user value rather
    /// than its default
    pub fn has_value(&self, option: &str) -> bool {
        self.shown.borrow().iter().any(|o| o == option)
    }

    /// A user changed a widget.
    ///
    /// Live options queue an edit at once; others wait for `confirm`.
    pub fn user_edit(&self, option: &str, value: &OptionValue) -> bool {
        if !self.set_value(option, value) {
            return false;
        }
        if self.is_live(option) {
            self.signal_option(option);
        }
        true
    }

    /// Queue the current value of one option
    pub fn signal_option(&self, option: &str) {
        let Some(value) = self.value(option) else { return };
        self.discard_queued(option);
        self.last_echoed.borrow_mut().insert(option.to_string(), value.clone());
        self.outbox
            .borrow_mut()
            .push(CompanionEdit::Live(option.to_string(), value));
    }

    /// Queue the value of every widget as one batch.
    ///
    /// Widgets still showing their default, because the option is unset
    /// and was never edited, are left out.
    pub fn signal_all_options(&self) {
        let names = self.widget_names();
        let changes: Vec<(String, OptionValue)> = names
            .into_iter()
            .filter(|name| self.has_value(name))
            .filter_map(|name| self.value(&name).map(|v| (name, v)))
            .collect();
        if changes.is_empty() {
            return;
        }
        for (name, value) in &changes {
            self.discard_queued(name);
            self.last_echoed.borrow_mut().insert(name.clone(), value.clone());
        }
        self.outbox.borrow_mut().push(CompanionEdit::Confirmed(changes));
    }

    /// Drop queued, not yet applied edits of `option`
    fn discard_queued(&self, option: &str) {
        let mut outbox = self.outbox.borrow_mut();
        outbox.retain_mut(|edit| match edit {
            CompanionEdit::Live(name, _) => name != option,
            CompanionEdit::Confirmed(changes) => {
                changes.retain(|(name, _)| name != option);
                !changes.is_empty()
            }
        });
    }

    /// The confirm button was pressed
    pub fn confirm(&self) {
        self.signal_all_options();
    }

    /// Drain queued edits
    pub fn take_edits(&self) -> Vec<CompanionEdit> {
        std::mem::take(&mut *self.outbox.borrow_mut())
    }

    /// Number of widget refreshes caused by external option changes
    pub fn refresh_count(&self) -> usize {
        self.refreshes.get()
    }

    fn option_set_from_node(&self, option: &str, value: &OptionValue) {
        let pending = self.last_echoed.borrow_mut().shift_remove(option);
        match pending {
            Some(echoed) if &echoed == value => return,
            // The node moved on before our edit was applied; the node wins
            Some(_) => self.discard_queued(option),
            None => {}
        }
        if self.set_value(option, value) {
            self.refreshes.set(self.refreshes.get() + 1);
        }
    }
}

impl NodeOptionObserver for NodeCompanion {
    fn notify(&self, event: &NodeEvent) {
        if event.node() != self.node {
            return;
        }
        match event {
            NodeEvent::OptionChanged { option, value, .. } => self.option_set_from_node(option, value),
            NodeEvent::OptionsConfirmed { changes, .. } => {
                for (option, value) in changes {
                    self.option_set_from_node(option, value);
                }
            }
            NodeEvent::DataStructureChanged { .. } => {}
        }
    }
}

impl fmt::Debug for NodeCompanion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCompanion")
            .field("node", &self.node)
            .field("widgets", &self.widget_names())
            .field("live", &self.live.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeCore;
    use std::any::Any;

    #[derive(Debug)]
    struct Knobs {
        core: NodeCore,
    }

    impl Knobs {
        fn new(confirm: bool) -> Self {
            Self {
                core: NodeCore::new("knobs", "Knobs")
                    .with_option("count", OptionSpec::int(3))
                    .with_option("gain", OptionSpec::float(0.5))
                    .with_option("label", OptionSpec::text(Some("a")))
                    .with_ui(true)
                    .with_confirm(confirm),
            }
        }
    }

    impl Node for Knobs {
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
    }

    #[test]
    fn test_build_uses_registry_and_seeds_values() {
        let node = Knobs::new(false);
        let companion = NodeCompanion::build(&node, &WidgetRegistry::default());
        assert_eq!(companion.widget_names(), vec!["count".to_string(), "gain".to_string()]);
        assert_eq!(companion.value("count"), Some(OptionValue::Int(3)));
        assert_eq!(companion.value("gain"), Some(OptionValue::Float(0.5)));
        assert_eq!(companion.value("label"), None);
        assert!(!companion.has_confirm_button());

        let bare = NodeCompanion::build(&node, &WidgetRegistry::empty());
        assert!(bare.widget_names().is_empty());
    }

    #[test]
    fn test_live_edit_is_queued_and_echo_suppressed() {
        let mut node = Knobs::new(false);
        let companion = NodeCompanion::build(&node, &WidgetRegistry::default());
        node.core_mut().subscribe(companion.clone());

        assert!(companion.user_edit("gain", &OptionValue::Float(2.0)));
        let edits = companion.take_edits();
        assert_eq!(edits, vec![CompanionEdit::Live("gain".to_string(), OptionValue::Float(2.0))]);

        node.set_option("gain", OptionValue::Float(2.0)).unwrap();
        assert_eq!(companion.refresh_count(), 0);

        node.set_option("gain", OptionValue::Float(7.0)).unwrap();
        assert_eq!(companion.refresh_count(), 1);
        assert_eq!(companion.value("gain"), Some(OptionValue::Float(7.0)));
    }

    #[test]
    fn test_confirm_sends_one_batch() {
        let mut node = Knobs::new(true);
        let companion = NodeCompanion::build(&node, &WidgetRegistry::default());
        node.core_mut().subscribe(companion.clone());
        assert!(companion.has_confirm_button());

        companion.user_edit("count", &OptionValue::Int(9));
        companion.user_edit("gain", &OptionValue::Float(1.5));
        assert!(companion.take_edits().is_empty());

        companion.confirm();
        let edits = companion.take_edits();
        assert_eq!(
            edits,
            vec![CompanionEdit::Confirmed(vec![
                ("count".to_string(), OptionValue::Int(9)),
                ("gain".to_string(), OptionValue::Float(1.5)),
            ])]
        );

        if let CompanionEdit::Confirmed(changes) = &edits[0] {
            node.core_mut().apply_batch(changes.clone()).unwrap();
        }
        assert_eq!(companion.refresh_count(), 0);
        assert_eq!(node.options().int("count").unwrap(), Some(9));
    }

    #[test]
    fn test_external_change_drops_option_from_pending_batch() {
        let mut node = Knobs::new(true);
        let companion = NodeCompanion::build(&node, &WidgetRegistry::default());
        node.core_mut().subscribe(companion.clone());

        companion.user_edit("count", &OptionValue::Int(9));
        companion.user_edit("gain", &OptionValue::Float(1.5));
        companion.confirm();

        node.set_option("gain", OptionValue::Float(7.0)).unwrap();
        assert_eq!(companion.refresh_count(), 1);
        assert_eq!(companion.value("gain"), Some(OptionValue::Float(7.0)));
        assert_eq!(
            companion.take_edits(),
            vec![CompanionEdit::Confirmed(vec![("count".to_string(), OptionValue::Int(9))])]
        );
    }

    #[test]
    fn test_repeated_live_edits_keep_the_last() {
        let mut node = Knobs::new(false);
        let companion = NodeCompanion::build(&node, &WidgetRegistry::default());
        node.core_mut().subscribe(companion.clone());

        companion.user_edit("gain", &OptionValue::Float(2.0));
        companion.user_edit("gain", &OptionValue::Float(3.0));
        let edits = companion.take_edits();
        assert_eq!(edits, vec![CompanionEdit::Live("gain".to_string(), OptionValue::Float(3.0))]);

        node.set_option("gain", OptionValue::Float(3.0)).unwrap();
        assert_eq!(companion.refresh_count(), 0);
    }

    #[test]
    fn test_unknown_option_edit_is_rejected() {
        let node = Knobs::new(false);
        let companion = NodeCompanion::build(&node, &WidgetRegistry::default());
        assert!(!companion.user_edit("label", &OptionValue::from("b")));
        assert!(companion.take_edits().is_empty());
    }
}
