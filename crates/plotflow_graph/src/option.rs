// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node options: declarations, values and the notifying setter.
//!
//! Options are the only externally mutable state of a node besides its
//! input. Every write goes through [`NotifyingSetter`], which stores the
//! value and then emits exactly one [`NodeEvent::OptionChanged`].

use crate::signal::{NodeEvent, NodeSignals};
use indexmap::IndexMap;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Value of an option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// Text
    Text(String),
}

impl OptionValue {
    /// Kind matching this value
    pub fn kind(&self) -> OptionKind {
        match self {
            Self::Bool(_) => OptionKind::Bool,
            Self::Int(_) => OptionKind::Int,
            Self::Float(_) => OptionKind::Float,
            Self::Text(_) => OptionKind::Text,
        }
    }

    /// Numeric content; integers widen to floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Integer content
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text content
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Boolean content
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Declared kind of an option
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OptionKind {
    /// Integer option
    Int,
    /// Floating point option
    Float,
    /// Boolean option
    Bool,
    /// Text option
    Text,
    /// Anything else; accepts every value and has no default widget
    Other(String),
}

impl From<String> for OptionKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "int" | "integer" => Self::Int,
            "float" => Self::Float,
            "bool" => Self::Bool,
            "str" | "text" => Self::Text,
            _ => Self::Other(value),
        }
    }
}

impl From<OptionKind> for String {
    fn from(value: OptionKind) -> Self {
        match value {
            OptionKind::Int => "int".to_string(),
            OptionKind::Float => "float".to_string(),
            OptionKind::Bool => "bool".to_string(),
            OptionKind::Text => "str".to_string(),
            OptionKind::Other(name) => name,
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from(self.clone()))
    }
}

/// Errors raised when reading or writing options
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionError {
    /// The option was never declared on the node
    #[error("Option '{option}' is not registered on node '{node}'")]
    UnregisteredOption {
        /// Node instance name
        node: String,
        /// Option name
        option: String,
    },

    /// The value does not fit the declared kind
    #[error("Option '{option}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Option name
        option: String,
        /// Declared kind
        expected: OptionKind,
        /// Offending value
        found: OptionValue,
    },
}

/// Declarative option description.
///
/// Recognized keys are `type`, `initialValue` and `confirm`; anything else is
/// kept in `extra` and ignored by the default widget factory.
///
/// ```ron
/// (type: "int", initialValue: 5, minimum: 0)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    /// Declared kind
    pub kind: OptionKind,
    /// Value the option starts with
    pub initial_value: Option<OptionValue>,
    /// Per-option confirm flag, overriding the node default
    pub confirm: Option<bool>,
    /// Unrecognized keys
    pub extra: IndexMap<String, OptionValue>,
}

/// Value of one spec key, written bare or as `Some(..)`/`None`
#[derive(Deserialize)]
#[serde(untagged)]
enum SpecEntry {
    Bare(OptionValue),
    Wrapped(Option<OptionValue>),
}

impl Serialize for OptionSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 1 + usize::from(self.initial_value.is_some()) + usize::from(self.confirm.is_some()) + self.extra.len();
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("type", &self.kind)?;
        if let Some(value) = &self.initial_value {
            map.serialize_entry("initialValue", value)?;
        }
        if let Some(confirm) = self.confirm {
            map.serialize_entry("confirm", &confirm)?;
        }
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct SpecVisitor;

impl<'de> Visitor<'de> for SpecVisitor {
    type Value = OptionSpec;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an option spec with a `type` key")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<OptionSpec, A::Error> {
        let mut entries = IndexMap::new();
        while let Some(key) = map.next_key::<String>()? {
            let value = match map.next_value::<SpecEntry>()? {
                SpecEntry::Bare(value) => Some(value),
                SpecEntry::Wrapped(value) => value,
            };
            if let Some(value) = value {
                entries.insert(key, value);
            }
        }
        if !matches!(entries.get("type"), Some(OptionValue::Text(_))) {
            return Err(de::Error::missing_field("type"));
        }
        Ok(OptionSpec::from_entries(entries))
    }
}

impl<'de> Deserialize<'de> for OptionSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Struct syntax `(type: ..)` and map syntax `{"type": ..}` both reach `visit_map`
        deserializer.deserialize_any(SpecVisitor)
    }
}

impl OptionSpec {
    /// Spec of the given kind without an initial value
    pub fn new(kind: OptionKind) -> Self {
        Self {
            kind,
            initial_value: None,
            confirm: None,
            extra: IndexMap::new(),
        }
    }

    /// Integer option
    pub fn int(initial: i64) -> Self {
        Self::new(OptionKind::Int).with_initial(initial)
    }

    /// Floating point option
    pub fn float(initial: f64) -> Self {
        Self::new(OptionKind::Float).with_initial(initial)
    }

    /// Boolean option
    pub fn flag(initial: bool) -> Self {
        Self::new(OptionKind::Bool).with_initial(initial)
    }

    /// Text option, possibly unset
    pub fn text(initial: Option<&str>) -> Self {
        let spec = Self::new(OptionKind::Text);
        match initial {
            Some(v) => spec.with_initial(v),
            None => spec,
        }
    }

    /// Build a spec from loose key/value entries
    pub fn from_entries(entries: IndexMap<String, OptionValue>) -> Self {
        let mut spec = Self::new(OptionKind::Other(String::new()));
        for (key, value) in entries {
            match (key.as_str(), value) {
                ("type", OptionValue::Text(kind)) => spec.kind = OptionKind::from(kind),
                ("initialValue", value) => spec.initial_value = Some(value),
                ("confirm", OptionValue::Bool(confirm)) => spec.confirm = Some(confirm),
                (_, value) => {
                    spec.extra.insert(key, value);
                }
            }
        }
        spec
    }

    /// Set the initial value
    pub fn with_initial(mut self, value: impl Into<OptionValue>) -> Self {
        self.initial_value = Some(value.into());
        self
    }

    /// Set the per-option confirm flag
    pub fn with_confirm(mut self, confirm: bool) -> Self {
        self.confirm = Some(confirm);
        self
    }

    /// Attach an extra key
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Confirm flag for this option given the node default
    pub fn needs_confirm(&self, node_default: bool) -> bool {
        self.confirm.unwrap_or(node_default)
    }

    /// Check `value` against the declared kind, widening ints for float options
    pub fn coerce(&self, option: &str, value: OptionValue) -> Result<OptionValue, OptionError> {
        match (&self.kind, value) {
            (OptionKind::Int, v @ OptionValue::Int(_))
            | (OptionKind::Float, v @ OptionValue::Float(_))
            | (OptionKind::Bool, v @ OptionValue::Bool(_))
            | (OptionKind::Text, v @ OptionValue::Text(_))
            | (OptionKind::Other(_), v) => Ok(v),
            (OptionKind::Float, OptionValue::Int(i)) => Ok(OptionValue::Float(i as f64)),
            (kind, found) => Err(OptionError::TypeMismatch {
                option: option.to_string(),
                expected: kind.clone(),
                found,
            }),
        }
    }
}

/// A declared option and its current value
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSlot {
    spec: OptionSpec,
    value: Option<OptionValue>,
}

impl OptionSlot {
    /// Slot at the initial value, coerced to the declared kind.
    ///
    /// An initial value of the wrong kind is dropped and the option starts unset.
    fn new(name: &str, mut spec: OptionSpec) -> Self {
        let value = spec
            .initial_value
            .take()
            .and_then(|value| match spec.coerce(name, value) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!("Ignoring initial value: {}", err);
                    None
                }
            });
        spec.initial_value = value.clone();
        Self { spec, value }
    }

    /// Declaration
    pub fn spec(&self) -> &OptionSpec {
        &self.spec
    }

    /// Current value
    pub fn value(&self) -> Option<&OptionValue> {
        self.value.as_ref()
    }

    /// The raw setter: validate and store, no notification
    fn store(&mut self, option: &str, value: OptionValue) -> Result<OptionValue, OptionError> {
        let value = self.spec.coerce(option, value)?;
        self.value = Some(value.clone());
        Ok(value)
    }
}

/// Interceptor around an option's raw setter.
///
/// Stores the value, then emits one notification naming the option.
pub struct NotifyingSetter<'a> {
    node: &'a str,
    option: &'a str,
    slot: &'a mut OptionSlot,
    signals: &'a NodeSignals,
}

impl NotifyingSetter<'_> {
    /// Store `value` and notify observers
    pub fn set(self, value: OptionValue) -> Result<(), OptionError> {
        let stored = self.slot.store(self.option, value)?;
        tracing::debug!("Option {}.{} set to {}", self.node, self.option, stored);
        self.signals.emit(&NodeEvent::OptionChanged {
            node: self.node.to_string(),
            option: self.option.to_string(),
            value: stored,
        });
        Ok(())
    }
}

/// Per-node table of declared options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionRegistry {
    owner: String,
    slots: IndexMap<String, OptionSlot>,
}

impl OptionRegistry {
    /// Create an empty registry for the named node
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            slots: IndexMap::new(),
        }
    }

    /// Create a registry holding one slot per spec, at its initial value
    pub fn from_specs(owner: impl Into<String>, specs: &IndexMap<String, OptionSpec>) -> Self {
        let mut registry = Self::new(owner);
        for (name, spec) in specs {
            registry.declare(name.clone(), spec.clone());
        }
        registry
    }

    /// Declare an option; re-declaring replaces the previous slot
    pub fn declare(&mut self, name: impl Into<String>, spec: OptionSpec) {
        let name = name.into();
        let slot = OptionSlot::new(&name, spec);
        self.slots.insert(name, slot);
    }

    /// Name of the owning node
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Whether `name` is declared
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Declared option names, in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Declarations, in declaration order
    pub fn specs(&self) -> IndexMap<String, OptionSpec> {
        self.slots
            .iter()
            .map(|(name, slot)| (name.clone(), slot.spec.clone()))
            .collect()
    }

    /// Number of declared options
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no option is declared
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Declaration of one option
    pub fn spec(&self, name: &str) -> Result<&OptionSpec, OptionError> {
        self.slot(name).map(OptionSlot::spec)
    }

    /// Current value of an option; `None` when unset
    pub fn get(&self, name: &str) -> Result<Option<&OptionValue>, OptionError> {
        self.slot(name).map(OptionSlot::value)
    }

    /// Current value as float
    pub fn float(&self, name: &str) -> Result<Option<f64>, OptionError> {
        self.typed(name, OptionKind::Float, OptionValue::as_f64)
    }

    /// Current value as integer
    pub fn int(&self, name: &str) -> Result<Option<i64>, OptionError> {
        self.typed(name, OptionKind::Int, OptionValue::as_i64)
    }

    /// Current value as text
    pub fn text(&self, name: &str) -> Result<Option<&str>, OptionError> {
        self.typed(name, OptionKind::Text, OptionValue::as_str)
    }

    /// Current value as boolean
    pub fn flag(&self, name: &str) -> Result<Option<bool>, OptionError> {
        self.typed(name, OptionKind::Bool, OptionValue::as_bool)
    }

    /// Snapshot of all values
    pub fn values(&self) -> IndexMap<String, Option<OptionValue>> {
        self.slots
            .iter()
            .map(|(name, slot)| (name.clone(), slot.value.clone()))
            .collect()
    }

    /// The notifying setter for one option
    pub fn setter<'a>(&'a mut self, name: &'a str, signals: &'a NodeSignals) -> Result<NotifyingSetter<'a>, OptionError> {
        let Self { owner, slots } = self;
        let slot = slots.get_mut(name).ok_or_else(|| OptionError::UnregisteredOption {
            node: owner.clone(),
            option: name.to_string(),
        })?;
        Ok(NotifyingSetter {
            node: owner,
            option: name,
            slot,
            signals,
        })
    }

    /// Apply several values as one mutation.
    ///
    /// Every value is validated before anything is stored; on success a single
    /// [`NodeEvent::OptionsConfirmed`] is emitted.
    pub fn apply_batch(
        &mut self,
        changes: Vec<(String, OptionValue)>,
        signals: &NodeSignals,
    ) -> Result<(), OptionError> {
        let mut validated = Vec::with_capacity(changes.len());
        for (name, value) in changes {
            let slot = self.slot(&name)?;
            let value = slot.spec.coerce(&name, value)?;
            validated.push((name, value));
        }
        for (name, value) in &validated {
            if let Some(slot) = self.slots.get_mut(name) {
                slot.value = Some(value.clone());
            }
        }
        tracing::debug!("Node {} confirmed {} option(s)", self.owner, validated.len());
        signals.emit(&NodeEvent::OptionsConfirmed {
            node: self.owner.clone(),
            changes: validated,
        });
        Ok(())
    }

    fn slot(&self, name: &str) -> Result<&OptionSlot, OptionError> {
        self.slots.get(name).ok_or_else(|| OptionError::UnregisteredOption {
            node: self.owner.clone(),
            option: name.to_string(),
        })
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: OptionKind,
        read: impl Fn(&'a OptionValue) -> Option<T>,
    ) -> Result<Option<T>, OptionError> {
        match self.get(name)? {
            None => Ok(None),
            Some(value) => read(value).map(Some).ok_or_else(|| OptionError::TypeMismatch {
                option: name.to_string(),
                expected,
                found: value.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::EventLog;
    use std::rc::Rc;

    fn registry() -> OptionRegistry {
        let mut registry = OptionRegistry::new("scale");
        registry.declare("factor", OptionSpec::float(1.0));
        registry.declare("repeats", OptionSpec::int(2));
        registry.declare("axis", OptionSpec::text(None));
        registry
    }

    #[test]
    fn test_round_trip_with_one_notification_per_set() {
        let log = Rc::new(EventLog::default());
        let mut signals = NodeSignals::default();
        signals.subscribe(log.clone());
        let mut options = registry();

        options.setter("factor", &signals).unwrap().set(OptionValue::Float(2.5)).unwrap();
        assert_eq!(options.float("factor").unwrap(), Some(2.5));
        assert_eq!(log.count_for("scale", "factor"), 1);

        options.setter("factor", &signals).unwrap().set(OptionValue::Float(2.5)).unwrap();
        assert_eq!(log.count_for("scale", "factor"), 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_int_widens_for_float_options() {
        let signals = NodeSignals::default();
        let mut options = registry();
        options.setter("factor", &signals).unwrap().set(OptionValue::Int(3)).unwrap();
        assert_eq!(options.get("factor").unwrap(), Some(&OptionValue::Float(3.0)));
    }

    #[test]
    fn test_type_mismatch_leaves_value() {
        let log = Rc::new(EventLog::default());
        let mut signals = NodeSignals::default();
        signals.subscribe(log.clone());
        let mut options = registry();

        let err = options
            .setter("repeats", &signals)
            .unwrap()
            .set(OptionValue::Float(1.5))
            .unwrap_err();
        assert!(matches!(err, OptionError::TypeMismatch { .. }));
        assert_eq!(options.int("repeats").unwrap(), Some(2));
        assert!(log.is_empty());
        assert!(options.text("repeats").is_err());
    }

    #[test]
    fn test_unregistered_option() {
        let signals = NodeSignals::default();
        let mut options = registry();
        assert!(matches!(
            options.get("gain"),
            Err(OptionError::UnregisteredOption { .. })
        ));
        assert!(matches!(
            options.setter("gain", &signals),
            Err(OptionError::UnregisteredOption { .. })
        ));
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let log = Rc::new(EventLog::default());
        let mut signals = NodeSignals::default();
        signals.subscribe(log.clone());
        let mut options = registry();

        let err = options.apply_batch(
            vec![
                ("factor".to_string(), OptionValue::Float(4.0)),
                ("repeats".to_string(), OptionValue::Text("x".to_string())),
            ],
            &signals,
        );
        assert!(err.is_err());
        assert_eq!(options.float("factor").unwrap(), Some(1.0));
        assert!(log.is_empty());

        options
            .apply_batch(
                vec![
                    ("factor".to_string(), OptionValue::Float(4.0)),
                    ("axis".to_string(), OptionValue::from("y")),
                ],
                &signals,
            )
            .unwrap();
        assert_eq!(options.text("axis").unwrap(), Some("y"));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_spec_from_entries_keeps_unknown_keys() {
        let spec = OptionSpec::from_entries(IndexMap::from([
            ("type".to_string(), OptionValue::from("int")),
            ("initialValue".to_string(), OptionValue::Int(5)),
            ("minimum".to_string(), OptionValue::Int(0)),
        ]));
        assert_eq!(spec.kind, OptionKind::Int);
        assert_eq!(spec.initial_value, Some(OptionValue::Int(5)));
        assert_eq!(spec.extra.get("minimum"), Some(&OptionValue::Int(0)));
        assert!(spec.needs_confirm(true));
        assert!(!spec.with_confirm(false).needs_confirm(true));
    }

    #[test]
    fn test_spec_ron_surface() {
        let spec: OptionSpec = ron::from_str(r#"(type: "float", initialValue: 0.5, step: 0.1)"#).unwrap();
        assert_eq!(spec.kind, OptionKind::Float);
        assert_eq!(spec.initial_value, Some(OptionValue::Float(0.5)));
        assert_eq!(spec.extra.get("step"), Some(&OptionValue::Float(0.1)));

        let other: OptionSpec = ron::from_str(r#"(type: "complex")"#).unwrap();
        assert_eq!(other.kind, OptionKind::Other("complex".to_string()));
        assert_eq!(other.initial_value, None);

        assert!(ron::from_str::<OptionSpec>(r#"(initialValue: 1)"#).is_err());
    }

    #[test]
    fn test_spec_ron_keeps_unknown_keys() {
        let spec: OptionSpec = ron::from_str(r#"(type: "int", initialValue: Some(5), minimum: 0, confirm: false)"#).unwrap();
        assert_eq!(spec.initial_value, Some(OptionValue::Int(5)));
        assert_eq!(spec.confirm, Some(false));
        assert_eq!(spec.extra.get("minimum"), Some(&OptionValue::Int(0)));

        let unset: OptionSpec = ron::from_str(r#"(type: "str", initialValue: None)"#).unwrap();
        assert_eq!(unset.kind, OptionKind::Text);
        assert_eq!(unset.initial_value, None);

        let written = ron::to_string(&spec).unwrap();
        assert_eq!(ron::from_str::<OptionSpec>(&written).unwrap(), spec);
    }

    #[test]
    fn test_initial_values_follow_the_declared_kind() {
        let mut options = OptionRegistry::new("n");
        options.declare("gain", OptionSpec::new(OptionKind::Float).with_initial(1));
        options.declare("count", OptionSpec::new(OptionKind::Int).with_initial("three"));

        assert_eq!(options.get("gain").unwrap(), Some(&OptionValue::Float(1.0)));
        assert_eq!(options.spec("gain").unwrap().initial_value, Some(OptionValue::Float(1.0)));
        assert_eq!(options.get("count").unwrap(), None);
    }
}
