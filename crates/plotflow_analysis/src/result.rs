// SPDX-License-Identifier: MIT OR Apache-2.0
//! Named parameter results produced by analyses.

use crate::analysis::Coordinates;
use crate::error::{AnalysisError, Result};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::rc::Rc;

/// Attribute names starting with this marker are never exported
pub const RESERVED_MARKER: char = '_';

/// Value of a parameter attribute
#[derive(Clone)]
pub enum AttrValue {
    /// Numeric attribute (standard error, bounds, ...)
    Number(f64),
    /// Boolean attribute
    Flag(bool),
    /// Text attribute
    Text(String),
    /// Callable attribute, kept for consumers that know the concrete analysis
    Callable(Rc<dyn Fn(f64) -> f64>),
}

impl AttrValue {
    /// Whether this attribute holds a callable
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Callable(_))
    }

    /// Numeric content, if any
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    fn export(&self) -> Option<ExportedValue> {
        match self {
            Self::Number(v) => Some(ExportedValue::Number(*v)),
            Self::Flag(v) => Some(ExportedValue::Flag(*v)),
            Self::Text(v) => Some(ExportedValue::Text(v.clone())),
            Self::Callable(_) => None,
        }
    }
}

impl fmt::Debug for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "Number({v})"),
            Self::Flag(v) => write!(f, "Flag({v})"),
            Self::Text(v) => write!(f, "Text({v:?})"),
            Self::Callable(_) => f.write_str("Callable(..)"),
        }
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Exported, serializable attribute value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExportedValue {
    /// Numeric value
    Number(f64),
    /// Boolean value
    Flag(bool),
    /// Text value
    Text(String),
}

/// Exported view of a parameter collection: parameter name to attribute map
pub type ParamsDict = IndexMap<String, IndexMap<String, ExportedValue>>;

/// A single named result parameter
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Parameter value
    pub value: f64,
    attrs: IndexMap<String, AttrValue>,
}

impl Parameter {
    /// Create a parameter without attributes
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            attrs: IndexMap::new(),
        }
    }

    /// Attach an attribute
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Get an attribute
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    /// All attributes, reserved and callable ones included
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Public attributes: name, value and every non-reserved, non-callable attribute
    pub fn export(&self) -> IndexMap<String, ExportedValue> {
        let mut out = IndexMap::new();
        out.insert("name".to_string(), ExportedValue::Text(self.name.clone()));
        out.insert("value".to_string(), ExportedValue::Number(self.value));
        for (key, attr) in &self.attrs {
            if key.starts_with(RESERVED_MARKER) {
                continue;
            }
            if let Some(value) = attr.export() {
                out.insert(key.clone(), value);
            }
        }
        out
    }
}

/// Ordered collection of uniquely named parameters
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    params: IndexMap<String, Parameter>,
}

impl Parameters {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite a parameter
    pub fn add(&mut self, param: Parameter) {
        self.params.insert(param.name.clone(), param);
    }

    /// Get a parameter by name
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.get(name)
    }

    /// Value of a parameter by name
    pub fn value(&self, name: &str) -> Option<f64> {
        self.params.get(name).map(|p| p.value)
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.values()
    }

    /// Parameter names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether there are no parameters
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Exported view of every parameter
    pub fn to_dict(&self) -> ParamsDict {
        self.params
            .iter()
            .map(|(name, param)| (name.clone(), param.export()))
            .collect()
    }
}

/// Common surface of everything an analysis returns.
///
/// Downstream consumers (UI panels, reports) only rely on this trait, never
/// on the concrete analysis type.
pub trait AnalysisOutput {
    /// The result parameters
    fn params(&self) -> &Parameters;

    /// Export every parameter's public attributes
    fn params_to_dict(&self) -> ParamsDict {
        self.params().to_dict()
    }

    /// Evaluate the result at arbitrary coordinates
    fn eval(&self, _coordinates: &Coordinates) -> Result<Vec<f64>> {
        Err(AnalysisError::NotImplementedCapability("eval"))
    }
}

/// Plain parameter result of an analysis
#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    params: Parameters,
}

impl AnalysisResult {
    /// Create an empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a result from plain name/value pairs
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut result = Self::new();
        for (name, value) in values {
            result.add(Parameter::new(name, value));
        }
        result
    }

    /// Add or overwrite a parameter
    pub fn add(&mut self, param: Parameter) {
        self.params.add(param);
    }

    /// Value of a parameter by name
    pub fn value(&self, name: &str) -> Option<f64> {
        self.params.value(name)
    }
}

impl AnalysisOutput for AnalysisResult {
    fn params(&self) -> &Parameters {
        &self.params
    }
}
