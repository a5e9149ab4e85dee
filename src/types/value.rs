use super::TargetSpec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Property naming the function that produced a value.
pub const FUNCTION_PROPERTY: &str = "Function";

// =============================================================================
// Value properties, requirements and specifications
// =============================================================================

/// Ordered multimap of property name to allowed values.
///
/// Used both as requirement constraints and as the concrete properties of a
/// produced value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueProperties(BTreeMap<String, BTreeSet<String>>);

impl ValueProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper adding one value for a property.
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.0
            .entry(name.to_string())
            .or_default()
            .insert(value.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.0.get(name)
    }

    /// First value of a property, if any.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.0.get(name)?.iter().next().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if every constraint in `self` is met by `properties`.
    pub fn is_satisfied_by(&self, properties: &ValueProperties) -> bool {
        self.0.iter().all(|(name, wanted)| match properties.get(name) {
            Some(actual) => wanted.is_empty() || wanted.iter().any(|v| actual.contains(v)),
            None => false,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }
}

impl fmt::Display for ValueProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, values) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            let joined: Vec<&str> = values.iter().map(String::as_str).collect();
            write!(f, "{}=[{}]", name, joined.join(", "))?;
        }
        Ok(())
    }
}

/// A request for a named value on a target, subject to constraints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRequirement {
    pub value_name: String,
    pub target: TargetSpec,
    #[serde(default)]
    pub constraints: ValueProperties,
}

impl ValueRequirement {
    pub fn new(value_name: &str, target: TargetSpec, constraints: ValueProperties) -> Self {
        Self {
            value_name: value_name.to_string(),
            target,
            constraints,
        }
    }
}

impl fmt::Display for ValueRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.value_name, self.target)
    }
}

/// A concrete value produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSpecification {
    pub value_name: String,
    pub target: TargetSpec,
    #[serde(default)]
    pub properties: ValueProperties,
}

impl ValueSpecification {
    pub fn new(value_name: &str, target: TargetSpec, properties: ValueProperties) -> Self {
        Self {
            value_name: value_name.to_string(),
            target,
            properties,
        }
    }

    /// Identifier of the producing function, taken from the `Function` property.
    pub fn function_id(&self) -> Option<&str> {
        self.properties.first(FUNCTION_PROPERTY)
    }
}

impl fmt::Display for ValueSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {} ({})", self.value_name, self.target, self.properties)
    }
}

/// A value specification within one calculation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueResultKey {
    pub calc_config: String,
    pub spec: ValueSpecification,
}

impl ValueResultKey {
    pub fn new(calc_config: &str, spec: ValueSpecification) -> Self {
        Self {
            calc_config: calc_config.to_string(),
            spec,
        }
    }
}

// =============================================================================
// Values
// =============================================================================

/// Declared type of a value or column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Double,
    Integer,
    Text,
    Boolean,
    LabelledVector,
    Unknown,
}

/// Why a cell has no value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum MissingValue {
    /// The cache holds no result for the key yet.
    Pending,
    /// Nothing is computed for the cell.
    NotAvailable,
    /// The engine failed to compute the value.
    Failed { message: String },
}

/// One value plus its labels, the usual candidate for inlining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelledVector {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl LabelledVector {
    pub fn new(labels: Vec<String>, values: Vec<f64>) -> Self {
        Self { labels, values }
    }

    /// Element for a label, if present.
    pub fn get(&self, label: &str) -> Option<f64> {
        self.labels
            .iter()
            .position(|l| l == label)
            .and_then(|i| self.values.get(i).copied())
    }
}

/// A computed (or missing) value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Double(f64),
    Integer(i64),
    Text(String),
    Boolean(bool),
    Labelled(LabelledVector),
    Missing(MissingValue),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Double(_) => ValueType::Double,
            Value::Integer(_) => ValueType::Integer,
            Value::Text(_) => ValueType::Text,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Labelled(_) => ValueType::LabelledVector,
            Value::Missing(_) => ValueType::Unknown,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Missing(MissingValue::Failed { .. }))
    }

    pub fn pending() -> Self {
        Value::Missing(MissingValue::Pending)
    }

    pub fn not_available() -> Self {
        Value::Missing(MissingValue::NotAvailable)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Value::Missing(MissingValue::Failed {
            message: message.into(),
        })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}

fn same_f64(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

// NaN equals NaN, otherwise an undefined result would change every cycle.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Double(a), Value::Double(b)) => same_f64(*a, *b),
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Labelled(a), Value::Labelled(b)) => {
                a.labels == b.labels
                    && a.values.len() == b.values.len()
                    && a.values.iter().zip(&b.values).all(|(x, y)| same_f64(*x, *y))
            }
            (Value::Missing(a), Value::Missing(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Double(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Labelled(v) => write!(f, "Vector ({})", v.values.len()),
            Value::Missing(MissingValue::Failed { message }) => write!(f, "Error: {}", message),
            Value::Missing(_) => Ok(()),
        }
    }
}
