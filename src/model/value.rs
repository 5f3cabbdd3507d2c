//! Property values and deferred placeholders.
//!
//! A property bag is a tree of [`Value`]s. Literal variants hold concrete data;
//! [`Value::Deferred`] stands in for another node's output that is only known
//! after that node is realized. [`Value::Interpolate`] and [`Value::Json`]
//! compose deferred values into connection strings and JSON fragments without
//! ever observing the runtime value during declaration.

use serde::Serialize;
use std::collections::BTreeMap;

use super::node::NodeId;

/// A node's input properties, keyed by property name.
pub type Properties = BTreeMap<String, Value>;

/// A property value: a literal, a deferred reference, or a composition of both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// JSON null.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Numeric literal.
    Number(serde_json::Number),
    /// String literal.
    String(String),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Nested object.
    Object(BTreeMap<String, Value>),
    /// Placeholder for another node's output.
    Deferred(Deferred),
    /// Concatenation of the string rendering of each part.
    Interpolate(Vec<Value>),
    /// The inner value, resolved and embedded as JSON text.
    Json(Box<Value>),
}

/// A reference to a named output of another node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deferred {
    /// Identity of the node that publishes the output.
    pub source: NodeId,
    /// Name of the output.
    pub output: String,
    /// Transformation applied to the published value.
    pub transform: Transform,
}

/// Transformation applied to a published output before substitution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum Transform {
    /// Substitute the value verbatim.
    #[default]
    Identity,
    /// Read one field of a JSON object (or of a string holding JSON text).
    JsonField(String),
    /// Render the value as a string.
    Stringify,
}

impl Deferred {
    /// Creates a plain reference to `source.output`.
    #[must_use]
    pub fn new(source: NodeId, output: impl Into<String>) -> Self {
        Self {
            source,
            output: output.into(),
            transform: Transform::Identity,
        }
    }

    /// Reads `key` out of the JSON document published under this output.
    #[must_use]
    pub fn json_field(mut self, key: impl Into<String>) -> Self {
        self.transform = Transform::JsonField(key.into());
        self
    }

    /// Renders the published value as a string.
    #[must_use]
    pub fn stringify(mut self) -> Self {
        self.transform = Transform::Stringify;
        self
    }

    /// Applies this reference's transform to a published value.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the value does not fit the transform.
    pub fn apply(&self, published: &serde_json::Value) -> std::result::Result<serde_json::Value, String> {
        match &self.transform {
            Transform::Identity => Ok(published.clone()),
            Transform::Stringify => Ok(serde_json::Value::String(render(published))),
            Transform::JsonField(key) => {
                let document = match published {
                    serde_json::Value::String(text) => serde_json::from_str(text)
                        .map_err(|e| format!("output is not a JSON document: {e}"))?,
                    other => other.clone(),
                };
                document
                    .get(key)
                    .cloned()
                    .ok_or_else(|| format!("JSON document has no field '{key}'"))
            }
        }
    }
}

impl std::fmt::Display for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${{{}.{}", self.source, self.output)?;
        match &self.transform {
            Transform::Identity => {}
            Transform::JsonField(key) => write!(f, "|json:{key}")?,
            Transform::Stringify => write!(f, "|string")?,
        }
        write!(f, "}}")
    }
}

/// Renders a concrete value the way it appears inside an interpolated string.
///
/// Strings are inserted verbatim, null renders as nothing, and structured
/// values render as compact JSON.
#[must_use]
pub fn render(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

impl Value {
    /// Builds an interpolated string from literal and deferred parts.
    #[must_use]
    pub fn interpolate<I, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Self>,
    {
        Self::Interpolate(parts.into_iter().map(Into::into).collect())
    }

    /// Embeds a value as a JSON text fragment.
    #[must_use]
    pub fn json(inner: impl Into<Self>) -> Self {
        Self::Json(Box::new(inner.into()))
    }

    /// Builds an object from key/value pairs.
    #[must_use]
    pub fn object<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Self>,
    {
        Self::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builds a list from values.
    #[must_use]
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Self>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Returns true if no deferred reference appears anywhere in this value.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs.is_empty()
    }

    /// Collects every deferred reference in this value, depth first.
    pub fn collect_references<'a>(&'a self, out: &mut Vec<&'a Deferred>) {
        match self {
            Self::Deferred(d) => out.push(d),
            Self::List(items) | Self::Interpolate(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Self::Object(map) => {
                for item in map.values() {
                    item.collect_references(out);
                }
            }
            Self::Json(inner) => inner.collect_references(out),
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_) => {}
        }
    }

    /// Resolves this value into a concrete JSON value.
    ///
    /// `lookup` is called for every deferred reference and must return the
    /// already-transformed concrete value.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `lookup`.
    pub fn resolve_with<E, F>(&self, lookup: &mut F) -> std::result::Result<serde_json::Value, E>
    where
        F: FnMut(&Deferred) -> std::result::Result<serde_json::Value, E>,
    {
        match self {
            Self::Null => Ok(serde_json::Value::Null),
            Self::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Self::Number(n) => Ok(serde_json::Value::Number(n.clone())),
            Self::String(s) => Ok(serde_json::Value::String(s.clone())),
            Self::List(items) => items
                .iter()
                .map(|item| item.resolve_with(lookup))
                .collect::<std::result::Result<Vec<_>, E>>()
                .map(serde_json::Value::Array),
            Self::Object(map) => {
                let mut resolved = serde_json::Map::new();
                for (key, item) in map {
                    resolved.insert(key.clone(), item.resolve_with(lookup)?);
                }
                Ok(serde_json::Value::Object(resolved))
            }
            Self::Deferred(d) => lookup(d),
            Self::Interpolate(parts) => {
                let mut text = String::new();
                for part in parts {
                    text.push_str(&render(&part.resolve_with(lookup)?));
                }
                Ok(serde_json::Value::String(text))
            }
            Self::Json(inner) => {
                let resolved = inner.resolve_with(lookup)?;
                Ok(serde_json::Value::String(resolved.to_string()))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(n.into())
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Self::Number(n.into())
    }
}

impl From<Deferred> for Value {
    fn from(d: Deferred) -> Self {
        Self::Deferred(d)
    }
}

impl From<Vec<Self>> for Value {
    fn from(items: Vec<Self>) -> Self {
        Self::List(items)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Into::into).collect()),
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}
