use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Name of the identifier field every stored document carries.
pub const ID_FIELD: &str = "_id";

/// A schemaless document: one JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builds a document from any JSON value; non-objects are rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Returns the identifier when it is already a string.
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Returns the identifier in its stored string form without mutating the document.
    ///
    /// `None` when the field is missing or `null`.
    pub fn id_string(&self) -> Option<String> {
        self.0.get(ID_FIELD).and_then(id_to_string)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    /// Guarantees a string `_id`, generating a time-ordered one when absent.
    ///
    /// Returns the identifier now held by the document.
    pub fn ensure_id(&mut self) -> &str {
        let id = self.id_string().unwrap_or_else(generate_id);
        self.set_id(id);
        // set_id always leaves a string behind
        self.id().unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Copies only the listed fields; `_id` is always kept.
    pub fn project(&self, fields: &[String]) -> Self {
        let mut out = Map::new();
        if let Some(id) = self.0.get(ID_FIELD) {
            out.insert(ID_FIELD.to_string(), id.clone());
        }
        for field in fields {
            if let Some(value) = self.0.get(field) {
                out.insert(field.clone(), value.clone());
            }
        }
        Self(out)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Object(doc.0)
    }
}

impl TryFrom<Value> for Document {
    type Error = crate::core::DocError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let kind = json_kind(&value);
        Self::from_value(value).ok_or_else(|| {
            crate::core::DocError::Configuration(format!("expected a JSON object, got {}", kind))
        })
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// Generates a fresh identifier. UUID v7 keeps ids ordered by creation time.
pub fn generate_id() -> String {
    Uuid::now_v7().to_string()
}

/// Converts an identifier value into the string form the store keys on.
///
/// `null` counts as missing.
pub fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Normalizes a batch in place so every document carries a string `_id`.
pub fn normalize_ids(docs: &mut [Document]) {
    for doc in docs.iter_mut() {
        doc.ensure_id();
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Builds a [`Document`] from a `serde_json::json!`-style object literal.
#[macro_export]
macro_rules! doc {
    ($($tt:tt)*) => {
        $crate::core::Document::from_value(::serde_json::json!({ $($tt)* }))
            .unwrap_or_default()
    };
}
