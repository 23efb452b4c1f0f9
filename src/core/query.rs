//! Document filters and find options.
//!
//! A [`Query`] is a conjunction of per-field conditions. It can be built
//! programmatically or parsed from a mongo-style JSON object such as
//! `{"status": "open", "_id": {"$in": ["1", "2"]}}`.

use super::document::{Document, ID_FIELD};
use super::error::{DocError, Result};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Exists(bool),
}

impl Condition {
    fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => actual == Some(expected),
            Self::Ne(expected) => actual != Some(expected),
            Self::In(values) => actual.is_some_and(|v| values.contains(v)),
            Self::NotIn(values) => !actual.is_some_and(|v| values.contains(v)),
            Self::Exists(flag) => actual.is_some() == *flag,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    conditions: Vec<(String, Condition)>,
}

impl Query {
    /// Matches every document.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, Condition::Eq(value.into()))
    }

    pub fn is_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::all().and(field, Condition::In(values.into_iter().map(Into::into).collect()))
    }

    /// `_id` membership lookup used by paged fetches.
    pub fn ids_in<S: AsRef<str>>(ids: &[S]) -> Self {
        Self::is_in(ID_FIELD, ids.iter().map(|id| Value::String(id.as_ref().to_string())))
    }

    pub fn and(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.conditions.push((field.into(), condition));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.conditions
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, condition)| condition.matches(doc.get(field)))
    }

    /// Position and values of the first `_id $in` condition, for index lookups.
    pub fn id_lookup(&self) -> Option<(usize, &[Value])> {
        self.conditions
            .iter()
            .enumerate()
            .find_map(|(pos, (field, condition))| match condition {
                Condition::In(values) if field == ID_FIELD => Some((pos, values.as_slice())),
                _ => None,
            })
    }

    /// `matches`, ignoring the condition at `skip`.
    pub fn matches_except(&self, doc: &Document, skip: usize) -> bool {
        self.conditions
            .iter()
            .enumerate()
            .filter(|(pos, _)| *pos != skip)
            .all(|(_, (field, condition))| condition.matches(doc.get(field)))
    }

    /// Parses a mongo-style filter object.
    pub fn from_json(value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| {
            DocError::Configuration("query must be a JSON object".to_string())
        })?;
        Self::from_map(map)
    }

    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        let mut query = Self::all();
        for (field, filter) in map {
            match filter {
                Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                    for (op, arg) in ops {
                        query = query.and(field.clone(), parse_operator(field, op, arg)?);
                    }
                }
                other => query = query.and(field.clone(), Condition::Eq(other.clone())),
            }
        }
        Ok(query)
    }
}

fn parse_operator(field: &str, op: &str, arg: &Value) -> Result<Condition> {
    let list = |arg: &Value| -> Result<Vec<Value>> {
        arg.as_array().cloned().ok_or_else(|| {
            DocError::Configuration(format!("{} on '{}' expects an array", op, field))
        })
    };

    match op {
        "$eq" => Ok(Condition::Eq(arg.clone())),
        "$ne" => Ok(Condition::Ne(arg.clone())),
        "$in" => Ok(Condition::In(list(arg)?)),
        "$nin" => Ok(Condition::NotIn(list(arg)?)),
        "$exists" => arg.as_bool().map(Condition::Exists).ok_or_else(|| {
            DocError::Configuration(format!("$exists on '{}' expects a boolean", field))
        }),
        other => Err(DocError::Configuration(format!(
            "unsupported query operator '{}' on '{}'",
            other, field
        ))),
    }
}

/// Field selection applied to found documents. `_id` is always returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Projection {
    #[default]
    All,
    Fields(Vec<String>),
}

impl Projection {
    pub fn id_only() -> Self {
        Self::Fields(Vec::new())
    }

    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fields(fields.into_iter().map(Into::into).collect())
    }

    pub fn apply(&self, doc: &Document) -> Document {
        match self {
            Self::All => doc.clone(),
            Self::Fields(fields) => doc.project(fields),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub projection: Projection,
    /// Maximum number of documents; 0 means unlimited.
    pub limit: usize,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}
