use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ID_FIELD: &str = "Id";
/// Display-name field; `null` or `""` here marks a tombstone.
pub const NAME_FIELD: &str = "Name";
pub const ACTIVE_FIELD: &str = "isActive";

pub type Fields = Map<String, Value>;

/// Stable identity of a ticker row. The feed sends either integers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Anything other than an integer or a string is not a usable identity.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            Value::String(s) => Some(RecordId::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RecordId::Int(n) => Value::from(*n),
            RecordId::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{n}"),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl FromStr for RecordId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(s.parse::<i64>()
            .map(RecordId::Int)
            .unwrap_or_else(|_| RecordId::Text(s.to_string())))
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Int(n)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Text(s.to_string())
    }
}

/// Current state of one ticker row.
///
/// `fields` never contains `Id`; the identity lives in `id` and is fixed at
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: RecordId,
    fields: Fields,
    is_active: bool,
}

impl Record {
    pub fn new(id: RecordId, fields: Fields) -> Self {
        Self {
            id,
            fields,
            is_active: true,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    /// Writes `value` if it differs from what is stored. Returns whether it changed.
    pub(crate) fn apply_field(&mut self, field: &str, value: &Value) -> bool {
        if self.fields.get(field) == Some(value) {
            return false;
        }
        self.fields.insert(field.to_string(), value.clone());
        true
    }

    /// Row shape handed to the rendering layer: `Id`, the fields, then `isActive`.
    pub fn to_row(&self) -> Value {
        let mut row = Map::with_capacity(self.fields.len() + 2);
        row.insert(ID_FIELD.to_string(), self.id.to_value());
        for (key, value) in &self.fields {
            row.insert(key.clone(), value.clone());
        }
        row.insert(ACTIVE_FIELD.to_string(), Value::Bool(self.is_active));
        Value::Object(row)
    }
}

/// A partial record as received from the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePayload {
    pub id: Option<RecordId>,
    pub fields: Fields,
}

impl UpdatePayload {
    pub fn new(id: impl Into<RecordId>, fields: Fields) -> Self {
        Self {
            id: Some(id.into()),
            fields,
        }
    }

    pub fn tombstone(id: impl Into<RecordId>) -> Self {
        let mut fields = Fields::new();
        fields.insert(NAME_FIELD.to_string(), Value::Null);
        Self::new(id, fields)
    }

    /// Non-object values become identity-less payloads and are dropped at merge.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut fields) => {
                let id = fields
                    .remove(ID_FIELD)
                    .and_then(|raw| RecordId::from_value(&raw));
                Self { id, fields }
            }
            _ => Self {
                id: None,
                fields: Fields::new(),
            },
        }
    }

    /// `Name` present and `null` or empty. An absent `Name` is a plain partial update.
    pub fn is_tombstone(&self) -> bool {
        match self.fields.get(NAME_FIELD) {
            Some(Value::Null) => true,
            Some(Value::String(name)) => name.is_empty(),
            _ => false,
        }
    }
}
