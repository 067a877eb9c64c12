use crate::error::{Result, SheetDbError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Row identity, assigned by the backend.
pub const ID_FIELD: &str = "_id";
/// Row last-modified timestamp, maintained by the backend.
pub const UPDATED_FIELD: &str = "_updated";

/// Field names starting with `_` are reserved for row metadata and never map to columns.
pub fn is_meta_field(name: &str) -> bool {
    name.starts_with('_')
}

/// A scalar cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(DateTime<Utc>),
}

impl Value {
    /// Converts a JSON scalar. Arrays and objects have no cell representation.
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number),
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(format_timestamp(d)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// JavaScript-style truthiness, used by `$currentDate` flags.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Date(_) => true,
        }
    }

    /// Text written into a spreadsheet cell.
    pub fn to_cell_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Text(s) => s.clone(),
            Value::Date(d) => format_timestamp(d),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cell_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Value::from_json(&raw).ok_or_else(|| D::Error::custom("cell values must be scalars"))
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One worksheet record: named scalar fields in column order plus backend metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub id: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_updated(mut self, updated: DateTime<Utc>) -> Self {
        self.updated = Some(updated);
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a data field, keeping its position if it already exists.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((name, value));
                None
            }
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(key, _)| key == name)?;
        Some(self.fields.remove(pos).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Looks up a data field or one of the metadata fields.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            ID_FIELD => self.id.clone().map(Value::Text),
            UPDATED_FIELD => self.updated.map(Value::Date),
            _ => self.field(name).cloned(),
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copies identity and last-modified metadata from `source`.
    pub fn copy_meta_from(&mut self, source: &Row) {
        self.id = source.id.clone();
        self.updated = source.updated;
    }

    /// Builds a row from a JSON object. `_id` and `_updated` fill the metadata;
    /// other reserved `_` keys are dropped.
    pub fn from_json(value: &serde_json::Value) -> Result<Row> {
        let object = value.as_object().ok_or_else(|| {
            SheetDbError::Precondition(format!("documents must be JSON objects, got {}", value))
        })?;

        let mut row = Row::new();
        for (key, raw) in object {
            match key.as_str() {
                ID_FIELD => {
                    row.id = match raw {
                        serde_json::Value::String(s) => Some(s.clone()),
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        serde_json::Value::Null => None,
                        other => {
                            return Err(SheetDbError::Precondition(format!(
                                "row identity must be a string, got {}",
                                other
                            )))
                        }
                    }
                }
                UPDATED_FIELD => {
                    row.updated = match raw {
                        serde_json::Value::String(s) => Some(
                            DateTime::parse_from_rfc3339(s)
                                .map_err(|e| {
                                    SheetDbError::Precondition(format!(
                                        "invalid {} timestamp {:?}: {}",
                                        UPDATED_FIELD, s, e
                                    ))
                                })?
                                .with_timezone(&Utc),
                        ),
                        _ => None,
                    }
                }
                _ if is_meta_field(key) => {}
                _ => {
                    let cell = Value::from_json(raw).ok_or_else(|| {
                        SheetDbError::Precondition(format!(
                            "field {:?} must hold a scalar value",
                            key
                        ))
                    })?;
                    row.set(key.clone(), cell);
                }
            }
        }
        Ok(row)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        if let Some(id) = &self.id {
            object.insert(ID_FIELD.to_string(), serde_json::Value::String(id.clone()));
        }
        if let Some(updated) = &self.updated {
            object.insert(
                UPDATED_FIELD.to_string(),
                serde_json::Value::String(format_timestamp(updated)),
            );
        }
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.to_json());
        }
        serde_json::Value::Object(object)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (key, value) in iter {
            row.set(key, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Row::from_json(&raw).map_err(D::Error::custom)
    }
}

/// Collects field names across rows, in first-seen order, without duplicates.
pub fn field_names_of(rows: &[Row]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for name in row.field_names() {
            if !names.iter().any(|known| known == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorksheetInfo {
    pub sheet_id: String,
    pub worksheet_id: String,
    pub title: String,
    pub updated: Option<DateTime<Utc>>,
    pub col_count: usize,
    pub row_count: usize,
}

impl WorksheetInfo {
    /// Short description used in logs and error contexts.
    pub fn describe(&self) -> String {
        format!("sheet={} worksheet={}", self.sheet_id, self.worksheet_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub title: String,
    pub updated: Option<DateTime<Utc>>,
    pub worksheets: Vec<WorksheetInfo>,
    pub authors: Vec<Author>,
}

/// A header cell naming one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCell {
    pub id: String,
    pub updated: Option<DateTime<Utc>>,
    pub cell: String,
    /// 1-based column position.
    pub col: usize,
}

const DEFAULT_ROW_COUNT: usize = 5000;
const DEFAULT_COL_COUNT: usize = 50;
const MIN_DIMENSION: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorksheetOptions {
    pub row_count: Option<usize>,
    pub col_count: Option<usize>,
}

impl WorksheetOptions {
    pub fn row_count(&self) -> usize {
        self.row_count.unwrap_or(DEFAULT_ROW_COUNT).max(MIN_DIMENSION)
    }

    pub fn col_count(&self) -> usize {
        self.col_count.unwrap_or(DEFAULT_COL_COUNT).max(MIN_DIMENSION)
    }
}
