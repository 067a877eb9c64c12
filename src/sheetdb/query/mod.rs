//! # Query Layer
//!
//! Filter expressions use MongoDB's query document syntax:
//!
//! ```text
//! {"age": {"$gte": 18}, "$or": [{"team": "red"}, {"team": {"$in": ["blue", "green"]}}]}
//! ```
//!
//! A document is parsed once into a [`Filter`] tree. Everything downstream works
//! on that tree:
//!
//! - [`compile`]: renders the part of the tree the backend understands as a
//!   structured query string (`age >= 18 and ...`).
//! - [`matcher`]: evaluates the whole tree against rows in memory. This is the
//!   authoritative match; the backend query only narrows what gets fetched.
//! - [`selector`]: recognizes selectors that name a single row by identity.
//! - [`update`]: parses and applies update descriptors (`$set`, `$inc`, ...).
//!
//! Operators the backend cannot evaluate (`$exists`, `$regex`, `$not`, `$nor`,
//! comparisons on metadata fields) are still part of the tree; the compiler
//! leaves them out and the matcher enforces them.

use crate::error::{Result, SheetDbError};
use crate::model::Value;
use regex_lite::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Map;

pub mod compile;
pub mod matcher;
pub mod selector;
pub mod update;

pub use compile::compile;
pub use matcher::apply;
pub use selector::{is_single_identity_selector, single_identity};
pub use update::{apply_update, Update, UpdateOps};

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    pub fn from_key(key: &str) -> Option<CmpOp> {
        match key {
            "$eq" => Some(CmpOp::Eq),
            "$ne" => Some(CmpOp::Ne),
            "$gt" => Some(CmpOp::Gt),
            "$gte" => Some(CmpOp::Gte),
            "$lt" => Some(CmpOp::Lt),
            "$lte" => Some(CmpOp::Lte),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            CmpOp::Eq => "$eq",
            CmpOp::Ne => "$ne",
            CmpOp::Gt => "$gt",
            CmpOp::Gte => "$gte",
            CmpOp::Lt => "$lt",
            CmpOp::Lte => "$lte",
        }
    }
}

/// A compiled `$regex` together with the source it was built from.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub source: String,
    pub options: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str, options: &str) -> Result<Pattern> {
        if let Some(flag) = options.chars().find(|c| !matches!(c, 'i' | 'm' | 's')) {
            return Err(SheetDbError::InvalidFilter(format!(
                "unsupported $options flag {:?}",
                flag
            )));
        }
        let expression = if options.is_empty() {
            source.to_string()
        } else {
            format!("(?{}){}", options, source)
        };
        let regex = Regex::new(&expression)
            .map_err(|e| SheetDbError::InvalidFilter(format!("invalid $regex: {}", e)))?;
        Ok(Pattern {
            source: source.to_string(),
            options: options.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.options == other.options
    }
}

/// What a single field must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Cmp(CmpOp, Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// Field-level `$and`: every condition holds for the same field.
    All(Vec<Condition>),
    /// Field-level `$or`.
    Any(Vec<Condition>),
    Exists(bool),
    Regex(Pattern),
    Not(Box<Condition>),
}

impl Condition {
    pub fn cmp(op: CmpOp, value: impl Into<Value>) -> Self {
        Condition::Cmp(op, value.into())
    }
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Field { name: String, condition: Condition },
}

impl Default for Filter {
    fn default() -> Self {
        Filter::all()
    }
}

impl Filter {
    /// The empty filter; matches every row.
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn field(name: impl Into<String>, condition: Condition) -> Self {
        Filter::Field {
            name: name.into(),
            condition,
        }
    }

    pub fn eq(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::field(name, Condition::Cmp(CmpOp::Eq, value.into()))
    }

    pub fn and(children: Vec<Filter>) -> Self {
        Filter::And(children)
    }

    pub fn or(children: Vec<Filter>) -> Self {
        Filter::Or(children)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Filter::And(children) if children.is_empty())
    }

    /// Parses a query document. `null` and `{}` both mean "no filter".
    pub fn parse(document: &serde_json::Value) -> Result<Filter> {
        match document {
            serde_json::Value::Null => Ok(Filter::all()),
            serde_json::Value::Object(map) => parse_document(map),
            other => Err(SheetDbError::InvalidFilter(format!(
                "a filter must be an object, got {}",
                other
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Filter::parse(&raw).map_err(D::Error::custom)
    }
}

fn parse_document(map: &Map<String, serde_json::Value>) -> Result<Filter> {
    let mut clauses = Vec::with_capacity(map.len());

    for (key, value) in map {
        let clause = match key.as_str() {
            "$and" => Filter::And(parse_branches(key, value)?),
            "$or" => Filter::Or(parse_branches(key, value)?),
            "$nor" => Filter::Nor(parse_branches(key, value)?),
            op if op.starts_with('$') => {
                return Err(SheetDbError::InvalidFilter(format!(
                    "unknown top-level operator {}",
                    op
                )))
            }
            field => Filter::field(field, parse_condition(field, value)?),
        };
        clauses.push(clause);
    }

    if clauses.len() == 1 {
        Ok(clauses.remove(0))
    } else {
        Ok(Filter::And(clauses))
    }
}

fn parse_branches(op: &str, value: &serde_json::Value) -> Result<Vec<Filter>> {
    let branches = value.as_array().ok_or_else(|| {
        SheetDbError::InvalidFilter(format!("{} expects an array of filters", op))
    })?;
    branches
        .iter()
        .map(|branch| match branch {
            serde_json::Value::Object(map) => parse_document(map),
            other => Err(SheetDbError::InvalidFilter(format!(
                "{} branches must be objects, got {}",
                op, other
            ))),
        })
        .collect()
}

fn scalar(field: &str, value: &serde_json::Value) -> Result<Value> {
    Value::from_json(value).ok_or_else(|| {
        SheetDbError::InvalidFilter(format!(
            "field {:?}: nested documents and arrays cannot be compared",
            field
        ))
    })
}

fn parse_condition(field: &str, value: &serde_json::Value) -> Result<Condition> {
    let map = match value {
        serde_json::Value::Object(map) => map,
        other => return Ok(Condition::Cmp(CmpOp::Eq, scalar(field, other)?)),
    };

    if map.is_empty() || !map.keys().all(|key| key.starts_with('$')) {
        return Err(SheetDbError::InvalidFilter(format!(
            "field {:?}: expected an operator document like {{\"$gt\": 1}}",
            field
        )));
    }

    let mut conditions = Vec::with_capacity(map.len());
    for (key, arg) in map {
        if let Some(op) = CmpOp::from_key(key) {
            conditions.push(Condition::Cmp(op, scalar(field, arg)?));
            continue;
        }

        let condition = match key.as_str() {
            "$in" => Condition::In(scalar_list(field, key, arg)?),
            "$nin" => Condition::NotIn(scalar_list(field, key, arg)?),
            "$and" => Condition::All(nested_conditions(field, key, arg)?),
            "$or" => Condition::Any(nested_conditions(field, key, arg)?),
            "$exists" => Condition::Exists(json_truthy(arg)),
            "$regex" => {
                let source = arg.as_str().ok_or_else(|| {
                    SheetDbError::InvalidFilter(format!("field {:?}: $regex expects a string", field))
                })?;
                let options = match map.get("$options") {
                    Some(serde_json::Value::String(options)) => options.as_str(),
                    Some(_) => {
                        return Err(SheetDbError::InvalidFilter(format!(
                            "field {:?}: $options expects a string",
                            field
                        )))
                    }
                    None => "",
                };
                Condition::Regex(Pattern::new(source, options)?)
            }
            "$options" if map.contains_key("$regex") => continue,
            "$not" => Condition::Not(Box::new(parse_condition(field, arg)?)),
            other => {
                return Err(SheetDbError::InvalidFilter(format!(
                    "field {:?}: unknown operator {}",
                    field, other
                )))
            }
        };
        conditions.push(condition);
    }

    if conditions.len() == 1 {
        Ok(conditions.remove(0))
    } else {
        Ok(Condition::All(conditions))
    }
}

fn scalar_list(field: &str, op: &str, value: &serde_json::Value) -> Result<Vec<Value>> {
    let items = value.as_array().ok_or_else(|| {
        SheetDbError::InvalidFilter(format!("field {:?}: {} expects an array", field, op))
    })?;
    items.iter().map(|item| scalar(field, item)).collect()
}

fn nested_conditions(field: &str, op: &str, value: &serde_json::Value) -> Result<Vec<Condition>> {
    let items = value.as_array().ok_or_else(|| {
        SheetDbError::InvalidFilter(format!("field {:?}: {} expects an array", field, op))
    })?;
    items.iter().map(|item| parse_condition(field, item)).collect()
}

/// JavaScript truthiness of a raw JSON value.
pub(crate) fn json_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
        other => Value::from_json(other).is_some_and(|v| v.is_truthy()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_and_empty_mean_no_filter() {
        assert!(Filter::parse(&json!(null)).unwrap().is_all());
        assert!(Filter::parse(&json!({})).unwrap().is_all());
    }

    #[test]
    fn bare_values_are_equality() {
        let filter = Filter::parse(&json!({"a": 15})).unwrap();
        assert_eq!(filter, Filter::eq("a", 15));
    }

    #[test]
    fn several_keys_form_a_conjunction() {
        let filter = Filter::parse(&json!({"a": 1, "b": {"$gt": 2}})).unwrap();
        assert_eq!(
            filter,
            Filter::and(vec![
                Filter::eq("a", 1),
                Filter::field("b", Condition::cmp(CmpOp::Gt, 2)),
            ])
        );
    }

    #[test]
    fn several_operators_on_one_field_form_a_conjunction() {
        let filter = Filter::parse(&json!({"a": {"$gte": 5, "$lt": 10}})).unwrap();
        assert_eq!(
            filter,
            Filter::field(
                "a",
                Condition::All(vec![
                    Condition::cmp(CmpOp::Gte, 5),
                    Condition::cmp(CmpOp::Lt, 10),
                ])
            )
        );
    }

    #[test]
    fn field_level_logical_operators_nest() {
        let filter =
            Filter::parse(&json!({"f": {"$and": [{"$gte": 5}, {"$in": [4, 5]}]}})).unwrap();
        assert_eq!(
            filter,
            Filter::field(
                "f",
                Condition::All(vec![
                    Condition::cmp(CmpOp::Gte, 5),
                    Condition::In(vec![Value::from(4), Value::from(5)]),
                ])
            )
        );
    }

    #[test]
    fn regex_picks_up_sibling_options() {
        let filter = Filter::parse(&json!({"name": {"$regex": "^ab", "$options": "i"}})).unwrap();
        match filter {
            Filter::Field {
                condition: Condition::Regex(pattern),
                ..
            } => {
                assert!(pattern.is_match("ABC"));
                assert_eq!(pattern.options, "i");
            }
            other => panic!("expected regex, got {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_operators() {
        assert!(matches!(
            Filter::parse(&json!({"a": {"$near": 1}})),
            Err(SheetDbError::InvalidFilter(_))
        ));
        assert!(matches!(
            Filter::parse(&json!({"$where": "x"})),
            Err(SheetDbError::InvalidFilter(_))
        ));
    }

    #[test]
    fn rejects_nested_documents_and_non_objects() {
        assert!(Filter::parse(&json!({"a": {"b": 1}})).is_err());
        assert!(Filter::parse(&json!({"a": [1]})).is_err());
        assert!(Filter::parse(&json!([1, 2])).is_err());
        assert!(Filter::parse(&json!({"$or": {"a": 1}})).is_err());
    }

    #[test]
    fn deserializes_from_json_text() {
        let filter: Filter = serde_json::from_str(r#"{"_id": "r1"}"#).unwrap();
        assert_eq!(filter, Filter::eq("_id", "r1"));
    }
}
