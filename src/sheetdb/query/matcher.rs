//! In-memory evaluation of filters against rows.

use super::{CmpOp, Condition, Filter};
use crate::coerce::coerce_date;
use crate::model::{Row, Value};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

impl Filter {
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::And(children) => children.iter().all(|child| child.matches(row)),
            Filter::Or(children) => children.iter().any(|child| child.matches(row)),
            Filter::Nor(children) => !children.iter().any(|child| child.matches(row)),
            Filter::Field { name, condition } => condition.matches(row.lookup(name).as_ref()),
        }
    }
}

impl Condition {
    /// Evaluates against a field value; `None` means the field is absent.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Condition::Cmp(op, expected) => match op {
                CmpOp::Eq => equals(value, expected),
                CmpOp::Ne => !equals(value, expected),
                CmpOp::Gt => ordered(value, expected, |o| o == Ordering::Greater),
                CmpOp::Gte => ordered(value, expected, |o| o != Ordering::Less),
                CmpOp::Lt => ordered(value, expected, |o| o == Ordering::Less),
                CmpOp::Lte => ordered(value, expected, |o| o != Ordering::Greater),
            },
            Condition::In(candidates) => candidates.iter().any(|c| equals(value, c)),
            Condition::NotIn(candidates) => !candidates.iter().any(|c| equals(value, c)),
            Condition::All(conditions) => conditions.iter().all(|c| c.matches(value)),
            Condition::Any(conditions) => conditions.iter().any(|c| c.matches(value)),
            Condition::Exists(expected) => value.is_some() == *expected,
            Condition::Regex(pattern) => match value {
                Some(Value::Text(text)) => pattern.is_match(text),
                _ => false,
            },
            Condition::Not(inner) => !inner.matches(value),
        }
    }
}

/// Returns the rows matching `filter`, in their original order.
pub fn apply(filter: &Filter, rows: &[Row]) -> Vec<Row> {
    rows.iter().filter(|row| filter.matches(row)).cloned().collect()
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None, Value::Null) | (Some(Value::Null), Value::Null) => true,
        (None, _) | (Some(_), Value::Null) => false,
        (Some(actual), expected) => compare(actual, expected) == Some(Ordering::Equal),
    }
}

fn ordered(actual: Option<&Value>, expected: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    actual
        .and_then(|actual| compare(actual, expected))
        .is_some_and(accept)
}

/// Orders two values of compatible types. Dates compare with timestamp text.
fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Text(b)) => parse_timestamp(b).map(|b| a.cmp(&b)),
        (Value::Text(a), Value::Date(b)) => parse_timestamp(a).map(|a| a.cmp(b)),
        // cells hold booleans as text
        (Value::Text(a), Value::Bool(b)) => parse_bool(a).map(|a| a.cmp(b)),
        (Value::Bool(a), Value::Text(b)) => parse_bool(b).map(|b| a.cmp(&b)),
        _ => None,
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "true" | "TRUE" => Some(true),
        "false" | "FALSE" => Some(false),
        _ => None,
    }
}

pub(super) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    coerce_date(text).or_else(|| {
        DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|at| at.with_timezone(&Utc))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    fn rows() -> Vec<Row> {
        vec![
            Row::from_json(&json!({"_id": "1", "a": 1, "b": "t"})).unwrap(),
            Row::from_json(&json!({"_id": "2", "a": 10, "c": 4})).unwrap(),
            Row::from_json(&json!({"_id": "3", "c": "t2", "d": 5.6})).unwrap(),
        ]
    }

    fn matching_ids(document: serde_json::Value) -> Vec<String> {
        let filter = Filter::parse(&document).unwrap();
        apply(&filter, &rows())
            .into_iter()
            .filter_map(|row| row.id)
            .collect()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(matching_ids(json!({})), vec!["1", "2", "3"]);
    }

    #[test]
    fn disjunction_across_columns() {
        assert_eq!(
            matching_ids(json!({"$or": [{"b": "t"}, {"a": {"$lt": 5}}]})),
            vec!["1"]
        );
    }

    #[test]
    fn comparisons_skip_missing_and_mismatched_types() {
        assert_eq!(matching_ids(json!({"a": {"$gte": 1}})), vec!["1", "2"]);
        assert_eq!(matching_ids(json!({"c": {"$gt": 0}})), vec!["2"]);
        assert_eq!(matching_ids(json!({"c": {"$gt": "a"}})), vec!["3"]);
    }

    #[test]
    fn not_equal_includes_missing_fields() {
        assert_eq!(matching_ids(json!({"a": {"$ne": 1}})), vec!["2", "3"]);
    }

    #[test]
    fn null_equality_matches_missing_fields() {
        assert_eq!(matching_ids(json!({"b": null})), vec!["2", "3"]);
    }

    #[test]
    fn containment() {
        assert_eq!(matching_ids(json!({"a": {"$in": [10, 11]}})), vec!["2"]);
        assert_eq!(matching_ids(json!({"a": {"$nin": [10]}})), vec!["1", "3"]);
    }

    #[test]
    fn metadata_fields_filter_locally() {
        assert_eq!(matching_ids(json!({"_id": "2"})), vec!["2"]);
    }

    #[test]
    fn client_only_operators() {
        assert_eq!(matching_ids(json!({"d": {"$exists": true}})), vec!["3"]);
        assert_eq!(matching_ids(json!({"d": {"$exists": false}})), vec!["1", "2"]);
        assert_eq!(matching_ids(json!({"c": {"$regex": "^T", "$options": "i"}})), vec!["3"]);
        assert_eq!(matching_ids(json!({"a": {"$not": {"$gt": 5}}})), vec!["1", "3"]);
        assert_eq!(matching_ids(json!({"$nor": [{"a": 1}, {"d": 5.6}]})), vec!["2"]);
    }

    #[test]
    fn field_level_disjunction() {
        assert_eq!(
            matching_ids(json!({"a": {"$or": [{"$lt": 2}, {"$gt": 9}]}})),
            vec!["1", "2"]
        );
    }

    #[test]
    fn dates_compare_with_timestamp_text() {
        let row = Row::new().with(
            "when",
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        );
        let later = Filter::parse(&json!({"when": {"$gt": "2024-02-01"}})).unwrap();
        let earlier = Filter::parse(&json!({"when": {"$lt": "2024-02-01T00:00:00Z"}})).unwrap();
        assert!(later.matches(&row));
        assert!(!earlier.matches(&row));
    }

    #[test]
    fn booleans_match_their_cell_text() {
        let row = Row::new().with("flag", "TRUE");
        assert!(Filter::eq("flag", true).matches(&row));
        assert!(!Filter::eq("flag", false).matches(&row));
    }

    #[test]
    fn apply_does_not_touch_input() {
        let input = rows();
        let before = input.clone();
        let _ = apply(&Filter::eq("a", 1), &input);
        assert_eq!(input, before);
    }

    fn arb_row() -> impl Strategy<Value = Row> {
        (
            proptest::option::of(-20i32..20),
            proptest::option::of(prop_oneof![Just("x"), Just("y"), Just("z")]),
        )
            .prop_map(|(a, b)| {
                let mut row = Row::new();
                if let Some(a) = a {
                    row.set("a", a);
                }
                if let Some(b) = b {
                    row.set("b", b);
                }
                row
            })
    }

    fn arb_filter() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            (-20i32..20).prop_map(|n| json!({"a": {"$gt": n}})),
            (-20i32..20).prop_map(|n| json!({"a": {"$lte": n}})),
            prop_oneof![Just("x"), Just("y")].prop_map(|s| json!({"b": s})),
            Just(json!({"b": {"$exists": false}})),
            (-20i32..20).prop_map(|n| json!({"a": {"$nin": [n, n + 1]}})),
        ];
        leaf.prop_recursive(3, 12, 3, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 1..3).prop_map(|v| json!({"$and": v})),
                proptest::collection::vec(inner.clone(), 1..3).prop_map(|v| json!({"$or": v})),
                proptest::collection::vec(inner, 1..3).prop_map(|v| json!({"$nor": v})),
            ]
        })
    }

    proptest! {
        #[test]
        fn filtering_is_idempotent(
            document in arb_filter(),
            rows in proptest::collection::vec(arb_row(), 0..12),
        ) {
            let filter = Filter::parse(&document).unwrap();
            let once = apply(&filter, &rows);
            let twice = apply(&filter, &once);
            prop_assert_eq!(once, twice);
        }
    }
}
