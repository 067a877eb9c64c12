//! Filter → structured query string.
//!
//! The backend accepts a small expression language: `column OP literal`
//! comparisons joined with `and`/`or` and grouped with parentheses. Whatever
//! cannot be expressed in it is left out, which only ever makes the backend
//! return more rows than needed. Inside an `or` that is not true: leaving out
//! one branch would hide rows that only match that branch, so the whole
//! disjunction is left out instead.
//!
//! Timestamps are never pushed down: the backend compares them as text, so
//! two spellings of one instant would not match there.

use super::matcher::parse_timestamp;
use super::{CmpOp, Condition, Filter};
use crate::model::{is_meta_field, Value};

impl CmpOp {
    /// Token used by the backend query language.
    pub fn token(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
        }
    }
}

/// Compiles a filter into a backend query. An empty string means "no filter".
pub fn compile(filter: &Filter) -> String {
    push_down(filter).unwrap_or_default()
}

// `None` marks an expression the backend cannot evaluate.
fn push_down(filter: &Filter) -> Option<String> {
    match filter {
        Filter::And(children) => group(children.iter().filter_map(push_down).collect(), " and "),
        Filter::Or(children) => {
            let parts = children.iter().map(push_down).collect::<Option<Vec<_>>>()?;
            group(parts, " or ")
        }
        Filter::Nor(_) => None,
        Filter::Field { name, condition } if is_column_word(name) => {
            push_down_condition(name, condition)
        }
        Filter::Field { .. } => None,
    }
}

fn push_down_condition(field: &str, condition: &Condition) -> Option<String> {
    match condition {
        Condition::Cmp(op, value) => {
            literal(value).map(|literal| format!("{} {} {}", field, op.token(), literal))
        }
        Condition::In(values) => push_down_condition(
            field,
            &Condition::Any(
                values
                    .iter()
                    .map(|value| Condition::Cmp(CmpOp::Eq, value.clone()))
                    .collect(),
            ),
        ),
        Condition::NotIn(values) => push_down_condition(
            field,
            &Condition::All(
                values
                    .iter()
                    .map(|value| Condition::Cmp(CmpOp::Ne, value.clone()))
                    .collect(),
            ),
        ),
        Condition::All(conditions) => group(
            conditions
                .iter()
                .filter_map(|c| push_down_condition(field, c))
                .collect(),
            " and ",
        ),
        Condition::Any(conditions) => {
            let parts = conditions
                .iter()
                .map(|c| push_down_condition(field, c))
                .collect::<Option<Vec<_>>>()?;
            group(parts, " or ")
        }
        Condition::Exists(_) | Condition::Regex(_) | Condition::Not(_) => None,
    }
}

/// Column names the backend can read as a single bare word.
fn is_column_word(name: &str) -> bool {
    !is_meta_field(name)
        && !name.is_empty()
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !name.eq_ignore_ascii_case("and")
        && !name.eq_ignore_ascii_case("or")
}

fn group(parts: Vec<String>, separator: &str) -> Option<String> {
    if parts.is_empty() {
        None
    } else {
        Some(format!("({})", parts.join(separator)))
    }
}

fn literal(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Text(s) if parse_timestamp(s).is_some() => None,
        Value::Text(s) => Some(quote(s)),
        Value::Date(_) => None,
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compiled(document: serde_json::Value) -> String {
        compile(&Filter::parse(&document).unwrap())
    }

    #[test]
    fn empty_filters_compile_to_nothing() {
        assert_eq!(compiled(json!({})), "");
        assert_eq!(compiled(json!(null)), "");
    }

    #[test]
    fn comparison_operators_map_to_tokens() {
        let cases = [
            ("$eq", "="),
            ("$ne", "<>"),
            ("$gt", ">"),
            ("$gte", ">="),
            ("$lt", "<"),
            ("$lte", "<="),
        ];
        for (op, token) in cases {
            assert_eq!(compiled(json!({"f": {op: 10}})), format!("f {} 10", token));
            assert_eq!(
                compiled(json!({"f": {op: "v"}})),
                format!("f {} \"v\"", token)
            );
        }
    }

    #[test]
    fn bare_value_is_equality() {
        assert_eq!(compiled(json!({"field1": 15})), "field1 = 15");
        assert_eq!(compiled(json!({"flag": true})), "flag = true");
    }

    #[test]
    fn logical_operators_group_children() {
        assert_eq!(
            compiled(json!({"$and": [{"a": 1}, {"b": 2}]})),
            "(a = 1 and b = 2)"
        );
        assert_eq!(
            compiled(json!({"$or": [{"field1": {"$lt": 13}}, {"field2": {"$gt": 15}}]})),
            "(field1 < 13 or field2 > 15)"
        );
        assert_eq!(
            compiled(json!({"$or": [{"field1": {"$eq": "test1"}}, {"field2": {"$eq": "test2"}}]})),
            "(field1 = \"test1\" or field2 = \"test2\")"
        );
    }

    #[test]
    fn field_context_carries_into_nested_logic() {
        assert_eq!(
            compiled(json!({"field": {"$and": [{"$gte": 5}, {"$lt": 10}]}})),
            "(field >= 5 and field < 10)"
        );
    }

    #[test]
    fn containment_desugars() {
        assert_eq!(compiled(json!({"f": {"$in": [1, 2]}})), "(f = 1 or f = 2)");
        assert_eq!(
            compiled(json!({"field1": {"$nin": [1, 2, 3]}})),
            "(field1 <> 1 and field1 <> 2 and field1 <> 3)"
        );
    }

    #[test]
    fn composite_expression() {
        let document = json!({
            "$and": [
                {"field1": 5},
                {"field2": {"$and": [{"$gte": 5}, {"$eq": 6}, {"$in": [4, 5, 6]}]}}
            ]
        });
        assert_eq!(
            compiled(document),
            "(field1 = 5 and (field2 >= 5 and field2 = 6 and (field2 = 4 or field2 = 5 or field2 = 6)))"
        );
    }

    #[test]
    fn implicit_conjunction_of_fields() {
        assert_eq!(compiled(json!({"a": 1, "b": "x"})), "(a = 1 and b = \"x\")");
    }

    #[test]
    fn metadata_fields_are_not_pushed_down() {
        assert_eq!(compiled(json!({"_id": "r1"})), "");
        assert_eq!(compiled(json!({"_id": "r1", "a": 2})), "(a = 2)");
    }

    #[test]
    fn unsupported_operators_are_dropped_from_conjunctions() {
        assert_eq!(
            compiled(json!({"a": {"$gt": 1, "$exists": true}, "b": {"$regex": "x"}})),
            "((a > 1))"
        );
    }

    #[test]
    fn unsupported_branch_drops_the_whole_disjunction() {
        assert_eq!(
            compiled(json!({"$or": [{"a": 1}, {"b": {"$exists": true}}]})),
            ""
        );
        assert_eq!(
            compiled(json!({"c": 3, "$or": [{"a": 1}, {"_id": "r2"}]})),
            "(c = 3)"
        );
    }

    #[test]
    fn null_comparisons_stay_local() {
        assert_eq!(compiled(json!({"a": null})), "");
        assert_eq!(compiled(json!({"a": {"$in": [1, null]}})), "");
    }

    #[test]
    fn quotes_inside_strings_are_escaped() {
        assert_eq!(
            compiled(json!({"name": "say \"hi\""})),
            "name = \"say \\\"hi\\\"\""
        );
    }

    #[test]
    fn timestamps_stay_local() {
        assert_eq!(compiled(json!({"when": "2024-03-01T10:30:00Z"})), "");
        assert_eq!(
            compiled(json!({"n": 1, "when": {"$gte": "2024-03-01 10:30:00"}})),
            "(n = 1)"
        );
        assert_eq!(
            compiled(json!({"$or": [{"n": 1}, {"when": "2024-03-01"}]})),
            ""
        );
    }

    #[test]
    fn columns_that_are_not_bare_words_stay_local() {
        assert_eq!(compiled(json!({"first name": "ada"})), "");
        assert_eq!(compiled(json!({"first name": "ada", "age": 3})), "(age = 3)");
        assert_eq!(compiled(json!({"a=b": 1})), "");
        assert_eq!(compiled(json!({"and": 1})), "");
        assert_eq!(compiled(json!({"snake_case2": 1})), "snake_case2 = 1");
    }
}
