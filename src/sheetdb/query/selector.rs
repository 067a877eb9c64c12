use super::{CmpOp, Condition, Filter};
use crate::model::{is_meta_field, Value, ID_FIELD};

/// The identity named by a `{"_id": "<id>"}` selector, if that is all it says.
pub fn single_identity(filter: &Filter) -> Option<&str> {
    match filter {
        Filter::Field {
            name,
            condition: Condition::Cmp(CmpOp::Eq, Value::Text(id)),
        } if name == ID_FIELD => Some(id.as_str()),
        _ => None,
    }
}

/// True when the selector names exactly one row by identity and nothing else.
pub fn is_single_identity_selector(filter: &Filter) -> bool {
    single_identity(filter).is_some()
}

/// Plain `field = value` clauses at the top of a selector, used to seed upserted rows.
pub fn equality_fields(filter: &Filter) -> Vec<(&str, &Value)> {
    match filter {
        Filter::Field {
            name,
            condition: Condition::Cmp(CmpOp::Eq, value),
        } if !is_meta_field(name) && !value.is_null() => vec![(name.as_str(), value)],
        Filter::And(children) => children.iter().flat_map(equality_fields).collect(),
        _ => Vec::new(),
    }
}
