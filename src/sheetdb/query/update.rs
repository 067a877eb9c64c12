//! Update descriptors.
//!
//! An update document is classified once, when it is parsed:
//!
//! - If at least one key is a recognized operator (`$set`, `$inc`, `$mul`,
//!   `$min`, `$max`, `$currentDate`) it is an operator descriptor. Other keys
//!   are ignored.
//! - Otherwise it is a replacement document: every matched row is replaced by
//!   it, keeping only the row's identity and last-modified metadata.
//!
//! Operators only touch fields a row already has. New columns are created by
//! inserts, never as a side effect of an update.

use super::json_truthy;
use super::selector::equality_fields;
use super::Filter;
use crate::error::{Result, SheetDbError};
use crate::model::{Row, Value};
use chrono::{DateTime, Utc};
use serde_json::Map;

/// Update operators, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Set,
    Inc,
    Mul,
    Min,
    Max,
    CurrentDate,
}

impl UpdateOp {
    pub const ALL: [UpdateOp; 6] = [
        UpdateOp::Set,
        UpdateOp::Inc,
        UpdateOp::Mul,
        UpdateOp::Min,
        UpdateOp::Max,
        UpdateOp::CurrentDate,
    ];

    pub fn from_key(key: &str) -> Option<UpdateOp> {
        UpdateOp::ALL.into_iter().find(|op| op.key() == key)
    }

    pub fn key(&self) -> &'static str {
        match self {
            UpdateOp::Set => "$set",
            UpdateOp::Inc => "$inc",
            UpdateOp::Mul => "$mul",
            UpdateOp::Min => "$min",
            UpdateOp::Max => "$max",
            UpdateOp::CurrentDate => "$currentDate",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOps {
    pub set: Vec<(String, Value)>,
    pub inc: Vec<(String, f64)>,
    pub mul: Vec<(String, f64)>,
    pub min: Vec<(String, f64)>,
    pub max: Vec<(String, f64)>,
    pub current_date: Vec<(String, bool)>,
}

impl UpdateOps {
    /// Applies every operator to one row, in the fixed operator order.
    fn apply_to(&self, row: &mut Row, now: DateTime<Utc>) {
        for (field, value) in &self.set {
            if let Some(slot) = row.field_mut(field) {
                *slot = value.clone();
            }
        }
        for (field, by) in &self.inc {
            numeric(row, field, |current| current + by);
        }
        for (field, by) in &self.mul {
            numeric(row, field, |current| current * by);
        }
        for (field, bound) in &self.min {
            numeric(row, field, |current| if current > *bound { *bound } else { current });
        }
        for (field, bound) in &self.max {
            numeric(row, field, |current| if current < *bound { *bound } else { current });
        }
        for (field, stamp) in &self.current_date {
            if *stamp {
                if let Some(slot) = row.field_mut(field) {
                    *slot = Value::Date(now);
                }
            }
        }
    }
}

fn numeric(row: &mut Row, field: &str, op: impl FnOnce(f64) -> f64) {
    if let Some(Value::Number(current)) = row.field_mut(field) {
        *current = op(*current);
    }
}

/// A classified update document.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Replacement(Row),
    Operators(UpdateOps),
}

impl Update {
    /// True when `document` has at least one recognized operator key.
    pub fn is_descriptor(document: &serde_json::Value) -> bool {
        document
            .as_object()
            .is_some_and(|map| map.keys().any(|key| UpdateOp::from_key(key).is_some()))
    }

    pub fn parse(document: &serde_json::Value) -> Result<Update> {
        let map = document.as_object().ok_or_else(|| {
            SheetDbError::InvalidUpdate(format!("an update must be an object, got {}", document))
        })?;

        if !Update::is_descriptor(document) {
            return Ok(Update::Replacement(Row::from_json(document)?));
        }

        let mut ops = UpdateOps::default();
        for (key, fields) in map {
            let Some(op) = UpdateOp::from_key(key) else {
                continue;
            };
            let fields = fields.as_object().ok_or_else(|| {
                SheetDbError::InvalidUpdate(format!("{} expects an object of fields", key))
            })?;
            match op {
                UpdateOp::Set => ops.set = scalar_fields(key, fields)?,
                UpdateOp::Inc => ops.inc = number_fields(key, fields)?,
                UpdateOp::Mul => ops.mul = number_fields(key, fields)?,
                UpdateOp::Min => ops.min = number_fields(key, fields)?,
                UpdateOp::Max => ops.max = number_fields(key, fields)?,
                UpdateOp::CurrentDate => {
                    ops.current_date = fields
                        .iter()
                        .map(|(field, flag)| (field.clone(), json_truthy(flag)))
                        .collect()
                }
            }
        }
        Ok(Update::Operators(ops))
    }

    /// Applies the update to copies of `rows`, stamping `$currentDate` with now.
    pub fn apply(&self, rows: &[Row]) -> Vec<Row> {
        self.apply_at(rows, Utc::now())
    }

    pub fn apply_at(&self, rows: &[Row], now: DateTime<Utc>) -> Vec<Row> {
        match self {
            Update::Replacement(document) => rows
                .iter()
                .map(|original| {
                    let mut replaced = document.clone();
                    replaced.copy_meta_from(original);
                    replaced
                })
                .collect(),
            Update::Operators(ops) => rows
                .iter()
                .map(|original| {
                    let mut updated = original.clone();
                    ops.apply_to(&mut updated, now);
                    updated
                })
                .collect(),
        }
    }

    /// The row to insert when an upsert matched nothing.
    ///
    /// A replacement is inserted as is. An operator descriptor starts from the
    /// selector's equality fields; `$set`, `$inc`, `$min` and `$max` write their
    /// values, `$mul` writes `0` and `$currentDate` stamps `now`.
    pub fn upsert_document(&self, selector: &Filter, now: DateTime<Utc>) -> Row {
        match self {
            Update::Replacement(document) => {
                let mut row = document.clone();
                row.id = None;
                row.updated = None;
                row
            }
            Update::Operators(ops) => {
                let mut row = Row::new();
                for (name, value) in equality_fields(selector) {
                    row.set(name, value.clone());
                }
                for (name, value) in &ops.set {
                    row.set(name.clone(), value.clone());
                }
                for (name, value) in ops.inc.iter().chain(&ops.min).chain(&ops.max) {
                    row.set(name.clone(), *value);
                }
                for (name, _) in &ops.mul {
                    row.set(name.clone(), 0.0);
                }
                for (name, stamp) in &ops.current_date {
                    if *stamp {
                        row.set(name.clone(), now);
                    }
                }
                row
            }
        }
    }
}

/// Applies an update to rows without modifying them.
pub fn apply_update(rows: &[Row], update: &Update) -> Vec<Row> {
    update.apply(rows)
}

fn scalar_fields(op: &str, fields: &Map<String, serde_json::Value>) -> Result<Vec<(String, Value)>> {
    fields
        .iter()
        .map(|(field, raw)| {
            Value::from_json(raw)
                .map(|value| (field.clone(), value))
                .ok_or_else(|| {
                    SheetDbError::InvalidUpdate(format!("{} {:?}: value must be a scalar", op, field))
                })
        })
        .collect()
}

fn number_fields(op: &str, fields: &Map<String, serde_json::Value>) -> Result<Vec<(String, f64)>> {
    fields
        .iter()
        .map(|(field, raw)| {
            raw.as_f64().map(|n| (field.clone(), n)).ok_or_else(|| {
                SheetDbError::InvalidUpdate(format!("{} {:?}: value must be a number", op, field))
            })
        })
        .collect()
}
