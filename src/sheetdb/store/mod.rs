//! # Storage Layer
//!
//! [`SheetBackend`] is the transport boundary: one method per request the
//! spreadsheet service understands, speaking raw cell text. Everything above
//! it (typing of cells, batching, caching, concurrency limits) lives in
//! [`crate::client`].
//!
//! ## Implementations
//!
//! - [`memory::InMemorySheets`]: in-process spreadsheets, used by tests. Records
//!   every call and can be told to fail specific requests.
//! - [`fs::FileSheets`]: the same model persisted as a JSON file, used by the CLI.
//!
//! Both share [`workbook::Workbook`], which reproduces the service's row
//! semantics: identities are row positions, so deleting a row renumbers every
//! row below it, and rows may only use columns that exist in the header row.

use crate::error::Result;
use crate::model::{FieldCell, SheetInfo, WorksheetInfo, WorksheetOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod fs;
pub mod memory;
pub mod sq;
pub mod workbook;

/// Requests understood by the spreadsheet service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    SheetInfo,
    CreateWorksheet,
    DropWorksheet,
    QueryRows,
    InsertRow,
    UpdateRow,
    DeleteRow,
    QueryFields,
    CreateField,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::SheetInfo => "sheet_info",
            Operation::CreateWorksheet => "create_worksheet",
            Operation::DropWorksheet => "drop_worksheet",
            Operation::QueryRows => "query_worksheet",
            Operation::InsertRow => "create_entry",
            Operation::UpdateRow => "update_entry",
            Operation::DeleteRow => "delete_entry",
            Operation::QueryFields => "query_fields",
            Operation::CreateField => "create_field",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters of a row query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowQuery {
    /// Structured query; empty means every row.
    pub query: String,
    /// Column to order by.
    pub sort: Option<String>,
    pub descending: bool,
}

impl RowQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Query-string parameters as the service expects them.
    pub fn to_params(&self) -> String {
        let mut params = String::new();
        if !self.query.is_empty() {
            params.push_str("&sq=");
            params.push_str(&self.query);
        }
        if let Some(column) = &self.sort {
            params.push_str("&orderby=column:");
            params.push_str(column);
        }
        if self.descending {
            params.push_str("&reverse=true");
        }
        params
    }
}

/// A row as the service returns it: every value is cell text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub id: String,
    pub updated: String,
    pub cells: Vec<(String, String)>,
}

/// Cells sent when writing a row, keyed by column name.
pub type Cells = Vec<(String, String)>;

/// Transport-level access to a spreadsheet service.
#[async_trait]
pub trait SheetBackend: Send + Sync {
    async fn sheet_info(&self, sheet_id: &str) -> Result<SheetInfo>;

    async fn create_worksheet(
        &self,
        sheet_id: &str,
        title: &str,
        options: &WorksheetOptions,
    ) -> Result<WorksheetInfo>;

    async fn drop_worksheet(&self, sheet_id: &str, worksheet_id: &str) -> Result<()>;

    /// Rows in sheet order (or in `query.sort` order when given).
    async fn query_rows(&self, worksheet: &WorksheetInfo, query: &RowQuery) -> Result<Vec<RawRow>>;

    async fn insert_row(&self, worksheet: &WorksheetInfo, cells: &Cells) -> Result<RawRow>;

    async fn update_row(&self, worksheet: &WorksheetInfo, id: &str, cells: &Cells) -> Result<RawRow>;

    async fn delete_row(&self, worksheet: &WorksheetInfo, id: &str) -> Result<()>;

    /// The header row: one cell per named column.
    async fn header_cells(&self, worksheet: &WorksheetInfo) -> Result<Vec<FieldCell>>;

    /// Names the column at 1-based position `col`.
    async fn write_header_cell(&self, worksheet: &WorksheetInfo, name: &str, col: usize)
        -> Result<()>;
}
