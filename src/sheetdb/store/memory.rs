use super::workbook::Workbook;
use super::{Cells, Operation, RawRow, RowQuery, SheetBackend};
use crate::error::{ApiError, Result};
use crate::model::{FieldCell, SheetInfo, WorksheetInfo, WorksheetOptions};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};

/// A request received by [`InMemorySheets`], recorded in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SheetInfo { sheet: String },
    CreateWorksheet { sheet: String, title: String },
    DropWorksheet { sheet: String, worksheet: String },
    QueryRows { worksheet: String, query: RowQuery },
    InsertRow { worksheet: String, cells: Cells },
    UpdateRow { worksheet: String, id: String, cells: Cells },
    DeleteRow { worksheet: String, id: String },
    HeaderCells { worksheet: String },
    WriteHeaderCell { worksheet: String, name: String, col: usize },
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::SheetInfo { .. } => Operation::SheetInfo,
            Call::CreateWorksheet { .. } => Operation::CreateWorksheet,
            Call::DropWorksheet { .. } => Operation::DropWorksheet,
            Call::QueryRows { .. } => Operation::QueryRows,
            Call::InsertRow { .. } => Operation::InsertRow,
            Call::UpdateRow { .. } => Operation::UpdateRow,
            Call::DeleteRow { .. } => Operation::DeleteRow,
            Call::HeaderCells { .. } => Operation::QueryFields,
            Call::WriteHeaderCell { .. } => Operation::CreateField,
        }
    }
}

#[derive(Debug)]
struct Failure {
    operation: Operation,
    /// Matching calls to let through before failing.
    skip: usize,
    status: u16,
}

/// In-process spreadsheets.
///
/// Queries are evaluated by default. [`InMemorySheets::loose`] builds a
/// backend that ignores query text and returns every row, which is how the
/// client filter gets exercised on its own.
#[derive(Debug, Default)]
pub struct InMemorySheets {
    book: Mutex<Workbook>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<Vec<Failure>>,
    ignore_queries: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loose() -> Self {
        Self {
            ignore_queries: true,
            ..Self::default()
        }
    }

    pub fn with_sheet(self, sheet_id: &str, title: &str) -> Self {
        lock(&self.book).add_sheet(sheet_id, title, Utc::now());
        self
    }

    /// Makes the `nth` (1-based) upcoming call of `operation` fail with `status`.
    pub fn fail_nth(&self, operation: Operation, nth: usize, status: u16) {
        lock(&self.failures).push(Failure {
            operation,
            skip: nth.saturating_sub(1),
            status,
        });
    }

    /// Makes the next call of `operation` fail with `status`.
    pub fn fail_on(&self, operation: Operation, status: u16) {
        self.fail_nth(operation, 1, status);
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn calls_of(&self, operation: Operation) -> Vec<Call> {
        lock(&self.calls)
            .iter()
            .filter(|call| call.operation() == operation)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn snapshot(&self) -> Workbook {
        lock(&self.book).clone()
    }

    fn record(&self, call: Call, context: &str) -> Result<()> {
        let operation = call.operation();
        lock(&self.calls).push(call);
        let mut failures = lock(&self.failures);
        let position = failures
            .iter()
            .position(|failure| failure.operation == operation);
        if let Some(position) = position {
            if failures[position].skip == 0 {
                let failure = failures.remove(position);
                return Err(ApiError::new(failure.status, operation, context)
                    .with_detail("injected failure")
                    .into());
            }
            failures[position].skip -= 1;
        }
        Ok(())
    }
}

#[async_trait]
impl SheetBackend for InMemorySheets {
    async fn sheet_info(&self, sheet_id: &str) -> Result<SheetInfo> {
        self.record(
            Call::SheetInfo {
                sheet: sheet_id.to_string(),
            },
            &format!("sheet={}", sheet_id),
        )?;
        lock(&self.book).sheet_info(sheet_id)
    }

    async fn create_worksheet(
        &self,
        sheet_id: &str,
        title: &str,
        options: &WorksheetOptions,
    ) -> Result<WorksheetInfo> {
        self.record(
            Call::CreateWorksheet {
                sheet: sheet_id.to_string(),
                title: title.to_string(),
            },
            &format!("sheet={} title={}", sheet_id, title),
        )?;
        lock(&self.book).create_worksheet(sheet_id, title, options, Utc::now())
    }

    async fn drop_worksheet(&self, sheet_id: &str, worksheet_id: &str) -> Result<()> {
        self.record(
            Call::DropWorksheet {
                sheet: sheet_id.to_string(),
                worksheet: worksheet_id.to_string(),
            },
            &format!("sheet={} worksheet={}", sheet_id, worksheet_id),
        )?;
        lock(&self.book).drop_worksheet(sheet_id, worksheet_id)
    }

    async fn query_rows(&self, worksheet: &WorksheetInfo, query: &RowQuery) -> Result<Vec<RawRow>> {
        self.record(
            Call::QueryRows {
                worksheet: worksheet.worksheet_id.clone(),
                query: query.clone(),
            },
            &worksheet.describe(),
        )?;
        lock(&self.book).query_rows(worksheet, query, !self.ignore_queries)
    }

    async fn insert_row(&self, worksheet: &WorksheetInfo, cells: &Cells) -> Result<RawRow> {
        self.record(
            Call::InsertRow {
                worksheet: worksheet.worksheet_id.clone(),
                cells: cells.clone(),
            },
            &worksheet.describe(),
        )?;
        lock(&self.book).insert_row(worksheet, cells, Utc::now())
    }

    async fn update_row(&self, worksheet: &WorksheetInfo, id: &str, cells: &Cells) -> Result<RawRow> {
        self.record(
            Call::UpdateRow {
                worksheet: worksheet.worksheet_id.clone(),
                id: id.to_string(),
                cells: cells.clone(),
            },
            &format!("{} row={}", worksheet.describe(), id),
        )?;
        lock(&self.book).update_row(worksheet, id, cells, Utc::now())
    }

    async fn delete_row(&self, worksheet: &WorksheetInfo, id: &str) -> Result<()> {
        self.record(
            Call::DeleteRow {
                worksheet: worksheet.worksheet_id.clone(),
                id: id.to_string(),
            },
            &format!("{} row={}", worksheet.describe(), id),
        )?;
        lock(&self.book).delete_row(worksheet, id, Utc::now())
    }

    async fn header_cells(&self, worksheet: &WorksheetInfo) -> Result<Vec<FieldCell>> {
        self.record(
            Call::HeaderCells {
                worksheet: worksheet.worksheet_id.clone(),
            },
            &worksheet.describe(),
        )?;
        lock(&self.book).header_cells(worksheet)
    }

    async fn write_header_cell(
        &self,
        worksheet: &WorksheetInfo,
        name: &str,
        col: usize,
    ) -> Result<()> {
        self.record(
            Call::WriteHeaderCell {
                worksheet: worksheet.worksheet_id.clone(),
                name: name.to_string(),
                col,
            },
            &format!("{} cell=R1C{}", worksheet.describe(), col),
        )?;
        lock(&self.book).write_header_cell(worksheet, name, col, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SheetDbError;

    async fn worksheet(backend: &InMemorySheets) -> WorksheetInfo {
        backend
            .create_worksheet("sheet", "ws", &WorksheetOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn records_calls_in_order() {
        let backend = InMemorySheets::new();
        let info = worksheet(&backend).await;
        backend.write_header_cell(&info, "a", 1).await.unwrap();
        backend.header_cells(&info).await.unwrap();
        let operations: Vec<_> = backend.calls().iter().map(Call::operation).collect();
        assert_eq!(
            operations,
            vec![
                Operation::CreateWorksheet,
                Operation::CreateField,
                Operation::QueryFields
            ]
        );
        backend.clear_calls();
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn injected_failure_hits_the_nth_call_once() {
        let backend = InMemorySheets::new();
        let info = worksheet(&backend).await;
        backend.fail_nth(Operation::CreateField, 2, 500);
        backend.write_header_cell(&info, "a", 1).await.unwrap();
        match backend.write_header_cell(&info, "b", 2).await {
            Err(SheetDbError::Api(err)) => {
                assert_eq!(err.status, 500);
                assert_eq!(err.operation, Operation::CreateField);
            }
            other => panic!("expected injected failure, got {:?}", other),
        }
        backend.write_header_cell(&info, "b", 2).await.unwrap();
        assert_eq!(backend.calls_of(Operation::CreateField).len(), 3);
    }

    #[tokio::test]
    async fn loose_backend_ignores_query_text() {
        let backend = InMemorySheets::loose();
        let info = worksheet(&backend).await;
        backend.write_header_cell(&info, "a", 1).await.unwrap();
        for value in ["1", "2"] {
            backend
                .insert_row(&info, &vec![("a".to_string(), value.to_string())])
                .await
                .unwrap();
        }
        let rows = backend.query_rows(&info, &RowQuery::new("a = 1")).await.unwrap();
        assert_eq!(rows.len(), 2);
    }
}
