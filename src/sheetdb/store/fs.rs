use super::workbook::Workbook;
use super::{Cells, RawRow, RowQuery, SheetBackend};
use crate::error::{Result, SheetDbError};
use crate::model::{FieldCell, SheetInfo, WorksheetInfo, WorksheetOptions};
use async_trait::async_trait;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Spreadsheets persisted as a single JSON document.
///
/// Every request loads the file, applies itself and (for writes) saves it
/// back, holding a lock so concurrent requests from one process serialize.
pub struct FileSheets {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSheets {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Workbook> {
        if !self.path.exists() {
            return Ok(Workbook::default());
        }
        let content = fs::read_to_string(&self.path).map_err(SheetDbError::Io)?;
        let book: Workbook = serde_json::from_str(&content).map_err(SheetDbError::Serialization)?;
        Ok(book)
    }

    fn save(&self, book: &Workbook) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(SheetDbError::Io)?;
            }
        }
        let content = serde_json::to_string_pretty(book).map_err(SheetDbError::Serialization)?;
        fs::write(&self.path, content).map_err(SheetDbError::Io)?;
        Ok(())
    }

    fn read<T>(&self, apply: impl FnOnce(&Workbook) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let book = self.load()?;
        apply(&book)
    }

    fn write<T>(&self, apply: impl FnOnce(&mut Workbook) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut book = self.load()?;
        let result = apply(&mut book)?;
        self.save(&book)?;
        Ok(result)
    }
}

#[async_trait]
impl SheetBackend for FileSheets {
    async fn sheet_info(&self, sheet_id: &str) -> Result<SheetInfo> {
        self.read(|book| book.sheet_info(sheet_id))
    }

    async fn create_worksheet(
        &self,
        sheet_id: &str,
        title: &str,
        options: &WorksheetOptions,
    ) -> Result<WorksheetInfo> {
        self.write(|book| book.create_worksheet(sheet_id, title, options, Utc::now()))
    }

    async fn drop_worksheet(&self, sheet_id: &str, worksheet_id: &str) -> Result<()> {
        self.write(|book| book.drop_worksheet(sheet_id, worksheet_id))
    }

    async fn query_rows(&self, worksheet: &WorksheetInfo, query: &RowQuery) -> Result<Vec<RawRow>> {
        self.read(|book| book.query_rows(worksheet, query, true))
    }

    async fn insert_row(&self, worksheet: &WorksheetInfo, cells: &Cells) -> Result<RawRow> {
        self.write(|book| book.insert_row(worksheet, cells, Utc::now()))
    }

    async fn update_row(&self, worksheet: &WorksheetInfo, id: &str, cells: &Cells) -> Result<RawRow> {
        self.write(|book| book.update_row(worksheet, id, cells, Utc::now()))
    }

    async fn delete_row(&self, worksheet: &WorksheetInfo, id: &str) -> Result<()> {
        self.write(|book| book.delete_row(worksheet, id, Utc::now()))
    }

    async fn header_cells(&self, worksheet: &WorksheetInfo) -> Result<Vec<FieldCell>> {
        self.read(|book| book.header_cells(worksheet))
    }

    async fn write_header_cell(
        &self,
        worksheet: &WorksheetInfo,
        name: &str,
        col: usize,
    ) -> Result<()> {
        self.write(|book| book.write_header_cell(worksheet, name, col, Utc::now()))
    }
}
