use super::{sq, Cells, Operation, RawRow, RowQuery};
use crate::error::{ApiError, Result};
use crate::model::{
    format_timestamp, Author, FieldCell, SheetInfo, WorksheetInfo, WorksheetOptions,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Every spreadsheet known to a local backend, keyed by sheet id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: BTreeMap<String, SheetData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetData {
    pub title: String,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub worksheets: Vec<WorksheetData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorksheetData {
    pub id: String,
    pub title: String,
    pub updated: DateTime<Utc>,
    pub row_count: usize,
    pub col_count: usize,
    /// Header row: column position → column name.
    #[serde(default)]
    pub header: BTreeMap<usize, HeaderCell>,
    /// Data rows in sheet order. A row's identity is its 1-based position.
    #[serde(default)]
    pub rows: Vec<StoredRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderCell {
    pub name: String,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRow {
    pub updated: DateTime<Utc>,
    pub cells: BTreeMap<String, String>,
}

fn not_found(operation: Operation, context: &str, what: &str) -> ApiError {
    ApiError::new(404, operation, context).with_detail(format!("{} not found", what))
}

impl WorksheetData {
    fn info(&self, sheet_id: &str) -> WorksheetInfo {
        WorksheetInfo {
            sheet_id: sheet_id.to_string(),
            worksheet_id: self.id.clone(),
            title: self.title.clone(),
            updated: Some(self.updated),
            col_count: self.col_count,
            row_count: self.row_count,
        }
    }

    fn column_names(&self) -> impl Iterator<Item = &str> {
        self.header.values().map(|cell| cell.name.as_str())
    }

    fn raw_row(&self, index: usize) -> Option<RawRow> {
        let stored = self.rows.get(index)?;
        let cells = self
            .header
            .values()
            .filter_map(|header| {
                stored
                    .cells
                    .get(&header.name)
                    .map(|text| (header.name.clone(), text.clone()))
            })
            .collect();
        Some(RawRow {
            id: (index + 1).to_string(),
            updated: format_timestamp(&stored.updated),
            cells,
        })
    }

    fn row_index(&self, id: &str) -> Option<usize> {
        id.parse::<usize>()
            .ok()
            .filter(|position| *position >= 1 && *position <= self.rows.len())
            .map(|position| position - 1)
    }

    fn check_columns(&self, operation: Operation, context: &str, cells: &Cells) -> Result<()> {
        for (name, _) in cells {
            if !self.column_names().any(|known| known == name) {
                return Err(ApiError::new(400, operation, context)
                    .with_detail(format!("unknown column {}", name))
                    .into());
            }
        }
        Ok(())
    }
}

impl Workbook {
    pub fn sheet_info(&self, sheet_id: &str) -> Result<SheetInfo> {
        let context = format!("sheet={}", sheet_id);
        let sheet = self
            .sheets
            .get(sheet_id)
            .ok_or_else(|| not_found(Operation::SheetInfo, &context, "spreadsheet"))?;
        Ok(SheetInfo {
            title: sheet.title.clone(),
            updated: Some(sheet.updated),
            worksheets: sheet.worksheets.iter().map(|ws| ws.info(sheet_id)).collect(),
            authors: sheet.authors.clone(),
        })
    }

    /// Registers a spreadsheet. Existing ones are left as they are.
    pub fn add_sheet(&mut self, sheet_id: &str, title: &str, now: DateTime<Utc>) {
        self.sheets
            .entry(sheet_id.to_string())
            .or_insert_with(|| SheetData {
                title: title.to_string(),
                updated: now,
                authors: Vec::new(),
                worksheets: Vec::new(),
            });
    }

    pub fn create_worksheet(
        &mut self,
        sheet_id: &str,
        title: &str,
        options: &WorksheetOptions,
        now: DateTime<Utc>,
    ) -> Result<WorksheetInfo> {
        let context = format!("sheet={} title={}", sheet_id, title);
        self.add_sheet(sheet_id, sheet_id, now);
        let sheet = self
            .sheets
            .get_mut(sheet_id)
            .ok_or_else(|| not_found(Operation::CreateWorksheet, &context, "spreadsheet"))?;
        if sheet.worksheets.iter().any(|ws| ws.title == title) {
            return Err(ApiError::new(400, Operation::CreateWorksheet, context)
                .with_detail("a worksheet with that title already exists")
                .into());
        }
        let id = Uuid::new_v4().simple().to_string()[..7].to_string();
        let worksheet = WorksheetData {
            id,
            title: title.to_string(),
            updated: now,
            row_count: options.row_count(),
            col_count: options.col_count(),
            header: BTreeMap::new(),
            rows: Vec::new(),
        };
        let info = worksheet.info(sheet_id);
        sheet.worksheets.push(worksheet);
        sheet.updated = now;
        Ok(info)
    }

    pub fn drop_worksheet(&mut self, sheet_id: &str, worksheet_id: &str) -> Result<()> {
        let context = format!("sheet={} worksheet={}", sheet_id, worksheet_id);
        let sheet = self
            .sheets
            .get_mut(sheet_id)
            .ok_or_else(|| not_found(Operation::DropWorksheet, &context, "spreadsheet"))?;
        let before = sheet.worksheets.len();
        sheet.worksheets.retain(|ws| ws.id != worksheet_id);
        if sheet.worksheets.len() == before {
            return Err(not_found(Operation::DropWorksheet, &context, "worksheet").into());
        }
        Ok(())
    }

    fn worksheet(&self, operation: Operation, info: &WorksheetInfo) -> Result<&WorksheetData> {
        self.sheets
            .get(&info.sheet_id)
            .and_then(|sheet| sheet.worksheets.iter().find(|ws| ws.id == info.worksheet_id))
            .ok_or_else(|| not_found(operation, &info.describe(), "worksheet").into())
    }

    fn worksheet_mut(
        &mut self,
        operation: Operation,
        info: &WorksheetInfo,
    ) -> Result<&mut WorksheetData> {
        self.sheets
            .get_mut(&info.sheet_id)
            .and_then(|sheet| {
                sheet
                    .worksheets
                    .iter_mut()
                    .find(|ws| ws.id == info.worksheet_id)
            })
            .ok_or_else(|| not_found(operation, &info.describe(), "worksheet").into())
    }

    /// Rows accepted by `query`. With `evaluate` off the query text is ignored
    /// and every row comes back, as a backend that filters loosely would.
    pub fn query_rows(
        &self,
        info: &WorksheetInfo,
        query: &RowQuery,
        evaluate: bool,
    ) -> Result<Vec<RawRow>> {
        let worksheet = self.worksheet(Operation::QueryRows, info)?;
        let expr = if evaluate {
            sq::parse(&query.query).map_err(|reason| {
                ApiError::new(400, Operation::QueryRows, info.describe())
                    .with_detail(format!("invalid query: {}", reason))
            })?
        } else {
            None
        };
        let mut indices: Vec<usize> = (0..worksheet.rows.len())
            .filter(|index| match &expr {
                Some(expr) => expr.eval(&worksheet.rows[*index].cells),
                None => true,
            })
            .collect();
        if let Some(column) = &query.sort {
            indices.sort_by(|a, b| {
                sq::compare_cells(
                    worksheet.rows[*a].cells.get(column),
                    worksheet.rows[*b].cells.get(column),
                )
            });
        }
        if query.descending {
            indices.reverse();
        }
        Ok(indices
            .into_iter()
            .filter_map(|index| worksheet.raw_row(index))
            .collect())
    }

    pub fn insert_row(
        &mut self,
        info: &WorksheetInfo,
        cells: &Cells,
        now: DateTime<Utc>,
    ) -> Result<RawRow> {
        let context = info.describe();
        let worksheet = self.worksheet_mut(Operation::InsertRow, info)?;
        worksheet.check_columns(Operation::InsertRow, &context, cells)?;
        worksheet.rows.push(StoredRow {
            updated: now,
            cells: cells.iter().cloned().collect(),
        });
        worksheet.updated = now;
        let index = worksheet.rows.len() - 1;
        worksheet
            .raw_row(index)
            .ok_or_else(|| not_found(Operation::InsertRow, &context, "row").into())
    }

    pub fn update_row(
        &mut self,
        info: &WorksheetInfo,
        id: &str,
        cells: &Cells,
        now: DateTime<Utc>,
    ) -> Result<RawRow> {
        let context = format!("{} row={}", info.describe(), id);
        let worksheet = self.worksheet_mut(Operation::UpdateRow, info)?;
        let index = worksheet
            .row_index(id)
            .ok_or_else(|| not_found(Operation::UpdateRow, &context, "row"))?;
        worksheet.check_columns(Operation::UpdateRow, &context, cells)?;
        worksheet.rows[index] = StoredRow {
            updated: now,
            cells: cells.iter().cloned().collect(),
        };
        worksheet.updated = now;
        worksheet
            .raw_row(index)
            .ok_or_else(|| not_found(Operation::UpdateRow, &context, "row").into())
    }

    /// Removes a row. Every row below it moves up one position.
    pub fn delete_row(&mut self, info: &WorksheetInfo, id: &str, now: DateTime<Utc>) -> Result<()> {
        let context = format!("{} row={}", info.describe(), id);
        let worksheet = self.worksheet_mut(Operation::DeleteRow, info)?;
        let index = worksheet
            .row_index(id)
            .ok_or_else(|| not_found(Operation::DeleteRow, &context, "row"))?;
        worksheet.rows.remove(index);
        worksheet.updated = now;
        Ok(())
    }

    pub fn header_cells(&self, info: &WorksheetInfo) -> Result<Vec<FieldCell>> {
        let worksheet = self.worksheet(Operation::QueryFields, info)?;
        Ok(worksheet
            .header
            .iter()
            .map(|(col, cell)| FieldCell {
                id: format!("R1C{}", col),
                updated: Some(cell.updated),
                cell: cell.name.clone(),
                col: *col,
            })
            .collect())
    }

    pub fn write_header_cell(
        &mut self,
        info: &WorksheetInfo,
        name: &str,
        col: usize,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let context = format!("{} cell=R1C{}", info.describe(), col);
        let worksheet = self.worksheet_mut(Operation::CreateField, info)?;
        if name.is_empty() || col == 0 || col > worksheet.col_count {
            return Err(ApiError::new(400, Operation::CreateField, context)
                .with_detail(format!(
                    "cannot name column {} of {} as {:?}",
                    col, worksheet.col_count, name
                ))
                .into());
        }
        if worksheet.header.contains_key(&col) {
            return Err(ApiError::new(409, Operation::CreateField, context)
                .with_detail("cell already holds a column name")
                .into());
        }
        worksheet.header.insert(
            col,
            HeaderCell {
                name: name.to_string(),
                updated: now,
            },
        );
        worksheet.updated = now;
        Ok(())
    }
}
