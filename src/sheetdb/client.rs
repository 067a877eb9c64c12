//! Data access over a [`SheetBackend`].
//!
//! The client types raw cell text into [`Row`]s, fans batches of row writes
//! out to the backend with a bounded number in flight, and keeps the
//! read-through cache. Every write clears the cache, whether it succeeded or
//! not: a batch that failed halfway has still changed the sheet.

use crate::cache::{CacheEntry, ResponseCache};
use crate::coerce::coerce_value;
use crate::config::SheetDbConfig;
use crate::error::{Result, SheetDbError};
use crate::model::{is_meta_field, FieldCell, Row, SheetInfo, WorksheetInfo, WorksheetOptions};
use crate::store::{Cells, Operation, RawRow, RowQuery, SheetBackend};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::sync::RwLock;
use tracing::{debug, info, warn};

const DEFAULT_MAX_IN_FLIGHT: usize = 4;

pub struct SheetClient<B: SheetBackend> {
    backend: B,
    cache: ResponseCache,
    token: RwLock<Option<String>>,
    max_in_flight: usize,
}

impl<B: SheetBackend> SheetClient<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: ResponseCache::default(),
            token: RwLock::new(None),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn from_config(backend: B, config: &SheetDbConfig) -> Self {
        let client = Self {
            backend,
            cache: ResponseCache::new(config.cache_enabled, config.cache_ttl()),
            token: RwLock::new(None),
            max_in_flight: config.max_in_flight(),
        };
        match config.access_token.as_deref() {
            Some(token) if !token.is_empty() => client.with_access_token(token),
            _ => client,
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_access_token(self, token: &str) -> Self {
        *self.token.write().unwrap_or_else(|p| p.into_inner()) = Some(token.to_string());
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// Replaces the access token used for schema changes.
    pub fn set_access_token(&self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Err(SheetDbError::Precondition(
                "access token must not be empty".to_string(),
            ));
        }
        *self.token.write().unwrap_or_else(|p| p.into_inner()) = Some(token.to_string());
        Ok(())
    }

    fn require_authentication(&self, operation: Operation) -> Result<()> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(SheetDbError::Precondition(format!(
                "{} requires an access token",
                operation
            )))
        }
    }

    fn invalidate<T>(&self, result: Result<T>) -> Result<T> {
        self.cache.clear();
        if let Err(err) = &result {
            warn!(error = %err, "write aborted");
        }
        result
    }

    pub async fn query_sheet_info(&self, sheet_id: &str) -> Result<SheetInfo> {
        let key = ResponseCache::sheet_info_key(sheet_id);
        if let Some(CacheEntry::SheetInfo(info)) = self.cache.get(&key) {
            debug!(sheet = sheet_id, "sheet info cache hit");
            return Ok(info);
        }
        debug!(sheet = sheet_id, "fetching sheet info");
        let info = self.backend.sheet_info(sheet_id).await?;
        self.cache.put(key, CacheEntry::SheetInfo(info.clone()));
        Ok(info)
    }

    pub async fn create_worksheet(
        &self,
        sheet_id: &str,
        title: &str,
        options: &WorksheetOptions,
    ) -> Result<WorksheetInfo> {
        self.require_authentication(Operation::CreateWorksheet)?;
        info!(sheet = sheet_id, title, "creating worksheet");
        let result = self
            .backend
            .create_worksheet(sheet_id, title, options)
            .await;
        self.invalidate(result)
    }

    pub async fn drop_worksheet(&self, sheet_id: &str, worksheet_id: &str) -> Result<()> {
        self.require_authentication(Operation::DropWorksheet)?;
        info!(sheet = sheet_id, worksheet = worksheet_id, "dropping worksheet");
        let result = self.backend.drop_worksheet(sheet_id, worksheet_id).await;
        self.invalidate(result)
    }

    /// Rows matching the structured query, in backend order.
    pub async fn query_worksheet(
        &self,
        worksheet: &WorksheetInfo,
        query: &RowQuery,
    ) -> Result<Vec<Row>> {
        let options = RowQuery {
            query: String::new(),
            ..query.clone()
        };
        let key = ResponseCache::rows_key(&worksheet.worksheet_id, &query.query, &options.to_params());
        if let Some(CacheEntry::Rows(raw)) = self.cache.get(&key) {
            debug!(worksheet = %worksheet.describe(), query = %query.query, "row cache hit");
            return decode_rows(raw, Operation::QueryRows);
        }
        debug!(worksheet = %worksheet.describe(), query = %query.query, "querying rows");
        let raw = self.backend.query_rows(worksheet, query).await?;
        let rows = decode_rows(raw.clone(), Operation::QueryRows)?;
        self.cache.put(key, CacheEntry::Rows(raw));
        Ok(rows)
    }

    /// Header cells of the worksheet, served from cache when possible.
    pub async fn query_fields(&self, worksheet: &WorksheetInfo) -> Result<Vec<FieldCell>> {
        let key = ResponseCache::fields_key(&worksheet.worksheet_id);
        if let Some(CacheEntry::Fields(fields)) = self.cache.get(&key) {
            debug!(worksheet = %worksheet.describe(), "field cache hit");
            return Ok(fields);
        }
        self.query_fields_fresh(worksheet).await
    }

    /// Header cells straight from the backend. Refreshes the cached copy.
    pub async fn query_fields_fresh(&self, worksheet: &WorksheetInfo) -> Result<Vec<FieldCell>> {
        debug!(worksheet = %worksheet.describe(), "querying fields");
        let mut fields = self.backend.header_cells(worksheet).await?;
        for field in &fields {
            if field.col == 0 || field.cell.is_empty() {
                return Err(SheetDbError::MalformedResponse(format!(
                    "{}: header cell {} has no column name or position",
                    Operation::QueryFields,
                    field.id
                )));
            }
        }
        fields.sort_by_key(|field| field.col);
        self.cache.put(
            ResponseCache::fields_key(&worksheet.worksheet_id),
            CacheEntry::Fields(fields.clone()),
        );
        Ok(fields)
    }

    /// Names columns `start_index + 1`, `start_index + 2`, ... one at a time.
    pub async fn create_columns(
        &self,
        worksheet: &WorksheetInfo,
        names: &[String],
        start_index: usize,
    ) -> Result<()> {
        if let Some(bad) = names
            .iter()
            .find(|name| name.trim().is_empty() || is_meta_field(name))
        {
            return Err(SheetDbError::Precondition(format!(
                "invalid column name {:?}",
                bad
            )));
        }
        if names.is_empty() {
            return Ok(());
        }
        let mut result = Ok(());
        for (offset, name) in names.iter().enumerate() {
            let col = start_index + offset + 1;
            info!(worksheet = %worksheet.describe(), column = %name, col, "creating column");
            result = self.backend.write_header_cell(worksheet, name, col).await;
            if result.is_err() {
                break;
            }
        }
        self.invalidate(result)
    }

    /// Creates rows, at most `max_in_flight` requests at a time.
    pub async fn insert_entries(&self, worksheet: &WorksheetInfo, rows: &[Row]) -> Result<Vec<Row>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        debug!(worksheet = %worksheet.describe(), count = rows.len(), "inserting rows");
        let payloads: Vec<Cells> = rows.iter().map(encode_row).collect();
        let result = stream::iter(payloads.iter())
            .map(|cells| async move {
                let raw = self.backend.insert_row(worksheet, cells).await?;
                decode_row(raw, Operation::InsertRow)
            })
            .buffered(self.max_in_flight)
            .try_collect::<Vec<_>>()
            .await;
        self.invalidate(result)
    }

    /// Writes rows back by identity, at most `max_in_flight` requests at a time.
    pub async fn update_entries(&self, worksheet: &WorksheetInfo, rows: &[Row]) -> Result<Vec<Row>> {
        let mut payloads = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone().ok_or_else(|| {
                SheetDbError::Precondition("cannot update a row without _id".to_string())
            })?;
            payloads.push((id, encode_row(row)));
        }
        if payloads.is_empty() {
            return Ok(Vec::new());
        }
        debug!(worksheet = %worksheet.describe(), count = payloads.len(), "updating rows");
        let result = stream::iter(payloads.iter())
            .map(|(id, cells)| async move {
                let raw = self.backend.update_row(worksheet, id, cells).await?;
                decode_row(raw, Operation::UpdateRow)
            })
            .buffered(self.max_in_flight)
            .try_collect::<Vec<_>>()
            .await;
        self.invalidate(result)
    }

    /// Deletes rows one by one, highest position first, so that the rows
    /// still waiting keep their positions.
    pub async fn delete_entries(&self, worksheet: &WorksheetInfo, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut ordered: Vec<&String> = ids.iter().collect();
        if ids.iter().all(|id| id.parse::<usize>().is_ok()) {
            ordered.sort_by_key(|id| std::cmp::Reverse(id.parse::<usize>().unwrap_or(0)));
        } else {
            ordered.reverse();
        }
        debug!(worksheet = %worksheet.describe(), count = ordered.len(), "deleting rows");
        let mut deleted = 0;
        let mut result = Ok(());
        for id in ordered {
            result = self.backend.delete_row(worksheet, id).await;
            if result.is_err() {
                break;
            }
            deleted += 1;
        }
        self.invalidate(result).map(|_| deleted)
    }
}

/// Cells for a row write. Metadata never becomes a cell.
fn encode_row(row: &Row) -> Cells {
    row.fields()
        .map(|(name, value)| (name.to_string(), value.to_cell_string()))
        .collect()
}

fn decode_rows(raw: Vec<RawRow>, operation: Operation) -> Result<Vec<Row>> {
    raw.into_iter().map(|row| decode_row(row, operation)).collect()
}

fn decode_row(raw: RawRow, operation: Operation) -> Result<Row> {
    if raw.id.is_empty() {
        return Err(SheetDbError::MalformedResponse(format!(
            "{}: row without identity",
            operation
        )));
    }
    let updated = DateTime::parse_from_rfc3339(&raw.updated)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| {
            SheetDbError::MalformedResponse(format!(
                "{}: row {} has invalid timestamp {:?}",
                operation, raw.id, raw.updated
            ))
        })?;
    let mut row = Row::new().with_id(raw.id).with_updated(updated);
    for (name, text) in raw.cells {
        row.set(name, coerce_value(&text));
    }
    Ok(row)
}
