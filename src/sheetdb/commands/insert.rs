use super::columns;
use crate::client::SheetClient;
use crate::error::Result;
use crate::model::{Row, WorksheetInfo};
use crate::store::SheetBackend;

/// Adds rows, creating any columns they need first. Returns the stored rows
/// with their identities.
pub async fn run<B: SheetBackend>(
    client: &SheetClient<B>,
    worksheet: &WorksheetInfo,
    rows: Vec<Row>,
) -> Result<Vec<Row>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    columns::ensure(client, worksheet, &rows).await?;
    client.insert_entries(worksheet, &rows).await
}
