use crate::client::SheetClient;
use crate::error::Result;
use crate::model::{field_names_of, Row, WorksheetInfo};
use crate::store::SheetBackend;
use tracing::debug;

/// Column names in sheet order.
pub async fn list<B: SheetBackend>(
    client: &SheetClient<B>,
    worksheet: &WorksheetInfo,
) -> Result<Vec<String>> {
    let fields = client.query_fields(worksheet).await?;
    Ok(fields.into_iter().map(|field| field.cell).collect())
}

/// Creates the columns `rows` use that the worksheet does not have yet.
///
/// New columns go after the highest existing column, in the order the rows
/// first mention them. Returns the names created.
pub async fn ensure<B: SheetBackend>(
    client: &SheetClient<B>,
    worksheet: &WorksheetInfo,
    rows: &[Row],
) -> Result<Vec<String>> {
    let fields = client.query_fields_fresh(worksheet).await?;
    let missing: Vec<String> = field_names_of(rows)
        .into_iter()
        .filter(|name| !fields.iter().any(|field| &field.cell == name))
        .collect();
    if missing.is_empty() {
        return Ok(missing);
    }
    let last = fields.iter().map(|field| field.col).max().unwrap_or(0);
    debug!(worksheet = %worksheet.describe(), ?missing, after = last, "adding columns");
    client.create_columns(worksheet, &missing, last).await?;
    Ok(missing)
}
