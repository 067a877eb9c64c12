use super::{columns, find, insert, FindOptions, UpdateOptions};
use crate::client::SheetClient;
use crate::error::Result;
use crate::model::{Row, WorksheetInfo};
use crate::query::{Filter, Update};
use crate::store::SheetBackend;
use chrono::Utc;
use tracing::debug;

/// Updates the first row matching `selector`, or every match with
/// `options.multiple`. Returns the rows as written.
///
/// With `options.upsert` and no match, the row built from the update (and
/// the selector's equality fields) is inserted instead.
pub async fn run<B: SheetBackend>(
    client: &SheetClient<B>,
    worksheet: &WorksheetInfo,
    selector: &Filter,
    update: &Update,
    options: &UpdateOptions,
) -> Result<Vec<Row>> {
    let find_options = if options.multiple {
        FindOptions::default()
    } else {
        FindOptions::default().limit(1)
    };
    let matched = find::run(client, worksheet, selector, &find_options).await?;

    if matched.is_empty() {
        if !options.upsert {
            return Ok(Vec::new());
        }
        debug!(worksheet = %worksheet.describe(), "no match, upserting");
        let document = update.upsert_document(selector, Utc::now());
        return insert::run(client, worksheet, vec![document]).await;
    }

    let updated = update.apply(&matched);
    if let Update::Replacement(_) = update {
        columns::ensure(client, worksheet, &updated).await?;
    }
    client.update_entries(worksheet, &updated).await
}
