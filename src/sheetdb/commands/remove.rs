use super::{find, FindOptions, RemoveOptions};
use crate::client::SheetClient;
use crate::error::Result;
use crate::model::WorksheetInfo;
use crate::query::{single_identity, Filter};
use crate::store::SheetBackend;
use tracing::debug;

/// Deletes the rows matching `selector` and returns how many were deleted.
///
/// A selector naming a single `_id` deletes that row without querying.
pub async fn run<B: SheetBackend>(
    client: &SheetClient<B>,
    worksheet: &WorksheetInfo,
    selector: &Filter,
    options: &RemoveOptions,
) -> Result<usize> {
    if let Some(id) = single_identity(selector) {
        debug!(worksheet = %worksheet.describe(), id, "removing by identity");
        return client.delete_entries(worksheet, &[id.to_string()]).await;
    }

    let find_options = if options.just_one {
        FindOptions::default().limit(1)
    } else {
        FindOptions::default()
    };
    let ids: Vec<String> = find::run(client, worksheet, selector, &find_options)
        .await?
        .into_iter()
        .filter_map(|row| row.id)
        .collect();
    client.delete_entries(worksheet, &ids).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::seeded;
    use crate::model::Value;
    use crate::store::memory::{Call, InMemorySheets};
    use crate::store::Operation;
    use serde_json::json;

    fn numbers() -> Vec<serde_json::Value> {
        (1..=4).map(|n| json!({"n": n, "even": n % 2 == 0})).collect()
    }

    fn deleted_ids(backend: &InMemorySheets) -> Vec<String> {
        backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::DeleteRow { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }

    fn filter(document: serde_json::Value) -> Filter {
        Filter::parse(&document).unwrap()
    }

    #[tokio::test]
    async fn identity_selector_skips_the_query() {
        let (client, info) = seeded(InMemorySheets::new(), &numbers()).await;
        let removed = run(&client, &info, &filter(json!({"_id": "2"})), &RemoveOptions::default())
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(client.backend().calls_of(Operation::QueryRows).is_empty());
        assert_eq!(deleted_ids(client.backend()), vec!["2"]);
    }

    #[tokio::test]
    async fn deletes_matches_from_the_bottom() {
        let (client, info) = seeded(InMemorySheets::new(), &numbers()).await;
        let removed = run(&client, &info, &filter(json!({"even": true})), &RemoveOptions::default())
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(deleted_ids(client.backend()), vec!["4", "2"]);

        let remaining = find::run(&client, &info, &Filter::all(), &FindOptions::default())
            .await
            .unwrap();
        let values: Vec<_> = remaining
            .iter()
            .filter_map(|row| row.field("n").cloned())
            .collect();
        assert_eq!(values, vec![Value::from(1), Value::from(3)]);
    }

    #[tokio::test]
    async fn just_one_removes_the_first_match() {
        let (client, info) = seeded(InMemorySheets::new(), &numbers()).await;
        let removed = run(
            &client,
            &info,
            &filter(json!({"n": {"$gt": 1}})),
            &RemoveOptions::default().just_one(true),
        )
        .await
        .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(deleted_ids(client.backend()), vec!["2"]);
    }

    #[tokio::test]
    async fn nothing_matched_deletes_nothing() {
        let (client, info) = seeded(InMemorySheets::new(), &numbers()).await;
        let removed = run(&client, &info, &filter(json!({"n": 99})), &RemoveOptions::default())
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert!(deleted_ids(client.backend()).is_empty());
    }

    #[tokio::test]
    async fn failed_delete_stops_the_batch() {
        let (client, info) = seeded(InMemorySheets::new(), &numbers()).await;
        client.backend().fail_on(Operation::DeleteRow, 500);
        let err = run(&client, &info, &Filter::all(), &RemoveOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(deleted_ids(client.backend()), vec!["4"]);
    }
}
