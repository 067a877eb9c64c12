use super::FindOptions;
use crate::client::SheetClient;
use crate::error::Result;
use crate::model::{Row, WorksheetInfo};
use crate::query::{self, Filter};
use crate::store::SheetBackend;
use tracing::debug;

/// Rows matching `filter`.
///
/// The backend narrows rows with the compiled query, skip and limit window
/// them in backend order, and the filter itself has the final word.
pub async fn run<B: SheetBackend>(
    client: &SheetClient<B>,
    worksheet: &WorksheetInfo,
    filter: &Filter,
    options: &FindOptions,
) -> Result<Vec<Row>> {
    let compiled = query::compile(filter);
    debug!(worksheet = %worksheet.describe(), query = %compiled, "find");
    let rows = client
        .query_worksheet(worksheet, &options.row_query(compiled))
        .await?;
    Ok(query::apply(filter, &options.window(rows)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::seeded;
    use crate::model::Value;
    use crate::store::memory::{Call, InMemorySheets};
    use crate::store::Operation;
    use serde_json::json;

    fn people() -> Vec<serde_json::Value> {
        vec![
            json!({"name": "ada", "age": 36}),
            json!({"name": "alan", "age": 41}),
            json!({"name": "grace", "age": 85}),
        ]
    }

    fn names(rows: &[Row]) -> Vec<String> {
        rows.iter()
            .filter_map(|row| row.field("name").map(Value::to_string))
            .collect()
    }

    fn filter(document: serde_json::Value) -> Filter {
        Filter::parse(&document).unwrap()
    }

    #[tokio::test]
    async fn sends_compiled_query_to_backend() {
        let (client, info) = seeded(InMemorySheets::new(), &people()).await;
        let rows = run(&client, &info, &filter(json!({"age": {"$gt": 40}})), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(names(&rows), vec!["alan", "grace"]);
        match &client.backend().calls()[0] {
            Call::QueryRows { query, .. } => assert_eq!(query.query, "age > 40"),
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn client_filter_handles_what_the_backend_cannot() {
        let (client, info) = seeded(InMemorySheets::new(), &people()).await;
        let rows = run(
            &client,
            &info,
            &filter(json!({"name": {"$regex": "^a"}, "age": {"$lt": 40}})),
            &FindOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(names(&rows), vec!["ada"]);
    }

    #[tokio::test]
    async fn loose_backend_results_are_filtered_locally() {
        let (client, info) = seeded(InMemorySheets::loose(), &people()).await;
        let rows = run(&client, &info, &filter(json!({"name": "grace"})), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(names(&rows), vec!["grace"]);
    }

    #[tokio::test]
    async fn skip_and_limit_window_backend_order() {
        let (client, info) = seeded(InMemorySheets::new(), &people()).await;
        let rows = run(&client, &info, &Filter::all(), &FindOptions::default().skip(1).limit(1))
            .await
            .unwrap();
        assert_eq!(names(&rows), vec!["alan"]);
    }

    #[tokio::test]
    async fn ordering_is_forwarded() {
        let (client, info) = seeded(InMemorySheets::new(), &people()).await;
        let options = FindOptions::default().sort("age").descending(true);
        let rows = run(&client, &info, &Filter::all(), &options).await.unwrap();
        assert_eq!(names(&rows), vec!["grace", "alan", "ada"]);
    }

    #[tokio::test]
    async fn backend_errors_propagate() {
        let (client, info) = seeded(InMemorySheets::new(), &people()).await;
        client.backend().fail_on(Operation::QueryRows, 403);
        let err = run(&client, &info, &Filter::all(), &FindOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert!(err.to_string().contains("Unauthorized"));
    }
}
