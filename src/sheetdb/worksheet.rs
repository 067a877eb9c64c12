//! # Worksheet Facade
//!
//! [`Worksheet`] is the collection-style entry point: `find`, `insert`,
//! `update` and `remove` over the rows of one worksheet. It is a thin facade
//! over `commands/*.rs`; each method dispatches to the matching `run`.
//!
//! Filters and updates arrive either as parsed values ([`Filter`], [`Update`])
//! or, through the `*_json` variants, as MongoDB-style JSON documents that are
//! parsed (and rejected if malformed) before any backend request.

use crate::client::SheetClient;
use crate::commands::{self, FindOptions, RemoveOptions, UpdateOptions};
use crate::error::Result;
use crate::model::{Row, WorksheetInfo};
use crate::query::{Filter, Update};
use crate::store::SheetBackend;
use std::sync::Arc;

pub struct Worksheet<B: SheetBackend> {
    client: Arc<SheetClient<B>>,
    info: WorksheetInfo,
}

impl<B: SheetBackend> Clone for Worksheet<B> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            info: self.info.clone(),
        }
    }
}

impl<B: SheetBackend> Worksheet<B> {
    pub fn new(client: Arc<SheetClient<B>>, info: WorksheetInfo) -> Self {
        Self { client, info }
    }

    pub fn info(&self) -> &WorksheetInfo {
        &self.info
    }

    pub fn title(&self) -> &str {
        &self.info.title
    }

    pub fn client(&self) -> &SheetClient<B> {
        &self.client
    }

    pub async fn find(&self, filter: &Filter, options: FindOptions) -> Result<Vec<Row>> {
        commands::find::run(&self.client, &self.info, filter, &options).await
    }

    pub async fn insert(&self, rows: Vec<Row>) -> Result<Vec<Row>> {
        commands::insert::run(&self.client, &self.info, rows).await
    }

    pub async fn update(
        &self,
        selector: &Filter,
        update: &Update,
        options: UpdateOptions,
    ) -> Result<Vec<Row>> {
        commands::update::run(&self.client, &self.info, selector, update, &options).await
    }

    pub async fn remove(&self, selector: &Filter, options: RemoveOptions) -> Result<usize> {
        commands::remove::run(&self.client, &self.info, selector, &options).await
    }

    pub async fn columns(&self) -> Result<Vec<String>> {
        commands::columns::list(&self.client, &self.info).await
    }

    pub async fn find_json(
        &self,
        filter: &serde_json::Value,
        options: FindOptions,
    ) -> Result<Vec<Row>> {
        self.find(&Filter::parse(filter)?, options).await
    }

    /// Inserts one document or an array of documents.
    pub async fn insert_json(&self, documents: &serde_json::Value) -> Result<Vec<Row>> {
        let rows = match documents {
            serde_json::Value::Array(items) => {
                items.iter().map(Row::from_json).collect::<Result<Vec<_>>>()?
            }
            document => vec![Row::from_json(document)?],
        };
        self.insert(rows).await
    }

    pub async fn update_json(
        &self,
        selector: &serde_json::Value,
        update: &serde_json::Value,
        options: UpdateOptions,
    ) -> Result<Vec<Row>> {
        let selector = Filter::parse(selector)?;
        let update = Update::parse(update)?;
        self.update(&selector, &update, options).await
    }

    pub async fn remove_json(
        &self,
        selector: &serde_json::Value,
        options: RemoveOptions,
    ) -> Result<usize> {
        self.remove(&Filter::parse(selector)?, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SheetDbError;
    use crate::model::WorksheetOptions;
    use crate::store::memory::InMemorySheets;
    use serde_json::json;

    async fn worksheet() -> Worksheet<InMemorySheets> {
        let client = Arc::new(SheetClient::new(InMemorySheets::new()).with_access_token("t"));
        let info = client
            .create_worksheet("sheet", "ws", &WorksheetOptions::default())
            .await
            .unwrap();
        Worksheet::new(client, info)
    }

    #[tokio::test]
    async fn json_round_through_the_facade() {
        let ws = worksheet().await;
        let stored = ws
            .insert_json(&json!([{"a": 1}, {"a": 2}, {"a": 3}]))
            .await
            .unwrap();
        assert_eq!(stored.len(), 3);

        let updated = ws
            .update_json(&json!({"a": 2}), &json!({"$mul": {"a": 10}}), UpdateOptions::default())
            .await
            .unwrap();
        assert_eq!(updated[0].to_json()["a"], json!(20));

        let removed = ws
            .remove_json(&json!({"a": {"$gte": 3}}), RemoveOptions::default())
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let rest = ws.find_json(&json!({}), FindOptions::default()).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(ws.columns().await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn malformed_documents_fail_before_any_request() {
        let ws = worksheet().await;
        ws.client().backend().clear_calls();
        let err = ws
            .find_json(&json!({"a": {"$near": 1}}), FindOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SheetDbError::InvalidFilter(_)));
        let err = ws.insert_json(&json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, SheetDbError::Precondition(_)));
        let err = ws
            .update_json(&json!({}), &json!({"$inc": {"a": "x"}}), UpdateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SheetDbError::InvalidUpdate(_)));
        assert!(ws.client().backend().calls().is_empty());
    }
}
