//! Row operations of a worksheet, one module per operation.
//!
//! Each `run` takes the [`SheetClient`](crate::client::SheetClient) and the
//! target worksheet and returns plain data. [`crate::worksheet::Worksheet`]
//! is the facade that callers use.

use crate::model::Row;
use crate::store::RowQuery;
use serde::{Deserialize, Serialize};

pub mod columns;
pub mod find;
pub mod insert;
pub mod remove;
pub mod update;

/// Windowing and ordering for `find`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindOptions {
    pub skip: usize,
    /// `None` and `Some(0)` both mean no limit.
    pub limit: Option<usize>,
    /// Column the backend orders rows by.
    pub sort: Option<String>,
    pub descending: bool,
}

impl FindOptions {
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, column: impl Into<String>) -> Self {
        self.sort = Some(column.into());
        self
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    pub(crate) fn row_query(&self, query: String) -> RowQuery {
        RowQuery {
            query,
            sort: self.sort.clone(),
            descending: self.descending,
        }
    }

    /// Applies skip and limit to rows in backend order.
    pub(crate) fn window(&self, rows: Vec<Row>) -> Vec<Row> {
        let limit = match self.limit {
            None | Some(0) => usize::MAX,
            Some(limit) => limit,
        };
        rows.into_iter().skip(self.skip).take(limit).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateOptions {
    /// Update every match instead of the first one.
    pub multiple: bool,
    /// Insert a row when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoveOptions {
    pub just_one: bool,
}

impl RemoveOptions {
    pub fn just_one(mut self, just_one: bool) -> Self {
        self.just_one = just_one;
        self
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::client::SheetClient;
    use crate::model::{Row, WorksheetInfo, WorksheetOptions};
    use crate::store::memory::InMemorySheets;

    /// A worksheet holding `documents`, with the setup calls cleared from the log.
    pub async fn seeded(
        backend: InMemorySheets,
        documents: &[serde_json::Value],
    ) -> (SheetClient<InMemorySheets>, WorksheetInfo) {
        let client = SheetClient::new(backend).with_access_token("token");
        let info = client
            .create_worksheet("sheet", "ws", &WorksheetOptions::default())
            .await
            .unwrap();
        let rows = documents
            .iter()
            .map(|document| Row::from_json(document).unwrap())
            .collect();
        super::insert::run(&client, &info, rows).await.unwrap();
        client.backend().clear_calls();
        (client, info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(count: i32) -> Vec<Row> {
        (1..=count).map(|n| Row::new().with("n", n)).collect()
    }

    #[test]
    fn window_skips_then_limits() {
        let picked = FindOptions::default().skip(1).limit(1).window(rows(3));
        assert_eq!(picked, vec![Row::new().with("n", 2)]);
    }

    #[test]
    fn zero_limit_is_unbounded() {
        assert_eq!(FindOptions::default().limit(0).window(rows(3)).len(), 3);
        assert_eq!(FindOptions::default().skip(5).window(rows(3)).len(), 0);
    }

    #[test]
    fn options_read_camel_case_json() {
        let find: FindOptions =
            serde_json::from_value(json!({"skip": 2, "sort": "age", "descending": true})).unwrap();
        assert_eq!(find, FindOptions::default().skip(2).sort("age").descending(true));
        let remove: RemoveOptions = serde_json::from_value(json!({"justOne": true})).unwrap();
        assert!(remove.just_one);
        let update: UpdateOptions = serde_json::from_value(json!({"upsert": true})).unwrap();
        assert_eq!(update, UpdateOptions::default().upsert(true));
    }

    #[test]
    fn row_query_carries_ordering() {
        let query = FindOptions::default()
            .sort("age")
            .descending(true)
            .row_query("age > 3".to_string());
        assert_eq!(query.to_params(), "&sq=age > 3&orderby=column:age&reverse=true");
    }
}
