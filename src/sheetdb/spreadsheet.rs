use crate::client::SheetClient;
use crate::error::{Result, SheetDbError};
use crate::model::{SheetInfo, WorksheetInfo, WorksheetOptions};
use crate::store::SheetBackend;
use crate::worksheet::Worksheet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// A spreadsheet and its worksheets.
///
/// The worksheet list is remembered after the first [`Spreadsheet::info`] and
/// forgotten whenever a worksheet is created or dropped through this handle.
pub struct Spreadsheet<B: SheetBackend> {
    sheet_id: String,
    client: Arc<SheetClient<B>>,
    worksheets: Mutex<Option<Vec<WorksheetInfo>>>,
}

impl<B: SheetBackend> Spreadsheet<B> {
    pub fn open(sheet_id: impl Into<String>, client: Arc<SheetClient<B>>) -> Self {
        Self {
            sheet_id: sheet_id.into(),
            client,
            worksheets: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.sheet_id
    }

    pub fn client(&self) -> &Arc<SheetClient<B>> {
        &self.client
    }

    fn known(&self) -> MutexGuard<'_, Option<Vec<WorksheetInfo>>> {
        self.worksheets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn info(&self) -> Result<SheetInfo> {
        let info = self.client.query_sheet_info(&self.sheet_id).await?;
        *self.known() = Some(info.worksheets.clone());
        Ok(info)
    }

    /// The worksheet titled `title`, loading the worksheet list if needed.
    pub async fn worksheet(&self, title: &str) -> Result<Worksheet<B>> {
        if self.known().is_none() {
            self.info().await?;
        }
        let found = self
            .known()
            .as_ref()
            .and_then(|worksheets| worksheets.iter().find(|ws| ws.title == title).cloned());
        match found {
            Some(info) => Ok(Worksheet::new(Arc::clone(&self.client), info)),
            None => Err(SheetDbError::WorksheetNotFound(title.to_string())),
        }
    }

    /// Creates a worksheet, or returns the existing one with that title.
    pub async fn create_worksheet(
        &self,
        title: &str,
        options: &WorksheetOptions,
    ) -> Result<Worksheet<B>> {
        if !self.client.is_authenticated() {
            return Err(SheetDbError::Precondition(
                "creating a worksheet requires authentication".to_string(),
            ));
        }
        let exists = self
            .known()
            .as_ref()
            .is_some_and(|worksheets| worksheets.iter().any(|ws| ws.title == title));
        if exists {
            debug!(sheet = %self.sheet_id, title, "worksheet already exists");
            return self.worksheet(title).await;
        }
        self.client
            .create_worksheet(&self.sheet_id, title, options)
            .await?;
        *self.known() = None;
        self.worksheet(title).await
    }

    pub async fn drop_worksheet(&self, title: &str) -> Result<()> {
        if !self.client.is_authenticated() {
            return Err(SheetDbError::Precondition(
                "dropping a worksheet requires authentication".to_string(),
            ));
        }
        let worksheet = self.worksheet(title).await?;
        *self.known() = None;
        self.client
            .drop_worksheet(&self.sheet_id, &worksheet.info().worksheet_id)
            .await
    }

    pub fn change_access_token(&self, token: &str) -> Result<()> {
        self.client.set_access_token(token)
    }
}
