use crate::store::Operation;
use thiserror::Error;

/// Broad class of a failed backend request, derived from its status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    MethodNotAllowed,
    Unauthorized,
    Failure,
}

impl ApiErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            405 => ApiErrorKind::MethodNotAllowed,
            401 | 403 => ApiErrorKind::Unauthorized,
            _ => ApiErrorKind::Failure,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ApiErrorKind::MethodNotAllowed => "Method not allowed",
            ApiErrorKind::Unauthorized => "Unauthorized",
            ApiErrorKind::Failure => "Something went wrong",
        }
    }
}

/// A non-success answer from the spreadsheet backend, with the request it answered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "{} ({status} {operation}: {context}){}",
    status_description(.status),
    detail_suffix(.detail)
)]
pub struct ApiError {
    pub status: u16,
    pub operation: Operation,
    /// Request parameters (sheet, worksheet, row or cell) the operation targeted.
    pub context: String,
    pub detail: Option<String>,
}

fn status_description(status: &u16) -> &'static str {
    ApiErrorKind::from_status(*status).description()
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|detail| format!(" {{{}}}", detail))
        .unwrap_or_default()
}

impl ApiError {
    pub fn new(status: u16, operation: Operation, context: impl Into<String>) -> Self {
        Self {
            status,
            operation,
            context: context.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn kind(&self) -> ApiErrorKind {
        ApiErrorKind::from_status(self.status)
    }
}

#[derive(Error, Debug)]
pub enum SheetDbError {
    #[error("Api error: {0}")]
    Api(#[from] ApiError),

    #[error("The response contains invalid data: {0}")]
    MalformedResponse(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Worksheet not found: {0}")]
    WorksheetNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SheetDbError {
    /// The backend status code, when the error came from the backend.
    pub fn status(&self) -> Option<u16> {
        match self {
            SheetDbError::Api(err) => Some(err.status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SheetDbError>;
