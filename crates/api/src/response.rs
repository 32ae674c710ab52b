//! Response envelopes shared by every endpoint.

use serde::Serialize;
use store::Page;

/// Pagination block of a search response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Pagination {
    pub total_items: u64,
    pub total_pages: u64,
    pub current_page: u64,
}

/// `{"status": "SUCCESS", "body": ..., "pagination": ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub body: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T> ApiResponse<T> {
    pub fn success(body: T) -> Self {
        Self {
            status: "SUCCESS",
            body,
            pagination: None,
        }
    }
}

impl<T> ApiResponse<Vec<T>> {
    /// Wraps a page of results, converting each item.
    pub fn page<U>(page: Page<U>, f: impl FnMut(U) -> T) -> Self {
        let pagination = Pagination {
            total_items: page.total_items,
            total_pages: page.total_pages,
            current_page: page.current_page,
        };
        Self {
            status: "SUCCESS",
            body: page.items.into_iter().map(f).collect(),
            pagination: Some(pagination),
        }
    }
}

/// `{"status": "ERROR", "error-code": ..., "error-message": ...}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ErrorResponse {
    pub status: &'static str,
    pub error_code: &'static str,
    pub error_message: String,
}

impl ErrorResponse {
    pub fn new(error_code: &'static str, error_message: impl Into<String>) -> Self {
        Self {
            status: "ERROR",
            error_code,
            error_message: error_message.into(),
        }
    }
}
