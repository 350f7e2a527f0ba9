use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::database::Page;

/// Body of generic create/update/delete acknowledgements.
pub const ACTION_OK: &str = "Action successfully";

/// Wrapper for API responses that automatically adds success envelope
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub status_code: Option<StatusCode>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful API response with default 200 status
    pub fn success(data: T) -> Self {
        Self {
            data,
            status_code: None, // Default to 200 OK
        }
    }

    /// Create an API response with custom status code
    pub fn with_status(data: T, status_code: StatusCode) -> Self {
        Self {
            data,
            status_code: Some(status_code),
        }
    }

    /// Create a 201 Created response
    pub fn created(data: T) -> Self {
        Self::with_status(data, StatusCode::CREATED)
    }
}

impl ApiResponse<&'static str> {
    /// `{success:true, data:"Action successfully"}` with 200
    pub fn done() -> Self {
        Self::success(ACTION_OK)
    }

    /// `{success:true, data:"Action successfully"}` with 201
    pub fn done_created() -> Self {
        Self::created(ACTION_OK)
    }
}

/// Single record or list under the `item` key.
#[derive(Debug, Serialize)]
pub struct ItemBody<T: Serialize> {
    pub item: T,
}

impl<T: Serialize> ApiResponse<ItemBody<T>> {
    pub fn item(item: T) -> Self {
        Self::success(ItemBody { item })
    }
}

/// Paginated payload: scoped total, filtered count, window and rows.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBody<T: Serialize> {
    pub total_count: i64,
    pub count: i64,
    pub page: i64,
    pub limit: i64,
    pub items: Vec<T>,
}

impl<T: Serialize> From<Page<T>> for PageBody<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            total_count: page.total_count,
            count: page.count,
            page: page.page,
            limit: page.limit,
            items: page.items,
        }
    }
}

impl<T: Serialize> ApiResponse<PageBody<T>> {
    pub fn page(page: Page<T>) -> Self {
        Self::success(page.into())
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status_code.unwrap_or(StatusCode::OK);

        // Convert data to JSON Value for consistent envelope format
        let data_value = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Failed to serialize response data" })),
                )
                    .into_response();
            }
        };

        // Wrap in success envelope
        let envelope = json!({
            "success": true,
            "data": data_value
        });

        (status, Json(envelope)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;
