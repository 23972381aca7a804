use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use derive_new::new;
use serde::{Deserialize, Serialize};

/// Body of every error response: `{"error": "..."}`
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerErrorBody {
    /// What went wrong
    pub error: String,
}

/// An error response with a JSON body
#[derive(Clone, Debug, new)]
pub struct ServerErrorResponse {
    /// Status code
    pub status_code: StatusCode,
    /// Body
    pub body: ServerErrorBody,
}

impl ServerErrorResponse {
    /// Shorthand for a response with `message` as its error.
    pub fn with_message(status_code: StatusCode, message: impl Into<String>) -> Self {
        Self::new(
            status_code,
            ServerErrorBody {
                error: message.into(),
            },
        )
    }
}

impl IntoResponse for ServerErrorResponse {
    fn into_response(self) -> Response {
        (self.status_code, Json(self.body)).into_response()
    }
}

/// A successful response with a JSON body
#[derive(Clone, Debug, new)]
pub struct ServerSuccessResponse<T> {
    /// Body
    pub body: T,
}

impl<T: Serialize> IntoResponse for ServerSuccessResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self.body)).into_response()
    }
}

/// Result of a handler
pub type ServerResult<T> = Result<T, ServerErrorResponse>;
