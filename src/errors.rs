use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::mcp::rpc::{json_rpc_error, SERVER_ERROR};

/// Failures raised while dispatching a JSON-RPC call inside a protocol engine.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("tool {name} not found")]
    ToolNotFound { name: String },
    #[error("Invalid arguments for tool {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

impl AppError {
    pub fn invalid_arguments(tool: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }
}

/// Transport-level outcomes that are answered without involving a protocol engine.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Bad Request: No valid session ID provided")]
    NoValidSession,
    #[error("Invalid or missing session ID")]
    InvalidSessionHeader,
    #[error("{0}")]
    NotAcceptable(&'static str),
    #[error("Unsupported Media Type: Content-Type must be application/json")]
    UnsupportedMediaType,
    #[error("Conflict: Only one SSE stream is allowed per session")]
    StreamConflict,
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoValidSession => StatusCode::OK,
            Self::InvalidSessionHeader => StatusCode::BAD_REQUEST,
            Self::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::StreamConflict => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::InvalidSessionHeader => (
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                self.to_string(),
            )
                .into_response(),
            _ => (
                status,
                Json(json_rpc_error(None, SERVER_ERROR, &self.to_string())),
            )
                .into_response(),
        }
    }
}
