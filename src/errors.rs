use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("Method Not Allowed")]
    MethodNotAllowed,
    #[error("{error}: {details}")]
    Upstream {
        error: &'static str,
        details: String,
        code: Option<&'static str>,
    },
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    /// An extractor failure; everything but an oversized body is a 400.
    pub fn rejected(status: StatusCode, text: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(text)
        } else {
            ApiError::BadRequest(text)
        }
    }

    /// Adapter for `map_err`: keeps the handler's public message and attaches
    /// the full upstream error chain as `details`.
    pub fn upstream(error: &'static str) -> impl FnOnce(anyhow::Error) -> ApiError {
        move |e| {
            tracing::error!(error = %format!("{e:#}"), "{error}");
            ApiError::Upstream { error, details: format!("{e:#}"), code: None }
        }
    }

    /// Attaches a machine-readable `code` to an upstream failure.
    pub fn coded(self, code: &'static str) -> Self {
        match self {
            ApiError::Upstream { error, details, .. } => {
                ApiError::Upstream { error, details, code: Some(code) }
            }
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) | ApiError::PayloadTooLarge(msg) => {
                json!({ "error": msg })
            }
            ApiError::MethodNotAllowed => json!({ "error": "Method Not Allowed" }),
            ApiError::Upstream { error, details, code: Some(code) } => {
                json!({ "error": error, "details": details, "code": code })
            }
            ApiError::Upstream { error, details, code: None } => {
                json!({ "error": error, "details": details })
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        ApiError::rejected(r.status(), r.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(r: QueryRejection) -> Self {
        ApiError::BadRequest(r.body_text())
    }
}
