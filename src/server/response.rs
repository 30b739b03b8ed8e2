//! Response envelopes and status mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::extraction::{ErrorType, ExtractionError, ExtractionResult};

/// Current time for the `timestamp` field
pub fn timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

/// HTTP status for an extraction outcome or boundary failure
pub fn status_for(error_type: Option<ErrorType>) -> StatusCode {
    match error_type {
        None => StatusCode::OK,
        Some(ErrorType::InitializationError) => StatusCode::SERVICE_UNAVAILABLE,
        Some(ErrorType::JsonParseError | ErrorType::ExternalServiceError) => StatusCode::BAD_GATEWAY,
        Some(ErrorType::ExtractionError) => StatusCode::INTERNAL_SERVER_ERROR,
        Some(
            ErrorType::MissingFile
            | ErrorType::InvalidFilename
            | ErrorType::InvalidFileType
            | ErrorType::MissingParameter
            | ErrorType::BadRequest,
        ) => StatusCode::BAD_REQUEST,
        Some(ErrorType::FileNotFound | ErrorType::NotFound) => StatusCode::NOT_FOUND,
        Some(ErrorType::FileTooLarge) => StatusCode::PAYLOAD_TOO_LARGE,
    }
}

/// Extraction result plus the request metadata the boundary echoes back
#[derive(Debug, Serialize)]
pub struct ExtractionEnvelope {
    #[serde(flatten)]
    result: ExtractionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    uploaded_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_path: Option<String>,
    timestamp: String,
}

impl ExtractionEnvelope {
    pub fn uploaded(result: ExtractionResult, filename: String) -> Self {
        Self {
            result,
            uploaded_filename: Some(filename),
            image_path: None,
            timestamp: timestamp(),
        }
    }

    pub fn by_path(result: ExtractionResult, image_path: String) -> Self {
        Self {
            result,
            uploaded_filename: None,
            image_path: Some(image_path),
            timestamp: timestamp(),
        }
    }
}

impl IntoResponse for ExtractionEnvelope {
    fn into_response(self) -> Response {
        (status_for(self.result.error_type()), Json(self)).into_response()
    }
}

/// Request rejected by the boundary before reaching the pipeline
#[derive(Debug)]
pub struct ApiError {
    error_type: ErrorType,
    message: String,
    details: Map<String, Value>,
}

impl ApiError {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Echo an extra key in the error body
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

impl From<&ExtractionError> for ApiError {
    fn from(e: &ExtractionError) -> Self {
        Self::new(e.error_type(), e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(Some(self.error_type));
        warn!("{}: {}", self.error_type.as_str(), self.message);

        let mut body = Map::new();
        body.insert("status".into(), "error".into());
        body.insert("error_type".into(), self.error_type.as_str().into());
        body.insert("error_message".into(), self.message.into());
        body.extend(self.details);
        body.insert("timestamp".into(), timestamp().into());

        (status, Json(Value::Object(body))).into_response()
    }
}
