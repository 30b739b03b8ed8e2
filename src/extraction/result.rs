//! Extraction response envelope

use serde::{Deserialize, Serialize};

use super::fields::DocumentFields;

/// Name of the extraction path reported in every result
pub const METHOD: &str = "vision_llm_direct";

/// Outcome of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
}

/// Machine-readable failure kind carried in error envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Extraction capability could not be constructed at startup
    InitializationError,
    /// Model reply was not a JSON object
    JsonParseError,
    /// Any other failure inside the pipeline
    ExtractionError,
    /// Transport or authentication failure talking to the model
    ExternalServiceError,
    MissingFile,
    InvalidFilename,
    InvalidFileType,
    FileNotFound,
    MissingParameter,
    FileTooLarge,
    BadRequest,
    NotFound,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitializationError => "initialization_error",
            Self::JsonParseError => "json_parse_error",
            Self::ExtractionError => "extraction_error",
            Self::ExternalServiceError => "external_service_error",
            Self::MissingFile => "missing_file",
            Self::InvalidFilename => "invalid_filename",
            Self::InvalidFileType => "invalid_file_type",
            Self::FileNotFound => "file_not_found",
            Self::MissingParameter => "missing_parameter",
            Self::FileTooLarge => "file_too_large",
            Self::BadRequest => "bad_request",
            Self::NotFound => "not_found",
        }
    }
}

/// `{}` on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmptyObject {}

/// Extracted fields, or an empty object on failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExtractedData {
    Fields(DocumentFields),
    Empty(EmptyObject),
}

/// Result of one extraction request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_type: Option<ErrorType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    processing_time_seconds: Option<f64>,
    extracted_data: ExtractedData,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail_level: Option<String>,
}

impl ExtractionResult {
    /// Successful extraction
    pub fn success(
        fields: DocumentFields,
        processing_time_seconds: f64,
        model_used: impl Into<String>,
        detail_level: impl Into<String>,
    ) -> Self {
        Self {
            status: Status::Success,
            error_type: None,
            error_message: None,
            method: METHOD,
            processing_time_seconds: Some(processing_time_seconds.max(0.0)),
            extracted_data: ExtractedData::Fields(fields),
            model_used: Some(model_used.into()),
            detail_level: Some(detail_level.into()),
        }
    }

    /// Failed extraction. `processing_time_seconds` is `None` when the
    /// request never reached the pipeline.
    pub fn failure(
        error_type: ErrorType,
        message: impl Into<String>,
        processing_time_seconds: Option<f64>,
    ) -> Self {
        Self {
            status: Status::Error,
            error_type: Some(error_type),
            error_message: Some(message.into()),
            method: METHOD,
            processing_time_seconds: processing_time_seconds.map(|t| t.max(0.0)),
            extracted_data: ExtractedData::Empty(EmptyObject {}),
            model_used: None,
            detail_level: None,
        }
    }

    pub fn error_type(&self) -> Option<ErrorType> {
        self.error_type
    }
}

#[cfg(test)]
impl ExtractionResult {
    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn processing_time_seconds(&self) -> Option<f64> {
        self.processing_time_seconds
    }

    /// Extracted fields, `None` on failure
    pub fn fields(&self) -> Option<&DocumentFields> {
        match &self.extracted_data {
            ExtractedData::Fields(fields) => Some(fields),
            ExtractedData::Empty(_) => None,
        }
    }
}

/// Round seconds to two decimals
pub fn round_seconds(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
