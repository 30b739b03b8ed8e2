//! Extraction Layer
//!
//! Turns one identity document image into a normalized field record by
//! way of a vision-capable chat model.

pub mod client;
pub mod fields;
pub mod orchestrator;
pub mod result;
pub mod template;

pub use client::{ExtractionClient, VisionModelClient};
pub use orchestrator::{ExtractionOrchestrator, ExtractionRequest};
pub use result::{ErrorType, ExtractionResult};
pub use template::InstructionTemplate;

use thiserror::Error;

/// Failure while obtaining fields from the model
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// Extraction capability could not be constructed
    #[error("extractor not initialized: {0}")]
    Initialization(String),
    /// Transport, authentication, timeout or malformed API envelope
    #[error("vision service request failed: {0}")]
    ExternalService(String),
    /// The model replied, but not with a JSON object
    #[error("model response is not valid JSON: {0}")]
    JsonParse(String),
    /// Anything else inside the pipeline
    #[error("{0}")]
    Internal(String),
}

impl ExtractionError {
    /// Error kind reported to callers
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::Initialization(_) => ErrorType::InitializationError,
            Self::ExternalService(_) => ErrorType::ExternalServiceError,
            Self::JsonParse(_) => ErrorType::JsonParseError,
            Self::Internal(_) => ErrorType::ExtractionError,
        }
    }
}
