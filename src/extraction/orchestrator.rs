//! Extraction orchestration
//!
//! Runs one request end to end: optional enhancement, a scoped scratch copy
//! of the enhanced image, the model call, and normalization into an
//! [`ExtractionResult`]. Every failure becomes an error result; nothing is
//! raised past [`ExtractionOrchestrator::process`].
//!
//! The scratch copy exists only so the enhanced image can be inspected on
//! disk while its model call is in flight. The payload itself is sent from
//! memory, and a failed scratch write does not affect the request.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::client::{ExtractionClient, ImagePayload};
use super::fields::DocumentFields;
use super::result::{round_seconds, ExtractionResult};
use super::template::InstructionTemplate;
use super::ExtractionError;
use crate::storage::{ScratchArtifact, ScratchDir};
use crate::vision::{EnhanceOutcome, EnhancedImage, ImageEnhancer, ImageFormat, RawImage};

/// One image to extract fields from
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub image: RawImage,
    /// Run the enhancement pipeline before extraction
    pub enhance: bool,
}

impl ExtractionRequest {
    /// Request with enhancement enabled
    pub fn new(image: RawImage) -> Self {
        Self { image, enhance: true }
    }

    pub fn with_enhance(mut self, enhance: bool) -> Self {
        self.enhance = enhance;
        self
    }
}

/// Image bytes as they will be sent to the model
struct PreparedImage {
    data: Vec<u8>,
    format: ImageFormat,
    enhanced: bool,
}

impl PreparedImage {
    fn original(image: RawImage) -> Self {
        // Trust the bytes over the declared extension for the MIME type
        let format = ImageFormat::detect(image.data()).unwrap_or(image.format());
        Self {
            data: image.into_data(),
            format,
            enhanced: false,
        }
    }

    fn from_enhanced(image: EnhancedImage) -> Self {
        Self {
            data: image.data,
            format: EnhancedImage::FORMAT,
            enhanced: true,
        }
    }

    fn payload(&self) -> ImagePayload<'_> {
        ImagePayload {
            data: &self.data,
            format: self.format,
        }
    }
}

/// Composes the enhancer and the extraction client
pub struct ExtractionOrchestrator {
    extractor: Result<Arc<dyn ExtractionClient>, ExtractionError>,
    enhancer: Arc<ImageEnhancer>,
    template: InstructionTemplate,
    scratch: ScratchDir,
}

impl ExtractionOrchestrator {
    /// `extractor` is the outcome of building the client at startup. A
    /// construction failure is kept and reported on every request.
    pub fn new(
        extractor: Result<Arc<dyn ExtractionClient>, ExtractionError>,
        enhancer: ImageEnhancer,
        template: InstructionTemplate,
        scratch: ScratchDir,
    ) -> Self {
        Self {
            extractor,
            enhancer: Arc::new(enhancer),
            template,
            scratch,
        }
    }

    /// Whether the extraction client was constructed
    pub fn is_ready(&self) -> bool {
        self.extractor.is_ok()
    }

    /// Startup failure, if any
    pub fn initialization_error(&self) -> Option<&ExtractionError> {
        self.extractor.as_ref().err()
    }

    /// Model identifier, when ready
    pub fn model(&self) -> Option<&str> {
        self.extractor.as_ref().ok().map(|client| client.model())
    }

    /// Process one request into exactly one result
    pub async fn process(&self, request: ExtractionRequest) -> ExtractionResult {
        let extractor = match &self.extractor {
            Ok(client) => Arc::clone(client),
            Err(e) => return ExtractionResult::failure(e.error_type(), e.to_string(), None),
        };

        let start = Instant::now();
        let outcome = self.run(extractor.as_ref(), request).await;
        let elapsed = round_seconds(start.elapsed().as_secs_f64());

        match outcome {
            Ok(fields) => {
                info!(
                    "Extraction successful in {:.2}s - type: {}, {} fields",
                    elapsed,
                    fields.document_type.map(|t| t.as_str()).unwrap_or("none"),
                    fields.populated()
                );
                ExtractionResult::success(fields, elapsed, extractor.model(), extractor.detail())
            }
            Err(e) => {
                error!("Extraction failed after {:.2}s: {}", elapsed, e);
                ExtractionResult::failure(e.error_type(), e.to_string(), Some(elapsed))
            }
        }
    }

    async fn run(
        &self,
        extractor: &dyn ExtractionClient,
        request: ExtractionRequest,
    ) -> Result<DocumentFields, ExtractionError> {
        let ExtractionRequest { image, enhance } = request;

        let prepared = if enhance {
            self.enhance(image).await?
        } else {
            debug!("Enhancement disabled, sending original image");
            PreparedImage::original(image)
        };

        // Lives until the end of this call, on every exit path
        let _artifact = if prepared.enhanced {
            self.stage(&prepared)
        } else {
            None
        };

        let response = extractor.extract(prepared.payload(), &self.template).await?;
        Ok(DocumentFields::from_model_output(&response.content))
    }

    async fn enhance(&self, image: RawImage) -> Result<PreparedImage, ExtractionError> {
        let enhancer = Arc::clone(&self.enhancer);
        let (image, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = enhancer.enhance(&image);
            (image, outcome)
        })
        .await
        .map_err(|e| ExtractionError::Internal(format!("image enhancement task failed: {}", e)))?;

        Ok(match outcome {
            EnhanceOutcome::Enhanced(enhanced) => {
                debug!(
                    "Enhanced image: {}x{}, {} bytes",
                    enhanced.width,
                    enhanced.height,
                    enhanced.data.len()
                );
                PreparedImage::from_enhanced(enhanced)
            }
            EnhanceOutcome::Unchanged(reason) => {
                warn!("Image enhancement failed, using original image: {}", reason);
                PreparedImage::original(image)
            }
        })
    }

    fn stage(&self, prepared: &PreparedImage) -> Option<ScratchArtifact> {
        match self.scratch.persist(&prepared.data, "jpg") {
            Ok(artifact) => {
                debug!("Staged enhanced image at {:?}", artifact.path());
                Some(artifact)
            }
            Err(e) => {
                warn!("Could not stage enhanced image: {:#}", e);
                None
            }
        }
    }
}
