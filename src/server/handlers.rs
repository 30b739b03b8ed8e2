//! Route handlers

use std::path::Path;

use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::response::{timestamp, ApiError, ExtractionEnvelope};
use super::AppState;
use crate::extraction::{ErrorType, ExtractionRequest};
use crate::vision::{ImageFormat, ImageInputError, RawImage, MAX_IMAGE_BYTES};

const SERVICE_NAME: &str = "idscan";

/// Service descriptor
pub async fn index() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "extract_upload": "/extract-upload (POST)",
            "extract_by_path": "/extract-by-path (POST)",
        },
        "documentation": "POST an image as the `file` field of a multipart form to /extract-upload",
    }))
}

/// Liveness plus extractor readiness; always 200
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let orchestrator = &state.orchestrator;
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "extractor_ready": orchestrator.is_ready(),
        "model": orchestrator.model(),
        "timestamp": timestamp(),
    }))
}

/// Unknown route
pub async fn not_found() -> ApiError {
    ApiError::new(ErrorType::NotFound, "Endpoint not found")
}

/// Multipart upload: `file` (required), `enhance` (optional)
pub async fn extract_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ExtractionEnvelope, ApiError> {
    if let Some(e) = state.orchestrator.initialization_error() {
        return Err(ApiError::from(e));
    }

    let mut multipart = multipart
        .map_err(|e| ApiError::new(ErrorType::BadRequest, format!("Expected a multipart form: {}", e)))?;

    let mut upload: Option<(Option<String>, Vec<u8>)> = None;
    let mut enhance = true;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                upload = Some((filename, data.to_vec()));
            }
            Some("enhance") => {
                let value = field.text().await.map_err(multipart_error)?;
                enhance = parse_enhance_flag(&value);
            }
            other => debug!("Ignoring form field {:?}", other),
        }
    }

    let Some((filename, data)) = upload else {
        return Err(ApiError::new(ErrorType::MissingFile, "No file provided in request"));
    };
    let filename = filename.unwrap_or_default();
    if filename.trim().is_empty() {
        return Err(ApiError::new(ErrorType::InvalidFilename, "Empty filename"));
    }

    let allowed = &state.server.allowed_extensions;
    let format = extension(&filename)
        .filter(|ext| allowed.iter().any(|a| a == ext))
        .and_then(|ext| ImageFormat::from_extension(&ext))
        .ok_or_else(|| {
            ApiError::new(
                ErrorType::InvalidFileType,
                format!("File type not allowed. Allowed: {}", allowed.join(", ")),
            )
            .with_detail("filename", filename.as_str())
        })?;

    let filename = sanitize_filename(&filename);
    if filename.is_empty() {
        return Err(ApiError::new(ErrorType::InvalidFilename, "Filename has no usable characters"));
    }

    let image = RawImage::new(data, format).map_err(input_error)?;
    info!("Processing uploaded file: {} ({} bytes, enhance={})", filename, image.data().len(), enhance);

    let result = state
        .orchestrator
        .process(ExtractionRequest::new(image).with_enhance(enhance))
        .await;
    Ok(ExtractionEnvelope::uploaded(result, filename))
}

#[derive(Debug, Deserialize)]
pub struct ByPathRequest {
    image_path: Option<String>,
    enhance: Option<Value>,
}

/// JSON body: `{"image_path": "...", "enhance": true}`
pub async fn extract_by_path(
    State(state): State<AppState>,
    body: Result<Json<ByPathRequest>, JsonRejection>,
) -> Result<ExtractionEnvelope, ApiError> {
    if let Some(e) = state.orchestrator.initialization_error() {
        return Err(ApiError::from(e));
    }

    let missing = || ApiError::new(ErrorType::MissingParameter, "Missing \"image_path\" in request body");
    let Json(body) = body.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large()
        } else {
            missing()
        }
    })?;
    let image_path = body.image_path.filter(|p| !p.trim().is_empty()).ok_or_else(missing)?;
    let enhance = json_enhance_flag(body.enhance.as_ref()).ok_or_else(|| {
        ApiError::new(ErrorType::BadRequest, "\"enhance\" must be a boolean, number or string")
    })?;

    let not_found = || {
        ApiError::new(ErrorType::FileNotFound, format!("Image not found at path: {}", image_path))
            .with_detail("image_path", image_path.as_str())
    };
    let path = Path::new(&image_path);
    let size = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => return Err(not_found()),
    };
    if size > MAX_IMAGE_BYTES as u64 {
        return Err(too_large().with_detail("image_path", image_path.as_str()));
    }
    let data = tokio::fs::read(path).await.map_err(|_| not_found())?;

    let format = extension(&image_path)
        .and_then(|ext| ImageFormat::from_extension(&ext))
        .or_else(|| ImageFormat::detect(&data))
        .ok_or_else(|| {
            ApiError::new(ErrorType::InvalidFileType, "Unrecognized image format")
                .with_detail("image_path", image_path.as_str())
        })?;
    let image = RawImage::new(data, format).map_err(input_error)?;

    info!("Processing image from path: {} (enhance={})", image_path, enhance);
    let result = state
        .orchestrator
        .process(ExtractionRequest::new(image).with_enhance(enhance))
        .await;
    Ok(ExtractionEnvelope::by_path(result, image_path))
}

/// `"true"` in any case enables enhancement; anything else disables it
fn parse_enhance_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// JSON `enhance`: absent or null means true, numbers are true when
/// non-zero. Arrays and objects are rejected.
fn json_enhance_flag(value: Option<&Value>) -> Option<bool> {
    match value {
        None | Some(Value::Null) => Some(true),
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::Number(n)) => Some(n.as_f64().is_some_and(|v| v != 0.0)),
        Some(Value::String(s)) => Some(parse_enhance_flag(s)),
        Some(_) => None,
    }
}

/// Lowercase extension after the last dot
fn extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Reduce a client-supplied filename to a safe basename: directory parts
/// dropped, whitespace turned into `_`, only ASCII letters, digits, `.`,
/// `_` and `-` kept, no leading or trailing dots/underscores.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                Some(c)
            } else {
                None
            }
        })
        .collect();
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

fn too_large() -> ApiError {
    ApiError::new(ErrorType::FileTooLarge, "File size exceeds the upload limit")
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large()
    } else {
        ApiError::new(ErrorType::BadRequest, format!("Malformed multipart body: {}", e.body_text()))
    }
}

fn input_error(e: ImageInputError) -> ApiError {
    match e {
        ImageInputError::Empty => ApiError::new(ErrorType::BadRequest, "Image file is empty"),
        ImageInputError::TooLarge { .. } => too_large(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\my card.png"), "my_card.png");
        assert_eq!(sanitize_filename("aadhaar (front)!.jpg"), "aadhaar_front.jpg");
        assert_eq!(sanitize_filename(".hidden.png"), "hidden.png");
        assert_eq!(sanitize_filename("???"), "");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("scan.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension("archive.tar.webp").as_deref(), Some("webp"));
        assert_eq!(extension("noext"), None);
        assert_eq!(extension("trailing."), None);
    }

    #[test]
    fn test_json_enhance_flag() {
        assert_eq!(json_enhance_flag(None), Some(true));
        assert_eq!(json_enhance_flag(Some(&Value::Null)), Some(true));
        assert_eq!(json_enhance_flag(Some(&json!(false))), Some(false));
        assert_eq!(json_enhance_flag(Some(&json!(1))), Some(true));
        assert_eq!(json_enhance_flag(Some(&json!(0))), Some(false));
        assert_eq!(json_enhance_flag(Some(&json!(0.0))), Some(false));
        assert_eq!(json_enhance_flag(Some(&json!(-2))), Some(true));
        assert_eq!(json_enhance_flag(Some(&json!("TRUE"))), Some(true));
        assert_eq!(json_enhance_flag(Some(&json!([true]))), None);
        assert_eq!(json_enhance_flag(Some(&json!({}))), None);
    }

    #[test]
    fn test_parse_enhance_flag() {
        assert!(parse_enhance_flag("true"));
        assert!(parse_enhance_flag("TRUE"));
        assert!(!parse_enhance_flag("false"));
        assert!(!parse_enhance_flag("1"));
        assert!(!parse_enhance_flag(""));
    }
}
