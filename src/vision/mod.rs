//! Vision Layer
//!
//! Image types and the deterministic enhancement pipeline applied before a
//! document image is sent for extraction:
//! - conditional cubic upscaling of low-resolution scans
//! - non-local means denoising in L*a*b*
//! - CLAHE on the lightness channel
//! - plus-kernel sharpening and JPEG re-encoding

pub mod color;
pub mod contrast;
pub mod denoise;
pub mod enhance;
pub mod resample;

pub use enhance::ImageEnhancer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest accepted input image
pub const MAX_IMAGE_BYTES: usize = 16 * 1024 * 1024;

/// Declared encoding of an input image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Bmp,
    Tiff,
    WebP,
}

impl ImageFormat {
    /// Map a file extension (without dot, any case) to a format
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Sniff the format from the leading bytes
    pub fn detect(data: &[u8]) -> Option<Self> {
        match image::guess_format(data).ok()? {
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Bmp => Some(Self::Bmp),
            image::ImageFormat::Tiff => Some(Self::Tiff),
            image::ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }

    /// MIME type used in data URLs
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::WebP => "image/webp",
        }
    }
}

/// Input image rejected before any processing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageInputError {
    #[error("image is empty")]
    Empty,
    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// Image bytes as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    data: Vec<u8>,
    format: ImageFormat,
}

impl RawImage {
    /// Wrap caller bytes, enforcing the size bounds
    pub fn new(data: Vec<u8>, format: ImageFormat) -> Result<Self, ImageInputError> {
        if data.is_empty() {
            return Err(ImageInputError::Empty);
        }
        if data.len() > MAX_IMAGE_BYTES {
            return Err(ImageInputError::TooLarge {
                size: data.len(),
                limit: MAX_IMAGE_BYTES,
            });
        }
        Ok(Self { data, format })
    }

    /// Raw encoded bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Declared format
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Output of a successful enhancement, always JPEG
#[derive(Debug, Clone)]
pub struct EnhancedImage {
    /// JPEG bytes
    pub data: Vec<u8>,
    /// Output width
    pub width: u32,
    /// Output height
    pub height: u32,
}

impl EnhancedImage {
    pub const FORMAT: ImageFormat = ImageFormat::Jpeg;
}

/// Failure inside the enhancement pipeline
#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("cannot decode image: {0}")]
    Decode(String),
    #[error("image has no pixels")]
    EmptyRaster,
    #[error("upscaled image would be {width}x{height}, above the {limit} pixel limit")]
    TooLarge { width: u32, height: u32, limit: u64 },
    #[error("image is {width}x{height}, above the {limit} pixel denoise limit")]
    DenoiseLimit { width: u32, height: u32, limit: u64 },
    #[error("cannot encode enhanced image: {0}")]
    Encode(String),
}

/// Result of running the enhancer on one image
#[derive(Debug)]
pub enum EnhanceOutcome {
    /// Every stage succeeded
    Enhanced(EnhancedImage),
    /// A stage failed; the original image should be used as-is
    Unchanged(EnhanceError),
}
