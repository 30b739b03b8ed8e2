//! Document image enhancement pipeline
//!
//! Stages run in a fixed order: conditional upscale, color-preserving
//! denoise, local contrast on lightness, sharpening, then JPEG encoding.
//! The output depends only on the input pixels and [`EnhancementSettings`].

use std::io::Cursor;
use std::time::Instant;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageReader, RgbImage};
use tracing::{debug, info};

use super::color::{lab_to_rgb, rgb_to_lab, LabPlanes};
use super::contrast::clahe;
use super::denoise::denoise_colored;
use super::resample::{scaled_dimensions, sharpen, upscale, upscale_factor};
use super::{EnhanceError, EnhanceOutcome, EnhancedImage, RawImage};
use crate::config::EnhancementSettings;

/// Deterministic image-quality enhancer
#[derive(Debug, Clone, Default)]
pub struct ImageEnhancer {
    settings: EnhancementSettings,
}

impl ImageEnhancer {
    /// Create an enhancer with the given parameters
    pub fn new(settings: EnhancementSettings) -> Self {
        Self { settings }
    }

    /// Enhance an image, falling back to the untouched input on any failure.
    ///
    /// The input is never modified. A fallback is reported as
    /// [`EnhanceOutcome::Unchanged`] so the caller can log it.
    pub fn enhance(&self, image: &RawImage) -> EnhanceOutcome {
        match self.try_enhance(image.data()) {
            Ok(enhanced) => EnhanceOutcome::Enhanced(enhanced),
            Err(reason) => EnhanceOutcome::Unchanged(reason),
        }
    }

    /// Run every stage, surfacing the first failure
    pub fn try_enhance(&self, data: &[u8]) -> Result<EnhancedImage, EnhanceError> {
        let start = Instant::now();
        let s = &self.settings;

        // Size checks run on the header so oversized images are never decoded
        let (width, height) = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| EnhanceError::Decode(e.to_string()))?
            .into_dimensions()
            .map_err(|e| EnhanceError::Decode(e.to_string()))?;
        if width == 0 || height == 0 {
            return Err(EnhanceError::EmptyRaster);
        }

        let scale = upscale_factor(width, height, s.upscale_below, s.upscale_target);
        let (out_w, out_h) = match scale {
            Some(scale) => scaled_dimensions(width, height, scale),
            None => (width, height),
        };
        let pixels = out_w as u64 * out_h as u64;
        if scale.is_some() && pixels > s.max_output_pixels {
            return Err(EnhanceError::TooLarge {
                width: out_w,
                height: out_h,
                limit: s.max_output_pixels,
            });
        }
        if pixels > s.max_denoise_pixels {
            return Err(EnhanceError::DenoiseLimit {
                width: out_w,
                height: out_h,
                limit: s.max_denoise_pixels,
            });
        }

        let decoded = image::load_from_memory(data).map_err(|e| EnhanceError::Decode(e.to_string()))?;
        let mut rgb = decoded.to_rgb8();
        if scale.is_some() {
            rgb = upscale(&rgb, out_w, out_h);
            info!("Upscaled image from {}x{} to {}x{}", width, height, out_w, out_h);
        }

        let lab = rgb_to_lab(&rgb);
        let lab = denoise_colored(
            &lab,
            s.denoise_luma,
            s.denoise_color,
            s.template_window,
            s.search_window,
        );
        let lab = equalize_lightness(lab, s.clahe_clip_limit, s.clahe_tiles);
        let rgb = lab_to_rgb(&lab);

        let sharpened = sharpen(&rgb, s.sharpen_center, s.sharpen_neighbor);
        let bytes = encode_jpeg(&sharpened, s.jpeg_quality)?;

        debug!(
            "Enhancement complete in {:?}: {}x{}, {} bytes",
            start.elapsed(),
            sharpened.width(),
            sharpened.height(),
            bytes.len()
        );

        Ok(EnhancedImage {
            data: bytes,
            width: sharpened.width(),
            height: sharpened.height(),
        })
    }
}

/// Apply CLAHE to the quantized lightness plane, leaving chroma alone
fn equalize_lightness(mut lab: LabPlanes, clip_limit: f32, tiles: u32) -> LabPlanes {
    let quantized: Vec<u8> = lab.l.iter().map(|v| v.round().clamp(0.0, 255.0) as u8).collect();
    let equalized = clahe(&quantized, lab.width, lab.height, clip_limit, tiles);
    lab.l = equalized.into_iter().map(f32::from).collect();
    lab
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, EnhanceError> {
    let mut buf = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder
        .encode_image(image)
        .map_err(|e| EnhanceError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::ImageFormat;
    use image::{ImageFormat as CodecFormat, Rgb};
    use std::time::Duration;

    /// Single-sample windows turn denoising into a no-op; for tests about
    /// sizing and encoding only
    fn fast_settings() -> EnhancementSettings {
        EnhancementSettings {
            template_window: 1,
            search_window: 1,
            ..EnhancementSettings::default()
        }
    }

    fn sample(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn encode(img: &RgbImage, format: CodecFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn raw(img: &RgbImage, format: CodecFormat, declared: ImageFormat) -> RawImage {
        RawImage::new(encode(img, format), declared).unwrap()
    }

    fn dims(data: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory(data).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn test_large_image_keeps_dimensions() {
        let enhancer = ImageEnhancer::new(fast_settings());
        let input = raw(&sample(1000, 1000), CodecFormat::Png, ImageFormat::Png);

        let EnhanceOutcome::Enhanced(out) = enhancer.enhance(&input) else {
            panic!("expected enhancement");
        };
        assert_eq!((out.width, out.height), (1000, 1000));
        assert_eq!(dims(&out.data), (1000, 1000));
    }

    #[test]
    fn test_small_image_upscaled_preserving_aspect() {
        let enhancer = ImageEnhancer::new(fast_settings());
        let input = raw(&sample(400, 300), CodecFormat::Png, ImageFormat::Png);

        let EnhanceOutcome::Enhanced(out) = enhancer.enhance(&input) else {
            panic!("expected enhancement");
        };
        assert!(out.width >= 1500 && out.height >= 1500);
        assert_eq!((out.width, out.height), (2000, 1500));
        let ratio_in = 400.0 / 300.0;
        let ratio_out = out.width as f64 / out.height as f64;
        assert!((ratio_in - ratio_out).abs() < 0.01);
    }

    #[test]
    fn test_output_is_always_jpeg() {
        let enhancer = ImageEnhancer::new(fast_settings());
        let img = sample(1000, 1000);
        let cases = [
            (CodecFormat::Png, ImageFormat::Png),
            (CodecFormat::Bmp, ImageFormat::Bmp),
            (CodecFormat::Tiff, ImageFormat::Tiff),
            (CodecFormat::WebP, ImageFormat::WebP),
            (CodecFormat::Jpeg, ImageFormat::Jpeg),
        ];
        for (codec, declared) in cases {
            let input = raw(&img, codec, declared);
            let EnhanceOutcome::Enhanced(out) = enhancer.enhance(&input) else {
                panic!("expected enhancement for {:?}", codec);
            };
            assert_eq!(image::guess_format(&out.data).unwrap(), CodecFormat::Jpeg);
        }
    }

    #[test]
    fn test_corrupt_input_falls_back() {
        let enhancer = ImageEnhancer::default();
        let input = RawImage::new(b"definitely not an image".to_vec(), ImageFormat::Png).unwrap();

        let outcome = enhancer.enhance(&input);
        assert!(matches!(outcome, EnhanceOutcome::Unchanged(EnhanceError::Decode(_))));
        assert_eq!(input.data(), b"definitely not an image");
    }

    #[test]
    fn test_oversized_upscale_falls_back() {
        let settings = EnhancementSettings {
            max_output_pixels: 1_000_000,
            ..fast_settings()
        };
        let enhancer = ImageEnhancer::new(settings);
        let input = raw(&sample(20, 10), CodecFormat::Png, ImageFormat::Png);

        let outcome = enhancer.enhance(&input);
        assert!(matches!(outcome, EnhanceOutcome::Unchanged(EnhanceError::TooLarge { .. })));
    }

    #[test]
    fn test_denoise_limit_falls_back() {
        let settings = EnhancementSettings {
            upscale_below: 1,
            max_denoise_pixels: 1_000,
            ..EnhancementSettings::default()
        };
        let enhancer = ImageEnhancer::new(settings);
        let input = raw(&sample(40, 40), CodecFormat::Png, ImageFormat::Png);

        let outcome = enhancer.enhance(&input);
        assert!(matches!(
            outcome,
            EnhanceOutcome::Unchanged(EnhanceError::DenoiseLimit { width: 40, height: 40, limit: 1_000 })
        ));
    }

    #[test]
    fn test_default_settings_on_id_card_photo() {
        // Noisy phone-style capture at a common ID-card resolution
        let mut state = 17u32;
        let photo = RgbImage::from_fn(1000, 630, |x, y| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let noise = (state >> 24) as i32 % 25 - 12;
            let base = if (x / 40 + y / 30) % 2 == 0 { 200 } else { 60 };
            let v = (base + noise).clamp(0, 255) as u8;
            Rgb([v, v.saturating_sub(10), v.saturating_add(5)])
        });
        let input = raw(&photo, CodecFormat::Jpeg, ImageFormat::Jpeg);
        let enhancer = ImageEnhancer::default();

        let start = Instant::now();
        let outcome = enhancer.enhance(&input);
        let elapsed = start.elapsed();

        let EnhanceOutcome::Enhanced(out) = outcome else {
            panic!("expected enhancement");
        };
        assert_eq!(out.height, 1500);
        assert!(out.width >= 2380 && out.width <= 2382);
        assert_eq!(dims(&out.data), (out.width, out.height));
        assert!(elapsed < Duration::from_secs(30), "enhancement took {:?}", elapsed);
    }

    #[test]
    fn test_deterministic_output() {
        let settings = EnhancementSettings {
            upscale_below: 10,
            template_window: 3,
            search_window: 5,
            ..EnhancementSettings::default()
        };
        let enhancer = ImageEnhancer::new(settings);
        let input = raw(&sample(48, 32), CodecFormat::Png, ImageFormat::Png);

        let a = enhancer.try_enhance(input.data()).unwrap();
        let b = enhancer.try_enhance(input.data()).unwrap();
        assert_eq!(a.data, b.data);
        assert_eq!((a.width, a.height), (48, 32));
    }

    #[test]
    fn test_default_windows_on_small_raster() {
        let settings = EnhancementSettings {
            upscale_below: 1,
            ..EnhancementSettings::default()
        };
        let enhancer = ImageEnhancer::new(settings);
        let input = raw(&sample(24, 16), CodecFormat::Png, ImageFormat::Png);

        let out = enhancer.try_enhance(input.data()).unwrap();
        assert_eq!(dims(&out.data), (24, 16));
    }
}
