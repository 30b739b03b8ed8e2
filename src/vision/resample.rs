//! Geometric and convolution stages: conditional upscaling and sharpening

use image::imageops::{self, FilterType};
use image::RgbImage;
use imageproc::filter::filter3x3;

/// Uniform scale factor for an image with a side below `below` pixels.
///
/// Returns `None` when both sides are already at least `below`. Otherwise
/// the factor makes the shorter side reach `target`.
pub fn upscale_factor(width: u32, height: u32, below: u32, target: u32) -> Option<f64> {
    if width >= below && height >= below {
        return None;
    }
    let target = target as f64;
    Some((target / height as f64).max(target / width as f64))
}

/// Output dimensions for a uniform `scale`
pub fn scaled_dimensions(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let w = (width as f64 * scale).round().max(1.0) as u32;
    let h = (height as f64 * scale).round().max(1.0) as u32;
    (w, h)
}

/// Resize with cubic (Catmull-Rom) interpolation
pub fn upscale(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    imageops::resize(image, width, height, FilterType::CatmullRom)
}

/// Edge boost with a plus-shaped 3x3 kernel; corners are zero
pub fn sharpen(image: &RgbImage, center: f32, neighbor: f32) -> RgbImage {
    #[rustfmt::skip]
    let kernel = [
        0.0,      neighbor, 0.0,
        neighbor, center,   neighbor,
        0.0,      neighbor, 0.0,
    ];
    filter3x3::<_, f32, u8>(image, &kernel)
}
