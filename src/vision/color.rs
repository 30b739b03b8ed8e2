//! sRGB <-> CIE L*a*b* conversion
//!
//! Planes use the 8-bit Lab convention: L scaled to 0..255, a and b offset
//! by 128. Values are kept as `f32` between stages to avoid re-quantizing.

use image::{Rgb, RgbImage};

const WHITE_X: f32 = 0.950_456;
const WHITE_Z: f32 = 1.088_754;
const EPSILON: f32 = 0.008_856;
const KAPPA: f32 = 7.787;
const OFFSET: f32 = 16.0 / 116.0;

/// Planar L*a*b* image
#[derive(Debug, Clone, PartialEq)]
pub struct LabPlanes {
    pub width: u32,
    pub height: u32,
    /// Lightness, 0..255
    pub l: Vec<f32>,
    /// Green-red axis, 128 = neutral
    pub a: Vec<f32>,
    /// Blue-yellow axis, 128 = neutral
    pub b: Vec<f32>,
}

fn srgb_to_linear_table() -> [f32; 256] {
    let mut table = [0.0f32; 256];
    for (i, v) in table.iter_mut().enumerate() {
        let c = i as f32 / 255.0;
        *v = if c <= 0.040_45 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        };
    }
    table
}

fn linear_to_srgb(c: f32) -> u8 {
    let c = c.clamp(0.0, 1.0);
    let v = if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

fn f(t: f32) -> f32 {
    if t > EPSILON {
        t.cbrt()
    } else {
        KAPPA * t + OFFSET
    }
}

fn f_inv(t: f32) -> f32 {
    let cube = t * t * t;
    if cube > EPSILON {
        cube
    } else {
        (t - OFFSET) / KAPPA
    }
}

/// Convert an RGB image to L*a*b* planes
pub fn rgb_to_lab(image: &RgbImage) -> LabPlanes {
    let (width, height) = image.dimensions();
    let n = (width as usize) * (height as usize);
    let table = srgb_to_linear_table();

    let mut l = Vec::with_capacity(n);
    let mut a = Vec::with_capacity(n);
    let mut b = Vec::with_capacity(n);

    for Rgb([r8, g8, b8]) in image.pixels() {
        let r = table[*r8 as usize];
        let g = table[*g8 as usize];
        let bl = table[*b8 as usize];

        let x = (0.412_453 * r + 0.357_580 * g + 0.180_423 * bl) / WHITE_X;
        let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * bl;
        let z = (0.019_334 * r + 0.119_193 * g + 0.950_227 * bl) / WHITE_Z;

        let fx = f(x);
        let fy = f(y);
        let fz = f(z);

        l.push((116.0 * fy - 16.0) * 255.0 / 100.0);
        a.push(500.0 * (fx - fy) + 128.0);
        b.push(200.0 * (fy - fz) + 128.0);
    }

    LabPlanes { width, height, l, a, b }
}

/// Convert L*a*b* planes back to an RGB image
pub fn lab_to_rgb(lab: &LabPlanes) -> RgbImage {
    let mut out = RgbImage::new(lab.width, lab.height);

    for (i, pixel) in out.pixels_mut().enumerate() {
        let l = lab.l[i] * 100.0 / 255.0;
        let a = lab.a[i] - 128.0;
        let b = lab.b[i] - 128.0;

        let fy = (l + 16.0) / 116.0;
        let fx = fy + a / 500.0;
        let fz = fy - b / 200.0;

        let x = f_inv(fx) * WHITE_X;
        let y = f_inv(fy);
        let z = f_inv(fz) * WHITE_Z;

        let r = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
        let g = -0.969_256 * x + 1.875_992 * y + 0.041_556 * z;
        let bl = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;

        *pixel = Rgb([linear_to_srgb(r), linear_to_srgb(g), linear_to_srgb(bl)]);
    }

    out
}
