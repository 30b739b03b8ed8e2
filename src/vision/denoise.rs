//! Non-local means denoising
//!
//! Each output pixel is a weighted average of the pixels in its search
//! window, weighted by how similar the surrounding template patches are.
//! Patch distances are computed per search offset with running window sums,
//! so cost grows with the search area but not with the template area.
//! Rows are split into bands that are denoised in parallel.

use rayon::prelude::*;

use super::color::LabPlanes;

/// Output rows handled by one parallel work item
const BAND_ROWS: usize = 64;

/// Entries in the distance-to-weight table
const WEIGHT_TABLE_LEN: usize = 4096;

/// Weights below this are treated as zero
const MIN_WEIGHT: f64 = 1e-4;

/// Parameters for one non-local means pass
#[derive(Debug, Clone, Copy)]
pub struct NlMeansParams {
    /// Filter strength. Larger values remove more noise and more detail.
    pub h: f32,
    /// Side of the compared patch (odd)
    pub template_window: u32,
    /// Side of the searched neighbourhood (odd)
    pub search_window: u32,
}

/// `exp(-d / h²)` sampled over mean patch distances up to where it drops
/// below [`MIN_WEIGHT`]
struct WeightTable {
    weights: Vec<f32>,
    /// Converts a summed patch distance into a table index
    scale: f64,
}

impl WeightTable {
    fn new(h: f32, template_area: usize) -> Self {
        let h2 = f64::from(h) * f64::from(h);
        let max_dist = h2 * (1.0 / MIN_WEIGHT).ln();
        let bin = max_dist / WEIGHT_TABLE_LEN as f64;
        let weights = (0..WEIGHT_TABLE_LEN)
            .map(|i| (-(i as f64 * bin) / h2).exp() as f32)
            .collect();
        Self {
            weights,
            scale: 1.0 / (bin * template_area as f64),
        }
    }

    #[inline]
    fn weight(&self, patch_sum: f64) -> f32 {
        // Negative drift saturates to index 0
        let index = (patch_sum * self.scale) as usize;
        self.weights.get(index).copied().unwrap_or(0.0)
    }
}

/// Replicate-padded planes plus the window geometry shared by every band
struct Padded {
    planes: Vec<Vec<f32>>,
    width: usize,
    stride: usize,
    tr: usize,
    sr: usize,
}

/// Denoise a group of planes that share patch weights.
///
/// All planes must have `width * height` samples. Borders are replicated.
pub fn nl_means(planes: &[&[f32]], width: u32, height: u32, params: NlMeansParams) -> Vec<Vec<f32>> {
    let w = width as usize;
    let h = height as usize;
    let channels = planes.len();

    if channels == 0 || w == 0 || h == 0 || params.h <= 0.0 {
        return planes.iter().map(|p| p.to_vec()).collect();
    }

    let tr = (params.template_window / 2) as usize;
    let sr = (params.search_window / 2) as usize;
    let pad = tr + sr;
    let padded = Padded {
        planes: planes.iter().map(|p| pad_replicate(p, w, h, pad)).collect(),
        width: w,
        stride: w + 2 * pad,
        tr,
        sr,
    };

    let t = 2 * tr + 1;
    let table = WeightTable::new(params.h, t * t * channels);

    // Pixel-interleaved so that each band owns one contiguous chunk
    let mut interleaved = vec![0.0f32; w * h * channels];
    interleaved
        .par_chunks_mut(BAND_ROWS * w * channels)
        .enumerate()
        .for_each(|(band, chunk)| {
            let rows = chunk.len() / (w * channels);
            denoise_band(&padded, &table, band * BAND_ROWS, rows, chunk);
        });

    (0..channels)
        .map(|c| interleaved.iter().skip(c).step_by(channels).copied().collect())
        .collect()
}

/// Denoise output rows `y0..y0 + rows` into `out` (pixel-interleaved)
fn denoise_band(padded: &Padded, table: &WeightTable, y0: usize, rows: usize, out: &mut [f32]) {
    let planes = &padded.planes;
    let (w, stride, tr, sr) = (padded.width, padded.stride, padded.tr, padded.sr);
    let channels = planes.len();
    let pad = tr + sr;
    let t = 2 * tr + 1;

    // Squared differences cover every template sample of every band pixel
    let dw = w + 2 * tr;
    let dh = rows + 2 * tr;
    let mut diff = vec![0.0f32; dw * dh];
    let mut column = vec![0.0f64; dw];
    let mut prefix = vec![0.0f64; dw + 1];
    let mut row_weights = vec![0.0f32; w];

    let mut weight_sum = vec![0.0f32; rows * w];
    let mut value_sum = vec![vec![0.0f32; rows * w]; channels];

    let radius = sr as isize;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            for yy in 0..dh {
                let py = y0 + yy + sr;
                let qy = (py as isize + dy) as usize;
                let p_start = py * stride + sr;
                let q_start = ((qy * stride + sr) as isize + dx) as usize;

                let row = &mut diff[yy * dw..(yy + 1) * dw];
                row.fill(0.0);
                for plane in planes {
                    let p = &plane[p_start..p_start + dw];
                    let q = &plane[q_start..q_start + dw];
                    for ((d, a), b) in row.iter_mut().zip(p).zip(q) {
                        let e = a - b;
                        *d += e * e;
                    }
                }
            }

            column.fill(0.0);
            for yy in 0..t {
                for (c, d) in column.iter_mut().zip(&diff[yy * dw..(yy + 1) * dw]) {
                    *c += f64::from(*d);
                }
            }

            for y in 0..rows {
                if y > 0 {
                    let entering = &diff[(y + t - 1) * dw..(y + t) * dw];
                    let leaving = &diff[(y - 1) * dw..y * dw];
                    for ((c, a), s) in column.iter_mut().zip(entering).zip(leaving) {
                        *c += f64::from(*a) - f64::from(*s);
                    }
                }
                for x in 0..dw {
                    prefix[x + 1] = prefix[x] + column[x];
                }
                for (x, weight) in row_weights.iter_mut().enumerate() {
                    *weight = table.weight(prefix[x + t] - prefix[x]);
                }

                let band_row = y * w..(y + 1) * w;
                for (s, weight) in weight_sum[band_row.clone()].iter_mut().zip(&row_weights) {
                    *s += weight;
                }

                let qy = ((y0 + y + pad) as isize + dy) as usize;
                let q_start = ((qy * stride + pad) as isize + dx) as usize;
                for (plane, values) in planes.iter().zip(value_sum.iter_mut()) {
                    let q = &plane[q_start..q_start + w];
                    for ((v, weight), sample) in values[band_row.clone()].iter_mut().zip(&row_weights).zip(q) {
                        *v += weight * sample;
                    }
                }
            }
        }
    }

    // The zero offset always contributes weight 1, so sums are positive
    for (i, wsum) in weight_sum.iter().enumerate() {
        for (c, values) in value_sum.iter().enumerate() {
            out[i * channels + c] = values[i] / wsum;
        }
    }
}

/// Denoise lightness and chroma separately, each with its own strength
pub fn denoise_colored(
    lab: &LabPlanes,
    luma_strength: f32,
    color_strength: f32,
    template_window: u32,
    search_window: u32,
) -> LabPlanes {
    let luma = NlMeansParams {
        h: luma_strength,
        template_window,
        search_window,
    };
    let chroma = NlMeansParams {
        h: color_strength,
        ..luma
    };

    let mut l = nl_means(&[lab.l.as_slice()], lab.width, lab.height, luma);
    let mut ab = nl_means(&[lab.a.as_slice(), lab.b.as_slice()], lab.width, lab.height, chroma);

    let b = ab.pop().unwrap_or_default();
    let a = ab.pop().unwrap_or_default();

    LabPlanes {
        width: lab.width,
        height: lab.height,
        l: l.pop().unwrap_or_default(),
        a,
        b,
    }
}

fn pad_replicate(plane: &[f32], w: usize, h: usize, pad: usize) -> Vec<f32> {
    let pw = w + 2 * pad;
    let ph = h + 2 * pad;
    let mut out = Vec::with_capacity(pw * ph);
    for py in 0..ph {
        let sy = py.saturating_sub(pad).min(h - 1);
        for px in 0..pw {
            let sx = px.saturating_sub(pad).min(w - 1);
            out.push(plane[sy * w + sx]);
        }
    }
    out
}
