//! Contrast-limited adaptive histogram equalization (CLAHE)
//!
//! The plane is split into a grid of tiles, each tile gets its own clipped
//! histogram-equalization lookup table, and every pixel is mapped through a
//! bilinear blend of the four nearest tile tables.

const BINS: usize = 256;

/// Equalize an 8-bit plane with a clip limit and a `tiles x tiles` grid
pub fn clahe(plane: &[u8], width: u32, height: u32, clip_limit: f32, tiles: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 {
        return plane.to_vec();
    }

    let tiles_x = (tiles.max(1) as usize).min(w);
    let tiles_y = (tiles.max(1) as usize).min(h);

    let bounds = |i: usize, n: usize, len: usize| (i * len / n, (i + 1) * len / n);

    let mut luts = vec![[0u8; BINS]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        let (y0, y1) = bounds(ty, tiles_y, h);
        for tx in 0..tiles_x {
            let (x0, x1) = bounds(tx, tiles_x, w);

            let mut hist = [0u32; BINS];
            for y in y0..y1 {
                for &v in &plane[y * w + x0..y * w + x1] {
                    hist[v as usize] += 1;
                }
            }

            let area = ((y1 - y0) * (x1 - x0)) as u32;
            if clip_limit > 0.0 {
                let limit = ((clip_limit * area as f32 / BINS as f32) as u32).max(1);
                clip_histogram(&mut hist, limit);
            }
            luts[ty * tiles_x + tx] = equalization_lut(&hist, area);
        }
    }

    let inv_tw = tiles_x as f32 / w as f32;
    let inv_th = tiles_y as f32 / h as f32;
    let mut out = vec![0u8; w * h];

    for y in 0..h {
        let tyf = y as f32 * inv_th - 0.5;
        let ty1 = tyf.floor() as isize;
        let ya = tyf - ty1 as f32;
        let ty2 = (ty1 + 1).min(tiles_y as isize - 1).max(0) as usize;
        let ty1 = ty1.max(0) as usize;

        for x in 0..w {
            let txf = x as f32 * inv_tw - 0.5;
            let tx1 = txf.floor() as isize;
            let xa = txf - tx1 as f32;
            let tx2 = (tx1 + 1).min(tiles_x as isize - 1).max(0) as usize;
            let tx1 = tx1.max(0) as usize;

            let v = plane[y * w + x] as usize;
            let top = luts[ty1 * tiles_x + tx1][v] as f32 * (1.0 - xa)
                + luts[ty1 * tiles_x + tx2][v] as f32 * xa;
            let bottom = luts[ty2 * tiles_x + tx1][v] as f32 * (1.0 - xa)
                + luts[ty2 * tiles_x + tx2][v] as f32 * xa;

            out[y * w + x] = (top * (1.0 - ya) + bottom * ya).round().clamp(0.0, 255.0) as u8;
        }
    }

    out
}

/// Clip bins at `limit` and spread the excess evenly over all bins
fn clip_histogram(hist: &mut [u32; BINS], limit: u32) {
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }

    let batch = excess / BINS as u32;
    let mut residual = excess % BINS as u32;
    for bin in hist.iter_mut() {
        *bin += batch;
    }

    if residual > 0 {
        let step = (BINS / residual as usize).max(1);
        for bin in hist.iter_mut().step_by(step) {
            if residual == 0 {
                break;
            }
            *bin += 1;
            residual -= 1;
        }
    }
}

fn equalization_lut(hist: &[u32; BINS], area: u32) -> [u8; BINS] {
    let mut lut = [0u8; BINS];
    if area == 0 {
        return lut;
    }
    let scale = (BINS - 1) as f32 / area as f32;
    let mut sum = 0u32;
    for (i, &count) in hist.iter().enumerate() {
        sum += count;
        lut[i] = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_size_matches_input() {
        let plane: Vec<u8> = (0..37 * 23).map(|i| (i % 256) as u8).collect();
        let out = clahe(&plane, 37, 23, 2.5, 8);
        assert_eq!(out.len(), plane.len());
    }

    #[test]
    fn test_stretches_low_contrast_plane() {
        // Values packed into 100..=115 should spread out
        let w = 64;
        let h = 64;
        let plane: Vec<u8> = (0..w * h).map(|i| 100 + ((i * 7) % 16) as u8).collect();
        let out = clahe(&plane, w as u32, h as u32, 40.0, 8);

        let in_range = 115 - 100;
        let min = *out.iter().min().unwrap() as i32;
        let max = *out.iter().max().unwrap() as i32;
        assert!(max - min > in_range);
    }

    #[test]
    fn test_clip_limit_bounds_stretching() {
        let w = 64;
        let h = 64;
        let plane: Vec<u8> = (0..w * h).map(|i| 100 + ((i * 7) % 16) as u8).collect();
        let strong = clahe(&plane, w as u32, h as u32, 40.0, 8);
        let mild = clahe(&plane, w as u32, h as u32, 1.0, 8);

        let spread = |p: &[u8]| *p.iter().max().unwrap() as i32 - *p.iter().min().unwrap() as i32;
        assert!(spread(&mild) < spread(&strong));
    }

    #[test]
    fn test_clip_histogram_conserves_mass() {
        let mut hist = [0u32; BINS];
        hist[10] = 1000;
        hist[20] = 5;
        clip_histogram(&mut hist, 50);
        assert_eq!(hist.iter().sum::<u32>(), 1005);
        assert!(hist[10] <= 50 + 1000 / BINS as u32 + 1);
    }

    #[test]
    fn test_tiny_plane() {
        let out = clahe(&[128], 1, 1, 2.5, 8);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_deterministic() {
        let plane: Vec<u8> = (0..50 * 40).map(|i| ((i * 31) % 251) as u8).collect();
        let a = clahe(&plane, 50, 40, 2.5, 8);
        let b = clahe(&plane, 50, 40, 2.5, 8);
        assert_eq!(a, b);
    }
}
