// ============================================================================
// EDGE FILTERS - luma smoothing, Sobel gradients, Canny edge map
// ============================================================================

use std::collections::VecDeque;

use image::{GrayImage, Luma};
use rayon::prelude::*;

use crate::canvas::PixelBuffer;

/// Fixed-point scale of [`gaussian_blur_luma`] output (5-tap binomial per
/// axis, 16 × 16).
pub const BLUR_SCALE: i32 = 256;

const BINOMIAL_5: [i32; 5] = [1, 4, 6, 4, 1];

/// Rec. 601 luma, rounded to the nearest integer.
pub fn luma(image: &PixelBuffer) -> GrayImage {
    let (w, h) = image.dimensions();
    let src = image.as_raw();
    let mut out = GrayImage::new(w, h);
    let stride = w as usize;
    let dst: &mut [u8] = &mut out;
    dst.par_chunks_mut(stride.max(1)).enumerate().for_each(|(y, row)| {
        for (x, v) in row.iter_mut().enumerate() {
            let o = (y * stride + x) * 4;
            let l = 299 * src[o] as u32 + 587 * src[o + 1] as u32 + 114 * src[o + 2] as u32;
            *v = ((l + 500) / 1000) as u8;
        }
    });
    out
}

/// Smooth the luma channel with a separable 5-tap binomial kernel (a
/// σ ≈ 1 Gaussian). Borders clamp to the edge.
///
/// Integer arithmetic keeps a symmetric step edge exactly symmetric after
/// smoothing, so gradient ties downstream are exact ties.
pub fn gaussian_blur_luma(image: &PixelBuffer) -> Vec<i32> {
    let gray = luma(image);
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let src = gray.as_raw();

    // Horizontal pass.
    let mut tmp = vec![0i32; w * h];
    tmp.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let line = &src[y * w..(y + 1) * w];
        for (x, out) in row.iter_mut().enumerate() {
            let mut acc = 0i32;
            for (k, weight) in BINOMIAL_5.iter().enumerate() {
                let sx = (x as isize + k as isize - 2).clamp(0, w as isize - 1) as usize;
                acc += weight * line[sx] as i32;
            }
            *out = acc;
        }
    });

    // Vertical pass.
    let mut out = vec![0i32; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, o) in row.iter_mut().enumerate() {
            let mut acc = 0i32;
            for (k, weight) in BINOMIAL_5.iter().enumerate() {
                let sy = (y as isize + k as isize - 2).clamp(0, h as isize - 1) as usize;
                acc += weight * tmp[sy * w + x];
            }
            *o = acc;
        }
    });
    out
}

/// Gradient direction bucket used by non-maximum suppression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Horizontal,
    Vertical,
    /// Gradient along (+x, +y).
    Diagonal,
    /// Gradient along (+x, -y).
    AntiDiagonal,
}

struct Gradients {
    /// Squared gradient magnitude in blur fixed-point units.
    mag_sq: Vec<i64>,
    dir: Vec<Direction>,
}

fn sobel(blurred: &[i32], w: usize, h: usize) -> Gradients {
    let at = |x: isize, y: isize| -> i64 {
        let cx = x.clamp(0, w as isize - 1) as usize;
        let cy = y.clamp(0, h as isize - 1) as usize;
        blurred[cy * w + cx] as i64
    };

    let mut mag_sq = vec![0i64; w * h];
    let mut dir = vec![Direction::Horizontal; w * h];
    mag_sq
        .par_chunks_mut(w)
        .zip(dir.par_chunks_mut(w))
        .enumerate()
        .for_each(|(y, (mrow, drow))| {
            let y = y as isize;
            for x in 0..w {
                let xi = x as isize;
                let gx = (at(xi + 1, y - 1) + 2 * at(xi + 1, y) + at(xi + 1, y + 1))
                    - (at(xi - 1, y - 1) + 2 * at(xi - 1, y) + at(xi - 1, y + 1));
                let gy = (at(xi - 1, y + 1) + 2 * at(xi, y + 1) + at(xi + 1, y + 1))
                    - (at(xi - 1, y - 1) + 2 * at(xi, y - 1) + at(xi + 1, y - 1));
                mrow[x] = gx * gx + gy * gy;
                let (ax, ay) = (gx.abs(), gy.abs());
                // tan(22.5°) ≈ 0.4142
                drow[x] = if ay * 10_000 <= ax * 4_142 {
                    Direction::Horizontal
                } else if ax * 10_000 <= ay * 4_142 {
                    Direction::Vertical
                } else if (gx > 0) == (gy > 0) {
                    Direction::Diagonal
                } else {
                    Direction::AntiDiagonal
                };
            }
        });
    Gradients { mag_sq, dir }
}

/// Order thresholds so `low <= high`, both non-negative.
pub fn clamp_thresholds(low: f32, high: f32) -> (f32, f32) {
    let low = low.max(0.0);
    let high = high.max(0.0);
    if low <= high { (low, high) } else { (high, low) }
}

/// Canny edge detector: binomial smoothing, Sobel gradients, non-maximum
/// suppression and hysteresis between `low` and `high` (Sobel magnitude of
/// 0..255 luma). Output pixels are 255 on edges, 0 elsewhere.
///
/// Non-maximum suppression keeps a pixel when it is `>=` the neighbour with
/// the smaller coordinate and `>` the other one, so a plateau of equal
/// magnitudes resolves to a single pixel on the higher-coordinate side.
pub fn canny(image: &PixelBuffer, low: f32, high: f32) -> GrayImage {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let mut edges = GrayImage::new(w as u32, h as u32);
    if w == 0 || h == 0 {
        return edges;
    }
    let (low, high) = clamp_thresholds(low, high);
    let scale = BLUR_SCALE as f64;
    let low_sq = ((low as f64 * scale).powi(2)).round() as i64;
    let high_sq = ((high as f64 * scale).powi(2)).round() as i64;

    let blurred = gaussian_blur_luma(image);
    let Gradients { mag_sq, dir } = sobel(&blurred, w, h);

    let mag = |x: isize, y: isize| -> i64 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0
        } else {
            mag_sq[y as usize * w + x as usize]
        }
    };

    // Non-maximum suppression: 0 = none, 1 = weak, 2 = strong.
    let mut class = vec![0u8; w * h];
    class.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let yi = y as isize;
        for (x, c) in row.iter_mut().enumerate() {
            let m = mag_sq[y * w + x];
            if m == 0 || m < low_sq {
                continue;
            }
            let xi = x as isize;
            let (lo, hi) = match dir[y * w + x] {
                Direction::Horizontal => (mag(xi - 1, yi), mag(xi + 1, yi)),
                Direction::Vertical => (mag(xi, yi - 1), mag(xi, yi + 1)),
                Direction::Diagonal => (mag(xi - 1, yi - 1), mag(xi + 1, yi + 1)),
                Direction::AntiDiagonal => (mag(xi + 1, yi - 1), mag(xi - 1, yi + 1)),
            };
            if m >= lo && m > hi {
                *c = if m >= high_sq { 2 } else { 1 };
            }
        }
    });

    // Hysteresis: grow strong pixels through 8-connected weak ones.
    let mut queue: VecDeque<usize> = class
        .iter()
        .enumerate()
        .filter_map(|(i, &c)| (c == 2).then_some(i))
        .collect();
    let out: &mut [u8] = &mut edges;
    for &i in &queue {
        out[i] = 255;
    }
    while let Some(i) = queue.pop_front() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for dy in -1..=1isize {
            for dx in -1..=1isize {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let ni = ny as usize * w + nx as usize;
                if class[ni] == 1 && out[ni] == 0 {
                    out[ni] = 255;
                    queue.push_back(ni);
                }
            }
        }
    }
    edges
}

/// Number of edge pixels in a map.
pub fn count_edge_pixels(edges: &GrayImage) -> u64 {
    edges.pixels().filter(|Luma([v])| *v > 0).count() as u64
}
