use image::{GrayImage, Rgba};
use rayon::prelude::*;

use crate::canvas::{PixelBuffer, SelectionMask};
use crate::ops::shapes::{PixelBounds, alpha_blend, with_weight};

/// Two colours match when every channel (alpha included) differs by at most
/// `tolerance`. Fully transparent pixels match each other regardless of RGB.
pub fn colors_match(a: &Rgba<u8>, b: &Rgba<u8>, tolerance: f32) -> bool {
    matches(a.0, b.0, tolerance)
}

#[inline(always)]
fn matches(p: [u8; 4], tc: [u8; 4], tol: f32) -> bool {
    if tc[3] == 0 && p[3] == 0 {
        return true;
    }
    if tc[3] == 0 || p[3] == 0 {
        return (tc[3] as f32 - p[3] as f32).abs() <= tol;
    }
    let r = (tc[0] as f32 - p[0] as f32).abs();
    let g = (tc[1] as f32 - p[1] as f32).abs();
    let b = (tc[2] as f32 - p[2] as f32).abs();
    let a = (tc[3] as f32 - p[3] as f32).abs();
    r.max(g).max(b).max(a) <= tol
}

/// 4-connected flood fill from `(start_x, start_y)`.
///
/// Returns the filled region as a 0/255 mask plus its bounding box. When
/// `limit` holds a non-empty selection, the fill cannot leave it.
pub fn flood_fill_mask(
    image: &PixelBuffer,
    start_x: u32,
    start_y: u32,
    tolerance: f32,
    limit: Option<&SelectionMask>,
) -> (GrayImage, Option<PixelBounds>) {
    let (w, h) = image.dimensions();
    let wu = w as usize;
    // mask doubles as the visited array and the output
    let mut mask = GrayImage::new(w, h);

    if start_x >= w || start_y >= h {
        return (mask, None);
    }

    let flat = image.as_raw();
    let limit = limit.filter(|m| m.width() == w && m.height() == h && !m.is_empty());
    let allowed = |idx: usize| limit.is_none_or(|m| m.as_gray().as_raw()[idx] > 0);

    #[inline(always)]
    fn pix(flat: &[u8], idx: usize) -> [u8; 4] {
        let o = idx * 4;
        [flat[o], flat[o + 1], flat[o + 2], flat[o + 3]]
    }

    let seed_idx = start_y as usize * wu + start_x as usize;
    if !allowed(seed_idx) {
        return (mask, None);
    }
    let tc = pix(flat, seed_idx);

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (start_x, start_y, start_x, start_y);
    let out: &mut [u8] = &mut mask;

    // DFS over packed flat indices.
    let mut stack: Vec<u32> = Vec::with_capacity(4096);
    out[seed_idx] = 255;
    stack.push(seed_idx as u32);

    while let Some(idx) = stack.pop() {
        let idx = idx as usize;
        let x = (idx % wu) as u32;
        let y = (idx / wu) as u32;
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);

        let mut visit = |ni: usize| {
            if out[ni] == 0 && allowed(ni) && matches(pix(flat, ni), tc, tolerance) {
                out[ni] = 255;
                stack.push(ni as u32);
            }
        };
        if x > 0 {
            visit(idx - 1);
        }
        if x + 1 < w {
            visit(idx + 1);
        }
        if y > 0 {
            visit(idx - wu);
        }
        if y + 1 < h {
            visit(idx + wu);
        }
    }

    (mask, Some((min_x, min_y, max_x, max_y)))
}

/// Composite `color` over every pixel of `region`, weighted by the region
/// value and `opacity`.
pub fn fill_region(image: &mut PixelBuffer, region: &GrayImage, color: Rgba<u8>, opacity: f32) {
    if image.dimensions() != region.dimensions() {
        return;
    }
    let w = image.width() as usize;
    let region_raw = region.as_raw();
    let raw: &mut [u8] = &mut **image;
    raw.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        let mrow = &region_raw[y * w..(y + 1) * w];
        for (x, &m) in mrow.iter().enumerate() {
            if m == 0 {
                continue;
            }
            let off = x * 4;
            let dst = Rgba([row[off], row[off + 1], row[off + 2], row[off + 3]]);
            let out = alpha_blend(dst, with_weight(color, m as f32 / 255.0 * opacity));
            row[off..off + 4].copy_from_slice(&out.0);
        }
    });
}
