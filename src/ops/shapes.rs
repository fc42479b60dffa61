// ============================================================================
// DRAWING PRIMITIVES - brush stamps, strokes, lines, rectangles, ellipses
// ============================================================================

use egui::{Pos2, Vec2};
use image::{GrayImage, Rgba};
use rayon::prelude::*;
use tracing::warn;

use crate::canvas::{PixelBuffer, distance_to_segment};

/// Inclusive pixel bounds `(min_x, min_y, max_x, max_y)`.
pub type PixelBounds = (u32, u32, u32, u32);

/// Brush falloff for a pixel `dist` away from the stamp centre.
///
/// Fully opaque out to `radius * hardness` (never closer than half a pixel
/// to the rim), then a smoothstep ramp down to zero at `radius + 0.5`.
/// `hardness = 1` degenerates to a one-pixel anti-aliased edge.
pub fn brush_alpha(dist: f32, radius: f32, hardness: f32) -> f32 {
    if radius <= 0.0 {
        return if dist < 0.5 { 1.0 } else { 0.0 };
    }
    let outer = radius + 0.5;
    if dist >= outer {
        return 0.0;
    }
    let core = (radius * hardness.clamp(0.0, 1.0)).min(radius - 0.5).max(0.0);
    if dist <= core {
        return 1.0;
    }
    let t = ((dist - core) / (outer - core)).clamp(0.0, 1.0);
    1.0 - t * t * (3.0 - 2.0 * t)
}

/// Src-over composite.
pub fn alpha_blend(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 || dst[3] == 0 {
        return src;
    }
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }
    let inv = 1.0 / out_a;
    let ch = |i: usize| ((src[i] as f32 * sa + dst[i] as f32 * da * (1.0 - sa)) * inv).round().clamp(0.0, 255.0) as u8;
    Rgba([ch(0), ch(1), ch(2), (out_a * 255.0).round().clamp(0.0, 255.0) as u8])
}

/// Scale a colour's alpha by `weight` (0..1).
#[inline]
pub fn with_weight(color: Rgba<u8>, weight: f32) -> Rgba<u8> {
    let a = (color[3] as f32 * weight.clamp(0.0, 1.0)).round() as u8;
    Rgba([color[0], color[1], color[2], a])
}

/// Clip a float box (grown by `pad`) to the image, or `None` if it misses.
pub fn clip_bounds(min: Pos2, max: Pos2, pad: f32, width: u32, height: u32) -> Option<PixelBounds> {
    if width == 0 || height == 0 {
        return None;
    }
    let x0 = (min.x - pad).floor();
    let y0 = (min.y - pad).floor();
    let x1 = (max.x + pad).ceil();
    let y1 = (max.y + pad).ceil();
    if x1 < 0.0 || y1 < 0.0 || x0 > (width - 1) as f32 || y0 > (height - 1) as f32 {
        return None;
    }
    Some((
        x0.max(0.0) as u32,
        y0.max(0.0) as u32,
        (x1 as u32).min(width - 1),
        (y1 as u32).min(height - 1),
    ))
}

fn union_bounds(a: Option<PixelBounds>, b: PixelBounds) -> PixelBounds {
    match a {
        None => b,
        Some(a) => (a.0.min(b.0), a.1.min(b.1), a.2.max(b.2), a.3.max(b.3)),
    }
}

/// Blend `color` into every pixel of `bounds` weighted by `coverage(x, y)`.
fn paint_coverage<F>(image: &mut PixelBuffer, bounds: PixelBounds, color: Rgba<u8>, opacity: f32, coverage: F)
where
    F: Fn(f32, f32) -> f32 + Sync,
{
    let (x0, y0, x1, y1) = bounds;
    let stride = image.width() as usize * 4;
    let raw: &mut [u8] = &mut **image;
    raw.par_chunks_mut(stride)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0 + 1) as usize)
        .for_each(|(y, row)| {
            for x in x0..=x1 {
                let a = coverage(x as f32, y as f32) * opacity;
                if a <= 0.0 {
                    continue;
                }
                let off = x as usize * 4;
                let dst = Rgba([row[off], row[off + 1], row[off + 2], row[off + 3]]);
                let out = alpha_blend(dst, with_weight(color, a));
                row[off..off + 4].copy_from_slice(&out.0);
            }
        });
}

/// Single circular stamp.
pub fn stamp_circle(image: &mut PixelBuffer, center: Pos2, radius: f32, color: Rgba<u8>, opacity: f32, hardness: f32) {
    let Some(bounds) = clip_bounds(center, center, radius + 1.0, image.width(), image.height()) else {
        return;
    };
    paint_coverage(image, bounds, color, opacity, |x, y| {
        brush_alpha((Pos2::new(x, y) - center).length(), radius, hardness)
    });
}

/// Thick segment (capsule) between two samples.
pub fn stamp_segment(
    image: &mut PixelBuffer,
    a: Pos2,
    b: Pos2,
    radius: f32,
    color: Rgba<u8>,
    opacity: f32,
    hardness: f32,
) {
    let Some(bounds) = clip_bounds(a.min(b), a.max(b), radius + 1.0, image.width(), image.height()) else {
        return;
    };
    paint_coverage(image, bounds, color, opacity, |x, y| {
        brush_alpha(distance_to_segment(Pos2::new(x, y), a, b), radius, hardness)
    });
}

pub fn draw_line(image: &mut PixelBuffer, a: Pos2, b: Pos2, width: f32, color: Rgba<u8>, opacity: f32) {
    stamp_segment(image, a, b, (width / 2.0).max(0.5), color, opacity, 1.0);
}

/// Signed distance to an axis-aligned box (negative inside).
fn box_sdf(p: Pos2, center: Pos2, half: Vec2) -> f32 {
    let q = Vec2::new((p.x - center.x).abs() - half.x, (p.y - center.y).abs() - half.y);
    let outside = Vec2::new(q.x.max(0.0), q.y.max(0.0)).length();
    outside + q.x.max(q.y).min(0.0)
}

/// Rectangle spanning corners `a` and `b` (pixel-inclusive).
pub fn draw_rect(
    image: &mut PixelBuffer,
    a: Pos2,
    b: Pos2,
    width: f32,
    color: Rgba<u8>,
    opacity: f32,
    filled: bool,
) {
    let min = a.min(b);
    let max = a.max(b);
    let center = min + (max - min) / 2.0;
    let half = (max - min) / 2.0;
    let half_w = (width / 2.0).max(0.5);
    let Some(bounds) = clip_bounds(min, max, half_w + 1.0, image.width(), image.height()) else {
        return;
    };
    if filled {
        let grown = half + Vec2::splat(0.5);
        paint_coverage(image, bounds, color, opacity, |x, y| {
            (0.5 - box_sdf(Pos2::new(x, y), center, grown)).clamp(0.0, 1.0)
        });
    } else {
        paint_coverage(image, bounds, color, opacity, |x, y| {
            brush_alpha(box_sdf(Pos2::new(x, y), center, half).abs(), half_w, 1.0)
        });
    }
}

/// Ellipse inscribed in the box spanned by `a` and `b`.
pub fn draw_ellipse(
    image: &mut PixelBuffer,
    a: Pos2,
    b: Pos2,
    width: f32,
    color: Rgba<u8>,
    opacity: f32,
    filled: bool,
) {
    let min = a.min(b);
    let max = a.max(b);
    let center = min + (max - min) / 2.0;
    let rx = (max.x - min.x) / 2.0;
    let ry = (max.y - min.y) / 2.0;
    let half_w = (width / 2.0).max(0.5);
    let Some(bounds) = clip_bounds(min, max, half_w + 1.0, image.width(), image.height()) else {
        return;
    };
    // Approximate signed distance: normalised radius scaled back along the
    // smaller semi-axis.
    let sdf = move |x: f32, y: f32| -> f32 {
        let (erx, ery) = (rx.max(0.5), ry.max(0.5));
        let dx = (x - center.x) / erx;
        let dy = (y - center.y) / ery;
        ((dx * dx + dy * dy).sqrt() - 1.0) * erx.min(ery)
    };
    if filled {
        paint_coverage(image, bounds, color, opacity, |x, y| (1.0 - sdf(x, y)).clamp(0.0, 1.0));
    } else {
        paint_coverage(image, bounds, color, opacity, |x, y| brush_alpha(sdf(x, y).abs(), half_w, 1.0));
    }
}

// ============================================================================
// STROKE BUFFER - max-coverage accumulation for one gesture
// ============================================================================

/// Where a stroke takes its colour from.
#[derive(Clone, Debug)]
pub enum StrokeSource {
    Solid(Rgba<u8>),
    /// Clone stamp: copy from the pre-stroke image at `(x + dx, y + dy)`.
    Offset { dx: i32, dy: i32 },
    /// Restore from another image of the same size (eraser restore).
    Image(PixelBuffer),
}

/// Accumulates the coverage of one stroke so overlapping stamps never stack
/// opacity. Every target pixel is recomputed from the pre-stroke snapshot
/// using the maximum coverage seen so far.
pub struct StrokeBuffer {
    before: PixelBuffer,
    coverage: GrayImage,
    source: StrokeSource,
    opacity: f32,
    hardness: f32,
    dirty: Option<PixelBounds>,
}

impl StrokeBuffer {
    pub fn new(before: &PixelBuffer, source: StrokeSource, opacity: f32, hardness: f32) -> Self {
        Self {
            before: before.clone(),
            coverage: GrayImage::new(before.width(), before.height()),
            source,
            opacity: opacity.clamp(0.0, 1.0),
            hardness,
            dirty: None,
        }
    }

    /// Image as it was when the stroke began.
    pub fn before(&self) -> &PixelBuffer {
        &self.before
    }

    /// Union of every pixel box touched so far.
    pub fn dirty_bounds(&self) -> Option<PixelBounds> {
        self.dirty
    }

    pub fn stamp_circle(&mut self, target: &mut PixelBuffer, center: Pos2, radius: f32) {
        let hardness = self.hardness;
        let Some(bounds) = clip_bounds(center, center, radius + 1.0, target.width(), target.height()) else {
            return;
        };
        self.accumulate(target, bounds, |x, y| {
            brush_alpha((Pos2::new(x, y) - center).length(), radius, hardness)
        });
    }

    pub fn stamp_segment(&mut self, target: &mut PixelBuffer, a: Pos2, b: Pos2, radius: f32) {
        let hardness = self.hardness;
        let Some(bounds) = clip_bounds(a.min(b), a.max(b), radius + 1.0, target.width(), target.height()) else {
            return;
        };
        self.accumulate(target, bounds, |x, y| {
            brush_alpha(distance_to_segment(Pos2::new(x, y), a, b), radius, hardness)
        });
    }

    fn accumulate<F>(&mut self, target: &mut PixelBuffer, bounds: PixelBounds, coverage_at: F)
    where
        F: Fn(f32, f32) -> f32 + Sync,
    {
        if target.dimensions() != self.before.dimensions() {
            warn!("stroke target size changed mid-stroke, ignoring stamp");
            return;
        }
        let (x0, y0, x1, y1) = bounds;
        let w = target.width() as usize;
        let Self { before, coverage, source, opacity, .. } = self;
        let opacity = *opacity;
        let before = &*before;
        let source = &*source;

        let cov_raw: &mut [u8] = &mut **coverage;
        let tgt_raw: &mut [u8] = &mut **target;
        cov_raw
            .par_chunks_mut(w)
            .zip(tgt_raw.par_chunks_mut(w * 4))
            .enumerate()
            .skip(y0 as usize)
            .take((y1 - y0 + 1) as usize)
            .for_each(|(y, (cov_row, tgt_row))| {
                let y = y as u32;
                for x in x0..=x1 {
                    let c = (coverage_at(x as f32, y as f32) * 255.0).round().clamp(0.0, 255.0) as u8;
                    let xi = x as usize;
                    if c <= cov_row[xi] {
                        continue;
                    }
                    let Some(src) = sample_source(source, before, x, y) else {
                        continue;
                    };
                    cov_row[xi] = c;
                    let base = *before.get_pixel(x, y);
                    let out = alpha_blend(base, with_weight(src, c as f32 / 255.0 * opacity));
                    tgt_row[xi * 4..xi * 4 + 4].copy_from_slice(&out.0);
                }
            });
        self.dirty = Some(union_bounds(self.dirty, bounds));
    }
}

fn sample_source(source: &StrokeSource, before: &PixelBuffer, x: u32, y: u32) -> Option<Rgba<u8>> {
    match source {
        StrokeSource::Solid(color) => Some(*color),
        StrokeSource::Offset { dx, dy } => {
            let sx = x as i64 + *dx as i64;
            let sy = y as i64 + *dy as i64;
            if sx < 0 || sy < 0 || sx >= before.width() as i64 || sy >= before.height() as i64 {
                return None;
            }
            Some(*before.get_pixel(sx as u32, sy as u32))
        }
        StrokeSource::Image(img) => {
            if x < img.width() && y < img.height() {
                Some(*img.get_pixel(x, y))
            } else {
                None
            }
        }
    }
}
