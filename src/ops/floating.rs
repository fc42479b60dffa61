// ---------------------------------------------------------------------------
//  Floating region: a lifted, transformable copy of the selected pixels
// ---------------------------------------------------------------------------

use egui::{Pos2, Vec2};
use image::{GrayImage, Rgba, imageops};
use rayon::prelude::*;
use tracing::debug;

use crate::canvas::{PixelBuffer, SelectionMask};
use crate::ops::shapes::{alpha_blend, with_weight};
use crate::ops::transform::{is_identity_angle, rotate_for_display, rotate_mask};

pub const MIN_SCALE: f32 = 0.01;
pub const MAX_SCALE: f32 = 20.0;

/// Pixels and mask lifted from the image by a move gesture.
///
/// `origin` is the source bounding box `(x, y, w, h)`. The region is drawn
/// scaled first, then rotated about its own centre, then translated by
/// `offset` (image pixels).
#[derive(Clone, Debug)]
pub struct FloatingRegion {
    pub pixels: PixelBuffer,
    pub mask: GrayImage,
    pub origin: (u32, u32, u32, u32),
    pub offset: Vec2,
    pub rotation_deg: f32,
    pub scale: f32,
}

impl FloatingRegion {
    /// Lift the selected bounding box out of `image`.
    ///
    /// Vacated pixels are blended toward `fill` by their selection weight.
    /// Returns `None` when the selection is empty or sized for another image.
    pub fn extract(image: &mut PixelBuffer, selection: &SelectionMask, fill: Rgba<u8>) -> Option<Self> {
        if selection.width() != image.width() || selection.height() != image.height() {
            return None;
        }
        let (min_x, min_y, max_x, max_y) = selection.bounds()?;
        let w = max_x - min_x + 1;
        let h = max_y - min_y + 1;

        let pixels = imageops::crop_imm(image, min_x, min_y, w, h).to_image();
        let mask = imageops::crop_imm(selection.as_gray(), min_x, min_y, w, h).to_image();

        let stride = image.width() as usize * 4;
        let mask_raw = selection.as_gray().as_raw();
        let mw = selection.width() as usize;
        let raw: &mut [u8] = &mut **image;
        raw.par_chunks_mut(stride)
            .enumerate()
            .skip(min_y as usize)
            .take(h as usize)
            .for_each(|(y, row)| {
                for x in min_x as usize..=max_x as usize {
                    let m = mask_raw[y * mw + x];
                    if m == 0 {
                        continue;
                    }
                    let off = x * 4;
                    let dst = Rgba([row[off], row[off + 1], row[off + 2], row[off + 3]]);
                    let out = if m == 255 { fill } else { alpha_blend(dst, with_weight(fill, m as f32 / 255.0)) };
                    row[off..off + 4].copy_from_slice(&out.0);
                }
            });

        debug!(x = min_x, y = min_y, w, h, "lifted floating region");
        Some(Self {
            pixels,
            mask,
            origin: (min_x, min_y, w, h),
            offset: Vec2::ZERO,
            rotation_deg: 0.0,
            scale: 1.0,
        })
    }

    pub fn set_offset(&mut self, offset: Vec2) {
        if offset.x.is_finite() && offset.y.is_finite() {
            self.offset = offset;
        }
    }

    pub fn set_transform(&mut self, rotation_deg: f32, scale: f32) {
        if rotation_deg.is_finite() {
            self.rotation_deg = rotation_deg.rem_euclid(360.0);
        }
        if scale.is_finite() && scale > 0.0 {
            self.scale = scale.clamp(MIN_SCALE, MAX_SCALE);
        }
    }

    /// Centre of the region in image space, offset applied.
    pub fn center(&self) -> Pos2 {
        let (x, y, w, h) = self.origin;
        Pos2::new(
            x as f32 + (w as f32 - 1.0) / 2.0 + self.offset.x,
            y as f32 + (h as f32 - 1.0) / 2.0 + self.offset.y,
        )
    }

    /// Pixels and mask after scaling then rotation.
    pub fn transformed(&self) -> (PixelBuffer, GrayImage) {
        let (_, _, w, h) = self.origin;
        let (pixels, mask) = if (self.scale - 1.0).abs() < 1e-4 {
            (self.pixels.clone(), self.mask.clone())
        } else {
            let sw = (w as f32 * self.scale).round().max(1.0) as u32;
            let sh = (h as f32 * self.scale).round().max(1.0) as u32;
            let filter = imageops::FilterType::Triangle;
            (
                imageops::resize(&self.pixels, sw, sh, filter),
                imageops::resize(&self.mask, sw, sh, filter),
            )
        };
        if is_identity_angle(self.rotation_deg) {
            return (pixels, mask);
        }
        (rotate_for_display(&pixels, self.rotation_deg), rotate_mask(&mask, self.rotation_deg))
    }

    /// Composite the transformed region into `image`, clipped to its bounds.
    /// Each pixel is weighted by the region mask.
    pub fn composite_into(&self, image: &mut PixelBuffer) {
        let (pixels, mask) = self.transformed();
        let (tw, th) = pixels.dimensions();
        let center = self.center();
        let left = (center.x - (tw as f32 - 1.0) / 2.0).round();
        let top = (center.y - (th as f32 - 1.0) / 2.0).round();
        let (iw, ih) = (image.width() as i64, image.height() as i64);
        // Entirely off-canvas. Also bounds the integer casts below.
        if !(left > -(tw as f32) && left < iw as f32 && top > -(th as f32) && top < ih as f32) {
            return;
        }
        let (left, top) = (left as i64, top as i64);

        let x0 = left.max(0);
        let y0 = top.max(0);
        let x1 = (left + tw as i64).min(iw);
        let y1 = (top + th as i64).min(ih);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let stride = iw as usize * 4;
        let raw: &mut [u8] = &mut **image;
        raw.par_chunks_mut(stride)
            .enumerate()
            .skip(y0 as usize)
            .take((y1 - y0) as usize)
            .for_each(|(y, row)| {
                let ly = (y as i64 - top) as u32;
                for x in x0..x1 {
                    let lx = (x - left) as u32;
                    let m = mask.get_pixel(lx, ly).0[0];
                    if m == 0 {
                        continue;
                    }
                    let off = x as usize * 4;
                    let dst = Rgba([row[off], row[off + 1], row[off + 2], row[off + 3]]);
                    let src = *pixels.get_pixel(lx, ly);
                    let out = alpha_blend(dst, with_weight(src, m as f32 / 255.0));
                    row[off..off + 4].copy_from_slice(&out.0);
                }
            });
    }
}
