// ============================================================================
// TRANSFORM OPERATIONS - display rotation, crop, resize, rotate, flip
// ============================================================================

use image::{GrayImage, Rgba, RgbaImage, imageops};
use rayon::prelude::*;

use crate::canvas::PixelBuffer;
use crate::view::rotated_bounds;

/// Interpolation method for resize operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl Interpolation {
    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
            Interpolation::Bicubic => imageops::FilterType::CatmullRom,
            Interpolation::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

/// Rotation angles this close to a multiple of 360° are treated as zero.
const ANGLE_EPSILON: f32 = 1e-4;

pub(crate) fn is_identity_angle(degrees: f32) -> bool {
    let d = degrees.rem_euclid(360.0);
    d < ANGLE_EPSILON || 360.0 - d < ANGLE_EPSILON
}

/// Size in whole pixels of the canvas that holds a `w × h` image rotated by
/// `degrees`.
pub fn rotated_pixel_size(w: u32, h: u32, degrees: f32) -> (u32, u32) {
    if is_identity_angle(degrees) {
        return (w, h);
    }
    let (rw, rh) = rotated_bounds(w, h, degrees);
    // Shave float noise so exact right angles don't grow by a pixel.
    ((rw - 1e-3).ceil().max(1.0) as u32, (rh - 1e-3).ceil().max(1.0) as u32)
}

/// Rotate an interleaved `channels`-per-pixel buffer about its centre into
/// an expanded canvas. Pixel centres sit on integer coordinates; samples
/// outside the source read as zero.
fn rotate_raw(src: &[u8], w: u32, h: u32, channels: usize, degrees: f32) -> (Vec<u8>, u32, u32) {
    let (nw, nh) = rotated_pixel_size(w, h, degrees);
    let mut dst = vec![0u8; nw as usize * nh as usize * channels];
    if w == 0 || h == 0 {
        return (dst, nw, nh);
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (scx, scy) = ((w as f32 - 1.0) / 2.0, (h as f32 - 1.0) / 2.0);
    let (dcx, dcy) = ((nw as f32 - 1.0) / 2.0, (nh as f32 - 1.0) / 2.0);
    let (sw, sh) = (w as i32, h as i32);
    let stride = w as usize * channels;

    dst.par_chunks_mut(nw as usize * channels).enumerate().for_each(|(dy, row)| {
        let ry = dy as f32 - dcy;
        for dx in 0..nw as usize {
            let rx = dx as f32 - dcx;
            // Inverse rotation back into source space.
            let sx = rx * cos + ry * sin + scx;
            let sy = -rx * sin + ry * cos + scy;
            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            if x0 < -1 || y0 < -1 || x0 >= sw || y0 >= sh {
                continue;
            }
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;
            let px = dx * channels;
            for c in 0..channels {
                let sample = |x: i32, y: i32| -> f32 {
                    if x < 0 || y < 0 || x >= sw || y >= sh {
                        0.0
                    } else {
                        src[y as usize * stride + x as usize * channels + c] as f32
                    }
                };
                let top = sample(x0, y0) + (sample(x0 + 1, y0) - sample(x0, y0)) * fx;
                let bot = sample(x0, y0 + 1) + (sample(x0 + 1, y0 + 1) - sample(x0, y0 + 1)) * fx;
                row[px + c] = (top + (bot - top) * fy).round().clamp(0.0, 255.0) as u8;
            }
        }
    });
    (dst, nw, nh)
}

/// Rotate for presentation: the result bounds the rotated image and the
/// uncovered corners are transparent.
pub fn rotate_for_display(image: &PixelBuffer, degrees: f32) -> PixelBuffer {
    if is_identity_angle(degrees) {
        return image.clone();
    }
    let (raw, nw, nh) = rotate_raw(image.as_raw(), image.width(), image.height(), 4, degrees);
    RgbaImage::from_raw(nw, nh, raw).unwrap_or_else(|| RgbaImage::new(nw, nh))
}

/// Same as [`rotate_for_display`] for a single-channel mask.
pub fn rotate_mask(mask: &GrayImage, degrees: f32) -> GrayImage {
    if is_identity_angle(degrees) {
        return mask.clone();
    }
    let (raw, nw, nh) = rotate_raw(mask.as_raw(), mask.width(), mask.height(), 1, degrees);
    GrayImage::from_raw(nw, nh, raw).unwrap_or_else(|| GrayImage::new(nw, nh))
}

/// Bilinear sample with clamp-to-edge addressing.
pub fn sample_bilinear(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let (w, h) = (img.width() as i32, img.height() as i32);
    if w == 0 || h == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let sample = |sx: i32, sy: i32| -> [f32; 4] {
        let p = img.get_pixel(sx.clamp(0, w - 1) as u32, sy.clamp(0, h - 1) as u32).0;
        [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
    };
    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);
    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        out[c] = lerp(top, bot, fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

// ---------------------------------------------------------------------------
//  Whole-image geometry
// ---------------------------------------------------------------------------

/// Crop to `(x, y, w, h)` clipped to the image. `None` when nothing remains.
pub fn crop(image: &PixelBuffer, x: u32, y: u32, w: u32, h: u32) -> Option<PixelBuffer> {
    let (iw, ih) = image.dimensions();
    if x >= iw || y >= ih || w == 0 || h == 0 {
        return None;
    }
    let w = w.min(iw - x);
    let h = h.min(ih - y);
    Some(imageops::crop_imm(image, x, y, w, h).to_image())
}

/// Resample to `new_w × new_h`. `None` for a zero-sized target.
pub fn resize(image: &PixelBuffer, new_w: u32, new_h: u32, interp: Interpolation) -> Option<PixelBuffer> {
    if new_w == 0 || new_h == 0 {
        return None;
    }
    if image.dimensions() == (new_w, new_h) {
        return Some(image.clone());
    }
    Some(imageops::resize(image, new_w, new_h, interp.to_filter()))
}

/// Rotate 90° (swaps width and height).
pub fn rotate_90(image: &PixelBuffer, clockwise: bool) -> PixelBuffer {
    if clockwise { imageops::rotate90(image) } else { imageops::rotate270(image) }
}

pub fn rotate_180(image: &PixelBuffer) -> PixelBuffer {
    imageops::rotate180(image)
}

/// Mirror left/right.
pub fn flip_horizontal(image: &PixelBuffer) -> PixelBuffer {
    imageops::flip_horizontal(image)
}

/// Mirror top/bottom.
pub fn flip_vertical(image: &PixelBuffer) -> PixelBuffer {
    imageops::flip_vertical(image)
}
