// ============================================================================
// COLOR ADJUSTMENTS - contrast, brightness, saturation
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::canvas::{PixelBuffer, SelectionMask};

/// Brightness/contrast/saturation grade, each in -100..100 (0 = no change).
///
/// Applied in a fixed order: contrast around mid-grey, then the brightness
/// offset, then saturation scaling in HSL.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    /// Additive offset on the 0..255 scale.
    pub brightness: f32,
    /// Multiplier around 128.
    pub contrast: f32,
    /// Saturation change in percent.
    pub saturation: f32,
}

impl Adjustment {
    pub fn new(brightness: f32, contrast: f32, saturation: f32) -> Self {
        let clean = |v: f32| if v.is_finite() { v.clamp(-100.0, 100.0) } else { 0.0 };
        Self {
            brightness: clean(brightness),
            contrast: clean(contrast),
            saturation: clean(saturation),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.brightness == 0.0 && self.contrast == 0.0 && self.saturation == 0.0
    }

    fn contrast_factor(&self) -> f32 {
        (259.0 * (self.contrast + 255.0)) / (255.0 * (259.0 - self.contrast))
    }

    /// Grade one colour (channels on the 0..255 scale).
    pub fn apply_rgb(&self, r: f32, g: f32, b: f32) -> (f32, f32, f32) {
        let factor = self.contrast_factor();
        let grade = |v: f32| (factor * (v - 128.0) + 128.0 + self.brightness).clamp(0.0, 255.0);
        let (r, g, b) = (grade(r), grade(g), grade(b));
        if self.saturation == 0.0 {
            return (r, g, b);
        }
        let sat_factor = 1.0 + self.saturation / 100.0;
        let (h, s, l) = rgb_to_hsl(r / 255.0, g / 255.0, b / 255.0);
        let (nr, ng, nb) = hsl_to_rgb(h, (s * sat_factor).clamp(0.0, 1.0), l);
        (nr * 255.0, ng * 255.0, nb * 255.0)
    }
}

/// Per-pixel transform from `src` into a new image. When `mask` holds a
/// selection, each result is blended with the source by the mask weight.
pub fn apply_pixel_transform<F>(src: &RgbaImage, mask: Option<&SelectionMask>, transform: F) -> RgbaImage
where
    F: Fn(f32, f32, f32, f32) -> (f32, f32, f32, f32) + Sync,
{
    let (w, h) = src.dimensions();
    let wu = w as usize;
    if w == 0 || h == 0 {
        return src.clone();
    }
    let mask = mask.filter(|m| m.width() == w && m.height() == h && !m.is_empty());
    let mask_raw = mask.map(|m| m.as_gray().as_raw().as_slice());

    let src_raw = src.as_raw();
    let stride = wu * 4;
    let mut dst = src.clone();
    let dst_raw: &mut [u8] = &mut dst;

    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        for x in 0..wu {
            let weight = match mask_raw {
                Some(mr) => mr[y * wu + x] as f32 / 255.0,
                None => 1.0,
            };
            if weight == 0.0 {
                continue;
            }
            let pi = x * 4;
            let (r, g, b, a) = (row_in[pi] as f32, row_in[pi + 1] as f32, row_in[pi + 2] as f32, row_in[pi + 3] as f32);
            let (nr, ng, nb, na) = transform(r, g, b, a);
            let mix = |old: f32, new: f32| (old + (new - old) * weight).round().clamp(0.0, 255.0) as u8;
            row_out[pi] = mix(r, nr);
            row_out[pi + 1] = mix(g, ng);
            row_out[pi + 2] = mix(b, nb);
            row_out[pi + 3] = mix(a, na);
        }
    });
    dst
}

/// Graded copy of `image`, limited to the selection when one exists.
pub fn apply_adjustment_to(image: &PixelBuffer, adjustment: &Adjustment, mask: Option<&SelectionMask>) -> PixelBuffer {
    if adjustment.is_identity() {
        return image.clone();
    }
    let adj = *adjustment;
    apply_pixel_transform(image, mask, move |r, g, b, a| {
        let (nr, ng, nb) = adj.apply_rgb(r, g, b);
        (nr, ng, nb, a)
    })
}

// ============================================================================
// HSL HELPERS
// ============================================================================

/// RGB (0..1) → HSL (H: 0..1, S: 0..1, L: 0..1)
pub fn rgb_to_hsl(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    let d = max - min;
    if d.abs() < 1e-6 {
        return (0.0, 0.0, l);
    }
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
    let h = if (max - r).abs() < 1e-6 {
        ((g - b) / d).rem_euclid(6.0) / 6.0
    } else if (max - g).abs() < 1e-6 {
        ((b - r) / d + 2.0) / 6.0
    } else {
        ((r - g) / d + 4.0) / 6.0
    };
    (h, s, l)
}

/// HSL (H: 0..1, S: 0..1, L: 0..1) → RGB (0..1)
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s.abs() < 1e-6 {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::SelectionShape;
    use image::Rgba;

    fn swatch() -> PixelBuffer {
        PixelBuffer::from_fn(4, 4, |x, y| Rgba([(x * 60) as u8, (y * 60) as u8, 90, 255]))
    }

    #[test]
    fn zero_adjustment_is_identity() {
        let img = swatch();
        assert_eq!(apply_adjustment_to(&img, &Adjustment::default(), None), img);
        let adj = Adjustment::new(0.0, 0.0, 0.0);
        assert!(adj.is_identity());
    }

    #[test]
    fn brightness_offsets_after_contrast() {
        let adj = Adjustment::new(20.0, 0.0, 0.0);
        let (r, g, b) = adj.apply_rgb(100.0, 250.0, 0.0);
        assert_eq!((r, g, b), (120.0, 255.0, 20.0));
    }

    #[test]
    fn contrast_pushes_away_from_mid_grey() {
        let adj = Adjustment::new(0.0, 50.0, 0.0);
        let (lo, _, _) = adj.apply_rgb(64.0, 64.0, 64.0);
        let (hi, _, _) = adj.apply_rgb(192.0, 192.0, 192.0);
        assert!(lo < 64.0 && hi > 192.0);
        let (mid, _, _) = adj.apply_rgb(128.0, 128.0, 128.0);
        assert!((mid - 128.0).abs() < 1e-3);
    }

    #[test]
    fn full_desaturation_gives_grey() {
        let adj = Adjustment::new(0.0, 0.0, -100.0);
        let (r, g, b) = adj.apply_rgb(200.0, 50.0, 50.0);
        assert!((r - g).abs() < 0.5 && (g - b).abs() < 0.5);
    }

    #[test]
    fn selection_limits_the_grade() {
        let img = PixelBuffer::from_pixel(6, 6, Rgba([100, 100, 100, 255]));
        let mut sel = SelectionMask::new(6, 6);
        sel.add_region(&SelectionShape::Rect { min_x: 0, min_y: 0, max_x: 2, max_y: 5 });
        let out = apply_adjustment_to(&img, &Adjustment::new(50.0, 0.0, 0.0), Some(&sel));
        assert_eq!(out.get_pixel(1, 1)[0], 150);
        assert_eq!(out.get_pixel(4, 1)[0], 100);
    }

    #[test]
    fn hsl_round_trip() {
        for &(r, g, b) in &[(0.2f32, 0.4f32, 0.9f32), (1.0, 0.0, 0.0), (0.5, 0.5, 0.5), (0.9, 0.8, 0.1)] {
            let (h, s, l) = rgb_to_hsl(r, g, b);
            let (r2, g2, b2) = hsl_to_rgb(h, s, l);
            assert!((r - r2).abs() < 1e-4 && (g - g2).abs() < 1e-4 && (b - b2).abs() < 1e-4);
        }
    }

    #[test]
    fn out_of_range_inputs_are_clamped() {
        let adj = Adjustment::new(500.0, f32::NAN, -300.0);
        assert_eq!(adj, Adjustment { brightness: 100.0, contrast: 0.0, saturation: -100.0 });
    }
}
