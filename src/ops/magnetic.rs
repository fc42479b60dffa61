use egui::Pos2;
use image::GrayImage;
use tracing::debug;

use crate::canvas::PixelBuffer;
use crate::ops::filters::{canny, clamp_thresholds};

/// Snapped points closer than this to the raw sample are left alone.
pub const MIN_SNAP_DISTANCE: f32 = 0.5;

/// Lazily computed Canny edge map of the committed image.
///
/// Invalidated by every committed image mutation and by threshold changes;
/// recomputed on the first query after invalidation.
#[derive(Debug)]
pub struct EdgeMapCache {
    edges: Option<GrayImage>,
    dirty: bool,
    low: f32,
    high: f32,
    computations: u64,
}

impl EdgeMapCache {
    pub fn new(low: f32, high: f32) -> Self {
        let (low, high) = clamp_thresholds(low, high);
        Self {
            edges: None,
            dirty: true,
            low,
            high,
            computations: 0,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty || self.edges.is_none()
    }

    pub fn thresholds(&self) -> (f32, f32) {
        (self.low, self.high)
    }

    pub fn set_thresholds(&mut self, low: f32, high: f32) {
        let (low, high) = clamp_thresholds(low, high);
        if (low, high) != (self.low, self.high) {
            self.low = low;
            self.high = high;
            self.dirty = true;
        }
    }

    /// How many times the edge map has been rebuilt.
    pub fn computations(&self) -> u64 {
        self.computations
    }

    /// Current edge map for `image`, rebuilding it if stale.
    pub fn get_or_compute(&mut self, image: &PixelBuffer) -> &GrayImage {
        let stale = match &self.edges {
            Some(edges) => self.dirty || edges.dimensions() != image.dimensions(),
            None => true,
        };
        if stale {
            debug!(width = image.width(), height = image.height(), low = self.low, high = self.high, "rebuilding edge map");
            self.computations += 1;
            self.dirty = false;
            self.edges = None;
        }
        let (low, high) = (self.low, self.high);
        self.edges.get_or_insert_with(|| canny(image, low, high))
    }
}

/// Nearest edge pixel to `p` within `radius`, or `None`.
pub fn nearest_edge(edges: &GrayImage, p: Pos2, radius: f32) -> Option<Pos2> {
    let (w, h) = edges.dimensions();
    if w == 0 || h == 0 || radius < 0.0 {
        return None;
    }
    let r = radius.ceil() as i64;
    let (cx, cy) = (p.x.round() as i64, p.y.round() as i64);
    let x0 = (cx - r).max(0);
    let y0 = (cy - r).max(0);
    let x1 = (cx + r).min(w as i64 - 1);
    let y1 = (cy + r).min(h as i64 - 1);
    if x0 > x1 || y0 > y1 {
        return None;
    }

    let r_sq = radius * radius;
    let mut best: Option<(f32, Pos2)> = None;
    for y in y0..=y1 {
        for x in x0..=x1 {
            if edges.get_pixel(x as u32, y as u32).0[0] == 0 {
                continue;
            }
            let q = Pos2::new(x as f32, y as f32);
            let d_sq = (q - p).length_sq();
            if d_sq > r_sq {
                continue;
            }
            if best.is_none_or(|(bd, _)| d_sq < bd) {
                best = Some((d_sq, q));
            }
        }
    }
    best.map(|(_, q)| q)
}

/// Snap an image-space sample onto the nearest edge inside `radius`.
/// Samples already within [`MIN_SNAP_DISTANCE`] of their edge are unchanged.
pub fn snap_to_edge(edges: &GrayImage, p: Pos2, radius: f32) -> Pos2 {
    match nearest_edge(edges, p, radius) {
        Some(q) if (q - p).length() > MIN_SNAP_DISTANCE => q,
        _ => p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn two_tone() -> PixelBuffer {
        PixelBuffer::from_fn(100, 60, |x, _| {
            if x < 50 { Rgba([0, 0, 0, 255]) } else { Rgba([255, 255, 255, 255]) }
        })
    }

    #[test]
    fn samples_near_boundary_snap_onto_it() {
        let mut cache = EdgeMapCache::new(50.0, 150.0);
        let edges = cache.get_or_compute(&two_tone());
        for x in 45..=55 {
            let snapped = snap_to_edge(edges, Pos2::new(x as f32, 30.0), 12.0);
            assert_eq!(snapped, Pos2::new(50.0, 30.0), "sample at x={x}");
        }
    }

    #[test]
    fn nothing_in_reach_keeps_the_sample() {
        let mut cache = EdgeMapCache::new(50.0, 150.0);
        let edges = cache.get_or_compute(&two_tone());
        let p = Pos2::new(10.0, 30.0);
        assert_eq!(snap_to_edge(edges, p, 12.0), p);
        assert!(nearest_edge(edges, p, 12.0).is_none());
    }

    #[test]
    fn cache_rebuilds_once_per_dirty_period() {
        let img = two_tone();
        let mut cache = EdgeMapCache::new(50.0, 150.0);
        assert!(cache.is_dirty());
        for _ in 0..5 {
            cache.get_or_compute(&img);
        }
        assert_eq!(cache.computations(), 1);
        assert!(!cache.is_dirty());

        cache.mark_dirty();
        cache.get_or_compute(&img);
        cache.get_or_compute(&img);
        assert_eq!(cache.computations(), 2);

        cache.set_thresholds(50.0, 150.0);
        cache.get_or_compute(&img);
        assert_eq!(cache.computations(), 2);
        cache.set_thresholds(20.0, 80.0);
        cache.get_or_compute(&img);
        assert_eq!(cache.computations(), 3);
    }
}
