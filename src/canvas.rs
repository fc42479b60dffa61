use egui::Pos2;
use image::{GrayImage, Luma, RgbaImage};
use rayon::prelude::*;
use tracing::warn;

/// The committed pixel grid. Every image buffer in the session (base,
/// pristine, display, floating) uses the same flat RGBA layout.
pub type PixelBuffer = RgbaImage;

/// Number of sub-scanlines sampled per pixel row when filling polygons.
const POLYGON_SUBSAMPLES: usize = 4;

// ============================================================================
// SELECTION SYSTEM
// ============================================================================

/// How a new selection shape interacts with the existing mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Clear any existing selection, then set the new shape.
    Replace,
    /// Union – add to the existing mask.
    #[default]
    Add,
    /// Difference – subtract from the existing mask.
    Subtract,
    /// Keep only pixels present in both the existing mask AND the new shape.
    Intersect,
}

/// Region written into the selection mask by the selection tools.
///
/// Coordinates are in image space with pixel centres at integer positions.
/// Circles, ellipses and thick segments get a one-pixel anti-aliased rim;
/// polygons are supersampled vertically and get fractional horizontal
/// coverage at span ends.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectionShape {
    /// Inclusive pixel rectangle.
    Rect { min_x: u32, min_y: u32, max_x: u32, max_y: u32 },
    Circle { center: Pos2, radius: f32 },
    Ellipse { center: Pos2, rx: f32, ry: f32 },
    /// Capsule between two points: the "thick segment" that keeps brush
    /// strokes continuous at high pointer velocity.
    Segment { a: Pos2, b: Pos2, radius: f32 },
    /// Closed polygon (last point connects back to the first).
    Polygon(Vec<Pos2>),
}

impl SelectionShape {
    /// Build a rectangle from two arbitrary corner points.
    pub fn rect_from_corners(a: Pos2, b: Pos2) -> Self {
        let min_x = a.x.min(b.x).round().max(0.0) as u32;
        let min_y = a.y.min(b.y).round().max(0.0) as u32;
        let max_x = a.x.max(b.x).round().max(0.0) as u32;
        let max_y = a.y.max(b.y).round().max(0.0) as u32;
        SelectionShape::Rect { min_x, min_y, max_x, max_y }
    }

    /// Inclusive bounding box clamped to the canvas, or `None` when the
    /// shape lies entirely outside it.
    pub fn bounds(&self, canvas_w: u32, canvas_h: u32) -> Option<(u32, u32, u32, u32)> {
        if canvas_w == 0 || canvas_h == 0 {
            return None;
        }
        let (x0, y0, x1, y1) = match self {
            SelectionShape::Rect { min_x, min_y, max_x, max_y } => {
                (*min_x as f32, *min_y as f32, *max_x as f32, *max_y as f32)
            }
            SelectionShape::Circle { center, radius } => {
                let r = radius + 1.0;
                (center.x - r, center.y - r, center.x + r, center.y + r)
            }
            SelectionShape::Ellipse { center, rx, ry } => {
                (center.x - rx - 1.0, center.y - ry - 1.0, center.x + rx + 1.0, center.y + ry + 1.0)
            }
            SelectionShape::Segment { a, b, radius } => {
                let r = radius + 1.0;
                (a.x.min(b.x) - r, a.y.min(b.y) - r, a.x.max(b.x) + r, a.y.max(b.y) + r)
            }
            SelectionShape::Polygon(points) => {
                if points.len() < 3 {
                    return None;
                }
                let mut b = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
                for p in points {
                    b.0 = b.0.min(p.x);
                    b.1 = b.1.min(p.y);
                    b.2 = b.2.max(p.x);
                    b.3 = b.3.max(p.y);
                }
                (b.0 - 1.0, b.1 - 1.0, b.2 + 1.0, b.3 + 1.0)
            }
        };
        if x1 < 0.0 || y1 < 0.0 || x0 > (canvas_w - 1) as f32 || y0 > (canvas_h - 1) as f32 {
            return None;
        }
        let min_x = x0.floor().max(0.0) as u32;
        let min_y = y0.floor().max(0.0) as u32;
        let max_x = (x1.ceil().max(0.0) as u32).min(canvas_w - 1);
        let max_y = (y1.ceil().max(0.0) as u32).min(canvas_h - 1);
        if min_x > max_x || min_y > max_y {
            return None;
        }
        Some((min_x, min_y, max_x, max_y))
    }

    /// Coverage (0..=255) of the pixel at (x, y). Not used for polygons,
    /// which are rasterized a whole row at a time.
    fn coverage_at(&self, x: u32, y: u32) -> u8 {
        let px = x as f32;
        let py = y as f32;
        let alpha = match self {
            SelectionShape::Rect { min_x, min_y, max_x, max_y } => {
                if x >= *min_x && x <= *max_x && y >= *min_y && y <= *max_y { 1.0 } else { 0.0 }
            }
            SelectionShape::Circle { center, radius } => {
                let d = ((px - center.x).powi(2) + (py - center.y).powi(2)).sqrt();
                rim_alpha(d, *radius)
            }
            SelectionShape::Ellipse { center, rx, ry } => {
                if *rx <= 0.0 || *ry <= 0.0 {
                    0.0
                } else {
                    // Approximate signed distance: scale the normalised radius
                    // back into pixels along the smaller semi-axis.
                    let dx = (px - center.x) / rx;
                    let dy = (py - center.y) / ry;
                    let k = (dx * dx + dy * dy).sqrt();
                    let r = rx.min(*ry);
                    rim_alpha(k * r, r)
                }
            }
            SelectionShape::Segment { a, b, radius } => {
                rim_alpha(distance_to_segment(Pos2::new(px, py), *a, *b), *radius)
            }
            SelectionShape::Polygon(_) => 0.0,
        };
        (alpha * 255.0).round().clamp(0.0, 255.0) as u8
    }

    /// Rasterize the shape into a coverage buffer covering `bounds`
    /// (row-major, inclusive bounds).
    fn rasterize(&self, bounds: (u32, u32, u32, u32)) -> Vec<u8> {
        let (bx0, by0, bx1, by1) = bounds;
        let bw = (bx1 - bx0 + 1) as usize;
        let bh = (by1 - by0 + 1) as usize;
        let mut cov = vec![0u8; bw * bh];

        if let SelectionShape::Polygon(points) = self {
            cov.par_chunks_mut(bw).enumerate().for_each(|(row, out)| {
                polygon_row_coverage(points, by0 + row as u32, bx0, out);
            });
        } else {
            cov.par_chunks_mut(bw).enumerate().for_each(|(row, out)| {
                let y = by0 + row as u32;
                for (i, v) in out.iter_mut().enumerate() {
                    *v = self.coverage_at(bx0 + i as u32, y);
                }
            });
        }
        cov
    }
}

/// One-pixel anti-aliased rim: 1 inside, 0 beyond `radius + 0.5`.
#[inline]
fn rim_alpha(dist: f32, radius: f32) -> f32 {
    if radius <= 0.0 {
        return if dist < 0.5 { 1.0 } else { 0.0 };
    }
    (radius + 0.5 - dist).clamp(0.0, 1.0)
}

/// Euclidean distance from `p` to the segment `a`–`b`.
pub fn distance_to_segment(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_sq();
    if len_sq < 1e-12 {
        return (p - a).length();
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).length()
}

/// Scanline coverage for one pixel row of a closed polygon.
fn polygon_row_coverage(points: &[Pos2], y: u32, x_origin: u32, out: &mut [u8]) {
    let n = points.len();
    let width = out.len();
    let mut acc = vec![0.0f32; width];
    let mut nodes: Vec<f32> = Vec::with_capacity(8);

    for k in 0..POLYGON_SUBSAMPLES {
        let yf = y as f32 - 0.5 + (k as f32 + 0.5) / POLYGON_SUBSAMPLES as f32;
        nodes.clear();
        for i in 0..n {
            let j = (i + 1) % n;
            let (yi, yj) = (points[i].y, points[j].y);
            if (yi < yf && yj >= yf) || (yj < yf && yi >= yf) {
                let t = (yf - yi) / (yj - yi);
                nodes.push(points[i].x + t * (points[j].x - points[i].x));
            }
        }
        nodes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut s = 0;
        while s + 1 < nodes.len() {
            let (xa, xb) = (nodes[s], nodes[s + 1]);
            // Pixel x spans [x - 0.5, x + 0.5].
            let first = ((xa + 0.5).floor() - x_origin as f32).max(0.0) as usize;
            let last = ((xb + 0.5).floor() - x_origin as f32 + 1.0).max(0.0) as usize;
            for (i, slot) in acc.iter_mut().enumerate().take(last.min(width)).skip(first) {
                let px = (x_origin + i as u32) as f32;
                let overlap = (xb.min(px + 0.5) - xa.max(px - 0.5)).clamp(0.0, 1.0);
                *slot += overlap;
            }
            s += 2;
        }
    }

    let scale = 255.0 / POLYGON_SUBSAMPLES as f32;
    for (o, a) in out.iter_mut().zip(acc) {
        *o = (a * scale).round().clamp(0.0, 255.0) as u8;
    }
}

/// Single-channel selection mask aligned with the base image, defined in
/// unrotated image space. 0 = unselected, 255 = selected.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionMask {
    mask: GrayImage,
}

impl SelectionMask {
    /// Empty mask of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self { mask: GrayImage::new(width, height) }
    }

    pub fn from_gray(mask: GrayImage) -> Self {
        Self { mask }
    }

    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.mask
    }

    pub fn into_gray(self) -> GrayImage {
        self.mask
    }

    /// Mask value at (x, y); 0 outside the mask.
    pub fn get(&self, x: u32, y: u32) -> u8 {
        if x < self.mask.width() && y < self.mask.height() {
            self.mask.get_pixel(x, y).0[0]
        } else {
            0
        }
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        if x < self.mask.width() && y < self.mask.height() {
            self.mask.put_pixel(x, y, Luma([value]));
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.mask.as_raw().iter().any(|&v| v > 0)
    }

    /// Count of pixels with any selection weight.
    pub fn non_zero_area(&self) -> u64 {
        self.mask
            .as_raw()
            .par_iter()
            .filter(|&&v| v > 0)
            .count() as u64
    }

    /// Tight inclusive bounding box of the non-zero pixels.
    pub fn bounds(&self) -> Option<(u32, u32, u32, u32)> {
        let (w, h) = (self.mask.width(), self.mask.height());
        let raw = self.mask.as_raw();
        let mut min_x = w;
        let mut min_y = h;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        for y in 0..h {
            let row = &raw[(y * w) as usize..((y + 1) * w) as usize];
            for (x, &v) in row.iter().enumerate() {
                if v > 0 {
                    min_x = min_x.min(x as u32);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x as u32);
                    max_y = max_y.max(y);
                }
            }
        }
        if min_x > max_x { None } else { Some((min_x, min_y, max_x, max_y)) }
    }

    /// Zero the mask. Returns `false` when it was already empty.
    pub fn clear(&mut self) -> bool {
        if self.is_empty() {
            return false;
        }
        self.mask.fill(0);
        true
    }

    pub fn select_all(&mut self) {
        self.mask.fill(255);
    }

    pub fn invert(&mut self) {
        let raw: &mut [u8] = &mut self.mask;
        raw.par_iter_mut().for_each(|v| *v = 255 - *v);
    }

    /// Reallocate an empty mask when the dimensions no longer match the
    /// image. Returns `true` if a reallocation happened.
    pub fn resync(&mut self, width: u32, height: u32) -> bool {
        if self.mask.width() == width && self.mask.height() == height {
            return false;
        }
        warn!(
            mask_w = self.mask.width(),
            mask_h = self.mask.height(),
            width,
            height,
            "selection mask dimensions diverged from image, reallocating"
        );
        self.mask = GrayImage::new(width, height);
        true
    }

    pub fn add_region(&mut self, shape: &SelectionShape) {
        self.apply_shape(shape, SelectionMode::Add);
    }

    pub fn subtract_region(&mut self, shape: &SelectionShape) {
        self.apply_shape(shape, SelectionMode::Subtract);
    }

    /// Apply a selection shape to the mask according to `mode`.
    pub fn apply_shape(&mut self, shape: &SelectionShape, mode: SelectionMode) {
        let w = self.mask.width();
        let h = self.mask.height();

        let Some(bounds) = shape.bounds(w, h) else {
            match mode {
                SelectionMode::Replace | SelectionMode::Intersect => {
                    self.mask.fill(0);
                }
                SelectionMode::Add | SelectionMode::Subtract => {}
            }
            return;
        };

        let cov = shape.rasterize(bounds);
        let (bx0, by0, bx1, by1) = bounds;
        let bw = (bx1 - bx0 + 1) as usize;

        if mode == SelectionMode::Replace {
            self.mask.fill(0);
        }

        let stride = w as usize;
        let raw: &mut [u8] = &mut self.mask;
        raw.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
            let y = y as u32;
            let inside_rows = y >= by0 && y <= by1;
            if !inside_rows {
                if mode == SelectionMode::Intersect {
                    row.fill(0);
                }
                return;
            }
            let cov_row = &cov[(y - by0) as usize * bw..(y - by0 + 1) as usize * bw];
            for (x, v) in row.iter_mut().enumerate() {
                let x = x as u32;
                let c = if x >= bx0 && x <= bx1 { cov_row[(x - bx0) as usize] } else { 0 };
                *v = match mode {
                    SelectionMode::Replace | SelectionMode::Add => (*v).max(c),
                    SelectionMode::Subtract => v.saturating_sub(c),
                    SelectionMode::Intersect => (*v).min(c),
                };
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_add_and_area() {
        let mut m = SelectionMask::new(20, 20);
        m.add_region(&SelectionShape::Rect { min_x: 2, min_y: 3, max_x: 5, max_y: 4 });
        assert_eq!(m.non_zero_area(), 8);
        assert_eq!(m.bounds(), Some((2, 3, 5, 4)));
        assert_eq!(m.get(2, 3), 255);
        assert_eq!(m.get(6, 3), 0);
    }

    #[test]
    fn circle_has_soft_rim_and_solid_core() {
        let mut m = SelectionMask::new(40, 40);
        m.add_region(&SelectionShape::Circle { center: Pos2::new(20.0, 20.0), radius: 5.0 });
        assert_eq!(m.get(20, 20), 255);
        assert_eq!(m.get(24, 20), 255);
        assert_eq!(m.get(30, 20), 0);
        // Diagonal rim pixel sits between fully in and fully out.
        let rim = m.get(24, 24);
        assert!(rim < 255);
    }

    #[test]
    fn subtract_removes_selection() {
        let mut m = SelectionMask::new(30, 30);
        m.add_region(&SelectionShape::Rect { min_x: 0, min_y: 0, max_x: 29, max_y: 29 });
        m.subtract_region(&SelectionShape::Circle { center: Pos2::new(15.0, 15.0), radius: 4.0 });
        assert_eq!(m.get(15, 15), 0);
        assert_eq!(m.get(0, 0), 255);
    }

    #[test]
    fn segment_covers_gap_between_samples() {
        let mut m = SelectionMask::new(100, 20);
        m.add_region(&SelectionShape::Segment {
            a: Pos2::new(5.0, 10.0),
            b: Pos2::new(90.0, 10.0),
            radius: 3.0,
        });
        for x in 5..=90 {
            assert_eq!(m.get(x, 10), 255, "gap at x={x}");
        }
    }

    #[test]
    fn polygon_fill_matches_square() {
        let mut m = SelectionMask::new(30, 30);
        let square = vec![
            Pos2::new(4.5, 4.5),
            Pos2::new(14.5, 4.5),
            Pos2::new(14.5, 14.5),
            Pos2::new(4.5, 14.5),
        ];
        m.add_region(&SelectionShape::Polygon(square));
        assert_eq!(m.get(5, 5), 255);
        assert_eq!(m.get(14, 14), 255);
        assert_eq!(m.get(15, 10), 0);
        assert_eq!(m.get(3, 10), 0);
        assert_eq!(m.non_zero_area(), 100);
    }

    #[test]
    fn degenerate_polygon_is_ignored() {
        let mut m = SelectionMask::new(10, 10);
        m.add_region(&SelectionShape::Polygon(vec![Pos2::new(1.0, 1.0), Pos2::new(5.0, 5.0)]));
        assert!(m.is_empty());
    }

    #[test]
    fn intersect_keeps_overlap_only() {
        let mut m = SelectionMask::new(20, 20);
        m.add_region(&SelectionShape::Rect { min_x: 0, min_y: 0, max_x: 9, max_y: 9 });
        m.apply_shape(
            &SelectionShape::Rect { min_x: 5, min_y: 5, max_x: 15, max_y: 15 },
            SelectionMode::Intersect,
        );
        assert_eq!(m.bounds(), Some((5, 5, 9, 9)));
    }

    #[test]
    fn clear_reports_whether_anything_changed() {
        let mut m = SelectionMask::new(5, 5);
        assert!(!m.clear());
        m.select_all();
        assert!(m.clear());
        assert!(m.is_empty());
    }

    #[test]
    fn invert_and_resync() {
        let mut m = SelectionMask::new(4, 4);
        m.invert();
        assert_eq!(m.non_zero_area(), 16);
        assert!(m.resync(6, 3));
        assert!(m.is_empty());
        assert!(!m.resync(6, 3));
    }

    #[test]
    fn shape_outside_canvas_has_no_bounds() {
        let s = SelectionShape::Circle { center: Pos2::new(-50.0, -50.0), radius: 3.0 };
        assert!(s.bounds(10, 10).is_none());
    }
}
