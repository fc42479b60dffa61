use egui::{Pos2, Vec2};

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 100.0;

/// Forward/inverse mapping between view (screen) coordinates and image
/// (unrotated base) coordinates.
///
/// The forward transform is
/// `view = viewport_center + pan + s * R(θ) * (p - image_center)`
/// where `s = base_fit * zoom` and `base_fit` fits the rotated image's
/// bounding rectangle into the viewport. A zero-sized viewport gives a
/// base fit of 1 and centres on the image, so view and image coordinates
/// coincide until a host reports its viewport.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewTransform {
    zoom: f32,
    pan_offset: Vec2,
    rotation_deg: f32,
    viewport: Vec2,
    image_w: u32,
    image_h: u32,
}

impl ViewTransform {
    pub fn new(image_w: u32, image_h: u32) -> Self {
        Self {
            zoom: 1.0,
            pan_offset: Vec2::ZERO,
            rotation_deg: 0.0,
            viewport: Vec2::ZERO,
            image_w,
            image_h,
        }
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn pan_offset(&self) -> Vec2 {
        self.pan_offset
    }

    pub fn rotation_deg(&self) -> f32 {
        self.rotation_deg
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    pub fn image_size(&self) -> (u32, u32) {
        (self.image_w, self.image_h)
    }

    /// Back to zoom 1, no pan, no rotation. Viewport is kept.
    pub fn reset(&mut self) {
        self.zoom = 1.0;
        self.pan_offset = Vec2::ZERO;
        self.rotation_deg = 0.0;
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.viewport = Vec2::new(width.max(0.0), height.max(0.0));
    }

    pub fn set_image_size(&mut self, width: u32, height: u32) {
        self.image_w = width;
        self.image_h = height;
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        if zoom.is_finite() && zoom > 0.0 {
            self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        }
    }

    pub fn apply_zoom(&mut self, zoom_factor: f32) {
        self.set_zoom(self.zoom * zoom_factor);
    }

    /// Zoom while keeping a view-space point fixed (e.g. under the cursor).
    pub fn zoom_around_view_point(&mut self, zoom_factor: f32, anchor: Pos2) {
        let pinned = self.to_image_space(anchor);
        self.apply_zoom(zoom_factor);
        // Solve the forward transform for the pan that maps `pinned` back
        // onto `anchor` at the new scale.
        let rotated = self.rotate((pinned - self.image_center()).to_vec2(), self.rotation_deg);
        let center = self.viewport_center();
        self.pan_offset = anchor - center - rotated * self.scale();
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.pan_offset += delta;
    }

    pub fn set_pan(&mut self, pan: Vec2) {
        self.pan_offset = pan;
    }

    /// Set the view rotation, wrapped into `[0, 360)`.
    pub fn set_rotation(&mut self, degrees: f32) {
        if degrees.is_finite() {
            self.rotation_deg = degrees.rem_euclid(360.0);
        }
    }

    pub fn rotate_by(&mut self, delta_deg: f32) {
        self.set_rotation(self.rotation_deg + delta_deg);
    }

    /// Size of the axis-aligned rectangle bounding the rotated image.
    pub fn rotated_canvas_size(&self) -> (f32, f32) {
        rotated_bounds(self.image_w, self.image_h, self.rotation_deg)
    }

    /// Scale that fits the rotated image into the viewport, before zoom.
    pub fn base_fit_scale(&self) -> f32 {
        let (rw, rh) = self.rotated_canvas_size();
        if self.viewport.x <= 0.0 || self.viewport.y <= 0.0 || rw <= 0.0 || rh <= 0.0 {
            return 1.0;
        }
        (self.viewport.x / rw).min(self.viewport.y / rh)
    }

    /// Total image-to-view scale.
    pub fn scale(&self) -> f32 {
        self.base_fit_scale() * self.zoom
    }

    // Pixel centres sit on integer coordinates, so the image spans
    // [-0.5, w - 0.5] and its centre is (w - 1) / 2.
    fn image_center(&self) -> Vec2 {
        Vec2::new(
            (self.image_w as f32 - 1.0).max(0.0) / 2.0,
            (self.image_h as f32 - 1.0).max(0.0) / 2.0,
        )
    }

    fn viewport_center(&self) -> Pos2 {
        if self.viewport.x <= 0.0 || self.viewport.y <= 0.0 {
            let c = self.image_center();
            Pos2::new(c.x, c.y)
        } else {
            Pos2::new(self.viewport.x / 2.0, self.viewport.y / 2.0)
        }
    }

    fn rotate(&self, v: Vec2, degrees: f32) -> Vec2 {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
    }

    /// Image space → view space.
    pub fn to_view_space(&self, image_point: Pos2) -> Pos2 {
        let c = self.image_center();
        let local = Vec2::new(image_point.x - c.x, image_point.y - c.y);
        let rotated = self.rotate(local, self.rotation_deg);
        self.viewport_center() + self.pan_offset + rotated * self.scale()
    }

    /// View space → image space (analytic inverse of [`Self::to_view_space`]).
    /// The result is not clamped; see [`Self::clamp_to_image`].
    pub fn to_image_space(&self, view_point: Pos2) -> Pos2 {
        let s = self.scale();
        let rel = (view_point - self.viewport_center() - self.pan_offset) / s;
        let local = self.rotate(rel, -self.rotation_deg);
        let c = self.image_center();
        Pos2::new(local.x + c.x, local.y + c.y)
    }

    /// Clamp an image-space point to `[0, w-1] × [0, h-1]`.
    pub fn clamp_to_image(&self, p: Pos2) -> Pos2 {
        let max_x = self.image_w.saturating_sub(1) as f32;
        let max_y = self.image_h.saturating_sub(1) as f32;
        Pos2::new(p.x.clamp(0.0, max_x), p.y.clamp(0.0, max_y))
    }
}

/// Bounding size of a `w × h` rectangle rotated by `degrees`.
pub fn rotated_bounds(w: u32, h: u32, degrees: f32) -> (f32, f32) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (sin, cos) = (sin.abs(), cos.abs());
    let (w, h) = (w as f32, h as f32);
    (w * cos + h * sin, w * sin + h * cos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Pos2, b: Pos2, tol: f32) -> bool {
        (a - b).length() <= tol
    }

    #[test]
    fn identity_without_viewport() {
        let v = ViewTransform::new(100, 80);
        let p = Pos2::new(12.0, 34.0);
        assert!(close(v.to_image_space(p), p, 1e-4));
        assert!(close(v.to_view_space(p), p, 1e-4));
        assert_eq!(v.base_fit_scale(), 1.0);
    }

    #[test]
    fn round_trip_across_states() {
        let mut v = ViewTransform::new(320, 200);
        v.set_viewport(800.0, 600.0);
        for &(zoom, pan, rot) in &[
            (1.0, Vec2::ZERO, 0.0),
            (2.5, Vec2::new(30.0, -12.0), 33.0),
            (0.3, Vec2::new(-200.0, 90.0), 271.5),
            (7.0, Vec2::new(5.0, 5.0), 180.0),
        ] {
            v.set_zoom(zoom);
            v.set_pan(pan);
            v.set_rotation(rot);
            for &p in &[Pos2::new(0.0, 0.0), Pos2::new(417.0, 33.5), Pos2::new(-40.0, 700.0)] {
                let back = v.to_view_space(v.to_image_space(p));
                assert!(close(back, p, 1e-2), "{p:?} -> {back:?} at zoom {zoom} rot {rot}");
            }
        }
    }

    #[test]
    fn rotated_zoomed_click_maps_to_image_point() {
        let mut v = ViewTransform::new(100, 100);
        v.set_viewport(400.0, 300.0);
        v.set_rotation(45.0);
        v.set_zoom(2.0);
        let target = Pos2::new(10.0, 10.0);
        let click = v.to_view_space(target);
        assert!(close(v.to_image_space(click), target, 1.0));
    }

    #[test]
    fn rotation_wraps() {
        let mut v = ViewTransform::new(10, 10);
        v.rotate_by(350.0);
        v.rotate_by(20.0);
        assert!((v.rotation_deg() - 10.0).abs() < 1e-4);
        v.rotate_by(-30.0);
        assert!((v.rotation_deg() - 340.0).abs() < 1e-4);
    }

    #[test]
    fn rotated_bounds_at_right_angle_swaps_axes() {
        let (w, h) = rotated_bounds(200, 100, 90.0);
        assert!((w - 100.0).abs() < 1e-3);
        assert!((h - 200.0).abs() < 1e-3);
    }

    #[test]
    fn zoom_around_point_keeps_anchor_fixed() {
        let mut v = ViewTransform::new(200, 200);
        v.set_viewport(500.0, 400.0);
        v.set_rotation(20.0);
        let anchor = Pos2::new(321.0, 111.0);
        let before = v.to_image_space(anchor);
        v.zoom_around_view_point(1.5, anchor);
        let after = v.to_image_space(anchor);
        assert!(close(before, after, 1e-2));
        assert!((v.zoom() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn zoom_is_clamped_and_rejects_nonsense() {
        let mut v = ViewTransform::new(10, 10);
        v.set_zoom(1e9);
        assert_eq!(v.zoom(), MAX_ZOOM);
        v.set_zoom(-3.0);
        assert_eq!(v.zoom(), MAX_ZOOM);
        v.set_zoom(f32::NAN);
        assert_eq!(v.zoom(), MAX_ZOOM);
    }

    #[test]
    fn clamp_to_image_bounds() {
        let v = ViewTransform::new(50, 40);
        assert_eq!(v.clamp_to_image(Pos2::new(-5.0, 99.0)), Pos2::new(0.0, 39.0));
        assert_eq!(v.clamp_to_image(Pos2::new(12.5, 3.0)), Pos2::new(12.5, 3.0));
    }
}
