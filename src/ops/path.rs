// ============================================================================
// FREEHAND PATH HELPERS - length, Ramer-Douglas-Peucker, stamp spacing
// ============================================================================

use egui::Pos2;

use crate::canvas::distance_to_segment;

/// Paths with fewer points than this are returned untouched.
pub const MIN_SIMPLIFY_POINTS: usize = 5;
/// Lower bound on the simplification tolerance, in pixels.
pub const MIN_TOLERANCE: f32 = 1.0;

/// Total length of the open polyline.
pub fn path_length(points: &[Pos2]) -> f32 {
    points.windows(2).map(|w| (w[1] - w[0]).length()).sum()
}

/// Stabilise a freehand path: Ramer-Douglas-Peucker with a tolerance of
/// `path_length * smoothing_factor`, never below one pixel.
pub fn simplify_path(points: &[Pos2], smoothing_factor: f32) -> Vec<Pos2> {
    if points.len() < MIN_SIMPLIFY_POINTS {
        return points.to_vec();
    }
    let tolerance = (path_length(points) * smoothing_factor.max(0.0)).max(MIN_TOLERANCE);
    rdp_simplify(points, tolerance)
}

/// Ramer-Douglas-Peucker polyline simplification. Endpoints are always kept.
pub fn rdp_simplify(points: &[Pos2], epsilon: f32) -> Vec<Pos2> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    // Explicit stack instead of recursion; long strokes can hold thousands
    // of samples.
    let mut spans = vec![(0usize, points.len() - 1)];
    while let Some((start, end)) = spans.pop() {
        if end <= start + 1 {
            continue;
        }
        let (a, b) = (points[start], points[end]);
        let mut max_dist = 0.0f32;
        let mut max_idx = start;
        for (i, p) in points.iter().enumerate().take(end).skip(start + 1) {
            let d = distance_to_segment(*p, a, b);
            if d > max_dist {
                max_dist = d;
                max_idx = i;
            }
        }
        if max_dist > epsilon {
            keep[max_idx] = true;
            spans.push((start, max_idx));
            spans.push((max_idx, end));
        }
    }

    points.iter().zip(keep).filter_map(|(p, k)| k.then_some(*p)).collect()
}

/// Evenly spaced stamp centres from `a` to `b`, both ends included.
pub fn interpolate_stamps(a: Pos2, b: Pos2, spacing: f32) -> Vec<Pos2> {
    let spacing = spacing.max(1.0);
    let len = (b - a).length();
    let steps = (len / spacing).ceil().max(1.0) as usize;
    if len < f32::EPSILON {
        return vec![a];
    }
    (0..=steps).map(|i| a.lerp(b, i as f32 / steps as f32)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_paths_are_untouched() {
        let pts = vec![Pos2::new(0.0, 0.0), Pos2::new(1.0, 5.0), Pos2::new(2.0, 0.0), Pos2::new(3.0, 5.0)];
        assert_eq!(simplify_path(&pts, 0.5), pts);
    }

    #[test]
    fn collinear_run_collapses_to_endpoints() {
        let pts: Vec<Pos2> = (0..50).map(|i| Pos2::new(i as f32, 2.0 * i as f32)).collect();
        let out = simplify_path(&pts, 0.005);
        assert_eq!(out, vec![pts[0], pts[49]]);
    }

    #[test]
    fn corners_survive_simplification() {
        let mut pts: Vec<Pos2> = (0..=40).map(|i| Pos2::new(i as f32, 0.0)).collect();
        pts.extend((1..=40).map(|i| Pos2::new(40.0, i as f32)));
        let out = simplify_path(&pts, 0.005);
        assert_eq!(out, vec![Pos2::new(0.0, 0.0), Pos2::new(40.0, 0.0), Pos2::new(40.0, 40.0)]);
    }

    #[test]
    fn jitter_below_tolerance_is_removed() {
        // Length ~283, factor 0.01 -> tolerance ~2.8px; 1px jitter disappears.
        let pts: Vec<Pos2> = (0..=200)
            .map(|i| Pos2::new(i as f32, if i % 2 == 0 { 0.5 } else { -0.5 }))
            .collect();
        let out = simplify_path(&pts, 0.01);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn length_sums_segments() {
        let pts = [Pos2::new(0.0, 0.0), Pos2::new(3.0, 4.0), Pos2::new(3.0, 10.0)];
        assert!((path_length(&pts) - 11.0).abs() < 1e-5);
        assert_eq!(path_length(&pts[..1]), 0.0);
    }

    #[test]
    fn stamps_are_evenly_spaced() {
        let stamps = interpolate_stamps(Pos2::new(0.0, 0.0), Pos2::new(10.0, 0.0), 2.5);
        assert_eq!(stamps.len(), 5);
        assert_eq!(stamps[0], Pos2::new(0.0, 0.0));
        assert_eq!(*stamps.last().unwrap(), Pos2::new(10.0, 0.0));
        assert_eq!(interpolate_stamps(Pos2::new(3.0, 3.0), Pos2::new(3.0, 3.0), 4.0).len(), 1);
    }
}
