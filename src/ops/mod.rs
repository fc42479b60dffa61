// ============================================================================
// OPS MODULE - pure pixel algorithms used by the editing session
// ============================================================================
//
// Layout:
//   shapes.rs      - brush falloff, stamps, lines/rects/ellipses, stroke buffer
//   fill.rs        - tolerance flood fill
//   path.rs        - freehand path length, simplification, stamp spacing
//   filters.rs     - luma smoothing, Sobel, Canny
//   magnetic.rs    - edge map cache and edge snapping for the lasso
//   floating.rs    - lifted selection region for move/rotate/scale
//   adjustments.rs - brightness/contrast/saturation grade
//   transform.rs   - display rotation and whole-image geometry
// ============================================================================

pub mod adjustments;
pub mod fill;
pub mod filters;
pub mod floating;
pub mod magnetic;
pub mod path;
pub mod shapes;
pub mod transform;

pub use adjustments::Adjustment;
pub use floating::FloatingRegion;
pub use magnetic::EdgeMapCache;
pub use shapes::{StrokeBuffer, StrokeSource};
