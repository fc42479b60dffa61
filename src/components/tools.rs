use egui::{Modifiers, PointerButton, Pos2, Vec2};
use image::Rgba;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::canvas::{PixelBuffer, SelectionMask, SelectionMode, SelectionShape};
use crate::components::history::HistoryManager;
use crate::config::ToolConfig;
use crate::ops::fill::{fill_region, flood_fill_mask};
use crate::ops::floating::FloatingRegion;
use crate::ops::magnetic::{EdgeMapCache, snap_to_edge};
use crate::ops::path::{interpolate_stamps, simplify_path};
use crate::ops::shapes::{StrokeBuffer, StrokeSource, draw_ellipse, draw_line, draw_rect};

/// Lasso samples closer than this to the previous one are dropped.
const MIN_LASSO_STEP: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Box,
    Lasso,
    #[default]
    Brush,
    Eraser,
    Pen,
    Line,
    Rect,
    Ellipse,
    Fill,
    Eyedropper,
    CloneStamp,
    Move,
}

impl Tool {
    /// Stable identifier used in settings text.
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Box => "box",
            Tool::Lasso => "lasso",
            Tool::Brush => "brush",
            Tool::Eraser => "eraser",
            Tool::Pen => "pen",
            Tool::Line => "line",
            Tool::Rect => "rect",
            Tool::Ellipse => "ellipse",
            Tool::Fill => "fill",
            Tool::Eyedropper => "eyedropper",
            Tool::CloneStamp => "clone_stamp",
            Tool::Move => "move",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::all().iter().copied().find(|t| t.name() == name)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tool::Box => "Box Select",
            Tool::Lasso => "Lasso",
            Tool::Brush => "Selection Brush",
            Tool::Eraser => "Selection Eraser",
            Tool::Pen => "Pen",
            Tool::Line => "Line",
            Tool::Rect => "Rectangle",
            Tool::Ellipse => "Ellipse",
            Tool::Fill => "Fill",
            Tool::Eyedropper => "Eyedropper",
            Tool::CloneStamp => "Clone Stamp",
            Tool::Move => "Move",
        }
    }

    pub fn all() -> &'static [Tool] {
        &[
            Tool::Box,
            Tool::Lasso,
            Tool::Brush,
            Tool::Eraser,
            Tool::Pen,
            Tool::Line,
            Tool::Rect,
            Tool::Ellipse,
            Tool::Fill,
            Tool::Eyedropper,
            Tool::CloneStamp,
            Tool::Move,
        ]
    }

    /// Tools that only ever write the selection mask.
    pub fn is_selection_tool(&self) -> bool {
        matches!(self, Tool::Box | Tool::Lasso | Tool::Brush | Tool::Eraser)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerPhase {
    Press,
    Move,
    Release,
}

/// One pointer sample as delivered by the host, in view coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub pos: Pos2,
    pub button: PointerButton,
    pub modifiers: Modifiers,
    /// Steady-hand (straight-line) mode key held.
    pub steady: bool,
}

impl PointerEvent {
    pub fn new(pos: Pos2) -> Self {
        Self {
            pos,
            button: PointerButton::Primary,
            modifiers: Modifiers::NONE,
            steady: false,
        }
    }

    pub fn with_button(mut self, button: PointerButton) -> Self {
        self.button = button;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_steady(mut self, steady: bool) -> Self {
        self.steady = steady;
        self
    }

    /// Secondary-button gestures subtract from the selection.
    fn selection_mode(&self) -> SelectionMode {
        if self.button == PointerButton::Secondary {
            SelectionMode::Subtract
        } else {
            SelectionMode::Add
        }
    }
}

/// What a dispatched pointer event did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ToolOutcome {
    /// Nothing to do: missing precondition or no gesture in progress.
    Ignored,
    /// Transient gesture state changed (anchor, preview, path).
    Updated,
    /// The image or the selection mask changed.
    Committed,
    /// Eyedropper result.
    ColorPicked(Rgba<u8>),
}

/// Everything a tool may touch while handling one event. Borrowed from the
/// session for the duration of the call.
pub struct ToolContext<'a> {
    pub image: &'a mut PixelBuffer,
    pub mask: &'a mut SelectionMask,
    pub pristine: &'a PixelBuffer,
    pub history: &'a mut HistoryManager,
    pub edges: &'a mut EdgeMapCache,
    pub config: &'a ToolConfig,
}

impl ToolContext<'_> {
    fn push_undo(&mut self, description: &str) {
        self.history.push_undo(description, &*self.image, &*self.mask);
    }

    /// Roll back to the snapshot pushed at the start of the current gesture.
    fn revert(&mut self) {
        if self.history.undo(self.image, self.mask).is_some() {
            self.history.discard_redo();
            self.edges.mark_dirty();
        }
    }

    fn clamp(&self, p: Pos2) -> Pos2 {
        let max_x = self.image.width().saturating_sub(1) as f32;
        let max_y = self.image.height().saturating_sub(1) as f32;
        Pos2::new(p.x.clamp(0.0, max_x), p.y.clamp(0.0, max_y))
    }

    fn pixel_at(&self, p: Pos2) -> Option<(u32, u32)> {
        let (x, y) = (p.x.round(), p.y.round());
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return None;
        }
        let (x, y) = (x as u32, y as u32);
        (x < self.image.width() && y < self.image.height()).then_some((x, y))
    }

    fn brush_radius(&self) -> f32 {
        self.config.brush_size.max(1) as f32 / 2.0
    }

    fn draw_radius(&self) -> f32 {
        self.config.draw_size.max(1) as f32 / 2.0
    }
}

// ============================================================================
// PER-TOOL GESTURE STATE
// ============================================================================

/// Box select drag.
#[derive(Clone, Debug, Default)]
pub struct SelectionToolState {
    pub dragging: bool,
    pub drag_start: Option<Pos2>,
    pub drag_end: Option<Pos2>,
    /// Combine mode locked at press.
    pub mode: SelectionMode,
}

/// Lasso path in image coordinates.
#[derive(Clone, Debug, Default)]
pub struct LassoState {
    pub points: Vec<Pos2>,
    pub dragging: bool,
    pub mode: SelectionMode,
    /// Points were snapped to edges; skip simplification on close.
    pub magnetic: bool,
    /// Steady-hand path: one straight segment per press/release, left open
    /// until [`ToolsState::finish_lasso`].
    pub straight: bool,
    /// Live end of the pending straight segment.
    pub straight_end: Option<Pos2>,
}

/// Brush, eraser, pen and clone strokes.
#[derive(Default)]
struct StrokeTracker {
    active: bool,
    /// Steady-hand gesture: stamps are laid down on release only.
    steady: bool,
    /// An undo snapshot was pushed for this stroke.
    pushed: bool,
    last: Option<Pos2>,
    mode: SelectionMode,
    buffer: Option<StrokeBuffer>,
}

/// Line/rectangle/ellipse anchor and live endpoint.
#[derive(Clone, Debug, Default)]
pub struct ShapeState {
    pub anchor: Option<Pos2>,
    pub end: Pos2,
}

#[derive(Clone, Debug, Default)]
pub struct CloneStampState {
    /// Source point in image coordinates (set via Alt+Click).
    pub source: Option<Pos2>,
    /// Offset from paint position to source, locked on the first stroke
    /// after the source is set.
    pub offset: Option<Vec2>,
}

#[derive(Clone, Debug, Default)]
pub struct MoveState {
    pub floating: Option<FloatingRegion>,
    /// Selection that was lifted, kept for an external inpainting pass.
    pub vacated: Option<SelectionMask>,
    drag_anchor: Option<Pos2>,
    drag_start_offset: Vec2,
}

// ============================================================================
// TOOLS STATE - dispatch of press/drag/release to the active tool
// ============================================================================

#[derive(Default)]
pub struct ToolsState {
    active_tool: Tool,
    pub selection: SelectionToolState,
    pub lasso: LassoState,
    stroke: StrokeTracker,
    pub shape: ShapeState,
    pub clone_stamp: CloneStampState,
    pub move_state: MoveState,
    /// Chained steady-hand anchor for brush/eraser.
    steady_anchor: Option<Pos2>,
}

impl ToolsState {
    pub fn new(tool: Tool) -> Self {
        Self { active_tool: tool, ..Self::default() }
    }

    pub fn active_tool(&self) -> Tool {
        self.active_tool
    }

    /// Switch tools. Refused (returns `false`) while a gesture is in progress.
    pub fn change_tool(&mut self, tool: Tool) -> bool {
        if tool == self.active_tool {
            return true;
        }
        if self.has_active_gesture() {
            debug!(from = self.active_tool.name(), to = tool.name(), "tool switch ignored mid-gesture");
            return false;
        }
        self.active_tool = tool;
        self.steady_anchor = None;
        self.clone_stamp = CloneStampState::default();
        true
    }

    /// A press has been seen and its release has not.
    pub fn is_dragging(&self) -> bool {
        self.selection.dragging
            || self.lasso.dragging
            || self.stroke.active
            || self.shape.anchor.is_some()
            || self.move_state.drag_anchor.is_some()
    }

    /// Any state that must be finished or cancelled before a tool switch.
    pub fn has_active_gesture(&self) -> bool {
        self.is_dragging() || !self.lasso.points.is_empty() || self.move_state.floating.is_some()
    }

    pub fn floating(&self) -> Option<&FloatingRegion> {
        self.move_state.floating.as_ref()
    }

    pub fn lasso_points(&self) -> &[Pos2] {
        &self.lasso.points
    }

    /// Selection outline in progress, for host overlays.
    pub fn selection_preview(&self) -> Option<SelectionShape> {
        match self.active_tool {
            Tool::Box if self.selection.dragging => {
                let (a, b) = (self.selection.drag_start?, self.selection.drag_end?);
                Some(SelectionShape::rect_from_corners(a, b))
            }
            Tool::Lasso if !self.lasso.points.is_empty() => {
                let mut pts = self.lasso.points.clone();
                pts.extend(self.lasso.straight_end);
                Some(SelectionShape::Polygon(pts))
            }
            _ => None,
        }
    }

    pub fn dispatch(&mut self, phase: PointerPhase, ctx: &mut ToolContext, event: &PointerEvent, p: Pos2) -> ToolOutcome {
        match phase {
            PointerPhase::Press => self.press(ctx, event, p),
            PointerPhase::Move => self.drag(ctx, event, p),
            PointerPhase::Release => self.release(ctx, event, p),
        }
    }

    /// `p` is the pointer in image space, unclamped.
    pub fn press(&mut self, ctx: &mut ToolContext, event: &PointerEvent, p: Pos2) -> ToolOutcome {
        if self.is_dragging() {
            // A press without a release: close out the old gesture first.
            self.release(ctx, event, p);
        }
        if self.move_state.floating.is_some() {
            return self.move_press(p);
        }
        match self.active_tool {
            Tool::Box => self.box_press(ctx, event, p),
            Tool::Lasso => self.lasso_press(ctx, event, p),
            Tool::Brush | Tool::Eraser => self.brush_press(ctx, event, p),
            Tool::Pen => self.pen_press(ctx, p),
            Tool::Line | Tool::Rect | Tool::Ellipse => {
                let p = ctx.clamp(p);
                self.shape = ShapeState { anchor: Some(p), end: p };
                ToolOutcome::Updated
            }
            Tool::Fill => self.fill_press(ctx, p),
            Tool::Eyedropper => match ctx.pixel_at(p) {
                Some((x, y)) => ToolOutcome::ColorPicked(*ctx.image.get_pixel(x, y)),
                None => ToolOutcome::Ignored,
            },
            Tool::CloneStamp => self.clone_press(ctx, event, p),
            Tool::Move => ToolOutcome::Ignored,
        }
    }

    pub fn drag(&mut self, ctx: &mut ToolContext, event: &PointerEvent, p: Pos2) -> ToolOutcome {
        if self.move_state.drag_anchor.is_some() {
            return self.move_drag(p);
        }
        match self.active_tool {
            Tool::Box if self.selection.dragging => {
                self.selection.drag_end = Some(ctx.clamp(p));
                ToolOutcome::Updated
            }
            Tool::Lasso if self.lasso.dragging => self.lasso_drag(ctx, p),
            Tool::Brush | Tool::Eraser if self.stroke.active => match self.follow_steady_key(ctx, event, p) {
                Some(outcome) => outcome,
                None => self.stroke_drag(ctx, p),
            },
            Tool::Pen | Tool::CloneStamp if self.stroke.active => self.stroke_drag(ctx, p),
            Tool::Line | Tool::Rect | Tool::Ellipse if self.shape.anchor.is_some() => {
                self.shape.end = ctx.clamp(p);
                ToolOutcome::Updated
            }
            _ => ToolOutcome::Ignored,
        }
    }

    pub fn release(&mut self, ctx: &mut ToolContext, event: &PointerEvent, p: Pos2) -> ToolOutcome {
        if self.move_state.drag_anchor.is_some() {
            self.move_drag(p);
            self.move_state.drag_anchor = None;
            return ToolOutcome::Updated;
        }
        match self.active_tool {
            Tool::Box => self.box_release(ctx, p),
            Tool::Lasso => self.lasso_release(ctx, p),
            Tool::Brush | Tool::Eraser if self.stroke.active => {
                let switched = self.follow_steady_key(ctx, event, p);
                if self.stroke.steady {
                    return self.steady_release(ctx, p);
                }
                let outcome = self.stroke_drag(ctx, p);
                self.stroke = StrokeTracker::default();
                switched.unwrap_or(outcome)
            }
            Tool::Pen | Tool::CloneStamp if self.stroke.active => {
                let outcome = self.stroke_drag(ctx, p);
                self.stroke = StrokeTracker::default();
                outcome
            }
            Tool::Line | Tool::Rect | Tool::Ellipse => self.shape_release(ctx, p),
            _ => ToolOutcome::Ignored,
        }
    }

    // ------------------------------------------------------------------
    // Box select
    // ------------------------------------------------------------------

    fn box_press(&mut self, ctx: &ToolContext, event: &PointerEvent, p: Pos2) -> ToolOutcome {
        let p = ctx.clamp(p);
        self.selection = SelectionToolState {
            dragging: true,
            drag_start: Some(p),
            drag_end: Some(p),
            mode: event.selection_mode(),
        };
        ToolOutcome::Updated
    }

    fn box_release(&mut self, ctx: &mut ToolContext, p: Pos2) -> ToolOutcome {
        if !self.selection.dragging {
            return ToolOutcome::Ignored;
        }
        let end = ctx.clamp(p);
        let state = std::mem::take(&mut self.selection);
        let Some(start) = state.drag_start else {
            return ToolOutcome::Ignored;
        };
        // A click without a drag leaves the selection alone.
        if (end.x - start.x).abs() < 1.0 && (end.y - start.y).abs() < 1.0 {
            return ToolOutcome::Updated;
        }
        ctx.push_undo("Box Select");
        ctx.mask.apply_shape(&SelectionShape::rect_from_corners(start, end), state.mode);
        ToolOutcome::Committed
    }

    // ------------------------------------------------------------------
    // Lasso (freehand, magnetic, steady-hand)
    // ------------------------------------------------------------------

    fn lasso_sample(&self, ctx: &mut ToolContext, p: Pos2) -> Pos2 {
        let p = ctx.clamp(p);
        if !self.lasso.magnetic {
            return p;
        }
        let radius = ctx.config.snap_radius as f32;
        let edges = ctx.edges.get_or_compute(&*ctx.image);
        snap_to_edge(edges, p, radius)
    }

    fn lasso_press(&mut self, ctx: &mut ToolContext, event: &PointerEvent, p: Pos2) -> ToolOutcome {
        if self.lasso.straight || (event.steady && self.lasso.points.is_empty()) {
            let p = ctx.clamp(p);
            if self.lasso.points.is_empty() {
                self.lasso = LassoState {
                    points: vec![p],
                    mode: event.selection_mode(),
                    straight: true,
                    ..LassoState::default()
                };
            }
            self.lasso.dragging = true;
            self.lasso.straight_end = Some(p);
            return ToolOutcome::Updated;
        }
        self.lasso = LassoState {
            mode: event.selection_mode(),
            magnetic: ctx.config.magnetic_lasso,
            dragging: true,
            ..LassoState::default()
        };
        let first = self.lasso_sample(ctx, p);
        self.lasso.points.push(first);
        ToolOutcome::Updated
    }

    fn lasso_drag(&mut self, ctx: &mut ToolContext, p: Pos2) -> ToolOutcome {
        if self.lasso.straight {
            self.lasso.straight_end = Some(ctx.clamp(p));
            return ToolOutcome::Updated;
        }
        let q = self.lasso_sample(ctx, p);
        if self.lasso.points.last().is_none_or(|last| (q - *last).length() >= MIN_LASSO_STEP) {
            self.lasso.points.push(q);
        }
        ToolOutcome::Updated
    }

    fn lasso_release(&mut self, ctx: &mut ToolContext, p: Pos2) -> ToolOutcome {
        if !self.lasso.dragging {
            return ToolOutcome::Ignored;
        }
        if self.lasso.straight {
            let q = ctx.clamp(p);
            self.lasso.dragging = false;
            self.lasso.straight_end = None;
            if self.lasso.points.last().is_none_or(|last| (q - *last).length() >= MIN_LASSO_STEP) {
                self.lasso.points.push(q);
            }
            return ToolOutcome::Updated;
        }
        self.lasso_drag(ctx, p);
        self.close_lasso(ctx)
    }

    /// Close an open steady-hand lasso path into the selection.
    pub fn finish_lasso(&mut self, ctx: &mut ToolContext) -> ToolOutcome {
        if self.lasso.points.is_empty() || self.lasso.dragging {
            return ToolOutcome::Ignored;
        }
        self.close_lasso(ctx)
    }

    fn close_lasso(&mut self, ctx: &mut ToolContext) -> ToolOutcome {
        let lasso = std::mem::take(&mut self.lasso);
        if lasso.points.len() < 3 {
            return ToolOutcome::Updated;
        }
        let points = if lasso.magnetic || lasso.straight {
            lasso.points
        } else {
            simplify_path(&lasso.points, ctx.config.smoothing_factor)
        };
        debug!(points = points.len(), magnetic = lasso.magnetic, "closing lasso");
        ctx.push_undo("Lasso Select");
        ctx.mask.apply_shape(&SelectionShape::Polygon(points), lasso.mode);
        ToolOutcome::Committed
    }

    // ------------------------------------------------------------------
    // Brush / eraser (selection) and pen / clone (pixels)
    // ------------------------------------------------------------------

    fn brush_press(&mut self, ctx: &mut ToolContext, event: &PointerEvent, p: Pos2) -> ToolOutcome {
        let p = ctx.clamp(p);
        let mode = if self.active_tool == Tool::Eraser { SelectionMode::Subtract } else { event.selection_mode() };
        if event.steady {
            if self.steady_anchor.is_none() {
                self.steady_anchor = Some(p);
            }
            self.stroke = StrokeTracker { active: true, steady: true, mode, ..StrokeTracker::default() };
            return ToolOutcome::Updated;
        }
        self.steady_anchor = None;
        self.stroke = StrokeTracker { active: true, mode, ..StrokeTracker::default() };
        self.begin_freehand(ctx, p)
    }

    fn brush_description(&self) -> &'static str {
        if self.active_tool == Tool::Eraser { "Erase Selection" } else { "Brush Select" }
    }

    /// Take the stroke's undo snapshot once per gesture.
    fn ensure_brush_snapshot(&mut self, ctx: &mut ToolContext) {
        if self.stroke.pushed {
            return;
        }
        ctx.push_undo(self.brush_description());
        self.stroke.pushed = true;
        self.stroke.buffer = self.restore_buffer(ctx);
    }

    /// Continuous stamping from `p` (already clamped).
    fn begin_freehand(&mut self, ctx: &mut ToolContext, p: Pos2) -> ToolOutcome {
        self.ensure_brush_snapshot(ctx);
        self.stroke.steady = false;
        self.stroke.last = Some(p);
        self.brush_stamp(ctx, p, p);
        ToolOutcome::Committed
    }

    /// The steady-hand key is re-read on every sample of a brush/eraser
    /// drag. Letting go switches to freehand stamping from the current
    /// point; pressing it finishes the freehand run here and anchors the
    /// straight segment. `None` when the mode did not change.
    fn follow_steady_key(&mut self, ctx: &mut ToolContext, event: &PointerEvent, p: Pos2) -> Option<ToolOutcome> {
        let p = ctx.clamp(p);
        match (self.stroke.steady, event.steady) {
            (true, false) => {
                self.steady_anchor = None;
                debug!("steady-hand released mid-stroke");
                Some(self.begin_freehand(ctx, p))
            }
            (false, true) => {
                self.stroke_drag(ctx, p);
                self.stroke.steady = true;
                self.stroke.last = None;
                self.steady_anchor = Some(p);
                debug!("steady-hand engaged mid-stroke");
                Some(ToolOutcome::Committed)
            }
            _ => None,
        }
    }

    /// Eraser in restore mode paints the pristine image back.
    fn restore_buffer(&self, ctx: &ToolContext) -> Option<StrokeBuffer> {
        if self.active_tool != Tool::Eraser || !ctx.config.eraser_restores {
            return None;
        }
        if ctx.pristine.dimensions() != ctx.image.dimensions() {
            return None;
        }
        Some(StrokeBuffer::new(
            &*ctx.image,
            StrokeSource::Image(ctx.pristine.clone()),
            1.0,
            ctx.config.hardness,
        ))
    }

    /// One brush/eraser step from `a` to `b` (a point stamp when equal).
    fn brush_stamp(&mut self, ctx: &mut ToolContext, a: Pos2, b: Pos2) {
        let radius = ctx.brush_radius();
        let shape = if a == b {
            SelectionShape::Circle { center: b, radius }
        } else {
            SelectionShape::Segment { a, b, radius }
        };
        ctx.mask.apply_shape(&shape, self.stroke.mode);
        if let Some(buffer) = self.stroke.buffer.as_mut() {
            if a == b {
                buffer.stamp_circle(ctx.image, b, radius);
            } else {
                buffer.stamp_segment(ctx.image, a, b, radius);
            }
            ctx.edges.mark_dirty();
        }
    }

    fn steady_release(&mut self, ctx: &mut ToolContext, p: Pos2) -> ToolOutcome {
        let end = ctx.clamp(p);
        let anchor = self.steady_anchor.unwrap_or(end);
        self.ensure_brush_snapshot(ctx);
        let spacing = ctx.config.brush_size.max(1) as f32 * ctx.config.stamp_spacing;
        for c in interpolate_stamps(anchor, end, spacing) {
            self.brush_stamp(ctx, c, c);
        }
        self.stroke = StrokeTracker::default();
        self.steady_anchor = Some(end);
        ToolOutcome::Committed
    }

    fn pen_press(&mut self, ctx: &mut ToolContext, p: Pos2) -> ToolOutcome {
        let p = ctx.clamp(p);
        let radius = ctx.draw_radius();
        ctx.push_undo("Pen");
        let buffer = StrokeBuffer::new(
            &*ctx.image,
            StrokeSource::Solid(ctx.config.draw_rgba()),
            ctx.config.opacity,
            ctx.config.hardness,
        );
        self.start_pixel_stroke(ctx, buffer, p, radius)
    }

    fn clone_press(&mut self, ctx: &mut ToolContext, event: &PointerEvent, p: Pos2) -> ToolOutcome {
        let p = ctx.clamp(p);
        if event.modifiers.alt {
            self.clone_stamp = CloneStampState { source: Some(p), offset: None };
            debug!(x = p.x, y = p.y, "clone source set");
            return ToolOutcome::Updated;
        }
        let Some(source) = self.clone_stamp.source else {
            return ToolOutcome::Ignored;
        };
        let offset = *self.clone_stamp.offset.get_or_insert(source - p);
        let radius = ctx.brush_radius();
        ctx.push_undo("Clone Stamp");
        let buffer = StrokeBuffer::new(
            &*ctx.image,
            StrokeSource::Offset { dx: offset.x.round() as i32, dy: offset.y.round() as i32 },
            ctx.config.opacity,
            ctx.config.hardness,
        );
        self.start_pixel_stroke(ctx, buffer, p, radius)
    }

    fn start_pixel_stroke(&mut self, ctx: &mut ToolContext, mut buffer: StrokeBuffer, p: Pos2, radius: f32) -> ToolOutcome {
        buffer.stamp_circle(ctx.image, p, radius);
        ctx.edges.mark_dirty();
        self.stroke = StrokeTracker {
            active: true,
            pushed: true,
            last: Some(p),
            buffer: Some(buffer),
            ..StrokeTracker::default()
        };
        ToolOutcome::Committed
    }

    fn stroke_drag(&mut self, ctx: &mut ToolContext, p: Pos2) -> ToolOutcome {
        if self.stroke.steady {
            return ToolOutcome::Updated;
        }
        let p = ctx.clamp(p);
        let Some(last) = self.stroke.last else {
            return ToolOutcome::Ignored;
        };
        if last == p {
            return ToolOutcome::Ignored;
        }
        match self.active_tool {
            Tool::Brush | Tool::Eraser => self.brush_stamp(ctx, last, p),
            _ => {
                let radius = if self.active_tool == Tool::Pen { ctx.draw_radius() } else { ctx.brush_radius() };
                if let Some(buffer) = self.stroke.buffer.as_mut() {
                    buffer.stamp_segment(ctx.image, last, p, radius);
                    ctx.edges.mark_dirty();
                }
            }
        }
        self.stroke.last = Some(p);
        ToolOutcome::Committed
    }

    // ------------------------------------------------------------------
    // Shapes, fill
    // ------------------------------------------------------------------

    fn shape_release(&mut self, ctx: &mut ToolContext, p: Pos2) -> ToolOutcome {
        let Some(anchor) = self.shape.anchor.take() else {
            return ToolOutcome::Ignored;
        };
        let end = ctx.clamp(p);
        ctx.push_undo(self.active_tool.label());
        draw_shape(self.active_tool, ctx.image, anchor, end, ctx.config);
        ctx.edges.mark_dirty();
        ToolOutcome::Committed
    }

    fn fill_press(&mut self, ctx: &mut ToolContext, p: Pos2) -> ToolOutcome {
        let Some((x, y)) = ctx.pixel_at(p) else {
            return ToolOutcome::Ignored;
        };
        let (region, bounds) = flood_fill_mask(&*ctx.image, x, y, ctx.config.fill_tolerance, Some(&*ctx.mask));
        if bounds.is_none() {
            return ToolOutcome::Ignored;
        }
        ctx.push_undo("Fill");
        fill_region(ctx.image, &region, ctx.config.draw_rgba(), ctx.config.opacity);
        ctx.edges.mark_dirty();
        ToolOutcome::Committed
    }

    // ------------------------------------------------------------------
    // Move (floating region)
    // ------------------------------------------------------------------

    /// Lift the selection into a floating region. Vacated pixels take
    /// `fill`, the selection is cleared, and the active tool becomes
    /// [`Tool::Move`]. Returns `false` when nothing is selected or another
    /// gesture is in progress.
    pub fn start_move(&mut self, ctx: &mut ToolContext, fill: Rgba<u8>) -> bool {
        if self.has_active_gesture() || ctx.mask.is_empty() {
            return false;
        }
        ctx.push_undo("Move Selection");
        let Some(region) = FloatingRegion::extract(ctx.image, &*ctx.mask, fill) else {
            ctx.revert();
            return false;
        };
        self.move_state = MoveState {
            floating: Some(region),
            vacated: Some(ctx.mask.clone()),
            ..MoveState::default()
        };
        ctx.mask.clear();
        ctx.edges.mark_dirty();
        self.active_tool = Tool::Move;
        true
    }

    pub fn set_move_offset(&mut self, offset: Vec2) -> bool {
        match self.move_state.floating.as_mut() {
            Some(region) => {
                region.set_offset(offset);
                true
            }
            None => false,
        }
    }

    pub fn set_move_transform(&mut self, rotation_deg: f32, scale: f32) -> bool {
        match self.move_state.floating.as_mut() {
            Some(region) => {
                region.set_transform(rotation_deg, scale);
                true
            }
            None => false,
        }
    }

    /// Composite the floating region into the image. A no-op without one.
    pub fn confirm_move(&mut self, ctx: &mut ToolContext) -> bool {
        let Some(region) = self.move_state.floating.take() else {
            return false;
        };
        self.move_state.drag_anchor = None;
        region.composite_into(ctx.image);
        ctx.edges.mark_dirty();
        true
    }

    /// Drop the floating region and restore the pre-move image.
    pub fn cancel_move(&mut self, ctx: &mut ToolContext) -> bool {
        if self.move_state.floating.is_none() {
            return false;
        }
        self.move_state = MoveState::default();
        ctx.revert();
        true
    }

    pub fn take_vacated_mask(&mut self) -> Option<SelectionMask> {
        self.move_state.vacated.take()
    }

    fn move_press(&mut self, p: Pos2) -> ToolOutcome {
        let Some(region) = self.move_state.floating.as_ref() else {
            return ToolOutcome::Ignored;
        };
        self.move_state.drag_start_offset = region.offset;
        self.move_state.drag_anchor = Some(p);
        ToolOutcome::Updated
    }

    fn move_drag(&mut self, p: Pos2) -> ToolOutcome {
        let Some(anchor) = self.move_state.drag_anchor else {
            return ToolOutcome::Ignored;
        };
        let offset = self.move_state.drag_start_offset + (p - anchor);
        if self.set_move_offset(offset) { ToolOutcome::Updated } else { ToolOutcome::Ignored }
    }

    // ------------------------------------------------------------------
    // Cancel / preview
    // ------------------------------------------------------------------

    /// Abandon whatever is in progress. Partial strokes are rolled back to
    /// their undo snapshot; a floating region is cancelled.
    pub fn cancel_gesture(&mut self, ctx: &mut ToolContext) -> bool {
        let mut cancelled = self.has_active_gesture();
        if self.stroke.active && self.stroke.pushed {
            ctx.revert();
        }
        self.stroke = StrokeTracker::default();
        self.selection = SelectionToolState::default();
        self.lasso = LassoState::default();
        self.shape = ShapeState::default();
        self.steady_anchor = None;
        if self.move_state.floating.is_some() {
            self.cancel_move(ctx);
            cancelled = true;
        }
        self.move_state.drag_anchor = None;
        cancelled
    }

    /// Forget all gesture state without touching any image (new image loaded).
    pub fn reset(&mut self) {
        *self = Self::new(self.active_tool);
    }

    /// Draw the uncommitted parts of the current gesture onto `display`:
    /// the live shape, then the floating region.
    pub fn render_preview(&self, display: &mut PixelBuffer, config: &ToolConfig) {
        if let Some(anchor) = self.shape.anchor {
            draw_shape(self.active_tool, display, anchor, self.shape.end, config);
        }
        if let Some(region) = self.move_state.floating.as_ref() {
            region.composite_into(display);
        }
    }
}

fn draw_shape(tool: Tool, image: &mut PixelBuffer, a: Pos2, b: Pos2, config: &ToolConfig) {
    let width = config.draw_size.max(1) as f32;
    let color = config.draw_rgba();
    match tool {
        Tool::Line => draw_line(image, a, b, width, color, config.opacity),
        Tool::Rect => draw_rect(image, a, b, width, color, config.opacity, config.filled),
        Tool::Ellipse => draw_ellipse(image, a, b, width, color, config.opacity, config.filled),
        _ => {}
    }
}
