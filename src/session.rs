// ============================================================================
// EDITOR SESSION - single owner of the image, selection, history and view
// ============================================================================

use egui::{Modifiers, PointerButton, Pos2, Vec2};
use image::Rgba;
use tracing::{debug, info, warn};

use crate::canvas::{PixelBuffer, SelectionMask};
use crate::components::history::HistoryManager;
use crate::components::tools::{PointerEvent, PointerPhase, Tool, ToolContext, ToolOutcome, ToolsState};
use crate::config::ToolConfig;
use crate::ops::adjustments::{Adjustment, apply_adjustment_to};
use crate::ops::magnetic::EdgeMapCache;
use crate::ops::transform::{self, Interpolation, rotate_for_display};
use crate::view::ViewTransform;

/// Zoom multiplier per wheel notch.
const WHEEL_ZOOM_STEP: f32 = 1.1;

/// The interactive canvas: committed image, pristine copy, selection mask,
/// undo history, edge map, view transform and tool state.
///
/// Pointer events arrive in view space and are mapped to image space before
/// any tool sees them. Interactive calls never fail; unmet preconditions
/// turn into no-ops reported through `bool` or [`ToolOutcome`].
pub struct EditorSession {
    image: PixelBuffer,
    pristine: PixelBuffer,
    mask: SelectionMask,
    history: HistoryManager,
    edges: EdgeMapCache,
    view: ViewTransform,
    config: ToolConfig,
    tools: ToolsState,
    preview: Option<Adjustment>,
    /// Cached display composition; `None` when stale.
    display: Option<PixelBuffer>,
    /// Last pointer position of a middle-button pan.
    pan_anchor: Option<Pos2>,
}

impl EditorSession {
    pub fn new(image: PixelBuffer) -> Self {
        Self::with_config(image, ToolConfig::default())
    }

    pub fn with_config(image: PixelBuffer, config: ToolConfig) -> Self {
        let config = config.sanitized();
        let (w, h) = image.dimensions();
        Self {
            pristine: image.clone(),
            mask: SelectionMask::new(w, h),
            history: HistoryManager::new(config.undo_limit),
            edges: EdgeMapCache::new(config.edge_low_threshold as f32, config.edge_high_threshold as f32),
            view: ViewTransform::new(w, h),
            tools: ToolsState::new(config.tool),
            config,
            image,
            preview: None,
            display: None,
            pan_anchor: None,
        }
    }

    /// Load a new image: resets the pristine copy, selection, history,
    /// gesture state, preview and view (the viewport size is kept).
    pub fn set_image(&mut self, image: PixelBuffer) {
        let (w, h) = image.dimensions();
        info!(width = w, height = h, "loading image");
        self.pristine = image.clone();
        self.image = image;
        self.mask = SelectionMask::new(w, h);
        self.history.clear();
        self.edges.mark_dirty();
        self.tools.reset();
        self.preview = None;
        self.pan_anchor = None;
        self.view.set_image_size(w, h);
        self.view.reset();
        self.invalidate();
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The committed image, for persistence.
    pub fn base_image(&self) -> &PixelBuffer {
        &self.image
    }

    pub fn pristine_image(&self) -> &PixelBuffer {
        &self.pristine
    }

    /// Copy of the selection mask for an external mask-based operation.
    pub fn get_current_mask(&self) -> SelectionMask {
        self.mask.clone()
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn edge_cache(&self) -> &EdgeMapCache {
        &self.edges
    }

    pub fn tools(&self) -> &ToolsState {
        &self.tools
    }

    pub fn active_tool(&self) -> Tool {
        self.tools.active_tool()
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    /// Mutable view access. The display buffer is recomposed afterwards
    /// since rotation changes its geometry.
    pub fn view_mut(&mut self) -> &mut ViewTransform {
        self.invalidate();
        &mut self.view
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.view.set_viewport(width, height);
    }

    pub fn is_moving(&self) -> bool {
        self.tools.floating().is_some()
    }

    pub fn preview(&self) -> Option<Adjustment> {
        self.preview
    }

    /// What the host should draw: the committed image with the live shape,
    /// the floating region and the adjustment preview, rotated for display.
    pub fn display_buffer(&mut self) -> &PixelBuffer {
        let display = match self.display.take() {
            Some(display) => display,
            None => self.compose_display(),
        };
        self.display.insert(display)
    }

    fn compose_display(&self) -> PixelBuffer {
        let mut display = self.image.clone();
        self.tools.render_preview(&mut display, &self.config);
        if let Some(adj) = self.preview.filter(|a| !a.is_identity()) {
            display = apply_adjustment_to(&display, &adj, Some(&self.mask));
        }
        rotate_for_display(&display, self.view.rotation_deg())
    }

    fn invalidate(&mut self) {
        self.display = None;
    }

    // ------------------------------------------------------------------
    // Configuration and tools
    // ------------------------------------------------------------------

    /// Switch tools. Ignored (returns `false`) while a gesture is active.
    pub fn set_tool(&mut self, tool: Tool) -> bool {
        if !self.tools.change_tool(tool) {
            return false;
        }
        self.config.tool = tool;
        self.invalidate();
        true
    }

    /// Replace the tool configuration. Values are sanitized; a tool change
    /// mid-gesture is ignored like [`Self::set_tool`].
    pub fn set_config(&mut self, config: ToolConfig) {
        let config = config.sanitized();
        self.history.set_limit(config.undo_limit);
        self.edges
            .set_thresholds(config.edge_low_threshold as f32, config.edge_high_threshold as f32);
        let requested = config.tool;
        self.config = config;
        self.config.tool = self.tools.active_tool();
        self.set_tool(requested);
        self.invalidate();
    }

    // ------------------------------------------------------------------
    // Pointer input
    // ------------------------------------------------------------------

    pub fn pointer_press(&mut self, event: PointerEvent) -> ToolOutcome {
        if event.button == PointerButton::Middle {
            self.pan_anchor = Some(event.pos);
            return ToolOutcome::Updated;
        }
        self.dispatch(PointerPhase::Press, event)
    }

    pub fn pointer_move(&mut self, event: PointerEvent) -> ToolOutcome {
        if let Some(anchor) = self.pan_anchor {
            self.view.pan_by(event.pos - anchor);
            self.pan_anchor = Some(event.pos);
            return ToolOutcome::Updated;
        }
        self.dispatch(PointerPhase::Move, event)
    }

    pub fn pointer_release(&mut self, event: PointerEvent) -> ToolOutcome {
        if let Some(anchor) = self.pan_anchor.take() {
            self.view.pan_by(event.pos - anchor);
            return ToolOutcome::Updated;
        }
        self.dispatch(PointerPhase::Release, event)
    }

    /// Mouse wheel: zoom around the pointer with Ctrl/Cmd held, otherwise
    /// rotate the view by one rotation step in the wheel's direction.
    pub fn wheel(&mut self, delta: f32, pointer: Pos2, modifiers: Modifiers) {
        if delta == 0.0 || !delta.is_finite() {
            return;
        }
        if modifiers.ctrl || modifiers.command {
            self.view.zoom_around_view_point(WHEEL_ZOOM_STEP.powf(delta), pointer);
        } else {
            self.view.rotate_by(self.config.rotation_step as f32 * delta.signum());
            self.invalidate();
        }
    }

    fn dispatch(&mut self, phase: PointerPhase, event: PointerEvent) -> ToolOutcome {
        self.ensure_consistent();
        let p = self.view.to_image_space(event.pos);
        let outcome = self.with_tools(|tools, ctx| tools.dispatch(phase, ctx, &event, p));
        if let ToolOutcome::ColorPicked(color) = outcome {
            self.config.draw_color = [color[0], color[1], color[2]];
        }
        if outcome == ToolOutcome::Committed && phase != PointerPhase::Move {
            debug!(tool = self.tools.active_tool().name(), ?phase, "gesture committed");
        }
        outcome
    }

    /// Run `f` with the tool state and a context borrowing the canvas data.
    fn with_tools<R>(&mut self, f: impl FnOnce(&mut ToolsState, &mut ToolContext) -> R) -> R {
        let mut ctx = ToolContext {
            image: &mut self.image,
            mask: &mut self.mask,
            pristine: &self.pristine,
            history: &mut self.history,
            edges: &mut self.edges,
            config: &self.config,
        };
        let out = f(&mut self.tools, &mut ctx);
        self.display = None;
        out
    }

    /// Reallocate derived buffers whose size drifted from the image.
    fn ensure_consistent(&mut self) {
        let (w, h) = self.image.dimensions();
        self.mask.resync(w, h);
        if self.pristine.dimensions() != (w, h) {
            warn!(width = w, height = h, "pristine image size diverged, re-syncing");
            self.pristine = self.image.clone();
        }
        if self.view.image_size() != (w, h) {
            self.view.set_image_size(w, h);
        }
    }

    // ------------------------------------------------------------------
    // Gestures
    // ------------------------------------------------------------------

    /// Abandon the gesture in progress (partial strokes are rolled back,
    /// a floating region is cancelled).
    pub fn cancel_gesture(&mut self) -> bool {
        self.pan_anchor = None;
        self.with_tools(|tools, ctx| tools.cancel_gesture(ctx))
    }

    /// Close an open steady-hand lasso path into the selection.
    pub fn finish_lasso(&mut self) -> bool {
        self.ensure_consistent();
        self.with_tools(|tools, ctx| tools.finish_lasso(ctx)) == ToolOutcome::Committed
    }

    // ------------------------------------------------------------------
    // Move / transform
    // ------------------------------------------------------------------

    /// Lift the selection into a floating region, filling the vacated
    /// pixels with `fill`. `false` when nothing is selected.
    pub fn start_move(&mut self, fill: Rgba<u8>) -> bool {
        self.ensure_consistent();
        let started = self.with_tools(|tools, ctx| tools.start_move(ctx, fill));
        if started {
            self.config.tool = Tool::Move;
            if let Some(region) = self.tools.floating() {
                info!(origin = ?region.origin, "move started");
            }
        }
        started
    }

    pub fn set_move_offset(&mut self, offset: Vec2) -> bool {
        self.invalidate();
        self.tools.set_move_offset(offset)
    }

    pub fn set_move_transform(&mut self, rotation_deg: f32, scale: f32) -> bool {
        self.invalidate();
        self.tools.set_move_transform(rotation_deg, scale)
    }

    pub fn confirm_move(&mut self) -> bool {
        let confirmed = self.with_tools(|tools, ctx| tools.confirm_move(ctx));
        if confirmed {
            info!("move confirmed");
        }
        confirmed
    }

    pub fn cancel_move(&mut self) -> bool {
        let cancelled = self.with_tools(|tools, ctx| tools.cancel_move(ctx));
        if cancelled {
            info!("move cancelled");
        }
        cancelled
    }

    /// Mask of the pixels vacated by the last move, for an external
    /// inpainting pass. Yields it once.
    pub fn take_vacated_mask(&mut self) -> Option<SelectionMask> {
        self.tools.take_vacated_mask()
    }

    // ------------------------------------------------------------------
    // Adjustment preview
    // ------------------------------------------------------------------

    /// Show a colour grade without touching the committed image.
    pub fn set_preview(&mut self, brightness: f32, contrast: f32, saturation: f32) {
        self.preview = Some(Adjustment::new(brightness, contrast, saturation));
        self.invalidate();
    }

    pub fn clear_preview(&mut self) {
        if self.preview.take().is_some() {
            self.invalidate();
        }
    }

    /// Commit a colour grade (limited to the selection when one exists)
    /// with one undo step, then drop the preview.
    pub fn apply_adjustment(&mut self, brightness: f32, contrast: f32, saturation: f32) -> bool {
        let adj = Adjustment::new(brightness, contrast, saturation);
        if adj.is_identity() || self.tools.has_active_gesture() {
            self.clear_preview();
            return false;
        }
        self.ensure_consistent();
        self.history.push_undo("Adjust Colors", &self.image, &self.mask);
        self.image = apply_adjustment_to(&self.image, &adj, Some(&self.mask));
        self.edges.mark_dirty();
        self.preview = None;
        self.invalidate();
        info!(brightness = adj.brightness, contrast = adj.contrast, saturation = adj.saturation, "adjustment applied");
        true
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Undo the last committed step. With a gesture in progress this
    /// cancels the gesture instead.
    pub fn undo(&mut self) -> bool {
        if self.tools.has_active_gesture() {
            return self.cancel_gesture();
        }
        let done = self.history.undo(&mut self.image, &mut self.mask).is_some();
        if done {
            self.after_history_step();
        }
        done
    }

    pub fn redo(&mut self) -> bool {
        if self.tools.has_active_gesture() {
            return false;
        }
        let done = self.history.redo(&mut self.image, &mut self.mask).is_some();
        if done {
            self.after_history_step();
        }
        done
    }

    fn after_history_step(&mut self) {
        self.edges.mark_dirty();
        self.ensure_consistent();
        self.invalidate();
    }

    // ------------------------------------------------------------------
    // Selection commands
    // ------------------------------------------------------------------

    /// Deselect. No history entry when nothing was selected.
    pub fn clear_selection(&mut self) -> bool {
        self.ensure_consistent();
        if self.mask.is_empty() || self.tools.has_active_gesture() {
            return false;
        }
        self.history.push_undo("Deselect", &self.image, &self.mask);
        self.mask.clear();
        self.invalidate();
        true
    }

    pub fn select_all(&mut self) -> bool {
        self.edit_selection("Select All", SelectionMask::select_all)
    }

    pub fn invert_selection(&mut self) -> bool {
        self.edit_selection("Invert Selection", SelectionMask::invert)
    }

    fn edit_selection(&mut self, description: &str, edit: impl FnOnce(&mut SelectionMask)) -> bool {
        self.ensure_consistent();
        if self.tools.has_active_gesture() {
            return false;
        }
        self.history.push_undo(description, &self.image, &self.mask);
        edit(&mut self.mask);
        self.invalidate();
        true
    }

    // ------------------------------------------------------------------
    // Whole-image geometry (new baseline, not undo-tracked)
    // ------------------------------------------------------------------

    /// Crop to `(x, y, w, h)`, clipped to the image.
    pub fn crop(&mut self, x: u32, y: u32, w: u32, h: u32) -> bool {
        self.replace_geometry("crop", |img| transform::crop(img, x, y, w, h))
    }

    pub fn resize(&mut self, width: u32, height: u32, interp: Interpolation) -> bool {
        self.replace_geometry("resize", |img| transform::resize(img, width, height, interp))
    }

    pub fn rotate_90(&mut self, clockwise: bool) -> bool {
        self.replace_geometry("rotate 90", |img| Some(transform::rotate_90(img, clockwise)))
    }

    pub fn rotate_180(&mut self) -> bool {
        self.replace_geometry("rotate 180", |img| Some(transform::rotate_180(img)))
    }

    pub fn flip_horizontal(&mut self) -> bool {
        self.replace_geometry("flip horizontal", |img| Some(transform::flip_horizontal(img)))
    }

    pub fn flip_vertical(&mut self) -> bool {
        self.replace_geometry("flip vertical", |img| Some(transform::flip_vertical(img)))
    }

    /// Apply `op` to both the base and pristine images, then start a fresh
    /// baseline: empty selection, cleared history, reset view.
    fn replace_geometry<F>(&mut self, name: &str, op: F) -> bool
    where
        F: Fn(&PixelBuffer) -> Option<PixelBuffer>,
    {
        self.cancel_gesture();
        self.ensure_consistent();
        let Some(image) = op(&self.image) else {
            debug!(op = name, "geometry operation rejected");
            return false;
        };
        let pristine = op(&self.pristine).filter(|p| p.dimensions() == image.dimensions());
        let (w, h) = image.dimensions();
        self.pristine = pristine.unwrap_or_else(|| image.clone());
        self.image = image;
        self.mask = SelectionMask::new(w, h);
        self.history.clear();
        self.edges.mark_dirty();
        self.tools.reset();
        self.preview = None;
        self.view.set_image_size(w, h);
        self.view.reset();
        self.invalidate();
        info!(op = name, width = w, height = h, "image geometry replaced");
        true
    }
}
