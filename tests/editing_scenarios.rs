use egui::{Modifiers, Pos2, Vec2};
use image::Rgba;
use mosaic_canvas::ops::transform::Interpolation;
use mosaic_canvas::{EditorSession, PixelBuffer, PointerEvent, Tool, ToolConfig, ToolOutcome};

const TEAL: Rgba<u8> = Rgba([30, 160, 150, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

fn click(session: &mut EditorSession, pos: Pos2) -> ToolOutcome {
    session.pointer_press(PointerEvent::new(pos));
    session.pointer_release(PointerEvent::new(pos))
}

fn gradient(w: u32, h: u32) -> PixelBuffer {
    PixelBuffer::from_fn(w, h, |x, y| Rgba([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8, 255]))
}

#[test]
fn brush_select_then_move_relocates_pixels() {
    let config = ToolConfig { tool: Tool::Brush, brush_size: 10, ..ToolConfig::default() };
    let mut s = EditorSession::with_config(PixelBuffer::from_pixel(100, 100, TEAL), config);

    click(&mut s, Pos2::new(50.0, 50.0));
    assert_eq!(s.get_current_mask().get(50, 50), 255);

    assert!(s.start_move(BLACK));
    assert!(s.is_moving());
    assert_eq!(*s.base_image().get_pixel(50, 50), BLACK);
    assert!(s.get_current_mask().is_empty());

    assert!(s.set_move_offset(Vec2::new(20.0, 0.0)));
    // The floating region shows up in the display before it is committed.
    assert_eq!(*s.display_buffer().get_pixel(70, 50), TEAL);
    assert!(s.confirm_move());

    assert_eq!(*s.base_image().get_pixel(70, 50), TEAL);
    assert_eq!(*s.base_image().get_pixel(50, 50), BLACK);
    assert!(!s.confirm_move());

    let vacated = s.take_vacated_mask().expect("vacated mask recorded");
    assert_eq!(vacated.get(50, 50), 255);
    assert!(s.take_vacated_mask().is_none());

    // The whole move is a single undo step.
    assert!(s.undo());
    assert_eq!(*s.base_image().get_pixel(50, 50), TEAL);
    assert_eq!(s.get_current_mask().get(50, 50), 255);
}

#[test]
fn cancelled_move_restores_pre_move_state() {
    let config = ToolConfig { tool: Tool::Box, ..ToolConfig::default() };
    let mut s = EditorSession::with_config(gradient(40, 40), config);
    s.pointer_press(PointerEvent::new(Pos2::new(5.0, 5.0)));
    s.pointer_release(PointerEvent::new(Pos2::new(15.0, 12.0)));
    let image_before = s.base_image().clone();
    let mask_before = s.get_current_mask();
    let undo_depth = s.history().undo_count();

    assert!(s.start_move(BLACK));
    assert!(s.set_move_transform(30.0, 1.5));
    assert!(s.cancel_move());

    assert_eq!(*s.base_image(), image_before);
    assert_eq!(s.get_current_mask(), mask_before);
    assert_eq!(s.history().undo_count(), undo_depth);
    assert!(!s.can_redo());
    assert!(!s.cancel_move());
}

#[test]
fn start_move_needs_a_selection() {
    let mut s = EditorSession::new(PixelBuffer::from_pixel(20, 20, TEAL));
    assert!(!s.start_move(BLACK));
    assert!(!s.is_moving());
    assert!(!s.can_undo());
    assert_eq!(*s.base_image().get_pixel(10, 10), TEAL);
}

#[test]
fn move_tool_drag_updates_offset() {
    let config = ToolConfig { tool: Tool::Box, ..ToolConfig::default() };
    let mut s = EditorSession::with_config(PixelBuffer::from_pixel(60, 60, TEAL), config);
    s.pointer_press(PointerEvent::new(Pos2::new(10.0, 10.0)));
    s.pointer_release(PointerEvent::new(Pos2::new(20.0, 20.0)));
    assert!(s.start_move(BLACK));
    assert_eq!(s.active_tool(), Tool::Move);

    s.pointer_press(PointerEvent::new(Pos2::new(15.0, 15.0)));
    s.pointer_move(PointerEvent::new(Pos2::new(25.0, 20.0)));
    s.pointer_release(PointerEvent::new(Pos2::new(45.0, 15.0)));
    assert_eq!(s.tools().floating().map(|r| r.offset), Some(Vec2::new(30.0, 0.0)));

    assert!(s.confirm_move());
    assert_eq!(*s.base_image().get_pixel(45, 15), TEAL);
    assert_eq!(*s.base_image().get_pixel(15, 15), BLACK);
}

#[test]
fn rotated_and_zoomed_click_lands_on_the_right_pixel() {
    let mut img = PixelBuffer::from_pixel(100, 100, TEAL);
    let marker = Rgba([250, 10, 10, 255]);
    img.put_pixel(10, 10, marker);
    let mut s = EditorSession::new(img);
    s.set_viewport(400.0, 400.0);
    s.view_mut().set_rotation(45.0);
    s.view_mut().set_zoom(2.0);

    // Image (10, 10) sits 39.5 px up-left of the centre (49.5, 49.5); a 45°
    // turn puts it straight above the centre at distance 39.5 * sqrt(2).
    let scale = s.view().scale();
    let target = Pos2::new(200.0, 200.0 - 39.5 * std::f32::consts::SQRT_2 * scale);
    let mapped = s.view().to_image_space(target);
    assert!((mapped - Pos2::new(10.0, 10.0)).length() < 1.0, "mapped to {mapped:?}");

    s.set_tool(Tool::Eyedropper);
    assert_eq!(click(&mut s, target), ToolOutcome::Ignored);
    assert_eq!(s.config().draw_color, [250, 10, 10]);

    let (dw, dh) = s.display_buffer().dimensions();
    assert_eq!((dw, dh), (142, 142));
}

#[test]
fn view_round_trip_holds_across_states() {
    let mut s = EditorSession::new(PixelBuffer::from_pixel(120, 80, TEAL));
    s.set_viewport(640.0, 480.0);
    let probes = [Pos2::new(0.0, 0.0), Pos2::new(320.0, 240.0), Pos2::new(611.5, 17.25)];
    for &(zoom, pan, rot) in &[(1.0, (0.0, 0.0), 0.0), (3.5, (40.0, -25.0), 33.0), (0.25, (-300.0, 90.0), 271.0)] {
        s.view_mut().set_zoom(zoom);
        s.view_mut().set_pan(Vec2::new(pan.0, pan.1));
        s.view_mut().set_rotation(rot);
        for &p in &probes {
            let back = s.view().to_view_space(s.view().to_image_space(p));
            assert!((back - p).length() < 1e-2, "zoom {zoom} rot {rot}: {p:?} -> {back:?}");
        }
    }
}

#[test]
fn magnetic_lasso_snaps_to_vertical_boundary() {
    let img = PixelBuffer::from_fn(100, 60, |x, _| if x < 50 { BLACK } else { Rgba([255, 255, 255, 255]) });
    let config = ToolConfig { tool: Tool::Lasso, magnetic_lasso: true, ..ToolConfig::default() };
    let mut s = EditorSession::with_config(img, config);

    s.pointer_press(PointerEvent::new(Pos2::new(45.0, 10.0)));
    for (i, x) in (45..=55).enumerate() {
        s.pointer_move(PointerEvent::new(Pos2::new(x as f32, 12.0 + 2.0 * i as f32)));
    }
    let points = s.tools().lasso_points().to_vec();
    assert_eq!(points.len(), 12);
    for p in &points {
        assert_eq!(p.x, 50.0, "unsnapped sample {p:?}");
    }
    // One edge map for the whole gesture.
    assert_eq!(s.edge_cache().computations(), 1);
    s.pointer_release(PointerEvent::new(Pos2::new(55.0, 34.0)));
}

#[test]
fn freehand_lasso_selects_enclosed_area() {
    let config = ToolConfig { tool: Tool::Lasso, ..ToolConfig::default() };
    let mut s = EditorSession::with_config(PixelBuffer::from_pixel(60, 60, TEAL), config);
    let mut path = Vec::new();
    for i in 0..=20 {
        path.push(Pos2::new(10.0 + 2.0 * i as f32, 10.0));
    }
    for i in 1..=20 {
        path.push(Pos2::new(50.0, 10.0 + 2.0 * i as f32));
    }
    for i in 1..=20 {
        path.push(Pos2::new(50.0 - 2.0 * i as f32, 50.0));
    }
    s.pointer_press(PointerEvent::new(path[0]));
    for p in &path[1..] {
        s.pointer_move(PointerEvent::new(*p));
    }
    assert_eq!(s.pointer_release(PointerEvent::new(Pos2::new(10.0, 50.0))), ToolOutcome::Committed);
    let mask = s.get_current_mask();
    assert_eq!(mask.get(30, 30), 255);
    assert_eq!(mask.get(5, 30), 0);
    assert_eq!(s.history().undo_count(), 1);
}

#[test]
fn clone_stamp_copies_from_source_offset() {
    let mut s = EditorSession::new(gradient(50, 50));
    s.set_tool(Tool::CloneStamp);
    let before = s.base_image().clone();

    // No source yet.
    assert_eq!(click(&mut s, Pos2::new(30.0, 30.0)), ToolOutcome::Ignored);
    assert!(!s.can_undo());

    let anchor = PointerEvent::new(Pos2::new(10.0, 10.0)).with_modifiers(Modifiers::ALT);
    s.pointer_press(anchor);
    s.pointer_release(anchor);
    assert!(!s.can_undo());

    assert_eq!(s.pointer_press(PointerEvent::new(Pos2::new(30.0, 30.0))), ToolOutcome::Committed);
    s.pointer_move(PointerEvent::new(Pos2::new(32.0, 30.0)));
    s.pointer_release(PointerEvent::new(Pos2::new(32.0, 30.0)));

    assert_eq!(s.base_image().get_pixel(30, 30), before.get_pixel(10, 10));
    assert_eq!(s.base_image().get_pixel(32, 30), before.get_pixel(12, 10));
    assert_eq!(s.history().undo_count(), 1);
}

#[test]
fn pen_stroke_is_one_undo_step() {
    let config = ToolConfig { tool: Tool::Pen, draw_color: [0, 0, 255], ..ToolConfig::default() };
    let mut s = EditorSession::with_config(PixelBuffer::from_pixel(40, 40, TEAL), config);
    s.pointer_press(PointerEvent::new(Pos2::new(5.0, 20.0)));
    for x in [10.0, 20.0, 30.0] {
        s.pointer_move(PointerEvent::new(Pos2::new(x, 20.0)));
    }
    s.pointer_release(PointerEvent::new(Pos2::new(35.0, 20.0)));
    for x in 5..=35 {
        assert_eq!(*s.base_image().get_pixel(x, 20), Rgba([0, 0, 255, 255]), "x={x}");
    }
    assert_eq!(s.history().undo_count(), 1);
    assert!(s.undo());
    assert_eq!(*s.base_image().get_pixel(20, 20), TEAL);
}

#[test]
fn fill_outside_the_image_is_a_no_op() {
    let mut s = EditorSession::new(PixelBuffer::from_pixel(30, 30, TEAL));
    s.set_tool(Tool::Fill);
    let before = s.base_image().clone();
    assert_eq!(click(&mut s, Pos2::new(-5.0, 12.0)), ToolOutcome::Ignored);
    assert_eq!(click(&mut s, Pos2::new(12.0, 400.0)), ToolOutcome::Ignored);
    assert_eq!(*s.base_image(), before);
    assert!(!s.can_undo());

    assert_eq!(s.pointer_press(PointerEvent::new(Pos2::new(12.0, 12.0))), ToolOutcome::Committed);
    assert_eq!(*s.base_image().get_pixel(0, 29), Rgba([255, 0, 0, 255]));
    assert_eq!(s.history().undo_count(), 1);
}

#[test]
fn rect_tool_commits_filled_shape_on_release() {
    let config = ToolConfig { tool: Tool::Rect, filled: true, ..ToolConfig::default() };
    let mut s = EditorSession::with_config(PixelBuffer::from_pixel(40, 40, TEAL), config);
    s.pointer_press(PointerEvent::new(Pos2::new(5.0, 5.0)));
    s.pointer_move(PointerEvent::new(Pos2::new(20.0, 15.0)));
    assert_eq!(*s.base_image().get_pixel(12, 10), TEAL);
    assert_eq!(*s.display_buffer().get_pixel(12, 10), Rgba([255, 0, 0, 255]));
    s.pointer_release(PointerEvent::new(Pos2::new(20.0, 15.0)));
    assert_eq!(*s.base_image().get_pixel(12, 10), Rgba([255, 0, 0, 255]));
    assert_eq!(*s.base_image().get_pixel(30, 30), TEAL);
}

#[test]
fn resize_resyncs_pristine_for_eraser_restore() {
    let config = ToolConfig { tool: Tool::Eraser, eraser_restores: true, brush_size: 4, ..ToolConfig::default() };
    let mut s = EditorSession::with_config(PixelBuffer::from_pixel(20, 20, TEAL), config);
    assert!(s.resize(40, 40, Interpolation::Nearest));
    assert_eq!(s.pristine_image().dimensions(), (40, 40));
    assert!(s.select_all());
    assert_eq!(s.pointer_press(PointerEvent::new(Pos2::new(30.0, 30.0))), ToolOutcome::Committed);
    s.pointer_release(PointerEvent::new(Pos2::new(30.0, 30.0)));
    assert_eq!(s.get_current_mask().get(30, 30), 0);
    assert_eq!(*s.base_image().get_pixel(30, 30), TEAL);
}
