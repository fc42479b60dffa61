use egui::Pos2;
use image::Rgba;
use mosaic_canvas::{EditorSession, PixelBuffer, PointerEvent, Tool, ToolConfig};

fn drag(s: &mut EditorSession, from: (f32, f32), to: (f32, f32)) {
    s.pointer_press(PointerEvent::new(Pos2::new(from.0, from.1)));
    s.pointer_move(PointerEvent::new(Pos2::new(to.0, to.1)));
    s.pointer_release(PointerEvent::new(Pos2::new(to.0, to.1)));
}

fn checker(w: u32, h: u32) -> PixelBuffer {
    PixelBuffer::from_fn(w, h, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 { Rgba([200, 200, 200, 255]) } else { Rgba([40, 40, 40, 255]) }
    })
}

#[test]
fn undo_then_redo_is_byte_exact() {
    let mut s = EditorSession::new(checker(48, 48));
    let original_image = s.base_image().clone();
    let original_mask = s.get_current_mask();

    s.set_tool(Tool::Box);
    drag(&mut s, (4.0, 4.0), (30.0, 20.0));
    s.set_tool(Tool::Pen);
    drag(&mut s, (2.0, 40.0), (45.0, 35.0));
    s.set_tool(Tool::Ellipse);
    drag(&mut s, (10.0, 10.0), (40.0, 30.0));
    s.set_tool(Tool::Fill);
    // Seed inside the box selection; fills are limited to it.
    s.pointer_press(PointerEvent::new(Pos2::new(10.0, 10.0)));
    s.pointer_release(PointerEvent::new(Pos2::new(10.0, 10.0)));
    assert!(s.apply_adjustment(10.0, 20.0, -30.0));
    assert_eq!(s.history().undo_count(), 5);

    let final_image = s.base_image().clone();
    let final_mask = s.get_current_mask();

    let mut states = Vec::new();
    while s.can_undo() {
        states.push((s.base_image().clone(), s.get_current_mask()));
        assert!(s.undo());
        let (img, mask) = states.last().unwrap().clone();
        assert!(s.redo());
        assert_eq!(*s.base_image(), img);
        assert_eq!(s.get_current_mask(), mask);
        assert!(s.undo());
    }
    assert_eq!(*s.base_image(), original_image);
    assert_eq!(s.get_current_mask(), original_mask);
    assert!(!s.undo());

    while s.redo() {}
    assert_eq!(*s.base_image(), final_image);
    assert_eq!(s.get_current_mask(), final_mask);
}

#[test]
fn new_edit_discards_redo() {
    let mut s = EditorSession::new(checker(16, 16));
    assert!(s.select_all());
    assert!(s.undo());
    assert!(s.can_redo());
    assert!(s.invert_selection());
    assert!(!s.can_redo());
    assert!(!s.redo());
}

#[test]
fn undo_limit_evicts_oldest_first() {
    let config = ToolConfig { tool: Tool::Box, undo_limit: 3, ..ToolConfig::default() };
    let mut s = EditorSession::with_config(checker(60, 12), config);
    for i in 0..5 {
        let x = 2.0 + 12.0 * i as f32;
        drag(&mut s, (x, 2.0), (x + 6.0, 8.0));
        assert!(s.history().undo_count() <= 3);
    }
    assert_eq!(s.history().undo_count(), 3);

    for _ in 0..3 {
        assert!(s.undo());
    }
    assert!(!s.undo());
    // Back to the state after the second selection: the first two boxes
    // remain, the later three are gone.
    let mask = s.get_current_mask();
    assert_eq!(mask.get(5, 5), 255);
    assert_eq!(mask.get(17, 5), 255);
    assert_eq!(mask.get(29, 5), 0);
    assert_eq!(mask.get(53, 5), 0);
}

#[test]
fn shrinking_the_limit_drops_old_entries() {
    let mut s = EditorSession::new(checker(8, 8));
    for _ in 0..6 {
        s.invert_selection();
    }
    assert_eq!(s.history().undo_count(), 6);
    s.set_config(ToolConfig { undo_limit: 2, ..ToolConfig::default() });
    assert_eq!(s.history().undo_count(), 2);
}

#[test]
fn clearing_an_empty_selection_records_nothing() {
    let mut s = EditorSession::new(checker(20, 20));
    assert!(!s.clear_selection());
    assert_eq!(s.history().undo_count(), 0);

    s.set_tool(Tool::Box);
    drag(&mut s, (2.0, 2.0), (10.0, 10.0));
    assert_eq!(s.history().undo_count(), 1);
    assert!(s.clear_selection());
    assert_eq!(s.history().undo_count(), 2);
    assert!(!s.clear_selection());
    assert_eq!(s.history().undo_count(), 2);
    assert_eq!(s.history().undo_description(), Some("Deselect"));
}

#[test]
fn loading_an_image_resets_everything() {
    let mut s = EditorSession::new(checker(20, 20));
    s.set_tool(Tool::Box);
    drag(&mut s, (2.0, 2.0), (10.0, 10.0));
    s.set_viewport(300.0, 200.0);
    s.view_mut().set_zoom(4.0);
    s.view_mut().set_rotation(90.0);
    s.set_preview(50.0, 0.0, 0.0);

    s.set_image(PixelBuffer::from_pixel(33, 17, Rgba([1, 2, 3, 255])));
    assert!(!s.can_undo() && !s.can_redo());
    assert!(s.get_current_mask().is_empty());
    assert_eq!(s.get_current_mask().width(), 33);
    assert_eq!(*s.pristine_image(), *s.base_image());
    assert_eq!(s.view().zoom(), 1.0);
    assert_eq!(s.view().rotation_deg(), 0.0);
    assert!(s.preview().is_none());
    assert_eq!(s.display_buffer().dimensions(), (33, 17));
}
