//! Full-pipeline render checks: scene composition, post-processing passes,
//! and transitions, all exercised through the public API against pixels.

use serde_json::json;

use kinetta::{
    AssetStore, Clip, Rgba8, RenderEngine, Timeline,
    assets::ShapeSpec,
};

fn solid_rect(start: f64, duration: f64, layer: i32, color: Rgba8, cx: f64, cy: f64) -> Clip {
    let mut clip = Clip::shape(
        start,
        duration,
        layer,
        ShapeSpec::Rect {
            width: 16.0,
            height: 16.0,
            corner_radius: 0.0,
        },
        color,
    )
    .unwrap();
    clip.set_initial("x", cx).unwrap();
    clip.set_initial("y", cy).unwrap();
    clip
}

fn render_at(tl: &mut Timeline, engine: &mut RenderEngine, time_ms: f64) -> Vec<u8> {
    let mut assets = AssetStore::new(std::env::temp_dir());
    tl.seek(time_ms);
    tl.update(0.0).unwrap();
    tl.render(engine, &mut assets).unwrap();
    engine.canvas().data.clone()
}

fn has_pixel(data: &[u8], pred: impl Fn(&[u8]) -> bool) -> bool {
    data.chunks_exact(4).any(|px| pred(px))
}

#[test]
fn layers_stack_back_to_front() {
    let mut tl = Timeline::new(1000.0, 30.0).unwrap();
    tl.add_clip(solid_rect(0.0, 1000.0, 0, Rgba8::new(255, 0, 0, 255), 8.0, 8.0));
    // Same footprint, higher layer; it should win everywhere they overlap.
    tl.add_clip(solid_rect(0.0, 1000.0, 5, Rgba8::new(0, 0, 255, 255), 8.0, 8.0));

    let mut engine = RenderEngine::new(16, 16);
    let data = render_at(&mut tl, &mut engine, 100.0);

    assert!(has_pixel(&data, |px| px[2] > 200));
    assert!(!has_pixel(&data, |px| px[0] > 200 && px[2] < 50));
}

#[test]
fn fade_in_effect_scales_rendered_opacity() {
    let mut tl = Timeline::new(1000.0, 30.0).unwrap();
    let id = tl.add_clip(solid_rect(0.0, 1000.0, 0, Rgba8::new(255, 255, 255, 255), 8.0, 8.0));
    assert!(tl.add_effect(id, "fadeIn", 0.0, 800.0, &json!(null)).unwrap());

    let mut engine = RenderEngine::new(16, 16);
    let start = render_at(&mut tl, &mut engine, 0.0);
    let mid = render_at(&mut tl, &mut engine, 400.0);
    let end = render_at(&mut tl, &mut engine, 900.0);

    let brightest = |data: &[u8]| data.chunks_exact(4).map(|px| px[0]).max().unwrap();
    assert_eq!(brightest(&start), 0);
    let mid_peak = brightest(&mid);
    assert!(mid_peak > 100 && mid_peak < 155, "got {mid_peak}");
    assert!(brightest(&end) > 250);
}

#[test]
fn invert_post_effect_flips_the_final_frame() {
    let mut tl = Timeline::new(1000.0, 30.0).unwrap();
    let id = tl.add_clip(solid_rect(0.0, 1000.0, 0, Rgba8::new(255, 0, 0, 255), 8.0, 8.0));
    assert!(tl.add_effect(id, "invert", 0.0, 1000.0, &json!(null)).unwrap());

    let mut engine = RenderEngine::new(16, 16);
    let data = render_at(&mut tl, &mut engine, 100.0);

    // Premultiplied inversion of opaque red inside the rect is cyan.
    assert!(has_pixel(&data, |px| {
        px[0] < 50 && px[1] > 200 && px[2] > 200 && px[3] > 200
    }));
    assert_eq!(engine.queue_len(), 0);
}

#[test]
fn crossfade_blends_both_participants_at_midpoint() {
    let mut tl = Timeline::new(2000.0, 30.0).unwrap();
    let a = tl.add_clip(solid_rect(0.0, 1000.0, 0, Rgba8::new(255, 0, 0, 255), 4.0, 8.0));
    let b = tl.add_clip(solid_rect(800.0, 1200.0, 1, Rgba8::new(0, 0, 255, 255), 12.0, 8.0));
    tl.add_transition("crossfade", a, b, Some(800.0), 400.0, &json!(null))
        .unwrap()
        .unwrap();

    let mut engine = RenderEngine::new(16, 16);
    let data = render_at(&mut tl, &mut engine, 1000.0);

    // Both at half opacity, on opposite halves of the canvas.
    assert!(has_pixel(&data, |px| px[0] > 90 && px[0] < 165 && px[2] < 50));
    assert!(has_pixel(&data, |px| px[2] > 90 && px[2] < 165 && px[0] < 50));
}

#[test]
fn wipe_reveals_the_incoming_clip_from_the_left() {
    let mut tl = Timeline::new(2000.0, 30.0).unwrap();
    let a = tl.add_clip(solid_rect(0.0, 1000.0, 0, Rgba8::new(255, 0, 0, 255), 8.0, 8.0));
    let b = tl.add_clip(solid_rect(800.0, 1200.0, 1, Rgba8::new(0, 0, 255, 255), 8.0, 8.0));
    tl.add_transition(
        "wipe",
        a,
        b,
        Some(800.0),
        400.0,
        &json!({"dir": "ltr", "soft_edge": 0.0}),
    )
    .unwrap()
    .unwrap();

    let mut engine = RenderEngine::new(16, 16);
    let data = render_at(&mut tl, &mut engine, 1000.0);

    // Halfway through an ltr wipe: incoming blue on the left edge of the
    // rect, outgoing red on the right edge.
    let px_at = |x: usize, y: usize| &data[(y * 16 + x) * 4..(y * 16 + x) * 4 + 4];
    let left = px_at(1, 8);
    let right = px_at(14, 8);
    assert!(left[2] > 200 && left[0] < 50, "left {left:?}");
    assert!(right[0] > 200 && right[2] < 50, "right {right:?}");
}

#[test]
fn post_effect_on_a_transition_participant_still_runs() {
    let mut tl = Timeline::new(2000.0, 30.0).unwrap();
    let a = tl.add_clip(solid_rect(0.0, 1000.0, 0, Rgba8::new(255, 0, 0, 255), 8.0, 8.0));
    let b = tl.add_clip(solid_rect(800.0, 1200.0, 1, Rgba8::new(0, 0, 255, 255), 8.0, 8.0));
    assert!(tl.add_effect(b, "invert", 0.0, 1200.0, &json!(null)).unwrap());
    tl.add_transition(
        "wipe",
        a,
        b,
        Some(800.0),
        400.0,
        &json!({"dir": "ltr", "soft_edge": 0.0}),
    )
    .unwrap()
    .unwrap();

    let mut engine = RenderEngine::new(16, 16);
    let data = render_at(&mut tl, &mut engine, 1000.0);

    // The incoming clip is mid-wipe, but its invert pass still applies to
    // the frame: blue flips to yellow, red to cyan.
    let px_at = |x: usize, y: usize| &data[(y * 16 + x) * 4..(y * 16 + x) * 4 + 4];
    let left = px_at(1, 8);
    let right = px_at(14, 8);
    assert!(left[0] > 200 && left[1] > 200 && left[2] < 50, "left {left:?}");
    assert!(right[0] < 50 && right[1] > 200 && right[2] > 200, "right {right:?}");
}
