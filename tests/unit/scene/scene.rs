use super::*;

fn scene(boxes: Vec<SceneBox>) -> Scene {
    Scene {
        width: 4,
        height: 2,
        compositor: CompositorConfig::default(),
        boxes,
    }
}

fn boxed(rank: usize, layer: usize, rect: Rect, depth: f32, color: Rgb8) -> SceneBox {
    SceneBox {
        rank,
        layer,
        rect,
        depth,
        color,
    }
}

#[test]
fn empty_rank_gets_one_background_layer() {
    let s = scene(vec![]);
    let imgs = s.rasterize(3);
    assert_eq!(imgs.len(), 1);
    assert_eq!(imgs[0].rgb, vec![0; 24]);
    assert!(imgs[0].depth.as_ref().unwrap().iter().all(|z| *z == FAR_DEPTH));
}

#[test]
fn boxes_cover_pixel_centers_and_depth_test_within_a_layer() {
    let red = Rgb8::new(255, 0, 0);
    let green = Rgb8::new(0, 255, 0);
    let s = scene(vec![
        boxed(0, 0, Rect::new(0.0, 0.0, 2.0, 2.0), 0.5, red),
        boxed(0, 0, Rect::new(1.0, 0.0, 3.4, 1.0), 0.3, green),
        boxed(1, 0, Rect::new(0.0, 0.0, 4.0, 2.0), 0.1, green),
    ]);
    let imgs = s.rasterize(0);
    assert_eq!(imgs.len(), 1);
    let img = &imgs[0];
    assert_eq!(img.pixel(0, 0), red);
    assert_eq!(img.pixel(1, 0), green);
    assert_eq!(img.pixel(2, 0), green);
    assert_eq!(img.pixel(3, 0), Rgb8::BLACK);
    assert_eq!(img.pixel(1, 1), red);
    assert_eq!(img.depth.as_ref().unwrap()[1], 0.3);
}

#[test]
fn layers_become_separate_images() {
    let s = scene(vec![
        boxed(2, 0, Rect::new(0.0, 0.0, 1.0, 1.0), 0.5, Rgb8::new(1, 1, 1)),
        boxed(2, 2, Rect::new(0.0, 0.0, 1.0, 1.0), 0.5, Rgb8::new(2, 2, 2)),
    ]);
    let imgs = s.rasterize(2);
    assert_eq!(imgs.len(), 3);
    assert_eq!(imgs[1].rgb, vec![0; 24]);
    assert_eq!(imgs[2].pixel(0, 0), Rgb8::new(2, 2, 2));
}

#[test]
fn boxes_outside_the_canvas_are_clipped() {
    let s = scene(vec![boxed(
        0,
        0,
        Rect::new(-5.0, -5.0, 100.0, 0.6),
        0.2,
        Rgb8::new(7, 7, 7),
    )]);
    let img = &s.rasterize(0)[0];
    assert_eq!(img.pixel(3, 0), Rgb8::new(7, 7, 7));
    assert_eq!(img.pixel(3, 1), Rgb8::BLACK);
}

#[test]
fn validate_rejects_nan_depth_and_empty_canvas() {
    let mut s = scene(vec![boxed(
        0,
        0,
        Rect::new(0.0, 0.0, 1.0, 1.0),
        f32::NAN,
        Rgb8::BLACK,
    )]);
    assert!(matches!(s.validate(), Err(SortLastError::Validation(_))));
    s.boxes.clear();
    s.validate().unwrap();
    s.width = 0;
    assert!(s.validate().is_err());
}

#[test]
fn validate_rejects_layers_past_the_cap() {
    let unit = Rect::new(0.0, 0.0, 1.0, 1.0);
    let mut s = scene(vec![boxed(0, usize::MAX, unit, 0.5, Rgb8::BLACK)]);
    assert!(matches!(s.validate(), Err(SortLastError::Validation(_))));

    s.boxes[0].layer = MAX_LAYERS;
    assert!(matches!(s.validate(), Err(SortLastError::Validation(_))));

    s.boxes[0].layer = MAX_LAYERS - 1;
    s.validate().unwrap();
    assert_eq!(s.rasterize(0).len(), MAX_LAYERS);
}

#[test]
fn check_ranks_rejects_boxes_no_rank_would_draw() {
    let unit = Rect::new(0.0, 0.0, 1.0, 1.0);
    let s = scene(vec![
        boxed(0, 0, unit, 0.5, Rgb8::BLACK),
        boxed(99, 0, unit, 0.5, Rgb8::BLACK),
    ]);
    s.validate().unwrap();
    assert!(matches!(s.check_ranks(4), Err(SortLastError::Validation(_))));
    s.check_ranks(100).unwrap();
}

#[test]
fn scene_parses_from_json() {
    let s: Scene = serde_json::from_str(
        r#"{
            "width": 8,
            "height": 8,
            "compositor": { "destination": "all", "chunk_pixels": 5 },
            "boxes": [
                { "rank": 1, "rect": { "x0": 0, "y0": 0, "x1": 4, "y1": 4 },
                  "depth": 0.5, "color": { "r": 1, "g": 2, "b": 3 } }
            ]
        }"#,
    )
    .unwrap();
    s.validate().unwrap();
    assert_eq!(s.boxes[0].layer, 0);
    assert_eq!(s.boxes[0].rect, Rect::new(0.0, 0.0, 4.0, 4.0));
    assert_eq!(s.compositor.chunk_pixels, 5);
}
