use super::*;

#[test]
fn background_image_has_packed_layout() {
    let img = Image::new_background(3, 2, Rgb8::new(1, 2, 3), Some(1.0));
    assert_eq!(img.pixel_count(), 6);
    assert_eq!(img.rgb.len(), 18);
    assert_eq!(&img.rgb[0..6], &[1, 2, 3, 1, 2, 3]);
    assert_eq!(img.depth.as_deref(), Some(&[1.0f32; 6][..]));
    assert_eq!(img.pixel(2, 1), Rgb8::new(1, 2, 3));
    img.validate().unwrap();
}

#[test]
fn validate_rejects_short_buffers() {
    let mut img = Image::new_background(2, 2, Rgb8::BLACK, Some(0.5));
    img.rgb.pop();
    assert!(matches!(img.validate(), Err(SortLastError::Validation(_))));

    let mut img = Image::new_background(2, 2, Rgb8::BLACK, Some(0.5));
    img.depth.as_mut().unwrap().push(0.0);
    assert!(matches!(img.validate(), Err(SortLastError::Validation(_))));
}

#[test]
fn missing_depth_is_a_valid_image() {
    let img = Image::new_background(4, 1, Rgb8::BLACK, None);
    img.validate().unwrap();
}

#[test]
fn converts_to_rgb_image() {
    let img = Image::new_background(2, 1, Rgb8::new(9, 8, 7), None);
    let out = img.to_rgb_image().unwrap();
    assert_eq!(out.get_pixel(1, 0).0, [9, 8, 7]);
}

#[test]
fn rgb8_deserializes_from_channels() {
    let c: Rgb8 = serde_json::from_str(r#"{"r":10,"g":20,"b":30}"#).unwrap();
    assert_eq!(c, Rgb8::new(10, 20, 30));
    assert_eq!(Rgb8::from([10, 20, 30]), c);
}
