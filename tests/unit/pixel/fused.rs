use super::*;
use proptest::prelude::*;

const BG: Rgb8 = Rgb8::new(0, 0, 0);

fn px(depth: f32, r: u8, g: u8, b: u8) -> FusedPixel {
    FusedPixel::new(depth, Rgb8::new(r, g, b))
}

#[test]
fn closer_pixel_wins_even_against_background() {
    let a = px(0.2, 0, 0, 0);
    let b = px(0.7, 200, 10, 10);
    assert_eq!(merge(a, b, BG), a);
}

#[test]
fn farther_pixel_leaves_resident_untouched() {
    let a = px(0.9, 255, 255, 255);
    let b = px(0.1, 1, 2, 3);
    assert_eq!(merge(a, b, BG), b);
}

#[test]
fn tie_against_background_prefers_incoming_color() {
    let a = px(0.5, 10, 20, 30);
    let b = px(0.5, 0, 0, 0);
    assert_eq!(merge(a, b, BG), a);
}

#[test]
fn tie_with_incoming_background_keeps_resident() {
    let a = px(0.5, 0, 0, 0);
    let b = px(0.5, 40, 50, 60);
    assert_eq!(merge(a, b, BG), b);
}

#[test]
fn tie_between_colors_averages_with_truncation() {
    let a = px(0.5, 255, 3, 100);
    let b = px(0.5, 0, 0, 101);
    assert_eq!(merge(a, b, BG), px(0.5, 127, 1, 100));
}

#[test]
fn background_vs_background_tie_keeps_incoming() {
    let bg = Rgb8::new(7, 7, 7);
    let a = px(1.0, 7, 7, 7);
    let b = px(1.0, 7, 7, 7);
    assert_eq!(merge(a, b, bg), a);
}

#[test]
fn wire_record_is_little_endian_depth_then_rgb() {
    let p = px(1.0, 9, 8, 7);
    let bytes = p.to_bytes();
    assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
    assert_eq!(&bytes[4..8], &[9, 8, 7, 0]);
    assert_eq!(FusedPixel::from_bytes(&bytes), p);
    assert_eq!(std::mem::size_of::<FusedPixel>(), FUSED_PIXEL_BYTES);
}

#[test]
fn record_merge_matches_typed_merge() {
    let input = [px(0.1, 1, 1, 1), px(0.5, 100, 0, 0), px(0.9, 5, 5, 5)];
    let resident = [px(0.3, 2, 2, 2), px(0.5, 50, 0, 0), px(0.2, 6, 6, 6)];

    let mut typed = resident;
    merge_slices(&input, &mut typed, BG);

    let in_bytes: Vec<u8> = input.iter().flat_map(|p| p.to_bytes()).collect();
    let mut io_bytes: Vec<u8> = resident.iter().flat_map(|p| p.to_bytes()).collect();
    merge_records(&in_bytes, &mut io_bytes, BG);

    let decoded: Vec<FusedPixel> = io_bytes
        .chunks_exact(FUSED_PIXEL_BYTES)
        .map(FusedPixel::from_bytes)
        .collect();
    assert_eq!(decoded, typed);
}

fn color() -> impl Strategy<Value = Rgb8> {
    (any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(r, g, b)| Rgb8::new(r, g, b))
}

proptest! {
    #[test]
    fn strictly_closer_always_wins(
        za in 0.0f32..1.0,
        dz in 0.001f32..1.0,
        ca in color(),
        cb in color(),
        bg in color(),
    ) {
        let a = FusedPixel::new(za, ca);
        let b = FusedPixel::new(za + dz, cb);
        prop_assert_eq!(merge(a, b, bg), a);
    }

    #[test]
    fn tie_against_background_keeps_contributor(z in 0.0f32..1.0, ca in color(), bg in color()) {
        prop_assume!(ca != bg);
        let a = FusedPixel::new(z, ca);
        let b = FusedPixel::new(z, bg);
        prop_assert_eq!(merge(a, b, bg).color(), ca);
    }

    #[test]
    fn tie_between_contributors_is_floor_average(
        z in 0.0f32..1.0,
        ca in color(),
        cb in color(),
        bg in color(),
    ) {
        prop_assume!(ca != bg && cb != bg);
        let out = merge(FusedPixel::new(z, ca), FusedPixel::new(z, cb), bg);
        prop_assert_eq!(out.depth, z);
        prop_assert_eq!(out.r as u16, (ca.r as u16 + cb.r as u16) / 2);
        prop_assert_eq!(out.g as u16, (ca.g as u16 + cb.g as u16) / 2);
        prop_assert_eq!(out.b as u16, (ca.b as u16 + cb.b as u16) / 2);
    }
}
