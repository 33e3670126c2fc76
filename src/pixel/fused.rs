use crate::foundation::core::Rgb8;

/// Size in bytes of one encoded [`FusedPixel`] record.
pub const FUSED_PIXEL_BYTES: usize = 8;

/// One pixel's depth and color packed together so it can be merged and shipped as a unit.
///
/// The in-memory layout is `#[repr(C)]` (f32 followed by three bytes and one byte of padding).
/// The wire layout produced by [`FusedPixel::to_bytes`] matches it field for field with the depth
/// stored little-endian, so every rank agrees on it regardless of host byte order.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FusedPixel {
    /// Depth; smaller is closer.
    pub depth: f32,
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl FusedPixel {
    /// Build a pixel from a depth and a color.
    pub const fn new(depth: f32, color: Rgb8) -> Self {
        Self {
            depth,
            r: color.r,
            g: color.g,
            b: color.b,
        }
    }

    /// Color channels of this pixel.
    pub const fn color(self) -> Rgb8 {
        Rgb8::new(self.r, self.g, self.b)
    }

    /// Encode into the fixed 8-byte wire record.
    pub fn to_bytes(self) -> [u8; FUSED_PIXEL_BYTES] {
        let z = self.depth.to_le_bytes();
        [z[0], z[1], z[2], z[3], self.r, self.g, self.b, 0]
    }

    /// Decode a wire record. `bytes` must hold at least [`FUSED_PIXEL_BYTES`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            depth: f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            r: bytes[4],
            g: bytes[5],
            b: bytes[6],
        }
    }
}

/// Merge incoming pixel `a` with resident pixel `b` (depth test plus background-aware tie-break).
///
/// - `a` strictly closer: `a` wins outright.
/// - Equal depth and `b` is exactly `bg`: `a`'s color is kept, even when `a` is background too.
/// - Equal depth and neither is `bg`: per-channel average, truncated.
/// - Otherwise `b` is kept unchanged.
#[inline]
pub fn merge(a: FusedPixel, b: FusedPixel, bg: Rgb8) -> FusedPixel {
    if a.depth < b.depth {
        return a;
    }
    if a.depth == b.depth {
        if b.color() == bg {
            return FusedPixel {
                depth: b.depth,
                ..a
            };
        }
        if a.color() != bg {
            return FusedPixel {
                depth: b.depth,
                r: avg(a.r, b.r),
                g: avg(a.g, b.g),
                b: avg(a.b, b.b),
            };
        }
    }
    b
}

/// Apply [`merge`] elementwise, writing into `inout`.
///
/// Both slices must have the same length.
pub fn merge_slices(input: &[FusedPixel], inout: &mut [FusedPixel], bg: Rgb8) {
    debug_assert_eq!(input.len(), inout.len());
    for (a, b) in input.iter().zip(inout.iter_mut()) {
        *b = merge(*a, *b, bg);
    }
}

/// Apply [`merge`] elementwise over encoded wire records, writing into `inout`.
///
/// This is the reduction combiner handed to the transport. It decodes each pair on the stack and
/// never allocates.
pub fn merge_records(input: &[u8], inout: &mut [u8], bg: Rgb8) {
    debug_assert_eq!(input.len(), inout.len());
    for (a, b) in input
        .chunks_exact(FUSED_PIXEL_BYTES)
        .zip(inout.chunks_exact_mut(FUSED_PIXEL_BYTES))
    {
        let merged = merge(FusedPixel::from_bytes(a), FusedPixel::from_bytes(b), bg);
        b.copy_from_slice(&merged.to_bytes());
    }
}

fn avg(a: u8, b: u8) -> u8 {
    ((u16::from(a) + u16::from(b)) / 2) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/pixel/fused.rs"]
mod tests;
