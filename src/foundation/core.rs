use crate::foundation::error::{SortLastError, SortLastResult};

/// Straight RGB8 color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgb8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb8 {
    /// Opaque black, the default background.
    pub const BLACK: Self = Self::new(0, 0, 0);

    /// Build a color from its channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channels as a `[r, g, b]` array, matching the packed layout of [`Image::rgb`].
    pub const fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<[u8; 3]> for Rgb8 {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

/// A partial or composited image: packed RGB8 plus an optional per-pixel depth buffer.
///
/// Depth follows the z-buffer convention: smaller values are closer to the viewer.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// RGB8 bytes, tightly packed, row-major. Length is `width * height * 3`.
    pub rgb: Vec<u8>,
    /// Per-pixel depth, row-major. Length is `width * height` when present.
    pub depth: Option<Vec<f32>>,
}

impl Image {
    /// Create an image where every pixel is `bg`. When `depth` is set, the depth buffer is
    /// filled with that value.
    pub fn new_background(width: u32, height: u32, bg: Rgb8, depth: Option<f32>) -> Self {
        let px = (width as usize).saturating_mul(height as usize);
        Self {
            width,
            height,
            rgb: bg.to_array().repeat(px),
            depth: depth.map(|z| vec![z; px]),
        }
    }

    /// Number of pixels (`width * height`).
    pub fn pixel_count(&self) -> usize {
        (self.width as usize).saturating_mul(self.height as usize)
    }

    /// Color of the pixel at `(x, y)`.
    ///
    /// Panics when the coordinates are out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Rgb8 {
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 3;
        Rgb8::new(self.rgb[i], self.rgb[i + 1], self.rgb[i + 2])
    }

    /// Check that buffer lengths agree with the dimensions.
    pub fn validate(&self) -> SortLastResult<()> {
        let px = (self.width as usize)
            .checked_mul(self.height as usize)
            .ok_or_else(|| SortLastError::validation("image dimensions overflow"))?;
        if self.rgb.len() != px * 3 {
            return Err(SortLastError::validation(format!(
                "rgb buffer has {} bytes, expected {} for {}x{}",
                self.rgb.len(),
                px * 3,
                self.width,
                self.height
            )));
        }
        if let Some(depth) = &self.depth
            && depth.len() != px
        {
            return Err(SortLastError::validation(format!(
                "depth buffer has {} values, expected {} for {}x{}",
                depth.len(),
                px,
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    /// Convert into an [`image::RgbImage`] for encoding.
    pub fn to_rgb_image(&self) -> SortLastResult<image::RgbImage> {
        self.validate()?;
        image::RgbImage::from_raw(self.width, self.height, self.rgb.clone())
            .ok_or_else(|| SortLastError::validation("rgb buffer does not match image dimensions"))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
