//! Box scenes for driving the compositor without a real renderer.
//!
//! Each box belongs to one rank and one layer on that rank. A rank rasterizes every layer into
//! its own partial image, so multi-layer ranks exercise the intra-rank merge as well.

use kurbo::{Point, Rect};

use crate::composite::config::CompositorConfig;
use crate::foundation::core::{Image, Rgb8};
use crate::foundation::error::{SortLastError, SortLastResult};

/// Depth written where no box covers a pixel.
pub const FAR_DEPTH: f32 = f32::INFINITY;

/// Highest number of partial images one rank may rasterize.
pub const MAX_LAYERS: usize = 64;

/// An axis-aligned box at constant depth.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SceneBox {
    /// Rank that owns and rasterizes this box.
    pub rank: usize,
    /// Partial image on that rank the box is drawn into.
    #[serde(default)]
    pub layer: usize,
    /// Covered area in pixel coordinates; a pixel is covered when its center is inside.
    pub rect: Rect,
    /// Depth of the whole box.
    pub depth: f32,
    /// Fill color.
    pub color: Rgb8,
}

/// A distributed scene: canvas size, compositing settings, and boxes.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Scene {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Compositing settings; `compositor.background` is also the clear color.
    #[serde(default)]
    pub compositor: CompositorConfig,
    /// Geometry, spread over ranks.
    #[serde(default)]
    pub boxes: Vec<SceneBox>,
}

impl Scene {
    /// Check canvas size, box depths and box layers.
    pub fn validate(&self) -> SortLastResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SortLastError::validation("scene canvas must be non-empty"));
        }
        for (i, b) in self.boxes.iter().enumerate() {
            if !b.depth.is_finite() {
                return Err(SortLastError::validation(format!(
                    "box {i} has a non-finite depth"
                )));
            }
            if b.layer >= MAX_LAYERS {
                return Err(SortLastError::validation(format!(
                    "box {i} is on layer {}, layers must be below {MAX_LAYERS}",
                    b.layer
                )));
            }
        }
        self.compositor.validate()
    }

    /// Check that every box belongs to a rank in a group of `ranks`.
    pub fn check_ranks(&self, ranks: usize) -> SortLastResult<()> {
        match self.boxes.iter().position(|b| b.rank >= ranks) {
            Some(i) => Err(SortLastError::validation(format!(
                "box {i} belongs to rank {}, but only {ranks} ranks run",
                self.boxes[i].rank
            ))),
            None => Ok(()),
        }
    }

    /// Rasterize the boxes owned by `rank`, one image per layer.
    ///
    /// A rank with no boxes still contributes a single empty layer. Expects a scene that passed
    /// [`Scene::validate`].
    pub fn rasterize(&self, rank: usize) -> Vec<Image> {
        let bg = self.compositor.background;
        let layers = self
            .boxes
            .iter()
            .filter(|b| b.rank == rank)
            .map(|b| b.layer + 1)
            .max()
            .unwrap_or(1);

        let mut images: Vec<Image> = (0..layers)
            .map(|_| Image::new_background(self.width, self.height, bg, Some(FAR_DEPTH)))
            .collect();
        for b in self.boxes.iter().filter(|b| b.rank == rank) {
            draw_box(&mut images[b.layer], b);
        }
        images
    }
}

fn draw_box(img: &mut Image, b: &SceneBox) {
    let w = img.width as usize;
    let Some(depth) = img.depth.as_mut() else {
        return;
    };
    let bounds = b.rect.intersect(Rect::new(0.0, 0.0, img.width as f64, img.height as f64));
    if bounds.is_zero_area() {
        return;
    }
    let (x0, y0) = (bounds.x0.floor() as usize, bounds.y0.floor() as usize);
    let (x1, y1) = (bounds.x1.ceil() as usize, bounds.y1.ceil() as usize);
    for y in y0..y1 {
        for x in x0..x1 {
            let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
            if !b.rect.contains(center) {
                continue;
            }
            let i = y * w + x;
            if b.depth < depth[i] {
                depth[i] = b.depth;
                img.rgb[i * 3..i * 3 + 3].copy_from_slice(&b.color.to_array());
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/scene/scene.rs"]
mod tests;
