use crate::foundation::core::Rgb8;
use crate::foundation::error::{SortLastError, SortLastResult};

/// Default chunk size for collective merges, in pixels (512 KiB of fused records).
pub const DEFAULT_CHUNK_PIXELS: usize = 64 * 1024;

/// Which rank(s) end up holding the composited image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// A single rank.
    Rank(usize),
    /// Every rank.
    All,
}

/// Settings for one compositing operation. Every rank must use the same values.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Upper bound on pixels packed and reduced at a time.
    pub chunk_pixels: usize,
    /// Cross-rank merge target. `None` keeps each rank's intra-rank result and skips the
    /// collective phase.
    pub destination: Option<Destination>,
    /// Deliver the result to every rank even when `destination` names a single rank. Requires a
    /// `destination`.
    pub use_all_reduce: bool,
    /// Attach the merged depth buffer to the output image.
    pub retain_depth: bool,
    /// Color treated as empty by the merge tie-break.
    pub background: Rgb8,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            chunk_pixels: DEFAULT_CHUNK_PIXELS,
            destination: None,
            use_all_reduce: false,
            retain_depth: false,
            background: Rgb8::BLACK,
        }
    }
}

impl CompositorConfig {
    /// Check the invariants that do not depend on the process group.
    pub fn validate(&self) -> SortLastResult<()> {
        if self.chunk_pixels == 0 {
            return Err(SortLastError::config("chunk_pixels must be > 0"));
        }
        if self.use_all_reduce && self.destination.is_none() {
            return Err(SortLastError::config(
                "use_all_reduce needs a destination; without one no cross-rank merge runs",
            ));
        }
        Ok(())
    }

    /// Whether the cross-rank phase hands the result to every rank.
    pub fn all_reduce(&self) -> bool {
        self.use_all_reduce || self.destination == Some(Destination::All)
    }

    /// Whether `rank` holds an output image once compositing finishes.
    pub fn receives_result(&self, rank: usize) -> bool {
        match self.destination {
            None => true,
            Some(_) if self.all_reduce() => true,
            Some(Destination::Rank(r)) => r == rank,
            Some(Destination::All) => true,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/composite/config.rs"]
mod tests;
