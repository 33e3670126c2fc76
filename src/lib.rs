//! sortlast merges partial renderings from many ranks into one image (sort-last compositing).
//!
//! Every rank rasterizes only the geometry it owns and hands over RGB8 color plus a per-pixel
//! depth buffer. The crate merges those partial images:
//!
//! - **Pixel merge**: [`merge`] keeps the nearer of two [`FusedPixel`]s. Exact depth ties prefer
//!   whichever side is not the background color and average two real contributors.
//! - **Chunked merge**: [`merge_buffers`] streams two whole images through fixed-size chunks,
//!   either locally or as a collective reduce / all-reduce over a [`Communicator`].
//! - **Compositor**: [`Compositor`] folds a rank's own images first, then reduces across ranks,
//!   and returns the image only where it was asked to land.
//! - **Tree broadcast**: [`tree_broadcast`] spreads small control messages through a binomial
//!   tree, polling with a spin-then-sleep backoff instead of busy-waiting.
//!
//! [`LocalGroup`] runs a whole process group inside one process (one thread per rank), which is
//! what the tests and the `sortlast` binary use.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod comm;
mod composite;
mod foundation;
mod pixel;
pub mod scene;

pub use crate::comm::broadcast::{BroadcastOpts, BroadcastStats, broadcast_value, tree_broadcast};
pub use crate::comm::communicator::{Communicator, RecvRequest, ReduceTarget};
pub use crate::comm::local::{LocalComm, LocalGroup};
pub use crate::composite::chunked::{Collective, MergeMode, MergeParams, merge_buffers};
pub use crate::composite::compositor::Compositor;
pub use crate::composite::config::{CompositorConfig, DEFAULT_CHUNK_PIXELS, Destination};
pub use crate::composite::context::{CompositeContext, PixelOp, RecordLayout};
pub use crate::foundation::core::{Image, Rgb8};
pub use crate::foundation::error::{SortLastError, SortLastResult};
pub use crate::pixel::fused::{FUSED_PIXEL_BYTES, FusedPixel, merge, merge_records, merge_slices};
