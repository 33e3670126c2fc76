use std::borrow::Cow;
use std::sync::Arc;

use crate::composite::chunked::{Collective, MergeMode, MergeParams, merge_buffers};
use crate::composite::config::{CompositorConfig, Destination};
use crate::composite::context::{CompositeContext, PixelOp};
use crate::foundation::core::Image;
use crate::foundation::error::{SortLastError, SortLastResult};

/// Sort-last compositor for one rank.
///
/// [`Compositor::composite`] runs three phases:
///
/// 1. fold this rank's partial images into one (local chunked merges),
/// 2. merge across ranks with a collective reduction when a destination is configured,
/// 3. wrap the result as an [`Image`], or `None` on ranks that do not receive one.
///
/// Every rank in the group must call `composite` with the same image dimensions and the same
/// configuration.
pub struct Compositor<'a> {
    ctx: &'a CompositeContext<'a>,
    op: Arc<PixelOp>,
    config: CompositorConfig,
}

impl<'a> Compositor<'a> {
    /// Create a compositor on `ctx`. Registers the pixel operator if no other compositor holds
    /// it yet.
    pub fn new(ctx: &'a CompositeContext<'a>, config: CompositorConfig) -> SortLastResult<Self> {
        config.validate()?;
        match (config.destination, ctx.communicator()) {
            (Some(_), None) => {
                return Err(SortLastError::config(
                    "a cross-rank destination needs a process group",
                ));
            }
            (Some(Destination::Rank(r)), Some(comm)) if r >= comm.size() => {
                return Err(SortLastError::config(format!(
                    "destination rank {r} is outside a group of {} ranks",
                    comm.size()
                )));
            }
            _ => {}
        }

        let op = ctx.pixel_op();
        ctx.compositor_created();
        Ok(Self { ctx, op, config })
    }

    /// The configuration this compositor was built with.
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Composite this rank's partial images.
    ///
    /// Input images are never modified. Returns `Ok(None)` on ranks that take part in a
    /// single-destination reduction without being the destination.
    #[tracing::instrument(skip_all, fields(rank = self.ctx.rank(), images = images.len()))]
    pub fn composite(&self, images: &[Image]) -> SortLastResult<Option<Image>> {
        let rank = self.ctx.rank();
        let Some(first) = images.first() else {
            return Err(SortLastError::config(format!(
                "rank {rank} has no partial images to composite"
            )));
        };
        for (i, img) in images.iter().enumerate() {
            img.validate()?;
            if (img.width, img.height) != (first.width, first.height) {
                return Err(SortLastError::validation(format!(
                    "partial image {i} is {}x{}, expected {}x{}",
                    img.width, img.height, first.width, first.height
                )));
            }
            if img.depth.is_none() {
                return Err(SortLastError::validation(format!(
                    "partial image {i} has no depth buffer"
                )));
            }
        }

        let pixels = first.pixel_count();
        let params = MergeParams {
            chunk_pixels: self.config.chunk_pixels,
            destination: match self.config.destination {
                Some(Destination::Rank(r)) => r,
                _ => 0,
            },
            background: self.config.background,
        };

        let (z, rgb) = self.merge_local(images, pixels, &params)?;

        let merged = match self.config.destination {
            None => Some((z.into_owned(), rgb.into_owned())),
            Some(_) => {
                let out = self.merge_ranks(&z, &rgb, pixels, &params)?;
                drop((z, rgb));
                out
            }
        };

        let Some((z, rgb)) = merged else {
            tracing::debug!("not a destination rank; no output");
            return Ok(None);
        };
        Ok(Some(Image {
            width: first.width,
            height: first.height,
            rgb,
            depth: self.config.retain_depth.then_some(z),
        }))
    }

    /// Phase 1: fold images `1..` into a working copy of image `0`. A single image is used as-is.
    fn merge_local<'i>(
        &self,
        images: &'i [Image],
        pixels: usize,
        params: &MergeParams,
    ) -> SortLastResult<(Cow<'i, [f32]>, Cow<'i, [u8]>)> {
        let first = &images[0];
        let first_z = first.depth.as_deref().unwrap_or_default();
        if images.len() == 1 {
            return Ok((Cow::Borrowed(first_z), Cow::Borrowed(first.rgb.as_slice())));
        }

        let mut z = first_z.to_vec();
        let mut rgb = first.rgb.clone();
        for img in &images[1..] {
            let in_z = img.depth.as_deref().unwrap_or_default();
            merge_buffers(
                pixels,
                MergeMode::Local,
                in_z,
                &img.rgb,
                Some((&mut z[..], &mut rgb[..])),
                params,
                None,
            )?;
        }
        tracing::debug!(folded = images.len(), "intra-rank merge done");
        Ok((Cow::Owned(z), Cow::Owned(rgb)))
    }

    /// Phase 2: collective merge. Returns `None` on ranks that do not receive the result.
    fn merge_ranks(
        &self,
        z: &[f32],
        rgb: &[u8],
        pixels: usize,
        params: &MergeParams,
    ) -> SortLastResult<Option<(Vec<f32>, Vec<u8>)>> {
        let comm = self.ctx.communicator().ok_or_else(|| {
            SortLastError::config("a cross-rank destination needs a process group")
        })?;
        let mode = if self.config.all_reduce() {
            MergeMode::AllReduce
        } else {
            MergeMode::Reduce
        };

        let mut out = self
            .config
            .receives_result(comm.rank())
            .then(|| (vec![0.0f32; pixels], vec![0u8; pixels * 3]));
        let io = out
            .as_mut()
            .map(|(oz, orgb)| (&mut oz[..], &mut orgb[..]));

        merge_buffers(
            pixels,
            mode,
            z,
            rgb,
            io,
            params,
            Some(Collective {
                comm,
                op: &self.op,
            }),
        )?;
        tracing::debug!(?mode, received = out.is_some(), "cross-rank merge done");
        Ok(out)
    }
}

impl Drop for Compositor<'_> {
    fn drop(&mut self) {
        self.ctx.compositor_dropped();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/composite/compositor.rs"]
mod tests;
