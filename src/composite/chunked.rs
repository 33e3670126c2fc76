use crate::comm::communicator::{Communicator, ReduceTarget};
use crate::composite::context::PixelOp;
use crate::foundation::core::Rgb8;
use crate::foundation::error::{SortLastError, SortLastResult};
use crate::pixel::fused::{FUSED_PIXEL_BYTES, FusedPixel, merge_slices};

/// How [`merge_buffers`] combines the input with the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeMode {
    /// Both operands live in this process.
    Local,
    /// Collective reduction; the result lands on `MergeParams::destination` only.
    Reduce,
    /// Collective reduction; every rank receives the result.
    AllReduce,
}

/// Chunking and tie-break settings for [`merge_buffers`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MergeParams {
    /// Upper bound on pixels handled per chunk.
    pub chunk_pixels: usize,
    /// Receiving rank for [`MergeMode::Reduce`].
    pub destination: usize,
    /// Background color for the merge tie-break.
    pub background: Rgb8,
}

/// Transport plus registered operator for the collective modes.
#[derive(Clone, Copy)]
pub struct Collective<'a> {
    /// Process group to reduce over.
    pub comm: &'a dyn Communicator,
    /// Registered pixel operator.
    pub op: &'a PixelOp,
}

/// Merge the first `pixel_count` pixels of `in_z`/`in_rgb` into `io`, one bounded chunk at a time.
///
/// `io` is `(depth, packed rgb)`. It is required in [`MergeMode::Local`], on the destination rank
/// in [`MergeMode::Reduce`], and on every rank in [`MergeMode::AllReduce`]; elsewhere it may be
/// `None` and is never touched. The collective modes need `collective`; asking for them without
/// one is an error, never a silent local merge.
pub fn merge_buffers(
    pixel_count: usize,
    mode: MergeMode,
    in_z: &[f32],
    in_rgb: &[u8],
    io: Option<(&mut [f32], &mut [u8])>,
    params: &MergeParams,
    collective: Option<Collective<'_>>,
) -> SortLastResult<()> {
    if params.chunk_pixels == 0 {
        return Err(SortLastError::config("chunk_pixels must be > 0"));
    }
    check_len("input", pixel_count, in_z.len(), in_rgb.len())?;

    let (collective, holds_output) = match mode {
        MergeMode::Local => (None, true),
        MergeMode::Reduce | MergeMode::AllReduce => {
            let c = collective.ok_or_else(|| {
                SortLastError::config(format!(
                    "{mode:?} merge requested without a collective transport"
                ))
            })?;
            let rank = c.comm.rank();
            if params.destination >= c.comm.size() {
                return Err(SortLastError::config(format!(
                    "destination rank {} is outside a group of {} ranks",
                    params.destination,
                    c.comm.size()
                )));
            }
            (Some(c), mode == MergeMode::AllReduce || rank == params.destination)
        }
    };

    let mut io = if holds_output {
        let (z, rgb) = io.ok_or_else(|| {
            SortLastError::config(format!("{mode:?} merge needs an output buffer on this rank"))
        })?;
        check_len("output", pixel_count, z.len(), rgb.len())?;
        Some((z, rgb))
    } else {
        None
    };

    let chunk = params.chunk_pixels.min(pixel_count.max(1));
    let mut in_chunk: Vec<FusedPixel> = Vec::with_capacity(chunk);
    let mut io_chunk: Vec<FusedPixel> = Vec::with_capacity(chunk);
    let (mut send_bytes, mut recv_bytes) = match collective {
        Some(_) => (
            Vec::with_capacity(chunk * FUSED_PIXEL_BYTES),
            Vec::with_capacity(chunk * FUSED_PIXEL_BYTES),
        ),
        None => (Vec::new(), Vec::new()),
    };
    let target = match mode {
        MergeMode::AllReduce => ReduceTarget::All,
        _ => ReduceTarget::Root(params.destination),
    };

    let mut chunks = 0usize;
    let mut offset = 0usize;
    while offset < pixel_count {
        let n = chunk.min(pixel_count - offset);
        let px = offset..offset + n;
        let bytes = offset * 3..(offset + n) * 3;
        pack(&mut in_chunk, &in_z[px.clone()], &in_rgb[bytes.clone()]);

        match collective {
            None => {
                if let Some((z, rgb)) = io.as_mut() {
                    pack(&mut io_chunk, &z[px.clone()], &rgb[bytes.clone()]);
                    merge_slices(&in_chunk, &mut io_chunk, params.background);
                    unpack(&io_chunk, &mut z[px.clone()], &mut rgb[bytes.clone()]);
                }
            }
            Some(c) => {
                encode(&in_chunk, &mut send_bytes);
                recv_bytes.clear();
                recv_bytes.resize(n * FUSED_PIXEL_BYTES, 0);
                let out = io.is_some().then_some(&mut recv_bytes[..]);
                c.op.reduce(c.comm, &send_bytes, out, target, params.background)?;
                if let Some((z, rgb)) = io.as_mut() {
                    decode(&recv_bytes, &mut io_chunk);
                    unpack(&io_chunk, &mut z[px.clone()], &mut rgb[bytes.clone()]);
                }
            }
        }

        offset += n;
        chunks += 1;
    }

    tracing::debug!(?mode, pixel_count, chunks, holds_output, "buffers merged");
    Ok(())
}

fn check_len(what: &str, pixel_count: usize, z_len: usize, rgb_len: usize) -> SortLastResult<()> {
    if z_len < pixel_count || rgb_len < pixel_count.saturating_mul(3) {
        return Err(SortLastError::validation(format!(
            "{what} buffers hold {z_len} depths / {rgb_len} color bytes, need {pixel_count} pixels"
        )));
    }
    Ok(())
}

fn pack(dst: &mut Vec<FusedPixel>, z: &[f32], rgb: &[u8]) {
    dst.clear();
    dst.extend(z.iter().zip(rgb.chunks_exact(3)).map(|(&depth, c)| FusedPixel {
        depth,
        r: c[0],
        g: c[1],
        b: c[2],
    }));
}

fn unpack(src: &[FusedPixel], z: &mut [f32], rgb: &mut [u8]) {
    for ((p, dz), c) in src.iter().zip(z.iter_mut()).zip(rgb.chunks_exact_mut(3)) {
        *dz = p.depth;
        c.copy_from_slice(&[p.r, p.g, p.b]);
    }
}

fn encode(src: &[FusedPixel], dst: &mut Vec<u8>) {
    dst.clear();
    for p in src {
        dst.extend_from_slice(&p.to_bytes());
    }
}

fn decode(src: &[u8], dst: &mut Vec<FusedPixel>) {
    dst.clear();
    dst.extend(src.chunks_exact(FUSED_PIXEL_BYTES).map(FusedPixel::from_bytes));
}

#[cfg(test)]
#[path = "../../tests/unit/composite/chunked.rs"]
mod tests;
