use crate::foundation::error::{SortLastError, SortLastResult};

/// Message tag for the default blocking broadcast.
pub const TAG_BROADCAST: u32 = 0x100;
/// Message tag for partial results flowing up the reduction tree.
pub const TAG_REDUCE: u32 = 0x200;
/// Message tag for the finished reduction travelling from rank 0 to a non-zero root.
pub const TAG_REDUCE_RESULT: u32 = 0x201;
/// Message tag for the root-to-rank-0 relay of a tree broadcast.
pub const TAG_TREE_RELAY: u32 = 0x300;
/// Message tag for tree broadcast fan-out.
pub const TAG_TREE_FANOUT: u32 = 0x301;

/// Where a collective reduction delivers its result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceTarget {
    /// Only this rank receives the combined records.
    Root(usize),
    /// Every rank receives the combined records.
    All,
}

/// A posted non-blocking receive.
pub trait RecvRequest {
    /// Poll for completion. Returns the payload once it has arrived.
    ///
    /// After a payload has been returned the request is spent; further calls return `Ok(None)`.
    fn test(&mut self) -> SortLastResult<Option<Vec<u8>>>;
}

/// The process-group surface the compositor and the tree broadcast are written against.
///
/// Messages sent from one rank to another with the same tag are received in send order.
/// Implementations only have to provide the point-to-point operations; the collectives have
/// default implementations built on top of them.
pub trait Communicator {
    /// This rank's position in the group, `0..size()`.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Blocking send of `data` to `dest`.
    fn send(&self, dest: usize, tag: u32, data: &[u8]) -> SortLastResult<()>;

    /// Blocking receive of the next message from `source` carrying `tag`.
    fn recv(&self, source: usize, tag: u32) -> SortLastResult<Vec<u8>>;

    /// Post a non-blocking receive for the next message from `source` carrying `tag`.
    fn irecv<'a>(&'a self, source: usize, tag: u32) -> Box<dyn RecvRequest + 'a>;

    /// Standard blocking broadcast: after the call every rank's `buf` equals the root's.
    ///
    /// The default sends from the root to every other rank in turn.
    fn broadcast(&self, root: usize, buf: &mut [u8]) -> SortLastResult<()> {
        check_rank(root, self.size(), "broadcast root")?;
        if self.rank() == root {
            for peer in (0..self.size()).filter(|&p| p != root) {
                self.send(peer, TAG_BROADCAST, buf)?;
            }
            return Ok(());
        }
        let msg = self.recv(root, TAG_BROADCAST)?;
        copy_payload(buf, &msg, "broadcast")
    }

    /// Collective reduction over arrays of fixed-size records.
    ///
    /// `combine(input, inout)` folds two equal-length record arrays into `inout`. Contributions
    /// are combined in rank order: the result is `x0 . (x1 . (... . x{n-1}))` where `a . b` is
    /// `combine(a, b)`, up to the associativity of `combine`.
    ///
    /// `recv` must be `Some` on every rank that receives the result for `target` and is ignored
    /// elsewhere. All buffers must have the same length on every rank.
    ///
    /// The default is a binomial-tree reduction to rank 0 followed by a hand-off to the root or
    /// a broadcast to everyone.
    fn reduce_records(
        &self,
        send: &[u8],
        recv: Option<&mut [u8]>,
        record_size: usize,
        target: ReduceTarget,
        combine: &mut dyn FnMut(&[u8], &mut [u8]),
    ) -> SortLastResult<()> {
        let (rank, size) = (self.rank(), self.size());
        if record_size == 0 || send.len() % record_size != 0 {
            return Err(SortLastError::validation(format!(
                "reduce buffer of {} bytes is not a whole number of {record_size}-byte records",
                send.len()
            )));
        }
        let receives = match target {
            ReduceTarget::Root(root) => {
                check_rank(root, size, "reduce root")?;
                rank == root
            }
            ReduceTarget::All => true,
        };
        if receives {
            match recv.as_deref() {
                None => {
                    return Err(SortLastError::config(format!(
                        "rank {rank} receives the reduction but passed no output buffer"
                    )));
                }
                Some(out) if out.len() != send.len() => {
                    return Err(SortLastError::validation(format!(
                        "reduce output holds {} bytes, input holds {}",
                        out.len(),
                        send.len()
                    )));
                }
                Some(_) => {}
            }
        }

        let mut acc = send.to_vec();
        let mut mask = 1usize;
        while mask < size {
            if rank & mask != 0 {
                self.send(rank - mask, TAG_REDUCE, &acc)?;
                break;
            }
            let peer = rank + mask;
            if peer < size {
                let mut upper = self.recv(peer, TAG_REDUCE)?;
                if upper.len() != acc.len() {
                    return Err(SortLastError::transport(format!(
                        "rank {peer} contributed {} bytes to a {}-byte reduction",
                        upper.len(),
                        acc.len()
                    )));
                }
                combine(&acc, &mut upper);
                acc = upper;
            }
            mask <<= 1;
        }

        match target {
            ReduceTarget::Root(0) => {
                if let Some(out) = recv
                    && rank == 0
                {
                    out.copy_from_slice(&acc);
                }
            }
            ReduceTarget::Root(root) => {
                if rank == 0 {
                    self.send(root, TAG_REDUCE_RESULT, &acc)?;
                } else if let Some(out) = recv
                    && rank == root
                {
                    let msg = self.recv(0, TAG_REDUCE_RESULT)?;
                    copy_payload(out, &msg, "reduce result")?;
                }
            }
            ReduceTarget::All => {
                if let Some(out) = recv {
                    if rank == 0 {
                        out.copy_from_slice(&acc);
                    }
                    self.broadcast(0, out)?;
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn check_rank(rank: usize, size: usize, what: &str) -> SortLastResult<()> {
    if rank >= size {
        return Err(SortLastError::config(format!(
            "{what} {rank} is outside a group of {size} ranks"
        )));
    }
    Ok(())
}

pub(crate) fn copy_payload(dst: &mut [u8], msg: &[u8], what: &str) -> SortLastResult<()> {
    if dst.len() != msg.len() {
        return Err(SortLastError::transport(format!(
            "{what} payload has {} bytes, local buffer holds {}",
            msg.len(),
            dst.len()
        )));
    }
    dst.copy_from_slice(msg);
    Ok(())
}
