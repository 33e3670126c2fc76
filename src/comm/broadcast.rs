use std::time::{Duration, Instant};

use crate::comm::communicator::{
    Communicator, TAG_TREE_FANOUT, TAG_TREE_RELAY, check_rank, copy_payload,
};
use crate::foundation::error::{SortLastError, SortLastResult};

/// Polling policy for [`tree_broadcast`].
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BroadcastOpts {
    /// How long a waiting rank polls without sleeping.
    pub spin_before_sleep_secs: f64,
    /// Sleep between polls once the spin phase is over. `0` selects the transport's standard
    /// blocking broadcast instead of the tree.
    pub sleep_nanos: u64,
}

impl Default for BroadcastOpts {
    fn default() -> Self {
        Self {
            spin_before_sleep_secs: 5.0,
            sleep_nanos: 50_000_000,
        }
    }
}

impl BroadcastOpts {
    /// Spin phase length.
    pub fn spin_before_sleep(&self) -> Duration {
        Duration::try_from_secs_f64(self.spin_before_sleep_secs).unwrap_or(Duration::ZERO)
    }

    /// Sleep between polls after the spin phase.
    pub fn sleep(&self) -> Duration {
        Duration::from_nanos(self.sleep_nanos)
    }
}

/// What one rank did while waiting in [`tree_broadcast`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Completion tests issued on the pending receive.
    pub polls: u64,
    /// Sleeps taken after the spin phase ran out.
    pub sleeps: u64,
    /// Time between posting the receive and its completion.
    pub waited: Duration,
}

/// Broadcast `buf` from `root` to every rank through a binomial tree.
///
/// All ranks call this with buffers of the same length. A non-zero root first hands its buffer
/// to rank 0, which then acts as the tree root. Each other rank receives from its rank with the
/// lowest set bit cleared and forwards to `rank + 2^k` for decreasing `k`.
///
/// Waiting ranks post a non-blocking receive and poll it: flat out for
/// [`BroadcastOpts::spin_before_sleep`], then with a [`BroadcastOpts::sleep`] pause between
/// tests. With a zero sleep the transport's blocking broadcast is used instead.
#[tracing::instrument(
    skip(comm, buf, opts),
    fields(rank = comm.rank(), size = comm.size(), bytes = buf.len())
)]
pub fn tree_broadcast(
    comm: &dyn Communicator,
    buf: &mut [u8],
    root: usize,
    opts: &BroadcastOpts,
) -> SortLastResult<BroadcastStats> {
    let (rank, size) = (comm.rank(), comm.size());
    check_rank(root, size, "broadcast root")?;
    let mut stats = BroadcastStats::default();

    if opts.sleep_nanos == 0 {
        comm.broadcast(root, buf)?;
        return Ok(stats);
    }

    if root != 0 {
        if rank == root {
            comm.send(0, TAG_TREE_RELAY, buf)?;
        } else if rank == 0 {
            let msg = comm.recv(root, TAG_TREE_RELAY)?;
            copy_payload(buf, &msg, "broadcast relay")?;
        }
    }

    if rank != 0 {
        let source = rank & (rank - 1);
        let msg = wait_for(comm, source, opts, &mut stats)?;
        copy_payload(buf, &msg, "broadcast")?;
    }

    for peer in fanout(rank, size) {
        comm.send(peer, TAG_TREE_FANOUT, buf)?;
    }

    tracing::trace!(polls = stats.polls, sleeps = stats.sleeps, "broadcast done");
    Ok(stats)
}

/// Broadcast a serializable control value from `root`.
///
/// The root passes `Some(value)`; other ranks pass `None` and get the root's value back. The
/// value travels as JSON, preceded by its length.
pub fn broadcast_value<T>(
    comm: &dyn Communicator,
    value: Option<&T>,
    root: usize,
    opts: &BroadcastOpts,
) -> SortLastResult<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut payload = Vec::new();
    if comm.rank() == root {
        let value = value.ok_or_else(|| {
            SortLastError::config("broadcast_value root must supply the value to send")
        })?;
        payload = serde_json::to_vec(value).map_err(|e| SortLastError::serde(e.to_string()))?;
    }

    let mut header = (payload.len() as u64).to_le_bytes();
    tree_broadcast(comm, &mut header, root, opts)?;
    let len = usize::try_from(u64::from_le_bytes(header))
        .map_err(|_| SortLastError::transport("broadcast payload length overflows usize"))?;

    payload.resize(len, 0);
    tree_broadcast(comm, &mut payload, root, opts)?;
    serde_json::from_slice(&payload).map_err(|e| SortLastError::serde(e.to_string()))
}

fn wait_for(
    comm: &dyn Communicator,
    source: usize,
    opts: &BroadcastOpts,
    stats: &mut BroadcastStats,
) -> SortLastResult<Vec<u8>> {
    let spin = opts.spin_before_sleep();
    let nap = opts.sleep();
    let mut req = comm.irecv(source, TAG_TREE_FANOUT);
    let start = Instant::now();
    loop {
        stats.polls += 1;
        if let Some(msg) = req.test()? {
            stats.waited = start.elapsed();
            return Ok(msg);
        }
        if start.elapsed() >= spin {
            std::thread::sleep(nap);
            stats.sleeps += 1;
        } else {
            std::hint::spin_loop();
        }
    }
}

/// Peers `rank` forwards to, nearest-subtree-last.
///
/// Rank 0 starts below the highest power of two under the group size; every other rank starts
/// below its own lowest set bit.
pub(crate) fn fanout(rank: usize, size: usize) -> impl Iterator<Item = usize> {
    let mut step = if rank == 0 {
        size.next_power_of_two() >> 1
    } else {
        (rank & rank.wrapping_neg()) >> 1
    };
    std::iter::from_fn(move || {
        while step > 0 {
            let peer = rank + step;
            step >>= 1;
            if peer < size {
                return Some(peer);
            }
        }
        None
    })
}

#[cfg(test)]
#[path = "../../tests/unit/comm/broadcast.rs"]
mod tests;
