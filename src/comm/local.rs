use std::cell::RefCell;
use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};

use crate::comm::communicator::{Communicator, RecvRequest, check_rank};
use crate::foundation::error::{SortLastError, SortLastResult};

struct Envelope {
    tag: u32,
    payload: Vec<u8>,
}

/// One rank's endpoint in an in-process [`LocalGroup`].
///
/// Every ordered pair of ranks has its own unbounded channel, so per-pair ordering is inherited
/// from the channel. Messages that arrive with a tag nobody is waiting for yet are parked per
/// source until a matching receive asks for them.
///
/// An endpoint belongs to the thread that runs its rank; it is `Send` but not `Sync`.
pub struct LocalComm {
    rank: usize,
    size: usize,
    outboxes: Vec<Sender<Envelope>>,
    inboxes: Vec<Receiver<Envelope>>,
    parked: RefCell<Vec<VecDeque<Envelope>>>,
}

impl LocalComm {
    fn take_parked(&self, source: usize, tag: u32) -> Option<Vec<u8>> {
        let mut parked = self.parked.borrow_mut();
        let queue = &mut parked[source];
        let pos = queue.iter().position(|e| e.tag == tag)?;
        queue.remove(pos).map(|e| e.payload)
    }

    fn park(&self, source: usize, envelope: Envelope) {
        self.parked.borrow_mut()[source].push_back(envelope);
    }

    fn try_take(&self, source: usize, tag: u32) -> SortLastResult<Option<Vec<u8>>> {
        check_rank(source, self.size, "receive source")?;
        if let Some(payload) = self.take_parked(source, tag) {
            return Ok(Some(payload));
        }
        loop {
            match self.inboxes[source].try_recv() {
                Ok(env) if env.tag == tag => return Ok(Some(env.payload)),
                Ok(env) => self.park(source, env),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(hung_up(self.rank, source)),
            }
        }
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dest: usize, tag: u32, data: &[u8]) -> SortLastResult<()> {
        check_rank(dest, self.size, "send destination")?;
        tracing::trace!(from = self.rank, to = dest, tag, bytes = data.len(), "send");
        self.outboxes[dest]
            .send(Envelope {
                tag,
                payload: data.to_vec(),
            })
            .map_err(|_| hung_up(self.rank, dest))
    }

    fn recv(&self, source: usize, tag: u32) -> SortLastResult<Vec<u8>> {
        check_rank(source, self.size, "receive source")?;
        if let Some(payload) = self.take_parked(source, tag) {
            return Ok(payload);
        }
        loop {
            let env = self.inboxes[source]
                .recv()
                .map_err(|_| hung_up(self.rank, source))?;
            if env.tag == tag {
                tracing::trace!(at = self.rank, from = source, tag, "recv");
                return Ok(env.payload);
            }
            self.park(source, env);
        }
    }

    fn irecv<'a>(&'a self, source: usize, tag: u32) -> Box<dyn RecvRequest + 'a> {
        Box::new(LocalRecv {
            comm: self,
            source,
            tag,
            done: false,
        })
    }
}

struct LocalRecv<'a> {
    comm: &'a LocalComm,
    source: usize,
    tag: u32,
    done: bool,
}

impl RecvRequest for LocalRecv<'_> {
    fn test(&mut self) -> SortLastResult<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }
        let got = self.comm.try_take(self.source, self.tag)?;
        self.done = got.is_some();
        Ok(got)
    }
}

fn hung_up(rank: usize, peer: usize) -> SortLastError {
    SortLastError::transport(format!("rank {peer} hung up on rank {rank}"))
}

/// An in-process process group: one OS thread per rank, wired together with channels.
pub struct LocalGroup;

impl LocalGroup {
    /// Build `size` connected endpoints, indexed by rank.
    pub fn endpoints(size: usize) -> SortLastResult<Vec<LocalComm>> {
        if size == 0 {
            return Err(SortLastError::config("a process group needs at least one rank"));
        }

        // channels[src][dst]
        let mut senders: Vec<Vec<Sender<Envelope>>> = Vec::with_capacity(size);
        let mut receivers: Vec<Vec<Receiver<Envelope>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        for _src in 0..size {
            let mut row = Vec::with_capacity(size);
            for dst_inboxes in receivers.iter_mut() {
                let (tx, rx) = unbounded();
                row.push(tx);
                dst_inboxes.push(rx);
            }
            senders.push(row);
        }

        let endpoints = senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| LocalComm {
                rank,
                size,
                outboxes,
                inboxes,
                parked: RefCell::new((0..size).map(|_| VecDeque::new()).collect()),
            })
            .collect();
        Ok(endpoints)
    }

    /// Run `f` once per rank on its own thread and collect the results in rank order.
    ///
    /// A panic on any rank is re-raised on the caller's thread.
    pub fn run<T, F>(size: usize, f: F) -> SortLastResult<Vec<T>>
    where
        T: Send,
        F: Fn(LocalComm) -> T + Sync,
    {
        let endpoints = Self::endpoints(size)?;
        let f = &f;
        std::thread::scope(|s| -> SortLastResult<Vec<T>> {
            let mut handles = Vec::with_capacity(size);
            for comm in endpoints {
                let handle = std::thread::Builder::new()
                    .name(format!("rank-{}", comm.rank))
                    .spawn_scoped(s, move || f(comm))
                    .map_err(|e| SortLastError::Other(anyhow::Error::new(e)))?;
                handles.push(handle);
            }
            Ok(handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect())
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/comm/local.rs"]
mod tests;
