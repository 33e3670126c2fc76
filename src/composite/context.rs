use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::comm::communicator::{Communicator, ReduceTarget};
use crate::foundation::core::Rgb8;
use crate::foundation::error::SortLastResult;
use crate::pixel::fused::{FUSED_PIXEL_BYTES, merge_records};

/// Byte layout of the record type the pixel reduction operates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordLayout {
    /// Bytes per record.
    pub size: usize,
    /// Offset of the little-endian f32 depth.
    pub depth_offset: usize,
    /// Offset of the three color bytes.
    pub rgb_offset: usize,
}

/// The pixel merge operator as registered with a process group: record layout plus combiner.
///
/// Shared by every [`crate::Compositor`] built on the same [`CompositeContext`] and released
/// when the last of them is dropped.
#[derive(Debug)]
pub struct PixelOp {
    layout: RecordLayout,
}

impl PixelOp {
    fn new() -> Self {
        Self {
            layout: RecordLayout {
                size: FUSED_PIXEL_BYTES,
                depth_offset: 0,
                rgb_offset: 4,
            },
        }
    }

    /// Record layout this operator reduces over.
    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    /// Run the collective pixel reduction over encoded records.
    ///
    /// The background color rides along inside the combiner, so nothing outside this call
    /// needs to know it.
    pub(crate) fn reduce(
        &self,
        comm: &dyn Communicator,
        send: &[u8],
        recv: Option<&mut [u8]>,
        target: ReduceTarget,
        bg: Rgb8,
    ) -> SortLastResult<()> {
        let mut combine = |input: &[u8], inout: &mut [u8]| merge_records(input, inout, bg);
        comm.reduce_records(send, recv, self.layout.size, target, &mut combine)
    }
}

impl Drop for PixelOp {
    fn drop(&mut self) {
        tracing::debug!("pixel merge operator released");
    }
}

/// Per-process compositing context: the optional process group plus the shared pixel operator.
///
/// The operator is created when the first compositor asks for it and torn down when the last
/// compositor holding it goes away; a later compositor registers a fresh one.
pub struct CompositeContext<'c> {
    comm: Option<&'c dyn Communicator>,
    pixel_op: Mutex<Weak<PixelOp>>,
    registrations: AtomicUsize,
    active: AtomicUsize,
}

impl<'c> CompositeContext<'c> {
    /// Context backed by a process group.
    pub fn new(comm: &'c dyn Communicator) -> Self {
        Self::with_comm(Some(comm))
    }

    /// Context without any transport. Only local merges are possible.
    pub fn single_process() -> Self {
        Self::with_comm(None)
    }

    fn with_comm(comm: Option<&'c dyn Communicator>) -> Self {
        Self {
            comm,
            pixel_op: Mutex::new(Weak::new()),
            registrations: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
        }
    }

    /// The process group, if any.
    pub fn communicator(&self) -> Option<&'c dyn Communicator> {
        self.comm
    }

    /// This process's rank (`0` without a process group).
    pub fn rank(&self) -> usize {
        self.comm.map_or(0, |c| c.rank())
    }

    /// Group size (`1` without a process group).
    pub fn size(&self) -> usize {
        self.comm.map_or(1, |c| c.size())
    }

    /// Number of compositors currently alive on this context.
    pub fn active_compositors(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// How many times the pixel operator has been created.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::Acquire)
    }

    /// Whether a pixel operator is currently registered.
    pub fn pixel_op_registered(&self) -> bool {
        self.pixel_op
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .strong_count()
            > 0
    }

    /// Get the registered pixel operator, registering it first if nobody holds it.
    ///
    /// The registration is released when the last returned handle is dropped.
    pub fn pixel_op(&self) -> Arc<PixelOp> {
        let mut slot = self.pixel_op.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(op) = slot.upgrade() {
            return op;
        }
        let op = Arc::new(PixelOp::new());
        *slot = Arc::downgrade(&op);
        self.registrations.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(rank = self.rank(), "pixel merge operator registered");
        op
    }

    pub(crate) fn compositor_created(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn compositor_dropped(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/composite/context.rs"]
mod tests;
