// Recycled batch buffers for sink shipments.

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::decode::Metadata;

/// Maximum number of empty batches kept for reuse.
pub const MAX_POOLED_BATCHES: usize = 100;

/// A bounded pool of empty metadata batches.
///
/// Workers acquire a batch, fill it, and hand it to the sink writer; the
/// writer releases it back here once shipped. Acquire and release never
/// block: an empty pool falls back to allocation, a full pool discards the
/// returned batch. A batch is owned by exactly one thread between acquire
/// and release.
#[derive(Clone)]
pub struct BufferPool {
    ring_tx: Sender<Vec<Metadata>>,
    ring_rx: Receiver<Vec<Metadata>>,
    batch_capacity: usize,
}

impl BufferPool {
    pub fn new(batch_capacity: usize) -> Self {
        let (ring_tx, ring_rx) = bounded(MAX_POOLED_BATCHES);
        Self {
            ring_tx,
            ring_rx,
            batch_capacity,
        }
    }

    /// Returns a pooled empty batch, or allocates a new one.
    pub fn acquire(&self) -> Vec<Metadata> {
        match self.ring_rx.try_recv() {
            Ok(batch) => batch,
            Err(_) => Vec::with_capacity(self.batch_capacity),
        }
    }

    /// Empties the batch and returns it to the pool; discards it when the
    /// pool is full.
    pub fn release(&self, mut batch: Vec<Metadata>) {
        batch.clear();
        let _ = self.ring_tx.try_send(batch);
    }

    /// Number of batches currently pooled.
    pub fn len(&self) -> usize {
        self.ring_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring_rx.is_empty()
    }

    /// The target capacity of batches handed out by [`acquire`](Self::acquire).
    pub fn batch_capacity(&self) -> usize {
        self.batch_capacity
    }
}
