//! Pending queue for batched submission.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use super::request::RequestOutcome;
use super::ParallelRequest;

/// A queued request and the channel its outcome is delivered on.
pub struct PendingRequest {
    pub request: ParallelRequest,
    pub responder: oneshot::Sender<RequestOutcome>,
}

/// FIFO of requests waiting for the next flush.
///
/// `generation` increases on every drain so a max-wait timer armed for an
/// earlier batch can tell that its batch has already gone.
#[derive(Default)]
pub struct BatchQueue {
    pending: VecDeque<PendingRequest>,
    generation: u64,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues and returns the new queue length.
    pub fn push(&mut self, item: PendingRequest) -> usize {
        self.pending.push_back(item);
        self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Takes every queued request in submission order.
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        self.generation += 1;
        self.pending.drain(..).collect()
    }
}
