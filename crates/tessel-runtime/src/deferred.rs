//! Work scheduled from other threads and run on the main thread once per frame.

use crossbeam_channel::{Receiver, Sender, TrySendError, unbounded};

use crate::streamer::Streamer;

pub type Deferred = Box<dyn FnOnce(&mut Streamer) + Send + 'static>;

pub struct DeferredQueue {
    tx: Sender<Deferred>,
    rx: Receiver<Deferred>,
}

/// Cloneable, `Send` handle for scheduling deferred work.
#[derive(Clone)]
pub struct DeferredHandle {
    tx: Sender<Deferred>,
}

impl DeferredHandle {
    /// Returns false once the streamer is gone.
    pub fn schedule(&self, f: impl FnOnce(&mut Streamer) + Send + 'static) -> bool {
        !matches!(self.tx.try_send(Box::new(f)), Err(TrySendError::Disconnected(_)))
    }
}

impl Default for DeferredQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn handle(&self) -> DeferredHandle {
        DeferredHandle { tx: self.tx.clone() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Everything queued right now; work scheduled while the batch runs
    /// waits for the next frame.
    pub fn take_batch(&self) -> Vec<Deferred> {
        let n = self.rx.len();
        self.rx.try_iter().take(n).collect()
    }
}
