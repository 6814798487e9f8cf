//! Unbounded FIFO hand-off between the producer and the consumer

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crossbeam::utils::CachePadded;
use flume::{Receiver, Sender};
use thiserror::Error;

use crate::capture::FrameSample;

/// Returned by [`TransferQueue::push`] once shutdown has been requested.
#[derive(Debug, Error)]
#[error("transfer queue is shut down")]
pub struct QueueShutdown(pub FrameSample);

/// Hands [`FrameSample`] ownership from one producer to one consumer.
///
/// Pushing never blocks. Shutdown drops the only sender, so a consumer blocked
/// in [`pop_blocking`](Self::pop_blocking) first drains every queued sample
/// and then gets `None`.
pub struct TransferQueue {
    tx: Mutex<Option<Sender<FrameSample>>>,
    rx: Receiver<FrameSample>,
    shutdown: AtomicBool,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    pushed: AtomicUsize,
    popped: AtomicUsize,
}

impl TransferQueue {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            shutdown: AtomicBool::new(false),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Producer: enqueue a sample and wake the consumer.
    pub fn push(&self, sample: FrameSample) -> Result<(), QueueShutdown> {
        let guard = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        match guard.as_ref() {
            Some(tx) => {
                tx.send(sample).map_err(|e| QueueShutdown(e.into_inner()))?;
                self.stats.pushed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(QueueShutdown(sample)),
        }
    }

    /// Consumer: block until a sample arrives. `None` means shutdown was
    /// requested and nothing is left to process.
    pub fn pop_blocking(&self) -> Option<FrameSample> {
        let sample = self.rx.recv().ok()?;
        self.stats.popped.fetch_add(1, Ordering::Relaxed);
        Some(sample)
    }

    /// Request shutdown. Samples already queued are still delivered.
    pub fn shutdown(&self) {
        let mut guard = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        self.shutdown.store(true, Ordering::Release);
        // Dropping the sender wakes every blocked receiver
        guard.take();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// (pushed, popped)
    pub fn stats(&self) -> (usize, usize) {
        (
            self.stats.pushed.load(Ordering::Relaxed),
            self.stats.popped.load(Ordering::Relaxed),
        )
    }
}

impl Default for TransferQueue {
    fn default() -> Self {
        Self::new()
    }
}
