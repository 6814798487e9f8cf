//! Two-thread capture pipeline
//!
//! A [`Pipeline`] owns the capture device, the [`TransferQueue`] and the
//! shutdown path. One run moves it through `Idle → Running → Draining →
//! Stopped`: the consumer thread is started first, the producer thread
//! captures, and once capture ends the queue is shut down so the consumer
//! drains what is left and exits.

pub mod consumer;
pub mod producer;
pub mod queue;

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{error, info};

use crate::capture::{CaptureDevice, DeviceError};
use crate::PipelineConfig;

pub use consumer::{Consumer, ConsumerStats};
pub use producer::{Producer, ProducerOutcome};
pub use queue::{QueueShutdown, TransferQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline already ran (state {0:?}); build a new one per run")]
    AlreadyRun(PipelineState),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

/// Stops the producer at the top of its next cycle.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Result of one pipeline run.
#[derive(Debug)]
pub struct RunSummary {
    pub requested: u64,
    pub captured: u64,
    pub consumer: ConsumerStats,
    pub cancelled: bool,
    /// Device failure that ended capture early, if any.
    pub device_error: Option<DeviceError>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn capture_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.captured as f64 / secs
        } else {
            0.0
        }
    }
}

pub struct Pipeline<D: CaptureDevice> {
    device: D,
    queue: Arc<TransferQueue>,
    cancel: CancelToken,
    sample_len: usize,
    state: PipelineState,
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    info!(from = ?*state, to = ?next, "pipeline state change");
    *state = next;
}

impl<D: CaptureDevice + Send> Pipeline<D> {
    pub fn new(device: D, config: &PipelineConfig) -> Self {
        Self {
            device,
            queue: Arc::new(TransferQueue::new()),
            cancel: CancelToken::new(),
            sample_len: config.sample_len,
            state: PipelineState::Idle,
        }
    }

    /// Pipeline with the default 600-byte sample.
    pub fn with_device(device: D) -> Self {
        Self::new(device, &PipelineConfig::default())
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Capture `frame_count` frames and write one report per frame to `out`.
    ///
    /// Device failures do not make this return `Err`; they end capture early
    /// and are handed back in [`RunSummary::device_error`]. Only one run per
    /// pipeline is allowed.
    pub fn run<W: Write + Send>(
        &mut self,
        frame_count: u64,
        out: W,
    ) -> Result<RunSummary, PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::AlreadyRun(self.state));
        }

        let started = Instant::now();
        let Self {
            device,
            queue,
            cancel,
            sample_len,
            state,
        } = self;

        let joined = thread::scope(|s| -> Result<(ProducerOutcome, ConsumerStats), PipelineError> {
            let consumer_queue = Arc::clone(queue);
            let consumer = thread::Builder::new()
                .name("ebd-consumer".into())
                .spawn_scoped(s, move || Consumer::new(consumer_queue, out).run())
                .map_err(|source| PipelineError::Spawn {
                    name: "consumer",
                    source,
                })?;
            transition(state, PipelineState::Running);

            let producer_queue = Arc::clone(queue);
            let producer_cancel = cancel.clone();
            let sample_len = *sample_len;
            let producer = thread::Builder::new()
                .name("ebd-producer".into())
                .spawn_scoped(s, move || {
                    Producer::new(device, producer_queue, sample_len, producer_cancel)
                        .run(frame_count)
                });

            let outcome = match producer {
                Ok(handle) => handle.join().map_err(|_| PipelineError::ThreadPanicked("producer")),
                Err(source) => Err(PipelineError::Spawn {
                    name: "producer",
                    source,
                }),
            };

            transition(state, PipelineState::Draining);
            queue.shutdown();

            let stats = consumer
                .join()
                .map_err(|_| PipelineError::ThreadPanicked("consumer"));
            Ok((outcome?, stats?))
        });

        self.device.release();
        transition(&mut self.state, PipelineState::Stopped);

        let (outcome, stats) = joined?;
        let summary = RunSummary {
            requested: frame_count,
            captured: outcome.captured,
            consumer: stats,
            cancelled: outcome.cancelled,
            device_error: outcome.error,
            elapsed: started.elapsed(),
        };

        if let Some(e) = &summary.device_error {
            error!(op = %e.op(), error = %e, "capture ended on device error");
        }
        info!(
            captured = summary.captured,
            reported = summary.consumer.processed,
            decode_failures = summary.consumer.decode_failures,
            fps = %format!("{:.1}", summary.capture_fps()),
            "pipeline stopped"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticCapture;

    #[test]
    fn state_machine_runs_once() {
        let mut pipeline = Pipeline::with_device(SyntheticCapture::new(32, 16));
        assert_eq!(pipeline.state(), PipelineState::Idle);

        let summary = pipeline.run(3, std::io::sink()).unwrap();
        assert_eq!(summary.captured, 3);
        assert_eq!(summary.consumer.processed, 3);
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(pipeline.device().released);

        assert!(matches!(
            pipeline.run(3, std::io::sink()),
            Err(PipelineError::AlreadyRun(PipelineState::Stopped))
        ));
    }

    #[test]
    fn zero_frames_still_shuts_down() {
        let mut pipeline = Pipeline::with_device(SyntheticCapture::new(32, 16));
        let summary = pipeline.run(0, std::io::sink()).unwrap();
        assert_eq!(summary.captured, 0);
        assert_eq!(summary.consumer.processed, 0);
        assert!(summary.device_error.is_none());
    }

    #[test]
    fn cancel_token_is_shared() {
        let pipeline = Pipeline::with_device(SyntheticCapture::new(32, 16));
        let token = pipeline.cancel_token();
        token.cancel();
        assert!(pipeline.cancel.is_cancelled());
    }
}
