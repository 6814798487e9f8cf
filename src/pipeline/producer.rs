//! Capture loop: device frames in, owned samples out

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::capture::{CaptureDevice, DeviceError, FrameSample};
use crate::pipeline::queue::TransferQueue;
use crate::pipeline::CancelToken;

/// How a capture loop ended.
#[derive(Debug)]
pub struct ProducerOutcome {
    /// Samples handed to the queue.
    pub captured: u64,
    /// First device failure, if any. Later failures are only logged.
    pub error: Option<DeviceError>,
    pub cancelled: bool,
}

pub struct Producer<'d, D: CaptureDevice + ?Sized> {
    device: &'d mut D,
    queue: Arc<TransferQueue>,
    sample_len: usize,
    cancel: CancelToken,
}

impl<'d, D: CaptureDevice + ?Sized> Producer<'d, D> {
    pub fn new(
        device: &'d mut D,
        queue: Arc<TransferQueue>,
        sample_len: usize,
        cancel: CancelToken,
    ) -> Self {
        Self {
            device,
            queue,
            sample_len,
            cancel,
        }
    }

    /// Capture up to `frame_count` frames. Any device error ends the loop at
    /// once; the stream is stopped on every exit path.
    pub fn run(mut self, frame_count: u64) -> ProducerOutcome {
        let mut outcome = ProducerOutcome {
            captured: 0,
            error: None,
            cancelled: false,
        };

        match self.device.start() {
            Ok(()) => self.capture_loop(frame_count, &mut outcome),
            Err(e) => {
                error!(error = %e, "failed to start capture");
                outcome.error = Some(e);
            }
        }

        if let Err(e) = self.device.stop() {
            if outcome.error.is_none() {
                error!(error = %e, "failed to stop capture");
                outcome.error = Some(e);
            } else {
                warn!(error = %e, "stream stop after earlier failure also failed");
            }
        }

        info!(
            captured = outcome.captured,
            requested = frame_count,
            "capture loop finished"
        );
        outcome
    }

    fn capture_loop(&mut self, frame_count: u64, outcome: &mut ProducerOutcome) {
        for seq in 1..=frame_count {
            if self.cancel.is_cancelled() {
                info!(seq, "capture cancelled");
                outcome.cancelled = true;
                return;
            }

            let raw = match self.device.acquire_frame() {
                Ok(raw) => raw,
                Err(e) => {
                    error!(seq, error = %e, "frame acquisition failed, aborting capture");
                    outcome.error = Some(e);
                    return;
                }
            };

            let sample = FrameSample::copy_from(seq, raw, self.sample_len);
            debug!(seq, frame_len = raw.len(), sample_len = sample.len(), "captured frame");

            if let Err(e) = self.queue.push(sample) {
                warn!(seq, error = %e, "consumer gone, dropping sample");
                return;
            }
            outcome.captured += 1;
            metrics::counter!("ebd_frames_captured").increment(1);
        }
    }
}
