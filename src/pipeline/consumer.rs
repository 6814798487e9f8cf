//! Decode-and-report loop

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::ebd;
use crate::pipeline::queue::TransferQueue;
use crate::report;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Samples taken off the queue.
    pub processed: u64,
    pub decoded: u64,
    pub decode_failures: u64,
    /// Reports that could not be written to the output.
    pub write_failures: u64,
}

pub struct Consumer<W: Write> {
    queue: Arc<TransferQueue>,
    out: W,
}

impl<W: Write> Consumer<W> {
    pub fn new(queue: Arc<TransferQueue>, out: W) -> Self {
        Self { queue, out }
    }

    /// Report every sample until the queue is shut down and empty.
    /// Neither decode nor output errors end the loop.
    pub fn run(mut self) -> ConsumerStats {
        let mut stats = ConsumerStats::default();

        while let Some(sample) = self.queue.pop_blocking() {
            stats.processed += 1;

            let started = Instant::now();
            let decoded = ebd::decode(sample.bytes());
            metrics::histogram!("ebd_decode_time_us").record(started.elapsed().as_micros() as f64);

            match &decoded {
                Ok(rec) => {
                    stats.decoded += 1;
                    metrics::counter!("ebd_samples_decoded").increment(1);
                    debug!(
                        seq = sample.sequence(),
                        frame_count = rec.frame_count,
                        frame_id = rec.frame_id,
                        "decoded sample"
                    );
                }
                Err(e) => {
                    stats.decode_failures += 1;
                    metrics::counter!("ebd_decode_failures").increment(1);
                    warn!(seq = sample.sequence(), len = sample.len(), error = %e, "decode failed");
                }
            }

            let written = report::write_frame_report(&mut self.out, &sample, &decoded)
                .and_then(|()| self.out.flush());
            if let Err(e) = written {
                stats.write_failures += 1;
                warn!(seq = sample.sequence(), error = %e, "failed to write report");
            }
            // sample is dropped here, after its report is out
        }

        info!(
            processed = stats.processed,
            failures = stats.decode_failures,
            "consumer drained"
        );
        stats
    }
}
