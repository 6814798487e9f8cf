pub mod frame;
pub mod synthetic;
pub mod v4l2;

use std::fmt;
use std::io;

use thiserror::Error;

pub use frame::FrameSample;
pub use frame::PixelFormat;
pub use synthetic::SyntheticCapture;
pub use v4l2::V4l2Capture;

/// Device-level operation, used to give errors their context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOp {
    Open,
    Configure,
    Start,
    Stop,
    Dequeue,
}

impl fmt::Display for DeviceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceOp::Open => "open",
            DeviceOp::Configure => "configure",
            DeviceOp::Start => "stream start",
            DeviceOp::Stop => "stream stop",
            DeviceOp::Dequeue => "dequeue",
        })
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: io::Error },

    #[error("{0} does not support video capture")]
    NotCaptureDevice(String),

    #[error("device rejected format {requested}, negotiated {actual}")]
    FormatRejected { requested: String, actual: String },

    #[error("{op} failed: {source}")]
    Io { op: DeviceOp, source: io::Error },

    #[error("{op} requested while the stream is not running")]
    NotStreaming { op: DeviceOp },
}

impl DeviceError {
    pub fn io(op: DeviceOp, source: io::Error) -> Self {
        DeviceError::Io { op, source }
    }

    /// The operation that failed, where one applies.
    pub fn op(&self) -> DeviceOp {
        match self {
            DeviceError::Open { .. } | DeviceError::NotCaptureDevice(_) => DeviceOp::Open,
            DeviceError::FormatRejected { .. } => DeviceOp::Configure,
            DeviceError::Io { op, .. } | DeviceError::NotStreaming { op } => *op,
        }
    }
}

/// Source of raw frames.
///
/// All calls block. The slice returned by [`acquire_frame`](Self::acquire_frame)
/// borrows the device, so it cannot outlive the next acquire or a `stop`.
pub trait CaptureDevice {
    /// Negotiate frame geometry and pixel format.
    fn configure(&mut self, width: u32, height: u32, format: PixelFormat)
        -> Result<(), DeviceError>;

    /// Enter the streaming state.
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Leave the streaming state. Stopping a stopped device is a no-op.
    /// The device is left stopped even when this returns an error.
    fn stop(&mut self) -> Result<(), DeviceError>;

    /// Block until the next frame is available.
    fn acquire_frame(&mut self) -> Result<&[u8], DeviceError>;

    /// Give back any mapped buffers. The device must be reconfigured before reuse.
    fn release(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "stream stop during release failed");
        }
    }
}

impl<D: CaptureDevice + ?Sized> CaptureDevice for &mut D {
    fn configure(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), DeviceError> {
        (**self).configure(width, height, format)
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        (**self).stop()
    }

    fn acquire_frame(&mut self) -> Result<&[u8], DeviceError> {
        (**self).acquire_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }
}
