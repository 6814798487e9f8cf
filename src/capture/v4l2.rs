//! V4L2 capture through memory-mapped buffers

use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::{CaptureStream, Stream};
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::{frame::PixelFormat, CaptureDevice, DeviceError, DeviceOp};

/// Single-stream V4L2 capture
pub struct V4l2Capture {
    device: Box<Device>,
    stream: Option<MmapStream<'static>>,
    buffer_count: u32,
    sequence: u64,
}

impl V4l2Capture {
    /// Open the device node and check it can capture video.
    pub fn open(path: &str, buffer_count: u32) -> Result<Self, DeviceError> {
        info!("Opening V4L2 device {}", path);

        let device = Device::with_path(path).map_err(|source| DeviceError::Open {
            path: path.to_string(),
            source,
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| DeviceError::io(DeviceOp::Open, e))?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(DeviceError::NotCaptureDevice(path.to_string()));
        }

        Ok(Self {
            device: Box::new(device),
            stream: None,
            buffer_count: buffer_count.max(1),
            sequence: 0,
        })
    }
}

impl CaptureDevice for V4l2Capture {
    fn configure(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), DeviceError> {
        // Format changes are refused by the driver while buffers are mapped
        self.stop()?;

        let mut fmt = self
            .device
            .format()
            .map_err(|e| DeviceError::io(DeviceOp::Configure, e))?;
        fmt.width = width;
        fmt.height = height;
        fmt.fourcc = FourCC::new(&format.fourcc());
        fmt.field_order = v4l::format::FieldOrder::Progressive;

        let actual = self
            .device
            .set_format(&fmt)
            .map_err(|e| DeviceError::io(DeviceOp::Configure, e))?;

        if actual.width != width || actual.height != height || actual.fourcc != fmt.fourcc {
            return Err(DeviceError::FormatRejected {
                requested: format!("{}x{} {}", width, height, format),
                actual: format!(
                    "{}x{} {}",
                    actual.width,
                    actual.height,
                    String::from_utf8_lossy(&actual.fourcc.repr)
                ),
            });
        }

        info!("Format set to {}x{} {}", width, height, format);
        Ok(())
    }

    /// Map the capture buffers. The driver starts streaming on the first
    /// dequeue, once the buffers have been queued.
    fn start(&mut self) -> Result<(), DeviceError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = MmapStream::with_buffers(&self.device, Type::VideoCapture, self.buffer_count)
            .map_err(|e| DeviceError::io(DeviceOp::Start, e))?;

        self.stream = Some(stream);
        self.sequence = 0;
        info!("Capture stream started with {} buffers", self.buffer_count);
        Ok(())
    }

    /// The stream is dropped even when STREAMOFF fails, so the next
    /// `start` maps fresh buffers.
    fn stop(&mut self) -> Result<(), DeviceError> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.stop() {
                // Drop would retry STREAMOFF and panic on a second failure
                std::mem::forget(stream);
                warn!("Stream stop failed, leaking its buffers: {}", e);
                return Err(DeviceError::io(DeviceOp::Stop, e));
            }
            info!("Capture stream stopped");
        }
        Ok(())
    }

    #[instrument(level = "trace", skip(self))]
    fn acquire_frame(&mut self) -> Result<&[u8], DeviceError> {
        let stream = self.stream.as_mut().ok_or(DeviceError::NotStreaming {
            op: DeviceOp::Dequeue,
        })?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| DeviceError::io(DeviceOp::Dequeue, e))?;

        self.sequence += 1;

        // bytesused is zero on some drivers; fall back to the mapped length
        let used = meta.bytesused as usize;
        let len = if used == 0 || used > buf.len() {
            buf.len()
        } else {
            used
        };
        debug!(
            seq = self.sequence,
            driver_seq = meta.sequence,
            len,
            "dequeued frame"
        );

        Ok(&buf[..len])
    }
}
