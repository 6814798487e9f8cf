//! In-process capture device that produces frames with a well-formed EBD.
//!
//! Frames carry their 1-based acquisition number in `frame_count`, so the
//! order in which they are reported can be checked end to end. Faults can be
//! injected at start, stop, or any acquire call.

use std::io;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::capture::{frame::PixelFormat, CaptureDevice, DeviceError, DeviceOp};
use crate::ebd::layout;

/// Same LCG as glibc, for reproducible pixel noise.
#[inline]
fn prng(seed: u64) -> u64 {
    seed.wrapping_mul(1103515245).wrapping_add(12345) & 0x7fffffff
}

pub struct SyntheticCapture {
    width: u32,
    height: u32,
    format: PixelFormat,
    frame_len: Option<usize>,
    interval: Option<Duration>,
    fail_acquire_at: Option<u64>,
    fail_start: bool,
    fail_stop: bool,
    streaming: bool,
    frame: Vec<u8>,
    /// Number of `acquire_frame` calls so far, including failed ones.
    pub acquire_calls: u64,
    pub start_calls: u32,
    pub stop_calls: u32,
    pub released: bool,
}

impl SyntheticCapture {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Uyvy,
            frame_len: None,
            interval: None,
            fail_acquire_at: None,
            fail_start: false,
            fail_stop: false,
            streaming: false,
            frame: Vec::new(),
            acquire_calls: 0,
            start_calls: 0,
            stop_calls: 0,
            released: false,
        }
    }

    /// Deliver frames of exactly `len` bytes instead of `width * height * bpp`.
    pub fn with_frame_len(mut self, len: usize) -> Self {
        self.frame_len = Some(len);
        self
    }

    /// Sleep this long in every acquire, like a sensor running at a fixed rate.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Make the `call`-th acquire (1-based) fail.
    pub fn fail_on_acquire(mut self, call: u64) -> Self {
        self.fail_acquire_at = Some(call);
        self
    }

    pub fn fail_on_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn fail_on_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn natural_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * (self.format.bytes_per_pixel() as usize)
    }

    fn render(&mut self, n: u64) {
        let len = self.frame_len.unwrap_or_else(|| self.natural_len());
        self.frame.clear();
        self.frame.resize(len, 0);

        let mut seed = n;
        for b in self.frame.iter_mut() {
            seed = prng(seed);
            *b = (seed >> 16) as u8;
        }

        let ebd_len = layout::MIN_SAMPLE_LEN.min(len);
        self.frame[..ebd_len].fill(0);

        let fields = [
            (layout::SIZE, layout::MIN_SAMPLE_LEN as u32),
            (layout::CHIP_ID, 0x0E13),
            (layout::CHIP_ID_E17, 0x11),
            (layout::CHIP_ID_E18, 0x12),
            (layout::CHIP_ID_E19, 0x0E19),
            (layout::EXPOSURE_SP1, 0x000400),
            (layout::EXPOSURE_SP2, 0x000020),
            (layout::FRAME_COUNT, n as u32),
            (layout::FRAME_ID, (n & 0xFFFF) as u32),
            (layout::COMPENSATION_LEVEL, 0x40),
            // 35.0 C, drifting up by 1/16 C per frame
            (layout::TEMP1, 0x0550 + (n & 0xF) as u32),
            (layout::TEMP2, 0x0548),
            (layout::VOLTAGE_HIGH, 3300),
            (layout::VOLTAGE_MID, 1800),
            (layout::VOLTAGE_LOW, 1100),
            (layout::GAIN_SP1H, 0x0100),
            (layout::GAIN_SP1L, 0x0100),
            (layout::GAIN_SP2H, 0x0080),
            (layout::GAIN_SP2L, 0x0080),
            (layout::IMAGE_WIDTH, self.width),
            (layout::IMAGE_HEIGHT, self.height),
            (layout::DRIVE_MODE, 1),
            (layout::SYNC_METHOD, 0),
            (layout::SYNC_OP_MODE, 1),
            (layout::WB_CF0, 0x0200),
            (layout::WB_CF1, 0x0100),
            (layout::WB_CF2, 0x0100),
            (layout::WB_CF3, 0x0200),
        ];
        for (field, value) in fields {
            field.write(&mut self.frame, value);
        }

        let crc = self
            .frame
            .get(layout::HEAD_CRC.end()..ebd_len)
            .unwrap_or_default()
            .iter()
            .fold(0u32, |acc, &b| acc.rotate_left(5) ^ u32::from(b));
        layout::HEAD_CRC.write(&mut self.frame, crc);
    }
}

impl CaptureDevice for SyntheticCapture {
    fn configure(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), DeviceError> {
        if width == 0 || height == 0 {
            return Err(DeviceError::FormatRejected {
                requested: format!("{}x{} {}", width, height, format),
                actual: format!("{}x{} {}", self.width, self.height, self.format),
            });
        }
        self.width = width;
        self.height = height;
        self.format = format;
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.start_calls += 1;
        if self.fail_start {
            return Err(DeviceError::io(
                DeviceOp::Start,
                io::Error::other("injected stream start failure"),
            ));
        }
        self.streaming = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.stop_calls += 1;
        if self.fail_stop && self.streaming {
            self.streaming = false;
            return Err(DeviceError::io(
                DeviceOp::Stop,
                io::Error::other("injected stream stop failure"),
            ));
        }
        self.streaming = false;
        Ok(())
    }

    fn acquire_frame(&mut self) -> Result<&[u8], DeviceError> {
        self.acquire_calls += 1;
        let n = self.acquire_calls;

        if !self.streaming {
            return Err(DeviceError::NotStreaming {
                op: DeviceOp::Dequeue,
            });
        }
        if self.fail_acquire_at == Some(n) {
            return Err(DeviceError::io(
                DeviceOp::Dequeue,
                io::Error::new(io::ErrorKind::TimedOut, "injected dequeue failure"),
            ));
        }
        if let Some(interval) = self.interval {
            thread::sleep(interval);
        }

        self.render(n);
        debug!(seq = n, len = self.frame.len(), "synthetic frame");
        Ok(&self.frame)
    }

    fn release(&mut self) {
        self.streaming = false;
        self.released = true;
        self.frame = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebd;

    #[test]
    fn frames_decode_with_their_acquisition_number() {
        let mut cap = SyntheticCapture::new(64, 8);
        cap.start().unwrap();
        for n in 1..=3u32 {
            let frame = cap.acquire_frame().unwrap();
            assert_eq!(frame.len(), 64 * 8 * 2);
            let rec = ebd::decode(frame).unwrap();
            assert_eq!(rec.frame_count, n);
            assert_eq!(rec.frame_id, n as u16);
            assert_eq!(rec.image_size.horizontal, 64);
            assert_eq!(rec.image_size.vertical, 8);
        }
    }

    #[test]
    fn acquire_requires_streaming() {
        let mut cap = SyntheticCapture::new(64, 8);
        assert!(matches!(
            cap.acquire_frame(),
            Err(DeviceError::NotStreaming { .. })
        ));
    }

    #[test]
    fn injected_acquire_fault() {
        let mut cap = SyntheticCapture::new(64, 8).fail_on_acquire(2);
        cap.start().unwrap();
        assert!(cap.acquire_frame().is_ok());
        let err = cap.acquire_frame().unwrap_err();
        assert_eq!(err.op(), DeviceOp::Dequeue);
        assert!(cap.acquire_frame().is_ok());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut cap = SyntheticCapture::new(64, 8);
        cap.start().unwrap();
        cap.stop().unwrap();
        cap.stop().unwrap();
        assert!(!cap.is_streaming());
    }

    #[test]
    fn failed_stop_leaves_device_restartable() {
        let mut cap = SyntheticCapture::new(64, 8).fail_on_stop();
        cap.start().unwrap();
        assert_eq!(cap.stop().unwrap_err().op(), DeviceOp::Stop);
        assert!(!cap.is_streaming());

        cap.start().unwrap();
        assert!(cap.is_streaming());
        assert!(cap.acquire_frame().is_ok());
    }
}
