use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Number of leading frame bytes copied for decoding.
pub const DEFAULT_SAMPLE_LEN: usize = 600;

/// Owned, immutable copy of the head of a captured frame.
///
/// Cloning is cheap: the bytes are reference counted, never copied again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSample {
    sequence: u64,
    data: Bytes,
}

impl FrameSample {
    /// Copy up to `len` leading bytes of `raw`. A shorter frame yields a
    /// shorter sample.
    pub fn copy_from(sequence: u64, raw: &[u8], len: usize) -> Self {
        let take = len.min(raw.len());
        Self {
            sequence,
            data: Bytes::copy_from_slice(&raw[..take]),
        }
    }

    /// Capture order, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Pixel formats we can ask the sensor for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Uyvy,
    Yuyv4,
    Grey,
}

impl PixelFormat {
    pub fn fourcc(self) -> [u8; 4] {
        match self {
            PixelFormat::Uyvy => *b"UYVY",
            PixelFormat::Yuyv4 => *b"YUYV",
            PixelFormat::Grey => *b"GREY",
        }
    }

    pub fn from_fourcc(fourcc: [u8; 4]) -> Option<Self> {
        match &fourcc {
            b"UYVY" => Some(PixelFormat::Uyvy),
            b"YUYV" => Some(PixelFormat::Yuyv4),
            b"GREY" => Some(PixelFormat::Grey),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Uyvy | PixelFormat::Yuyv4 => 2,
            PixelFormat::Grey => 1,
        }
    }

    /// Bytes in one packed row, `None` if that does not fit in `usize`.
    pub fn row_bytes(self, width: u32) -> Option<usize> {
        (width as usize).checked_mul(self.bytes_per_pixel() as usize)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.fourcc()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_only_the_head() {
        let raw: Vec<u8> = (0..=255).cycle().take(4096).collect();
        let sample = FrameSample::copy_from(7, &raw, DEFAULT_SAMPLE_LEN);
        assert_eq!(sample.sequence(), 7);
        assert_eq!(sample.len(), DEFAULT_SAMPLE_LEN);
        assert_eq!(sample.bytes(), &raw[..DEFAULT_SAMPLE_LEN]);
    }

    #[test]
    fn short_frame_gives_short_sample() {
        let sample = FrameSample::copy_from(1, &[1, 2, 3], DEFAULT_SAMPLE_LEN);
        assert_eq!(sample.bytes(), &[1, 2, 3]);
    }

    #[test]
    fn fourcc_round_trip() {
        for fmt in [PixelFormat::Uyvy, PixelFormat::Yuyv4, PixelFormat::Grey] {
            assert_eq!(PixelFormat::from_fourcc(fmt.fourcc()), Some(fmt));
        }
        assert_eq!(PixelFormat::from_fourcc(*b"MJPG"), None);
        assert_eq!(PixelFormat::Uyvy.to_string(), "UYVY");
    }

    #[test]
    fn row_bytes_does_not_wrap_at_u32() {
        assert_eq!(PixelFormat::Uyvy.row_bytes(1920), Some(3840));
        assert_eq!(PixelFormat::Grey.row_bytes(u32::MAX), Some(u32::MAX as usize));
        assert_eq!(
            PixelFormat::Yuyv4.row_bytes(u32::MAX),
            (u32::MAX as usize).checked_mul(2)
        );
    }
}
