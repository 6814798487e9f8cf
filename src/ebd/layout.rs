//! Declarative EBD field table
//!
//! Every field of the embedded descriptor is described once, as a
//! [`FieldSpec`], and read through the single [`FieldSpec::read`] routine.
//! Offsets are 1-based as printed in the sensor datasheet: offset `N` means the
//! field's first byte is `sample[N - 1]`. All multi-byte fields are
//! little-endian regardless of host byte order.

use super::DecodeError;

/// Shortest sample the decoder accepts.
pub const MIN_SAMPLE_LEN: usize = 255;

/// Storage width of a field in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U8,
    U16,
    U24,
    U32,
}

impl Width {
    pub const fn bytes(self) -> usize {
        match self {
            Width::U8 => 1,
            Width::U16 => 2,
            Width::U24 => 3,
            Width::U32 => 4,
        }
    }
}

/// Conversion from a raw register value to engineering units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Raw,
    /// `(raw & 0xFFF) / 16.0 - 50.0`
    Celsius,
    /// `raw * 1e-3`
    Millivolts,
}

impl Scale {
    pub fn apply(self, raw: u32) -> f64 {
        match self {
            Scale::Raw => raw as f64,
            Scale::Celsius => (raw & 0xFFF) as f64 / 16.0 - 50.0,
            Scale::Millivolts => raw as f64 * 1e-3,
        }
    }
}

/// One entry of the field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// 1-based offset of the first byte.
    pub offset: usize,
    pub width: Width,
    pub scale: Scale,
}

impl FieldSpec {
    const fn new(name: &'static str, offset: usize, width: Width, scale: Scale) -> Self {
        Self {
            name,
            offset,
            width,
            scale,
        }
    }

    /// Zero-based byte range covered by this field.
    pub const fn range(&self) -> std::ops::Range<usize> {
        (self.offset - 1)..(self.offset - 1 + self.width.bytes())
    }

    /// Exclusive end of the field, i.e. the minimum buffer length that holds it.
    pub const fn end(&self) -> usize {
        self.offset - 1 + self.width.bytes()
    }

    /// Read the raw little-endian value. Never reads past `sample`.
    pub fn read(&self, sample: &[u8]) -> Result<u32, DecodeError> {
        let bytes = sample.get(self.range()).ok_or(DecodeError::Truncated {
            len: sample.len(),
            required: self.end(),
        })?;

        Ok(bytes
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
    }

    /// Read the value and apply the field's scale.
    pub fn read_scaled(&self, sample: &[u8]) -> Result<f64, DecodeError> {
        self.read(sample).map(|raw| self.scale.apply(raw))
    }

    /// Store `value` little-endian at this field's offset, truncating it to
    /// the field width. Bytes outside `buf` are silently skipped.
    pub fn write(&self, buf: &mut [u8], value: u32) {
        let le = value.to_le_bytes();
        for (i, idx) in self.range().enumerate() {
            if let Some(slot) = buf.get_mut(idx) {
                *slot = le[i];
            }
        }
    }
}

use Scale::{Celsius, Millivolts, Raw};
use Width::{U16, U24, U32, U8};

pub const SIZE: FieldSpec = FieldSpec::new("size", 1, U16, Raw);
pub const HEAD_CRC: FieldSpec = FieldSpec::new("head_crc", 5, U32, Raw);
pub const CHIP_ID: FieldSpec = FieldSpec::new("individual_info.chip_id", 13, U16, Raw);
pub const CHIP_ID_E17: FieldSpec = FieldSpec::new("individual_info.chip_id_e17", 17, U8, Raw);
pub const CHIP_ID_E18: FieldSpec = FieldSpec::new("individual_info.chip_id_e18", 18, U8, Raw);
pub const CHIP_ID_E19: FieldSpec = FieldSpec::new("individual_info.chip_id_e19", 19, U16, Raw);
pub const EXPOSURE_SP1: FieldSpec = FieldSpec::new("exposure.sp1", 31, U24, Raw);
pub const EXPOSURE_SP2: FieldSpec = FieldSpec::new("exposure.sp2", 34, U24, Raw);
pub const FRAME_COUNT: FieldSpec = FieldSpec::new("frame_count", 37, U32, Raw);
pub const FRAME_ID: FieldSpec = FieldSpec::new("frame_id", 41, U16, Raw);
pub const COMPENSATION_LEVEL: FieldSpec = FieldSpec::new("compensation.level", 49, U16, Raw);
pub const TEMP1: FieldSpec = FieldSpec::new("temperature.temp1", 53, U16, Celsius);
pub const TEMP2: FieldSpec = FieldSpec::new("temperature.temp2", 55, U16, Celsius);
pub const ERR_CODE_LOW: FieldSpec = FieldSpec::new("error_code.code_low", 61, U32, Raw);
pub const ERR_CODE_HIGH: FieldSpec = FieldSpec::new("error_code.code_high", 65, U8, Raw);
pub const VOLTAGE_HIGH: FieldSpec = FieldSpec::new("voltage.high", 89, U16, Millivolts);
pub const VOLTAGE_MID: FieldSpec = FieldSpec::new("voltage.mid", 91, U16, Millivolts);
pub const VOLTAGE_LOW: FieldSpec = FieldSpec::new("voltage.low", 93, U16, Millivolts);
pub const GAIN_SP1H: FieldSpec = FieldSpec::new("analog_gain.sp1h", 121, U16, Raw);
pub const GAIN_SP1L: FieldSpec = FieldSpec::new("analog_gain.sp1l", 123, U16, Raw);
pub const GAIN_SP2H: FieldSpec = FieldSpec::new("analog_gain.sp2h", 125, U16, Raw);
pub const GAIN_SP2L: FieldSpec = FieldSpec::new("analog_gain.sp2l", 127, U16, Raw);
pub const IMAGE_WIDTH: FieldSpec = FieldSpec::new("image_size.horizontal", 189, U16, Raw);
pub const IMAGE_HEIGHT: FieldSpec = FieldSpec::new("image_size.vertical", 191, U16, Raw);
pub const DRIVE_MODE: FieldSpec = FieldSpec::new("drive_mode.mode", 197, U8, Raw);
pub const SYNC_METHOD: FieldSpec = FieldSpec::new("sync_mode.method", 201, U8, Raw);
pub const SYNC_OP_MODE: FieldSpec = FieldSpec::new("sync_mode.op_mode", 202, U8, Raw);
pub const WB_CF0: FieldSpec = FieldSpec::new("white_balance.cf0", 249, U16, Raw);
pub const WB_CF1: FieldSpec = FieldSpec::new("white_balance.cf1", 251, U16, Raw);
pub const WB_CF2: FieldSpec = FieldSpec::new("white_balance.cf2", 253, U16, Raw);
/// Only present in samples of at least 256 bytes.
pub const WB_CF3: FieldSpec = FieldSpec::new("white_balance.cf3", 255, U16, Raw);

/// Fields that must fit inside [`MIN_SAMPLE_LEN`], in offset order.
pub const REQUIRED: &[FieldSpec] = &[
    SIZE,
    HEAD_CRC,
    CHIP_ID,
    CHIP_ID_E17,
    CHIP_ID_E18,
    CHIP_ID_E19,
    EXPOSURE_SP1,
    EXPOSURE_SP2,
    FRAME_COUNT,
    FRAME_ID,
    COMPENSATION_LEVEL,
    TEMP1,
    TEMP2,
    ERR_CODE_LOW,
    ERR_CODE_HIGH,
    VOLTAGE_HIGH,
    VOLTAGE_MID,
    VOLTAGE_LOW,
    GAIN_SP1H,
    GAIN_SP1L,
    GAIN_SP2H,
    GAIN_SP2L,
    IMAGE_WIDTH,
    IMAGE_HEIGHT,
    DRIVE_MODE,
    SYNC_METHOD,
    SYNC_OP_MODE,
    WB_CF0,
    WB_CF1,
    WB_CF2,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_strictly_increase_without_overlap() {
        let all: Vec<_> = REQUIRED.iter().chain(std::iter::once(&WB_CF3)).collect();
        for pair in all.windows(2) {
            assert!(
                pair[0].end() < pair[1].offset,
                "{} overlaps {}",
                pair[0].name,
                pair[1].name
            );
        }
    }

    #[test]
    fn required_fields_fit_minimum_length() {
        let max_end = REQUIRED.iter().map(FieldSpec::end).max().unwrap();
        assert!(max_end <= MIN_SAMPLE_LEN);
        assert!(WB_CF3.end() > MIN_SAMPLE_LEN);
    }

    #[test]
    fn read_is_little_endian() {
        let mut buf = [0u8; 8];
        buf[4..8].copy_from_slice(&[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(HEAD_CRC.read(&buf).unwrap(), 0x1234_5678);
    }

    #[test]
    fn read_past_end_is_rejected() {
        let buf = [0u8; 41];
        assert!(FRAME_COUNT.read(&buf).is_ok());
        assert_eq!(
            FRAME_ID.read(&buf).unwrap_err(),
            DecodeError::Truncated {
                len: 41,
                required: 42
            }
        );
    }

    #[test]
    fn write_then_read_24_bit() {
        let mut buf = [0u8; 64];
        EXPOSURE_SP1.write(&mut buf, 0x00AB_CDEF);
        assert_eq!(&buf[30..33], &[0xEF, 0xCD, 0xAB]);
        assert_eq!(EXPOSURE_SP1.read(&buf).unwrap(), 0x00AB_CDEF);
        // neighbour untouched
        assert_eq!(EXPOSURE_SP2.read(&buf).unwrap(), 0);
    }

    #[test]
    fn scales() {
        assert_eq!(Scale::Celsius.apply(0x0550), 35.0);
        assert_eq!(Scale::Celsius.apply(0x0230), -15.0);
        // upper nibble is masked off
        assert_eq!(Scale::Celsius.apply(0xF550), 35.0);
        assert!((Scale::Millivolts.apply(3300) - 3.3).abs() < 1e-12);
    }
}
