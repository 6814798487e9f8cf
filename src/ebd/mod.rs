//! Embedded Binary Descriptor (EBD) decoding
//!
//! The sensor prefixes every frame with a fixed-layout metadata block. [`decode`]
//! turns the leading bytes of a frame into an [`EmbeddedMetadataRecord`]. It is a
//! pure function: no I/O, no state, and it never reads outside the input slice.

pub mod layout;

use thiserror::Error;

use layout::{FieldSpec, MIN_SAMPLE_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("sample truncated: {len} bytes, need at least {required}")]
    Truncated { len: usize, required: usize },
}

/// A register value together with its value in engineering units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaled {
    pub raw: u16,
    pub value: f64,
}

impl Scaled {
    fn read(sample: &[u8], field: &FieldSpec) -> Result<Self, DecodeError> {
        let raw = field.read(sample)?;
        Ok(Self {
            raw: raw as u16,
            value: field.scale.apply(raw),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndividualInfo {
    pub chip_id: u16,
    pub chip_id_e17: u8,
    pub chip_id_e18: u8,
    pub chip_id_e19: u16,
}

/// Exposure line counts for the two sub-periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exposure {
    pub sp1: u32,
    pub sp2: u32,
}

/// Sensor temperatures in degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature {
    pub temp1: Scaled,
    pub temp2: Scaled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
    pub code_low: u32,
    pub code_high: u8,
}

/// Supply rails in volts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voltage {
    pub high: Scaled,
    pub mid: Scaled,
    pub low: Scaled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogGain {
    pub sp1h: u16,
    pub sp1l: u16,
    pub sp2h: u16,
    pub sp2l: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub horizontal: u16,
    pub vertical: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncMode {
    pub method: u8,
    pub op_mode: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhiteBalance {
    pub cf0: u16,
    pub cf1: u16,
    pub cf2: u16,
    /// Lies past the minimum sample length; `None` for 255-byte samples.
    pub cf3: Option<u16>,
}

/// Decoded view of one frame's embedded metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedMetadataRecord {
    pub size: u16,
    /// Not validated here.
    pub head_crc: u32,
    pub individual_info: IndividualInfo,
    pub exposure: Exposure,
    pub frame_count: u32,
    pub frame_id: u16,
    pub compensation_level: u16,
    pub temperature: Temperature,
    pub error_code: ErrorCode,
    pub voltage: Voltage,
    pub analog_gain: AnalogGain,
    pub image_size: ImageSize,
    pub drive_mode: u8,
    pub sync_mode: SyncMode,
    pub white_balance: WhiteBalance,
}

/// Decode the EBD at the head of `sample`.
///
/// Fails with [`DecodeError::Truncated`] if `sample` is shorter than
/// [`MIN_SAMPLE_LEN`]; no partial record is ever returned.
pub fn decode(sample: &[u8]) -> Result<EmbeddedMetadataRecord, DecodeError> {
    if sample.len() < MIN_SAMPLE_LEN {
        return Err(DecodeError::Truncated {
            len: sample.len(),
            required: MIN_SAMPLE_LEN,
        });
    }

    use layout::*;
    let u8_at = |f: &FieldSpec| f.read(sample).map(|v| v as u8);
    let u16_at = |f: &FieldSpec| f.read(sample).map(|v| v as u16);

    Ok(EmbeddedMetadataRecord {
        size: u16_at(&SIZE)?,
        head_crc: HEAD_CRC.read(sample)?,
        individual_info: IndividualInfo {
            chip_id: u16_at(&CHIP_ID)?,
            chip_id_e17: u8_at(&CHIP_ID_E17)?,
            chip_id_e18: u8_at(&CHIP_ID_E18)?,
            chip_id_e19: u16_at(&CHIP_ID_E19)?,
        },
        exposure: Exposure {
            sp1: EXPOSURE_SP1.read(sample)?,
            sp2: EXPOSURE_SP2.read(sample)?,
        },
        frame_count: FRAME_COUNT.read(sample)?,
        frame_id: u16_at(&FRAME_ID)?,
        compensation_level: u16_at(&COMPENSATION_LEVEL)?,
        temperature: Temperature {
            temp1: Scaled::read(sample, &TEMP1)?,
            temp2: Scaled::read(sample, &TEMP2)?,
        },
        error_code: ErrorCode {
            code_low: ERR_CODE_LOW.read(sample)?,
            code_high: u8_at(&ERR_CODE_HIGH)?,
        },
        voltage: Voltage {
            high: Scaled::read(sample, &VOLTAGE_HIGH)?,
            mid: Scaled::read(sample, &VOLTAGE_MID)?,
            low: Scaled::read(sample, &VOLTAGE_LOW)?,
        },
        analog_gain: AnalogGain {
            sp1h: u16_at(&GAIN_SP1H)?,
            sp1l: u16_at(&GAIN_SP1L)?,
            sp2h: u16_at(&GAIN_SP2H)?,
            sp2l: u16_at(&GAIN_SP2L)?,
        },
        image_size: ImageSize {
            horizontal: u16_at(&IMAGE_WIDTH)?,
            vertical: u16_at(&IMAGE_HEIGHT)?,
        },
        drive_mode: u8_at(&DRIVE_MODE)?,
        sync_mode: SyncMode {
            method: u8_at(&SYNC_METHOD)?,
            op_mode: u8_at(&SYNC_OP_MODE)?,
        },
        white_balance: WhiteBalance {
            cf0: u16_at(&WB_CF0)?,
            cf1: u16_at(&WB_CF1)?,
            cf2: u16_at(&WB_CF2)?,
            cf3: u16_at(&WB_CF3).ok(),
        },
    })
}
