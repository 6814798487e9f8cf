//! Text rendering of decoded frames
//!
//! Hex dumps use the sensor bring-up layout: every byte as `[NNNN] XX` with a
//! 1-based running index, sixteen bytes per line.

use std::io::{self, Write};

use crate::capture::FrameSample;
use crate::ebd::{DecodeError, EmbeddedMetadataRecord, Scaled};

const BYTES_PER_LINE: usize = 16;

fn hex_entries<W: Write + ?Sized>(out: &mut W, bytes: &[u8], first_index: usize) -> io::Result<()> {
    for (line_no, line) in bytes.chunks(BYTES_PER_LINE).enumerate() {
        let base = first_index + line_no * BYTES_PER_LINE;
        for (i, b) in line.iter().enumerate() {
            if i > 0 {
                out.write_all(b" ")?;
            }
            write!(out, "[{:04}] {:02X}", base + i, b)?;
        }
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Dump `bytes` sixteen to a line, indices starting at 1.
pub fn write_hex_dump<W: Write + ?Sized>(out: &mut W, bytes: &[u8]) -> io::Result<()> {
    hex_entries(out, bytes, 1)
}

fn scaled(value: &Scaled, unit: &str, digits: usize) -> String {
    format!("{:.*} {} (raw 0x{:04X})", digits, value.value, unit, value.raw)
}

/// Field listing for one record, one `label: value` per line.
pub fn write_record<W: Write + ?Sized>(out: &mut W, rec: &EmbeddedMetadataRecord) -> io::Result<()> {
    let info = &rec.individual_info;
    let rows: [(&str, String); 30] = [
        ("size", rec.size.to_string()),
        ("head_crc", format!("0x{:08X}", rec.head_crc)),
        ("individual_info.chip_id", format!("0x{:04X}", info.chip_id)),
        ("individual_info.chip_id_e17", format!("0x{:02X}", info.chip_id_e17)),
        ("individual_info.chip_id_e18", format!("0x{:02X}", info.chip_id_e18)),
        ("individual_info.chip_id_e19", format!("0x{:04X}", info.chip_id_e19)),
        ("exposure.sp1", rec.exposure.sp1.to_string()),
        ("exposure.sp2", rec.exposure.sp2.to_string()),
        ("frame_count", rec.frame_count.to_string()),
        ("frame_id", rec.frame_id.to_string()),
        ("compensation.level", rec.compensation_level.to_string()),
        ("temperature.temp1", scaled(&rec.temperature.temp1, "C", 2)),
        ("temperature.temp2", scaled(&rec.temperature.temp2, "C", 2)),
        ("error_code.code_low", format!("0x{:08X}", rec.error_code.code_low)),
        ("error_code.code_high", format!("0x{:02X}", rec.error_code.code_high)),
        ("voltage.high", scaled(&rec.voltage.high, "V", 3)),
        ("voltage.mid", scaled(&rec.voltage.mid, "V", 3)),
        ("voltage.low", scaled(&rec.voltage.low, "V", 3)),
        ("analog_gain.sp1h", format!("0x{:04X}", rec.analog_gain.sp1h)),
        ("analog_gain.sp1l", format!("0x{:04X}", rec.analog_gain.sp1l)),
        ("analog_gain.sp2h", format!("0x{:04X}", rec.analog_gain.sp2h)),
        ("analog_gain.sp2l", format!("0x{:04X}", rec.analog_gain.sp2l)),
        ("image_size.horizontal", rec.image_size.horizontal.to_string()),
        ("image_size.vertical", rec.image_size.vertical.to_string()),
        ("drive_mode.mode", rec.drive_mode.to_string()),
        ("sync_mode.method", rec.sync_mode.method.to_string()),
        ("sync_mode.op_mode", rec.sync_mode.op_mode.to_string()),
        ("white_balance.cf0", format!("0x{:04X}", rec.white_balance.cf0)),
        ("white_balance.cf1", format!("0x{:04X}", rec.white_balance.cf1)),
        ("white_balance.cf2", format!("0x{:04X}", rec.white_balance.cf2)),
    ];

    for (label, value) in &rows {
        writeln!(out, "{:<28}: {}", label, value)?;
    }
    match rec.white_balance.cf3 {
        Some(cf3) => writeln!(out, "{:<28}: 0x{:04X}", "white_balance.cf3", cf3),
        None => writeln!(out, "{:<28}: n/a", "white_balance.cf3"),
    }
}

/// Full per-frame report: header, decoded fields (or the decode error), hex dump.
pub fn write_frame_report<W: Write + ?Sized>(
    out: &mut W,
    sample: &FrameSample,
    decoded: &Result<EmbeddedMetadataRecord, DecodeError>,
) -> io::Result<()> {
    writeln!(
        out,
        "===== frame {} ({} bytes) =====",
        sample.sequence(),
        sample.len()
    )?;
    match decoded {
        Ok(rec) => write_record(out, rec)?,
        Err(e) => writeln!(out, "decode error: {}", e)?,
    }
    writeln!(out, "----- raw -----")?;
    write_hex_dump(out, sample.bytes())?;
    out.write_all(b"\n")
}

/// What [`dump_rows`] actually printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowDump {
    pub rows_printed: u32,
    pub bytes_printed: usize,
    /// Rows in the requested range that lay past the end of the frame.
    pub rows_clipped: u32,
}

/// Hex-dump rows `start_row..=end_row` of a packed frame with
/// `bytes_per_row` bytes per row. The byte index runs on across rows.
pub fn dump_rows<W: Write + ?Sized>(
    out: &mut W,
    frame: &[u8],
    bytes_per_row: usize,
    start_row: u32,
    end_row: u32,
) -> io::Result<RowDump> {
    let mut dump = RowDump {
        rows_printed: 0,
        bytes_printed: 0,
        rows_clipped: 0,
    };
    if bytes_per_row == 0 || end_row < start_row {
        return Ok(dump);
    }

    for row in start_row..=end_row {
        let range = (row as usize)
            .checked_mul(bytes_per_row)
            .and_then(|begin| begin.checked_add(bytes_per_row).map(|end| begin..end));
        let Some(bytes) = range.and_then(|r| frame.get(r)) else {
            dump.rows_clipped = (end_row - row).saturating_add(1);
            break;
        };
        hex_entries(out, bytes, dump.bytes_printed + 1)?;
        dump.rows_printed += 1;
        dump.bytes_printed += bytes.len();
    }
    Ok(dump)
}
