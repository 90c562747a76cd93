//! Leica GSI-16 output, one point per line.

use std::fmt::Write as _;

use tracing::{debug, warn};

use crate::error::PointError;
use crate::format::Format;
use crate::model::PointTable;
use crate::parsing::values::is_numeric_token;
use crate::readers::gsi::encode_millis;
use crate::settings::WriteSettings;
use crate::writers::PointWriter;

/// Width of a GSI-16 data block.
pub const BLOCK: usize = 16;

pub struct GsiWriter;

impl PointWriter for GsiWriter {
    fn format(&self) -> Format {
        Format::Gsi
    }

    fn write(&self, table: &PointTable, _settings: &WriteSettings) -> Result<Vec<u8>, PointError> {
        let mut out = String::new();
        for record in table.records() {
            let _ = writeln!(
                out,
                "*11....+{} 81..40{} 82..40{} 83..40{} 71....{}",
                point_block(&record.pt),
                encode_millis(record.northing)?,
                encode_millis(record.easting)?,
                encode_millis(record.elevation)?,
                code_block(&record.code)?,
            );
        }
        debug!(points = table.len(), "wrote GSI words");
        Ok(out.into_bytes())
    }
}

/// Numeric ids are zero-filled, others left-aligned and cut to the block width.
fn point_block(pt: &str) -> String {
    let pt = pt.trim();
    if !pt.is_empty() && pt.chars().all(|c| c.is_ascii_digit()) {
        let digits = &pt[pt.len().saturating_sub(BLOCK)..];
        return format!("{digits:0>BLOCK$}");
    }
    let clipped: String = pt.chars().take(BLOCK).collect();
    if clipped.len() < pt.len() {
        warn!(pt, "point id longer than {BLOCK} characters truncated");
    }
    format!("{clipped:<BLOCK$}")
}

/// Numeric codes go out in millimetres like coordinates. Text codes are
/// right-aligned so the block keeps its padding spaces and reads back as
/// text; an empty code is an all-blank block.
fn code_block(code: &str) -> Result<String, PointError> {
    let code = code.trim();
    if code.is_empty() {
        return Ok(format!("+{:BLOCK$}", ""));
    }
    if is_numeric_token(code) {
        if let Ok(v) = code.parse::<f64>() {
            return encode_millis(v);
        }
    }
    let clipped: String = code.chars().take(BLOCK - 1).collect();
    Ok(format!("+{clipped:>BLOCK$}"))
}
