//! Sokkia SDR33 output: a fixed header block followed by `08KI` records.

use std::fmt::Write as _;

use tracing::debug;

use crate::error::PointError;
use crate::format::Format;
use crate::model::PointTable;
use crate::parsing::values::format_plain;
use crate::readers::sdr33::COORDINATE_FORMAT_TAG;
use crate::settings::{CoordinateOrder, WriteSettings};
use crate::writers::PointWriter;

const FIELD_WIDTH: usize = 16;
const HEADER_WIDTH: usize = 64;

pub struct Sdr33Writer;

impl PointWriter for Sdr33Writer {
    fn format(&self) -> Format {
        Format::Sdr33
    }

    fn write(&self, table: &PointTable, settings: &WriteSettings) -> Result<Vec<u8>, PointError> {
        let order = settings.sdr_order;
        let mut out = header(order);
        for record in table.records() {
            let (c1, c2) = match order {
                CoordinateOrder::Nez => (record.northing, record.easting),
                CoordinateOrder::Enz => (record.easting, record.northing),
            };
            let _ = writeln!(
                out,
                "08KI{}{}{}{}{}",
                fit(&record.pt, true),
                fit(&format_plain(c1), false),
                fit(&format_plain(c2), false),
                fit(&format_plain(record.elevation), false),
                fit(&record.code, false),
            );
        }
        debug!(points = table.len(), order = %order, "wrote SDR33 records");
        Ok(out.into_bytes())
    }
}

fn header(order: CoordinateOrder) -> String {
    let padded = |s: String| format!("{s:<HEADER_WIDTH$}\n");
    let mut out = String::new();
    out.push_str("00NMSDR33                               111111\n");
    out.push_str("10NM>STAKEOUT EXPORT 121111\n");
    out.push_str(&padded("13NMAngle Unit: Degrees".into()));
    out.push_str(&padded("13DU1:Meters:".into()));
    out.push_str(&padded(format!("13NM{COORDINATE_FORMAT_TAG} {order}")));
    out.push_str(&padded("13NMPressure Unit: MmHg".into()));
    out.push_str(&padded("13NMTemperature Unit: Celsius".into()));
    out.push_str(&padded("13CCPlane Curvature Correction: Yes".into()));
    out
}

/// Pad or cut a value to one field, right-aligned for point ids.
fn fit(value: &str, right: bool) -> String {
    let clipped: String = value.trim().chars().take(FIELD_WIDTH).collect();
    if right {
        format!("{clipped:>FIELD_WIDTH$}")
    } else {
        format!("{clipped:<FIELD_WIDTH$}")
    }
}
