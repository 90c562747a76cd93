//! Sokkia SDR33 reader for `08KI` and `08TP` coordinate records.

use tracing::{debug, info, warn};

use crate::error::{ParseWarning, PointError, WarningKind};
use crate::format::Format;
use crate::model::{Cell, RawTable, COL_CODE, COL_DESC, COL_E, COL_N, COL_PT, COL_Z};
use crate::parsing::values::{char_slice, parse_field};
use crate::readers::{no_records, no_records_because, ParsedPoints, PointReader};
use crate::settings::{CoordinateOrder, ReadSettings};
use crate::sniff::decode_text;

/// Half-open character ranges of the fixed-width record fields.
pub const FIELD_ID: (usize, usize) = (4, 20);
pub const FIELD_COORD1: (usize, usize) = (20, 36);
pub const FIELD_COORD2: (usize, usize) = (36, 52);
pub const FIELD_ELEV: (usize, usize) = (52, 68);
pub const FIELD_CODE: (usize, usize) = (68, 84);

pub const COORDINATE_FORMAT_TAG: &str = "Coordinate Format:";

pub struct Sdr33Reader;

impl PointReader for Sdr33Reader {
    fn format(&self) -> Format {
        Format::Sdr33
    }

    fn read(&self, bytes: &[u8], _settings: &ReadSettings) -> Result<ParsedPoints, PointError> {
        let decoded = decode_text(bytes)?;
        let parsed = parse_sdr33(&decoded.text);
        if parsed.table.rows.is_empty() {
            let reason = parsed.warnings.iter().rev().find(|w| w.line.is_none());
            return Err(match reason {
                Some(w) => no_records_because(Format::Sdr33, w.message.clone()),
                None => no_records(Format::Sdr33),
            });
        }
        info!(points = parsed.table.rows.len(), "read SDR33 points");
        Ok(parsed)
    }
}

/// Coordinate order declared by a `Coordinate Format:` header line, if any.
pub fn header_order(text: &str) -> Option<CoordinateOrder> {
    text.lines()
        .find(|l| l.contains(COORDINATE_FORMAT_TAG))
        .and_then(|l| {
            if l.contains("N-E") {
                Some(CoordinateOrder::Nez)
            } else if l.contains("E-N") {
                Some(CoordinateOrder::Enz)
            } else {
                None
            }
        })
}

/// Parse SDR33 text into a preliminary table with the six canonical columns.
pub fn parse_sdr33(text: &str) -> ParsedPoints {
    let order = header_order(text).unwrap_or_default();
    debug!(order = %order, "SDR33 coordinate order");

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    let mut warnings = Vec::new();
    let mut coerced_fields = 0;
    let mut records = 0;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim_end_matches(['\r', '\n']);
        let fixed_en = line.starts_with("08TP");
        if !(fixed_en || line.starts_with("08KI")) {
            continue;
        }
        records += 1;

        if line.chars().count() < FIELD_ELEV.1 {
            warn!(line = line_no, "SDR33 record too short, skipped");
            warnings.push(ParseWarning::at_line(
                WarningKind::RecordParse,
                line_no,
                "record shorter than the elevation field",
            ));
            continue;
        }

        let field = |(start, end): (usize, usize)| char_slice(line, start, end).trim().to_string();
        let pt = field(FIELD_ID);
        let raw = [field(FIELD_COORD1), field(FIELD_COORD2), field(FIELD_ELEV)];
        let code = field(FIELD_CODE);

        let mut values = [0.0_f64; 3];
        for (value, text) in values.iter_mut().zip(&raw) {
            match parse_field(text) {
                Some(Ok(v)) => *value = v,
                Some(Err(bad)) => {
                    warn!(line = line_no, value = %bad, "invalid SDR33 coordinate, using 0");
                    warnings.push(ParseWarning::at_line(
                        WarningKind::FieldCoerced,
                        line_no,
                        format!("invalid coordinate '{bad}' replaced by 0"),
                    ));
                    coerced_fields += 1;
                }
                None => {}
            }
        }

        if values.iter().all(|v| *v == 0.0) {
            debug!(line = line_no, pt = %pt, "all coordinates zero, record dropped");
            continue;
        }
        if raw.iter().all(String::is_empty) {
            debug!(line = line_no, pt = %pt, "all coordinates blank, record dropped");
            continue;
        }

        let pt = if pt.is_empty() {
            format!("SDR_Pt_{}", rows.len() + 1)
        } else {
            pt
        };
        let [c1, c2, z] = values;
        let (easting, northing) = if fixed_en || order == CoordinateOrder::Enz {
            (c1, c2)
        } else {
            (c2, c1)
        };

        rows.push(vec![
            Cell::Text(pt),
            Cell::Number(easting),
            Cell::Number(northing),
            Cell::Number(z),
            Cell::Text(code),
            Cell::Text(String::new()),
        ]);
    }

    if rows.is_empty() {
        let message = if records > 0 {
            format!("{records} point records but none held coordinates")
        } else {
            let kinds = record_kinds(text);
            if kinds.is_empty() {
                "no 08KI or 08TP records".to_string()
            } else {
                format!("no 08KI or 08TP records, found {}", kinds.join(", "))
            }
        };
        warn!("{message}");
        warnings.push(ParseWarning::new(WarningKind::RecordParse, message));
    }

    let mut table = RawTable::with_header(&[COL_PT, COL_E, COL_N, COL_Z, COL_CODE, COL_DESC]);
    table.rows = rows;
    ParsedPoints {
        table,
        warnings,
        coerced_fields,
    }
}

/// Distinct four-character record kinds in first-seen order.
fn record_kinds(text: &str) -> Vec<String> {
    let mut kinds: Vec<String> = Vec::new();
    for line in text.lines() {
        let kind = char_slice(line.trim_start(), 0, 4);
        if kind.chars().count() == 4 && !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    kinds
}
