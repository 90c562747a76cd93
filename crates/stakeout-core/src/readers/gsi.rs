//! Leica GSI-16 reader.
//!
//! A GSI file is a stream of words `[*]WI....±DDDDDDDDDDDDDDDD`: a two-digit
//! word index, optional info characters, a sign and a 16-character data
//! block. Word 11 opens a point; the words after it fill that point in.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{ParseWarning, PointError, WarningKind};
use crate::format::Format;
use crate::model::{Cell, RawTable, COL_CODE, COL_E, COL_N, COL_PT, COL_Z};
use crate::parsing::values::{from_millis, is_numeric_token, to_decimal, to_millis};
use crate::readers::{no_records, ParsedPoints, PointReader};
use crate::settings::ReadSettings;
use crate::sniff::decode_text;

static GSI_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*?(\d{2})[.\w]*([+-])((?s:.{16}))").expect("GSI word pattern is valid")
});

pub struct GsiReader;

#[derive(Debug)]
struct GsiPoint {
    pt: String,
    easting: f64,
    northing: f64,
    elevation: f64,
    code: String,
}

impl GsiPoint {
    fn into_row(self) -> Vec<Cell> {
        vec![
            Cell::Text(self.pt),
            Cell::Number(self.easting),
            Cell::Number(self.northing),
            Cell::Number(self.elevation),
            Cell::Text(self.code),
        ]
    }
}

impl PointReader for GsiReader {
    fn format(&self) -> Format {
        Format::Gsi
    }

    fn read(&self, bytes: &[u8], _settings: &ReadSettings) -> Result<ParsedPoints, PointError> {
        let decoded = decode_text(bytes)?;
        let parsed = parse_gsi(&decoded.text);
        if parsed.table.rows.is_empty() {
            return Err(no_records(Format::Gsi));
        }
        info!(points = parsed.table.rows.len(), "read GSI points");
        Ok(parsed)
    }
}

/// Point id of a word 11 data block. Numeric ids lose their zero padding.
fn point_id(block: &str, completed: usize) -> String {
    let id = block.trim();
    if id.is_empty() {
        return format!("GSI_Pt_{}", completed + 1);
    }
    if id.chars().all(|c| c.is_ascii_digit()) {
        let stripped = id.trim_start_matches('0');
        return if stripped.is_empty() { "0" } else { stripped }.to_string();
    }
    id.to_string()
}

/// Millimetre value of a numeric block. A sign inside the block wins over
/// the word sign.
fn signed_value(sign: &str, data: &str) -> Option<f64> {
    if data.starts_with('-') || data.starts_with('+') || sign != "-" {
        from_millis(data)
    } else {
        from_millis(&format!("-{data}"))
    }
}

/// Code word text: literal when the block holds a space or is not numeric,
/// otherwise a millimetre-scaled decimal without trailing zeros.
fn code_value(sign: &str, block: &str) -> String {
    let data = block.trim();
    if block.contains(' ') || !is_numeric_token(data) {
        return data.to_string();
    }
    match signed_value(sign, data) {
        Some(v) if v != 0.0 => to_decimal(v)
            .round_dp(4)
            .normalize()
            .to_string(),
        Some(_) => "0.0".to_string(),
        None => data.to_string(),
    }
}

/// Parse GSI text into a preliminary table with PT, Easting, Northing,
/// Elevation and Code columns.
pub fn parse_gsi(text: &str) -> ParsedPoints {
    let mut rows = Vec::new();
    let mut warnings = Vec::new();
    let mut coerced_fields = 0;
    let mut current: Option<GsiPoint> = None;

    for caps in GSI_WORD.captures_iter(text) {
        let (Some(whole), Some(word), Some(sign), Some(block)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        let (word, sign, block) = (word.as_str(), sign.as_str(), block.as_str());

        if word == "11" {
            if let Some(done) = current.take() {
                rows.push(done.into_row());
            }
            current = Some(GsiPoint {
                pt: point_id(block, rows.len()),
                easting: 0.0,
                northing: 0.0,
                elevation: 0.0,
                code: String::new(),
            });
            continue;
        }

        let Some(point) = current.as_mut() else {
            continue;
        };

        if word == "71" {
            point.code = code_value(sign, block);
            continue;
        }

        let target = match word {
            "81" | "21" => &mut point.northing,
            "82" | "22" => &mut point.easting,
            "83" | "23" => &mut point.elevation,
            _ => continue,
        };

        let data = block.trim();
        match is_numeric_token(data)
            .then(|| signed_value(sign, data))
            .flatten()
        {
            Some(v) => *target = v,
            None => {
                let line = text[..whole.start()].matches('\n').count() + 1;
                warn!(line, word, data = %block, pt = %point.pt, "non-numeric GSI coordinate word");
                warnings.push(ParseWarning::at_line(
                    WarningKind::FieldCoerced,
                    line,
                    format!("word {word} of point {} is not numeric: '{sign}{block}'", point.pt),
                ));
                coerced_fields += 1;
            }
        }
    }

    if let Some(done) = current {
        rows.push(done.into_row());
    }
    debug!(points = rows.len(), warnings = warnings.len(), "parsed GSI words");

    let mut table = RawTable::with_header(&[COL_PT, COL_E, COL_N, COL_Z, COL_CODE]);
    table.rows = rows;
    ParsedPoints {
        table,
        warnings,
        coerced_fields,
    }
}

/// Largest magnitude, in millimetres, that fits the 16 digits of a block.
const MAX_BLOCK_MILLIS: u64 = 9_999_999_999_999_999;

/// Encode a value in millimetres as a signed 16-digit GSI block.
pub(crate) fn encode_millis(value: f64) -> Result<String, PointError> {
    let mm = to_millis(value)
        .filter(|mm| mm.unsigned_abs() <= MAX_BLOCK_MILLIS)
        .ok_or_else(|| PointError::ValueOutOfRange {
            format: "GSI".to_string(),
            value,
        })?;
    Ok(format!("{mm:+017}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "*110001+0000000000000005 81..40+0000002500000456 82..40+0000000500000123 83..40+0000000000012300 71....+0000000000007500\n";

    fn row(parsed: &ParsedPoints, i: usize) -> &Vec<Cell> {
        &parsed.table.rows[i]
    }

    #[test]
    fn reads_point_words() {
        let parsed = parse_gsi(LINE);
        assert_eq!(parsed.table.rows.len(), 1);
        let r = row(&parsed, 0);
        assert_eq!(r[0], Cell::text("5"));
        assert_eq!(r[1], Cell::Number(500000.123));
        assert_eq!(r[2], Cell::Number(2500000.456));
        assert_eq!(r[3], Cell::Number(12.3));
        assert_eq!(r[4], Cell::text("7.5"));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn embedded_sign_wins_over_word_sign() {
        let text = "*11....+0000000000000001 83..40+-000000000001500\n";
        let parsed = parse_gsi(text);
        assert_eq!(row(&parsed, 0)[3], Cell::Number(-1.5));

        let text = "*11....+0000000000000001 83..40-0000000000001500\n";
        let parsed = parse_gsi(text);
        assert_eq!(row(&parsed, 0)[3], Cell::Number(-1.5));

        // a negative word sign does not flip an embedded minus
        let text = "*11....+0000000000000001 83..40--000000000001500\n";
        let parsed = parse_gsi(text);
        assert_eq!(row(&parsed, 0)[3], Cell::Number(-1.5));
    }

    #[test]
    fn text_ids_and_codes_are_literal() {
        let text = "*11....+        EXISTING 71....+        KERB TOP\n\
                    *11....+0000000000000000 71....+ABC0000000000001\n";
        let parsed = parse_gsi(text);
        assert_eq!(row(&parsed, 0)[0], Cell::text("EXISTING"));
        assert_eq!(row(&parsed, 0)[4], Cell::text("KERB TOP"));
        assert_eq!(row(&parsed, 1)[0], Cell::text("0"));
        assert_eq!(row(&parsed, 1)[4], Cell::text("ABC0000000000001"));
    }

    #[test]
    fn zero_code_and_empty_id() {
        let text = "*11....+                 71....+0000000000000000\n";
        let parsed = parse_gsi(text);
        assert_eq!(row(&parsed, 0)[0], Cell::text("GSI_Pt_1"));
        assert_eq!(row(&parsed, 0)[4], Cell::text("0.0"));
    }

    #[test]
    fn bad_coordinate_word_is_a_warning() {
        let text = "*11....+0000000000000009\n81..40+00000000000ABCDE 82..40+0000000000001000\n";
        let parsed = parse_gsi(text);
        assert_eq!(parsed.table.rows.len(), 1);
        assert_eq!(row(&parsed, 0)[1], Cell::Number(1.0));
        assert_eq!(row(&parsed, 0)[2], Cell::Number(0.0));
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].line, Some(2));
        assert_eq!(parsed.coerced_fields, 1);
    }

    #[test]
    fn words_before_first_point_are_ignored() {
        let parsed = parse_gsi("81..40+0000000000001000\n");
        assert!(parsed.table.rows.is_empty());
    }

    #[test]
    fn empty_input_has_no_records() {
        let err = GsiReader.read(b"no words here\n", &ReadSettings::default()).unwrap_err();
        assert!(matches!(err, PointError::NoValidRecords { .. }));
    }

    #[test]
    fn millimetre_blocks() {
        assert_eq!(encode_millis(500000.123).unwrap(), "+0000000500000123");
        assert_eq!(encode_millis(-1.5).unwrap(), "-0000000000001500");
        assert_eq!(encode_millis(9_999_999_999_999.0).unwrap(), "+9999999999999000");
        assert!(matches!(
            encode_millis(10_000_000_000_000.0),
            Err(PointError::ValueOutOfRange { .. })
        ));
    }
}
