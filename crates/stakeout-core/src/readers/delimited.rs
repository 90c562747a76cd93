use tracing::{info, warn};

use crate::error::{ParseWarning, PointError, WarningKind};
use crate::format::Format;
use crate::model::{Cell, RawTable};
use crate::readers::{no_records, ParsedPoints, PointReader};
use crate::settings::ReadSettings;
use crate::sniff::{decode_text, sniff_layout, Delimiter};

/// CSV, TXT, DAT and any text file with an unrecognized extension.
pub struct DelimitedReader;

impl PointReader for DelimitedReader {
    fn format(&self) -> Format {
        Format::Delimited
    }

    fn read(&self, bytes: &[u8], settings: &ReadSettings) -> Result<ParsedPoints, PointError> {
        let decoded = decode_text(bytes)?;
        let layout = sniff_layout(&decoded.text, &settings.comment_prefix);
        info!(
            encoding = decoded.encoding.name(),
            delimiter = %layout.delimiter.delimiter,
            skip = layout.header.skip_rows,
            header = layout.header.has_header,
            "delimited text layout"
        );

        let mut parsed = parse_delimited(
            &decoded.text,
            layout.delimiter.delimiter,
            layout.header.skip_rows,
            layout.header.has_header,
            &settings.comment_prefix,
        )?;
        if layout.delimiter.ambiguous {
            parsed.warnings.insert(
                0,
                ParseWarning::new(
                    WarningKind::DelimiterAmbiguous,
                    format!("delimiter could not be sniffed, using '{}'", layout.delimiter.delimiter),
                ),
            );
        }
        if parsed.table.rows.is_empty() {
            return Err(no_records(Format::Delimited));
        }
        Ok(parsed)
    }
}

/// Lines after `skip_rows` with blank and comment lines removed, paired with
/// their 1-based line numbers.
fn data_lines<'a>(text: &'a str, skip_rows: usize, comment_prefix: &str) -> Vec<(usize, &'a str)> {
    text.lines()
        .enumerate()
        .skip(skip_rows)
        .filter(|(_, l)| {
            let t = l.trim();
            !t.is_empty() && (comment_prefix.is_empty() || !t.starts_with(comment_prefix))
        })
        .map(|(i, l)| (i + 1, l))
        .collect()
}

/// Parse delimited text once its layout is known.
pub fn parse_delimited(
    text: &str,
    delimiter: Delimiter,
    skip_rows: usize,
    has_header: bool,
    comment_prefix: &str,
) -> Result<ParsedPoints, PointError> {
    let lines = data_lines(text, skip_rows, comment_prefix);
    let mut warnings = Vec::new();
    let mut records: Vec<(usize, Vec<String>)> = Vec::with_capacity(lines.len());

    match delimiter {
        Delimiter::Whitespace => {
            for (line_no, line) in &lines {
                records.push((*line_no, line.split_whitespace().map(str::to_string).collect()));
            }
        }
        Delimiter::Char(d) => {
            let joined = lines.iter().map(|(_, l)| *l).collect::<Vec<_>>().join("\n");
            let mut reader = csv::ReaderBuilder::new()
                .delimiter(d)
                .has_headers(false)
                .flexible(true)
                .trim(csv::Trim::All)
                .from_reader(joined.as_bytes());
            for (idx, result) in reader.records().enumerate() {
                let line_no = lines.get(idx).map_or(idx + 1, |(n, _)| *n);
                match result {
                    Ok(record) => records.push((line_no, record.iter().map(str::to_string).collect())),
                    Err(e) => {
                        warn!(line = line_no, error = %e, "skipping malformed record");
                        warnings.push(ParseWarning::at_line(
                            WarningKind::RecordParse,
                            line_no,
                            format!("malformed record skipped: {e}"),
                        ));
                    }
                }
            }
        }
    }

    let mut records = records.into_iter();
    let header = if has_header {
        records.next().map(|(_, fields)| fields)
    } else {
        None
    };
    let rows = records
        .map(|(_, fields)| {
            fields
                .into_iter()
                .map(|f| if f.is_empty() { Cell::Null } else { Cell::Text(f) })
                .collect()
        })
        .collect();

    Ok(ParsedPoints {
        table: RawTable { header, rows },
        warnings,
        coerced_fields: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_csv_with_header() {
        let bytes = b"PT,Easting,Northing,Elevation,Code\n1,500000.0,2500000.0,10.0,A\n2,500001,2500001,11,B\n";
        let parsed = DelimitedReader.read(bytes, &ReadSettings::default()).unwrap();
        let header = parsed.table.header.unwrap();
        assert_eq!(header[0], "PT");
        assert_eq!(parsed.table.rows.len(), 2);
        assert_eq!(parsed.table.rows[1][4], Cell::text("B"));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn reads_headerless_whitespace_with_comments() {
        let text = "# level run\n1   500000.0  2500000.0  10.0\n\n2   500001.0  2500001.0  11.0\n# end\n";
        let parsed = DelimitedReader
            .read(text.as_bytes(), &ReadSettings::default())
            .unwrap();
        assert!(parsed.table.header.is_none());
        assert_eq!(parsed.table.rows.len(), 2);
        assert_eq!(parsed.table.rows[1][0], Cell::text("2"));
    }

    #[test]
    fn quoted_fields_keep_delimiters() {
        let parsed = parse_delimited(
            "PT,Description\n1,\"fence, north\"\n",
            Delimiter::COMMA,
            0,
            true,
            "#",
        )
        .unwrap();
        assert_eq!(parsed.table.rows[0][1], Cell::text("fence, north"));
    }

    #[test]
    fn empty_fields_are_null() {
        let parsed = parse_delimited("1,,3\n", Delimiter::COMMA, 0, false, "#").unwrap();
        assert_eq!(parsed.table.rows[0][1], Cell::Null);
    }

    #[test]
    fn header_only_file_has_no_records() {
        let err = DelimitedReader
            .read(b"PT,E,N,Z\n", &ReadSettings::default())
            .unwrap_err();
        assert!(matches!(err, PointError::NoValidRecords { .. }));
    }

    #[test]
    fn ambiguous_delimiter_is_reported() {
        let parsed = DelimitedReader
            .read(b"P1\nP2\n", &ReadSettings::default())
            .unwrap();
        assert_eq!(parsed.warnings[0].kind, WarningKind::DelimiterAmbiguous);
    }
}
