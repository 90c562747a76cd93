//! CSV and TXT output with a configurable delimiter.

use tracing::debug;

use crate::error::PointError;
use crate::format::Format;
use crate::model::{Cell, PointTable};
use crate::settings::WriteSettings;
use crate::writers::PointWriter;

pub struct DelimitedWriter;

impl PointWriter for DelimitedWriter {
    fn format(&self) -> Format {
        Format::Delimited
    }

    fn write(&self, table: &PointTable, settings: &WriteSettings) -> Result<Vec<u8>, PointError> {
        let delimiter = u8::try_from(settings.delimiter).map_err(|_| {
            PointError::UnsupportedFormat(format!(
                "delimiter '{}' is not a single-byte character",
                settings.delimiter
            ))
        })?;

        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_writer(Vec::new());
        if settings.include_header {
            writer.write_record(&table.columns)?;
        }
        for row in &table.rows {
            writer.write_record(row.iter().map(Cell::to_string))?;
        }
        debug!(rows = table.len(), delimiter = %settings.delimiter, "wrote delimited text");
        writer
            .into_inner()
            .map_err(|e| PointError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{COL_E, COL_PT};

    fn table() -> PointTable {
        PointTable {
            columns: vec![COL_PT.into(), COL_E.into(), "Note".into()],
            rows: vec![
                vec![Cell::text("1"), Cell::Number(500000.5), Cell::text("a, b")],
                vec![Cell::text("2"), Cell::Number(12.0), Cell::Null],
            ],
        }
    }

    #[test]
    fn writes_header_and_quotes() {
        let bytes = DelimitedWriter.write(&table(), &WriteSettings::default()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "PT,Easting,Note\n1,500000.5,\"a, b\"\n2,12,\n");
    }

    #[test]
    fn tab_without_header() {
        let settings = WriteSettings {
            delimiter: '\t',
            include_header: false,
            ..Default::default()
        };
        let text = String::from_utf8(DelimitedWriter.write(&table(), &settings).unwrap()).unwrap();
        assert_eq!(text, "1\t500000.5\ta, b\n2\t12\t\n");
    }

    #[test]
    fn multibyte_delimiter_is_rejected() {
        let settings = WriteSettings {
            delimiter: '→',
            ..Default::default()
        };
        assert!(matches!(
            DelimitedWriter.write(&table(), &settings),
            Err(PointError::UnsupportedFormat(_))
        ));
    }
}
