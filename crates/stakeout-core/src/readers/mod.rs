pub mod delimited;
pub mod dxf;
pub mod excel;
pub mod gsi;
pub mod kml;
pub mod sdr33;

use crate::error::{ParseWarning, PointError};
use crate::format::Format;
use crate::model::RawTable;
use crate::settings::ReadSettings;

/// Preliminary table produced by a reader, before normalization.
#[derive(Debug, Clone, Default)]
pub struct ParsedPoints {
    pub table: RawTable,
    pub warnings: Vec<ParseWarning>,
    /// Fields the reader replaced with a default because they were malformed.
    pub coerced_fields: usize,
}

impl ParsedPoints {
    pub fn new(table: RawTable) -> Self {
        Self {
            table,
            ..Default::default()
        }
    }
}

/// One input format.
///
/// Readers tolerate individual bad records (skipped with a warning) but fail
/// with `StructuralCorruption` when the container itself cannot be parsed and
/// with `NoValidRecords` when nothing usable remains.
pub trait PointReader: Send + Sync {
    fn format(&self) -> Format;

    fn read(&self, bytes: &[u8], settings: &ReadSettings) -> Result<ParsedPoints, PointError>;
}

/// Reader implementation for a format.
pub fn reader_for(format: Format) -> Box<dyn PointReader> {
    match format {
        Format::Delimited => Box::new(delimited::DelimitedReader),
        Format::Excel => Box::new(excel::ExcelReader),
        Format::Dxf => Box::new(dxf::DxfReader),
        Format::Kml => Box::new(kml::KmlReader { zipped: false }),
        Format::Kmz => Box::new(kml::KmlReader { zipped: true }),
        Format::Gsi => Box::new(gsi::GsiReader),
        Format::Sdr33 => Box::new(sdr33::Sdr33Reader),
    }
}

pub(crate) fn no_records(format: Format) -> PointError {
    PointError::NoValidRecords {
        format: format.name().to_string(),
        detail: None,
    }
}

pub(crate) fn no_records_because(format: Format, detail: impl Into<String>) -> PointError {
    PointError::NoValidRecords {
        format: format.name().to_string(),
        detail: Some(detail.into()),
    }
}
