pub mod delimited;
pub mod dxf;
pub mod gsi;
pub mod kml;
pub mod sdr33;

use crate::error::PointError;
use crate::format::Format;
use crate::grouping::{group_rows, PointGroup};
use crate::model::PointTable;
use crate::settings::{GroupingSettings, WriteSettings};

/// One output format. Writers expect a normalized table and render it to bytes.
pub trait PointWriter: Send + Sync {
    fn format(&self) -> Format;

    fn write(&self, table: &PointTable, settings: &WriteSettings) -> Result<Vec<u8>, PointError>;
}

/// Writer implementation for a format.
pub fn writer_for(format: Format) -> Result<Box<dyn PointWriter>, PointError> {
    match format {
        Format::Delimited => Ok(Box::new(delimited::DelimitedWriter)),
        Format::Gsi => Ok(Box::new(gsi::GsiWriter)),
        Format::Sdr33 => Ok(Box::new(sdr33::Sdr33Writer)),
        Format::Kml => Ok(Box::new(kml::KmlWriter { zipped: false })),
        Format::Kmz => Ok(Box::new(kml::KmlWriter { zipped: true })),
        Format::Dxf => Ok(Box::new(dxf::DxfWriter)),
        Format::Excel => Err(PointError::UnsupportedFormat(
            "spreadsheet export is not supported; write CSV instead".into(),
        )),
    }
}

pub(crate) fn groups(table: &PointTable, grouping: &GroupingSettings) -> Vec<PointGroup> {
    group_rows(
        table,
        grouping.logic,
        grouping.custom_column.as_deref(),
        &grouping.sort_column,
        grouping.sort,
    )
}
