pub mod batch;
pub mod colors;
pub mod crs;
pub mod error;
pub mod format;
pub mod grouping;
pub mod model;
pub mod parsing;
pub mod readers;
pub mod settings;
pub mod sniff;
pub mod writers;

use std::path::Path;

use tracing::{info, warn};

pub use crs::{detect_crs, TransformOutcome, TransformPath};
pub use error::{ParseWarning, PointError, WarningKind};
pub use format::Format;
pub use grouping::{GroupLogic, PointGroup};
pub use model::{Cell, PointRecord, PointTable, RawTable};
pub use settings::{GroupingSettings, ReadSettings, Settings, TransformOptions, WriteSettings};

/// A normalized table and everything that was repaired or skipped on the way.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub format: Format,
    pub table: PointTable,
    pub warnings: Vec<ParseWarning>,
    /// Malformed fields replaced by a default, by the reader or the normalizer.
    pub coerced_fields: usize,
}

/// Main API entry point: read a point file into the canonical table.
///
/// The reader is chosen by `settings.format`, else by extension. Unknown
/// extensions are read as delimited text with an `UnknownExtension` warning.
pub fn read(path: &Path, settings: &ReadSettings) -> Result<ReadOutcome, PointError> {
    let mut warnings = Vec::new();
    let format = match settings.format {
        Some(f) => f,
        None => match Format::from_path(path)? {
            Some(f) => f,
            None => {
                warn!(path = %path.display(), "unrecognized extension, reading as delimited text");
                warnings.push(ParseWarning::new(
                    WarningKind::UnknownExtension,
                    format!("'{}' has an unrecognized extension, read as delimited text", path.display()),
                ));
                Format::Delimited
            }
        },
    };

    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PointError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => PointError::Io(e),
    })?;

    let mut outcome = read_bytes(&bytes, format, settings)?;
    warnings.append(&mut outcome.warnings);
    outcome.warnings = warnings;
    info!(
        path = %path.display(),
        format = %format,
        rows = outcome.table.len(),
        warnings = outcome.warnings.len(),
        coerced = outcome.coerced_fields,
        "read point file"
    );
    Ok(outcome)
}

/// Read in-memory file content with a known format.
pub fn read_bytes(bytes: &[u8], format: Format, settings: &ReadSettings) -> Result<ReadOutcome, PointError> {
    if bytes.is_empty() {
        return Err(readers::no_records(format));
    }
    let parsed = readers::reader_for(format).read(bytes, settings)?;
    let normalized = parsing::normalize(parsed.table, &settings.column_order);

    let mut warnings = parsed.warnings;
    warnings.extend(normalized.warnings);
    Ok(ReadOutcome {
        format,
        table: normalized.table,
        warnings,
        coerced_fields: parsed.coerced_fields + normalized.coerced_fields,
    })
}

/// Render a table in `format` and write it to `path`.
pub fn write(
    table: &PointTable,
    path: &Path,
    format: Format,
    settings: &WriteSettings,
) -> Result<(), PointError> {
    let bytes = write_bytes(table, format, settings)?;
    std::fs::write(path, &bytes)?;
    info!(path = %path.display(), format = %format, rows = table.len(), bytes = bytes.len(), "wrote point file");
    Ok(())
}

pub fn write_bytes(table: &PointTable, format: Format, settings: &WriteSettings) -> Result<Vec<u8>, PointError> {
    writers::writer_for(format)?.write(table, settings)
}

/// Transform Easting/Northing from `source` to `target` (EPSG codes or names).
pub fn transform(
    table: &PointTable,
    source: &str,
    target: &str,
    opts: &TransformOptions,
) -> Result<TransformOutcome, PointError> {
    crs::transform(table, source, target, opts)
}

/// Partition a table into line/polygon groups.
pub fn group(table: &PointTable, settings: &GroupingSettings) -> Vec<PointGroup> {
    writers::groups(table, settings)
}
