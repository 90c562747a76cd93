use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PointError;

/// File formats known to the readers and writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Delimited,
    Excel,
    Dxf,
    Kml,
    Kmz,
    Gsi,
    Sdr33,
}

impl Format {
    pub fn name(&self) -> &'static str {
        match self {
            Format::Delimited => "delimited text",
            Format::Excel => "Excel",
            Format::Dxf => "DXF",
            Format::Kml => "KML",
            Format::Kmz => "KMZ",
            Format::Gsi => "GSI",
            Format::Sdr33 => "SDR33",
        }
    }

    /// Format for a lowercase extension without the dot.
    ///
    /// DWG is recognized only to be rejected with a useful message.
    pub fn from_extension(ext: &str) -> Result<Option<Format>, PointError> {
        let format = match ext.to_ascii_lowercase().as_str() {
            "csv" | "txt" | "dat" => Format::Delimited,
            "xlsx" | "xls" | "xlsm" | "ods" => Format::Excel,
            "dxf" => Format::Dxf,
            "kml" => Format::Kml,
            "kmz" => Format::Kmz,
            "gsi" => Format::Gsi,
            "sdr" | "sdr33" => Format::Sdr33,
            "dwg" => {
                return Err(PointError::UnsupportedFormat(
                    "direct import of DWG files is not supported; save the drawing as DXF and try again"
                        .into(),
                ))
            }
            _ => return Ok(None),
        };
        Ok(Some(format))
    }

    /// Format implied by a path's extension, `None` when unrecognized.
    pub fn from_path(path: &Path) -> Result<Option<Format>, PointError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => Format::from_extension(ext),
            None => Ok(None),
        }
    }

    /// Parse a user-supplied format name such as "csv", "gsi" or "sdr33".
    pub fn parse(s: &str) -> Result<Format, PointError> {
        let s = s.trim().trim_start_matches('.').to_ascii_lowercase();
        match s.as_str() {
            "delimited" | "text" => Ok(Format::Delimited),
            "excel" => Ok(Format::Excel),
            other => Format::from_extension(other)?
                .ok_or_else(|| PointError::UnsupportedFormat(format!("unknown format '{other}'"))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_dispatch() {
        assert_eq!(Format::from_path(Path::new("a/B.CSV")).unwrap(), Some(Format::Delimited));
        assert_eq!(Format::from_path(Path::new("x.sdr")).unwrap(), Some(Format::Sdr33));
        assert_eq!(Format::from_path(Path::new("x.kmz")).unwrap(), Some(Format::Kmz));
        assert_eq!(Format::from_path(Path::new("x.xyz")).unwrap(), None);
        assert_eq!(Format::from_path(Path::new("noext")).unwrap(), None);
    }

    #[test]
    fn dwg_is_rejected() {
        let err = Format::from_path(Path::new("plan.dwg")).unwrap_err();
        assert!(matches!(err, PointError::UnsupportedFormat(_)));
    }

    #[test]
    fn parse_names() {
        assert_eq!(Format::parse(".GSI").unwrap(), Format::Gsi);
        assert_eq!(Format::parse("txt").unwrap(), Format::Delimited);
        assert!(Format::parse("shp").is_err());
    }
}
