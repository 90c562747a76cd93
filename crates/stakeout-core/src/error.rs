use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum PointError {
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("could not determine the text encoding of the input")]
    EncodingUndetectable,

    #[error("invalid {format} structure: {reason}")]
    StructuralCorruption { format: String, reason: String },

    #[error("no valid records found in {format} input{}", detail_suffix(.detail))]
    NoValidRecords {
        format: String,
        /// What the input held instead, when the reader can tell.
        detail: Option<String>,
    },

    #[error("value {value} does not fit a {format} field")]
    ValueOutOfRange { format: String, value: f64 },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid CRS: {0}")]
    InvalidCrs(String),

    #[error("unable to auto-detect CRS: {0}. Please specify the source CRS explicitly.")]
    CrsDetectionFailed(String),

    #[error("could not process file '{}': {source}", path.display())]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<PointError>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(" ({d})")).unwrap_or_default()
}

impl PointError {
    pub(crate) fn corrupt(format: &str, reason: impl Into<String>) -> Self {
        PointError::StructuralCorruption {
            format: format.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach the originating file to an error, unless it already names one.
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        match self {
            PointError::InFile { .. } | PointError::Cancelled => self,
            other => PointError::InFile {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any file wrapping removed.
    pub fn root(&self) -> &PointError {
        match self {
            PointError::InFile { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Non-fatal condition recorded while reading or transforming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Delimiter could not be sniffed and a default was used.
    DelimiterAmbiguous,
    /// A single record was malformed and skipped or repaired.
    RecordParse,
    /// A field value could not be parsed and was replaced by a default.
    FieldCoerced,
    /// A datum operation references a grid file that is not installed.
    MissingGrid,
    /// The input extension was not recognized.
    UnknownExtension,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WarningKind::DelimiterAmbiguous => "delimiter",
            WarningKind::RecordParse => "record",
            WarningKind::FieldCoerced => "field",
            WarningKind::MissingGrid => "grid",
            WarningKind::UnknownExtension => "extension",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub kind: WarningKind,
    /// 1-based source line, when the warning refers to one.
    pub line: Option<usize>,
    pub message: String,
}

impl ParseWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            line: None,
            message: message.into(),
        }
    }

    pub fn at_line(kind: WarningKind, line: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            line: Some(line),
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "[{}] line {}: {}", self.kind, line, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_file_wraps_once() {
        let err = PointError::NoValidRecords {
            format: "GSI".into(),
            detail: None,
        }
        .in_file("a.gsi")
        .in_file("b.gsi");
        match &err {
            PointError::InFile { path, .. } => assert_eq!(path, &PathBuf::from("a.gsi")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(err.root(), PointError::NoValidRecords { .. }));
        assert!(err.to_string().contains("a.gsi"));
    }

    #[test]
    fn cancelled_is_not_wrapped() {
        let err = PointError::Cancelled.in_file("a.csv");
        assert!(matches!(err, PointError::Cancelled));
    }

    #[test]
    fn warning_display_includes_line() {
        let w = ParseWarning::at_line(WarningKind::RecordParse, 4, "short record");
        assert_eq!(w.to_string(), "[record] line 4: short record");
    }
}
