//! Settings bags consumed by the read, write and transform entry points.
//!
//! Every struct deserializes with defaults for missing keys, so a settings
//! file only needs the values that differ.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::crs::operations::DatumOperation;
use crate::error::PointError;
use crate::format::Format;
use crate::grouping::GroupLogic;

pub const AUTO_DETECT_COLUMNS: &str = "Auto-detect Columns";
pub const DEFAULT_ZONE_NUMBER: u8 = 36;
pub const DEFAULT_ZONE_LETTER: char = 'N';
pub const DEFAULT_KML_ICON: &str = "http://maps.google.com/mapfiles/kml/pushpin/wht-pushpin.png";

/// Desired column order for the normalizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnOrder {
    #[default]
    Auto,
    Explicit(Vec<String>),
}

impl ColumnOrder {
    pub fn parse(s: &str) -> ColumnOrder {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case(AUTO_DETECT_COLUMNS) || s.eq_ignore_ascii_case("auto") {
            return ColumnOrder::Auto;
        }
        let names: Vec<String> = s
            .split(',')
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            ColumnOrder::Auto
        } else {
            ColumnOrder::Explicit(names)
        }
    }
}

impl FromStr for ColumnOrder {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ColumnOrder::parse(s))
    }
}

impl From<String> for ColumnOrder {
    fn from(s: String) -> Self {
        ColumnOrder::parse(&s)
    }
}

impl From<ColumnOrder> for String {
    fn from(order: ColumnOrder) -> Self {
        order.to_string()
    }
}

impl fmt::Display for ColumnOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnOrder::Auto => write!(f, "{AUTO_DETECT_COLUMNS}"),
            ColumnOrder::Explicit(names) => write!(f, "{}", names.join(",")),
        }
    }
}

/// UTM zone used to project geographic input (KML) or to hint CRS detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtmZone {
    pub number: u8,
    pub letter: char,
}

impl Default for UtmZone {
    fn default() -> Self {
        Self {
            number: DEFAULT_ZONE_NUMBER,
            letter: DEFAULT_ZONE_LETTER,
        }
    }
}

impl UtmZone {
    /// Latitude bands C..M are southern, N..X northern.
    pub fn is_south(&self) -> bool {
        self.letter.to_ascii_uppercase() < 'N'
    }

    /// EPSG code of the WGS84 UTM zone.
    pub fn epsg(&self) -> u32 {
        let base = if self.is_south() { 32700 } else { 32600 };
        base + u32::from(self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadSettings {
    pub column_order: ColumnOrder,
    pub zone: UtmZone,
    /// Worksheet to read; the first sheet when unset.
    pub excel_sheet: Option<String>,
    /// Lines starting with this prefix are comments in delimited text.
    pub comment_prefix: String,
    /// Reader to use regardless of the file extension.
    pub format: Option<Format>,
}

impl Default for ReadSettings {
    fn default() -> Self {
        Self {
            column_order: ColumnOrder::Auto,
            zone: UtmZone::default(),
            excel_sheet: None,
            comment_prefix: "#".into(),
            format: None,
        }
    }
}

/// Field order of SDR33 `08KI` coordinate records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoordinateOrder {
    #[default]
    Nez,
    Enz,
}

impl fmt::Display for CoordinateOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateOrder::Nez => write!(f, "N-E"),
            CoordinateOrder::Enz => write!(f, "E-N"),
        }
    }
}

/// Which field becomes a point label in KML and DXF exports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelContent {
    #[default]
    PointNumber,
    Code,
    Description,
    Elevation,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Point,
    /// Segment chain per group; separate LINE entities in DXF.
    Line,
    /// One open polyline per group. DXF only.
    Polyline,
    Polygon,
}

/// How rows are partitioned into lines and polygons for export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingSettings {
    pub logic: GroupLogic,
    pub custom_column: Option<String>,
    pub sort_column: String,
    pub sort: bool,
}

impl Default for GroupingSettings {
    fn default() -> Self {
        Self {
            logic: GroupLogic::Code,
            custom_column: None,
            sort_column: crate::model::COL_PT.into(),
            sort: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmlSettings {
    pub name: String,
    pub zone: UtmZone,
    pub geometry: Vec<GeometryKind>,
    pub grouping: GroupingSettings,
    pub icon_url: String,
    /// Any color accepted by `colors::kml_color`.
    pub icon_color: String,
    pub icon_scale: f64,
    pub label: LabelContent,
    pub label_color: String,
    pub label_scale: f64,
    pub line_color: String,
    pub line_width: u32,
    pub poly_fill: bool,
    pub fill_color: String,
    pub poly_outline_color: String,
    pub poly_outline_width: u32,
}

impl Default for KmlSettings {
    fn default() -> Self {
        Self {
            name: "Survey Export".into(),
            zone: UtmZone::default(),
            geometry: vec![GeometryKind::Point],
            grouping: GroupingSettings::default(),
            icon_url: DEFAULT_KML_ICON.into(),
            icon_color: "ffffffff".into(),
            icon_scale: 1.0,
            label: LabelContent::PointNumber,
            label_color: "ffffffff".into(),
            label_scale: 0.8,
            line_color: "ff00aaff".into(),
            line_width: 2,
            poly_fill: true,
            fill_color: "8000aaff".into(),
            poly_outline_color: "ff00aaff".into(),
            poly_outline_width: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DxfSettings {
    pub layer_name: String,
    /// Put each point on a layer named after its code.
    pub use_code_as_layer: bool,
    pub point_style: String,
    pub point_size: f64,
    /// Any color accepted by `colors::parse_aci_color`.
    pub point_color: String,
    pub geometry: Vec<GeometryKind>,
    pub grouping: GroupingSettings,
    pub line_color: String,
    pub poly_color: String,
    pub labels: Vec<LabelContent>,
    pub text_height: f64,
    pub text_offset: f64,
    pub text_layer_prefix: String,
}

impl Default for DxfSettings {
    fn default() -> Self {
        Self {
            layer_name: "Survey_Export".into(),
            use_code_as_layer: true,
            point_style: "circle_cross".into(),
            point_size: 0.1,
            point_color: "red".into(),
            geometry: vec![GeometryKind::Point],
            grouping: GroupingSettings::default(),
            line_color: "green".into(),
            poly_color: "blue".into(),
            labels: Vec::new(),
            text_height: 0.2,
            text_offset: 0.1,
            text_layer_prefix: "Text_".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteSettings {
    /// Field delimiter for delimited text output.
    pub delimiter: char,
    pub include_header: bool,
    pub sdr_order: CoordinateOrder,
    pub kml: KmlSettings,
    pub dxf: DxfSettings,
}

impl Default for WriteSettings {
    fn default() -> Self {
        Self {
            delimiter: ',',
            include_header: true,
            sdr_order: CoordinateOrder::Nez,
            kml: KmlSettings::default(),
            dxf: DxfSettings::default(),
        }
    }
}

/// Options for one coordinate transformation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    /// Swap Easting and Northing before transforming.
    pub flip_en: bool,
    /// Write results to new columns instead of overwriting Easting/Northing.
    pub new_columns: bool,
    pub new_easting_column: Option<String>,
    pub new_northing_column: Option<String>,
    /// Allow the hand-tuned UTM 36N to Red Belt pipeline.
    pub use_custom: bool,
    /// Median deviation (target units) above which the custom pipeline is rejected.
    pub deviation_threshold: f64,
    /// Datum operations registered in addition to the built-in catalog.
    pub extra_operations: Vec<DatumOperation>,
    /// Directories searched for grid files referenced by datum operations.
    pub grid_dirs: Vec<PathBuf>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            flip_en: false,
            new_columns: false,
            new_easting_column: None,
            new_northing_column: None,
            use_custom: true,
            deviation_threshold: crate::crs::CUSTOM_PIPELINE_MAX_DEVIATION,
            extra_operations: Vec::new(),
            grid_dirs: Vec::new(),
        }
    }
}

/// Top-level settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub read: ReadSettings,
    pub write: WriteSettings,
    pub transform: TransformOptions,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Settings, PointError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PointError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                PointError::Io(e)
            }
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_order_parsing() {
        assert_eq!(ColumnOrder::parse(""), ColumnOrder::Auto);
        assert_eq!(ColumnOrder::parse("Auto-detect Columns"), ColumnOrder::Auto);
        assert_eq!(
            ColumnOrder::parse("PT, E ,N,,Z"),
            ColumnOrder::Explicit(vec!["PT".into(), "E".into(), "N".into(), "Z".into()])
        );
    }

    #[test]
    fn zone_hemisphere() {
        let north = UtmZone { number: 36, letter: 'R' };
        let south = UtmZone { number: 36, letter: 'm' };
        assert!(!north.is_south());
        assert!(south.is_south());
        assert_eq!(north.epsg(), 32636);
        assert_eq!(south.epsg(), 32736);
        let band_s = UtmZone { number: 36, letter: 'S' };
        assert!(!band_s.is_south());
        assert_eq!(band_s.epsg(), 32636);
    }

    #[test]
    fn settings_file_uses_defaults_for_missing_keys() {
        let json = r#"{
            "read": { "column_order": "PT,N,E", "zone": { "number": 35 } },
            "transform": { "flip_en": true }
        }"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(
            s.read.column_order,
            ColumnOrder::Explicit(vec!["PT".into(), "N".into(), "E".into()])
        );
        assert_eq!(s.read.zone.number, 35);
        assert_eq!(s.read.zone.letter, 'N');
        assert_eq!(s.read.comment_prefix, "#");
        assert!(s.transform.flip_en);
        assert!(s.transform.use_custom);
        assert_eq!(s.write.delimiter, ',');
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Settings::load(Path::new("/nonexistent/stakeout.json")).unwrap_err();
        assert!(matches!(err, PointError::FileNotFound { .. }));
    }
}
