//! ASCII DXF output: points on per-code layers, optional text labels and
//! line, polyline and polygon geometry built from point groups.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::colors::parse_aci_color;
use crate::error::PointError;
use crate::format::Format;
use crate::model::{PointTable, COL_CODE, COL_E, COL_N, COL_Z};
use crate::settings::{DxfSettings, GeometryKind, LabelContent, WriteSettings};
use crate::writers::kml::label;
use crate::writers::{groups, PointWriter};

static LAYER_UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w_.)( -]").expect("layer name pattern is valid"));

/// `$PDMODE` values by point style name.
pub const POINT_STYLES: [(&str, i32); 7] = [
    ("dot", 0),
    ("circle_cross", 34),
    ("circle_plus", 33),
    ("square_cross", 66),
    ("square_plus", 65),
    ("square_circle_cross", 98),
    ("square_circle_plus", 97),
];
pub const DEFAULT_PDMODE: i32 = 34;

pub const LINE_LAYER_PREFIX: &str = "LINE_";
pub const POLYLINE_LAYER_PREFIX: &str = "POLYLINE_";
pub const POLYGON_LAYER_PREFIX: &str = "POLY_";

pub fn pdmode(style: &str) -> i32 {
    let style = style.trim().to_lowercase();
    POINT_STYLES
        .iter()
        .find(|(name, _)| *name == style)
        .map_or(DEFAULT_PDMODE, |(_, mode)| *mode)
}

/// Replace characters that are not allowed in layer names with `_`.
pub fn sanitize_layer(name: &str) -> String {
    LAYER_UNSAFE.replace_all(name, "_").into_owned()
}

/// Layer suffix and default color of a label kind.
fn label_layer(content: LabelContent) -> Option<(&'static str, u16)> {
    match content {
        LabelContent::PointNumber => Some(("Point_Number", 4)),
        LabelContent::Description => Some(("Description", 5)),
        LabelContent::Elevation => Some(("Elevation", 9)),
        LabelContent::Code => Some(("Code", 254)),
        LabelContent::None => None,
    }
}

pub struct DxfWriter;

impl PointWriter for DxfWriter {
    fn format(&self) -> Format {
        Format::Dxf
    }

    fn write(&self, table: &PointTable, settings: &WriteSettings) -> Result<Vec<u8>, PointError> {
        let drawing = Drawing::build(table, &settings.dxf);
        info!(
            layers = drawing.layers.len(),
            entities = drawing.entity_count,
            "rendered DXF drawing"
        );
        Ok(drawing.render(&settings.dxf).into_bytes())
    }
}

#[derive(Default)]
struct Drawing {
    /// Layer names with their ACI color, in first-use order.
    layers: Vec<(String, u16)>,
    entities: String,
    entity_count: usize,
}

impl Drawing {
    fn layer(&mut self, name: &str, color: u16) -> String {
        if !self.layers.iter().any(|(n, _)| n == name) {
            self.layers.push((name.to_string(), color));
        }
        name.to_string()
    }

    fn pair(&mut self, code: i32, value: impl std::fmt::Display) {
        let _ = write!(self.entities, "{code}\n{value}\n");
    }

    fn start(&mut self, kind: &str, layer: &str) {
        self.pair(0, kind);
        self.pair(8, layer);
        self.entity_count += 1;
    }

    fn vertex(&mut self, base: i32, [x, y, z]: [f64; 3]) {
        self.pair(base, x);
        self.pair(base + 10, y);
        self.pair(base + 20, z);
    }

    fn build(table: &PointTable, settings: &DxfSettings) -> Drawing {
        let mut d = Drawing::default();
        let base_layer = match settings.layer_name.trim() {
            "" => "Survey_Export".to_string(),
            name => sanitize_layer(name),
        };
        let point_color = parse_aci_color(&settings.point_color);
        d.layer(&base_layer, point_color);

        let located: Vec<(usize, [f64; 3])> = (0..table.len())
            .filter_map(|row| Some((row, location(table, row)?)))
            .collect();

        if settings.geometry.contains(&GeometryKind::Point) {
            for &(row, at) in &located {
                let code = table.text(row, COL_CODE);
                let layer = if settings.use_code_as_layer && !code.trim().is_empty() {
                    d.layer(&sanitize_layer(code.trim()), point_color)
                } else {
                    base_layer.clone()
                };
                d.start("POINT", &layer);
                d.vertex(10, at);
            }

            for content in &settings.labels {
                let Some((suffix, color)) = label_layer(*content) else {
                    continue;
                };
                let layer = d.layer(
                    &sanitize_layer(&format!("{}{suffix}", settings.text_layer_prefix.trim())),
                    color,
                );
                for &(row, [x, y, z]) in &located {
                    let text = label(table, row, *content);
                    if text.is_empty() {
                        continue;
                    }
                    d.start("TEXT", &layer);
                    d.vertex(10, [x, y + settings.text_offset, z]);
                    d.pair(40, settings.text_height);
                    d.pair(1, text);
                }
            }
        }

        let kinds = [GeometryKind::Line, GeometryKind::Polyline, GeometryKind::Polygon];
        if kinds.iter().any(|k| settings.geometry.contains(k)) {
            let line_color = parse_aci_color(&settings.line_color);
            let poly_color = parse_aci_color(&settings.poly_color);
            for group in groups(table, &settings.grouping) {
                let path: Vec<[f64; 3]> = (0..group.table.len())
                    .filter_map(|r| location(&group.table, r))
                    .collect();

                if settings.geometry.contains(&GeometryKind::Line) && path.len() >= 2 {
                    let layer = d.layer(&sanitize_layer(&format!("{LINE_LAYER_PREFIX}{}", group.key)), line_color);
                    for pair in path.windows(2) {
                        d.start("LINE", &layer);
                        d.vertex(10, pair[0]);
                        d.vertex(11, pair[1]);
                    }
                }

                if settings.geometry.contains(&GeometryKind::Polyline) && path.len() >= 2 {
                    let layer = d.layer(
                        &sanitize_layer(&format!("{POLYLINE_LAYER_PREFIX}{}", group.key)),
                        line_color,
                    );
                    d.start("LWPOLYLINE", &layer);
                    d.pair(90, path.len());
                    d.pair(70, 0);
                    for [x, y, _] in &path {
                        d.pair(10, x);
                        d.pair(20, y);
                    }
                }

                if settings.geometry.contains(&GeometryKind::Polygon) && path.len() >= 3 {
                    let layer = d.layer(
                        &sanitize_layer(&format!("{POLYGON_LAYER_PREFIX}{}", group.key)),
                        poly_color,
                    );
                    // closed 3D polyline
                    d.start("POLYLINE", &layer);
                    d.pair(66, 1);
                    d.vertex(10, [0.0, 0.0, 0.0]);
                    d.pair(70, 9);
                    for at in &path {
                        d.pair(0, "VERTEX");
                        d.pair(8, &layer);
                        d.vertex(10, *at);
                        d.pair(70, 32);
                    }
                    d.pair(0, "SEQEND");
                    d.pair(8, &layer);
                }
            }
        }
        debug!(points = located.len(), "collected DXF geometry");
        d
    }

    fn render(&self, settings: &DxfSettings) -> String {
        let mut out = String::new();
        let mut pair = |code: i32, value: &dyn std::fmt::Display| {
            let _ = write!(out, "{code}\n{value}\n");
        };

        pair(0, &"SECTION");
        pair(2, &"HEADER");
        pair(9, &"$ACADVER");
        pair(1, &"AC1009");
        pair(9, &"$PDMODE");
        pair(70, &pdmode(&settings.point_style));
        pair(9, &"$PDSIZE");
        pair(40, &settings.point_size);
        pair(0, &"ENDSEC");

        pair(0, &"SECTION");
        pair(2, &"TABLES");
        pair(0, &"TABLE");
        pair(2, &"LAYER");
        pair(70, &self.layers.len());
        for (name, color) in &self.layers {
            pair(0, &"LAYER");
            pair(2, name);
            pair(70, &0);
            pair(62, color);
            pair(6, &"CONTINUOUS");
        }
        pair(0, &"ENDTAB");
        pair(0, &"ENDSEC");

        pair(0, &"SECTION");
        pair(2, &"ENTITIES");
        out.push_str(&self.entities);
        out.push_str("0\nENDSEC\n0\nEOF\n");
        out
    }
}

/// Position of a row; rows without numeric Easting and Northing are left out.
fn location(table: &PointTable, row: usize) -> Option<[f64; 3]> {
    Some([
        table.number(row, COL_E)?,
        table.number(row, COL_N)?,
        table.number(row, COL_Z).unwrap_or(0.0),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::GroupLogic;
    use crate::model::{Cell, CANONICAL_COLUMNS};
    use crate::readers::dxf::parse_dxf;
    use crate::settings::GroupingSettings;

    fn table() -> PointTable {
        let rows = [
            ("P1", 100.0, 200.0, 5.0, "WALL/A"),
            ("P2", 110.0, 200.0, 6.0, "WALL/A"),
            ("P3", 110.0, 210.0, 7.0, "WALL/A"),
            ("P4", 300.0, 300.0, 8.0, ""),
        ];
        PointTable {
            columns: CANONICAL_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|(pt, e, n, z, code)| {
                    vec![
                        Cell::text(*pt),
                        Cell::Number(*e),
                        Cell::Number(*n),
                        Cell::Number(*z),
                        Cell::text(*code),
                        Cell::text(""),
                    ]
                })
                .collect(),
        }
    }

    fn render(settings: DxfSettings) -> String {
        let write = WriteSettings {
            dxf: settings,
            ..Default::default()
        };
        String::from_utf8(DxfWriter.write(&table(), &write).unwrap()).unwrap()
    }

    #[test]
    fn layer_names_are_sanitized() {
        assert_eq!(sanitize_layer("WALL/A"), "WALL_A");
        assert_eq!(sanitize_layer("Kerb (old) 1.5-x"), "Kerb (old) 1.5-x");
        assert_eq!(sanitize_layer("a*b?c"), "a_b_c");
    }

    #[test]
    fn point_style_lookup() {
        assert_eq!(pdmode("Square_Plus"), 65);
        assert_eq!(pdmode("unknown"), DEFAULT_PDMODE);
    }

    #[test]
    fn points_and_labels_read_back() {
        let text = render(DxfSettings {
            labels: vec![LabelContent::PointNumber],
            ..Default::default()
        });
        assert!(text.contains("$PDMODE\n70\n34\n"));
        assert!(text.contains("2\nText_Point_Number\n70\n0\n62\n4\n"));

        let parsed = parse_dxf(&text).unwrap();
        let rows = parsed.table.rows;
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0][0], Cell::text("P1"));
        assert_eq!(rows[0][1], Cell::Number(100.0));
        assert_eq!(rows[0][3], Cell::Number(5.0));
        assert_eq!(rows[0][4], Cell::text("WALL_A"));
        assert_eq!(rows[3][4], Cell::text("Survey_Export"));
    }

    #[test]
    fn group_geometry() {
        let text = render(DxfSettings {
            geometry: vec![GeometryKind::Line, GeometryKind::Polyline, GeometryKind::Polygon],
            grouping: GroupingSettings {
                logic: GroupLogic::Code,
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(text.matches("0\nLINE\n").count(), 2);
        assert_eq!(text.matches("0\nLWPOLYLINE\n").count(), 1);
        assert_eq!(text.matches("0\nPOLYLINE\n").count(), 1);
        assert_eq!(text.matches("0\nVERTEX\n").count(), 3);
        assert!(text.contains("8\nLINE_WALL_A\n"));
        assert!(text.contains("8\nPOLY_WALL_A\n"));
        assert!(!text.contains("0\nPOINT\n"));
        assert!(text.ends_with("0\nEOF\n"));
    }
}
