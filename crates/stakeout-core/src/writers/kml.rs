//! KML and KMZ output. Planar coordinates are unprojected from the UTM zone
//! in the KML settings.

use std::io::{Cursor, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::{debug, info, warn};

use crate::colors::{kml_color, DEFAULT_KML_COLOR};
use crate::crs::geodesy::Projector;
use crate::crs::registry;
use crate::error::PointError;
use crate::format::Format;
use crate::model::{Cell, PointTable, COL_CODE, COL_DESC, COL_E, COL_N, COL_PT, COL_Z};
use crate::settings::{GeometryKind, KmlSettings, LabelContent, WriteSettings, DEFAULT_KML_ICON};
use crate::writers::{groups, PointWriter};

pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";
/// Name of the document inside a KMZ archive.
pub const KMZ_ENTRY: &str = "doc.kml";

const POINT_STYLE: &str = "point_style";
const LINE_STYLE: &str = "line_style";
const POLY_STYLE: &str = "poly_style";

pub struct KmlWriter {
    /// Wrap the document in a KMZ archive.
    pub zipped: bool,
}

impl PointWriter for KmlWriter {
    fn format(&self) -> Format {
        if self.zipped {
            Format::Kmz
        } else {
            Format::Kml
        }
    }

    fn write(&self, table: &PointTable, settings: &WriteSettings) -> Result<Vec<u8>, PointError> {
        let document = render(table, &settings.kml)?;
        if !self.zipped {
            return Ok(document);
        }
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            zip.start_file(KMZ_ENTRY, zip::write::SimpleFileOptions::default())?;
            zip.write_all(&document)?;
            zip.finish()?;
        }
        Ok(buf)
    }
}

type XmlWriter = Writer<Vec<u8>>;

fn start(w: &mut XmlWriter, name: &str) -> Result<(), PointError> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    Ok(())
}

fn end(w: &mut XmlWriter, name: &str) -> Result<(), PointError> {
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn text_element(w: &mut XmlWriter, name: &str, text: &str) -> Result<(), PointError> {
    start(w, name)?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    end(w, name)
}

/// Icons that are not white cannot be tinted, so a custom icon color
/// switches to the stock white pushpin.
fn icon_href(settings: &KmlSettings, icon_color: &str) -> String {
    let url = settings.icon_url.to_lowercase();
    if icon_color != DEFAULT_KML_COLOR && !(url.contains("wht") || url.contains("white")) {
        DEFAULT_KML_ICON.to_string()
    } else {
        settings.icon_url.clone()
    }
}

fn write_styles(w: &mut XmlWriter, settings: &KmlSettings) -> Result<(), PointError> {
    let icon_color = kml_color(&settings.icon_color);

    w.write_event(Event::Start(BytesStart::new("Style").with_attributes([("id", POINT_STYLE)])))?;
    start(w, "IconStyle")?;
    text_element(w, "color", &icon_color)?;
    text_element(w, "colorMode", "normal")?;
    text_element(w, "scale", &settings.icon_scale.to_string())?;
    start(w, "Icon")?;
    text_element(w, "href", &icon_href(settings, &icon_color))?;
    end(w, "Icon")?;
    end(w, "IconStyle")?;
    start(w, "LabelStyle")?;
    text_element(w, "color", &kml_color(&settings.label_color))?;
    text_element(w, "scale", &settings.label_scale.to_string())?;
    end(w, "LabelStyle")?;
    end(w, "Style")?;

    w.write_event(Event::Start(BytesStart::new("Style").with_attributes([("id", LINE_STYLE)])))?;
    start(w, "LineStyle")?;
    text_element(w, "color", &kml_color(&settings.line_color))?;
    text_element(w, "width", &settings.line_width.to_string())?;
    end(w, "LineStyle")?;
    end(w, "Style")?;

    w.write_event(Event::Start(BytesStart::new("Style").with_attributes([("id", POLY_STYLE)])))?;
    start(w, "LineStyle")?;
    text_element(w, "color", &kml_color(&settings.poly_outline_color))?;
    text_element(w, "width", &settings.poly_outline_width.to_string())?;
    end(w, "LineStyle")?;
    start(w, "PolyStyle")?;
    text_element(w, "color", &kml_color(&settings.fill_color))?;
    text_element(w, "fill", if settings.poly_fill { "1" } else { "0" })?;
    text_element(w, "outline", "1")?;
    end(w, "PolyStyle")?;
    end(w, "Style")
}

/// Label text of a row for the chosen label content.
pub fn label(table: &PointTable, row: usize, content: LabelContent) -> String {
    match content {
        LabelContent::PointNumber => table.text(row, COL_PT),
        LabelContent::Code => table.text(row, COL_CODE),
        LabelContent::Description => table.text(row, COL_DESC),
        LabelContent::Elevation => table
            .number(row, COL_Z)
            .map(|z| format!("{z:.3}"))
            .unwrap_or_default(),
        LabelContent::None => String::new(),
    }
}

/// HTML summary of every non-blank field of a row.
pub fn description_html(table: &PointTable, row: usize) -> String {
    table
        .columns
        .iter()
        .zip(&table.rows[row])
        .filter_map(|(column, cell)| {
            let value = match cell {
                Cell::Number(v) if v.is_finite() => format!("{v:.3}"),
                Cell::Text(s) if !s.trim().is_empty() => s.clone(),
                _ => return None,
            };
            Some(format!("<b>{column}:</b> {value}"))
        })
        .collect::<Vec<_>>()
        .join("<br>")
}

/// Geographic `lon,lat,z` of a row, or `None` when it has no usable position.
fn position(table: &PointTable, row: usize, projector: &Projector) -> Option<(f64, f64, f64)> {
    let (Some(e), Some(n)) = (table.number(row, COL_E), table.number(row, COL_N)) else {
        warn!(pt = %table.text(row, COL_PT), "row without numeric Easting/Northing skipped");
        return None;
    };
    match projector.to_geodetic(e, n) {
        Ok((lon, lat)) => Some((lon, lat, table.number(row, COL_Z).unwrap_or(0.0))),
        Err(err) => {
            warn!(pt = %table.text(row, COL_PT), error = %err, "row could not be unprojected");
            None
        }
    }
}

fn coordinates(points: &[(f64, f64, f64)]) -> String {
    points
        .iter()
        .map(|(lon, lat, z)| format!("{lon},{lat},{z}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn placemark_open(w: &mut XmlWriter, name: &str, style: &str) -> Result<(), PointError> {
    start(w, "Placemark")?;
    text_element(w, "name", name)?;
    text_element(w, "styleUrl", &format!("#{style}"))
}

/// Render a table as a KML document.
pub fn render(table: &PointTable, settings: &KmlSettings) -> Result<Vec<u8>, PointError> {
    let zone = settings.zone;
    let crs = registry::utm(zone.number, zone.is_south())
        .ok_or_else(|| PointError::InvalidCrs(format!("UTM zone {} is out of range", zone.number)))?;
    let projector = crs.projector()?;

    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    w.write_event(Event::Start(BytesStart::new("kml").with_attributes([("xmlns", KML_NAMESPACE)])))?;
    start(&mut w, "Document")?;
    text_element(&mut w, "name", &settings.name)?;
    write_styles(&mut w, settings)?;

    let mut placemarks = 0;
    if settings.geometry.contains(&GeometryKind::Point) {
        start(&mut w, "Folder")?;
        text_element(&mut w, "name", "Points")?;
        for row in 0..table.len() {
            let Some(point) = position(table, row, &projector) else {
                continue;
            };
            placemark_open(&mut w, &label(table, row, settings.label), POINT_STYLE)?;
            text_element(&mut w, "description", &description_html(table, row))?;
            start(&mut w, "Point")?;
            text_element(&mut w, "altitudeMode", "clampToGround")?;
            text_element(&mut w, "coordinates", &coordinates(&[point]))?;
            end(&mut w, "Point")?;
            end(&mut w, "Placemark")?;
            placemarks += 1;
        }
        end(&mut w, "Folder")?;
    }

    let wants_lines = settings.geometry.contains(&GeometryKind::Line);
    let wants_polygons = settings.geometry.contains(&GeometryKind::Polygon);
    if wants_lines || wants_polygons {
        let grouped = groups(table, &settings.grouping);
        let paths: Vec<(String, Vec<(f64, f64, f64)>)> = grouped
            .iter()
            .map(|g| {
                let points = (0..g.table.len())
                    .filter_map(|r| position(&g.table, r, &projector))
                    .collect();
                (g.key.clone(), points)
            })
            .collect();

        if wants_lines {
            start(&mut w, "Folder")?;
            text_element(&mut w, "name", "Lines")?;
            for (key, points) in paths.iter().filter(|(_, p)| p.len() >= 2) {
                placemark_open(&mut w, key, LINE_STYLE)?;
                start(&mut w, "LineString")?;
                text_element(&mut w, "altitudeMode", "clampToGround")?;
                text_element(&mut w, "coordinates", &coordinates(points))?;
                end(&mut w, "LineString")?;
                end(&mut w, "Placemark")?;
                placemarks += 1;
            }
            end(&mut w, "Folder")?;
        }

        if wants_polygons {
            start(&mut w, "Folder")?;
            text_element(&mut w, "name", "Polygons")?;
            for (key, points) in paths.iter().filter(|(_, p)| p.len() >= 3) {
                let mut ring = points.clone();
                if ring.first() != ring.last() {
                    ring.push(ring[0]);
                }
                placemark_open(&mut w, key, POLY_STYLE)?;
                start(&mut w, "Polygon")?;
                text_element(&mut w, "altitudeMode", "clampToGround")?;
                start(&mut w, "outerBoundaryIs")?;
                start(&mut w, "LinearRing")?;
                text_element(&mut w, "coordinates", &coordinates(&ring))?;
                end(&mut w, "LinearRing")?;
                end(&mut w, "outerBoundaryIs")?;
                end(&mut w, "Polygon")?;
                end(&mut w, "Placemark")?;
                placemarks += 1;
            }
            end(&mut w, "Folder")?;
        }
    }

    end(&mut w, "Document")?;
    end(&mut w, "kml")?;
    info!(placemarks, zone = zone.number, "rendered KML document");
    debug!(crs = %crs, "KML coordinates unprojected");
    Ok(w.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::GroupLogic;
    use crate::model::CANONICAL_COLUMNS;
    use crate::readers::kml::KmlReader;
    use crate::readers::PointReader;
    use crate::settings::{GroupingSettings, ReadSettings};

    fn table() -> PointTable {
        let rows = [
            ("1", 500000.0, 3320000.0, 10.0, "FENCE"),
            ("2", 500100.0, 3320000.0, 11.0, "FENCE"),
            ("3", 500100.0, 3320100.0, 12.0, "FENCE"),
            ("4", 500200.0, 3320200.0, 13.0, "TREE"),
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

    fn settings(geometry: Vec<GeometryKind>) -> WriteSettings {
        WriteSettings {
            kml: KmlSettings {
                geometry,
                grouping: GroupingSettings {
                    logic: GroupLogic::Code,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn points_read_back_in_the_same_zone() {
        let bytes = KmlWriter { zipped: false }
            .write(&table(), &settings(vec![GeometryKind::Point]))
            .unwrap();
        let parsed = KmlReader { zipped: false }
            .read(&bytes, &ReadSettings::default())
            .unwrap();
        assert_eq!(parsed.table.rows.len(), 4);
        let e = parsed.table.rows[1][1].as_f64().unwrap();
        let n = parsed.table.rows[1][2].as_f64().unwrap();
        assert!((e - 500100.0).abs() < 0.01, "{e}");
        assert!((n - 3320000.0).abs() < 0.01, "{n}");
        assert_eq!(parsed.table.rows[1][0], Cell::text("2"));
        assert_eq!(parsed.table.rows[1][3], Cell::Number(11.0));
    }

    #[test]
    fn lines_and_polygons_from_groups() {
        let bytes = KmlWriter { zipped: false }
            .write(&table(), &settings(vec![GeometryKind::Line, GeometryKind::Polygon]))
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.matches("<LineString>").count(), 1);
        assert_eq!(text.matches("<Polygon>").count(), 1);
        assert!(!text.contains("<Point>"));
        assert!(text.contains("<name>FENCE</name>"));
        assert!(!text.contains("<name>TREE</name>"));
    }

    #[test]
    fn styles_and_description() {
        let mut s = settings(vec![GeometryKind::Point]);
        s.kml.icon_color = "#ff0000".into();
        s.kml.icon_url = "http://example.com/red-pin.png".into();
        s.kml.label = LabelContent::Elevation;
        let text = String::from_utf8(KmlWriter { zipped: false }.write(&table(), &s).unwrap()).unwrap();
        assert!(text.contains("<color>ff0000ff</color>"));
        assert!(text.contains(DEFAULT_KML_ICON));
        assert!(text.contains("<name>10.000</name>"));
        assert!(text.contains("&lt;b&gt;Code:&lt;/b&gt; FENCE"));
    }

    #[test]
    fn kmz_wraps_the_document() {
        let bytes = KmlWriter { zipped: true }
            .write(&table(), &settings(vec![GeometryKind::Point]))
            .unwrap();
        let parsed = KmlReader { zipped: true }
            .read(&bytes, &ReadSettings::default())
            .unwrap();
        assert_eq!(parsed.table.rows.len(), 4);
    }

    #[test]
    fn description_skips_blank_fields() {
        let t = table();
        assert_eq!(
            description_html(&t, 3),
            "<b>PT:</b> 4<br><b>Easting:</b> 500200.000<br><b>Northing:</b> 3320200.000<br><b>Elevation:</b> 13.000<br><b>Code:</b> TREE"
        );
    }
}
