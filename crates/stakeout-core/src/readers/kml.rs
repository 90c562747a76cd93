//! KML and KMZ reader. Placemark coordinates are projected to the UTM zone
//! from the read settings.

use std::io::{Cursor, Read};
use std::sync::LazyLock;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::crs::geodesy::Projector;
use crate::crs::registry;
use crate::error::{ParseWarning, PointError, WarningKind};
use crate::format::Format;
use crate::model::{Cell, RawTable, COL_CODE, COL_DESC, COL_E, COL_N, COL_PT, COL_Z};
use crate::readers::{no_records, ParsedPoints, PointReader};
use crate::settings::{ReadSettings, UtmZone};
use crate::sniff::decode_text;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("HTML tag pattern is valid"));

/// Latitudes outside this range cannot be projected to UTM.
pub const UTM_LATITUDE_RANGE: (f64, f64) = (-80.0, 84.0);

/// Geometry paths searched for a placemark's coordinates, in priority order.
const COORDINATE_PATHS: [&[&str]; 3] = [
    &["Point", "coordinates"],
    &["LineString", "coordinates"],
    &["Polygon", "outerBoundaryIs", "LinearRing", "coordinates"],
];

pub struct KmlReader {
    /// Input is a KMZ archive holding the KML document.
    pub zipped: bool,
}

impl PointReader for KmlReader {
    fn format(&self) -> Format {
        if self.zipped {
            Format::Kmz
        } else {
            Format::Kml
        }
    }

    fn read(&self, bytes: &[u8], settings: &ReadSettings) -> Result<ParsedPoints, PointError> {
        let format = self.format();
        let document = if self.zipped {
            kml_from_kmz(bytes)?
        } else {
            bytes.to_vec()
        };
        let decoded = decode_text(&document)?;
        let root = parse_document(&decoded.text, format.name())?;
        let parsed = placemark_points(&root, settings.zone)?;
        if parsed.table.rows.is_empty() {
            return Err(no_records(format));
        }
        info!(points = parsed.table.rows.len(), zone = settings.zone.number, "read {format} placemarks");
        Ok(parsed)
    }
}

/// Bytes of the first `.kml` entry of a KMZ archive.
fn kml_from_kmz(bytes: &[u8]) -> Result<Vec<u8>, PointError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| PointError::corrupt(Format::Kmz.name(), format!("not a ZIP archive: {e}")))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| PointError::corrupt(Format::Kmz.name(), e.to_string()))?;
        if file.name().to_lowercase().ends_with(".kml") {
            debug!(entry = file.name(), "found KML document in KMZ");
            let mut content = Vec::new();
            file.read_to_end(&mut content)?;
            return Ok(content);
        }
    }
    Err(PointError::corrupt(
        Format::Kmz.name(),
        "archive contains no .kml document",
    ))
}

/// Minimal element tree: local names, concatenated text and children.
#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Descendants named `name` in document order.
    fn descendants<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        for child in &self.children {
            if child.name == name {
                out.push(child);
            }
            child.descendants(name, out);
        }
    }

    /// First element reached by a descendant named `path[0]` followed by
    /// direct children named by the rest of the path.
    fn find(&self, path: &[&str]) -> Option<&Element> {
        let (first, rest) = path.split_first()?;
        let mut starts = Vec::new();
        self.descendants(first, &mut starts);
        starts.into_iter().find_map(|el| el.follow(rest))
    }

    fn follow(&self, path: &[&str]) -> Option<&Element> {
        match path.split_first() {
            None => Some(self),
            Some((name, rest)) => self
                .children
                .iter()
                .filter(|c| c.name == *name)
                .find_map(|c| c.follow(rest)),
        }
    }
}

fn parse_document(text: &str, format: &str) -> Result<Element, PointError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack = vec![Element::default()];
    loop {
        let event = reader
            .read_event()
            .map_err(|e| PointError::corrupt(format, format!("XML error at byte {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(e) => stack.push(Element {
                name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                ..Default::default()
            }),
            Event::Empty(e) => {
                let element = Element {
                    name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                    ..Default::default()
                };
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(PointError::corrupt(format, "unbalanced closing tag"));
                }
                if let Some(done) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(done);
                    }
                }
            }
            Event::Text(t) => {
                let content = t
                    .unescape()
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&content);
                }
            }
            Event::CData(c) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(PointError::corrupt(format, "document ends inside an open element"));
    }
    let document = stack.pop().unwrap_or_default();
    if document.children.is_empty() {
        return Err(PointError::corrupt(format, "document has no root element"));
    }
    Ok(document)
}

/// Description text with HTML tags and line breaks removed and whitespace collapsed.
pub fn clean_description(raw: &str) -> String {
    let stripped = HTML_TAG.replace_all(raw, " ").replace(['\n', '\r'], "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `lon,lat[,alt]` tuple. `None` for sets with fewer than two parts,
/// `Some(None)` when a part does not parse.
fn parse_tuple(set: &str) -> Option<Option<(f64, f64, f64)>> {
    let parts: Vec<&str> = set.split(',').collect();
    if parts.len() < 2 {
        return None;
    }
    let num = |s: &str| s.trim().parse::<f64>().ok();
    let alt = match parts.get(2) {
        Some(a) => num(a),
        None => Some(0.0),
    };
    Some(match (num(parts[0]), num(parts[1]), alt) {
        (Some(lon), Some(lat), Some(alt)) => Some((lon, lat, alt)),
        _ => None,
    })
}

fn skip(warnings: &mut Vec<ParseWarning>, message: String) {
    warn!("{message}");
    warnings.push(ParseWarning::new(WarningKind::RecordParse, message));
}

fn placemark_points(root: &Element, zone: UtmZone) -> Result<ParsedPoints, PointError> {
    let crs = registry::utm(zone.number, zone.is_south())
        .ok_or_else(|| PointError::InvalidCrs(format!("UTM zone {} is out of range", zone.number)))?;
    let projector: Projector = crs.projector()?;
    debug!(crs = %crs, "projecting placemarks");

    let mut placemarks = Vec::new();
    root.descendants("Placemark", &mut placemarks);

    let mut rows = Vec::new();
    let mut warnings = Vec::new();

    for (idx, placemark) in placemarks.iter().enumerate() {
        let name = placemark
            .child("name")
            .map(|n| n.text.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("KML_Placemark_{}", idx + 1));
        let description = placemark
            .child("description")
            .map(|d| clean_description(&d.text))
            .unwrap_or_default();

        let Some(coordinates) = COORDINATE_PATHS.iter().find_map(|p| placemark.find(p)) else {
            debug!(placemark = %name, "placemark without supported geometry");
            continue;
        };
        let sets: Vec<&str> = coordinates.text.split_whitespace().collect();

        for (i, set) in sets.iter().enumerate() {
            let Some(tuple) = parse_tuple(set) else {
                continue;
            };
            let Some((lon, lat, alt)) = tuple else {
                skip(&mut warnings, format!("placemark '{name}': unparseable coordinates '{set}'"));
                continue;
            };
            let lat_ok = (UTM_LATITUDE_RANGE.0..=UTM_LATITUDE_RANGE.1).contains(&lat);
            let lon_ok = (-180.0..=180.0).contains(&lon);
            if !(lat_ok && lon_ok) {
                skip(&mut warnings, format!("placemark '{name}': coordinates out of range ({lon}, {lat})"));
                continue;
            }
            let (easting, northing) = match projector.from_geodetic(lon, lat) {
                Ok(p) => p,
                Err(e) => {
                    skip(&mut warnings, format!("placemark '{name}': projection failed: {e}"));
                    continue;
                }
            };
            let pt = if sets.len() > 1 {
                format!("{name}_Pt{}", i + 1)
            } else {
                name.clone()
            };
            rows.push(vec![
                Cell::Text(pt),
                Cell::Number(easting),
                Cell::Number(northing),
                Cell::Number(alt),
                Cell::Text(String::new()),
                Cell::Text(description.clone()),
            ]);
        }
    }

    let mut table = RawTable::with_header(&[COL_PT, COL_E, COL_N, COL_Z, COL_CODE, COL_DESC]);
    table.rows = rows;
    Ok(ParsedPoints {
        table,
        warnings,
        coerced_fields: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Placemark>
      <name> BM1 </name>
      <description><![CDATA[<b>Bench</b>
mark   one]]></description>
      <Point><coordinates>33.0,0.0,12.5</coordinates></Point>
    </Placemark>
    <Placemark>
      <LineString><coordinates>
        33.0,1.0 33.001,1.0,2 bad,1.0 33.0,95.0
      </coordinates></LineString>
    </Placemark>
  </Document>
</kml>"#;

    fn read(bytes: &[u8], zipped: bool) -> Result<ParsedPoints, PointError> {
        KmlReader { zipped }.read(bytes, &ReadSettings::default())
    }

    #[test]
    fn reads_points_and_lines() {
        let parsed = read(DOC.as_bytes(), false).unwrap();
        let rows = &parsed.table.rows;
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0][0], Cell::text("BM1"));
        let e = rows[0][1].as_f64().unwrap();
        let n = rows[0][2].as_f64().unwrap();
        assert!((e - 500_000.0).abs() < 1e-3);
        assert!(n.abs() < 1e-3);
        assert_eq!(rows[0][3], Cell::Number(12.5));
        assert_eq!(rows[0][5], Cell::text("Bench mark one"));

        assert_eq!(rows[1][0], Cell::text("KML_Placemark_2_Pt1"));
        assert_eq!(rows[2][0], Cell::text("KML_Placemark_2_Pt2"));
        assert_eq!(rows[2][3], Cell::Number(2.0));
        assert_eq!(parsed.warnings.len(), 2);
    }

    #[test]
    fn polygon_outer_ring_is_used() {
        let doc = r#"<kml><Placemark><name>Lot</name><Polygon><outerBoundaryIs><LinearRing>
            <coordinates>33,1 33.001,1 33,1.001</coordinates>
            </LinearRing></outerBoundaryIs></Polygon></Placemark></kml>"#;
        let parsed = read(doc.as_bytes(), false).unwrap();
        assert_eq!(parsed.table.rows.len(), 3);
        assert_eq!(parsed.table.rows[2][0], Cell::text("Lot_Pt3"));
    }

    #[test]
    fn southern_zone_letter_selects_south() {
        let doc = "<kml><Placemark><name>S</name><Point><coordinates>33,-1</coordinates></Point></Placemark></kml>";
        let settings = ReadSettings {
            zone: UtmZone { number: 36, letter: 'M' },
            ..Default::default()
        };
        let parsed = KmlReader { zipped: false }.read(doc.as_bytes(), &settings).unwrap();
        let n = parsed.table.rows[0][2].as_f64().unwrap();
        assert!(n > 9_800_000.0 && n < 10_000_000.0, "{n}");
    }

    #[test]
    fn malformed_xml_is_corrupt() {
        let err = read(b"<kml><Placemark></kml>", false).unwrap_err();
        assert!(matches!(err, PointError::StructuralCorruption { .. }));
        let err = read(b"<kml><Placemark>", false).unwrap_err();
        assert!(matches!(err, PointError::StructuralCorruption { .. }));
    }

    #[test]
    fn no_placemarks_has_no_records() {
        let err = read(b"<kml><Document/></kml>", false).unwrap_err();
        assert!(matches!(err, PointError::NoValidRecords { .. }));
    }

    #[test]
    fn kmz_reads_first_kml_entry() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            zip.start_file("files/readme.txt", SimpleFileOptions::default()).unwrap();
            zip.write_all(b"not kml").unwrap();
            zip.start_file("doc.KML", SimpleFileOptions::default()).unwrap();
            zip.write_all(DOC.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        let parsed = read(&buf, true).unwrap();
        assert_eq!(parsed.table.rows.len(), 3);
    }

    #[test]
    fn kmz_without_kml_is_corrupt() {
        let mut buf = Vec::new();
        {
            let zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            zip.finish().unwrap();
        }
        assert!(matches!(read(&buf, true), Err(PointError::StructuralCorruption { .. })));
        assert!(matches!(read(b"PK not really", true), Err(PointError::StructuralCorruption { .. })));
    }

    #[test]
    fn descriptions_are_cleaned() {
        assert_eq!(clean_description("<p>a<br/>b</p>\r\n  c"), "a b c");
    }
}
