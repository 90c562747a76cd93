//! ASCII DXF reader for POINT and INSERT entities.
//!
//! Only the ENTITIES section is read, so block definitions and paper space
//! never contribute points. Every TEXT and MTEXT in model space goes into an
//! R-tree; each point takes the single nearest text as either its id or its
//! description.

use rstar::primitives::GeomWithData;
use rstar::RTree;
use tracing::{debug, info, warn};

use crate::error::{ParseWarning, PointError, WarningKind};
use crate::format::Format;
use crate::model::{Cell, RawTable, COL_CODE, COL_DESC, COL_E, COL_N, COL_PT, COL_Z};
use crate::parsing::normalize::canonical_name;
use crate::readers::{no_records, ParsedPoints, PointReader};
use crate::settings::ReadSettings;
use crate::sniff::decode_text;

/// Sentinel at the start of binary DXF files.
pub const BINARY_SENTINEL: &[u8] = b"AutoCAD Binary DXF";
/// Longest text that can still be read as a point id.
pub const MAX_POINT_ID_CHARS: usize = 32;
/// Point ids hold at most this many spaces.
pub const MAX_POINT_ID_SPACES: usize = 2;

type TextTree = RTree<GeomWithData<[f64; 3], usize>>;

pub struct DxfReader;

impl PointReader for DxfReader {
    fn format(&self) -> Format {
        Format::Dxf
    }

    fn read(&self, bytes: &[u8], _settings: &ReadSettings) -> Result<ParsedPoints, PointError> {
        if bytes.starts_with(BINARY_SENTINEL) {
            return Err(PointError::corrupt("DXF", "binary DXF is not supported, save as ASCII DXF"));
        }
        let decoded = decode_text(bytes)?;
        let parsed = parse_dxf(&decoded.text)?;
        if parsed.table.rows.is_empty() {
            return Err(no_records(Format::Dxf));
        }
        info!(points = parsed.table.rows.len(), "read DXF points");
        Ok(parsed)
    }
}

/// One group code / value pair.
#[derive(Debug, Clone, PartialEq)]
struct Pair {
    code: i32,
    value: String,
}

fn read_pairs(text: &str) -> Result<Vec<Pair>, PointError> {
    let mut pairs = Vec::new();
    let mut lines = text.lines().enumerate();
    while let Some((idx, code_line)) = lines.next() {
        let code_line = code_line.trim();
        if code_line.is_empty() && pairs.is_empty() {
            continue;
        }
        let code = code_line.parse::<i32>().map_err(|_| {
            PointError::corrupt("DXF", format!("line {}: invalid group code '{code_line}'", idx + 1))
        })?;
        let Some((_, value)) = lines.next() else {
            return Err(PointError::corrupt(
                "DXF",
                format!("line {}: group code {code} has no value", idx + 1),
            ));
        };
        let value = value.trim_end_matches('\r').to_string();
        let eof = code == 0 && value.trim() == "EOF";
        pairs.push(Pair { code, value });
        if eof {
            break;
        }
    }
    Ok(pairs)
}

/// An entity and the pairs that follow its type marker.
#[derive(Debug)]
struct Entity {
    kind: String,
    pairs: Vec<Pair>,
}

impl Entity {
    fn get(&self, code: i32) -> Option<&str> {
        self.pairs
            .iter()
            .find(|p| p.code == code)
            .map(|p| p.value.as_str())
    }

    fn number(&self, code: i32) -> Option<f64> {
        self.get(code)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }

    /// Insertion or location point; a missing Z is 0.
    fn location(&self) -> Option<[f64; 3]> {
        Some([self.number(10)?, self.number(20)?, self.number(30).unwrap_or(0.0)])
    }

    fn in_paper_space(&self) -> bool {
        self.get(67).is_some_and(|v| v.trim() == "1")
    }

    fn layer(&self) -> String {
        self.get(8)
            .map(|v| unescape_unicode(v.trim()))
            .unwrap_or_else(|| "0".to_string())
    }

    fn handle(&self) -> Option<String> {
        self.get(5).map(|h| h.trim().to_string()).filter(|h| !h.is_empty())
    }
}

/// Entities of the ENTITIES section, in file order.
fn entities_section(pairs: Vec<Pair>) -> Result<Vec<Entity>, PointError> {
    let mut iter = pairs.into_iter().peekable();
    let mut found_section = false;

    while let Some(pair) = iter.next() {
        if pair.code == 0 && pair.value.trim() == "SECTION" {
            found_section = true;
            if iter
                .next_if(|p| p.code == 2 && p.value.trim() == "ENTITIES")
                .is_some()
            {
                let mut entities: Vec<Entity> = Vec::new();
                for pair in iter.by_ref() {
                    if pair.code == 0 {
                        let kind = pair.value.trim().to_string();
                        if kind == "ENDSEC" {
                            return Ok(entities);
                        }
                        entities.push(Entity {
                            kind,
                            pairs: Vec::new(),
                        });
                    } else if let Some(current) = entities.last_mut() {
                        current.pairs.push(pair);
                    }
                }
                return Err(PointError::corrupt("DXF", "ENTITIES section is not terminated"));
            }
        }
    }

    if found_section {
        debug!("DXF has no ENTITIES section");
        Ok(Vec::new())
    } else {
        Err(PointError::corrupt("DXF", "no SECTION markers found"))
    }
}

/// Decode `\U+XXXX` escapes used by pre-2007 DXF for non-ASCII text.
pub fn unescape_unicode(s: &str) -> String {
    if !s.contains("\\U+") {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find("\\U+") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 3..];
        let decoded = after
            .get(..4)
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32);
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &after[4..];
            }
            None => {
                out.push_str("\\U+");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Strip MTEXT inline formatting to plain text.
pub fn mtext_plain(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '{' | '}' => {}
            '\\' => match chars.next() {
                Some('P') => out.push('\n'),
                Some('~') => out.push(' '),
                Some(c @ ('\\' | '{' | '}')) => out.push(c),
                Some('S') => {
                    for c in chars.by_ref() {
                        if c == ';' {
                            break;
                        }
                        out.push(if c == '^' || c == '#' { '/' } else { c });
                    }
                }
                Some('A' | 'C' | 'c' | 'F' | 'f' | 'H' | 'h' | 'Q' | 'q' | 'T' | 't' | 'W' | 'w' | 'p') => {
                    for c in chars.by_ref() {
                        if c == ';' {
                            break;
                        }
                    }
                }
                Some('L' | 'l' | 'O' | 'o' | 'K' | 'k') => {}
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            _ => out.push(c),
        }
    }
    out
}

/// Text content of a TEXT or MTEXT entity. MTEXT splits long strings over
/// code 3 chunks followed by a final code 1.
fn text_content(entity: &Entity) -> String {
    match entity.kind.as_str() {
        "MTEXT" => {
            let mut raw = String::new();
            for p in entity.pairs.iter().filter(|p| p.code == 3 || p.code == 1) {
                raw.push_str(&p.value);
            }
            mtext_plain(&unescape_unicode(&raw)).trim().to_string()
        }
        _ => unescape_unicode(entity.get(1).unwrap_or_default())
            .trim()
            .to_string(),
    }
}

/// Short text with few spaces reads as a point id; anything else is a description.
pub fn is_potential_point_id(text: &str) -> bool {
    let t = text.trim();
    !t.is_empty()
        && t.chars().count() <= MAX_POINT_ID_CHARS
        && t.matches(' ').count() <= MAX_POINT_ID_SPACES
}

/// Index of the nearest text by 3D squared distance. Equal distances go to
/// the text that appears first in the file.
fn nearest_text(tree: &TextTree, at: [f64; 3]) -> Option<usize> {
    let mut iter = tree.nearest_neighbor_iter_with_distance_2(&at);
    let (first, best) = iter.next()?;
    let mut index = first.data;
    for (candidate, d2) in iter {
        if d2 > best {
            break;
        }
        index = index.min(candidate.data);
    }
    Some(index)
}

struct PointEntity {
    location: [f64; 3],
    layer: String,
    description: String,
    attribute_id: Option<String>,
    handle: Option<String>,
}

/// Parse ASCII DXF text into a preliminary table with the six canonical columns.
pub fn parse_dxf(text: &str) -> Result<ParsedPoints, PointError> {
    let entities = entities_section(read_pairs(text)?)?;

    let mut texts: Vec<String> = Vec::new();
    let mut text_points = Vec::new();
    let mut points: Vec<PointEntity> = Vec::new();
    let mut warnings = Vec::new();
    let mut in_insert = false;

    for entity in &entities {
        let kind = entity.kind.as_str();
        if kind == "ATTRIB" {
            if !in_insert || entity.in_paper_space() {
                continue;
            }
            let Some(point) = points.last_mut() else {
                continue;
            };
            let tag = entity.get(2).unwrap_or_default().trim();
            if point.attribute_id.is_none() && canonical_name(tag) == Some(COL_PT) {
                let value = unescape_unicode(entity.get(1).unwrap_or_default().trim());
                if !value.is_empty() {
                    point.attribute_id = Some(value);
                }
            }
            continue;
        }
        in_insert = false;
        if entity.in_paper_space() {
            continue;
        }

        match kind {
            "TEXT" | "MTEXT" => {
                let content = text_content(entity);
                if let (Some(loc), false) = (entity.location(), content.is_empty()) {
                    text_points.push(GeomWithData::new(loc, texts.len()));
                    texts.push(content);
                }
            }
            "POINT" | "INSERT" => {
                let Some(location) = entity.location() else {
                    warn!(kind, handle = ?entity.handle(), "entity without coordinates skipped");
                    warnings.push(ParseWarning::new(
                        WarningKind::RecordParse,
                        format!("{kind} {} has no coordinates", entity.handle().unwrap_or_default()),
                    ));
                    continue;
                };
                let description = if kind == "INSERT" {
                    in_insert = true;
                    unescape_unicode(entity.get(2).unwrap_or_default().trim())
                } else {
                    String::new()
                };
                points.push(PointEntity {
                    location,
                    layer: entity.layer(),
                    description,
                    attribute_id: None,
                    handle: entity.handle(),
                });
            }
            _ => {}
        }
    }

    let tree: TextTree = RTree::bulk_load(text_points);
    debug!(points = points.len(), texts = texts.len(), "indexed DXF entities");

    let mut table = RawTable::with_header(&[COL_PT, COL_E, COL_N, COL_Z, COL_CODE, COL_DESC]);
    for (n, point) in points.into_iter().enumerate() {
        let nearest = nearest_text(&tree, point.location).map(|i| texts[i].as_str());
        let (text_id, text_desc) = match nearest {
            Some(t) if is_potential_point_id(t) => (Some(t.to_string()), None),
            Some(t) => (None, Some(t.to_string())),
            None => (None, None),
        };
        let pt = text_id
            .or(point.attribute_id)
            .or(point.handle)
            .unwrap_or_else(|| format!("DXF_Pt_{}", n + 1));
        let [x, y, z] = point.location;
        table.rows.push(vec![
            Cell::Text(pt),
            Cell::Number(x),
            Cell::Number(y),
            Cell::Number(z),
            Cell::Text(point.layer),
            Cell::Text(text_desc.unwrap_or(point.description)),
        ]);
    }

    Ok(ParsedPoints {
        table,
        warnings,
        coerced_fields: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dxf(entities: &[&str]) -> String {
        let mut s = String::from("0\nSECTION\n2\nHEADER\n9\n$ACADVER\n1\nAC1015\n0\nENDSEC\n");
        s.push_str("0\nSECTION\n2\nENTITIES\n");
        for e in entities {
            s.push_str(e);
        }
        s.push_str("0\nENDSEC\n0\nEOF\n");
        s
    }

    fn point(handle: &str, layer: &str, x: f64, y: f64, z: f64) -> String {
        format!("0\nPOINT\n5\n{handle}\n8\n{layer}\n10\n{x}\n20\n{y}\n30\n{z}\n")
    }

    fn text(value: &str, x: f64, y: f64) -> String {
        format!("0\nTEXT\n8\n0\n10\n{x}\n20\n{y}\n30\n0\n40\n0.2\n1\n{value}\n")
    }

    fn rows(text: &str) -> Vec<Vec<Cell>> {
        parse_dxf(text).unwrap().table.rows
    }

    #[test]
    fn point_takes_nearest_text_as_id() {
        let src = dxf(&[
            &point("1A", "SURVEY", 10.0, 20.0, 5.0),
            &text("P100", 10.2, 20.1),
            &text("FAR", 50.0, 50.0),
        ]);
        let r = rows(&src);
        assert_eq!(r.len(), 1);
        assert_eq!(r[0][0], Cell::text("P100"));
        assert_eq!(r[0][1], Cell::Number(10.0));
        assert_eq!(r[0][3], Cell::Number(5.0));
        assert_eq!(r[0][4], Cell::text("SURVEY"));
        assert_eq!(r[0][5], Cell::text(""));
    }

    #[test]
    fn long_text_becomes_description_and_handle_is_id() {
        let src = dxf(&[
            &point("2B", "0", 0.0, 0.0, 0.0),
            &text("edge of the old concrete wall", 0.1, 0.0),
        ]);
        let r = rows(&src);
        assert_eq!(r[0][0], Cell::text("2B"));
        assert_eq!(r[0][5], Cell::text("edge of the old concrete wall"));
    }

    #[test]
    fn equal_distance_goes_to_first_text_in_file() {
        let src = dxf(&[
            &point("A", "0", 0.0, 0.0, 0.0),
            &text("EAST", 1.0, 0.0),
            &text("WEST", -1.0, 0.0),
        ]);
        assert_eq!(rows(&src)[0][0], Cell::text("EAST"));

        let src = dxf(&[
            &point("A", "0", 0.0, 0.0, 0.0),
            &text("WEST", -1.0, 0.0),
            &text("EAST", 1.0, 0.0),
        ]);
        assert_eq!(rows(&src)[0][0], Cell::text("WEST"));
    }

    #[test]
    fn insert_uses_attribute_then_block_name() {
        let src = dxf(&[
            "0\nINSERT\n5\nC3\n8\nTREES\n66\n1\n2\nTREE_BLOCK\n10\n1.0\n20\n2.0\n30\n3.0\n",
            "0\nATTRIB\n8\nTREES\n2\nHEIGHT\n1\n12\n",
            "0\nATTRIB\n8\nTREES\n2\nPOINT_ID\n1\nT-17\n",
            "0\nSEQEND\n",
        ]);
        let r = rows(&src);
        assert_eq!(r[0][0], Cell::text("T-17"));
        assert_eq!(r[0][4], Cell::text("TREES"));
        assert_eq!(r[0][5], Cell::text("TREE_BLOCK"));
    }

    #[test]
    fn paper_space_and_blocks_are_ignored() {
        let src = format!(
            "0\nSECTION\n2\nBLOCKS\n0\nBLOCK\n2\nB\n{}0\nENDBLK\n0\nENDSEC\n{}",
            point("99", "0", 9.0, 9.0, 0.0),
            dxf(&[
                "0\nPOINT\n5\nPS\n67\n1\n8\n0\n10\n1\n20\n1\n30\n0\n",
                &point("MS", "0", 2.0, 2.0, 0.0),
            ])
        );
        let r = rows(&src);
        assert_eq!(r.len(), 1);
        assert_eq!(r[0][0], Cell::text("MS"));
    }

    #[test]
    fn mtext_formatting_is_stripped() {
        assert_eq!(mtext_plain(r"{\fArial|b1;\H0.5x;Main\Pgate}"), "Main\ngate");
        assert_eq!(mtext_plain(r"1\S1^2;\~in"), "11/2 in");
        assert_eq!(unescape_unicode(r"\U+0627\U+0628 1"), "اب 1");
    }

    #[test]
    fn binary_and_garbage_are_corrupt() {
        let err = DxfReader
            .read(b"AutoCAD Binary DXF\r\n\x1a\x00", &ReadSettings::default())
            .unwrap_err();
        assert!(matches!(err, PointError::StructuralCorruption { .. }));

        let err = parse_dxf("0\nSECTION\n2\nENTITIES\nabc\nPOINT\n").unwrap_err();
        assert!(matches!(err, PointError::StructuralCorruption { .. }));

        let err = parse_dxf("0\nSECTION\n2\nENTITIES\n0\nPOINT\n").unwrap_err();
        assert!(matches!(err, PointError::StructuralCorruption { .. }));
    }

    #[test]
    fn drawing_without_points_has_no_records() {
        let err = DxfReader
            .read(dxf(&[&text("lonely", 0.0, 0.0)]).as_bytes(), &ReadSettings::default())
            .unwrap_err();
        assert!(matches!(err, PointError::NoValidRecords { .. }));
    }

    #[test]
    fn point_id_heuristic() {
        assert!(is_potential_point_id("STN 1 A"));
        assert!(!is_potential_point_id("a b c d"));
        assert!(!is_potential_point_id("   "));
        assert!(!is_potential_point_id(&"x".repeat(33)));
    }
}
