//! Spreadsheet reader (xlsx, xlsm, xls, ods) with header row detection.

use std::io::Cursor;

use calamine::{Data, Reader};
use tracing::{debug, info};

use crate::error::PointError;
use crate::format::Format;
use crate::model::{Cell, RawTable};
use crate::parsing::normalize::is_known_alias;
use crate::readers::{no_records, ParsedPoints, PointReader};
use crate::settings::ReadSettings;
use crate::sniff::header::{HEADER_NUMERIC_RATIO, HEADER_TEXT_RATIO};

/// Rows inspected when deciding whether the first row is a header.
pub const PREVIEW_ROWS: usize = 5;

pub struct ExcelReader;

impl PointReader for ExcelReader {
    fn format(&self) -> Format {
        Format::Excel
    }

    fn read(&self, bytes: &[u8], settings: &ReadSettings) -> Result<ParsedPoints, PointError> {
        let corrupt = |reason: String| PointError::corrupt(Format::Excel.name(), reason);
        let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| corrupt(format!("failed to open workbook: {e}")))?;

        let (sheet_name, range) = match &settings.excel_sheet {
            Some(name) => {
                let range = workbook
                    .worksheet_range(name)
                    .map_err(|e| corrupt(format!("sheet '{name}' not found: {e}")))?;
                (name.clone(), range)
            }
            None => {
                let name = workbook.sheet_names().first().cloned().unwrap_or_default();
                let range = workbook
                    .worksheet_range_at(0)
                    .ok_or_else(|| corrupt("workbook has no sheets".into()))?
                    .map_err(|e| corrupt(format!("failed to read first sheet: {e}")))?;
                (name, range)
            }
        };

        let width = range.width();
        let mut rows: Vec<Vec<Cell>> = range
            .rows()
            .map(|r| r.iter().map(to_cell).collect::<Vec<Cell>>())
            .collect();
        let before = rows.len();
        rows.retain(|r| !r.iter().all(Cell::is_blank));
        if rows.len() < before {
            debug!(dropped = before - rows.len(), "blank spreadsheet rows dropped");
        }

        let has_header = detect_header(&rows[..rows.len().min(PREVIEW_ROWS)]);
        let table = if has_header {
            let header_row = rows.remove(0);
            let header = (0..width)
                .map(|i| match header_row.get(i) {
                    Some(c) if !c.is_blank() => c.to_string().trim().to_string(),
                    _ => format!("Unnamed: {i}"),
                })
                .collect();
            RawTable {
                header: Some(header),
                rows,
            }
        } else {
            RawTable::headerless(rows)
        };

        if table.rows.is_empty() {
            return Err(no_records(Format::Excel));
        }
        info!(sheet = %sheet_name, rows = table.rows.len(), has_header, "read spreadsheet");
        Ok(ParsedPoints::new(table))
    }
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Null,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        other => Cell::Text(other.to_string()),
    }
}

/// The first row is a header when it is mostly text and the second row is
/// mostly numeric, or when any first-row value is a known column alias.
pub fn detect_header(preview: &[Vec<Cell>]) -> bool {
    let Some(first) = preview.first() else {
        return false;
    };
    if first.is_empty() {
        return false;
    }

    let alias_match = first
        .iter()
        .any(|c| matches!(c, Cell::Text(s) if is_known_alias(s)));
    if alias_match {
        return true;
    }

    let text_ratio =
        first.iter().filter(|c| matches!(c, Cell::Text(_))).count() as f64 / first.len() as f64;
    let numeric_below = preview.get(1).is_some_and(|second| {
        !second.is_empty()
            && second.iter().filter(|c| c.as_f64().is_some()).count() as f64 / second.len() as f64
                > HEADER_NUMERIC_RATIO
    });
    text_ratio > HEADER_TEXT_RATIO && numeric_below
}
