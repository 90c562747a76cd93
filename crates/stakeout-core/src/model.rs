use serde::{Deserialize, Serialize};
use std::fmt;

pub const COL_PT: &str = "PT";
pub const COL_E: &str = "Easting";
pub const COL_N: &str = "Northing";
pub const COL_Z: &str = "Elevation";
pub const COL_CODE: &str = "Code";
pub const COL_DESC: &str = "Description";

/// The six canonical columns, in their default order.
pub const CANONICAL_COLUMNS: [&str; 6] = [COL_PT, COL_E, COL_N, COL_Z, COL_CODE, COL_DESC];

/// Easting, Northing and Elevation hold numbers; every other canonical column holds text.
pub fn is_coordinate_column(name: &str) -> bool {
    matches!(name, COL_E | COL_N | COL_Z)
}

pub fn is_canonical_column(name: &str) -> bool {
    CANONICAL_COLUMNS.contains(&name)
}

/// Default cell for a canonical column that had no source data.
pub fn canonical_default(name: &str) -> Cell {
    if is_coordinate_column(name) {
        Cell::Number(0.0)
    } else {
        Cell::Text(String::new())
    }
}

/// A single table value. Raw tables carry whatever the reader found;
/// normalized tables hold numbers in coordinate columns and text in the others.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Cell {
        Cell::Text(s.into())
    }

    /// Numeric view of the cell. Text is parsed after trimming; non-finite values count as missing.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) if v.is_finite() => Some(*v),
            Cell::Number(_) | Cell::Null => None,
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Number(v) => v.is_nan(),
            Cell::Text(s) => s.trim().is_empty(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Number(v) => write!(f, "{v}"),
            Cell::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

/// Table as produced by a reader, before column normalization.
///
/// `header` is `None` for headerless delimited or spreadsheet data, in which
/// case columns are matched by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn with_header(header: &[&str]) -> Self {
        Self {
            header: Some(header.iter().map(|s| s.to_string()).collect()),
            rows: Vec::new(),
        }
    }

    pub fn headerless(rows: Vec<Vec<Cell>>) -> Self {
        Self { header: None, rows }
    }

    /// Widest of the header and every row.
    pub fn width(&self) -> usize {
        let rows = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        self.header.as_ref().map_or(rows, |h| h.len().max(rows))
    }
}

impl From<PointTable> for RawTable {
    fn from(table: PointTable) -> Self {
        RawTable {
            header: Some(table.columns),
            rows: table.rows,
        }
    }
}

/// Column-homogeneous table of point records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl PointTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Text of a cell, empty when the column or row is absent.
    pub fn text(&self, row: usize, column: &str) -> String {
        self.cell(row, column).map(Cell::to_string).unwrap_or_default()
    }

    pub fn number(&self, row: usize, column: &str) -> Option<f64> {
        self.cell(row, column).and_then(Cell::as_f64)
    }

    /// All values of one column, or `None` if the column does not exist.
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Add a column or overwrite an existing one with `values`.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) {
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }

    /// New table holding only the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> PointTable {
        PointTable {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    pub fn record(&self, row: usize) -> PointRecord {
        PointRecord {
            pt: self.text(row, COL_PT),
            easting: self.number(row, COL_E).unwrap_or(0.0),
            northing: self.number(row, COL_N).unwrap_or(0.0),
            elevation: self.number(row, COL_Z).unwrap_or(0.0),
            code: self.text(row, COL_CODE),
            description: self.text(row, COL_DESC),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = PointRecord> + '_ {
        (0..self.len()).map(|i| self.record(i))
    }

    /// Stack tables vertically over the union of their columns.
    ///
    /// Columns keep first-seen order. Missing canonical columns are filled with
    /// their canonical default, missing extra columns with `Null`.
    pub fn concat(tables: Vec<PointTable>) -> PointTable {
        let mut columns: Vec<String> = Vec::new();
        for t in &tables {
            for c in &t.columns {
                if !columns.contains(c) {
                    columns.push(c.clone());
                }
            }
        }

        let mut rows = Vec::new();
        for t in tables {
            let mapping: Vec<Option<usize>> =
                columns.iter().map(|c| t.column_index(c)).collect();
            for mut row in t.rows {
                let out = columns
                    .iter()
                    .zip(&mapping)
                    .map(|(name, idx)| match idx {
                        Some(i) => std::mem::take(&mut row[*i]),
                        None if is_canonical_column(name) => canonical_default(name),
                        None => Cell::Null,
                    })
                    .collect();
                rows.push(out);
            }
        }

        PointTable { columns, rows }
    }
}

/// Typed view of the canonical fields of one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub pt: String,
    pub easting: f64,
    pub northing: f64,
    pub elevation: f64,
    pub code: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: Vec<Vec<Cell>>) -> PointTable {
        PointTable {
            columns: columns.iter().map(|s| s.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn number_cell_displays_without_trailing_zero() {
        assert_eq!(Cell::Number(5.0).to_string(), "5");
        assert_eq!(Cell::Number(500000.125).to_string(), "500000.125");
    }

    #[test]
    fn text_cell_parses_as_number() {
        assert_eq!(Cell::text(" 12.5 ").as_f64(), Some(12.5));
        assert_eq!(Cell::text("nan").as_f64(), None);
        assert_eq!(Cell::Null.as_f64(), None);
    }

    #[test]
    fn concat_unions_columns() {
        let a = table(&[COL_PT, COL_E, "Extra"], vec![vec!["1".into(), 1.0.into(), "x".into()]]);
        let b = table(&[COL_PT, COL_N], vec![vec!["2".into(), 2.0.into()]]);
        let merged = PointTable::concat(vec![a, b]);

        assert_eq!(merged.columns, vec![COL_PT, COL_E, "Extra", COL_N]);
        assert_eq!(merged.rows[0][3], Cell::Number(0.0));
        assert_eq!(merged.rows[1][1], Cell::Number(0.0));
        assert_eq!(merged.rows[1][2], Cell::Null);
        assert_eq!(merged.text(1, COL_PT), "2");
    }

    #[test]
    fn set_column_appends_and_overwrites() {
        let mut t = table(&[COL_PT], vec![vec!["1".into()], vec!["2".into()]]);
        t.set_column("Lat", vec![1.0.into(), Cell::Null]);
        t.set_column(COL_PT, vec!["a".into(), "b".into()]);
        assert_eq!(t.columns, vec![COL_PT, "Lat"]);
        assert_eq!(t.text(1, COL_PT), "b");
        assert_eq!(t.number(0, "Lat"), Some(1.0));
    }

    #[test]
    fn record_defaults_missing_fields() {
        let t = table(&[COL_PT, COL_E], vec![vec!["7".into(), Cell::text("12.5")]]);
        let r = t.record(0);
        assert_eq!(r.pt, "7");
        assert_eq!(r.easting, 12.5);
        assert_eq!(r.northing, 0.0);
        assert_eq!(r.code, "");
    }
}
