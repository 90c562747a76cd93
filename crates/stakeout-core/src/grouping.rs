//! Partitioning of a point table into ordered groups for line and polygon output.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PointError;
use crate::model::{PointTable, COL_CODE, COL_DESC, COL_PT};

/// Key of the single group produced by sequential grouping.
pub const SEQUENTIAL_GROUP: &str = "sequential_line_0";

/// How rows are assigned to groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupLogic {
    /// All rows in source order, unsorted.
    Sequential,
    ByPt,
    Code,
    Description,
    /// Group by the column named in the grouping settings.
    Custom,
}

impl GroupLogic {
    pub fn name(&self) -> &'static str {
        match self {
            GroupLogic::Sequential => "sequential",
            GroupLogic::ByPt => "by_pt",
            GroupLogic::Code => "code",
            GroupLogic::Description => "description",
            GroupLogic::Custom => "custom",
        }
    }
}

impl fmt::Display for GroupLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GroupLogic {
    type Err = PointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(GroupLogic::Sequential),
            "by_pt" | "pt" => Ok(GroupLogic::ByPt),
            "code" => Ok(GroupLogic::Code),
            "description" | "desc" => Ok(GroupLogic::Description),
            "custom" => Ok(GroupLogic::Custom),
            other => Err(PointError::UnsupportedFormat(format!(
                "unknown grouping logic '{other}'"
            ))),
        }
    }
}

/// A named, ordered subset of a table's rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PointGroup {
    pub key: String,
    pub table: PointTable,
}

/// One run of a natural sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Chunk {
    Text(String),
    /// ASCII digits with leading zeros removed.
    Number(String),
}

impl Ord for Chunk {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Chunk::Number(a), Chunk::Number(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Chunk::Text(a), Chunk::Text(b)) => a.cmp(b),
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for Chunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Natural sort key: alternating lowercase text and digit runs, always
/// starting with a (possibly empty) text run.
fn natural_key(s: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut text = String::new();
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            if !digits.is_empty() {
                chunks.push(Chunk::Text(std::mem::take(&mut text).to_lowercase()));
                chunks.push(number_chunk(&std::mem::take(&mut digits)));
            }
            text.push(c);
        }
    }
    chunks.push(Chunk::Text(text.to_lowercase()));
    if !digits.is_empty() {
        chunks.push(number_chunk(&digits));
        chunks.push(Chunk::Text(String::new()));
    }
    chunks
}

fn number_chunk(digits: &str) -> Chunk {
    Chunk::Number(digits.trim_start_matches('0').to_string())
}

/// Compare two strings in natural order ("STN2" < "STN10").
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key(a).cmp(&natural_key(b))
}

/// Stable natural sort of a table on `column`.
pub fn sort_naturally(table: &PointTable, column: &str) -> PointTable {
    let mut keyed: Vec<(Vec<Chunk>, usize)> = (0..table.len())
        .map(|i| (natural_key(&table.text(i, column)), i))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    let order: Vec<usize> = keyed.into_iter().map(|(_, i)| i).collect();
    table.select_rows(&order)
}

/// Partition `table` into groups for line and polygon construction.
///
/// Groups keep first-appearance order. Rows with a blank key are dropped, as
/// are groups with fewer than two rows. When the grouping column is missing
/// (or `Custom` has no column) the call falls back to sequential grouping.
/// Sorting is skipped when `sort_column` does not exist.
pub fn group_rows(
    table: &PointTable,
    logic: GroupLogic,
    custom_column: Option<&str>,
    sort_column: &str,
    sort: bool,
) -> Vec<PointGroup> {
    if table.is_empty() {
        return Vec::new();
    }

    let sort = if sort && !table.has_column(sort_column) {
        warn!(column = sort_column, "sort column not found, sorting disabled");
        false
    } else {
        sort
    };

    let column = match logic {
        GroupLogic::Sequential => None,
        GroupLogic::ByPt => Some(COL_PT),
        GroupLogic::Code => Some(COL_CODE),
        GroupLogic::Description => Some(COL_DESC),
        GroupLogic::Custom => custom_column.filter(|c| !c.trim().is_empty()),
    };

    let column = match column {
        None if logic == GroupLogic::Sequential => return sequential(table),
        Some(c) if table.has_column(c) => c,
        _ => {
            warn!(
                logic = %logic,
                column = custom_column.unwrap_or(""),
                "grouping column unavailable, using sequential grouping"
            );
            return sequential(table);
        }
    };

    let mut keys: Vec<String> = Vec::new();
    let mut members: Vec<Vec<usize>> = Vec::new();
    for row in 0..table.len() {
        let key = table.text(row, column);
        if key.trim().is_empty() {
            continue;
        }
        match keys.iter().position(|k| *k == key) {
            Some(g) => members[g].push(row),
            None => {
                keys.push(key);
                members.push(vec![row]);
            }
        }
    }

    let groups: Vec<PointGroup> = keys
        .into_iter()
        .zip(members)
        .filter(|(_, rows)| rows.len() >= 2)
        .map(|(key, rows)| {
            let subset = table.select_rows(&rows);
            let table = if sort {
                sort_naturally(&subset, sort_column)
            } else {
                subset
            };
            PointGroup { key, table }
        })
        .collect();
    debug!(logic = %logic, column, groups = groups.len(), "grouped rows");
    groups
}

fn sequential(table: &PointTable) -> Vec<PointGroup> {
    vec![PointGroup {
        key: SEQUENTIAL_GROUP.to_string(),
        table: table.clone(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Cell;

    fn table(rows: &[(&str, &str)]) -> PointTable {
        PointTable {
            columns: vec![COL_PT.into(), COL_CODE.into()],
            rows: rows
                .iter()
                .map(|(pt, code)| vec![Cell::text(*pt), Cell::text(*code)])
                .collect(),
        }
    }

    fn ids(t: &PointTable) -> Vec<String> {
        (0..t.len()).map(|i| t.text(i, COL_PT)).collect()
    }

    #[test]
    fn natural_order() {
        let t = table(&[("STN10", "A"), ("STN2", "A"), ("STN1", "A")]);
        let groups = group_rows(&t, GroupLogic::Code, None, COL_PT, true);
        assert_eq!(groups.len(), 1);
        assert_eq!(ids(&groups[0].table), vec!["STN1", "STN2", "STN10"]);
    }

    #[test]
    fn natural_cmp_cases() {
        assert_eq!(natural_cmp("a2", "a10"), Ordering::Less);
        assert_eq!(natural_cmp("A2", "a2"), Ordering::Equal);
        assert_eq!(natural_cmp("007", "7"), Ordering::Equal);
        assert_eq!(natural_cmp("10", "9b"), Ordering::Greater);
        assert_eq!(natural_cmp("", "1"), Ordering::Less);
        assert_eq!(natural_cmp("x", "1"), Ordering::Greater);
    }

    #[test]
    fn sort_is_stable() {
        let t = table(&[("P01", "first"), ("p1", "second"), ("P1", "third")]);
        let sorted = sort_naturally(&t, COL_PT);
        assert_eq!(ids(&sorted), vec!["P01", "p1", "P1"]);
    }

    #[test]
    fn groups_keep_first_appearance_and_drop_singletons() {
        let t = table(&[
            ("1", "FENCE"),
            ("2", "ROAD"),
            ("3", "FENCE"),
            ("4", "TREE"),
            ("5", "ROAD"),
            ("6", ""),
            ("7", ""),
        ]);
        let groups = group_rows(&t, GroupLogic::Code, None, COL_PT, true);
        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["FENCE", "ROAD"]);
        assert_eq!(ids(&groups[1].table), vec!["2", "5"]);
    }

    #[test]
    fn sequential_keeps_source_order() {
        let t = table(&[("3", "A"), ("1", "B")]);
        let groups = group_rows(&t, GroupLogic::Sequential, None, COL_PT, true);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, SEQUENTIAL_GROUP);
        assert_eq!(ids(&groups[0].table), vec!["3", "1"]);
    }

    #[test]
    fn missing_custom_column_falls_back_to_sequential() {
        let t = table(&[("1", "A"), ("2", "A")]);
        let groups = group_rows(&t, GroupLogic::Custom, Some("Layer"), COL_PT, true);
        assert_eq!(groups[0].key, SEQUENTIAL_GROUP);
        let groups = group_rows(&t, GroupLogic::Custom, None, COL_PT, true);
        assert_eq!(groups[0].key, SEQUENTIAL_GROUP);
    }

    #[test]
    fn missing_sort_column_disables_sorting() {
        let t = table(&[("B2", "A"), ("B1", "A")]);
        let groups = group_rows(&t, GroupLogic::Code, None, "Station", true);
        assert_eq!(ids(&groups[0].table), vec!["B2", "B1"]);
    }

    #[test]
    fn empty_table_has_no_groups() {
        let t = table(&[]);
        assert!(group_rows(&t, GroupLogic::Sequential, None, COL_PT, true).is_empty());
    }

    #[test]
    fn logic_names_parse() {
        assert_eq!("by_pt".parse::<GroupLogic>().unwrap(), GroupLogic::ByPt);
        assert_eq!("Code".parse::<GroupLogic>().unwrap(), GroupLogic::Code);
        assert!("zigzag".parse::<GroupLogic>().is_err());
    }
}
