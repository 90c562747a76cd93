use std::collections::HashMap;
use std::sync::LazyLock;

use tracing::{debug, warn};

use crate::error::{ParseWarning, WarningKind};
use crate::model::{
    canonical_default, is_coordinate_column, Cell, PointTable, RawTable, CANONICAL_COLUMNS,
    COL_CODE, COL_DESC, COL_E, COL_N, COL_PT, COL_Z,
};
use crate::parsing::values::{coerce_number, coerce_text, Coerced};
use crate::settings::ColumnOrder;

/// Recognized header spellings for each canonical column.
pub const COLUMN_ALIASES: [(&str, &[&str]); 6] = [
    (
        COL_PT,
        &[
            "PT", "POINT", "P", "POINTNUMBER", "PN", "STN", "NAME", "ID", "POINT_ID", "POINT_NO",
            "NUMBER", "رقم النقطة", "الرقم",
        ],
    ),
    (
        COL_E,
        &[
            "E", "EAST", "EASTING", "X", "COORDX", "XCOORD", "X_COORD", "LON", "LONGITUDE",
            "خط الطول", "شرق", "س",
        ],
    ),
    (
        COL_N,
        &[
            "N", "NORTH", "NORTHING", "Y", "COORDY", "YCOORD", "Y_COORD", "LAT", "LATITUDE",
            "خط العرض", "شمال", "ص",
        ],
    ),
    (
        COL_Z,
        &[
            "Z", "ELEV", "EL", "ELEVATION", "H", "HEIGHT", "COORDZ", "ZCOORD", "ALT", "ALTITUDE",
            "Z_COORD", "RL", "منسوب", "ع",
        ],
    ),
    (
        COL_CODE,
        &[
            "CODE", "CD", "COD", "CODES", "FEATURE", "LAYER", "STYLE", "TYPE", "MARKER", "LINEID",
            "LINE_ID", "GROUP", "كود", "الرمز",
        ],
    ),
    (
        COL_DESC,
        &[
            "DESCRIPTION", "DESC", "D", "TEXT", "NOTE", "LABEL", "INFO", "COMMENT", "REMARK",
            "وصف", "البيان", "ملاحظات",
        ],
    ),
];

static ALIASES: LazyLock<HashMap<String, &'static str>> = LazyLock::new(|| {
    let mut m = HashMap::new();
    for (canonical, aliases) in COLUMN_ALIASES {
        for alias in aliases {
            m.entry(alias.to_lowercase()).or_insert(canonical);
        }
    }
    m
});

/// Canonical column for a header spelling, matched case-insensitively.
pub fn canonical_name(header: &str) -> Option<&'static str> {
    ALIASES.get(&header.trim().to_lowercase()).copied()
}

/// True if `header` is any known alias of any canonical column.
pub fn is_known_alias(header: &str) -> bool {
    canonical_name(header).is_some()
}

/// Canonical table plus an account of repaired values.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub table: PointTable,
    /// Coordinate values that were present but unparsable and replaced by 0.0.
    pub coerced_fields: usize,
    pub warnings: Vec<ParseWarning>,
}

/// Map a reader's table onto the canonical columns.
///
/// Headerless tables match by position against the explicit order (or the
/// six canonical names). Tables with headers are alias-mapped first. In every
/// mode the six canonical columns exist afterwards, source columns that were
/// not requested are appended under their own names, and coordinate columns
/// hold numbers while PT/Code/Description hold text.
pub fn normalize(raw: RawTable, order: &ColumnOrder) -> Normalized {
    let width = raw.width();
    let header = raw.header.as_ref().map(|h| source_names(h, width));
    let placement = match (&header, order) {
        (None, _) => place_positional(width, order),
        (Some(names), ColumnOrder::Auto) => place_auto(names),
        (Some(names), ColumnOrder::Explicit(requested)) => place_explicit(names, requested),
    };

    let mut columns: Vec<Vec<Cell>> = (0..width).map(|_| Vec::with_capacity(raw.rows.len())).collect();
    for mut row in raw.rows.iter().cloned() {
        row.resize(width, Cell::Null);
        for (col, cell) in columns.iter_mut().zip(row) {
            col.push(cell);
        }
    }

    let row_count = raw.rows.len();
    let mut names = Vec::with_capacity(placement.len());
    let mut data: Vec<Vec<Cell>> = Vec::with_capacity(placement.len());
    for (name, source) in placement {
        let values = match source {
            Some(i) => std::mem::take(&mut columns[i]),
            None => vec![canonical_default(&name); row_count],
        };
        names.push(name);
        data.push(values);
    }

    let mut coerced_fields = 0;
    let mut warnings = Vec::new();
    for (name, values) in names.iter().zip(data.iter_mut()) {
        if is_coordinate_column(name) {
            let mut invalid = 0;
            for cell in values.iter_mut() {
                let coerced = coerce_number(cell);
                if coerced == Coerced::Invalid {
                    invalid += 1;
                }
                *cell = Cell::Number(coerced.value());
            }
            if invalid > 0 {
                warn!(column = %name, count = invalid, "unparsable coordinate values replaced with 0.0");
                warnings.push(ParseWarning::new(
                    WarningKind::FieldCoerced,
                    format!("{invalid} value(s) in column '{name}' could not be parsed and were set to 0.0"),
                ));
                coerced_fields += invalid;
            }
        } else if matches!(name.as_str(), COL_PT | COL_CODE | COL_DESC) {
            for cell in values.iter_mut() {
                *cell = Cell::Text(coerce_text(cell));
            }
        }
    }

    let rows = (0..row_count)
        .map(|r| data.iter_mut().map(|col| std::mem::take(&mut col[r])).collect())
        .collect();

    debug!(columns = ?names, rows = row_count, "normalized table");
    Normalized {
        table: PointTable {
            columns: names,
            rows,
        },
        coerced_fields,
        warnings,
    }
}

/// Re-normalize an already typed table in auto mode.
pub fn normalize_table(table: PointTable) -> PointTable {
    normalize(table.into(), &ColumnOrder::Auto).table
}

/// Header names padded to the table width; blank names get a positional name.
fn source_names(header: &[String], width: usize) -> Vec<String> {
    (0..width)
        .map(|i| match header.get(i).map(|h| h.trim()) {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => positional_name(i),
        })
        .collect()
}

fn positional_name(i: usize) -> String {
    format!("Column{}", i + 1)
}

/// Requested names resolve through the alias map so "E" and "Easting" agree.
fn resolve_requested(name: &str) -> String {
    canonical_name(name)
        .map(str::to_string)
        .unwrap_or_else(|| name.trim().to_string())
}

type Placement = Vec<(String, Option<usize>)>;

fn place_positional(width: usize, order: &ColumnOrder) -> Placement {
    let requested: Vec<String> = match order {
        ColumnOrder::Explicit(names) => names.iter().map(|n| resolve_requested(n)).collect(),
        ColumnOrder::Auto => CANONICAL_COLUMNS.iter().map(|s| s.to_string()).collect(),
    };
    let mut placement = Placement::new();
    for (i, name) in requested.iter().enumerate() {
        push_unique(&mut placement, name, (i < width).then_some(i));
    }
    for i in requested.len()..width {
        push_unique(&mut placement, &positional_name(i), Some(i));
    }
    backfill_canonical(&mut placement);
    placement
}

fn place_auto(names: &[String]) -> Placement {
    let mapped: Vec<Option<&str>> = names.iter().map(|n| canonical_name(n)).collect();
    let mut consumed = vec![false; names.len()];
    let mut placement = Placement::new();

    for canonical in CANONICAL_COLUMNS {
        let source = (0..names.len()).find(|&i| !consumed[i] && mapped[i] == Some(canonical));
        if let Some(i) = source {
            consumed[i] = true;
        }
        // Canonical columns without source data keep their slot so repeated runs agree.
        placement.push((canonical.to_string(), source));
    }
    for (i, name) in names.iter().enumerate() {
        if !consumed[i] {
            push_unique(&mut placement, name, Some(i));
        }
    }
    placement
}

fn place_explicit(names: &[String], requested: &[String]) -> Placement {
    let mapped: Vec<Option<&str>> = names.iter().map(|n| canonical_name(n)).collect();
    let mut consumed = vec![false; names.len()];
    let mut placement = Placement::new();

    for req in requested {
        let canonical = canonical_name(req);
        let mut source = canonical.and_then(|c| {
            (0..names.len()).find(|&i| !consumed[i] && mapped[i] == Some(c))
        });
        if source.is_none() {
            let wanted = req.trim().to_lowercase();
            source = (0..names.len()).find(|&i| !consumed[i] && names[i].to_lowercase() == wanted);
        }
        if let Some(i) = source {
            consumed[i] = true;
        }
        push_unique(&mut placement, &resolve_requested(req), source);
    }
    for (i, name) in names.iter().enumerate() {
        if !consumed[i] {
            push_unique(&mut placement, name, Some(i));
        }
    }
    backfill_canonical(&mut placement);
    placement
}

fn backfill_canonical(placement: &mut Placement) {
    for canonical in CANONICAL_COLUMNS {
        if !placement.iter().any(|(n, _)| n == canonical) {
            placement.push((canonical.to_string(), None));
        }
    }
}

fn push_unique(placement: &mut Placement, name: &str, source: Option<usize>) {
    let taken = |candidate: &str| placement.iter().any(|(n, _)| n == candidate);
    let mut unique = name.to_string();
    let mut n = 2;
    while taken(&unique) {
        unique = format!("{name}_{n}");
        n += 1;
    }
    placement.push((unique, source));
}
