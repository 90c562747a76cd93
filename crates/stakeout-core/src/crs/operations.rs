//! Catalog of datum operations and the selection of the best one for an area.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::crs::geodesy::{DatumShift, Helmert};
use crate::crs::grid::{find_grid, ShiftGrid};
use crate::crs::registry::Datum;
use crate::error::{ParseWarning, PointError, WarningKind};

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Rough extent of Egypt.
pub const EGYPT_BOX: GeoBox = GeoBox {
    west: 24.0,
    south: 21.0,
    east: 37.5,
    north: 32.7,
};

impl GeoBox {
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        (self.west..=self.east).contains(&lon) && (self.south..=self.north).contains(&lat)
    }

    pub fn covers(&self, other: &GeoBox) -> bool {
        self.contains(other.west, other.south) && self.contains(other.east, other.north)
    }

    /// Bounding box of finite `(lon, lat)` pairs.
    pub fn around(points: impl IntoIterator<Item = (f64, f64)>) -> Option<GeoBox> {
        points
            .into_iter()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .fold(None, |acc: Option<GeoBox>, (x, y)| {
                Some(match acc {
                    None => GeoBox {
                        west: x,
                        south: y,
                        east: x,
                        north: y,
                    },
                    Some(b) => GeoBox {
                        west: b.west.min(x),
                        south: b.south.min(y),
                        east: b.east.max(x),
                        north: b.north.max(y),
                    },
                })
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationMethod {
    Helmert(Helmert),
    /// NTv2 grid shift; `file` is a name searched in the grid directories or an absolute path.
    Grid { file: String },
}

/// A way to move geodetic coordinates between two datums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatumOperation {
    pub name: String,
    pub source: Datum,
    pub target: Datum,
    pub method: OperationMethod,
    /// Expected accuracy in metres; smaller is better.
    pub accuracy: f64,
    /// Area of use, unrestricted when absent.
    #[serde(default)]
    pub area: Option<GeoBox>,
}

/// Operations shipped with the library.
pub fn builtin_operations() -> Vec<DatumOperation> {
    vec![
        DatumOperation {
            name: "Egypt 1907 to WGS 84 (3-parameter)".into(),
            source: Datum::Egypt1907,
            target: Datum::Wgs84,
            method: OperationMethod::Helmert(Helmert::translation(-130.0, 110.0, -13.0)),
            accuracy: 6.0,
            area: Some(EGYPT_BOX),
        },
        DatumOperation {
            name: "Egypt 1907 to WGS 84 (7-parameter)".into(),
            source: Datum::Egypt1907,
            target: Datum::Wgs84,
            method: OperationMethod::Helmert(crate::crs::egypt::RED_BELT_HELMERT.inverse()),
            accuracy: 3.0,
            area: Some(EGYPT_BOX),
        },
    ]
}

enum Shift {
    Helmert(DatumShift),
    Grid(Box<ShiftGrid>),
}

/// A datum operation ready to apply in one direction.
pub struct SelectedOperation {
    pub name: String,
    shift: Shift,
    reverse: bool,
}

impl SelectedOperation {
    /// Shift `(lon, lat)` degrees from the source datum to the target datum.
    pub fn apply(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        match &self.shift {
            Shift::Helmert(shift) => shift
                .apply(lon, lat)
                .map_err(|e| debug!(operation = %self.name, error = %e, "datum shift failed"))
                .ok(),
            Shift::Grid(g) if self.reverse => g.inverse(lon, lat),
            Shift::Grid(g) => g.forward(lon, lat),
        }
    }
}

struct Candidate<'a> {
    op: &'a DatumOperation,
    reverse: bool,
    grid: Option<Option<PathBuf>>,
    covers: bool,
}

impl Candidate<'_> {
    fn available(&self) -> bool {
        !matches!(self.grid, Some(None))
    }
}

/// Pick the operation from `from` to `to` with the best accuracy among those
/// usable for `aoi`.
///
/// Every candidate is logged. Operations whose grid file is missing are
/// reported as warnings and only chosen when nothing else applies, which
/// then fails because they cannot be applied.
pub fn select_operation(
    catalog: &[DatumOperation],
    from: Datum,
    to: Datum,
    aoi: Option<&GeoBox>,
    grid_dirs: &[PathBuf],
) -> Result<(SelectedOperation, Vec<ParseWarning>), PointError> {
    let mut warnings = Vec::new();
    let mut candidates: Vec<Candidate<'_>> = catalog
        .iter()
        .filter_map(|op| {
            let reverse = if op.source == from && op.target == to {
                false
            } else if op.source == to && op.target == from {
                true
            } else {
                return None;
            };
            let grid = match &op.method {
                OperationMethod::Grid { file } => Some(find_grid(file, grid_dirs)),
                OperationMethod::Helmert(_) => None,
            };
            let covers = match (&op.area, aoi) {
                (Some(area), Some(aoi)) => area.covers(aoi),
                _ => true,
            };
            Some(Candidate {
                op,
                reverse,
                grid,
                covers,
            })
        })
        .collect();

    if candidates.is_empty() {
        return Err(PointError::InvalidCrs(format!(
            "no datum operation from {from} to {to}"
        )));
    }

    info!(from = %from, to = %to, count = candidates.len(), "available datum operations");
    for (i, c) in candidates.iter().enumerate() {
        info!(
            index = i + 1,
            operation = %c.op.name,
            accuracy = c.op.accuracy,
            covers_area = c.covers,
            reverse = c.reverse,
            "datum operation candidate"
        );
        if let (Some(None), OperationMethod::Grid { file }) = (&c.grid, &c.op.method) {
            warn!(operation = %c.op.name, grid = %file, "transformation grid missing, accuracy may be reduced");
            warnings.push(ParseWarning::new(
                WarningKind::MissingGrid,
                format!("grid '{file}' for '{}' is not installed", c.op.name),
            ));
        }
    }

    candidates.sort_by(|a, b| {
        b.available()
            .cmp(&a.available())
            .then(b.covers.cmp(&a.covers))
            .then(a.op.accuracy.total_cmp(&b.op.accuracy))
    });

    let best = &candidates[0];
    let shift = match (&best.op.method, &best.grid) {
        (OperationMethod::Helmert(h), _) => {
            let (source, target) = (best.op.source.ellipsoid(), best.op.target.ellipsoid());
            Shift::Helmert(if best.reverse {
                DatumShift::reversed(h, &source, &target)?
            } else {
                DatumShift::new(h, &source, &target)?
            })
        }
        (OperationMethod::Grid { .. }, Some(Some(path))) => Shift::Grid(Box::new(ShiftGrid::load(path)?)),
        (OperationMethod::Grid { file }, _) => {
            return Err(PointError::InvalidCrs(format!(
                "no usable datum operation from {from} to {to}: grid '{file}' is missing"
            )))
        }
    };
    info!(operation = %best.op.name, accuracy = best.op.accuracy, "selected datum operation");

    Ok((
        SelectedOperation {
            name: best.op.name.clone(),
            shift,
            reverse: best.reverse,
        },
        warnings,
    ))
}
