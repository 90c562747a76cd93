//! Coordinate transformation stage.
//!
//! The generic path converts planar coordinates to geodetic ones on the
//! source datum, shifts them with the best datum operation for the data's
//! area and projects them into the target system. The UTM 36N to Red Belt
//! pair may use a hand-tuned pipeline instead, guarded by a self-check
//! against the generic path.

pub mod detect;
pub mod egypt;
pub mod geodesy;
pub mod grid;
pub mod operations;
pub mod registry;

use tracing::{debug, info, warn};

use crate::error::{ParseWarning, PointError};
use crate::model::{Cell, PointTable, COL_E, COL_N};
use crate::settings::TransformOptions;

pub use detect::detect_crs;
pub use egypt::{belt_by_longitude, infer_belt, Belt};
pub use registry::{parse_crs, Crs, Datum};

use egypt::{is_custom_pair, RedBeltPipeline, RED_BELT_OFFSET};
use geodesy::Projector;
use operations::{builtin_operations, select_operation, GeoBox, SelectedOperation};

/// Median deviation, in target units, above which the custom pipeline is rejected.
pub const CUSTOM_PIPELINE_MAX_DEVIATION: f64 = 3.0;
/// Points compared between the custom and generic paths.
pub const SELF_CHECK_SAMPLE_SIZE: usize = 50;
/// Fewer sample points than this skip the self-check.
pub const SELF_CHECK_MIN_POINTS: usize = 3;
/// Points used to compute the area of interest.
pub const AOI_SAMPLE_SIZE: usize = 200;

/// Which path produced the transformed coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformPath {
    /// Source and target are the same system.
    Identity,
    /// Geodetic path, with the datum operation name when datums differ.
    Generic { operation: Option<String> },
    /// Hand-tuned Red Belt pipeline plus the empirical offset.
    Custom { median_deviation: Option<f64> },
}

#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub table: PointTable,
    pub path: TransformPath,
    /// Rows whose coordinates were transformed.
    pub transformed: usize,
    pub warnings: Vec<ParseWarning>,
    /// Columns holding the results when writing to new columns.
    pub columns: Option<(String, String)>,
}

/// `(row, x, y)` for every row with numeric Easting and Northing, swapped when `flip` is set.
pub(crate) fn valid_coordinates(table: &PointTable, flip: bool) -> Vec<(usize, f64, f64)> {
    (0..table.len())
        .filter_map(|row| {
            let e = table.number(row, COL_E)?;
            let n = table.number(row, COL_N)?;
            Some(if flip { (row, n, e) } else { (row, e, n) })
        })
        .collect()
}

/// Median of sorted values; the mean of the middle pair for even counts.
pub(crate) fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Planar-to-planar conversion through geodetic coordinates.
struct GenericPath {
    source: Projector,
    target: Projector,
    shift: Option<SelectedOperation>,
}

impl GenericPath {
    fn build(
        source: &Crs,
        target: &Crs,
        aoi: Option<&GeoBox>,
        opts: &TransformOptions,
    ) -> Result<(GenericPath, Vec<ParseWarning>), PointError> {
        let (shift, warnings) = if source.datum == target.datum {
            (None, Vec::new())
        } else {
            let mut catalog = builtin_operations();
            catalog.extend(opts.extra_operations.iter().cloned());
            let dirs = grid::search_dirs(&opts.grid_dirs);
            let (op, warnings) = select_operation(&catalog, source.datum, target.datum, aoi, &dirs)?;
            (Some(op), warnings)
        };
        Ok((
            GenericPath {
                source: source.projector()?,
                target: target.projector()?,
                shift,
            },
            warnings,
        ))
    }

    fn apply(&self, x: f64, y: f64) -> Result<(f64, f64), PointError> {
        let (lon, lat) = self.source.to_geodetic(x, y)?;
        let (lon, lat) = match &self.shift {
            Some(op) => op
                .apply(lon, lat)
                .ok_or_else(|| PointError::InvalidCrs(format!("'{}' does not cover the point", op.name)))?,
            None => (lon, lat),
        };
        self.target.from_geodetic(lon, lat)
    }
}

/// Convert planar points of `source` to WGS 84 degrees; failed points are `None`.
pub(crate) fn to_wgs84(source: &Crs, points: &[(f64, f64)]) -> Result<Vec<Option<(f64, f64)>>, PointError> {
    let wgs84 = registry::lookup(registry::EPSG_WGS84)
        .ok_or_else(|| PointError::InvalidCrs("WGS 84 is not registered".into()))?;
    let (path, _) = GenericPath::build(source, &wgs84, None, &TransformOptions::default())?;
    Ok(points.iter().map(|&(x, y)| path.apply(x, y).ok()).collect())
}

/// Geographic extent of the first sampled points, on the source datum.
fn area_of_interest(source: &Crs, points: &[(usize, f64, f64)]) -> Option<GeoBox> {
    let projector = source.projector().ok()?;
    GeoBox::around(
        points
            .iter()
            .take(AOI_SAMPLE_SIZE)
            .filter_map(|&(_, x, y)| projector.to_geodetic(x, y).ok()),
    )
}

/// Median distance between the custom and generic results on a sample, or
/// `None` when no sample point could be compared.
fn self_check(pipeline: &RedBeltPipeline, generic: &GenericPath, sample: &[(f64, f64)]) -> Option<f64> {
    let mut diffs: Vec<f64> = sample
        .iter()
        .filter_map(|&(x, y)| {
            let (cx, cy) = pipeline.apply(x, y).ok()?;
            let (gx, gy) = generic.apply(x, y).ok()?;
            Some((cx - gx).hypot(cy - gy))
        })
        .collect();
    if diffs.is_empty() {
        return None;
    }
    diffs.sort_by(f64::total_cmp);
    Some(median(&diffs))
}

/// Default names of the result columns for a target system.
pub fn new_column_names(target: &Crs) -> (String, String) {
    if target.epsg == registry::EPSG_WGS84 {
        ("Longitude".into(), "Latitude".into())
    } else {
        (
            format!("Easting_EPSG_{}", target.epsg),
            format!("Northing_EPSG_{}", target.epsg),
        )
    }
}

/// Transform the Easting/Northing of every row from `source` to `target`.
///
/// Rows without numeric coordinates, or whose coordinates cannot be
/// transformed, are kept unchanged in place and get `Null` in new columns.
pub fn transform(
    table: &PointTable,
    source: &str,
    target: &str,
    opts: &TransformOptions,
) -> Result<TransformOutcome, PointError> {
    let src = parse_crs(source)?;
    let dst = parse_crs(target)?;
    let valid = valid_coordinates(table, opts.flip_en);
    info!(source = %src, target = %dst, rows = table.len(), valid = valid.len(), "transforming coordinates");

    let mut warnings = Vec::new();
    let mut path = TransformPath::Identity;
    let mut results: Vec<Option<(f64, f64)>> = vec![None; table.len()];

    if src.epsg == dst.epsg {
        for &(row, x, y) in &valid {
            results[row] = Some((x, y));
        }
    } else {
        let aoi = area_of_interest(&src, &valid);
        debug!(?aoi, "area of interest");
        let (generic, op_warnings) = GenericPath::build(&src, &dst, aoi.as_ref(), opts)?;
        warnings.extend(op_warnings);
        let operation = generic.shift.as_ref().map(|op| op.name.clone());

        let custom = if opts.use_custom && is_custom_pair(&src, &dst) {
            info!("custom UTM 36N to Red Belt pipeline requested");
            choose_custom(&generic, &valid, opts.deviation_threshold)
        } else {
            None
        };

        match custom {
            Some((pipeline, median_deviation)) => {
                info!(
                    offset_e = RED_BELT_OFFSET.0,
                    offset_n = RED_BELT_OFFSET.1,
                    "applying custom Red Belt pipeline with empirical offset"
                );
                for &(row, x, y) in &valid {
                    results[row] = pipeline
                        .apply(x, y)
                        .ok()
                        .map(|(tx, ty)| (tx + RED_BELT_OFFSET.0, ty + RED_BELT_OFFSET.1));
                }
                path = TransformPath::Custom { median_deviation };
            }
            None => {
                for &(row, x, y) in &valid {
                    results[row] = generic.apply(x, y).ok();
                }
                path = TransformPath::Generic { operation };
            }
        }
    }

    let transformed = results.iter().filter(|r| r.is_some()).count();
    if transformed < valid.len() {
        warn!(failed = valid.len() - transformed, "some points could not be transformed and were left unchanged");
    }

    let mut out = table.clone();
    let columns = if opts.new_columns {
        let (default_e, default_n) = new_column_names(&dst);
        let e_name = opts.new_easting_column.clone().unwrap_or(default_e);
        let n_name = opts.new_northing_column.clone().unwrap_or(default_n);
        let (es, ns): (Vec<Cell>, Vec<Cell>) = results
            .iter()
            .map(|r| match r {
                Some((x, y)) => (Cell::Number(*x), Cell::Number(*y)),
                None => (Cell::Null, Cell::Null),
            })
            .unzip();
        out.set_column(&e_name, es);
        out.set_column(&n_name, ns);
        info!(transformed, rows = table.len(), easting = %e_name, northing = %n_name, "transformed into new columns");
        Some((e_name, n_name))
    } else {
        if let (Some(ei), Some(ni)) = (out.column_index(COL_E), out.column_index(COL_N)) {
            for (row, result) in results.iter().enumerate() {
                if let Some((x, y)) = result {
                    out.rows[row][ei] = Cell::Number(*x);
                    out.rows[row][ni] = Cell::Number(*y);
                }
            }
        }
        info!(transformed, rows = table.len(), "transformed in place");
        None
    };

    Ok(TransformOutcome {
        table: out,
        path,
        transformed,
        warnings,
        columns,
    })
}

/// Build the custom pipeline and validate it against the generic path.
fn choose_custom(
    generic: &GenericPath,
    valid: &[(usize, f64, f64)],
    threshold: f64,
) -> Option<(RedBeltPipeline, Option<f64>)> {
    let pipeline = match RedBeltPipeline::new() {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "custom pipeline unavailable, using generic path");
            return None;
        }
    };
    let sample: Vec<(f64, f64)> = valid
        .iter()
        .take(SELF_CHECK_SAMPLE_SIZE)
        .map(|&(_, x, y)| (x, y))
        .collect();
    if sample.len() < SELF_CHECK_MIN_POINTS {
        debug!(points = sample.len(), "too few points for the custom pipeline self-check");
        return Some((pipeline, None));
    }
    match self_check(&pipeline, generic, &sample) {
        Some(median) if median > threshold => {
            warn!(median, threshold, "custom pipeline deviates from the generic path, using generic path");
            None
        }
        Some(median) => {
            debug!(median, "custom pipeline self-check passed");
            Some((pipeline, Some(median)))
        }
        None => {
            warn!("custom pipeline self-check failed, using generic path");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{COL_PT, COL_Z};

    fn table(points: &[(Cell, Cell)]) -> PointTable {
        PointTable {
            columns: vec![COL_PT.into(), COL_E.into(), COL_N.into(), COL_Z.into()],
            rows: points
                .iter()
                .enumerate()
                .map(|(i, (e, n))| vec![Cell::text(i.to_string()), e.clone(), n.clone(), Cell::Number(1.0)])
                .collect(),
        }
    }

    fn numbers(points: &[(f64, f64)]) -> PointTable {
        let cells: Vec<(Cell, Cell)> = points
            .iter()
            .map(|(e, n)| (Cell::Number(*e), Cell::Number(*n)))
            .collect();
        table(&cells)
    }

    fn utm36_sample() -> PointTable {
        numbers(&[
            (330_000.0, 3_320_000.0),
            (331_000.0, 3_321_000.0),
            (332_500.0, 3_322_000.0),
            (329_000.0, 3_318_500.0),
        ])
    }

    #[test]
    fn geographic_to_utm() {
        let t = numbers(&[(33.0, 0.0)]);
        let out = transform(&t, "EPSG:4326", "EPSG:32636", &TransformOptions::default()).unwrap();
        assert!((out.table.number(0, COL_E).unwrap() - 500_000.0).abs() < 1e-3);
        assert!(out.table.number(0, COL_N).unwrap().abs() < 1e-3);
        assert_eq!(out.path, TransformPath::Generic { operation: None });
        assert_eq!(out.table.number(0, COL_Z), Some(1.0));
    }

    #[test]
    fn belt_origin_on_its_own_datum() {
        let t = numbers(&[(31.0, 30.0)]);
        let out = transform(&t, "EPSG:4229", "Egypt Red Belt", &TransformOptions::default()).unwrap();
        assert!((out.table.number(0, COL_E).unwrap() - 615_000.0).abs() < 1e-3);
        assert!((out.table.number(0, COL_N).unwrap() - 810_000.0).abs() < 1e-3);
    }

    #[test]
    fn round_trip_through_utm() {
        let t = numbers(&[(31.2357, 30.0444), (32.5, 29.9)]);
        let opts = TransformOptions::default();
        let utm = transform(&t, "4326", "UTM 36N", &opts).unwrap();
        let back = transform(&utm.table, "EPSG:32636", "EPSG:4326", &opts).unwrap();
        for row in 0..2 {
            let (e0, n0) = (t.number(row, COL_E).unwrap(), t.number(row, COL_N).unwrap());
            assert!((back.table.number(row, COL_E).unwrap() - e0).abs() < 1e-8);
            assert!((back.table.number(row, COL_N).unwrap() - n0).abs() < 1e-8);
        }
    }

    #[test]
    fn datum_shift_moves_points() {
        let t = numbers(&[(31.0, 30.0)]);
        let out = transform(&t, "EPSG:4229", "EPSG:4326", &TransformOptions::default()).unwrap();
        let lon = out.table.number(0, COL_E).unwrap();
        let lat = out.table.number(0, COL_N).unwrap();
        assert!((lon - 31.0).abs() > 1e-5 && (lon - 31.0).abs() < 0.01);
        assert!((lat - 30.0).abs() > 1e-5 && (lat - 30.0).abs() < 0.01);
        assert!(matches!(out.path, TransformPath::Generic { operation: Some(_) }));
    }

    #[test]
    fn rejected_custom_pipeline_returns_generic_output() {
        let t = utm36_sample();
        let generic = transform(
            &t,
            "EPSG:32636",
            "EPSG:22992",
            &TransformOptions {
                use_custom: false,
                ..Default::default()
            },
        )
        .unwrap();
        let rejected = transform(
            &t,
            "EPSG:32636",
            "EPSG:22992",
            &TransformOptions {
                deviation_threshold: -1.0,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(matches!(rejected.path, TransformPath::Generic { .. }));
        assert_eq!(rejected.table, generic.table);
    }

    #[test]
    fn accepted_custom_pipeline_adds_offset() {
        let t = utm36_sample();
        let out = transform(
            &t,
            "UTM Zone 36 North",
            "Egypt Red Belt",
            &TransformOptions {
                deviation_threshold: f64::INFINITY,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(matches!(out.path, TransformPath::Custom { median_deviation: Some(_) }));

        let pipeline = RedBeltPipeline::new().unwrap();
        let (x, y) = pipeline.apply(330_000.0, 3_320_000.0).unwrap();
        assert!((out.table.number(0, COL_E).unwrap() - (x + 0.4344)).abs() < 1e-9);
        assert!((out.table.number(0, COL_N).unwrap() - (y - 0.4977)).abs() < 1e-9);
    }

    #[test]
    fn invalid_rows_are_kept_in_place() {
        let t = table(&[
            (Cell::Number(33.0), Cell::Number(0.0)),
            (Cell::text("n/a"), Cell::Number(1.0)),
            (Cell::Null, Cell::Null),
        ]);
        let out = transform(&t, "EPSG:4326", "EPSG:32636", &TransformOptions::default()).unwrap();
        assert_eq!(out.transformed, 1);
        assert_eq!(out.table.rows[1], t.rows[1]);
        assert_eq!(out.table.rows[2], t.rows[2]);
    }

    #[test]
    fn new_columns_hold_nulls_for_invalid_rows() {
        let t = table(&[
            (Cell::Number(500_000.0), Cell::Number(0.0)),
            (Cell::text("x"), Cell::Number(1.0)),
        ]);
        let opts = TransformOptions {
            new_columns: true,
            ..Default::default()
        };
        let out = transform(&t, "EPSG:32636", "EPSG:4326", &opts).unwrap();
        assert_eq!(out.columns, Some(("Longitude".into(), "Latitude".into())));
        assert!((out.table.number(0, "Longitude").unwrap() - 33.0).abs() < 1e-9);
        assert_eq!(out.table.cell(1, "Longitude"), Some(&Cell::Null));
        assert_eq!(out.table.number(0, COL_E), Some(500_000.0));

        let out = transform(&t, "EPSG:32636", "EPSG:22992", &opts).unwrap();
        assert!(out.table.has_column("Easting_EPSG_22992"));
        assert!(out.table.has_column("Northing_EPSG_22992"));
    }

    #[test]
    fn flip_swaps_inputs() {
        let t = numbers(&[(0.0, 33.0)]);
        let opts = TransformOptions {
            flip_en: true,
            ..Default::default()
        };
        let out = transform(&t, "EPSG:4326", "EPSG:32636", &opts).unwrap();
        assert!((out.table.number(0, COL_E).unwrap() - 500_000.0).abs() < 1e-3);
    }

    #[test]
    fn unknown_crs_is_invalid() {
        let t = numbers(&[(1.0, 2.0)]);
        let err = transform(&t, "EPSG:9999", "EPSG:4326", &TransformOptions::default()).unwrap_err();
        assert!(matches!(err, PointError::InvalidCrs(_)));
    }

    #[test]
    fn median_of_even_count_averages() {
        assert_eq!(median(&[1.0, 2.0, 4.0, 10.0]), 3.0);
        assert_eq!(median(&[5.0]), 5.0);
    }
}
