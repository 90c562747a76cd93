//! Source CRS auto-detection from table contents.

use tracing::{debug, info};

use crate::crs::valid_coordinates;
use crate::error::PointError;
use crate::model::{Cell, PointTable};
use crate::settings::UtmZone;

/// Fraction of values that must fall in a range for it to count, inclusive.
pub const DEGREE_LIKE_RATIO: f64 = 0.9;

pub const UTM_EASTING_RANGE: (f64, f64) = (100_000.0, 900_000.0);
pub const UTM_NORTHING_RANGE: (f64, f64) = (0.0, 10_000_000.0);

/// Columns that may name the CRS of a table explicitly.
pub const CRS_COLUMNS: [&str; 6] = ["CRS", "crs", "EPSG", "epsg", "SourceCRS", "source_crs"];

fn fraction_within(values: &[f64], (lo, hi): (f64, f64)) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|v| (lo..=hi).contains(*v)).count() as f64 / values.len() as f64
}

fn crs_column_hint(table: &PointTable) -> Option<String> {
    CRS_COLUMNS.iter().find_map(|name| {
        let column = table.column(name)?;
        let first = column.into_iter().find_map(|cell| match cell {
            Cell::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })?;
        Some(if first.to_uppercase().starts_with("EPSG:") {
            first
        } else {
            format!("EPSG:{first}")
        })
    })
}

/// Infer the source CRS identifier of a table.
///
/// An explicit CRS column wins. Otherwise values that look like degrees give
/// EPSG:4326, and values in UTM metre ranges give the UTM zone of `zone`
/// when a zone hint is supplied. Anything else is `CrsDetectionFailed`.
pub fn detect_crs(table: &PointTable, zone: Option<UtmZone>) -> Result<String, PointError> {
    if table.is_empty() {
        return Err(PointError::CrsDetectionFailed("the table is empty".into()));
    }
    if let Some(hint) = crs_column_hint(table) {
        info!(crs = %hint, "CRS taken from table column");
        return Ok(hint);
    }

    let valid = valid_coordinates(table, false);
    if valid.is_empty() {
        return Err(PointError::CrsDetectionFailed("no numeric coordinates".into()));
    }
    let eastings: Vec<f64> = valid.iter().map(|(_, e, _)| *e).collect();
    let northings: Vec<f64> = valid.iter().map(|(_, _, n)| *n).collect();

    let lon_like = fraction_within(&eastings, (-180.0, 180.0));
    let lat_like = fraction_within(&northings, (-90.0, 90.0));
    debug!(lon_like, lat_like, "degree-like fractions");
    if lon_like >= DEGREE_LIKE_RATIO && lat_like >= DEGREE_LIKE_RATIO {
        return Ok("EPSG:4326".into());
    }

    let e_like = fraction_within(&eastings, UTM_EASTING_RANGE);
    let n_like = fraction_within(&northings, UTM_NORTHING_RANGE);
    debug!(e_like, n_like, "UTM-like fractions");
    if e_like >= DEGREE_LIKE_RATIO && n_like >= DEGREE_LIKE_RATIO {
        match zone {
            Some(z) if (1..=60).contains(&z.number) => return Ok(format!("EPSG:{}", z.epsg())),
            Some(z) => {
                return Err(PointError::CrsDetectionFailed(format!(
                    "UTM zone {} is out of range",
                    z.number
                )))
            }
            None => {
                return Err(PointError::CrsDetectionFailed(
                    "values look like UTM metres but no zone was given".into(),
                ))
            }
        }
    }

    Err(PointError::CrsDetectionFailed(
        "coordinates match neither degrees nor UTM metres".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{COL_E, COL_N};

    fn table(points: &[(f64, f64)]) -> PointTable {
        PointTable {
            columns: vec![COL_E.into(), COL_N.into()],
            rows: points
                .iter()
                .map(|(e, n)| vec![Cell::Number(*e), Cell::Number(*n)])
                .collect(),
        }
    }

    #[test]
    fn degrees_are_geographic() {
        let t = table(&[(31.2, 30.0), (31.3, 30.1)]);
        assert_eq!(detect_crs(&t, None).unwrap(), "EPSG:4326");
    }

    #[test]
    fn utm_needs_a_zone() {
        let t = table(&[(500_000.0, 3_320_000.0), (501_000.0, 3_321_000.0)]);
        assert!(matches!(detect_crs(&t, None), Err(PointError::CrsDetectionFailed(_))));
        let north = UtmZone { number: 36, letter: 'R' };
        assert_eq!(detect_crs(&t, Some(north)).unwrap(), "EPSG:32636");
        let south = UtmZone { number: 36, letter: 'L' };
        assert_eq!(detect_crs(&t, Some(south)).unwrap(), "EPSG:32736");
        let band_s = UtmZone { number: 36, letter: 'S' };
        assert_eq!(detect_crs(&t, Some(band_s)).unwrap(), "EPSG:32636");
    }

    #[test]
    fn exactly_ninety_percent_degrees_is_geographic() {
        let mut points = vec![(31.0, 30.0); 9];
        points.push((500_000.0, 3_000_000.0));
        assert_eq!(detect_crs(&table(&points), None).unwrap(), "EPSG:4326");

        points.push((500_000.0, 3_000_000.0));
        assert!(detect_crs(&table(&points), None).is_err());
    }

    #[test]
    fn exactly_ninety_percent_metres_is_utm() {
        let mut points = vec![(500_000.0, 3_320_000.0); 9];
        points.push((50.0, 20_000_000.0));
        let zone = UtmZone { number: 36, letter: 'R' };
        assert_eq!(detect_crs(&table(&points), Some(zone)).unwrap(), "EPSG:32636");
    }

    #[test]
    fn mixed_values_fail() {
        let t = table(&[(615_000.0, 810_000.0), (31.0, 30.0), (5.0, 5_000_000_000.0)]);
        assert!(detect_crs(&t, Some(UtmZone::default())).is_err());
    }

    #[test]
    fn crs_column_wins() {
        let mut t = table(&[(31.2, 30.0)]);
        t.set_column("EPSG", vec![Cell::text("22992")]);
        assert_eq!(detect_crs(&t, None).unwrap(), "EPSG:22992");
        t.set_column("EPSG", vec![Cell::text("EPSG:32636")]);
        assert_eq!(detect_crs(&t, None).unwrap(), "EPSG:32636");
    }

    #[test]
    fn empty_table_fails() {
        assert!(detect_crs(&table(&[]), None).is_err());
    }
}
