//! Egyptian Transverse Mercator belts, the hand-tuned UTM 36N to Red Belt
//! pipeline and belt inference from raw coordinates.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::crs::geodesy::{DatumShift, Helmert, Projection, Projector, CLARKE_1880, WGS84};
use crate::crs::operations::EGYPT_BOX;
use crate::crs::registry::{Crs, Datum};
use crate::crs::{median, to_wgs84, valid_coordinates};
use crate::error::PointError;
use crate::model::PointTable;

/// Weight of the fraction of points landing inside Egypt.
pub const EGYPT_BOX_WEIGHT: f64 = 0.8;
/// Weight of the fraction of points landing on valid lon/lat.
pub const GLOBAL_BOUNDS_WEIGHT: f64 = 0.2;
/// Points projected per candidate belt.
pub const BELT_SAMPLE_SIZE: usize = 200;

/// WGS 84 to Egypt 1907 shift of the custom Red Belt pipeline.
pub const RED_BELT_HELMERT: Helmert = Helmert {
    tx: 127.535,
    ty: -113.495,
    tz: 12.7,
    rx: -1.603747,
    ry: 0.153612,
    rz: 5.364408,
    scale_ppm: -5.33745,
};

/// Empirical correction added after the custom pipeline, in metres.
pub const RED_BELT_OFFSET: (f64, f64) = (0.4344, -0.4977);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Belt {
    Blue,
    Red,
    Purple,
    ExtendedPurple,
}

impl Belt {
    pub fn epsg(&self) -> u32 {
        match self {
            Belt::Blue => 22991,
            Belt::Red => 22992,
            Belt::Purple => 22993,
            Belt::ExtendedPurple => 22994,
        }
    }

    pub fn from_epsg(epsg: u32) -> Option<Belt> {
        [Belt::Blue, Belt::Red, Belt::Purple, Belt::ExtendedPurple]
            .into_iter()
            .find(|b| b.epsg() == epsg)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Belt::Blue => "Blue Belt",
            Belt::Red => "Red Belt",
            Belt::Purple => "Purple Belt",
            Belt::ExtendedPurple => "Extended Purple Belt",
        }
    }

    pub fn projection(&self) -> Projection {
        let (lon0, x0, y0) = match self {
            Belt::Blue => (35.0, 300_000.0, 1_100_000.0),
            Belt::Red => (31.0, 615_000.0, 810_000.0),
            Belt::Purple => (27.0, 700_000.0, 200_000.0),
            Belt::ExtendedPurple => (27.0, 700_000.0, 1_200_000.0),
        };
        Projection::TransverseMercator {
            lat0: 30.0,
            lon0,
            k0: 1.0,
            x0,
            y0,
        }
    }

    pub fn crs(self) -> Crs {
        Crs {
            epsg: self.epsg(),
            name: format!("Egypt 1907 / {}", self.name()),
            datum: Datum::Egypt1907,
            projection: self.projection(),
        }
    }
}

impl fmt::Display for Belt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (EPSG:{})", self.name(), self.epsg())
    }
}

/// The UTM 36N to Red Belt pair that gets the custom pipeline.
pub fn is_custom_pair(source: &Crs, target: &Crs) -> bool {
    source.epsg == 32636 && target.epsg == Belt::Red.epsg()
}

/// UTM 36N (WGS 84) to Red Belt through a fixed Helmert shift onto Clarke 1880.
///
/// The empirical offset is not included.
pub struct RedBeltPipeline {
    utm: Projector,
    shift: DatumShift,
    belt: Projector,
}

impl RedBeltPipeline {
    pub fn new() -> Result<RedBeltPipeline, PointError> {
        Ok(RedBeltPipeline {
            utm: Projector::new(&Projection::utm(36, false), &WGS84)?,
            shift: DatumShift::new(&RED_BELT_HELMERT, &WGS84, &CLARKE_1880)?,
            belt: Projector::new(&Belt::Red.projection(), &CLARKE_1880)?,
        })
    }

    pub fn apply(&self, easting: f64, northing: f64) -> Result<(f64, f64), PointError> {
        let (lon, lat) = self.utm.to_geodetic(easting, northing)?;
        let (lon, lat) = self.shift.apply(lon, lat)?;
        self.belt.from_geodetic(lon, lat)
    }
}

fn belt_score(lonlat: &[Option<(f64, f64)>]) -> Option<(f64, f64)> {
    if lonlat.iter().all(Option::is_none) {
        return None;
    }
    let n = lonlat.len() as f64;
    let plausible = lonlat
        .iter()
        .flatten()
        .filter(|(lon, lat)| lon.abs() < 180.0 && lat.abs() < 90.0)
        .count() as f64;
    let in_egypt = lonlat
        .iter()
        .flatten()
        .filter(|(lon, lat)| EGYPT_BOX.contains(*lon, *lat))
        .count() as f64;
    let egypt_fraction = in_egypt / n;
    Some((
        egypt_fraction * EGYPT_BOX_WEIGHT + plausible / n * GLOBAL_BOUNDS_WEIGHT,
        egypt_fraction,
    ))
}

/// Guess the belt of raw Easting/Northing values by trying Red, Blue and
/// Purple as the source system and scoring where the points land.
///
/// Red wins ties and is the answer when nothing can be scored.
pub fn infer_belt(table: &PointTable) -> Belt {
    let sample: Vec<(f64, f64)> = valid_coordinates(table, false)
        .into_iter()
        .map(|(_, x, y)| (x, y))
        .take(BELT_SAMPLE_SIZE)
        .collect();
    if sample.is_empty() {
        return Belt::Red;
    }

    let mut best = (Belt::Red, -1.0);
    for belt in [Belt::Red, Belt::Blue, Belt::Purple] {
        let lonlat = match to_wgs84(&belt.crs(), &sample) {
            Ok(points) => points,
            Err(e) => {
                debug!(belt = %belt, error = %e, "belt candidate failed");
                continue;
            }
        };
        let Some((score, egypt_fraction)) = belt_score(&lonlat) else {
            continue;
        };
        debug!(belt = %belt, score, egypt_fraction, "belt candidate score");
        if score > best.1 {
            best = (belt, score);
        }
    }
    info!(belt = %best.0, score = best.1, "inferred Egypt belt");
    best.0
}

/// Belt whose longitude range holds the median WGS 84 longitude of the data.
pub fn belt_by_longitude(table: &PointTable, source: &Crs) -> Belt {
    let sample: Vec<(f64, f64)> = valid_coordinates(table, false)
        .into_iter()
        .map(|(_, x, y)| (x, y))
        .take(BELT_SAMPLE_SIZE)
        .collect();
    let lonlat = match to_wgs84(source, &sample) {
        Ok(points) => points,
        Err(e) => {
            debug!(error = %e, "belt detection failed, using Red Belt");
            return Belt::Red;
        }
    };
    let mut lons: Vec<f64> = lonlat.into_iter().flatten().map(|(lon, _)| lon).collect();
    if lons.is_empty() {
        return Belt::Red;
    }
    lons.sort_by(f64::total_cmp);
    match median(&lons) {
        m if (25.0..29.0).contains(&m) => Belt::Purple,
        m if (33.0..37.0).contains(&m) => Belt::Blue,
        _ => Belt::Red,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cell, COL_E, COL_N, COL_PT};

    fn table(points: &[(f64, f64)]) -> PointTable {
        PointTable {
            columns: vec![COL_PT.into(), COL_E.into(), COL_N.into()],
            rows: points
                .iter()
                .enumerate()
                .map(|(i, (e, n))| vec![Cell::text(i.to_string()), Cell::Number(*e), Cell::Number(*n)])
                .collect(),
        }
    }

    #[test]
    fn belt_codes() {
        assert_eq!(Belt::from_epsg(22993), Some(Belt::Purple));
        assert_eq!(Belt::from_epsg(4326), None);
        assert_eq!(Belt::Red.crs().name, "Egypt 1907 / Red Belt");
    }

    #[test]
    fn red_belt_origin_is_inferred_as_red() {
        let t = table(&[(615_000.0, 810_000.0), (616_000.0, 811_000.0)]);
        assert_eq!(infer_belt(&t), Belt::Red);
    }

    #[test]
    fn blue_belt_points_are_inferred_as_blue() {
        // about 34E 31.5N; read as Red or Purple the points land north of Egypt
        let t = table(&[(205_100.0, 1_266_400.0), (205_500.0, 1_266_000.0)]);
        assert_eq!(infer_belt(&t), Belt::Blue);
    }

    #[test]
    fn empty_data_defaults_to_red() {
        assert_eq!(infer_belt(&table(&[])), Belt::Red);
    }

    #[test]
    fn longitude_selects_belt() {
        let utm35 = crate::crs::registry::utm(35, false).unwrap();
        // 27E is the central meridian of zone 35
        let t = table(&[(500_000.0, 3_320_000.0)]);
        assert_eq!(belt_by_longitude(&t, &utm35), Belt::Purple);
        let utm36 = crate::crs::registry::utm(36, false).unwrap();
        let t = table(&[(700_000.0, 3_320_000.0)]);
        assert_eq!(belt_by_longitude(&t, &utm36), Belt::Blue);
    }

    #[test]
    fn custom_pipeline_lands_near_the_belt_origin() {
        let pipeline = RedBeltPipeline::new().unwrap();
        let utm = Projector::new(&Projection::utm(36, false), &WGS84).unwrap();
        let (e, n) = utm.from_geodetic(31.0, 30.0).unwrap();
        let (x, y) = pipeline.apply(e, n).unwrap();
        // datum shift moves the point by a few hundred metres at most
        assert!((x - 615_000.0).abs() < 500.0, "{x}");
        assert!((y - 810_000.0).abs() < 500.0, "{y}");
    }
}
