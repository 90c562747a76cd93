//! Ellipsoids, Helmert parameters and the proj4rs-backed projector and
//! datum shift used for every system.

use proj4rs::proj::Proj;
use serde::{Deserialize, Serialize};

use crate::error::PointError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    pub name: &'static str,
    pub a: f64,
    /// Inverse flattening.
    pub rf: f64,
}

pub const WGS84: Ellipsoid = Ellipsoid {
    name: "WGS 84",
    a: 6_378_137.0,
    rf: 298.257_223_563,
};

pub const HELMERT_1906: Ellipsoid = Ellipsoid {
    name: "Helmert 1906",
    a: 6_378_200.0,
    rf: 298.3,
};

pub const CLARKE_1880: Ellipsoid = Ellipsoid {
    name: "Clarke 1880 (RGS)",
    a: 6_378_249.145,
    rf: 293.4663,
};

impl Ellipsoid {
    fn proj_params(&self) -> String {
        format!("+a={} +rf={}", self.a, self.rf)
    }
}

/// Seven-parameter similarity transform, position vector convention.
///
/// Rotations are in arc-seconds and the scale in parts per million.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Helmert {
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub scale_ppm: f64,
}

impl Helmert {
    pub const fn translation(tx: f64, ty: f64, tz: f64) -> Self {
        Helmert {
            tx,
            ty,
            tz,
            rx: 0.0,
            ry: 0.0,
            rz: 0.0,
            scale_ppm: 0.0,
        }
    }

    /// Parameters as a proj `+towgs84` value.
    pub fn towgs84(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.tx, self.ty, self.tz, self.rx, self.ry, self.rz, self.scale_ppm
        )
    }

    /// Reverse transform under the small-angle approximation.
    pub fn inverse(&self) -> Helmert {
        Helmert {
            tx: -self.tx,
            ty: -self.ty,
            tz: -self.tz,
            rx: -self.rx,
            ry: -self.ry,
            rz: -self.rz,
            scale_ppm: -self.scale_ppm,
        }
    }
}

/// Planar projection parameters. UTM zones are expressed as transverse Mercator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Geographic,
    TransverseMercator {
        lat0: f64,
        lon0: f64,
        k0: f64,
        x0: f64,
        y0: f64,
    },
}

impl Projection {
    pub fn utm(zone: u8, south: bool) -> Projection {
        Projection::TransverseMercator {
            lat0: 0.0,
            lon0: f64::from(zone) * 6.0 - 183.0,
            k0: 0.9996,
            x0: 500_000.0,
            y0: if south { 10_000_000.0 } else { 0.0 },
        }
    }
}

/// Proj string for a projection on an ellipsoid.
pub fn proj_string(projection: &Projection, ellipsoid: &Ellipsoid) -> String {
    match projection {
        Projection::Geographic => format!("+proj=longlat {}", ellipsoid.proj_params()),
        Projection::TransverseMercator {
            lat0,
            lon0,
            k0,
            x0,
            y0,
        } => format!(
            "+proj=tmerc +lat_0={lat0} +lon_0={lon0} +k_0={k0} +x_0={x0} +y_0={y0} {}",
            ellipsoid.proj_params()
        ),
    }
}

/// Geographic proj string carrying datum parameters.
fn geographic_with_towgs84(ellipsoid: &Ellipsoid, towgs84: &str) -> String {
    format!("{} +towgs84={towgs84}", proj_string(&Projection::Geographic, ellipsoid))
}

fn build_proj(definition: &str) -> Result<Proj, PointError> {
    Proj::from_proj_string(definition)
        .map_err(|e| PointError::InvalidCrs(format!("{definition}: {e}")))
}

/// Converts between planar coordinates and geodetic degrees on one ellipsoid.
pub struct Projector {
    geographic: Proj,
    /// `None` when the system itself is geographic.
    planar: Option<Proj>,
}

impl Projector {
    pub fn new(projection: &Projection, ellipsoid: &Ellipsoid) -> Result<Projector, PointError> {
        let geographic = build_proj(&proj_string(&Projection::Geographic, ellipsoid))?;
        let planar = match projection {
            Projection::Geographic => None,
            tm => Some(build_proj(&proj_string(tm, ellipsoid))?),
        };
        Ok(Projector { geographic, planar })
    }

    /// Planar `(x, y)` to `(lon, lat)` in degrees.
    pub fn to_geodetic(&self, x: f64, y: f64) -> Result<(f64, f64), PointError> {
        let Some(planar) = &self.planar else {
            return Ok((x, y));
        };
        let mut point = (x, y, 0.0);
        proj4rs::transform::transform(planar, &self.geographic, &mut point)
            .map_err(|e| PointError::InvalidCrs(e.to_string()))?;
        finite(point.0.to_degrees(), point.1.to_degrees())
    }

    /// `(lon, lat)` in degrees to planar `(x, y)`.
    pub fn from_geodetic(&self, lon: f64, lat: f64) -> Result<(f64, f64), PointError> {
        let Some(planar) = &self.planar else {
            return Ok((lon, lat));
        };
        let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
        proj4rs::transform::transform(&self.geographic, planar, &mut point)
            .map_err(|e| PointError::InvalidCrs(e.to_string()))?;
        finite(point.0, point.1)
    }
}

/// Geodetic shift between two datums, applied by proj4rs through `+towgs84`.
///
/// `helmert` takes coordinates on `from` to `to`. A reversed shift applies
/// the exact inverse, so the same parameters serve both directions.
pub struct DatumShift {
    source: Proj,
    target: Proj,
}

impl DatumShift {
    pub fn new(helmert: &Helmert, from: &Ellipsoid, to: &Ellipsoid) -> Result<DatumShift, PointError> {
        Ok(DatumShift {
            source: build_proj(&geographic_with_towgs84(from, &helmert.towgs84()))?,
            target: build_proj(&geographic_with_towgs84(to, &Helmert::default().towgs84()))?,
        })
    }

    /// Shift from `to` back onto `from` of a Helmert defined as `from` to `to`.
    pub fn reversed(helmert: &Helmert, from: &Ellipsoid, to: &Ellipsoid) -> Result<DatumShift, PointError> {
        let forward = DatumShift::new(helmert, from, to)?;
        Ok(DatumShift {
            source: forward.target,
            target: forward.source,
        })
    }

    /// Shift `(lon, lat)` degrees at zero ellipsoidal height.
    pub fn apply(&self, lon: f64, lat: f64) -> Result<(f64, f64), PointError> {
        let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
        proj4rs::transform::transform(&self.source, &self.target, &mut point)
            .map_err(|e| PointError::InvalidCrs(e.to_string()))?;
        finite(point.0.to_degrees(), point.1.to_degrees())
    }
}

fn finite(x: f64, y: f64) -> Result<(f64, f64), PointError> {
    if x.is_finite() && y.is_finite() {
        Ok((x, y))
    } else {
        Err(PointError::InvalidCrs("projection produced a non-finite coordinate".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAIRO: (f64, f64) = (31.2357, 30.0444);

    fn seven_parameters() -> Helmert {
        Helmert {
            tx: 127.535,
            ty: -113.495,
            tz: 12.7,
            rx: -1.603747,
            ry: 0.153612,
            rz: 5.364408,
            scale_ppm: -5.33745,
        }
    }

    #[test]
    fn towgs84_lists_all_seven_parameters() {
        assert_eq!(
            Helmert::translation(-130.0, 110.0, -13.0).towgs84(),
            "-130,110,-13,0,0,0,0"
        );
        assert_eq!(
            seven_parameters().towgs84(),
            "127.535,-113.495,12.7,-1.603747,0.153612,5.364408,-5.33745"
        );
    }

    #[test]
    fn reversed_shift_undoes_the_forward_shift() {
        let h = seven_parameters();
        let forward = DatumShift::new(&h, &WGS84, &CLARKE_1880).unwrap();
        let back = DatumShift::reversed(&h, &WGS84, &CLARKE_1880).unwrap();
        let (lon, lat) = forward.apply(CAIRO.0, CAIRO.1).unwrap();
        assert!((lon - CAIRO.0).abs() > 1e-5 || (lat - CAIRO.1).abs() > 1e-5);
        let (lon, lat) = back.apply(lon, lat).unwrap();
        assert!((lon - CAIRO.0).abs() < 1e-9, "{lon}");
        assert!((lat - CAIRO.1).abs() < 1e-9, "{lat}");
    }

    #[test]
    fn translation_moves_by_a_few_seconds() {
        let shift = DatumShift::new(&Helmert::translation(-130.0, 110.0, -13.0), &HELMERT_1906, &WGS84).unwrap();
        let (lon, lat) = shift.apply(CAIRO.0, CAIRO.1).unwrap();
        assert!((lon - CAIRO.0).abs() > 1e-5 && (lon - CAIRO.0).abs() < 0.01);
        assert!((lat - CAIRO.1).abs() > 1e-5 && (lat - CAIRO.1).abs() < 0.01);
    }

    #[test]
    fn zero_shift_on_one_ellipsoid_is_identity() {
        let shift = DatumShift::new(&Helmert::default(), &WGS84, &WGS84).unwrap();
        let (lon, lat) = shift.apply(CAIRO.0, CAIRO.1).unwrap();
        assert!((lon - CAIRO.0).abs() < 1e-12 && (lat - CAIRO.1).abs() < 1e-12);
    }

    #[test]
    fn utm_central_meridian_on_equator() {
        let p = Projector::new(&Projection::utm(36, false), &WGS84).unwrap();
        let (e, n) = p.from_geodetic(33.0, 0.0).unwrap();
        assert!((e - 500_000.0).abs() < 1e-3);
        assert!(n.abs() < 1e-3);
    }

    #[test]
    fn projection_round_trip() {
        let p = Projector::new(&Projection::utm(36, false), &WGS84).unwrap();
        let (e, n) = p.from_geodetic(31.2357, 30.0444).unwrap();
        let (lon, lat) = p.to_geodetic(e, n).unwrap();
        assert!((lon - 31.2357).abs() < 1e-8);
        assert!((lat - 30.0444).abs() < 1e-8);
    }

    #[test]
    fn proj_strings() {
        assert_eq!(
            proj_string(&Projection::Geographic, &WGS84),
            "+proj=longlat +a=6378137 +rf=298.257223563"
        );
        assert!(proj_string(&Projection::utm(36, true), &WGS84).contains("+y_0=10000000"));
    }
}
