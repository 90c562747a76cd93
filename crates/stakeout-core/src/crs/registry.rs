//! Coordinate reference systems known to the transform stage.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::crs::egypt::Belt;
use crate::crs::geodesy::{Ellipsoid, Projection, Projector, HELMERT_1906, WGS84};
use crate::error::PointError;

pub const EPSG_WGS84: u32 = 4326;
pub const EPSG_EGYPT_1907: u32 = 4229;

static UTM_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"UTM\s*(?:ZONE\s*)?(\d{1,2})\s*(NORTH|SOUTH|N|S)?\b").expect("UTM name pattern is valid")
});

/// Geodetic datums the catalog can shift between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datum {
    Wgs84,
    Egypt1907,
}

impl Datum {
    pub fn ellipsoid(&self) -> Ellipsoid {
        match self {
            Datum::Wgs84 => WGS84,
            Datum::Egypt1907 => HELMERT_1906,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Wgs84 => write!(f, "WGS 84"),
            Datum::Egypt1907 => write!(f, "Egypt 1907"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Crs {
    pub epsg: u32,
    pub name: String,
    pub datum: Datum,
    pub projection: Projection,
}

impl Crs {
    pub fn identifier(&self) -> String {
        format!("EPSG:{}", self.epsg)
    }

    pub fn is_geographic(&self) -> bool {
        self.projection == Projection::Geographic
    }

    pub fn projector(&self) -> Result<Projector, PointError> {
        Projector::new(&self.projection, &self.datum.ellipsoid())
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.identifier(), self.name)
    }
}

/// WGS 84 UTM zone.
pub fn utm(zone: u8, south: bool) -> Option<Crs> {
    if !(1..=60).contains(&zone) {
        return None;
    }
    let (base, hemi) = if south { (32700, 'S') } else { (32600, 'N') };
    Some(Crs {
        epsg: base + u32::from(zone),
        name: format!("WGS 84 / UTM zone {zone}{hemi}"),
        datum: Datum::Wgs84,
        projection: Projection::utm(zone, south),
    })
}

/// Registered system for an EPSG code.
pub fn lookup(epsg: u32) -> Option<Crs> {
    match epsg {
        EPSG_WGS84 => Some(Crs {
            epsg,
            name: "WGS 84".into(),
            datum: Datum::Wgs84,
            projection: Projection::Geographic,
        }),
        EPSG_EGYPT_1907 => Some(Crs {
            epsg,
            name: "Egypt 1907".into(),
            datum: Datum::Egypt1907,
            projection: Projection::Geographic,
        }),
        32601..=32660 => utm((epsg - 32600) as u8, false),
        32701..=32760 => utm((epsg - 32700) as u8, true),
        _ => Belt::from_epsg(epsg).map(Belt::crs),
    }
}

/// Resolve `EPSG:<code>`, a bare code, or a descriptive name such as
/// `UTM 36N`, `UTM Zone 36 North` or `Egypt Red Belt`.
pub fn parse_crs(input: &str) -> Result<Crs, PointError> {
    let trimmed = input.trim();
    let upper = trimmed.to_uppercase();
    let code = upper.strip_prefix("EPSG:").unwrap_or(&upper).trim();

    if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) {
        return code
            .parse::<u32>()
            .ok()
            .and_then(lookup)
            .ok_or_else(|| PointError::InvalidCrs(format!("'{trimmed}' is not a supported CRS")));
    }

    if let Some(caps) = UTM_NAME.captures(&upper) {
        let zone = caps.get(1).and_then(|m| m.as_str().parse::<u8>().ok());
        let south = caps.get(2).is_some_and(|m| m.as_str().starts_with('S'));
        if let Some(crs) = zone.and_then(|z| utm(z, south)) {
            return Ok(crs);
        }
    }

    if upper.contains("BELT") {
        let belt = if upper.contains("EXTENDED") {
            Some(Belt::ExtendedPurple)
        } else if upper.contains("PURPLE") {
            Some(Belt::Purple)
        } else if upper.contains("RED") {
            Some(Belt::Red)
        } else if upper.contains("BLUE") {
            Some(Belt::Blue)
        } else {
            None
        };
        if let Some(belt) = belt {
            return Ok(belt.crs());
        }
    }

    let compact: String = upper.chars().filter(|c| !c.is_whitespace()).collect();
    let epsg = match compact.as_str() {
        "WGS84" => Some(EPSG_WGS84),
        "EGYPT1907" => Some(EPSG_EGYPT_1907),
        _ => None,
    };
    epsg.and_then(lookup)
        .ok_or_else(|| PointError::InvalidCrs(format!("'{trimmed}' is not a supported CRS")))
}
