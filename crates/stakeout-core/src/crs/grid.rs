//! NTv2 (`.gsb`) horizontal shift grids.
//!
//! Headers are 16-byte records of an 8-character key and an 8-byte value.
//! Longitudes are stored positive west and all angles are arc-seconds.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::PointError;

pub const GRID_DIR_ENV: &str = "STAKEOUT_GRID_DIR";

const RECORD: usize = 16;
const OVERVIEW_RECORDS: usize = 11;
const SUBGRID_RECORDS: usize = 11;
const INVERSE_ITERATIONS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
struct SubGrid {
    name: String,
    south: f64,
    north: f64,
    /// Positive-west seconds of the eastern edge.
    east: f64,
    west: f64,
    lat_inc: f64,
    lon_inc: f64,
    columns: usize,
    /// `(lat_shift, lon_shift)` per node, south to north then east to west.
    shifts: Vec<(f32, f32)>,
}

impl SubGrid {
    fn contains(&self, lat_s: f64, lon_w: f64) -> bool {
        (self.south..=self.north).contains(&lat_s) && (self.east..=self.west).contains(&lon_w)
    }

    fn node(&self, row: usize, col: usize) -> Option<(f64, f64)> {
        self.shifts
            .get(row * self.columns + col)
            .map(|(a, b)| (f64::from(*a), f64::from(*b)))
    }

    /// Bilinear shift in seconds at a point inside the grid.
    fn interpolate(&self, lat_s: f64, lon_w: f64) -> Option<(f64, f64)> {
        let fy = (lat_s - self.south) / self.lat_inc;
        let fx = (lon_w - self.east) / self.lon_inc;
        let rows = self.shifts.len() / self.columns.max(1);
        let row = (fy.floor() as usize).min(rows.saturating_sub(2));
        let col = (fx.floor() as usize).min(self.columns.saturating_sub(2));
        let (ty, tx) = (fy - row as f64, fx - col as f64);

        let sw = self.node(row, col)?;
        let se = self.node(row, col + 1).unwrap_or(sw);
        let nw = self.node(row + 1, col).unwrap_or(sw);
        let ne = self.node(row + 1, col + 1).unwrap_or(nw);
        let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;
        Some((
            lerp(lerp(sw.0, se.0, tx), lerp(nw.0, ne.0, tx), ty),
            lerp(lerp(sw.1, se.1, tx), lerp(nw.1, ne.1, tx), ty),
        ))
    }
}

/// A loaded shift grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftGrid {
    pub name: String,
    subgrids: Vec<SubGrid>,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl Cursor<'_> {
    fn record(&mut self) -> Result<(String, [u8; 8]), PointError> {
        let chunk = self
            .bytes
            .get(self.pos..self.pos + RECORD)
            .ok_or_else(|| PointError::corrupt("NTv2", "unexpected end of grid file"))?;
        self.pos += RECORD;
        let key = String::from_utf8_lossy(&chunk[..8]).trim().to_string();
        let mut value = [0u8; 8];
        value.copy_from_slice(&chunk[8..]);
        Ok((key, value))
    }

    fn int(&self, v: [u8; 8]) -> i32 {
        let b = [v[0], v[1], v[2], v[3]];
        if self.big_endian {
            i32::from_be_bytes(b)
        } else {
            i32::from_le_bytes(b)
        }
    }

    fn float(&self, v: [u8; 8]) -> f64 {
        if self.big_endian {
            f64::from_be_bytes(v)
        } else {
            f64::from_le_bytes(v)
        }
    }

    fn f32_pair(&mut self) -> Result<(f32, f32), PointError> {
        let chunk = self
            .bytes
            .get(self.pos..self.pos + RECORD)
            .ok_or_else(|| PointError::corrupt("NTv2", "grid node data truncated"))?;
        self.pos += RECORD;
        let f = |i: usize| {
            let b = [chunk[i], chunk[i + 1], chunk[i + 2], chunk[i + 3]];
            if self.big_endian {
                f32::from_be_bytes(b)
            } else {
                f32::from_le_bytes(b)
            }
        };
        Ok((f(0), f(4)))
    }
}

impl ShiftGrid {
    pub fn parse(name: &str, bytes: &[u8]) -> Result<ShiftGrid, PointError> {
        let head = bytes
            .get(8..12)
            .ok_or_else(|| PointError::corrupt("NTv2", "file too short"))?;
        let big_endian = i32::from_le_bytes([head[0], head[1], head[2], head[3]])
            != OVERVIEW_RECORDS as i32;
        let mut cur = Cursor {
            bytes,
            pos: 0,
            big_endian,
        };

        let mut num_files = 0;
        for _ in 0..OVERVIEW_RECORDS {
            let (key, value) = cur.record()?;
            if key == "NUM_FILE" {
                num_files = cur.int(value).max(0) as usize;
            }
        }
        if num_files == 0 {
            return Err(PointError::corrupt("NTv2", "grid declares no subgrids"));
        }

        let mut subgrids = Vec::with_capacity(num_files);
        for _ in 0..num_files {
            let mut sub = SubGrid {
                name: String::new(),
                south: 0.0,
                north: 0.0,
                east: 0.0,
                west: 0.0,
                lat_inc: 0.0,
                lon_inc: 0.0,
                columns: 0,
                shifts: Vec::new(),
            };
            let mut count = 0;
            for _ in 0..SUBGRID_RECORDS {
                let (key, value) = cur.record()?;
                match key.as_str() {
                    "SUB_NAME" => sub.name = String::from_utf8_lossy(&value).trim().to_string(),
                    "S_LAT" => sub.south = cur.float(value),
                    "N_LAT" => sub.north = cur.float(value),
                    "E_LONG" => sub.east = cur.float(value),
                    "W_LONG" => sub.west = cur.float(value),
                    "LAT_INC" => sub.lat_inc = cur.float(value),
                    "LONG_INC" => sub.lon_inc = cur.float(value),
                    "GS_COUNT" => count = cur.int(value).max(0) as usize,
                    _ => {}
                }
            }
            if sub.lat_inc <= 0.0 || sub.lon_inc <= 0.0 {
                return Err(PointError::corrupt("NTv2", format!("subgrid '{}' has no spacing", sub.name)));
            }
            sub.columns = ((sub.west - sub.east) / sub.lon_inc).round() as usize + 1;
            let rows = ((sub.north - sub.south) / sub.lat_inc).round() as usize + 1;
            if sub.columns * rows != count {
                return Err(PointError::corrupt(
                    "NTv2",
                    format!("subgrid '{}' declares {count} nodes for a {rows}x{} grid", sub.name, sub.columns),
                ));
            }
            sub.shifts = (0..count).map(|_| cur.f32_pair()).collect::<Result<_, _>>()?;
            subgrids.push(sub);
        }

        debug!(grid = name, subgrids = subgrids.len(), "loaded NTv2 grid");
        Ok(ShiftGrid {
            name: name.to_string(),
            subgrids,
        })
    }

    pub fn load(path: &Path) -> Result<ShiftGrid, PointError> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ShiftGrid::parse(&name, &bytes)
    }

    /// Shift in seconds `(lat, lon positive west)`; the densest subgrid wins.
    fn shift_at(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let (lat_s, lon_w) = (lat * 3600.0, -lon * 3600.0);
        self.subgrids
            .iter()
            .rev()
            .find(|g| g.contains(lat_s, lon_w))
            .and_then(|g| g.interpolate(lat_s, lon_w))
    }

    /// Apply the grid shift. `None` outside the grid.
    pub fn forward(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let (dlat, dlon) = self.shift_at(lon, lat)?;
        Some((lon - dlon / 3600.0, lat + dlat / 3600.0))
    }

    /// Undo the grid shift by fixed-point iteration.
    pub fn inverse(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let mut guess = (lon, lat);
        for _ in 0..INVERSE_ITERATIONS {
            let (dlat, dlon) = self.shift_at(guess.0, guess.1)?;
            guess = (lon + dlon / 3600.0, lat - dlat / 3600.0);
        }
        Some(guess)
    }
}

/// Search path for grid files: explicit directories, then `$STAKEOUT_GRID_DIR`.
pub fn search_dirs(extra: &[PathBuf]) -> Vec<PathBuf> {
    let mut dirs = extra.to_vec();
    if let Some(env) = std::env::var_os(GRID_DIR_ENV) {
        dirs.extend(std::env::split_paths(&env));
    }
    dirs
}

/// Locate a grid file by absolute path or by name in the search directories.
pub fn find_grid(file: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    let direct = Path::new(file);
    if direct.is_absolute() {
        return direct.is_file().then(|| direct.to_path_buf());
    }
    dirs.iter().map(|d| d.join(file)).find(|p| p.is_file())
}
