use std::path::Path;

use stakeout_core::crs::{belt_by_longitude, infer_belt, parse_crs};
use stakeout_core::{PointError, Settings};

use crate::ReadArgs;

pub fn run(input: &Path, args: &ReadArgs, settings: Settings, belt: bool) -> Result<(), PointError> {
    let read_settings = super::read_settings(args, settings.read)?;
    let table = super::read_inputs(&[input.to_path_buf()], &read_settings)?.table;

    let detected = stakeout_core::detect_crs(&table, Some(read_settings.zone));
    if !belt {
        println!("CRS: {}", detected?);
        return Ok(());
    }

    // Projected values with no usable hint are scored against each belt.
    let guess = match &detected {
        Ok(id) => {
            println!("CRS: {id}");
            belt_by_longitude(&table, &parse_crs(id)?)
        }
        Err(e) => {
            println!("CRS: not detected ({e})");
            infer_belt(&table)
        }
    };
    println!("Belt: {guess}");
    Ok(())
}
