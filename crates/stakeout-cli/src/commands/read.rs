use std::path::{Path, PathBuf};

use stakeout_core::{Format, PointError, Settings};

use crate::output;
use crate::ReadArgs;

/// Output format chosen from the file extension, delimited text when unknown.
pub fn output_format(path: &Path, explicit: Option<&str>) -> Result<Format, PointError> {
    match explicit {
        Some(f) => Format::parse(f),
        None => Ok(Format::from_path(path)?.unwrap_or(Format::Delimited)),
    }
}

pub fn run(
    inputs: &[PathBuf],
    args: &ReadArgs,
    settings: Settings,
    output_format_name: &str,
    out: Option<PathBuf>,
) -> Result<(), PointError> {
    let read_settings = super::read_settings(args, settings.read)?;
    let outcome = super::read_inputs(inputs, &read_settings)?;

    match out {
        Some(path) => {
            let format = output_format(&path, None)?;
            stakeout_core::write(&outcome.table, &path, format, &settings.write)?;
            eprintln!(
                "Read {} point(s) from {} file(s), written to {}",
                outcome.table.len(),
                outcome.files.len(),
                path.display()
            );
            if outcome.warning_count() > 0 {
                eprintln!("  {} warning(s) while reading", outcome.warning_count());
            }
        }
        None => match output_format_name {
            "json" => output::json::print_table(&outcome.table)?,
            _ => println!("{}", output::table::format_table(&outcome.table)),
        },
    }

    Ok(())
}
