pub mod convert;
pub mod detect;
pub mod groups;
pub mod read;

use std::path::{Path, PathBuf};

use stakeout_core::batch::{import_batch, BatchOutcome, CancelToken};
use stakeout_core::settings::ColumnOrder;
use stakeout_core::{Format, PointError, ReadSettings, Settings};
use tracing::{info, warn};

use crate::ReadArgs;

pub fn load_settings(path: Option<&Path>) -> Result<Settings, PointError> {
    match path {
        Some(p) => {
            let settings = Settings::load(p)?;
            info!(path = %p.display(), "loaded settings");
            Ok(settings)
        }
        None => Ok(Settings::default()),
    }
}

/// Settings-file read options with command-line flags applied on top.
pub fn read_settings(args: &ReadArgs, mut base: ReadSettings) -> Result<ReadSettings, PointError> {
    if let Some(f) = &args.format {
        base.format = Some(Format::parse(f)?);
    }
    if let Some(order) = &args.columns {
        base.column_order = ColumnOrder::parse(order);
    }
    if let Some(number) = args.zone {
        base.zone.number = number;
    }
    if let Some(letter) = args.zone_letter {
        base.zone.letter = letter;
    }
    if let Some(sheet) = &args.sheet {
        base.excel_sheet = Some(sheet.clone());
    }
    Ok(base)
}

/// Read the inputs in order, logging progress and per-file warnings.
pub fn read_inputs(inputs: &[PathBuf], settings: &ReadSettings) -> Result<BatchOutcome, PointError> {
    let progress = |percent: u8, message: &str| info!(percent, "{message}");
    let outcome = import_batch(inputs, settings, &progress, &CancelToken::new())?;
    for file in &outcome.files {
        for w in &file.warnings {
            warn!(file = %file.path.display(), "{w}");
        }
    }
    if outcome.coerced_fields() > 0 {
        eprintln!(
            "  {} malformed field(s) were replaced with defaults",
            outcome.coerced_fields()
        );
    }
    Ok(outcome)
}
