use std::path::{Path, PathBuf};

use stakeout_core::{PointError, Settings, TransformPath};
use tracing::info;

use crate::ReadArgs;

pub struct ConvertOptions {
    pub to_format: Option<String>,
    pub source_crs: Option<String>,
    pub target_crs: Option<String>,
    pub flip_en: bool,
    pub new_columns: bool,
    pub no_custom: bool,
    pub delimiter: Option<char>,
}

pub fn run(
    inputs: &[PathBuf],
    out: &Path,
    args: &ReadArgs,
    settings: Settings,
    opts: ConvertOptions,
) -> Result<(), PointError> {
    let read_settings = super::read_settings(args, settings.read)?;
    let mut table = super::read_inputs(inputs, &read_settings)?.table;

    if let Some(target) = &opts.target_crs {
        let source = match opts.source_crs.as_deref() {
            None | Some("auto") => {
                let detected = stakeout_core::detect_crs(&table, Some(read_settings.zone))?;
                eprintln!("Detected source CRS: {detected}");
                detected
            }
            Some(s) => s.to_string(),
        };

        let mut transform = settings.transform;
        transform.flip_en |= opts.flip_en;
        transform.new_columns |= opts.new_columns;
        if opts.no_custom {
            transform.use_custom = false;
        }

        let outcome = stakeout_core::transform(&table, &source, target, &transform)?;
        let path = match &outcome.path {
            TransformPath::Identity => "identity".to_string(),
            TransformPath::Generic { operation: Some(op) } => format!("generic via {op}"),
            TransformPath::Generic { operation: None } => "generic".to_string(),
            TransformPath::Custom { .. } => "custom Red Belt pipeline".to_string(),
        };
        eprintln!(
            "Transformed {} of {} point(s) from {source} to {target} ({path})",
            outcome.transformed,
            outcome.table.len()
        );
        for w in &outcome.warnings {
            eprintln!("  warning: {w}");
        }
        table = outcome.table;
    } else if opts.source_crs.is_some() {
        return Err(PointError::InvalidCrs(
            "--source-crs needs --target-crs".to_string(),
        ));
    }

    let format = super::read::output_format(out, opts.to_format.as_deref())?;
    let mut write_settings = settings.write;
    if let Some(d) = opts.delimiter {
        write_settings.delimiter = d;
    }
    stakeout_core::write(&table, out, format, &write_settings)?;
    info!(path = %out.display(), format = %format, "conversion finished");
    eprintln!("Wrote {} point(s) to {}", table.len(), out.display());
    Ok(())
}
