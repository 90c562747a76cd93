use std::path::Path;

use stakeout_core::{GroupLogic, GroupingSettings, PointError, Settings};

use crate::output;
use crate::ReadArgs;

pub fn run(
    input: &Path,
    args: &ReadArgs,
    settings: Settings,
    logic: &str,
    column: Option<String>,
    no_sort: bool,
) -> Result<(), PointError> {
    let read_settings = super::read_settings(args, settings.read)?;
    let table = super::read_inputs(&[input.to_path_buf()], &read_settings)?.table;

    let grouping = GroupingSettings {
        logic: logic.parse::<GroupLogic>()?,
        custom_column: column,
        sort: !no_sort,
        ..Default::default()
    };
    if grouping.logic == GroupLogic::Custom && grouping.custom_column.is_none() {
        return Err(PointError::UnsupportedFormat(
            "custom grouping needs --column".to_string(),
        ));
    }

    let groups = stakeout_core::group(&table, &grouping);
    output::table::print_groups(&groups);
    Ok(())
}
