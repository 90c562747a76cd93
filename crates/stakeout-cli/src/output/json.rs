use serde_json::{Map, Value};
use stakeout_core::{Cell, PointError, PointTable};

/// One JSON object per row, keyed by column name.
pub fn records(table: &PointTable) -> Value {
    let rows = table
        .rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = table
                .columns
                .iter()
                .zip(row)
                .map(|(name, cell)| (name.clone(), cell_value(cell)))
                .collect();
            Value::Object(object)
        })
        .collect();
    Value::Array(rows)
}

fn cell_value(cell: &Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Number(v) => serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number),
        Cell::Text(s) => Value::String(s.clone()),
    }
}

pub fn print_table(table: &PointTable) -> Result<(), PointError> {
    let json = serde_json::to_string_pretty(&records(table))?;
    println!("{json}");
    Ok(())
}
