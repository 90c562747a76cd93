use stakeout_core::{Cell, PointGroup, PointTable};

fn render(cell: &Cell) -> String {
    match cell {
        Cell::Null => String::new(),
        Cell::Number(v) => format!("{v:.3}"),
        Cell::Text(s) => s.clone(),
    }
}

/// Plain-text table with right-aligned numbers.
pub fn format_table(table: &PointTable) -> String {
    let cells: Vec<Vec<String>> = table.rows.iter().map(|r| r.iter().map(render).collect()).collect();
    let widths: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .filter_map(|r| r.get(i))
                .map(|s| s.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    let header: Vec<String> = table
        .columns
        .iter()
        .zip(&widths)
        .map(|(name, w)| format!("{name:<w$}"))
        .collect();
    out.push_str(header.join("  ").trim_end());
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("  "));

    for (row, rendered) in table.rows.iter().zip(&cells) {
        let line: Vec<String> = rendered
            .iter()
            .zip(&widths)
            .zip(row)
            .map(|((text, w), cell)| match cell {
                Cell::Number(_) => format!("{text:>w$}"),
                _ => format!("{text:<w$}"),
            })
            .collect();
        out.push('\n');
        out.push_str(line.join("  ").trim_end());
    }
    out.push_str(&format!("\n\n{} point(s)", table.len()));
    out
}

pub fn print_groups(groups: &[PointGroup]) {
    if groups.is_empty() {
        println!("No groups with two or more points.");
        return;
    }
    for group in groups {
        let ids: Vec<String> = (0..group.table.len())
            .map(|r| group.table.text(r, stakeout_core::model::COL_PT))
            .collect();
        let key = if group.key.is_empty() { "(blank)" } else { group.key.as_str() };
        println!("{key} ({} points): {}", group.table.len(), ids.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_are_aligned() {
        let table = PointTable {
            columns: vec!["PT".into(), "Easting".into(), "Code".into()],
            rows: vec![
                vec![Cell::text("1"), Cell::Number(500000.0), Cell::text("FENCE")],
                vec![Cell::text("10"), Cell::Number(12.5), Cell::Null],
            ],
        };
        let text = format_table(&table);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "PT  Easting     Code");
        assert_eq!(lines[1], "--  ----------  -----");
        assert_eq!(lines[2], "1   500000.000  FENCE");
        assert_eq!(lines[3], "10      12.500");
        assert!(text.ends_with("2 point(s)"));
    }
}
