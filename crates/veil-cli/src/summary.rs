use std::collections::BTreeMap;

use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use veil_cli::pipeline::RunResult;
use veil_model::ShiftStatus;

pub fn print_summary(result: &RunResult) {
    println!("Output: {}", result.output_dir.display());
    println!("Maps: {}", result.map_dir.display());
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("File"),
        header_cell("Rows"),
        header_cell("Shift"),
        header_cell("Misses"),
        header_cell("Unparsed"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    align_column(&mut table, 2, CellAlignment::Center);
    align_column(&mut table, 3, CellAlignment::Right);
    align_column(&mut table, 4, CellAlignment::Right);
    for file in &result.summary.files {
        table.add_row(vec![
            Cell::new(&file.file)
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold),
            Cell::new(file.rows_out),
            shift_cell(file.shift),
            count_cell(file.total_lookup_misses()),
            count_cell(file.total_parse_failures()),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        Cell::new(result.summary.total_rows()).add_attribute(Attribute::Bold),
        dim_cell("-"),
        count_cell(result.summary.total_lookup_misses()).add_attribute(Attribute::Bold),
        count_cell(result.summary.total_parse_failures()).add_attribute(Attribute::Bold),
    ]);
    println!("{table}");
    print_degraded_columns(result);
    if !result.errors.is_empty() {
        eprintln!("Errors:");
        for error in &result.errors {
            eprintln!("- {error}");
        }
    }
}

/// Per-column breakdown of degraded cells, printed only when any exist.
fn print_degraded_columns(result: &RunResult) {
    let mut rows: Vec<(&str, &str, &str, u64)> = Vec::new();
    for file in &result.summary.files {
        collect_counts(&mut rows, &file.file, "lookup miss", &file.lookup_misses);
        collect_counts(&mut rows, &file.file, "parse failure", &file.parse_failures);
    }
    if rows.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("File"),
        header_cell("Column"),
        header_cell("Kind"),
        header_cell("Cells"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 3, CellAlignment::Right);
    for (file, column, kind, count) in rows {
        table.add_row(vec![
            Cell::new(file),
            Cell::new(column),
            Cell::new(kind).fg(Color::Yellow),
            Cell::new(count).fg(Color::Yellow),
        ]);
    }
    println!();
    println!("Degraded cells:");
    println!("{table}");
}

fn collect_counts<'a>(
    rows: &mut Vec<(&'a str, &'a str, &'a str, u64)>,
    file: &'a str,
    kind: &'a str,
    counts: &'a BTreeMap<String, u64>,
) {
    for (column, count) in counts {
        rows.push((file, column, kind, *count));
    }
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn shift_cell(status: ShiftStatus) -> Cell {
    match status {
        ShiftStatus::Direct => Cell::new("direct").fg(Color::Green),
        ShiftStatus::Joined => Cell::new("joined").fg(Color::Green),
        ShiftStatus::Skipped => Cell::new("skipped")
            .fg(Color::Yellow)
            .add_attribute(Attribute::Bold),
        ShiftStatus::NotRequested => dim_cell("-"),
    }
}

fn count_cell(count: u64) -> Cell {
    if count > 0 {
        Cell::new(count).fg(Color::Yellow).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
