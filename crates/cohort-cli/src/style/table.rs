//! Table formatting using comfy-table.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

fn styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// A table with a bold header row.
pub fn data_table(columns: &[String], rows: &[Vec<String>]) -> Table {
    let mut table = styled_table();
    let header: Vec<Cell> = columns
        .iter()
        .map(|column| {
            if super::no_color() {
                Cell::new(column)
            } else {
                Cell::new(column).add_attribute(Attribute::Bold).fg(Color::Cyan)
            }
        })
        .collect();
    table.set_header(header);
    for row in rows {
        table.add_row(row);
    }
    table
}

pub fn print_table(columns: &[String], rows: &[Vec<String>]) {
    println!("{}", data_table(columns, rows));
}

/// Two columns: key and value.
pub fn info_table(entries: &[(&str, &str)]) -> Table {
    let mut table = styled_table();
    for (key, value) in entries {
        let key_cell = if super::no_color() {
            Cell::new(key)
        } else {
            Cell::new(key).fg(Color::DarkGrey)
        };
        table.add_row(vec![key_cell, Cell::new(value)]);
    }
    table
}

pub fn print_info_table(entries: &[(&str, &str)]) {
    println!("{}", info_table(entries));
}
