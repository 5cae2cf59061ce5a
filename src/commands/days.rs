use crate::error::Result;
use crate::storage::query_daily_totals;
use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_FULL_CONDENSED};
use rusqlite::Connection;
use std::path::Path;

/// Run the days command - hits per day, newest first
pub fn run(file: &Path, limit: usize) -> Result<()> {
    let conn = Connection::open(file)?;
    let days = query_daily_totals(&conn, limit)?;

    if days.is_empty() {
        println!("No visits recorded in {}", file.display());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_header(vec!["DATE", "PAGES", "HITS"]);

    for day in &days {
        table.add_row(vec![
            Cell::new(&day.date),
            Cell::new(day.pages).set_alignment(CellAlignment::Right),
            Cell::new(day.hits).set_alignment(CellAlignment::Right),
        ]);
    }

    println!("{table}");
    Ok(())
}
