use crate::error::Result;
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use rusqlite::Connection;
use rusqlite::types::Value;
use std::path::Path;

/// Run an ad-hoc SQL statement against the analytics database and print
/// the result set as a table
pub fn run(file: &Path, sql: &str) -> Result<()> {
    let conn = Connection::open(file)?;
    let mut stmt = conn.prepare(sql)?;

    let column_count = stmt.column_count();
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED).set_header(
        stmt.column_names()
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>(),
    );

    let mut rows = stmt.query([])?;
    let mut row_count = 0usize;
    while let Some(row) = rows.next()? {
        let values: Vec<String> = (0..column_count)
            .map(|i| {
                row.get::<_, Value>(i)
                    .map(|v| format_value(&v))
                    .unwrap_or_else(|_| "NULL".to_string())
            })
            .collect();
        table.add_row(values);
        row_count += 1;
    }

    println!("{table}");
    eprintln!("{row_count} rows");
    Ok(())
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => format!("{:.6}", f),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}
