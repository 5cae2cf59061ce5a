use crate::error::Result;
use crate::event::{parse_date, today};
use crate::storage::{PageHits, query_top_pages};
use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_FULL_CONDENSED};
use rusqlite::Connection;
use std::path::Path;

pub fn run(file: &Path, date: Option<&str>, limit: usize, json: bool, csv: bool) -> Result<()> {
    let date = match date {
        Some(d) => parse_date(d)?,
        None => today(),
    };
    let day = date.format("%Y-%m-%d").to_string();

    let conn = Connection::open(file)?;
    let entries = query_top_pages(&conn, date, limit)?;

    if json {
        print_json(&day, &entries);
    } else if csv {
        print_csv(&entries);
    } else if entries.is_empty() {
        eprintln!("No visits recorded for {day}");
    } else {
        print_table(&day, &entries);
    }

    Ok(())
}

fn print_table(day: &str, entries: &[PageHits]) {
    let total: u64 = entries.iter().map(|e| e.hits).sum();
    println!("# {day} | Top {} pages | {total} hits", entries.len());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_header(vec!["HITS", "SHARE", "PAGE"]);

    for entry in entries {
        let share = if total > 0 {
            entry.hits as f64 * 100.0 / total as f64
        } else {
            0.0
        };
        table.add_row(vec![
            Cell::new(entry.hits).set_alignment(CellAlignment::Right),
            Cell::new(format!("{share:.1}%")).set_alignment(CellAlignment::Right),
            Cell::new(&entry.page),
        ]);
    }

    println!("{table}");
}

fn print_json(day: &str, entries: &[PageHits]) {
    println!("{{");
    println!("  \"date\": \"{}\",", day);
    println!("  \"entries\": [");

    for (i, entry) in entries.iter().enumerate() {
        let comma = if i < entries.len() - 1 { "," } else { "" };
        println!(
            "    {{\"page\": {}, \"hits\": {}}}{}",
            json_string(&entry.page),
            entry.hits,
            comma
        );
    }

    println!("  ]");
    println!("}}");
}

fn print_csv(entries: &[PageHits]) {
    println!("page,hits");
    for entry in entries {
        println!("{},{}", csv_field(&entry.page), entry.hits);
    }
}

fn json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
