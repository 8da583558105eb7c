use crate::error::Result;
use crate::table::Table;
use crate::util::{format_number, render_cell};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tabled::{builder::Builder, settings::Style};

pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

fn preview_cell(value: Option<&Value>) -> String {
    match value {
        Some(Value::Number(n)) if n.is_f64() => format_number(n.as_f64().unwrap_or(0.0), 4),
        Some(v) => render_cell(v),
        None => String::new(),
    }
}

/// Markdown rendering of the first `max_rows` rows.
pub fn render_preview(table: &Table, max_rows: usize) -> String {
    if table.is_empty() || max_rows == 0 {
        return "(no rows)".to_string();
    }
    let columns = table.columns();
    let mut builder = Builder::default();
    builder.push_record(columns.clone());
    for row in table.iter().take(max_rows) {
        builder.push_record(columns.iter().map(|c| preview_cell(row.get(c))));
    }
    builder.build().with(Style::markdown()).to_string()
}

pub fn preview_table_rows(table: &Table, max_rows: usize) {
    println!("{}\n", render_preview(table, max_rows));
}
