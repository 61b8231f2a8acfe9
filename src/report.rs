// Console report of the fetched rows

use serde_json::Value;
use std::io::{self, Write};

pub const HEADER: &str = "Name, Major:";
pub const NO_DATA: &str = "No data found.";

/// Column holding the student name (A)
const NAME_COLUMN: usize = 0;
/// Column holding the major (E)
const MAJOR_COLUMN: usize = 4;

/// Render one cell; strings verbatim, other JSON values in JSON form
fn cell_text(row: &[Value], index: usize) -> String {
    match row.get(index) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Lines to print for a set of rows
pub fn render_majors(rows: &[Vec<Value>]) -> Vec<String> {
    if rows.is_empty() {
        return vec![NO_DATA.to_string()];
    }

    std::iter::once(HEADER.to_string())
        .chain(rows.iter().map(|row| {
            format!(
                "{}, {}",
                cell_text(row, NAME_COLUMN),
                cell_text(row, MAJOR_COLUMN)
            )
        }))
        .collect()
}

/// Write the report to `out`
pub fn print_majors<W: Write>(out: &mut W, rows: &[Vec<Value>]) -> io::Result<()> {
    for line in render_majors(rows) {
        writeln!(out, "{}", line)?;
    }
    out.flush()
}
