//! Reshaping of `Dataset.show()` text tables into tab-separated tables.

use thiserror::Error;

/// Marker telling renderers the message is a tab-separated table.
pub const TABLE_MARKER: &str = "%table ";

/// Table format error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableFormatError {
    #[error("Table output has {0} lines, expected at least 4")]
    TooShort(usize),
    #[error("Table output line {line} is not a border: {text:?}")]
    MissingBorder { line: usize, text: String },
    #[error("Table header is not pipe-delimited: {0:?}")]
    MissingHeader(String),
}

/// Reshape a bordered ASCII table into `%table` form.
///
/// Input looks like:
///
/// ```text
/// +---+---+
/// |  a|  b|
/// +---+---+
/// |  1|  2|
/// +---+---+
/// only showing top 1 row
/// ```
///
/// The header and each data row become one tab-separated line. A trailing
/// "only showing top N rows" notice is kept as a warning after the rows.
///
/// # Errors
/// Returns error if the text does not have the bordered layout.
pub fn reshape_table(text: &str) -> Result<String, TableFormatError> {
    let rows: Vec<&str> = text.lines().collect();
    if rows.len() < 4 {
        return Err(TableFormatError::TooShort(rows.len()));
    }
    for line in [0, 2] {
        if !is_border(rows[line]) {
            return Err(TableFormatError::MissingBorder {
                line,
                text: rows[line].to_string(),
            });
        }
    }
    if !rows[1].trim_start().starts_with('|') {
        return Err(TableFormatError::MissingHeader(rows[1].to_string()));
    }

    let mut out = String::from(TABLE_MARKER);
    out.push_str(&fields(rows[1]));
    out.push('\n');

    for row in rows[3..].iter().filter(|r| r.trim_start().starts_with('|')) {
        out.push_str(&fields(row));
        out.push('\n');
    }

    if let Some(notice) = rows.last().filter(|l| l.starts_with("only")) {
        out.push_str("<font color=red>");
        out.push_str(notice);
        out.push_str(".</font>");
    }

    Ok(out)
}

fn is_border(line: &str) -> bool {
    line.trim_start().starts_with('+')
}

fn fields(line: &str) -> String {
    let mut cells: Vec<&str> = line.trim().split('|').skip(1).collect();
    if cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    cells.iter().map(|c| c.trim()).collect::<Vec<_>>().join("\t")
}
