use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{DwiAlignError, Result};

/// Read a whitespace-separated numeric matrix. Blank lines and lines
/// starting with `#` are skipped.
pub fn read_matrix(path: &Path) -> Result<Vec<Vec<f64>>> {
    let contents = fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row: std::result::Result<Vec<f64>, _> =
            line.split_whitespace().map(|t| t.parse::<f64>()).collect();
        match row {
            Ok(row) => rows.push(row),
            Err(e) => {
                return Err(DwiAlignError::Parse {
                    path: path.display().to_string(),
                    message: format!("line {}: {}", lineno + 1, e),
                })
            }
        }
    }
    Ok(rows)
}

/// Write a numeric matrix, one space-separated row per line.
pub fn write_matrix<I>(path: &Path, rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<f64>>,
{
    let mut file = fs::File::create(path)?;
    for row in rows {
        let line: Vec<String> = row.iter().map(|v| format!("{:.6}", v)).collect();
        writeln!(file, "{}", line.join(" "))?;
    }
    Ok(())
}
