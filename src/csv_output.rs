//! CSV helpers shared by the matrix, aggregate and plot-data writers
//!
//! Every table is written with an explicit header so that empty tables still
//! carry their column layout and the column order never depends on serde.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Serialize `rows` under a fixed `header`
///
/// `Option` fields serialize as empty cells, never as zero.
pub fn rows_to_csv<T: Serialize>(header: &[&str], rows: &[T]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context("Failed to flush CSV buffer")?;
    Ok(String::from_utf8(bytes)?)
}

/// Write `rows` to `path` under a fixed `header`
pub fn write_rows<T: Serialize, P: AsRef<Path>>(path: P, header: &[&str], rows: &[T]) -> Result<()> {
    let path = path.as_ref();
    let content = rows_to_csv(header, rows)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Read every row of a headed CSV file
pub fn read_rows<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Vec<T>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for (index, record) in reader.deserialize::<T>().enumerate() {
        rows.push(
            record.with_context(|| format!("Malformed row {} in {}", index + 1, path.display()))?,
        );
    }
    Ok(rows)
}
