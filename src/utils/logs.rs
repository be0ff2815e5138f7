//! Append-only CSV logs

use std::{fs::OpenOptions, path::Path};

use anyhow::{Context, Result};
use serde::Serialize;

/// Append rows to a CSV file
///
/// The header, derived from the row type's field names, is written only when
/// the file does not exist yet.
pub fn append_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let is_new = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new().has_headers(is_new).from_writer(file);
    for row in rows {
        writer.serialize(row).with_context(|| format!("failed to append to {}", path.display()))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        update: u64,
        gen_loss: f64,
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("losses.csv");

        append_rows(&path, &[Row { update: 1, gen_loss: 0.5 }]).unwrap();
        append_rows(&path, &[Row { update: 2, gen_loss: 0.25 }]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "update,gen_loss\n1,0.5\n2,0.25\n");
    }
}
