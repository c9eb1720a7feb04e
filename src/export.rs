//! CSV export of result tables.
//!
//! Records end with CRLF and fields are quoted only when they contain the
//! delimiter, a quote or a line break.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, Terminator, WriterBuilder};
use tracing::{debug, info};

use crate::db::Table;
use crate::error::{FanoutError, Result};

/// Characters that are illegal in a file name on at least one mainstream platform.
const ILLEGAL_FILE_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Writes tables as CSV.
#[derive(Debug, Clone, Copy)]
pub struct CsvExporter {
    delimiter: u8,
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self::new(b',')
    }
}

impl CsvExporter {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// Writes `table` to `writer`. A table without columns writes nothing.
    pub fn write_to<W: Write>(&self, table: &Table, writer: W) -> Result<()> {
        if table.columns.is_empty() {
            return Ok(());
        }

        let mut csv = WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::CRLF)
            .flexible(false)
            .from_writer(writer);

        csv.write_record(&table.columns)
            .map_err(|e| FanoutError::export(e.to_string()))?;

        let width = table.columns.len();
        for row in &table.rows {
            let fields = (0..width).map(|i| {
                row.get(i)
                    .map(|value| value.to_field_string())
                    .unwrap_or_default()
            });
            csv.write_record(fields)
                .map_err(|e| FanoutError::export(e.to_string()))?;
        }

        csv.flush().map_err(|e| FanoutError::export(e.to_string()))
    }

    /// Writes `table` to `path`, creating parent directories and overwriting
    /// any existing file.
    pub fn write_file(&self, table: &Table, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| FanoutError::export_io(parent, e))?;
            }
        }

        let file = File::create(path).map_err(|e| FanoutError::export_io(path, e))?;
        self.write_to(table, file).map_err(|e| match e {
            FanoutError::Export(msg) => FanoutError::export_io(path, msg),
            other => other,
        })?;

        debug!("Wrote {} row(s) to {}", table.row_count(), path.display());
        Ok(())
    }

    /// Writes one `<name>.csv` per table into `dir`, in the given order.
    ///
    /// Returns the written paths. Stops at the first failure; files already
    /// written stay on disk.
    pub fn export_per_target(&self, tables: &[(&str, &Table)], dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).map_err(|e| FanoutError::export_io(dir, e))?;

        let names = per_target_file_names(tables.iter().map(|(name, _)| *name));
        let mut written = Vec::with_capacity(tables.len());
        for ((_, table), file_name) in tables.iter().zip(names) {
            let path = dir.join(file_name);
            self.write_file(table, &path)?;
            written.push(path);
        }

        info!("Exported {} per-target file(s) to {}", written.len(), dir.display());
        Ok(written)
    }
}

/// Replaces characters that cannot appear in a file name with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control() || ILLEGAL_FILE_NAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

/// CSV file names for targets in order. Names that collide after
/// sanitization (case-insensitively) get `_2`, `_3`, ... suffixes.
pub fn per_target_file_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken = HashSet::new();

    names
        .into_iter()
        .map(|name| {
            let stem = sanitize_file_name(name);
            let mut file_name = format!("{stem}.csv");
            let mut suffix = 2;
            while !taken.insert(file_name.to_lowercase()) {
                file_name = format!("{stem}_{suffix}.csv");
                suffix += 1;
            }
            file_name
        })
        .collect()
}
