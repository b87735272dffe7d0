//! Artifact writer: directories, raw backups and the delimited summary table.

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Row serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Row {index} is not a record")]
    NotARecord { index: usize },
}

impl ArtifactError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactWriter;

impl ArtifactWriter {
    pub fn new() -> Self {
        Self
    }

    /// Create `dir` and all missing parents. Succeeds when it already exists.
    pub async fn ensure_dir(&self, dir: &Path) -> Result<(), ArtifactError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ArtifactError::io(dir, e))
    }

    /// Write `contents` to `path`, replacing any existing file.
    pub async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), ArtifactError> {
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| ArtifactError::io(path, e))
    }

    /// Rename `from` to `to`, replacing `to` if it exists.
    pub async fn move_file(&self, from: &Path, to: &Path) -> Result<(), ArtifactError> {
        tokio::fs::rename(from, to)
            .await
            .map_err(|e| ArtifactError::io(from, e))
    }

    /// Write `rows` as CSV. Nested objects become dotted columns; the header is
    /// `columns` followed by unknown keys in first-appearance order. Missing and null
    /// values are empty cells.
    pub async fn write_table<T: Serialize>(
        &self,
        path: &Path,
        columns: &[&str],
        rows: &[T],
    ) -> Result<(), ArtifactError> {
        let table = render_table(columns, rows)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.ensure_dir(parent).await?;
        }
        self.write_file(path, &table).await?;
        tracing::info!(path = %path.display(), rows = rows.len(), "Summary table written");
        Ok(())
    }
}

/// Render rows to CSV bytes.
pub fn render_table<T: Serialize>(columns: &[&str], rows: &[T]) -> Result<Vec<u8>, ArtifactError> {
    let mut flat_rows = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        match serde_json::to_value(row)? {
            Value::Object(map) => {
                let mut flat = Map::new();
                flatten_into("", &map, &mut flat);
                flat_rows.push(flat);
            }
            _ => return Err(ArtifactError::NotARecord { index }),
        }
    }

    let mut header: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    for row in &flat_rows {
        for key in row.keys() {
            // A null nested record shows up as its bare parent key
            let known = header.iter().any(|h| {
                h == key
                    || h
                        .strip_prefix(key.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            });
            if !known {
                header.push(key.clone());
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;
    for row in &flat_rows {
        writer.write_record(header.iter().map(|column| cell(row.get(column))))?;
    }

    writer
        .into_inner()
        .map_err(|e| ArtifactError::Csv(e.into_error().into()))
}

fn flatten_into(prefix: &str, map: &Map<String, Value>, out: &mut Map<String, Value>) {
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(nested) if !nested.is_empty() => flatten_into(&name, nested, out),
            other => {
                out.insert(name, other.clone());
            }
        }
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(o)) if o.is_empty() => String::new(),
        Some(other) => other.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
