use crate::domains::contracts::types::Record;
use crate::errors::WriteResult;
use csv::Writer;
use log::debug;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// CSV writer whose columns are fixed by the first record it sees
pub struct ContractsCsvWriter {
    path: PathBuf,
    writer: Writer<File>,
    columns: Option<Vec<String>>,
    rows_written: usize,
}

impl ContractsCsvWriter {
    /// Create (or truncate) the output file
    pub fn create(path: &Path) -> WriteResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Writer::from_writer(file),
            columns: None,
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn write_record(&mut self, record: &Record) -> WriteResult<()> {
        if self.columns.is_none() {
            let columns: Vec<String> = record.keys().cloned().collect();
            debug!("Fixing {} columns from first record", columns.len());
            self.writer.write_record(&columns)?;
            self.columns = Some(columns);
        }

        let row: Vec<String> = self
            .columns
            .iter()
            .flatten()
            .map(|column| record.get(column).map(format_csv_value).unwrap_or_default())
            .collect();

        self.writer.write_record(&row)?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn write_all<'r, I>(&mut self, records: I) -> WriteResult<()>
    where
        I: IntoIterator<Item = &'r Record>,
    {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    /// Flush and close the file, returning the number of rows written
    pub fn finish(mut self) -> WriteResult<usize> {
        self.writer.flush()?;
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(self.rows_written)
    }
}

/// Render one JSON value as a CSV cell
pub fn format_csv_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(arr) => arr
            .iter()
            .map(format_csv_value)
            .collect::<Vec<_>>()
            .join("; "),
        // nested objects (urls, geo points) keep their JSON text
        serde_json::Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
