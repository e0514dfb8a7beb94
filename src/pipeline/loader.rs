//! Loader for delimited text tables

use anyhow::{Context, Result};
use polars::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::schema::TEXT_COLUMNS;

/// Default number of rows used for CSV schema inference
pub const DEFAULT_INFER_SCHEMA_LENGTH: usize = 10000;

/// How a delimited table is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadOptions {
    /// Field separator. `None` picks tab for `.tsv` files and comma otherwise.
    pub separator: Option<u8>,
    /// Rows used for schema inference; 0 scans the whole file
    pub infer_schema_length: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            separator: None,
            infer_schema_length: DEFAULT_INFER_SCHEMA_LENGTH,
        }
    }
}

/// Build a lazy reader for a delimited text table, rejecting other formats.
///
/// Columns named in `text_columns` that exist in the header are read as
/// strings instead of inferred, so identifiers such as `007` keep their text.
fn scan_table(path: &Path, options: &LoadOptions, text_columns: &[&str]) -> Result<LazyFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let default_separator = match extension.as_str() {
        "csv" | "txt" => b',',
        "tsv" => b'\t',
        _ => anyhow::bail!(
            "Unsupported file format: {}. Supported formats: csv, tsv, txt",
            extension
        ),
    };

    let schema_length = if options.infer_schema_length == 0 {
        None
    } else {
        Some(options.infer_schema_length)
    };

    let mut reader = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_separator(options.separator.unwrap_or(default_separator))
        .with_infer_schema_length(schema_length);

    if !text_columns.is_empty() {
        let header = scan_table(path, options, &[])?
            .collect_schema()
            .with_context(|| format!("Failed to read header: {}", path.display()))?;
        let overwrite: Schema = text_columns
            .iter()
            .filter(|name| header.contains(name))
            .map(|name| (PlSmallStr::from(*name), DataType::String))
            .collect();
        if !overwrite.is_empty() {
            reader = reader.with_dtype_overwrite(Some(Arc::new(overwrite)));
        }
    }

    reader
        .finish()
        .with_context(|| format!("Failed to load table: {}", path.display()))
}

/// Load a delimited text table with a header row.
///
/// The categorical observation columns (`group_id`, `test_id`,
/// `individual_id`, `status`) are always read verbatim as text.
pub fn load_table(path: &Path, options: &LoadOptions) -> Result<DataFrame> {
    scan_table(path, options, &TEXT_COLUMNS)?
        .collect()
        .with_context(|| format!("Failed to read table: {}", path.display()))
}

/// Read only the header of a delimited text table
pub fn get_column_names(path: &Path, options: &LoadOptions) -> Result<Vec<String>> {
    let schema = scan_table(path, options, &[])?
        .collect_schema()
        .with_context(|| format!("Failed to read header: {}", path.display()))?;

    Ok(schema.iter_names().map(|name| name.to_string()).collect())
}

/// Parse a separator argument: a single character, or `tab` / `\t`
pub fn parse_separator(s: &str) -> Result<u8, String> {
    match s {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        _ if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        _ => Err(format!(
            "'{}' is not a valid separator (use a single ASCII character or 'tab')",
            s
        )),
    }
}
