//! Writing tables and aggregation reports to disk

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use polars::prelude::*;
use serde::Serialize;

use crate::pipeline::{
    AggregatedBin, Aggregation, BucketShare, CumulativeBin, Dimension, Field, OrdinalLevel,
};

/// Save a table as CSV, Parquet or JSON depending on the file extension
pub fn save_table(df: &mut DataFrame, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let create = || {
        File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))
    };

    match extension.as_str() {
        "csv" => {
            let mut file = create()?;
            CsvWriter::new(&mut file)
                .finish(df)
                .with_context(|| format!("Failed to write CSV file: {}", path.display()))?;
        }
        "tsv" => {
            let mut file = create()?;
            CsvWriter::new(&mut file)
                .with_separator(b'\t')
                .finish(df)
                .with_context(|| format!("Failed to write TSV file: {}", path.display()))?;
        }
        "parquet" => {
            let file = create()?;
            ParquetWriter::new(file)
                .finish(df)
                .with_context(|| format!("Failed to write Parquet file: {}", path.display()))?;
        }
        "json" => {
            let mut file = create()?;
            JsonWriter::new(&mut file)
                .with_json_format(JsonFormat::Json)
                .finish(df)
                .with_context(|| format!("Failed to write JSON file: {}", path.display()))?;
        }
        _ => anyhow::bail!(
            "Unsupported output format: {}. Supported formats: csv, tsv, parquet, json",
            extension
        ),
    }

    Ok(())
}

/// Metadata about the aggregation run
#[derive(Debug, Serialize)]
pub struct AggregationMetadata {
    /// Timestamp of the run (ISO 8601 format)
    pub timestamp: String,
    pub ordbin_version: String,
    pub input_file: String,
    pub target: Field,
    pub dimensions: Vec<Dimension>,
    /// Width of the arrival order percentile buckets used during normalization
    pub percentile_width: f64,
    /// Denominator shared by every proportion
    pub total_rows: usize,
}

/// Complete aggregation export
#[derive(Debug, Serialize)]
pub struct AggregationExport<'a> {
    pub metadata: AggregationMetadata,
    pub levels: &'a [OrdinalLevel],
    pub buckets: Vec<BucketShare>,
    pub bins: &'a [AggregatedBin],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative: Option<Vec<CumulativeBin>>,
}

/// Parameters for the aggregation export metadata
pub struct ExportParams<'a> {
    pub input_file: &'a str,
    pub percentile_width: f64,
    pub include_cumulative: bool,
}

/// Build the export document of an aggregation
pub fn build_aggregation_export<'a>(
    aggregation: &'a Aggregation,
    params: &ExportParams,
) -> AggregationExport<'a> {
    AggregationExport {
        metadata: AggregationMetadata {
            timestamp: Utc::now().to_rfc3339(),
            ordbin_version: env!("CARGO_PKG_VERSION").to_string(),
            input_file: params.input_file.to_string(),
            target: aggregation.target,
            dimensions: aggregation.dimensions.clone(),
            percentile_width: params.percentile_width,
            total_rows: aggregation.total,
        },
        levels: &aggregation.levels,
        buckets: aggregation.bucket_shares(),
        bins: &aggregation.bins,
        cumulative: params.include_cumulative.then(|| aggregation.cumulative()),
    }
}

/// Export an aggregation with run metadata to a JSON file
pub fn export_aggregation_json(
    aggregation: &Aggregation,
    output_path: &Path,
    params: &ExportParams,
) -> Result<()> {
    let export = build_aggregation_export(aggregation, params);

    let json = serde_json::to_string_pretty(&export)
        .context("Failed to serialize aggregation to JSON")?;

    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write aggregation to {}", output_path.display()))?;

    Ok(())
}
