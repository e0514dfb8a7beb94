//! Command-line argument definitions using clap

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::pipeline::{
    parse_separator, Dimension, Field, LoadOptions, ModelSpec, NormalizeOptions,
    DEFAULT_INFER_SCHEMA_LENGTH,
};

/// ordbin - Normalize arrival-order observations and build long-form tables for ordinal charts
#[derive(Parser, Debug)]
#[command(name = "ordbin")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub table: TableOptions,
}

/// Options shared by every subcommand that reads observations
#[derive(Args, Debug, Clone)]
pub struct TableOptions {
    /// Field separator of the input tables (single character, or "tab").
    /// Defaults to tab for .tsv files and comma otherwise.
    #[arg(long, global = true, value_parser = parse_separator)]
    pub separator: Option<u8>,

    /// Number of rows to use for schema inference.
    /// Use 0 for full table scan (very slow for large files).
    #[arg(long, global = true, default_value_t = DEFAULT_INFER_SCHEMA_LENGTH)]
    pub infer_schema_length: usize,

    /// Width of the arrival_order_percentile_bin buckets (0 < width <= 1)
    #[arg(long, global = true, default_value = "0.1", value_parser = validate_percentile_width)]
    pub percentile_width: f64,

    /// Accept (group, test) pairs whose arrival orders do not cover 1..group_size
    #[arg(long, global = true)]
    pub allow_incomplete: bool,
}

impl TableOptions {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            separator: self.separator,
            infer_schema_length: self.infer_schema_length,
        }
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            percentile_width: self.percentile_width,
            allow_incomplete_tests: self.allow_incomplete,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the observation table and write it with derived columns
    Normalize {
        /// Input file path (CSV, TSV or TXT)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (CSV, TSV, Parquet or JSON, by extension).
        /// Defaults to the input directory with a '_normalized' suffix.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Aggregate an ordinal outcome over one or two dimensions
    Aggregate {
        /// Input file path (CSV, TSV or TXT)
        #[arg(short, long)]
        input: PathBuf,

        /// Grouping dimension: a column name, or "column:width" to bucket a
        /// continuous column (e.g. foraging_success:0.1). Give once or twice.
        #[arg(long = "by", required = true, value_parser = parse_dimension)]
        by: Vec<Dimension>,

        /// Ordinal outcome: arrival_order, arrival_bin or arrival_order_percentile_bin
        #[arg(short, long, default_value = "arrival_order", value_parser = parse_target)]
        target: Field,

        /// Add a cumulative_proportion column (running sum over levels within each bucket)
        #[arg(long)]
        cumulative: bool,

        /// Output file path (CSV, TSV, Parquet or JSON, by extension).
        /// Defaults to the input directory with a '_bins' suffix.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also export the aggregation with run metadata to this JSON file
        #[arg(long)]
        export_json: Option<PathBuf>,
    },

    /// Reshape a wide prediction matrix into long form
    Reshape {
        /// Explanatory combinations, one row per matrix row
        #[arg(short, long)]
        newdata: PathBuf,

        /// Wide probability table, one column per level
        #[arg(short, long)]
        probabilities: PathBuf,

        /// Level labels (comma-separated). Defaults to the probability table header.
        #[arg(long, value_delimiter = ',')]
        levels: Vec<String>,

        /// Output file path. Defaults to the newdata directory with a '_long' suffix.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fit the empirical model and write long-form predictions over the observed grid
    Predict {
        /// Input file path (CSV, TSV or TXT)
        #[arg(short, long)]
        input: PathBuf,

        /// Model formula, e.g. "arrival_order ~ status + foraging_success:0.1 + (1|group_id)"
        #[arg(short, long, value_parser = parse_formula)]
        formula: ModelSpec,

        /// Output file path. Defaults to the input directory with a '_predictions' suffix.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    /// Get the output path, deriving it from the input if not explicitly provided
    pub fn output_path(&self) -> PathBuf {
        match self {
            Commands::Normalize { input, output } => resolve_output(input, output, "normalized"),
            Commands::Aggregate { input, output, .. } => resolve_output(input, output, "bins"),
            Commands::Reshape {
                newdata, output, ..
            } => resolve_output(newdata, output, "long"),
            Commands::Predict { input, output, .. } => {
                resolve_output(input, output, "predictions")
            }
        }
    }
}

fn resolve_output(input: &Path, output: &Option<PathBuf>, suffix: &str) -> PathBuf {
    output
        .clone()
        .unwrap_or_else(|| derive_output_path(input, suffix))
}

/// `dir/stem.ext` -> `dir/stem_<suffix>.csv`
pub fn derive_output_path(input: &Path, suffix: &str) -> PathBuf {
    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    parent.join(format!("{}_{}.csv", stem, suffix))
}

/// Validator for percentile_width parameter
fn validate_percentile_width(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;

    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(format!(
            "percentile_width must be greater than 0.0 and at most 1.0, got {}",
            value
        ))
    }
}

fn parse_dimension(s: &str) -> Result<Dimension, String> {
    let dimension: Dimension = s.parse()?;
    if let Dimension::Continuous { width, .. } = dimension {
        if !(width.is_finite() && width > 0.0) {
            return Err(format!("bucket width must be positive, got {}", width));
        }
    }
    Ok(dimension)
}

fn parse_target(s: &str) -> Result<Field, String> {
    let field: Field = s.parse().map_err(|e: crate::pipeline::SchemaError| e.to_string())?;
    if field.is_ordinal() {
        Ok(field)
    } else {
        Err(format!(
            "'{}' is not an ordinal outcome (use arrival_order, arrival_bin or arrival_order_percentile_bin)",
            field
        ))
    }
}

fn parse_formula(s: &str) -> Result<ModelSpec, String> {
    s.parse::<ModelSpec>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_percentile_width() {
        assert_eq!(validate_percentile_width("0.1"), Ok(0.1));
        assert_eq!(validate_percentile_width("1"), Ok(1.0));
        assert!(validate_percentile_width("0").is_err());
        assert!(validate_percentile_width("1.5").is_err());
        assert!(validate_percentile_width("-0.1").is_err());
        assert!(validate_percentile_width("abc").is_err());
    }

    #[test]
    fn test_parse_target_requires_ordinal() {
        assert_eq!(parse_target("arrival_bin"), Ok(Field::ArrivalBin));
        assert!(parse_target("status").is_err());
    }

    #[test]
    fn test_parse_dimension_rejects_zero_width() {
        assert!(parse_dimension("foraging_success:0").is_err());
        assert_eq!(
            parse_dimension("foraging_success:0.2"),
            Ok(Dimension::continuous(Field::ForagingSuccess, 0.2))
        );
    }

    #[test]
    fn test_derive_output_path() {
        assert_eq!(
            derive_output_path(Path::new("/data/foraging.csv"), "bins"),
            PathBuf::from("/data/foraging_bins.csv")
        );
    }
}
