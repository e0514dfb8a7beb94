//! Error types for the normalization, bucketing, aggregation and reshaping stages.
//!
//! Every variant carries enough context (row index, column name, group) to
//! locate the offending input. None of these are recoverable inside the
//! pipeline; they are surfaced to the caller as-is.

use thiserror::Error;

/// Malformed or inconsistent observation tables.
///
/// Row indices are zero-based positions of data rows (the header is not counted).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("Required column '{column}' not found. Available columns: {available:?}")]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("Table contains zero data rows")]
    EmptyTable,

    #[error("Null value in column '{column}' at row {row}")]
    NullValue { column: String, row: usize },

    #[error("Column '{column}' could not be read as {expected}: {message}")]
    InvalidColumn {
        column: String,
        expected: &'static str,
        message: String,
    },

    #[error("Value '{value}' in column '{column}' at row {row} is not a valid {expected}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
        expected: &'static str,
    },

    #[error("Unknown status '{value}' at row {row} (expected Dom/Dominant or Sub/Subordinate)")]
    UnknownStatus { row: usize, value: String },

    #[error("Group size must be between 1 and 4294967295, found {group_size} at row {row}")]
    InvalidGroupSize { row: usize, group_size: i64 },

    #[error(
        "Group '{group_id}' has group size {found} at row {row}, but {expected} earlier in the table"
    )]
    InconsistentGroupSize {
        group_id: String,
        row: usize,
        expected: i64,
        found: i64,
    },

    #[error("Arrival order {arrival_order} at row {row} is outside [1, {group_size}]")]
    ArrivalOrderOutOfRange {
        row: usize,
        arrival_order: i64,
        group_size: i64,
    },

    #[error(
        "Arrival order {arrival_order} appears twice in group '{group_id}', test '{test_id}' (row {row})"
    )]
    DuplicateArrivalOrder {
        group_id: String,
        test_id: String,
        arrival_order: i64,
        row: usize,
    },

    #[error(
        "Group '{group_id}', test '{test_id}' has {found} arrival(s) but group size {group_size}"
    )]
    IncompleteRanking {
        group_id: String,
        test_id: String,
        found: usize,
        group_size: i64,
    },

    #[error("Foraging success {value} at row {row} is outside [0, 1]")]
    ForagingSuccessOutOfRange { row: usize, value: f64 },

    #[error("Percentile bin width must be in (0, 1], got {0}")]
    InvalidPercentileWidth(f64),

    #[error("Column '{column}' is not an ordinal outcome")]
    NotOrdinal { column: String },

    #[error("Unknown column '{0}'")]
    UnknownField(String),
}

/// Invalid fixed-width bucketing requests.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BucketingError {
    #[error("Bucket width must be positive and finite, got {0}")]
    InvalidWidth(f64),

    #[error("Non-finite value {value} in column '{column}' at row {row}")]
    NonFinite {
        column: String,
        row: usize,
        value: f64,
    },

    #[error("Negative value {value} in column '{column}' at row {row}; buckets start at 0")]
    NegativeValue {
        column: String,
        row: usize,
        value: f64,
    },

    #[error("Column '{column}' is not numeric and cannot be bucketed")]
    NotContinuous { column: String },
}

/// Failures of the binned aggregator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Bucketing(#[from] BucketingError),

    #[error("Aggregation takes one or two explanatory dimensions, got {0}")]
    DimensionCount(usize),

    #[error("Column '{0}' is used by more than one explanatory dimension")]
    DuplicateDimension(String),
}

/// Shape mismatches between a prediction matrix and its labels.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReshapeError {
    #[error("Prediction matrix has {found} column(s) but {expected} level label(s) were supplied")]
    LevelCountMismatch { expected: usize, found: usize },

    #[error("Prediction matrix has {found} row(s) but {expected} combination(s) were supplied")]
    RowCountMismatch { expected: usize, found: usize },

    #[error("Level label '{0}' is listed more than once")]
    DuplicateLevel(String),

    #[error("Combination column '{0}' collides with an output column")]
    ColumnConflict(String),

    #[error("Long-form table has no '{0}' column")]
    MissingColumn(String),

    #[error("Row {row} has level '{found}' where '{expected}' was expected")]
    UnexpectedLevel {
        row: usize,
        expected: String,
        found: String,
    },

    #[error("Failed to build long-form table: {0}")]
    Frame(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_display() {
        let err = SchemaError::MissingColumn {
            column: "status".to_string(),
            available: vec!["group_id".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Required column 'status' not found. Available columns: [\"group_id\"]"
        );
    }

    #[test]
    fn test_out_of_range_display_names_row() {
        let err = SchemaError::ArrivalOrderOutOfRange {
            row: 7,
            arrival_order: 5,
            group_size: 4,
        };
        assert_eq!(err.to_string(), "Arrival order 5 at row 7 is outside [1, 4]");
    }

    #[test]
    fn test_inconsistent_group_size_display() {
        let err = SchemaError::InconsistentGroupSize {
            group_id: "G1".to_string(),
            row: 3,
            expected: 4,
            found: 5,
        };
        assert!(err.to_string().contains("'G1'"));
        assert!(err.to_string().contains("row 3"));
    }

    #[test]
    fn test_bucketing_error_display() {
        assert_eq!(
            BucketingError::InvalidWidth(0.0).to_string(),
            "Bucket width must be positive and finite, got 0"
        );
    }

    #[test]
    fn test_aggregate_error_wraps_transparently() {
        let err: AggregateError = BucketingError::InvalidWidth(-1.0).into();
        assert_eq!(
            err.to_string(),
            "Bucket width must be positive and finite, got -1"
        );
    }

    #[test]
    fn test_reshape_error_display() {
        let err = ReshapeError::LevelCountMismatch {
            expected: 3,
            found: 4,
        };
        assert_eq!(
            err.to_string(),
            "Prediction matrix has 4 column(s) but 3 level label(s) were supplied"
        );
    }
}
