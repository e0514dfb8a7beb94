//! Wide-to-long reshaping of model prediction matrices
//!
//! A prediction matrix has one row per explanatory combination (a row of
//! `newdata`) and one column per ordinal level. Charting wants one row per
//! (combination, level) pair instead. Probabilities are passed through
//! untouched; only the layout changes.

use std::collections::HashSet;

use faer::Mat;
use polars::prelude::*;
use serde::Serialize;

use super::aggregate::LEVEL_COLUMN;
use super::error::ReshapeError;

/// Name of the probability column in long-form output
pub const PROBABILITY_COLUMN: &str = "probability";

/// One (combination, level) cell of a prediction matrix
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    /// Row index into the combinations frame
    pub combination: usize,
    pub level: String,
    pub probability: f64,
}

/// Long-form predictions, combinations in input order and levels in label order
#[derive(Debug, Clone)]
pub struct LongPredictions {
    newdata: DataFrame,
    level_labels: Vec<String>,
    rows: Vec<PredictionRow>,
}

impl LongPredictions {
    pub fn rows(&self) -> &[PredictionRow] {
        &self.rows
    }

    pub fn newdata(&self) -> &DataFrame {
        &self.newdata
    }

    pub fn level_labels(&self) -> &[String] {
        &self.level_labels
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every combination column unchanged, repeated per level, then `level` and `probability`
    pub fn to_dataframe(&self) -> Result<DataFrame, ReshapeError> {
        let frame = |e: PolarsError| ReshapeError::Frame(e.to_string());

        let indices: Vec<IdxSize> = self
            .rows
            .iter()
            .map(|r| r.combination as IdxSize)
            .collect();
        let indices = IdxCa::from_vec("combination".into(), indices);

        let repeated = self.newdata.take(&indices).map_err(frame)?;
        repeated
            .hstack(&[
                Column::new(
                    LEVEL_COLUMN.into(),
                    self.rows.iter().map(|r| r.level.clone()).collect::<Vec<String>>(),
                ),
                Column::new(
                    PROBABILITY_COLUMN.into(),
                    self.rows.iter().map(|r| r.probability).collect::<Vec<f64>>(),
                ),
            ])
            .map_err(frame)
    }

    /// Inverse pivot back to the wide matrix
    pub fn widen(&self) -> Mat<f64> {
        let n_levels = self.level_labels.len();
        let mut wide = Mat::<f64>::zeros(self.newdata.height(), n_levels);
        for (i, row) in self.rows.iter().enumerate() {
            wide[(row.combination, i % n_levels)] = row.probability;
        }
        wide
    }
}

/// Reshape a wide prediction matrix into long form.
///
/// # Arguments
/// * `newdata` - One row per explanatory combination, in matrix row order
/// * `probabilities` - `newdata.height()` x `level_labels.len()` matrix
/// * `level_labels` - Label of each matrix column, in level order
pub fn reshape_predictions(
    newdata: &DataFrame,
    probabilities: &Mat<f64>,
    level_labels: &[String],
) -> Result<LongPredictions, ReshapeError> {
    if probabilities.ncols() != level_labels.len() {
        return Err(ReshapeError::LevelCountMismatch {
            expected: level_labels.len(),
            found: probabilities.ncols(),
        });
    }
    if probabilities.nrows() != newdata.height() {
        return Err(ReshapeError::RowCountMismatch {
            expected: newdata.height(),
            found: probabilities.nrows(),
        });
    }

    let mut seen = HashSet::new();
    for label in level_labels {
        if !seen.insert(label.as_str()) {
            return Err(ReshapeError::DuplicateLevel(label.clone()));
        }
    }

    for name in newdata.get_column_names() {
        if name.as_str() == LEVEL_COLUMN || name.as_str() == PROBABILITY_COLUMN {
            return Err(ReshapeError::ColumnConflict(name.to_string()));
        }
    }

    let mut rows = Vec::with_capacity(probabilities.nrows() * level_labels.len());
    for combination in 0..probabilities.nrows() {
        for (j, label) in level_labels.iter().enumerate() {
            rows.push(PredictionRow {
                combination,
                level: label.clone(),
                probability: probabilities[(combination, j)],
            });
        }
    }

    Ok(LongPredictions {
        newdata: newdata.clone(),
        level_labels: level_labels.to_vec(),
        rows,
    })
}

/// Inverse pivot of a long-form frame laid out as [`LongPredictions::to_dataframe`] writes it.
///
/// Rows must come in blocks of `level_labels.len()`, one block per combination,
/// levels in label order. Returns the combinations frame and the wide matrix.
pub fn widen_predictions(
    long: &DataFrame,
    level_labels: &[String],
) -> Result<(DataFrame, Mat<f64>), ReshapeError> {
    let frame = |e: PolarsError| ReshapeError::Frame(e.to_string());

    let levels = long
        .column(LEVEL_COLUMN)
        .map_err(|_| ReshapeError::MissingColumn(LEVEL_COLUMN.to_string()))?
        .cast(&DataType::String)
        .map_err(frame)?;
    let probabilities = long
        .column(PROBABILITY_COLUMN)
        .map_err(|_| ReshapeError::MissingColumn(PROBABILITY_COLUMN.to_string()))?
        .cast(&DataType::Float64)
        .map_err(frame)?;

    let n_levels = level_labels.len();
    if n_levels == 0 {
        return Err(ReshapeError::Frame("no level labels supplied".to_string()));
    }
    if long.height() % n_levels != 0 {
        return Err(ReshapeError::RowCountMismatch {
            expected: (long.height() / n_levels + 1) * n_levels,
            found: long.height(),
        });
    }

    let n_rows = long.height() / n_levels;
    let mut wide = Mat::<f64>::zeros(n_rows, n_levels);

    let level_values = levels.str().map_err(frame)?;
    let probability_values = probabilities.f64().map_err(frame)?;

    for (row, (level, probability)) in level_values
        .into_iter()
        .zip(probability_values.into_iter())
        .enumerate()
    {
        let expected = &level_labels[row % n_levels];
        let found = level.unwrap_or("");
        if found != expected {
            return Err(ReshapeError::UnexpectedLevel {
                row,
                expected: expected.clone(),
                found: found.to_string(),
            });
        }
        wide[(row / n_levels, row % n_levels)] = probability.ok_or_else(|| {
            ReshapeError::Frame(format!("missing probability at row {}", row))
        })?;
    }

    let first_of_block: Vec<IdxSize> = (0..n_rows).map(|i| (i * n_levels) as IdxSize).collect();
    let combinations = long
        .drop_many([LEVEL_COLUMN, PROBABILITY_COLUMN])
        .take(&IdxCa::from_vec("combination".into(), first_of_block))
        .map_err(frame)?;

    Ok((combinations, wide))
}

/// Read a wide probability table: one numeric column per level, headers are the level labels
pub fn probabilities_from_frame(df: &DataFrame) -> Result<(Vec<String>, Mat<f64>), ReshapeError> {
    let frame = |e: PolarsError| ReshapeError::Frame(e.to_string());

    let labels: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let mut wide = Mat::<f64>::zeros(df.height(), labels.len());

    for (j, column) in df.get_columns().iter().enumerate() {
        let values = column.cast(&DataType::Float64).map_err(frame)?;
        for (i, value) in values.f64().map_err(frame)?.into_iter().enumerate() {
            wide[(i, j)] = value.ok_or_else(|| {
                ReshapeError::Frame(format!(
                    "missing probability in column '{}' at row {}",
                    labels[j], i
                ))
            })?;
        }
    }

    Ok((labels, wide))
}
