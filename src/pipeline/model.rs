//! Boundary to the statistical modelling backend
//!
//! Fitting cumulative-link (mixed) models is left to an external library.
//! This module fixes the contract the pipeline consumes: a model is fitted
//! from a [`ModelSpec`] and an [`ObservationTable`], and predicts a wide
//! probability matrix (one row per `newdata` row, one column per level)
//! that [`super::reshape::reshape_predictions`] turns into long form.
//!
//! [`EmpiricalModel`] is a reference backend that predicts the observed
//! level frequencies of each predictor combination. It is useful for
//! charts of raw data and for exercising the pipeline end to end.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use faer::Mat;
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;

use super::aggregate::{aggregate, BucketKey, Dimension};
use super::buckets::{format_label, FixedWidthBuckets};
use super::error::{AggregateError, SchemaError};
use super::schema::{Field, ObservationTable, Status};

/// Errors raised by model backends
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Model failed to converge after {iterations} iteration(s): {message}")]
    Convergence { iterations: usize, message: String },

    #[error("Singular fit: {0}")]
    Singularity(String),

    #[error("Invalid formula '{formula}': {message}")]
    Formula { formula: String, message: String },

    #[error("newdata has no predictor column '{0}'")]
    MissingPredictor(String),

    #[error("newdata row {row} has combination ({combination}) that was not seen during fitting")]
    UnseenCombination { row: usize, combination: String },

    #[error("newdata has a missing value in column '{column}' at row {row}")]
    MissingValue { column: String, row: usize },

    #[error("newdata value {value} in column '{column}' at row {row} lies outside the fitted range [0, {upper}]")]
    OutOfRange {
        column: String,
        row: usize,
        value: f64,
        upper: f64,
    },

    #[error("Failed to read newdata: {0}")]
    Frame(String),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Response, fixed-effect predictors and random-effect groupings of a model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSpec {
    pub response: Field,
    pub predictors: Vec<Dimension>,
    /// Grouping factors of random intercepts, `(1|group_id)`
    pub random_effects: Vec<Field>,
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut terms: Vec<String> = self.predictors.iter().map(|d| d.to_string()).collect();
        terms.extend(self.random_effects.iter().map(|g| format!("(1|{})", g)));
        if terms.is_empty() {
            terms.push("1".to_string());
        }
        write!(f, "{} ~ {}", self.response, terms.join(" + "))
    }
}

impl FromStr for ModelSpec {
    type Err = ModelError;

    /// Parse `response ~ term + term + (1|group)`; continuous terms are written `column:width`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: String| ModelError::Formula {
            formula: s.to_string(),
            message,
        };

        let (lhs, rhs) = s
            .split_once('~')
            .ok_or_else(|| invalid("expected 'response ~ predictors'".to_string()))?;

        let response = lhs
            .trim()
            .parse::<Field>()
            .map_err(|e: SchemaError| invalid(e.to_string()))?;
        if !response.is_ordinal() {
            return Err(invalid(format!("response '{}' is not ordinal", response)));
        }

        let mut predictors = Vec::new();
        let mut random_effects = Vec::new();

        for term in rhs.split('+').map(str::trim) {
            if term.is_empty() {
                return Err(invalid("empty term".to_string()));
            }
            if term == "1" {
                continue;
            }
            if let Some(inner) = term.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
                let group = inner
                    .split_once('|')
                    .filter(|(intercept, _)| intercept.trim() == "1")
                    .map(|(_, group)| group.trim())
                    .ok_or_else(|| invalid(format!("unsupported random term '{}'", term)))?;
                let group = group
                    .parse::<Field>()
                    .map_err(|e: SchemaError| invalid(e.to_string()))?;
                random_effects.push(group);
                continue;
            }
            predictors.push(term.parse::<Dimension>().map_err(invalid)?);
        }

        Ok(ModelSpec {
            response,
            predictors,
            random_effects,
        })
    }
}

/// A fitted model as seen by the pipeline
pub trait FittedModel {
    fn spec(&self) -> &ModelSpec;

    /// Labels of the prediction matrix columns, in level order
    fn level_labels(&self) -> Vec<String>;
}

/// A statistical backend able to fit and predict an ordinal model
pub trait OrdinalModel {
    type Fitted: FittedModel;

    fn fit(&self, spec: &ModelSpec, data: &ObservationTable) -> Result<Self::Fitted, ModelError>;

    /// Per-level probabilities, `newdata.height()` x `level_labels().len()`
    fn predict(&self, fitted: &Self::Fitted, newdata: &DataFrame) -> Result<Mat<f64>, ModelError>;
}

/// Predicts the observed level frequencies of each predictor combination
#[derive(Debug, Clone, Copy, Default)]
pub struct EmpiricalModel;

/// Fitted state of [`EmpiricalModel`]
#[derive(Debug, Clone)]
pub struct EmpiricalFit {
    spec: ModelSpec,
    levels: Vec<String>,
    /// Bucket layout of each continuous predictor, `None` for categorical ones
    layouts: Vec<Option<FixedWidthBuckets>>,
    /// Bucket labels per predictor -> probability per level
    probabilities: HashMap<Vec<String>, Vec<f64>>,
    /// Combinations in aggregation order
    combinations: Vec<Vec<BucketKey>>,
}

impl EmpiricalFit {
    /// Observed predictor combinations, in bucket order
    pub fn combinations(&self) -> &[Vec<BucketKey>] {
        &self.combinations
    }
}

impl FittedModel for EmpiricalFit {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn level_labels(&self) -> Vec<String> {
        self.levels.clone()
    }
}

impl OrdinalModel for EmpiricalModel {
    type Fitted = EmpiricalFit;

    fn fit(&self, spec: &ModelSpec, data: &ObservationTable) -> Result<EmpiricalFit, ModelError> {
        let aggregation = aggregate(data, &spec.predictors, spec.response)?;

        let observed_levels = aggregation
            .levels
            .iter()
            .filter(|level| {
                aggregation
                    .bins
                    .iter()
                    .any(|b| b.level.rank == level.rank && b.count > 0)
            })
            .count();
        if observed_levels < 2 {
            return Err(ModelError::Singularity(format!(
                "response '{}' has fewer than two observed levels",
                spec.response
            )));
        }

        let layouts = spec
            .predictors
            .iter()
            .map(|dim| match *dim {
                Dimension::Categorical { .. } => Ok(None),
                Dimension::Continuous { field, width } => {
                    let max = data
                        .observations()
                        .iter()
                        .filter_map(|obs| data.numeric(obs, field))
                        .fold(0.0f64, f64::max);
                    FixedWidthBuckets::covering(width, max)
                        .map(Some)
                        .map_err(|e| ModelError::Aggregate(e.into()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut probabilities = HashMap::new();
        let mut combinations = Vec::new();
        for share in aggregation.bucket_shares() {
            let counts: Vec<f64> = aggregation
                .bins
                .iter()
                .filter(|b| b.buckets == share.buckets)
                .map(|b| b.count as f64 / share.count as f64)
                .collect();
            let key: Vec<String> = share.buckets.iter().map(BucketKey::label).collect();
            probabilities.insert(key, counts);
            combinations.push(share.buckets);
        }

        Ok(EmpiricalFit {
            spec: spec.clone(),
            levels: aggregation.levels.iter().map(|l| l.label.clone()).collect(),
            layouts,
            probabilities,
            combinations,
        })
    }

    fn predict(&self, fitted: &EmpiricalFit, newdata: &DataFrame) -> Result<Mat<f64>, ModelError> {
        let keys = newdata_keys(&fitted.spec.predictors, &fitted.layouts, newdata)?;
        let mut wide = Mat::<f64>::zeros(newdata.height(), fitted.levels.len());

        for (row, key) in keys.iter().enumerate() {
            let probs = fitted
                .probabilities
                .get(key)
                .ok_or_else(|| ModelError::UnseenCombination {
                    row,
                    combination: key.join(", "),
                })?;
            for (j, &p) in probs.iter().enumerate() {
                wide[(row, j)] = p;
            }
        }

        Ok(wide)
    }
}

/// Bucket labels of every `newdata` row, one per predictor
fn newdata_keys(
    predictors: &[Dimension],
    layouts: &[Option<FixedWidthBuckets>],
    newdata: &DataFrame,
) -> Result<Vec<Vec<String>>, ModelError> {
    let frame = |e: PolarsError| ModelError::Frame(e.to_string());
    let mut keys = vec![Vec::with_capacity(predictors.len()); newdata.height()];

    for (dim, layout) in predictors.iter().zip(layouts) {
        let name = dim.field().name();
        let column = newdata
            .column(name)
            .map_err(|_| ModelError::MissingPredictor(name.to_string()))?;

        match layout {
            None => {
                let text = column.cast(&DataType::String).map_err(frame)?;
                for (row, value) in text.str().map_err(frame)?.into_iter().enumerate() {
                    let value = value.ok_or_else(|| ModelError::MissingValue {
                        column: name.to_string(),
                        row,
                    })?;
                    let label = if dim.field() == Field::Status {
                        value
                            .parse::<Status>()
                            .map(|s| s.label().to_string())
                            .unwrap_or_else(|_| value.to_string())
                    } else {
                        value.to_string()
                    };
                    keys[row].push(label);
                }
            }
            Some(buckets) => {
                let numbers = column.cast(&DataType::Float64).map_err(frame)?;
                for (row, value) in numbers.f64().map_err(frame)?.into_iter().enumerate() {
                    let value = value.ok_or_else(|| ModelError::MissingValue {
                        column: name.to_string(),
                        row,
                    })?;
                    if !buckets.contains(value) {
                        return Err(ModelError::OutOfRange {
                            column: name.to_string(),
                            row,
                            value,
                            upper: buckets.upper_bound(),
                        });
                    }
                    keys[row].push(format_label(buckets.lower_bound(buckets.index_of(value))));
                }
            }
        }
    }

    Ok(keys)
}

/// `newdata` holding every observed predictor combination of a fitted empirical model.
///
/// Categorical predictors become text columns and continuous ones hold the
/// bucket lower bound, so predicting on the grid maps each row back to its bucket.
pub fn prediction_grid(fitted: &EmpiricalFit) -> Result<DataFrame, ModelError> {
    let columns: Vec<Column> = fitted
        .spec
        .predictors
        .iter()
        .enumerate()
        .map(|(i, dim)| {
            let name = dim.field().name();
            match dim {
                Dimension::Categorical { .. } => Column::new(
                    name.into(),
                    fitted
                        .combinations
                        .iter()
                        .map(|c| c[i].label())
                        .collect::<Vec<String>>(),
                ),
                Dimension::Continuous { .. } => Column::new(
                    name.into(),
                    fitted
                        .combinations
                        .iter()
                        .map(|c| match &c[i] {
                            BucketKey::Interval(lower) => *lower,
                            BucketKey::Category(_) => f64::NAN,
                        })
                        .collect::<Vec<f64>>(),
                ),
            }
        })
        .collect();

    DataFrame::new(columns).map_err(|e| ModelError::Frame(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_parsing() {
        let spec: ModelSpec = "arrival_order ~ status + foraging_success:0.2 + (1|group_id)"
            .parse()
            .unwrap();

        assert_eq!(spec.response, Field::ArrivalOrder);
        assert_eq!(
            spec.predictors,
            vec![
                Dimension::categorical(Field::Status),
                Dimension::continuous(Field::ForagingSuccess, 0.2)
            ]
        );
        assert_eq!(spec.random_effects, vec![Field::GroupId]);
    }

    #[test]
    fn test_formula_display_round_trips() {
        let text = "arrival_bin ~ status + (1|group_id) + (1|individual_id)";
        let spec: ModelSpec = text.parse().unwrap();
        assert_eq!(spec.to_string(), text);
        assert_eq!(spec.to_string().parse::<ModelSpec>().unwrap(), spec);
    }

    #[test]
    fn test_formula_rejects_non_ordinal_response() {
        let err = "status ~ foraging_success:0.1".parse::<ModelSpec>().unwrap_err();
        assert!(matches!(err, ModelError::Formula { .. }));
        assert!(err.to_string().contains("not ordinal"));
    }

    #[test]
    fn test_formula_rejects_random_slopes() {
        assert!("arrival_order ~ status + (status|group_id)"
            .parse::<ModelSpec>()
            .is_err());
        assert!("arrival_order status".parse::<ModelSpec>().is_err());
        assert!("arrival_order ~ status +".parse::<ModelSpec>().is_err());
    }
}
