//! Binned aggregation of an ordinal outcome over explanatory dimensions
//!
//! Rows are grouped by one or two explanatory dimensions (a categorical
//! column, or a continuous column cut into fixed-width buckets) and the
//! share of each ordinal level is computed per group.
//!
//! Proportions use the row count of the **whole table** as denominator, so
//! the levels of one bucket sum to that bucket's share of the data and only
//! the grand total sums to 1.0. Charts built from these tables stack to the
//! bucket share rather than to 1.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use polars::prelude::*;
use serde::Serialize;

use super::buckets::{bucket_values, format_label};
use super::error::{AggregateError, BucketingError, SchemaError};
use super::schema::{Field, ObservationTable, OrdinalLevel};

/// Name of the level column in long-form output
pub const LEVEL_COLUMN: &str = "level";
/// Name of the count column in long-form output
pub const COUNT_COLUMN: &str = "count";
/// Name of the proportion column in long-form output
pub const PROPORTION_COLUMN: &str = "proportion";
/// Name of the cumulative proportion column in long-form output
pub const CUMULATIVE_COLUMN: &str = "cumulative_proportion";

/// How rows are grouped along one explanatory axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dimension {
    /// One group per distinct value of the column
    Categorical { field: Field },
    /// Fixed-width buckets `[k*w, (k+1)*w)` over a numeric column
    Continuous { field: Field, width: f64 },
}

impl Dimension {
    pub fn categorical(field: Field) -> Self {
        Dimension::Categorical { field }
    }

    pub fn continuous(field: Field, width: f64) -> Self {
        Dimension::Continuous { field, width }
    }

    pub fn field(&self) -> Field {
        match self {
            Dimension::Categorical { field } | Dimension::Continuous { field, .. } => *field,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Categorical { field } => write!(f, "{}", field),
            Dimension::Continuous { field, width } => write!(f, "{}:{}", field, width),
        }
    }
}

impl FromStr for Dimension {
    type Err = String;

    /// Parse `column` or `column:width`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, width) = match s.split_once(':') {
            Some((name, width)) => (name, Some(width)),
            None => (s, None),
        };

        let field = name.parse::<Field>().map_err(|e: SchemaError| e.to_string())?;

        match width {
            None => Ok(Dimension::categorical(field)),
            Some(w) => {
                let width: f64 = w
                    .trim()
                    .parse()
                    .map_err(|_| format!("'{}' is not a valid bucket width", w))?;
                if !field.is_numeric() {
                    return Err(format!(
                        "Column '{}' is categorical and cannot be bucketed",
                        field
                    ));
                }
                Ok(Dimension::continuous(field, width))
            }
        }
    }
}

/// The bucket an observation falls into along one dimension
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BucketKey {
    Category(String),
    /// Lower bound of a fixed-width bucket
    Interval(f64),
}

impl BucketKey {
    pub fn label(&self) -> String {
        match self {
            BucketKey::Category(label) => label.clone(),
            BucketKey::Interval(lower) => format_label(*lower),
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Count and global-denominator proportion of one (bucket, level) cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedBin {
    /// One key per dimension, in dimension order
    pub buckets: Vec<BucketKey>,
    pub level: OrdinalLevel,
    pub count: usize,
    /// `count / total rows`
    pub proportion: f64,
}

/// Running total of [`AggregatedBin::proportion`] over the levels of one bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeBin {
    pub buckets: Vec<BucketKey>,
    pub level: OrdinalLevel,
    pub cumulative_proportion: f64,
}

/// Row count of one bucket combination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketShare {
    pub buckets: Vec<BucketKey>,
    pub count: usize,
    /// `count / total rows`
    pub share: f64,
}

/// Result of [`aggregate`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    pub dimensions: Vec<Dimension>,
    pub target: Field,
    /// Every level of the target, observed or not
    pub levels: Vec<OrdinalLevel>,
    /// Denominator shared by every proportion
    pub total: usize,
    /// Bucket combinations in order, all levels within each
    pub bins: Vec<AggregatedBin>,
}

impl Aggregation {
    fn bucket_chunks(&self) -> std::slice::Chunks<'_, AggregatedBin> {
        // levels is never empty for a non-empty table; max(1) keeps chunks() from panicking
        self.bins.chunks(self.levels.len().max(1))
    }

    /// Per-bucket row counts and share of the data
    pub fn bucket_shares(&self) -> Vec<BucketShare> {
        self.bucket_chunks()
            .map(|chunk| {
                let count: usize = chunk.iter().map(|b| b.count).sum();
                BucketShare {
                    buckets: chunk[0].buckets.clone(),
                    count,
                    share: chunk.iter().map(|b| b.proportion).sum(),
                }
            })
            .collect()
    }

    /// Cumulative proportions `P(level <= k)` within each bucket, same denominator
    pub fn cumulative(&self) -> Vec<CumulativeBin> {
        let mut out = Vec::with_capacity(self.bins.len());
        for chunk in self.bucket_chunks() {
            let mut running = 0.0;
            for bin in chunk {
                running += bin.proportion;
                out.push(CumulativeBin {
                    buckets: bin.buckets.clone(),
                    level: bin.level.clone(),
                    cumulative_proportion: running,
                });
            }
        }
        out
    }

    /// Sum of every proportion; 1.0 up to rounding for a non-empty table
    pub fn total_proportion(&self) -> f64 {
        self.bins.iter().map(|b| b.proportion).sum()
    }

    /// Long-form table: one column per dimension, then `level`, `count`, `proportion`
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut columns = self.dimension_columns(self.bins.iter().map(|b| &b.buckets));
        columns.push(Column::new(
            LEVEL_COLUMN.into(),
            self.bins
                .iter()
                .map(|b| b.level.label.clone())
                .collect::<Vec<String>>(),
        ));
        columns.push(Column::new(
            COUNT_COLUMN.into(),
            self.bins.iter().map(|b| b.count as u64).collect::<Vec<_>>(),
        ));
        columns.push(Column::new(
            PROPORTION_COLUMN.into(),
            self.bins.iter().map(|b| b.proportion).collect::<Vec<_>>(),
        ));
        DataFrame::new(columns)
    }

    /// Long-form cumulative table: dimension columns, `level`, `cumulative_proportion`
    pub fn cumulative_dataframe(&self) -> PolarsResult<DataFrame> {
        let cumulative = self.cumulative();
        let mut columns = self.dimension_columns(cumulative.iter().map(|b| &b.buckets));
        columns.push(Column::new(
            LEVEL_COLUMN.into(),
            cumulative
                .iter()
                .map(|b| b.level.label.clone())
                .collect::<Vec<String>>(),
        ));
        columns.push(Column::new(
            CUMULATIVE_COLUMN.into(),
            cumulative
                .iter()
                .map(|b| b.cumulative_proportion)
                .collect::<Vec<_>>(),
        ));
        DataFrame::new(columns)
    }

    fn dimension_columns<'a>(
        &self,
        keys: impl Iterator<Item = &'a Vec<BucketKey>> + Clone,
    ) -> Vec<Column> {
        self.dimensions
            .iter()
            .enumerate()
            .map(|(i, dim)| {
                let name = dim.field().name();
                match dim {
                    Dimension::Categorical { .. } => Column::new(
                        name.into(),
                        keys.clone().map(|k| k[i].label()).collect::<Vec<String>>(),
                    ),
                    Dimension::Continuous { .. } => Column::new(
                        name.into(),
                        keys.clone()
                            .map(|k| match &k[i] {
                                BucketKey::Interval(lower) => *lower,
                                BucketKey::Category(_) => f64::NAN,
                            })
                            .collect::<Vec<f64>>(),
                    ),
                }
            })
            .collect()
    }
}

/// Observed buckets of one dimension and the bucket of every row
struct DimensionBuckets {
    keys: Vec<BucketKey>,
    assignment: Vec<usize>,
}

/// Aggregate `target` over one or two explanatory dimensions.
///
/// Every observed bucket combination is paired with every level of the target,
/// so unobserved levels show up with a count of zero.
///
/// # Arguments
/// * `table` - Normalized observations
/// * `dimensions` - One or two grouping dimensions
/// * `target` - Ordinal outcome (`arrival_order`, `arrival_bin` or `arrival_order_percentile_bin`)
pub fn aggregate(
    table: &ObservationTable,
    dimensions: &[Dimension],
    target: Field,
) -> Result<Aggregation, AggregateError> {
    if dimensions.is_empty() || dimensions.len() > 2 {
        return Err(AggregateError::DimensionCount(dimensions.len()));
    }
    if dimensions.len() == 2 && dimensions[0].field() == dimensions[1].field() {
        return Err(AggregateError::DuplicateDimension(
            dimensions[0].field().name().to_string(),
        ));
    }

    let levels = table.ordinal_levels(target)?;
    let total = table.len();

    let per_dimension: Vec<DimensionBuckets> = dimensions
        .iter()
        .map(|dim| assign_buckets(table, dim))
        .collect::<Result<_, _>>()?;

    // Bucket-index combination -> count per level rank
    let mut counts: BTreeMap<Vec<usize>, Vec<usize>> = BTreeMap::new();
    for (row, obs) in table.observations().iter().enumerate() {
        let combo: Vec<usize> = per_dimension.iter().map(|d| d.assignment[row]).collect();
        let rank = table
            .ordinal_rank(obs, target)
            .ok_or_else(|| SchemaError::NotOrdinal {
                column: target.name().to_string(),
            })?;

        counts.entry(combo).or_insert_with(|| vec![0; levels.len()])[rank] += 1;
    }

    let mut bins = Vec::with_capacity(counts.len() * levels.len());
    for (combo, level_counts) in &counts {
        let buckets: Vec<BucketKey> = combo
            .iter()
            .zip(&per_dimension)
            .map(|(&i, d)| d.keys[i].clone())
            .collect();

        for level in &levels {
            let count = level_counts[level.rank];
            bins.push(AggregatedBin {
                buckets: buckets.clone(),
                level: level.clone(),
                count,
                proportion: count as f64 / total as f64,
            });
        }
    }

    Ok(Aggregation {
        dimensions: dimensions.to_vec(),
        target,
        levels,
        total,
        bins,
    })
}

fn assign_buckets(
    table: &ObservationTable,
    dimension: &Dimension,
) -> Result<DimensionBuckets, AggregateError> {
    match *dimension {
        Dimension::Categorical { field } => {
            let labels: Vec<String> = table
                .observations()
                .iter()
                .map(|obs| table.label(obs, field))
                .collect();

            let ordered = natural_order(labels.iter().cloned().collect::<BTreeSet<_>>());
            let index: HashMap<&str, usize> = ordered
                .iter()
                .enumerate()
                .map(|(i, l)| (l.as_str(), i))
                .collect();
            let assignment = labels.iter().map(|l| index[l.as_str()]).collect();

            Ok(DimensionBuckets {
                keys: ordered.into_iter().map(BucketKey::Category).collect(),
                assignment,
            })
        }
        Dimension::Continuous { field, width } => {
            let values: Vec<f64> = table
                .observations()
                .iter()
                .map(|obs| table.numeric(obs, field))
                .collect::<Option<_>>()
                .ok_or_else(|| BucketingError::NotContinuous {
                    column: field.name().to_string(),
                })?;

            let (layout, indices) = bucket_values(&values, width, field.name())?;

            // Only buckets that hold at least one row
            let observed: Vec<usize> = indices
                .iter()
                .copied()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let position: HashMap<usize, usize> =
                observed.iter().enumerate().map(|(pos, &k)| (k, pos)).collect();

            Ok(DimensionBuckets {
                keys: observed
                    .iter()
                    .map(|&k| BucketKey::Interval(layout.lower_bound(k)))
                    .collect(),
                assignment: indices.iter().map(|k| position[k]).collect(),
            })
        }
    }
}

/// Numeric order when every label parses as a number, otherwise lexicographic
fn natural_order(labels: BTreeSet<String>) -> Vec<String> {
    let numeric: Option<Vec<(f64, String)>> = labels
        .iter()
        .map(|l| l.trim().parse::<f64>().ok().map(|v| (v, l.clone())))
        .collect();

    match numeric {
        Some(mut pairs) => {
            pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            pairs.into_iter().map(|(_, l)| l).collect()
        }
        None => labels.into_iter().collect(),
    }
}
