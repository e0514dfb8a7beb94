//! Schema normalization for arrival-order observations
//!
//! Turns a raw table (one row per individual per test) into typed
//! [`Observation`] records and derives the binary and relative arrival
//! outcomes. The input frame is never modified; derived columns already
//! present in it are ignored and recomputed, so normalizing the output of
//! [`ObservationTable::to_dataframe`] gives back the same table.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use polars::prelude::*;
use serde::Serialize;

use super::buckets::{format_label, FixedWidthBuckets};
use super::error::SchemaError;

pub const GROUP_ID: &str = "group_id";
pub const TEST_ID: &str = "test_id";
pub const INDIVIDUAL_ID: &str = "individual_id";
pub const STATUS: &str = "status";
pub const ARRIVAL_ORDER: &str = "arrival_order";
pub const FORAGING_SUCCESS: &str = "foraging_success";
pub const GROUP_SIZE: &str = "group_size";
pub const ARRIVAL_BIN: &str = "arrival_bin";
pub const ARRIVAL_ORDER_RELATIVE: &str = "arrival_order_relative";
pub const ARRIVAL_ORDER_PERCENTILE_BIN: &str = "arrival_order_percentile_bin";

/// Columns every input table must carry
pub const REQUIRED_COLUMNS: [&str; 7] = [
    GROUP_ID,
    TEST_ID,
    INDIVIDUAL_ID,
    STATUS,
    ARRIVAL_ORDER,
    FORAGING_SUCCESS,
    GROUP_SIZE,
];

/// Categorical columns whose text is significant (`01` and `1` are different groups)
pub const TEXT_COLUMNS: [&str; 4] = [GROUP_ID, TEST_ID, INDIVIDUAL_ID, STATUS];

/// Default width of the relative arrival-order percentile bins
pub const DEFAULT_PERCENTILE_WIDTH: f64 = 0.1;

/// Social status of an individual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Status {
    Dominant,
    Subordinate,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Dominant => "Dom",
            Status::Subordinate => "Sub",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dom" | "dominant" => Ok(Status::Dominant),
            "sub" | "subordinate" => Ok(Status::Subordinate),
            _ => Err(format!("Unknown status: '{}'", s)),
        }
    }
}

/// A column of the normalized table, raw or derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    GroupId,
    TestId,
    IndividualId,
    Status,
    ArrivalOrder,
    ForagingSuccess,
    GroupSize,
    ArrivalBin,
    ArrivalOrderRelative,
    ArrivalOrderPercentileBin,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::GroupId,
        Field::TestId,
        Field::IndividualId,
        Field::Status,
        Field::ArrivalOrder,
        Field::ForagingSuccess,
        Field::GroupSize,
        Field::ArrivalBin,
        Field::ArrivalOrderRelative,
        Field::ArrivalOrderPercentileBin,
    ];

    /// Column name in tabular input and output
    pub fn name(&self) -> &'static str {
        match self {
            Field::GroupId => GROUP_ID,
            Field::TestId => TEST_ID,
            Field::IndividualId => INDIVIDUAL_ID,
            Field::Status => STATUS,
            Field::ArrivalOrder => ARRIVAL_ORDER,
            Field::ForagingSuccess => FORAGING_SUCCESS,
            Field::GroupSize => GROUP_SIZE,
            Field::ArrivalBin => ARRIVAL_BIN,
            Field::ArrivalOrderRelative => ARRIVAL_ORDER_RELATIVE,
            Field::ArrivalOrderPercentileBin => ARRIVAL_ORDER_PERCENTILE_BIN,
        }
    }

    /// Fields with an ordered, finite level domain
    pub fn is_ordinal(&self) -> bool {
        matches!(
            self,
            Field::ArrivalOrder | Field::ArrivalBin | Field::ArrivalOrderPercentileBin
        )
    }

    /// Fields with a numeric value that can be bucketed
    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            Field::GroupId | Field::TestId | Field::IndividualId | Field::Status
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Field::ALL
            .iter()
            .copied()
            .find(|field| field.name() == name)
            .ok_or_else(|| SchemaError::UnknownField(name.to_string()))
    }
}

/// One individual at one test occasion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub group_id: String,
    pub test_id: String,
    pub individual_id: String,
    pub status: Status,
    /// Rank of arrival at the food patch, 1 = first
    pub arrival_order: u32,
    pub foraging_success: f64,
    pub group_size: u32,
    /// 1 iff the individual arrived first
    pub arrival_bin: u8,
    /// `arrival_order / group_size`, in (0, 1]
    pub arrival_order_relative: f64,
    /// Index of the relative arrival-order bucket
    pub percentile_bin: usize,
}

/// Normalization settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizeOptions {
    /// Width of the `arrival_order_percentile_bin` buckets over (0, 1]
    pub percentile_width: f64,
    /// Accept (group, test) pairs whose ranks do not cover 1..group_size
    pub allow_incomplete_tests: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            percentile_width: DEFAULT_PERCENTILE_WIDTH,
            allow_incomplete_tests: false,
        }
    }
}

/// A level of an ordinal outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrdinalLevel {
    /// Zero-based position in the level ordering
    pub rank: usize,
    pub label: String,
}

/// The typed, validated observation table
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTable {
    observations: Vec<Observation>,
    max_group_size: u32,
    percentile_buckets: FixedWidthBuckets,
    options: NormalizeOptions,
}

impl ObservationTable {
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    /// Largest group size in the table; arrival-order levels run 1..=this
    pub fn max_group_size(&self) -> u32 {
        self.max_group_size
    }

    pub fn percentile_buckets(&self) -> &FixedWidthBuckets {
        &self.percentile_buckets
    }

    /// Display label of `field` for one observation
    pub fn label(&self, obs: &Observation, field: Field) -> String {
        match field {
            Field::GroupId => obs.group_id.clone(),
            Field::TestId => obs.test_id.clone(),
            Field::IndividualId => obs.individual_id.clone(),
            Field::Status => obs.status.label().to_string(),
            Field::ArrivalOrder => obs.arrival_order.to_string(),
            Field::ForagingSuccess => obs.foraging_success.to_string(),
            Field::GroupSize => obs.group_size.to_string(),
            Field::ArrivalBin => obs.arrival_bin.to_string(),
            Field::ArrivalOrderRelative => obs.arrival_order_relative.to_string(),
            Field::ArrivalOrderPercentileBin => {
                format_label(self.percentile_buckets.lower_bound(obs.percentile_bin))
            }
        }
    }

    /// Numeric value of `field`, or `None` for identifier and status columns
    pub fn numeric(&self, obs: &Observation, field: Field) -> Option<f64> {
        match field {
            Field::GroupId | Field::TestId | Field::IndividualId | Field::Status => None,
            Field::ArrivalOrder => Some(obs.arrival_order as f64),
            Field::ForagingSuccess => Some(obs.foraging_success),
            Field::GroupSize => Some(obs.group_size as f64),
            Field::ArrivalBin => Some(obs.arrival_bin as f64),
            Field::ArrivalOrderRelative => Some(obs.arrival_order_relative),
            Field::ArrivalOrderPercentileBin => {
                Some(self.percentile_buckets.lower_bound(obs.percentile_bin))
            }
        }
    }

    /// Full level domain of an ordinal field, observed or not
    pub fn ordinal_levels(&self, field: Field) -> Result<Vec<OrdinalLevel>, SchemaError> {
        let labels: Vec<String> = match field {
            Field::ArrivalOrder => (1..=self.max_group_size).map(|k| k.to_string()).collect(),
            Field::ArrivalBin => vec!["0".to_string(), "1".to_string()],
            Field::ArrivalOrderPercentileBin => self
                .percentile_buckets
                .labels()
                .into_iter()
                .map(format_label)
                .collect(),
            _ => {
                return Err(SchemaError::NotOrdinal {
                    column: field.name().to_string(),
                })
            }
        };

        Ok(labels
            .into_iter()
            .enumerate()
            .map(|(rank, label)| OrdinalLevel { rank, label })
            .collect())
    }

    /// Position of an observation's value within [`Self::ordinal_levels`]
    pub fn ordinal_rank(&self, obs: &Observation, field: Field) -> Option<usize> {
        match field {
            Field::ArrivalOrder => Some(obs.arrival_order as usize - 1),
            Field::ArrivalBin => Some(obs.arrival_bin as usize),
            Field::ArrivalOrderPercentileBin => Some(obs.percentile_bin),
            _ => None,
        }
    }

    /// Render the table with raw and derived columns
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let obs = &self.observations;

        let percentile: Vec<f64> = obs
            .iter()
            .map(|o| self.percentile_buckets.lower_bound(o.percentile_bin))
            .collect();

        DataFrame::new(vec![
            Column::new(
                GROUP_ID.into(),
                obs.iter().map(|o| o.group_id.clone()).collect::<Vec<String>>(),
            ),
            Column::new(
                TEST_ID.into(),
                obs.iter().map(|o| o.test_id.clone()).collect::<Vec<String>>(),
            ),
            Column::new(
                INDIVIDUAL_ID.into(),
                obs.iter().map(|o| o.individual_id.clone()).collect::<Vec<String>>(),
            ),
            Column::new(
                STATUS.into(),
                obs.iter().map(|o| o.status.label().to_string()).collect::<Vec<String>>(),
            ),
            Column::new(
                ARRIVAL_ORDER.into(),
                obs.iter().map(|o| o.arrival_order as i64).collect::<Vec<_>>(),
            ),
            Column::new(
                FORAGING_SUCCESS.into(),
                obs.iter().map(|o| o.foraging_success).collect::<Vec<_>>(),
            ),
            Column::new(
                GROUP_SIZE.into(),
                obs.iter().map(|o| o.group_size as i64).collect::<Vec<_>>(),
            ),
            Column::new(
                ARRIVAL_BIN.into(),
                obs.iter().map(|o| o.arrival_bin as i32).collect::<Vec<_>>(),
            ),
            Column::new(
                ARRIVAL_ORDER_RELATIVE.into(),
                obs.iter()
                    .map(|o| o.arrival_order_relative)
                    .collect::<Vec<_>>(),
            ),
            Column::new(ARRIVAL_ORDER_PERCENTILE_BIN.into(), percentile),
        ])
    }
}

/// Normalize a raw observation table.
///
/// # Errors
/// Returns the first [`SchemaError`] found, scanning rows top to bottom.
pub fn normalize(df: &DataFrame, options: &NormalizeOptions) -> Result<ObservationTable, SchemaError> {
    let width = options.percentile_width;
    if !width.is_finite() || width <= 0.0 || width > 1.0 {
        return Err(SchemaError::InvalidPercentileWidth(width));
    }

    let available: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for column in REQUIRED_COLUMNS {
        if !available.iter().any(|c| c == column) {
            return Err(SchemaError::MissingColumn {
                column: column.to_string(),
                available: available.clone(),
            });
        }
    }

    if df.height() == 0 {
        return Err(SchemaError::EmptyTable);
    }

    let group_ids = read_strings(df, GROUP_ID)?;
    let test_ids = read_strings(df, TEST_ID)?;
    let individual_ids = read_strings(df, INDIVIDUAL_ID)?;
    let statuses = read_strings(df, STATUS)?;
    let arrival_orders = read_integers(df, ARRIVAL_ORDER)?;
    let group_sizes = read_integers(df, GROUP_SIZE)?;
    let foraging = read_numbers(df, FORAGING_SUCCESS)?;

    // Group size seen first for each group
    let mut group_size_by_group: HashMap<&str, i64> = HashMap::new();
    // Ranks seen per (group, test), plus first-appearance order of the pairs
    let mut ranks_by_test: HashMap<(&str, &str), HashSet<i64>> = HashMap::new();
    let mut test_order: Vec<(&str, &str, i64)> = Vec::new();
    let mut parsed_statuses: Vec<Status> = Vec::with_capacity(df.height());

    for row in 0..df.height() {
        let group_id = group_ids[row].as_str();
        let test_id = test_ids[row].as_str();
        let group_size = group_sizes[row];
        let arrival_order = arrival_orders[row];

        let status: Status = statuses[row]
            .parse()
            .map_err(|_| SchemaError::UnknownStatus {
                row,
                value: statuses[row].clone(),
            })?;
        parsed_statuses.push(status);

        if group_size <= 0 || group_size > i64::from(u32::MAX) {
            return Err(SchemaError::InvalidGroupSize { row, group_size });
        }

        let expected = *group_size_by_group.entry(group_id).or_insert(group_size);
        if expected != group_size {
            return Err(SchemaError::InconsistentGroupSize {
                group_id: group_id.to_string(),
                row,
                expected,
                found: group_size,
            });
        }

        if arrival_order < 1 || arrival_order > group_size {
            return Err(SchemaError::ArrivalOrderOutOfRange {
                row,
                arrival_order,
                group_size,
            });
        }

        let ranks = ranks_by_test.entry((group_id, test_id)).or_insert_with(|| {
            test_order.push((group_id, test_id, group_size));
            HashSet::new()
        });
        if !ranks.insert(arrival_order) {
            return Err(SchemaError::DuplicateArrivalOrder {
                group_id: group_id.to_string(),
                test_id: test_id.to_string(),
                arrival_order,
                row,
            });
        }

        let value = foraging[row];
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(SchemaError::ForagingSuccessOutOfRange { row, value });
        }
    }

    if !options.allow_incomplete_tests {
        // In range and without duplicates, so a full count means a permutation
        for &(group_id, test_id, group_size) in &test_order {
            let found = ranks_by_test[&(group_id, test_id)].len();
            if found as i64 != group_size {
                return Err(SchemaError::IncompleteRanking {
                    group_id: group_id.to_string(),
                    test_id: test_id.to_string(),
                    found,
                    group_size,
                });
            }
        }
    }

    let percentile_buckets = FixedWidthBuckets::covering(width, 1.0)
        .map_err(|_| SchemaError::InvalidPercentileWidth(width))?;

    let mut observations = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        // Both were range-checked against [1, u32::MAX] above
        let arrival_order = arrival_orders[row] as u32;
        let group_size = group_sizes[row] as u32;
        let relative = arrival_order as f64 / group_size as f64;

        observations.push(Observation {
            group_id: group_ids[row].clone(),
            test_id: test_ids[row].clone(),
            individual_id: individual_ids[row].clone(),
            status: parsed_statuses[row],
            arrival_order,
            foraging_success: foraging[row],
            group_size,
            arrival_bin: u8::from(arrival_order == 1),
            arrival_order_relative: relative,
            percentile_bin: percentile_buckets.index_of(relative),
        });
    }

    let max_group_size = observations.iter().map(|o| o.group_size).max().unwrap_or(0);

    Ok(ObservationTable {
        observations,
        max_group_size,
        percentile_buckets,
        options: *options,
    })
}

/// Read a column as text, rejecting nulls
fn read_strings(df: &DataFrame, name: &str) -> Result<Vec<String>, SchemaError> {
    raw_strings(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| SchemaError::NullValue {
                column: name.to_string(),
                row,
            })
        })
        .collect()
}

/// Text rendering of every cell, `None` for nulls
fn raw_strings(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, SchemaError> {
    let invalid = |e: PolarsError| SchemaError::InvalidColumn {
        column: name.to_string(),
        expected: "text",
        message: e.to_string(),
    };

    let column = df.column(name).map_err(invalid)?;
    let text = column.cast(&DataType::String).map_err(invalid)?;
    let values = text.str().map_err(invalid)?;

    Ok(values.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Read a column as `f64`, rejecting nulls and unparseable cells
fn read_numbers(df: &DataFrame, name: &str) -> Result<Vec<f64>, SchemaError> {
    let invalid = |e: PolarsError| SchemaError::InvalidColumn {
        column: name.to_string(),
        expected: "number",
        message: e.to_string(),
    };

    let raw = raw_strings(df, name)?;
    let column = df.column(name).map_err(invalid)?;
    let numbers = column.cast(&DataType::Float64).map_err(invalid)?;
    let values = numbers.f64().map_err(invalid)?;

    raw.into_iter()
        .zip(values.into_iter())
        .enumerate()
        .map(|(row, (text, value))| match (text, value) {
            (None, _) => Err(SchemaError::NullValue {
                column: name.to_string(),
                row,
            }),
            (Some(text), None) => Err(SchemaError::InvalidValue {
                column: name.to_string(),
                row,
                value: text,
                expected: "number",
            }),
            (Some(_), Some(v)) => Ok(v),
        })
        .collect()
}

/// Read a column of whole numbers (`3` and `3.0` are accepted, `3.5` is not)
fn read_integers(df: &DataFrame, name: &str) -> Result<Vec<i64>, SchemaError> {
    read_numbers(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            if v.is_finite() && v.fract() == 0.0 {
                Ok(v as i64)
            } else {
                Err(SchemaError::InvalidValue {
                    column: name.to_string(),
                    row,
                    value: v.to_string(),
                    expected: "integer",
                })
            }
        })
        .collect()
}
