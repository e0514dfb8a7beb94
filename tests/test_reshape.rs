//! Tests for reshaping prediction matrices into long form

use faer::Mat;
use ordbin::pipeline::*;
use polars::prelude::*;

mod common;

use common::*;

fn level_labels() -> Vec<String> {
    ["1", "2", "3"].iter().map(|s| s.to_string()).collect()
}

fn newdata() -> DataFrame {
    df! {
        "status" => ["Dom", "Sub", "Dom", "Sub"],
        "foraging_success" => [0.0f64, 0.0, 0.5, 0.5],
    }
    .unwrap()
}

/// Rows sum to one, values chosen to be awkward in binary
fn probabilities() -> Mat<f64> {
    let raw = [
        [0.1, 0.2, 0.7],
        [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
        [0.6, 0.3, 0.1],
        [0.05, 0.15, 0.8],
    ];
    Mat::from_fn(4, 3, |i, j| raw[i][j])
}

#[test]
fn test_long_form_has_one_row_per_combination_and_level() {
    let long = reshape_predictions(&newdata(), &probabilities(), &level_labels()).unwrap();
    assert_eq!(long.len(), 12);

    let first: Vec<(usize, &str)> = long
        .rows()
        .iter()
        .take(4)
        .map(|r| (r.combination, r.level.as_str()))
        .collect();
    assert_eq!(first, vec![(0, "1"), (0, "2"), (0, "3"), (1, "1")]);
}

#[test]
fn test_probabilities_pass_through_unchanged() {
    let m = probabilities();
    let long = reshape_predictions(&newdata(), &m, &level_labels()).unwrap();

    for row in long.rows() {
        let j = level_labels().iter().position(|l| *l == row.level).unwrap();
        assert_eq!(row.probability.to_bits(), m[(row.combination, j)].to_bits());
    }
}

#[test]
fn test_reshape_then_widen_is_exact() {
    let m = probabilities();
    let long = reshape_predictions(&newdata(), &m, &level_labels()).unwrap();
    let wide = long.widen();

    assert_eq!((wide.nrows(), wide.ncols()), (m.nrows(), m.ncols()));
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            assert_eq!(wide[(i, j)].to_bits(), m[(i, j)].to_bits());
        }
    }
}

#[test]
fn test_to_dataframe_keeps_combination_columns() {
    let long = reshape_predictions(&newdata(), &probabilities(), &level_labels()).unwrap();
    let df = long.to_dataframe().unwrap();

    assert_shape(&df, 12, 4);
    assert_has_columns(&df, &["status", "foraging_success", LEVEL_COLUMN, PROBABILITY_COLUMN]);

    let status: Vec<&str> = df
        .column("status")
        .unwrap()
        .str()
        .unwrap()
        .into_no_null_iter()
        .collect();
    assert_eq!(&status[..4], &["Dom", "Dom", "Dom", "Sub"]);
    assert_eq!(
        df.column("foraging_success").unwrap().dtype(),
        &DataType::Float64
    );
}

#[test]
fn test_widen_predictions_round_trip_through_frame() {
    let m = probabilities();
    let long = reshape_predictions(&newdata(), &m, &level_labels()).unwrap();
    let df = long.to_dataframe().unwrap();

    let (combinations, wide) = widen_predictions(&df, &level_labels()).unwrap();
    assert!(combinations.equals(&newdata()));
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            assert_eq!(wide[(i, j)].to_bits(), m[(i, j)].to_bits());
        }
    }
}

#[test]
fn test_widen_predictions_requires_level_column() {
    let df = df! { "probability" => [0.5f64, 0.5] }.unwrap();
    assert_eq!(
        widen_predictions(&df, &level_labels()).unwrap_err(),
        ReshapeError::MissingColumn(LEVEL_COLUMN.to_string())
    );
}

#[test]
fn test_widen_predictions_rejects_partial_block() {
    let df = df! {
        "status" => ["Dom", "Dom"],
        "level" => ["1", "2"],
        "probability" => [0.5f64, 0.5],
    }
    .unwrap();
    assert!(matches!(
        widen_predictions(&df, &level_labels()),
        Err(ReshapeError::RowCountMismatch { found: 2, .. })
    ));
}

#[test]
fn test_mismatched_shapes_are_rejected() {
    let two_levels = vec!["low".to_string(), "high".to_string()];
    assert_eq!(
        reshape_predictions(&newdata(), &probabilities(), &two_levels).unwrap_err(),
        ReshapeError::LevelCountMismatch {
            expected: 2,
            found: 3
        }
    );

    let short = newdata().head(Some(3));
    assert_eq!(
        reshape_predictions(&short, &probabilities(), &level_labels()).unwrap_err(),
        ReshapeError::RowCountMismatch {
            expected: 3,
            found: 4
        }
    );
}

#[test]
fn test_empty_newdata() {
    let empty = newdata().head(Some(0));
    let m = Mat::<f64>::zeros(0, 3);
    let long = reshape_predictions(&empty, &m, &level_labels()).unwrap();

    assert!(long.is_empty());
    assert_eq!(long.to_dataframe().unwrap().height(), 0);
}

#[test]
fn test_probability_table_from_csv() {
    let mut wide = df! {
        "1" => [0.1f64, 0.6],
        "2" => [0.2f64, 0.3],
        "3" => [0.7f64, 0.1],
    }
    .unwrap();
    let (_dir, path) = create_temp_csv(&mut wide);
    let loaded = load_table(&path, &LoadOptions::default()).unwrap();

    let (labels, m) = probabilities_from_frame(&loaded).unwrap();
    assert_eq!(labels, level_labels());
    assert_eq!(m[(1, 0)], 0.6);
}
