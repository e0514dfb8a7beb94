//! Shared test utilities and fixture generators
#![allow(dead_code)]

use polars::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

/// Six observations in two groups of three, one test each.
///
/// - Group A: Dom arrives 1st, Dom 2nd, Sub 3rd
/// - Group B: Sub arrives 1st, 2nd and 3rd
///
/// `foraging_success` holds 0.05, 0.15, 0.95, 1.0, 0.3, 0.35 so that
/// bucketing at width 0.1 hits the lower edge, the upper boundary and an
/// exact interior boundary.
pub fn create_foraging_dataframe() -> DataFrame {
    df! {
        "group_id" => ["A", "A", "A", "B", "B", "B"],
        "test_id" => ["t1", "t1", "t1", "t1", "t1", "t1"],
        "individual_id" => ["a1", "a2", "a3", "b1", "b2", "b3"],
        "status" => ["Dom", "Dom", "Sub", "Sub", "Sub", "Sub"],
        "arrival_order" => [1i64, 2, 3, 1, 2, 3],
        "foraging_success" => [0.05f64, 0.15, 0.95, 1.0, 0.3, 0.35],
        "group_size" => [3i64, 3, 3, 3, 3, 3],
    }
    .unwrap()
}

/// Random but valid observations: every (group, test) pair ranks a full
/// permutation of 1..group_size, group sizes between 2 and `max_group_size`.
pub fn create_random_foraging_dataframe(
    groups: usize,
    tests: usize,
    max_group_size: usize,
) -> DataFrame {
    use rand::seq::SliceRandom;
    use rand::Rng;
    let mut rng = rand::thread_rng();

    let mut group_ids = Vec::new();
    let mut test_ids = Vec::new();
    let mut individual_ids = Vec::new();
    let mut statuses = Vec::new();
    let mut arrival_orders = Vec::new();
    let mut foraging = Vec::new();
    let mut group_sizes = Vec::new();

    for g in 0..groups {
        let size = rng.gen_range(2..=max_group_size.max(2));
        for t in 0..tests {
            let mut ranks: Vec<i64> = (1..=size as i64).collect();
            ranks.shuffle(&mut rng);
            for (i, rank) in ranks.into_iter().enumerate() {
                group_ids.push(format!("G{}", g));
                test_ids.push(format!("T{}", t));
                individual_ids.push(format!("G{}_{}", g, i));
                statuses.push(if i == 0 { "Dom" } else { "Sub" });
                arrival_orders.push(rank);
                foraging.push(rng.gen_range(0.0..=1.0));
                group_sizes.push(size as i64);
            }
        }
    }

    df! {
        "group_id" => group_ids,
        "test_id" => test_ids,
        "individual_id" => individual_ids,
        "status" => statuses,
        "arrival_order" => arrival_orders,
        "foraging_success" => foraging,
        "group_size" => group_sizes,
    }
    .unwrap()
}

/// Create a temporary directory with a test CSV file
pub fn create_temp_csv(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("foraging.csv");

    let mut file = std::fs::File::create(&csv_path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();

    (temp_dir, csv_path)
}

/// Write a CSV file next to others in an existing temporary directory
pub fn write_csv(dir: &TempDir, name: &str, df: &mut DataFrame) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();
    path
}

/// Read back a CSV written by the binary
pub fn read_csv(path: &std::path::Path) -> DataFrame {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .unwrap()
        .finish()
        .unwrap()
}

/// Assert that a DataFrame has expected shape
pub fn assert_shape(df: &DataFrame, expected_rows: usize, expected_cols: usize) {
    let (rows, cols) = df.shape();
    assert_eq!(
        rows, expected_rows,
        "Row count mismatch: expected {}, got {}",
        expected_rows, rows
    );
    assert_eq!(
        cols, expected_cols,
        "Column count mismatch: expected {}, got {}",
        expected_cols, cols
    );
}

/// Assert that a DataFrame contains specific columns
pub fn assert_has_columns(df: &DataFrame, expected_cols: &[&str]) {
    let actual_cols: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    for col in expected_cols {
        assert!(
            actual_cols.contains(&col.to_string()),
            "Missing expected column: '{}'. Actual columns: {:?}",
            col,
            actual_cols
        );
    }
}

/// Assert two floats agree to within 1e-12
pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-12,
        "expected {}, got {}",
        expected,
        actual
    );
}
