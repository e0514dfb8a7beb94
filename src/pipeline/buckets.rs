//! Fixed-width bucketing of continuous values
//!
//! Buckets are half-open intervals `[k*w, (k+1)*w)` starting at 0 and are
//! labelled by their lower bound. The last bucket is closed on the right so
//! that a value sitting exactly on the data maximum (e.g. 1.0 at width 0.1)
//! is kept in the final bucket instead of opening a new one.

use serde::Serialize;

use super::error::BucketingError;

/// Slack (in bucket units) for values that sit on a boundary but lose a few
/// ulps in the division, e.g. `0.3 / 0.1 == 2.9999999999999996`.
const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// Labels are rounded to this many decimal places
const LABEL_DECIMALS: i32 = 10;

/// A partition of `[0, max]` into equal-width buckets
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FixedWidthBuckets {
    width: f64,
    count: usize,
}

impl FixedWidthBuckets {
    /// Build the smallest set of buckets of `width` that covers `[0, max]`.
    ///
    /// `max` is expected to be finite; negative maxima collapse to a single bucket.
    pub fn covering(width: f64, max: f64) -> Result<Self, BucketingError> {
        if !width.is_finite() || width <= 0.0 {
            return Err(BucketingError::InvalidWidth(width));
        }

        let span = max.max(0.0) / width;
        let count = ((span - BOUNDARY_TOLERANCE).ceil().max(0.0) as usize).max(1);

        Ok(Self { width, count })
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// Number of buckets
    pub fn count(&self) -> usize {
        self.count
    }

    /// Index of the bucket containing `value`, clamped to the covered range
    pub fn index_of(&self, value: f64) -> usize {
        let k = (value / self.width + BOUNDARY_TOLERANCE).floor();
        if k <= 0.0 {
            0
        } else {
            (k as usize).min(self.count - 1)
        }
    }

    /// Lower bound of bucket `index`, used as its label
    pub fn lower_bound(&self, index: usize) -> f64 {
        round_label(index as f64 * self.width)
    }

    /// Upper end of the covered range `[0, count * width]`
    pub fn upper_bound(&self) -> f64 {
        round_label(self.count as f64 * self.width)
    }

    /// Whether `value` falls inside the covered range, boundaries included
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite()
            && value >= 0.0
            && value / self.width <= self.count as f64 + BOUNDARY_TOLERANCE
    }

    /// Lower bounds of every bucket, in order
    pub fn labels(&self) -> Vec<f64> {
        (0..self.count).map(|k| self.lower_bound(k)).collect()
    }
}

/// Round a bucket boundary so that `3 * 0.1` prints as `0.3`
pub fn round_label(value: f64) -> f64 {
    let scale = 10f64.powi(LABEL_DECIMALS);
    (value * scale).round() / scale
}

/// Format a bucket label with at least one decimal place (`0.0`, `0.1`, `0.25`)
pub fn format_label(value: f64) -> String {
    let s = format!("{}", round_label(value));
    if s.contains('.') || s.contains('e') {
        s
    } else {
        format!("{}.0", s)
    }
}

/// Validate `values` and assign each one to a bucket of `width`.
///
/// Buckets cover `[0, max(values)]`. Returns the layout plus one bucket index per value.
pub fn bucket_values(
    values: &[f64],
    width: f64,
    column: &str,
) -> Result<(FixedWidthBuckets, Vec<usize>), BucketingError> {
    if !width.is_finite() || width <= 0.0 {
        return Err(BucketingError::InvalidWidth(width));
    }

    let mut max = 0.0f64;
    for (row, &value) in values.iter().enumerate() {
        if !value.is_finite() {
            return Err(BucketingError::NonFinite {
                column: column.to_string(),
                row,
                value,
            });
        }
        if value < 0.0 {
            return Err(BucketingError::NegativeValue {
                column: column.to_string(),
                row,
                value,
            });
        }
        max = max.max(value);
    }

    let buckets = FixedWidthBuckets::covering(width, max)?;
    let indices = values.iter().map(|&v| buckets.index_of(v)).collect();

    Ok((buckets, indices))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels_for(values: &[f64], width: f64) -> Vec<f64> {
        let (buckets, indices) = bucket_values(values, width, "x").unwrap();
        indices.iter().map(|&k| buckets.lower_bound(k)).collect()
    }

    #[test]
    fn test_maximum_folds_into_final_bucket() {
        let labels = labels_for(&[0.05, 0.15, 0.95, 1.0], 0.1);
        assert_eq!(labels, vec![0.0, 0.1, 0.9, 0.9]);
    }

    #[test]
    fn test_boundary_value_starts_new_bucket() {
        // 0.3 / 0.1 is 2.9999999999999996 in f64
        let labels = labels_for(&[0.3, 0.29, 1.0], 0.1);
        assert_eq!(labels[0], 0.3);
        assert_eq!(labels[1], 0.2);
    }

    #[test]
    fn test_bucket_count_covers_max() {
        let b = FixedWidthBuckets::covering(0.1, 1.0).unwrap();
        assert_eq!(b.count(), 10);

        let b = FixedWidthBuckets::covering(0.1, 0.95).unwrap();
        assert_eq!(b.count(), 10);

        let b = FixedWidthBuckets::covering(0.25, 0.0).unwrap();
        assert_eq!(b.count(), 1);
    }

    #[test]
    fn test_labels_are_rounded() {
        let b = FixedWidthBuckets::covering(0.1, 1.0).unwrap();
        let labels = b.labels();
        assert_eq!(labels.len(), 10);
        assert_eq!(labels[3], 0.3);
        assert_eq!(labels[9], 0.9);
    }

    #[test]
    fn test_contains_covered_range() {
        let b = FixedWidthBuckets::covering(0.1, 0.95).unwrap();
        assert_eq!(b.upper_bound(), 1.0);
        assert!(b.contains(0.0));
        assert!(b.contains(1.0));
        assert!(!b.contains(1.05));
        assert!(!b.contains(-0.01));
        assert!(!b.contains(f64::NAN));
    }

    #[test]
    fn test_format_label() {
        assert_eq!(format_label(0.0), "0.0");
        assert_eq!(format_label(0.30000000000000004), "0.3");
        assert_eq!(format_label(2.0), "2.0");
    }

    #[test]
    fn test_invalid_width() {
        assert_eq!(
            FixedWidthBuckets::covering(0.0, 1.0),
            Err(BucketingError::InvalidWidth(0.0))
        );
        assert!(bucket_values(&[0.5], -0.1, "x").is_err());
        assert!(bucket_values(&[0.5], f64::NAN, "x").is_err());
    }

    #[test]
    fn test_non_finite_value_reports_row() {
        let err = bucket_values(&[0.1, f64::INFINITY], 0.1, "foraging_success").unwrap_err();
        match err {
            BucketingError::NonFinite { column, row, .. } => {
                assert_eq!(column, "foraging_success");
                assert_eq!(row, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_negative_value_rejected() {
        let err = bucket_values(&[-0.5], 0.1, "x").unwrap_err();
        assert!(matches!(err, BucketingError::NegativeValue { row: 0, .. }));
    }
}
