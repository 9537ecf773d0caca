//! RangeScan - incremental minimum/maximum over floating point samples
//!
//! Intensity ranges are often accumulated over several images before any
//! rescaling happens, so the scan can be fed repeatedly. NaN samples are
//! skipped but counted.

use num_traits::float::Float;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RangeError {
    #[error("No finite samples were scanned ({nan_count} NaN skipped)")]
    NoData { nan_count: usize },
}

/// Running minimum and maximum of the non-NaN samples seen so far.
#[derive(Debug, Clone)]
pub struct RangeScan<T: Float> {
    min_value: Option<T>,
    max_value: Option<T>,
    nan_count: usize,
}

impl<T: Float + fmt::Debug> Default for RangeScan<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float + fmt::Debug> RangeScan<T> {
    pub fn new() -> Self {
        Self {
            min_value: None,
            max_value: None,
            nan_count: 0,
        }
    }

    /// Scan a single batch of samples.
    ///
    /// ```
    /// use cellraster::algo::RangeScan;
    ///
    /// let scan = RangeScan::<f64>::from_values([1.0, 5.0, f64::NAN, 3.0]);
    /// assert_eq!(scan.range().unwrap(), (1.0, 5.0));
    /// assert_eq!(scan.nan_count(), 1);
    /// ```
    pub fn from_values<I: IntoIterator<Item = T>>(values: I) -> Self {
        let mut scan = Self::new();
        scan.extend(values);
        scan
    }

    /// Fold more samples into the running range.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, values: I) {
        for value in values {
            self.push(value);
        }
    }

    pub fn push(&mut self, value: T) {
        if value.is_nan() {
            self.nan_count += 1;
            return;
        }
        self.min_value = Some(match self.min_value {
            Some(min) if min <= value => min,
            _ => value,
        });
        self.max_value = Some(match self.max_value {
            Some(max) if max >= value => max,
            _ => value,
        });
    }

    /// `(min, max)` of the scanned samples.
    pub fn range(&self) -> Result<(T, T), RangeError> {
        match (self.min_value, self.max_value) {
            (Some(min), Some(max)) => Ok((min, max)),
            _ => Err(RangeError::NoData {
                nan_count: self.nan_count,
            }),
        }
    }

    pub fn nan_count(&self) -> usize {
        self.nan_count
    }
}
