//! Numeric helpers shared by the normalizer, compositor and plot drivers.

pub mod parallel;
pub mod percentile;
pub mod range_scan;

pub use parallel::map_in_order;
pub use percentile::{percentile, percentile_bounds};
pub use range_scan::{RangeError, RangeScan};
