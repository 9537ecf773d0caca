//! Intensity normalization to the display range `[0, 1]`.
//!
//! Each channel is rescaled linearly between a lower and an upper bound and
//! clipped. Bounds are, in order of precedence: an explicit per-channel input
//! range, percentile cut points of the pixel distribution, or the plain
//! minimum and maximum. They are computed over the whole collection unless
//! `per_image` is set.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::algo::{map_in_order, percentile_bounds, RangeScan};
use crate::collection::{ImageCollection, ImageEntry, ImageKind, MultiChannelImage};
use crate::error::{CellrasterError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    /// Compute bounds for each image separately
    pub per_image: bool,
    /// Lower and upper quantile in `[0, 1]` used instead of min and max
    pub percentile_range: Option<(f64, f64)>,
    /// Fixed `(min, max)` per channel name
    pub input_range: Option<BTreeMap<String, (f64, f64)>>,
}

impl NormalizeOptions {
    fn check(&self, channels: &[String]) -> Result<()> {
        if let Some((lo, hi)) = self.percentile_range {
            if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo > hi {
                return Err(CellrasterError::Schema(format!(
                    "percentile range ({lo}, {hi}) must satisfy 0 <= lo <= hi <= 1"
                )));
            }
        }
        for (name, (min, max)) in self.input_range.iter().flatten() {
            if !channels.contains(name) {
                return Err(CellrasterError::NotFound(format!("channel '{name}'")));
            }
            if !(min.is_finite() && max.is_finite()) || min > max {
                return Err(CellrasterError::Schema(format!(
                    "input range ({min}, {max}) of channel '{name}' is not a finite interval"
                )));
            }
        }
        Ok(())
    }
}

/// Rescale every channel of an intensity collection into `[0, 1]`.
///
/// Label collections are rejected with [`CellrasterError::Schema`].
pub fn normalize(
    collection: &ImageCollection,
    options: &NormalizeOptions,
) -> Result<ImageCollection> {
    if collection.is_label() {
        return Err(CellrasterError::Schema(
            "label masks cannot be normalized".to_string(),
        ));
    }
    let Some(channels) = collection.channel_names() else {
        return Ok(collection.clone());
    };
    options.check(channels)?;

    let entries = if options.per_image {
        map_in_order(collection.entries(), |entry: &ImageEntry| -> Result<ImageEntry> {
            let image = entry.image.as_intensity().ok_or_else(|| {
                CellrasterError::Schema(format!("'{}' is not an intensity image", entry.name))
            })?;
            let bounds = channel_bounds(&[image], channels, options);
            debug!("normalize '{}': bounds {:?}", entry.name, bounds);
            Ok(rebuilt(entry, image, &bounds))
        })?
    } else {
        let bounds = collection_bounds(collection, options);
        debug!("normalize {} images: global bounds {:?}", collection.len(), bounds);
        map_in_order(collection.entries(), |entry: &ImageEntry| -> Result<ImageEntry> {
            let image = entry.image.as_intensity().ok_or_else(|| {
                CellrasterError::Schema(format!("'{}' is not an intensity image", entry.name))
            })?;
            Ok(rebuilt(entry, image, &bounds))
        })?
    };
    ImageCollection::from_entries(entries)
}

fn rebuilt(entry: &ImageEntry, image: &MultiChannelImage, bounds: &[(f64, f64)]) -> ImageEntry {
    ImageEntry {
        name: entry.name.clone(),
        image: ImageKind::Intensity(image.map_channels(|c, v| rescale(v, bounds[c]))),
        metadata: entry.metadata.clone(),
    }
}

/// Bounds applied to each channel when `collection` is normalized as a whole.
pub(crate) fn collection_bounds(
    collection: &ImageCollection,
    options: &NormalizeOptions,
) -> Vec<(f64, f64)> {
    let Some(channels) = collection.channel_names() else {
        return Vec::new();
    };
    let images: Vec<&MultiChannelImage> = collection
        .iter()
        .filter_map(|entry| entry.image.as_intensity())
        .collect();
    channel_bounds(&images, channels, options)
}

/// Bounds of every channel over `images`. Channels without finite data get
/// a degenerate `(0, 0)` range.
fn channel_bounds(
    images: &[&MultiChannelImage],
    channels: &[String],
    options: &NormalizeOptions,
) -> Vec<(f64, f64)> {
    channels
        .iter()
        .enumerate()
        .map(|(c, name)| {
            if let Some(range) = options.input_range.as_ref().and_then(|r| r.get(name)) {
                return *range;
            }
            let values = images.iter().flat_map(|image| {
                image
                    .data()
                    .index_axis(ndarray::Axis(2), c)
                    .iter()
                    .copied()
                    .filter(|v| v.is_finite())
                    .collect::<Vec<_>>()
            });
            let bounds = match options.percentile_range {
                Some((lo, hi)) => percentile_bounds(values.collect(), lo, hi),
                None => RangeScan::from_values(values).range().ok(),
            };
            bounds.unwrap_or((0.0, 0.0))
        })
        .collect()
}

/// Linear map of `[min, max]` onto `[0, 1]` with clipping. A degenerate
/// range and NaN map to 0.
pub fn rescale(value: f64, (min, max): (f64, f64)) -> f64 {
    if !(max > min) || value.is_nan() {
        return 0.0;
    }
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}
