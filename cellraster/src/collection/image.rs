//! Multi-channel intensity images and integer label masks.
//!
//! Both types are immutable from the outside: every transform returns a new
//! instance so that a collection's shared channel layout cannot be broken by
//! editing one entry in place.

use std::collections::{BTreeSet, HashSet};

use ndarray::{concatenate, Array2, Array3, Axis};

use crate::error::{CellrasterError, Result};
use crate::image_size::PixelShape;

/// Intensity stack stored as `[height, width, channel]` with named channels.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiChannelImage {
    data: Array3<f64>,
    channel_names: Vec<String>,
}

impl MultiChannelImage {
    /// Wrap an intensity stack, checking the channel names against the
    /// channel axis.
    pub fn new(data: Array3<f64>, channel_names: Vec<String>) -> Result<Self> {
        let n_channels = data.dim().2;
        if channel_names.len() != n_channels {
            return Err(CellrasterError::Schema(format!(
                "image has {} channels but {} channel names were given",
                n_channels,
                channel_names.len()
            )));
        }
        check_channel_names(&channel_names)?;
        Ok(Self {
            data,
            channel_names,
        })
    }

    /// Stack equally sized 2-D planes into one image.
    pub fn from_planes(planes: Vec<(String, Array2<f64>)>) -> Result<Self> {
        let Some((_, first)) = planes.first() else {
            return Err(CellrasterError::Schema(
                "an image needs at least one channel".to_string(),
            ));
        };
        let dim = first.dim();
        if let Some((name, _)) = planes.iter().find(|(_, plane)| plane.dim() != dim) {
            return Err(CellrasterError::Schema(format!(
                "channel '{name}' does not match the {}x{} shape of the first channel",
                dim.1, dim.0
            )));
        }
        let views: Vec<_> = planes
            .iter()
            .map(|(_, plane)| plane.view().insert_axis(Axis(2)))
            .collect();
        let data = concatenate(Axis(2), &views)
            .map_err(|e| CellrasterError::Schema(format!("cannot stack channels: {e}")))?;
        let names = planes.into_iter().map(|(name, _)| name).collect();
        Self::new(data, names)
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    pub fn n_channels(&self) -> usize {
        self.channel_names.len()
    }

    pub fn shape(&self) -> PixelShape {
        let (height, width, _) = self.data.dim();
        PixelShape::new(width, height)
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channel_names.iter().position(|c| c == name)
    }

    /// New image holding only `names`, in the requested order.
    pub fn select_channels(&self, names: &[String]) -> Result<Self> {
        let indices = names
            .iter()
            .map(|name| {
                self.channel_index(name)
                    .ok_or_else(|| CellrasterError::NotFound(format!("channel '{name}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        let data = self.data.select(Axis(2), &indices);
        Self::new(data, names.to_vec())
    }

    /// Same pixels under new channel names.
    pub fn with_channel_names(&self, names: Vec<String>) -> Result<Self> {
        Self::new(self.data.clone(), names)
    }

    /// Apply `f(channel_index, value)` to every pixel.
    pub fn map_channels<F>(&self, f: F) -> Self
    where
        F: Fn(usize, f64) -> f64,
    {
        let mut data = self.data.clone();
        for (c, mut plane) in data.axis_iter_mut(Axis(2)).enumerate() {
            plane.mapv_inplace(|v| f(c, v));
        }
        Self {
            data,
            channel_names: self.channel_names.clone(),
        }
    }

    /// Append the channels of `other` after the channels of `self`.
    pub fn concat_channels(&self, other: &MultiChannelImage) -> Result<Self> {
        if self.shape() != other.shape() {
            return Err(CellrasterError::Schema(format!(
                "cannot merge channels of a {} image with a {} image",
                self.shape(),
                other.shape()
            )));
        }
        let mut names = self.channel_names.clone();
        names.extend(other.channel_names.iter().cloned());
        check_channel_names(&names)?;
        let data = concatenate(Axis(2), &[self.data.view(), other.data.view()])
            .map_err(|e| CellrasterError::Schema(format!("cannot merge channels: {e}")))?;
        Self::new(data, names)
    }
}

fn check_channel_names(names: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.is_empty() {
            return Err(CellrasterError::Schema("empty channel name".to_string()));
        }
        if !seen.insert(name.as_str()) {
            return Err(CellrasterError::Schema(format!(
                "duplicate channel name '{name}'"
            )));
        }
    }
    Ok(())
}

/// Segmentation mask: 0 is background, every positive value one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMask {
    labels: Array2<u32>,
}

impl LabelMask {
    pub fn new(labels: Array2<u32>) -> Self {
        Self { labels }
    }

    /// Convert floating point label data, rejecting negative or fractional
    /// values.
    pub fn from_f64(values: &Array2<f64>) -> Result<Self> {
        if let Some(((y, x), v)) = values
            .indexed_iter()
            .find(|(_, &v)| {
                !(v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64)
            })
        {
            return Err(CellrasterError::Schema(format!(
                "mask value {v} at ({x}, {y}) is not a non-negative integer label"
            )));
        }
        Ok(Self {
            labels: values.mapv(|v| v as u32),
        })
    }

    pub fn labels(&self) -> &Array2<u32> {
        &self.labels
    }

    pub fn shape(&self) -> PixelShape {
        PixelShape::from_dim(self.labels.dim())
    }

    /// Distinct non-background labels in the mask.
    pub fn cell_ids(&self) -> BTreeSet<u32> {
        self.labels.iter().copied().filter(|&l| l != 0).collect()
    }
}

/// Entry payload of an [`ImageCollection`](super::ImageCollection).
#[derive(Debug, Clone, PartialEq)]
pub enum ImageKind {
    Intensity(MultiChannelImage),
    Label(LabelMask),
}

impl ImageKind {
    pub fn shape(&self) -> PixelShape {
        match self {
            ImageKind::Intensity(image) => image.shape(),
            ImageKind::Label(mask) => mask.shape(),
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self, ImageKind::Label(_))
    }

    pub fn as_intensity(&self) -> Option<&MultiChannelImage> {
        match self {
            ImageKind::Intensity(image) => Some(image),
            ImageKind::Label(_) => None,
        }
    }

    pub fn as_label(&self) -> Option<&LabelMask> {
        match self {
            ImageKind::Label(mask) => Some(mask),
            ImageKind::Intensity(_) => None,
        }
    }
}
