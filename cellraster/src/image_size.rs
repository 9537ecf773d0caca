//! Pixel dimensions shared by collections, rasters and layout.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width and height of an image in pixels.
///
/// ndarray stores images as `[row, col] = [y, x]`, so conversions from array
/// dimensions go through [`PixelShape::from_dim`] rather than the tuple
/// constructors, which take `(width, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelShape {
    /// Image width in pixels
    pub width: usize,
    /// Image height in pixels
    pub height: usize,
}

impl PixelShape {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Build from ndarray `(rows, cols)` dimensions.
    pub fn from_dim((height, width): (usize, usize)) -> Self {
        Self { width, height }
    }

    /// ndarray `(rows, cols)` dimensions.
    pub fn dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Longer of the two sides.
    pub fn max_side(&self) -> usize {
        self.width.max(self.height)
    }

    /// Componentwise maximum, used to find the largest image in a batch.
    pub fn union(&self, other: &PixelShape) -> PixelShape {
        PixelShape::new(self.width.max(other.width), self.height.max(other.height))
    }

    /// Convert to u32 tuple for image crate APIs
    pub fn to_u32_tuple(&self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }
}

impl From<(u32, u32)> for PixelShape {
    fn from(dimensions: (u32, u32)) -> Self {
        Self::new(dimensions.0 as usize, dimensions.1 as usize)
    }
}

impl Default for PixelShape {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl fmt::Display for PixelShape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
