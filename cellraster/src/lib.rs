//! Composition and annotation of multiplexed cell imaging data
//!
//! This crate turns collections of multi-channel intensity images and
//! segmentation label masks into false-colour RGB composites. Channels are
//! normalized and blended additively on colour ramps, cells can be painted by
//! per-cell features or metadata and outlined, and the composites are laid
//! out on a grid with scale bars, titles and a legend.

pub mod algo;
pub mod cells;
pub mod collection;
pub mod colour;
pub mod config;
pub mod error;
pub mod image_proc;
pub mod image_size;
pub mod layout;
pub mod plot;

// Re-exports for easier access
pub use cells::{CellTable, Column};
pub use collection::{
    merge_channels, EntryKey, EntryMetadata, ImageCollection, ImageEntry, ImageKind, LabelMask,
    MultiChannelImage,
};
pub use colour::{ColorMapper, ColorSpec, Rgb};
pub use config::PlotConfig;
pub use error::{CellrasterError, Result, MAX_COLOUR_CHANNELS};
pub use image_proc::composite::{Bcg, CompositeRaster, SaturationPolicy};
pub use image_proc::io::{load_images, load_masks, save_plot, save_plots};
pub use image_proc::normalize::{normalize, NormalizeOptions};
pub use image_size::PixelShape;
pub use layout::Display;
pub use plot::{plot_cells, plot_pixels, CellsRequest, PixelsRequest, PlotOutput};
