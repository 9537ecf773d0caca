//! Error taxonomy for the composition engine.
//!
//! Structural problems (`Schema`), unresolved lookups (`NotFound`), colour
//! lookups without a fallback (`MissingMapping`) and over-wide colour
//! selections (`TooManyChannels`) are all fatal for the call that raised them.
//! Cells that cannot be joined between a mask and the cell table are never an
//! error; they are painted with the configured missing colour instead.

use thiserror::Error;

/// Maximum number of channels or features that can be blended at once.
pub const MAX_COLOUR_CHANNELS: usize = 6;

/// Errors raised by collection handling, colouring and rendering.
#[derive(Debug, Error)]
pub enum CellrasterError {
    /// A structural invariant was violated.
    #[error("schema violation: {0}")]
    Schema(String),

    /// A requested name, id, index, channel or column does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A discrete category has no colour and no default colour is configured.
    #[error("no colour mapped for category '{label}' of '{key}'")]
    MissingMapping { key: String, label: String },

    /// More simultaneous colour channels than the compositor supports.
    #[error("{requested} colour channels requested, at most {max} can be blended")]
    TooManyChannels { requested: usize, max: usize },

    /// Output path extension is not one of png, tiff or jpeg.
    #[error("unsupported output format '{0}' (expected png, tiff or jpeg)")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// The annotation overlay could not be built or rasterized.
    #[error("annotation overlay error: {0}")]
    Overlay(String),
}

pub type Result<T> = std::result::Result<T, CellrasterError>;

/// Reject colour selections wider than [`MAX_COLOUR_CHANNELS`].
pub fn ensure_channel_ceiling(requested: usize) -> Result<()> {
    if requested > MAX_COLOUR_CHANNELS {
        return Err(CellrasterError::TooManyChannels {
            requested,
            max: MAX_COLOUR_CHANNELS,
        });
    }
    Ok(())
}
