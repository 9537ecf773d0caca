//! Loading image collections from disk and saving rendered plots.
//!
//! Every file matching a glob pattern becomes one collection entry named
//! after its file stem, which is also used as the entry's `image_id`.
//! Grayscale files give a single channel, colour files three; pixel values
//! are kept as stored (8 or 16 bit integers) so label masks keep their ids.
//! Channels are named `ch1`, `ch2`, ... and can be renamed afterwards.

use std::path::{Path, PathBuf};

use glob::glob;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use log::{debug, info, warn};
use ndarray::Array2;

use crate::collection::{
    EntryMetadata, ImageCollection, ImageEntry, ImageKind, LabelMask, MultiChannelImage,
};
use crate::error::{CellrasterError, Result};
use crate::image_proc::image::rescale_image;

/// Output formats chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Tiff,
    Jpeg,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "png" => Ok(OutputFormat::Png),
            "tif" | "tiff" => Ok(OutputFormat::Tiff),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            _ => Err(CellrasterError::UnsupportedFormat(extension)),
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Tiff => ImageFormat::Tiff,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

fn matching_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = dir.join(pattern);
    let mut paths = Vec::new();
    for entry in glob(&full.to_string_lossy())? {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            Err(e) => warn!("skipping unreadable path: {e}"),
        }
    }
    paths.sort();
    if paths.is_empty() {
        return Err(CellrasterError::NotFound(format!(
            "no files match '{}'",
            full.display()
        )));
    }
    Ok(paths)
}

fn plane<P>(width: u32, height: u32, value: P) -> Array2<f64>
where
    P: Fn(u32, u32) -> f64,
{
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        value(x as u32, y as u32)
    })
}

/// Split a decoded image into planes of raw values.
fn planes(image: &DynamicImage) -> Vec<Array2<f64>> {
    let (width, height) = image.dimensions();
    match image {
        DynamicImage::ImageLuma8(buffer) => {
            vec![plane(width, height, |x, y| buffer.get_pixel(x, y)[0] as f64)]
        }
        DynamicImage::ImageLuma16(buffer) => {
            vec![plane(width, height, |x, y| buffer.get_pixel(x, y)[0] as f64)]
        }
        DynamicImage::ImageLumaA8(_) => {
            let buffer = image.to_luma8();
            vec![plane(width, height, |x, y| buffer.get_pixel(x, y)[0] as f64)]
        }
        DynamicImage::ImageLumaA16(_) => {
            let buffer = image.to_luma16();
            vec![plane(width, height, |x, y| buffer.get_pixel(x, y)[0] as f64)]
        }
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => {
            let buffer = image.to_rgb8();
            (0..3)
                .map(|c| plane(width, height, |x, y| buffer.get_pixel(x, y)[c] as f64))
                .collect()
        }
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgba16(_) => {
            let buffer = image.to_rgb16();
            (0..3)
                .map(|c| plane(width, height, |x, y| buffer.get_pixel(x, y)[c] as f64))
                .collect()
        }
        _ => {
            let buffer = image.to_rgb32f();
            (0..3)
                .map(|c| plane(width, height, |x, y| buffer.get_pixel(x, y)[c] as f64))
                .collect()
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn load_entries<F>(dir: &Path, pattern: &str, build: F) -> Result<ImageCollection>
where
    F: Fn(&Path, Vec<Array2<f64>>) -> Result<ImageKind>,
{
    let mut collection = ImageCollection::new();
    for path in matching_files(dir, pattern)? {
        let decoded = image::open(&path)?;
        debug!(
            "loaded {} ({}x{}, {:?})",
            path.display(),
            decoded.width(),
            decoded.height(),
            decoded.color()
        );
        let name = file_stem(&path);
        let image = build(&path, planes(&decoded))?;
        collection.push(
            ImageEntry::new(name.clone(), image).with_metadata(EntryMetadata::with_image_id(name)),
        )?;
    }
    info!("loaded {} images from {}", collection.len(), dir.display());
    Ok(collection)
}

/// Load every file matching `pattern` inside `dir` as an intensity image.
pub fn load_images(dir: &Path, pattern: &str) -> Result<ImageCollection> {
    load_entries(dir, pattern, |_, planes| {
        let named = planes
            .into_iter()
            .enumerate()
            .map(|(i, plane)| (format!("ch{}", i + 1), plane))
            .collect();
        Ok(ImageKind::Intensity(MultiChannelImage::from_planes(named)?))
    })
}

/// Load every file matching `pattern` inside `dir` as a label mask.
pub fn load_masks(dir: &Path, pattern: &str) -> Result<ImageCollection> {
    load_entries(dir, pattern, |path, planes| match planes.as_slice() {
        [labels] => Ok(ImageKind::Label(LabelMask::from_f64(labels)?)),
        _ => Err(CellrasterError::Schema(format!(
            "mask {} has {} channels, expected a single grayscale channel",
            path.display(),
            planes.len()
        ))),
    })
}

/// Write one plot, resized by `scale`, in the format named by the extension.
pub fn save_plot(image: &RgbImage, path: &Path, scale: f64) -> Result<()> {
    let format = OutputFormat::from_path(path)?;
    let scaled = rescale_image(image, scale)?;
    scaled.save_with_format(path, format.image_format())?;
    info!(
        "saved {}x{} plot to {}",
        scaled.width(),
        scaled.height(),
        path.display()
    );
    Ok(())
}

/// Path of the `index`-th (zero based) of several plots: `plot.png` becomes
/// `plot_1.png`, `plot_2.png`, ...
pub fn numbered_path(path: &Path, index: usize) -> PathBuf {
    let stem = file_stem(path);
    let name = match path.extension() {
        Some(extension) => format!("{stem}_{}.{}", index + 1, extension.to_string_lossy()),
        None => format!("{stem}_{}", index + 1),
    };
    path.with_file_name(name)
}

/// Write several plots; a single plot is written to `path` unchanged.
pub fn save_plots(images: &[RgbImage], path: &Path, scale: f64) -> Result<Vec<PathBuf>> {
    OutputFormat::from_path(path)?;
    if let [image] = images {
        save_plot(image, path, scale)?;
        return Ok(vec![path.to_path_buf()]);
    }
    images
        .iter()
        .enumerate()
        .map(|(i, image)| {
            let target = numbered_path(path, i);
            save_plot(image, &target, scale)?;
            Ok(target)
        })
        .collect()
}
