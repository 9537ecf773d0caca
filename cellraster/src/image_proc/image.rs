//! Conversions between composites and 8-bit RGB images, and canvas assembly.

use image::{imageops, Rgb as Pixel, RgbImage};

use crate::colour::Rgb;
use crate::error::{CellrasterError, Result};
use crate::image_proc::composite::CompositeRaster;
use crate::image_size::PixelShape;

/// Quantize a composite to 8 bits per subchannel.
pub fn raster_to_rgb_image(raster: &CompositeRaster) -> RgbImage {
    let (height, width, _) = raster.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Pixel(
            Rgb::new(raster[[y, x, 0]], raster[[y, x, 1]], raster[[y, x, 2]]).to_u8(),
        )
    })
}

pub fn blank_canvas(shape: PixelShape, colour: Rgb) -> RgbImage {
    let (width, height) = shape.to_u32_tuple();
    RgbImage::from_pixel(width, height, Pixel(colour.to_u8()))
}

/// Copy `tile` onto `canvas` with its top-left corner at `(x, y)`.
pub fn place_tile(canvas: &mut RgbImage, tile: &RgbImage, x: f64, y: f64) {
    imageops::replace(canvas, tile, x.round() as i64, y.round() as i64);
}

/// Resize by `scale` with nearest-neighbour sampling so pixel edges stay
/// sharp.
pub fn rescale_image(image: &RgbImage, scale: f64) -> Result<RgbImage> {
    if !(scale > 0.0) || !scale.is_finite() {
        return Err(CellrasterError::Schema(format!(
            "output scale must be a positive number, got {scale}"
        )));
    }
    if scale == 1.0 {
        return Ok(image.clone());
    }
    let width = ((image.width() as f64 * scale).round() as u32).max(1);
    let height = ((image.height() as f64 * scale).round() as u32).max(1);
    Ok(imageops::resize(
        image,
        width,
        height,
        imageops::FilterType::Nearest,
    ))
}
