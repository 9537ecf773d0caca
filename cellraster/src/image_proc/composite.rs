//! Channel blending and cell painting into RGB composites.
//!
//! A composite is a `[height, width, 3]` array of `f64` subchannel values in
//! `[0, 1]`. Intensity channels contribute additively: each adjusted value
//! is looked up on its colour ramp and the resulting colours are summed per
//! subchannel, then brought back into range by the [`SaturationPolicy`].
//! Cells of a label mask are painted directly instead.

use std::collections::{BTreeMap, HashMap};

use ndarray::{Array3, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use crate::collection::LabelMask;
use crate::colour::{interpolate, Rgb};
use crate::error::{ensure_channel_ceiling, CellrasterError, Result};
use crate::image_size::PixelShape;

/// RGB raster `[height, width, 3]` with values in `[0, 1]`.
pub type CompositeRaster = Array3<f64>;

/// Brightness, contrast and gamma of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bcg {
    pub brightness: f64,
    pub contrast: f64,
    pub gamma: f64,
}

impl Default for Bcg {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 1.0,
            gamma: 1.0,
        }
    }
}

impl Bcg {
    pub fn new(brightness: f64, contrast: f64, gamma: f64) -> Self {
        Self {
            brightness,
            contrast,
            gamma,
        }
    }

    /// `((v + brightness) * contrast)^gamma`, negative intermediates floored
    /// at 0.
    pub fn apply(&self, value: f64) -> f64 {
        let adjusted = ((value + self.brightness) * self.contrast).max(0.0);
        if self.gamma == 1.0 {
            adjusted
        } else {
            adjusted.powf(self.gamma)
        }
    }
}

/// How summed contributions above 1 are brought back into range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaturationPolicy {
    /// Clip each subchannel at 1.
    #[default]
    Clip,
    /// Divide the whole raster by its largest subchannel value when that
    /// exceeds 1.
    Renormalize,
}

/// One channel plane with its ramp and adjustment.
#[derive(Debug, Clone)]
pub struct ChannelLayer<'a> {
    pub name: String,
    pub values: ArrayView2<'a, f64>,
    pub ramp: Vec<Rgb>,
    pub bcg: Bcg,
}

/// Add the ramp colours of one layer to `raster` without clipping.
pub fn add_layer(raster: &mut CompositeRaster, layer: &ChannelLayer<'_>) -> Result<()> {
    let (height, width, _) = raster.dim();
    if layer.values.dim() != (height, width) {
        return Err(CellrasterError::Schema(format!(
            "channel '{}' is {} but the composite is {}",
            layer.name,
            PixelShape::from_dim(layer.values.dim()),
            PixelShape::new(width, height)
        )));
    }
    for ((y, x), &value) in layer.values.indexed_iter() {
        let colour = interpolate(&layer.ramp, layer.bcg.apply(value));
        raster[[y, x, 0]] += colour.r;
        raster[[y, x, 1]] += colour.g;
        raster[[y, x, 2]] += colour.b;
    }
    Ok(())
}

/// Bring every subchannel into `[0, 1]`.
pub fn apply_saturation(raster: &mut CompositeRaster, policy: SaturationPolicy) {
    match policy {
        SaturationPolicy::Clip => raster.mapv_inplace(|v| v.clamp(0.0, 1.0)),
        SaturationPolicy::Renormalize => {
            let max = raster.iter().copied().fold(0.0_f64, f64::max);
            if max > 1.0 {
                raster.mapv_inplace(|v| (v / max).max(0.0));
            } else {
                raster.mapv_inplace(|v| v.max(0.0));
            }
        }
    }
}

/// Blend up to [`MAX_COLOUR_CHANNELS`](crate::error::MAX_COLOUR_CHANNELS)
/// layers of size `shape` into one composite.
pub fn blend_layers(
    layers: &[ChannelLayer<'_>],
    shape: PixelShape,
    policy: SaturationPolicy,
) -> Result<CompositeRaster> {
    ensure_channel_ceiling(layers.len())?;
    let mut raster = Array3::zeros((shape.height, shape.width, 3));
    for layer in layers {
        add_layer(&mut raster, layer)?;
    }
    apply_saturation(&mut raster, policy);
    Ok(raster)
}

/// Paint each pixel with its cell's colour.
///
/// Background pixels get `background`; cells for which `colour_for` has no
/// colour get `missing`.
pub fn paint_cells<F>(
    mask: &LabelMask,
    colour_for: F,
    background: Rgb,
    missing: Rgb,
) -> CompositeRaster
where
    F: Fn(u32) -> Option<Rgb>,
{
    let colours: HashMap<u32, Rgb> = mask
        .cell_ids()
        .into_iter()
        .map(|id| (id, colour_for(id).unwrap_or(missing)))
        .collect();
    let (height, width) = mask.labels().dim();
    let mut raster = Array3::zeros((height, width, 3));
    Zip::from(raster.rows_mut())
        .and(mask.labels())
        .for_each(|mut pixel, &label| {
            let colour = if label == 0 {
                background
            } else {
                colours.get(&label).copied().unwrap_or(missing)
            };
            pixel.assign(&ndarray::arr1(&colour.to_array()));
        });
    raster
}

/// Per-cell values of one feature, already scaled to `[0, 1]`.
#[derive(Debug, Clone)]
pub struct CellLayer {
    pub name: String,
    pub values: BTreeMap<u32, f64>,
    pub ramp: Vec<Rgb>,
}

/// Additively blend several per-cell features into one colour per cell.
///
/// A cell receives a colour when at least one layer has a value for it.
pub fn blend_cell_layers(
    layers: &[CellLayer],
    policy: SaturationPolicy,
) -> Result<BTreeMap<u32, Rgb>> {
    ensure_channel_ceiling(layers.len())?;
    let mut sums: BTreeMap<u32, [f64; 3]> = BTreeMap::new();
    for layer in layers {
        for (&cell, &value) in &layer.values {
            let colour = interpolate(&layer.ramp, value);
            let sum = sums.entry(cell).or_insert([0.0; 3]);
            sum[0] += colour.r;
            sum[1] += colour.g;
            sum[2] += colour.b;
        }
    }
    let divisor = match policy {
        SaturationPolicy::Clip => 1.0,
        SaturationPolicy::Renormalize => sums
            .values()
            .flat_map(|sum| sum.iter().copied())
            .fold(1.0_f64, f64::max),
    };
    Ok(sums
        .into_iter()
        .map(|(cell, [r, g, b])| {
            let clip = |v: f64| (v / divisor).clamp(0.0, 1.0);
            (cell, Rgb::new(clip(r), clip(g), clip(b)))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    fn layer<'a>(name: &str, values: &'a Array2<f64>, colour: Rgb) -> ChannelLayer<'a> {
        ChannelLayer {
            name: name.to_string(),
            values: values.view(),
            ramp: vec![Rgb::BLACK, colour],
            bcg: Bcg::default(),
        }
    }

    #[test]
    fn test_bcg_order() {
        let bcg = Bcg::new(0.1, 2.0, 2.0);
        assert_abs_diff_eq!(bcg.apply(0.2), 0.36, epsilon = 1e-12);
        assert_eq!(Bcg::new(-1.0, 1.0, 0.5).apply(0.5), 0.0);
        assert_eq!(Bcg::default().apply(0.7), 0.7);
    }

    #[test]
    fn test_saturation_bound() {
        let a = Array2::from_elem((4, 4), 1.0);
        let b = Array2::from_elem((4, 4), 0.8);
        let c = array![
            [0.0, 0.5, 1.0, 2.0],
            [0.0, 0.5, 1.0, 2.0],
            [0.0, 0.5, 1.0, 2.0],
            [-3.0, 0.5, 1.0, 9.0]
        ];
        let layers = vec![
            layer("a", &a, Rgb::RED),
            layer("b", &b, Rgb::YELLOW),
            ChannelLayer {
                bcg: Bcg::new(0.0, 5.0, 1.0),
                ..layer("c", &c, Rgb::WHITE)
            },
        ];
        for policy in [SaturationPolicy::Clip, SaturationPolicy::Renormalize] {
            let raster = blend_layers(&layers, PixelShape::new(4, 4), policy).unwrap();
            assert!(raster.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_clip_keeps_unsaturated_subchannels() {
        let a = Array2::from_elem((1, 1), 1.0);
        let b = Array2::from_elem((1, 1), 0.5);
        let layers = vec![layer("a", &a, Rgb::RED), layer("b", &b, Rgb::YELLOW)];
        let raster = blend_layers(&layers, PixelShape::new(1, 1), SaturationPolicy::Clip).unwrap();
        assert_eq!(raster[[0, 0, 0]], 1.0);
        assert_eq!(raster[[0, 0, 1]], 0.5);

        let renorm =
            blend_layers(&layers, PixelShape::new(1, 1), SaturationPolicy::Renormalize).unwrap();
        assert_abs_diff_eq!(renorm[[0, 0, 0]], 1.0);
        assert_abs_diff_eq!(renorm[[0, 0, 1]], 0.5 / 1.5);
    }

    #[test]
    fn test_incremental_blend_matches_single_blend() {
        let a = array![[0.1, 0.2], [0.3, 0.0]];
        let b = array![[0.2, 0.1], [0.0, 0.3]];
        let c = array![[0.3, 0.3], [0.2, 0.1]];
        let shape = PixelShape::new(2, 2);

        let all = blend_layers(
            &[
                layer("a", &a, Rgb::RED),
                layer("b", &b, Rgb::GREEN),
                layer("c", &c, Rgb::MAGENTA),
            ],
            shape,
            SaturationPolicy::Clip,
        )
        .unwrap();

        let mut incremental = blend_layers(
            &[layer("a", &a, Rgb::RED), layer("b", &b, Rgb::GREEN)],
            shape,
            SaturationPolicy::Clip,
        )
        .unwrap();
        add_layer(&mut incremental, &layer("c", &c, Rgb::MAGENTA)).unwrap();
        apply_saturation(&mut incremental, SaturationPolicy::Clip);

        for (x, y) in all.iter().zip(incremental.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_channel_ceiling() {
        let plane = Array2::zeros((2, 2));
        let layers: Vec<_> = (0..7).map(|i| layer(&format!("c{i}"), &plane, Rgb::RED)).collect();
        let err = blend_layers(&layers, PixelShape::new(2, 2), SaturationPolicy::Clip).unwrap_err();
        assert!(matches!(
            err,
            CellrasterError::TooManyChannels {
                requested: 7,
                max: 6
            }
        ));
    }

    #[test]
    fn test_layer_shape_checked() {
        let plane = Array2::zeros((2, 3));
        let err = blend_layers(
            &[layer("p", &plane, Rgb::RED)],
            PixelShape::new(2, 2),
            SaturationPolicy::Clip,
        )
        .unwrap_err();
        assert!(matches!(err, CellrasterError::Schema(_)));
    }

    #[test]
    fn test_paint_cells_background_and_missing() {
        let mask = LabelMask::new(array![[0, 1], [2, 5]]);
        let raster = paint_cells(
            &mask,
            |id| (id != 5).then_some(Rgb::RED),
            Rgb::BLACK,
            Rgb::GRAY,
        );
        assert_eq!(raster[[0, 0, 0]], 0.0);
        assert_eq!(raster[[0, 1, 0]], 1.0);
        assert_eq!(raster[[1, 0, 0]], 1.0);
        for c in 0..3 {
            assert_eq!(raster[[1, 1, c]], 0.5);
        }
    }

    #[test]
    fn test_blend_cell_layers() {
        let layers = vec![
            CellLayer {
                name: "CD3".to_string(),
                values: BTreeMap::from([(1, 1.0), (2, 0.5)]),
                ramp: vec![Rgb::BLACK, Rgb::RED],
            },
            CellLayer {
                name: "CD8".to_string(),
                values: BTreeMap::from([(1, 1.0), (2, 0.0)]),
                ramp: vec![Rgb::BLACK, Rgb::YELLOW],
            },
        ];
        let colours = blend_cell_layers(&layers, SaturationPolicy::Clip).unwrap();
        assert_eq!(colours[&1], Rgb::new(1.0, 1.0, 0.0));
        assert_eq!(colours[&2], Rgb::new(0.5, 0.0, 0.0));
        assert!(!colours.contains_key(&3));
    }
}
