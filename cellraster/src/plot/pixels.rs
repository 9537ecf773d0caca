//! Pixel-level plots of multi-channel images.

use std::collections::BTreeMap;

use log::{debug, info};
use ndarray::Axis;

use super::{
    assemble, matching_mask, metadata_colours, select_images, selected_rows, selection_ramp,
    CellColours, PlotOutput, Tile,
};
use crate::algo::map_in_order;
use crate::cells::CellTable;
use crate::collection::{EntryKey, ImageCollection, ImageEntry, LabelMask};
use crate::colour::ColorSpec;
use crate::config::PlotConfig;
use crate::error::{ensure_channel_ceiling, CellrasterError, Result};
use crate::image_proc::composite::{blend_layers, Bcg, ChannelLayer};
use crate::image_proc::normalize::{collection_bounds, normalize, NormalizeOptions};
use crate::image_proc::outline::outline_cells;
use crate::layout::{LegendContent, LegendRole, LegendSection};

/// Inputs of [`plot_pixels`].
#[derive(Debug, Clone)]
pub struct PixelsRequest<'a> {
    pub images: &'a ImageCollection,
    /// Label masks matched to images by `image_id`, then by name
    pub masks: Option<&'a ImageCollection>,
    pub cell_table: Option<&'a CellTable>,
    /// Channels to blend; the first channel when empty
    pub colour_by: Vec<String>,
    /// Metadata column colouring the outlines
    pub outline_by: Option<String>,
    pub bcg: BTreeMap<String, Bcg>,
    /// Colour specification per channel or metadata column
    pub colour: BTreeMap<String, ColorSpec>,
    pub subset: Option<Vec<EntryKey>>,
    /// Normalize the selected channels before colouring
    pub scale: bool,
    pub normalize: NormalizeOptions,
    pub config: PlotConfig,
    pub return_images: bool,
    pub return_plot: bool,
}

impl<'a> PixelsRequest<'a> {
    pub fn new(images: &'a ImageCollection) -> Self {
        Self {
            images,
            masks: None,
            cell_table: None,
            colour_by: Vec::new(),
            outline_by: None,
            bcg: BTreeMap::new(),
            colour: BTreeMap::new(),
            subset: None,
            scale: true,
            normalize: NormalizeOptions::default(),
            config: PlotConfig::default(),
            return_images: true,
            return_plot: true,
        }
    }

    pub fn colour_by<S: Into<String>>(mut self, channels: impl IntoIterator<Item = S>) -> Self {
        self.colour_by = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn masks(mut self, masks: &'a ImageCollection) -> Self {
        self.masks = Some(masks);
        self
    }

    pub fn cell_table(mut self, table: &'a CellTable) -> Self {
        self.cell_table = Some(table);
        self
    }

    pub fn outline_by(mut self, column: impl Into<String>) -> Self {
        self.outline_by = Some(column.into());
        self
    }

    pub fn config(mut self, config: PlotConfig) -> Self {
        self.config = config;
        self
    }
}

/// Blend the selected channels of every selected image, optionally outline
/// cells, and assemble the annotated plot.
pub fn plot_pixels(request: &PixelsRequest<'_>) -> Result<PlotOutput> {
    let config = &request.config;
    config.validate()?;
    if request.images.is_label() {
        return Err(CellrasterError::Schema(
            "plot_pixels needs intensity images; use plot_cells for masks".to_string(),
        ));
    }

    let colour_by = match request.colour_by.as_slice() {
        [] => request
            .images
            .channel_names()
            .and_then(|names| names.first())
            .map(|name| vec![name.clone()])
            .unwrap_or_default(),
        names => names.to_vec(),
    };
    ensure_channel_ceiling(colour_by.len())?;

    let selected = select_images(request.images, request.subset.as_deref())?;
    let channels = selected.get_channels(&colour_by)?;
    for name in request.bcg.keys() {
        if !colour_by.contains(name) {
            return Err(CellrasterError::NotFound(format!(
                "bcg channel '{name}' is not among the coloured channels"
            )));
        }
    }

    let ranges = legend_ranges(&channels, request.scale, &request.normalize);
    let channels = if request.scale {
        normalize(&channels, &request.normalize)?
    } else {
        channels
    };

    let ramps = colour_by
        .iter()
        .enumerate()
        .map(|(i, name)| selection_ramp(name, i, colour_by.len(), &request.colour, config, false))
        .collect::<Result<Vec<_>>>()?;

    let mut legend: Vec<LegendSection> = colour_by
        .iter()
        .zip(&ramps)
        .zip(&ranges)
        .map(|((name, ramp), &(min, max))| LegendSection {
            role: LegendRole::ColourBy,
            content: LegendContent::Ramp {
                title: name.clone(),
                min,
                max,
                colours: ramp.clone(),
            },
        })
        .collect();

    let outlines = match request.masks {
        Some(masks) => {
            let masks: Vec<&LabelMask> = channels
                .iter()
                .map(|entry| matching_mask(masks, entry))
                .collect::<Result<_>>()?;
            let colours = outline_colours(request, &selected, &mut legend)?;
            Some((masks, colours))
        }
        None => None,
    };

    let indexed: Vec<(usize, &ImageEntry)> = channels.iter().enumerate().collect();
    let tiles = map_in_order(&indexed, |&(i, entry)| -> Result<Tile> {
        let image = entry.image.as_intensity().ok_or_else(|| {
            CellrasterError::Schema(format!("'{}' is not an intensity image", entry.name))
        })?;
        let layers: Vec<ChannelLayer> = colour_by
            .iter()
            .zip(&ramps)
            .enumerate()
            .map(|(c, (name, ramp))| ChannelLayer {
                name: name.clone(),
                values: image.data().index_axis(Axis(2), c),
                ramp: ramp.clone(),
                bcg: request.bcg.get(name).copied().unwrap_or_default(),
            })
            .collect();
        let mut raster = blend_layers(&layers, image.shape(), config.saturation)?;
        if let Some((masks, colours)) = &outlines {
            let join_id = entry.join_id();
            outline_cells(&mut raster, masks[i], config.thick, |cell| {
                colours.get(join_id, cell)
            })?;
        }
        debug!("rendered '{}' from {} channels", entry.name, layers.len());
        Ok(Tile {
            name: entry.name.clone(),
            raster,
        })
    })?;
    info!("plot_pixels rendered {} images", tiles.len());

    let plot = if request.return_plot {
        Some(assemble(&tiles, &legend, config)?)
    } else {
        None
    };
    Ok(PlotOutput {
        images: request
            .return_images
            .then(|| tiles.into_iter().map(|t| t.raster).collect()),
        plot,
    })
}

/// Value range each channel ramp spans: the normalization bounds over all
/// selected images when scaling, otherwise the display range `[0, 1]`.
fn legend_ranges(
    channels: &ImageCollection,
    scale: bool,
    options: &NormalizeOptions,
) -> Vec<(f64, f64)> {
    if scale {
        collection_bounds(channels, options)
    } else {
        let count = channels.channel_names().map_or(0, |names| names.len());
        vec![(0.0, 1.0); count]
    }
}

/// Outline colours: every cell in `outline_colour`, or by a metadata column
/// with `missing_colour` for cells absent from the table.
fn outline_colours(
    request: &PixelsRequest<'_>,
    selected: &ImageCollection,
    legend: &mut Vec<LegendSection>,
) -> Result<CellColours> {
    let Some(column) = request.outline_by.as_deref() else {
        return Ok(CellColours::with_fallback(request.config.outline_colour));
    };
    let table = request.cell_table.ok_or_else(|| {
        CellrasterError::NotFound(format!("cell table for outline_by column '{column}'"))
    })?;
    let rows = selected_rows(table, selected);
    let (colours, section) = metadata_colours(
        table,
        column,
        &rows,
        &request.colour,
        &request.config,
        LegendRole::OutlineBy,
    )?;
    legend.push(section);
    Ok(colours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::Column;
    use crate::collection::{EntryMetadata, ImageKind, MultiChannelImage};
    use crate::colour::Rgb;
    use approx::assert_abs_diff_eq;
    use ndarray::{s, Array2, Array3};

    fn images() -> ImageCollection {
        let entries = (0..2)
            .map(|i| {
                let mut data = Array3::zeros((8, 10, 2));
                data.slice_mut(s![.., .., 0]).fill(i as f64 + 1.0);
                data[[0, 0, 1]] = 4.0;
                let image =
                    MultiChannelImage::new(data, vec!["DNA".to_string(), "CD3".to_string()])
                        .unwrap();
                ImageEntry::new(format!("img{i}"), ImageKind::Intensity(image))
                    .with_metadata(EntryMetadata::with_image_id(format!("id{i}")))
            })
            .collect();
        ImageCollection::from_entries(entries).unwrap()
    }

    fn masks() -> ImageCollection {
        let entries = (0..2)
            .map(|i| {
                let mut labels = Array2::zeros((8, 10));
                labels.slice_mut(s![2..6, 2..6]).fill(1);
                ImageEntry::new(format!("mask{i}"), ImageKind::Label(LabelMask::new(labels)))
                    .with_metadata(EntryMetadata::with_image_id(format!("id{i}")))
            })
            .collect();
        ImageCollection::from_entries(entries).unwrap()
    }

    fn quiet() -> PlotConfig {
        PlotConfig {
            load_system_fonts: false,
            image_title: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_global_scaling_across_images() {
        let images = images();
        let request = PixelsRequest {
            return_plot: false,
            ..PixelsRequest::new(&images).colour_by(["DNA"]).config(quiet())
        };
        let out = plot_pixels(&request).unwrap();
        assert!(out.plot.is_none());
        let rasters = out.images.unwrap();
        assert_eq!(rasters[0][[3, 3, 0]], 0.0);
        assert_eq!(rasters[1][[3, 3, 0]], 1.0);
        assert_eq!(rasters[1][[3, 3, 1]], 0.0);
    }

    #[test]
    fn test_default_channel_is_first() {
        let images = images();
        let request = PixelsRequest::new(&images).config(quiet());
        let out = plot_pixels(&request).unwrap();
        assert_eq!(out.images.unwrap().len(), 2);
        assert_eq!(out.plot.unwrap().len(), 1);
    }

    #[test]
    fn test_bcg_applied_after_scaling() {
        let images = images();
        let mut request = PixelsRequest::new(&images).colour_by(["CD3"]).config(quiet());
        request.bcg.insert("CD3".to_string(), Bcg::new(0.0, 0.5, 1.0));
        request.return_plot = false;
        let rasters = plot_pixels(&request).unwrap().images.unwrap();
        assert_abs_diff_eq!(rasters[0][[0, 0, 0]], 0.5);
    }

    #[test]
    fn test_unknown_bcg_channel() {
        let images = images();
        let mut request = PixelsRequest::new(&images).colour_by(["CD3"]).config(quiet());
        request.bcg.insert("DNA".to_string(), Bcg::default());
        assert!(matches!(
            plot_pixels(&request),
            Err(CellrasterError::NotFound(_))
        ));
    }

    #[test]
    fn test_legend_ranges_follow_applied_bounds() {
        let images = images();
        let channels = images.get_channels(&["DNA".to_string(), "CD3".to_string()]).unwrap();
        let options = NormalizeOptions::default();
        assert_eq!(
            legend_ranges(&channels, true, &options),
            vec![(1.0, 2.0), (0.0, 4.0)]
        );

        let options = NormalizeOptions {
            input_range: Some(BTreeMap::from([("CD3".to_string(), (0.0, 8.0))])),
            ..Default::default()
        };
        assert_eq!(
            legend_ranges(&channels, true, &options),
            vec![(1.0, 2.0), (0.0, 8.0)]
        );
        assert_eq!(
            legend_ranges(&channels, false, &options),
            vec![(0.0, 1.0), (0.0, 1.0)]
        );
    }

    #[test]
    fn test_outlines_use_outline_colour() {
        let images = images();
        let masks = masks();
        let mut config = quiet();
        config.outline_colour = Rgb::YELLOW;
        let request = PixelsRequest {
            return_plot: false,
            ..PixelsRequest::new(&images)
                .colour_by(["CD3"])
                .masks(&masks)
                .config(config)
        };
        let rasters = plot_pixels(&request).unwrap().images.unwrap();
        assert_eq!(rasters[0][[2, 2, 1]], 1.0);
        assert_eq!(rasters[0][[2, 2, 0]], 1.0);
        // interior and background keep the channel colours
        assert_eq!(rasters[0][[3, 3, 1]], 0.0);
        assert_eq!(rasters[0][[7, 9, 1]], 0.0);
    }

    #[test]
    fn test_outline_by_metadata() {
        let images = images();
        let masks = masks();
        let table = CellTable::new(vec!["id0".to_string()], vec![1])
            .unwrap()
            .with_metadata("celltype", Column::Categorical(vec!["T".to_string()]))
            .unwrap();
        let colour = BTreeMap::from([(
            "celltype".to_string(),
            ColorSpec::Discrete(BTreeMap::from([("T".to_string(), Rgb::CYAN)])),
        )]);
        let request = PixelsRequest {
            colour,
            return_plot: false,
            ..PixelsRequest::new(&images)
                .colour_by(["CD3"])
                .masks(&masks)
                .cell_table(&table)
                .outline_by("celltype")
                .config(quiet())
        };
        let rasters = plot_pixels(&request).unwrap().images.unwrap();
        assert_eq!(rasters[0][[2, 2, 2]], 1.0);
        // no record for id1 cell 1
        let missing = PlotConfig::default().missing_colour;
        assert_eq!(rasters[1][[2, 2, 0]], missing.r);
    }

    #[test]
    fn test_outline_by_without_table() {
        let images = images();
        let masks = masks();
        let request = PixelsRequest::new(&images)
            .masks(&masks)
            .outline_by("celltype")
            .config(quiet());
        assert!(matches!(
            plot_pixels(&request),
            Err(CellrasterError::NotFound(_))
        ));
    }

    #[test]
    fn test_masks_rejected_as_images() {
        let masks = masks();
        let request = PixelsRequest::new(&masks).config(quiet());
        assert!(matches!(
            plot_pixels(&request),
            Err(CellrasterError::Schema(_))
        ));
    }

    #[test]
    fn test_discrete_spec_for_channel_rejected() {
        let images = images();
        let request = PixelsRequest {
            colour: BTreeMap::from([(
                "CD3".to_string(),
                ColorSpec::Discrete(BTreeMap::new()),
            )]),
            ..PixelsRequest::new(&images).colour_by(["CD3"]).config(quiet())
        };
        assert!(matches!(
            plot_pixels(&request),
            Err(CellrasterError::Schema(_))
        ));
    }
}
