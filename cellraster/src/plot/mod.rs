//! Plot entry points and the steps they share.
//!
//! [`plot_pixels`] colours multi-channel images and can outline cells from
//! matching masks; [`plot_cells`] paints the cells of label masks by feature
//! or metadata values. Both render every selected image into a
//! [`CompositeRaster`] and optionally assemble the rasters into annotated
//! canvases laid out by [`crate::layout`].

pub mod cells;
pub mod pixels;

use std::collections::{BTreeMap, HashMap};

use image::RgbImage;
use log::debug;

pub use self::cells::{plot_cells, CellsRequest};
pub use self::pixels::{plot_pixels, PixelsRequest};
use crate::algo::{map_in_order, RangeScan};
use crate::cells::{CellTable, Column};
use crate::collection::{EntryKey, ImageCollection, ImageEntry, LabelMask};
use crate::colour::{ColorMapper, ColorSpec, Rgb};
use crate::config::PlotConfig;
use crate::error::{CellrasterError, Result};
use crate::image_proc::composite::CompositeRaster;
use crate::image_proc::image::{blank_canvas, place_tile, raster_to_rgb_image};
use crate::image_proc::normalize::rescale;
use crate::image_proc::overlay::{draw_annotations, Annotations};
use crate::image_size::PixelShape;
use crate::layout::{
    legend_geometry, legend_width, page_layout, scale_bar_geometry, title_geometry, Display,
    LegendContent, LegendRole, LegendSection,
};

/// What a plot call hands back.
#[derive(Debug, Clone, Default)]
pub struct PlotOutput {
    /// One composite per selected image, in selection order
    pub images: Option<Vec<CompositeRaster>>,
    /// Annotated canvases: one for `Display::All`, one per image for
    /// `Display::Single`
    pub plot: Option<Vec<RgbImage>>,
}

/// A rendered image waiting to be placed on a canvas.
#[derive(Debug, Clone)]
pub(crate) struct Tile {
    pub name: String,
    pub raster: CompositeRaster,
}

/// Colours of individual cells, keyed by join id and cell id.
#[derive(Debug, Clone, Default)]
pub(crate) struct CellColours {
    by_image: HashMap<String, HashMap<u32, Rgb>>,
    /// Colour of cells without an entry
    fallback: Option<Rgb>,
}

impl CellColours {
    pub fn with_fallback(fallback: Rgb) -> Self {
        Self {
            by_image: HashMap::new(),
            fallback: Some(fallback),
        }
    }

    pub fn insert(&mut self, image_id: &str, cell_id: u32, colour: Rgb) {
        self.by_image
            .entry(image_id.to_string())
            .or_default()
            .insert(cell_id, colour);
    }

    pub fn get(&self, image_id: &str, cell_id: u32) -> Option<Rgb> {
        self.by_image
            .get(image_id)
            .and_then(|cells| cells.get(&cell_id))
            .copied()
            .or(self.fallback)
    }
}

pub(crate) fn select_images(
    collection: &ImageCollection,
    subset: Option<&[EntryKey]>,
) -> Result<ImageCollection> {
    let selected = match subset {
        Some(keys) => collection.get(keys)?,
        None => collection.clone(),
    };
    if selected.is_empty() {
        return Err(CellrasterError::Schema("no images selected for plotting".to_string()));
    }
    Ok(selected)
}

/// Mask belonging to `entry`: same `image_id`, otherwise same name.
pub(crate) fn matching_mask<'a>(
    masks: &'a ImageCollection,
    entry: &ImageEntry,
) -> Result<&'a LabelMask> {
    let by_id = entry
        .metadata
        .image_id
        .as_ref()
        .and_then(|id| masks.resolve(&EntryKey::ImageId(id.clone())));
    let position = by_id
        .or_else(|| masks.resolve(&EntryKey::Name(entry.name.clone())))
        .ok_or_else(|| CellrasterError::NotFound(format!("mask for image '{}'", entry.name)))?;
    let mask = masks.entries()[position].image.as_label().ok_or_else(|| {
        CellrasterError::Schema("masks must be a collection of label masks".to_string())
    })?;
    if mask.shape() != entry.image.shape() {
        return Err(CellrasterError::Schema(format!(
            "mask of '{}' is {} but the image is {}",
            entry.name,
            mask.shape(),
            entry.image.shape()
        )));
    }
    Ok(mask)
}

/// Table rows of the selected entries.
pub(crate) fn selected_rows(table: &CellTable, selected: &ImageCollection) -> Vec<usize> {
    let ids: Vec<&str> = selected.iter().map(|e| e.join_id()).collect();
    (0..table.n_rows())
        .filter(|&row| ids.contains(&table.image_id(row)))
        .collect()
}

/// Finite minimum and maximum of `values` at `rows`, `(0, 0)` without data.
pub(crate) fn value_range(values: &[f64], rows: &[usize]) -> (f64, f64) {
    RangeScan::from_values(rows.iter().map(|&row| values[row]).filter(|v| v.is_finite()))
        .range()
        .unwrap_or((0.0, 0.0))
}

/// Colour cells by a metadata column.
///
/// Numeric columns without a discrete colour map are coloured on a ramp
/// scaled to the values of the selected cells; everything else is looked up
/// by category. Cells without a record fall back to `missing`.
pub(crate) fn metadata_colours(
    table: &CellTable,
    column: &str,
    rows: &[usize],
    colour: &BTreeMap<String, ColorSpec>,
    config: &PlotConfig,
    role: LegendRole,
) -> Result<(CellColours, LegendSection)> {
    let values = table.metadata(column)?;
    let user_spec = colour.get(column).cloned();
    let mut colours = CellColours::with_fallback(config.missing_colour);

    let content = match (values, user_spec) {
        (Column::Numeric(numbers), spec @ (None | Some(ColorSpec::Ramp(_)))) => {
            let ramp = match spec {
                Some(ColorSpec::Ramp(ramp)) => ramp,
                _ => config.feature_ramp.clone(),
            };
            let mapper = ColorMapper::new(column, ColorSpec::Ramp(ramp.clone()))?;
            let range = value_range(numbers, rows);
            for &row in rows {
                let colour = mapper.continuous(rescale(numbers[row], range))?;
                colours.insert(table.image_id(row), table.cell_id(row), colour);
            }
            LegendContent::Ramp {
                title: column.to_string(),
                min: range.0,
                max: range.1,
                colours: ramp,
            }
        }
        (_, spec) => {
            let labels = table.labels(column, rows)?;
            let spec = spec.unwrap_or_else(|| ColorSpec::discrete_for(&labels));
            let mut mapper = ColorMapper::new(column, spec)?;
            if let Some(colour) = config.discrete_default {
                mapper = mapper.with_default(colour);
            }
            for &row in rows {
                let colour = mapper.discrete(&values.label(row))?;
                colours.insert(table.image_id(row), table.cell_id(row), colour);
            }
            let entries = labels
                .into_iter()
                .map(|label| {
                    let colour = mapper.discrete(&label)?;
                    Ok((label, colour))
                })
                .collect::<Result<Vec<_>>>()?;
            LegendContent::Swatches {
                title: column.to_string(),
                entries,
            }
        }
    };
    debug!("coloured {} cells by '{column}'", rows.len());
    Ok((colours, LegendSection { role, content }))
}

/// Ramp for the `index`-th of `count` continuous selections: a user ramp,
/// the feature ramp for a single feature, or black to the default colour.
pub(crate) fn selection_ramp(
    name: &str,
    index: usize,
    count: usize,
    colour: &BTreeMap<String, ColorSpec>,
    config: &PlotConfig,
    single_uses_feature_ramp: bool,
) -> Result<Vec<Rgb>> {
    match colour.get(name) {
        Some(ColorSpec::Ramp(ramp)) => {
            ColorMapper::new(name, ColorSpec::Ramp(ramp.clone()))?;
            Ok(ramp.clone())
        }
        Some(ColorSpec::Discrete(_)) => Err(CellrasterError::Schema(format!(
            "'{name}' is coloured continuously and needs a colour ramp"
        ))),
        None if single_uses_feature_ramp && count == 1 => Ok(config.feature_ramp.clone()),
        None => Ok(config.channel_ramp(index)),
    }
}

/// Lay tiles out on canvases and draw the annotations.
pub(crate) fn assemble(
    tiles: &[Tile],
    legend: &[LegendSection],
    config: &PlotConfig,
) -> Result<Vec<RgbImage>> {
    let reference = tiles
        .iter()
        .fold(PixelShape::default(), |acc, t| acc.union(&PixelShape::from_dim(shape2(&t.raster))));
    let titles: Vec<String> = match config.image_title.as_ref().and_then(|t| t.text.clone()) {
        Some(text) if text.len() != tiles.len() => {
            return Err(CellrasterError::Schema(format!(
                "{} image titles for {} images",
                text.len(),
                tiles.len()
            )))
        }
        Some(text) => text,
        None => tiles.iter().map(|t| t.name.clone()).collect(),
    };
    let legend_panel =
        (config.legend.is_some() && !legend.is_empty()).then(|| legend_width(reference));

    let pages: Vec<Vec<usize>> = match config.display {
        Display::All => vec![(0..tiles.len()).collect()],
        Display::Single => (0..tiles.len()).map(|i| vec![i]).collect(),
    };
    map_in_order(&pages, |indices: &Vec<usize>| -> Result<RgbImage> {
        let shapes: Vec<PixelShape> = indices
            .iter()
            .map(|&i| PixelShape::from_dim(shape2(&tiles[i].raster)))
            .collect();
        let cell = match config.display {
            Display::All => reference,
            Display::Single => shapes[0],
        };
        let page = page_layout(&shapes, cell, config.margin, legend_panel);
        debug!(
            "canvas {} with {}x{} grid for {} images",
            page.canvas,
            page.ncol,
            page.nrow,
            indices.len()
        );

        let mut canvas = blank_canvas(page.canvas, config.canvas_colour);
        let mut annotations = Annotations::default();
        for (&i, rect) in indices.iter().zip(&page.tiles) {
            place_tile(&mut canvas, &raster_to_rgb_image(&tiles[i].raster), rect.x, rect.y);
            if let Some(options) = &config.scale_bar {
                annotations
                    .scale_bars
                    .push(scale_bar_geometry(rect, options, reference)?);
            }
            if let Some(options) = &config.image_title {
                annotations
                    .titles
                    .push(title_geometry(rect, &titles[i], options, reference));
            }
        }
        if let (Some(panel), Some(options)) = (page.legend, &config.legend) {
            annotations.legend = Some(legend_geometry(legend, panel, reference, options));
        }
        draw_annotations(&canvas, &annotations, config.load_system_fonts)
    })
}

fn shape2(raster: &CompositeRaster) -> (usize, usize) {
    let (height, width, _) = raster.dim();
    (height, width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{EntryMetadata, ImageKind};
    use ndarray::{Array2, Array3};

    fn table() -> CellTable {
        CellTable::new(
            vec!["A".into(), "A".into(), "B".into()],
            vec![1, 2, 1],
        )
        .unwrap()
        .with_metadata(
            "celltype",
            Column::Categorical(vec!["T".into(), "B".into(), "T".into()]),
        )
        .unwrap()
        .with_metadata("area", Column::Numeric(vec![10.0, 20.0, 30.0]))
        .unwrap()
    }

    fn masks() -> ImageCollection {
        let entries = ["A", "B"]
            .iter()
            .map(|name| {
                ImageEntry::new(*name, ImageKind::Label(LabelMask::new(Array2::zeros((4, 4)))))
                    .with_metadata(EntryMetadata::with_image_id(*name))
            })
            .collect();
        ImageCollection::from_entries(entries).unwrap()
    }

    #[test]
    fn test_cell_colours_fallback() {
        let mut colours = CellColours::with_fallback(Rgb::GRAY);
        colours.insert("A", 1, Rgb::RED);
        assert_eq!(colours.get("A", 1), Some(Rgb::RED));
        assert_eq!(colours.get("A", 9), Some(Rgb::GRAY));
        assert_eq!(CellColours::default().get("A", 1), None);
    }

    #[test]
    fn test_selected_rows_follow_join_ids() {
        let selected = masks().get(&[EntryKey::from("B")]).unwrap();
        assert_eq!(selected_rows(&table(), &selected), vec![2]);
    }

    #[test]
    fn test_metadata_colours_discrete_with_user_map() {
        let config = PlotConfig::default();
        let colour = BTreeMap::from([(
            "celltype".to_string(),
            ColorSpec::Discrete(BTreeMap::from([
                ("T".to_string(), Rgb::RED),
                ("B".to_string(), Rgb::BLUE),
            ])),
        )]);
        let (colours, legend) = metadata_colours(
            &table(),
            "celltype",
            &[0, 1, 2],
            &colour,
            &config,
            LegendRole::OutlineBy,
        )
        .unwrap();
        assert_eq!(colours.get("A", 2), Some(Rgb::BLUE));
        assert_eq!(colours.get("B", 7), Some(config.missing_colour));
        match legend.content {
            LegendContent::Swatches { entries, .. } => {
                assert_eq!(
                    entries,
                    vec![("B".to_string(), Rgb::BLUE), ("T".to_string(), Rgb::RED)]
                );
            }
            other => panic!("unexpected legend {other:?}"),
        }
    }

    #[test]
    fn test_metadata_colours_missing_mapping() {
        let colour = BTreeMap::from([(
            "celltype".to_string(),
            ColorSpec::Discrete(BTreeMap::from([("T".to_string(), Rgb::RED)])),
        )]);
        let err = metadata_colours(
            &table(),
            "celltype",
            &[0, 1],
            &colour,
            &PlotConfig::default(),
            LegendRole::ColourBy,
        )
        .unwrap_err();
        assert!(matches!(err, CellrasterError::MissingMapping { label, .. } if label == "B"));
    }

    #[test]
    fn test_metadata_colours_discrete_default() {
        let colour = BTreeMap::from([(
            "celltype".to_string(),
            ColorSpec::Discrete(BTreeMap::from([("T".to_string(), Rgb::RED)])),
        )]);
        let config = PlotConfig {
            discrete_default: Some(Rgb::CYAN),
            ..Default::default()
        };
        let (colours, legend) = metadata_colours(
            &table(),
            "celltype",
            &[0, 1],
            &colour,
            &config,
            LegendRole::ColourBy,
        )
        .unwrap();
        assert_eq!(colours.get("A", 1), Some(Rgb::RED));
        assert_eq!(colours.get("A", 2), Some(Rgb::CYAN));
        let unmapped = ("B".to_string(), Rgb::CYAN);
        assert!(matches!(
            legend.content,
            LegendContent::Swatches { entries, .. } if entries.contains(&unmapped)
        ));
    }

    #[test]
    fn test_metadata_colours_numeric_ramp() {
        let config = PlotConfig::default();
        let (colours, legend) = metadata_colours(
            &table(),
            "area",
            &[0, 1, 2],
            &BTreeMap::new(),
            &config,
            LegendRole::ColourBy,
        )
        .unwrap();
        assert_eq!(colours.get("A", 1), Some(config.feature_ramp[0]));
        assert_eq!(colours.get("B", 1), Some(config.feature_ramp[4]));
        assert!(matches!(
            legend.content,
            LegendContent::Ramp { min, max, .. } if min == 10.0 && max == 30.0
        ));
    }

    #[test]
    fn test_matching_mask_by_id_then_name() {
        let masks = masks();
        let image = ImageEntry::new(
            "whatever",
            ImageKind::Label(LabelMask::new(Array2::zeros((4, 4)))),
        )
        .with_metadata(EntryMetadata::with_image_id("B"));
        assert!(matching_mask(&masks, &image).is_ok());

        let unnamed = ImageEntry::new("A", ImageKind::Label(LabelMask::new(Array2::zeros((4, 4)))));
        assert!(matching_mask(&masks, &unnamed).is_ok());

        let missing = ImageEntry::new("C", ImageKind::Label(LabelMask::new(Array2::zeros((4, 4)))));
        assert!(matches!(
            matching_mask(&masks, &missing),
            Err(CellrasterError::NotFound(_))
        ));

        let wrong_size =
            ImageEntry::new("A", ImageKind::Label(LabelMask::new(Array2::zeros((2, 4)))));
        assert!(matches!(
            matching_mask(&masks, &wrong_size),
            Err(CellrasterError::Schema(_))
        ));
    }

    #[test]
    fn test_assemble_single_and_all() {
        let tiles: Vec<Tile> = (0..3)
            .map(|i| Tile {
                name: format!("img{i}"),
                raster: Array3::zeros((20, 30, 3)),
            })
            .collect();
        let config = PlotConfig {
            scale_bar: None,
            image_title: None,
            load_system_fonts: false,
            margin: 2,
            ..Default::default()
        };
        let all = assemble(&tiles, &[], &config).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].dimensions(), (2 * 30 + 3 * 2, 2 * 20 + 3 * 2));

        let single = PlotConfig {
            display: Display::Single,
            ..config
        };
        let pages = assemble(&tiles, &[], &single).unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2].dimensions(), (34, 24));
        assert_eq!(pages[2].get_pixel(2, 2).0, [0, 0, 0]);
        assert_eq!(pages[2].get_pixel(0, 0).0, single.canvas_colour.to_u8());
    }

    #[test]
    fn test_assemble_checks_title_count() {
        let tiles = vec![Tile {
            name: "a".to_string(),
            raster: Array3::zeros((5, 5, 3)),
        }];
        let mut config = PlotConfig {
            load_system_fonts: false,
            ..Default::default()
        };
        if let Some(title) = config.image_title.as_mut() {
            title.text = Some(vec!["x".to_string(), "y".to_string()]);
        }
        assert!(matches!(
            assemble(&tiles, &[], &config),
            Err(CellrasterError::Schema(_))
        ));
    }
}
