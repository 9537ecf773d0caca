//! Cell-level plots: label masks painted by cell features or metadata.

use std::collections::{BTreeMap, HashMap};

use log::{debug, info, warn};

use super::{
    assemble, metadata_colours, select_images, selected_rows, selection_ramp, value_range,
    CellColours, PlotOutput, Tile,
};
use crate::algo::map_in_order;
use crate::cells::CellTable;
use crate::collection::{EntryKey, ImageCollection, ImageEntry};
use crate::colour::{ColorSpec, Rgb};
use crate::config::PlotConfig;
use crate::error::{ensure_channel_ceiling, CellrasterError, Result};
use crate::image_proc::composite::{blend_cell_layers, paint_cells, CellLayer};
use crate::image_proc::normalize::rescale;
use crate::image_proc::outline::outline_cells;
use crate::layout::{LegendContent, LegendRole, LegendSection};

/// Assay slot read when no other is requested.
pub const DEFAULT_EXPRS_SLOT: &str = "counts";

/// Inputs of [`plot_cells`].
#[derive(Debug, Clone)]
pub struct CellsRequest<'a> {
    pub masks: &'a ImageCollection,
    pub cell_table: &'a CellTable,
    /// Features of `exprs_slot`, or a single metadata column
    pub colour_by: Vec<String>,
    pub outline_by: Option<String>,
    pub colour: BTreeMap<String, ColorSpec>,
    pub exprs_slot: String,
    pub subset: Option<Vec<EntryKey>>,
    pub config: PlotConfig,
    pub return_images: bool,
    pub return_plot: bool,
}

impl<'a> CellsRequest<'a> {
    pub fn new(masks: &'a ImageCollection, cell_table: &'a CellTable) -> Self {
        Self {
            masks,
            cell_table,
            colour_by: Vec::new(),
            outline_by: None,
            colour: BTreeMap::new(),
            exprs_slot: DEFAULT_EXPRS_SLOT.to_string(),
            subset: None,
            config: PlotConfig::default(),
            return_images: true,
            return_plot: true,
        }
    }

    pub fn colour_by<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.colour_by = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn outline_by(mut self, column: impl Into<String>) -> Self {
        self.outline_by = Some(column.into());
        self
    }

    pub fn exprs_slot(mut self, slot: impl Into<String>) -> Self {
        self.exprs_slot = slot.into();
        self
    }

    pub fn config(mut self, config: PlotConfig) -> Self {
        self.config = config;
        self
    }
}

/// How cell interiors are filled.
enum Fill {
    /// Fixed colour per cell
    Colours(CellColours),
    /// Features blended per image
    Features(Vec<FeatureValues>),
}

struct FeatureValues {
    name: String,
    ramp: Vec<Rgb>,
    /// Scaled values per join id and cell id
    by_image: HashMap<String, BTreeMap<u32, f64>>,
}

fn feature_fill(
    request: &CellsRequest<'_>,
    rows: &[usize],
    legend: &mut Vec<LegendSection>,
) -> Result<Fill> {
    let table = request.cell_table;
    let count = request.colour_by.len();
    let features = request
        .colour_by
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let values = table.feature(&request.exprs_slot, name)?;
            let ramp = selection_ramp(name, i, count, &request.colour, &request.config, true)?;
            let range = value_range(values, rows);
            let mut by_image: HashMap<String, BTreeMap<u32, f64>> = HashMap::new();
            for &row in rows {
                by_image
                    .entry(table.image_id(row).to_string())
                    .or_default()
                    .insert(table.cell_id(row), rescale(values[row], range));
            }
            legend.push(LegendSection {
                role: LegendRole::ColourBy,
                content: LegendContent::Ramp {
                    title: name.clone(),
                    min: range.0,
                    max: range.1,
                    colours: ramp.clone(),
                },
            });
            Ok(FeatureValues {
                name: name.clone(),
                ramp,
                by_image,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Fill::Features(features))
}

fn choose_fill(
    request: &CellsRequest<'_>,
    rows: &[usize],
    legend: &mut Vec<LegendSection>,
) -> Result<Fill> {
    let table = request.cell_table;
    let config = &request.config;
    ensure_channel_ceiling(request.colour_by.len())?;

    let is_metadata = |name: &String| {
        table.has_metadata(name) && !table.has_feature(&request.exprs_slot, name)
    };
    match request.colour_by.as_slice() {
        [] => {
            let mut colours = CellColours::with_fallback(config.missing_colour);
            for &row in rows {
                colours.insert(table.image_id(row), table.cell_id(row), config.foreground_colour);
            }
            Ok(Fill::Colours(colours))
        }
        [column] if is_metadata(column) => {
            let (colours, section) = metadata_colours(
                table,
                column,
                rows,
                &request.colour,
                config,
                LegendRole::ColourBy,
            )?;
            legend.push(section);
            Ok(Fill::Colours(colours))
        }
        names if names.iter().any(is_metadata) => Err(CellrasterError::Schema(
            "colour_by takes several features or a single metadata column".to_string(),
        )),
        _ => feature_fill(request, rows, legend),
    }
}

/// Paint the cells of every selected mask and assemble the annotated plot.
///
/// Cells present in a mask but absent from the cell table are painted with
/// the configured missing colour, background pixels with the background
/// colour.
pub fn plot_cells(request: &CellsRequest<'_>) -> Result<PlotOutput> {
    let config = &request.config;
    config.validate()?;
    if !request.masks.is_label() {
        return Err(CellrasterError::Schema(
            "plot_cells needs a collection of label masks".to_string(),
        ));
    }
    let selected = select_images(request.masks, request.subset.as_deref())?;
    let rows = selected_rows(request.cell_table, &selected);

    let mut legend = Vec::new();
    let fill = choose_fill(request, &rows, &mut legend)?;
    let outlines = match request.outline_by.as_deref() {
        Some(column) => {
            let (colours, section) = metadata_colours(
                request.cell_table,
                column,
                &rows,
                &request.colour,
                config,
                LegendRole::OutlineBy,
            )?;
            legend.push(section);
            Some(colours)
        }
        None => None,
    };

    let tiles = map_in_order(selected.entries(), |entry: &ImageEntry| -> Result<Tile> {
        let mask = entry.image.as_label().ok_or_else(|| {
            CellrasterError::Schema(format!("'{}' is not a label mask", entry.name))
        })?;
        let join_id = entry.join_id();

        let absent = mask
            .cell_ids()
            .into_iter()
            .filter(|&cell| request.cell_table.row(join_id, cell).is_none())
            .count();
        if absent > 0 {
            warn!(
                "{absent} cells of '{}' have no record in the cell table",
                entry.name
            );
        }

        let mut raster = match &fill {
            Fill::Colours(colours) => paint_cells(
                mask,
                |cell| colours.get(join_id, cell),
                config.background_colour,
                config.missing_colour,
            ),
            Fill::Features(features) => {
                let layers: Vec<CellLayer> = features
                    .iter()
                    .map(|feature| CellLayer {
                        name: feature.name.clone(),
                        values: feature.by_image.get(join_id).cloned().unwrap_or_default(),
                        ramp: feature.ramp.clone(),
                    })
                    .collect();
                let colours = blend_cell_layers(&layers, config.saturation)?;
                paint_cells(
                    mask,
                    |cell| colours.get(&cell).copied(),
                    config.background_colour,
                    config.missing_colour,
                )
            }
        };
        if let Some(colours) = &outlines {
            outline_cells(&mut raster, mask, config.thick, |cell| colours.get(join_id, cell))?;
        }
        debug!("painted {} cells of '{}'", mask.cell_ids().len(), entry.name);
        Ok(Tile {
            name: entry.name.clone(),
            raster,
        })
    })?;
    info!("plot_cells rendered {} images", tiles.len());

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
