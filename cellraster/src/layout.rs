//! Page layout: tile grid, scale bars, image titles and legends.
//!
//! All geometry is computed in canvas pixel coordinates (origin top-left,
//! y down) and sized relative to a *reference* shape, the largest image of
//! the batch, so that fonts, legend width and bar placement stay consistent
//! whether images are shown together (`Display::All`) or one per canvas
//! (`Display::Single`). Nothing here touches pixels; the annotator turns the
//! resulting primitives into an overlay.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::cells::format_number;
use crate::colour::Rgb;
use crate::error::{CellrasterError, Result};
use crate::image_size::PixelShape;

/// Whether a batch is assembled into one canvas or one canvas per image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Display {
    #[default]
    All,
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleBarAnchor {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitlePosition {
    #[default]
    Top,
    Bottom,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

impl FontWeight {
    pub fn as_svg(&self) -> &'static str {
        match self {
            FontWeight::Normal => "normal",
            FontWeight::Bold => "bold",
        }
    }
}

/// Horizontal alignment of a text item relative to its anchor point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Start,
    Middle,
    End,
}

impl TextAnchor {
    pub fn as_svg(&self) -> &'static str {
        match self {
            TextAnchor::Start => "start",
            TextAnchor::Middle => "middle",
            TextAnchor::End => "end",
        }
    }
}

/// Scale bar settings. `length` is in physical units, `pixel_size` in
/// physical units per pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleBarOptions {
    pub length: f64,
    pub pixel_size: f64,
    pub unit: String,
    /// Text shown above the bar; defaults to `"{length} {unit}"`.
    pub label: Option<String>,
    pub anchor: ScaleBarAnchor,
    pub line_width: f64,
    pub colour: Rgb,
    /// Fill colour of a box drawn behind bar and label.
    pub frame: Option<Rgb>,
    /// Horizontal and vertical distance from the image edge in pixels.
    pub margin: (f64, f64),
    /// Font size relative to the batch font base.
    pub font_size: f64,
}

impl Default for ScaleBarOptions {
    fn default() -> Self {
        Self {
            length: 20.0,
            pixel_size: 1.0,
            unit: "µm".to_string(),
            label: None,
            anchor: ScaleBarAnchor::BottomRight,
            line_width: 2.0,
            colour: Rgb::WHITE,
            frame: None,
            margin: (10.0, 10.0),
            font_size: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleOptions {
    /// One title per image; image names are used when absent.
    pub text: Option<Vec<String>>,
    pub position: TitlePosition,
    pub colour: Rgb,
    pub margin: (f64, f64),
    pub font_size: f64,
}

impl Default for TitleOptions {
    fn default() -> Self {
        Self {
            text: None,
            position: TitlePosition::Top,
            colour: Rgb::WHITE,
            margin: (5.0, 5.0),
            font_size: 1.0,
        }
    }
}

/// Font sizes (relative to the batch font base) and weights of one legend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegendFonts {
    pub title_size: f64,
    pub title_weight: FontWeight,
    pub label_size: f64,
    pub label_weight: FontWeight,
}

impl Default for LegendFonts {
    fn default() -> Self {
        Self {
            title_size: 1.0,
            title_weight: FontWeight::Bold,
            label_size: 0.8,
            label_weight: FontWeight::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegendOptions {
    pub colour_by: LegendFonts,
    pub outline_by: LegendFonts,
    pub text_colour: Rgb,
}

impl Default for LegendOptions {
    fn default() -> Self {
        Self {
            colour_by: LegendFonts::default(),
            outline_by: LegendFonts::default(),
            text_colour: Rgb::BLACK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub text: String,
    /// Anchor x position
    pub x: f64,
    /// Baseline y position
    pub y: f64,
    pub size: f64,
    pub colour: Rgb,
    pub weight: FontWeight,
    pub anchor: TextAnchor,
}

/// Placement of every image of a canvas and of its legend panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub canvas: PixelShape,
    pub ncol: usize,
    pub nrow: usize,
    pub tiles: Vec<Rect>,
    pub legend: Option<Rect>,
}

/// Base font size in pixels for a batch whose largest image is `reference`.
pub fn font_base(reference: PixelShape) -> f64 {
    (reference.max_side() as f64 / 20.0).max(8.0)
}

/// Width of the legend panel for a batch whose largest image is `reference`.
pub fn legend_width(reference: PixelShape) -> usize {
    ((reference.max_side() as f64 * 0.5).round() as usize).max(80)
}

/// Grid of `shapes` with `ncol = ceil(sqrt(n))` columns.
///
/// Every grid cell has the size of `cell`, tiles are separated (and framed)
/// by `margin` pixels, and images sit at the top-left corner of their cell.
/// When `legend_width` is given, a legend panel of that width is appended on
/// the right.
pub fn page_layout(
    shapes: &[PixelShape],
    cell: PixelShape,
    margin: usize,
    legend_width: Option<usize>,
) -> PageLayout {
    let n = shapes.len();
    let ncol = ((n as f64).sqrt().ceil() as usize).max(1);
    let nrow = n.div_ceil(ncol).max(1);

    let grid_width = ncol * cell.width + (ncol + 1) * margin;
    let grid_height = nrow * cell.height + (nrow + 1) * margin;

    let tiles = shapes
        .iter()
        .enumerate()
        .map(|(i, shape)| {
            let (row, col) = (i / ncol, i % ncol);
            Rect::new(
                (margin + col * (cell.width + margin)) as f64,
                (margin + row * (cell.height + margin)) as f64,
                shape.width as f64,
                shape.height as f64,
            )
        })
        .collect();

    let (canvas_width, legend) = match legend_width {
        Some(width) => (
            grid_width + width + margin,
            Some(Rect::new(
                grid_width as f64,
                margin as f64,
                width as f64,
                grid_height.saturating_sub(2 * margin) as f64,
            )),
        ),
        None => (grid_width, None),
    };

    PageLayout {
        canvas: PixelShape::new(canvas_width, grid_height),
        ncol,
        nrow,
        tiles,
        legend,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleBarGeometry {
    pub start: (f64, f64),
    pub end: (f64, f64),
    pub line_width: f64,
    pub colour: Rgb,
    pub frame: Option<(Rect, Rgb)>,
    pub label: TextItem,
}

impl ScaleBarGeometry {
    pub fn length_px(&self) -> f64 {
        self.end.0 - self.start.0
    }
}

/// Scale bar inside `tile`, anchored at one of its corners.
pub fn scale_bar_geometry(
    tile: &Rect,
    options: &ScaleBarOptions,
    reference: PixelShape,
) -> Result<ScaleBarGeometry> {
    if !(options.pixel_size > 0.0) || !(options.length > 0.0) {
        return Err(CellrasterError::Schema(format!(
            "scale bar needs a positive length and pixel size, got {} and {}",
            options.length, options.pixel_size
        )));
    }
    let length_px = (options.length / options.pixel_size).min(tile.width);
    let font = font_base(reference) * options.font_size;
    let (margin_x, margin_y) = options.margin;
    let half_line = options.line_width / 2.0;

    let x_start = match options.anchor {
        ScaleBarAnchor::TopLeft | ScaleBarAnchor::BottomLeft => tile.x + margin_x,
        ScaleBarAnchor::TopRight | ScaleBarAnchor::BottomRight => {
            tile.right() - margin_x - length_px
        }
    };
    // margins never push the bar outside its tile
    let x_start = x_start.min(tile.right() - length_px).max(tile.x);
    let (bar_y, baseline) = match options.anchor {
        ScaleBarAnchor::TopLeft | ScaleBarAnchor::TopRight => {
            let baseline = tile.y + margin_y + font;
            (baseline + 0.3 * font + half_line, baseline)
        }
        ScaleBarAnchor::BottomLeft | ScaleBarAnchor::BottomRight => {
            let bar_y = tile.bottom() - margin_y - half_line;
            (bar_y, bar_y - half_line - 0.3 * font)
        }
    };

    let text = options
        .label
        .clone()
        .unwrap_or_else(|| format!("{} {}", format_number(options.length), options.unit));
    let label = TextItem {
        text,
        x: x_start + length_px / 2.0,
        y: baseline,
        size: font,
        colour: options.colour,
        weight: FontWeight::Normal,
        anchor: TextAnchor::Middle,
    };

    let frame = options.frame.map(|fill| {
        let pad = 0.3 * font;
        let top = baseline - font - pad;
        let bottom = (bar_y + half_line).max(baseline) + pad;
        (
            Rect::new(x_start - pad, top, length_px + 2.0 * pad, bottom - top),
            fill,
        )
    });

    Ok(ScaleBarGeometry {
        start: (x_start, bar_y),
        end: (x_start + length_px, bar_y),
        line_width: options.line_width,
        colour: options.colour,
        frame,
        label,
    })
}

/// Title text for one tile.
pub fn title_geometry(
    tile: &Rect,
    text: &str,
    options: &TitleOptions,
    reference: PixelShape,
) -> TextItem {
    let font = font_base(reference) * options.font_size;
    let (margin_x, margin_y) = options.margin;
    let top = tile.y + margin_y + font;
    let bottom = tile.bottom() - margin_y;
    let (x, y, anchor) = match options.position {
        TitlePosition::Top => (tile.x + tile.width / 2.0, top, TextAnchor::Middle),
        TitlePosition::Bottom => (tile.x + tile.width / 2.0, bottom, TextAnchor::Middle),
        TitlePosition::TopLeft => (tile.x + margin_x, top, TextAnchor::Start),
        TitlePosition::TopRight => (tile.right() - margin_x, top, TextAnchor::End),
        TitlePosition::BottomLeft => (tile.x + margin_x, bottom, TextAnchor::Start),
        TitlePosition::BottomRight => (tile.right() - margin_x, bottom, TextAnchor::End),
    };
    TextItem {
        text: text.to_string(),
        x,
        y,
        size: font,
        colour: options.colour,
        weight: FontWeight::Normal,
        anchor,
    }
}

/// Which legend a section belongs to; each has its own fonts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegendRole {
    ColourBy,
    OutlineBy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LegendContent {
    /// Continuous values from `min` to `max` along a colour ramp.
    Ramp {
        title: String,
        min: f64,
        max: f64,
        colours: Vec<Rgb>,
    },
    /// One swatch per category.
    Swatches {
        title: String,
        entries: Vec<(String, Rgb)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendSection {
    pub role: LegendRole,
    pub content: LegendContent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Swatch {
    pub rect: Rect,
    pub colour: Rgb,
    /// Outline legends draw hollow swatches.
    pub filled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendGeometry {
    pub panel: Rect,
    pub texts: Vec<TextItem>,
    pub swatches: Vec<Swatch>,
    /// Vertical ramps, lowest value at the bottom.
    pub ramps: Vec<(Rect, Vec<Rgb>)>,
}

/// Stack legend sections top to bottom inside `panel`.
pub fn legend_geometry(
    sections: &[LegendSection],
    panel: Rect,
    reference: PixelShape,
    options: &LegendOptions,
) -> LegendGeometry {
    let base = font_base(reference);
    let pad = base * 0.5;
    let x = panel.x + pad;
    let mut y = panel.y;
    let mut geometry = LegendGeometry {
        panel,
        texts: Vec::new(),
        swatches: Vec::new(),
        ramps: Vec::new(),
    };

    for section in sections {
        let fonts = match section.role {
            LegendRole::ColourBy => &options.colour_by,
            LegendRole::OutlineBy => &options.outline_by,
        };
        let title_size = base * fonts.title_size;
        let label_size = base * fonts.label_size;
        let text = |text: String, x: f64, y: f64, size: f64, weight: FontWeight| TextItem {
            text,
            x,
            y,
            size,
            colour: options.text_colour,
            weight,
            anchor: TextAnchor::Start,
        };

        let title = match &section.content {
            LegendContent::Ramp { title, .. } | LegendContent::Swatches { title, .. } => title,
        };
        y += title_size;
        geometry
            .texts
            .push(text(title.clone(), x, y, title_size, fonts.title_weight));
        y += title_size * 0.5;

        match &section.content {
            LegendContent::Ramp {
                min, max, colours, ..
            } => {
                let bar = Rect::new(x, y, label_size * 1.2, (base * 6.0).min(panel.height * 0.4));
                let label_x = bar.right() + pad * 0.5;
                geometry.texts.push(text(
                    format_tick(*max),
                    label_x,
                    bar.y + label_size * 0.8,
                    label_size,
                    fonts.label_weight,
                ));
                geometry.texts.push(text(
                    format_tick(*min),
                    label_x,
                    bar.bottom(),
                    label_size,
                    fonts.label_weight,
                ));
                geometry.ramps.push((bar, colours.clone()));
                y = bar.bottom() + label_size;
            }
            LegendContent::Swatches { title, entries } => {
                // shrink rows to fit the panel, then drop what still overflows
                let room = (panel.bottom() - y).max(0.0);
                let fitted = (room / (entries.len().max(1) as f64 * 1.4)).min(label_size);
                let side = fitted.max(label_size * 0.5);
                let shown = if fitted < side {
                    (room / (side * 1.4)).floor() as usize
                } else {
                    entries.len()
                };
                if shown < entries.len() {
                    warn!(
                        "legend '{title}' shows {shown} of {} categories; the panel is too short",
                        entries.len()
                    );
                }
                for (label, colour) in entries.iter().take(shown) {
                    geometry.swatches.push(Swatch {
                        rect: Rect::new(x, y, side, side),
                        colour: *colour,
                        filled: section.role == LegendRole::ColourBy,
                    });
                    geometry.texts.push(text(
                        label.clone(),
                        x + side + pad * 0.5,
                        y + side * 0.85,
                        side,
                        fonts.label_weight,
                    ));
                    y += side * 1.4;
                }
                y += label_size;
            }
        }
    }
    geometry
}

fn format_tick(value: f64) -> String {
    if value.abs() >= 100.0 || value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}
