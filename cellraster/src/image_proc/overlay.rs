//! Annotation overlays drawn with SVG
//!
//! Scale bars, titles and legends are written as one SVG document the size of
//! the canvas, rasterized with resvg and alpha-blended over the RGB image.
//! Text needs fonts from the system font database; without fonts, text is
//! dropped while lines, boxes and ramps still render.

use image::{Rgb as Pixel, RgbImage};
use log::warn;
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree};

use crate::colour::Rgb;
use crate::error::{CellrasterError, Result};
use crate::image_size::PixelShape;
use crate::layout::{LegendGeometry, Rect, ScaleBarGeometry, TextItem};

/// Everything drawn on top of one canvas.
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    pub scale_bars: Vec<ScaleBarGeometry>,
    pub titles: Vec<TextItem>,
    pub legend: Option<LegendGeometry>,
}

impl Annotations {
    pub fn is_empty(&self) -> bool {
        self.scale_bars.is_empty() && self.titles.is_empty() && self.legend.is_none()
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn push_rect(svg: &mut String, rect: &Rect, fill: &str, stroke: Option<(&Rgb, f64)>) {
    svg.push_str(&format!(
        r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}""#,
        rect.x, rect.y, rect.width, rect.height, fill
    ));
    if let Some((colour, width)) = stroke {
        svg.push_str(&format!(
            r#" stroke="{}" stroke-width="{}""#,
            colour.to_hex(),
            width
        ));
    }
    svg.push_str("/>");
}

fn push_text(svg: &mut String, text: &TextItem) {
    svg.push_str(&format!(
        concat!(
            r#"<text x="{}" y="{}" font-family="sans-serif" font-size="{}" "#,
            r#"font-weight="{}" text-anchor="{}" fill="{}">{}</text>"#
        ),
        text.x,
        text.y,
        text.size,
        text.weight.as_svg(),
        text.anchor.as_svg(),
        text.colour.to_hex(),
        escape_xml(&text.text)
    ));
}

fn push_scale_bar(svg: &mut String, bar: &ScaleBarGeometry) {
    if let Some((frame, fill)) = &bar.frame {
        push_rect(svg, frame, &fill.to_hex(), None);
    }
    svg.push_str(&format!(
        concat!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" "#,
            r#"stroke="{}" stroke-width="{}" stroke-linecap="butt"/>"#
        ),
        bar.start.0,
        bar.start.1,
        bar.end.0,
        bar.end.1,
        bar.colour.to_hex(),
        bar.line_width
    ));
    push_text(svg, &bar.label);
}

fn push_legend(svg: &mut String, legend: &LegendGeometry) {
    if !legend.ramps.is_empty() {
        svg.push_str("<defs>");
        for (i, (_, colours)) in legend.ramps.iter().enumerate() {
            svg.push_str(&format!(
                r#"<linearGradient id="ramp{i}" x1="0" y1="1" x2="0" y2="0">"#
            ));
            let last = colours.len().saturating_sub(1).max(1) as f64;
            for (j, colour) in colours.iter().enumerate() {
                svg.push_str(&format!(
                    r#"<stop offset="{}" stop-color="{}"/>"#,
                    j as f64 / last,
                    colour.to_hex()
                ));
            }
            svg.push_str("</linearGradient>");
        }
        svg.push_str("</defs>");
    }
    for (i, (rect, _)) in legend.ramps.iter().enumerate() {
        push_rect(svg, rect, &format!("url(#ramp{i})"), None);
    }
    for swatch in &legend.swatches {
        if swatch.filled {
            push_rect(svg, &swatch.rect, &swatch.colour.to_hex(), None);
        } else {
            let width = (swatch.rect.width * 0.2).max(1.0);
            push_rect(svg, &swatch.rect, "none", Some((&swatch.colour, width)));
        }
    }
    for text in &legend.texts {
        push_text(svg, text);
    }
}

/// SVG document of `annotations` on a canvas of size `canvas`.
pub fn annotation_svg(canvas: PixelShape, annotations: &Annotations) -> String {
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}">"#,
        canvas.width, canvas.height
    );
    if let Some(legend) = &annotations.legend {
        push_legend(&mut svg, legend);
    }
    for bar in &annotations.scale_bars {
        push_scale_bar(&mut svg, bar);
    }
    for title in &annotations.titles {
        push_text(&mut svg, title);
    }
    svg.push_str("</svg>");
    svg
}

/// Rasterize `svg` and blend it over `image`.
pub fn overlay_svg(image: &RgbImage, svg: &str, load_system_fonts: bool) -> Result<RgbImage> {
    let mut options = Options::default();
    if load_system_fonts {
        options.fontdb_mut().load_system_fonts();
        if options.fontdb.len() == 0 {
            warn!("no system fonts found; annotation text will not be drawn");
        }
    }
    let tree = Tree::from_str(svg, &options)
        .map_err(|e| CellrasterError::Overlay(format!("invalid annotation SVG: {e}")))?;

    let (width, height) = image.dimensions();
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        CellrasterError::Overlay(format!("cannot allocate a {width}x{height} overlay"))
    })?;
    resvg::render(&tree, Transform::identity(), &mut pixmap.as_mut());

    let mut output = image.clone();
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        let Some(overlay) = pixmap.pixel(x, y) else {
            continue;
        };
        if overlay.alpha() == 0 {
            continue;
        }
        let overlay = overlay.demultiply();
        let alpha = overlay.alpha();
        *pixel = Pixel([
            blend_channel(pixel[0], overlay.red(), alpha),
            blend_channel(pixel[1], overlay.green(), alpha),
            blend_channel(pixel[2], overlay.blue(), alpha),
        ]);
    }
    Ok(output)
}

/// Draw `annotations` onto `image`.
pub fn draw_annotations(
    image: &RgbImage,
    annotations: &Annotations,
    load_system_fonts: bool,
) -> Result<RgbImage> {
    if annotations.is_empty() {
        return Ok(image.clone());
    }
    let (width, height) = image.dimensions();
    let svg = annotation_svg(PixelShape::new(width as usize, height as usize), annotations);
    overlay_svg(image, &svg, load_system_fonts)
}

fn blend_channel(base: u8, overlay: u8, alpha: u8) -> u8 {
    let alpha = alpha as f32 / 255.0;
    (base as f32 * (1.0 - alpha) + overlay as f32 * alpha).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{FontWeight, Swatch, TextAnchor};

    fn label(text: &str) -> TextItem {
        TextItem {
            text: text.to_string(),
            x: 10.0,
            y: 10.0,
            size: 8.0,
            colour: Rgb::WHITE,
            weight: FontWeight::Normal,
            anchor: TextAnchor::Middle,
        }
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape_xml("CD4 <T & B>"), "CD4 &lt;T &amp; B&gt;");
        let annotations = Annotations {
            titles: vec![label("a<b")],
            ..Default::default()
        };
        let svg = annotation_svg(PixelShape::new(20, 20), &annotations);
        assert!(svg.contains(">a&lt;b</text>"));
        assert!(Tree::from_str(&svg, &Options::default()).is_ok());
    }

    #[test]
    fn test_scale_bar_drawn() {
        let image = RgbImage::from_pixel(40, 20, Pixel([0, 0, 0]));
        let annotations = Annotations {
            scale_bars: vec![ScaleBarGeometry {
                start: (10.0, 10.0),
                end: (30.0, 10.0),
                line_width: 4.0,
                colour: Rgb::WHITE,
                frame: None,
                label: label("20 µm"),
            }],
            ..Default::default()
        };
        let out = draw_annotations(&image, &annotations, false).unwrap();
        assert_eq!(out.get_pixel(20, 10).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(20, 2).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(5, 10).0, [0, 0, 0]);
    }

    #[test]
    fn test_legend_swatches_and_ramp() {
        let image = RgbImage::from_pixel(60, 60, Pixel([255, 255, 255]));
        let legend = LegendGeometry {
            panel: Rect::new(0.0, 0.0, 60.0, 60.0),
            texts: vec![],
            swatches: vec![
                Swatch {
                    rect: Rect::new(2.0, 2.0, 10.0, 10.0),
                    colour: Rgb::RED,
                    filled: true,
                },
                Swatch {
                    rect: Rect::new(20.0, 2.0, 20.0, 20.0),
                    colour: Rgb::BLUE,
                    filled: false,
                },
            ],
            ramps: vec![(Rect::new(2.0, 30.0, 10.0, 20.0), vec![Rgb::BLACK, Rgb::BLACK])],
        };
        let annotations = Annotations {
            legend: Some(legend),
            ..Default::default()
        };
        let out = draw_annotations(&image, &annotations, false).unwrap();
        assert_eq!(out.get_pixel(6, 6).0, [255, 0, 0]);
        // hollow swatch keeps its inside
        assert_eq!(out.get_pixel(30, 12).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(20, 12).0[2], 255);
        assert_eq!(out.get_pixel(6, 40).0, [0, 0, 0]);
    }

    #[test]
    fn test_empty_annotations_are_identity() {
        let image = RgbImage::from_pixel(3, 3, Pixel([1, 2, 3]));
        let out = draw_annotations(&image, &Annotations::default(), false).unwrap();
        assert_eq!(out, image);
    }

    #[test]
    fn test_blend_channel() {
        assert_eq!(blend_channel(0, 255, 255), 255);
        assert_eq!(blend_channel(100, 200, 0), 100);
        assert_eq!(blend_channel(0, 200, 128), 100);
    }
}
