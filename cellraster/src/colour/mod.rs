//! Colours, colour specifications and the value → colour mapper.
//!
//! Colours are linear `[0, 1]` RGB triples in `f64` so they can be summed and
//! clipped by the compositor without quantization. Parsing accepts hex
//! notation (`#rgb`, `#rrggbb`) and SVG/CSS colour names.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use palette::{Hsl, IntoColor, Srgb};
use serde::{Deserialize, Serialize};

use crate::error::{CellrasterError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);
    pub const WHITE: Rgb = Rgb::new(1.0, 1.0, 1.0);
    pub const RED: Rgb = Rgb::new(1.0, 0.0, 0.0);
    pub const GREEN: Rgb = Rgb::new(0.0, 1.0, 0.0);
    pub const BLUE: Rgb = Rgb::new(0.0, 0.0, 1.0);
    pub const CYAN: Rgb = Rgb::new(0.0, 1.0, 1.0);
    pub const MAGENTA: Rgb = Rgb::new(1.0, 0.0, 1.0);
    pub const YELLOW: Rgb = Rgb::new(1.0, 1.0, 0.0);
    pub const GRAY: Rgb = Rgb::new(0.5, 0.5, 0.5);

    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub fn from_u8(rgb: [u8; 3]) -> Self {
        Self::new(
            rgb[0] as f64 / 255.0,
            rgb[1] as f64 / 255.0,
            rgb[2] as f64 / 255.0,
        )
    }

    /// Quantize to 8 bits per channel, clamping out-of-range components.
    pub fn to_u8(&self) -> [u8; 3] {
        let q = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b)]
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.r, self.g, self.b]
    }

    /// Parse `#rrggbb`, `#rgb` or a colour name such as `"steelblue"`.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if let Some(named) = palette::named::from_str(&trimmed.to_ascii_lowercase()) {
            return Ok(Self::from_u8([named.red, named.green, named.blue]));
        }
        Srgb::<u8>::from_str(trimmed)
            .map(|c| Self::from_u8([c.red, c.green, c.blue]))
            .map_err(|_| CellrasterError::Schema(format!("cannot parse colour '{text}'")))
    }

    pub fn to_hex(&self) -> String {
        let [r, g, b] = self.to_u8();
        format!("#{r:02x}{g:02x}{b:02x}")
    }

    /// Linear interpolation towards `other`; exact at `t = 0` and `t = 1`.
    pub fn lerp(&self, other: &Rgb, t: f64) -> Rgb {
        Rgb::new(
            self.r * (1.0 - t) + other.r * t,
            self.g * (1.0 - t) + other.g * t,
            self.b * (1.0 - t) + other.b * t,
        )
    }
}

impl TryFrom<String> for Rgb {
    type Error = CellrasterError;

    fn try_from(text: String) -> Result<Self> {
        Rgb::parse(&text)
    }
}

impl From<Rgb> for String {
    fn from(colour: Rgb) -> Self {
        colour.to_hex()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// How a channel, feature or metadata column is coloured.
///
/// In JSON a ramp is a list of colours and a discrete mapping an object from
/// category label to colour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorSpec {
    /// At least two control colours, interpolated by value.
    Ramp(Vec<Rgb>),
    /// Category label → colour.
    Discrete(BTreeMap<String, Rgb>),
}

impl ColorSpec {
    pub fn ramp(colours: Vec<Rgb>) -> Result<Self> {
        if colours.len() < 2 {
            return Err(CellrasterError::Schema(format!(
                "a colour ramp needs at least two colours, got {}",
                colours.len()
            )));
        }
        Ok(ColorSpec::Ramp(colours))
    }

    /// Distinct colours for every label, using evenly spaced hues.
    pub fn discrete_for(labels: &BTreeSet<String>) -> Self {
        let palette = generate_palette(labels.len());
        ColorSpec::Discrete(labels.iter().cloned().zip(palette).collect())
    }
}

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Rgb> {
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let rgb: Srgb = Hsl::new(hue, 0.75, 0.55).into_color();
            Rgb::new(rgb.red as f64, rgb.green as f64, rgb.blue as f64)
        })
        .collect()
}

/// Linear interpolation along a ramp of `k >= 2` colours.
///
/// `v` is clamped to `[0, 1]`; NaN maps to the first colour. Position
/// `v * (k - 1)` selects the bracketing pair of control colours.
pub fn interpolate(ramp: &[Rgb], v: f64) -> Rgb {
    debug_assert!(ramp.len() >= 2, "ramp needs two colours");
    let v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
    let position = v * (ramp.len() - 1) as f64;
    let lower = (position.floor() as usize).min(ramp.len() - 2);
    ramp[lower].lerp(&ramp[lower + 1], position - lower as f64)
}

/// Maps values of one channel, feature or metadata column to colours.
#[derive(Debug, Clone)]
pub struct ColorMapper {
    key: String,
    spec: ColorSpec,
    default: Option<Rgb>,
}

impl ColorMapper {
    pub fn new(key: impl Into<String>, spec: ColorSpec) -> Result<Self> {
        let key = key.into();
        if let ColorSpec::Ramp(colours) = &spec {
            if colours.len() < 2 {
                return Err(CellrasterError::Schema(format!(
                    "colour ramp for '{key}' needs at least two colours"
                )));
            }
        }
        Ok(Self {
            key,
            spec,
            default: None,
        })
    }

    /// Colour substituted for categories without a mapping.
    pub fn with_default(mut self, colour: Rgb) -> Self {
        self.default = Some(colour);
        self
    }

    /// Colour of a value already scaled to `[0, 1]`.
    pub fn continuous(&self, v: f64) -> Result<Rgb> {
        match &self.spec {
            ColorSpec::Ramp(ramp) => Ok(interpolate(ramp, v)),
            ColorSpec::Discrete(_) => Err(CellrasterError::Schema(format!(
                "'{}' has a discrete colour mapping and cannot colour continuous values",
                self.key
            ))),
        }
    }

    /// Colour of a category label.
    pub fn discrete(&self, label: &str) -> Result<Rgb> {
        match &self.spec {
            ColorSpec::Discrete(map) => map
                .get(label)
                .copied()
                .or(self.default)
                .ok_or_else(|| CellrasterError::MissingMapping {
                    key: self.key.clone(),
                    label: label.to_string(),
                }),
            ColorSpec::Ramp(_) => Err(CellrasterError::Schema(format!(
                "'{}' has a colour ramp and cannot colour categories",
                self.key
            ))),
        }
    }
}
