//! Rendering defaults shared by every plot call.
//!
//! A [`PlotConfig`] is an immutable value handed to each render call. It can
//! be stored as JSON; missing fields fall back to their defaults so a config
//! file only needs to list what it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::colour::Rgb;
use crate::error::{CellrasterError, Result};
use crate::image_proc::composite::SaturationPolicy;
use crate::layout::{Display, LegendOptions, ScaleBarOptions, TitleOptions};

/// Default ramp for cell features (viridis endpoints and midpoints).
pub const FEATURE_RAMP: [Rgb; 5] = [
    Rgb::new(68.0 / 255.0, 1.0 / 255.0, 84.0 / 255.0),
    Rgb::new(59.0 / 255.0, 82.0 / 255.0, 139.0 / 255.0),
    Rgb::new(33.0 / 255.0, 144.0 / 255.0, 140.0 / 255.0),
    Rgb::new(93.0 / 255.0, 200.0 / 255.0, 99.0 / 255.0),
    Rgb::new(253.0 / 255.0, 231.0 / 255.0, 37.0 / 255.0),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// Colour of mask background (label 0) when painting cells
    pub background_colour: Rgb,
    /// Colour of cells that have no record in the cell table
    pub missing_colour: Rgb,
    /// Colour of categories absent from a discrete colour map; without it
    /// such a category is a `MissingMapping` error
    pub discrete_default: Option<Rgb>,
    /// Colour of table cells when no `colour_by` is given
    pub foreground_colour: Rgb,
    /// Outline colour when no `outline_by` column is given
    pub outline_colour: Rgb,
    /// Colour of the canvas around tiles and behind the legend
    pub canvas_colour: Rgb,
    /// Default ramp end colours of channels/features, in selection order
    pub channel_colours: Vec<Rgb>,
    pub feature_ramp: Vec<Rgb>,
    pub saturation: SaturationPolicy,
    /// Outline thickness in pixels
    pub thick: usize,
    /// Pixels between tiles and around the grid
    pub margin: usize,
    pub display: Display,
    pub scale_bar: Option<ScaleBarOptions>,
    pub image_title: Option<TitleOptions>,
    pub legend: Option<LegendOptions>,
    /// Load system fonts for titles and legend text
    pub load_system_fonts: bool,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            background_colour: Rgb::BLACK,
            missing_colour: Rgb::GRAY,
            discrete_default: None,
            foreground_colour: Rgb::WHITE,
            outline_colour: Rgb::WHITE,
            canvas_colour: Rgb::WHITE,
            channel_colours: vec![
                Rgb::RED,
                Rgb::GREEN,
                Rgb::BLUE,
                Rgb::CYAN,
                Rgb::MAGENTA,
                Rgb::YELLOW,
            ],
            feature_ramp: FEATURE_RAMP.to_vec(),
            saturation: SaturationPolicy::Clip,
            thick: 1,
            margin: 10,
            display: Display::All,
            scale_bar: Some(ScaleBarOptions::default()),
            image_title: Some(TitleOptions::default()),
            legend: Some(LegendOptions::default()),
            load_system_fonts: true,
        }
    }
}

impl PlotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.thick == 0 {
            return Err(CellrasterError::Schema(
                "outline thickness must be at least 1".to_string(),
            ));
        }
        if self.channel_colours.is_empty() {
            return Err(CellrasterError::Schema(
                "at least one default channel colour is required".to_string(),
            ));
        }
        if self.feature_ramp.len() < 2 {
            return Err(CellrasterError::Schema(
                "the feature ramp needs at least two colours".to_string(),
            ));
        }
        Ok(())
    }

    /// Default ramp of the `index`-th selected channel: black to its colour.
    pub fn channel_ramp(&self, index: usize) -> Vec<Rgb> {
        let colour = self
            .channel_colours
            .get(index % self.channel_colours.len().max(1))
            .copied()
            .unwrap_or(Rgb::WHITE);
        vec![Rgb::BLACK, colour]
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: PlotConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plot.json");

        let config = PlotConfig {
            thick: 3,
            missing_colour: Rgb::RED,
            display: Display::Single,
            scale_bar: None,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = PlotConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PlotConfig =
            serde_json::from_str(r##"{"missing_colour": "#00ff00", "saturation": "renormalize"}"##)
                .unwrap();
        assert_eq!(config.missing_colour, Rgb::GREEN);
        assert_eq!(config.saturation, SaturationPolicy::Renormalize);
        assert_eq!(config.thick, 1);
        assert_eq!(config.channel_colours.len(), 6);
        assert_eq!(config.discrete_default, None);
    }

    #[test]
    fn test_zero_thickness_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        std::fs::write(&path, r#"{"thick": 0}"#).unwrap();
        let err = PlotConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, CellrasterError::Schema(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = PlotConfig::load_from_file(Path::new("/nonexistent/plot.json")).unwrap_err();
        assert!(matches!(err, CellrasterError::Io(_)));
    }

    #[test]
    fn test_channel_ramp_wraps() {
        let config = PlotConfig::default();
        assert_eq!(config.channel_ramp(1), vec![Rgb::BLACK, Rgb::GREEN]);
        assert_eq!(config.channel_ramp(6), vec![Rgb::BLACK, Rgb::RED]);
    }
}
