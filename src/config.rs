use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::Rgb;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::glyph::{SelectionMode, SelectorTuning, DEFAULT_CHARSET};

/// Grid and footprint settings selectable by name.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Preset {
    pub columns: u32,
    pub rows: u32,
    #[serde(default = "default_cell_width")]
    pub cell_width: u32,
    #[serde(default = "default_cell_height")]
    pub cell_height: u32,
}

fn default_cell_width() -> u32 {
    10
}

fn default_cell_height() -> u32 {
    20
}

fn default_charset() -> String {
    DEFAULT_CHARSET.to_string()
}

fn default_background() -> String {
    "#000000".to_string()
}

fn default_font_color() -> String {
    "#ffffff".to_string()
}

/// Application configuration with presets, character set and colors.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub presets: HashMap<String, Preset>,
    pub default_preset: String,
    #[serde(default = "default_charset")]
    pub charset: String,
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default = "default_font_color")]
    pub font_color: String,
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default)]
    pub mode: SelectionMode,
    #[serde(default)]
    pub tuning: SelectorTuning,
}

impl Default for AppConfig {
    fn default() -> Self {
        let default_json = r##"{
            "presets": {
                "default": {"columns": 160, "rows": 90},
                "small":   {"columns": 80,  "rows": 45},
                "large":   {"columns": 320, "rows": 180, "cell_width": 6, "cell_height": 12}
            },
            "default_preset": "default",
            "charset": " .:-=+*#%@",
            "background": "#000000",
            "font_color": "#ffffff"
        }"##;
        serde_json::from_str(default_json).expect("built-in config is valid JSON")
    }
}

impl AppConfig {
    /// Parses a config file; `.toml` files are read as TOML, anything else
    /// as JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let cfg: AppConfig = if is_toml {
            toml::from_str(&text).with_context(|| format!("parsing config toml {}", path.display()))?
        } else {
            serde_json::from_str(&text).with_context(|| format!("parsing config json {}", path.display()))?
        };
        if !cfg.presets.contains_key(&cfg.default_preset) {
            return Err(anyhow!(
                "Config file {} names default preset '{}' but does not define it",
                path.display(),
                cfg.default_preset
            ));
        }
        Ok(cfg)
    }

    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    /// Conversion options from a named preset and this config's colors.
    pub fn options_for(&self, preset_name: &str) -> Result<ConversionOptions> {
        let preset = self
            .preset(preset_name)
            .ok_or_else(|| anyhow!("Preset '{}' not found", preset_name))?;
        Ok(ConversionOptions::from_preset(preset)
            .with_charset(self.charset.clone())
            .with_background(parse_color(&self.background)?)
            .with_font_color(parse_color(&self.font_color)?)
            .with_font_path(self.font_path.clone())
            .with_mode(self.mode)
            .with_tuning(self.tuning))
    }
}

/// Controls which files are written for each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Only the rendered image
    #[default]
    ImageOnly,
    /// Image plus a `.txt` file with the glyph grid
    ImageAndText,
    /// Image plus a `.cframe` file (glyphs and colors, binary)
    ImageAndColorFrame,
}

/// Options for glyph conversion
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    /// Requested glyph columns
    pub columns: u32,
    /// Requested glyph rows
    pub rows: u32,
    /// Glyph ramp
    pub charset: String,
    /// Re-derive the grid from the source aspect ratio
    pub preserve_aspect_ratio: bool,
    pub background: Rgb<u8>,
    /// Tint used when color sampling is off
    pub font_color: Rgb<u8>,
    /// Tint glyphs with their cell's averaged color
    pub color_sampling: bool,
    pub mode: SelectionMode,
    pub tuning: SelectorTuning,
    /// Pixel footprint of one glyph
    pub cell_width: u32,
    pub cell_height: u32,
    pub embolden: bool,
    /// Font to render with; a system font is searched when unset
    pub font_path: Option<PathBuf>,
    pub output_mode: OutputMode,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            columns: 160,
            rows: 90,
            charset: default_charset(),
            preserve_aspect_ratio: false,
            background: Rgb([0, 0, 0]),
            font_color: Rgb([255, 255, 255]),
            color_sampling: true,
            mode: SelectionMode::default(),
            tuning: SelectorTuning::default(),
            cell_width: default_cell_width(),
            cell_height: default_cell_height(),
            embolden: false,
            font_path: None,
            output_mode: OutputMode::default(),
        }
    }
}

impl ConversionOptions {
    pub fn with_grid(mut self, columns: u32, rows: u32) -> Self {
        self.columns = columns;
        self.rows = rows;
        self
    }

    pub fn with_charset(mut self, charset: String) -> Self {
        self.charset = charset;
        self
    }

    pub fn with_preserve_aspect_ratio(mut self, preserve: bool) -> Self {
        self.preserve_aspect_ratio = preserve;
        self
    }

    pub fn with_background(mut self, color: Rgb<u8>) -> Self {
        self.background = color;
        self
    }

    pub fn with_font_color(mut self, color: Rgb<u8>) -> Self {
        self.font_color = color;
        self
    }

    pub fn with_color_sampling(mut self, enabled: bool) -> Self {
        self.color_sampling = enabled;
        self
    }

    pub fn with_mode(mut self, mode: SelectionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_tuning(mut self, tuning: SelectorTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_cell_size(mut self, width: u32, height: u32) -> Self {
        self.cell_width = width;
        self.cell_height = height;
        self
    }

    pub fn with_embolden(mut self, embolden: bool) -> Self {
        self.embolden = embolden;
        self
    }

    pub fn with_font_path(mut self, path: Option<PathBuf>) -> Self {
        self.font_path = path;
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    /// Create options from a preset
    pub fn from_preset(preset: &Preset) -> Self {
        Self::default()
            .with_grid(preset.columns, preset.rows)
            .with_cell_size(preset.cell_width, preset.cell_height)
    }
}

/// Parses `#rrggbb` (leading `#` optional).
pub fn parse_color(s: &str) -> Result<Rgb<u8>, ConfigError> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(ConfigError::InvalidColor(s.to_string()));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ConfigError::InvalidColor(s.to_string()))
    };
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}
