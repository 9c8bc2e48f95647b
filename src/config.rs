use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::paint::Palette;

const DEFAULT_CONFIG: &str = include_str!("default_config.toml");

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub font: FontConfig,
    pub layout: LayoutConfig,
    pub palette: Palette,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FontConfig {
    /// Base pixel size.
    pub size: u32,
    pub sans: String,
    pub mono: String,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            size: 12,
            sans: "Arial".to_string(),
            mono: "Monaco".to_string(),
        }
    }
}

/// Spacing constants for flow layout, in pixels.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    pub margin_left: f64,
    pub margin_top: f64,
    /// Extra gap after each paragraph.
    pub paragraph_spacing: f64,
    pub blockquote_indent: f64,
    /// Gap between a list marker and the item text.
    pub list_marker_gap: f64,
    /// Inner padding of a table cell.
    pub table_padding: f64,
    /// Horizontal space a table leaves free beside it.
    pub table_margin: f64,
    /// Horizontal inset of a code block from the text margins.
    pub code_inset: f64,
    pub code_header_padding: f64,
    pub code_padding: f64,
    pub corner_radius: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            margin_left: 5.0,
            margin_top: 5.0,
            paragraph_spacing: 0.0,
            blockquote_indent: 50.0,
            list_marker_gap: 2.0,
            table_padding: 5.0,
            table_margin: 10.0,
            code_inset: 15.0,
            code_header_padding: 4.0,
            code_padding: 10.0,
            corner_radius: 10.0,
        }
    }
}

impl Config {
    /// The defaults shipped in `default_config.toml`.
    pub fn compiled_default() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_default()
    }

    /// Load config from a TOML file, or return defaults if not found.
    pub fn load(path: &Path) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::debug!(%err, path = %path.display(), "using default config");
                Self::compiled_default()
            }
        }
    }

    /// Load config from a TOML file, failing on a missing or invalid file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paint::Argb;

    #[test]
    fn compiled_default_matches_default() {
        assert_eq!(Config::compiled_default(), Config::default());
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r##"
            [font]
            size = 16

            [palette]
            link = "#ff0000"
            "##,
        )
        .unwrap();
        assert_eq!(config.font.size, 16);
        assert_eq!(config.font.mono, "Monaco");
        assert_eq!(config.layout, LayoutConfig::default());
        assert_eq!(config.palette.link, Argb::from_rgb(0xff, 0, 0));
        assert_eq!(config.palette.text, Argb::BLACK);
    }

    #[test]
    fn bad_colour_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[palette]\ntext = \"red\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_falls_back() {
        let path = Path::new("/definitely/not/here/mathdown.toml");
        assert!(matches!(Config::from_file(path), Err(ConfigError::Io { .. })));
        assert_eq!(Config::load(path), Config::default());
    }
}
