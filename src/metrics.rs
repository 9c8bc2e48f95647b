/// Generic family of a font; the concrete face name comes from the config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontFamily {
    Sans,
    Mono,
}

/// Font descriptor carried by text fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Font {
    pub family: FontFamily,
    /// Pixel size
    pub size: u32,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikeout: bool,
}

impl Font {
    pub fn sans(size: u32) -> Self {
        Self {
            family: FontFamily::Sans,
            size,
            bold: false,
            italic: false,
            underline: false,
            strikeout: false,
        }
    }

    pub fn mono(size: u32) -> Self {
        Self {
            family: FontFamily::Mono,
            ..Self::sans(size)
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub fn underline(mut self) -> Self {
        self.underline = true;
        self
    }

    pub fn strikeout(mut self) -> Self {
        self.strikeout = true;
        self
    }

    /// Font for a heading of the given level: `max(8, base + (6 - level) * 4)`, bold
    pub fn heading(base_size: u32, level: u8) -> Self {
        let level = level.clamp(1, 6) as i64;
        let size = (base_size as i64 + (6 - level) * 4).max(8);
        Self::sans(size as u32).bold()
    }
}

/// Vertical metrics of a font, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    pub ascent: f64,
    pub descent: f64,
    /// Baseline-to-baseline distance
    pub line_spacing: f64,
}

impl FontMetrics {
    /// Ascent plus descent
    pub fn height(&self) -> f64 {
        self.ascent + self.descent
    }
}

pub trait TextMeasure {
    fn metrics(&self, font: &Font) -> FontMetrics;

    fn advance(&self, font: &Font, text: &str) -> f64;
}

/// Metrics derived from the font size alone.
///
/// Every character advances by a fixed fraction of the size, so results only
/// depend on character counts. Used when no real font backend is attached
/// (CLI, tests).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedMetrics {
    pub sans_advance: f64,
    pub mono_advance: f64,
    pub bold_factor: f64,
    pub ascent: f64,
    pub descent: f64,
    pub leading: f64,
}

impl Default for FixedMetrics {
    fn default() -> Self {
        Self {
            sans_advance: 0.5,
            mono_advance: 0.6,
            bold_factor: 1.1,
            ascent: 0.8,
            descent: 0.2,
            leading: 0.2,
        }
    }
}

impl TextMeasure for FixedMetrics {
    fn metrics(&self, font: &Font) -> FontMetrics {
        let size = font.size as f64;
        FontMetrics {
            ascent: size * self.ascent,
            descent: size * self.descent,
            line_spacing: size * (self.ascent + self.descent + self.leading),
        }
    }

    fn advance(&self, font: &Font, text: &str) -> f64 {
        let per_char = match font.family {
            FontFamily::Sans => self.sans_advance,
            FontFamily::Mono => self.mono_advance,
        };
        let weight = if font.bold { self.bold_factor } else { 1.0 };
        text.chars().count() as f64 * font.size as f64 * per_char * weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_sizes_follow_level() {
        assert_eq!(Font::heading(12, 1).size, 32);
        assert_eq!(Font::heading(12, 6).size, 12);
        assert!(Font::heading(12, 3).bold);
        // Never below 8px, even for tiny base sizes.
        assert_eq!(Font::heading(2, 6).size, 8);
    }

    #[test]
    fn fixed_metrics_are_deterministic() {
        let m = FixedMetrics::default();
        let font = Font::sans(10);
        assert_eq!(m.advance(&font, "abcd"), 20.0);
        assert_eq!(m.advance(&font, "abcd"), m.advance(&font, "abcd"));
        assert!(m.advance(&font.bold(), "abcd") > m.advance(&font, "abcd"));
        assert_eq!(m.advance(&Font::mono(10), "ab"), 12.0);
        let metrics = m.metrics(&font);
        assert_eq!(metrics.height(), 10.0);
        assert_eq!(metrics.line_spacing, 12.0);
    }
}
