use std::fmt::{self, Write as _};

use serde::Deserialize;

use crate::fragment::{ColorRole, CornerRadii, DisplayList, FragmentData, Point, Rect};
use crate::metrics::{Font, FontFamily};

/// Colour packed as `0xAARRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct Argb(pub u32);

impl Argb {
    pub const BLACK: Argb = Argb(0xFF00_0000);
    pub const WHITE: Argb = Argb(0xFFFF_FFFF);

    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Argb(0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }

    pub fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn blue(self) -> u8 {
        self.0 as u8
    }

    /// Parse `#rrggbb` or `#aarrggbb`
    pub fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        let value = u32::from_str_radix(hex, 16).ok()?;
        match hex.len() {
            6 => Some(Argb(0xFF00_0000 | value)),
            8 => Some(Argb(value)),
            _ => None,
        }
    }

    /// `#rrggbb`, alpha dropped
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.red(), self.green(), self.blue())
    }
}

impl TryFrom<String> for Argb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Argb::parse_hex(&value).ok_or_else(|| format!("invalid colour {value:?}"))
    }
}

impl fmt::Display for Argb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Concrete colours for each [`ColorRole`]
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub text: Argb,
    pub window: Argb,
    pub window_text: Argb,
    pub base: Argb,
    pub mid: Argb,
    pub highlight: Argb,
    pub highlighted_text: Argb,
    pub link: Argb,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            text: Argb::BLACK,
            window: Argb::WHITE,
            window_text: Argb::BLACK,
            base: Argb::from_rgb(0xf0, 0xf0, 0xf0),
            mid: Argb::from_rgb(0xa0, 0xa0, 0xa0),
            highlight: Argb::from_rgb(0x30, 0x8c, 0xc6),
            highlighted_text: Argb::WHITE,
            link: Argb::from_rgb(0x1a, 0x4f, 0x8b),
        }
    }
}

impl Palette {
    pub fn color(&self, role: ColorRole) -> Argb {
        match role {
            ColorRole::Text => self.text,
            ColorRole::Window => self.window,
            ColorRole::WindowText => self.window_text,
            ColorRole::Base => self.base,
            ColorRole::Mid => self.mid,
            ColorRole::Highlight => self.highlight,
            ColorRole::HighlightedText => self.highlighted_text,
            ColorRole::Link => self.link,
        }
    }
}

/// Drawing primitives a host surface provides
pub trait Painter {
    fn fill_rect(&mut self, rect: Rect, color: Argb);

    fn stroke_line(&mut self, from: Point, to: Point, width: f64, color: Argb);

    fn fill_rounded_rect(&mut self, rect: Rect, radii: CornerRadii, fill: Argb, stroke: Argb);

    /// Draw `text` inside `rect`, top-aligned
    fn draw_text(&mut self, rect: Rect, text: &str, font: &Font, color: Argb);

    fn push_clip(&mut self, rect: Rect);

    fn pop_clip(&mut self);

    /// Blit a vector image into `rect`
    fn draw_svg(&mut self, svg: &str, rect: Rect);
}

/// Corner radii limited to half the rectangle's shorter side
pub fn clamp_radii(rect: Rect, radii: CornerRadii) -> CornerRadii {
    let limit = (rect.width / 2.0).min(rect.height / 2.0).max(0.0);
    CornerRadii {
        top_left: radii.top_left.min(limit),
        top_right: radii.top_right.min(limit),
        bottom_left: radii.bottom_left.min(limit),
        bottom_right: radii.bottom_right.min(limit),
    }
}

/// Paint every fragment of `list` in order. Highlighted fragments get a
/// highlight underlay and are drawn in the highlighted-text colour.
pub fn paint(list: &DisplayList, palette: &Palette, painter: &mut dyn Painter) {
    for fragment in list {
        let bounds = fragment.bounds;
        if fragment.highlighted {
            painter.fill_rect(bounds, palette.highlight);
        }
        let ink = |role: ColorRole| {
            if fragment.highlighted {
                palette.highlighted_text
            } else {
                palette.color(role)
            }
        };
        match &fragment.data {
            FragmentData::Latex(data) => {
                if let Some(render) = &data.render {
                    render.draw(painter, bounds.x, bounds.y);
                }
            }
            FragmentData::Line(data) => {
                painter.stroke_line(
                    Point::new(bounds.x, bounds.y),
                    data.to,
                    data.stroke_width,
                    palette.mid,
                );
            }
            FragmentData::RoundedRect(data) => {
                painter.fill_rounded_rect(
                    data.rect,
                    clamp_radii(data.rect, data.radii),
                    palette.color(data.background),
                    palette.color(data.stroke),
                );
            }
            FragmentData::Text(data) => {
                painter.draw_text(bounds, &data.text, &data.font, ink(data.color));
            }
            FragmentData::ClippedText(data) => {
                painter.push_clip(data.clip);
                painter.draw_text(bounds, &data.text, &data.font, ink(ColorRole::Text));
                painter.pop_clip();
            }
        }
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Paints into a standalone SVG document
#[derive(Debug)]
pub struct SvgPainter {
    width: f64,
    height: f64,
    sans: String,
    mono: String,
    body: String,
    clip_ids: usize,
}

impl SvgPainter {
    pub fn new(width: f64, height: f64, sans: &str, mono: &str) -> Self {
        Self {
            width,
            height,
            sans: sans.to_string(),
            mono: mono.to_string(),
            body: String::new(),
            clip_ids: 0,
        }
    }

    /// Fill the whole canvas; call before painting the list
    pub fn background(&mut self, color: Argb) {
        self.fill_rect(Rect::new(0.0, 0.0, self.width, self.height), color);
    }

    pub fn finish(self) -> String {
        format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n{body}</svg>\n",
            w = self.width.ceil(),
            h = self.height.ceil(),
            body = self.body
        )
    }
}

impl Painter for SvgPainter {
    fn fill_rect(&mut self, rect: Rect, color: Argb) {
        let _ = writeln!(
            self.body,
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"{}\"/>",
            rect.x, rect.y, rect.width, rect.height, color
        );
    }

    fn stroke_line(&mut self, from: Point, to: Point, width: f64, color: Argb) {
        let _ = writeln!(
            self.body,
            "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{}\" stroke-width=\"{}\"/>",
            from.x, from.y, to.x, to.y, color, width
        );
    }

    fn fill_rounded_rect(&mut self, rect: Rect, radii: CornerRadii, fill: Argb, stroke: Argb) {
        let Rect {
            x,
            y,
            width: w,
            height: h,
        } = rect;
        let CornerRadii {
            top_left: tl,
            top_right: tr,
            bottom_left: bl,
            bottom_right: br,
        } = radii;
        let mut d = format!("M{:.2},{:.2} H{:.2}", x + tl, y, x + w - tr);
        if tr > 0.0 {
            let _ = write!(d, " A{tr},{tr} 0 0 1 {:.2},{:.2}", x + w, y + tr);
        }
        let _ = write!(d, " V{:.2}", y + h - br);
        if br > 0.0 {
            let _ = write!(d, " A{br},{br} 0 0 1 {:.2},{:.2}", x + w - br, y + h);
        }
        let _ = write!(d, " H{:.2}", x + bl);
        if bl > 0.0 {
            let _ = write!(d, " A{bl},{bl} 0 0 1 {:.2},{:.2}", x, y + h - bl);
        }
        let _ = write!(d, " V{:.2}", y + tl);
        if tl > 0.0 {
            let _ = write!(d, " A{tl},{tl} 0 0 1 {:.2},{:.2}", x + tl, y);
        }
        let _ = writeln!(
            self.body,
            "<path d=\"{d} Z\" fill=\"{fill}\" stroke=\"{stroke}\"/>"
        );
    }

    fn draw_text(&mut self, rect: Rect, text: &str, font: &Font, color: Argb) {
        let family = match font.family {
            FontFamily::Sans => &self.sans,
            FontFamily::Mono => &self.mono,
        };
        let mut decoration = Vec::new();
        if font.underline {
            decoration.push("underline");
        }
        if font.strikeout {
            decoration.push("line-through");
        }
        let _ = writeln!(
            self.body,
            "<text x=\"{:.2}\" y=\"{:.2}\" dominant-baseline=\"hanging\" font-family=\"{}\" font-size=\"{}\" font-weight=\"{}\" font-style=\"{}\" text-decoration=\"{}\" fill=\"{}\" xml:space=\"preserve\">{}</text>",
            rect.x,
            rect.y,
            escape_xml(family),
            font.size,
            if font.bold { "bold" } else { "normal" },
            if font.italic { "italic" } else { "normal" },
            if decoration.is_empty() {
                "none".to_string()
            } else {
                decoration.join(" ")
            },
            color,
            escape_xml(text)
        );
    }

    fn push_clip(&mut self, rect: Rect) {
        self.clip_ids += 1;
        let _ = writeln!(
            self.body,
            "<clipPath id=\"clip{id}\"><rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\"/></clipPath><g clip-path=\"url(#clip{id})\">",
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            id = self.clip_ids
        );
    }

    fn pop_clip(&mut self) {
        self.body.push_str("</g>\n");
    }

    fn draw_svg(&mut self, svg: &str, rect: Rect) {
        let _ = writeln!(
            self.body,
            "<g transform=\"translate({:.2},{:.2})\">{}</g>",
            rect.x, rect.y, svg
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{Fragment, LineData, TextData};

    #[test]
    fn hex_colours_round_trip() {
        assert_eq!(Argb::parse_hex("#1a4f8b"), Some(Argb(0xFF1A_4F8B)));
        assert_eq!(Argb::parse_hex("#801a4f8b").map(Argb::alpha), Some(0x80));
        assert_eq!(Argb::parse_hex("1a4f8b"), None);
        assert_eq!(Argb::parse_hex("#12345"), None);
        assert_eq!(Argb::from_rgb(0x1a, 0x4f, 0x8b).to_hex(), "#1a4f8b");
    }

    #[test]
    fn radii_are_clamped_to_half_the_short_side() {
        let r = clamp_radii(Rect::new(0.0, 0.0, 100.0, 8.0), CornerRadii::uniform(10.0));
        assert_eq!(r, CornerRadii::uniform(4.0));
    }

    #[test]
    fn highlighted_text_gets_underlay_first() {
        let mut list = DisplayList::new();
        list.push(Fragment::new(
            Rect::new(0.0, 0.0, 100.0, 0.0),
            FragmentData::Line(LineData {
                to: Point::new(100.0, 0.0),
                stroke_width: 1.0,
            }),
        ));
        list.push(Fragment::new(
            Rect::new(1.0, 2.0, 30.0, 10.0),
            FragmentData::Text(TextData {
                text: "a<b".to_string(),
                font: Font::sans(10).underline(),
                color: ColorRole::Text,
            }),
        ));
        list.select(1);

        let palette = Palette::default();
        let mut painter = SvgPainter::new(100.0, 20.0, "Arial", "Monaco");
        paint(&list, &palette, &mut painter);
        let svg = painter.finish();

        let underlay = svg.find(&format!("fill=\"{}\"", palette.highlight)).unwrap();
        let glyphs = svg.find("a&lt;b").unwrap();
        assert!(underlay < glyphs);
        assert!(svg.contains("<line "));
        assert!(svg.contains("text-decoration=\"underline\""));
        assert!(svg.contains(&format!("fill=\"{}\"", palette.highlighted_text)));
    }
}
