use typst_as_lib::TypstEngine;
use typst_as_lib::typst_kit_options::TypstKitFontOptions;
use typst_library::layout::{Frame, FrameItem, PagedDocument, Point};

use crate::fragment::Rect;
use crate::math::{LatexRenderer, MathRequest, RenderHandle};
use crate::paint::{Argb, Painter};

/// Helpers the converted math may call that Typst does not define
const PRELUDE: &str = "#let mitexsqrt(..args) = {\n  \
    let a = args.pos()\n  \
    if a.len() == 1 { math.sqrt(a.at(0)) } else { math.root(a.at(0), a.at(1)) }\n\
    }\n";

fn typst_color(color: Argb) -> String {
    format!(
        "rgb({}, {}, {}, {})",
        color.red(),
        color.green(),
        color.blue(),
        color.alpha()
    )
}

/// Typst document holding nothing but one equation
pub fn page_source(math: &str, inline: bool, font_size: u32, foreground: Argb) -> String {
    let equation = if inline {
        format!("${math}$")
    } else {
        format!("$ {math} $")
    };
    let mut out = String::new();
    out.push_str("#set page(width: auto, height: auto, margin: 0pt, fill: none)\n");
    out.push_str(&format!(
        "#set text(size: {font_size}pt, fill: {})\n",
        typst_color(foreground)
    ));
    out.push_str(PRELUDE);
    out.push_str(&equation);
    out.push('\n');
    out
}

fn compile(source: String) -> Option<PagedDocument> {
    let font_options = TypstKitFontOptions::new()
        .include_embedded_fonts(true)
        .include_system_fonts(false);

    let engine = TypstEngine::builder()
        .main_file(source)
        .search_fonts_with(font_options)
        .build();

    let result: Result<PagedDocument, _> = engine.compile().output;
    match result {
        Ok(doc) => Some(doc),
        Err(err) => {
            tracing::warn!(error = ?err, "typst compilation failed");
            None
        }
    }
}

/// Size and baseline offset of every text run in `frame`, recursing into
/// groups.
fn text_runs(frame: &Frame, offset: Point, out: &mut Vec<(f64, f64)>) {
    for (pos, item) in frame.items() {
        let pos = offset + *pos;
        match item {
            FrameItem::Group(group) => text_runs(&group.frame, pos, out),
            FrameItem::Text(text) => out.push((text.size.to_pt(), pos.y.to_pt())),
            _ => {}
        }
    }
}

/// Baseline of the equation. Scripts and fraction parts are set smaller
/// than the main line, so it is the average position of the largest runs.
fn estimate_baseline(frame: &Frame) -> Option<f64> {
    let mut runs = Vec::new();
    text_runs(frame, Point::zero(), &mut runs);
    let largest = runs.iter().map(|&(size, _)| size).fold(0.0, f64::max);
    let baselines: Vec<f64> = runs
        .iter()
        .filter(|&&(size, _)| size >= largest - 0.01)
        .map(|&(_, y)| y)
        .collect();
    if baselines.is_empty() {
        return None;
    }
    Some(baselines.iter().sum::<f64>() / baselines.len() as f64)
}

/// A compiled equation
#[derive(Debug)]
pub struct TypstMath {
    /// Converted Typst math, kept for recolouring
    math: String,
    inline: bool,
    font_size: u32,
    svg: String,
    width: f64,
    height: f64,
    depth: f64,
}

impl TypstMath {
    pub fn compile(math: String, inline: bool, font_size: u32, foreground: Argb) -> Option<Self> {
        let doc = compile(page_source(&math, inline, font_size, foreground))?;
        let page = doc.pages.first()?;
        let size = page.frame.size();
        let (width, height) = (size.x.to_pt(), size.y.to_pt());
        let baseline = estimate_baseline(&page.frame).unwrap_or(height);
        Some(Self {
            svg: typst_svg::svg(page),
            math,
            inline,
            font_size,
            width,
            height,
            depth: (height - baseline).clamp(0.0, height),
        })
    }

    pub fn svg(&self) -> &str {
        &self.svg
    }
}

impl RenderHandle for TypstMath {
    fn width(&self) -> f64 {
        self.width
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn depth(&self) -> f64 {
        self.depth
    }

    fn draw(&self, painter: &mut dyn Painter, x: f64, y: f64) {
        painter.draw_svg(&self.svg, Rect::new(x, y, self.width, self.height));
    }

    fn set_foreground(&mut self, color: Argb) {
        // The colour is baked into the SVG, so compile again.
        let source = page_source(&self.math, self.inline, self.font_size, color);
        if let Some(page) = compile(source).as_ref().and_then(|doc| doc.pages.first()) {
            self.svg = typst_svg::svg(page);
        }
    }
}

/// [`LatexRenderer`] backed by Typst
#[derive(Debug, Default, Clone, Copy)]
pub struct TypstRenderer;

impl LatexRenderer for TypstRenderer {
    fn render(&mut self, request: &MathRequest<'_>) -> Option<Box<dyn RenderHandle>> {
        let math = match mitex::convert_math(request.source, None) {
            Ok(math) => math,
            Err(err) => {
                tracing::warn!(source = request.source, %err, "latex conversion failed");
                return None;
            }
        };
        let render = TypstMath::compile(
            math,
            request.inline,
            request.font_size,
            request.foreground,
        )?;
        tracing::trace!(
            source = request.source,
            width = render.width,
            height = render.height,
            "typeset math"
        );
        Some(Box::new(render))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_and_display_delimiters() {
        let inline = page_source("x^2", true, 12, Argb::BLACK);
        assert!(inline.contains("\n$x^2$\n"));
        assert!(inline.contains("#set text(size: 12pt, fill: rgb(0, 0, 0, 255))"));
        assert!(inline.starts_with("#set page(width: auto, height: auto, margin: 0pt"));

        let display = page_source("x^2", false, 18, Argb::from_rgb(0x30, 0x8c, 0xc6));
        assert!(display.contains("\n$ x^2 $\n"));
        assert!(display.contains("rgb(48, 140, 198, 255)"));
    }

    #[test]
    fn converts_latex_commands() {
        let math = mitex::convert_math("\\alpha + \\beta", None).unwrap();
        assert!(math.contains("alpha"));
        assert!(math.contains("beta"));
    }

    #[test]
    fn renders_inline_math() {
        let mut renderer = TypstRenderer;
        let render = renderer
            .render(&MathRequest {
                source: "x^2",
                inline: true,
                font_size: 12,
                foreground: Argb::BLACK,
            })
            .unwrap();
        assert!(render.width() > 0.0);
        assert!(render.height() > 0.0);
        assert!(render.depth() >= 0.0 && render.depth() <= render.height());
    }
}
