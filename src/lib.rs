pub mod config;
pub mod element;
pub mod error;
pub mod fragment;
pub mod layout;
pub mod math;
pub mod metrics;
pub mod paint;
pub mod parser;
#[cfg(feature = "typst")]
pub mod typst;
pub mod view;

pub use config::Config;
pub use element::{Block, BlockId, BlockKind, BlockType, Element, Span, SpanKind};
pub use error::{ConfigError, Error, ParseError, Result};
pub use fragment::{
    COPY_PLACEHOLDER, ColorRole, DisplayList, Fragment, FragmentData, FragmentKind, Point, Rect,
};
pub use layout::LayoutEngine;
pub use math::{LatexRenderer, MathRequest, NoMath, RenderHandle};
pub use metrics::{FixedMetrics, Font, FontFamily, FontMetrics, TextMeasure};
pub use paint::{Argb, Painter, Palette, SvgPainter};
pub use parser::{ParseOptions, has_incomplete_latex_at_end, parse};
#[cfg(feature = "typst")]
pub use typst::TypstRenderer;
pub use view::{AppendOutcome, MarkdownView};

/// Parse and lay out `markdown` in one go.
pub fn render(
    markdown: &str,
    config: &Config,
    width: f64,
    measure: &dyn TextMeasure,
    renderer: &mut dyn LatexRenderer,
) -> Result<(Block, DisplayList)> {
    let options = ParseOptions {
        font_size: config.font.size,
        foreground: config.palette.text,
    };
    let mut document = parse(markdown, &options, renderer)?;
    let list = LayoutEngine::new(config.layout, measure, renderer)
        .with_foreground(config.palette.text)
        .layout(&mut document, width, config.font.size);
    Ok((document, list))
}

/// The math renderer compiled into this build.
pub fn default_renderer() -> Box<dyn LatexRenderer> {
    #[cfg(feature = "typst")]
    {
        Box::new(TypstRenderer)
    }
    #[cfg(not(feature = "typst"))]
    {
        Box::new(NoMath)
    }
}
