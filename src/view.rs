use crate::config::Config;
use crate::element::Block;
use crate::error::ParseError;
use crate::fragment::{DisplayList, Point, Rect};
use crate::layout::LayoutEngine;
use crate::math::LatexRenderer;
use crate::metrics::TextMeasure;
use crate::paint::{self, Argb, Painter, Palette};
use crate::parser::{self, ParseOptions};

/// What [`MarkdownView::append_text`] did with the new text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The document was parsed and laid out again
    Rendered,
    /// The source ends inside a math expression; the previous layout stays
    Deferred,
}

pub struct MarkdownView {
    config: Config,
    renderer: Box<dyn LatexRenderer>,
    measure: Box<dyn TextMeasure>,
    source: String,
    document: Option<Block>,
    list: DisplayList,
    width: f64,
    font_size: u32,
    palette: Palette,
}

impl MarkdownView {
    pub const DEFAULT_WIDTH: f64 = 800.0;

    pub fn new(
        config: Config,
        renderer: Box<dyn LatexRenderer>,
        measure: Box<dyn TextMeasure>,
    ) -> Self {
        Self {
            font_size: config.font.size,
            palette: config.palette,
            config,
            renderer,
            measure,
            source: String::new(),
            document: None,
            list: DisplayList::new(),
            width: Self::DEFAULT_WIDTH,
        }
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = width;
        self
    }

    /// Replace the whole document.
    ///
    /// On a parse failure the previous tree and display list stay in place
    /// and the source is left unchanged.
    pub fn set_text(&mut self, text: &str) -> Result<(), ParseError> {
        let options = self.parse_options();
        let document = parse_document(text, &options, self.renderer.as_mut())?;
        self.source = text.to_string();
        self.install(document);
        Ok(())
    }

    /// Append streamed text. Reparsing waits while the source ends inside an
    /// unterminated `$` expression.
    ///
    /// The text is kept even when reparsing fails, so a later append can
    /// complete it; the previous layout is shown until then.
    pub fn append_text(&mut self, text: &str) -> Result<AppendOutcome, ParseError> {
        self.source.push_str(text);
        if parser::has_incomplete_latex_at_end(&self.source) {
            tracing::debug!(len = self.source.len(), "deferring reparse, math still open");
            return Ok(AppendOutcome::Deferred);
        }
        let document = self.reparse()?;
        self.install(document);
        Ok(AppendOutcome::Rendered)
    }

    /// Change the base font size. Math is typeset at a fixed size, so the
    /// document is parsed again.
    pub fn set_font_size(&mut self, size: u32) -> Result<(), ParseError> {
        if size == self.font_size {
            return Ok(());
        }
        if self.document.is_none() {
            self.font_size = size;
            return Ok(());
        }
        let options = ParseOptions {
            font_size: size,
            foreground: self.foreground(),
        };
        let document = parse_document(&self.source, &options, self.renderer.as_mut())?;
        self.font_size = size;
        self.install(document);
        Ok(())
    }

    /// Lay the current tree out again at `width`. No reparse
    pub fn on_resize(&mut self, width: f64) {
        if width == self.width {
            return;
        }
        self.width = width;
        self.relayout();
    }

    /// Switch palettes. Live math renders are recoloured in place and later
    /// renders use the new text colour.
    pub fn on_palette_change(&mut self, palette: Palette) {
        self.palette = palette;
        let foreground = palette.text;
        self.list.set_foreground(foreground);
        if let Some(document) = self.document.as_mut() {
            document.for_each_latex_mut(&mut |info| {
                if let Some(render) = info.render.as_mut() {
                    render.set_foreground(foreground);
                }
            });
        }
        tracing::debug!(%foreground, "palette changed");
    }

    /// Select the fragment under `point`. A miss keeps the current selection
    pub fn select_at(&mut self, point: Point) -> Option<usize> {
        self.list.select_at(point)
    }

    /// Drop the selection, returning the area to repaint
    pub fn clear_selection(&mut self) -> Option<Rect> {
        self.list.clear_selection()
    }

    pub fn copy_selection(&self) -> String {
        self.list.copy_selection()
    }

    /// Content height of the last layout pass
    pub fn height(&self) -> f64 {
        self.list.height()
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn document(&self) -> Option<&Block> {
        self.document.as_ref()
    }

    pub fn display_list(&self) -> &DisplayList {
        &self.list
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn paint(&self, painter: &mut dyn Painter) {
        paint::paint(&self.list, &self.palette, painter);
    }

    fn foreground(&self) -> Argb {
        self.palette.text
    }

    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            font_size: self.font_size,
            foreground: self.foreground(),
        }
    }

    fn reparse(&mut self) -> Result<Block, ParseError> {
        let options = self.parse_options();
        parse_document(&self.source, &options, self.renderer.as_mut())
    }

    fn install(&mut self, document: Block) {
        self.list = DisplayList::new();
        self.document = Some(document);
        self.relayout();
    }

    fn relayout(&mut self) {
        // Release the old renders before new ones are made.
        self.list = DisplayList::new();
        let foreground = self.foreground();
        let Some(document) = self.document.as_mut() else {
            return;
        };
        let mut engine = LayoutEngine::new(
            self.config.layout,
            self.measure.as_ref(),
            self.renderer.as_mut(),
        )
        .with_foreground(foreground);
        self.list = engine.layout(document, self.width, self.font_size);
    }
}

fn parse_document(
    source: &str,
    options: &ParseOptions,
    renderer: &mut dyn LatexRenderer,
) -> Result<Block, ParseError> {
    parser::parse(source, options, renderer).inspect_err(|err| {
        tracing::warn!(%err, "parse failed, keeping previous document");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{FragmentData, FragmentKind};
    use crate::math::testing::BoxRenderer;
    use crate::metrics::FixedMetrics;

    fn view(renderer: &BoxRenderer) -> MarkdownView {
        let mut config = Config::default();
        config.font.size = 10;
        MarkdownView::new(
            config,
            Box::new(renderer.clone()),
            Box::new(FixedMetrics::default()),
        )
    }

    #[test]
    fn set_text_lays_out() {
        let renderer = BoxRenderer::default();
        let mut view = view(&renderer);
        view.set_text("# Title\n\nHello $x^2$ world.").unwrap();
        assert_eq!(view.display_list().len(), 4);
        assert!(view.height() > 0.0);
        assert_eq!(view.document().unwrap().cached_render_count(), 0);
    }

    #[test]
    fn streaming_defers_until_math_closes() {
        let renderer = BoxRenderer::default();
        let mut view = view(&renderer);

        assert_eq!(view.append_text("Sum: ").unwrap(), AppendOutcome::Rendered);
        let before = view.display_list().len();

        assert_eq!(view.append_text("$\\alpha").unwrap(), AppendOutcome::Deferred);
        assert_eq!(renderer.calls.get(), 0);
        assert_eq!(view.display_list().len(), before);

        assert_eq!(view.append_text("+ \\beta$").unwrap(), AppendOutcome::Rendered);
        assert_eq!(renderer.calls.get(), 1);
        assert_eq!(*renderer.sources.borrow(), vec!["\\alpha+ \\beta".to_string()]);
        let math: Vec<_> = view
            .display_list()
            .iter()
            .filter(|f| f.kind() == FragmentKind::Latex)
            .collect();
        assert_eq!(math.len(), 1);
        assert_eq!(math[0].text(), Some("\\alpha+ \\beta"));
    }

    #[test]
    fn streaming_dollars_in_code_render() {
        let renderer = BoxRenderer::default();
        let mut view = view(&renderer);
        for chunk in ["Run `echo $HOME` ", "then ", "more ", "text."] {
            assert_eq!(view.append_text(chunk).unwrap(), AppendOutcome::Rendered);
        }
        assert_eq!(renderer.calls.get(), 0);
        let texts: Vec<&str> = view.display_list().iter().filter_map(|f| f.text()).collect();
        assert_eq!(texts, vec!["Run", "echo", "$HOME", "then", "more", "text."]);

        assert_eq!(
            view.append_text("\n\n```sh\n$ ls\n```\n").unwrap(),
            AppendOutcome::Rendered
        );
    }

    #[test]
    fn resize_relayouts_without_reparsing() {
        let renderer = BoxRenderer::default();
        let mut view = view(&renderer);
        view.set_text("one two three four five six seven eight nine ten")
            .unwrap();
        let wide = view.height();
        let source_before = view.source().to_string();

        view.on_resize(60.0);
        assert!(view.height() > wide);
        assert_eq!(view.source(), source_before);
        assert_eq!(view.width(), 60.0);
    }

    #[test]
    fn resize_disposes_old_renders() {
        let renderer = BoxRenderer::default();
        let mut view = view(&renderer);
        view.set_text("$a$ and $b$").unwrap();
        assert_eq!(renderer.live.get(), 2);
        view.on_resize(300.0);
        view.on_resize(500.0);
        assert_eq!(renderer.live.get(), 2);
        drop(view);
        assert_eq!(renderer.live.get(), 0);
    }

    #[test]
    fn font_size_change_reparses() {
        let renderer = BoxRenderer::default();
        let mut view = view(&renderer);
        view.set_text("$x$").unwrap();
        let small = view.display_list().fragments()[0].bounds;

        view.set_font_size(20).unwrap();
        let large = view.display_list().fragments()[0].bounds;
        assert_eq!(large.width, small.width * 2.0);
        assert_eq!(renderer.calls.get(), 2);

        view.set_font_size(20).unwrap();
        assert_eq!(renderer.calls.get(), 2);
        assert_eq!(view.font_size(), 20);
        assert_eq!(*renderer.sources.borrow(), vec!["x".to_string(); 2]);
    }

    #[test]
    fn font_size_before_any_text_is_stored() {
        let renderer = BoxRenderer::default();
        let mut view = view(&renderer);
        view.set_font_size(14).unwrap();
        assert_eq!(view.font_size(), 14);
        assert_eq!(renderer.calls.get(), 0);

        view.set_text("$x$").unwrap();
        let FragmentData::Latex(math) = &view.display_list().fragments()[0].data else {
            panic!("expected math");
        };
        assert_eq!(math.render.as_ref().unwrap().height(), 14.0);
    }

    #[test]
    fn palette_change_recolours_live_math() {
        let renderer = BoxRenderer::default();
        let mut view = view(&renderer);
        view.set_text("$a$ and $$b$$").unwrap();

        let mut palette = Palette::default();
        palette.text = Argb::WHITE;
        view.on_palette_change(palette);
        assert_eq!(renderer.recolored.get(), 2);
        assert_eq!(view.palette().text, Argb::WHITE);

        view.on_resize(300.0);
        let foregrounds = renderer.foregrounds.borrow();
        assert_eq!(foregrounds.last(), Some(&Argb::WHITE));
    }

    #[test]
    fn selection_and_copy() {
        let renderer = BoxRenderer::default();
        let mut view = view(&renderer);
        view.set_text("Hello $x^2$").unwrap();
        let math = view.display_list().fragments()[1].bounds;

        let hit = view.select_at(Point::new(math.x + 1.0, math.y + 1.0));
        assert_eq!(hit, Some(1));
        assert_eq!(view.copy_selection(), "x^2");

        assert_eq!(view.clear_selection(), Some(math));
        assert_eq!(view.copy_selection(), crate::fragment::COPY_PLACEHOLDER);
    }

    #[test]
    fn new_text_replaces_selection_and_renders() {
        let renderer = BoxRenderer::default();
        let mut view = view(&renderer);
        view.set_text("$a$").unwrap();
        view.select_at(Point::new(6.0, 6.0));
        view.set_text("plain").unwrap();
        assert!(view.display_list().selected().is_none());
        assert_eq!(renderer.live.get(), 0);
    }
}
