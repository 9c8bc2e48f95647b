use std::cell::Cell;
use std::rc::Rc;

use mathdown::element::SpanKind;
use mathdown::fragment::{COPY_PLACEHOLDER, FragmentData, FragmentKind, Point, Rect};
use mathdown::{
    AppendOutcome, Argb, BlockKind, Config, Element, FixedMetrics, LatexRenderer, MarkdownView,
    MathRequest, NoMath, Painter, RenderHandle, Span, SvgPainter,
};

/// Sizes math from its source length; counts calls and live handles.
#[derive(Debug, Clone, Default)]
struct StubRenderer {
    calls: Rc<Cell<usize>>,
    live: Rc<Cell<usize>>,
}

#[derive(Debug)]
struct StubHandle {
    width: f64,
    height: f64,
    live: Rc<Cell<usize>>,
}

impl RenderHandle for StubHandle {
    fn width(&self) -> f64 {
        self.width
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn depth(&self) -> f64 {
        self.height / 4.0
    }

    fn draw(&self, painter: &mut dyn Painter, x: f64, y: f64) {
        painter.draw_svg(
            "<svg xmlns=\"http://www.w3.org/2000/svg\"/>",
            Rect::new(x, y, self.width, self.height),
        );
    }

    fn set_foreground(&mut self, _color: Argb) {}
}

impl Drop for StubHandle {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

impl LatexRenderer for StubRenderer {
    fn render(&mut self, request: &MathRequest<'_>) -> Option<Box<dyn RenderHandle>> {
        self.calls.set(self.calls.get() + 1);
        if request.source.contains("\\broken") {
            return None;
        }
        self.live.set(self.live.get() + 1);
        Some(Box::new(StubHandle {
            width: request.source.len() as f64 * request.font_size as f64 * 0.5,
            height: request.font_size as f64,
            live: self.live.clone(),
        }))
    }
}

fn config() -> Config {
    let mut config = Config::compiled_default();
    config.font.size = 10;
    config
}

fn view(renderer: &StubRenderer) -> MarkdownView {
    MarkdownView::new(
        config(),
        Box::new(renderer.clone()),
        Box::new(FixedMetrics::default()),
    )
}

const DOCUMENT: &str = r"# Notes

Euler wrote $e^{i\pi} + 1 = 0$ in *one* **line**.

$$\int_0^1 x\,dx$$

1. first
2. second
   - nested

> quoted text

```python
print(1)
```

| name | value |
|------|-------|
| a    | $1$   |

---

See [docs](https://example.com).
";

#[test]
fn end_to_end_tree_shape() {
    let renderer = StubRenderer::default();
    let mut view = view(&renderer);
    view.set_text("# Title\n\nHello $x^2$ world.").unwrap();

    let doc = view.document().unwrap();
    assert_eq!(doc.kind, BlockKind::Document);
    let blocks: Vec<_> = doc.blocks().collect();
    assert_eq!(blocks.len(), 2);
    assert!(matches!(blocks[0].kind, BlockKind::Heading(ref h) if h.level == 1));
    assert_eq!(blocks[1].kind, BlockKind::Paragraph);

    let spans: Vec<SpanKind> = blocks[1].spans().map(Span::kind).collect();
    assert_eq!(spans, vec![SpanKind::Normal, SpanKind::Latex, SpanKind::Normal]);
    let Some(Element::Span(Span::Normal(hello))) = blocks[1].children.first() else {
        panic!("paragraph does not start with text");
    };
    assert_eq!(hello.text, "Hello ");
}

#[test]
fn full_document_lays_out_forward() {
    let renderer = StubRenderer::default();
    let mut view = view(&renderer);
    view.set_text(DOCUMENT).unwrap();

    let list = view.display_list();
    assert!(!list.is_empty());
    let mut last_y = f64::MIN;
    // Inline math sits on the text baseline, so only text and decoration
    // are checked for order.
    for fragment in list.iter().filter(|f| f.kind() != FragmentKind::Latex) {
        assert!(fragment.bounds.x >= 0.0, "{fragment}");
        assert!(fragment.bounds.y >= last_y, "{fragment} went back");
        last_y = fragment.bounds.y;
    }
    assert!(view.height() >= last_y);

    let kinds: Vec<FragmentKind> = list.iter().map(|f| f.kind()).collect();
    for kind in [
        FragmentKind::Text,
        FragmentKind::Line,
        FragmentKind::RoundedRect,
        FragmentKind::Latex,
    ] {
        assert!(kinds.contains(&kind), "no {kind} fragment");
    }
    // Every render made while parsing ended up owned by the display list.
    assert_eq!(list.render_handle_count(), 3);
    assert_eq!(renderer.live.get(), 3);
    assert_eq!(renderer.calls.get(), 3);
}

#[test]
fn replacing_the_document_releases_renders() {
    let renderer = StubRenderer::default();
    let mut view = view(&renderer);
    view.set_text(DOCUMENT).unwrap();
    view.set_text("no math here").unwrap();
    assert_eq!(renderer.live.get(), 0);
}

#[test]
fn relayout_is_deterministic() {
    let renderer = StubRenderer::default();
    let mut view = view(&renderer);
    view.set_text(DOCUMENT).unwrap();
    let snapshot = |view: &MarkdownView| -> Vec<(FragmentKind, Rect)> {
        view.display_list()
            .iter()
            .map(|f| (f.kind(), f.bounds))
            .collect()
    };
    let first = snapshot(&view);
    view.on_resize(400.0);
    view.on_resize(800.0);
    assert_eq!(first, snapshot(&view));
}

#[test]
fn streaming_word_by_word_matches_set_text() {
    let renderer = StubRenderer::default();
    let mut streamed = view(&renderer);
    let mut deferred = 0;
    for chunk in DOCUMENT.split_inclusive(' ') {
        if streamed.append_text(chunk).unwrap() == AppendOutcome::Deferred {
            deferred += 1;
        }
    }
    assert!(deferred > 0);

    let mut whole = view(&StubRenderer::default());
    whole.set_text(DOCUMENT).unwrap();

    let texts = |view: &MarkdownView| -> Vec<String> {
        view.display_list()
            .iter()
            .filter_map(|f| f.text().map(str::to_string))
            .collect()
    };
    assert_eq!(texts(&streamed), texts(&whole));
}

#[test]
fn failed_math_keeps_its_source() {
    let renderer = StubRenderer::default();
    let mut view = view(&renderer);
    view.set_text("before $\\broken$ after").unwrap();
    let index = view
        .display_list()
        .iter()
        .position(|f| f.kind() == FragmentKind::Latex)
        .unwrap();
    let math = view.display_list().get(index).unwrap();
    assert!(math.bounds.is_empty());
    let FragmentData::Latex(data) = &math.data else {
        panic!("expected math");
    };
    assert!(data.render.is_none());
    assert_eq!(data.source, "\\broken");
}

#[test]
fn copy_follows_selection() {
    let renderer = StubRenderer::default();
    let mut view = view(&renderer);
    view.set_text("word $y$\n\n---").unwrap();

    let word = view.display_list().fragments()[0].bounds;
    view.select_at(Point::new(word.x + 1.0, word.y + 1.0));
    assert_eq!(view.copy_selection(), "word");

    let math = view.display_list().fragments()[1].bounds;
    view.select_at(Point::new(math.x + 1.0, math.y + 1.0));
    assert_eq!(view.copy_selection(), "y");
    let highlighted = view
        .display_list()
        .iter()
        .filter(|f| f.highlighted)
        .count();
    assert_eq!(highlighted, 1);

    // Rules are never selected; the miss leaves the selection alone.
    let rule = view.display_list().fragments()[2].bounds;
    assert_eq!(view.select_at(Point::new(rule.x + 10.0, rule.y)), None);
    assert_eq!(view.copy_selection(), "y");

    view.clear_selection();
    assert_eq!(view.copy_selection(), COPY_PLACEHOLDER);
}

#[test]
fn svg_output_contains_text_and_math() {
    let renderer = StubRenderer::default();
    let mut view = view(&renderer);
    view.set_text("Hello $x$ & a < b").unwrap();
    view.select_at(Point::new(6.0, 6.0));

    let mut painter = SvgPainter::new(800.0, view.height(), "Arial", "Monaco");
    view.paint(&mut painter);
    let svg = painter.finish();
    assert!(svg.starts_with("<svg"));
    assert!(svg.contains("Hello"));
    assert!(svg.contains("&amp;"));
    assert!(svg.contains(">&lt;<"));
    assert!(svg.contains("<svg xmlns=\"http://www.w3.org/2000/svg\"/>"));
    assert!(svg.trim_end().ends_with("</svg>"));
}

#[test]
fn without_a_renderer_math_degrades_to_gaps() {
    let mut view = MarkdownView::new(
        config(),
        Box::new(NoMath),
        Box::new(FixedMetrics::default()),
    );
    view.set_text("a $b$ c").unwrap();
    let list = view.display_list();
    assert_eq!(list.len(), 3);
    assert_eq!(list.render_handle_count(), 0);
    assert_eq!(list.fragments()[1].text(), Some("b"));
}
