use std::collections::HashSet;
use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, LinkType, Options, Parser, Tag, TagEnd};

use crate::element::{
    Block, BlockKind, BlockType, CodeBlockInfo, Element, HeadingInfo, ImageInfo, LatexInfo,
    LinkInfo, ListInfo, ListItemInfo, Span, SpanKind, TextInfo,
};
use crate::error::ParseError;
use crate::math::{LatexRenderer, MathRequest};
use crate::paint::Argb;

const LINK_PLACEHOLDER: &str = "Error parsing link";

/// Inline constructs reported by the tokenizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanType {
    Emphasis,
    Strong,
    Code,
    Strikethrough,
    Underline,
    Link,
    Image,
    WikiLink,
    InlineMath,
    DisplayMath,
}

/// Extra data for span openings that carry any
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SpanDetail {
    #[default]
    None,
    Link {
        url: String,
        title: String,
    },
    Image {
        url: String,
        title: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Normal,
    Code,
    /// Hard line break
    Break,
    SoftBreak,
    Html,
    Latex,
}

/// Receiver for tokenizer callbacks. Returning an error aborts the walk
pub trait MarkdownSink {
    fn enter_block(&mut self, kind: BlockKind) -> Result<(), ParseError>;

    fn leave_block(&mut self, kind: BlockType) -> Result<(), ParseError>;

    fn enter_span(&mut self, kind: SpanType, detail: SpanDetail) -> Result<(), ParseError>;

    fn leave_span(&mut self, kind: SpanType) -> Result<(), ParseError>;

    fn text(&mut self, kind: TextKind, text: &str) -> Result<(), ParseError>;
}

/// Settings a parse bakes into the tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseOptions {
    /// Base font size math is typeset at
    pub font_size: u32,
    pub foreground: Argb,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            font_size: 12,
            foreground: Argb::BLACK,
        }
    }
}

/// Parse `markdown` into a `Document` block. Math spans are typeset through
/// `renderer` as they are closed.
pub fn parse(
    markdown: &str,
    options: &ParseOptions,
    renderer: &mut dyn LatexRenderer,
) -> Result<Block, ParseError> {
    let mut builder = DocumentBuilder::new(renderer, options);
    if let Err(err) = drive(markdown, &mut builder) {
        tracing::warn!(%err, "markdown parse failed, partial tree dropped");
        return Err(err);
    }
    let document = builder.finish()?;
    tracing::debug!(blocks = document.block_count(), "parsed markdown");
    Ok(document)
}

fn tokenizer_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_MATH);
    options.insert(Options::ENABLE_WIKILINKS);
    options
}

#[derive(Default)]
struct DriveState {
    in_table_head: bool,
    table_body_open: bool,
    // Link ends carry no type, so remember what each opening was.
    links: Vec<SpanType>,
}

/// Walk `source` with the tokenizer, feeding `sink`. The whole walk is
/// bracketed by a `Document` block.
pub fn drive(source: &str, sink: &mut dyn MarkdownSink) -> Result<(), ParseError> {
    let mut state = DriveState::default();
    sink.enter_block(BlockKind::Document)?;

    let mut events = 0;
    let parser = Parser::new_ext(source, tokenizer_options()).into_offset_iter();
    for (index, (event, range)) in parser.enumerate() {
        events = index + 1;
        process_event(source, event, range, &mut state, sink).map_err(|e| e.at(index))?;
    }

    sink.leave_block(BlockType::Document)
        .map_err(|e| e.at(events))
}

fn process_event(
    source: &str,
    event: Event<'_>,
    range: Range<usize>,
    state: &mut DriveState,
    sink: &mut dyn MarkdownSink,
) -> Result<(), ParseError> {
    match event {
        Event::Start(tag) => start_tag(source, tag, range, state, sink),
        Event::End(tag) => end_tag(tag, state, sink),

        Event::Text(text) => sink.text(TextKind::Normal, &text),
        Event::Code(code) => leaf_span(sink, SpanType::Code, TextKind::Code, &code),
        Event::InlineMath(math) => leaf_span(sink, SpanType::InlineMath, TextKind::Latex, &math),
        Event::DisplayMath(math) => {
            leaf_span(sink, SpanType::DisplayMath, TextKind::Latex, &math)
        }
        Event::Html(html) | Event::InlineHtml(html) => sink.text(TextKind::Html, &html),

        Event::SoftBreak => sink.text(TextKind::SoftBreak, "\n"),
        Event::HardBreak => sink.text(TextKind::Break, "\n"),

        Event::Rule => {
            sink.enter_block(BlockKind::HorizontalRule)?;
            sink.leave_block(BlockType::HorizontalRule)
        }

        // Footnote references, task markers
        _ => Ok(()),
    }
}

fn leaf_span(
    sink: &mut dyn MarkdownSink,
    span: SpanType,
    kind: TextKind,
    text: &str,
) -> Result<(), ParseError> {
    sink.enter_span(span, SpanDetail::None)?;
    sink.text(kind, text)?;
    sink.leave_span(span)
}

fn start_tag(
    source: &str,
    tag: Tag<'_>,
    range: Range<usize>,
    state: &mut DriveState,
    sink: &mut dyn MarkdownSink,
) -> Result<(), ParseError> {
    match tag {
        Tag::Paragraph => sink.enter_block(BlockKind::Paragraph),
        Tag::Heading { level, .. } => sink.enter_block(BlockKind::Heading(HeadingInfo {
            level: heading_level_to_u8(level),
        })),
        Tag::BlockQuote(_) => sink.enter_block(BlockKind::Quote),
        Tag::CodeBlock(kind) => {
            let language = match kind {
                CodeBlockKind::Fenced(info) => info
                    .split_whitespace()
                    .next()
                    .map(str::to_string),
                CodeBlockKind::Indented => None,
            };
            sink.enter_block(BlockKind::CodeBlock(CodeBlockInfo { language }))
        }
        Tag::HtmlBlock => sink.enter_block(BlockKind::HtmlBlock),

        Tag::List(Some(start)) => sink.enter_block(BlockKind::OrderedList(ListInfo {
            ordered: true,
            mark: list_mark(source, range, true),
            start,
        })),
        Tag::List(None) => sink.enter_block(BlockKind::UnorderedList(ListInfo {
            ordered: false,
            mark: list_mark(source, range, false),
            start: 1,
        })),
        // Numbered by the builder from the enclosing list.
        Tag::Item => sink.enter_block(BlockKind::ListItem(ListItemInfo {
            index: 0,
            ordered: false,
            mark: '-',
        })),

        Tag::Table(_) => {
            state.table_body_open = false;
            sink.enter_block(BlockKind::Table)
        }
        Tag::TableHead => {
            state.in_table_head = true;
            sink.enter_block(BlockKind::TableHead)?;
            sink.enter_block(BlockKind::TableRow)
        }
        Tag::TableRow => {
            if !state.table_body_open {
                state.table_body_open = true;
                sink.enter_block(BlockKind::TableBody)?;
            }
            sink.enter_block(BlockKind::TableRow)
        }
        Tag::TableCell => {
            if state.in_table_head {
                sink.enter_block(BlockKind::TableHeader)
            } else {
                sink.enter_block(BlockKind::TableCell)
            }
        }

        Tag::Emphasis => sink.enter_span(SpanType::Emphasis, SpanDetail::None),
        Tag::Strong => sink.enter_span(SpanType::Strong, SpanDetail::None),
        Tag::Strikethrough => sink.enter_span(SpanType::Strikethrough, SpanDetail::None),
        Tag::Link {
            link_type: LinkType::WikiLink { .. },
            ..
        } => {
            state.links.push(SpanType::WikiLink);
            sink.enter_span(SpanType::WikiLink, SpanDetail::None)
        }
        Tag::Link {
            dest_url, title, ..
        } => {
            state.links.push(SpanType::Link);
            sink.enter_span(
                SpanType::Link,
                SpanDetail::Link {
                    url: dest_url.into_string(),
                    title: title.into_string(),
                },
            )
        }
        Tag::Image {
            dest_url, title, ..
        } => sink.enter_span(
            SpanType::Image,
            SpanDetail::Image {
                url: dest_url.into_string(),
                title: title.into_string(),
            },
        ),

        // Footnotes, metadata and other extensions are not enabled or not
        // modelled; their ends are skipped the same way.
        _ => Ok(()),
    }
}

fn end_tag(
    tag: TagEnd,
    state: &mut DriveState,
    sink: &mut dyn MarkdownSink,
) -> Result<(), ParseError> {
    match tag {
        TagEnd::Paragraph => sink.leave_block(BlockType::Paragraph),
        TagEnd::Heading(_) => sink.leave_block(BlockType::Heading),
        TagEnd::BlockQuote(_) => sink.leave_block(BlockType::Quote),
        TagEnd::CodeBlock => sink.leave_block(BlockType::CodeBlock),
        TagEnd::HtmlBlock => sink.leave_block(BlockType::HtmlBlock),
        TagEnd::List(true) => sink.leave_block(BlockType::OrderedList),
        TagEnd::List(false) => sink.leave_block(BlockType::UnorderedList),
        TagEnd::Item => sink.leave_block(BlockType::ListItem),

        TagEnd::Table => {
            if std::mem::take(&mut state.table_body_open) {
                sink.leave_block(BlockType::TableBody)?;
            }
            sink.leave_block(BlockType::Table)
        }
        TagEnd::TableHead => {
            state.in_table_head = false;
            sink.leave_block(BlockType::TableRow)?;
            sink.leave_block(BlockType::TableHead)
        }
        TagEnd::TableRow => sink.leave_block(BlockType::TableRow),
        TagEnd::TableCell => {
            if state.in_table_head {
                sink.leave_block(BlockType::TableHeader)
            } else {
                sink.leave_block(BlockType::TableCell)
            }
        }

        TagEnd::Emphasis => sink.leave_span(SpanType::Emphasis),
        TagEnd::Strong => sink.leave_span(SpanType::Strong),
        TagEnd::Strikethrough => sink.leave_span(SpanType::Strikethrough),
        TagEnd::Link => {
            let kind = state.links.pop().unwrap_or(SpanType::Link);
            sink.leave_span(kind)
        }
        TagEnd::Image => sink.leave_span(SpanType::Image),

        _ => Ok(()),
    }
}

fn heading_level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Bullet (`-*+`) or ordered delimiter (`.` / `)`) of the list starting at
/// `range`. The tokenizer does not report either.
fn list_mark(source: &str, range: Range<usize>, ordered: bool) -> char {
    let text = source.get(range).unwrap_or_default().trim_start();
    if ordered {
        text.chars()
            .find(|c| !c.is_ascii_digit())
            .filter(|c| matches!(c, '.' | ')'))
            .unwrap_or('.')
    } else {
        text.chars()
            .next()
            .filter(|c| matches!(c, '-' | '*' | '+'))
            .unwrap_or('-')
    }
}

/// Whether `text` ends inside an unterminated math expression: an odd
/// number of unescaped `$` delimiters outside code and raw HTML
pub fn has_incomplete_latex_at_end(text: &str) -> bool {
    let verbatim: Vec<Range<usize>> = Parser::new_ext(text, tokenizer_options())
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Code(_)
            | Event::Html(_)
            | Event::InlineHtml(_)
            | Event::Start(Tag::CodeBlock(_) | Tag::HtmlBlock) => Some(range),
            _ => None,
        })
        .collect();

    let mut dollars = 0usize;
    let mut escaped = false;
    for (at, ch) in text.char_indices() {
        if verbatim.iter().any(|r| r.contains(&at)) {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => {
                escaped = !escaped;
                continue;
            }
            '$' if !escaped => dollars += 1,
            _ => {}
        }
        escaped = false;
    }
    dollars % 2 == 1
}

/// An open inline construct
#[derive(Debug)]
struct OpenSpan {
    /// Child index of the span node in the current block. `None` while the
    /// construct's content is being swallowed (wiki-links, image alt text).
    target: Option<usize>,
    /// Style that text for this construct is written with
    kind: SpanKind,
    /// Leave events still expected. Two when `***` collapsed into one
    /// `ItalicBold` node.
    pending: Vec<SpanType>,
    written: bool,
}

/// Builds the document tree from sink callbacks
pub struct DocumentBuilder<'r> {
    renderer: &'r mut dyn LatexRenderer,
    font_size: u32,
    foreground: Argb,
    blocks: Vec<Block>,
    spans: Vec<OpenSpan>,
    root: Option<Block>,
    unsupported: HashSet<&'static str>,
}

impl<'r> DocumentBuilder<'r> {
    pub fn new(renderer: &'r mut dyn LatexRenderer, options: &ParseOptions) -> Self {
        Self {
            renderer,
            font_size: options.font_size,
            foreground: options.foreground,
            blocks: Vec::new(),
            spans: Vec::new(),
            root: None,
            unsupported: HashSet::new(),
        }
    }

    /// The finished document. Fails if the walk left anything open
    pub fn finish(self) -> Result<Block, ParseError> {
        if !self.blocks.is_empty() || !self.spans.is_empty() {
            return Err(ParseError::new(format!(
                "{} blocks and {} spans left open",
                self.blocks.len(),
                self.spans.len()
            )));
        }
        self.root
            .ok_or_else(|| ParseError::new("no document was produced"))
    }

    fn note_unsupported(&mut self, what: &'static str) {
        if self.unsupported.insert(what) {
            tracing::info!("{what} is not supported, skipping");
        }
    }

    fn current(&mut self) -> Result<&mut Block, ParseError> {
        self.blocks
            .last_mut()
            .ok_or_else(|| ParseError::new("no open block"))
    }

    fn write_text(&mut self, kind: TextKind, text: &str) -> Result<(), ParseError> {
        let block = self
            .blocks
            .last_mut()
            .ok_or_else(|| ParseError::new("text outside any block"))?;

        let Some(top) = self.spans.last_mut() else {
            if matches!(block.kind, BlockKind::CodeBlock(_)) {
                push_code_lines(block, text);
            } else if kind == TextKind::Code {
                block
                    .children
                    .push(Element::Span(Span::Code(TextInfo::new(text))));
            } else {
                append_normal(block, text);
            }
            return Ok(());
        };

        let Some(index) = top.target else {
            return Ok(());
        };
        let in_place = match block.children.get(index) {
            Some(Element::Span(Span::Hyperlink(_) | Span::Image(_) | Span::Latex(_))) => true,
            Some(Element::Span(span)) => index + 1 == block.children.len() && span.kind() == top.kind,
            _ => false,
        };
        if !in_place {
            // A nested construct closed in between: continue in a fresh
            // node so document order is kept.
            block.children.push(Element::Span(Span::empty(top.kind)));
            top.target = Some(block.children.len() - 1);
        }
        let first_write = !std::mem::replace(&mut top.written, true);

        match top.target.and_then(|i| block.children.get_mut(i)) {
            Some(Element::Span(Span::Hyperlink(link))) => {
                if first_write {
                    link.title.clear();
                }
                link.title.push_str(text);
            }
            Some(Element::Span(Span::Image(image))) => {
                if first_write {
                    image.title.clear();
                }
                image.title.push_str(text);
            }
            Some(Element::Span(Span::Latex(latex))) => latex.source.push_str(text),
            Some(Element::Span(span)) => {
                if let Some(info) = span.text_info_mut() {
                    info.text.push_str(text);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn render_latex(&mut self, index: usize) -> Result<(), ParseError> {
        let block = self
            .blocks
            .last_mut()
            .ok_or_else(|| ParseError::new("math outside any block"))?;
        let Some(Element::Span(Span::Latex(latex))) = block.children.get_mut(index) else {
            return Err(ParseError::new("math span went missing"));
        };
        latex.render = self.renderer.render(&MathRequest {
            source: &latex.source,
            inline: latex.inline,
            font_size: self.font_size,
            foreground: self.foreground,
        });
        latex.failed = latex.render.is_none();
        if latex.failed {
            tracing::warn!(source = %latex.source, "failed to typeset math");
        }
        Ok(())
    }
}

/// Append to the trailing plain run, or start a new one
fn append_normal(block: &mut Block, text: &str) {
    if let Some(Element::Span(Span::Normal(info))) = block.children.last_mut() {
        info.text.push_str(text);
    } else {
        block
            .children
            .push(Element::Span(Span::Normal(TextInfo::new(text))));
    }
}

/// Code block text becomes one plain run per line with `LineBreak` leaves
/// between them.
fn push_code_lines(block: &mut Block, text: &str) {
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            block.children.push(Element::Span(Span::LineBreak));
        }
        if !line.is_empty() {
            append_normal(block, line);
        }
    }
}

/// Style of a new emphasis-like span opened inside `outer`
fn styled_kind(kind: SpanType, outer: Option<SpanKind>) -> SpanKind {
    match (kind, outer) {
        (SpanType::Emphasis, Some(SpanKind::Bold | SpanKind::ItalicBold))
        | (SpanType::Strong, Some(SpanKind::Italic | SpanKind::ItalicBold)) => SpanKind::ItalicBold,
        (SpanType::Emphasis, _) => SpanKind::Italic,
        (SpanType::Strong, _) => SpanKind::Bold,
        (SpanType::Code, _) => SpanKind::Code,
        (SpanType::Strikethrough, _) => SpanKind::Strikethrough,
        (SpanType::Underline, _) => SpanKind::Underline,
        _ => SpanKind::Normal,
    }
}

impl MarkdownSink for DocumentBuilder<'_> {
    fn enter_block(&mut self, kind: BlockKind) -> Result<(), ParseError> {
        if !self.spans.is_empty() {
            return Err(ParseError::new("block opened inside an inline span"));
        }
        let kind = match kind {
            BlockKind::Document => {
                if !self.blocks.is_empty() || self.root.is_some() {
                    return Err(ParseError::new("document opened twice"));
                }
                BlockKind::Document
            }
            BlockKind::ListItem(_) => {
                let parent = self.current()?;
                let (ordered, start, mark) = match &parent.kind {
                    BlockKind::OrderedList(info) | BlockKind::UnorderedList(info) => {
                        (info.ordered, info.start, info.mark)
                    }
                    _ => return Err(ParseError::new("list item outside a list")),
                };
                let position = parent
                    .blocks()
                    .filter(|b| matches!(b.kind, BlockKind::ListItem(_)))
                    .count() as u64;
                BlockKind::ListItem(ListItemInfo {
                    index: start + position,
                    ordered,
                    mark,
                })
            }
            BlockKind::HtmlBlock => {
                self.current()?;
                self.note_unsupported("raw HTML");
                BlockKind::HtmlBlock
            }
            other => {
                self.current()?;
                other
            }
        };
        self.blocks.push(Block::new(kind));
        Ok(())
    }

    fn leave_block(&mut self, kind: BlockType) -> Result<(), ParseError> {
        if !self.spans.is_empty() {
            return Err(ParseError::new("block closed with inline spans open"));
        }
        let mut block = self
            .blocks
            .pop()
            .ok_or_else(|| ParseError::new(format!("end of {kind:?} with no open block")))?;
        let open = block.kind.block_type();
        if open != kind {
            return Err(ParseError::new(format!(
                "end of {kind:?} while {open:?} is open"
            )));
        }

        if kind == BlockType::CodeBlock
            && matches!(block.children.last(), Some(Element::Span(Span::LineBreak)))
        {
            // The tokenizer always terminates the last line.
            block.children.pop();
        }

        match self.blocks.last_mut() {
            Some(parent) => parent.children.push(Element::Block(block)),
            None if kind == BlockType::Document => self.root = Some(block),
            None => return Err(ParseError::new(format!("{kind:?} closed outside document"))),
        }
        Ok(())
    }

    fn enter_span(&mut self, kind: SpanType, detail: SpanDetail) -> Result<(), ParseError> {
        let outer = self.spans.last().map(|s| (s.target, s.kind, s.pending.len()));

        // Anything inside a swallowed construct or an image is swallowed too.
        if matches!(outer, Some((None, ..)) | Some((_, SpanKind::Image, _))) {
            self.spans.push(OpenSpan {
                target: None,
                kind: SpanKind::Normal,
                pending: vec![kind],
                written: false,
            });
            return Ok(());
        }

        // Styled text inside a link only adds to its title.
        if let Some((Some(index), SpanKind::Hyperlink, _)) = outer {
            let fresh = self.spans.last().is_some_and(|s| !s.written);
            if fresh {
                if let Some(Element::Span(Span::Hyperlink(link))) =
                    self.current()?.children.get_mut(index)
                {
                    link.title.clear();
                }
            }
            if let Some(top) = self.spans.last_mut() {
                top.written = true;
            }
            self.spans.push(OpenSpan {
                target: Some(index),
                kind: SpanKind::Hyperlink,
                pending: vec![kind],
                written: true,
            });
            return Ok(());
        }

        let span = match kind {
            SpanType::WikiLink => {
                self.note_unsupported("wiki-link");
                self.spans.push(OpenSpan {
                    target: None,
                    kind: SpanKind::Normal,
                    pending: vec![kind],
                    written: false,
                });
                return Ok(());
            }
            SpanType::Image => {
                self.note_unsupported("image");
                let (url, title) = match detail {
                    SpanDetail::Image { url, title } | SpanDetail::Link { url, title } => {
                        (url, title)
                    }
                    SpanDetail::None => (String::new(), String::new()),
                };
                Span::Image(ImageInfo { url, title })
            }
            SpanType::Link => {
                let (url, title) = match detail {
                    SpanDetail::Link { url, title } | SpanDetail::Image { url, title } => {
                        (url, title)
                    }
                    SpanDetail::None => {
                        (LINK_PLACEHOLDER.to_string(), LINK_PLACEHOLDER.to_string())
                    }
                };
                Span::Hyperlink(LinkInfo { url, title })
            }
            SpanType::InlineMath | SpanType::DisplayMath => Span::Latex(LatexInfo {
                render: None,
                source: String::new(),
                inline: kind == SpanType::InlineMath,
                failed: false,
            }),
            SpanType::Strong => {
                if let Some((Some(index), SpanKind::Italic, 1)) = outer {
                    let block = self.current()?;
                    let collapse = index + 1 == block.children.len()
                        && matches!(
                            block.children.get(index),
                            Some(Element::Span(Span::Italic(info))) if info.text.is_empty()
                        );
                    if collapse {
                        // `***text***`: one node, two styles.
                        if let Some(Element::Span(italic)) = block.children.get_mut(index) {
                            italic.retag(SpanKind::ItalicBold);
                        }
                        if let Some(top) = self.spans.last_mut() {
                            top.kind = SpanKind::ItalicBold;
                            top.pending.push(kind);
                        }
                        return Ok(());
                    }
                }
                Span::empty(styled_kind(kind, outer.map(|o| o.1)))
            }
            SpanType::Emphasis | SpanType::Code | SpanType::Strikethrough | SpanType::Underline => {
                Span::empty(styled_kind(kind, outer.map(|o| o.1)))
            }
        };

        let span_kind = span.kind();
        let block = self.current()?;
        block.children.push(Element::Span(span));
        let target = Some(block.children.len() - 1);
        self.spans.push(OpenSpan {
            target,
            kind: span_kind,
            pending: vec![kind],
            written: false,
        });
        Ok(())
    }

    fn leave_span(&mut self, kind: SpanType) -> Result<(), ParseError> {
        let top = self
            .spans
            .last_mut()
            .ok_or_else(|| ParseError::new(format!("end of {kind:?} with no open span")))?;
        let position = top
            .pending
            .iter()
            .position(|p| *p == kind)
            .ok_or_else(|| ParseError::new(format!("end of {kind:?} does not match open span")))?;
        top.pending.remove(position);

        if let Some(rest) = top.pending.first() {
            // Half of a collapsed `***` closed; keep writing in the other style.
            top.kind = match rest {
                SpanType::Emphasis => SpanKind::Italic,
                SpanType::Strong => SpanKind::Bold,
                _ => top.kind,
            };
            return Ok(());
        }

        let closed = self.spans.pop();
        if let Some(OpenSpan {
            target: Some(index),
            kind: SpanKind::Latex,
            ..
        }) = closed
        {
            self.render_latex(index)?;
        }
        Ok(())
    }

    fn text(&mut self, kind: TextKind, text: &str) -> Result<(), ParseError> {
        match kind {
            TextKind::Normal | TextKind::Code => self.write_text(kind, text),
            // Soft breaks only separate words.
            TextKind::SoftBreak => self.write_text(TextKind::Normal, " "),
            TextKind::Break => {
                self.current()?
                    .children
                    .push(Element::Span(Span::LineBreak));
                Ok(())
            }
            TextKind::Html => {
                self.note_unsupported("raw HTML");
                Ok(())
            }
            TextKind::Latex => {
                let in_math = self.spans.last().is_some_and(|top| {
                    top.pending
                        .iter()
                        .any(|p| matches!(p, SpanType::InlineMath | SpanType::DisplayMath))
                });
                if !in_math {
                    return Err(ParseError::new("math text outside a math span"));
                }
                self.write_text(kind, text)
            }
        }
    }
}
