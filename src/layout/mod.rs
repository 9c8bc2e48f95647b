mod table;
mod wrap;

pub use wrap::{Cursor, Placement, WrappedLines, measure_wrapped_lines, words};

use crate::config::LayoutConfig;
use crate::element::{
    Block, BlockId, BlockKind, BlockType, CodeBlockInfo, Element, LatexInfo, Span,
};
use crate::fragment::{
    ClippedTextData, ColorRole, CornerRadii, DisplayList, Fragment, FragmentData, LatexData,
    LineData, Point, Rect, RoundedRectData, TextData,
};
use crate::math::{LatexRenderer, MathRequest, RenderHandle};
use crate::metrics::{Font, FontFamily, TextMeasure};
use crate::paint::Argb;

/// Inline style in effect for a run of spans
#[derive(Debug, Clone, Copy)]
struct Style {
    font: Font,
    /// Content box and owner of the enclosing table cell
    clip: Option<(Rect, BlockId)>,
}

/// Text a span contributes to the flow, with the font and colour it is set in
fn text_run(span: &Span, font: Font) -> Option<(&str, Font, ColorRole)> {
    let (info, font) = match span {
        Span::Normal(info) => (info, font),
        Span::Italic(info) => (info, font.italic()),
        Span::Bold(info) => (info, font.bold()),
        Span::ItalicBold(info) => (info, font.bold().italic()),
        Span::Code(info) => (
            info,
            Font {
                family: FontFamily::Mono,
                ..font
            },
        ),
        Span::Strikethrough(info) => (info, font.strikeout()),
        Span::Underline(info) => (info, font.underline()),
        // The visible text of a link is its URL.
        Span::Hyperlink(link) => {
            return Some((link.url.as_str(), font.underline(), ColorRole::Link));
        }
        Span::Image(_) | Span::LineBreak | Span::Latex(_) => return None,
    };
    Some((info.text.as_str(), font, ColorRole::Text))
}

pub struct LayoutEngine<'a> {
    config: LayoutConfig,
    measure: &'a dyn TextMeasure,
    renderer: &'a mut dyn LatexRenderer,
    foreground: Argb,
    base: Font,
    list: DisplayList,
    next_id: u32,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(
        config: LayoutConfig,
        measure: &'a dyn TextMeasure,
        renderer: &'a mut dyn LatexRenderer,
    ) -> Self {
        Self {
            config,
            measure,
            renderer,
            foreground: Argb::BLACK,
            base: Font::sans(12),
            list: DisplayList::new(),
            next_id: 0,
        }
    }

    /// Colour math is typeset in when it has to be rendered again
    pub fn with_foreground(mut self, foreground: Argb) -> Self {
        self.foreground = foreground;
        self
    }

    /// Lay `root` out into `available_width` pixels. Render handles cached in
    /// the tree move into the returned list; math without one is typeset
    /// again.
    pub fn layout(
        &mut self,
        root: &mut Block,
        available_width: f64,
        base_font_size: u32,
    ) -> DisplayList {
        self.base = Font::sans(base_font_size);
        self.list = DisplayList::new();
        self.next_id = 0;

        let metrics = self.measure.metrics(&self.base);
        let left = self.config.margin_left;
        let right = (available_width - self.config.margin_left).max(left);
        let mut cursor = Cursor::new(
            left,
            right,
            self.config.margin_top + metrics.ascent,
            metrics.line_spacing,
        );
        let style = Style {
            font: self.base,
            clip: None,
        };
        self.layout_block(root, &mut cursor, style);

        let mut list = std::mem::take(&mut self.list);
        let bottom = list
            .iter()
            .map(|f| f.bounds.bottom())
            .fold(cursor.y - metrics.ascent, f64::max);
        list.set_height(bottom + self.config.margin_top);
        tracing::debug!(
            fragments = list.len(),
            height = list.height(),
            width = available_width,
            "layout pass"
        );
        list
    }

    fn next_block_id(&mut self) -> BlockId {
        let id = BlockId(self.next_id);
        self.next_id += 1;
        id
    }

    fn layout_block(&mut self, block: &mut Block, cursor: &mut Cursor, style: Style) {
        let id = self.next_block_id();
        match block.kind.block_type() {
            BlockType::Paragraph => {
                self.layout_children(block, cursor, style);
                cursor.new_line();
                cursor.y += self.config.paragraph_spacing;
            }
            BlockType::Heading => self.layout_heading(block, cursor, style),
            BlockType::UnorderedList | BlockType::OrderedList => {
                cursor.finish_line();
                self.layout_children(block, cursor, style);
            }
            BlockType::ListItem => self.layout_list_item(block, cursor, style),
            BlockType::Quote => self.layout_quote(block, cursor, style),
            BlockType::CodeBlock => self.layout_code_block(block, cursor, style),
            BlockType::HorizontalRule => self.layout_rule(cursor, style),
            BlockType::Table => self.layout_table(block, id, cursor, style),
            BlockType::HtmlBlock => {
                tracing::trace!(block = %id, "skipping raw HTML block");
            }
            BlockType::Document
            | BlockType::TableHead
            | BlockType::TableBody
            | BlockType::TableRow
            | BlockType::TableHeader
            | BlockType::TableCell => self.layout_children(block, cursor, style),
        }
    }

    fn layout_children(&mut self, block: &mut Block, cursor: &mut Cursor, style: Style) {
        for child in &mut block.children {
            match child {
                Element::Block(child) => self.layout_block(child, cursor, style),
                Element::Span(span) => self.layout_span(span, cursor, style),
            }
        }
    }

    fn layout_heading(&mut self, block: &mut Block, cursor: &mut Cursor, style: Style) {
        let level = match block.kind {
            BlockKind::Heading(info) => info.level,
            _ => 1,
        };
        let font = Font::heading(self.base.size, level);
        let heading = self.measure.metrics(&font);
        let body = self.measure.metrics(&style.font);

        cursor.finish_line();
        let saved_line_height = cursor.line_height;
        cursor.y += 0.8 * heading.line_spacing + (heading.ascent - body.ascent).max(0.0);
        cursor.line_height = heading.line_spacing;

        self.layout_children(block, cursor, Style { font, ..style });

        cursor.x = cursor.left;
        cursor.y += heading.descent + 0.8 * heading.line_spacing + body.ascent;
        cursor.line_height = saved_line_height;
    }

    fn layout_list_item(&mut self, block: &mut Block, cursor: &mut Cursor, style: Style) {
        let BlockKind::ListItem(info) = block.kind else {
            return self.layout_children(block, cursor, style);
        };
        cursor.finish_line();

        let marker = if info.ordered {
            format!("{}{} ", info.index, info.mark)
        } else {
            "• ".to_string()
        };
        let metrics = self.measure.metrics(&style.font);
        let width = self.measure.advance(&style.font, &marker);
        self.push_text(
            Rect::new(
                cursor.left,
                cursor.y - metrics.ascent,
                width,
                metrics.height(),
            ),
            marker,
            style.font,
            ColorRole::Text,
        );

        let saved_left = cursor.left;
        cursor.set_left(saved_left + width + self.config.list_marker_gap);
        self.layout_children(block, cursor, style);

        // A nested list already ended on a fresh line.
        let ends_with_list =
            matches!(block.children.last(), Some(Element::Block(b)) if b.kind.is_list());
        if !ends_with_list {
            let advance = if cursor.at_line_start() { 0.1 } else { 1.1 };
            cursor.y += cursor.line_height * advance;
        }
        cursor.set_left(saved_left);
    }

    fn layout_quote(&mut self, block: &mut Block, cursor: &mut Cursor, style: Style) {
        cursor.finish_line();
        let ascent = self.measure.metrics(&style.font).ascent;
        let start = self.list.len();
        let top = cursor.y - ascent;
        let saved_left = cursor.left;
        let rule_x = saved_left + self.config.blockquote_indent / 2.0;

        cursor.set_left(saved_left + self.config.blockquote_indent);
        self.layout_children(block, cursor, style);
        cursor.finish_line();

        let bottom = (cursor.y - ascent).max(top);
        // The rule goes before the quote's content so paint and document
        // order agree.
        self.list.insert(
            start,
            Fragment::new(
                Rect::new(rule_x, top, 0.0, bottom - top),
                FragmentData::Line(LineData {
                    to: Point::new(rule_x, bottom),
                    stroke_width: 2.0,
                }),
            ),
        );
        cursor.set_left(saved_left);
    }

    fn layout_code_block(&mut self, block: &Block, cursor: &mut Cursor, style: Style) {
        cursor.finish_line();
        let config = self.config;
        let body_metrics = self.measure.metrics(&style.font);
        let mono = Font::mono(self.base.size);
        let mono_metrics = self.measure.metrics(&mono);
        let label_font = Font::sans(self.base.size);
        let label_metrics = self.measure.metrics(&label_font);

        let lines = 1 + block
            .children
            .iter()
            .filter(|c| matches!(c, Element::Span(Span::LineBreak)))
            .count();

        let left = cursor.left + config.code_inset;
        let width = (cursor.right - config.code_inset - left).max(0.0);
        let top = cursor.y - body_metrics.ascent;
        let header_height = label_metrics.height() + 2.0 * config.code_header_padding;
        let header = Rect::new(left, top, width, header_height);
        let body = Rect::new(
            left,
            header.bottom(),
            width,
            lines as f64 * mono_metrics.line_spacing + 2.0 * config.code_padding,
        );

        self.push_rounded_rect(
            header,
            CornerRadii::top(config.corner_radius),
            ColorRole::WindowText,
        );
        let label = match &block.kind {
            BlockKind::CodeBlock(CodeBlockInfo {
                language: Some(language),
            }) => language.clone(),
            _ => format!("{lines} Lines"),
        };
        let label_width = self.measure.advance(&label_font, &label);
        self.push_text(
            Rect::new(
                left + 2.0 * config.code_header_padding,
                top + config.code_header_padding,
                label_width,
                label_metrics.height(),
            ),
            label,
            label_font,
            ColorRole::Window,
        );
        self.push_rounded_rect(body, CornerRadii::bottom(config.corner_radius), ColorRole::Base);

        // Lines are never wrapped.
        let text_left = left + config.code_padding;
        let mut line_top = body.y + config.code_padding;
        let mut x = text_left;
        for child in &block.children {
            let Element::Span(span) = child else {
                continue;
            };
            if matches!(span, Span::LineBreak) {
                line_top += mono_metrics.line_spacing;
                x = text_left;
                continue;
            }
            let Some(info) = span.text_info() else {
                continue;
            };
            if info.text.is_empty() {
                continue;
            }
            let line_width = self.measure.advance(&mono, &info.text);
            self.push_text(
                Rect::new(x, line_top, line_width, mono_metrics.height()),
                info.text.clone(),
                mono,
                ColorRole::Text,
            );
            x += line_width;
        }

        cursor.x = cursor.left;
        cursor.y = body.bottom() + 0.5 * cursor.line_height + body_metrics.ascent;
    }

    fn layout_rule(&mut self, cursor: &mut Cursor, style: Style) {
        cursor.finish_line();
        let ascent = self.measure.metrics(&style.font).ascent;
        cursor.y += 2.0 * cursor.line_height;
        let y = cursor.y - ascent;
        self.list.push(Fragment::new(
            Rect::new(cursor.left, y, cursor.right - cursor.left, 0.0),
            FragmentData::Line(LineData {
                to: Point::new(cursor.right, y),
                stroke_width: 1.0,
            }),
        ));
        cursor.y += 2.0 * cursor.line_height;
    }

    fn layout_span(&mut self, span: &mut Span, cursor: &mut Cursor, style: Style) {
        match span {
            Span::LineBreak => cursor.new_line(),
            Span::Latex(info) => self.layout_latex(info, cursor, style),
            Span::Image(_) => {}
            other => {
                if let Some((text, font, color)) = text_run(other, style.font) {
                    self.layout_text(text, font, color, cursor, style.clip);
                }
            }
        }
    }

    fn layout_text(
        &mut self,
        text: &str,
        font: Font,
        color: ColorRole,
        cursor: &mut Cursor,
        clip: Option<(Rect, BlockId)>,
    ) {
        let metrics = self.measure.metrics(&font);
        for (word, placement, width) in wrap::place_words(cursor, self.measure, &font, text) {
            let bounds = Rect::new(
                placement.x,
                placement.y - metrics.ascent,
                width,
                metrics.height(),
            );
            match clip {
                Some((clip, owner)) if bounds.right() > clip.right() => {
                    self.list.push(Fragment::new(
                        bounds,
                        FragmentData::ClippedText(ClippedTextData {
                            clip,
                            text: word.to_string(),
                            font,
                            owner,
                        }),
                    ));
                }
                _ => self.push_text(bounds, word.to_string(), font, color),
            }
        }
    }

    /// Typeset `info` unless the tree still holds a handle for it
    fn take_render(&mut self, info: &mut LatexInfo) -> Option<Box<dyn RenderHandle>> {
        if let Some(render) = info.render.take() {
            return Some(render);
        }
        if info.failed {
            return None;
        }
        let render = self.renderer.render(&MathRequest {
            source: &info.source,
            inline: info.inline,
            font_size: self.base.size,
            foreground: self.foreground,
        });
        info.failed = render.is_none();
        render
    }

    fn layout_latex(&mut self, info: &mut LatexInfo, cursor: &mut Cursor, style: Style) {
        let metrics = self.measure.metrics(&style.font);
        let Some(render) = self.take_render(info) else {
            tracing::debug!(source = %info.source, "no math render, leaving a gap");
            self.push_latex(
                Rect::new(cursor.x, cursor.y - metrics.ascent, 0.0, 0.0),
                None,
                info,
            );
            return;
        };

        let (width, height) = (render.width(), render.height());
        let bounds = if info.inline {
            let space = self.measure.advance(&style.font, " ");
            let placement = cursor.place(width, space);
            // Align the render's baseline with the text baseline.
            Rect::new(placement.x, placement.y - render.ascent(), width, height)
        } else {
            cursor.finish_line();
            let x = cursor.left + ((cursor.right - cursor.left - width) / 2.0).max(0.0);
            let top = cursor.y - metrics.ascent;
            cursor.x = cursor.left;
            cursor.y = top + height + metrics.ascent;
            Rect::new(x, top, width, height)
        };
        self.push_latex(bounds, Some(render), info);
    }

    fn push_text(&mut self, bounds: Rect, text: String, font: Font, color: ColorRole) {
        self.list.push(Fragment::new(
            bounds,
            FragmentData::Text(TextData { text, font, color }),
        ));
    }

    fn push_rounded_rect(&mut self, rect: Rect, radii: CornerRadii, background: ColorRole) {
        self.list.push(Fragment::new(
            rect,
            FragmentData::RoundedRect(RoundedRectData {
                rect,
                radii,
                background,
                stroke: ColorRole::Mid,
            }),
        ));
    }

    fn push_latex(
        &mut self,
        bounds: Rect,
        render: Option<Box<dyn RenderHandle>>,
        info: &LatexInfo,
    ) {
        self.list.push(Fragment::new(
            bounds,
            FragmentData::Latex(LatexData {
                render,
                source: info.source.clone(),
                inline: info.inline,
            }),
        ));
    }
}
