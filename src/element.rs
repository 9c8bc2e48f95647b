use std::fmt::{self, Write as _};

use crate::math::RenderHandle;

/// Pre-order index of a block within its document (the root is `#0`).
///
/// A plain index, never an owner: fragments use it to name the block they
/// were produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub enum Element {
    Block(Block),
    Span(Span),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListInfo {
    pub ordered: bool,
    /// Bullet character for unordered lists, delimiter (`.` or `)`) for
    /// ordered ones.
    pub mark: char,
    pub start: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListItemInfo {
    pub index: u64,
    pub ordered: bool,
    /// Delimiter or bullet of the enclosing list
    pub mark: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadingInfo {
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeBlockInfo {
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Document,
    Quote,
    UnorderedList(ListInfo),
    OrderedList(ListInfo),
    ListItem(ListItemInfo),
    HorizontalRule,
    Heading(HeadingInfo),
    CodeBlock(CodeBlockInfo),
    /// Raw HTML; kept in the tree, never laid out
    HtmlBlock,
    Paragraph,
    Table,
    TableHead,
    TableBody,
    TableRow,
    TableHeader,
    TableCell,
}

/// Payload-free block discriminant, as reported on block exit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Document,
    Quote,
    UnorderedList,
    OrderedList,
    ListItem,
    HorizontalRule,
    Heading,
    CodeBlock,
    HtmlBlock,
    Paragraph,
    Table,
    TableHead,
    TableBody,
    TableRow,
    TableHeader,
    TableCell,
}

impl BlockKind {
    pub fn block_type(&self) -> BlockType {
        match self {
            BlockKind::Document => BlockType::Document,
            BlockKind::Quote => BlockType::Quote,
            BlockKind::UnorderedList(_) => BlockType::UnorderedList,
            BlockKind::OrderedList(_) => BlockType::OrderedList,
            BlockKind::ListItem(_) => BlockType::ListItem,
            BlockKind::HorizontalRule => BlockType::HorizontalRule,
            BlockKind::Heading(_) => BlockType::Heading,
            BlockKind::CodeBlock(_) => BlockType::CodeBlock,
            BlockKind::HtmlBlock => BlockType::HtmlBlock,
            BlockKind::Paragraph => BlockType::Paragraph,
            BlockKind::Table => BlockType::Table,
            BlockKind::TableHead => BlockType::TableHead,
            BlockKind::TableBody => BlockType::TableBody,
            BlockKind::TableRow => BlockType::TableRow,
            BlockKind::TableHeader => BlockType::TableHeader,
            BlockKind::TableCell => BlockType::TableCell,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, BlockKind::UnorderedList(_) | BlockKind::OrderedList(_))
    }
}

#[derive(Debug)]
pub struct Block {
    pub kind: BlockKind,
    pub children: Vec<Element>,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    /// Child blocks, skipping spans
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.children.iter().filter_map(|child| match child {
            Element::Block(block) => Some(block),
            Element::Span(_) => None,
        })
    }

    /// Child spans, skipping blocks
    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.children.iter().filter_map(|child| match child {
            Element::Span(span) => Some(span),
            Element::Block(_) => None,
        })
    }

    /// Number of blocks in this subtree, including `self`
    pub fn block_count(&self) -> usize {
        1 + self.blocks().map(Block::block_count).sum::<usize>()
    }

    /// Look a block up by its pre-order id, counting `self` as `#0`
    pub fn find(&self, id: BlockId) -> Option<&Block> {
        fn walk<'a>(block: &'a Block, target: u32, next: &mut u32) -> Option<&'a Block> {
            if *next == target {
                return Some(block);
            }
            *next += 1;
            block.blocks().find_map(|child| walk(child, target, next))
        }
        walk(self, id.0, &mut 0)
    }

    /// Visit every math span in the subtree
    pub fn for_each_latex_mut(&mut self, f: &mut dyn FnMut(&mut LatexInfo)) {
        for child in &mut self.children {
            match child {
                Element::Block(block) => block.for_each_latex_mut(f),
                Element::Span(Span::Latex(info)) => f(info),
                Element::Span(_) => {}
            }
        }
    }

    /// Render handles still cached in the tree (not yet moved into a
    /// display list).
    pub fn cached_render_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                Element::Block(block) => block.cached_render_count(),
                Element::Span(Span::Latex(info)) => info.render.is_some() as usize,
                Element::Span(_) => 0,
            })
            .sum()
    }

    /// Indented, one-node-per-line dump of the subtree
    pub fn dump_tree(&self) -> String {
        let mut out = String::new();
        dump_block(self, 0, &mut out);
        out
    }
}

fn dump_block(block: &Block, depth: usize, out: &mut String) {
    let _ = write!(out, "{:indent$}{:?}", "", block.kind.block_type(), indent = depth * 2);
    match &block.kind {
        BlockKind::UnorderedList(info) | BlockKind::OrderedList(info) => {
            let _ = write!(out, " mark='{}' start={}", info.mark, info.start);
        }
        BlockKind::ListItem(info) => {
            let _ = write!(out, " index={}", info.index);
        }
        BlockKind::Heading(info) => {
            let _ = write!(out, " level={}", info.level);
        }
        BlockKind::CodeBlock(CodeBlockInfo {
            language: Some(language),
        }) => {
            let _ = write!(out, " lang={language}");
        }
        _ => {}
    }
    out.push('\n');
    for child in &block.children {
        match child {
            Element::Block(child) => dump_block(child, depth + 1, out),
            Element::Span(span) => {
                let _ = writeln!(out, "{:indent$}{span}", "", indent = (depth + 1) * 2);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextInfo {
    pub text: String,
}

impl TextInfo {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageInfo {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkInfo {
    pub url: String,
    /// Visible link text
    pub title: String,
}

#[derive(Debug)]
pub struct LatexInfo {
    /// Cached typeset result; taken by the first layout pass that emits it
    pub render: Option<Box<dyn RenderHandle>>,
    pub source: String,
    pub inline: bool,
    /// The renderer rejected `source`; it is not asked again
    pub failed: bool,
}

#[derive(Debug)]
pub enum Span {
    Normal(TextInfo),
    Italic(TextInfo),
    Bold(TextInfo),
    ItalicBold(TextInfo),
    Code(TextInfo),
    Strikethrough(TextInfo),
    Underline(TextInfo),
    /// Parsed but never laid out
    Image(ImageInfo),
    Hyperlink(LinkInfo),
    LineBreak,
    Latex(LatexInfo),
}

/// Payload-free span discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanKind {
    Normal,
    Italic,
    Bold,
    ItalicBold,
    Code,
    Strikethrough,
    Underline,
    Image,
    Hyperlink,
    LineBreak,
    Latex,
}

impl SpanKind {
    /// Kinds whose payload is a [`TextInfo`]
    pub fn is_text(self) -> bool {
        matches!(
            self,
            SpanKind::Normal
                | SpanKind::Italic
                | SpanKind::Bold
                | SpanKind::ItalicBold
                | SpanKind::Code
                | SpanKind::Strikethrough
                | SpanKind::Underline
        )
    }
}

impl Span {
    /// Empty span of `kind`
    pub fn empty(kind: SpanKind) -> Self {
        match kind {
            SpanKind::Normal => Span::Normal(TextInfo::default()),
            SpanKind::Italic => Span::Italic(TextInfo::default()),
            SpanKind::Bold => Span::Bold(TextInfo::default()),
            SpanKind::ItalicBold => Span::ItalicBold(TextInfo::default()),
            SpanKind::Code => Span::Code(TextInfo::default()),
            SpanKind::Strikethrough => Span::Strikethrough(TextInfo::default()),
            SpanKind::Underline => Span::Underline(TextInfo::default()),
            SpanKind::Image => Span::Image(ImageInfo::default()),
            SpanKind::Hyperlink => Span::Hyperlink(LinkInfo::default()),
            SpanKind::LineBreak => Span::LineBreak,
            SpanKind::Latex => Span::Latex(LatexInfo {
                render: None,
                source: String::new(),
                inline: true,
                failed: false,
            }),
        }
    }

    pub fn kind(&self) -> SpanKind {
        match self {
            Span::Normal(_) => SpanKind::Normal,
            Span::Italic(_) => SpanKind::Italic,
            Span::Bold(_) => SpanKind::Bold,
            Span::ItalicBold(_) => SpanKind::ItalicBold,
            Span::Code(_) => SpanKind::Code,
            Span::Strikethrough(_) => SpanKind::Strikethrough,
            Span::Underline(_) => SpanKind::Underline,
            Span::Image(_) => SpanKind::Image,
            Span::Hyperlink(_) => SpanKind::Hyperlink,
            Span::LineBreak => SpanKind::LineBreak,
            Span::Latex(_) => SpanKind::Latex,
        }
    }

    pub fn text_info(&self) -> Option<&TextInfo> {
        match self {
            Span::Normal(info)
            | Span::Italic(info)
            | Span::Bold(info)
            | Span::ItalicBold(info)
            | Span::Code(info)
            | Span::Strikethrough(info)
            | Span::Underline(info) => Some(info),
            _ => None,
        }
    }

    pub fn text_info_mut(&mut self) -> Option<&mut TextInfo> {
        match self {
            Span::Normal(info)
            | Span::Italic(info)
            | Span::Bold(info)
            | Span::ItalicBold(info)
            | Span::Code(info)
            | Span::Strikethrough(info)
            | Span::Underline(info) => Some(info),
            _ => None,
        }
    }

    /// Re-tag a text span, keeping its text. Other spans are left as is
    pub fn retag(&mut self, kind: SpanKind) {
        if !kind.is_text() {
            return;
        }
        if let Some(info) = self.text_info_mut() {
            let text = std::mem::take(&mut info.text);
            *self = Span::empty(kind);
            if let Some(info) = self.text_info_mut() {
                info.text = text;
            }
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind())?;
        match self {
            Span::Image(info) => write!(f, " url={:?}", info.url),
            Span::Hyperlink(info) => write!(f, " url={:?} title={:?}", info.url, info.title),
            Span::LineBreak => Ok(()),
            Span::Latex(info) => write!(
                f,
                " {} {:?}{}",
                if info.inline { "inline" } else { "display" },
                info.source,
                if info.render.is_some() { " (rendered)" } else { "" }
            ),
            other => match other.text_info() {
                Some(info) => write!(f, " {:?}", info.text),
                None => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Block {
        let mut quote = Block::new(BlockKind::Quote);
        let mut para = Block::new(BlockKind::Paragraph);
        para.children
            .push(Element::Span(Span::Bold(TextInfo::new("hi"))));
        quote.children.push(Element::Block(para));

        let mut root = Block::new(BlockKind::Document);
        root.children.push(Element::Block(Block::new(BlockKind::Heading(
            HeadingInfo { level: 2 },
        ))));
        root.children.push(Element::Block(quote));
        root.children.push(Element::Block(Block::new(BlockKind::HorizontalRule)));
        root
    }

    #[test]
    fn block_ids_are_pre_order() {
        let root = doc();
        assert_eq!(root.block_count(), 5);
        assert!(matches!(root.find(BlockId(0)).map(|b| &b.kind), Some(BlockKind::Document)));
        assert!(matches!(root.find(BlockId(2)).map(|b| &b.kind), Some(BlockKind::Quote)));
        assert!(matches!(root.find(BlockId(3)).map(|b| &b.kind), Some(BlockKind::Paragraph)));
        assert!(matches!(
            root.find(BlockId(4)).map(|b| &b.kind),
            Some(BlockKind::HorizontalRule)
        ));
        assert!(root.find(BlockId(5)).is_none());
        assert_eq!(BlockId(4).to_string(), "#4");
    }

    #[test]
    fn retag_keeps_text() {
        let mut span = Span::Italic(TextInfo::new("abc"));
        span.retag(SpanKind::Bold);
        assert_eq!(span.kind(), SpanKind::Bold);
        assert_eq!(span.text_info().map(|t| t.text.as_str()), Some("abc"));

        let mut brk = Span::LineBreak;
        brk.retag(SpanKind::Bold);
        assert_eq!(brk.kind(), SpanKind::LineBreak);
    }

    #[test]
    fn dump_tree_indents_children() {
        let dump = doc().dump_tree();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines[0], "Document");
        assert_eq!(lines[1], "  Heading level=2");
        assert_eq!(lines[2], "  Quote");
        assert_eq!(lines[3], "    Paragraph");
        assert_eq!(lines[4], "      Bold \"hi\"");
        assert_eq!(lines[5], "  HorizontalRule");
    }
}
