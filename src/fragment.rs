use std::fmt;

use crate::element::BlockId;
use crate::math::RenderHandle;
use crate::metrics::Font;
use crate::paint::Argb;

/// Placeholder copied when the selection cannot be turned into text
pub const COPY_PLACEHOLDER: &str = "error: can't copy this element";

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in absolute layout coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Half-open containment: the right and bottom edges are outside
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }
}

/// Palette role a fragment is painted with; resolved by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorRole {
    Text,
    Window,
    WindowText,
    Base,
    Mid,
    Highlight,
    HighlightedText,
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CornerRadii {
    pub top_left: f64,
    pub top_right: f64,
    pub bottom_left: f64,
    pub bottom_right: f64,
}

impl CornerRadii {
    pub fn uniform(radius: f64) -> Self {
        Self {
            top_left: radius,
            top_right: radius,
            bottom_left: radius,
            bottom_right: radius,
        }
    }

    /// Rounded top edge, square bottom edge
    pub fn top(radius: f64) -> Self {
        Self {
            top_left: radius,
            top_right: radius,
            ..Self::default()
        }
    }

    pub fn bottom(radius: f64) -> Self {
        Self {
            bottom_left: radius,
            bottom_right: radius,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextData {
    pub text: String,
    pub font: Font,
    pub color: ColorRole,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineData {
    /// End point; the start point is the bounding box origin
    pub to: Point,
    pub stroke_width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundedRectData {
    pub rect: Rect,
    pub radii: CornerRadii,
    pub background: ColorRole,
    pub stroke: ColorRole,
}

#[derive(Debug)]
pub struct LatexData {
    /// `None` when typesetting failed; the fragment is then a zero-size gap
    pub render: Option<Box<dyn RenderHandle>>,
    pub source: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClippedTextData {
    pub clip: Rect,
    pub text: String,
    pub font: Font,
    /// Block that owns the clip area (a table cell)
    pub owner: BlockId,
}

#[derive(Debug)]
pub enum FragmentData {
    Text(TextData),
    Line(LineData),
    RoundedRect(RoundedRectData),
    ClippedText(ClippedTextData),
    Latex(LatexData),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    Text,
    Line,
    RoundedRect,
    ClippedText,
    Latex,
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FragmentKind::Text => "text",
            FragmentKind::Line => "line",
            FragmentKind::RoundedRect => "rounded_rect",
            FragmentKind::ClippedText => "clipped_text",
            FragmentKind::Latex => "latex",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct Fragment {
    pub bounds: Rect,
    pub highlighted: bool,
    pub data: FragmentData,
}

impl Fragment {
    pub fn new(bounds: Rect, data: FragmentData) -> Self {
        Self {
            bounds,
            highlighted: false,
            data,
        }
    }

    pub fn kind(&self) -> FragmentKind {
        match self.data {
            FragmentData::Text(_) => FragmentKind::Text,
            FragmentData::Line(_) => FragmentKind::Line,
            FragmentData::RoundedRect(_) => FragmentKind::RoundedRect,
            FragmentData::ClippedText(_) => FragmentKind::ClippedText,
            FragmentData::Latex(_) => FragmentKind::Latex,
        }
    }

    /// Text and math can be selected; rules and boxes are decoration
    pub fn is_selectable(&self) -> bool {
        !matches!(
            self.data,
            FragmentData::Line(_) | FragmentData::RoundedRect(_)
        )
    }

    /// Literal text of a text run, clipped run, or math source
    pub fn text(&self) -> Option<&str> {
        match &self.data {
            FragmentData::Text(data) => Some(&data.text),
            FragmentData::ClippedText(data) => Some(&data.text),
            FragmentData::Latex(data) => Some(&data.source),
            _ => None,
        }
    }
}

fn truncated(text: &str) -> String {
    let escaped = text.replace('\n', "\\n").replace('\t', "\\t");
    if escaped.chars().count() > 50 {
        let head: String = escaped.chars().take(47).collect();
        format!("{head}...")
    } else {
        escaped
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.bounds;
        write!(
            f,
            "{} ({:.1},{:.1},{:.1},{:.1})",
            self.kind(),
            b.x,
            b.y,
            b.width,
            b.height
        )?;
        if self.highlighted {
            f.write_str(" highlighted")?;
        }
        match &self.data {
            FragmentData::Text(data) => write!(
                f,
                " \"{}\" {:?} {}px{}{}",
                truncated(&data.text),
                data.font.family,
                data.font.size,
                if data.font.bold { " bold" } else { "" },
                if data.font.italic { " italic" } else { "" }
            ),
            FragmentData::Line(data) => write!(
                f,
                " to=({:.1},{:.1}) width={}",
                data.to.x, data.to.y, data.stroke_width
            ),
            FragmentData::RoundedRect(data) => write!(
                f,
                " radii=({},{},{},{}) bg={:?}",
                data.radii.top_left,
                data.radii.top_right,
                data.radii.bottom_left,
                data.radii.bottom_right,
                data.background
            ),
            FragmentData::ClippedText(data) => write!(
                f,
                " \"{}\" clip=({:.1},{:.1},{:.1},{:.1}) owner={}",
                truncated(&data.text),
                data.clip.x,
                data.clip.y,
                data.clip.width,
                data.clip.height,
                data.owner
            ),
            FragmentData::Latex(data) => {
                write!(
                    f,
                    " ${}$ {}",
                    truncated(&data.source),
                    if data.inline { "inline" } else { "display" }
                )?;
                if data.render.is_none() {
                    f.write_str(" (not rendered)")?;
                }
                Ok(())
            }
        }
    }
}

/// Ordered fragments from one layout pass plus the single-fragment selection
#[derive(Debug, Default)]
pub struct DisplayList {
    fragments: Vec<Fragment>,
    selected: Option<usize>,
    height: f64,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: Fragment) -> usize {
        self.fragments.push(fragment);
        self.fragments.len() - 1
    }

    /// Insert at `index`, shifting later fragments. Used for decorations whose
    /// extent is only known after their block's children are laid out.
    pub fn insert(&mut self, index: usize, fragment: Fragment) {
        let index = index.min(self.fragments.len());
        self.fragments.insert(index, fragment);
        if let Some(selected) = self.selected.as_mut() {
            if *selected >= index {
                *selected += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Fragment> {
        self.fragments.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Fragment> {
        self.fragments.iter()
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Content height reached by the layout pass
    pub fn height(&self) -> f64 {
        self.height
    }

    pub(crate) fn set_height(&mut self, height: f64) {
        self.height = height;
    }

    /// First selectable fragment whose bounding box contains `point`
    pub fn hit_test(&self, point: Point) -> Option<usize> {
        self.fragments
            .iter()
            .position(|f| f.is_selectable() && f.bounds.contains(point))
    }

    /// Select the fragment under `point`, replacing any previous selection.
    /// A miss leaves the current selection untouched.
    pub fn select_at(&mut self, point: Point) -> Option<usize> {
        let index = self.hit_test(point)?;
        self.select(index);
        Some(index)
    }

    pub fn select(&mut self, index: usize) {
        if index >= self.fragments.len() {
            return;
        }
        self.clear_selection();
        self.fragments[index].highlighted = true;
        self.selected = Some(index);
    }

    /// Drop the selection, returning the box that needs repainting
    pub fn clear_selection(&mut self) -> Option<Rect> {
        let index = self.selected.take()?;
        let fragment = self.fragments.get_mut(index)?;
        fragment.highlighted = false;
        Some(fragment.bounds)
    }

    pub fn selected(&self) -> Option<&Fragment> {
        self.selected.and_then(|i| self.fragments.get(i))
    }

    /// Clipboard text for the current selection: math source for math,
    /// literal text for text runs, the placeholder otherwise.
    pub fn copy_selection(&self) -> String {
        match self.selected().map(|f| &f.data) {
            Some(FragmentData::Latex(data)) => data.source.clone(),
            Some(FragmentData::Text(data)) => data.text.clone(),
            _ => COPY_PLACEHOLDER.to_string(),
        }
    }

    /// Recolour every live math render in place
    pub fn set_foreground(&mut self, color: Argb) {
        for fragment in &mut self.fragments {
            if let FragmentData::Latex(LatexData {
                render: Some(render),
                ..
            }) = &mut fragment.data
            {
                render.set_foreground(color);
            }
        }
    }

    /// Number of math render handles owned by this list
    pub fn render_handle_count(&self) -> usize {
        self.fragments
            .iter()
            .filter(|f| matches!(&f.data, FragmentData::Latex(data) if data.render.is_some()))
            .count()
    }
}

impl<'a> IntoIterator for &'a DisplayList {
    type Item = &'a Fragment;
    type IntoIter = std::slice::Iter<'a, Fragment>;

    fn into_iter(self) -> Self::IntoIter {
        self.fragments.iter()
    }
}
