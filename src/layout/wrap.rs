use crate::metrics::{Font, TextMeasure};

/// Pen position during flow layout. `y` is the baseline of the current line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    pub x: f64,
    pub y: f64,
    pub left: f64,
    pub right: f64,
    pub line_height: f64,
}

/// Where an item landed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    /// Baseline of the line the item landed on
    pub y: f64,
    /// The item started a new line
    pub wrapped: bool,
}

impl Cursor {
    pub fn new(left: f64, right: f64, baseline: f64, line_height: f64) -> Self {
        Self {
            x: left,
            y: baseline,
            left,
            right,
            line_height,
        }
    }

    pub fn at_line_start(&self) -> bool {
        self.x <= self.left
    }

    /// Start a new line unconditionally
    pub fn new_line(&mut self) {
        self.x = self.left;
        self.y += self.line_height;
    }

    /// Start a new line unless the cursor already sits at the start of one
    pub fn finish_line(&mut self) {
        if !self.at_line_start() {
            self.new_line();
        }
    }

    /// Move the left edge and put the pen on it
    pub fn set_left(&mut self, left: f64) {
        self.left = left;
        self.x = left;
    }

    /// Place an item `width` wide followed by `gap`. The item wraps to the
    /// next line when it would cross the right edge, unless it is already
    /// first on its line (an over-long item overflows instead).
    pub fn place(&mut self, width: f64, gap: f64) -> Placement {
        let wrapped = self.x > self.left && self.x + width > self.right;
        if wrapped {
            self.new_line();
        }
        let x = self.x;
        self.x += width + gap;
        Placement {
            x,
            y: self.y,
            wrapped,
        }
    }
}

/// Space-separated words of `text`, empty runs skipped
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(' ').filter(|w| !w.is_empty())
}

/// Run every word of `text` in `font` through `cursor`. Returns each word
/// with its placement and advance width.
pub fn place_words<'t>(
    cursor: &mut Cursor,
    measure: &dyn TextMeasure,
    font: &Font,
    text: &'t str,
) -> Vec<(&'t str, Placement, f64)> {
    let space = measure.advance(font, " ");
    words(text)
        .map(|word| {
            let width = measure.advance(font, word);
            (word, cursor.place(width, space), width)
        })
        .collect()
}

/// Result of wrapping a single-font run
#[derive(Debug, Clone, PartialEq)]
pub struct WrappedLines {
    pub lines: Vec<String>,
    pub height: f64,
}

/// Wrap `text` set in `font` into lines no wider than `available_width`
/// (over-long words get a line of their own).
pub fn measure_wrapped_lines(
    measure: &dyn TextMeasure,
    font: &Font,
    text: &str,
    available_width: f64,
) -> WrappedLines {
    let line_height = measure.metrics(font).line_spacing;
    let mut cursor = Cursor::new(0.0, available_width, 0.0, line_height);
    let mut lines: Vec<String> = Vec::new();
    for (word, placement, _) in place_words(&mut cursor, measure, font, text) {
        match lines.last_mut() {
            Some(line) if !placement.wrapped => {
                line.push(' ');
                line.push_str(word);
            }
            _ => lines.push(word.to_string()),
        }
    }
    let height = lines.len() as f64 * line_height;
    WrappedLines { lines, height }
}
