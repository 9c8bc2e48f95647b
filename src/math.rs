use std::fmt;

use crate::paint::{Argb, Painter};

/// A typeset math expression
pub trait RenderHandle: fmt::Debug {
    fn width(&self) -> f64;

    fn height(&self) -> f64;

    /// Distance from the bottom edge up to the baseline
    fn depth(&self) -> f64;

    /// Paint with the top-left corner at `(x, y)`
    fn draw(&self, painter: &mut dyn Painter, x: f64, y: f64);

    fn set_foreground(&mut self, color: Argb);

    /// Height above the baseline
    fn ascent(&self) -> f64 {
        self.height() - self.depth()
    }
}

/// One typesetting request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MathRequest<'a> {
    pub source: &'a str,
    pub inline: bool,
    pub font_size: u32,
    pub foreground: Argb,
}

pub trait LatexRenderer {
    /// Typeset `request.source`. `None` means the expression could not be
    /// typeset; callers render nothing for it and carry on.
    fn render(&mut self, request: &MathRequest<'_>) -> Option<Box<dyn RenderHandle>>;
}

/// Renderer that never produces output. Every math span degrades to a gap
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMath;

impl LatexRenderer for NoMath {
    fn render(&mut self, request: &MathRequest<'_>) -> Option<Box<dyn RenderHandle>> {
        tracing::debug!(source = request.source, "math rendering disabled");
        None
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic renderer for layout tests.

    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;

    #[derive(Debug)]
    pub struct BoxHandle {
        pub width: f64,
        pub height: f64,
        pub depth: f64,
        pub foreground: Argb,
        pub live: Rc<Cell<usize>>,
        pub recolored: Rc<Cell<usize>>,
    }

    impl RenderHandle for BoxHandle {
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
            painter.draw_svg(
                "<svg/>",
                crate::fragment::Rect::new(x, y, self.width, self.height),
            );
        }

        fn set_foreground(&mut self, color: Argb) {
            self.foreground = color;
            self.recolored.set(self.recolored.get() + 1);
        }
    }

    impl Drop for BoxHandle {
        fn drop(&mut self) {
            self.live.set(self.live.get() - 1);
        }
    }

    /// Sizes every expression from its source length. Sources containing
    /// `\fail` are rejected.
    #[derive(Debug, Default, Clone)]
    pub struct BoxRenderer {
        pub calls: Rc<Cell<usize>>,
        pub live: Rc<Cell<usize>>,
        pub sources: Rc<RefCell<Vec<String>>>,
        pub foregrounds: Rc<RefCell<Vec<Argb>>>,
        /// Handles recoloured in place
        pub recolored: Rc<Cell<usize>>,
    }

    impl LatexRenderer for BoxRenderer {
        fn render(&mut self, request: &MathRequest<'_>) -> Option<Box<dyn RenderHandle>> {
            self.calls.set(self.calls.get() + 1);
            self.sources.borrow_mut().push(request.source.to_string());
            self.foregrounds.borrow_mut().push(request.foreground);
            if request.source.contains("\\fail") {
                return None;
            }
            self.live.set(self.live.get() + 1);
            let size = request.font_size as f64;
            let scale = if request.inline { 1.0 } else { 1.5 };
            Some(Box::new(BoxHandle {
                width: request.source.chars().count() as f64 * size * 0.5 * scale,
                height: size * scale,
                depth: size * 0.25,
                foreground: request.foreground,
                live: self.live.clone(),
                recolored: self.recolored.clone(),
            }))
        }
    }
}
