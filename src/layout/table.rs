use super::wrap::{self, Cursor};
use super::{LayoutEngine, Style, text_run};
use crate::config::LayoutConfig;
use crate::element::{Block, BlockId, BlockKind, Element, Span};
use crate::fragment::{ColorRole, CornerRadii, Rect};
use crate::metrics::Font;

/// Column geometry shared by both passes. All columns are equally wide
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableGrid {
    pub left: f64,
    pub columns: usize,
    pub column_width: f64,
    pub padding: f64,
}

impl TableGrid {
    pub fn new(columns: usize, left: f64, right: f64, config: &LayoutConfig) -> Self {
        let columns = columns.max(1);
        let padding = config.table_padding;
        let available = right - left - config.table_margin;
        let gutters = (columns as f64 + 1.0) * 2.0 * padding;
        Self {
            left,
            columns,
            column_width: ((available - gutters) / columns as f64).max(0.0),
            padding,
        }
    }

    /// Outer width of a cell box
    pub fn cell_width(&self) -> f64 {
        self.column_width + 2.0 * self.padding
    }

    pub fn cell_x(&self, column: usize) -> f64 {
        self.left + column as f64 * self.cell_width()
    }

    /// Text area of a cell in a row whose box starts at `top`
    pub fn content_box(&self, column: usize, top: f64, row_height: f64) -> Rect {
        Rect::new(
            self.cell_x(column) + self.padding,
            top + self.padding,
            self.column_width,
            row_height,
        )
    }
}

fn block_mut(element: &mut Element) -> Option<&mut Block> {
    match element {
        Element::Block(block) => Some(block),
        Element::Span(_) => None,
    }
}

/// Rows of every table part in order, flagged when they belong to the head
fn rows_mut(table: &mut Block) -> Vec<(bool, &mut Block)> {
    table
        .children
        .iter_mut()
        .filter_map(block_mut)
        .flat_map(|part| {
            let header = part.kind == BlockKind::TableHead;
            part.children
                .iter_mut()
                .filter_map(block_mut)
                .map(move |row| (header, row))
        })
        .collect()
}

/// Pre-order ids of every cell, row by row
fn cell_ids(table: &Block, table_id: BlockId) -> Vec<Vec<BlockId>> {
    let mut next = table_id.0 + 1;
    let mut rows = Vec::new();
    for part in table.blocks() {
        next += 1;
        for row in part.blocks() {
            next += 1;
            let mut ids = Vec::new();
            for cell in row.blocks() {
                ids.push(BlockId(next));
                next += cell.block_count() as u32;
            }
            rows.push(ids);
        }
    }
    rows
}

impl LayoutEngine<'_> {
    pub(super) fn layout_table(
        &mut self,
        table: &mut Block,
        id: BlockId,
        cursor: &mut Cursor,
        style: Style,
    ) {
        cursor.finish_line();
        let base = self.measure.metrics(&style.font);
        let ids = cell_ids(table, id);
        let columns = ids.iter().map(Vec::len).max().unwrap_or(0);
        let grid = TableGrid::new(columns, cursor.left, cursor.right, &self.config);
        let header_font = style.font.bold();
        let padding = grid.padding;

        let mut heights = Vec::with_capacity(ids.len());
        for (header, row) in rows_mut(table) {
            let font = if header { header_font } else { style.font };
            let mut height = base.line_spacing;
            let cells = row.children.iter_mut().filter_map(block_mut);
            for (column, cell) in cells.enumerate() {
                height = height.max(self.measure_cell(cell, &grid, column, font));
            }
            heights.push(height);
        }

        let mut top = cursor.y - base.ascent;
        let rows = rows_mut(table).into_iter().zip(heights.iter().zip(&ids));
        for ((header, row), (&row_height, row_ids)) in rows {
            let outer_height = row_height + 2.0 * padding;
            let background = if header {
                ColorRole::Base
            } else {
                ColorRole::Window
            };
            for column in 0..row.blocks().count() {
                let rect = Rect::new(grid.cell_x(column), top, grid.cell_width(), outer_height);
                self.push_rounded_rect(rect, CornerRadii::default(), background);
            }

            let font = if header { header_font } else { style.font };
            let metrics = self.measure.metrics(&font);
            let cells = row.children.iter_mut().filter_map(block_mut).enumerate();
            for ((column, cell), &cell_id) in cells.zip(row_ids) {
                let content = grid.content_box(column, top, row_height);
                let mut cell_cursor = Cursor::new(
                    content.x,
                    content.right(),
                    content.y + metrics.ascent,
                    metrics.line_spacing,
                );
                let cell_style = Style {
                    font,
                    clip: Some((content, cell_id)),
                };
                for child in &mut cell.children {
                    if let Element::Span(span) = child {
                        self.layout_span(span, &mut cell_cursor, cell_style);
                    }
                }
            }
            top += outer_height;
        }

        tracing::trace!(table = %id, rows = heights.len(), columns, "table laid out");
        self.next_id = id.0 + table.block_count() as u32;
        cursor.x = cursor.left;
        cursor.y = top + 0.5 * cursor.line_height + base.ascent;
    }

    /// Height the spans of `cell` need in `column`, measured the way
    /// [`LayoutEngine::layout_span`] will place them. Math rendered here stays
    /// cached in the tree for the placing pass.
    fn measure_cell(&mut self, cell: &mut Block, grid: &TableGrid, column: usize, font: Font) -> f64 {
        let metrics = self.measure.metrics(&font);
        let content = grid.content_box(column, 0.0, 0.0);
        let mut cursor = Cursor::new(
            content.x,
            content.right(),
            metrics.ascent,
            metrics.line_spacing,
        );
        let mut bottom = metrics.line_spacing;

        for child in &mut cell.children {
            let Element::Span(span) = child else {
                continue;
            };
            match span {
                Span::LineBreak => cursor.new_line(),
                Span::Image(_) => {}
                Span::Latex(info) => {
                    let Some(render) = self.take_render(info) else {
                        continue;
                    };
                    let height = render.height();
                    let top = if info.inline {
                        let space = self.measure.advance(&font, " ");
                        cursor.place(render.width(), space).y - render.ascent()
                    } else {
                        cursor.finish_line();
                        let top = cursor.y - metrics.ascent;
                        cursor.x = cursor.left;
                        cursor.y = top + height + metrics.ascent;
                        top
                    };
                    bottom = bottom.max(top + height);
                    info.render = Some(render);
                }
                other => {
                    let Some((text, run_font, _)) = text_run(other, font) else {
                        continue;
                    };
                    let run = self.measure.metrics(&run_font);
                    for (_, placement, _) in
                        wrap::place_words(&mut cursor, self.measure, &run_font, text)
                    {
                        bottom = bottom.max(placement.y - run.ascent + run.line_spacing);
                    }
                }
            }
        }
        bottom
    }
}
