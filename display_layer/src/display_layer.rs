//! The public face of the crate.
//!
//! A [`DisplayLayer`] turns a shared [`TextBuffer`] into screen lines: folds collapse
//! buffer ranges into a placeholder, tabs expand, long lines soft wrap, invisibles and
//! indent guides are tagged, and decorations from a [`TextDecorationLayer`] are merged
//! into each line's tag stream. Screen lines are computed lazily and replaced
//! incrementally; every replacement is reported to [`on_did_change_sync`] listeners.
//!
//! [`on_did_change_sync`]: DisplayLayer::on_did_change_sync

use crate::{
    buffer::{BufferEdit, TextBuffer},
    change_coalescer::{ChangeCoalescer, DisplayChange},
    coords::{DisplayPoint, Point},
    decoration::TextDecorationLayer,
    display_index::{Deadline, DisplayIndex},
    error::Result,
    fold_index::{Fold, FoldId, FoldIndex},
    position_translator::{self, ClipOptions, SoftWrapDescriptor},
    screen_line::ScreenLine,
    screen_line_builder::BuildContext,
    settings::DisplayLayerSettings,
    subscription::{ListenerSet, Subscription},
};
use std::{cell::RefCell, ops::Range, rc::Rc};
use tracing::debug;

/// Inputs to screen line construction owned by one display layer.
#[derive(Clone)]
struct LayoutState {
    folds: FoldIndex,
    settings: DisplayLayerSettings,
    decoration_layer: Option<Rc<dyn TextDecorationLayer>>,
}

impl LayoutState {
    fn context<'a>(&'a self, buffer: &'a TextBuffer) -> BuildContext<'a> {
        BuildContext {
            buffer,
            folds: &self.folds,
            settings: &self.settings,
            decorations: self.decoration_layer.as_deref(),
        }
    }
}

/// Screen-space view of a [`TextBuffer`].
///
/// The buffer is shared; whoever mutates it forwards each [`BufferEdit`] to
/// [`buffer_did_change`](Self::buffer_did_change). The display layer never holds a
/// borrow of the buffer across calls.
pub struct DisplayLayer {
    buffer: Rc<RefCell<TextBuffer>>,
    state: LayoutState,
    index: DisplayIndex,
    listeners: ListenerSet,
    destroyed: bool,
}

impl DisplayLayer {
    pub fn new(buffer: Rc<RefCell<TextBuffer>>, settings: DisplayLayerSettings) -> Self {
        Self {
            buffer,
            state: LayoutState {
                folds: FoldIndex::new(),
                settings: settings.normalized(),
                decoration_layer: None,
            },
            index: DisplayIndex::new(),
            listeners: ListenerSet::new(),
            destroyed: false,
        }
    }

    /// An independent layer over the same buffer with the same settings, decoration
    /// layer and folds. Nothing is indexed and no listeners are registered.
    pub fn copy(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            state: self.state.clone(),
            index: DisplayIndex::new(),
            listeners: ListenerSet::new(),
            destroyed: false,
        }
    }

    /// Drops all listeners, folds and screen lines. Later buffer changes are ignored.
    pub fn destroy(&mut self) {
        debug!("DisplayLayer.destroy");
        self.destroyed = true;
        self.listeners.clear();
        self.state.folds.clear();
        self.index.clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn buffer(&self) -> &Rc<RefCell<TextBuffer>> {
        &self.buffer
    }

    pub fn settings(&self) -> &DisplayLayerSettings {
        &self.state.settings
    }

    /// Replaces the settings and rebuilds every indexed row.
    pub fn set_settings(&mut self, settings: DisplayLayerSettings) -> Result<()> {
        self.state.settings = settings.normalized();
        self.rebuild_indexed_rows()
    }

    /// Installs (or with `None`, removes) the decoration source and rebuilds every
    /// indexed row.
    pub fn set_text_decoration_layer(
        &mut self,
        layer: Option<Rc<dyn TextDecorationLayer>>,
    ) -> Result<()> {
        self.state.decoration_layer = layer;
        self.rebuild_indexed_rows()
    }

    pub fn on_did_change_sync(
        &self,
        listener: impl FnMut(&[DisplayChange]) + 'static,
    ) -> Subscription {
        self.listeners.subscribe(listener)
    }

    // Folds

    /// Collapses `range`, clipped to the buffer, into the fold character.
    pub fn fold_buffer_range(&mut self, range: Range<Point>) -> Result<FoldId> {
        let range = {
            let buffer = self.buffer.borrow();
            let start = buffer.clip_position(range.start);
            let end = buffer.clip_position(range.end);
            start.min(end)..start.max(end)
        };
        let id = self.state.folds.insert(range.clone());
        self.rebuild_buffer_rows(&[range.start.row..=range.end.row])?;
        Ok(id)
    }

    pub fn destroy_fold(&mut self, id: FoldId) -> Result<()> {
        let range = self.state.folds.remove(id)?;
        self.rebuild_buffer_rows(&[range.start.row..=range.end.row])
    }

    /// Removes every fold intersecting `range`, touching endpoints included, and returns
    /// the removed ranges.
    pub fn destroy_folds_intersecting_buffer_range(
        &mut self,
        range: Range<Point>,
    ) -> Result<Vec<Range<Point>>> {
        let removed = self.state.folds.remove_intersecting(range);
        self.rebuild_removed_folds(removed)
    }

    pub fn destroy_all_folds(&mut self) -> Result<Vec<Range<Point>>> {
        let removed = self.state.folds.clear();
        self.rebuild_removed_folds(removed)
    }

    pub fn folds_intersecting_buffer_range(&self, range: Range<Point>) -> Vec<Fold> {
        self.state.folds.intersecting(range)
    }

    pub fn fold_count(&self) -> usize {
        self.state.folds.len()
    }

    // Screen lines

    /// Screen rows `start_row..end_row`. Rows past the end are omitted.
    pub fn screen_lines(&mut self, start_row: u32, end_row: u32) -> Result<Vec<ScreenLine>> {
        if end_row > 0 {
            self.with_index(|ctx, index| index.index_through_screen_row(ctx, end_row - 1))?;
        }
        Ok(self
            .index
            .lines(start_row..end_row.max(start_row))
            .into_iter()
            .map(|indexed| indexed.line.clone())
            .collect())
    }

    pub fn all_screen_lines(&mut self) -> Result<Vec<ScreenLine>> {
        self.screen_lines(0, u32::MAX)
    }

    /// The text of every screen row, separated by newlines.
    pub fn text(&mut self) -> Result<String> {
        self.text_for_screen_rows(0, u32::MAX)
    }

    pub fn text_for_screen_rows(&mut self, start_row: u32, end_row: u32) -> Result<String> {
        let lines = self.screen_lines(start_row, end_row)?;
        Ok(lines
            .iter()
            .map(|line| line.line_text.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Exact row count; indexes the whole buffer.
    pub fn screen_line_count(&mut self) -> Result<u32> {
        self.with_index(|ctx, index| index.index_all(ctx))?;
        Ok(self.index.line_count())
    }

    /// Row count extrapolated from the indexed rows, without indexing.
    pub fn approximate_screen_line_count(&self) -> u32 {
        let buffer_line_count = self.buffer.borrow().line_count();
        self.index.approximate_screen_line_count(buffer_line_count)
    }

    /// Width of screen row `row`, zero past the end.
    pub fn line_length_for_screen_row(&mut self, row: u32) -> Result<u32> {
        self.with_index(|ctx, index| index.index_through_screen_row(ctx, row))?;
        Ok(self
            .index
            .line(row)
            .map_or(0, |indexed| indexed.line.screen_extent))
    }

    /// End of the widest screen row; indexes the whole buffer.
    pub fn rightmost_screen_position(&mut self) -> Result<DisplayPoint> {
        self.with_index(|ctx, index| index.index_all(ctx))?;
        Ok(self.index.rightmost_screen_position())
    }

    /// End of the widest indexed screen row, without indexing.
    pub fn approximate_rightmost_screen_position(&self) -> DisplayPoint {
        self.index.rightmost_screen_position()
    }

    pub fn indexed_buffer_row_count(&self) -> u32 {
        self.index.indexed_buffer_row_count()
    }

    /// Screen rows built so far. Change records only ever cover these rows.
    pub fn indexed_screen_line_count(&self) -> u32 {
        self.index.line_count()
    }

    /// Indexes while `deadline` has time left. Returns `true` if work remains.
    pub fn do_background_work(&mut self, deadline: &mut dyn Deadline) -> Result<bool> {
        self.with_index(|ctx, index| index.do_background_work(ctx, deadline))
    }

    // Positions

    pub fn clip_screen_position(
        &mut self,
        position: DisplayPoint,
        options: ClipOptions,
    ) -> Result<DisplayPoint> {
        self.with_index(|ctx, index| {
            position_translator::clip_screen_position(ctx, index, position, options)
        })
    }

    pub fn translate_screen_position(
        &mut self,
        position: DisplayPoint,
        options: ClipOptions,
    ) -> Result<Point> {
        self.with_index(|ctx, index| {
            position_translator::translate_screen_position(ctx, index, position, options)
        })
    }

    pub fn translate_buffer_position(
        &mut self,
        position: Point,
        options: ClipOptions,
    ) -> Result<DisplayPoint> {
        self.with_index(|ctx, index| {
            position_translator::translate_buffer_position(ctx, index, position, options)
        })
    }

    /// `None` past the last screen row.
    pub fn soft_wrap_descriptor_for_screen_row(
        &mut self,
        row: u32,
    ) -> Result<Option<SoftWrapDescriptor>> {
        self.with_index(|ctx, index| {
            position_translator::soft_wrap_descriptor_for_screen_row(ctx, index, row)
        })
    }

    // Invalidation

    /// Updates folds and screen lines for an edit already applied to the buffer.
    pub fn buffer_did_change(&mut self, edit: &BufferEdit) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        let old_end = edit.old_range.end;
        let row_delta = i64::from(edit.new_range.end.row) - i64::from(old_end.row);
        let invalidated = self.state.folds.apply_edit(edit);

        let mut start_row = edit.new_range.start.row;
        let mut new_end_row = edit.new_range.end.row;
        for fold in &invalidated {
            start_row = start_row.min(fold.range.start.row);
            if fold.range.end.row > old_end.row {
                new_end_row = new_end_row.max(shift_row(fold.range.end.row, row_delta));
            }
        }

        let splice = {
            let buffer = self.buffer.borrow();
            if self.state.settings.show_indent_guides {
                while start_row > 0 && buffer.is_row_blank(start_row - 1) {
                    start_row -= 1;
                }
                while new_end_row < buffer.last_row() && buffer.is_row_blank(new_end_row + 1) {
                    new_end_row += 1;
                }
            }
            let old_end_row = shift_row(new_end_row, -row_delta);
            debug!(
                "DisplayLayer.buffer_did_change: rows {start_row}..={old_end_row} \
                 (delta {row_delta}), {} fold(s) destroyed",
                invalidated.len()
            );
            let ctx = self.state.context(&buffer);
            self.index
                .splice_buffer_rows(&ctx, start_row, old_end_row, row_delta)?
        };

        let mut coalescer = ChangeCoalescer::new();
        coalescer.push(splice);
        self.notify(coalescer.into_changes());
        Ok(())
    }

    /// Rebuilds the rows of `range` after the decoration source changed them.
    pub fn decoration_range_invalidated(&mut self, range: Range<Point>) -> Result<()> {
        let indexed_rows = self.index.indexed_buffer_row_count();
        let range = {
            let buffer = self.buffer.borrow();
            let start = buffer.clip_position(range.start);
            if start.row >= indexed_rows {
                return Ok(());
            }
            let end = buffer.clip_position(range.end);
            if end.row >= indexed_rows {
                start..Point::new(indexed_rows, 0)
            } else {
                start..end
            }
        };
        let last_row = range.end.row.min(indexed_rows - 1);

        let (start, end) = self.with_index(|ctx, index| {
            index.splice_buffer_rows(ctx, range.start.row, last_row, 0)?;
            let start = position_translator::translate_buffer_position(
                ctx,
                index,
                range.start,
                ClipOptions::default(),
            )?;
            let end = position_translator::translate_buffer_position(
                ctx,
                index,
                range.end,
                ClipOptions::default(),
            )?;
            Ok((start, end))
        })?;

        let extent = end.traversal(start);
        self.notify(vec![DisplayChange {
            start,
            old_extent: extent,
            new_extent: extent,
        }]);
        Ok(())
    }

    fn with_index<T>(
        &mut self,
        f: impl FnOnce(&BuildContext<'_>, &mut DisplayIndex) -> Result<T>,
    ) -> Result<T> {
        let buffer = self.buffer.borrow();
        let ctx = self.state.context(&buffer);
        f(&ctx, &mut self.index)
    }

    /// Rebuilds each span of buffer rows in place and reports the coalesced changes.
    fn rebuild_buffer_rows(&mut self, spans: &[std::ops::RangeInclusive<u32>]) -> Result<()> {
        let changes = self.with_index(|ctx, index| {
            let mut coalescer = ChangeCoalescer::new();
            for span in spans {
                coalescer.push(index.splice_buffer_rows(ctx, *span.start(), *span.end(), 0)?);
            }
            Ok(coalescer.into_changes())
        })?;
        self.notify(changes);
        Ok(())
    }

    fn rebuild_removed_folds(&mut self, removed: Vec<Fold>) -> Result<Vec<Range<Point>>> {
        let spans: Vec<_> = removed
            .iter()
            .map(|fold| fold.range.start.row..=fold.range.end.row)
            .collect();
        self.rebuild_buffer_rows(&spans)?;
        Ok(removed.into_iter().map(|fold| fold.range).collect())
    }

    /// Discards every screen line and rebuilds as many buffer rows as were indexed,
    /// reporting one change over the whole indexed region.
    fn rebuild_indexed_rows(&mut self) -> Result<()> {
        let old_count = self.index.line_count();
        let indexed_rows = self.index.indexed_buffer_row_count();
        self.index.clear();
        if indexed_rows > 0 {
            self.with_index(|ctx, index| index.index_through_buffer_row(ctx, indexed_rows - 1))?;
        }
        let new_count = self.index.line_count();
        debug!("DisplayLayer.rebuild_indexed_rows: {old_count} -> {new_count} screen rows");
        if old_count > 0 || new_count > 0 {
            self.notify(vec![DisplayChange {
                start: DisplayPoint::ZERO,
                old_extent: DisplayPoint::new(old_count, 0),
                new_extent: DisplayPoint::new(new_count, 0),
            }]);
        }
        Ok(())
    }

    fn notify(&self, changes: Vec<DisplayChange>) {
        self.listeners.emit(&changes);
    }
}

fn shift_row(row: u32, delta: i64) -> u32 {
    (i64::from(row) + delta).clamp(0, i64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(text: &str) -> DisplayLayer {
        let buffer = Rc::new(RefCell::new(TextBuffer::new(text)));
        DisplayLayer::new(buffer, DisplayLayerSettings::default())
    }

    #[test]
    fn renders_buffer_text() {
        let mut layer = layer("abc\n\tdef");
        assert_eq!(layer.text().unwrap(), "abc\n    def");
        assert_eq!(layer.screen_line_count().unwrap(), 2);
        assert_eq!(layer.line_length_for_screen_row(1).unwrap(), 7);
        assert_eq!(layer.line_length_for_screen_row(5).unwrap(), 0);
    }

    #[test]
    fn screen_lines_past_the_end_are_empty() {
        let mut layer = layer("a\nb");
        assert!(layer.screen_lines(5, 10).unwrap().is_empty());
        assert_eq!(layer.screen_lines(1, 10).unwrap().len(), 1);
    }

    #[test]
    fn destroying_an_unknown_fold_fails() {
        let mut layer = layer("abc");
        let id = layer.fold_buffer_range(Point::new(0, 1)..Point::new(0, 2)).unwrap();
        layer.destroy_fold(id).unwrap();
        assert!(layer.destroy_fold(id).is_err());
    }

    #[test]
    fn fold_emits_change_for_its_rows() {
        let mut layer = layer("abc\ndef\nghi\njkl");
        layer.text().unwrap();
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = changes.clone();
        let _subscription =
            layer.on_did_change_sync(move |batch| sink.borrow_mut().extend_from_slice(batch));

        layer.fold_buffer_range(Point::new(1, 1)..Point::new(2, 1)).unwrap();
        assert_eq!(layer.text().unwrap(), "abc\nd⋯hi\njkl");
        assert_eq!(
            *changes.borrow(),
            vec![DisplayChange {
                start: DisplayPoint::new(1, 0),
                old_extent: DisplayPoint::new(2, 0),
                new_extent: DisplayPoint::new(1, 0),
            }]
        );
    }

    #[test]
    fn destroyed_layer_ignores_buffer_changes() {
        let mut layer = layer("abc");
        layer.text().unwrap();
        layer.destroy();
        let edit = layer.buffer().borrow_mut().insert(Point::new(0, 0), "x");
        layer.buffer_did_change(&edit).unwrap();
        assert!(layer.is_destroyed());
        assert_eq!(layer.indexed_buffer_row_count(), 0);
    }
}
