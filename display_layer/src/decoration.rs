//! Interface to an external source of text decorations, typically a syntax highlighter.
//!
//! The display layer pulls decorations through a [`DecorationIterator`], which walks the
//! buffer boundary by boundary. At each boundary it reports the tags that close and the
//! tags that open there. Tags are opaque strings; the display layer only forwards them
//! into [`ScreenLine`](crate::ScreenLine) tag streams.

use crate::coords::Point;
use smol_str::SmolStr;

/// Cursor over decoration boundaries in buffer order.
pub trait DecorationIterator {
    /// Tags opening at the current boundary, outermost first.
    fn open_tags(&self) -> Vec<SmolStr>;

    /// Tags closing at the current boundary, innermost first.
    fn close_tags(&self) -> Vec<SmolStr>;

    /// Buffer position of the current boundary.
    fn position(&self) -> Point;

    /// Advances to the next boundary, returning `false` when there is none.
    fn move_to_successor(&mut self) -> bool;

    /// Repositions at the first boundary after `position` and returns the tags that
    /// contain `position`, outermost first.
    fn seek(&mut self, position: Point) -> Vec<SmolStr>;
}

/// Source of [`DecorationIterator`]s.
pub trait TextDecorationLayer {
    fn build_iterator(&self) -> Box<dyn DecorationIterator + '_>;
}

/// One boundary reported by a [`DecorationIterator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Boundary {
    pub position: Point,
    pub close_tags: Vec<SmolStr>,
    pub open_tags: Vec<SmolStr>,
}

impl Boundary {
    pub fn has_tags(&self) -> bool {
        !self.close_tags.is_empty() || !self.open_tags.is_empty()
    }
}
