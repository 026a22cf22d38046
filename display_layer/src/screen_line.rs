//! Rendered screen rows.
//!
//! A [`ScreenLine`] is one row of output: its text, a balanced stream of [`TagEvent`]s
//! describing how to style the text, and the [`Token`]s used to translate positions
//! between screen and buffer space. Screen lines never store their absolute position, so
//! an unchanged line survives edits above it untouched.

use crate::coords::Point;
use smol_str::SmolStr;

/// One event in a screen line's tag stream.
///
/// `Text(n)` covers the next `n` columns of [`ScreenLine::line_text`]. Opens and closes
/// nest properly within a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagEvent {
    Open(SmolStr),
    Close(SmolStr),
    Text(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Every column maps to its own buffer position.
    Normal,
    /// Addressable only at its edges: hard tabs, soft tabs, paired characters and fold
    /// placeholders.
    Atomic,
    /// Occupies screen columns without buffer text: soft-wrap indentation, end-of-line
    /// invisibles and blank-line indent guides.
    Void,
}

/// A run of screen columns with a uniform translation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub screen_extent: u32,
    pub buffer_extent: Point,
    pub kind: TokenKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenLine {
    /// Unique among the lines of one display layer. Rebuilt lines get fresh ids.
    pub id: u64,
    pub line_text: String,
    pub tags: Vec<TagEvent>,
    pub(crate) tokens: Vec<Token>,
    pub(crate) buffer_extent: Point,
    pub(crate) screen_extent: u32,
    pub(crate) soft_wrap_indent: u32,
    pub(crate) content_end: u32,
    pub(crate) soft_wrapped_at_start: bool,
    pub(crate) soft_wrapped_at_end: bool,
}

impl ScreenLine {
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Buffer text covered by this row, as a row/column delta from its buffer start.
    pub fn buffer_extent(&self) -> Point {
        self.buffer_extent
    }

    /// Width of the row in screen columns.
    pub fn screen_extent(&self) -> u32 {
        self.screen_extent
    }

    /// Width of the synthetic indentation prefixing a continuation row.
    pub fn soft_wrap_indent(&self) -> u32 {
        self.soft_wrap_indent
    }

    /// Screen column after the last non-void token.
    pub fn content_end(&self) -> u32 {
        self.content_end
    }

    pub fn soft_wrapped_at_start(&self) -> bool {
        self.soft_wrapped_at_start
    }

    pub fn soft_wrapped_at_end(&self) -> bool {
        self.soft_wrapped_at_end
    }

    /// Same rendering, ignoring ids.
    pub fn renders_like(&self, other: &ScreenLine) -> bool {
        self.line_text == other.line_text && self.tags == other.tags
    }
}
