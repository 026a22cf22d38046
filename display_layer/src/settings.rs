//! Rendering options for a [`DisplayLayer`](crate::DisplayLayer).

use std::{fmt, rc::Rc};
use tracing::warn;

pub const DEFAULT_TAB_LENGTH: u32 = 4;
pub const DEFAULT_FOLD_CHARACTER: char = '⋯';

/// Width of a character relative to a normal-width column.
pub type RatioForCharacter = Rc<dyn Fn(char) -> f64>;

/// Decides whether a soft wrap may happen between `previous` and `current`.
pub type IsWrapBoundary = Rc<dyn Fn(char, char) -> bool>;

/// Glyphs substituted for whitespace and line terminators. `None` renders the
/// character as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Invisibles {
    pub space: Option<char>,
    pub tab: Option<char>,
    pub cr: Option<char>,
    pub eol: Option<char>,
}

impl Invisibles {
    pub fn with_space(mut self, glyph: char) -> Self {
        self.space = Some(glyph);
        self
    }

    pub fn with_tab(mut self, glyph: char) -> Self {
        self.tab = Some(glyph);
        self
    }

    pub fn with_cr(mut self, glyph: char) -> Self {
        self.cr = Some(glyph);
        self
    }

    pub fn with_eol(mut self, glyph: char) -> Self {
        self.eol = Some(glyph);
        self
    }
}

#[derive(Clone)]
pub struct DisplayLayerSettings {
    pub tab_length: u32,
    /// Wrap column; `None` or `Some(0)` disables soft wrapping.
    pub soft_wrap_column: Option<u32>,
    pub soft_wrap_hanging_indent: u32,
    pub show_indent_guides: bool,
    pub fold_character: char,
    pub atomic_soft_tabs: bool,
    pub invisibles: Invisibles,
    pub ratio_for_character: RatioForCharacter,
    pub is_wrap_boundary: IsWrapBoundary,
}

impl Default for DisplayLayerSettings {
    fn default() -> Self {
        Self {
            tab_length: DEFAULT_TAB_LENGTH,
            soft_wrap_column: None,
            soft_wrap_hanging_indent: 0,
            show_indent_guides: false,
            fold_character: DEFAULT_FOLD_CHARACTER,
            atomic_soft_tabs: true,
            invisibles: Invisibles::default(),
            ratio_for_character: Rc::new(|_| 1.0),
            is_wrap_boundary: Rc::new(is_word_start),
        }
    }
}

impl fmt::Debug for DisplayLayerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayLayerSettings")
            .field("tab_length", &self.tab_length)
            .field("soft_wrap_column", &self.soft_wrap_column)
            .field("soft_wrap_hanging_indent", &self.soft_wrap_hanging_indent)
            .field("show_indent_guides", &self.show_indent_guides)
            .field("fold_character", &self.fold_character)
            .field("atomic_soft_tabs", &self.atomic_soft_tabs)
            .field("invisibles", &self.invisibles)
            .finish_non_exhaustive()
    }
}

impl DisplayLayerSettings {
    pub fn with_tab_length(mut self, tab_length: u32) -> Self {
        self.tab_length = tab_length;
        self
    }

    pub fn with_soft_wrap_column(mut self, column: u32) -> Self {
        self.soft_wrap_column = Some(column);
        self
    }

    pub fn with_soft_wrap_hanging_indent(mut self, indent: u32) -> Self {
        self.soft_wrap_hanging_indent = indent;
        self
    }

    pub fn with_indent_guides(mut self, show: bool) -> Self {
        self.show_indent_guides = show;
        self
    }

    pub fn with_fold_character(mut self, fold_character: char) -> Self {
        self.fold_character = fold_character;
        self
    }

    pub fn with_atomic_soft_tabs(mut self, atomic: bool) -> Self {
        self.atomic_soft_tabs = atomic;
        self
    }

    pub fn with_invisibles(mut self, invisibles: Invisibles) -> Self {
        self.invisibles = invisibles;
        self
    }

    pub fn with_ratio_for_character(mut self, ratio: impl Fn(char) -> f64 + 'static) -> Self {
        self.ratio_for_character = Rc::new(ratio);
        self
    }

    pub fn with_is_wrap_boundary(
        mut self,
        boundary: impl Fn(char, char) -> bool + 'static,
    ) -> Self {
        self.is_wrap_boundary = Rc::new(boundary);
        self
    }

    /// Effective wrap column, `None` when wrapping is disabled.
    pub fn wrap_column(&self) -> Option<u32> {
        self.soft_wrap_column.filter(|column| *column > 0)
    }

    /// Replaces out-of-range values with the nearest valid ones.
    pub(crate) fn normalized(mut self) -> Self {
        if self.tab_length == 0 {
            warn!("DisplayLayerSettings.normalized: tab_length 0 is invalid, using 1");
            self.tab_length = 1;
        }
        self
    }
}

/// Default wrap boundary: the start of a word.
pub fn is_word_start(previous: char, current: char) -> bool {
    is_whitespace(previous) && !is_whitespace(current)
}

/// Whitespace as far as indentation and invisibles are concerned.
pub(crate) fn is_whitespace(ch: char) -> bool {
    ch == ' ' || ch == '\t'
}
