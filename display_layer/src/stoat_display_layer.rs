//! Screen-space view of a text buffer for Stoat.
//!
//! A [`DisplayLayer`] converts buffer rows into [`ScreenLine`]s: the text that is drawn,
//! plus a tag stream that styles it and the tokens that map screen columns back to
//! buffer positions. Along the way it applies:
//!
//! - **Folds**: buffer ranges collapsed into a single placeholder character
//! - **Tabs**: hard tabs expanded to the next tab stop, leading soft tabs made atomic
//! - **Soft wraps**: rows split at word boundaries with hanging indentation
//! - **Invisibles and indent guides**: whitespace tagged and optionally substituted
//! - **Decorations**: tags from a [`TextDecorationLayer`] merged with the above
//!
//! # Coordinates
//!
//! Buffer positions are [`Point`]s and screen positions are [`DisplayPoint`]s. Columns
//! count UTF-16 code units in both spaces, so a character outside the Basic
//! Multilingual Plane occupies two columns and is addressable only at its edges.
//!
//! ```text
//! buffer              screen (tab_length 4, soft_wrap_column 8)
//! \tab cd ef gh       "    ab "
//!                     "    cd "
//!                     "    ef "
//!                     "    gh"
//! ```
//!
//! # Laziness
//!
//! Screen lines are built on demand, whole fold groups at a time, and cached. Queries
//! extend the cache as far as they need; [`DisplayLayer::do_background_work`] extends it
//! in the idle time an embedder provides. Edits, fold changes and decoration
//! invalidations replace cached lines in place and report each replacement to
//! [`DisplayLayer::on_did_change_sync`] listeners.

mod buffer;
mod change_coalescer;
mod coords;
mod decoration;
mod display_index;
mod display_layer;
mod error;
mod fold_index;
mod line_units;
mod position_translator;
mod screen_line;
mod screen_line_builder;
mod settings;
mod subscription;

pub use buffer::{BufferEdit, LineEnding, TextBuffer};
pub use change_coalescer::DisplayChange;
pub use coords::{DisplayPoint, Point};
pub use decoration::{DecorationIterator, TextDecorationLayer};
pub use display_index::{Deadline, TimeDeadline};
pub use display_layer::DisplayLayer;
pub use error::{Error, Result};
pub use fold_index::{Fold, FoldId};
pub use position_translator::{ClipDirection, ClipOptions, SoftWrapDescriptor};
pub use screen_line::{ScreenLine, TagEvent, Token, TokenKind};
pub use settings::{
    is_word_start, DisplayLayerSettings, Invisibles, IsWrapBoundary, RatioForCharacter,
    DEFAULT_FOLD_CHARACTER, DEFAULT_TAB_LENGTH,
};
pub use subscription::Subscription;
