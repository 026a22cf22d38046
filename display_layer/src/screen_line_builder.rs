//! Builds the [`ScreenLine`]s for one fold group.
//!
//! Construction runs in three passes:
//!
//! 1. [`line_units::collect`] flattens the group into units and decoration boundaries.
//! 2. Layout turns units into pieces of screen text (expanding tabs, substituting
//!    invisibles, fusing soft tabs, cutting indent guides) and breaks them into rows at
//!    soft-wrap points.
//! 3. Each row's pieces are serialized into a balanced [`TagEvent`] stream and a list
//!    of [`Token`]s for position translation.
//!
//! ```text
//! buffer:  "\tfoo bar"          (tab_length 4, soft_wrap_column 8)
//! pieces:  [    ][f][o][o][ ][b][a][r]
//! rows:    "    foo "  |  "bar"
//! ```

use crate::{
    buffer::{len_utf16, LineEnding, TextBuffer},
    coords::Point,
    decoration::{Boundary, TextDecorationLayer},
    error::Result,
    fold_index::FoldIndex,
    line_units::{self, LineUnits, Region, Unit, UnitKind},
    screen_line::{ScreenLine, TagEvent, Token, TokenKind},
    settings::{DisplayLayerSettings, Invisibles},
};
use smallvec::SmallVec;
use smol_str::SmolStr;
use std::ops::Range;
use tracing::{trace, warn};

/// Everything a build needs to read.
pub(crate) struct BuildContext<'a> {
    pub buffer: &'a TextBuffer,
    pub folds: &'a FoldIndex,
    pub settings: &'a DisplayLayerSettings,
    pub decorations: Option<&'a dyn TextDecorationLayer>,
}

#[derive(Debug)]
pub(crate) struct BuiltGroup {
    pub start_row: u32,
    pub end_row: u32,
    pub lines: Vec<BuiltLine>,
}

#[derive(Debug)]
pub(crate) struct BuiltLine {
    pub buffer_start: Point,
    pub line: ScreenLine,
}

/// State carried from one build to the next.
#[derive(Debug, Clone, Default)]
pub(crate) struct BuildState {
    pub next_id: u64,
    blank_run: Option<BlankRun>,
}

/// A maximal run of blank buffer rows and the guide depth its rows share.
#[derive(Debug, Clone)]
struct BlankRun {
    rows: Range<u32>,
    depth: u32,
}

impl BuildState {
    /// Forgets cached buffer facts. Must be called after the buffer or settings change.
    pub fn invalidate(&mut self) {
        self.blank_run = None;
    }

    /// Guide depth of blank `row`: the deeper indentation of the nearest non-blank rows
    /// above and below. Each run of blank rows is scanned once.
    fn blank_row_guide_depth(&mut self, buffer: &TextBuffer, row: u32, tab_length: u32) -> u32 {
        if let Some(run) = self.blank_run.as_ref().filter(|run| run.rows.contains(&row)) {
            return run.depth;
        }
        let line_count = buffer.line_count();
        let start = (0..row)
            .rev()
            .find(|row| !buffer.is_row_blank(*row))
            .map_or(0, |row| row + 1);
        let end = (row + 1..line_count)
            .find(|row| !buffer.is_row_blank(*row))
            .unwrap_or(line_count);

        let indentation = |row: u32| indentation_width(buffer.line_for_row(row), tab_length);
        let above = start.checked_sub(1).map_or(0, indentation);
        let below = if end < line_count { indentation(end) } else { 0 };
        let depth = above.max(below);
        self.blank_run = Some(BlankRun {
            rows: start..end,
            depth,
        });
        depth
    }
}

/// Builds the screen lines of the fold group starting at `start_row`, assigning ids from
/// `state`.
pub(crate) fn build_group(
    ctx: &BuildContext<'_>,
    start_row: u32,
    state: &mut BuildState,
) -> Result<BuiltGroup> {
    let group = line_units::collect(ctx.buffer, ctx.folds, ctx.decorations, start_row)?;
    let builder = ScreenLineBuilder {
        settings: ctx.settings,
        tab_length: ctx.settings.tab_length.max(1),
        wrap_column: ctx.settings.wrap_column(),
        group: &group,
    };

    let rows = if group.is_blank() && ctx.settings.show_indent_guides {
        let depth = state.blank_row_guide_depth(ctx.buffer, start_row, builder.tab_length);
        vec![builder.layout_blank_row(depth)]
    } else {
        builder.layout()
    };

    let mut decorations = DecorationState {
        logical: group.initial_tags.clone(),
        reflected: false,
    };
    let lines: Vec<_> = rows
        .into_iter()
        .map(|row| {
            let tags = builder.emit_tags(&row, &mut decorations);
            let id = state.next_id;
            state.next_id += 1;
            finish_row(row, tags, id)
        })
        .collect();

    trace!(
        "ScreenLineBuilder.build_group: rows {}..={} -> {} screen line(s)",
        group.start_row,
        group.end_row,
        lines.len()
    );
    Ok(BuiltGroup {
        start_row: group.start_row,
        end_row: group.end_row,
        lines,
    })
}

/// Structural classes of a piece, rendered as one space-separated tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Classes(u8);

impl Classes {
    const NONE: Self = Self(0);
    const INVISIBLE: Self = Self(1);
    const HARD_TAB: Self = Self(1 << 1);
    const LEADING: Self = Self(1 << 2);
    const TRAILING: Self = Self(1 << 3);
    const EOL: Self = Self(1 << 4);
    const INDENT_GUIDE: Self = Self(1 << 5);
    const FOLD_MARKER: Self = Self(1 << 6);

    const NAMES: [(Classes, &'static str); 7] = [
        (Self::INVISIBLE, "invisible-character"),
        (Self::HARD_TAB, "hard-tab"),
        (Self::LEADING, "leading-whitespace"),
        (Self::TRAILING, "trailing-whitespace"),
        (Self::EOL, "eol"),
        (Self::INDENT_GUIDE, "indent-guide"),
        (Self::FOLD_MARKER, "fold-marker"),
    ];

    fn for_region(region: Region) -> Self {
        match region {
            Region::Leading => Self::LEADING,
            Region::Trailing => Self::TRAILING,
            Region::Interior => Self::NONE,
        }
    }

    fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    fn with_if(self, other: Self, condition: bool) -> Self {
        if condition {
            self.with(other)
        } else {
            self
        }
    }

    fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    fn tag(self) -> Option<SmolStr> {
        let names: SmallVec<[&str; 4]> = Self::NAMES
            .iter()
            .filter(|(class, _)| self.contains(*class))
            .map(|(_, name)| *name)
            .collect();
        (!names.is_empty()).then(|| SmolStr::new(names.join(" ")))
    }
}

/// A span of screen text produced from zero or more units.
#[derive(Debug, Clone)]
struct Piece {
    /// First unit covered; `None` for synthetic indentation and guide padding.
    unit: Option<usize>,
    text: String,
    width: u32,
    buffer_start: Point,
    buffer_end: Point,
    kind: TokenKind,
    classes: Classes,
}

impl Piece {
    fn void(width: u32, at: Point, classes: Classes) -> Self {
        Self {
            unit: None,
            text: " ".repeat(width as usize),
            width,
            buffer_start: at,
            buffer_end: at,
            kind: TokenKind::Void,
            classes,
        }
    }
}

#[derive(Debug)]
struct Row {
    buffer_start: Point,
    indent: u32,
    soft_wrapped_at_start: bool,
    soft_wrapped_at_end: bool,
    is_blank: bool,
    pieces: Vec<Piece>,
}

impl Row {
    fn new(buffer_start: Point, indent: u32, soft_wrapped_at_start: bool) -> Self {
        Self {
            buffer_start,
            indent,
            soft_wrapped_at_start,
            soft_wrapped_at_end: false,
            is_blank: false,
            pieces: Vec::new(),
        }
    }
}

struct ScreenLineBuilder<'a> {
    settings: &'a DisplayLayerSettings,
    tab_length: u32,
    wrap_column: Option<u32>,
    group: &'a LineUnits,
}

impl ScreenLineBuilder<'_> {
    fn layout(&self) -> Vec<Row> {
        let units = &self.group.units;
        let space_ratio = (self.settings.ratio_for_character)(' ');

        let mut rows = Vec::new();
        let mut row = Row::new(Point::new(self.group.start_row, 0), 0, false);
        row.is_blank = self.group.is_blank();

        let mut column = 0;
        let mut width = 0.0;
        let mut row_has_content = false;
        let mut last_boundary = None;
        let mut first_non_ws: Option<(usize, u32)> = None;

        let mut ix = 0;
        while ix < units.len() {
            let unit = &units[ix];
            let Some((piece, consumed)) = self.piece_at(ix, column) else {
                ix += 1;
                continue;
            };
            if first_non_ws.is_none() && matches!(unit.kind, UnitKind::Char(_) | UnitKind::Fold) {
                first_non_ws = Some((ix, column));
            }

            if let Some(wrap_column) = self.wrap_column {
                let (check_width, advance) = self.wrap_widths(unit, &piece, space_ratio);
                let is_boundary = ix > 0
                    && row_has_content
                    && !matches!(unit.kind, UnitKind::Eol(_))
                    && first_non_ws.is_some_and(|(first, _)| first < ix)
                    && (self.settings.is_wrap_boundary)(self.wrap_char(ix - 1), self.wrap_char(ix));
                let overflows = width + check_width > f64::from(wrap_column);

                if row_has_content && check_width > 0.0 && overflows {
                    let wrap_ix = if is_boundary {
                        ix
                    } else {
                        last_boundary.unwrap_or(ix)
                    };
                    row.pieces
                        .retain(|piece| piece.unit.map_or(true, |unit| unit < wrap_ix));
                    row.soft_wrapped_at_end = true;

                    let first_content = first_non_ws.map(|(_, col)| col);
                    let indent = self.continuation_indent(first_content, wrap_column);
                    let next = Row::new(units[wrap_ix].start, indent, true);
                    rows.push(std::mem::replace(&mut row, next));
                    self.push_indent(&mut row, indent);

                    column = indent;
                    width = f64::from(indent) * space_ratio;
                    row_has_content = false;
                    last_boundary = None;
                    ix = wrap_ix;
                    continue;
                }

                if is_boundary {
                    last_boundary = Some(ix);
                }
                width += advance;
            }

            row_has_content = true;
            column += piece.width;
            row.pieces.push(piece);
            ix += consumed;
        }

        rows.push(row);
        rows
    }

    /// An empty line with indent guides: the guides of the deeper neighbouring
    /// indentation, drawn behind the end-of-line invisible.
    fn layout_blank_row(&self, depth: u32) -> Row {
        let start = Point::new(self.group.start_row, 0);

        let mut row = Row::new(start, 0, false);
        row.is_blank = true;

        let eol = self.piece_at(0, 0).map(|(piece, _)| Piece {
            classes: piece.classes.with_if(Classes::INDENT_GUIDE, depth > 0),
            ..piece
        });
        let eol_width = eol.as_ref().map_or(0, |piece| piece.width);
        row.pieces.extend(eol);

        for segment in guide_segments(depth, self.tab_length) {
            let from = segment.start.max(eol_width);
            if from >= segment.end {
                continue;
            }
            let classes = if segment.start < eol_width {
                Classes::NONE
            } else {
                Classes::INDENT_GUIDE
            };
            row.pieces.push(Piece::void(segment.end - from, start, classes));
        }
        row
    }

    /// The piece starting at unit `ix` when placed at screen `column`, and the number of
    /// units it consumes. End-of-line units without a glyph produce nothing.
    fn piece_at(&self, ix: usize, column: u32) -> Option<(Piece, usize)> {
        let unit = &self.group.units[ix];
        let settings = self.settings;
        let at_tab_stop = column % self.tab_length == 0;
        let guide = settings.show_indent_guides && unit.in_indent && at_tab_stop;
        let piece =
            |text: String, width: u32, buffer_end: Point, kind: TokenKind, classes: Classes| {
                Piece {
                    unit: Some(ix),
                    text,
                    width,
                    buffer_start: unit.start,
                    buffer_end,
                    kind,
                    classes,
                }
            };

        match unit.kind {
            UnitKind::Char(ch) => {
                let width = ch.len_utf16() as u32;
                let kind = if width > 1 {
                    TokenKind::Atomic
                } else {
                    TokenKind::Normal
                };
                Some((piece(ch.to_string(), width, unit.end, kind, Classes::NONE), 1))
            },
            UnitKind::Space => {
                let glyph = match unit.region {
                    Region::Interior => None,
                    Region::Leading | Region::Trailing => settings.invisibles.space,
                };
                let classes = Classes::for_region(unit.region)
                    .with_if(Classes::INVISIBLE, glyph.is_some())
                    .with_if(Classes::INDENT_GUIDE, guide);
                let ch = glyph.unwrap_or(' ');

                let soft_tab = unit.in_indent && at_tab_stop && self.is_soft_tab(ix);
                if settings.atomic_soft_tabs && soft_tab {
                    let count = self.tab_length as usize;
                    let end = self.group.units[ix + count - 1].end;
                    let text = std::iter::repeat(ch).take(count).collect();
                    Some((piece(text, self.tab_length, end, TokenKind::Atomic, classes), count))
                } else {
                    Some((piece(ch.to_string(), 1, unit.end, TokenKind::Normal, classes), 1))
                }
            },
            UnitKind::Tab => {
                let width = self.tab_length - column % self.tab_length;
                let glyph = settings.invisibles.tab;
                let mut text = String::with_capacity(width as usize);
                text.push(glyph.unwrap_or(' '));
                text.extend(std::iter::repeat(' ').take(width as usize - 1));
                let classes = Classes::HARD_TAB
                    .with_if(Classes::INVISIBLE, glyph.is_some())
                    .with(Classes::for_region(unit.region))
                    .with_if(Classes::INDENT_GUIDE, guide);
                Some((piece(text, width, unit.end, TokenKind::Atomic, classes), 1))
            },
            UnitKind::Fold => {
                let ch = settings.fold_character;
                let width = ch.len_utf16() as u32;
                Some((
                    piece(ch.to_string(), width, unit.end, TokenKind::Atomic, Classes::FOLD_MARKER),
                    1,
                ))
            },
            UnitKind::Eol(ending) => {
                let text = eol_text(ending, &settings.invisibles);
                if text.is_empty() {
                    return None;
                }
                let width = len_utf16(&text);
                let classes = Classes::INVISIBLE.with(Classes::EOL);
                Some((piece(text, width, unit.end, TokenKind::Void, classes), 1))
            },
        }
    }

    /// Whether `tab_length` contiguous indentation spaces start at unit `ix`.
    fn is_soft_tab(&self, ix: usize) -> bool {
        let units = &self.group.units;
        (0..self.tab_length as usize).all(|offset| {
            units.get(ix + offset).is_some_and(|unit| {
                unit.kind == UnitKind::Space
                    && unit.in_indent
                    && (offset == 0
                        || (unit.boundaries.is_empty() && unit.start == units[ix + offset - 1].end))
            })
        })
    }

    /// Width that decides whether a piece overflows, and width it adds to the row.
    /// They differ for paired characters, which only wrap if their first half overflows.
    fn wrap_widths(&self, unit: &Unit, piece: &Piece, space_ratio: f64) -> (f64, f64) {
        let ratio = &self.settings.ratio_for_character;
        match unit.kind {
            UnitKind::Char(ch) => {
                let ratio = ratio(ch);
                (ratio, ratio * f64::from(piece.width))
            },
            UnitKind::Space | UnitKind::Tab => {
                let width = space_ratio * f64::from(piece.width);
                (width, width)
            },
            UnitKind::Fold => {
                let ratio = ratio(self.settings.fold_character);
                (ratio, ratio)
            },
            UnitKind::Eol(_) => (0.0, 0.0),
        }
    }

    fn wrap_char(&self, ix: usize) -> char {
        match self.group.units[ix].kind {
            UnitKind::Char(ch) => ch,
            UnitKind::Space => ' ',
            UnitKind::Tab => '\t',
            UnitKind::Fold => self.settings.fold_character,
            UnitKind::Eol(_) => '\n',
        }
    }

    fn continuation_indent(&self, first_non_ws_column: Option<u32>, wrap_column: u32) -> u32 {
        let indent = first_non_ws_column
            .filter(|column| *column < wrap_column)
            .unwrap_or(0);
        let hanging = self.settings.soft_wrap_hanging_indent;
        if indent.saturating_add(hanging) < wrap_column {
            indent + hanging
        } else {
            indent
        }
    }

    fn push_indent(&self, row: &mut Row, indent: u32) {
        if indent == 0 {
            return;
        }
        if self.settings.show_indent_guides {
            for segment in guide_segments(indent, self.tab_length) {
                row.pieces.push(Piece::void(
                    segment.end - segment.start,
                    row.buffer_start,
                    Classes::INDENT_GUIDE,
                ));
            }
        } else {
            row.pieces
                .push(Piece::void(indent, row.buffer_start, Classes::NONE));
        }
    }

    fn emit_tags(&self, row: &Row, decorations: &mut DecorationState) -> Vec<TagEvent> {
        let mut writer = TagWriter::default();
        let mut open_class: Option<SmolStr> = None;
        let mut previous: Option<(TokenKind, Classes)> = None;
        let mut previous_unit = None;
        decorations.reflected = false;

        if row.is_blank {
            writer.empty_text();
        }

        for piece in &row.pieces {
            let mut decoration_break = false;

            if let Some(ix) = piece.unit.filter(|ix| previous_unit != Some(*ix)) {
                let unit = &self.group.units[ix];
                let boundaries = self.group.boundaries_for(unit);
                if unit.kind == UnitKind::Fold {
                    writer.close_class(&mut open_class);
                    if decorations.reflected {
                        for tag in decorations.logical.iter().rev() {
                            writer.close(tag.clone());
                        }
                        decorations.reflected = false;
                    }
                    decorations.apply_all(boundaries, &mut writer, false);
                } else if decorations.reflected && boundaries.iter().any(Boundary::has_tags) {
                    writer.close_class(&mut open_class);
                    decorations.apply_all(boundaries, &mut writer, true);
                    decoration_break = true;
                } else {
                    decorations.apply_all(boundaries, &mut writer, false);
                }
                previous_unit = Some(ix);
            }

            let decorated = piece.unit.is_some() && !piece.classes.contains(Classes::FOLD_MARKER);
            if decorated && !decorations.reflected {
                if !decorations.logical.is_empty() {
                    writer.close_class(&mut open_class);
                    for tag in &decorations.logical {
                        writer.open(tag.clone());
                    }
                    decoration_break = true;
                }
                decorations.reflected = true;
            }

            let base = piece.classes.without(Classes::INDENT_GUIDE);
            let merges = !decoration_break
                && piece.kind == TokenKind::Normal
                && !piece.classes.contains(Classes::INDENT_GUIDE)
                && previous == Some((TokenKind::Normal, base));
            if !merges {
                writer.close_class(&mut open_class);
                if let Some(tag) = piece.classes.tag() {
                    writer.open(tag.clone());
                    open_class = Some(tag);
                }
            }
            writer.text(piece.width);
            previous = Some((piece.kind, base));
        }

        writer.close_class(&mut open_class);
        if decorations.reflected {
            for tag in decorations.logical.iter().rev() {
                writer.close(tag.clone());
            }
            decorations.reflected = false;
        }
        if row.soft_wrapped_at_end {
            writer.empty_text();
        }
        writer.finish()
    }
}

fn finish_row(row: Row, tags: Vec<TagEvent>, id: u64) -> BuiltLine {
    let mut line_text = String::new();
    let mut tokens: Vec<Token> = Vec::new();
    for piece in &row.pieces {
        line_text.push_str(&piece.text);
        let buffer_extent = piece.buffer_end.traversal(piece.buffer_start);
        match tokens.last_mut() {
            Some(last) if last.kind == TokenKind::Normal && piece.kind == TokenKind::Normal => {
                last.screen_extent += piece.width;
                last.buffer_extent = last.buffer_extent.traverse(buffer_extent);
            },
            _ => tokens.push(Token {
                screen_extent: piece.width,
                buffer_extent,
                kind: piece.kind,
            }),
        }
    }

    let screen_extent = tokens.iter().map(|token| token.screen_extent).sum::<u32>();
    let trailing_void = tokens
        .iter()
        .rev()
        .take_while(|token| token.kind == TokenKind::Void)
        .map(|token| token.screen_extent)
        .sum::<u32>();
    let buffer_extent = tokens
        .iter()
        .fold(Point::ZERO, |extent, token| extent.traverse(token.buffer_extent));

    BuiltLine {
        buffer_start: row.buffer_start,
        line: ScreenLine {
            id,
            line_text,
            tags,
            tokens,
            buffer_extent,
            screen_extent,
            soft_wrap_indent: row.indent,
            content_end: screen_extent - trailing_void,
            soft_wrapped_at_start: row.soft_wrapped_at_start,
            soft_wrapped_at_end: row.soft_wrapped_at_end,
        },
    }
}

fn eol_text(ending: LineEnding, invisibles: &Invisibles) -> String {
    let mut text = String::new();
    if ending.has_carriage_return() {
        text.extend(invisibles.cr);
    }
    if ending.has_line_feed() {
        text.extend(invisibles.eol);
    }
    text
}

/// Tab-stop aligned segments covering `0..width`; the last one may be partial.
fn guide_segments(width: u32, tab_length: u32) -> impl Iterator<Item = Range<u32>> {
    (0..width)
        .step_by(tab_length as usize)
        .map(move |start| start..(start + tab_length).min(width))
}

/// Indentation width of `line` with tabs expanded.
fn indentation_width(line: &str, tab_length: u32) -> u32 {
    let mut width = 0;
    for ch in line.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width += tab_length - width % tab_length,
            _ => break,
        }
    }
    width
}

/// Accumulates a tag stream, coalescing adjacent text.
#[derive(Debug, Default)]
struct TagWriter {
    tags: Vec<TagEvent>,
    pending_text: u32,
}

impl TagWriter {
    fn text(&mut self, width: u32) {
        self.pending_text += width;
    }

    fn flush(&mut self) {
        if self.pending_text > 0 {
            self.tags.push(TagEvent::Text(self.pending_text));
            self.pending_text = 0;
        }
    }

    fn empty_text(&mut self) {
        self.flush();
        self.tags.push(TagEvent::Text(0));
    }

    fn open(&mut self, tag: SmolStr) {
        self.flush();
        self.tags.push(TagEvent::Open(tag));
    }

    fn close(&mut self, tag: SmolStr) {
        self.flush();
        self.tags.push(TagEvent::Close(tag));
    }

    fn close_class(&mut self, open_class: &mut Option<SmolStr>) {
        if let Some(tag) = open_class.take() {
            self.close(tag);
        }
    }

    fn finish(mut self) -> Vec<TagEvent> {
        self.flush();
        self.tags
    }
}

/// Decoration tags in effect, and whether they are currently open in the row's stream.
#[derive(Debug)]
struct DecorationState {
    logical: Vec<SmolStr>,
    reflected: bool,
}

impl DecorationState {
    fn apply_all(&mut self, boundaries: &[Boundary], writer: &mut TagWriter, emit: bool) {
        for boundary in boundaries {
            self.apply(boundary, writer, emit);
        }
    }

    /// Closes the boundary's close tags, closing and later reopening every tag nested
    /// inside them, then opens its open tags.
    fn apply(&mut self, boundary: &Boundary, writer: &mut TagWriter, emit: bool) {
        let mut reopen: SmallVec<[SmolStr; 4]> = SmallVec::new();
        for tag in &boundary.close_tags {
            if let Some(ix) = reopen.iter().position(|open| open == tag) {
                reopen.remove(ix);
                continue;
            }

            let matched = self.logical.contains(tag);
            if !matched {
                warn!(
                    "ScreenLineBuilder.apply: dropping close tag {tag:?} with no open tag at {:?}",
                    boundary.position
                );
            }
            while let Some(open) = self.logical.pop() {
                if emit {
                    writer.close(open.clone());
                }
                if matched && &open == tag {
                    break;
                }
                reopen.insert(0, open);
            }
        }

        for tag in reopen.into_iter().chain(boundary.open_tags.iter().cloned()) {
            if emit {
                writer.open(tag.clone());
            }
            self.logical.push(tag);
        }
    }
}
