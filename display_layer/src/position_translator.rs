//! Mapping between buffer and screen coordinates.
//!
//! Both directions walk the [`Token`](crate::Token)s of indexed screen lines. A screen
//! position is first clipped so it never lands inside an atomic run, in synthetic
//! indentation or past the content of a row. A buffer position is clipped to the
//! buffer and moved out of any fold before its screen row is searched.

use crate::{
    coords::{DisplayPoint, Point},
    display_index::{DisplayIndex, IndexedLine},
    error::Result,
    screen_line::{ScreenLine, TokenKind},
    screen_line_builder::BuildContext,
};

/// Which way to move a position that isn't addressable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClipDirection {
    Backward,
    Forward,
    /// The nearer edge; ties go backward.
    #[default]
    Closest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClipOptions {
    pub clip_direction: ClipDirection,
    /// Inside a continuation row's indentation, move to the first content column
    /// regardless of [`clip_direction`](Self::clip_direction).
    pub skip_soft_wrap_indentation: bool,
}

impl ClipOptions {
    pub fn backward() -> Self {
        Self::with_direction(ClipDirection::Backward)
    }

    pub fn forward() -> Self {
        Self::with_direction(ClipDirection::Forward)
    }

    pub fn closest() -> Self {
        Self::default()
    }

    pub fn with_direction(clip_direction: ClipDirection) -> Self {
        Self {
            clip_direction,
            skip_soft_wrap_indentation: false,
        }
    }

    pub fn skipping_soft_wrap_indentation(mut self) -> Self {
        self.skip_soft_wrap_indentation = true;
        self
    }
}

/// How a screen row relates to soft wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftWrapDescriptor {
    pub soft_wrapped_at_start: bool,
    pub soft_wrapped_at_end: bool,
    pub buffer_row: u32,
}

pub(crate) fn clip_screen_position(
    ctx: &BuildContext<'_>,
    index: &mut DisplayIndex,
    position: DisplayPoint,
    options: ClipOptions,
) -> Result<DisplayPoint> {
    index.index_through_screen_row(ctx, position.row.saturating_add(1))?;
    let Some(last) = index.line_count().checked_sub(1) else {
        return Ok(DisplayPoint::ZERO);
    };
    let (row, column) = if position.row > last {
        (last, u32::MAX)
    } else {
        (position.row, position.column)
    };
    let Some(IndexedLine { line, .. }) = index.line(row) else {
        return Ok(DisplayPoint::ZERO);
    };
    let direction = options.clip_direction;

    if line.soft_wrapped_at_start && column < line.soft_wrap_indent && row > 0 {
        if options.skip_soft_wrap_indentation || direction == ClipDirection::Forward {
            return Ok(DisplayPoint::new(row, line.soft_wrap_indent));
        }
        if let Some(previous) = index.line(row - 1) {
            return Ok(before_content_end(previous.line, row - 1));
        }
    }

    if column > line.content_end && !line.soft_wrapped_at_end {
        if direction == ClipDirection::Forward && row < last {
            return Ok(DisplayPoint::new(row + 1, 0));
        }
        return Ok(DisplayPoint::new(row, line.content_end));
    }

    // The end of a soft-wrapped row belongs to the next row, and an atomic token ending
    // there can snap onto it.
    let column = clip_column(line, column.min(line.content_end), direction);
    if line.soft_wrapped_at_end && column >= line.content_end && row < last {
        if direction == ClipDirection::Forward {
            if let Some(next) = index.line(row + 1) {
                return Ok(DisplayPoint::new(row + 1, next.line.soft_wrap_indent));
            }
        }
        return Ok(before_content_end(line, row));
    }
    Ok(DisplayPoint::new(row, column))
}

pub(crate) fn translate_screen_position(
    ctx: &BuildContext<'_>,
    index: &mut DisplayIndex,
    position: DisplayPoint,
    options: ClipOptions,
) -> Result<Point> {
    let clipped = clip_screen_position(ctx, index, position, options)?;
    let Some(indexed) = index.line(clipped.row) else {
        return Ok(Point::ZERO);
    };

    let mut screen_column = 0;
    let mut buffer_position = indexed.buffer_start;
    for token in &indexed.line.tokens {
        let screen_end = screen_column + token.screen_extent;
        if clipped.column < screen_end {
            return Ok(match token.kind {
                TokenKind::Normal => {
                    buffer_position.traverse(Point::new(0, clipped.column - screen_column))
                },
                TokenKind::Atomic | TokenKind::Void => buffer_position,
            });
        }
        screen_column = screen_end;
        buffer_position = buffer_position.traverse(token.buffer_extent);
    }
    Ok(buffer_position)
}

pub(crate) fn translate_buffer_position(
    ctx: &BuildContext<'_>,
    index: &mut DisplayIndex,
    position: Point,
    options: ClipOptions,
) -> Result<DisplayPoint> {
    let position = ctx.buffer.clip_position(position);
    index.index_through_buffer_row(ctx, position.row.saturating_add(1))?;

    let direction = options.clip_direction;
    let position = match ctx.folds.merged_containing(position) {
        Some(fold) => match direction {
            ClipDirection::Backward => fold.start,
            ClipDirection::Forward => fold.end,
            ClipDirection::Closest => {
                let offset = ctx.buffer.character_offset_for_position(position);
                let to_start = offset - ctx.buffer.character_offset_for_position(fold.start);
                let to_end = ctx.buffer.character_offset_for_position(fold.end) - offset;
                if to_start <= to_end {
                    fold.start
                } else {
                    fold.end
                }
            },
        },
        None => position,
    };

    let Some((first_screen_row, lines)) = index.group_containing(position.row) else {
        let last = index.line_count().saturating_sub(1);
        let content_end = index.line(last).map_or(0, |indexed| indexed.line.content_end);
        return Ok(DisplayPoint::new(last, content_end));
    };

    let mut found = None;
    'rows: for (screen_row, indexed) in (first_screen_row..).zip(&lines) {
        let mut screen_column = 0;
        let mut token_start = indexed.buffer_start;
        for token in &indexed.line.tokens {
            let token_end = token_start.traverse(token.buffer_extent);
            if token_start <= position && position < token_end {
                let column = match token.kind {
                    TokenKind::Normal => screen_column + (position.column - token_start.column),
                    TokenKind::Atomic if position == token_start => screen_column,
                    TokenKind::Atomic => {
                        let forward = match direction {
                            ClipDirection::Backward => false,
                            ClipDirection::Forward => true,
                            ClipDirection::Closest => {
                                position.column - token_start.column
                                    > token_end.column.saturating_sub(position.column)
                            },
                        };
                        if forward {
                            screen_column + token.screen_extent
                        } else {
                            screen_column
                        }
                    },
                    TokenKind::Void => screen_column,
                };
                found = Some(DisplayPoint::new(screen_row, column));
                break 'rows;
            }
            screen_column += token.screen_extent;
            token_start = token_end;
        }
    }

    let screen_position = match (found, lines.last()) {
        (Some(found), _) => found,
        (None, Some(last)) => DisplayPoint::new(
            first_screen_row + lines.len() as u32 - 1,
            last.line.content_end,
        ),
        (None, None) => DisplayPoint::new(first_screen_row, 0),
    };
    clip_screen_position(ctx, index, screen_position, options)
}

pub(crate) fn soft_wrap_descriptor_for_screen_row(
    ctx: &BuildContext<'_>,
    index: &mut DisplayIndex,
    row: u32,
) -> Result<Option<SoftWrapDescriptor>> {
    index.index_through_screen_row(ctx, row)?;
    Ok(index.line(row).map(|indexed| SoftWrapDescriptor {
        soft_wrapped_at_start: indexed.line.soft_wrapped_at_start,
        soft_wrapped_at_end: indexed.line.soft_wrapped_at_end,
        buffer_row: indexed.buffer_start.row,
    }))
}

/// The last addressable column of a soft-wrapped row: before its final character.
fn before_content_end(line: &ScreenLine, row: u32) -> DisplayPoint {
    let column = line.content_end.saturating_sub(1);
    DisplayPoint::new(row, clip_column(line, column, ClipDirection::Backward))
}

/// Moves `column` out of the interior of an atomic token.
fn clip_column(line: &ScreenLine, column: u32, direction: ClipDirection) -> u32 {
    let mut token_start = 0;
    for token in &line.tokens {
        let token_end = token_start + token.screen_extent;
        if column < token_end {
            if token.kind == TokenKind::Atomic && column > token_start {
                return match direction {
                    ClipDirection::Backward => token_start,
                    ClipDirection::Forward => token_end,
                    ClipDirection::Closest if column - token_start <= token_end - column => {
                        token_start
                    },
                    ClipDirection::Closest => token_end,
                };
            }
            return column;
        }
        token_start = token_end;
    }
    column
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{buffer::TextBuffer, fold_index::FoldIndex, settings::DisplayLayerSettings};

    struct Fixture {
        buffer: TextBuffer,
        folds: FoldIndex,
        settings: DisplayLayerSettings,
        index: DisplayIndex,
    }

    impl Fixture {
        fn new(text: &str, settings: DisplayLayerSettings) -> Self {
            Self {
                buffer: TextBuffer::new(text),
                folds: FoldIndex::new(),
                settings,
                index: DisplayIndex::new(),
            }
        }

        fn with_index<T>(
            &mut self,
            f: impl FnOnce(&BuildContext<'_>, &mut DisplayIndex) -> Result<T>,
        ) -> T {
            let ctx = BuildContext {
                buffer: &self.buffer,
                folds: &self.folds,
                settings: &self.settings,
                decorations: None,
            };
            f(&ctx, &mut self.index).unwrap()
        }

        fn screen_to_buffer(&mut self, row: u32, column: u32, options: ClipOptions) -> Point {
            let position = DisplayPoint::new(row, column);
            self.with_index(|ctx, index| translate_screen_position(ctx, index, position, options))
        }

        fn buffer_to_screen(
            &mut self,
            row: u32,
            column: u32,
            options: ClipOptions,
        ) -> DisplayPoint {
            let position = Point::new(row, column);
            self.with_index(|ctx, index| translate_buffer_position(ctx, index, position, options))
        }

        fn clip(&mut self, row: u32, column: u32, options: ClipOptions) -> DisplayPoint {
            let position = DisplayPoint::new(row, column);
            self.with_index(|ctx, index| clip_screen_position(ctx, index, position, options))
        }
    }

    #[test]
    fn hard_tab_interior_snaps_to_edges() {
        let mut fixture = Fixture::new("a\tb", DisplayLayerSettings::default());
        assert_eq!(
            fixture.screen_to_buffer(0, 2, ClipOptions::backward()),
            Point::new(0, 1)
        );
        assert_eq!(
            fixture.screen_to_buffer(0, 2, ClipOptions::forward()),
            Point::new(0, 2)
        );
        assert_eq!(
            fixture.screen_to_buffer(0, 3, ClipOptions::closest()),
            Point::new(0, 2)
        );
        assert_eq!(
            fixture.buffer_to_screen(0, 2, ClipOptions::closest()),
            DisplayPoint::new(0, 4)
        );
    }

    #[test]
    fn past_the_end_clamps() {
        let mut fixture = Fixture::new("abc\nde", DisplayLayerSettings::default());
        assert_eq!(
            fixture.screen_to_buffer(0, 10, ClipOptions::backward()),
            Point::new(0, 3)
        );
        assert_eq!(
            fixture.screen_to_buffer(0, 10, ClipOptions::forward()),
            Point::new(1, 0)
        );
        assert_eq!(
            fixture.screen_to_buffer(9, 0, ClipOptions::closest()),
            Point::new(1, 2)
        );
        assert_eq!(
            fixture.buffer_to_screen(7, 7, ClipOptions::closest()),
            DisplayPoint::new(1, 2)
        );
    }

    #[test]
    fn folded_positions_snap_to_placeholder() {
        let mut fixture = Fixture::new("abcdef", DisplayLayerSettings::default());
        fixture.folds.insert(Point::new(0, 1)..Point::new(0, 5));
        assert_eq!(
            fixture.buffer_to_screen(0, 2, ClipOptions::closest()),
            DisplayPoint::new(0, 1)
        );
        assert_eq!(
            fixture.buffer_to_screen(0, 4, ClipOptions::closest()),
            DisplayPoint::new(0, 2)
        );
        assert_eq!(
            fixture.buffer_to_screen(0, 3, ClipOptions::closest()),
            DisplayPoint::new(0, 1)
        );
        assert_eq!(
            fixture.screen_to_buffer(0, 2, ClipOptions::closest()),
            Point::new(0, 5)
        );
    }

    #[test]
    fn soft_wrap_end_is_not_addressable() {
        let settings = DisplayLayerSettings::default().with_soft_wrap_column(4);
        let mut fixture = Fixture::new("abc def", settings);
        assert_eq!(
            fixture.screen_to_buffer(0, 4, ClipOptions::backward()),
            Point::new(0, 3)
        );
        assert_eq!(
            fixture.screen_to_buffer(0, 4, ClipOptions::forward()),
            Point::new(0, 4)
        );
        assert_eq!(
            fixture.buffer_to_screen(0, 4, ClipOptions::closest()),
            DisplayPoint::new(1, 0)
        );
    }

    #[test]
    fn atomic_token_ending_a_wrapped_row_clips_before_the_wrap() {
        let settings = DisplayLayerSettings::default()
            .with_tab_length(4)
            .with_soft_wrap_column(9);
        let mut fixture = Fixture::new("ab\t\tx y", settings);

        let clipped = fixture.clip(0, 7, ClipOptions::closest());
        assert_eq!(clipped, DisplayPoint::new(0, 4));
        assert_eq!(
            fixture.clip(clipped.row, clipped.column, ClipOptions::closest()),
            clipped
        );
        assert_eq!(
            fixture.screen_to_buffer(0, 7, ClipOptions::closest()),
            Point::new(0, 3)
        );
        assert_eq!(
            fixture.buffer_to_screen(0, 3, ClipOptions::closest()),
            clipped
        );

        assert_eq!(
            fixture.clip(0, 7, ClipOptions::forward()),
            DisplayPoint::new(1, 0)
        );
        assert_eq!(
            fixture.clip(0, 7, ClipOptions::backward()),
            DisplayPoint::new(0, 4)
        );
    }
}
