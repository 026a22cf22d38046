//! First pass of screen line construction: flattens a fold group into layout units.
//!
//! A fold group is the run of buffer rows joined by folds, so it always renders as a
//! single (possibly soft-wrapped) logical line. Each [`Unit`] is one character, one fold
//! placeholder or the end of the group's last line. Whitespace units remember whether
//! they sit in the leading or trailing whitespace of their buffer line.
//!
//! Decoration boundaries are pulled from the [`TextDecorationLayer`] here as well and
//! attached to the first unit at or after their position.

use crate::{
    buffer::{LineEnding, TextBuffer},
    coords::Point,
    decoration::{Boundary, TextDecorationLayer},
    error::{ContractViolationSnafu, Result},
    fold_index::FoldIndex,
    settings::is_whitespace,
};
use smol_str::SmolStr;
use snafu::ensure;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnitKind {
    Char(char),
    Space,
    Tab,
    Fold,
    Eol(LineEnding),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Region {
    Leading,
    Interior,
    Trailing,
}

#[derive(Debug, Clone)]
pub(crate) struct Unit {
    pub kind: UnitKind,
    pub start: Point,
    pub end: Point,
    pub region: Region,
    /// Part of the line's indentation. True for every whitespace unit of a
    /// whitespace-only line.
    pub in_indent: bool,
    /// Indices into [`LineUnits::boundaries`] that take effect before this unit.
    pub boundaries: Range<usize>,
}

impl Unit {
    fn new(kind: UnitKind, start: Point, end: Point) -> Self {
        Self {
            kind,
            start,
            end,
            region: Region::Interior,
            in_indent: false,
            boundaries: 0..0,
        }
    }

    pub fn is_whitespace(&self) -> bool {
        matches!(self.kind, UnitKind::Space | UnitKind::Tab)
    }
}

#[derive(Debug)]
pub(crate) struct LineUnits {
    pub start_row: u32,
    pub end_row: u32,
    pub units: Vec<Unit>,
    pub boundaries: Vec<Boundary>,
    /// Decoration tags already open at the start of the group.
    pub initial_tags: Vec<SmolStr>,
}

impl LineUnits {
    /// An empty buffer line not touched by any fold.
    pub fn is_blank(&self) -> bool {
        self.units.len() == 1 && matches!(self.units[0].kind, UnitKind::Eol(_))
    }

    pub fn boundaries_for(&self, unit: &Unit) -> &[Boundary] {
        &self.boundaries[unit.boundaries.clone()]
    }
}

/// Whitespace extents of one buffer line, in UTF-16 columns.
#[derive(Debug, Clone, Copy)]
struct LineShape {
    len: u32,
    first_non_ws: u32,
    last_non_ws_end: u32,
}

impl LineShape {
    fn new(line: &str) -> Self {
        let mut len = 0;
        let mut first_non_ws = None;
        let mut last_non_ws_end = 0;
        for ch in line.chars() {
            let width = ch.len_utf16() as u32;
            if !is_whitespace(ch) {
                first_non_ws.get_or_insert(len);
                last_non_ws_end = len + width;
            }
            len += width;
        }
        Self {
            len,
            first_non_ws: first_non_ws.unwrap_or(len),
            last_non_ws_end,
        }
    }

    fn classify(&self, column: u32) -> (Region, bool) {
        if self.first_non_ws == self.len {
            (Region::Trailing, true)
        } else if column < self.first_non_ws {
            (Region::Leading, true)
        } else if column >= self.last_non_ws_end {
            (Region::Trailing, false)
        } else {
            (Region::Interior, false)
        }
    }
}

/// Collects the units of the fold group starting at `start_row`.
pub(crate) fn collect(
    buffer: &TextBuffer,
    folds: &FoldIndex,
    decorations: Option<&dyn TextDecorationLayer>,
    start_row: u32,
) -> Result<LineUnits> {
    let mut units = Vec::new();
    let mut position = Point::new(start_row, 0);

    let end_row = 'rows: loop {
        let line = buffer.line_for_row(position.row);
        let shape = LineShape::new(line);
        let fold = folds
            .next_merged_from(position)
            .filter(|fold| fold.start.row == position.row);

        let mut column = 0;
        for ch in line.chars() {
            let width = ch.len_utf16() as u32;
            if column < position.column {
                column += width;
                continue;
            }

            let start = Point::new(position.row, column);
            if let Some(fold) = fold.as_ref().filter(|fold| fold.start.column < column + width) {
                units.push(Unit::new(UnitKind::Fold, start, fold.end));
                position = fold.end;
                continue 'rows;
            }

            let kind = match ch {
                ' ' => UnitKind::Space,
                '\t' => UnitKind::Tab,
                _ => UnitKind::Char(ch),
            };
            let mut unit = Unit::new(kind, start, Point::new(position.row, column + width));
            if unit.is_whitespace() {
                (unit.region, unit.in_indent) = shape.classify(column);
            }
            units.push(unit);
            column += width;
        }

        let line_end = Point::new(position.row, shape.len);
        if let Some(fold) = fold {
            units.push(Unit::new(UnitKind::Fold, line_end, fold.end));
            position = fold.end;
            continue;
        }

        let ending = buffer.line_ending_for_row(position.row);
        units.push(Unit::new(UnitKind::Eol(ending), line_end, line_end));
        break position.row;
    };

    let mut line_units = LineUnits {
        start_row,
        end_row,
        units,
        boundaries: Vec::new(),
        initial_tags: Vec::new(),
    };
    if let Some(layer) = decorations {
        collect_boundaries(buffer, layer, &mut line_units)?;
    }
    Ok(line_units)
}

fn collect_boundaries(
    buffer: &TextBuffer,
    layer: &dyn TextDecorationLayer,
    line_units: &mut LineUnits,
) -> Result<()> {
    let mut iterator = layer.build_iterator();
    line_units.initial_tags = iterator.seek(Point::new(line_units.start_row, 0));

    loop {
        let position = iterator.position();
        if position.row > line_units.end_row {
            break;
        }
        let line_length = buffer.line_length_for_row(position.row);
        ensure!(
            position.column <= line_length,
            ContractViolationSnafu {
                position,
                row: position.row,
                line_length,
            }
        );
        line_units.boundaries.push(Boundary {
            position,
            close_tags: iterator.close_tags(),
            open_tags: iterator.open_tags(),
        });
        if !iterator.move_to_successor() {
            break;
        }
    }

    let mut next = 0;
    for unit in &mut line_units.units {
        let first = next;
        while line_units
            .boundaries
            .get(next)
            .is_some_and(|boundary| boundary.position <= unit.start)
        {
            next += 1;
        }
        unit.boundaries = first..next;
    }
    Ok(())
}
