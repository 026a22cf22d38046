//! Coordinate types for the two spaces a [`DisplayLayer`](crate::DisplayLayer) maps between.
//!
//! Buffer positions ([`Point`]) address the raw text. Screen positions ([`DisplayPoint`])
//! address the rendered rows after folds, tab expansion and soft wraps. Keeping them as
//! distinct types stops a screen column from being passed where a buffer column is expected.
//!
//! Columns in both spaces count UTF-16 code units, so a character outside the Basic
//! Multilingual Plane occupies two columns.
//!
//! # Example
//!
//! ```text
//! Buffer (tab_length=4):     Screen:
//! Point(0, 1) = 'a'          DisplayPoint(0, 4) = 'a'
//! "\ta"                      "    a"
//! ```

/// Position in the text buffer.
///
/// A column of [`u32::MAX`] means "end of line" and is clipped against the buffer
/// before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Point {
    pub row: u32,
    pub column: u32,
}

impl Point {
    pub const ZERO: Point = Point::new(0, 0);
    pub const MAX: Point = Point::new(u32::MAX, u32::MAX);

    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }

    /// Moves by `delta`, where a delta with a nonzero row restarts the column.
    ///
    /// ```text
    /// (1, 4).traverse((0, 2)) = (1, 6)
    /// (1, 4).traverse((2, 3)) = (3, 3)
    /// ```
    pub fn traverse(self, delta: Point) -> Point {
        if delta.row == 0 {
            Point::new(self.row, self.column.saturating_add(delta.column))
        } else {
            Point::new(self.row.saturating_add(delta.row), delta.column)
        }
    }

    /// Inverse of [`traverse`](Self::traverse): the delta leading from `start` to `self`.
    ///
    /// Expects `start <= self`; an earlier `self` saturates to zero.
    pub fn traversal(self, start: Point) -> Point {
        if self.row == start.row {
            Point::new(0, self.column.saturating_sub(start.column))
        } else {
            Point::new(self.row.saturating_sub(start.row), self.column)
        }
    }
}

/// Position on screen after folds, tab expansion and soft wraps are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct DisplayPoint {
    pub row: u32,
    pub column: u32,
}

impl DisplayPoint {
    pub const ZERO: DisplayPoint = DisplayPoint::new(0, 0);

    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    pub fn traverse(self, delta: DisplayPoint) -> DisplayPoint {
        if delta.row == 0 {
            DisplayPoint::new(self.row, self.column.saturating_add(delta.column))
        } else {
            DisplayPoint::new(self.row.saturating_add(delta.row), delta.column)
        }
    }

    pub fn traversal(self, start: DisplayPoint) -> DisplayPoint {
        if self.row == start.row {
            DisplayPoint::new(0, self.column.saturating_sub(start.column))
        } else {
            DisplayPoint::new(self.row.saturating_sub(start.row), self.column)
        }
    }
}
