//! Line-oriented text storage shared between a buffer owner and its display layers.
//!
//! [`TextBuffer`] keeps one entry per line along with the line's terminator, so `\n`,
//! `\r\n` and a bare `\r` survive a round trip and can be rendered as distinct
//! end-of-line invisibles. Every mutation returns a [`BufferEdit`] which the owner forwards
//! to each [`DisplayLayer`](crate::DisplayLayer) via
//! [`buffer_did_change`](crate::DisplayLayer::buffer_did_change).

use crate::coords::Point;
use std::ops::Range;

/// Terminator following a buffer line. The last line never has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum LineEnding {
    #[default]
    None,
    Lf,
    CrLf,
    Cr,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::None => "",
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
            LineEnding::Cr => "\r",
        }
    }

    /// Length in UTF-16 code units.
    pub fn len(self) -> u32 {
        self.as_str().len() as u32
    }

    pub fn is_empty(self) -> bool {
        self == LineEnding::None
    }

    pub fn has_carriage_return(self) -> bool {
        matches!(self, LineEnding::CrLf | LineEnding::Cr)
    }

    pub fn has_line_feed(self) -> bool {
        matches!(self, LineEnding::Lf | LineEnding::CrLf)
    }
}

/// Describes a buffer edit operation.
///
/// `old_range` is expressed in coordinates before the edit, `new_range` after it. Both
/// ranges share their start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferEdit {
    pub old_range: Range<Point>,
    pub new_range: Range<Point>,
    pub old_text: String,
    pub new_text: String,
}

#[derive(Debug, Clone)]
struct Line {
    text: String,
    len: u32,
    ending: LineEnding,
}

impl Line {
    fn new(text: String, ending: LineEnding) -> Self {
        let len = len_utf16(&text);
        Self { text, len, ending }
    }
}

/// Mutable text buffer addressed by [`Point`]s.
///
/// Always holds at least one (possibly empty) line.
#[derive(Debug, Clone)]
pub struct TextBuffer {
    lines: Vec<Line>,
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new("")
    }
}

impl TextBuffer {
    pub fn new(text: &str) -> Self {
        Self {
            lines: split_lines(text)
                .into_iter()
                .map(|(text, ending)| Line::new(text, ending))
                .collect(),
        }
    }

    pub fn text(&self) -> String {
        let mut text = String::new();
        for line in &self.lines {
            text.push_str(&line.text);
            text.push_str(line.ending.as_str());
        }
        text
    }

    pub fn line_count(&self) -> u32 {
        self.lines.len() as u32
    }

    pub fn last_row(&self) -> u32 {
        self.line_count().saturating_sub(1)
    }

    /// Text of `row` without its terminator; empty for rows past the end.
    pub fn line_for_row(&self, row: u32) -> &str {
        self.lines
            .get(row as usize)
            .map(|line| line.text.as_str())
            .unwrap_or("")
    }

    pub fn line_length_for_row(&self, row: u32) -> u32 {
        self.lines.get(row as usize).map_or(0, |line| line.len)
    }

    pub fn line_ending_for_row(&self, row: u32) -> LineEnding {
        self.lines
            .get(row as usize)
            .map_or(LineEnding::None, |line| line.ending)
    }

    pub fn is_row_blank(&self, row: u32) -> bool {
        self.line_length_for_row(row) == 0
    }

    pub fn max_point(&self) -> Point {
        let row = self.last_row();
        Point::new(row, self.line_length_for_row(row))
    }

    /// Clamps `point` to an existing position. Rows past the end clip to the end of the
    /// buffer; columns past the end of a line clip to the line's length.
    pub fn clip_position(&self, point: Point) -> Point {
        if point.row > self.last_row() {
            return self.max_point();
        }
        Point::new(point.row, point.column.min(self.line_length_for_row(point.row)))
    }

    /// Number of UTF-16 code units preceding `point`, line terminators included.
    pub fn character_offset_for_position(&self, point: Point) -> u64 {
        let point = self.clip_position(point);
        let preceding: u64 = self.lines[..point.row as usize]
            .iter()
            .map(|line| u64::from(line.len) + u64::from(line.ending.len()))
            .sum();
        preceding + u64::from(point.column)
    }

    pub fn text_in_range(&self, range: Range<Point>) -> String {
        let start = self.clip_position(range.start.min(range.end));
        let end = self.clip_position(range.start.max(range.end));

        let start_line = &self.lines[start.row as usize];
        if start.row == end.row {
            let from = byte_index_for_column(&start_line.text, start.column);
            let to = byte_index_for_column(&start_line.text, end.column);
            return start_line.text[from..to].to_string();
        }

        let mut text = String::new();
        text.push_str(&start_line.text[byte_index_for_column(&start_line.text, start.column)..]);
        text.push_str(start_line.ending.as_str());
        for line in &self.lines[start.row as usize + 1..end.row as usize] {
            text.push_str(&line.text);
            text.push_str(line.ending.as_str());
        }
        let end_line = &self.lines[end.row as usize];
        text.push_str(&end_line.text[..byte_index_for_column(&end_line.text, end.column)]);
        text
    }

    /// Replaces `range` with `text`, returning the edit to forward to display layers.
    pub fn set_text_in_range(&mut self, range: Range<Point>, text: &str) -> BufferEdit {
        let start = self.clip_position(range.start.min(range.end));
        let end = self.clip_position(range.start.max(range.end));
        let old_text = self.text_in_range(start..end);

        let start_line = &self.lines[start.row as usize];
        let end_line = &self.lines[end.row as usize];
        let prefix = &start_line.text[..byte_index_for_column(&start_line.text, start.column)];
        let suffix = &end_line.text[byte_index_for_column(&end_line.text, end.column)..];
        let end_ending = end_line.ending;

        let mut combined = String::with_capacity(prefix.len() + text.len() + suffix.len());
        combined.push_str(prefix);
        combined.push_str(text);
        combined.push_str(suffix);

        let mut replacement: Vec<Line> = split_lines(&combined)
            .into_iter()
            .map(|(text, ending)| Line::new(text, ending))
            .collect();
        if let Some(last) = replacement.last_mut() {
            last.ending = end_ending;
        }
        self.lines
            .splice(start.row as usize..=end.row as usize, replacement);

        BufferEdit {
            old_range: start..end,
            new_range: start..start.traverse(text_extent(text)),
            old_text,
            new_text: text.to_string(),
        }
    }

    pub fn insert(&mut self, position: Point, text: &str) -> BufferEdit {
        self.set_text_in_range(position..position, text)
    }

    pub fn delete(&mut self, range: Range<Point>) -> BufferEdit {
        self.set_text_in_range(range, "")
    }

    pub fn set_text(&mut self, text: &str) -> BufferEdit {
        let end = self.max_point();
        self.set_text_in_range(Point::ZERO..end, text)
    }
}

/// Number of UTF-16 code units in `text`.
pub(crate) fn len_utf16(text: &str) -> u32 {
    text.chars().map(|ch| ch.len_utf16() as u32).sum()
}

/// Byte index of the first character starting at or after UTF-16 `column`.
fn byte_index_for_column(line: &str, column: u32) -> usize {
    let mut units = 0;
    for (ix, ch) in line.char_indices() {
        if units >= column {
            return ix;
        }
        units += ch.len_utf16() as u32;
    }
    line.len()
}

/// Extent covered by `text` when inserted, as a row/column delta.
fn text_extent(text: &str) -> Point {
    let lines = split_lines(text);
    let rows = lines.len().saturating_sub(1) as u32;
    let column = lines.last().map_or(0, |(last, _)| len_utf16(last));
    Point::new(rows, column)
}

fn split_lines(text: &str) -> Vec<(String, LineEnding)> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\n' => lines.push((std::mem::take(&mut current), LineEnding::Lf)),
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                lines.push((std::mem::take(&mut current), LineEnding::CrLf));
            },
            '\r' => lines.push((std::mem::take(&mut current), LineEnding::Cr)),
            _ => current.push(ch),
        }
    }
    lines.push((current, LineEnding::None));
    lines
}
