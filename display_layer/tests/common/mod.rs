//! Helpers shared by the integration tests.

#![allow(dead_code)]

use smol_str::SmolStr;
use std::{cell::RefCell, collections::BTreeSet, ops::Range, rc::Rc};
use stoat_display_layer::{
    BufferEdit, ClipOptions, DecorationIterator, DisplayLayer, DisplayLayerSettings,
    DisplayPoint, Point, ScreenLine, TagEvent, TextBuffer, TextDecorationLayer,
};

pub fn p(row: u32, column: u32) -> Point {
    Point::new(row, column)
}

pub fn sp(row: u32, column: u32) -> DisplayPoint {
    DisplayPoint::new(row, column)
}

pub fn display_layer(text: &str, settings: DisplayLayerSettings) -> DisplayLayer {
    stoat_log::test();
    let buffer = Rc::new(RefCell::new(TextBuffer::new(text)));
    DisplayLayer::new(buffer, settings)
}

/// Replaces `range` in the layer's buffer and forwards the edit.
pub fn edit(layer: &mut DisplayLayer, range: Range<Point>, text: &str) {
    let edit = layer.buffer().borrow_mut().set_text_in_range(range, text);
    layer.buffer_did_change(&edit).unwrap();
}

/// A run of text together with the tags closed and opened right before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBoundary {
    pub text: String,
    pub close: Vec<String>,
    pub open: Vec<String>,
}

pub fn tb(text: &str, close: &[&str], open: &[&str]) -> TokenBoundary {
    TokenBoundary {
        text: text.to_string(),
        close: close.iter().map(|tag| tag.to_string()).collect(),
        open: open.iter().map(|tag| tag.to_string()).collect(),
    }
}

pub fn line_token_boundaries(line: &ScreenLine) -> Vec<TokenBoundary> {
    let units: Vec<u16> = line.line_text.encode_utf16().collect();
    let mut tokens = Vec::new();
    let mut start = 0usize;
    let mut close = Vec::new();
    let mut open = Vec::new();
    for event in &line.tags {
        match event {
            TagEvent::Close(tag) => close.push(tag.to_string()),
            TagEvent::Open(tag) => open.push(tag.to_string()),
            TagEvent::Text(len) => {
                let end = (start + *len as usize).min(units.len());
                tokens.push(TokenBoundary {
                    text: String::from_utf16_lossy(&units[start..end]),
                    close: std::mem::take(&mut close),
                    open: std::mem::take(&mut open),
                });
                start = end;
            },
        }
    }
    if !close.is_empty() || !open.is_empty() {
        tokens.push(TokenBoundary {
            text: String::new(),
            close,
            open,
        });
    }
    tokens
}

pub fn token_boundaries(layer: &mut DisplayLayer) -> Vec<Vec<TokenBoundary>> {
    layer
        .all_screen_lines()
        .unwrap()
        .iter()
        .map(line_token_boundaries)
        .collect()
}

pub fn flat_token_boundaries(layer: &mut DisplayLayer) -> Vec<TokenBoundary> {
    token_boundaries(layer).into_iter().flatten().collect()
}

/// Expected result of translating a screen position.
pub enum Translation {
    /// Round-trips to this buffer position in both directions.
    Exact(Point),
    /// Not addressable: clips to these buffer positions going backward and forward.
    Clipped(Point, Point),
}

pub fn expect_position_translations(
    layer: &mut DisplayLayer,
    cases: &[(DisplayPoint, Translation)],
) {
    for (screen, translation) in cases {
        match translation {
            Translation::Exact(buffer) => {
                assert_eq!(
                    layer.translate_screen_position(*screen, ClipOptions::default()).unwrap(),
                    *buffer,
                    "screen {screen:?} -> buffer"
                );
                assert_eq!(
                    layer.translate_buffer_position(*buffer, ClipOptions::default()).unwrap(),
                    *screen,
                    "buffer {buffer:?} -> screen"
                );
            },
            Translation::Clipped(backward, forward) => {
                for (options, expected) in [
                    (ClipOptions::backward(), backward),
                    (ClipOptions::forward(), forward),
                ] {
                    assert_eq!(
                        layer.translate_screen_position(*screen, options).unwrap(),
                        *expected,
                        "screen {screen:?} -> buffer ({:?})",
                        options.clip_direction
                    );
                    let clipped = layer.clip_screen_position(*screen, options).unwrap();
                    assert_eq!(
                        clipped,
                        layer.translate_buffer_position(*expected, options).unwrap(),
                        "clip {screen:?} ({:?})",
                        options.clip_direction
                    );
                    assert_eq!(
                        layer.clip_screen_position(clipped, options).unwrap(),
                        clipped,
                        "clip {clipped:?} again ({:?})",
                        options.clip_direction
                    );
                }
            },
        }
    }
}

/// Decorations given as `(tag, range)` pairs. Tags opening at one position are
/// reported in declaration order and closed in reverse.
pub struct TestDecorationLayer {
    decorations: RefCell<Vec<(SmolStr, Range<Point>)>>,
}

impl TestDecorationLayer {
    pub fn new(decorations: &[(&str, Range<Point>)]) -> Self {
        Self {
            decorations: RefCell::new(
                decorations
                    .iter()
                    .map(|(tag, range)| (SmolStr::new(tag), range.clone()))
                    .collect(),
            ),
        }
    }

    /// Adds a decoration. The caller reports the range to the display layer.
    pub fn add(&self, tag: &str, range: Range<Point>) {
        self.decorations.borrow_mut().push((SmolStr::new(tag), range));
    }

    /// Moves every decoration through `edit`. Endpoints inside the replaced text
    /// collapse onto the end of the new text.
    pub fn buffer_did_change(&self, edit: &BufferEdit) {
        let map = |point: Point| {
            if point < edit.old_range.start {
                point
            } else if point >= edit.old_range.end {
                edit.new_range
                    .end
                    .traverse(point.traversal(edit.old_range.end))
            } else {
                edit.new_range.end
            }
        };
        for (_, range) in self.decorations.borrow_mut().iter_mut() {
            *range = map(range.start)..map(range.end);
        }
    }

    fn boundaries_from(&self, position: Point) -> Vec<TestBoundary> {
        let decorations = self.decorations.borrow();
        let positions: BTreeSet<Point> = decorations
            .iter()
            .flat_map(|(_, range)| [range.start, range.end])
            .filter(|point| *point >= position)
            .collect();
        positions
            .into_iter()
            .map(|at| TestBoundary {
                position: at,
                close: decorations
                    .iter()
                    .rev()
                    .filter(|(_, range)| at > position && range.end == at && range.start < at)
                    .map(|(tag, _)| tag.clone())
                    .collect(),
                open: decorations
                    .iter()
                    .filter(|(_, range)| range.start == at && range.end > at)
                    .map(|(tag, _)| tag.clone())
                    .collect(),
            })
            .filter(|boundary| !boundary.close.is_empty() || !boundary.open.is_empty())
            .collect()
    }

    fn containing(&self, position: Point) -> Vec<SmolStr> {
        self.decorations
            .borrow()
            .iter()
            .filter(|(_, range)| range.start < position && position < range.end)
            .map(|(tag, _)| tag.clone())
            .collect()
    }
}

impl TextDecorationLayer for TestDecorationLayer {
    fn build_iterator(&self) -> Box<dyn DecorationIterator + '_> {
        Box::new(TestDecorationIterator {
            layer: self,
            boundaries: Vec::new(),
            ix: 0,
        })
    }
}

struct TestBoundary {
    position: Point,
    close: Vec<SmolStr>,
    open: Vec<SmolStr>,
}

struct TestDecorationIterator<'a> {
    layer: &'a TestDecorationLayer,
    boundaries: Vec<TestBoundary>,
    ix: usize,
}

impl DecorationIterator for TestDecorationIterator<'_> {
    fn open_tags(&self) -> Vec<SmolStr> {
        self.boundaries
            .get(self.ix)
            .map_or_else(Vec::new, |boundary| boundary.open.clone())
    }

    fn close_tags(&self) -> Vec<SmolStr> {
        self.boundaries
            .get(self.ix)
            .map_or_else(Vec::new, |boundary| boundary.close.clone())
    }

    fn position(&self) -> Point {
        self.boundaries
            .get(self.ix)
            .map_or(Point::MAX, |boundary| boundary.position)
    }

    fn move_to_successor(&mut self) -> bool {
        if self.ix < self.boundaries.len() {
            self.ix += 1;
        }
        self.ix < self.boundaries.len()
    }

    fn seek(&mut self, position: Point) -> Vec<SmolStr> {
        self.boundaries = self.layer.boundaries_from(position);
        self.ix = 0;
        self.layer.containing(position)
    }
}

fn without_ids(mut lines: Vec<ScreenLine>) -> Vec<ScreenLine> {
    for line in &mut lines {
        line.id = 0;
    }
    lines
}

/// Runs `mutate` and checks that replaying the reported changes over the indexed
/// screen lines from before reproduces the screen lines after.
///
/// Only indexed rows are compared, so the layer may be partially indexed. The expected
/// lines come from a fresh copy of the layer.
pub fn verify_change_event(layer: &mut DisplayLayer, mutate: impl FnOnce(&mut DisplayLayer)) {
    let before_rows = layer.indexed_screen_line_count();
    let mut replayed = without_ids(layer.copy().screen_lines(0, before_rows).unwrap());

    let changes = Rc::new(RefCell::new(Vec::new()));
    let sink = changes.clone();
    let subscription =
        layer.on_did_change_sync(move |batch| sink.borrow_mut().extend_from_slice(batch));
    mutate(layer);
    drop(subscription);

    let after_rows = layer.indexed_screen_line_count();
    let mut fresh = layer.copy();
    for change in changes.borrow().iter() {
        let start = change.start.row as usize;
        let rows = |extent: DisplayPoint| {
            let end = change.start.traverse(extent);
            end.row as usize + usize::from(end.column > 0) - start
        };
        let (old_rows, new_rows) = (rows(change.old_extent), rows(change.new_extent));
        assert!(
            start + old_rows <= replayed.len(),
            "change {change:?} past the {} replayed rows",
            replayed.len()
        );
        let replacement = fresh
            .screen_lines(start as u32, (start + new_rows) as u32)
            .unwrap();
        assert_eq!(replacement.len(), new_rows, "change {change:?} past the end");
        replayed.splice(start..start + old_rows, without_ids(replacement));
    }

    let replayed_rows = replayed.len() as u32;
    assert!(replayed_rows <= after_rows, "{replayed_rows} rows replayed, {after_rows} indexed");
    assert_eq!(replayed, without_ids(fresh.screen_lines(0, replayed_rows).unwrap()));
    assert_eq!(replayed, without_ids(layer.screen_lines(0, replayed_rows).unwrap()));
}
