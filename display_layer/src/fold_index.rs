//! Fold storage for a [`DisplayLayer`](crate::DisplayLayer).
//!
//! Every call to [`FoldIndex::insert`] creates a distinct record with its own [`FoldId`],
//! so nested and overlapping folds can be destroyed independently. Rendering only ever
//! sees the *merged* view: the union of all non-empty folds, where folds that overlap or
//! touch collapse into a single range.
//!
//! ```text
//! records:  [0,1]-[1,2]   [1,1]-[2,2]   [2,1]-[3,0]
//! merged:   [0,1]-----------------------------[3,0]
//! ```
//!
//! Records and merged ranges live in two [`SumTree`]s ordered by start. Inserting or
//! removing a fold only re-merges the records under the affected union; lookups seek
//! the merged tree and never touch buffer text.

use crate::{
    buffer::BufferEdit,
    coords::Point,
    error::{DanglingReferenceSnafu, Result},
};
use std::{cmp::Ordering, fmt, ops::Range};
use sum_tree::{self, Bias, SumTree};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FoldId(pub u64);

impl fmt::Display for FoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single fold record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub id: FoldId,
    pub range: Range<Point>,
}

impl Fold {
    pub fn is_empty(&self) -> bool {
        self.range.start == self.range.end
    }
}

/// Key of the last record in a subtree, plus the record count.
#[derive(Debug, Clone)]
pub struct FoldSummary {
    start: Point,
    id: FoldId,
    count: usize,
}

impl sum_tree::ContextLessSummary for FoldSummary {
    fn zero() -> Self {
        Self {
            start: Point::ZERO,
            id: FoldId(0),
            count: 0,
        }
    }

    fn add_summary(&mut self, other: &Self) {
        self.start = other.start;
        self.id = other.id;
        self.count += other.count;
    }
}

impl sum_tree::Item for Fold {
    type Summary = FoldSummary;

    fn summary(&self, _: ()) -> Self::Summary {
        FoldSummary {
            start: self.range.start,
            id: self.id,
            count: 1,
        }
    }
}

/// Cursor position over records: the `(start, id)` key of the last record passed.
#[derive(Debug, Clone, Copy)]
struct FoldKey {
    start: Point,
    id: FoldId,
}

impl<'a> sum_tree::Dimension<'a, FoldSummary> for FoldKey {
    fn zero(_: ()) -> Self {
        Self {
            start: Point::ZERO,
            id: FoldId(0),
        }
    }

    fn add_summary(&mut self, summary: &'a FoldSummary, _: ()) {
        self.start = summary.start;
        self.id = summary.id;
    }
}

impl<'a> sum_tree::SeekTarget<'a, FoldSummary, FoldKey> for FoldKey {
    fn cmp(&self, cursor_location: &FoldKey, _: ()) -> Ordering {
        (self.start, self.id).cmp(&(cursor_location.start, cursor_location.id))
    }
}

/// Seeks to the first record starting at or after a point.
struct RecordsFrom(Point);

impl<'a> sum_tree::SeekTarget<'a, FoldSummary, FoldKey> for RecordsFrom {
    fn cmp(&self, cursor_location: &FoldKey, _: ()) -> Ordering {
        self.0.cmp(&cursor_location.start)
    }
}

/// One union of overlapping or touching folds.
#[derive(Debug, Clone)]
struct MergedFold(Range<Point>);

/// The last union in a subtree. Unions are disjoint, so it also ends the furthest.
#[derive(Debug, Clone)]
pub(crate) struct MergedSummary {
    last: Option<Range<Point>>,
}

impl sum_tree::ContextLessSummary for MergedSummary {
    fn zero() -> Self {
        Self { last: None }
    }

    fn add_summary(&mut self, other: &Self) {
        if other.last.is_some() {
            self.last.clone_from(&other.last);
        }
    }
}

impl sum_tree::Item for MergedFold {
    type Summary = MergedSummary;

    fn summary(&self, _: ()) -> Self::Summary {
        MergedSummary {
            last: Some(self.0.clone()),
        }
    }
}

/// Cursor position over unions: the last union passed.
#[derive(Debug, Clone, Default)]
struct PrecedingMerged(Option<Range<Point>>);

impl<'a> sum_tree::Dimension<'a, MergedSummary> for PrecedingMerged {
    fn zero(_: ()) -> Self {
        Self(None)
    }

    fn add_summary(&mut self, summary: &'a MergedSummary, _: ()) {
        if summary.last.is_some() {
            self.0.clone_from(&summary.last);
        }
    }
}

/// Passes every union starting before a point.
struct MergedStart(Point);

impl<'a> sum_tree::SeekTarget<'a, MergedSummary, PrecedingMerged> for MergedStart {
    fn cmp(&self, cursor_location: &PrecedingMerged, _: ()) -> Ordering {
        match &cursor_location.0 {
            Some(range) => self.0.cmp(&range.start),
            None => Ordering::Greater,
        }
    }
}

/// Passes every union starting on an earlier row.
struct MergedStartRow(u32);

impl<'a> sum_tree::SeekTarget<'a, MergedSummary, PrecedingMerged> for MergedStartRow {
    fn cmp(&self, cursor_location: &PrecedingMerged, _: ()) -> Ordering {
        match &cursor_location.0 {
            Some(range) => self.0.cmp(&range.start.row),
            None => Ordering::Greater,
        }
    }
}

/// Passes every union ending strictly before a point.
struct MergedEnd(Point);

impl<'a> sum_tree::SeekTarget<'a, MergedSummary, PrecedingMerged> for MergedEnd {
    fn cmp(&self, cursor_location: &PrecedingMerged, _: ()) -> Ordering {
        match &cursor_location.0 {
            Some(range) => self.0.cmp(&range.end),
            None => Ordering::Greater,
        }
    }
}

#[derive(Clone)]
pub struct FoldIndex {
    /// Ordered by `(range.start, id)`.
    folds: SumTree<Fold>,
    merged: SumTree<MergedFold>,
    next_id: u64,
}

impl Default for FoldIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FoldIndex {
    pub fn new() -> Self {
        Self {
            folds: SumTree::new(()),
            merged: SumTree::new(()),
            next_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.folds.summary().count
    }

    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }

    /// Adds a fold over `range`. The caller clips the range to the buffer.
    pub fn insert(&mut self, range: Range<Point>) -> FoldId {
        let range = range.start.min(range.end)..range.start.max(range.end);
        let id = FoldId(self.next_id);
        self.next_id += 1;
        debug!("FoldIndex.insert: fold {id} over {range:?}");

        let key = FoldKey {
            start: range.start,
            id,
        };
        let mut cursor = self.folds.cursor::<FoldKey>(());
        let mut folds = cursor.slice(&key, Bias::Left);
        folds.push(
            Fold {
                id,
                range: range.clone(),
            },
            (),
        );
        folds.append(cursor.suffix(), ());
        drop(cursor);
        self.folds = folds;

        self.remerge(range);
        id
    }

    pub fn remove(&mut self, id: FoldId) -> Result<Range<Point>> {
        let Some(range) = self.iter().find(|fold| fold.id == id).map(|fold| fold.range) else {
            return DanglingReferenceSnafu { id }.fail();
        };
        debug!("FoldIndex.remove: fold {id} over {range:?}");

        let key = FoldKey {
            start: range.start,
            id,
        };
        let mut cursor = self.folds.cursor::<FoldKey>(());
        let mut folds = cursor.slice(&key, Bias::Left);
        cursor.next();
        folds.append(cursor.suffix(), ());
        drop(cursor);
        self.folds = folds;

        self.remerge(range.clone());
        Ok(range)
    }

    /// Removes every fold intersecting `range`, touching endpoints included.
    pub fn remove_intersecting(&mut self, range: Range<Point>) -> Vec<Fold> {
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .iter()
            .partition(|fold| intersects(&fold.range, &range));
        if !removed.is_empty() {
            self.rebuild(kept);
        }
        removed
    }

    pub fn clear(&mut self) -> Vec<Fold> {
        let removed = self.iter().collect();
        self.folds = SumTree::new(());
        self.merged = SumTree::new(());
        removed
    }

    /// Folds intersecting `range`, touching endpoints included, in buffer order.
    pub fn intersecting(&self, range: Range<Point>) -> Vec<Fold> {
        self.iter()
            .take_while(|fold| fold.range.start <= range.end)
            .filter(|fold| intersects(&fold.range, &range))
            .collect()
    }

    /// The merged fold strictly containing `point`, if any.
    pub fn merged_containing(&self, point: Point) -> Option<Range<Point>> {
        let mut cursor = self.merged.cursor::<PrecedingMerged>(());
        cursor.seek(&MergedStart(point), Bias::Left);
        let range = cursor.start().0.clone()?;
        (point < range.end).then_some(range)
    }

    /// The first merged fold starting at or after `point`.
    pub fn next_merged_from(&self, point: Point) -> Option<Range<Point>> {
        let mut cursor = self.merged.cursor::<PrecedingMerged>(());
        cursor.seek(&MergedStart(point), Bias::Left);
        cursor.item().map(|merged| merged.0.clone())
    }

    /// First buffer row of the fold group containing `row`. Rows joined by folds render
    /// on one screen line; an unfolded row is its own group.
    pub fn group_start_row(&self, row: u32) -> u32 {
        let mut row = row;
        loop {
            let mut cursor = self.merged.cursor::<PrecedingMerged>(());
            cursor.seek(&MergedStartRow(row), Bias::Left);
            match &cursor.start().0 {
                Some(range) if range.end.row >= row => row = range.start.row,
                _ => return row,
            }
        }
    }

    /// Adjusts fold ranges for a buffer edit and returns the folds the edit destroyed.
    ///
    /// Fold starts move right and fold ends move left when the edit touches them, so text
    /// inserted at either boundary stays outside the fold.
    pub fn apply_edit(&mut self, edit: &BufferEdit) -> Vec<Fold> {
        let old_start = edit.old_range.start;
        let old_end = edit.old_range.end;
        let is_insertion = old_start == old_end;

        let mut invalidated = Vec::new();
        let mut kept = Vec::with_capacity(self.len());
        for mut fold in self.iter() {
            let (start, end) = (fold.range.start, fold.range.end);
            if end < old_start {
                kept.push(fold);
                continue;
            }
            let destroyed = (old_start < start && start < old_end)
                || (old_start < end && end < old_end)
                || (!is_insertion && old_start <= start && end <= old_end);
            if destroyed {
                invalidated.push(fold);
                continue;
            }

            let start = shift_point(start, edit, true);
            let end = shift_point(end, edit, false).max(start);
            fold.range = start..end;
            kept.push(fold);
        }
        if !invalidated.is_empty() {
            debug!(
                "FoldIndex.apply_edit: {} fold(s) destroyed by edit {:?}",
                invalidated.len(),
                edit.old_range
            );
        }
        self.rebuild(kept);
        invalidated
    }

    fn iter(&self) -> impl Iterator<Item = Fold> + '_ {
        let mut cursor = self.folds.cursor::<()>(());
        cursor.next();
        std::iter::from_fn(move || {
            let fold = cursor.item()?.clone();
            cursor.next();
            Some(fold)
        })
    }

    /// Replaces every record and recomputes all unions.
    fn rebuild(&mut self, mut folds: Vec<Fold>) {
        folds.sort_by(|a, b| a.range.start.cmp(&b.range.start).then(a.id.cmp(&b.id)));
        let merged = merge(&folds);
        self.folds = SumTree::from_iter(folds, ());
        self.merged = SumTree::from_iter(merged.into_iter().map(MergedFold), ());
    }

    /// Recomputes the unions overlapping or touching `span` from the records beneath
    /// them. The records must already reflect the change.
    fn remerge(&mut self, span: Range<Point>) {
        let mut cursor = self.merged.cursor::<PrecedingMerged>(());
        let mut merged = cursor.slice(&MergedEnd(span.start), Bias::Left);
        let (mut lo, mut hi) = (span.start, span.end);
        while let Some(item) = cursor.item() {
            if item.0.start > hi {
                break;
            }
            lo = lo.min(item.0.start);
            hi = hi.max(item.0.end);
            cursor.next();
        }
        let suffix = cursor.suffix();
        drop(cursor);

        let mut records = self.folds.cursor::<FoldKey>(());
        records.seek(&RecordsFrom(lo), Bias::Left);
        let mut covered = Vec::new();
        while let Some(fold) = records.item() {
            if fold.range.start > hi {
                break;
            }
            covered.push(fold.clone());
            records.next();
        }
        drop(records);

        merged.append(
            SumTree::from_iter(merge(&covered).into_iter().map(MergedFold), ()),
            (),
        );
        merged.append(suffix, ());
        self.merged = merged;
    }
}

/// Unions of the non-empty folds in `folds`, which are sorted by start.
fn merge(folds: &[Fold]) -> Vec<Range<Point>> {
    let mut merged: Vec<Range<Point>> = Vec::new();
    for fold in folds.iter().filter(|fold| !fold.is_empty()) {
        match merged.last_mut() {
            Some(last) if fold.range.start <= last.end => {
                last.end = last.end.max(fold.range.end);
            },
            _ => merged.push(fold.range.clone()),
        }
    }
    merged
}

fn intersects(a: &Range<Point>, b: &Range<Point>) -> bool {
    a.start <= b.end && a.end >= b.start
}

fn shift_point(point: Point, edit: &BufferEdit, is_start: bool) -> Point {
    let old = &edit.old_range;
    if point < old.start {
        point
    } else if point > old.end {
        edit.new_range.end.traverse(point.traversal(old.end))
    } else if is_start {
        edit.new_range.end
    } else {
        old.start
    }
}
