//! Merges the row splices of one mutation into the change records delivered to
//! listeners.
//!
//! A single fold or edit can replace several runs of screen rows. Each splice is recorded
//! in coordinates that already include the earlier splices; overlapping or adjacent
//! splices are folded into one record so that replaying the records in order over the
//! previous screen lines reproduces the current ones.

use crate::{coords::DisplayPoint, display_index::RowSplice};

/// Screen rows `start..start + old_extent` were replaced by `new_extent` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayChange {
    pub start: DisplayPoint,
    pub old_extent: DisplayPoint,
    pub new_extent: DisplayPoint,
}

#[derive(Debug, Clone, Copy)]
struct Record {
    start: i64,
    old: i64,
    new: i64,
}

#[derive(Debug, Default)]
pub(crate) struct ChangeCoalescer {
    /// Sorted and disjoint, in current coordinates.
    records: Vec<Record>,
}

impl ChangeCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, splice: RowSplice) {
        let start = i64::from(splice.start);
        let old = i64::from(splice.old_count);
        let new = i64::from(splice.new_count);
        if old == 0 && new == 0 {
            return;
        }

        let first = self
            .records
            .partition_point(|record| record.start + record.new < start);
        let last = first
            + self.records[first..]
                .iter()
                .take_while(|record| record.start <= start + old)
                .count();

        let merged = if first == last {
            Record { start, old, new }
        } else {
            let touched = &self.records[first..last];
            let union_start = start.min(touched[0].start);
            let last_touched = &touched[last - first - 1];
            let union_end = (start + old).max(last_touched.start + last_touched.new);
            let union = union_end - union_start;
            let touched_new: i64 = touched.iter().map(|record| record.new).sum();
            let touched_old: i64 = touched.iter().map(|record| record.old).sum();
            Record {
                start: union_start,
                old: union - touched_new + touched_old,
                new: union - old + new,
            }
        };

        for record in &mut self.records[last..] {
            record.start += new - old;
        }
        self.records.splice(first..last, [merged]);
    }

    pub fn into_changes(self) -> Vec<DisplayChange> {
        self.records
            .into_iter()
            .filter(|record| record.old != 0 || record.new != 0)
            .map(|record| DisplayChange {
                start: DisplayPoint::new(record.start as u32, 0),
                old_extent: DisplayPoint::new(record.old as u32, 0),
                new_extent: DisplayPoint::new(record.new as u32, 0),
            })
            .collect()
    }
}
