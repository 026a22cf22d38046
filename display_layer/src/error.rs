use crate::{coords::Point, fold_index::FoldId};
use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// A [`DecorationIterator`](crate::DecorationIterator) reported a boundary column past
    /// the end of its line.
    #[snafu(display(
        "decoration iterator reported position {position:?} beyond the end of row {row} \
         (length {line_length})"
    ))]
    ContractViolation {
        position: Point,
        row: u32,
        line_length: u32,
    },

    #[snafu(display("no fold with id {id}"))]
    DanglingReference { id: FoldId },
}
