//! The pull-based ("volcano" model) query executor: a small set of operators
//! that each pull rows from a child, and a driver that repeatedly calls
//! `next()` on the root of an operator tree until it is exhausted.

pub mod aggregate;
pub mod insert;
pub mod join;
pub mod scan;
#[cfg(test)]
mod scenarios;
pub mod transform;

use crate::schema::Record;
use crate::storage::{FileError, PageError};

/// An error raised by a query operator while producing its next row.
#[derive(Debug)]
pub enum Error {
    /// A lower-level database file error occurred (during a [`scan::FileScan`]
    /// or [`insert::Insert`]).
    File(FileError),
    /// A page-level decode error surfaced while a [`scan::FileScan`] read a page.
    Page(PageError),
    /// An I/O error occurred reading a CSV source.
    Csv(std::io::Error),
    /// An [`aggregate::Aggregation`] was configured with an operator name other
    /// than `sum`, `count`, or `avg`.
    UnknownAggregateOp(String),
}

impl From<FileError> for Error {
    fn from(e: FileError) -> Error {
        Error::File(e)
    }
}

impl From<PageError> for Error {
    fn from(e: PageError) -> Error {
        Error::Page(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Csv(e)
    }
}

impl ::std::fmt::Display for Error {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        match self {
            Error::File(e) => write!(f, "{}", e),
            Error::Page(e) => write!(f, "{}", e),
            Error::Csv(e) => write!(f, "csv source error: {}", e),
            Error::UnknownAggregateOp(op) => write!(f, "unknown aggregate operator '{}'", op),
        }
    }
}

impl ::std::error::Error for Error {}

/// A node in a query operator tree.
///
/// Operators are wired together at construction time: a node's children are
/// passed into its `new()` and owned from then on, so a tree is always fully
/// linked once built.
pub trait PlanNode {
    /// Produce the next output row, or `None` if this call did not produce a
    /// row. `None` does not necessarily mean the operator is exhausted — a
    /// [`transform::Selection`] that rejects a row returns `None` while
    /// [`PlanNode::has_next`] may still report more input upstream; callers
    /// should retry via [`run`] rather than stopping on the first `None`.
    fn next(&mut self) -> Result<Option<Record>, Error>;

    /// Whether a future call to [`PlanNode::next`] could still produce a row.
    fn has_next(&self) -> bool;

    /// Rewind the operator (and its children) back to its initial state.
    fn reset(&mut self) -> Result<(), Error>;
}

/// The identity function on a plan tree's root, purely for call-site
/// readability when assembling a pipeline inside-out from its leaves.
pub fn q(root: Box<dyn PlanNode>) -> Box<dyn PlanNode> {
    root
}

/// Drain every row out of `node`, calling `next()` until both it and
/// [`PlanNode::has_next`] report no further output.
///
/// A `next()` call that returns `None` while `has_next()` is still `true` is
/// retried rather than treated as the end of the stream — this is what lets
/// a [`transform::Selection`] reject a row without itself having to loop.
pub fn run(node: &mut dyn PlanNode) -> Result<Vec<Record>, Error> {
    let mut rows = Vec::new();
    loop {
        match node.next()? {
            Some(record) => rows.push(record),
            None => {
                if !node.has_next() {
                    break;
                }
            }
        }
    }
    Ok(rows)
}
