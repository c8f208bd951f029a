#![deny(missing_docs)]
//! `pagedb` is a small tabular database engine: a slotted-page on-disk file
//! format paired with a pull-based ("volcano" model) query executor.
//!
//! The engine is deliberately narrow in scope. There is no SQL parser, no
//! query planner, no buffer pool, and no transaction support — callers build
//! operator trees directly and drain them with [`query::run`].

#[macro_use]
extern crate log;

pub mod query;
pub mod schema;
pub mod storage;

pub use schema::{ColumnType, Record, Schema, SchemaError, Value};
pub use storage::{DatabaseFile, FileError, Page};
