//! The storage layer: record encoding, the slotted page format, and the
//! paged database file built on top of them.

pub mod codec;
pub mod file;
pub mod page;

pub use file::{DatabaseFile, Error as FileError};
pub use page::{Error as PageError, Page};
