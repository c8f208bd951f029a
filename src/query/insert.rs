//! The write-path operator: pushes records into a [`DatabaseFile`] rather
//! than pulling them from one.

use std::collections::VecDeque;

use crate::query::{Error, PlanNode};
use crate::schema::Record;
use crate::storage::DatabaseFile;

/// Pops one record per `next()` and appends it to `file`. Flushes the tail
/// page to disk once its record queue is empty. Emits no output tuples —
/// every call to [`PlanNode::next`] returns `None`; callers drain it with
/// [`crate::query::run`] purely for its side effect.
pub struct Insert {
    file: DatabaseFile,
    records: VecDeque<Record>,
}

impl Insert {
    /// Build an insert operator that writes `records` into `file`.
    pub fn new(file: DatabaseFile, records: Vec<Record>) -> Insert {
        Insert {
            file,
            records: records.into(),
        }
    }

    /// Consume the operator and hand back the underlying file, e.g. to scan
    /// what was just written.
    pub fn into_file(self) -> DatabaseFile {
        self.file
    }
}

impl PlanNode for Insert {
    fn next(&mut self) -> Result<Option<Record>, Error> {
        if let Some(record) = self.records.pop_front() {
            self.file.append(&record)?;
            if self.records.is_empty() {
                self.file.write_dirty()?;
                info!("insert flushed tail page after writing final record");
            }
        }
        Ok(None)
    }

    fn has_next(&self) -> bool {
        !self.records.is_empty()
    }

    fn reset(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
