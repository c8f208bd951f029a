//! Single-child operators that reshape the stream of records passing
//! through them without changing its cardinality of sources.

use crate::query::{Error, PlanNode};
use crate::schema::{Record, Value};

/// Applies a pure function to every record from its child.
pub struct Projection {
    child: Box<dyn PlanNode>,
    project: Box<dyn Fn(&Record) -> Record>,
}

impl Projection {
    /// Build a projection over `child`, applying `project` to each record.
    pub fn new(child: Box<dyn PlanNode>, project: Box<dyn Fn(&Record) -> Record>) -> Projection {
        Projection { child, project }
    }
}

impl PlanNode for Projection {
    fn next(&mut self) -> Result<Option<Record>, Error> {
        match self.child.next()? {
            Some(record) => Ok(Some((self.project)(&record))),
            None => Ok(None),
        }
    }

    fn has_next(&self) -> bool {
        self.child.has_next()
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.child.reset()
    }
}

/// Yields only the records from its child for which `predicate` holds.
///
/// Rejecting a record returns `None` for that call, but [`PlanNode::has_next`]
/// still reports the child as live — the driver in [`crate::query::run`]
/// retries rather than treating the rejection as end-of-input.
pub struct Selection {
    child: Box<dyn PlanNode>,
    predicate: Box<dyn Fn(&Record) -> bool>,
}

impl Selection {
    /// Build a selection over `child`, keeping records where `predicate`
    /// returns `true`.
    pub fn new(child: Box<dyn PlanNode>, predicate: Box<dyn Fn(&Record) -> bool>) -> Selection {
        Selection { child, predicate }
    }
}

impl PlanNode for Selection {
    fn next(&mut self) -> Result<Option<Record>, Error> {
        match self.child.next()? {
            Some(record) => {
                if (self.predicate)(&record) {
                    Ok(Some(record))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    fn has_next(&self) -> bool {
        self.child.has_next()
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.child.reset()
    }
}

/// Skips the first `offset` records from its child, then yields at most `n`
/// further records, terminating early regardless of whether the child still
/// has rows.
pub struct Limit {
    child: Box<dyn PlanNode>,
    n: usize,
    offset: usize,
    skipped: usize,
    emitted: usize,
}

impl Limit {
    /// Build a limit over `child` yielding up to `n` records after skipping
    /// `offset` of them.
    pub fn new(child: Box<dyn PlanNode>, n: usize, offset: usize) -> Limit {
        Limit {
            child,
            n,
            offset,
            skipped: 0,
            emitted: 0,
        }
    }
}

impl PlanNode for Limit {
    fn next(&mut self) -> Result<Option<Record>, Error> {
        if self.emitted >= self.n {
            return Ok(None);
        }
        match self.child.next()? {
            Some(record) => {
                if self.skipped < self.offset {
                    self.skipped += 1;
                    Ok(None)
                } else {
                    self.emitted += 1;
                    Ok(Some(record))
                }
            }
            None => Ok(None),
        }
    }

    fn has_next(&self) -> bool {
        self.emitted < self.n && self.child.has_next()
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.skipped = 0;
        self.emitted = 0;
        self.child.reset()
    }
}

/// Materializes its child into memory on the first `next`, stably sorts by
/// `key`, then drains the sorted buffer.
pub struct Sort {
    child: Box<dyn PlanNode>,
    key: Box<dyn Fn(&Record) -> Value>,
    desc: bool,
    buffer: Option<Vec<Record>>,
    index: usize,
}

impl Sort {
    /// Build a sort over `child`, ordering by `key` ascending unless `desc`.
    pub fn new(child: Box<dyn PlanNode>, key: Box<dyn Fn(&Record) -> Value>, desc: bool) -> Sort {
        Sort {
            child,
            key,
            desc,
            buffer: None,
            index: 0,
        }
    }

    fn materialize(&mut self) -> Result<(), Error> {
        if self.buffer.is_some() {
            return Ok(());
        }
        let mut rows = crate::query::run(self.child.as_mut())?;
        rows.sort_by(|a, b| {
            let ordering = crate::schema::compare_values(&(self.key)(a), &(self.key)(b));
            if self.desc {
                ordering.reverse()
            } else {
                ordering
            }
        });
        self.buffer = Some(rows);
        Ok(())
    }
}

impl PlanNode for Sort {
    fn next(&mut self) -> Result<Option<Record>, Error> {
        self.materialize()?;
        let buffer = self.buffer.as_ref().expect("materialized above");
        if self.index >= buffer.len() {
            return Ok(None);
        }
        let record = buffer[self.index].clone();
        self.index += 1;
        Ok(Some(record))
    }

    fn has_next(&self) -> bool {
        match &self.buffer {
            Some(buffer) => self.index < buffer.len(),
            None => true,
        }
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.buffer = None;
        self.index = 0;
        self.child.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::run;
    use crate::query::scan::MemoryScan;

    fn birds() -> Vec<Record> {
        vec![
            vec![Value::Str("ostric1".into()), Value::float(0.0), Value::float(104.0), Value::Int32(0)],
            vec![Value::Str("emppen1".into()), Value::float(0.0), Value::float(23.0), Value::Int32(0)],
            vec![Value::Str("wanalb".into()), Value::float(0.0), Value::float(8.5), Value::Int32(0)],
        ]
    }

    #[test]
    fn projection_applies_function() {
        let mut node = Projection::new(
            Box::new(MemoryScan::new(birds())),
            Box::new(|r: &Record| vec![r[0].clone()]),
        );
        let rows = run(&mut node).unwrap();
        assert_eq!(rows[0], vec![Value::Str("ostric1".into())]);
    }

    #[test]
    fn selection_rejects_without_stalling() {
        let mut node = Selection::new(
            Box::new(MemoryScan::new(birds())),
            Box::new(|r: &Record| r[0] != Value::Str("emppen1".into())),
        );
        let rows = run(&mut node).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn limit_with_offset_skips_then_bounds() {
        let table: Vec<Record> = (0..10).map(|i| vec![Value::Int32(i)]).collect();
        let mut node = Limit::new(Box::new(MemoryScan::new(table)), 3, 5);
        let rows = run(&mut node).unwrap();
        assert_eq!(rows, vec![vec![Value::Int32(5)], vec![Value::Int32(6)], vec![Value::Int32(7)]]);
    }

    #[test]
    fn sort_is_stable_and_respects_desc() {
        let mut node = Sort::new(
            Box::new(MemoryScan::new(birds())),
            Box::new(|r: &Record| r[2].clone()),
            true,
        );
        let rows = run(&mut node).unwrap();
        assert_eq!(rows[0][0], Value::Str("ostric1".into()));
        assert_eq!(rows[1][0], Value::Str("emppen1".into()));
        assert_eq!(rows[2][0], Value::Str("wanalb".into()));
    }
}
