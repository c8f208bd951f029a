//! The three join strategies, each producing concatenated `(*left, *right)`
//! tuples over the same iterator contract as every other operator.

use std::collections::{HashMap, VecDeque};

use crate::query::{run, Error, PlanNode};
use crate::schema::{compare_values, Record, Value};

fn concat(left: &Record, right: &Record) -> Record {
    left.iter().cloned().chain(right.iter().cloned()).collect()
}

/// Drains the right side into a buffer of concatenations for each left
/// record, resetting the right side in between. Produces the full cartesian
/// product; predicates, if any, belong to a wrapping [`crate::query::transform::Selection`].
pub struct NestedLoopJoin {
    left: Box<dyn PlanNode>,
    right: Box<dyn PlanNode>,
    buffer: VecDeque<Record>,
    finished: bool,
}

impl NestedLoopJoin {
    /// Build a nested-loop join of `left` against `right`.
    pub fn new(left: Box<dyn PlanNode>, right: Box<dyn PlanNode>) -> NestedLoopJoin {
        NestedLoopJoin {
            left,
            right,
            buffer: VecDeque::new(),
            finished: false,
        }
    }
}

impl PlanNode for NestedLoopJoin {
    fn next(&mut self) -> Result<Option<Record>, Error> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if self.finished {
                return Ok(None);
            }
            match self.left.next()? {
                Some(left_record) => {
                    self.right.reset()?;
                    let right_rows = run(self.right.as_mut())?;
                    for right_record in &right_rows {
                        self.buffer.push_back(concat(&left_record, right_record));
                    }
                    if self.buffer.is_empty() {
                        continue;
                    }
                }
                None => {
                    if !self.left.has_next() {
                        self.finished = true;
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn has_next(&self) -> bool {
        !self.buffer.is_empty() || !self.finished
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.left.reset()?;
        self.right.reset()?;
        self.buffer.clear();
        self.finished = false;
        Ok(())
    }
}

/// Builds a hash table from the left side keyed by `left_key`, then probes it
/// with each right record. Memory use is proportional to `|left|`; callers
/// should pass the smaller side as `left`.
pub struct HashJoin {
    left: Box<dyn PlanNode>,
    right: Box<dyn PlanNode>,
    left_key: Box<dyn Fn(&Record) -> Value>,
    right_key: Box<dyn Fn(&Record) -> Value>,
    built: Option<HashMap<Value, Vec<Record>>>,
    buffer: VecDeque<Record>,
    finished: bool,
}

impl HashJoin {
    /// Build a hash join of `left` against `right` on the given key functions.
    pub fn new(
        left: Box<dyn PlanNode>,
        right: Box<dyn PlanNode>,
        left_key: Box<dyn Fn(&Record) -> Value>,
        right_key: Box<dyn Fn(&Record) -> Value>,
    ) -> HashJoin {
        HashJoin {
            left,
            right,
            left_key,
            right_key,
            built: None,
            buffer: VecDeque::new(),
            finished: false,
        }
    }

    fn build(&mut self) -> Result<(), Error> {
        if self.built.is_some() {
            return Ok(());
        }
        let rows = run(self.left.as_mut())?;
        let mut map: HashMap<Value, Vec<Record>> = HashMap::new();
        for record in rows {
            let key = (self.left_key)(&record);
            map.entry(key).or_insert_with(Vec::new).push(record);
        }
        debug!("hash join build phase produced {} buckets", map.len());
        self.built = Some(map);
        Ok(())
    }
}

impl PlanNode for HashJoin {
    fn next(&mut self) -> Result<Option<Record>, Error> {
        self.build()?;
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if self.finished {
                return Ok(None);
            }
            match self.right.next()? {
                Some(right_record) => {
                    let key = (self.right_key)(&right_record);
                    if let Some(bucket) = self.built.as_ref().unwrap().get(&key) {
                        for left_record in bucket {
                            self.buffer.push_back(concat(left_record, &right_record));
                        }
                    }
                    if self.buffer.is_empty() {
                        continue;
                    }
                }
                None => {
                    if !self.right.has_next() {
                        self.finished = true;
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn has_next(&self) -> bool {
        !self.buffer.is_empty() || !self.finished
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.left.reset()?;
        self.right.reset()?;
        self.built = None;
        self.buffer.clear();
        self.finished = false;
        Ok(())
    }
}

enum Step {
    Produced(Record),
    NeedRetry,
    Done,
}

/// Merges two inputs already sorted ascending by their join keys. Handles
/// one-to-many and many-to-many matches by buffering the contiguous run of
/// right rows sharing the active left key and replaying that buffer against
/// each successive left record that shares the key.
pub struct MergeJoin {
    left: Box<dyn PlanNode>,
    right: Box<dyn PlanNode>,
    left_key: Box<dyn Fn(&Record) -> Value>,
    right_key: Box<dyn Fn(&Record) -> Value>,
    l: Option<Record>,
    r: Option<Record>,
    buf: Vec<Record>,
    buf_replay: VecDeque<Record>,
    pending_prev_key: Option<Value>,
    left_done: bool,
    right_done: bool,
}

impl MergeJoin {
    /// Build a merge join of pre-sorted `left` and `right` on the given key
    /// functions.
    pub fn new(
        left: Box<dyn PlanNode>,
        right: Box<dyn PlanNode>,
        left_key: Box<dyn Fn(&Record) -> Value>,
        right_key: Box<dyn Fn(&Record) -> Value>,
    ) -> MergeJoin {
        MergeJoin {
            left,
            right,
            left_key,
            right_key,
            l: None,
            r: None,
            buf: Vec::new(),
            buf_replay: VecDeque::new(),
            pending_prev_key: None,
            left_done: false,
            right_done: false,
        }
    }

    fn step(&mut self) -> Result<Step, Error> {
        if let Some(row) = self.buf_replay.pop_front() {
            return Ok(Step::Produced(row));
        }
        if self.left_done {
            return Ok(Step::Done);
        }

        if self.l.is_none() {
            return match self.left.next()? {
                Some(record) => {
                    let new_key = (self.left_key)(&record);
                    if self.pending_prev_key.as_ref() == Some(&new_key) {
                        for r in &self.buf {
                            self.buf_replay.push_back(concat(&record, r));
                        }
                    } else {
                        self.buf.clear();
                    }
                    self.pending_prev_key = None;
                    self.l = Some(record);
                    Ok(Step::NeedRetry)
                }
                None => {
                    if self.left.has_next() {
                        return Ok(Step::NeedRetry);
                    }
                    self.left_done = true;
                    Ok(Step::Done)
                }
            };
        }

        if self.right_done {
            let l = self.l.take().unwrap();
            self.pending_prev_key = Some((self.left_key)(&l));
            return Ok(Step::NeedRetry);
        }

        if self.r.is_none() {
            match self.right.next()? {
                Some(record) => self.r = Some(record),
                None => {
                    if self.right.has_next() {
                        return Ok(Step::NeedRetry);
                    }
                    self.right_done = true;
                    return Ok(Step::NeedRetry);
                }
            }
        }

        let lk = (self.left_key)(self.l.as_ref().unwrap());
        let rk = (self.right_key)(self.r.as_ref().unwrap());

        match compare_values(&lk, &rk) {
            ::std::cmp::Ordering::Equal => {
                let l = self.l.as_ref().unwrap().clone();
                let r = self.r.as_ref().unwrap().clone();
                self.buf.push(r.clone());
                self.r = None;
                Ok(Step::Produced(concat(&l, &r)))
            }
            ::std::cmp::Ordering::Greater => {
                self.r = None;
                Ok(Step::NeedRetry)
            }
            ::std::cmp::Ordering::Less => {
                self.pending_prev_key = Some(lk);
                self.l = None;
                Ok(Step::NeedRetry)
            }
        }
    }
}

impl PlanNode for MergeJoin {
    fn next(&mut self) -> Result<Option<Record>, Error> {
        loop {
            match self.step()? {
                Step::Produced(record) => return Ok(Some(record)),
                Step::NeedRetry => continue,
                Step::Done => return Ok(None),
            }
        }
    }

    fn has_next(&self) -> bool {
        !self.left_done
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.left.reset()?;
        self.right.reset()?;
        self.l = None;
        self.r = None;
        self.buf.clear();
        self.buf_replay.clear();
        self.pending_prev_key = None;
        self.left_done = false;
        self.right_done = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::scan::MemoryScan;

    fn rows(pairs: &[(&str, i32)]) -> Vec<Record> {
        pairs
            .iter()
            .map(|(name, key)| vec![Value::Str(name.to_string()), Value::Int32(*key)])
            .collect()
    }

    #[test]
    fn nested_loop_join_produces_cartesian_product() {
        let left = rows(&[("a", 1), ("b", 2)]);
        let right = rows(&[("x", 9), ("y", 8)]);
        let mut join = NestedLoopJoin::new(Box::new(MemoryScan::new(left)), Box::new(MemoryScan::new(right)));
        let out = run(&mut join).unwrap();
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn hash_join_matches_on_key() {
        let left = rows(&[("a", 1), ("b", 2)]);
        let right = rows(&[("x", 2), ("y", 3)]);
        let mut join = HashJoin::new(
            Box::new(MemoryScan::new(left)),
            Box::new(MemoryScan::new(right)),
            Box::new(|r: &Record| r[1].clone()),
            Box::new(|r: &Record| r[1].clone()),
        );
        let out = run(&mut join).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0], vec![Value::Str("b".into()), Value::Int32(2), Value::Str("x".into()), Value::Int32(2)]);
    }

    #[test]
    fn merge_join_many_to_many() {
        let left = vec![
            vec![Value::Str("Jose".into()), Value::Int32(2)],
            vec![Value::Str("Jose Jr".into()), Value::Int32(2)],
        ];
        let right = vec![
            vec![Value::float(10.5), Value::Int32(2)],
            vec![Value::float(30.5), Value::Int32(2)],
        ];
        let mut join = MergeJoin::new(
            Box::new(MemoryScan::new(left)),
            Box::new(MemoryScan::new(right)),
            Box::new(|r: &Record| r[1].clone()),
            Box::new(|r: &Record| r[1].clone()),
        );
        let out = run(&mut join).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[0][0], Value::Str("Jose".into()));
        assert_eq!(out[1][0], Value::Str("Jose".into()));
        assert_eq!(out[2][0], Value::Str("Jose Jr".into()));
        assert_eq!(out[3][0], Value::Str("Jose Jr".into()));
    }

    #[test]
    fn merge_join_empty_side_produces_no_output() {
        let mut join = MergeJoin::new(
            Box::new(MemoryScan::new(Vec::new())),
            Box::new(MemoryScan::new(rows(&[("x", 1)]))),
            Box::new(|r: &Record| r[1].clone()),
            Box::new(|r: &Record| r[1].clone()),
        );
        assert_eq!(run(&mut join).unwrap().len(), 0);
    }

    #[test]
    fn merge_join_equivalent_to_hash_join() {
        let left = rows(&[("a", 1), ("b", 2), ("c", 2), ("d", 4)]);
        let right = rows(&[("p", 2), ("q", 2), ("r", 3)]);

        let mut hash = HashJoin::new(
            Box::new(MemoryScan::new(left.clone())),
            Box::new(MemoryScan::new(right.clone())),
            Box::new(|r: &Record| r[1].clone()),
            Box::new(|r: &Record| r[1].clone()),
        );
        let mut merge = MergeJoin::new(
            Box::new(MemoryScan::new(left)),
            Box::new(MemoryScan::new(right)),
            Box::new(|r: &Record| r[1].clone()),
            Box::new(|r: &Record| r[1].clone()),
        );

        let mut hash_out = run(&mut hash).unwrap();
        let mut merge_out = run(&mut merge).unwrap();
        hash_out.sort_by(|a, b| format!("{:?}", a).cmp(&format!("{:?}", b)));
        merge_out.sort_by(|a, b| format!("{:?}", a).cmp(&format!("{:?}", b)));
        assert_eq!(hash_out, merge_out);
    }
}
