//! Grouped aggregation: `SUM`, `COUNT`, `AVG` over a child stream, preserving
//! the order in which group keys first appear.

use std::collections::HashMap;

use crate::query::{Error, PlanNode};
use crate::schema::{Record, Value};

enum AggOp {
    Sum,
    Count,
    Avg,
}

impl AggOp {
    fn parse(op: &str) -> Result<AggOp, Error> {
        match op.to_ascii_lowercase().as_str() {
            "sum" => Ok(AggOp::Sum),
            "count" => Ok(AggOp::Count),
            "avg" => Ok(AggOp::Avg),
            other => Err(Error::UnknownAggregateOp(other.to_string())),
        }
    }
}

struct GroupState {
    sum: f64,
    count: usize,
}

/// Rounds to 2 decimal places, half away from zero (not banker's rounding).
fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Groups its child's records by `group_fn`, aggregating `value_fn` with
/// `op` (`"sum"`, `"count"`, or `"avg"`, case-insensitive).
///
/// The first call to [`PlanNode::next`] eagerly drains the child; an
/// unrecognized `op` is reported there, not at construction.
pub struct Aggregation {
    child: Box<dyn PlanNode>,
    group_fn: Box<dyn Fn(&Record) -> Value>,
    value_fn: Box<dyn Fn(&Record) -> Option<Value>>,
    op: String,
    output: Option<Vec<Record>>,
    index: usize,
}

impl Aggregation {
    /// Build an aggregation over `child`. `value_fn` returns `None` for a
    /// null value, which `COUNT` skips and `AVG` excludes from its divisor.
    pub fn new(
        child: Box<dyn PlanNode>,
        group_fn: Box<dyn Fn(&Record) -> Value>,
        value_fn: Box<dyn Fn(&Record) -> Option<Value>>,
        op: &str,
    ) -> Aggregation {
        Aggregation {
            child,
            group_fn,
            value_fn,
            op: op.to_string(),
            output: None,
            index: 0,
        }
    }

    fn materialize(&mut self) -> Result<(), Error> {
        if self.output.is_some() {
            return Ok(());
        }

        let op = AggOp::parse(&self.op)?;
        let mut order: Vec<Value> = Vec::new();
        let mut states: HashMap<Value, GroupState> = HashMap::new();

        loop {
            match self.child.next()? {
                Some(record) => {
                    let g = (self.group_fn)(&record);
                    let v = (self.value_fn)(&record);
                    let state = states.entry(g.clone()).or_insert_with(|| {
                        order.push(g.clone());
                        GroupState { sum: 0.0, count: 0 }
                    });
                    match op {
                        AggOp::Sum => {
                            if let Some(v) = &v {
                                state.sum += v.as_f64().unwrap_or(0.0);
                            }
                        }
                        AggOp::Count => {
                            if v.is_some() {
                                state.count += 1;
                            }
                        }
                        AggOp::Avg => {
                            if let Some(v) = &v {
                                state.sum += v.as_f64().unwrap_or(0.0);
                                state.count += 1;
                            }
                        }
                    }
                }
                None => {
                    if !self.child.has_next() {
                        break;
                    }
                }
            }
        }

        debug!("aggregation drained {} groups", order.len());

        let rows = order
            .into_iter()
            .map(|g| {
                let state = &states[&g];
                let out = match op {
                    AggOp::Sum => Value::float(state.sum as f32),
                    AggOp::Count => Value::Int32(state.count as i32),
                    AggOp::Avg => {
                        let mean = if state.count == 0 { 0.0 } else { state.sum / state.count as f64 };
                        Value::float(round2(mean) as f32)
                    }
                };
                vec![g, out]
            })
            .collect();

        self.output = Some(rows);
        Ok(())
    }
}

impl PlanNode for Aggregation {
    fn next(&mut self) -> Result<Option<Record>, Error> {
        self.materialize()?;
        let output = self.output.as_ref().expect("materialized above");
        if self.index >= output.len() {
            return Ok(None);
        }
        let record = output[self.index].clone();
        self.index += 1;
        Ok(Some(record))
    }

    fn has_next(&self) -> bool {
        match &self.output {
            Some(output) => self.index < output.len(),
            None => true,
        }
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.output = None;
        self.index = 0;
        self.child.reset()
    }
}
