//! End-to-end pipeline scenarios, each built the way a caller would: nested
//! operator construction from the leaf outward, drained with [`run`].
//!
//! Merge-join many-to-many and file round-trip coverage live next to the
//! operators they exercise ([`crate::query::join`], [`crate::storage::file`]).

use crate::query::aggregate::Aggregation;
use crate::query::run;
use crate::query::scan::MemoryScan;
use crate::query::transform::{Limit, Projection, Selection, Sort};
use crate::schema::{Record, Value};

fn birds() -> Vec<Record> {
    vec![
        row("amerob", 0.077, 1),
        row("baleag", 4.74, 1),
        row("eursta", 0.082, 1),
        row("barswa", 0.019, 1),
        row("ostric1", 104.0, 0),
        row("emppen1", 23.0, 0),
        row("rufhum", 0.0034, 1),
        row("comrav", 1.2, 1),
        row("wanalb", 8.5, 0),
        row("norcar", 0.045, 1),
    ]
}

fn row(name: &str, weight: f32, endangered: i32) -> Record {
    vec![Value::Str(name.to_string()), Value::float(weight), Value::Int32(endangered)]
}

fn names(rows: &[Record]) -> Vec<&str> {
    rows.iter()
        .map(|r| match &r[0] {
            Value::Str(s) => s.as_str(),
            _ => panic!("expected a name column"),
        })
        .collect()
}

#[test]
fn projection_over_selection_preserves_scan_order() {
    let mut pipeline = Projection::new(
        Box::new(Selection::new(
            Box::new(MemoryScan::new(birds())),
            Box::new(|r: &Record| r[2] == Value::Int32(0)),
        )),
        Box::new(|r: &Record| vec![r[0].clone()]),
    );
    let rows = run(&mut pipeline).unwrap();
    assert_eq!(names(&rows), vec!["ostric1", "emppen1", "wanalb"]);
}

#[test]
fn limit_over_descending_sort_returns_heaviest_three() {
    let mut pipeline = Projection::new(
        Box::new(Limit::new(
            Box::new(Sort::new(Box::new(MemoryScan::new(birds())), Box::new(|r: &Record| r[1].clone()), true)),
            3,
            0,
        )),
        Box::new(|r: &Record| vec![r[0].clone(), r[1].clone()]),
    );
    let rows = run(&mut pipeline).unwrap();
    assert_eq!(
        rows,
        vec![
            vec![Value::Str("ostric1".into()), Value::float(104.0)],
            vec![Value::Str("emppen1".into()), Value::float(23.0)],
            vec![Value::Str("wanalb".into()), Value::float(8.5)],
        ]
    );
}

/// Extracts the `f32` payload of a `Value::Float32` cell.
fn as_f32(v: &Value) -> f32 {
    match v {
        Value::Float32(f) => f.into_inner(),
        _ => panic!("expected a float column"),
    }
}

#[test]
fn sum_aggregation_groups_by_endangered_flag() {
    let mut pipeline = Aggregation::new(
        Box::new(MemoryScan::new(birds())),
        Box::new(|r: &Record| r[2].clone()),
        Box::new(|r: &Record| Some(r[1].clone())),
        "sum",
    );
    let rows = run(&mut pipeline).unwrap();
    assert_eq!(rows[0], vec![Value::Int32(0), Value::float(135.5)]);
    assert_eq!(rows[1][0], Value::Int32(1));
    assert!((as_f32(&rows[1][1]) - 6.1664).abs() < 1e-3);
}

#[test]
fn avg_aggregation_rounds_to_two_decimals() {
    let mut pipeline = Aggregation::new(
        Box::new(MemoryScan::new(birds())),
        Box::new(|r: &Record| r[2].clone()),
        Box::new(|r: &Record| Some(r[1].clone())),
        "AVG",
    );
    let rows = run(&mut pipeline).unwrap();
    assert_eq!(rows[0], vec![Value::Int32(0), Value::float(45.17)]);
    assert_eq!(rows[1][0], Value::Int32(1));
    assert!((as_f32(&rows[1][1]) - 0.88).abs() < 1e-3);
}

#[test]
fn limit_with_offset_skips_leading_rows() {
    let mut pipeline = Projection::new(
        Box::new(Limit::new(Box::new(MemoryScan::new(birds())), 3, 5)),
        Box::new(|r: &Record| vec![r[0].clone()]),
    );
    let rows = run(&mut pipeline).unwrap();
    assert_eq!(names(&rows), vec!["emppen1", "rufhum", "comrav"]);
}
