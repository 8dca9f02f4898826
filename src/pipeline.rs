//! Composable operator chains.
//!
//! A pipeline is an ordered list of tagged operator instances. Composition
//! is left-associative `then`; execution is either eager (`run`, returns a
//! vector) or lazy (`stream`, returns a pull-based iterator). Declared
//! order is preserved exactly; the composer never reorders or optimizes.

use std::collections::VecDeque;

use crate::agg::{aggregate, AggRegistry, AggSpec};
use crate::error::Result;
use crate::expr::{AdvancedQuery, CompiledExpr, ProjectionField};
use crate::ops::{
    self, difference, intersection, join, product, sort, Distinct, EvalPolicy, Explode,
    FilterRecords, JoinMode, MapRecords, Project, ProjectOptions, RecordStream, Rename,
    RenameSpec, Select, SelectAdvanced,
};
use crate::value::{Path, Record};

/// Memory class of an operator, used by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    /// O(1) records in flight.
    Streamable,
    /// Streams, but keeps state proportional to something knowable
    /// (distinct: the unique set).
    BoundedStateful,
    /// Requires a whole side of its input in memory.
    Materializing,
}

/// A self-contained operator instance. Binary operators carry their other
/// side already materialized.
pub enum Op {
    Select {
        expr: CompiledExpr,
        policy: EvalPolicy,
    },
    SelectAdvanced {
        query: AdvancedQuery,
        policy: EvalPolicy,
    },
    Project {
        fields: Vec<ProjectionField>,
        options: ProjectOptions,
        policy: EvalPolicy,
    },
    Rename(RenameSpec),
    Explode(Path),
    Distinct,
    Take(usize),
    Skip(usize),
    Map(Box<dyn Fn(Record) -> Record>),
    Filter(Box<dyn Fn(&Record) -> bool>),
    Sort {
        keys: Vec<Path>,
        descending: bool,
    },
    GroupBy(Path),
    Aggregate {
        specs: Vec<AggSpec>,
        registry: AggRegistry,
        empty_as_single_group: bool,
    },
    Join {
        right: Vec<Record>,
        on: Vec<(Path, Path)>,
        mode: JoinMode,
    },
    Union {
        other: Vec<Record>,
    },
    Intersection {
        other: Vec<Record>,
    },
    Difference {
        other: Vec<Record>,
    },
    Product {
        other: Vec<Record>,
    },
}

impl Op {
    pub fn class(&self) -> OpClass {
        match self {
            Op::Select { .. }
            | Op::SelectAdvanced { .. }
            | Op::Project { .. }
            | Op::Rename(_)
            | Op::Explode(_)
            | Op::Take(_)
            | Op::Skip(_)
            | Op::Map(_)
            | Op::Filter(_)
            | Op::Union { .. } => OpClass::Streamable,
            Op::Distinct => OpClass::BoundedStateful,
            Op::Sort { .. }
            | Op::GroupBy(_)
            | Op::Aggregate { .. }
            | Op::Join { .. }
            | Op::Intersection { .. }
            | Op::Difference { .. }
            | Op::Product { .. } => OpClass::Materializing,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Op::Select { .. } | Op::SelectAdvanced { .. } => "select",
            Op::Project { .. } => "project",
            Op::Rename(_) => "rename",
            Op::Explode(_) => "explode",
            Op::Distinct => "distinct",
            Op::Take(_) => "take",
            Op::Skip(_) => "skip",
            Op::Map(_) => "map",
            Op::Filter(_) => "filter",
            Op::Sort { .. } => "sort",
            Op::GroupBy(_) => "groupby",
            Op::Aggregate { .. } => "agg",
            Op::Join { .. } => "join",
            Op::Union { .. } => "union",
            Op::Intersection { .. } => "intersection",
            Op::Difference { .. } => "difference",
            Op::Product { .. } => "product",
        }
    }

    /// Windowing makes sense only for operators that materialize and whose
    /// per-batch results are a documented approximation. Join stays out:
    /// its windowed semantics across two sides are undefined.
    pub fn supports_windowing(&self) -> bool {
        matches!(
            self,
            Op::Sort { .. }
                | Op::GroupBy(_)
                | Op::Aggregate { .. }
                | Op::Intersection { .. }
                | Op::Difference { .. }
        )
    }

    /// Wrap a stream with this operator, lazily. Materializing operators
    /// defer their collection until first pull, so building a chain never
    /// does work.
    pub fn apply_stream<'a>(&'a self, input: RecordStream<'a>) -> RecordStream<'a> {
        match self {
            Op::Select { expr, policy } => {
                Box::new(Select::new(input, expr.clone(), *policy))
            }
            Op::SelectAdvanced { query, policy } => {
                Box::new(SelectAdvanced::new(input, query, *policy))
            }
            Op::Project {
                fields,
                options,
                policy,
            } => Box::new(Project::new(input, fields.clone(), *options, *policy)),
            Op::Rename(spec) => Box::new(Rename::new(input, spec.clone())),
            Op::Explode(path) => Box::new(Explode::new(input, path.clone())),
            Op::Distinct => Box::new(Distinct::new(input)),
            Op::Take(n) => Box::new(input.take(*n)),
            Op::Skip(n) => Box::new(input.skip(*n)),
            Op::Map(f) => Box::new(MapRecords::new(input, move |r: Record| f(r))),
            Op::Filter(p) => Box::new(FilterRecords::new(input, move |r: &Record| p(r))),
            Op::Union { other } => ops::union(input, other.clone().into_iter().map(Ok)),
            materializing => Box::new(Deferred::new(move || {
                materializing.apply_vec(ops::collect(input)?)
            })),
        }
    }

    /// Apply eagerly to a materialized batch. This is the whole operator
    /// for materializing kinds and the per-window body in windowed mode.
    pub fn apply_vec(&self, input: Vec<Record>) -> Result<Vec<Record>> {
        match self {
            Op::Sort { keys, descending } => Ok(sort(input, keys, *descending)),
            Op::GroupBy(key) => crate::group::group_by(input, key),
            Op::Aggregate {
                specs,
                registry,
                empty_as_single_group,
            } => aggregate(input, specs, registry, *empty_as_single_group),
            Op::Join { right, on, mode } => Ok(join(input, right.clone(), on, *mode)),
            Op::Intersection { other } => Ok(intersection(input, other)),
            Op::Difference { other } => Ok(difference(input, other)),
            Op::Product { other } => Ok(product(&input, other)),
            streaming => ops::collect(streaming.apply_stream(Box::new(input.into_iter().map(Ok)))),
        }
    }
}

/// Runs a thunk on first pull, then drains the resulting buffer. Early
/// termination before the first pull costs nothing.
pub struct Deferred<'a> {
    thunk: Option<Box<dyn FnOnce() -> Result<Vec<Record>> + 'a>>,
    buffered: Option<std::vec::IntoIter<Record>>,
}

impl<'a> Deferred<'a> {
    pub fn new(thunk: impl FnOnce() -> Result<Vec<Record>> + 'a) -> Self {
        Deferred {
            thunk: Some(Box::new(thunk)),
            buffered: None,
        }
    }
}

impl<'a> Iterator for Deferred<'a> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(thunk) = self.thunk.take() {
            match thunk() {
                Ok(records) => self.buffered = Some(records.into_iter()),
                Err(e) => return Some(Err(e)),
            }
        }
        self.buffered.as_mut()?.next().map(Ok)
    }
}

/// Runs one operator over fixed-size batches of its input, concatenating
/// the per-batch outputs. The result approximates the unwindowed run.
pub struct Windowed<'a> {
    input: RecordStream<'a>,
    op: &'a Op,
    size: usize,
    pending: VecDeque<Record>,
    done: bool,
}

impl<'a> Windowed<'a> {
    pub fn new(input: RecordStream<'a>, op: &'a Op, size: usize) -> Self {
        Windowed {
            input,
            op,
            size: size.max(1),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl<'a> Iterator for Windowed<'a> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            let mut batch = Vec::with_capacity(self.size);
            while batch.len() < self.size {
                match self.input.next() {
                    Some(Ok(record)) => batch.push(record),
                    Some(Err(e)) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                    None => {
                        self.done = true;
                        break;
                    }
                }
            }
            if batch.is_empty() {
                return None;
            }
            match self.op.apply_vec(batch) {
                Ok(records) => self.pending.extend(records),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// An ordered operator chain.
#[derive(Default)]
pub struct Pipeline {
    ops: Vec<Op>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline { ops: Vec::new() }
    }

    /// Append an operator. Order is significant.
    pub fn then(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Lazy execution: wrap the input stream without doing any work yet.
    pub fn stream<'a>(&'a self, input: RecordStream<'a>) -> RecordStream<'a> {
        let mut current = input;
        for op in &self.ops {
            current = op.apply_stream(current);
        }
        current
    }

    /// Eager execution over a finite relation.
    pub fn run(&self, input: Vec<Record>) -> Result<Vec<Record>> {
        let mut current = input;
        for op in &self.ops {
            current = op.apply_vec(current)?;
        }
        Ok(current)
    }
}

/// Collect a stream into fixed-size batches, for consumers that hand off
/// windows themselves.
pub fn batch<'a>(
    mut input: RecordStream<'a>,
    size: usize,
) -> impl Iterator<Item = Result<Vec<Record>>> + 'a {
    let size = size.max(1);
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        let mut chunk = Vec::with_capacity(size);
        while chunk.len() < size {
            match input.next() {
                Some(Ok(record)) => chunk.push(record),
                Some(Err(e)) => {
                    done = true;
                    return Some(Err(e));
                }
                None => {
                    done = true;
                    break;
                }
            }
        }
        if chunk.is_empty() {
            None
        } else {
            Some(Ok(chunk))
        }
    })
}

/// Undo `batch`.
pub fn flatten<'a, I>(batches: I) -> RecordStream<'a>
where
    I: Iterator<Item = Result<Vec<Record>>> + 'a,
{
    Box::new(batches.flat_map(|batch| -> Vec<Result<Record>> {
        match batch {
            Ok(records) => records.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn records(values: &[Value]) -> Vec<Record> {
        values
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn values(records: Vec<Record>) -> Vec<Value> {
        records.into_iter().map(Value::Object).collect()
    }

    #[test]
    fn test_eager_chain() {
        let pipeline = Pipeline::new()
            .then(Op::Select {
                expr: CompiledExpr::compile("a > 1").unwrap(),
                policy: EvalPolicy::Strict,
            })
            .then(Op::Sort {
                keys: vec![Path::parse("a")],
                descending: true,
            })
            .then(Op::Take(2));
        let input = records(&[
            json!({"a": 3}),
            json!({"a": 1}),
            json!({"a": 5}),
            json!({"a": 2}),
        ]);
        let out = pipeline.run(input).unwrap();
        assert_eq!(values(out), vec![json!({"a": 5}), json!({"a": 3})]);
    }

    #[test]
    fn test_lazy_chain_matches_eager() {
        let pipeline = Pipeline::new()
            .then(Op::Select {
                expr: CompiledExpr::compile("a != 2").unwrap(),
                policy: EvalPolicy::Strict,
            })
            .then(Op::Distinct);
        let input = records(&[json!({"a": 1}), json!({"a": 2}), json!({"a": 1})]);

        let eager = pipeline.run(input.clone()).unwrap();
        let lazy: Result<Vec<Record>> = pipeline
            .stream(Box::new(input.into_iter().map(Ok)))
            .collect();
        assert_eq!(eager, lazy.unwrap());
    }

    #[test]
    fn test_lazy_take_terminates_early() {
        // An infinite upstream proves nothing materializes eagerly.
        let endless = (0..).map(|i| Ok(records(&[json!({"i": i})]).remove(0)));
        let pipeline = Pipeline::new().then(Op::Take(3));
        let out: Result<Vec<Record>> = pipeline.stream(Box::new(endless)).collect();
        assert_eq!(out.unwrap().len(), 3);
    }

    #[test]
    fn test_map_and_filter_callbacks() {
        let pipeline = Pipeline::new()
            .then(Op::Map(Box::new(|mut r: Record| {
                r.insert("seen".into(), json!(true));
                r
            })))
            .then(Op::Filter(Box::new(|r: &Record| {
                r.get("keep") == Some(&json!(true))
            })));
        let input = records(&[json!({"keep": true}), json!({"keep": false})]);
        let out = pipeline.run(input).unwrap();
        assert_eq!(values(out), vec![json!({"keep": true, "seen": true})]);
    }

    #[test]
    fn test_windowed_sort_concatenates_per_window_output() {
        let input = records(&[
            json!({"v": 4}),
            json!({"v": 2}),
            json!({"v": 6}),
            json!({"v": 1}),
            json!({"v": 3}),
            json!({"v": 5}),
        ]);
        let op = Op::Sort {
            keys: vec![Path::parse("v")],
            descending: false,
        };
        let windowed = Windowed::new(Box::new(input.into_iter().map(Ok)), &op, 2);
        let out: Result<Vec<Record>> = windowed.collect();
        let got: Vec<i64> = out
            .unwrap()
            .iter()
            .map(|r| r.get("v").unwrap().as_i64().unwrap())
            .collect();
        // Per-window order, not global order.
        assert_eq!(got, vec![2, 4, 1, 6, 3, 5]);
    }

    #[test]
    fn test_windowed_groupby_aggregate_repeats_keys_across_windows() {
        let input = records(&[
            json!({"k": "a", "v": 1}),
            json!({"k": "a", "v": 2}),
            json!({"k": "a", "v": 3}),
        ]);
        let group = Op::GroupBy(Path::parse("k"));
        let grouped = Windowed::new(Box::new(input.into_iter().map(Ok)), &group, 2);
        let agg = Op::Aggregate {
            specs: crate::agg::parse_agg_spec("total=sum(v)").unwrap(),
            registry: AggRegistry::default(),
            empty_as_single_group: false,
        };
        let aggregated = Windowed::new(Box::new(grouped), &agg, 2);
        let out: Result<Vec<Record>> = aggregated.collect();
        let out = out.unwrap();
        // Same key in two windows yields two rows.
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("total"), Some(&json!(3)));
        assert_eq!(out[1].get("total"), Some(&json!(3)));
    }

    #[test]
    fn test_batch_and_flatten_round_trip() {
        let input = records(&[json!({"i": 1}), json!({"i": 2}), json!({"i": 3})]);
        let batches = batch(Box::new(input.clone().into_iter().map(Ok)), 2);
        let out: Result<Vec<Record>> = flatten(batches).collect();
        assert_eq!(out.unwrap(), input);
    }

    #[test]
    fn test_union_op_keeps_duplicates() {
        let pipeline = Pipeline::new().then(Op::Union {
            other: records(&[json!({"k": 1})]),
        });
        let out = pipeline.run(records(&[json!({"k": 1})])).unwrap();
        assert_eq!(out.len(), 2);
    }
}
