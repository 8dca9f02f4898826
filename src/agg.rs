//! Aggregation engine: single-pass accumulators behind a registration
//! table, consuming group-annotated records.
//!
//! Each aggregation is a `collect`/`finalize` pair. Built-ins cover the
//! usual reductions plus conditional forms (`count_if`, `sum_if`,
//! `avg_if`); callers can register custom accumulators under new names.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{JaError, Result};
use crate::expr::{split_assignment, split_top_level, truthy, CompiledExpr};
use crate::group::{read_groups, strip_group_metadata, GroupEntry};
use crate::value::{canonical_key, compare_values, tuple_key, Record};

/// A single-pass aggregation state machine.
pub trait Accumulator {
    /// Feed one row's value; `None` is absent.
    fn collect(&mut self, value: Option<&Value>);
    /// Produce the aggregate; `None` serializes as an omitted key.
    fn finalize(self: Box<Self>) -> Option<Value>;
}

type Factory = Box<dyn Fn() -> Box<dyn Accumulator>>;

/// Knobs for the built-in accumulators.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggOptions {
    /// `sum` over an empty or all-absent group yields 0 instead of absent.
    pub sum_empty_is_zero: bool,
}

/// Registration table `name → factory`. New aggregations plug in at
/// runtime without touching the dispatcher.
pub struct AggRegistry {
    factories: HashMap<String, Factory>,
}

impl AggRegistry {
    pub fn with_builtins(options: AggOptions) -> Self {
        let mut registry = AggRegistry {
            factories: HashMap::new(),
        };
        registry.register("count", || Box::new(Count { n: 0 }));
        registry.register("sum", move || {
            Box::new(Sum {
                int_total: 0,
                float_total: 0.0,
                all_int: true,
                seen: false,
                empty_is_zero: options.sum_empty_is_zero,
            })
        });
        registry.register("avg", || Box::new(Avg { total: 0.0, n: 0 }));
        registry.register("min", || Box::new(Extremum { best: None, want_max: false }));
        registry.register("max", || Box::new(Extremum { best: None, want_max: true }));
        registry.register("list", || Box::new(List { items: Vec::new() }));
        registry.register("first", || Box::new(First { slot: None }));
        registry.register("last", || Box::new(Last { slot: None }));
        registry.register("unique", || {
            Box::new(Unique {
                items: Vec::new(),
                seen: std::collections::HashSet::new(),
            })
        });
        registry.register("median", || Box::new(Median { values: Vec::new() }));
        registry.register("mode", || {
            Box::new(Mode {
                counts: HashMap::new(),
                order: Vec::new(),
            })
        });
        registry.register("std", || Box::new(Std { n: 0, mean: 0.0, m2: 0.0 }));
        registry.register("concat", || Box::new(Concat { parts: Vec::new() }));
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        factory: impl Fn() -> Box<dyn Accumulator> + 'static,
    ) {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn Accumulator>> {
        self.factories
            .get(name)
            .map(|f| f())
            .ok_or_else(|| JaError::pipeline(format!("unknown aggregation '{name}'")))
    }
}

impl Default for AggRegistry {
    fn default() -> Self {
        AggRegistry::with_builtins(AggOptions::default())
    }
}

/// One requested aggregation: output name plus what to run.
#[derive(Debug)]
pub struct AggSpec {
    pub name: String,
    pub call: AggCall,
}

#[derive(Debug)]
pub enum AggCall {
    /// `fn` or `fn(expr)`; the argument is a full filter-language
    /// expression, so `sum(amount * quantity)` works.
    Simple {
        func: String,
        arg: Option<CompiledExpr>,
    },
    /// `count_if(cond)`
    CountIf { cond: CompiledExpr },
    /// `sum_if(expr, cond)`
    SumIf {
        value: CompiledExpr,
        cond: CompiledExpr,
    },
    /// `avg_if(expr, cond)`
    AvgIf {
        value: CompiledExpr,
        cond: CompiledExpr,
    },
}

/// Parse an aggregation spec list: `count, total=sum(amount), names=list(name)`.
pub fn parse_agg_spec(text: &str) -> Result<Vec<AggSpec>> {
    let mut specs = Vec::new();
    for part in split_top_level(text, ',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, body) = match split_assignment(part) {
            Some((name, body)) => (Some(name.trim().to_string()), body.trim()),
            None => (None, part),
        };
        let (func, arg_text) = match body.find('(') {
            Some(open) if body.ends_with(')') => {
                (body[..open].trim(), Some(body[open + 1..body.len() - 1].trim()))
            }
            _ => (body, None),
        };

        let call = match func {
            "count_if" => {
                let cond = arg_text
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| JaError::Usage("count_if needs a condition".into()))?;
                AggCall::CountIf {
                    cond: CompiledExpr::compile(cond)?,
                }
            }
            "sum_if" | "avg_if" => {
                let args = arg_text
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| JaError::Usage(format!("{func} needs (expr, condition)")))?;
                let pieces = split_top_level(args, ',');
                if pieces.len() != 2 {
                    return Err(JaError::Usage(format!("{func} needs (expr, condition)")));
                }
                let value = CompiledExpr::compile(pieces[0].trim())?;
                let cond = CompiledExpr::compile(pieces[1].trim())?;
                if func == "sum_if" {
                    AggCall::SumIf { value, cond }
                } else {
                    AggCall::AvgIf { value, cond }
                }
            }
            _ => {
                let arg = match arg_text.filter(|a| !a.is_empty()) {
                    Some(a) => Some(CompiledExpr::compile(a)?),
                    None => None,
                };
                if func != "count" && arg.is_none() {
                    return Err(JaError::Usage(format!("{func} needs an argument")));
                }
                AggCall::Simple {
                    func: func.to_string(),
                    arg,
                }
            }
        };

        let name = name.unwrap_or_else(|| default_output_name(func, arg_text));
        if specs.iter().any(|s: &AggSpec| s.name == name) {
            return Err(JaError::pipeline(format!("duplicate aggregation output '{name}'")));
        }
        specs.push(AggSpec { name, call });
    }
    if specs.is_empty() {
        return Err(JaError::Usage("empty aggregation spec".into()));
    }
    Ok(specs)
}

fn default_output_name(func: &str, arg: Option<&str>) -> String {
    match arg.filter(|a| !a.is_empty()) {
        Some(arg) => {
            let slug: String = arg
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { '_' })
                .collect();
            format!("{func}_{slug}")
        }
        None => func.to_string(),
    }
}

/// Collapse group-annotated records to one output record per innermost
/// group. Records without metadata form a single whole-input group.
/// `empty_as_single_group` controls the empty-input boundary: a bare `agg`
/// invocation emits one record of zero-counts, while grouped input that
/// produced no records emits nothing.
pub fn aggregate(
    records: Vec<Record>,
    specs: &[AggSpec],
    registry: &AggRegistry,
    empty_as_single_group: bool,
) -> Result<Vec<Record>> {
    if records.is_empty() {
        if !empty_as_single_group {
            return Ok(Vec::new());
        }
        let mut out = Record::new();
        apply_specs(&[], specs, registry, &mut out)?;
        return Ok(vec![out]);
    }

    // Bucket by the full hierarchy, validating that every record carries
    // the same grouping field sequence.
    let mut buckets: HashMap<Vec<u8>, (Vec<GroupEntry>, Vec<Record>)> = HashMap::new();
    let mut order: Vec<Vec<u8>> = Vec::new();
    let mut reference_fields: Option<Vec<String>> = None;

    for mut record in records {
        let groups = read_groups(&record)?;
        let fields: Vec<String> = groups.iter().map(|g| g.field.clone()).collect();
        match &reference_fields {
            None => reference_fields = Some(fields),
            Some(reference) if *reference == fields => {}
            Some(reference) => {
                return Err(JaError::pipeline(format!(
                    "inconsistent group metadata: expected fields {reference:?}, found {fields:?}"
                )))
            }
        }

        let mut bucket_key = Vec::new();
        for entry in &groups {
            bucket_key.extend_from_slice(&tuple_key(&[Some(&Value::String(entry.field.clone()))]));
            bucket_key.extend_from_slice(&tuple_key(&[Some(&entry.value)]));
        }

        strip_group_metadata(&mut record);
        match buckets.get_mut(&bucket_key) {
            Some((_, rows)) => rows.push(record),
            None => {
                order.push(bucket_key.clone());
                buckets.insert(bucket_key, (groups, vec![record]));
            }
        }
    }

    let mut out = Vec::new();
    for bucket_key in order {
        let (groups, rows) = buckets.remove(&bucket_key).unwrap();
        let mut result = Record::new();
        // Grouping fields come back as top-level keys, dotted spelling
        // verbatim.
        for entry in &groups {
            result.insert(entry.field.clone(), entry.value.clone());
        }
        apply_specs(&rows, specs, registry, &mut result)?;
        out.push(result);
    }
    Ok(out)
}

fn apply_specs(
    rows: &[Record],
    specs: &[AggSpec],
    registry: &AggRegistry,
    out: &mut Record,
) -> Result<()> {
    for spec in specs {
        let value = run_spec(rows, &spec.call, registry)?;
        if let Some(value) = value {
            out.insert(spec.name.clone(), value);
        }
    }
    Ok(())
}

fn run_spec(rows: &[Record], call: &AggCall, registry: &AggRegistry) -> Result<Option<Value>> {
    match call {
        AggCall::Simple { func, arg } => {
            let mut acc = registry.create(func)?;
            for row in rows {
                match arg {
                    // Zero-arg aggregations see a presence marker per row.
                    None => acc.collect(Some(&Value::Bool(true))),
                    Some(expr) => {
                        let value = evaluate_lenient(expr, row);
                        acc.collect(value.as_ref());
                    }
                }
            }
            Ok(acc.finalize())
        }
        AggCall::CountIf { cond } => {
            let mut acc = registry.create("count")?;
            for row in rows {
                if condition_holds(cond, row) {
                    acc.collect(Some(&Value::Bool(true)));
                }
            }
            Ok(acc.finalize())
        }
        AggCall::SumIf { value, cond } => {
            conditional(rows, value, cond, registry.create("sum")?)
        }
        AggCall::AvgIf { value, cond } => {
            conditional(rows, value, cond, registry.create("avg")?)
        }
    }
}

fn conditional(
    rows: &[Record],
    value: &CompiledExpr,
    cond: &CompiledExpr,
    mut acc: Box<dyn Accumulator>,
) -> Result<Option<Value>> {
    for row in rows {
        if condition_holds(cond, row) {
            let v = evaluate_lenient(value, row);
            acc.collect(v.as_ref());
        }
    }
    Ok(acc.finalize())
}

// Aggregation arguments ignore per-row evaluation failures: a row whose
// expression cannot be computed contributes nothing, same as absent.
fn evaluate_lenient(expr: &CompiledExpr, row: &Record) -> Option<Value> {
    expr.evaluate(row).ok().flatten()
}

fn condition_holds(cond: &CompiledExpr, row: &Record) -> bool {
    cond.evaluate(row)
        .map(|v| truthy(v.as_ref()))
        .unwrap_or(false)
}

fn numeric(value: &Value) -> Option<f64> {
    value.as_f64()
}

// ---------------------------------------------------------------------------
// Built-in accumulators

struct Count {
    n: i64,
}

impl Accumulator for Count {
    fn collect(&mut self, value: Option<&Value>) {
        if value.is_some() {
            self.n += 1;
        }
    }

    fn finalize(self: Box<Self>) -> Option<Value> {
        Some(Value::from(self.n))
    }
}

struct Sum {
    int_total: i64,
    float_total: f64,
    all_int: bool,
    seen: bool,
    empty_is_zero: bool,
}

impl Accumulator for Sum {
    fn collect(&mut self, value: Option<&Value>) {
        let number = match value.map(|v| (v.as_i64(), numeric(v))) {
            Some((int, float)) => (int, float),
            None => return,
        };
        match number {
            (Some(i), _) if self.all_int => match self.int_total.checked_add(i) {
                Some(total) => {
                    self.int_total = total;
                    self.seen = true;
                }
                None => {
                    self.float_total = self.int_total as f64 + i as f64;
                    self.all_int = false;
                    self.seen = true;
                }
            },
            (_, Some(f)) => {
                if self.all_int {
                    self.float_total = self.int_total as f64;
                    self.all_int = false;
                }
                self.float_total += f;
                self.seen = true;
            }
            _ => {}
        }
    }

    fn finalize(self: Box<Self>) -> Option<Value> {
        if !self.seen {
            return self.empty_is_zero.then(|| Value::from(0));
        }
        if self.all_int {
            Some(Value::from(self.int_total))
        } else {
            Some(Value::from(self.float_total))
        }
    }
}

struct Avg {
    total: f64,
    n: usize,
}

impl Accumulator for Avg {
    fn collect(&mut self, value: Option<&Value>) {
        if let Some(f) = value.and_then(numeric) {
            self.total += f;
            self.n += 1;
        }
    }

    fn finalize(self: Box<Self>) -> Option<Value> {
        (self.n > 0).then(|| Value::from(self.total / self.n as f64))
    }
}

struct Extremum {
    best: Option<Value>,
    want_max: bool,
}

impl Accumulator for Extremum {
    fn collect(&mut self, value: Option<&Value>) {
        // Numeric aggregation: anything that is not a number is ignored,
        // same as sum/avg.
        let value = match value {
            Some(v) if numeric(v).is_some() => v,
            _ => return,
        };
        let replace = match &self.best {
            None => true,
            Some(best) => {
                let ord = compare_values(value, best);
                if self.want_max {
                    ord.is_gt()
                } else {
                    ord.is_lt()
                }
            }
        };
        if replace {
            self.best = Some(value.clone());
        }
    }

    fn finalize(self: Box<Self>) -> Option<Value> {
        self.best
    }
}

struct List {
    items: Vec<Value>,
}

impl Accumulator for List {
    fn collect(&mut self, value: Option<&Value>) {
        if let Some(v) = value {
            self.items.push(v.clone());
        }
    }

    fn finalize(self: Box<Self>) -> Option<Value> {
        Some(Value::Array(self.items))
    }
}

struct First {
    slot: Option<Option<Value>>,
}

impl Accumulator for First {
    fn collect(&mut self, value: Option<&Value>) {
        if self.slot.is_none() {
            self.slot = Some(value.cloned());
        }
    }

    fn finalize(self: Box<Self>) -> Option<Value> {
        self.slot.flatten()
    }
}

struct Last {
    slot: Option<Option<Value>>,
}

impl Accumulator for Last {
    fn collect(&mut self, value: Option<&Value>) {
        self.slot = Some(value.cloned());
    }

    fn finalize(self: Box<Self>) -> Option<Value> {
        self.slot.flatten()
    }
}

struct Unique {
    items: Vec<Value>,
    seen: std::collections::HashSet<Vec<u8>>,
}

impl Accumulator for Unique {
    fn collect(&mut self, value: Option<&Value>) {
        if let Some(v) = value {
            if self.seen.insert(canonical_key(v)) {
                self.items.push(v.clone());
            }
        }
    }

    fn finalize(self: Box<Self>) -> Option<Value> {
        Some(Value::Array(self.items))
    }
}

struct Median {
    values: Vec<f64>,
}

impl Accumulator for Median {
    fn collect(&mut self, value: Option<&Value>) {
        if let Some(f) = value.and_then(numeric) {
            self.values.push(f);
        }
    }

    fn finalize(mut self: Box<Self>) -> Option<Value> {
        if self.values.is_empty() {
            return None;
        }
        self.values
            .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = self.values.len() / 2;
        let median = if self.values.len() % 2 == 1 {
            self.values[mid]
        } else {
            (self.values[mid - 1] + self.values[mid]) / 2.0
        };
        Some(Value::from(median))
    }
}

struct Mode {
    counts: HashMap<Vec<u8>, usize>,
    order: Vec<(Vec<u8>, Value)>,
}

impl Accumulator for Mode {
    fn collect(&mut self, value: Option<&Value>) {
        if let Some(v) = value {
            let key = canonical_key(v);
            let count = self.counts.entry(key.clone()).or_insert(0);
            if *count == 0 {
                self.order.push((key, v.clone()));
            }
            *count += 1;
        }
    }

    fn finalize(self: Box<Self>) -> Option<Value> {
        // First-seen value wins ties.
        let mut best: Option<(usize, &Value)> = None;
        for (key, value) in &self.order {
            let count = self.counts[key];
            if best.map_or(true, |(n, _)| count > n) {
                best = Some((count, value));
            }
        }
        best.map(|(_, v)| v.clone())
    }
}

struct Std {
    n: usize,
    mean: f64,
    m2: f64,
}

impl Accumulator for Std {
    fn collect(&mut self, value: Option<&Value>) {
        if let Some(f) = value.and_then(numeric) {
            // Welford's online update.
            self.n += 1;
            let delta = f - self.mean;
            self.mean += delta / self.n as f64;
            self.m2 += delta * (f - self.mean);
        }
    }

    fn finalize(self: Box<Self>) -> Option<Value> {
        (self.n > 0).then(|| Value::from((self.m2 / self.n as f64).sqrt()))
    }
}

struct Concat {
    parts: Vec<String>,
}

impl Accumulator for Concat {
    fn collect(&mut self, value: Option<&Value>) {
        match value {
            Some(Value::String(s)) => self.parts.push(s.clone()),
            Some(Value::Null) | None => {}
            Some(other) => self.parts.push(other.to_string()),
        }
    }

    fn finalize(self: Box<Self>) -> Option<Value> {
        Some(Value::from(self.parts.join(",")))
    }
}
