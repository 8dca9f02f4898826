//! Relational operators over record streams.
//!
//! Streaming operators are pull-based iterator adapters holding O(1)
//! records; `distinct` keeps a set of seen keys; join, sort, product and
//! the set operations materialize one or both sides. Dropping the consumer
//! drops the whole chain, which closes file handles upstream.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use crate::error::{JaError, Result};
use crate::expr::{AdvancedQuery, CompiledExpr, ProjectionField, ProjectionSource};
use crate::value::{compare_values, record_key, tuple_key, Path, Record};

/// A lazy relation: records or a fatal error, pulled one at a time.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<Record>> + 'a>;

/// How per-record evaluation failures are handled. Strict aborts the
/// pipeline; lenient drops the row and counts the drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvalPolicy {
    #[default]
    Strict,
    Lenient,
}

/// Filter by a compiled filter expression.
pub struct Select<I> {
    input: I,
    expr: CompiledExpr,
    policy: EvalPolicy,
    dropped: usize,
}

impl<I> Select<I> {
    pub fn new(input: I, expr: CompiledExpr, policy: EvalPolicy) -> Self {
        Select {
            input,
            expr,
            policy,
            dropped: 0,
        }
    }

    /// Rows dropped so far under the lenient policy.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl<I: Iterator<Item = Result<Record>>> Iterator for Select<I> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.input.next()? {
                Ok(r) => r,
                Err(e) => return Some(Err(e)),
            };
            match self.expr.matches(&record) {
                Ok(true) => return Some(Ok(record)),
                Ok(false) => continue,
                Err(e) if e.is_per_record() && self.policy == EvalPolicy::Lenient => {
                    self.dropped += 1;
                    warn!(%e, "dropping row");
                    continue;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Filter by a JMESPath query (`select --jmespath`). Borrows the compiled
/// query so one compilation serves the whole stream.
pub struct SelectAdvanced<'q, I> {
    input: I,
    query: &'q AdvancedQuery,
    policy: EvalPolicy,
}

impl<'q, I> SelectAdvanced<'q, I> {
    pub fn new(input: I, query: &'q AdvancedQuery, policy: EvalPolicy) -> Self {
        SelectAdvanced {
            input,
            query,
            policy,
        }
    }
}

impl<'q, I: Iterator<Item = Result<Record>>> Iterator for SelectAdvanced<'q, I> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.input.next()? {
                Ok(r) => r,
                Err(e) => return Some(Err(e)),
            };
            match self.query.matches(&record) {
                Ok(true) => return Some(Ok(record)),
                Ok(false) => continue,
                Err(e) if e.is_per_record() && self.policy == EvalPolicy::Lenient => {
                    warn!(%e, "dropping row");
                    continue;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Output shaping for projections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectOptions {
    /// Nest dotted output names into structured records instead of
    /// spelling them as flat keys.
    pub nest: bool,
    /// Serialize absent results as `null` instead of omitting the key.
    pub nulls: bool,
}

/// Build a new record per input with exactly the requested fields.
pub struct Project<I> {
    input: I,
    fields: Vec<ProjectionField>,
    options: ProjectOptions,
    policy: EvalPolicy,
}

impl<I> Project<I> {
    pub fn new(
        input: I,
        fields: Vec<ProjectionField>,
        options: ProjectOptions,
        policy: EvalPolicy,
    ) -> Self {
        Project {
            input,
            fields,
            options,
            policy,
        }
    }
}

impl<I: Iterator<Item = Result<Record>>> Iterator for Project<I> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        'rows: loop {
            let record = match self.input.next()? {
                Ok(r) => r,
                Err(e) => return Some(Err(e)),
            };
            let mut out = Record::new();
            for field in &self.fields {
                let value = match &field.source {
                    ProjectionSource::Path(path) => Ok(path.get(&record).cloned()),
                    ProjectionSource::Computed(expr) => expr.evaluate(&record),
                };
                let value = match value {
                    Ok(v) => v,
                    Err(e) if e.is_per_record() && self.policy == EvalPolicy::Lenient => {
                        warn!(%e, "dropping row");
                        continue 'rows;
                    }
                    Err(e) => return Some(Err(e)),
                };
                match value {
                    Some(v) => {
                        if self.options.nest {
                            Path::parse(&field.name).set(&mut out, v);
                        } else {
                            out.insert(field.name.clone(), v);
                        }
                    }
                    None if self.options.nulls => {
                        if self.options.nest {
                            Path::parse(&field.name).set(&mut out, Value::Null);
                        } else {
                            out.insert(field.name.clone(), Value::Null);
                        }
                    }
                    None => {}
                }
            }
            return Some(Ok(out));
        }
    }
}

/// A validated set of `from → to` path mappings.
#[derive(Debug, Clone)]
pub struct RenameSpec {
    mappings: Vec<(Path, Path)>,
    strict: bool,
}

impl RenameSpec {
    /// Parse `old=new,old2=new2`. A source may appear at most once and two
    /// sources may not collide on the same target.
    pub fn parse(spec: &str, strict: bool) -> Result<Self> {
        let mut mappings: Vec<(Path, Path)> = Vec::new();
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (from, to) = part
                .split_once('=')
                .ok_or_else(|| JaError::Usage(format!("rename mapping '{part}' is not from=to")))?;
            let from = Path::parse(from.trim());
            let to = Path::parse(to.trim());
            if mappings.iter().any(|(f, _)| f == &from) {
                return Err(JaError::pipeline(format!(
                    "rename source '{}' appears more than once",
                    from.raw()
                )));
            }
            if mappings.iter().any(|(_, t)| t == &to) {
                return Err(JaError::pipeline(format!(
                    "rename target '{}' collides",
                    to.raw()
                )));
            }
            mappings.push((from, to));
        }
        if mappings.is_empty() {
            return Err(JaError::Usage("rename needs at least one from=to pair".into()));
        }
        Ok(RenameSpec { mappings, strict })
    }

    fn apply(&self, mut record: Record) -> Result<Record> {
        for (from, to) in &self.mappings {
            match from.take(&mut record) {
                Some(value) => to.set(&mut record, value),
                None if self.strict => {
                    return Err(JaError::pipeline(format!(
                        "rename source '{}' not present",
                        from.raw()
                    )))
                }
                None => {}
            }
        }
        Ok(record)
    }
}

pub struct Rename<I> {
    input: I,
    spec: RenameSpec,
}

impl<I> Rename<I> {
    pub fn new(input: I, spec: RenameSpec) -> Self {
        Rename { input, spec }
    }
}

impl<I: Iterator<Item = Result<Record>>> Iterator for Rename<I> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.input.next()? {
            Ok(record) => Some(self.spec.apply(record)),
            Err(e) => Some(Err(e)),
        }
    }
}

/// Unnest an array field: one output record per element. Records where the
/// path is absent or not an array pass through unchanged with a warning.
pub struct Explode<I> {
    input: I,
    path: Path,
    pending: Vec<Record>,
}

impl<I> Explode<I> {
    pub fn new(input: I, path: Path) -> Self {
        Explode {
            input,
            path,
            pending: Vec::new(),
        }
    }
}

impl<I: Iterator<Item = Result<Record>>> Iterator for Explode<I> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop() {
                return Some(Ok(record));
            }
            let record = match self.input.next()? {
                Ok(r) => r,
                Err(e) => return Some(Err(e)),
            };
            match self.path.get(&record) {
                Some(Value::Array(items)) => {
                    let items = items.clone();
                    // Stack pops from the back; push reversed to keep order.
                    for element in items.into_iter().rev() {
                        let mut expanded = record.clone();
                        self.path.set(&mut expanded, element);
                        self.pending.push(expanded);
                    }
                    if self.pending.is_empty() {
                        // Empty array explodes to nothing.
                        continue;
                    }
                }
                _ => {
                    warn!(path = self.path.raw(), "explode: not an array, passing through");
                    return Some(Ok(record));
                }
            }
        }
    }
}

/// Multiset union: plain concatenation, never deduplicates.
pub fn union<'a, A, B>(a: A, b: B) -> RecordStream<'a>
where
    A: Iterator<Item = Result<Record>> + 'a,
    B: Iterator<Item = Result<Record>> + 'a,
{
    Box::new(a.chain(b))
}

/// Drop duplicate records, keeping first-seen order. Memory is bounded by
/// the number of unique records.
pub struct Distinct<I> {
    input: I,
    seen: std::collections::HashSet<Vec<u8>>,
}

impl<I> Distinct<I> {
    pub fn new(input: I) -> Self {
        Distinct {
            input,
            seen: std::collections::HashSet::new(),
        }
    }
}

impl<I: Iterator<Item = Result<Record>>> Iterator for Distinct<I> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.input.next()? {
                Ok(r) => r,
                Err(e) => return Some(Err(e)),
            };
            if self.seen.insert(record_key(&record)) {
                return Some(Ok(record));
            }
        }
    }
}

/// Join behavior for unmatched rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinMode {
    #[default]
    Inner,
    Left,
    Right,
    Outer,
}

impl std::str::FromStr for JoinMode {
    type Err = JaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inner" => Ok(JoinMode::Inner),
            "left" => Ok(JoinMode::Left),
            "right" => Ok(JoinMode::Right),
            "outer" => Ok(JoinMode::Outer),
            other => Err(JaError::Usage(format!(
                "unknown join mode '{other}' (expected inner, left, right, or outer)"
            ))),
        }
    }
}

/// Parse `--on` pairs: `l_path=r_path,l2=r2`.
pub fn parse_join_on(spec: &str) -> Result<Vec<(Path, Path)>> {
    let mut pairs = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (l, r) = part
            .split_once('=')
            .ok_or_else(|| JaError::Usage(format!("join key '{part}' is not l_path=r_path")))?;
        pairs.push((Path::parse(l.trim()), Path::parse(r.trim())));
    }
    if pairs.is_empty() {
        return Err(JaError::Usage("join needs at least one l=r key pair".into()));
    }
    Ok(pairs)
}

/// Equi-join over dotted paths. Builds a hash index over the right side;
/// key equality follows the structural rules, so `1` joins `1.0`. Right
/// values overwrite left on key collision; the right-side join keys are
/// dropped from the merged record. Non-inner modes emit unmatched rows
/// as-is, leaving the other side's fields absent.
pub fn join(
    left: Vec<Record>,
    right: Vec<Record>,
    on: &[(Path, Path)],
    mode: JoinMode,
) -> Vec<Record> {
    let mut index: HashMap<Vec<u8>, Vec<usize>> = HashMap::new();
    for (idx, record) in right.iter().enumerate() {
        let key_values: Vec<Option<&Value>> = on.iter().map(|(_, r)| r.get(record)).collect();
        index.entry(tuple_key(&key_values)).or_default().push(idx);
    }

    let mut right_matched = vec![false; right.len()];
    let mut out = Vec::new();

    for l_record in &left {
        let key_values: Vec<Option<&Value>> = on.iter().map(|(l, _)| l.get(l_record)).collect();
        let key = tuple_key(&key_values);
        match index.get(&key) {
            Some(matches) => {
                for &r_idx in matches {
                    right_matched[r_idx] = true;
                    out.push(merge_joined(l_record, &right[r_idx], on));
                }
            }
            None => {
                if matches!(mode, JoinMode::Left | JoinMode::Outer) {
                    out.push(l_record.clone());
                }
            }
        }
    }

    if matches!(mode, JoinMode::Right | JoinMode::Outer) {
        for (idx, matched) in right_matched.iter().enumerate() {
            if !matched {
                out.push(right[idx].clone());
            }
        }
    }

    out
}

fn merge_joined(left: &Record, right: &Record, on: &[(Path, Path)]) -> Record {
    let mut merged = left.clone();
    let mut trimmed_right = right.clone();
    for (_, r_path) in on {
        r_path.take(&mut trimmed_right);
    }
    for (key, value) in trimmed_right {
        merged.insert(key, value);
    }
    merged
}

/// Multiset intersection: each record of `a` survives while `b` still has
/// an unconsumed structurally equal copy, so min(count_a, count_b) copies
/// come out, in `a`'s order.
pub fn intersection(a: Vec<Record>, b: &[Record]) -> Vec<Record> {
    let mut counts = count_records(b);
    a.into_iter()
        .filter(|record| {
            let key = record_key(record);
            match counts.get_mut(&key) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            }
        })
        .collect()
}

/// Multiset difference: max(0, count_a − count_b) copies, in `a`'s order.
pub fn difference(a: Vec<Record>, b: &[Record]) -> Vec<Record> {
    let mut counts = count_records(b);
    a.into_iter()
        .filter(|record| {
            let key = record_key(record);
            match counts.get_mut(&key) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    false
                }
                _ => true,
            }
        })
        .collect()
}

fn count_records(records: &[Record]) -> HashMap<Vec<u8>, usize> {
    let mut counts = HashMap::new();
    for record in records {
        *counts.entry(record_key(record)).or_insert(0) += 1;
    }
    counts
}

/// Cartesian product in left-major order. Colliding keys take the right
/// side's value.
pub fn product(a: &[Record], b: &[Record]) -> Vec<Record> {
    let mut out = Vec::with_capacity(a.len().saturating_mul(b.len()));
    for l_record in a {
        for r_record in b {
            let mut merged = l_record.clone();
            for (key, value) in r_record {
                merged.insert(key.clone(), value.clone());
            }
            out.push(merged);
        }
    }
    out
}

/// Stable multi-key sort. Absent sorts before everything; present values
/// follow the cross-type rank order. `descending` flips each key.
pub fn sort(mut records: Vec<Record>, keys: &[Path], descending: bool) -> Vec<Record> {
    records.sort_by(|a, b| {
        for key in keys {
            let ord = match (key.get(a), key.get(b)) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (Some(x), Some(y)) => compare_values(x, y),
            };
            let ord = if descending { ord.reverse() } else { ord };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
    records
}

/// Stream a host-language transform.
pub struct MapRecords<I, F> {
    input: I,
    f: F,
}

impl<I, F> MapRecords<I, F> {
    pub fn new(input: I, f: F) -> Self {
        MapRecords { input, f }
    }
}

impl<I, F> Iterator for MapRecords<I, F>
where
    I: Iterator<Item = Result<Record>>,
    F: FnMut(Record) -> Record,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.input.next()? {
            Ok(record) => Some(Ok((self.f)(record))),
            Err(e) => Some(Err(e)),
        }
    }
}

/// Stream a host-language predicate.
pub struct FilterRecords<I, F> {
    input: I,
    predicate: F,
}

impl<I, F> FilterRecords<I, F> {
    pub fn new(input: I, predicate: F) -> Self {
        FilterRecords { input, predicate }
    }
}

impl<I, F> Iterator for FilterRecords<I, F>
where
    I: Iterator<Item = Result<Record>>,
    F: FnMut(&Record) -> bool,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.input.next()? {
                Ok(record) => {
                    if (self.predicate)(&record) {
                        return Some(Ok(record));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Pull everything into memory. The entry point for materializing
/// operators; a fatal error surfaces here.
pub fn collect(stream: impl Iterator<Item = Result<Record>>) -> Result<Vec<Record>> {
    stream.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_projection;
    use serde_json::json;

    fn records(values: &[Value]) -> Vec<Record> {
        values
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn stream(values: Vec<Record>) -> impl Iterator<Item = Result<Record>> {
        values.into_iter().map(Ok)
    }

    fn unwrap_all(iter: impl Iterator<Item = Result<Record>>) -> Vec<Value> {
        iter.map(|r| Value::Object(r.unwrap())).collect()
    }

    #[test]
    fn test_select_then_project_scenario() {
        let input = records(&[
            json!({"a": 1, "b": "x"}),
            json!({"a": 2, "b": "y"}),
            json!({"a": 3, "b": "z"}),
        ]);
        let expr = CompiledExpr::compile("a > 1").unwrap();
        let selected = Select::new(stream(input), expr, EvalPolicy::Strict);
        let fields = parse_projection("b").unwrap();
        let projected = Project::new(
            selected,
            fields,
            ProjectOptions::default(),
            EvalPolicy::Strict,
        );
        assert_eq!(
            unwrap_all(projected),
            vec![json!({"b": "y"}), json!({"b": "z"})]
        );
    }

    #[test]
    fn test_select_preserves_order_and_duplicates() {
        let input = records(&[json!({"k": 1}), json!({"k": 1}), json!({"k": 0})]);
        let expr = CompiledExpr::compile("k == 1").unwrap();
        let out = unwrap_all(Select::new(stream(input), expr, EvalPolicy::Strict));
        assert_eq!(out, vec![json!({"k": 1}), json!({"k": 1})]);
    }

    #[test]
    fn test_select_strict_vs_lenient_on_division_by_zero() {
        let input = records(&[json!({"x": 2}), json!({"x": 0}), json!({"x": 5})]);
        let expr = CompiledExpr::compile("10 / x > 1").unwrap();

        let strict: Vec<_> =
            Select::new(stream(input.clone()), expr.clone(), EvalPolicy::Strict).collect();
        assert!(strict.iter().any(|r| r.is_err()));

        let lenient = unwrap_all(Select::new(stream(input), expr, EvalPolicy::Lenient));
        assert_eq!(lenient, vec![json!({"x": 2}), json!({"x": 5})]);
    }

    #[test]
    fn test_project_absent_omitted_null_kept() {
        let input = records(&[json!({"a": null}), json!({"b": 1})]);
        let fields = parse_projection("a").unwrap();
        let out = unwrap_all(Project::new(
            stream(input.clone()),
            fields.clone(),
            ProjectOptions::default(),
            EvalPolicy::Strict,
        ));
        assert_eq!(out, vec![json!({"a": null}), json!({})]);

        let with_nulls = unwrap_all(Project::new(
            stream(input),
            fields,
            ProjectOptions {
                nulls: true,
                ..Default::default()
            },
            EvalPolicy::Strict,
        ));
        assert_eq!(with_nulls, vec![json!({"a": null}), json!({"a": null})]);
    }

    #[test]
    fn test_project_flat_vs_nested_output() {
        let input = records(&[json!({"user": {"name": "Ada"}})]);
        let fields = parse_projection("user.name").unwrap();

        let flat = unwrap_all(Project::new(
            stream(input.clone()),
            fields.clone(),
            ProjectOptions::default(),
            EvalPolicy::Strict,
        ));
        assert_eq!(flat, vec![json!({"user.name": "Ada"})]);

        let nested = unwrap_all(Project::new(
            stream(input),
            fields,
            ProjectOptions {
                nest: true,
                ..Default::default()
            },
            EvalPolicy::Strict,
        ));
        assert_eq!(nested, vec![json!({"user": {"name": "Ada"}})]);
    }

    #[test]
    fn test_projection_determinism_on_subset() {
        let input = records(&[json!({"a": 1, "b": 2, "c": 3})]);
        let wide = parse_projection("a,b").unwrap();
        let narrow = parse_projection("b").unwrap();

        let once = unwrap_all(Project::new(
            stream(input.clone()),
            narrow.clone(),
            ProjectOptions::default(),
            EvalPolicy::Strict,
        ));
        let twice = unwrap_all(Project::new(
            Project::new(
                stream(input),
                wide,
                ProjectOptions::default(),
                EvalPolicy::Strict,
            ),
            narrow,
            ProjectOptions::default(),
            EvalPolicy::Strict,
        ));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_rename_moves_nested_paths() {
        let spec = RenameSpec::parse("u.id=user_id,loc=where", false).unwrap();
        let input = records(&[json!({"u": {"id": 7}, "loc": "NO"})]);
        let out = unwrap_all(Rename::new(stream(input), spec));
        assert_eq!(out, vec![json!({"u": {}, "user_id": 7, "where": "NO"})]);
    }

    #[test]
    fn test_rename_collisions_rejected() {
        assert!(RenameSpec::parse("a=x,a=y", false).is_err());
        assert!(RenameSpec::parse("a=x,b=x", false).is_err());
    }

    #[test]
    fn test_rename_strict_missing_source() {
        let spec = RenameSpec::parse("gone=x", true).unwrap();
        let out: Vec<_> = Rename::new(stream(records(&[json!({"a": 1})])), spec).collect();
        assert!(out[0].is_err());
    }

    #[test]
    fn test_explode_array_and_passthrough() {
        let input = records(&[
            json!({"id": 1, "tags": ["a", "b"]}),
            json!({"id": 2, "tags": "not-array"}),
            json!({"id": 3}),
            json!({"id": 4, "tags": []}),
        ]);
        let out = unwrap_all(Explode::new(stream(input), Path::parse("tags")));
        assert_eq!(
            out,
            vec![
                json!({"id": 1, "tags": "a"}),
                json!({"id": 1, "tags": "b"}),
                json!({"id": 2, "tags": "not-array"}),
                json!({"id": 3}),
            ]
        );
    }

    #[test]
    fn test_union_keeps_duplicates() {
        let a = records(&[json!({"k": 1})]);
        let b = records(&[json!({"k": 1}), json!({"k": 2})]);
        let out = unwrap_all(union(stream(a), stream(b)));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_distinct_first_seen_order_and_idempotence() {
        let input = records(&[json!({"k": "a"}), json!({"k": "b"}), json!({"k": "a"})]);
        let once = unwrap_all(Distinct::new(stream(input.clone())));
        assert_eq!(once, vec![json!({"k": "a"}), json!({"k": "b"})]);

        let twice = unwrap_all(Distinct::new(Distinct::new(stream(input))));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_distinct_unifies_int_and_float() {
        let input = records(&[json!({"k": 1}), json!({"k": 1.0})]);
        let out = unwrap_all(Distinct::new(stream(input)));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_join_on_nested_path_scenario() {
        let left = records(&[
            json!({"u": {"id": 1}, "name": "A"}),
            json!({"u": {"id": 2}, "name": "B"}),
        ]);
        let right = records(&[
            json!({"cid": 1, "x": 10}),
            json!({"cid": 1, "x": 20}),
            json!({"cid": 3, "x": 30}),
        ]);
        let on = parse_join_on("u.id=cid").unwrap();
        let out = join(left, right, &on, JoinMode::Inner);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("x"), Some(&json!(10)));
        assert_eq!(out[1].get("x"), Some(&json!(20)));
        assert_eq!(out[0].get("name"), Some(&json!("A")));
        // The right-side join key is dropped from the merged record.
        assert!(!out[0].contains_key("cid"));
    }

    #[test]
    fn test_join_modes() {
        let left = records(&[json!({"id": 1}), json!({"id": 2})]);
        let right = records(&[json!({"rid": 1, "v": "a"}), json!({"rid": 9, "v": "b"})]);
        let on = parse_join_on("id=rid").unwrap();

        assert_eq!(join(left.clone(), right.clone(), &on, JoinMode::Inner).len(), 1);

        let left_join = join(left.clone(), right.clone(), &on, JoinMode::Left);
        assert_eq!(left_join.len(), 2);
        assert!(!left_join[1].contains_key("v"));

        let right_join = join(left.clone(), right.clone(), &on, JoinMode::Right);
        assert_eq!(right_join.len(), 2);
        assert_eq!(right_join[1].get("rid"), Some(&json!(9)));

        assert_eq!(join(left, right, &on, JoinMode::Outer).len(), 3);
    }

    #[test]
    fn test_join_int_float_key_unification() {
        let left = records(&[json!({"id": 1})]);
        let right = records(&[json!({"rid": 1.0, "v": "hit"})]);
        let on = parse_join_on("id=rid").unwrap();
        let out = join(left, right, &on, JoinMode::Inner);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("v"), Some(&json!("hit")));
    }

    #[test]
    fn test_intersection_multiset_counts() {
        let a = records(&[json!({"k": 1}), json!({"k": 1}), json!({"k": 2})]);
        let b = records(&[json!({"k": 1}), json!({"k": 3})]);
        let out = intersection(a, &b);
        assert_eq!(unwrap_all(out.into_iter().map(Ok)), vec![json!({"k": 1})]);
    }

    #[test]
    fn test_difference_multiset_counts() {
        let a = records(&[json!({"k": 1}), json!({"k": 1}), json!({"k": 2})]);
        let b = records(&[json!({"k": 1})]);
        let out = difference(a, &b);
        assert_eq!(
            unwrap_all(out.into_iter().map(Ok)),
            vec![json!({"k": 1}), json!({"k": 2})]
        );
    }

    #[test]
    fn test_product_order() {
        let a = records(&[json!({"color": "red"}), json!({"color": "blue"})]);
        let b = records(&[json!({"size": "S"}), json!({"size": "L"})]);
        let out = product(&a, &b);
        assert_eq!(out.len(), 4);
        assert_eq!(
            Value::Object(out[0].clone()),
            json!({"color": "red", "size": "S"})
        );
        assert_eq!(
            Value::Object(out[1].clone()),
            json!({"color": "red", "size": "L"})
        );
    }

    #[test]
    fn test_sort_stable_and_idempotent() {
        let input = records(&[
            json!({"k": 2, "tag": "first"}),
            json!({"k": 1, "tag": "x"}),
            json!({"k": 2, "tag": "second"}),
        ]);
        let keys = vec![Path::parse("k")];
        let once = sort(input, &keys, false);
        assert_eq!(once[0].get("k"), Some(&json!(1)));
        assert_eq!(once[1].get("tag"), Some(&json!("first")));
        assert_eq!(once[2].get("tag"), Some(&json!("second")));

        let twice = sort(once.clone(), &keys, false);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_sort_mixed_types_use_rank() {
        let input = records(&[
            json!({"k": "s"}),
            json!({"k": 1}),
            json!({"k": null}),
            json!({"k": true}),
        ]);
        let sorted = sort(input, &[Path::parse("k")], false);
        let keys: Vec<&Value> = sorted.iter().map(|r| r.get("k").unwrap()).collect();
        assert_eq!(keys, vec![&json!(null), &json!(true), &json!(1), &json!("s")]);
    }

    #[test]
    fn test_sort_descending() {
        let input = records(&[json!({"k": 1}), json!({"k": 3}), json!({"k": 2})]);
        let sorted = sort(input, &[Path::parse("k")], true);
        let keys: Vec<&Value> = sorted.iter().map(|r| r.get("k").unwrap()).collect();
        assert_eq!(keys, vec![&json!(3), &json!(2), &json!(1)]);
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        let empty: Vec<Record> = Vec::new();
        assert!(unwrap_all(Distinct::new(stream(empty.clone()))).is_empty());
        assert!(sort(empty.clone(), &[Path::parse("k")], false).is_empty());
        assert!(join(empty.clone(), empty.clone(), &parse_join_on("a=b").unwrap(), JoinMode::Inner).is_empty());
        assert!(product(&empty, &empty).is_empty());
    }
}
