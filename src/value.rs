//! Value model: dotted-path access, structural comparison, and canonical
//! key encoding for set operations.
//!
//! Records are plain `serde_json` objects; a dotted path descends nested
//! maps only. Resolution never fails: a path that walks off the structure
//! yields `None` (absent), which is distinct from JSON `null`.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

/// One row of a relation: a top-level JSON object.
pub type Record = Map<String, Value>;

/// A pre-split dotted path. Split once, reuse per record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<String>,
    raw: String,
}

impl Path {
    /// Split on `.`. Names containing `[` are literal keys here; array
    /// indexing belongs to the navigator, not the operator core.
    pub fn parse(raw: &str) -> Self {
        Path {
            segments: raw.split('.').map(str::to_string).collect(),
            raw: raw.to_string(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The original dotted spelling, used verbatim as an output key.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Resolve against a record. Absent when any step is missing or the
    /// intermediate value is not a map.
    pub fn get<'a>(&self, record: &'a Record) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let mut current = record.get(first)?;
        for segment in rest {
            match current {
                Value::Object(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Assign into a record, creating intermediate maps as needed.
    /// Intermediate non-map values are overwritten.
    pub fn set(&self, record: &mut Record, value: Value) {
        let mut current = record;
        for segment in &self.segments[..self.segments.len() - 1] {
            let slot = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            current = slot.as_object_mut().unwrap();
        }
        current.insert(self.segments[self.segments.len() - 1].clone(), value);
    }

    /// Remove the value at this path, pruning nothing else.
    pub fn take(&self, record: &mut Record) -> Option<Value> {
        let (last, init) = self.segments.split_last()?;
        let mut current = record;
        for segment in init {
            current = current.get_mut(segment)?.as_object_mut()?;
        }
        current.remove(last)
    }
}

/// Rank for cross-type ordering: null < bool < number < string < array < object.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Structural equality with integer/float unification: `1 == 1.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_cmp(x, y) == Ordering::Equal,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).map_or(false, |w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Total order over values. Numbers compare numerically across the
/// integer/float divide; ties at the type level fall through to content.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => number_cmp(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let mut xs: Vec<(&String, &Value)> = x.iter().collect();
            let mut ys: Vec<(&String, &Value)> = y.iter().collect();
            xs.sort_by(|l, r| l.0.cmp(r.0));
            ys.sort_by(|l, r| l.0.cmp(r.0));
            for ((kx, vx), (ky, vy)) in xs.iter().zip(ys.iter()) {
                let ord = kx.cmp(ky).then_with(|| compare_values(vx, vy));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xs.len().cmp(&ys.len())
        }
        _ => unreachable!("type ranks matched"),
    }
}

fn number_cmp(x: &Number, y: &Number) -> Ordering {
    // Exact integer comparison when both sides are integral and in range;
    // everything else compares as f64. NaN cannot be represented in JSON.
    match (number_as_i128(x), number_as_i128(y)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => {
            let a = x.as_f64().unwrap_or(0.0);
            let b = y.as_f64().unwrap_or(0.0);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
    }
}

fn number_as_i128(n: &Number) -> Option<i128> {
    if let Some(i) = n.as_i64() {
        return Some(i as i128);
    }
    if let Some(u) = n.as_u64() {
        return Some(u as i128);
    }
    let f = n.as_f64()?;
    if f.fract() == 0.0 && f.abs() < 2f64.powi(63) {
        return Some(f as i128);
    }
    None
}

/// Canonical byte encoding of a value: type tag + payload. Numerically
/// equal integers and floats encode identically, so hashing agrees with
/// [`values_equal`]. Objects encode over sorted keys.
pub fn canonical_key(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_value(value, &mut out);
    out
}

/// Canonical encoding of a whole record (an object value).
pub fn record_key(record: &Record) -> Vec<u8> {
    let mut out = Vec::new();
    encode_object(record, &mut out);
    out
}

/// Canonical encoding of a tuple of optional values, for join and group
/// keys. Absent gets its own tag so it never collides with null.
pub fn tuple_key(values: &[Option<&Value>]) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        match value {
            None => out.push(b'X'),
            Some(v) => encode_value(v, &mut out),
        }
    }
    out
}

fn encode_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(b'N'),
        Value::Bool(b) => out.extend_from_slice(if *b { b"B1" } else { b"B0" }),
        Value::Number(n) => encode_number(n, out),
        Value::String(s) => {
            out.push(b'S');
            out.extend_from_slice(&(s.len() as u64).to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Array(items) => {
            out.push(b'A');
            out.extend_from_slice(&(items.len() as u64).to_be_bytes());
            for item in items {
                encode_value(item, out);
            }
        }
        Value::Object(map) => encode_object(map, out),
    }
}

fn encode_object(map: &Record, out: &mut Vec<u8>) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    out.push(b'O');
    out.extend_from_slice(&(entries.len() as u64).to_be_bytes());
    for (key, value) in entries {
        out.extend_from_slice(&(key.len() as u64).to_be_bytes());
        out.extend_from_slice(key.as_bytes());
        encode_value(value, out);
    }
}

fn encode_number(n: &Number, out: &mut Vec<u8>) {
    // Any number that round-trips through f64 exactly encodes as f64 bits,
    // so int 1 and float 1.0 collide. -0.0 normalizes to 0.0.
    if let Some(i) = n.as_i64() {
        let f = i as f64;
        if f as i64 == i && f.abs() <= 2f64.powi(53) {
            return encode_f64(f, out);
        }
        out.push(b'I');
        out.extend_from_slice(&i.to_be_bytes());
        return;
    }
    if let Some(u) = n.as_u64() {
        let f = u as f64;
        if f as u64 == u && f <= 2f64.powi(53) {
            return encode_f64(f, out);
        }
        out.push(b'U');
        out.extend_from_slice(&u.to_be_bytes());
        return;
    }
    encode_f64(n.as_f64().unwrap_or(0.0), out);
}

fn encode_f64(f: f64, out: &mut Vec<u8>) {
    let normalized = if f == 0.0 { 0.0 } else { f };
    out.push(b'F');
    out.extend_from_slice(&normalized.to_bits().to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_path_resolves_nested_maps() {
        let rec = record(json!({"user": {"profile": {"city": "Oslo"}}}));
        let path = Path::parse("user.profile.city");
        assert_eq!(path.get(&rec), Some(&json!("Oslo")));
    }

    #[test]
    fn test_path_absent_on_non_map_step() {
        let rec = record(json!({"user": "flat"}));
        assert_eq!(Path::parse("user.name").get(&rec), None);
        assert_eq!(Path::parse("missing").get(&rec), None);
    }

    #[test]
    fn test_absent_distinct_from_null() {
        let rec = record(json!({"a": null}));
        assert_eq!(Path::parse("a").get(&rec), Some(&Value::Null));
        assert_eq!(Path::parse("b").get(&rec), None);
    }

    #[test]
    fn test_bracket_names_are_literal_keys() {
        let rec = record(json!({"a[0]": 7}));
        assert_eq!(Path::parse("a[0]").get(&rec), Some(&json!(7)));
    }

    #[test]
    fn test_set_creates_intermediate_maps() {
        let mut rec = Record::new();
        Path::parse("a.b.c").set(&mut rec, json!(1));
        assert_eq!(Value::Object(rec), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn test_set_flat_key_is_not_nesting() {
        // Assigning "a.b" as a literal key is a different operation than
        // Path::set; the caller chooses which one it wants.
        let mut rec = Record::new();
        rec.insert("a.b".to_string(), json!(1));
        assert_eq!(Path::parse("a.b").get(&rec), None);
    }

    #[test]
    fn test_take_removes_nested_value() {
        let mut rec = record(json!({"a": {"b": 1}, "c": 2}));
        assert_eq!(Path::parse("a.b").take(&mut rec), Some(json!(1)));
        assert_eq!(Value::Object(rec), json!({"a": {}, "c": 2}));
    }

    #[test]
    fn test_int_float_unification() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!(1.5)));
        assert_eq!(compare_values(&json!(2), &json!(2.0)), Ordering::Equal);
        assert_eq!(canonical_key(&json!(3)), canonical_key(&json!(3.0)));
    }

    #[test]
    fn test_large_integers_stay_exact() {
        let big = 9_007_199_254_740_993_i64; // 2^53 + 1
        assert!(!values_equal(&json!(big), &json!(big as f64)));
        assert_ne!(canonical_key(&json!(big)), canonical_key(&json!(big as f64)));
    }

    #[test]
    fn test_type_rank_order() {
        let ordered = [
            json!(null),
            json!(false),
            json!(3),
            json!("a"),
            json!([1]),
            json!({"k": 1}),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(compare_values(&pair[0], &pair[1]), Ordering::Less);
        }
    }

    #[test]
    fn test_object_keys_insertion_order_irrelevant_for_keys() {
        let a = record(json!({"x": 1, "y": 2}));
        let b = record(json!({"y": 2, "x": 1}));
        assert_eq!(record_key(&a), record_key(&b));
    }

    #[test]
    fn test_tuple_key_absent_vs_null() {
        assert_ne!(
            tuple_key(&[None]),
            tuple_key(&[Some(&Value::Null)]),
        );
    }
}
