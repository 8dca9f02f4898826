//! Schema inference with a streaming accumulator.
//!
//! One pass over the relation accumulates per-path statistics; the
//! JSON-Schema-shaped description is built once at the end. A field is
//! required iff it is present (even as null) in every record that carries
//! its parent object. String formats are detected when every observed
//! string agrees on one format. The inferred schema is advisory;
//! `validate_record` checks the emitted type/required/properties/items
//! subset.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::value::Record;

static DATE_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").unwrap()
});

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}(\.\d+)?$").unwrap());

static UUID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{8}(-[0-9a-fA-F]{4}){3}-[0-9a-fA-F]{12}$").unwrap());

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[A-Za-z]{2,}$").unwrap());

/// JSON type tags as they appear in the emitted schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum JsonType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    JsonType::Integer
                } else {
                    JsonType::Number
                }
            }
            Value::String(_) => JsonType::String,
            Value::Array(_) => JsonType::Array,
            Value::Object(_) => JsonType::Object,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Integer => "integer",
            JsonType::Number => "number",
            JsonType::String => "string",
            JsonType::Array => "array",
            JsonType::Object => "object",
        }
    }
}

/// Format agreement across every observed string.
#[derive(Debug, Default)]
struct StringStats {
    format_counts: HashMap<&'static str, usize>,
    total: usize,
}

impl StringStats {
    fn observe(&mut self, s: &str) {
        self.total += 1;
        if let Some(format) = detect_format(s) {
            *self.format_counts.entry(format).or_insert(0) += 1;
        }
    }

    fn unanimous_format(&self) -> Option<&'static str> {
        if self.format_counts.len() != 1 {
            return None;
        }
        self.format_counts
            .iter()
            .next()
            .filter(|(_, count)| **count == self.total)
            .map(|(format, _)| *format)
    }
}

/// Accumulates statistics for one observed path.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    types: HashMap<JsonType, usize>,
    samples: usize,
    strings: Option<StringStats>,
    /// Union of element schemas across every observed array.
    items: Option<Box<SchemaBuilder>>,
    /// Per-property builders plus presence counts across observed objects.
    properties: Option<PropertyStats>,
}

#[derive(Debug, Default)]
struct PropertyStats {
    builders: HashMap<String, SchemaBuilder>,
    present: HashMap<String, usize>,
    objects_seen: usize,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        SchemaBuilder::default()
    }

    pub fn observe(&mut self, value: &Value) {
        self.samples += 1;
        *self.types.entry(JsonType::from_value(value)).or_insert(0) += 1;

        match value {
            Value::String(s) => self.strings.get_or_insert_with(StringStats::default).observe(s),
            Value::Array(items) => {
                let builder = self.items.get_or_insert_with(Default::default);
                for item in items {
                    builder.observe(item);
                }
            }
            Value::Object(map) => {
                let stats = self.properties.get_or_insert_with(PropertyStats::default);
                stats.objects_seen += 1;
                for (key, value) in map {
                    stats
                        .builders
                        .entry(key.clone())
                        .or_insert_with(SchemaBuilder::new)
                        .observe(value);
                    *stats.present.entry(key.clone()).or_insert(0) += 1;
                }
            }
            _ => {}
        }
    }

    /// Build the final schema from the accumulated statistics.
    pub fn build(self) -> Value {
        if self.samples == 0 {
            return json!({});
        }

        let mut types: Vec<JsonType> = self.types.keys().copied().collect();
        types.sort();

        // Single type, or one type plus null, keeps the rich per-type
        // description; anything wider degrades to the type union.
        let non_null: Vec<JsonType> = types
            .iter()
            .copied()
            .filter(|t| *t != JsonType::Null)
            .collect();
        let saw_null = types.contains(&JsonType::Null);

        if non_null.len() == 1 {
            let mut schema = self.type_schema(non_null[0]);
            if saw_null {
                if let Value::Object(ref mut map) = schema {
                    if let Some(Value::String(type_str)) = map.get("type") {
                        let type_str = type_str.clone();
                        map.insert(
                            "type".to_string(),
                            json!([type_str, "null"]),
                        );
                    }
                }
            }
            return schema;
        }

        if non_null.is_empty() {
            return json!({"type": "null"});
        }

        let names: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
        json!({ "type": names })
    }

    fn type_schema(self, json_type: JsonType) -> Value {
        match json_type {
            JsonType::String => {
                let mut schema = Map::new();
                schema.insert("type".to_string(), json!("string"));
                if let Some(format) = self.strings.as_ref().and_then(StringStats::unanimous_format)
                {
                    schema.insert("format".to_string(), json!(format));
                }
                Value::Object(schema)
            }
            JsonType::Array => {
                let mut schema = Map::new();
                schema.insert("type".to_string(), json!("array"));
                if let Some(items) = self.items {
                    if items.samples > 0 {
                        schema.insert("items".to_string(), items.build());
                    }
                }
                Value::Object(schema)
            }
            JsonType::Object => {
                let mut schema = Map::new();
                schema.insert("type".to_string(), json!("object"));
                if let Some(stats) = self.properties {
                    let objects_seen = stats.objects_seen;
                    let mut required: Vec<String> = stats
                        .present
                        .iter()
                        .filter(|(_, count)| **count == objects_seen)
                        .map(|(key, _)| key.clone())
                        .collect();
                    required.sort();

                    let mut names: Vec<String> = stats.builders.keys().cloned().collect();
                    names.sort();
                    let mut properties = Map::new();
                    let mut builders = stats.builders;
                    for name in names {
                        if let Some(builder) = builders.remove(&name) {
                            properties.insert(name, builder.build());
                        }
                    }
                    schema.insert("properties".to_string(), Value::Object(properties));
                    if !required.is_empty() {
                        schema.insert("required".to_string(), json!(required));
                    }
                }
                Value::Object(schema)
            }
            other => json!({ "type": other.as_str() }),
        }
    }
}

/// Infer a schema for a finite relation.
pub fn infer_schema<'a>(records: impl IntoIterator<Item = &'a Record>) -> Value {
    let mut builder = SchemaBuilder::new();
    for record in records {
        builder.observe(&Value::Object(record.clone()));
    }
    builder.build()
}

/// One recognizable string format: a cheap shape test gates the expensive
/// confirmation, which is either a regex or a parser.
struct FormatProbe {
    format: &'static str,
    shape: fn(&str) -> bool,
    confirm: Confirm,
}

enum Confirm {
    Pattern(&'static Lazy<Regex>),
    Check(fn(&str) -> bool),
}

impl FormatProbe {
    fn matches(&self, s: &str) -> bool {
        (self.shape)(s)
            && match &self.confirm {
                Confirm::Pattern(re) => re.is_match(s),
                Confirm::Check(check) => check(s),
            }
    }
}

const URI_SCHEMES: [&str; 4] = ["http://", "https://", "ftp://", "file://"];

// Probe order matters where shapes overlap: the time probe must run
// before the IPv6 parser, which also accepts colon-separated hex.
static FORMAT_PROBES: &[FormatProbe] = &[
    FormatProbe {
        format: "date-time",
        shape: |s| s.len() >= 19 && s.as_bytes()[10] == b'T',
        confirm: Confirm::Pattern(&DATE_TIME_RE),
    },
    FormatProbe {
        format: "date",
        shape: |s| s.len() == 10 && s.as_bytes()[4] == b'-',
        confirm: Confirm::Pattern(&DATE_RE),
    },
    FormatProbe {
        format: "time",
        shape: |s| s.len() >= 8 && s.as_bytes()[2] == b':',
        confirm: Confirm::Pattern(&TIME_RE),
    },
    FormatProbe {
        format: "uuid",
        shape: |s| s.len() == 36 && s.as_bytes()[8] == b'-',
        confirm: Confirm::Pattern(&UUID_RE),
    },
    FormatProbe {
        format: "email",
        shape: |s| s.contains('@'),
        confirm: Confirm::Pattern(&EMAIL_RE),
    },
    FormatProbe {
        format: "uri",
        shape: |s| s.contains("://"),
        confirm: Confirm::Check(|s| URI_SCHEMES.iter().any(|scheme| s.starts_with(scheme))),
    },
    FormatProbe {
        format: "ipv4",
        shape: |s| s.len() <= 15 && s.bytes().all(|b| b.is_ascii_digit() || b == b'.'),
        confirm: Confirm::Check(|s| s.parse::<std::net::Ipv4Addr>().is_ok()),
    },
    FormatProbe {
        format: "ipv6",
        shape: |s| s.contains(':'),
        confirm: Confirm::Check(|s| s.parse::<std::net::Ipv6Addr>().is_ok()),
    },
];

fn detect_format(value: &str) -> Option<&'static str> {
    FORMAT_PROBES
        .iter()
        .find(|probe| probe.matches(value))
        .map(|probe| probe.format)
}

/// Check a value against the subset of JSON Schema this module emits:
/// `type`, `required`, `properties`, `items`. Returns violation messages,
/// each prefixed by the dotted path where it occurred.
pub fn validate_record(schema: &Value, value: &Value) -> Vec<String> {
    let mut violations = Vec::new();
    validate_at(schema, value, "$", &mut violations);
    violations
}

fn validate_at(schema: &Value, value: &Value, at: &str, violations: &mut Vec<String>) {
    let schema = match schema.as_object() {
        Some(map) => map,
        None => return,
    };

    if let Some(expected) = schema.get("type") {
        if !type_matches(expected, value) {
            violations.push(format!(
                "{at}: expected type {expected}, got {}",
                JsonType::from_value(value).as_str()
            ));
            return;
        }
    }

    if let (Some(required), Value::Object(map)) = (schema.get("required"), value) {
        if let Some(names) = required.as_array() {
            for name in names.iter().filter_map(Value::as_str) {
                if !map.contains_key(name) {
                    violations.push(format!("{at}: missing required field '{name}'"));
                }
            }
        }
    }

    if let (Some(Value::Object(properties)), Value::Object(map)) =
        (schema.get("properties"), value)
    {
        for (name, sub_schema) in properties {
            if let Some(sub_value) = map.get(name) {
                validate_at(sub_schema, sub_value, &format!("{at}.{name}"), violations);
            }
        }
    }

    if let (Some(items), Value::Array(elements)) = (schema.get("items"), value) {
        for (idx, element) in elements.iter().enumerate() {
            validate_at(items, element, &format!("{at}[{idx}]"), violations);
        }
    }
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => single_type_matches(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| single_type_matches(name, value)),
        _ => true,
    }
}

fn single_type_matches(name: &str, value: &Value) -> bool {
    match name {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "integer" => matches!(value, Value::Number(n) if n.is_i64() || n.is_u64()),
        // An integer is also a number.
        "number" => value.is_number(),
        "string" => value.is_string(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(values: &[Value]) -> Vec<Record> {
        values
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn test_required_vs_optional_with_null() {
        // a is present everywhere (sometimes null) so it is required with
        // {integer, null}; b is optional with {string}.
        let input = records(&[
            json!({"a": 1}),
            json!({"a": null}),
            json!({"a": 2, "b": "x"}),
        ]);
        let schema = infer_schema(&input);

        let required = schema.get("required").unwrap().as_array().unwrap();
        assert_eq!(required, &vec![json!("a")]);

        let properties = schema.get("properties").unwrap().as_object().unwrap();
        let a_type = properties["a"].get("type").unwrap();
        assert_eq!(a_type, &json!(["integer", "null"]));
        assert_eq!(properties["b"].get("type"), Some(&json!("string")));
    }

    #[test]
    fn test_empty_relation() {
        assert_eq!(infer_schema(&Vec::<Record>::new()), json!({}));
    }

    #[test]
    fn test_nested_objects_recurse() {
        let input = records(&[
            json!({"user": {"name": "Ada", "email": "ada@example.com"}}),
            json!({"user": {"name": "Bob"}}),
        ]);
        let schema = infer_schema(&input);
        let user = &schema["properties"]["user"];
        assert_eq!(user.get("type"), Some(&json!("object")));
        assert_eq!(user.get("required"), Some(&json!(["name"])));
        assert_eq!(
            user["properties"]["email"].get("format"),
            Some(&json!("email"))
        );
    }

    #[test]
    fn test_array_unions_element_schemas() {
        let input = records(&[json!({"xs": [1, 2]}), json!({"xs": [3.5]})]);
        let schema = infer_schema(&input);
        let items = &schema["properties"]["xs"]["items"];
        assert_eq!(items.get("type"), Some(&json!(["integer", "number"])));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(detect_format("2021-01-01"), Some("date"));
        assert_eq!(detect_format("2021-01-01T10:30:00Z"), Some("date-time"));
        assert_eq!(detect_format("10:30:00"), Some("time"));
        assert_eq!(detect_format("a@b.com"), Some("email"));
        assert_eq!(
            detect_format("550e8400-e29b-41d4-a716-446655440000"),
            Some("uuid")
        );
        assert_eq!(detect_format("https://example.com"), Some("uri"));
        assert_eq!(detect_format("10.0.0.1"), Some("ipv4"));
        assert_eq!(detect_format("plain text"), None);
    }

    #[test]
    fn test_mixed_format_strings_get_no_format() {
        let input = records(&[json!({"s": "a@b.com"}), json!({"s": "plain"})]);
        let schema = infer_schema(&input);
        assert!(schema["properties"]["s"].get("format").is_none());
    }

    #[test]
    fn test_validate_accepts_inferred_schema() {
        let input = records(&[json!({"a": 1, "b": "x"}), json!({"a": 2, "b": "y"})]);
        let schema = infer_schema(&input);
        for record in &input {
            assert!(validate_record(&schema, &Value::Object(record.clone())).is_empty());
        }
    }

    #[test]
    fn test_validate_reports_violations() {
        let schema = json!({
            "type": "object",
            "required": ["a"],
            "properties": {
                "a": {"type": "integer"},
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        });
        let bad = json!({"tags": ["ok", 7]});
        let violations = validate_record(&schema, &bad);
        assert_eq!(violations.len(), 2);
        assert!(violations[0].contains("missing required field 'a'"));
        assert!(violations[1].contains("$.tags[1]"));
    }

    #[test]
    fn test_integer_is_a_number_for_validation() {
        let schema = json!({"type": "number"});
        assert!(validate_record(&schema, &json!(3)).is_empty());
        let schema = json!({"type": "integer"});
        assert!(!validate_record(&schema, &json!(3.5)).is_empty());
    }
}
