//! Metadata-preserving grouping.
//!
//! `group_by` does not aggregate: it annotates every record with its place
//! in the grouping hierarchy under reserved `_group*` keys, so grouping
//! stays composable across pipeline stages (and across process boundaries,
//! since the metadata rides inside the record). Aggregation consumes the
//! annotations and collapses each innermost group.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{JaError, Result};
use crate::value::{tuple_key, Path, Record};

/// Full grouping hierarchy, in application order.
pub const GROUPS_KEY: &str = "_groups";
/// Cardinality of the innermost group containing the record.
pub const GROUP_SIZE_KEY: &str = "_group_size";
/// 0-based position of the record within its innermost group.
pub const GROUP_INDEX_KEY: &str = "_group_index";
/// Reserved prefix; aggregation strips every key starting with it.
pub const GROUP_META_PREFIX: &str = "_group";

/// One level of the hierarchy: the grouping field and this record's value.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupEntry {
    pub field: String,
    pub value: Value,
}

impl GroupEntry {
    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("field".to_string(), Value::String(self.field.clone()));
        map.insert("value".to_string(), self.value.clone());
        Value::Object(map)
    }

    fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| JaError::pipeline("malformed _groups entry: not an object"))?;
        let field = map
            .get("field")
            .and_then(Value::as_str)
            .ok_or_else(|| JaError::pipeline("malformed _groups entry: missing field"))?;
        let value = map
            .get("value")
            .cloned()
            .ok_or_else(|| JaError::pipeline("malformed _groups entry: missing value"))?;
        Ok(GroupEntry {
            field: field.to_string(),
            value,
        })
    }
}

/// Read a record's grouping hierarchy. Unannotated records yield an empty
/// hierarchy.
pub fn read_groups(record: &Record) -> Result<Vec<GroupEntry>> {
    match record.get(GROUPS_KEY) {
        None => Ok(Vec::new()),
        Some(Value::Array(entries)) => entries.iter().map(GroupEntry::from_value).collect(),
        Some(_) => Err(JaError::pipeline("malformed _groups: not an array")),
    }
}

/// Group by a key, annotating instead of collapsing. Chained calls append
/// to `_groups`; `_group_size`/`_group_index` always describe the
/// innermost bucket. Buckets are emitted in first-seen order and records
/// keep their input order within a bucket.
pub fn group_by(records: Vec<Record>, key: &Path) -> Result<Vec<Record>> {
    // One pass to bucket. The bucket identity is the existing hierarchy
    // plus the new key value, so chained grouping nests.
    let mut buckets: HashMap<Vec<u8>, Vec<(Record, Vec<GroupEntry>)>> = HashMap::new();
    let mut order: Vec<Vec<u8>> = Vec::new();

    for record in records {
        let existing = read_groups(&record)?;
        // An absent key groups under null, matching the value recorded in
        // the metadata so a later aggregation buckets identically.
        let key_value = key.get(&record).cloned().unwrap_or(Value::Null);

        let mut bucket_key = Vec::new();
        for entry in &existing {
            bucket_key.extend_from_slice(&tuple_key(&[Some(&Value::String(entry.field.clone()))]));
            bucket_key.extend_from_slice(&tuple_key(&[Some(&entry.value)]));
        }
        bucket_key.extend_from_slice(&tuple_key(&[Some(&key_value)]));

        let mut groups = existing;
        groups.push(GroupEntry {
            field: key.raw().to_string(),
            value: key_value,
        });

        match buckets.get_mut(&bucket_key) {
            Some(bucket) => bucket.push((record, groups)),
            None => {
                order.push(bucket_key.clone());
                buckets.insert(bucket_key, vec![(record, groups)]);
            }
        }
    }

    // Second pass to emit with size/index filled in.
    let mut out = Vec::new();
    for bucket_key in order {
        let bucket = buckets.remove(&bucket_key).unwrap();
        let size = bucket.len();
        for (index, (mut record, groups)) in bucket.into_iter().enumerate() {
            record.insert(
                GROUPS_KEY.to_string(),
                Value::Array(groups.iter().map(GroupEntry::to_value).collect()),
            );
            record.insert(GROUP_SIZE_KEY.to_string(), Value::from(size as i64));
            record.insert(GROUP_INDEX_KEY.to_string(), Value::from(index as i64));
            out.push(record);
        }
    }
    Ok(out)
}

/// Strip every reserved `_group*` key from a record.
pub fn strip_group_metadata(record: &mut Record) {
    record.retain(|key, _| !key.starts_with(GROUP_META_PREFIX));
}
