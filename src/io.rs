//! Line-oriented JSONL input and output.
//!
//! The reader is lazy: it holds one source line and one parsed record at a
//! time. The writer emits one record per line with insertion-ordered keys
//! by default. `LazyJsonl` adds random access over a file through a byte
//! offset index with a small LRU cache of parsed records.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path as FsPath, PathBuf};

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{JaError, Result};
use crate::value::Record;

/// Display name used for stdin in diagnostics.
pub const STDIN_NAME: &str = "<stdin>";

/// Lazily yields records from a JSONL source. Blank lines are skipped;
/// a malformed or non-object line is fatal unless lenient mode is on, in
/// which case it is counted and skipped.
pub struct JsonlReader<R> {
    source: R,
    path: String,
    line_number: usize,
    lenient: bool,
    skipped: usize,
    done: bool,
}

impl JsonlReader<Box<dyn BufRead>> {
    /// Open a file path, or stdin for `-`/`None`.
    pub fn open(path: Option<&str>, lenient: bool) -> Result<Self> {
        match path {
            Some(p) if p != "-" => {
                let file = File::open(p).map_err(JaError::Io)?;
                Ok(JsonlReader::new(
                    Box::new(BufReader::new(file)) as Box<dyn BufRead>,
                    p,
                    lenient,
                ))
            }
            _ => Ok(JsonlReader::new(
                Box::new(BufReader::new(io::stdin())) as Box<dyn BufRead>,
                STDIN_NAME,
                lenient,
            )),
        }
    }
}

impl<R: BufRead> JsonlReader<R> {
    pub fn new(source: R, path: &str, lenient: bool) -> Self {
        JsonlReader {
            source,
            path: path.to_string(),
            line_number: 0,
            lenient,
            skipped: 0,
            done: false,
        }
    }

    /// Lines dropped so far in lenient mode.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn parse_line(&self, line: &str) -> Result<Record> {
        let value: Value = serde_json::from_str(line).map_err(|e| JaError::InputParse {
            path: self.path.clone(),
            line: self.line_number,
            reason: e.to_string(),
        })?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(JaError::InputParse {
                path: self.path.clone(),
                line: self.line_number,
                reason: format!("top-level value must be an object, got {}", kind_of(&other)),
            }),
        }
    }
}

impl<R: BufRead> Iterator for JsonlReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut line = String::new();
        loop {
            line.clear();
            match self.source.read_line(&mut line) {
                Ok(0) => {
                    self.done = true;
                    if self.skipped > 0 {
                        warn!(path = %self.path, skipped = self.skipped, "skipped malformed lines");
                    }
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(JaError::Io(e)));
                }
            }
            self.line_number += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match self.parse_line(trimmed) {
                Ok(record) => return Some(Ok(record)),
                Err(e) if self.lenient => {
                    self.skipped += 1;
                    warn!(%e, "dropping malformed line");
                    continue;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Output knobs. Insertion order is the default; sorted keys are opt-in.
#[derive(Debug, Clone, Default)]
pub struct WriterConfig {
    pub sort_keys: bool,
}

/// Serializes records as line-delimited JSON.
pub struct JsonlWriter<W: Write> {
    writer: W,
    config: WriterConfig,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(writer: W, config: WriterConfig) -> Self {
        JsonlWriter { writer, config }
    }

    pub fn write(&mut self, record: &Record) -> Result<()> {
        let line = if self.config.sort_keys {
            serde_json::to_string(&sorted_keys(&Value::Object(record.clone())))
        } else {
            serde_json::to_string(record)
        }
        .map_err(|e| JaError::internal(format!("serialization failed: {e}")))?;
        writeln!(self.writer, "{line}").map_err(JaError::Io)
    }

    pub fn write_all<I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        for record in records {
            self.write(&record?)?;
        }
        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(JaError::Io)
    }
}

/// Open stdout, or a file when `--output` was given.
pub fn open_output(path: Option<&str>) -> Result<Box<dyn Write>> {
    match path {
        Some(p) => {
            let file = File::create(p).map_err(JaError::Io)?;
            Ok(Box::new(io::BufWriter::new(file)))
        }
        None => Ok(Box::new(io::BufWriter::new(io::stdout()))),
    }
}

fn sorted_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (key, value) in entries {
                out.insert(key.clone(), sorted_keys(value));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted_keys).collect()),
        other => other.clone(),
    }
}

/// Random access over a JSONL file: a sparse `record index → byte offset`
/// index built on first use, plus an LRU cache of parsed records.
pub struct LazyJsonl {
    path: PathBuf,
    index: Option<Vec<(u64, usize)>>,
    cache: HashMap<usize, Record>,
    recency: VecDeque<usize>,
    capacity: usize,
}

const DEFAULT_CACHE_CAPACITY: usize = 100;

impl LazyJsonl {
    pub fn new(path: impl AsRef<FsPath>) -> Self {
        LazyJsonl {
            path: path.as_ref().to_path_buf(),
            index: None,
            cache: HashMap::new(),
            recency: VecDeque::new(),
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Number of (non-blank) records in the file.
    pub fn len(&mut self) -> Result<usize> {
        self.build_index()?;
        Ok(self.index.as_ref().map_or(0, Vec::len))
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Fetch one record by index, seeking directly to its line.
    pub fn get(&mut self, idx: usize) -> Result<Option<Record>> {
        self.build_index()?;
        if let Some(record) = self.cache.get(&idx) {
            let record = record.clone();
            self.touch(idx);
            return Ok(Some(record));
        }
        let (offset, line_number) = match self.index.as_ref().and_then(|ix| ix.get(idx)) {
            Some(entry) => *entry,
            None => return Ok(None),
        };

        let mut file = File::open(&self.path).map_err(JaError::Io)?;
        file.seek(SeekFrom::Start(offset)).map_err(JaError::Io)?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        reader.read_line(&mut line).map_err(JaError::Io)?;

        let value: Value =
            serde_json::from_str(line.trim()).map_err(|e| JaError::InputParse {
                path: self.path.display().to_string(),
                line: line_number,
                reason: e.to_string(),
            })?;
        let record = match value {
            Value::Object(map) => map,
            other => {
                return Err(JaError::InputParse {
                    path: self.path.display().to_string(),
                    line: line_number,
                    reason: format!("top-level value must be an object, got {}", kind_of(&other)),
                })
            }
        };

        self.insert_cached(idx, record.clone());
        Ok(Some(record))
    }

    fn build_index(&mut self) -> Result<()> {
        if self.index.is_some() {
            return Ok(());
        }
        let file = File::open(&self.path).map_err(JaError::Io)?;
        let mut reader = BufReader::new(file);
        let mut index = Vec::new();
        let mut offset: u64 = 0;
        let mut line_number = 0usize;
        let mut line = Vec::new();
        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line).map_err(JaError::Io)?;
            if n == 0 {
                break;
            }
            line_number += 1;
            if !line.iter().all(|b| b.is_ascii_whitespace()) {
                index.push((offset, line_number));
            }
            offset += n as u64;
        }
        self.index = Some(index);
        Ok(())
    }

    fn insert_cached(&mut self, idx: usize, record: Record) {
        if self.cache.len() >= self.capacity {
            if let Some(evicted) = self.recency.pop_front() {
                self.cache.remove(&evicted);
            }
        }
        self.cache.insert(idx, record);
        self.recency.push_back(idx);
    }

    fn touch(&mut self, idx: usize) {
        if let Some(pos) = self.recency.iter().position(|&i| i == idx) {
            self.recency.remove(pos);
            self.recency.push_back(idx);
        }
    }
}
