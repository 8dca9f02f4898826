//! Interactive workspace: named datasets, lazy materialization, and a
//! session-scoped scratch directory.
//!
//! A session owns a registry of datasets. *Source* datasets point at
//! external files and are re-opened on each read; *derived* datasets are
//! spill files written exactly once into the scratch directory when an
//! operator runs. Both are immutable once registered. The scratch
//! directory is removed when the session drops; a crash leaves only
//! session-scoped names behind.

use std::collections::BTreeMap;
use std::path::{Path as FsPath, PathBuf};

use tempfile::TempDir;
use tracing::info;

use crate::error::{JaError, Result};
use crate::io::{JsonlReader, JsonlWriter, LazyJsonl, WriterConfig};
use crate::pipeline::Pipeline;
use crate::plan::{self, Planner};
use crate::value::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// External file, referenced in place.
    Source,
    /// Spill file in the session scratch directory.
    Derived,
}

#[derive(Debug)]
pub struct Dataset {
    pub kind: DatasetKind,
    pub path: PathBuf,
    /// Shell-pipeline lineage from its source, for `compile`.
    lineage: Vec<String>,
    row_count: Option<usize>,
}

/// What `info` reports about a dataset.
#[derive(Debug)]
pub struct DatasetInfo {
    pub name: String,
    pub kind: DatasetKind,
    pub path: PathBuf,
    pub row_count: usize,
    pub size_bytes: u64,
    pub top_level_keys: Vec<String>,
    pub preview: Option<Record>,
}

/// Records sampled when collecting the key set for `info`.
const INFO_SAMPLE_BOUND: usize = 100;

pub struct Session {
    datasets: BTreeMap<String, Dataset>,
    current: Option<String>,
    scratch: TempDir,
    seq: u64,
}

impl Session {
    pub fn new() -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("ja-session-")
            .tempdir()
            .map_err(JaError::Io)?;
        info!(scratch = %scratch.path().display(), "session started");
        Ok(Session {
            datasets: BTreeMap::new(),
            current: None,
            scratch,
            seq: 0,
        })
    }

    pub fn scratch_dir(&self) -> &FsPath {
        self.scratch.path()
    }

    /// Register a source dataset and make it current. The default name is
    /// the file stem; names are unique per session.
    pub fn load(&mut self, path: &str, name: Option<&str>) -> Result<String> {
        if !FsPath::new(path).is_file() {
            return Err(JaError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {path}"),
            )));
        }
        let name = match name {
            Some(n) => n.to_string(),
            None => FsPath::new(path)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "dataset".to_string()),
        };
        if self.datasets.contains_key(&name) {
            return Err(JaError::pipeline(format!("dataset '{name}' already exists")));
        }
        self.datasets.insert(
            name.clone(),
            Dataset {
                kind: DatasetKind::Source,
                path: PathBuf::from(path),
                lineage: Vec::new(),
                row_count: None,
            },
        );
        self.current = Some(name.clone());
        Ok(name)
    }

    /// Move the current pointer.
    pub fn cd(&mut self, name: &str) -> Result<()> {
        if !self.datasets.contains_key(name) {
            return Err(JaError::pipeline(format!("unknown dataset '{name}'")));
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    /// The current dataset's name.
    pub fn pwd(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// All datasets in lexical order, with the current one flagged.
    pub fn datasets(&self) -> Vec<(&str, &Dataset, bool)> {
        self.datasets
            .iter()
            .map(|(name, dataset)| {
                let is_current = self.current.as_deref() == Some(name.as_str());
                (name.as_str(), dataset, is_current)
            })
            .collect()
    }

    fn resolve(&self, name: Option<&str>) -> Result<String> {
        match name {
            Some(n) => {
                if !self.datasets.contains_key(n) {
                    return Err(JaError::pipeline(format!("unknown dataset '{n}'")));
                }
                Ok(n.to_string())
            }
            None => self
                .current
                .clone()
                .ok_or_else(|| JaError::pipeline("no current dataset; load one first")),
        }
    }

    fn dataset(&self, name: &str) -> Result<&Dataset> {
        self.datasets
            .get(name)
            .ok_or_else(|| JaError::pipeline(format!("unknown dataset '{name}'")))
    }

    /// Row count, byte size, sampled key set, and a preview record. The
    /// counting pass runs once and is cached on the dataset.
    pub fn info(&mut self, name: Option<&str>) -> Result<DatasetInfo> {
        let name = self.resolve(name)?;
        let path = self.dataset(&name)?.path.clone();
        let kind = self.dataset(&name)?.kind;

        let cached = self.dataset(&name)?.row_count;
        let mut lazy = LazyJsonl::new(&path);
        let row_count = match cached {
            Some(n) => n,
            None => {
                let n = lazy.len()?;
                if let Some(dataset) = self.datasets.get_mut(&name) {
                    dataset.row_count = Some(n);
                }
                n
            }
        };

        let size_bytes = std::fs::metadata(&path).map(|m| m.len()).map_err(JaError::Io)?;

        let mut keys: Vec<String> = Vec::new();
        let mut preview = None;
        for idx in 0..row_count.min(INFO_SAMPLE_BOUND) {
            if let Some(record) = lazy.get(idx)? {
                if idx == 0 {
                    preview = Some(record.clone());
                }
                for key in record.keys() {
                    if !keys.contains(key) {
                        keys.push(key.clone());
                    }
                }
            }
        }

        Ok(DatasetInfo {
            name,
            kind,
            path,
            row_count,
            size_bytes,
            top_level_keys: keys,
            preview,
        })
    }

    /// First `limit` records of a dataset.
    pub fn ls(&self, name: Option<&str>, limit: usize) -> Result<Vec<Record>> {
        let name = self.resolve(name)?;
        let path = self.dataset(&name)?.path.to_string_lossy().into_owned();
        let reader = JsonlReader::open(Some(&path), false)?;
        reader.take(limit).collect()
    }

    /// Materialize a whole dataset, for the right side of binary operators.
    pub fn materialize(&self, name: &str) -> Result<Vec<Record>> {
        let path = self.dataset(name)?.path.to_string_lossy().into_owned();
        let reader = JsonlReader::open(Some(&path), false)?;
        reader.collect()
    }

    /// Run a pipeline over the current dataset, spill the result as a new
    /// derived dataset, and move the current pointer to it.
    ///
    /// `command` is the `ja` CLI spelling of the step, recorded as lineage
    /// for `compile`.
    pub fn apply(
        &mut self,
        output: &str,
        pipeline: &Pipeline,
        planner: Planner,
        command: &str,
    ) -> Result<String> {
        if self.datasets.contains_key(output) {
            return Err(JaError::pipeline(format!("dataset '{output}' already exists")));
        }
        let input_name = self.resolve(None)?;
        let input = self.dataset(&input_name)?;
        let input_path = input.path.to_string_lossy().into_owned();
        let mut lineage = input.lineage.clone();
        let source_arg = if lineage.is_empty() {
            input_path.clone()
        } else {
            "-".to_string()
        };
        lineage.push(format!("ja {command} {source_arg}").trim_end().to_string());

        let planner = Planner {
            input_bytes: plan::input_size_hint(Some(&input_path)),
            ..planner
        };
        let execution_plan = planner.plan(pipeline);
        plan::emit_warnings(&execution_plan);

        self.seq += 1;
        let spill_path = self
            .scratch
            .path()
            .join(format!("{output}_{}.jsonl", self.seq));

        {
            let reader = JsonlReader::open(Some(&input_path), false)?;
            let stream = plan::execute(pipeline, Box::new(reader), &execution_plan);
            let file = std::fs::File::create(&spill_path).map_err(JaError::Io)?;
            let mut writer = JsonlWriter::new(std::io::BufWriter::new(file), WriterConfig::default());
            writer.write_all(stream)?;
        }

        self.datasets.insert(
            output.to_string(),
            Dataset {
                kind: DatasetKind::Derived,
                path: spill_path,
                lineage,
                row_count: None,
            },
        );
        self.current = Some(output.to_string());
        info!(dataset = output, "derived dataset registered");
        Ok(output.to_string())
    }

    /// Copy the file backing the current dataset. The destination is not
    /// registered.
    pub fn save(&self, destination: &str) -> Result<()> {
        let name = self.resolve(None)?;
        let dataset = self.dataset(&name)?;
        std::fs::copy(&dataset.path, destination).map_err(JaError::Io)?;
        Ok(())
    }

    /// Render the current dataset's lineage as an equivalent shell
    /// pipeline.
    pub fn compile(&self) -> Result<String> {
        let name = self.resolve(None)?;
        let dataset = self.dataset(&name)?;
        if dataset.lineage.is_empty() {
            return Ok(format!("cat {}", dataset.path.to_string_lossy()));
        }
        Ok(dataset.lineage.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::CompiledExpr;
    use crate::ops::EvalPolicy;
    use crate::pipeline::Op;
    use serde_json::{json, Value};

    fn write_fixture(dir: &FsPath, name: &str, lines: &[Value]) -> PathBuf {
        let path = dir.join(name);
        let content: String = lines
            .iter()
            .map(|v| format!("{v}\n"))
            .collect();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn fixture_session() -> (TempDir, Session, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(
            dir.path(),
            "people.jsonl",
            &[
                json!({"name": "Ada", "age": 36}),
                json!({"name": "Bob", "age": 20}),
                json!({"name": "Cam", "age": 41}),
            ],
        );
        let session = Session::new().unwrap();
        (dir, session, path)
    }

    #[test]
    fn test_load_defaults_to_file_stem() {
        let (_dir, mut session, path) = fixture_session();
        let name = session.load(&path.to_string_lossy(), None).unwrap();
        assert_eq!(name, "people");
        assert_eq!(session.pwd(), Some("people"));
    }

    #[test]
    fn test_name_collision_rejected() {
        let (_dir, mut session, path) = fixture_session();
        session.load(&path.to_string_lossy(), Some("p")).unwrap();
        assert!(session.load(&path.to_string_lossy(), Some("p")).is_err());
    }

    #[test]
    fn test_cd_and_datasets_listing() {
        let (_dir, mut session, path) = fixture_session();
        session.load(&path.to_string_lossy(), Some("b")).unwrap();
        session.load(&path.to_string_lossy(), Some("a")).unwrap();
        assert_eq!(session.pwd(), Some("a"));
        session.cd("b").unwrap();
        assert_eq!(session.pwd(), Some("b"));
        assert!(session.cd("nope").is_err());

        // Lexical order with the current pointer marked.
        let listing = session.datasets();
        assert_eq!(listing[0].0, "a");
        assert_eq!(listing[1].0, "b");
        assert!(listing[1].2);
    }

    #[test]
    fn test_info_counts_and_samples() {
        let (_dir, mut session, path) = fixture_session();
        session.load(&path.to_string_lossy(), None).unwrap();
        let info = session.info(None).unwrap();
        assert_eq!(info.row_count, 3);
        assert_eq!(info.top_level_keys, vec!["name", "age"]);
        assert_eq!(
            info.preview.unwrap().get("name"),
            Some(&json!("Ada"))
        );
        assert!(info.size_bytes > 0);
    }

    #[test]
    fn test_apply_spills_and_moves_current() {
        let (_dir, mut session, path) = fixture_session();
        session.load(&path.to_string_lossy(), None).unwrap();

        let pipeline = Pipeline::new().then(Op::Select {
            expr: CompiledExpr::compile("age > 30").unwrap(),
            policy: EvalPolicy::Strict,
        });
        session
            .apply("adults", &pipeline, Planner::default(), "select 'age > 30'")
            .unwrap();

        assert_eq!(session.pwd(), Some("adults"));
        let rows = session.ls(None, 10).unwrap();
        assert_eq!(rows.len(), 2);

        // The spill lives in the scratch directory and is sequence-named.
        let dataset = session.dataset("adults").unwrap();
        assert_eq!(dataset.kind, DatasetKind::Derived);
        assert!(dataset.path.starts_with(session.scratch_dir()));
        assert!(dataset
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("adults_"));
    }

    #[test]
    fn test_apply_output_collision_rejected() {
        let (_dir, mut session, path) = fixture_session();
        session.load(&path.to_string_lossy(), Some("people")).unwrap();
        let pipeline = Pipeline::new().then(Op::Distinct);
        assert!(session
            .apply("people", &pipeline, Planner::default(), "distinct")
            .is_err());
    }

    #[test]
    fn test_save_copies_current_backing_file() {
        let (dir, mut session, path) = fixture_session();
        session.load(&path.to_string_lossy(), None).unwrap();
        let dest = dir.path().join("out.jsonl");
        session.save(&dest.to_string_lossy()).unwrap();
        assert_eq!(
            std::fs::read_to_string(&dest).unwrap(),
            std::fs::read_to_string(&path).unwrap()
        );
    }

    #[test]
    fn test_compile_renders_lineage() {
        let (_dir, mut session, path) = fixture_session();
        session.load(&path.to_string_lossy(), None).unwrap();
        let pipeline = Pipeline::new().then(Op::Select {
            expr: CompiledExpr::compile("age > 30").unwrap(),
            policy: EvalPolicy::Strict,
        });
        session
            .apply("adults", &pipeline, Planner::default(), "select 'age > 30'")
            .unwrap();
        let pipeline = Pipeline::new().then(Op::Distinct);
        session
            .apply("unique_adults", &pipeline, Planner::default(), "distinct")
            .unwrap();

        let compiled = session.compile().unwrap();
        assert!(compiled.starts_with("ja select 'age > 30'"));
        assert!(compiled.ends_with("ja distinct -"));
        assert!(compiled.contains(" | "));
    }

    #[test]
    fn test_scratch_removed_on_drop() {
        let (_dir, mut session, path) = fixture_session();
        session.load(&path.to_string_lossy(), None).unwrap();
        let pipeline = Pipeline::new().then(Op::Distinct);
        session
            .apply("d", &pipeline, Planner::default(), "distinct")
            .unwrap();
        let scratch = session.scratch_dir().to_path_buf();
        assert!(scratch.exists());
        drop(session);
        assert!(!scratch.exists());
    }
}
