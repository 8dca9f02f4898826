//! # ja - Relational algebra over JSON Lines
//!
//! A streaming engine for relational operations on JSONL data: filter,
//! project, join, group, and aggregate unordered collections of JSON
//! records, with bounded-memory execution modes and an interactive
//! workspace.
//!
//! ## Modules
//!
//! - **value**: dotted-path access and structural comparison
//! - **expr**: the filter/projection expression language
//! - **io**: lazy JSONL reader, writer, and random-access index
//! - **ops**: streaming and materializing relational operators
//! - **group** / **agg**: metadata-preserving grouping and aggregation
//! - **plan**: stream/materialize/windowed execution planning
//! - **pipeline**: composable operator chains
//! - **workspace**: named dataset registry for the REPL
//! - **schema**: JSON-Schema-shaped inference
//!
//! ## Quick Start
//!
//! ```rust
//! use ja::expr::CompiledExpr;
//! use ja::ops::EvalPolicy;
//! use ja::pipeline::{Op, Pipeline};
//! use serde_json::json;
//!
//! # fn main() -> ja::Result<()> {
//! let records = vec![
//!     json!({"name": "Ada", "age": 36}).as_object().unwrap().clone(),
//!     json!({"name": "Bob", "age": 20}).as_object().unwrap().clone(),
//! ];
//!
//! let pipeline = Pipeline::new()
//!     .then(Op::Select {
//!         expr: CompiledExpr::compile("age > 30")?,
//!         policy: EvalPolicy::Strict,
//!     })
//!     .then(Op::Project {
//!         fields: ja::expr::parse_projection("name")?,
//!         options: Default::default(),
//!         policy: EvalPolicy::Strict,
//!     });
//!
//! let out = pipeline.run(records)?;
//! assert_eq!(out.len(), 1);
//! assert_eq!(out[0].get("name"), Some(&json!("Ada")));
//! # Ok(())
//! # }
//! ```
//!
//! ## Grouping
//!
//! ```rust
//! use ja::agg::{aggregate, parse_agg_spec, AggRegistry};
//! use ja::group::group_by;
//! use ja::value::Path;
//! use serde_json::json;
//!
//! # fn main() -> ja::Result<()> {
//! let records = vec![
//!     json!({"region": "N", "amount": 10}).as_object().unwrap().clone(),
//!     json!({"region": "N", "amount": 5}).as_object().unwrap().clone(),
//! ];
//!
//! let grouped = group_by(records, &Path::parse("region"))?;
//! let specs = parse_agg_spec("total=sum(amount)")?;
//! let out = aggregate(grouped, &specs, &AggRegistry::default(), false)?;
//! assert_eq!(out[0].get("total"), Some(&json!(15)));
//! # Ok(())
//! # }
//! ```

pub mod agg;
pub mod error;
pub mod expr;
pub mod group;
pub mod io;
pub mod ops;
pub mod pipeline;
pub mod plan;
pub mod schema;
pub mod value;
pub mod workspace;

pub use error::{CapabilityWarning, JaError, Result};
pub use value::{Path, Record};
