//! Execution planning: stream, materialize, or window.
//!
//! The planner inspects an operator chain's memory classes and picks an
//! execution mode, collecting advisory warnings up front so the driver can
//! surface them before any record flows. Warnings never abort. The size
//! heuristic is a file-size check, not a row estimate.

use tracing::warn;

use crate::error::CapabilityWarning;
use crate::ops::RecordStream;
use crate::pipeline::{OpClass, Pipeline, Windowed};

/// Bytes above which a materializing operator earns a warning.
const LARGE_INPUT_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Every operator streams; O(1) records in flight (plus bounded state).
    Stream,
    /// At least one operator holds a whole relation.
    Materialize,
    /// Materializing operators run per fixed-size batch; approximate.
    Windowed(usize),
}

#[derive(Debug)]
pub struct Plan {
    pub mode: ExecutionMode,
    pub warnings: Vec<CapabilityWarning>,
}

/// Planning inputs gathered by the driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct Planner {
    /// `--window-size N`, when the user asked for bounded memory.
    pub window_size: Option<usize>,
    /// Input size from file metadata; stdin has none.
    pub input_bytes: Option<u64>,
    /// The caller wants lazy/streaming execution.
    pub streaming_requested: bool,
}

impl Planner {
    pub fn plan(&self, pipeline: &Pipeline) -> Plan {
        let ops = pipeline.ops();
        let materializing: Vec<_> = ops
            .iter()
            .filter(|op| op.class() == OpClass::Materializing)
            .collect();

        let mut warnings = Vec::new();

        if let Some(size) = self.window_size {
            let windowable = materializing.iter().any(|op| op.supports_windowing());
            // Operators with no windowed semantics (join, product) fall
            // back to full materialization even under --window-size.
            for op in materializing.iter().filter(|op| !op.supports_windowing()) {
                warnings.push(CapabilityWarning::StreamingFallback { operation: op.name() });
            }
            if windowable {
                for op in materializing.iter().filter(|op| op.supports_windowing()) {
                    warnings.push(CapabilityWarning::WindowedApproximation {
                        operation: op.name(),
                    });
                }
                return Plan {
                    mode: ExecutionMode::Windowed(size),
                    warnings,
                };
            }
            if materializing.is_empty() {
                return Plan {
                    mode: ExecutionMode::Stream,
                    warnings,
                };
            }
            return Plan {
                mode: ExecutionMode::Materialize,
                warnings,
            };
        }

        if materializing.is_empty() {
            return Plan {
                mode: ExecutionMode::Stream,
                warnings,
            };
        }

        if self.streaming_requested {
            for op in &materializing {
                warnings.push(CapabilityWarning::StreamingFallback { operation: op.name() });
            }
        }
        if let Some(bytes) = self.input_bytes {
            if bytes > LARGE_INPUT_BYTES {
                for op in &materializing {
                    warnings.push(CapabilityWarning::LargeMaterialization {
                        operation: op.name(),
                        input_bytes: bytes,
                    });
                }
            }
        }

        Plan {
            mode: ExecutionMode::Materialize,
            warnings,
        }
    }
}

/// Log the plan's warnings before execution starts.
pub fn emit_warnings(plan: &Plan) {
    for warning in &plan.warnings {
        warn!("{warning}");
    }
}

/// Execute a pipeline under a plan. Stream and materialize modes share the
/// lazy chain (materializing operators buffer internally on first pull);
/// windowed mode wraps each windowable operator in fixed-size batching.
pub fn execute<'a>(pipeline: &'a Pipeline, input: RecordStream<'a>, plan: &Plan) -> RecordStream<'a> {
    match plan.mode {
        ExecutionMode::Stream | ExecutionMode::Materialize => pipeline.stream(input),
        ExecutionMode::Windowed(size) => {
            let mut current = input;
            for op in pipeline.ops() {
                if op.class() == OpClass::Materializing && op.supports_windowing() {
                    current = Box::new(Windowed::new(current, op, size));
                } else {
                    current = op.apply_stream(current);
                }
            }
            current
        }
    }
}

/// File-size hint for the planner; `None` for stdin or unstattable paths.
pub fn input_size_hint(path: Option<&str>) -> Option<u64> {
    match path {
        Some(p) if p != "-" => std::fs::metadata(p).ok().map(|m| m.len()),
        _ => None,
    }
}
