//! Error taxonomy for pipeline execution.
//!
//! Operator-level failures are values, not panics: every fallible core
//! function returns `Result<_, JaError>` and the CLI edge converts the
//! error class into a process exit code.

use std::fmt;

use thiserror::Error;

/// All error kinds the engine can produce.
#[derive(Debug, Error)]
pub enum JaError {
    /// A line of input was not a valid JSONL record.
    #[error("{path}:{line}: parse error: {reason}")]
    InputParse {
        path: String,
        /// 1-based line number.
        line: usize,
        reason: String,
    },

    /// A filter or projection expression failed to parse.
    #[error("invalid expression: {message}")]
    Expression {
        message: String,
        /// Byte offset into the expression text, for the caret diagnostic.
        position: Option<usize>,
        source_text: String,
    },

    /// A per-record evaluation failure (division by zero, type mismatch).
    #[error("evaluation error: {0}")]
    Eval(String),

    /// A structural pipeline failure: unknown dataset, rename collision,
    /// duplicate projection names, inconsistent group metadata.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CLI / argument level misuse detected past clap.
    #[error("usage error: {0}")]
    Usage(String),

    /// Generic failure outside the structured taxonomy (serialization,
    /// unexpected driver states). Maps to the generic exit code.
    #[error("{0}")]
    Internal(String),
}

impl JaError {
    pub fn expression(message: impl Into<String>, position: usize, text: &str) -> Self {
        JaError::Expression {
            message: message.into(),
            position: Some(position),
            source_text: text.to_string(),
        }
    }

    pub fn eval(message: impl fmt::Display) -> Self {
        JaError::Eval(message.to_string())
    }

    pub fn pipeline(message: impl fmt::Display) -> Self {
        JaError::Pipeline(message.to_string())
    }

    pub fn internal(message: impl fmt::Display) -> Self {
        JaError::Internal(message.to_string())
    }

    /// Whether this error aborts the whole pipeline regardless of policy.
    ///
    /// Only per-record evaluation errors are downgradable (lenient mode
    /// drops the row and counts it).
    pub fn is_per_record(&self) -> bool {
        matches!(self, JaError::Eval(_))
    }

    /// Stable kind tag, used by the JSON error sink.
    pub fn kind(&self) -> &'static str {
        match self {
            JaError::InputParse { .. } => "input_parse",
            JaError::Expression { .. } => "expression",
            JaError::Eval(_) => "eval",
            JaError::Pipeline(_) => "pipeline",
            JaError::Io(_) => "io",
            JaError::Usage(_) => "usage",
            JaError::Internal(_) => "internal",
        }
    }

    /// Process exit code for the CLI edge.
    pub fn exit_code(&self) -> i32 {
        match self {
            JaError::Internal(_) => 1,
            JaError::Usage(_) => 2,
            JaError::Io(_) => 3,
            JaError::InputParse { .. }
            | JaError::Expression { .. }
            | JaError::Eval(_)
            | JaError::Pipeline(_) => 4,
        }
    }

    /// Multi-line rendering with a caret under the offending position,
    /// for expression parse errors.
    pub fn render_diagnostic(&self) -> String {
        match self {
            JaError::Expression {
                message,
                position: Some(pos),
                source_text,
            } => {
                let caret_line = format!("{}^", " ".repeat(*pos));
                format!("invalid expression: {message}\n  {source_text}\n  {caret_line}")
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, JaError>;

/// Advisory planner notices. Never abort execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityWarning {
    /// Windowed mode was requested: results are per-window approximations.
    WindowedApproximation { operation: &'static str },
    /// A materializing operator will run over a large input.
    LargeMaterialization {
        operation: &'static str,
        input_bytes: u64,
    },
    /// Streaming was requested for an operator that cannot stream;
    /// execution falls back to materializing.
    StreamingFallback { operation: &'static str },
}

impl fmt::Display for CapabilityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityWarning::WindowedApproximation { operation } => write!(
                f,
                "windowed {operation} applies the operation per window; results approximate the unwindowed output"
            ),
            CapabilityWarning::LargeMaterialization {
                operation,
                input_bytes,
            } => write!(
                f,
                "{operation} materializes its input ({input_bytes} bytes); consider --window-size for bounded memory"
            ),
            CapabilityWarning::StreamingFallback { operation } => {
                write!(f, "{operation} cannot stream; falling back to materializing")
            }
        }
    }
}
