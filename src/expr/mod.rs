//! Expression engine: a small boolean/arithmetic filter language plus an
//! opt-in JMESPath advanced-query mode.
//!
//! Filter expressions use bare literals (`status == active` is a parse
//! error — strings are quoted — but `age > 30` and `name == 'Ada'` read
//! naturally). Backtick conventions belong exclusively to the JMESPath
//! sub-language.

mod eval;
mod parser;
mod tokens;

use serde_json::Value;

use crate::error::{JaError, Result};
use crate::value::{Path, Record};

pub use eval::truthy;

/// Comparison operators. A comparison never chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// The fixed, closed builtin function set. Nothing here can touch files,
/// processes, or anything outside the record under evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Lower,
    Upper,
    StartsWith,
    EndsWith,
    Contains,
    Length,
    Coalesce,
    Abs,
    Round,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "lower" => Builtin::Lower,
            "upper" => Builtin::Upper,
            "startswith" => Builtin::StartsWith,
            "endswith" => Builtin::EndsWith,
            "contains" => Builtin::Contains,
            "length" => Builtin::Length,
            "coalesce" => Builtin::Coalesce,
            "abs" => Builtin::Abs,
            "round" => Builtin::Round,
            _ => return None,
        })
    }

    /// (min, max) argument counts; `None` max means variadic.
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Builtin::Lower | Builtin::Upper | Builtin::Length | Builtin::Abs | Builtin::Round => {
                (1, Some(1))
            }
            Builtin::StartsWith | Builtin::EndsWith | Builtin::Contains => (2, Some(2)),
            Builtin::Coalesce => (1, None),
        }
    }

    pub fn arity_text(&self) -> String {
        match self.arity() {
            (min, Some(max)) if min == max => format!("{min}"),
            (min, Some(max)) => format!("{min}..{max}"),
            (min, None) => format!("at least {min}"),
        }
    }
}

/// Parsed expression tree. Evaluation dispatches over this enum; no
/// per-record closures are built.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Path(Path),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Arith {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Builtin,
        args: Vec<Expr>,
    },
}

/// A filter expression parsed once and reused across records.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    ast: Expr,
    text: String,
}

impl CompiledExpr {
    pub fn compile(text: &str) -> Result<Self> {
        let ast = parser::parse(text)?;
        Ok(CompiledExpr {
            ast,
            text: text.to_string(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Evaluate to a value; `Ok(None)` is absent.
    pub fn evaluate(&self, record: &Record) -> Result<Option<Value>> {
        eval::evaluate(&self.ast, record)
    }

    /// Evaluate as a predicate.
    pub fn matches(&self, record: &Record) -> Result<bool> {
        Ok(truthy(self.evaluate(record)?.as_ref()))
    }
}

/// A compiled JMESPath query used by `select --jmespath`. The record
/// passes when the search result is truthy.
pub struct AdvancedQuery {
    expression: jmespath::Expression<'static>,
}

impl AdvancedQuery {
    pub fn compile(text: &str) -> Result<Self> {
        let expression = jmespath::compile(text).map_err(|e| JaError::Expression {
            message: e.to_string(),
            position: None,
            source_text: text.to_string(),
        })?;
        Ok(AdvancedQuery { expression })
    }

    pub fn matches(&self, record: &Record) -> Result<bool> {
        let result = self
            .expression
            .search(Value::Object(record.clone()))
            .map_err(|e| JaError::eval(format!("jmespath: {e}")))?;
        Ok(result.is_truthy())
    }
}

impl std::fmt::Debug for AdvancedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvancedQuery")
            .field("expression", &self.expression.as_str())
            .finish()
    }
}

/// One output field of a projection.
#[derive(Debug, Clone)]
pub struct ProjectionField {
    /// Output key (the dotted spelling verbatim for bare paths).
    pub name: String,
    pub source: ProjectionSource,
}

#[derive(Debug, Clone)]
pub enum ProjectionSource {
    /// Bare path: copy the value found at the path.
    Path(Path),
    /// `name=expr`: computed field.
    Computed(CompiledExpr),
}

/// Parse a comma-separated projection spec: `a,b.c,total=amount*quantity`.
/// Commas inside parentheses or quotes do not split.
pub fn parse_projection(spec: &str) -> Result<Vec<ProjectionField>> {
    let mut fields: Vec<ProjectionField> = Vec::new();
    for part in split_top_level(spec, ',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(JaError::pipeline("empty projection field"));
        }
        let field = match split_assignment(part) {
            Some((name, expr_text)) => ProjectionField {
                name: name.trim().to_string(),
                source: ProjectionSource::Computed(CompiledExpr::compile(expr_text.trim())?),
            },
            None => ProjectionField {
                name: part.to_string(),
                source: ProjectionSource::Path(Path::parse(part)),
            },
        };
        if fields.iter().any(|f| f.name == field.name) {
            return Err(JaError::pipeline(format!(
                "duplicate projection output name '{}'",
                field.name
            )));
        }
        fields.push(field);
    }
    if fields.is_empty() {
        return Err(JaError::pipeline("projection needs at least one field"));
    }
    Ok(fields)
}

/// Split on a separator at nesting depth zero, respecting parentheses and
/// both quote styles. Shared by projection and aggregation spec parsing.
pub fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (idx, c) in text.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                c if c == separator && depth == 0 => {
                    parts.push(&text[start..idx]);
                    start = idx + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Split `name=body` at the first top-level `=` that is an assignment, not
/// part of `==`, `!=`, `<=`, or `>=`. Used by projection and aggregation
/// spec parsing.
pub fn split_assignment(text: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                '=' if depth == 0 => {
                    if chars.peek().map(|(_, n)| *n) == Some('=') {
                        chars.next();
                        continue;
                    }
                    if idx > 0 && text[..idx].ends_with(['!', '<', '>', '=']) {
                        continue;
                    }
                    return Some((&text[..idx], &text[idx + 1..]));
                }
                _ => {}
            },
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_projection_bare_and_computed() {
        let fields = parse_projection("a,b.c,doubled=a*2").unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].name, "a");
        assert_eq!(fields[1].name, "b.c");
        assert_eq!(fields[2].name, "doubled");
        assert!(matches!(fields[2].source, ProjectionSource::Computed(_)));
    }

    #[test]
    fn test_projection_duplicate_names_rejected() {
        let err = parse_projection("a,a").unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_split_respects_call_parens() {
        let parts = split_top_level("x=coalesce(a,b),y", ',');
        assert_eq!(parts, vec!["x=coalesce(a,b)", "y"]);
    }

    #[test]
    fn test_computed_field_with_comparison_keeps_eq() {
        let fields = parse_projection("adult=age >= 18").unwrap();
        assert_eq!(fields[0].name, "adult");
        let rec = record(json!({"age": 21}));
        match &fields[0].source {
            ProjectionSource::Computed(expr) => {
                assert_eq!(expr.evaluate(&rec).unwrap(), Some(json!(true)));
            }
            other => panic!("expected computed, got {other:?}"),
        }
    }

    #[test]
    fn test_advanced_query_truthiness() {
        let query = AdvancedQuery::compile("age > `25`").unwrap();
        assert!(query.matches(&record(json!({"age": 30}))).unwrap());
        assert!(!query.matches(&record(json!({"age": 20}))).unwrap());
    }
}
