//! Two-pass parameter validation.
//!
//! Pass 1 builds a typed value for every declared field, falling back to the
//! field default. Pass 2 scans every realized value, defaults included, for
//! placeholder text. A field flagged by either pass is reported; a placeholder
//! always counts as missing.

use super::schema::{FieldSpec, ParamKind, ParamSchema, ParamValue, RawParams, ValidatedParams};
use serde_json::Value;
use std::fmt;

/// Values a model emits when it has nothing real to put in a field.
pub const SENTINEL_VALUES: [&str; 3] = ["", "unknown", "User requested cancellation"];

/// Trimmed, case-insensitive sentinel membership.
pub fn is_sentinel(value: &str) -> bool {
    let trimmed = value.trim();
    SENTINEL_VALUES
        .iter()
        .any(|s| trimmed.eq_ignore_ascii_case(s))
}

/// True when a raw JSON value carries no usable information.
pub fn is_sentinel_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => is_sentinel(s),
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueReason {
    /// Absent or `null`, with no default.
    Missing,
    /// Present but a placeholder such as `"unknown"`.
    Placeholder(String),
    TypeMismatch { expected: &'static str },
    TooShort { min_len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub reason: IssueReason,
}

impl FieldIssue {
    /// Missing and placeholder fields are asked for again; the rest need correcting.
    pub fn is_missing(&self) -> bool {
        matches!(
            self.reason,
            IssueReason::Missing | IssueReason::Placeholder(_)
        )
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            IssueReason::Missing => write!(f, "{}", self.field),
            IssueReason::Placeholder(v) if v.trim().is_empty() => {
                write!(f, "{} (empty)", self.field)
            }
            IssueReason::Placeholder(v) => write!(f, "{} (placeholder \"{v}\")", self.field),
            IssueReason::TypeMismatch { expected } => {
                write!(f, "{} (expected {expected})", self.field)
            }
            IssueReason::TooShort { min_len } => {
                write!(f, "{} (needs at least {min_len} characters)", self.field)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid(ValidatedParams),
    Invalid(Vec<FieldIssue>),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Field names of every issue, in schema order. Empty when valid.
    pub fn offending_fields(&self) -> Vec<&str> {
        match self {
            Self::Valid(_) => Vec::new(),
            Self::Invalid(issues) => issues.iter().map(|i| i.field.as_str()).collect(),
        }
    }
}

/// The value a field ends up with: the raw one when present and not null,
/// otherwise its default.
fn realized<'a>(field: &'a FieldSpec, raw: &'a RawParams) -> Option<&'a Value> {
    raw.get(&field.name)
        .filter(|v| !v.is_null())
        .or_else(|| field.default_value())
}

fn coerce(kind: &ParamKind, value: &Value) -> Result<ParamValue, IssueReason> {
    match kind {
        ParamKind::Int => coerce_int(value)
            .map(ParamValue::Int)
            .ok_or(IssueReason::TypeMismatch {
                expected: "an integer",
            }),
        ParamKind::Str { min_len } => {
            let s = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => {
                    return Err(IssueReason::TypeMismatch {
                        expected: "text",
                    })
                }
            };
            if s.chars().count() < *min_len {
                return Err(IssueReason::TooShort { min_len: *min_len });
            }
            Ok(ParamValue::Str(s))
        }
    }
}

fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Type-construction pass. Returns the typed values that succeeded and an
/// issue for each field that did not.
fn construct(
    schema: &ParamSchema,
    raw: &RawParams,
) -> (ValidatedParams, Vec<Option<IssueReason>>) {
    let mut params = ValidatedParams::default();
    let mut issues = Vec::with_capacity(schema.fields().len());

    for field in schema.fields() {
        let issue = match realized(field, raw) {
            None => Some(IssueReason::Missing),
            Some(value) => match coerce(&field.kind, value) {
                Ok(v) => {
                    params.push(field.name.clone(), v);
                    None
                }
                Err(reason) => Some(reason),
            },
        };
        issues.push(issue);
    }

    (params, issues)
}

/// Sentinel pass. Independent of [`construct`]: it sees defaults too.
fn scan_sentinels(schema: &ParamSchema, raw: &RawParams) -> Vec<Option<IssueReason>> {
    schema
        .fields()
        .iter()
        .map(|field| match realized(field, raw) {
            Some(Value::String(s)) if is_sentinel(s) => Some(IssueReason::Placeholder(s.clone())),
            _ => None,
        })
        .collect()
}

/// Validate raw parameters against a schema.
///
/// Keys not declared in the schema are ignored. Every offending field is
/// reported, in schema order, with one reason each; a placeholder wins over a
/// type or length failure on the same field.
pub fn validate(schema: &ParamSchema, raw: &RawParams) -> Validation {
    let (params, typed) = construct(schema, raw);
    let sentinels = scan_sentinels(schema, raw);

    let issues: Vec<FieldIssue> = schema
        .fields()
        .iter()
        .zip(typed.into_iter().zip(sentinels))
        .filter_map(|(field, (typed, sentinel))| {
            sentinel.or(typed).map(|reason| FieldIssue {
                field: field.name.clone(),
                reason,
            })
        })
        .collect();

    if issues.is_empty() {
        Validation::Valid(params)
    } else {
        Validation::Invalid(issues)
    }
}

/// Names of fields a follow-up message could fill, in schema order.
pub fn unfilled_fields<'a>(schema: &'a ParamSchema, raw: &RawParams) -> Vec<&'a str> {
    match validate(schema, raw) {
        Validation::Valid(_) => Vec::new(),
        Validation::Invalid(issues) => schema
            .fields()
            .iter()
            .filter(|f| issues.iter().any(|i| i.field == f.name))
            .map(|f| f.name.as_str())
            .collect(),
    }
}
