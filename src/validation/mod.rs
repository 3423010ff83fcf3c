//! Declarative field validation
//!
//! A `Schema` is an ordered list of `Field`s, each with a kind (string,
//! number, date, file) and a list of rules. Validation never stops at the
//! first failing field: every field is checked and each failing field
//! contributes exactly one message.
//!
//! Rule evaluation per field:
//! 1. `required` is checked first, whatever its position in the builder chain.
//! 2. A blank value on a non-required field skips every other rule.
//! 3. The value must parse as the field's kind.
//! 4. Remaining rules run in declaration order; the first failure wins.

pub mod schemas;

use crate::errors::FieldError;
use crate::record::{is_blank, FileUpload, Record};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::{Number, Value};
use std::sync::LazyLock;
use thiserror::Error;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

/// Local validation failure: one entry per failing field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} field(s) failed validation", .failures.len())]
pub struct ValidationError {
    pub failures: Vec<FieldError>,
}

impl ValidationError {
    pub fn paths(&self) -> Vec<&str> {
        self.failures
            .iter()
            .filter_map(|f| f.path.as_deref())
            .collect()
    }
}

/// What a field's value must parse as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Date,
    File,
}

#[derive(Clone, Debug)]
enum Rule {
    Min(f64, Option<String>),
    Max(f64, Option<String>),
    Email(Option<String>),
    Matches(Regex, Option<String>),
    Positive(Option<String>),
    Integer(Option<String>),
    EqualsField(String, Option<String>),
}

/// One field of a schema, built fluently.
#[derive(Clone, Debug)]
pub struct Field {
    name: String,
    kind: FieldKind,
    required: Option<String>,
    rules: Vec<Rule>,
    default: Option<Value>,
}

impl Field {
    fn of_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: None,
            rules: Vec::new(),
            default: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::of_kind(name, FieldKind::String)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::of_kind(name, FieldKind::Number)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::of_kind(name, FieldKind::Date)
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self::of_kind(name, FieldKind::File)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required.is_some()
    }

    pub fn required(mut self, message: impl Into<String>) -> Self {
        self.required = Some(message.into());
        self
    }

    /// Minimum length for strings, minimum value for numbers.
    pub fn min(mut self, min: usize, message: impl Into<String>) -> Self {
        self.rules.push(Rule::Min(min as f64, Some(message.into())));
        self
    }

    /// `min` with the default message.
    pub fn min_len(mut self, min: usize) -> Self {
        self.rules.push(Rule::Min(min as f64, None));
        self
    }

    /// Maximum length for strings, maximum value for numbers.
    pub fn max(mut self, max: usize, message: impl Into<String>) -> Self {
        self.rules.push(Rule::Max(max as f64, Some(message.into())));
        self
    }

    /// `max` with the default message.
    pub fn max_len(mut self, max: usize) -> Self {
        self.rules.push(Rule::Max(max as f64, None));
        self
    }

    pub fn email(mut self, message: impl Into<String>) -> Self {
        self.rules.push(Rule::Email(Some(message.into())));
        self
    }

    pub fn matches(mut self, pattern: Regex, message: impl Into<String>) -> Self {
        self.rules.push(Rule::Matches(pattern, Some(message.into())));
        self
    }

    pub fn positive(mut self) -> Self {
        self.rules.push(Rule::Positive(None));
        self
    }

    pub fn integer(mut self, message: impl Into<String>) -> Self {
        self.rules.push(Rule::Integer(Some(message.into())));
        self
    }

    /// Value must equal the value of `other` in the same payload.
    pub fn equals_field(mut self, other: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules
            .push(Rule::EqualsField(other.into(), Some(message.into())));
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    fn is_present(&self, value: Option<&Value>) -> bool {
        match self.kind {
            FieldKind::File => value.and_then(FileUpload::from_value).is_some(),
            _ => !is_blank(value),
        }
    }

    fn type_message(&self) -> String {
        let kind = match self.kind {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Date => "date",
            FieldKind::File => "file",
        };
        format!("{} must be a `{}` type", self.name, kind)
    }

    /// Check one field against the whole payload. Returns the message of the
    /// first failing rule.
    fn check(&self, input: &Record) -> Option<String> {
        let value = input.get(&self.name);

        if !self.is_present(value) {
            return self.required.clone();
        }
        let value = value?;

        match self.kind {
            FieldKind::String => {
                let Some(s) = value.as_str() else {
                    return Some(self.type_message());
                };
                self.rules
                    .iter()
                    .find_map(|rule| self.check_string(rule, s, input))
            }
            FieldKind::Number => {
                let Some(n) = parse_number(value) else {
                    return Some(self.type_message());
                };
                self.rules.iter().find_map(|rule| self.check_number(rule, n))
            }
            FieldKind::Date => {
                if parse_date(value).is_none() {
                    return Some(self.type_message());
                }
                None
            }
            FieldKind::File => None,
        }
    }

    fn check_string(&self, rule: &Rule, s: &str, input: &Record) -> Option<String> {
        let len = s.chars().count() as f64;
        match rule {
            Rule::Min(min, msg) if len < *min => Some(msg.clone().unwrap_or_else(|| {
                format!("{} must be at least {} characters", self.name, min)
            })),
            Rule::Max(max, msg) if len > *max => Some(msg.clone().unwrap_or_else(|| {
                format!("{} must be at most {} characters", self.name, max)
            })),
            Rule::Email(msg) if !EMAIL_RE.is_match(s) => Some(
                msg.clone()
                    .unwrap_or_else(|| format!("{} must be a valid email", self.name)),
            ),
            Rule::Matches(re, msg) if !re.is_match(s) => Some(msg.clone().unwrap_or_else(|| {
                format!("{} must match the following: \"{}\"", self.name, re.as_str())
            })),
            Rule::EqualsField(other, msg) => {
                let other_value = input.get(other).and_then(Value::as_str).unwrap_or("");
                if other_value != s {
                    Some(
                        msg.clone()
                            .unwrap_or_else(|| format!("{} must match {}", self.name, other)),
                    )
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn check_number(&self, rule: &Rule, n: f64) -> Option<String> {
        match rule {
            Rule::Min(min, msg) if n < *min => Some(msg.clone().unwrap_or_else(|| {
                format!("{} must be greater than or equal to {}", self.name, min)
            })),
            Rule::Max(max, msg) if n > *max => Some(msg.clone().unwrap_or_else(|| {
                format!("{} must be less than or equal to {}", self.name, max)
            })),
            Rule::Positive(msg) if n <= 0.0 => Some(
                msg.clone()
                    .unwrap_or_else(|| format!("{} must be a positive number", self.name)),
            ),
            Rule::Integer(msg) if n.fract() != 0.0 => Some(
                msg.clone()
                    .unwrap_or_else(|| format!("{} must be an integer", self.name)),
            ),
            _ => None,
        }
    }
}

/// Parse a JSON number or a numeric string.
fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// An ordered set of field rules.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Validate every field, collecting one failure per failing field.
    pub fn validate(&self, input: &Record) -> Result<(), ValidationError> {
        let failures: Vec<FieldError> = self
            .fields
            .iter()
            .filter_map(|field| {
                field
                    .check(input)
                    .map(|message| FieldError::new(field.name.clone(), message))
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { failures })
        }
    }

    /// Coerce the payload into its wire shape: numeric strings become numbers
    /// (integers when whole), defaults fill blanks,
    /// picked files become upload objects. Fields not named by the schema pass
    /// through untouched.
    pub fn cast(&self, input: &Record) -> Record {
        let mut out = input.clone();
        for field in &self.fields {
            let current = out.get(&field.name);
            if is_blank(current) {
                if let Some(default) = &field.default {
                    out.insert(field.name.clone(), default.clone());
                }
                continue;
            }
            let Some(current) = current else { continue };

            let cast = match field.kind {
                FieldKind::Number => cast_number(current),
                FieldKind::File => FileUpload::from_value(current).map(|u| u.to_value()),
                _ => None,
            };
            if let Some(cast) = cast {
                out.insert(field.name.clone(), cast);
            }
        }
        out
    }
}

/// Whole numbers go out as integers so `Int` arguments accept them; `Float`
/// arguments accept either.
fn cast_number(value: &Value) -> Option<Value> {
    let n = parse_number(value)?;
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Some(Value::Number(Number::from(n as i64)));
    }
    Number::from_f64(n).map(Value::Number)
}
