//! Field error normalization
//!
//! Local validation failures and server-returned field errors are folded into
//! the same `ErrorSet`, so a form renders "Title is required" the same way no
//! matter which side enforced the rule. Transport failures only ever occupy
//! the form-level slot.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single `{path, message}` pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name; `None` for errors that are not attributable to a field.
    pub path: Option<String>,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            message: message.into(),
        }
    }

    /// An error with no field attribution.
    pub fn form(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }

    /// Parse one server error object.
    ///
    /// `path` may be a plain field name or a GraphQL response path such as
    /// `["addBook", "title"]`, in which case the last string segment names the
    /// field.
    pub fn from_value(value: &Value) -> Option<Self> {
        let message = value.get("message")?.as_str()?.to_string();
        let path = match value.get("path") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Array(segments)) => segments
                .iter()
                .rev()
                .find_map(|segment| segment.as_str().map(str::to_string)),
            _ => None,
        };
        Some(Self { path, message })
    }

    /// Parse one entry of a response's top-level `errors`. A path naming only
    /// the root field (`["addAuthor"]`) blames the whole operation, so the
    /// error goes to the form.
    pub fn from_response_error(value: &Value) -> Option<Self> {
        let mut error = Self::from_value(value)?;
        if let Some(Value::Array(segments)) = value.get("path") {
            if segments.len() <= 1 {
                error.path = None;
            }
        }
        Some(error)
    }

    /// Parse a server error payload that is either a list of error objects or
    /// a single error object. Anything else yields no errors.
    pub fn list_from_value(value: &Value) -> Vec<Self> {
        match value {
            Value::Array(items) => items.iter().filter_map(Self::from_value).collect(),
            Value::Object(_) => Self::from_value(value).into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

/// Field name to message, plus an optional form-level message.
///
/// Any entry means the form is invalid; an empty set means no errors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSet {
    fields: BTreeMap<String, String>,
    form: Option<String>,
}

impl ErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// An error set holding only a form-level message.
    pub fn form_level(message: impl Into<String>) -> Self {
        Self {
            fields: BTreeMap::new(),
            form: Some(message.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.form.is_none()
    }

    /// Number of fields carrying a message.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn form_message(&self) -> Option<&str> {
        self.form.as_deref()
    }

    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.insert(field.into(), message.into());
    }

    pub fn set_form_message(&mut self, message: impl Into<String>) {
        self.form = Some(message.into());
    }

    /// Drop the message for one field (the user edited it).
    pub fn clear_field(&mut self, field: &str) -> bool {
        self.fields.remove(field).is_some()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.form = None;
    }

    /// Field names in order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn absorb(&mut self, error: &FieldError) {
        match &error.path {
            Some(path) => {
                self.fields.insert(path.clone(), error.message.clone());
            }
            None => self.form = Some(error.message.clone()),
        }
    }
}

/// Fold local validation failures into an `ErrorSet`.
///
/// Pure: the same failures always yield the same set. When a path repeats,
/// the later message wins.
pub fn format_validation_errors(failures: &[FieldError]) -> ErrorSet {
    let mut set = ErrorSet::new();
    for failure in failures {
        set.absorb(failure);
    }
    set
}

/// Fold server-returned `{path, message}` errors into an `ErrorSet`.
pub fn format_server_errors(errors: &[FieldError]) -> ErrorSet {
    let mut set = ErrorSet::new();
    for error in errors {
        set.absorb(error);
    }
    set
}
