//! Input payloads and entity identity
//!
//! A `Record` is the flat key/value payload a form submits. Entities coming
//! back from the server are plain JSON objects; the only thing the client core
//! needs to know about them is their `id`.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Flat key/value payload of a form submission.
pub type Record = Map<String, Value>;

/// Normalized entity identifier.
///
/// GraphQL `ID`s arrive as strings from some resolvers and as integers from
/// others, so `"7"` and `7` name the same entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityId(String);

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        EntityId::from_value(&value).ok_or_else(|| de::Error::custom(format!("invalid entity id: {}", value)))
    }
}

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        EntityId(id.into())
    }

    /// Normalize a bare id value (string or number).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(EntityId(s.clone())),
            Value::Number(n) => Some(EntityId(n.to_string())),
            _ => None,
        }
    }

    /// Extract the id of an entity object.
    pub fn of(entity: &Value) -> Option<Self> {
        entity.get("id").and_then(Self::from_value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        EntityId(n.to_string())
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

/// True when `value` is missing, `null`, or an empty / whitespace-only string.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// A locally picked file waiting to be uploaded with a mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpload {
    pub uri: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub name: String,
}

impl FileUpload {
    /// Marker key identifying an upload object inside a JSON payload.
    pub const MARKER: &'static str = "__upload";

    /// Wrap a picked file, naming it after the last segment of its uri.
    pub fn from_picked(uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        let uri = uri.into();
        let name = uri
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or("upload")
            .to_string();
        Self {
            uri,
            mime_type: mime_type.into(),
            name,
        }
    }

    /// Embed the upload into a JSON payload.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            Self::MARKER: true,
            "uri": self.uri,
            "type": self.mime_type,
            "name": self.name,
        })
    }

    /// Recognize an upload object previously produced by [`FileUpload::to_value`]
    /// or a bare picker result carrying a `uri`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let uri = obj.get("uri")?.as_str()?;
        if uri.is_empty() {
            return None;
        }
        let mime_type = obj
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("application/octet-stream");
        let mut upload = Self::from_picked(uri, mime_type);
        if let Some(name) = obj.get("name").and_then(Value::as_str) {
            upload.name = name.to_string();
        }
        Some(upload)
    }

    /// Whether a JSON value is an embedded upload.
    pub fn is_upload(value: &Value) -> bool {
        value
            .get(Self::MARKER)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Local filesystem path behind the uri.
    pub fn local_path(&self) -> &str {
        self.uri.strip_prefix("file://").unwrap_or(&self.uri)
    }
}
