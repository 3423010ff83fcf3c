//! Upload extraction for GraphQL multipart requests
//!
//! Files embedded in the variables are replaced by `null` and listed with the
//! dotted path they came from (`variables.coverFile`), which is what the
//! multipart `map` part refers to.

use serde_json::Value;

use crate::record::FileUpload;

/// Replace every embedded upload with `null`, returning the stripped
/// variables and the uploads with their operation paths.
pub fn extract_uploads(variables: &Value) -> (Value, Vec<(String, FileUpload)>) {
    let mut files = Vec::new();
    let stripped = walk(variables, "variables", &mut files);
    (stripped, files)
}

fn walk(value: &Value, path: &str, files: &mut Vec<(String, FileUpload)>) -> Value {
    if FileUpload::is_upload(value) {
        if let Some(upload) = FileUpload::from_value(value) {
            files.push((path.to_string(), upload));
            return Value::Null;
        }
    }
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), walk(v, &format!("{}.{}", path, k), files)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| walk(v, &format!("{}.{}", path, i), files))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// The multipart `map` part: file index to the paths it fills.
pub fn upload_map(files: &[(String, FileUpload)]) -> Value {
    let map: serde_json::Map<String, Value> = files
        .iter()
        .enumerate()
        .map(|(i, (path, _))| (i.to_string(), Value::Array(vec![Value::String(path.clone())])))
        .collect();
    Value::Object(map)
}
