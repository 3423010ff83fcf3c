//! Normalized-free query cache
//!
//! The cache stores whole query results keyed by query identity. List views
//! read their snapshot from here; mutations and subscriptions patch those
//! snapshots in place instead of refetching.
//!
//! # Identity
//!
//! A [`QueryKey`] is the query name plus the variables that select a distinct
//! result set. [`ListQuery`] declares which variables count (`key_args`), so
//! the available-books list filtered by `searchString = "dune"` and the
//! unfiltered one are separate snapshots, while paging cursors are not part
//! of the identity.
//!
//! # Writes
//!
//! Every snapshot carries a version. Read-modify-write callers use
//! [`QueryCache::write_query_if`], which only succeeds if nobody else wrote in
//! between; [`update_list`] wraps that in a bounded retry loop.

mod memory;
mod patch;

pub use memory::{CacheEvent, InMemoryCache};
pub use patch::{reconcile, CachePatch};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Attempts a read-modify-write makes before giving up on version conflicts.
pub const MAX_WRITE_ATTEMPTS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Snapshot {key} changed concurrently (expected v{expected}, found v{found})")]
    VersionConflict {
        key: QueryKey,
        expected: u64,
        found: u64,
    },

    #[error("Snapshot {key} has no list at field '{field}'")]
    ShapeMismatch { key: QueryKey, field: String },

    #[error("Snapshot {0} does not exist")]
    Missing(QueryKey),
}

/// Identity of a cached query result.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
    pub query: String,
    /// Canonical JSON of the identifying variables (`{}` when none).
    pub variables: String,
}

impl QueryKey {
    /// A key with no identifying variables.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: "{}".to_string(),
        }
    }

    /// A key identified by the given variables object. Non-object values are
    /// treated as no variables.
    pub fn with_variables(query: impl Into<String>, variables: &Value) -> Self {
        let canonical = match variables {
            Value::Object(map) => canonical_json(map),
            _ => "{}".to_string(),
        };
        Self {
            query: query.into(),
            variables: canonical,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.query, self.variables)
    }
}

/// Serialize with keys sorted regardless of serde_json's map ordering.
fn canonical_json(map: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    let body: Vec<String> = keys
        .into_iter()
        .map(|k| {
            let value = match &map[k] {
                Value::Object(inner) => canonical_json(inner),
                other => other.to_string(),
            };
            format!("{}:{}", Value::String(k.clone()), value)
        })
        .collect();
    format!("{{{}}}", body.join(","))
}

/// A list query: where its rows live in the result and which variables
/// identify a result set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListQuery {
    /// Operation name, e.g. `GetAvailableBooks`.
    pub name: String,
    /// Root field holding the list, e.g. `getAvailableBooks`.
    pub field: String,
    /// Variables that distinguish result sets. Empty means one shared set.
    pub key_args: Vec<String>,
}

impl ListQuery {
    pub fn new(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            key_args: Vec::new(),
        }
    }

    pub fn with_key_args(mut self, args: &[&str]) -> Self {
        self.key_args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Key of the result set fetched with `variables`.
    pub fn key(&self, variables: &Value) -> QueryKey {
        let mut identifying = Map::new();
        if let Value::Object(vars) = variables {
            for arg in &self.key_args {
                if let Some(v) = vars.get(arg) {
                    if !v.is_null() {
                        identifying.insert(arg.clone(), v.clone());
                    }
                }
            }
        }
        QueryKey::with_variables(self.name.clone(), &Value::Object(identifying))
    }

    /// Target for the result set fetched with `variables`.
    pub fn target(&self, variables: &Value) -> ListTarget {
        ListTarget {
            key: self.key(variables),
            field: self.field.clone(),
        }
    }

    /// Target for the result set fetched with no variables.
    pub fn unfiltered(&self) -> ListTarget {
        self.target(&Value::Null)
    }
}

/// One concrete cached list: a snapshot key plus the field holding the rows.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListTarget {
    pub key: QueryKey,
    pub field: String,
}

/// A cached query result at a given version.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub data: Value,
    pub version: u64,
}

impl Snapshot {
    /// Rows of the list at `field`, if the result holds one.
    pub fn list(&self, field: &str) -> Option<&Vec<Value>> {
        self.data.get(field).and_then(Value::as_array)
    }
}

/// Result store owned by the client.
pub trait QueryCache: Send + Sync {
    /// Current snapshot, or `None` if the query was never fetched.
    fn read_query(&self, key: &QueryKey) -> Option<Snapshot>;

    /// Store a result unconditionally. Returns the new version.
    fn write_query(&self, key: &QueryKey, data: Value) -> u64;

    /// Store a result only if the snapshot is still at `expected_version`.
    fn write_query_if(
        &self,
        key: &QueryKey,
        data: Value,
        expected_version: u64,
    ) -> Result<u64, CacheError>;

    /// Drop a snapshot. Returns whether one existed.
    fn evict(&self, key: &QueryKey) -> bool;
}

/// What a list update did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The snapshot was rewritten at this version.
    Applied { version: u64 },
    /// The list was never fetched; nothing was written.
    Skipped,
}

/// Read a cached list, transform its rows, and write it back, retrying when
/// another writer got in between. A snapshot that does not exist is left
/// alone.
pub fn update_list<F>(
    cache: &dyn QueryCache,
    target: &ListTarget,
    mut transform: F,
) -> Result<PatchOutcome, CacheError>
where
    F: FnMut(Vec<Value>) -> Vec<Value>,
{
    let mut last_conflict = None;

    for _ in 0..MAX_WRITE_ATTEMPTS {
        let Some(snapshot) = cache.read_query(&target.key) else {
            return Ok(PatchOutcome::Skipped);
        };
        let rows = snapshot
            .list(&target.field)
            .cloned()
            .ok_or_else(|| CacheError::ShapeMismatch {
                key: target.key.clone(),
                field: target.field.clone(),
            })?;

        let mut data = snapshot.data.clone();
        if let Some(obj) = data.as_object_mut() {
            obj.insert(target.field.clone(), Value::Array(transform(rows)));
        }

        match cache.write_query_if(&target.key, data, snapshot.version) {
            Ok(version) => return Ok(PatchOutcome::Applied { version }),
            Err(conflict @ CacheError::VersionConflict { .. }) => {
                log::debug!("Retrying write to {}: {}", target.key, conflict);
                last_conflict = Some(conflict);
            }
            Err(CacheError::Missing(_)) => return Ok(PatchOutcome::Skipped),
            Err(other) => return Err(other),
        }
    }

    Err(last_conflict.unwrap_or_else(|| CacheError::Missing(target.key.clone())))
}

/// How a fetched page combines with what is already cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PagePolicy {
    /// The page becomes the whole list.
    Replace,
    /// The page is appended to the existing rows.
    Concat,
}

/// Store a fetched page of a list query.
pub fn store_page(
    cache: &dyn QueryCache,
    target: &ListTarget,
    rows: Vec<Value>,
    policy: PagePolicy,
) -> Result<u64, CacheError> {
    if policy == PagePolicy::Concat {
        let outcome = update_list(cache, target, |mut existing| {
            existing.extend(rows.iter().cloned());
            existing
        })?;
        if let PatchOutcome::Applied { version } = outcome {
            return Ok(version);
        }
    }

    let mut data = Map::new();
    data.insert(target.field.clone(), Value::Array(rows));
    Ok(cache.write_query(&target.key, Value::Object(data)))
}
