//! Subscription-fed lists
//!
//! A live list keeps one cached list current from server-pushed events. Each
//! event's entity is merged into the cached rows with a [`MergePolicy`]; the
//! write goes through the same compare-and-swap path as mutation patches, so
//! a merge never overwrites a concurrent reconciliation.
//!
//! [`attach`] spawns one task per subscription and returns a
//! [`SubscriptionHandle`]. Disposing or dropping the handle stops the task;
//! no event is applied after disposal completes.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::cache::{update_list, ListTarget, PatchOutcome, QueryCache};
use crate::record::EntityId;
use crate::transport::{EventStream, OperationRequest, SubscriptionTransport, TransportError};

pub type MergeFn = Arc<dyn Fn(&[Value], &Value) -> Vec<Value> + Send + Sync>;

/// How an event's entity joins the previous list.
#[derive(Clone)]
pub enum MergePolicy {
    /// Replace the row sharing the entity's id, else append as newest.
    AppendIfNew,
    /// Replace the row sharing the entity's id, else insert first.
    PrependIfNew,
    /// Replace the row sharing the entity's id, else leave the list alone.
    ReplaceById,
    Custom(MergeFn),
}

impl fmt::Debug for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicy::AppendIfNew => write!(f, "AppendIfNew"),
            MergePolicy::PrependIfNew => write!(f, "PrependIfNew"),
            MergePolicy::ReplaceById => write!(f, "ReplaceById"),
            MergePolicy::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Merge `entity` into `previous`. Redelivering the same entity with any of
/// the built-in policies leaves the list unchanged.
pub fn merge(policy: &MergePolicy, previous: Vec<Value>, entity: &Value) -> Vec<Value> {
    if let MergePolicy::Custom(f) = policy {
        return f(&previous, entity);
    }

    let id = EntityId::of(entity);
    let position = id
        .as_ref()
        .and_then(|id| previous.iter().position(|row| EntityId::of(row).as_ref() == Some(id)));

    let mut rows = previous;
    match (position, policy) {
        (Some(i), _) => rows[i] = entity.clone(),
        (None, MergePolicy::AppendIfNew) => rows.push(entity.clone()),
        (None, MergePolicy::PrependIfNew) => rows.insert(0, entity.clone()),
        (None, _) => {}
    }
    rows
}

/// A subscription operation and where its entity sits in each event.
#[derive(Clone, Debug, PartialEq)]
pub struct SubscriptionSpec {
    pub operation_name: String,
    pub document: String,
    /// Path from the event's data to the entity, e.g. `["latestOrder", "order"]`.
    pub event_path: Vec<String>,
    pub variables: Value,
}

impl SubscriptionSpec {
    pub fn new(operation_name: impl Into<String>, document: impl Into<String>, event_path: &[&str]) -> Self {
        Self {
            operation_name: operation_name.into(),
            document: document.into(),
            event_path: event_path.iter().map(|s| s.to_string()).collect(),
            variables: Value::Object(Default::default()),
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }

    pub fn request(&self) -> OperationRequest {
        OperationRequest::new(
            self.operation_name.clone(),
            self.document.clone(),
            self.variables.clone(),
        )
    }

    /// The entity carried by an event, if any.
    pub fn entity<'a>(&self, data: &'a Value) -> Option<&'a Value> {
        self.event_path
            .iter()
            .try_fold(data, |v, segment| v.get(segment))
            .filter(|v| v.is_object())
    }
}

/// Counters derived from the events a live list has seen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListStats {
    pub events_applied: u64,
    /// Events ignored: no data, no entity, cold snapshot or a failed write.
    pub skipped: u64,
    /// Entities added since the badge was last cleared.
    pub badge: u64,
    /// Rows in the list after the last applied event.
    pub len: usize,
}

/// Disposer for one live list.
pub struct SubscriptionHandle {
    id: Uuid,
    operation_name: String,
    task: Option<JoinHandle<()>>,
    stats_tx: Arc<watch::Sender<ListStats>>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stats(&self) -> ListStats {
        self.stats_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ListStats> {
        self.stats_tx.subscribe()
    }

    /// The user looked at the list.
    pub fn clear_badge(&self) {
        self.stats_tx.send_if_modified(|stats| {
            let changed = stats.badge != 0;
            stats.badge = 0;
            changed
        });
    }

    /// False once the event stream ended or the handle was disposed.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop reacting to events and wait for the task to wind down.
    pub async fn dispose(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            log::debug!("Disposed subscription {} ({})", self.operation_name, self.id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::debug!("Dropped subscription {} ({})", self.operation_name, self.id);
        }
    }
}

/// Apply every event from `stream` to the cached list at `target`, in
/// delivery order.
pub fn attach(
    cache: Arc<dyn QueryCache>,
    target: ListTarget,
    spec: &SubscriptionSpec,
    policy: MergePolicy,
    mut stream: EventStream,
) -> SubscriptionHandle {
    let id = Uuid::new_v4();
    let (stats_tx, _) = watch::channel(ListStats::default());
    let stats_tx = Arc::new(stats_tx);

    let label = target.key.to_string();
    let task_stats = stats_tx.clone();
    let task_spec = spec.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = stream.recv().await {
            let Some(entity) = event.data.as_ref().and_then(|d| task_spec.entity(d)) else {
                log::debug!("{} event without an entity, ignoring", task_spec.operation_name);
                task_stats.send_modify(|s| s.skipped += 1);
                continue;
            };

            let mut grew = false;
            let mut len = 0;
            let outcome = update_list(cache.as_ref(), &target, |rows| {
                let before = rows.len();
                let merged = merge(&policy, rows, entity);
                grew = merged.len() > before;
                len = merged.len();
                merged
            });

            match outcome {
                Ok(PatchOutcome::Applied { .. }) => task_stats.send_modify(|s| {
                    s.events_applied += 1;
                    s.len = len;
                    if grew {
                        s.badge += 1;
                    }
                }),
                Ok(PatchOutcome::Skipped) => {
                    log::debug!("No cached snapshot for {}, ignoring event", target.key);
                    task_stats.send_modify(|s| s.skipped += 1);
                }
                Err(e) => {
                    log::warn!("Could not merge {} event into {}: {}", task_spec.operation_name, target.key, e);
                    task_stats.send_modify(|s| s.skipped += 1);
                }
            }
        }
        log::debug!("{} stream ended", task_spec.operation_name);
    });

    log::debug!("Attached subscription {} ({}) to {}", spec.operation_name, id, label);
    SubscriptionHandle {
        id,
        operation_name: spec.operation_name.clone(),
        task: Some(task),
        stats_tx,
    }
}

/// Open the subscription on `transport` and attach it to `target`.
pub async fn subscribe(
    transport: &dyn SubscriptionTransport,
    cache: Arc<dyn QueryCache>,
    target: ListTarget,
    spec: &SubscriptionSpec,
    policy: MergePolicy,
) -> Result<SubscriptionHandle, TransportError> {
    let stream = transport.subscribe(&spec.request()).await?;
    Ok(attach(cache, target, spec, policy, stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Value> {
        value.as_array().cloned().unwrap_or_default()
    }

    #[test]
    fn test_replace_by_id_does_not_duplicate() {
        let merged = merge(
            &MergePolicy::ReplaceById,
            rows(json!([{"id": 1, "status": "open"}])),
            &json!({"id": 1, "status": "closed"}),
        );
        assert_eq!(merged, rows(json!([{"id": 1, "status": "closed"}])));

        let untouched = merge(&MergePolicy::ReplaceById, rows(json!([{"id": 1}])), &json!({"id": 2}));
        assert_eq!(untouched, rows(json!([{"id": 1}])));
    }

    #[test]
    fn test_append_if_new_is_idempotent() {
        let once = merge(&MergePolicy::AppendIfNew, rows(json!([{"id": 1}])), &json!({"id": 2}));
        assert_eq!(once, rows(json!([{"id": 1}, {"id": 2}])));
        let twice = merge(&MergePolicy::AppendIfNew, once.clone(), &json!({"id": 2}));
        assert_eq!(twice, once);
    }

    #[test]
    fn test_prepend_if_new() {
        let merged = merge(&MergePolicy::PrependIfNew, rows(json!([{"id": 1}])), &json!({"id": "2"}));
        assert_eq!(merged, rows(json!([{"id": "2"}, {"id": 1}])));
    }

    #[test]
    fn test_custom_policy() {
        let newest_three: MergeFn = Arc::new(|prev, entity| {
            let mut out = vec![entity.clone()];
            out.extend(prev.iter().take(2).cloned());
            out
        });
        let merged = merge(
            &MergePolicy::Custom(newest_three),
            rows(json!([{"id": 1}, {"id": 2}, {"id": 3}])),
            &json!({"id": 4}),
        );
        assert_eq!(merged, rows(json!([{"id": 4}, {"id": 1}, {"id": 2}])));
    }

    #[test]
    fn test_entity_path() {
        let spec = SubscriptionSpec::new("LatestOrder", "subscription", &["latestOrder", "order"]);
        let data = json!({"latestOrder": {"order": {"id": 5}}});
        assert_eq!(spec.entity(&data), Some(&json!({"id": 5})));
        assert_eq!(spec.entity(&json!({"latestOrder": null})), None);
        assert_eq!(spec.entity(&json!({"latestOrder": {"order": null}})), None);
    }
}
