//! Optimistic mutation coordinator
//!
//! Wraps one form's mutation: validate locally, submit once, patch one cached
//! list from the response, and fold every failure into the form's
//! [`ErrorSet`].
//!
//! # States
//!
//! ```text
//! Idle ──submit──▶ Validating ──invalid──▶ Idle (field errors)
//!                      │
//!                      └──valid──▶ Submitting ──▶ Idle + success
//!                                             ├──▶ Idle + server field errors
//!                                             └──▶ Idle + form-level error
//! ```
//!
//! The UI binds to [`FormState`] through [`MutationCoordinator::watch`];
//! `is_submitting()` drives the submit control's disabled state.

mod guard;

pub use guard::{GuardToken, SubmissionGuard};

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::watch;

use crate::cache::{reconcile, CachePatch, ListQuery, ListTarget, PatchOutcome, QueryCache};
use crate::errors::{format_server_errors, format_validation_errors, ErrorSet, FieldError};
use crate::record::{EntityId, Record};
use crate::transport::{MutationTransport, OperationRequest, TransportError};
use crate::validation::Schema;

/// How a successful mutation edits its target list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchKind {
    /// Leave the cache alone.
    None,
    /// Created entity becomes the first row.
    Prepend,
    /// Updated entity replaces the row with its id.
    Replace,
    /// Row with the entity's id (or the `id` input) is removed.
    Remove,
}

/// Static description of one mutation.
#[derive(Clone, Debug)]
pub struct MutationSpec {
    /// GraphQL operation name, e.g. `AddBook`.
    pub operation_name: String,
    /// Root field of the result, e.g. `addBook`.
    pub field: String,
    pub document: String,
    pub schema: Option<Schema>,
    /// Field of the result object holding the entity, e.g. `book`.
    pub entity_field: Option<String>,
    pub patch: PatchKind,
    /// List the mutation keeps current. A coordinator targets its unfiltered
    /// result set until retargeted.
    pub list: Option<ListQuery>,
}

impl MutationSpec {
    pub fn new(
        operation_name: impl Into<String>,
        field: impl Into<String>,
        document: impl Into<String>,
    ) -> Self {
        Self {
            operation_name: operation_name.into(),
            field: field.into(),
            document: document.into(),
            schema: None,
            entity_field: None,
            patch: PatchKind::None,
            list: None,
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_entity(mut self, field: impl Into<String>) -> Self {
        self.entity_field = Some(field.into());
        self
    }

    pub fn with_patch(mut self, patch: PatchKind) -> Self {
        self.patch = patch;
        self
    }

    pub fn with_list(mut self, list: ListQuery) -> Self {
        self.list = Some(list);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    Submitting,
}

/// What the form renders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormState {
    pub phase: Phase,
    pub errors: ErrorSet,
}

impl FormState {
    pub fn is_submitting(&self) -> bool {
        self.phase == Phase::Submitting
    }
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            errors: ErrorSet::new(),
        }
    }
}

/// A successful mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct MutationResult {
    /// The root field's result object, e.g. `{book, errors}`.
    pub payload: Value,
    pub entity: Option<Value>,
    /// What happened to the target list; `None` if no patch was attempted or
    /// the patch failed.
    pub patch: Option<PatchOutcome>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    /// Another submission was in flight; nothing happened.
    Dropped,
    /// Local validation failed; nothing was sent.
    Invalid(ErrorSet),
    /// The server rejected the mutation with field errors.
    Rejected(ErrorSet),
    /// The request never produced a usable response.
    Failed(TransportError),
    Succeeded(MutationResult),
}

type Continuation = Box<dyn Fn(&MutationResult) + Send + Sync>;

pub struct MutationCoordinator {
    spec: MutationSpec,
    transport: Arc<dyn MutationTransport>,
    cache: Arc<dyn QueryCache>,
    guard: SubmissionGuard,
    state_tx: watch::Sender<FormState>,
    target: Mutex<Option<ListTarget>>,
    on_success: Option<Continuation>,
}

impl MutationCoordinator {
    pub fn new(
        spec: MutationSpec,
        transport: Arc<dyn MutationTransport>,
        cache: Arc<dyn QueryCache>,
    ) -> Self {
        let (state_tx, _) = watch::channel(FormState::default());
        let target = spec.list.as_ref().map(ListQuery::unfiltered);
        Self {
            spec,
            transport,
            cache,
            guard: SubmissionGuard::new(),
            state_tx,
            target: Mutex::new(target),
            on_success: None,
        }
    }

    /// The cached list this mutation patches.
    pub fn with_target(self, target: ListTarget) -> Self {
        self.retarget(Some(target));
        self
    }

    /// Run after a successful mutation, once the cache is patched and the
    /// guard is released (navigate away, reset the form).
    pub fn on_success<F>(mut self, continuation: F) -> Self
    where
        F: Fn(&MutationResult) + Send + Sync + 'static,
    {
        self.on_success = Some(Box::new(continuation));
        self
    }

    /// Point the coordinator at the list the user is currently looking at.
    /// The target is captured when a submission starts.
    pub fn retarget(&self, target: Option<ListTarget>) {
        if let Ok(mut current) = self.target.lock() {
            *current = target;
        }
    }

    pub fn spec(&self) -> &MutationSpec {
        &self.spec
    }

    pub fn state(&self) -> FormState {
        self.state_tx.borrow().clone()
    }

    pub fn errors(&self) -> ErrorSet {
        self.state_tx.borrow().errors.clone()
    }

    pub fn is_submitting(&self) -> bool {
        self.state_tx.borrow().is_submitting()
    }

    pub fn watch(&self) -> watch::Receiver<FormState> {
        self.state_tx.subscribe()
    }

    /// The user changed `field`: its message goes away.
    pub fn edit_field(&self, field: &str) -> bool {
        let mut cleared = false;
        self.state_tx.send_if_modified(|state| {
            cleared = state.errors.clear_field(field);
            cleared
        });
        cleared
    }

    /// Submit `input`. Callers may ignore the outcome and observe
    /// [`FormState`] instead.
    pub async fn submit(&self, input: Record) -> SubmitOutcome {
        let Some(token) = self.guard.try_engage() else {
            log::debug!("{} already in flight, dropping submit", self.spec.operation_name);
            return SubmitOutcome::Dropped;
        };
        let mut flight = Flight {
            state_tx: &self.state_tx,
            token: Some(token),
            settled: false,
        };

        self.state_tx.send_modify(|s| s.phase = Phase::Validating);
        let variables = match &self.spec.schema {
            Some(schema) => {
                let cast = schema.cast(&input);
                if let Err(invalid) = schema.validate(&cast) {
                    log::debug!("{} failed validation: {}", self.spec.operation_name, invalid);
                    let errors = format_validation_errors(&invalid.failures);
                    flight.settle(errors.clone());
                    return SubmitOutcome::Invalid(errors);
                }
                cast
            }
            None => input,
        };

        let target = self.target.lock().ok().and_then(|t| t.clone());
        self.state_tx.send_modify(|s| {
            s.phase = Phase::Submitting;
            s.errors.clear();
        });

        let request = OperationRequest::new(
            self.spec.operation_name.clone(),
            self.spec.document.clone(),
            Value::Object(variables.clone()),
        );
        log::info!("Submitting {} ({})", request.operation_name, request.id);

        let response = match self.transport.mutate(&request).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("{} failed: {}", request.operation_name, e);
                flight.settle(ErrorSet::form_level(e.to_string()));
                return SubmitOutcome::Failed(e);
            }
        };

        let payload = response.field(&self.spec.field).cloned();
        let mut server_errors = response.errors.clone();
        if let Some(reported) = payload.as_ref().and_then(|p| p.get("errors")) {
            server_errors.extend(FieldError::list_from_value(reported));
        }
        if !server_errors.is_empty() {
            log::info!("{} rejected by server ({} errors)", request.operation_name, server_errors.len());
            let errors = format_server_errors(&server_errors);
            flight.settle(errors.clone());
            return SubmitOutcome::Rejected(errors);
        }

        let Some(payload) = payload else {
            let e = TransportError::MalformedResponse(format!("missing field '{}'", self.spec.field));
            log::warn!("{} failed: {}", request.operation_name, e);
            flight.settle(ErrorSet::form_level(e.to_string()));
            return SubmitOutcome::Failed(e);
        };

        let entity = self
            .spec
            .entity_field
            .as_ref()
            .and_then(|f| payload.get(f))
            .filter(|v| !v.is_null())
            .cloned();
        let patch = target.and_then(|target| self.patch_cache(&target, entity.as_ref(), &variables));

        flight.settle(ErrorSet::new());
        log::info!("{} succeeded", request.operation_name);

        let result = MutationResult {
            payload,
            entity,
            patch,
        };
        if let Some(continuation) = &self.on_success {
            continuation(&result);
        }
        SubmitOutcome::Succeeded(result)
    }

    fn patch_cache(
        &self,
        target: &ListTarget,
        entity: Option<&Value>,
        variables: &Record,
    ) -> Option<PatchOutcome> {
        let patch = match self.spec.patch {
            PatchKind::None => return None,
            PatchKind::Prepend => CachePatch::Prepend(entity?.clone()),
            PatchKind::Replace => CachePatch::Replace(entity?.clone()),
            PatchKind::Remove => CachePatch::Remove(
                entity
                    .and_then(EntityId::of)
                    .or_else(|| variables.get("id").and_then(EntityId::from_value))?,
            ),
        };

        match reconcile(self.cache.as_ref(), target, &patch) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log::warn!("Could not patch {} after {}: {}", target.key, self.spec.operation_name, e);
                None
            }
        }
    }
}

/// One submission between guard engagement and settlement. Dropping it
/// unsettled (the caller abandoned the future) returns the form to idle.
struct Flight<'a> {
    state_tx: &'a watch::Sender<FormState>,
    token: Option<GuardToken<'a>>,
    settled: bool,
}

impl Flight<'_> {
    /// Release the guard, then publish idle with `errors`.
    fn settle(&mut self, errors: ErrorSet) {
        self.token.take();
        self.settled = true;
        self.state_tx.send_modify(|s| {
            s.phase = Phase::Idle;
            s.errors = errors;
        });
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.token.take();
            self.state_tx.send_modify(|s| s.phase = Phase::Idle);
            log::debug!("Submission abandoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryCache, ListQuery};
    use crate::transport::{OperationResponse, SimTransport};
    use crate::validation::Field;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }

    fn add_author_spec() -> MutationSpec {
        MutationSpec::new("AddAuthor", "addAuthor", "mutation AddAuthor($name: String!) { ... }")
            .with_schema(Schema::new().field(Field::string("name").required("Author is required")))
            .with_entity("author")
            .with_patch(PatchKind::Prepend)
    }

    fn authors() -> ListQuery {
        ListQuery::new("GetAuthors", "getAuthors")
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_transport() {
        let transport = Arc::new(SimTransport::new());
        let coordinator = MutationCoordinator::new(add_author_spec(), transport.clone(), Arc::new(InMemoryCache::new()));

        let outcome = coordinator.submit(record(json!({"name": ""}))).await;
        let SubmitOutcome::Invalid(errors) = outcome else {
            panic!("expected validation failure, got {:?}", outcome);
        };
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["name"]);
        assert_eq!(transport.request_count(), 0);
        assert_eq!(coordinator.state().phase, Phase::Idle);
        assert!(!coordinator.is_submitting());
        assert_eq!(coordinator.errors(), errors);
    }

    #[tokio::test]
    async fn test_success_patches_and_runs_continuation() {
        let transport = Arc::new(SimTransport::new());
        transport.respond_data(json!({"addAuthor": {"author": {"id": 9, "name": "Haddis"}, "errors": null}}));
        let cache = Arc::new(InMemoryCache::new());
        let target = authors().unfiltered();
        cache.write_query(&target.key, json!({"getAuthors": [{"id": 1, "name": "Bealu"}]}));

        let navigated = Arc::new(Mutex::new(None));
        let seen = navigated.clone();
        let coordinator = MutationCoordinator::new(add_author_spec(), transport.clone(), cache.clone())
            .with_target(target.clone())
            .on_success(move |result| {
                *seen.lock().unwrap() = result.entity.clone();
            });

        let outcome = coordinator.submit(record(json!({"name": "Haddis"}))).await;
        let SubmitOutcome::Succeeded(result) = outcome else {
            panic!("expected success, got {:?}", outcome);
        };
        assert_eq!(result.patch, Some(PatchOutcome::Applied { version: 2 }));
        assert_eq!(
            cache.read_query(&target.key).unwrap().data,
            json!({"getAuthors": [{"id": 9, "name": "Haddis"}, {"id": 1, "name": "Bealu"}]})
        );
        assert_eq!(*navigated.lock().unwrap(), Some(json!({"id": 9, "name": "Haddis"})));
        assert!(coordinator.errors().is_empty());
        assert_eq!(transport.requests()[0].variables, json!({"name": "Haddis"}));
    }

    #[tokio::test]
    async fn test_server_errors_fill_field_slots() {
        let transport = Arc::new(SimTransport::new());
        transport.respond_data(json!({"addAuthor": {"author": null, "errors": [{"path": "name", "message": "Author already exists"}]}}));
        let cache = Arc::new(InMemoryCache::new());
        let target = authors().unfiltered();
        cache.write_query(&target.key, json!({"getAuthors": []}));
        let coordinator = MutationCoordinator::new(add_author_spec(), transport, cache.clone()).with_target(target.clone());

        let outcome = coordinator.submit(record(json!({"name": "Haddis"}))).await;
        let mut expected = ErrorSet::new();
        expected.insert("name", "Author already exists");
        assert_eq!(outcome, SubmitOutcome::Rejected(expected.clone()));
        assert_eq!(coordinator.errors(), expected);
        assert_eq!(cache.read_query(&target.key).unwrap().version, 1);

        assert!(coordinator.edit_field("name"));
        assert!(coordinator.errors().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_form_level() {
        let transport = Arc::new(SimTransport::new());
        transport.fail(TransportError::Network("connection refused".into()));
        let coordinator = MutationCoordinator::new(add_author_spec(), transport.clone(), Arc::new(InMemoryCache::new()));

        let outcome = coordinator.submit(record(json!({"name": "Haddis"}))).await;
        assert_eq!(outcome, SubmitOutcome::Failed(TransportError::Network("connection refused".into())));
        let errors = coordinator.errors();
        assert_eq!(errors.len(), 0);
        assert_eq!(errors.form_message(), Some("Network error: connection refused"));
        assert!(!coordinator.is_submitting());

        // No automatic retry: the next attempt is a fresh request.
        transport.respond_data(json!({"addAuthor": {"author": {"id": 1}}}));
        assert!(matches!(
            coordinator.submit(record(json!({"name": "Haddis"}))).await,
            SubmitOutcome::Succeeded(_)
        ));
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_request_level_errors_without_data() {
        let transport = Arc::new(SimTransport::new());
        transport.respond(Ok(OperationResponse::with_errors(vec![FieldError::form("Not authenticated")])));
        let coordinator = MutationCoordinator::new(add_author_spec(), transport, Arc::new(InMemoryCache::new()));

        let outcome = coordinator.submit(record(json!({"name": "Haddis"}))).await;
        assert_eq!(outcome, SubmitOutcome::Rejected(ErrorSet::form_level("Not authenticated")));
    }

    #[tokio::test]
    async fn test_delete_falls_back_to_input_id() {
        let transport = Arc::new(SimTransport::new());
        transport.respond_data(json!({"deleteBook": {"book": null}}));
        let cache = Arc::new(InMemoryCache::new());
        let target = ListQuery::new("GetAvailableBooks", "getAvailableBooks").unfiltered();
        cache.write_query(&target.key, json!({"getAvailableBooks": [{"id": 1}, {"id": 2}]}));

        let spec = MutationSpec::new("DeleteBook", "deleteBook", "mutation DeleteBook { ... }")
            .with_entity("book")
            .with_patch(PatchKind::Remove);
        let coordinator = MutationCoordinator::new(spec, transport, cache.clone()).with_target(target.clone());

        coordinator.submit(record(json!({"id": "2"}))).await;
        assert_eq!(
            cache.read_query(&target.key).unwrap().data,
            json!({"getAvailableBooks": [{"id": 1}]})
        );
    }

    #[tokio::test]
    async fn test_abandoned_submission_releases_guard() {
        let transport = Arc::new(SimTransport::new().with_latency(std::time::Duration::from_secs(5)));
        let coordinator = MutationCoordinator::new(add_author_spec(), transport.clone(), Arc::new(InMemoryCache::new()));

        let pending = coordinator.submit(record(json!({"name": "Haddis"})));
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());
        assert!(!coordinator.is_submitting());
        assert_eq!(coordinator.state().phase, Phase::Idle);
    }
}
