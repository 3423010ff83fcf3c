//! Optimistic mutation integration tests
//!
//! Drives marketplace mutations through `MutationCoordinator` against the
//! scripted `SimTransport` and checks the form state and the cached lists.
//!
//! Run with:
//!   cargo test --test optimistic_flow

use std::sync::Arc;
use std::time::Duration;

use bookmart::cache::{InMemoryCache, PatchOutcome, QueryCache};
use bookmart::catalog::{authors, books};
use bookmart::coordinator::{MutationCoordinator, Phase, SubmitOutcome};
use bookmart::errors::ErrorSet;
use bookmart::record::{FileUpload, Record};
use bookmart::transport::{OperationResponse, SimTransport, TransportError};

use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap_or_default()
}

fn book_input() -> Record {
    record(json!({
        "title": "Oromay",
        "authorId": "4",
        "languageId": "1",
        "categoryId": "2",
        "price": "120",
        "isbn": "9780",
        "coverFile": FileUpload::from_picked("file:///tmp/oromay.jpg", "image/jpeg").to_value(),
    }))
}

fn warm_books(cache: &InMemoryCache, variables: Value, rows: Value) {
    let target = books::available_books().target(&variables);
    cache.write_query(&target.key, json!({ "getAvailableBooks": rows }));
}

fn books_at(cache: &InMemoryCache, variables: Value) -> Option<Value> {
    let target = books::available_books().target(&variables);
    cache
        .read_query(&target.key)
        .map(|s| s.data["getAvailableBooks"].clone())
}

// ---------------------------------------------------------------------------
// Single flight
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_second_submit_while_in_flight_is_dropped() {
    let transport = Arc::new(SimTransport::new().with_latency(Duration::from_secs(2)));
    transport.respond_data(json!({"addAuthor": {"author": {"id": 7, "name": "Haddis"}, "errors": null}}));
    let cache = Arc::new(InMemoryCache::new());
    let coordinator = Arc::new(MutationCoordinator::new(authors::add_author(), transport.clone(), cache));

    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.submit(record(json!({"name": "Haddis"}))).await })
    };
    while !coordinator.is_submitting() {
        tokio::task::yield_now().await;
    }

    let errors_before = coordinator.errors();
    let second = coordinator.submit(record(json!({"name": "Haddis"}))).await;
    assert_eq!(second, SubmitOutcome::Dropped);
    assert_eq!(coordinator.errors(), errors_before);
    assert_eq!(transport.request_count(), 1);

    let first = first.await.unwrap();
    assert!(matches!(first, SubmitOutcome::Succeeded(_)));
    assert_eq!(coordinator.state().phase, Phase::Idle);
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_form_state_is_observable() {
    let transport = Arc::new(SimTransport::new().with_latency(Duration::from_millis(500)));
    transport.respond_data(json!({"addAuthor": {"author": {"id": 1, "name": "Bealu"}}}));
    let coordinator = Arc::new(MutationCoordinator::new(
        authors::add_author(),
        transport,
        Arc::new(InMemoryCache::new()),
    ));
    let mut state = coordinator.watch();

    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.submit(record(json!({"name": "Bealu"}))).await })
    };

    let mut seen = Vec::new();
    while seen.last() != Some(&Phase::Idle) || seen.len() < 2 {
        state.changed().await.unwrap();
        let phase = state.borrow_and_update().phase;
        seen.push(phase);
    }
    task.await.unwrap();
    assert!(seen.contains(&Phase::Submitting));
    assert_eq!(seen.last(), Some(&Phase::Idle));
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_invalid_book_never_reaches_server() {
    let transport = Arc::new(SimTransport::new());
    let coordinator = MutationCoordinator::new(books::add_book(), transport.clone(), Arc::new(InMemoryCache::new()));

    let outcome = coordinator
        .submit(record(json!({"title": "", "price": "-3", "authorId": "4", "languageId": "1", "categoryId": "2", "isbn": "9780"})))
        .await;

    let SubmitOutcome::Invalid(errors) = outcome else {
        panic!("expected validation failure, got {:?}", outcome);
    };
    assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["coverFile", "price", "title"]);
    assert_eq!(errors.get("title"), Some("Title is required"));
    assert_eq!(errors.get("coverFile"), Some("A file is required"));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_cast_payload_is_sent() {
    let transport = Arc::new(SimTransport::new());
    transport.respond_data(json!({"addBook": {"book": {"id": 3, "title": "Oromay"}, "errors": null}}));
    let coordinator = MutationCoordinator::new(books::add_book(), transport.clone(), Arc::new(InMemoryCache::new()));

    coordinator.submit(book_input()).await;
    let sent = &transport.requests()[0].variables;
    assert_eq!(sent["price"], json!(120));
    assert_eq!(sent["isbn"], json!(9780));
    assert_eq!(sent["authorId"], json!(4));
    assert_eq!(sent["status"], json!("available"));
    assert_eq!(sent["condition"], json!("new"));
    assert!(FileUpload::is_upload(&sent["coverFile"]));
}

// ---------------------------------------------------------------------------
// Cache reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_create_update_delete_patch_the_list() {
    let transport = Arc::new(SimTransport::new());
    let cache = Arc::new(InMemoryCache::new());
    warm_books(&cache, json!({}), json!([{"id": 1, "title": "A"}, {"id": 2, "title": "B"}]));
    let target = books::available_books().unfiltered();

    transport.respond_data(json!({"addBook": {"book": {"id": 3, "title": "C"}, "errors": null}}));
    let create = MutationCoordinator::new(books::add_book(), transport.clone(), cache.clone())
        .with_target(target.clone());
    assert!(matches!(create.submit(book_input()).await, SubmitOutcome::Succeeded(_)));
    assert_eq!(
        books_at(&cache, json!({})),
        Some(json!([{"id": 3, "title": "C"}, {"id": 1, "title": "A"}, {"id": 2, "title": "B"}]))
    );

    transport.respond_data(json!({"updateBook": {"book": {"id": 2, "title": "B2"}, "errors": null}}));
    let update = MutationCoordinator::new(books::update_book(), transport.clone(), cache.clone())
        .with_target(target.clone());
    let mut input = book_input();
    input.insert("id".into(), json!(2));
    input.insert("title".into(), json!("B2"));
    assert!(matches!(update.submit(input).await, SubmitOutcome::Succeeded(_)));
    assert_eq!(
        books_at(&cache, json!({})),
        Some(json!([{"id": 3, "title": "C"}, {"id": 1, "title": "A"}, {"id": 2, "title": "B2"}]))
    );

    transport.respond_data(json!({"deleteBook": {"book": {"id": "1"}, "errors": null}}));
    let delete = MutationCoordinator::new(books::delete_book(), transport.clone(), cache.clone())
        .with_target(target);
    assert!(matches!(delete.submit(record(json!({"id": 1}))).await, SubmitOutcome::Succeeded(_)));
    assert_eq!(
        books_at(&cache, json!({})),
        Some(json!([{"id": 3, "title": "C"}, {"id": 2, "title": "B2"}]))
    );
}

#[tokio::test]
async fn test_unfetched_list_is_not_created() {
    let transport = Arc::new(SimTransport::new());
    transport.respond_data(json!({"addBook": {"book": {"id": 3}, "errors": null}}));
    let cache = Arc::new(InMemoryCache::new());
    let coordinator = MutationCoordinator::new(books::add_book(), transport, cache.clone())
        .with_target(books::available_books().unfiltered());

    let SubmitOutcome::Succeeded(result) = coordinator.submit(book_input()).await else {
        panic!("expected success");
    };
    assert_eq!(result.patch, Some(PatchOutcome::Skipped));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_mutation_patches_its_own_list_without_a_target() {
    let transport = Arc::new(SimTransport::new());
    transport.respond_data(json!({"addAuthor": {"author": {"id": 5, "name": "Haddis"}, "errors": null}}));
    let cache = Arc::new(InMemoryCache::new());
    let authors_key = authors::authors().unfiltered().key;
    cache.write_query(&authors_key, json!({"getAuthors": [{"id": 1, "name": "Bealu"}]}));

    let coordinator = MutationCoordinator::new(authors::add_author(), transport, cache.clone());
    let SubmitOutcome::Succeeded(result) = coordinator.submit(record(json!({"name": "Haddis"}))).await else {
        panic!("expected success");
    };
    assert_eq!(result.patch, Some(PatchOutcome::Applied { version: 2 }));
    assert_eq!(
        cache.read_query(&authors_key).unwrap().data,
        json!({"getAuthors": [{"id": 5, "name": "Haddis"}, {"id": 1, "name": "Bealu"}]})
    );
}

#[tokio::test(start_paused = true)]
async fn test_patch_lands_on_list_active_at_submit() {
    let transport = Arc::new(SimTransport::new().with_latency(Duration::from_secs(1)));
    transport.respond_data(json!({"addBook": {"book": {"id": 9, "title": "Dune Messiah"}, "errors": null}}));
    let cache = Arc::new(InMemoryCache::new());
    warm_books(&cache, json!({"searchString": "dune"}), json!([{"id": 4, "title": "Dune"}]));
    warm_books(&cache, json!({}), json!([{"id": 1}, {"id": 4}]));

    let coordinator = Arc::new(
        MutationCoordinator::new(books::add_book(), transport, cache.clone())
            .with_target(books::available_books().target(&json!({"searchString": "dune"}))),
    );
    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.submit(book_input()).await })
    };
    while !coordinator.is_submitting() {
        tokio::task::yield_now().await;
    }
    // The user clears the search while the request is out.
    coordinator.retarget(Some(books::available_books().unfiltered()));
    task.await.unwrap();

    assert_eq!(
        books_at(&cache, json!({"searchString": "dune"})),
        Some(json!([{"id": 9, "title": "Dune Messiah"}, {"id": 4, "title": "Dune"}]))
    );
    assert_eq!(books_at(&cache, json!({})), Some(json!([{"id": 1}, {"id": 4}])));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_server_rejection_uses_field_slots() {
    let transport = Arc::new(SimTransport::new());
    transport.respond_data(json!({"addBook": {"book": null, "errors": [
        {"path": "isbn", "message": "ISBN already exists"},
        {"path": "title", "message": "Title is required"}
    ]}}));
    let cache = Arc::new(InMemoryCache::new());
    warm_books(&cache, json!({}), json!([{"id": 1}]));
    let coordinator = MutationCoordinator::new(books::add_book(), transport, cache.clone())
        .with_target(books::available_books().unfiltered());

    let outcome = coordinator.submit(book_input()).await;
    let SubmitOutcome::Rejected(errors) = outcome else {
        panic!("expected rejection, got {:?}", outcome);
    };
    assert_eq!(errors.get("isbn"), Some("ISBN already exists"));
    assert_eq!(errors.get("title"), Some("Title is required"));
    assert_eq!(errors.form_message(), None);
    assert_eq!(books_at(&cache, json!({})), Some(json!([{"id": 1}])));

    coordinator.edit_field("isbn");
    assert!(!coordinator.errors().contains("isbn"));
    assert!(coordinator.errors().contains("title"));
    assert!(!coordinator.is_submitting());
}

#[tokio::test]
async fn test_network_failure_shows_banner_only() {
    let transport = Arc::new(SimTransport::new());
    transport.fail(TransportError::Network("timed out".into()));
    let coordinator = MutationCoordinator::new(authors::add_author(), transport, Arc::new(InMemoryCache::new()));

    let outcome = coordinator.submit(record(json!({"name": "Haddis"}))).await;
    assert!(matches!(outcome, SubmitOutcome::Failed(TransportError::Network(_))));
    assert_eq!(coordinator.errors(), ErrorSet::form_level("Network error: timed out"));
    assert_eq!(coordinator.state().phase, Phase::Idle);
}

#[tokio::test]
async fn test_unauthenticated_request_shows_banner() {
    let transport = Arc::new(SimTransport::new());
    let body = json!({
        "data": {"addAuthor": null},
        "errors": [{"message": "Not authenticated", "path": ["addAuthor"]}]
    });
    transport.respond(Ok(OperationResponse::from_json(&body).unwrap()));
    let coordinator = MutationCoordinator::new(authors::add_author(), transport, Arc::new(InMemoryCache::new()));

    let outcome = coordinator.submit(record(json!({"name": "Haddis"}))).await;
    assert_eq!(outcome, SubmitOutcome::Rejected(ErrorSet::form_level("Not authenticated")));
    assert_eq!(coordinator.errors().form_message(), Some("Not authenticated"));
    assert!(!coordinator.errors().contains("addAuthor"));
}

#[tokio::test]
async fn test_missing_result_field_is_malformed() {
    let transport = Arc::new(SimTransport::new());
    transport.respond_data(json!({"somethingElse": {}}));
    let coordinator = MutationCoordinator::new(authors::add_author(), transport, Arc::new(InMemoryCache::new()));

    let outcome = coordinator.submit(record(json!({"name": "Haddis"}))).await;
    assert!(matches!(outcome, SubmitOutcome::Failed(TransportError::MalformedResponse(_))));
    assert!(coordinator.errors().form_message().is_some());
}
