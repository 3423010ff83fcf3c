//! GraphQL transport seams
//!
//! The client core never talks to the network directly. Mutations go through
//! a [`MutationTransport`], live events come from a [`SubscriptionTransport`].
//! Implementations:
//! - [`HttpTransport`]: GraphQL over HTTP, with bearer decoration and
//!   multipart uploads
//! - [`WsTransport`]: subscriptions over a `graphql-ws` websocket
//! - [`SimTransport`]: in-process scripted transport for tests and demos

pub mod http;
pub mod simulated;
pub mod upload;
pub mod ws;

pub use http::HttpTransport;
pub use simulated::SimTransport;
pub use ws::WsTransport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::FieldError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Transport closed")]
    Closed,
}

/// One GraphQL operation on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    /// Local identity for logging; not sent.
    #[serde(skip, default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(rename = "operationName")]
    pub operation_name: String,
    pub query: String,
    pub variables: Value,
}

impl OperationRequest {
    pub fn new(operation_name: impl Into<String>, query: impl Into<String>, variables: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_name: operation_name.into(),
            query: query.into(),
            variables,
        }
    }
}

/// A GraphQL response envelope: `data` and/or request-level `errors`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OperationResponse {
    pub data: Option<Value>,
    pub errors: Vec<FieldError>,
}

impl OperationResponse {
    pub fn with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn with_errors(errors: Vec<FieldError>) -> Self {
        Self { data: None, errors }
    }

    /// Parse a response body. A body with neither `data` nor `errors` is
    /// malformed.
    pub fn from_json(body: &Value) -> Result<Self, TransportError> {
        let obj = body
            .as_object()
            .ok_or_else(|| TransportError::MalformedResponse("response is not an object".into()))?;

        let data = obj.get("data").filter(|d| !d.is_null()).cloned();
        let errors = match obj.get("errors") {
            Some(Value::Array(items)) => items.iter().filter_map(FieldError::from_response_error).collect(),
            Some(other) => FieldError::from_response_error(other).into_iter().collect(),
            None => Vec::new(),
        };

        if data.is_none() && !obj.contains_key("errors") {
            return Err(TransportError::MalformedResponse(
                "response has neither data nor errors".into(),
            ));
        }
        Ok(Self { data, errors })
    }

    /// Result object of the root field `name`, e.g. `addBook`.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.as_ref()?.get(name).filter(|v| !v.is_null())
    }
}

/// A pushed subscription message. `data` is absent on keep-alives and on
/// server-side errors.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscriptionEvent {
    pub data: Option<Value>,
}

impl SubscriptionEvent {
    pub fn new(data: Value) -> Self {
        Self { data: Some(data) }
    }

    pub fn empty() -> Self {
        Self { data: None }
    }
}

/// Events in delivery order. Closing the receiver ends the subscription.
pub type EventStream = mpsc::Receiver<SubscriptionEvent>;

#[async_trait]
pub trait MutationTransport: Send + Sync {
    /// Send a mutation and wait for its response envelope.
    async fn mutate(&self, request: &OperationRequest) -> Result<OperationResponse, TransportError>;
}

#[async_trait]
pub trait SubscriptionTransport: Send + Sync {
    /// Open a subscription. Events arrive in order; there is no backpressure
    /// signal to the server.
    async fn subscribe(&self, request: &OperationRequest) -> Result<EventStream, TransportError>;
}
