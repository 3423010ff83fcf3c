//! In-process GraphQL transport
//!
//! Responses are scripted ahead of time and handed out in order; every
//! request is recorded. Subscriptions are fed by [`SimTransport::publish`].
//! Used for integration testing without a server.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{
    EventStream, MutationTransport, OperationRequest, OperationResponse, SubscriptionEvent,
    SubscriptionTransport, TransportError,
};

pub struct SimTransport {
    responses: Mutex<VecDeque<Result<OperationResponse, TransportError>>>,
    requests: Mutex<Vec<OperationRequest>>,
    feeds: Mutex<HashMap<String, Vec<mpsc::Sender<SubscriptionEvent>>>>,
    /// Simulated round trip applied to each mutation.
    /// Uses tokio time, so paused clocks advance instantly in tests.
    latency: Duration,
    buffer: usize,
}

impl SimTransport {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            feeds: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            buffer: 32,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Queue the next mutation result.
    pub fn respond(&self, result: Result<OperationResponse, TransportError>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(result);
        }
    }

    /// Queue a successful response with the given `data`.
    pub fn respond_data(&self, data: Value) {
        self.respond(Ok(OperationResponse::with_data(data)));
    }

    /// Queue a transport failure.
    pub fn fail(&self, error: TransportError) {
        self.respond(Err(error));
    }

    /// Every mutation request seen so far.
    pub fn requests(&self) -> Vec<OperationRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Number of open subscriptions for an operation.
    pub fn subscriber_count(&self, operation_name: &str) -> usize {
        self.feeds
            .lock()
            .map(|feeds| {
                feeds
                    .get(operation_name)
                    .map(|senders| senders.iter().filter(|s| !s.is_closed()).count())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    /// Push an event to every open subscription of `operation_name`.
    /// Returns how many subscribers received it; closed ones are dropped.
    pub async fn publish(&self, operation_name: &str, event: SubscriptionEvent) -> usize {
        let senders: Vec<mpsc::Sender<SubscriptionEvent>> = match self.feeds.lock() {
            Ok(mut feeds) => {
                let entry = feeds.entry(operation_name.to_string()).or_default();
                entry.retain(|s| !s.is_closed());
                entry.clone()
            }
            Err(_) => return 0,
        };

        let mut delivered = 0;
        for sender in senders {
            if sender.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MutationTransport for SimTransport {
    async fn mutate(&self, request: &OperationRequest) -> Result<OperationResponse, TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());
        next.unwrap_or_else(|| {
            Err(TransportError::Network(format!(
                "no scripted response for {}",
                request.operation_name
            )))
        })
    }
}

#[async_trait]
impl SubscriptionTransport for SimTransport {
    async fn subscribe(&self, request: &OperationRequest) -> Result<EventStream, TransportError> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut feeds = self.feeds.lock().map_err(|_| TransportError::Closed)?;
        feeds
            .entry(request.operation_name.clone())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
