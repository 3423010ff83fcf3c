//! GraphQL subscriptions over a websocket
//!
//! Speaks the `graphql-ws` subprotocol: `connection_init` carrying the stored
//! token, then `start` for the operation. Each subscription owns its
//! connection. Dropping the event stream sends `stop` and closes the socket.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{EventStream, OperationRequest, SubscriptionEvent, SubscriptionTransport, TransportError};
use crate::config::ClientConfig;
use crate::credentials::CredentialStore;

pub const PROTOCOL: &str = "graphql-ws";

/// Each connection carries one operation.
const OPERATION_ID: &str = "1";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage<'a> {
    ConnectionInit { payload: Value },
    Start { id: &'a str, payload: &'a OperationRequest },
    Stop { id: &'a str },
    ConnectionTerminate,
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    ConnectionAck,
    ConnectionError {
        #[serde(default)]
        payload: Value,
    },
    #[serde(rename = "ka")]
    KeepAlive,
    Data {
        id: String,
        payload: Value,
    },
    Error {
        id: String,
        #[serde(default)]
        payload: Value,
    },
    Complete {
        id: String,
    },
}

pub struct WsTransport {
    url: String,
    buffer: usize,
    credentials: Option<Arc<dyn CredentialStore>>,
    token_key: String,
}

impl WsTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            url: config.ws_url.clone(),
            buffer: config.subscription_buffer.max(1),
            credentials: None,
            token_key: config.token_key.clone(),
        }
    }

    /// Authenticate each connection with the token held in `store`.
    pub fn with_credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn connection_params(&self) -> Result<Value, TransportError> {
        let token = match &self.credentials {
            Some(store) => store
                .get_item(&self.token_key)
                .await
                .map_err(|e| TransportError::Credentials(e.to_string()))?,
            None => None,
        };
        Ok(match token.filter(|t| !t.is_empty()) {
            Some(token) => json!({ "authToken": token }),
            None => json!({}),
        })
    }

    async fn connect(&self) -> Result<Socket, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(PROTOCOL));

        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(socket)
    }
}

#[async_trait]
impl SubscriptionTransport for WsTransport {
    async fn subscribe(&self, request: &OperationRequest) -> Result<EventStream, TransportError> {
        let payload = self.connection_params().await?;
        let mut socket = self.connect().await?;

        send(&mut socket, &ClientMessage::ConnectionInit { payload }).await?;
        loop {
            match next_message(&mut socket).await {
                Some(Ok(ServerMessage::ConnectionAck)) => break,
                Some(Ok(ServerMessage::ConnectionError { payload })) => {
                    return Err(TransportError::Network(format!("connection rejected: {}", payload)));
                }
                Some(Ok(other)) => log::debug!("Ignoring {:?} before connection_ack", other),
                Some(Err(e)) => return Err(e),
                None => return Err(TransportError::Closed),
            }
        }

        send(
            &mut socket,
            &ClientMessage::Start {
                id: OPERATION_ID,
                payload: request,
            },
        )
        .await?;
        log::debug!("Subscribed {} on {} ({})", request.operation_name, self.url, request.id);

        let (tx, rx) = mpsc::channel(self.buffer);
        tokio::spawn(pump(socket, tx, request.operation_name.clone()));
        Ok(rx)
    }
}

/// Forward `data` messages until the server completes, the socket closes or
/// the receiver goes away.
async fn pump(mut socket: Socket, events: mpsc::Sender<SubscriptionEvent>, operation: String) {
    loop {
        let message = tokio::select! {
            _ = events.closed() => None,
            message = next_message(&mut socket) => Some(message),
        };
        let Some(message) = message else {
            stop(&mut socket).await;
            log::debug!("Stopped subscription {}", operation);
            return;
        };

        match message {
            Some(Ok(ServerMessage::Data { payload, .. })) => {
                if events.send(to_event(&operation, &payload)).await.is_err() {
                    stop(&mut socket).await;
                    return;
                }
            }
            Some(Ok(ServerMessage::Error { id, payload })) => {
                log::warn!("Subscription {} ({}) failed: {}", operation, id, payload);
                break;
            }
            Some(Ok(ServerMessage::Complete { .. })) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                log::warn!("Subscription {} lost its connection: {}", operation, e);
                break;
            }
        }
    }
    log::debug!("Subscription {} ended", operation);
}

async fn stop(socket: &mut Socket) {
    let _ = send(socket, &ClientMessage::Stop { id: OPERATION_ID }).await;
    let _ = send(socket, &ClientMessage::ConnectionTerminate).await;
    let _ = socket.close(None).await;
}

/// The event carried by a `data` payload. Payloads without data (a resolver
/// error) become empty events.
fn to_event(operation: &str, payload: &Value) -> SubscriptionEvent {
    if let Some(errors) = payload.get("errors").filter(|e| !e.is_null()) {
        log::warn!("{} event carried errors: {}", operation, errors);
    }
    match payload.get("data").filter(|d| !d.is_null()) {
        Some(data) => SubscriptionEvent::new(data.clone()),
        None => SubscriptionEvent::empty(),
    }
}

async fn send(socket: &mut Socket, message: &ClientMessage<'_>) -> Result<(), TransportError> {
    let text = serde_json::to_string(message).map_err(|e| TransportError::Network(e.to_string()))?;
    socket
        .send(Message::Text(text))
        .await
        .map_err(|e| TransportError::Network(e.to_string()))
}

/// Next protocol message; `None` once the socket is closed.
async fn next_message(socket: &mut Socket) -> Option<Result<ServerMessage, TransportError>> {
    loop {
        match socket.next().await? {
            Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                Ok(message) => return Some(Ok(message)),
                Err(e) => log::debug!("Ignoring websocket message {}: {}", text, e),
            },
            Ok(Message::Close(_)) => return None,
            Ok(_) => {}
            Err(e) => return Some(Err(TransportError::Network(e.to_string()))),
        }
    }
}
