//! GraphQL over HTTP
//!
//! Plain operations are posted as JSON. Operations whose variables embed
//! uploads follow the GraphQL multipart request layout: an `operations` part
//! with the uploads nulled out, a `map` part naming where each file goes, and
//! one part per file.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use super::upload::{extract_uploads, upload_map};
use super::{MutationTransport, OperationRequest, OperationResponse, TransportError};
use crate::config::ClientConfig;
use crate::credentials::{authorization_header, CredentialStore};

pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    credentials: Option<Arc<dyn CredentialStore>>,
    token_key: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.api_url.clone(),
            credentials: None,
            token_key: config.token_key.clone(),
        }
    }

    /// Decorate every request with the bearer token held in `store`.
    pub fn with_credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn authorization(&self) -> Result<String, TransportError> {
        match &self.credentials {
            Some(store) => authorization_header(store.as_ref(), &self.token_key)
                .await
                .map_err(|e| TransportError::Credentials(e.to_string())),
            None => Ok(String::new()),
        }
    }

    async fn multipart_form(
        &self,
        request: &OperationRequest,
    ) -> Result<Option<Form>, TransportError> {
        let (variables, files) = extract_uploads(&request.variables);
        if files.is_empty() {
            return Ok(None);
        }

        let mut operations = request.clone();
        operations.variables = variables;
        let operations = serde_json::to_string(&operations)
            .map_err(|e| TransportError::Upload(e.to_string()))?;

        let mut form = Form::new()
            .text("operations", operations)
            .text("map", upload_map(&files).to_string());

        for (index, (_, upload)) in files.iter().enumerate() {
            let bytes = tokio::fs::read(upload.local_path())
                .await
                .map_err(|e| TransportError::Upload(format!("{}: {}", upload.uri, e)))?;
            let part = Part::bytes(bytes)
                .file_name(upload.name.clone())
                .mime_str(&upload.mime_type)
                .map_err(|e| TransportError::Upload(e.to_string()))?;
            form = form.part(index.to_string(), part);
        }
        Ok(Some(form))
    }
}

#[async_trait]
impl MutationTransport for HttpTransport {
    async fn mutate(&self, request: &OperationRequest) -> Result<OperationResponse, TransportError> {
        let authorization = self.authorization().await?;

        let builder = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, authorization);
        let builder = match self.multipart_form(request).await? {
            Some(form) => builder.multipart(form),
            None => builder.json(request),
        };

        log::debug!("POST {} {} ({})", self.endpoint, request.operation_name, request.id);
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        // GraphQL servers report validation failures with 4xx and a normal
        // error envelope, so the body wins over the status when it parses.
        match serde_json::from_str::<Value>(&body) {
            Ok(json) => match OperationResponse::from_json(&json) {
                Ok(parsed) => Ok(parsed),
                Err(_) if !status.is_success() => Err(TransportError::Http {
                    status: status.as_u16(),
                    body,
                }),
                Err(e) => Err(e),
            },
            Err(_) if !status.is_success() => Err(TransportError::Http {
                status: status.as_u16(),
                body,
            }),
            Err(e) => Err(TransportError::MalformedResponse(e.to_string())),
        }
    }
}
