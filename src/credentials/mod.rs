//! Persisted bearer credentials
//!
//! A `CredentialStore` is an opaque string key/value store that survives
//! restarts. The client keeps its bearer token in one key and reads it once
//! per authenticated request.

mod file;
mod memory;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, CredentialError>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), CredentialError>;

    async fn remove_item(&self, key: &str) -> Result<(), CredentialError>;
}

/// `Authorization` header value for the token stored under `key`:
/// `Bearer <token>`, or the empty string when signed out.
pub async fn authorization_header(
    store: &dyn CredentialStore,
    key: &str,
) -> Result<String, CredentialError> {
    Ok(match store.get_item(key).await? {
        Some(token) if !token.is_empty() => format!("Bearer {}", token),
        _ => String::new(),
    })
}
