//! On-disk credential persistence
//!
//! All items live in one `credentials.json` object in the storage directory.
//! Every write rewrites the whole file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CredentialError, CredentialStore};

const FILE_NAME: &str = "credentials.json";

pub struct FileCredentialStore {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileCredentialStore {
    /// Open the store in `dir`, loading existing items if the file exists.
    pub async fn open(dir: &Path) -> Result<Self, CredentialError> {
        let path = dir.join(FILE_NAME);
        let items = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CredentialError::DeserializationError(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(CredentialError::IoError(e.to_string())),
        };
        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, items: &BTreeMap<String, String>) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CredentialError::IoError(e.to_string()))?;
        }
        let json = serde_json::to_vec_pretty(items)
            .map_err(|e| CredentialError::SerializationError(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| CredentialError::IoError(e.to_string()))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, CredentialError> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        let mut items = self.items.lock().await;
        items.insert(key.to_string(), value.to_string());
        self.flush(&items).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), CredentialError> {
        let mut items = self.items.lock().await;
        if items.remove(key).is_some() {
            self.flush(&items).await?;
        }
        Ok(())
    }
}
