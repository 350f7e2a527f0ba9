use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

use crate::config::MediaConfig;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media storage is not configured")]
    NotConfigured,

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("delete failed: {0}")]
    Delete(String),
}

impl MediaError {
    pub fn client_message(&self) -> &'static str {
        match self {
            MediaError::NotConfigured => "Media storage is not configured",
            MediaError::Upload(_) => "Failed to upload some files",
            MediaError::Delete(_) => "Failed to delete media",
        }
    }
}

/// One file taken from a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMedia {
    pub public_id: String,
    pub secure_url: String,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, folder: &str, file: Upload) -> Result<StoredMedia, MediaError>;

    /// Removes an asset; returns the store's result string (e.g. "ok", "not found").
    async fn delete(&self, public_id: &str) -> Result<String, MediaError>;
}

/// Cloudinary upload API with signed requests.
pub struct CloudinaryStore {
    client: reqwest::Client,
    config: MediaConfig,
}

#[derive(Deserialize)]
struct DestroyResult {
    result: String,
}

impl CloudinaryStore {
    pub fn new(config: MediaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!("https://api.cloudinary.com/v1_1/{}/{}", self.config.cloud_name, action)
    }

    fn ensure_configured(&self) -> Result<(), MediaError> {
        if self.config.cloud_name.is_empty() || self.config.api_key.is_empty() || self.config.api_secret.is_empty() {
            return Err(MediaError::NotConfigured);
        }
        Ok(())
    }

    /// Signed form fields: the signed parameters plus api key, algorithm and signature.
    fn signed(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        params.push(("timestamp", Utc::now().timestamp().to_string()));
        let signature = sign(&params, &self.config.api_secret);
        params.push(("api_key", self.config.api_key.clone()));
        params.push(("signature_algorithm", "sha256".to_string()));
        params.push(("signature", signature));
        params
    }
}

/// SHA-256 over the `&`-joined, key-sorted parameters followed by the secret.
fn sign(params: &[(&str, String)], secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join("&");
    hex::encode(Sha256::digest(format!("{}{}", joined, secret)))
}

#[async_trait]
impl MediaStore for CloudinaryStore {
    async fn upload(&self, folder: &str, file: Upload) -> Result<StoredMedia, MediaError> {
        self.ensure_configured()?;

        let mut part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.file_name);
        if let Some(content_type) = file.content_type {
            part = part.mime_str(&content_type).map_err(|e| MediaError::Upload(e.to_string()))?;
        }
        let mut form = reqwest::multipart::Form::new().part("file", part);
        for (key, value) in self.signed(vec![("folder", folder.to_string())]) {
            form = form.text(key, value);
        }

        let response = self
            .client
            .post(self.endpoint("auto/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| MediaError::Upload(e.to_string()))?;
        if !response.status().is_success() {
            return Err(MediaError::Upload(format!("status {}", response.status())));
        }
        response.json::<StoredMedia>().await.map_err(|e| MediaError::Upload(e.to_string()))
    }

    async fn delete(&self, public_id: &str) -> Result<String, MediaError> {
        self.ensure_configured()?;

        let form: HashMap<_, _> = self.signed(vec![("public_id", public_id.to_string())]).into_iter().collect();
        let response = self
            .client
            .post(self.endpoint("image/destroy"))
            .form(&form)
            .send()
            .await
            .map_err(|e| MediaError::Delete(e.to_string()))?;
        if !response.status().is_success() {
            return Err(MediaError::Delete(format!("status {}", response.status())));
        }
        let body = response.json::<DestroyResult>().await.map_err(|e| MediaError::Delete(e.to_string()))?;
        Ok(body.result)
    }
}

/// Keeps uploads in memory; used when no media account is configured.
#[derive(Default)]
pub struct MemoryMediaStore {
    assets: Mutex<HashMap<String, usize>>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn upload(&self, folder: &str, file: Upload) -> Result<StoredMedia, MediaError> {
        let public_id = format!("{}/{}", folder, uuid::Uuid::new_v4());
        self.assets
            .lock()
            .map_err(|e| MediaError::Upload(e.to_string()))?
            .insert(public_id.clone(), file.bytes.len());
        Ok(StoredMedia {
            secure_url: format!("memory://{}/{}", public_id, file.file_name),
            public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<String, MediaError> {
        let removed = self
            .assets
            .lock()
            .map_err(|e| MediaError::Delete(e.to_string()))?
            .remove(public_id);
        Ok(if removed.is_some() { "ok" } else { "not found" }.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_sorts_parameters() {
        let a = sign(&[("timestamp", "1".into()), ("folder", "loans".into())], "s");
        let b = sign(&[("folder", "loans".into()), ("timestamp", "1".into())], "s");
        assert_eq!(a, b);
        assert_eq!(a, hex::encode(Sha256::digest("folder=loans&timestamp=1s")));
    }

    #[tokio::test]
    async fn unconfigured_cloudinary_fails_fast() {
        let store = CloudinaryStore::new(MediaConfig {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            root_folder: "x".into(),
        });
        let err = store.delete("abc").await.unwrap_err();
        assert!(matches!(err, MediaError::NotConfigured));
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryMediaStore::new();
        let stored = store
            .upload("microfinance/loans", Upload { file_name: "id.jpg".into(), content_type: None, bytes: vec![1, 2, 3] })
            .await
            .unwrap();
        assert!(stored.public_id.starts_with("microfinance/loans/"));
        assert_eq!(store.delete(&stored.public_id).await.unwrap(), "ok");
        assert_eq!(store.delete(&stored.public_id).await.unwrap(), "not found");
    }
}
