//! `ObjectStore` over the hosted storage API.

use async_trait::async_trait;
use fleet_storage::{ObjectStore, StorageError};
use serde_json::json;

use super::{bearer, blocking};
use crate::config::ClientConfig;

pub struct RestBucket {
    base_url: String,
    api_key: String,
    bucket: String,
    agent: ureq::Agent,
}

impl RestBucket {
    pub fn new(config: &ClientConfig, bucket: impl Into<String>) -> Self {
        RestBucket {
            base_url: config.database_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            bucket: bucket.into(),
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    /// Endpoint for writing `path`.
    pub fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            encode_path(path)
        )
    }

    /// URL under which `path` is publicly readable.
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            encode_path(path)
        )
    }
}

/// Percent-encode each segment of an object path, keeping the `/`
/// separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl ObjectStore for RestBucket {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let url = self.object_url(path);
        let public = self.public_url(path);
        let agent = self.agent.clone();
        let auth = bearer(&self.api_key);
        let api_key = self.api_key.clone();
        let content_type = content_type.to_string();
        let object_path = path.to_string();
        blocking(move || {
            agent
                .post(url)
                .header("apikey", &api_key)
                .header("Authorization", &auth)
                .header("Content-Type", &content_type)
                .header("x-upsert", "true")
                .send(&bytes[..])
                .map_err(|e| StorageError::Object {
                    path: object_path,
                    message: e.to_string(),
                })?;
            Ok(public)
        })
        .await
    }

    async fn remove(&self, paths: &[String]) -> Result<(), StorageError> {
        if paths.is_empty() {
            return Ok(());
        }
        let url = format!("{}/storage/v1/object/{}", self.base_url, self.bucket);
        let body = json!({ "prefixes": paths });
        let agent = self.agent.clone();
        let auth = bearer(&self.api_key);
        let api_key = self.api_key.clone();
        let first = paths[0].clone();
        blocking(move || {
            agent
                .delete(url)
                .header("apikey", &api_key)
                .header("Authorization", &auth)
                .force_send_body()
                .send_json(body)
                .map_err(|e| StorageError::Object {
                    path: first,
                    message: e.to_string(),
                })?;
            Ok(())
        })
        .await
    }
}
