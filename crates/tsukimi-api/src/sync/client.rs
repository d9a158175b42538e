use reqwest::Client;
use url::Url;

use tsukimi_core::models::{Identity, PendingSyncBatch};
use tsukimi_core::storage::{progress_map_from_value, ProgressMap};

use super::error::SyncError;
use super::types::SyncPayload;
use crate::traits::RemoteProgressStore;

/// HTTP client for the remote progress service.
#[derive(Debug, Clone)]
pub struct HttpProgressClient {
    base: Url,
    http: Client,
}

impl HttpProgressClient {
    pub fn new(endpoint: &str) -> Result<Self, SyncError> {
        let mut base = Url::parse(endpoint).map_err(|e| SyncError::Endpoint(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(SyncError::Endpoint(format!("{endpoint} cannot be a base URL")));
        }
        // Keep the configured path as a prefix when joining.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            base,
            http: Client::new(),
        })
    }

    fn progress_url(&self, identity: &Identity) -> Result<Url, SyncError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::Endpoint(self.base.to_string()))?
            .pop_if_empty()
            .extend(["users", identity.user_id.as_str(), "progress"]);
        Ok(url)
    }

    fn auth_header(identity: &Identity) -> String {
        format!("Bearer {}", identity.token)
    }

    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(SyncError::Api {
                status,
                message: body,
            })
        }
    }
}

impl RemoteProgressStore for HttpProgressClient {
    type Error = SyncError;

    async fn push(&self, identity: &Identity, batch: &PendingSyncBatch) -> Result<(), SyncError> {
        let payload = SyncPayload::from(batch);
        let resp = self
            .http
            .post(self.progress_url(identity)?)
            .header("Authorization", Self::auth_header(identity))
            .json(&payload)
            .send()
            .await?;
        Self::check_response(resp).await?;
        tracing::debug!(
            upserts = payload.upserts.len(),
            deletes = payload.deletes.len(),
            "Pushed progress batch"
        );
        Ok(())
    }

    async fn fetch(&self, identity: &Identity) -> Result<ProgressMap, SyncError> {
        let resp = self
            .http
            .get(self.progress_url(identity)?)
            .header("Authorization", Self::auth_header(identity))
            .send()
            .await?;
        let resp = Self::check_response(resp).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SyncError::Parse(e.to_string()))?;
        Ok(progress_map_from_value(body))
    }
}
