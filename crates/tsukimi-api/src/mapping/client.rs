use reqwest::{Client, StatusCode};

use tsukimi_core::config::MappingConfig;
use tsukimi_core::models::EpisodeMapping;

use super::error::MappingError;
use super::types::{EpisodeListResponse, MappingResponse, TitleMapping};
use crate::traits::MappingService;

/// Client for the episode/alternate-id mapping services.
#[derive(Debug, Clone)]
pub struct MappingClient {
    endpoint: String,
    episode_endpoint: String,
    http: Client,
}

impl MappingClient {
    pub fn new(config: &MappingConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            episode_endpoint: config.episode_endpoint.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    async fn check_response(
        resp: reqwest::Response,
        anilist_id: u64,
    ) -> Result<reqwest::Response, MappingError> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else if status == StatusCode::NOT_FOUND {
            Err(MappingError::NotFound(anilist_id))
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(MappingError::Api {
                status: status.as_u16(),
                message: body,
            })
        }
    }
}

impl MappingService for MappingClient {
    type Error = MappingError;

    async fn title_mapping(&self, anilist_id: u64) -> Result<TitleMapping, MappingError> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("anilist_id", anilist_id)])
            .send()
            .await?;
        let resp = Self::check_response(resp, anilist_id).await?;
        let body: MappingResponse = resp
            .json()
            .await
            .map_err(|e| MappingError::Parse(e.to_string()))?;
        let mapping = body.into_title_mapping(anilist_id);
        tracing::debug!(
            anilist_id,
            mal_id = ?mapping.mal_id,
            episodes = mapping.episodes.len(),
            "Fetched title mapping"
        );
        Ok(mapping)
    }

    async fn episode_mapping(&self, anilist_id: u64) -> Result<EpisodeMapping, MappingError> {
        let resp = self
            .http
            .get(format!("{}/{anilist_id}", self.episode_endpoint))
            .send()
            .await?;
        let resp = Self::check_response(resp, anilist_id).await?;
        let body: EpisodeListResponse = resp
            .json()
            .await
            .map_err(|e| MappingError::Parse(e.to_string()))?;
        let mapping = body.into_mapping();
        tracing::debug!(anilist_id, episodes = mapping.len(), "Fetched episode mapping");
        Ok(mapping)
    }
}
