//! Google Custom Search JSON API adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use hottake_shared::{HotTakeError, Result, SearchConfig, SearchResult, read_secret};

use crate::{SearchProvider, USER_AGENT};

/// The API never returns more than this many items per request.
const MAX_RESULTS_PER_REQUEST: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    link: String,
    #[serde(default)]
    title: String,
}

/// Keyword search through the Custom Search JSON API.
pub struct GoogleSearch {
    client: Client,
    base_url: String,
    api_key: String,
    engine_id: String,
}

impl GoogleSearch {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HotTakeError::UpstreamFailure(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            engine_id: engine_id.into(),
        })
    }

    /// Build from the `[search]` config section, reading credentials from the env.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            read_secret(&config.api_key_env)?,
            read_secret(&config.engine_id_env)?,
        )
    }
}

#[async_trait]
impl SearchProvider for GoogleSearch {
    #[instrument(skip_all, fields(keyword = %keyword, limit))]
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let num = limit.clamp(1, MAX_RESULTS_PER_REQUEST).to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", keyword),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| HotTakeError::UpstreamFailure(format!("search request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(HotTakeError::UpstreamFailure(format!(
                "search API error ({status}): {error_text}"
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| HotTakeError::UpstreamFailure(format!("invalid search response: {e}")))?;

        let hits: Vec<SearchResult> = parsed
            .items
            .into_iter()
            .take(limit)
            .map(|item| SearchResult {
                url: item.link,
                title: item.title,
            })
            .collect();

        debug!(hits = hits.len(), "search complete");
        Ok(hits)
    }
}
