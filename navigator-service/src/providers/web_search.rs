//! Keyword web search (Firecrawl-style `POST /v1/search`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use stage_flow::{Evidence, RawEvidence, SearchService, ServiceClient, ServiceConfig, ServiceError};

pub struct WebSearch {
    client: ServiceClient,
    config: ServiceConfig,
}

impl WebSearch {
    pub fn new(client: ServiceClient, config: ServiceConfig) -> Self {
        Self { client, config }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<Vec<SearchHit>>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    markdown: Option<String>,
}

impl From<SearchHit> for Evidence {
    fn from(hit: SearchHit) -> Self {
        let evidence = Evidence::search_hit(
            hit.title.unwrap_or_default(),
            hit.url.unwrap_or_default(),
            hit.description.unwrap_or_default(),
        );
        match hit.markdown.filter(|m| !m.is_empty()) {
            Some(markdown) => evidence.with_body(markdown),
            None => evidence,
        }
    }
}

#[async_trait]
impl SearchService for WebSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<RawEvidence, ServiceError> {
        let payload = json!({ "query": query, "limit": limit });
        let response = self.client.call(&self.config, "v1/search", &payload).await?;
        Ok(parse_hits(&self.config.name, response.body)?
            .into_iter()
            .take(limit)
            .collect())
    }
}

/// A body without `data` is an empty result, not an error.
fn parse_hits(service: &str, body: serde_json::Value) -> Result<RawEvidence, ServiceError> {
    let parsed: SearchResponse =
        serde_json::from_value(body).map_err(|e| ServiceError::MalformedResponse {
            service: service.to_string(),
            message: e.to_string(),
        })?;
    Ok(parsed
        .data
        .unwrap_or_default()
        .into_iter()
        .map(Evidence::from)
        .collect())
}
