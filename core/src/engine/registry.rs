use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::SearchResult;

pub const DEFAULT_SEARCH_LIMIT: usize = 25;
const DOCKER_HUB_URL: &str = "https://hub.docker.com";

/// Docker Hub search client.
///
/// Tries the v3 product search first and falls back to the legacy
/// repository search when the v3 endpoint answers with a non-success status.
#[derive(Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: reqwest::Client,
    user_agent: String,
}

#[derive(Debug, Deserialize)]
struct ProductSearchResponse {
    #[serde(default)]
    summaries: Vec<ProductSummary>,
}

#[derive(Debug, Deserialize)]
struct ProductSummary {
    name: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    short_description: String,
    #[serde(default)]
    star_count: i64,
    #[serde(default)]
    filter_type: String,
}

#[derive(Debug, Deserialize)]
struct LegacySearchResponse {
    #[serde(default)]
    results: Vec<LegacyRepository>,
}

#[derive(Debug, Deserialize)]
struct LegacyRepository {
    #[serde(alias = "repo_name")]
    name: String,
    #[serde(alias = "short_description")]
    description: Option<String>,
    #[serde(default)]
    star_count: i64,
    #[serde(default)]
    is_official: bool,
    #[serde(default)]
    is_automated: bool,
}

impl RegistryClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(DOCKER_HUB_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::validation(format!("invalid registry URL {}: {}", base_url, e)))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::operation("build registry client", e.to_string()))?;

        Ok(Self {
            base_url,
            http,
            user_agent: format!("dock/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn build_url(&self, path_and_query: &str) -> Result<Url> {
        self.base_url.join(path_and_query).map_err(|e| {
            Error::operation(
                "search registry",
                format!(
                    "failed to join base_url={} with path={}: {}",
                    self.base_url, path_and_query, e
                ),
            )
        })
    }

    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<SearchResult>> {
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let encoded = utf8_percent_encode(query, NON_ALPHANUMERIC).to_string();

        let url = self.build_url(&format!(
            "/api/content/v1/products/search?q={}&page_size={}",
            encoded, limit
        ))?;
        debug!("HTTP GET {}", url);

        let resp = self
            .http
            .get(url)
            .header("user-agent", &self.user_agent)
            .header("Search-Version", "v3")
            .send()
            .await
            .map_err(|e| Error::operation("search registry", e.to_string()))?;

        if !resp.status().is_success() {
            warn!(
                "Registry product search returned {}, falling back to legacy search",
                resp.status()
            );
            return self.search_legacy(&encoded, limit).await;
        }

        let parsed: ProductSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::operation("parse registry search results", e.to_string()))?;

        Ok(parsed
            .summaries
            .into_iter()
            .map(|r| SearchResult {
                name: if r.slug.is_empty() { r.name } else { r.slug },
                description: r.short_description,
                star_count: r.star_count,
                is_official: r.filter_type == "official",
                is_automated: false,
            })
            .collect())
    }

    async fn search_legacy(&self, encoded_query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let url = self.build_url(&format!(
            "/v2/search/repositories/?query={}&page_size={}",
            encoded_query, limit
        ))?;
        debug!("HTTP GET {} (legacy)", url);

        let resp = self
            .http
            .get(url)
            .header("user-agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| Error::operation("search registry (legacy)", e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::operation(
                "search registry (legacy)",
                format!("status={} body={}", status.as_u16(), body),
            ));
        }

        let parsed: LegacySearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::operation("parse registry search results", e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| SearchResult {
                name: r.name,
                description: r
                    .description
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| "No description".to_string()),
                star_count: r.star_count,
                is_official: r.is_official,
                is_automated: r.is_automated,
            })
            .collect())
    }
}
