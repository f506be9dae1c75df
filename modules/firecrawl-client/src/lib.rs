pub mod error;
pub mod types;

pub use error::{FirecrawlError, Result};
pub use types::{
    ExtractJobState, ExtractRequest, ExtractStatusResponse, ExtractSubmitResponse, ScrapeData,
    SearchHit,
};

use types::{ScrapeRequest, ScrapeResponse, SearchRequest, SearchResponse};

const BASE_URL: &str = "https://api.firecrawl.dev/v1";

pub struct FirecrawlClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FirecrawlClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the client at a different endpoint (self-hosted instances).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Web search. Returns organic hits with url/title/snippet.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        tracing::info!(query, limit, "Firecrawl search");

        let body = SearchRequest {
            query: query.to_string(),
            limit,
        };
        let resp = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FirecrawlError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data: SearchResponse = resp.json().await?;
        tracing::info!(query, count = data.data.len(), "Firecrawl search complete");
        Ok(data.data)
    }

    /// Fetch a page as markdown plus metadata. Best-effort; used for image
    /// and preview enrichment.
    pub async fn scrape(&self, url: &str) -> Result<ScrapeData> {
        tracing::debug!(url, "Firecrawl scrape");

        let body = ScrapeRequest {
            url: url.to_string(),
            formats: vec!["markdown".to_string()],
        };
        let resp = self
            .client
            .post(format!("{}/scrape", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FirecrawlError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data: ScrapeResponse = resp.json().await?;
        Ok(data.data.unwrap_or_default())
    }

    /// Submit an asynchronous structured-extraction job over one or more URLs.
    /// Returns immediately with a job id for polling.
    pub async fn extract_submit(
        &self,
        urls: &[String],
        prompt: &str,
        schema: serde_json::Value,
    ) -> Result<String> {
        tracing::info!(urls = urls.len(), "Firecrawl extract submit");

        let body = ExtractRequest {
            urls: urls.to_vec(),
            prompt: prompt.to_string(),
            schema,
        };
        let resp = self
            .client
            .post(format!("{}/extract", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FirecrawlError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data: ExtractSubmitResponse = resp.json().await?;
        data.id.ok_or_else(|| {
            FirecrawlError::Parse("extract submission returned no job id".to_string())
        })
    }

    /// Check an extraction job. One poll step — the loop lives with the caller
    /// so it can enforce its own attempt ceiling.
    pub async fn extract_status(&self, job_id: &str) -> Result<ExtractStatusResponse> {
        let resp = self
            .client
            .get(format!("{}/extract/{}", self.base_url, job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FirecrawlError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data: ExtractStatusResponse = resp.json().await?;
        tracing::debug!(job_id, status = %data.status, "Extract job polled");
        Ok(data)
    }
}
