// Trait abstractions for the discovery pipeline's external capabilities.
//
// Each upstream dependency — web search, async structured extraction, page
// fetching, embeddings, and the store itself — sits behind one trait, injected
// at construction. The pipeline never names a vendor; the vendor clients
// implement these traits below.
//
// This is what makes the pipeline deterministic under test: MockSearch,
// MockExtract, MockFetcher, FixedEmbedder, and MemoryStore in `testing` swap
// in with no network, no database, no Docker.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use fundscout_common::{DiscoveryJob, JobKind, NewOpportunity, Opportunity};

// ---------------------------------------------------------------------------
// SearchClient
// ---------------------------------------------------------------------------

/// One organic search result from the web-search capability.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Run a web search, returning up to `limit` organic hits.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

#[async_trait]
impl SearchClient for firecrawl_client::FirecrawlClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let hits = firecrawl_client::FirecrawlClient::search(self, query, limit).await?;
        Ok(hits
            .into_iter()
            .filter(|h| !h.url.is_empty())
            .map(|h| SearchHit {
                url: h.url,
                title: h.title,
                snippet: h.description,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// ExtractClient
// ---------------------------------------------------------------------------

/// One poll step of an asynchronous extraction job.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractPoll {
    Pending,
    Processing,
    /// Payload shape varies; interpreting it is the batch extractor's policy.
    Completed(serde_json::Value),
    Failed(String),
}

#[async_trait]
pub trait ExtractClient: Send + Sync {
    /// Submit a structured-extraction job over one or more URLs. Returns a
    /// job id for polling.
    async fn submit(
        &self,
        urls: &[String],
        prompt: &str,
        schema: serde_json::Value,
    ) -> Result<String>;

    /// One status check. The poll loop lives in the poller, not here.
    async fn status(&self, job_id: &str) -> Result<ExtractPoll>;
}

#[async_trait]
impl ExtractClient for firecrawl_client::FirecrawlClient {
    async fn submit(
        &self,
        urls: &[String],
        prompt: &str,
        schema: serde_json::Value,
    ) -> Result<String> {
        Ok(self.extract_submit(urls, prompt, schema).await?)
    }

    async fn status(&self, job_id: &str) -> Result<ExtractPoll> {
        use firecrawl_client::ExtractJobState;

        let resp = self.extract_status(job_id).await?;
        Ok(match resp.state() {
            ExtractJobState::Pending => ExtractPoll::Pending,
            ExtractJobState::Processing => ExtractPoll::Processing,
            ExtractJobState::Completed => {
                ExtractPoll::Completed(resp.data.unwrap_or(serde_json::Value::Null))
            }
            ExtractJobState::Failed => ExtractPoll::Failed(
                resp.error.unwrap_or_else(|| "extraction failed upstream".to_string()),
            ),
        })
    }
}

// ---------------------------------------------------------------------------
// PageFetcher
// ---------------------------------------------------------------------------

/// Best-effort page content used for image/preview enrichment.
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub markdown: String,
    pub og_image: Option<String>,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PageContent>;
}

#[async_trait]
impl PageFetcher for firecrawl_client::FirecrawlClient {
    async fn fetch(&self, url: &str) -> Result<PageContent> {
        let data = self.scrape(url).await?;
        Ok(PageContent {
            markdown: data.markdown,
            og_image: data.metadata.og_image,
        })
    }
}

// ---------------------------------------------------------------------------
// EmbeddingClient
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a text payload into the fixed system-wide dimension.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
impl EmbeddingClient for openai_client::OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(openai_client::OpenAiClient::embed(self, text).await?)
    }
}

// ---------------------------------------------------------------------------
// OpportunityStore — the persistence seam the pipeline writes through
// ---------------------------------------------------------------------------

#[async_trait]
pub trait OpportunityStore: Send + Sync {
    async fn create_job(
        &self,
        kind: JobKind,
        user_id: Option<Uuid>,
        query: &str,
    ) -> Result<DiscoveryJob>;

    async fn mark_job_running(&self, id: Uuid) -> Result<()>;

    async fn complete_job(&self, id: Uuid, result_count: i32) -> Result<()>;

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<()>;

    async fn insert_opportunity(&self, new: NewOpportunity) -> Result<Opportunity>;

    /// Which of these application URLs already have a row.
    async fn existing_application_urls(&self, urls: &[String]) -> Result<HashSet<String>>;

    /// Idempotent overwrite of the embedding and its source text.
    async fn set_embedding(&self, id: Uuid, embedding: &[f32], text: &str) -> Result<()>;

    /// Opportunities still lacking an embedding, oldest first.
    async fn without_embedding(&self, limit: i64) -> Result<Vec<Opportunity>>;

    async fn get_opportunities(&self, ids: &[Uuid]) -> Result<Vec<Opportunity>>;
}

#[async_trait]
impl OpportunityStore for fundscout_store::PgStore {
    async fn create_job(
        &self,
        kind: JobKind,
        user_id: Option<Uuid>,
        query: &str,
    ) -> Result<DiscoveryJob> {
        Ok(fundscout_store::PgStore::create_job(self, kind, user_id, query).await?)
    }

    async fn mark_job_running(&self, id: Uuid) -> Result<()> {
        Ok(fundscout_store::PgStore::mark_job_running(self, id).await?)
    }

    async fn complete_job(&self, id: Uuid, result_count: i32) -> Result<()> {
        Ok(fundscout_store::PgStore::complete_job(self, id, result_count).await?)
    }

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<()> {
        Ok(fundscout_store::PgStore::fail_job(self, id, error).await?)
    }

    async fn insert_opportunity(&self, new: NewOpportunity) -> Result<Opportunity> {
        Ok(fundscout_store::PgStore::insert_opportunity(self, new).await?)
    }

    async fn existing_application_urls(&self, urls: &[String]) -> Result<HashSet<String>> {
        Ok(fundscout_store::PgStore::existing_application_urls(self, urls).await?)
    }

    async fn set_embedding(&self, id: Uuid, embedding: &[f32], text: &str) -> Result<()> {
        Ok(fundscout_store::PgStore::set_embedding(self, id, embedding, text).await?)
    }

    async fn without_embedding(&self, limit: i64) -> Result<Vec<Opportunity>> {
        Ok(fundscout_store::PgStore::without_embedding(self, limit).await?)
    }

    async fn get_opportunities(&self, ids: &[Uuid]) -> Result<Vec<Opportunity>> {
        Ok(fundscout_store::PgStore::get_opportunities(self, ids).await?)
    }
}
