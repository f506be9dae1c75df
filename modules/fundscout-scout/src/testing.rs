// Test doubles for the discovery pipeline.
//
// One mock per trait boundary:
// - MockSearch (SearchClient) — HashMap query→hits
// - MockExtract (ExtractClient) — scripted poll sequences, keyed by URL set
// - MockFetcher (PageFetcher) — HashMap url→page
// - FixedEmbedder (EmbeddingClient) — deterministic hash-based vectors
// - MemoryStore (OpportunityStore) — stateful in-memory store
// - ManualClock (Clock) — counts sleeps, never waits

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use fundscout_common::{DiscoveryJob, JobKind, JobStatus, NewOpportunity, Opportunity};

use crate::poller::Clock;
use crate::traits::{
    EmbeddingClient, ExtractClient, ExtractPoll, OpportunityStore, PageContent, PageFetcher,
    SearchClient, SearchHit,
};

/// Embedding dimension used by test vectors.
pub const TEST_EMBEDDING_DIM: usize = 8;

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// Clock that records requested sleeps and returns immediately.
pub struct ManualClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn sleep_count(&self) -> usize {
        self.sleeps.lock().unwrap().len()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// MockSearch
// ---------------------------------------------------------------------------

/// HashMap-backed search. Unregistered queries return no hits, which is how
/// a job failure on empty results is provoked in tests.
pub struct MockSearch {
    results: HashMap<String, Vec<SearchHit>>,
    fail: bool,
}

impl MockSearch {
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
            fail: false,
        }
    }

    pub fn on_query(mut self, query: &str, hits: Vec<SearchHit>) -> Self {
        self.results.insert(query.to_string(), hits);
        self
    }

    /// Every search call errors, simulating an upstream outage.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl Default for MockSearch {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience constructor for search hits in tests.
pub fn hit(url: &str) -> SearchHit {
    SearchHit {
        url: url.to_string(),
        title: format!("Result for {url}"),
        snippet: String::new(),
    }
}

#[async_trait]
impl SearchClient for MockSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        if self.fail {
            bail!("MockSearch: simulated search outage");
        }
        let mut hits = self.results.get(query).cloned().unwrap_or_default();
        hits.truncate(limit);
        Ok(hits)
    }
}

// ---------------------------------------------------------------------------
// MockExtract
// ---------------------------------------------------------------------------

/// Scripted extraction capability. Submissions are matched by URL set first,
/// then by a FIFO of generic scripts; each job replays its poll sequence,
/// repeating the final state forever.
pub struct MockExtract {
    by_urls: Mutex<HashMap<String, Vec<ExtractPoll>>>,
    scripts: Mutex<VecDeque<Vec<ExtractPoll>>>,
    jobs: Mutex<HashMap<String, VecDeque<ExtractPoll>>>,
    submissions: Mutex<Vec<Vec<String>>>,
    fail_next_submit: AtomicBool,
    next_id: AtomicU32,
}

impl MockExtract {
    pub fn new() -> Self {
        Self {
            by_urls: Mutex::new(HashMap::new()),
            scripts: Mutex::new(VecDeque::new()),
            jobs: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
            fail_next_submit: AtomicBool::new(false),
            next_id: AtomicU32::new(0),
        }
    }

    fn urls_key(urls: &[String]) -> String {
        urls.join("\n")
    }

    /// Script the poll sequence for a specific URL set.
    pub fn on_urls(self, urls: &[String], polls: Vec<ExtractPoll>) -> Self {
        self.by_urls
            .lock()
            .unwrap()
            .insert(Self::urls_key(urls), polls);
        self
    }

    /// Shorthand: the URL set completes immediately with this payload.
    pub fn completed_for_urls(self, urls: &[String], payload: serde_json::Value) -> Self {
        self.on_urls(urls, vec![ExtractPoll::Completed(payload)])
    }

    /// Queue a poll sequence for the next otherwise-unmatched submission.
    pub fn script(self, polls: Vec<ExtractPoll>) -> Self {
        self.scripts.lock().unwrap().push_back(polls);
        self
    }

    /// The next submission call errors at the HTTP layer.
    pub fn fail_next_submission(self) -> Self {
        self.fail_next_submit.store(true, Ordering::SeqCst);
        self
    }

    /// Every URL list submitted so far, in order.
    pub fn submissions(&self) -> Vec<Vec<String>> {
        self.submissions.lock().unwrap().clone()
    }
}

impl Default for MockExtract {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractClient for MockExtract {
    async fn submit(
        &self,
        urls: &[String],
        _prompt: &str,
        _schema: serde_json::Value,
    ) -> Result<String> {
        self.submissions.lock().unwrap().push(urls.to_vec());

        if self.fail_next_submit.swap(false, Ordering::SeqCst) {
            bail!("MockExtract: simulated submission failure");
        }

        let polls = self
            .by_urls
            .lock()
            .unwrap()
            .get(&Self::urls_key(urls))
            .cloned()
            .or_else(|| self.scripts.lock().unwrap().pop_front())
            .unwrap_or_else(|| vec![ExtractPoll::Completed(serde_json::Value::Null)]);

        let id = format!("job-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.jobs.lock().unwrap().insert(id.clone(), polls.into());
        Ok(id)
    }

    async fn status(&self, job_id: &str) -> Result<ExtractPoll> {
        let mut jobs = self.jobs.lock().unwrap();
        let queue = jobs
            .get_mut(job_id)
            .ok_or_else(|| anyhow::anyhow!("MockExtract: unknown job {job_id}"))?;
        if queue.len() > 1 {
            Ok(queue.pop_front().expect("non-empty queue"))
        } else {
            // Repeat the terminal (or stuck) state forever.
            queue
                .front()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("MockExtract: empty script for {job_id}"))
        }
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// HashMap-backed page fetcher. Unregistered URLs error, exercising the
/// isolated failure domain of image enrichment.
pub struct MockFetcher {
    pages: HashMap<String, PageContent>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
        }
    }

    pub fn on_page(mut self, url: &str, page: PageContent) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<PageContent> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("MockFetcher: no page registered for {url}"))
    }
}

// ---------------------------------------------------------------------------
// FixedEmbedder
// ---------------------------------------------------------------------------

/// Deterministic embedder: the vector is a function of the text's hash, so
/// identical texts embed identically and tests stay stable.
pub struct FixedEmbedder;

#[async_trait]
impl EmbeddingClient for FixedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            bail!("FixedEmbedder: refusing to embed empty text");
        }
        let seed = text
            .bytes()
            .fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(b as u64));
        Ok((0..TEST_EMBEDDING_DIM)
            .map(|i| ((seed.rotate_left(i as u32 * 7) % 1000) as f32) / 1000.0)
            .collect())
    }
}

/// Embedder that always fails, for per-item error collection tests.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingClient for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("FailingEmbedder: simulated embedding outage")
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Stateful in-memory store for pipeline tests. No database, no Docker.
#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<Uuid, DiscoveryJob>>,
    opportunities: Mutex<Vec<Opportunity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_opportunities(&self) -> Vec<Opportunity> {
        self.opportunities.lock().unwrap().clone()
    }

    pub fn job(&self, id: Uuid) -> Option<DiscoveryJob> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    pub fn all_jobs(&self) -> Vec<DiscoveryJob> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    /// Seed an opportunity directly, bypassing the pipeline.
    pub fn seed_opportunity(&self, opportunity: Opportunity) {
        self.opportunities.lock().unwrap().push(opportunity);
    }
}

#[async_trait]
impl OpportunityStore for MemoryStore {
    async fn create_job(
        &self,
        kind: JobKind,
        user_id: Option<Uuid>,
        query: &str,
    ) -> Result<DiscoveryJob> {
        let job = DiscoveryJob {
            id: Uuid::new_v4(),
            kind,
            user_id,
            query: query.to_string(),
            status: JobStatus::Pending,
            result_count: 0,
            error: None,
            scheduled_at: Utc::now(),
            completed_at: None,
        };
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(job)
    }

    async fn mark_job_running(&self, id: Uuid) -> Result<()> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Running;
            }
        }
        Ok(())
    }

    async fn complete_job(&self, id: Uuid, result_count: i32) -> Result<()> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            if !job.status.is_terminal() {
                job.status = JobStatus::Completed;
                job.result_count = result_count;
                job.completed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<()> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            if !job.status.is_terminal() {
                job.status = JobStatus::Failed;
                job.error = Some(error.to_string());
                job.completed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn insert_opportunity(&self, mut new: NewOpportunity) -> Result<Opportunity> {
        new.apply_caps();
        let now = Utc::now();
        let opportunity = Opportunity {
            id: Uuid::new_v4(),
            embedding_text: new.embedding_text(),
            title: new.title,
            provider: new.provider,
            description: new.description,
            deadline: new.deadline,
            award_amount: new.award_amount,
            requirements: new.requirements,
            required_documents: new.required_documents,
            essay_prompts: new.essay_prompts,
            contact_info: new.contact_info,
            region: new.region,
            image_url: new.image_url,
            application_url: new.application_url,
            tags: new.tags,
            source: new.source,
            embedding: None,
            created_at: now,
            updated_at: now,
        };
        self.opportunities.lock().unwrap().push(opportunity.clone());
        Ok(opportunity)
    }

    async fn existing_application_urls(&self, urls: &[String]) -> Result<HashSet<String>> {
        let wanted: HashSet<&String> = urls.iter().collect();
        Ok(self
            .opportunities
            .lock()
            .unwrap()
            .iter()
            .filter(|o| wanted.contains(&o.application_url))
            .map(|o| o.application_url.clone())
            .collect())
    }

    async fn set_embedding(&self, id: Uuid, embedding: &[f32], text: &str) -> Result<()> {
        if let Some(opp) = self
            .opportunities
            .lock()
            .unwrap()
            .iter_mut()
            .find(|o| o.id == id)
        {
            opp.embedding = Some(embedding.to_vec());
            opp.embedding_text = text.to_string();
            opp.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn without_embedding(&self, limit: i64) -> Result<Vec<Opportunity>> {
        Ok(self
            .opportunities
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.embedding.is_none())
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_opportunities(&self, ids: &[Uuid]) -> Result<Vec<Opportunity>> {
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        Ok(self
            .opportunities
            .lock()
            .unwrap()
            .iter()
            .filter(|o| wanted.contains(&o.id))
            .cloned()
            .collect())
    }
}
