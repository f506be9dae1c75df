//! Discovery run orchestration.
//!
//! One run owns one DiscoveryJob row: search fans the query out to candidate
//! URLs, batches flow through extraction with per-URL fallback, images are
//! enriched in parallel, records persist, and embedding follow-ups are
//! scheduled fire-and-forget. Batches run sequentially with an inter-batch
//! delay to respect upstream rate limits.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use fundscout_common::{Config, DiscoveryJob, JobKind, SourceKind, UserProfile};

use crate::batch::{finalize_draft, BatchConfig, BatchExtractor, BatchReport};
use crate::embedding::schedule_embedding;
use crate::images::resolve_images;
use crate::poller::Clock;
use crate::query;
use crate::traits::{EmbeddingClient, ExtractClient, OpportunityStore, PageFetcher, SearchClient};

#[derive(Debug, Clone)]
pub struct ScoutConfig {
    pub general_search_limit: usize,
    pub profile_search_limit: usize,
    pub batch: BatchConfig,
    pub batch_delay: Duration,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            general_search_limit: 50,
            profile_search_limit: 30,
            batch: BatchConfig::default(),
            batch_delay: Duration::from_secs(2),
        }
    }
}

impl From<&Config> for ScoutConfig {
    fn from(config: &Config) -> Self {
        Self {
            general_search_limit: config.general_search_limit,
            profile_search_limit: config.profile_search_limit,
            batch: BatchConfig {
                batch_size: config.extract_batch_size,
                poll: crate::poller::PollConfig {
                    interval: config.poll_interval,
                    max_attempts: config.poll_max_attempts,
                },
                merged_object_policy: config.merged_object_policy,
            },
            batch_delay: config.batch_delay,
        }
    }
}

/// Stats from one discovery run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub urls_discovered: u32,
    pub batches: u32,
    pub degraded_batches: u32,
    pub fallback_extractions: u32,
    pub extracted_items: u32,
    pub skipped_existing: u32,
    pub opportunities_persisted: u32,
    pub images_resolved: u32,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Discovery Run Complete ===")?;
        writeln!(f, "URLs discovered:   {}", self.urls_discovered)?;
        writeln!(f, "Batches:           {} ({} degraded)", self.batches, self.degraded_batches)?;
        writeln!(f, "Fallback extracts: {}", self.fallback_extractions)?;
        writeln!(f, "Items extracted:   {}", self.extracted_items)?;
        writeln!(f, "Skipped existing:  {}", self.skipped_existing)?;
        writeln!(f, "Persisted:         {}", self.opportunities_persisted)?;
        writeln!(f, "Images resolved:   {}", self.images_resolved)?;
        Ok(())
    }
}

pub struct Scout {
    search: Arc<dyn SearchClient>,
    extract: Arc<dyn ExtractClient>,
    embedder: Arc<dyn EmbeddingClient>,
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn OpportunityStore>,
    clock: Arc<dyn Clock>,
    config: ScoutConfig,
}

impl Scout {
    pub fn new(
        search: Arc<dyn SearchClient>,
        extract: Arc<dyn ExtractClient>,
        embedder: Arc<dyn EmbeddingClient>,
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn OpportunityStore>,
        clock: Arc<dyn Clock>,
        config: ScoutConfig,
    ) -> Self {
        Self {
            search,
            extract,
            embedder,
            fetcher,
            store,
            clock,
            config,
        }
    }

    /// General discovery from a free-text query, as triggered by the external
    /// scheduler.
    pub async fn run_general(&self, raw_query: &str) -> Result<(DiscoveryJob, RunStats)> {
        let query = query::freetext_query(raw_query);
        self.run(
            JobKind::General,
            None,
            &query,
            self.config.general_search_limit,
            SourceKind::GeneralSearch,
        )
        .await
    }

    /// Profile-scoped discovery for one user.
    pub async fn run_for_profile(&self, profile: &UserProfile) -> Result<(DiscoveryJob, RunStats)> {
        let query = query::profile_query(profile);
        self.run(
            JobKind::ProfileScoped,
            Some(profile.user_id),
            &query,
            self.config.profile_search_limit,
            SourceKind::ProfileSearch,
        )
        .await
    }

    async fn run(
        &self,
        kind: JobKind,
        user_id: Option<Uuid>,
        query: &str,
        search_limit: usize,
        source: SourceKind,
    ) -> Result<(DiscoveryJob, RunStats)> {
        let job = self.store.create_job(kind, user_id, query).await?;
        self.store.mark_job_running(job.id).await?;
        info!(job_id = %job.id, kind = %kind, query, "Discovery run starting");

        match self.run_inner(query, search_limit, source).await {
            Ok(stats) => {
                self.store
                    .complete_job(job.id, stats.opportunities_persisted as i32)
                    .await?;
                info!(job_id = %job.id, "{stats}");
                Ok((job, stats))
            }
            Err(e) => {
                // Partial successes stay persisted; only the job is failed.
                if let Err(fail_err) = self.store.fail_job(job.id, &e.to_string()).await {
                    warn!(job_id = %job.id, error = %fail_err, "Failed to record job failure");
                }
                warn!(job_id = %job.id, error = %e, "Discovery run failed");
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        query: &str,
        search_limit: usize,
        source: SourceKind,
    ) -> Result<RunStats> {
        let mut stats = RunStats::default();

        // Phase 1: search. No results fails the whole job.
        let hits = self.search.search(query, search_limit).await?;
        let mut seen = HashSet::new();
        let urls: Vec<String> = hits
            .into_iter()
            .map(|h| sanitize_url(&h.url))
            .filter(|u| !u.is_empty() && seen.insert(u.clone()))
            .take(search_limit)
            .collect();
        stats.urls_discovered = urls.len() as u32;

        if urls.is_empty() {
            anyhow::bail!("search returned no results for query: {query}");
        }
        info!(urls = urls.len(), "Search phase complete");

        // Phase 2: extract in fixed-size batches, sequentially.
        let extractor = BatchExtractor::new(
            self.extract.as_ref(),
            self.clock.as_ref(),
            self.config.batch,
        );

        for (i, chunk) in urls.chunks(self.config.batch.batch_size).enumerate() {
            if i > 0 {
                self.clock.sleep(self.config.batch_delay).await;
            }
            stats.batches += 1;

            let (drafts, report) = extractor.extract_batch(chunk).await?;
            self.roll_up(&report, &mut stats);
            stats.extracted_items += drafts.len() as u32;

            // Best-effort image fan-out, parallel across the batch.
            let images = resolve_images(self.fetcher.as_ref(), chunk).await;
            stats.images_resolved += images.len() as u32;

            self.persist_batch(drafts, chunk, &images, source, &mut stats)
                .await?;
        }

        Ok(stats)
    }

    fn roll_up(&self, report: &BatchReport, stats: &mut RunStats) {
        if report.degraded {
            stats.degraded_batches += 1;
        }
        stats.fallback_extractions += report.fallback_extractions;
    }

    async fn persist_batch(
        &self,
        drafts: Vec<fundscout_common::OpportunityDraft>,
        chunk: &[String],
        images: &std::collections::HashMap<String, String>,
        source: SourceKind,
        stats: &mut RunStats,
    ) -> Result<()> {
        let draft_urls: Vec<String> = drafts
            .iter()
            .filter_map(|d| d.application_url.clone())
            .collect();
        let mut existing = self.store.existing_application_urls(&draft_urls).await?;

        for draft in drafts {
            let fallback_url = draft
                .application_url
                .clone()
                .or_else(|| chunk.first().cloned())
                .unwrap_or_default();

            if existing.contains(&fallback_url) {
                stats.skipped_existing += 1;
                continue;
            }

            let image = images.get(&fallback_url).cloned();
            let new = finalize_draft(draft, &fallback_url, image, source);
            existing.insert(new.application_url.clone());

            let opportunity = self.store.insert_opportunity(new).await?;
            stats.opportunities_persisted += 1;

            schedule_embedding(self.embedder.clone(), self.store.clone(), opportunity);
        }
        Ok(())
    }
}

/// Strip tracking parameters that bloat dedup keys and leak referrer state.
fn sanitize_url(url: &str) -> String {
    const TRACKING_PARAMS: &[&str] = &[
        "fbclid", "gclid", "utm_source", "utm_medium", "utm_campaign", "utm_term", "utm_content",
        "ref", "mc_cid", "mc_eid",
    ];

    let Ok(mut parsed) = url::Url::parse(url) else {
        return url.trim().to_string();
    };

    if parsed.query().is_none() {
        return parsed.to_string();
    }

    let clean_pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if clean_pairs.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(clean_pairs);
    }

    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use fundscout_common::JobStatus;

    use crate::testing::{hit, ManualClock, MemoryStore, MockExtract, MockFetcher, MockSearch};
    use crate::traits::ExtractPoll;

    fn scout_with(
        search: MockSearch,
        extract: MockExtract,
        store: Arc<MemoryStore>,
        config: ScoutConfig,
    ) -> Scout {
        Scout::new(
            Arc::new(search),
            Arc::new(extract),
            Arc::new(crate::testing::FixedEmbedder),
            Arc::new(MockFetcher::new()),
            store,
            Arc::new(ManualClock::new()),
            config,
        )
    }

    fn item(title: &str, url: &str) -> serde_json::Value {
        json!({"title": title, "provider": "Acme", "description": "desc",
               "deadline": "2026-12-01", "application_url": url})
    }

    #[test]
    fn sanitize_strips_tracking_params_only() {
        assert_eq!(
            sanitize_url("https://example.org/a?utm_source=x&page=2"),
            "https://example.org/a?page=2"
        );
        assert_eq!(
            sanitize_url("https://example.org/a?utm_source=x"),
            "https://example.org/a"
        );
        assert_eq!(sanitize_url("https://example.org/a"), "https://example.org/a");
    }

    #[tokio::test]
    async fn empty_search_results_fail_the_job() {
        let store = Arc::new(MemoryStore::new());
        let scout = scout_with(
            MockSearch::new(),
            MockExtract::new(),
            store.clone(),
            ScoutConfig::default(),
        );

        let err = scout.run_general("nothing to find").await.unwrap_err();
        assert!(err.to_string().contains("no results"));

        assert!(store.all_opportunities().is_empty());
        let jobs = store.all_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert!(jobs[0].error.as_deref().unwrap().contains("no results"));
    }

    #[tokio::test]
    async fn search_outage_marks_job_failed_with_message() {
        let store = Arc::new(MemoryStore::new());
        let scout = scout_with(
            MockSearch::new().failing(),
            MockExtract::new(),
            store.clone(),
            ScoutConfig::default(),
        );

        let err = scout.run_general("AI scholarships").await.unwrap_err();
        assert!(err.to_string().contains("outage"));

        let jobs = store.all_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn poll_timeout_fails_job_but_keeps_partial_results() {
        let q = crate::query::freetext_query("AI scholarships");
        let url_a = "https://a.example.org/award".to_string();
        let url_b = "https://b.example.org/award".to_string();

        let search = MockSearch::new().on_query(&q, vec![hit(&url_a), hit(&url_b)]);
        // Batch size 1 → two sequential batches. First completes, second
        // never finishes and its per-URL retry hangs the same way.
        let extract = MockExtract::new()
            .completed_for_urls(
                std::slice::from_ref(&url_a),
                json!([item("First", &url_a)]),
            )
            .on_urls(std::slice::from_ref(&url_b), vec![ExtractPoll::Processing]);

        let config = ScoutConfig {
            general_search_limit: 2,
            batch: BatchConfig {
                batch_size: 1,
                poll: crate::poller::PollConfig {
                    interval: Duration::from_secs(5),
                    max_attempts: 2,
                },
                ..Default::default()
            },
            ..Default::default()
        };

        let store = Arc::new(MemoryStore::new());
        let scout = scout_with(search, extract, store.clone(), config);

        let err = scout.run_general("AI scholarships").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));

        // The first batch's opportunity survived the later failure.
        let persisted = store.all_opportunities();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].title, "First");
    }

    #[tokio::test]
    async fn repeated_run_skips_already_persisted_urls() {
        let q = crate::query::freetext_query("AI scholarships");
        let url = "https://a.example.org/award".to_string();

        let store = Arc::new(MemoryStore::new());
        let config = ScoutConfig {
            general_search_limit: 5,
            ..Default::default()
        };

        for _ in 0..2 {
            let search = MockSearch::new().on_query(&q, vec![hit(&url)]);
            let extract = MockExtract::new().completed_for_urls(
                std::slice::from_ref(&url),
                json!([item("Award", &url)]),
            );
            let scout = scout_with(search, extract, store.clone(), config.clone());
            scout.run_general("AI scholarships").await.unwrap();
        }

        assert_eq!(store.all_opportunities().len(), 1);
    }

    #[tokio::test]
    async fn profile_run_records_owner_and_source() {
        let profile = UserProfile {
            user_id: Uuid::from_u128(7),
            ..Default::default()
        };
        let q = crate::query::profile_query(&profile);
        let url = "https://a.example.org/award".to_string();

        let search = MockSearch::new().on_query(&q, vec![hit(&url)]);
        let extract = MockExtract::new().completed_for_urls(
            std::slice::from_ref(&url),
            json!([item("Award", &url)]),
        );
        let store = Arc::new(MemoryStore::new());
        let scout = scout_with(search, extract, store.clone(), ScoutConfig::default());

        let (job, stats) = scout.run_for_profile(&profile).await.unwrap();
        assert_eq!(job.user_id, Some(profile.user_id));
        assert_eq!(stats.opportunities_persisted, 1);

        let stored_job = store.job(job.id).unwrap();
        assert_eq!(stored_job.status, JobStatus::Completed);
        assert_eq!(stored_job.result_count, 1);
        assert_eq!(
            store.all_opportunities()[0].source,
            SourceKind::ProfileSearch
        );
    }
}
