use std::env;
use std::time::Duration;

use crate::types::MergedObjectPolicy;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // External capabilities
    pub firecrawl_api_key: String,
    pub openai_api_key: String,

    // Search phase
    pub general_search_limit: usize,
    pub profile_search_limit: usize,

    // Extract phase
    pub extract_batch_size: usize,
    pub batch_delay: Duration,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
    pub merged_object_policy: MergedObjectPolicy,

    // Embedding backfill
    pub embed_backfill_limit: usize,
    pub embed_delay: Duration,

    // Matching
    pub match_score_threshold: f64,
    pub legacy_tag_writer: bool,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            firecrawl_api_key: required_env("FIRECRAWL_API_KEY"),
            openai_api_key: required_env("OPENAI_API_KEY"),
            general_search_limit: env_usize("GENERAL_SEARCH_LIMIT", 50),
            profile_search_limit: env_usize("PROFILE_SEARCH_LIMIT", 30),
            extract_batch_size: env_usize("EXTRACT_BATCH_SIZE", 10),
            batch_delay: Duration::from_secs(env_u64("BATCH_DELAY_SECS", 2)),
            poll_interval: Duration::from_secs(env_u64("POLL_INTERVAL_SECS", 5)),
            poll_max_attempts: env_u64("POLL_MAX_ATTEMPTS", 60) as u32,
            merged_object_policy: merged_object_policy_from_env(),
            embed_backfill_limit: env_usize("EMBED_BACKFILL_LIMIT", 20),
            embed_delay: Duration::from_millis(env_u64("EMBED_DELAY_MS", 200)),
            match_score_threshold: env_f64("MATCH_SCORE_THRESHOLD", 30.0),
            legacy_tag_writer: env::var("LEGACY_TAG_WRITER")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    /// Log which keys are present without leaking their values.
    pub fn log_redacted(&self) {
        tracing::info!(
            database = !self.database_url.is_empty(),
            firecrawl = !self.firecrawl_api_key.is_empty(),
            openai = !self.openai_api_key.is_empty(),
            general_search_limit = self.general_search_limit,
            profile_search_limit = self.profile_search_limit,
            extract_batch_size = self.extract_batch_size,
            poll_max_attempts = self.poll_max_attempts,
            match_score_threshold = self.match_score_threshold,
            legacy_tag_writer = self.legacy_tag_writer,
            "Config loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn merged_object_policy_from_env() -> MergedObjectPolicy {
    match env::var("MERGED_OBJECT_POLICY").as_deref() {
        Ok("reject") => MergedObjectPolicy::Reject,
        _ => MergedObjectPolicy::SingleItem,
    }
}
