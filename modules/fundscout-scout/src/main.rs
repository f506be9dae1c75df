use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use firecrawl_client::FirecrawlClient;
use fundscout_common::Config;
use fundscout_scout::embedding;
use fundscout_scout::poller::TokioClock;
use fundscout_scout::scout::{Scout, ScoutConfig};
use fundscout_store::PgStore;
use openai_client::OpenAiClient;

/// Default query for the scheduler-triggered general run.
const GENERAL_QUERY: &str = "college scholarships grants fellowships open applications";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fundscout=info".parse()?))
        .init();

    info!("FundScout discovery starting...");

    let config = Config::from_env();
    config.log_redacted();

    let store = Arc::new(PgStore::connect(&config.database_url).await?);
    store.migrate().await?;

    let firecrawl = Arc::new(FirecrawlClient::new(&config.firecrawl_api_key));
    let embedder = Arc::new(OpenAiClient::new(&config.openai_api_key));
    let clock = Arc::new(TokioClock);

    let scout = Scout::new(
        firecrawl.clone(),
        firecrawl.clone(),
        embedder.clone(),
        firecrawl,
        store.clone(),
        clock.clone(),
        ScoutConfig::from(&config),
    );

    let (job, stats) = scout.run_general(GENERAL_QUERY).await?;
    info!(job_id = %job.id, "{stats}");

    // Sweep up anything the fire-and-forget follow-ups missed.
    let backfill = embedding::backfill_missing(
        embedder.as_ref(),
        store.as_ref(),
        config.embed_backfill_limit as i64,
        config.embed_delay,
        clock.as_ref(),
    )
    .await?;
    info!(
        processed = backfill.processed,
        failed = backfill.failed,
        "Embedding backfill finished"
    );

    Ok(())
}
