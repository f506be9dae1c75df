//! Embedding generation for persisted opportunities.
//!
//! Two entry points: a fire-and-forget follow-up scheduled right after an
//! insert, and a batch backfill that sweeps up whatever the follow-ups
//! missed. Both write through the same idempotent `set_embedding`, so running
//! zero, one, or several times converges on the same state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{info, warn};

use fundscout_common::Opportunity;

use crate::poller::Clock;
use crate::traits::{EmbeddingClient, OpportunityStore};

/// Embed one opportunity's canonical text and persist vector + source text.
pub async fn embed_opportunity(
    embedder: &dyn EmbeddingClient,
    store: &dyn OpportunityStore,
    opportunity: &Opportunity,
) -> Result<()> {
    let text = opportunity.embedding_text.trim();
    if text.is_empty() {
        bail!("opportunity {} has no embedding text", opportunity.id);
    }

    let vector = embedder.embed(text).await?;
    store
        .set_embedding(opportunity.id, &vector, &opportunity.embedding_text)
        .await?;
    Ok(())
}

/// Fire-and-forget follow-up after an insert. Never awaited by the caller;
/// failures are logged and left for the backfill pass.
pub fn schedule_embedding(
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn OpportunityStore>,
    opportunity: Opportunity,
) {
    tokio::spawn(async move {
        if let Err(e) = embed_opportunity(embedder.as_ref(), store.as_ref(), &opportunity).await {
            warn!(
                opportunity_id = %opportunity.id,
                error = %e,
                "Scheduled embedding failed, leaving record for backfill"
            );
        }
    });
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillStats {
    pub processed: u32,
    pub failed: u32,
}

/// Embed up to `limit` opportunities that still lack a vector, sequentially,
/// with a small delay between calls. Per-item failures are collected, never
/// fatal to the batch.
pub async fn backfill_missing(
    embedder: &dyn EmbeddingClient,
    store: &dyn OpportunityStore,
    limit: i64,
    delay: Duration,
    clock: &dyn Clock,
) -> Result<BackfillStats> {
    let pending = store.without_embedding(limit).await?;
    let mut stats = BackfillStats::default();

    for (i, opportunity) in pending.iter().enumerate() {
        if i > 0 {
            clock.sleep(delay).await;
        }
        match embed_opportunity(embedder, store, opportunity).await {
            Ok(()) => stats.processed += 1,
            Err(e) => {
                warn!(opportunity_id = %opportunity.id, error = %e, "Backfill embedding failed");
                stats.failed += 1;
            }
        }
    }

    info!(
        processed = stats.processed,
        failed = stats.failed,
        "Embedding backfill complete"
    );
    Ok(stats)
}
