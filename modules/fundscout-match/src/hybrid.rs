//! Hybrid scoring: semantic similarity fused with keyword evidence.
//!
//! Semantic similarity is normalized to a 0-100 scale before weighting;
//! keyword scores are already on their native 0-100-ish scale. A side with no
//! match contributes 0, so a keyword-only match can still surface.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use fundscout_common::{Opportunity, UserProfile};

use crate::keyword::keyword_matches;

const SEMANTIC_WEIGHT: f64 = 0.7;
const KEYWORD_WEIGHT: f64 = 0.3;

/// Read access to the opportunity corpus, injected so the matcher is testable
/// without Postgres.
#[async_trait]
pub trait OpportunityIndex: Send + Sync {
    /// Nearest neighbors by embedding. Returns (opportunity, similarity in [0, 1]).
    async fn nearest(&self, embedding: &[f32], limit: i64) -> Result<Vec<(Opportunity, f64)>>;

    /// Most recently discovered opportunities, for the keyword pass.
    async fn recent(&self, limit: i64) -> Result<Vec<Opportunity>>;
}

#[async_trait]
impl OpportunityIndex for fundscout_store::PgStore {
    async fn nearest(&self, embedding: &[f32], limit: i64) -> Result<Vec<(Opportunity, f64)>> {
        Ok(self.nearest_by_embedding(embedding, limit).await?)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Opportunity>> {
        Ok(self.recent_opportunities(limit).await?)
    }
}

#[derive(Debug, Clone)]
pub struct HybridScore {
    pub opportunity_id: Uuid,
    /// Semantic component on the 0-100 scale, if the vector side matched.
    pub semantic: Option<f64>,
    /// Keyword component, if any rule fired.
    pub keyword: Option<f64>,
    pub total: f64,
    pub factors: Vec<String>,
}

/// Weighted combination of the two passes. Pure; both inputs are on the 0-100
/// scale. Only positive totals are kept, sorted descending.
pub fn combine(
    semantic: &[(Uuid, f64)],
    keyword: &[(Uuid, f64, Vec<String>)],
) -> Vec<HybridScore> {
    let mut by_id: HashMap<Uuid, HybridScore> = HashMap::new();

    for (id, score) in semantic {
        by_id.insert(
            *id,
            HybridScore {
                opportunity_id: *id,
                semantic: Some(*score),
                keyword: None,
                total: 0.0,
                factors: Vec::new(),
            },
        );
    }

    for (id, score, factors) in keyword {
        let entry = by_id.entry(*id).or_insert_with(|| HybridScore {
            opportunity_id: *id,
            semantic: None,
            keyword: None,
            total: 0.0,
            factors: Vec::new(),
        });
        entry.keyword = Some(*score);
        entry.factors = factors.clone();
    }

    let mut scores: Vec<HybridScore> = by_id
        .into_values()
        .map(|mut s| {
            s.total = SEMANTIC_WEIGHT * s.semantic.unwrap_or(0.0)
                + KEYWORD_WEIGHT * s.keyword.unwrap_or(0.0);
            s
        })
        .filter(|s| s.total > 0.0)
        .collect();
    scores.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(std::cmp::Ordering::Equal));
    scores
}

/// Runs both passes for a user and fuses them.
pub struct HybridMatcher<I> {
    index: I,
    /// Candidate pool size for each pass.
    candidate_limit: i64,
}

impl<I: OpportunityIndex> HybridMatcher<I> {
    pub fn new(index: I) -> Self {
        Self {
            index,
            candidate_limit: 50,
        }
    }

    pub fn with_candidate_limit(mut self, limit: i64) -> Self {
        self.candidate_limit = limit;
        self
    }

    /// Compute hybrid scores for one user. The semantic pass runs only when
    /// the profile has an embedding; the keyword pass always runs over the
    /// recent corpus.
    pub async fn match_user(&self, profile: &UserProfile) -> Result<Vec<HybridScore>> {
        let semantic: Vec<(Uuid, f64)> = match &profile.embedding {
            Some(embedding) => self
                .index
                .nearest(embedding, self.candidate_limit)
                .await?
                .into_iter()
                .map(|(opp, similarity)| (opp.id, similarity * 100.0))
                .collect(),
            None => Vec::new(),
        };

        let corpus = self.index.recent(self.candidate_limit).await?;
        let keyword: Vec<(Uuid, f64, Vec<String>)> = keyword_matches(profile, &corpus)
            .into_iter()
            .map(|m| (m.opportunity_id, m.score, m.factors))
            .collect();

        let scores = combine(&semantic, &keyword);
        debug!(
            user_id = %profile.user_id,
            semantic = semantic.len(),
            keyword = keyword.len(),
            combined = scores.len(),
            "Hybrid matching complete"
        );
        Ok(scores)
    }
}
