//! Per-user match rows. The merge-priority decision lives in
//! `fundscout-match`; this layer only reads and upserts.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use fundscout_common::{MatchKind, OpportunityMatch};

use crate::error::{Result, StoreError};
use crate::PgStore;

#[derive(Debug, Clone, FromRow)]
struct MatchRow {
    user_id: Uuid,
    opportunity_id: Uuid,
    score: f64,
    kind: String,
    reasoning: String,
    eligibility_factors: Vec<String>,
    matched_at: DateTime<Utc>,
}

impl MatchRow {
    fn into_domain(self) -> Result<OpportunityMatch> {
        let kind = MatchKind::parse(&self.kind)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown match kind {}", self.kind)))?;
        Ok(OpportunityMatch {
            user_id: self.user_id,
            opportunity_id: self.opportunity_id,
            score: self.score,
            kind,
            reasoning: self.reasoning,
            eligibility_factors: self.eligibility_factors,
            matched_at: self.matched_at,
        })
    }
}

impl PgStore {
    pub async fn get_match(
        &self,
        user_id: Uuid,
        opportunity_id: Uuid,
    ) -> Result<Option<OpportunityMatch>> {
        let row = sqlx::query_as::<_, MatchRow>(
            "SELECT * FROM user_opportunity_matches WHERE user_id = $1 AND opportunity_id = $2",
        )
        .bind(user_id)
        .bind(opportunity_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(MatchRow::into_domain).transpose()
    }

    /// Insert or overwrite the single live row for (user, opportunity).
    pub async fn upsert_match(&self, m: &OpportunityMatch) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_opportunity_matches
                (user_id, opportunity_id, score, kind, reasoning, eligibility_factors, matched_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, opportunity_id) DO UPDATE SET
                score = EXCLUDED.score,
                kind = EXCLUDED.kind,
                reasoning = EXCLUDED.reasoning,
                eligibility_factors = EXCLUDED.eligibility_factors,
                matched_at = EXCLUDED.matched_at
            "#,
        )
        .bind(m.user_id)
        .bind(m.opportunity_id)
        .bind(m.score)
        .bind(m.kind.as_str())
        .bind(&m.reasoning)
        .bind(&m.eligibility_factors)
        .bind(m.matched_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn matches_for_user(&self, user_id: Uuid) -> Result<Vec<OpportunityMatch>> {
        let rows = sqlx::query_as::<_, MatchRow>(
            "SELECT * FROM user_opportunity_matches WHERE user_id = $1 ORDER BY score DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(MatchRow::into_domain).collect()
    }
}
