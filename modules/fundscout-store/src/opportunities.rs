//! Opportunity persistence. Inserts synthesize the embedding text and apply
//! the field caps; embeddings are written later by the backfill pass and are
//! safe to overwrite.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::FromRow;
use uuid::Uuid;

use fundscout_common::{NewOpportunity, Opportunity, SourceKind};

use crate::error::{Result, StoreError};
use crate::PgStore;

#[derive(Debug, Clone, FromRow)]
struct OpportunityRow {
    id: Uuid,
    title: String,
    provider: String,
    description: String,
    deadline: String,
    award_amount: Option<String>,
    requirements: Vec<String>,
    required_documents: Vec<String>,
    essay_prompts: Vec<String>,
    contact_info: Option<String>,
    region: Option<String>,
    image_url: Option<String>,
    application_url: String,
    tags: Vec<String>,
    source: String,
    embedding: Option<Vector>,
    embedding_text: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OpportunityRow {
    fn into_domain(self) -> Result<Opportunity> {
        let source = SourceKind::parse(&self.source)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown source kind {}", self.source)))?;
        Ok(Opportunity {
            id: self.id,
            title: self.title,
            provider: self.provider,
            description: self.description,
            deadline: self.deadline,
            award_amount: self.award_amount,
            requirements: self.requirements,
            required_documents: self.required_documents,
            essay_prompts: self.essay_prompts,
            contact_info: self.contact_info,
            region: self.region,
            image_url: self.image_url,
            application_url: self.application_url,
            tags: self.tags,
            source,
            embedding: self.embedding.map(|v| v.as_slice().to_vec()),
            embedding_text: self.embedding_text,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl PgStore {
    /// Insert a discovered opportunity. Caps are applied and the embedding
    /// text synthesized here so every row carries a usable blob for the
    /// embedding backfill.
    pub async fn insert_opportunity(&self, mut new: NewOpportunity) -> Result<Opportunity> {
        new.apply_caps();
        let embedding_text = new.embedding_text();

        let row = sqlx::query_as::<_, OpportunityRow>(
            r#"
            INSERT INTO opportunities
                (id, title, provider, description, deadline, award_amount,
                 requirements, required_documents, essay_prompts, contact_info,
                 region, image_url, application_url, tags, source, embedding_text)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.title)
        .bind(&new.provider)
        .bind(&new.description)
        .bind(&new.deadline)
        .bind(&new.award_amount)
        .bind(&new.requirements)
        .bind(&new.required_documents)
        .bind(&new.essay_prompts)
        .bind(&new.contact_info)
        .bind(&new.region)
        .bind(&new.image_url)
        .bind(&new.application_url)
        .bind(&new.tags)
        .bind(new.source.as_str())
        .bind(&embedding_text)
        .fetch_one(self.pool())
        .await?;

        row.into_domain()
    }

    pub async fn get_opportunity(&self, id: Uuid) -> Result<Option<Opportunity>> {
        let row = sqlx::query_as::<_, OpportunityRow>("SELECT * FROM opportunities WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(OpportunityRow::into_domain).transpose()
    }

    pub async fn get_opportunities(&self, ids: &[Uuid]) -> Result<Vec<Opportunity>> {
        let rows = sqlx::query_as::<_, OpportunityRow>(
            "SELECT * FROM opportunities WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(OpportunityRow::into_domain).collect()
    }

    /// Which of these application URLs already have a row. Used by the batch
    /// extractor to merge fallback results without duplicating.
    pub async fn existing_application_urls(&self, urls: &[String]) -> Result<HashSet<String>> {
        let found: Vec<String> = sqlx::query_scalar(
            "SELECT application_url FROM opportunities WHERE application_url = ANY($1)",
        )
        .bind(urls)
        .fetch_all(self.pool())
        .await?;
        Ok(found.into_iter().collect())
    }

    /// Idempotent overwrite of the embedding and its source text.
    pub async fn set_embedding(&self, id: Uuid, embedding: &[f32], text: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE opportunities
            SET embedding = $2, embedding_text = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Vector::from(embedding.to_vec()))
        .bind(text)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Oldest opportunities still lacking an embedding, for the backfill pass.
    pub async fn without_embedding(&self, limit: i64) -> Result<Vec<Opportunity>> {
        let rows = sqlx::query_as::<_, OpportunityRow>(
            r#"
            SELECT * FROM opportunities
            WHERE embedding IS NULL
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(OpportunityRow::into_domain).collect()
    }

    /// Nearest neighbors by cosine similarity over the vector index.
    /// Returns (opportunity, similarity in [0, 1]).
    pub async fn nearest_by_embedding(
        &self,
        query: &[f32],
        limit: i64,
    ) -> Result<Vec<(Opportunity, f64)>> {
        #[derive(FromRow)]
        struct NearestRow {
            #[sqlx(flatten)]
            row: OpportunityRow,
            similarity: f64,
        }

        let query_vec = Vector::from(query.to_vec());
        let rows = sqlx::query_as::<_, NearestRow>(
            r#"
            SELECT *, 1 - (embedding <=> $1) AS similarity
            FROM opportunities
            WHERE embedding IS NOT NULL
            ORDER BY embedding <=> $1
            LIMIT $2
            "#,
        )
        .bind(query_vec)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|r| Ok((r.row.into_domain()?, r.similarity)))
            .collect()
    }

    /// Most recently discovered opportunities, newest first.
    pub async fn recent_opportunities(&self, limit: i64) -> Result<Vec<Opportunity>> {
        let rows = sqlx::query_as::<_, OpportunityRow>(
            "SELECT * FROM opportunities ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(OpportunityRow::into_domain).collect()
    }

    /// Opportunities created inside a time window. Discovery jobs are linked
    /// to their output by creation time, not by foreign key.
    pub async fn created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Opportunity>> {
        let rows = sqlx::query_as::<_, OpportunityRow>(
            "SELECT * FROM opportunities WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(OpportunityRow::into_domain).collect()
    }

    pub async fn update_tags(&self, id: Uuid, tags: &[String]) -> Result<()> {
        sqlx::query("UPDATE opportunities SET tags = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(tags)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Append a tag if it is not already present.
    pub async fn add_tag(&self, id: Uuid, tag: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE opportunities
            SET tags = array_append(tags, $2), updated_at = now()
            WHERE id = $1 AND NOT ($2 = ANY(tags))
            "#,
        )
        .bind(id)
        .bind(tag)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
