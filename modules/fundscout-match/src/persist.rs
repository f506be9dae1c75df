//! Match persistence with refresh-without-duplication semantics.
//!
//! Two writers sit behind one capability trait during the migration window:
//! the authoritative per-user match table, and the legacy path that tags the
//! opportunity's shared tag list. The router dispatches to whichever writers
//! are enabled, so the legacy one can be turned off by configuration alone.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use fundscout_common::{MatchKind, OpportunityMatch};

/// Default minimum score a match must reach to be persisted.
pub const DEFAULT_SCORE_THRESHOLD: f64 = 30.0;

/// Tag the legacy writer appends to an opportunity's shared tag list.
pub const LEGACY_MATCH_TAG: &str = "for-you";

/// One scored match from a matching pass, ready for persistence.
#[derive(Debug, Clone)]
pub struct ScoredMatch {
    pub opportunity_id: Uuid,
    pub score: f64,
    pub reasoning: String,
    pub eligibility_factors: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MatchWriteStats {
    pub inserted: u32,
    pub overwritten: u32,
    pub kept_existing: u32,
    pub below_threshold: u32,
}

/// Overwrite decision for an existing (user, opportunity) row.
///
/// A higher score always wins. Otherwise kind priority decides:
/// user-search beats everything, daily-automated beats manual, and manual
/// never displaces an automated row.
pub fn should_overwrite(existing: &OpportunityMatch, new_score: f64, new_kind: MatchKind) -> bool {
    if new_score > existing.score {
        return true;
    }
    match (new_kind, existing.kind) {
        (MatchKind::UserSearch, k) if k != MatchKind::UserSearch => true,
        (MatchKind::DailyAutomated, MatchKind::Manual) => true,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// The slice of the store the match writers need. Implemented by `PgStore`
/// and by the in-memory store used in tests.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn get_match(
        &self,
        user_id: Uuid,
        opportunity_id: Uuid,
    ) -> Result<Option<OpportunityMatch>>;

    async fn upsert_match(&self, m: &OpportunityMatch) -> Result<()>;

    /// Append a tag to the opportunity's shared tag list if absent.
    async fn tag_opportunity(&self, opportunity_id: Uuid, tag: &str) -> Result<()>;
}

#[async_trait]
impl MatchStore for fundscout_store::PgStore {
    async fn get_match(
        &self,
        user_id: Uuid,
        opportunity_id: Uuid,
    ) -> Result<Option<OpportunityMatch>> {
        Ok(fundscout_store::PgStore::get_match(self, user_id, opportunity_id).await?)
    }

    async fn upsert_match(&self, m: &OpportunityMatch) -> Result<()> {
        Ok(fundscout_store::PgStore::upsert_match(self, m).await?)
    }

    async fn tag_opportunity(&self, opportunity_id: Uuid, tag: &str) -> Result<()> {
        Ok(self.add_tag(opportunity_id, tag).await?)
    }
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// A destination for a batch of scored matches.
#[async_trait]
pub trait MatchWriter: Send + Sync {
    async fn write(
        &self,
        user_id: Uuid,
        kind: MatchKind,
        matches: &[ScoredMatch],
    ) -> Result<MatchWriteStats>;
}

/// Authoritative writer: one live row per (user, opportunity), merged under
/// the priority rule.
pub struct PerUserMatchWriter<S> {
    store: S,
    threshold: f64,
}

impl<S: MatchStore> PerUserMatchWriter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

#[async_trait]
impl<S: MatchStore> MatchWriter for PerUserMatchWriter<S> {
    async fn write(
        &self,
        user_id: Uuid,
        kind: MatchKind,
        matches: &[ScoredMatch],
    ) -> Result<MatchWriteStats> {
        let mut stats = MatchWriteStats::default();

        for m in matches {
            if m.score < self.threshold {
                stats.below_threshold += 1;
                continue;
            }

            let row = OpportunityMatch {
                user_id,
                opportunity_id: m.opportunity_id,
                score: m.score,
                kind,
                reasoning: m.reasoning.clone(),
                eligibility_factors: m.eligibility_factors.clone(),
                matched_at: Utc::now(),
            };

            match self.store.get_match(user_id, m.opportunity_id).await? {
                None => {
                    self.store.upsert_match(&row).await?;
                    stats.inserted += 1;
                }
                Some(existing) if should_overwrite(&existing, m.score, kind) => {
                    self.store.upsert_match(&row).await?;
                    stats.overwritten += 1;
                }
                Some(existing) => {
                    debug!(
                        user_id = %user_id,
                        opportunity_id = %m.opportunity_id,
                        existing_score = existing.score,
                        existing_kind = %existing.kind,
                        new_score = m.score,
                        new_kind = %kind,
                        "Existing match kept"
                    );
                    stats.kept_existing += 1;
                }
            }
        }

        info!(
            user_id = %user_id,
            kind = %kind,
            inserted = stats.inserted,
            overwritten = stats.overwritten,
            kept = stats.kept_existing,
            below_threshold = stats.below_threshold,
            "Match batch persisted"
        );
        Ok(stats)
    }
}

/// Legacy writer: marks matched opportunities on their shared tag list
/// instead of writing per-user rows. Kept only for the migration window.
pub struct LegacyTagWriter<S> {
    store: S,
    threshold: f64,
}

impl<S: MatchStore> LegacyTagWriter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

#[async_trait]
impl<S: MatchStore> MatchWriter for LegacyTagWriter<S> {
    async fn write(
        &self,
        _user_id: Uuid,
        _kind: MatchKind,
        matches: &[ScoredMatch],
    ) -> Result<MatchWriteStats> {
        let mut stats = MatchWriteStats::default();
        for m in matches {
            if m.score < self.threshold {
                stats.below_threshold += 1;
                continue;
            }
            self.store.tag_opportunity(m.opportunity_id, LEGACY_MATCH_TAG).await?;
            stats.inserted += 1;
        }
        Ok(stats)
    }
}

/// Fans a match batch out to every enabled writer. The per-user writer is
/// always first; its stats are the authoritative return value.
pub struct MatchWriterRouter {
    writers: Vec<Box<dyn MatchWriter>>,
}

impl MatchWriterRouter {
    pub fn new(primary: Box<dyn MatchWriter>) -> Self {
        Self {
            writers: vec![primary],
        }
    }

    pub fn with_writer(mut self, writer: Box<dyn MatchWriter>) -> Self {
        self.writers.push(writer);
        self
    }

    /// Wire the writer set from configuration: the per-user table always,
    /// the legacy tag writer only while the migration flag is on. Turning the
    /// flag off removes the legacy path with no other code changes.
    pub fn from_store(
        store: fundscout_store::PgStore,
        threshold: f64,
        legacy_tag_writer: bool,
    ) -> Self {
        let mut router = Self::new(Box::new(
            PerUserMatchWriter::new(store.clone()).with_threshold(threshold),
        ));
        if legacy_tag_writer {
            router = router.with_writer(Box::new(
                LegacyTagWriter::new(store).with_threshold(threshold),
            ));
        }
        router
    }
}

#[async_trait]
impl MatchWriter for MatchWriterRouter {
    async fn write(
        &self,
        user_id: Uuid,
        kind: MatchKind,
        matches: &[ScoredMatch],
    ) -> Result<MatchWriteStats> {
        let mut primary_stats = MatchWriteStats::default();
        for (i, writer) in self.writers.iter().enumerate() {
            let stats = writer.write(user_id, kind, matches).await?;
            if i == 0 {
                primary_stats = stats;
            }
        }
        Ok(primary_stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    fn existing(score: f64, kind: MatchKind) -> OpportunityMatch {
        OpportunityMatch {
            user_id: Uuid::from_u128(1),
            opportunity_id: Uuid::from_u128(2),
            score,
            kind,
            reasoning: String::new(),
            eligibility_factors: Vec::new(),
            matched_at: Utc::now(),
        }
    }

    // --- should_overwrite matrix ---

    #[test]
    fn higher_score_always_overwrites() {
        let row = existing(40.0, MatchKind::UserSearch);
        assert!(should_overwrite(&row, 41.0, MatchKind::Manual));
    }

    #[test]
    fn daily_overwrites_manual_despite_lower_score() {
        let row = existing(40.0, MatchKind::Manual);
        assert!(should_overwrite(&row, 35.0, MatchKind::DailyAutomated));
    }

    #[test]
    fn manual_does_not_overwrite_daily() {
        let row = existing(40.0, MatchKind::DailyAutomated);
        assert!(!should_overwrite(&row, 30.0, MatchKind::Manual));
    }

    #[test]
    fn user_search_overwrites_daily_despite_lower_score() {
        let row = existing(80.0, MatchKind::DailyAutomated);
        assert!(should_overwrite(&row, 50.0, MatchKind::UserSearch));
    }

    #[test]
    fn user_search_does_not_overwrite_user_search_on_lower_score() {
        let row = existing(80.0, MatchKind::UserSearch);
        assert!(!should_overwrite(&row, 50.0, MatchKind::UserSearch));
    }

    #[test]
    fn equal_score_same_kind_keeps_existing() {
        let row = existing(40.0, MatchKind::DailyAutomated);
        assert!(!should_overwrite(&row, 40.0, MatchKind::DailyAutomated));
    }

    // --- writers over an in-memory store ---

    #[derive(Default)]
    struct MemoryMatchStore {
        matches: Mutex<HashMap<(Uuid, Uuid), OpportunityMatch>>,
        tags: Mutex<HashMap<Uuid, Vec<String>>>,
    }

    #[async_trait]
    impl MatchStore for Arc<MemoryMatchStore> {
        async fn get_match(
            &self,
            user_id: Uuid,
            opportunity_id: Uuid,
        ) -> Result<Option<OpportunityMatch>> {
            Ok(self
                .matches
                .lock()
                .unwrap()
                .get(&(user_id, opportunity_id))
                .cloned())
        }

        async fn upsert_match(&self, m: &OpportunityMatch) -> Result<()> {
            self.matches
                .lock()
                .unwrap()
                .insert((m.user_id, m.opportunity_id), m.clone());
            Ok(())
        }

        async fn tag_opportunity(&self, opportunity_id: Uuid, tag: &str) -> Result<()> {
            let mut tags = self.tags.lock().unwrap();
            let entry = tags.entry(opportunity_id).or_default();
            if !entry.iter().any(|t| t == tag) {
                entry.push(tag.to_string());
            }
            Ok(())
        }
    }

    fn scored(opportunity: u128, score: f64) -> ScoredMatch {
        ScoredMatch {
            opportunity_id: Uuid::from_u128(opportunity),
            score,
            reasoning: "test".to_string(),
            eligibility_factors: Vec::new(),
        }
    }

    #[tokio::test]
    async fn writer_inserts_above_threshold_only() {
        let store = Arc::new(MemoryMatchStore::default());
        let writer = PerUserMatchWriter::new(store.clone());
        let user = Uuid::from_u128(9);

        let stats = writer
            .write(
                user,
                MatchKind::DailyAutomated,
                &[scored(1, 55.0), scored(2, 29.9)],
            )
            .await
            .unwrap();

        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.below_threshold, 1);
        assert!(store.matches.lock().unwrap().contains_key(&(user, Uuid::from_u128(1))));
        assert!(!store.matches.lock().unwrap().contains_key(&(user, Uuid::from_u128(2))));
    }

    #[tokio::test]
    async fn writer_applies_merge_priority() {
        let store = Arc::new(MemoryMatchStore::default());
        let user = Uuid::from_u128(9);

        // Seed a manual row at 40.
        let writer = PerUserMatchWriter::new(store.clone()).with_threshold(0.0);
        let mut manual_row = existing(40.0, MatchKind::Manual);
        manual_row.user_id = user;
        manual_row.opportunity_id = Uuid::from_u128(1);
        store.upsert_match(&manual_row).await.unwrap();

        // A daily pass at 35 overwrites it (kind priority wins).
        let stats = writer
            .write(user, MatchKind::DailyAutomated, &[scored(1, 35.0)])
            .await
            .unwrap();
        assert_eq!(stats.overwritten, 1);

        let row = store.get_match(user, Uuid::from_u128(1)).await.unwrap().unwrap();
        assert_eq!(row.kind, MatchKind::DailyAutomated);
        assert_eq!(row.score, 35.0);

        // A manual pass at 30 does not displace the daily row.
        let stats = writer
            .write(user, MatchKind::Manual, &[scored(1, 30.0)])
            .await
            .unwrap();
        assert_eq!(stats.kept_existing, 1);
        let row = store.get_match(user, Uuid::from_u128(1)).await.unwrap().unwrap();
        assert_eq!(row.kind, MatchKind::DailyAutomated);
    }

    #[tokio::test]
    async fn repeated_pass_does_not_duplicate() {
        let store = Arc::new(MemoryMatchStore::default());
        let writer = PerUserMatchWriter::new(store.clone());
        let user = Uuid::from_u128(9);
        let batch = [scored(1, 60.0)];

        writer.write(user, MatchKind::DailyAutomated, &batch).await.unwrap();
        writer.write(user, MatchKind::DailyAutomated, &batch).await.unwrap();

        assert_eq!(store.matches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn legacy_writer_tags_instead_of_rows() {
        let store = Arc::new(MemoryMatchStore::default());
        let writer = LegacyTagWriter::new(store.clone());
        let user = Uuid::from_u128(9);

        writer
            .write(user, MatchKind::DailyAutomated, &[scored(1, 60.0)])
            .await
            .unwrap();

        assert!(store.matches.lock().unwrap().is_empty());
        let tags = store.tags.lock().unwrap();
        assert_eq!(
            tags.get(&Uuid::from_u128(1)).unwrap(),
            &vec![LEGACY_MATCH_TAG.to_string()]
        );
    }

    #[tokio::test]
    async fn legacy_tag_is_not_duplicated() {
        let store = Arc::new(MemoryMatchStore::default());
        let writer = LegacyTagWriter::new(store.clone());
        let user = Uuid::from_u128(9);
        let batch = [scored(1, 60.0)];

        writer.write(user, MatchKind::DailyAutomated, &batch).await.unwrap();
        writer.write(user, MatchKind::DailyAutomated, &batch).await.unwrap();

        let tags = store.tags.lock().unwrap();
        assert_eq!(tags.get(&Uuid::from_u128(1)).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn router_runs_both_writers_and_returns_primary_stats() {
        let store = Arc::new(MemoryMatchStore::default());
        let router = MatchWriterRouter::new(Box::new(PerUserMatchWriter::new(store.clone())))
            .with_writer(Box::new(LegacyTagWriter::new(store.clone())));
        let user = Uuid::from_u128(9);

        let stats = router
            .write(user, MatchKind::UserSearch, &[scored(1, 70.0)])
            .await
            .unwrap();

        assert_eq!(stats.inserted, 1);
        assert_eq!(store.matches.lock().unwrap().len(), 1);
        assert_eq!(store.tags.lock().unwrap().len(), 1);
    }
}
