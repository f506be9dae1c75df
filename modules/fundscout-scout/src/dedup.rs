//! Advisory deduplication over candidate opportunity IDs.
//!
//! The dedup key — lowercase(title) + "-" + lowercase(provider) — is not a
//! uniqueness constraint on write. Callers opting into dedup pass a candidate
//! ID list and get back unique vs duplicate partitions; the first occurrence
//! of each key, in candidate order, wins.

use anyhow::Result;
use uuid::Uuid;

use fundscout_common::{dedup_key, Opportunity};

use crate::traits::OpportunityStore;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DedupPartition {
    pub unique: Vec<Uuid>,
    pub duplicates: Vec<Uuid>,
}

/// Pure partition over already-loaded opportunities, preserving input order.
pub fn partition_opportunities(candidates: &[Opportunity]) -> DedupPartition {
    let mut seen = std::collections::HashSet::new();
    let mut partition = DedupPartition::default();

    for opp in candidates {
        let key = dedup_key(&opp.title, &opp.provider);
        if seen.insert(key) {
            partition.unique.push(opp.id);
        } else {
            partition.duplicates.push(opp.id);
        }
    }
    partition
}

/// Load the candidates and partition them. IDs that don't resolve to a row
/// are dropped silently; candidate order is preserved.
pub async fn partition_candidates(
    store: &dyn OpportunityStore,
    candidate_ids: &[Uuid],
) -> Result<DedupPartition> {
    let loaded = store.get_opportunities(candidate_ids).await?;
    let by_id: std::collections::HashMap<Uuid, Opportunity> =
        loaded.into_iter().map(|o| (o.id, o)).collect();

    let ordered: Vec<Opportunity> = candidate_ids
        .iter()
        .filter_map(|id| by_id.get(id).cloned())
        .collect();
    Ok(partition_opportunities(&ordered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fundscout_common::SourceKind;

    fn opportunity(title: &str, provider: &str) -> Opportunity {
        Opportunity {
            id: Uuid::new_v4(),
            title: title.to_string(),
            provider: provider.to_string(),
            description: String::new(),
            deadline: "2026-12-01".to_string(),
            award_amount: None,
            requirements: Vec::new(),
            required_documents: Vec::new(),
            essay_prompts: Vec::new(),
            contact_info: None,
            region: None,
            image_url: None,
            application_url: "https://example.org/apply".to_string(),
            tags: Vec::new(),
            source: SourceKind::GeneralSearch,
            embedding: None,
            embedding_text: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn first_occurrence_wins() {
        let a = opportunity("STEM Award", "Acme Foundation");
        let b = opportunity("STEM Award", "Acme Foundation");
        let c = opportunity("Arts Grant", "Acme Foundation");

        let partition = partition_opportunities(&[a.clone(), b.clone(), c.clone()]);
        assert_eq!(partition.unique, vec![a.id, c.id]);
        assert_eq!(partition.duplicates, vec![b.id]);
    }

    #[test]
    fn key_is_case_insensitive() {
        let a = opportunity("STEM Award", "Acme Foundation");
        let b = opportunity("stem award", "ACME FOUNDATION");

        let partition = partition_opportunities(&[a.clone(), b.clone()]);
        assert_eq!(partition.unique, vec![a.id]);
        assert_eq!(partition.duplicates, vec![b.id]);
    }

    #[test]
    fn same_title_different_provider_is_unique() {
        let a = opportunity("STEM Award", "Acme Foundation");
        let b = opportunity("STEM Award", "Other Trust");

        let partition = partition_opportunities(&[a, b]);
        assert_eq!(partition.unique.len(), 2);
        assert!(partition.duplicates.is_empty());
    }

    #[tokio::test]
    async fn partition_candidates_preserves_candidate_order() {
        use crate::testing::MemoryStore;

        let store = MemoryStore::new();
        let a = opportunity("STEM Award", "Acme Foundation");
        let b = opportunity("stem award", "acme foundation");
        store.seed_opportunity(b.clone());
        store.seed_opportunity(a.clone());

        // Candidate order decides the winner, not insertion order.
        let partition = partition_candidates(&store, &[a.id, b.id]).await.unwrap();
        assert_eq!(partition.unique, vec![a.id]);
        assert_eq!(partition.duplicates, vec![b.id]);
    }
}
