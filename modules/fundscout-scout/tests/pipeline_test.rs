//! End-to-end discovery pipeline test over the mock capability clients:
//! search → batch extraction → deadline/image enrichment → persistence →
//! embedding backfill, with no network and no database.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use fundscout_common::JobStatus;
use fundscout_scout::embedding;
use fundscout_scout::query;
use fundscout_scout::scout::{Scout, ScoutConfig};
use fundscout_scout::testing::{
    hit, FixedEmbedder, ManualClock, MemoryStore, MockExtract, MockFetcher, MockSearch,
};
use fundscout_scout::traits::PageContent;

fn award(i: usize, url: &str) -> serde_json::Value {
    json!({
        "title": format!("AI Scholarship {i}"),
        "provider": format!("Foundation {i}"),
        "description": "Funding for students working on artificial intelligence.",
        "deadline": "2099-01-01",  // out of range on purpose; forces the synthetic fallback
        "requirements": ["Enrolled in a degree program"],
        "application_url": url,
    })
}

#[tokio::test]
async fn five_urls_become_five_opportunities_with_embeddings() {
    let raw_query = "AI scholarships";
    let built_query = query::freetext_query(raw_query);
    let urls: Vec<String> = (0..5)
        .map(|i| format!("https://uni{i}.example.edu/scholarship"))
        .collect();

    let search = MockSearch::new().on_query(
        &built_query,
        urls.iter().map(|u| hit(u)).collect(),
    );

    let payload: Vec<serde_json::Value> = urls
        .iter()
        .enumerate()
        .map(|(i, u)| award(i, u))
        .collect();
    let extract = MockExtract::new().completed_for_urls(&urls, json!(payload));

    let mut fetcher = MockFetcher::new();
    for url in &urls {
        fetcher = fetcher.on_page(
            url,
            PageContent {
                markdown: String::new(),
                og_image: Some(format!("{url}/og.png")),
            },
        );
    }

    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new());
    let config = ScoutConfig {
        general_search_limit: 5,
        ..Default::default()
    };
    let scout = Scout::new(
        Arc::new(search),
        Arc::new(extract),
        Arc::new(FixedEmbedder),
        Arc::new(fetcher),
        store.clone(),
        clock.clone(),
        config,
    );

    let (job, stats) = scout.run_general(raw_query).await.unwrap();

    // Exactly five new rows, all enriched.
    assert_eq!(stats.urls_discovered, 5);
    assert_eq!(stats.opportunities_persisted, 5);
    assert_eq!(stats.images_resolved, 5);
    assert_eq!(stats.degraded_batches, 0);

    let stored_job = store.job(job.id).unwrap();
    assert_eq!(stored_job.status, JobStatus::Completed);
    assert_eq!(stored_job.result_count, 5);

    let now = Utc::now().date_naive();
    for opp in store.all_opportunities() {
        assert!(!opp.embedding_text.is_empty());
        assert!(opp.image_url.is_some());

        // Deadline within [-1y, +5y]: the page said 2099, so the synthetic
        // fallback must have replaced it.
        let deadline =
            chrono::NaiveDate::parse_from_str(&opp.deadline, "%Y-%m-%d").expect("valid date");
        let offset = (deadline - now).num_days();
        assert!((-365..=5 * 365).contains(&offset), "deadline offset {offset}");
    }

    // A subsequent embedding backfill pass leaves nothing vector-less.
    embedding::backfill_missing(
        &FixedEmbedder,
        store.as_ref(),
        5,
        Duration::from_millis(1),
        clock.as_ref(),
    )
    .await
    .unwrap();

    let missing = store
        .all_opportunities()
        .iter()
        .filter(|o| o.embedding.is_none())
        .count();
    assert_eq!(missing, 0);
}

#[tokio::test]
async fn degraded_batch_recovers_through_individual_fallback() {
    let raw_query = "robotics grants";
    let built_query = query::freetext_query(raw_query);
    let urls: Vec<String> = (0..10)
        .map(|i| format!("https://lab{i}.example.org/grant"))
        .collect();

    let search = MockSearch::new().on_query(
        &built_query,
        urls.iter().map(|u| hit(u)).collect(),
    );

    // The batch pass collapses to six items; every URL then succeeds solo.
    let short: Vec<serde_json::Value> = urls[..6]
        .iter()
        .enumerate()
        .map(|(i, u)| award(i, u))
        .collect();
    let mut extract = MockExtract::new().completed_for_urls(&urls, json!(short));
    for (i, url) in urls.iter().enumerate() {
        extract = extract.completed_for_urls(
            std::slice::from_ref(url),
            json!([award(100 + i, url)]),
        );
    }

    let store = Arc::new(MemoryStore::new());
    let scout = Scout::new(
        Arc::new(search),
        Arc::new(extract),
        Arc::new(FixedEmbedder),
        Arc::new(MockFetcher::new()),
        store.clone(),
        Arc::new(ManualClock::new()),
        ScoutConfig {
            general_search_limit: 10,
            ..Default::default()
        },
    );

    let (_, stats) = scout.run_general(raw_query).await.unwrap();

    assert_eq!(stats.degraded_batches, 1);
    assert_eq!(stats.fallback_extractions, 10);
    // Individual pass extracted 10 > 6, so all ten solo items persisted.
    assert_eq!(stats.opportunities_persisted, 10);
    assert_eq!(store.all_opportunities().len(), 10);
}
