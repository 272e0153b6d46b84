// tests/pipeline.rs
//
// End-to-end refresh/select behaviour with scripted sources.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use common::{as_dyn, CountingStore, FakeAdapter, Script};
use trend_bridge::breaker::BreakerState;
use trend_bridge::relevance::KEYWORD_SCORE;
use trend_bridge::sources::SourceAdapter;
use trend_bridge::store::TrendStore;
use trend_bridge::{MemoryStore, Pipeline, TrendError, TrendsConfig};

fn config() -> TrendsConfig {
    let mut cfg = TrendsConfig::default();
    cfg.pipeline.min_relevance = 0.55;
    cfg.pipeline.min_count = 50;
    cfg.pipeline.fetch_timeout_secs = 2;
    cfg
}

fn pipeline(adapters: Vec<Arc<dyn SourceAdapter>>) -> Pipeline {
    Pipeline::new(adapters, Arc::new(MemoryStore::default()), &config())
}

#[tokio::test]
async fn on_domain_tag_is_not_bridged() {
    let p = pipeline(vec![as_dyn(&FakeAdapter::ok("a", &["gpucompute"]))]);
    let ranked = p.refresh(&CancellationToken::new()).await.unwrap();

    let c = ranked.iter().find(|c| c.tag() == "gpucompute").unwrap();
    assert_eq!(c.relevance, KEYWORD_SCORE);
    assert!(!c.needs_bridge);
    assert!(c.bridge_text.is_none());
}

#[tokio::test]
async fn off_domain_tag_gets_bridge_mentioning_it() {
    let p = pipeline(vec![as_dyn(&FakeAdapter::ok("a", &["worldcup"]))]);
    let ranked = p.refresh(&CancellationToken::new()).await.unwrap();

    let c = ranked.iter().find(|c| c.tag() == "worldcup").unwrap();
    assert!(c.needs_bridge);
    let text = c.bridge_text.as_deref().unwrap();
    assert!(text.to_lowercase().contains("worldcup"), "bridge: {text}");
    assert!(c.final_score <= 0.55);
}

#[tokio::test]
async fn every_source_failing_still_yields_candidates() {
    let p = pipeline(vec![
        as_dyn(&FakeAdapter::failing("a")),
        as_dyn(&FakeAdapter::failing("b")),
    ]);
    let ranked = p.refresh(&CancellationToken::new()).await.unwrap();
    assert!(!ranked.is_empty());
    assert!(p.stats().used_fallback);
}

#[tokio::test]
async fn ranking_is_sorted_and_bridges_are_consistent() {
    let a = FakeAdapter::ok(
        "a",
        &["WorldCup", "GPUCompute", "Oscars", "CloudNative", "TechTrends", "SuperBowl"],
    );
    let b = FakeAdapter::ok("b", &["Oscars", "LLMInference", "MarchMadness"]);
    let p = pipeline(vec![as_dyn(&a), as_dyn(&b)]);
    let ranked = p.refresh(&CancellationToken::new()).await.unwrap();
    let min_rel = p.config().min_relevance;

    assert!(ranked.len() >= 7);
    for w in ranked.windows(2) {
        assert!(w[0].final_score >= w[1].final_score);
    }
    for c in &ranked {
        if c.relevance >= min_rel {
            assert!(!c.needs_bridge && c.bridge_text.is_none(), "{}", c.tag());
        } else {
            assert!(c.needs_bridge, "{}", c.tag());
            assert!(!c.bridge_text.as_deref().unwrap_or_default().is_empty());
        }
    }

    let oscars = ranked.iter().find(|c| c.tag() == "Oscars").unwrap();
    assert_eq!(oscars.sources.len(), 2);

    // on-domain always ahead of bridged
    let first_bridged = ranked.iter().position(|c| c.needs_bridge).unwrap();
    assert!(ranked[..first_bridged].iter().all(|c| !c.needs_bridge));
    assert!(ranked[first_bridged..].iter().all(|c| c.needs_bridge));
}

#[tokio::test]
async fn output_is_truncated_to_top_k() {
    let mut cfg = config();
    cfg.pipeline.top_k = 3;
    let a = FakeAdapter::ok("a", &["WorldCup", "GPUCompute", "Oscars", "CloudNative", "SuperBowl"]);
    let p = Pipeline::new(vec![as_dyn(&a)], Arc::new(MemoryStore::default()), &cfg);
    let ranked = p.refresh(&CancellationToken::new()).await.unwrap();
    assert_eq!(ranked.len(), 3);
    assert_eq!(p.current().len(), 3);
}

#[tokio::test]
async fn select_samples_from_the_top_pool() {
    let mut cfg = config();
    cfg.pipeline.pool_size = 4;
    let a = FakeAdapter::ok(
        "a",
        &["WorldCup", "GPUCompute", "Oscars", "CloudNative", "SuperBowl", "Grammys", "NBAFinals"],
    );
    let p = Pipeline::new(vec![as_dyn(&a)], Arc::new(MemoryStore::default()), &cfg);
    assert!(p.select(3).is_empty(), "nothing published yet");

    let ranked = p.refresh(&CancellationToken::new()).await.unwrap();
    let pool: HashSet<String> = ranked.iter().take(4).map(|c| c.tag().to_string()).collect();

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let picked = p.select_with_rng(3, &mut rng);
        assert_eq!(picked.len(), 3);
        let uniq: HashSet<&str> = picked.iter().map(|c| c.tag()).collect();
        assert_eq!(uniq.len(), 3, "sampling is without replacement");
        assert!(picked.iter().all(|c| pool.contains(c.tag())));
    }
    assert_eq!(p.select_with_rng(10, &mut rng).len(), 4);
}

#[tokio::test]
async fn concurrent_refreshes_share_one_cycle() {
    let slow = FakeAdapter::new(
        "slow",
        Script::Slow(Duration::from_millis(100), vec!["WorldCup", "GPUCompute"]),
    );
    let store = CountingStore::new();
    let p = Pipeline::new(
        vec![as_dyn(&slow)],
        Arc::clone(&store) as Arc<dyn TrendStore>,
        &config(),
    );
    let cancel = CancellationToken::new();

    let (r1, r2) = tokio::join!(p.refresh(&cancel), p.refresh(&cancel));
    let (r1, r2) = (r1.unwrap(), r2.unwrap());

    assert_eq!(store.refreshes(), 1);
    assert_eq!(slow.calls(), 1);
    let t1: Vec<&str> = r1.iter().map(|c| c.tag()).collect();
    let t2: Vec<&str> = r2.iter().map(|c| c.tag()).collect();
    assert_eq!(t1, t2);
}

#[tokio::test(start_paused = true)]
async fn cancelled_refresh_publishes_nothing() {
    let hang = FakeAdapter::new("hang", Script::Hang);
    let store = CountingStore::new();
    let p = Pipeline::new(
        vec![as_dyn(&hang)],
        Arc::clone(&store) as Arc<dyn TrendStore>,
        &config(),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = p.refresh(&cancel).await.unwrap_err();
    assert!(matches!(err, TrendError::Cancelled));
    assert!(p.current().is_empty());
    assert!(p.last_refresh_at().is_none());
    assert_eq!(store.refreshes(), 0);
}

#[tokio::test]
async fn stats_report_sources_and_cache() {
    let bad = FakeAdapter::failing("bad");
    let good = FakeAdapter::ok("good", &["GPUCompute"]);
    let p = pipeline(vec![as_dyn(&bad), as_dyn(&good)]);
    p.refresh(&CancellationToken::new()).await.unwrap();

    let stats = p.stats();
    assert!(stats.last_refresh_at.is_some());
    assert_eq!(stats.ranked, 1);
    assert_eq!(stats.sources.len(), 2);

    let bad_s = stats.sources.iter().find(|s| s.source == "bad").unwrap();
    assert_eq!(bad_s.failure_count, 1);
    assert_eq!(bad_s.state, BreakerState::Closed);
    assert!(bad_s.cache_age_secs.is_none());

    let good_s = stats.sources.iter().find(|s| s.source == "good").unwrap();
    assert!(good_s.last_success.is_some());
    assert!(good_s.cache_age_secs.is_some());
}

#[tokio::test]
async fn near_duplicate_from_another_source_counts_towards_agreement() {
    let a = FakeAdapter::ok("a", &["WorldCup", "GPUCompute"]);
    let b = FakeAdapter::ok("b", &["WorldCups"]);
    let p = pipeline(vec![as_dyn(&a), as_dyn(&b)]);
    let ranked = p.refresh(&CancellationToken::new()).await.unwrap();

    assert!(ranked.iter().all(|c| c.tag() != "WorldCups"));
    let cup = ranked.iter().find(|c| c.tag() == "WorldCup").unwrap();
    let sources: Vec<&str> = cup.sources.iter().map(String::as_str).collect();
    assert_eq!(sources, vec!["a", "b"]);
}

#[tokio::test]
async fn custom_scorer_and_filter_change_ranking() {
    use trend_bridge::filter::ContentFilter;
    use trend_bridge::relevance::RelevanceScorer;

    let a = FakeAdapter::ok("a", &["WorldCup", "NSFWclips"]);
    let p = pipeline(vec![as_dyn(&a)])
        .with_scorer(RelevanceScorer::new(&["worldcup"], "football world cup"))
        .with_filter(ContentFilter::permissive());
    let ranked = p.refresh(&CancellationToken::new()).await.unwrap();

    let cup = ranked.iter().find(|c| c.tag() == "WorldCup").unwrap();
    assert_eq!(cup.relevance, KEYWORD_SCORE);
    assert!(!cup.needs_bridge);
    assert!(ranked.iter().any(|c| c.tag() == "NSFWclips"));
}
