// tests/cache_ttl.rs

use std::time::Duration;

use chrono::Utc;
use trend_bridge::cache::CacheStore;
use trend_bridge::Candidate;

fn payload() -> Vec<Candidate> {
    vec![Candidate::new("WorldCup", "rss", 0.9, Utc::now()).unwrap()]
}

#[tokio::test]
async fn entry_expires_after_ttl() {
    let cache = CacheStore::new();
    cache.put("rss", payload(), Duration::from_millis(1));
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(cache.get("rss").is_none());
    assert!(cache.ages().is_empty());
}

#[tokio::test]
async fn concurrent_keys_do_not_interfere() {
    let cache = std::sync::Arc::new(CacheStore::new());
    let mut handles = Vec::new();
    for i in 0..16 {
        let c = std::sync::Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            let key = format!("source{i}");
            for _ in 0..50 {
                c.put(&key, payload(), Duration::from_secs(60));
                assert_eq!(c.get(&key).map(|p| p.len()), Some(1));
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(cache.ages().len(), 16);
}
