//! End-to-end retrieval against a local fake SearxNG and page server.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use common::{context, memory_cache, paragraph, FixtureWeb, DIMS};
use evidence_harness::cache::{CacheSettings, VectorCache};
use evidence_harness::config::EmbeddingConfig;
use evidence_harness::embedding::{EmbeddingProvider, OllamaProvider};
use evidence_harness::pipeline::bulk_retrieve;
use evidence_harness_core::store::memory::InMemoryStore;
use evidence_harness_core::models::{SourceId, SourceStatus};
use evidence_harness_core::store::VectorStore;
use evidence_harness_core::url_norm::normalize_url;

#[tokio::test]
async fn test_single_hit_end_to_end() {
    let web = FixtureWeb::new()
        .page("one", "Page One", &paragraph("tidal energy"))
        .result("a", &["one"])
        .start()
        .await;
    let (cache, store) = memory_cache().await;
    let ctx = context(&web, &["good"], Some(cache));

    let resp = bulk_retrieve(&ctx, &json!({"queries": ["a"], "claim": "c"}))
        .await
        .unwrap();

    assert_eq!(resp.source_count, 1);
    assert_eq!(resp.sources[0].id, SourceId::Live(1));
    assert!(resp.merged_text.contains("[SOURCE 1]"));
    assert_eq!(resp.queries, vec!["a"]);
    assert_eq!(resp.claim.as_deref(), Some("c"));
    assert!(resp.settings.hybrid_vector_cache);

    let source = &resp.sources[0];
    assert_eq!(source.title, "Page One");
    assert_eq!(source.author.as_deref(), Some("Fixture Author"));
    assert_eq!(source.status, SourceStatus::SuccessfullyFetched);
    assert!(source.character_count > 200);

    // the fetched page was written to the cache
    assert!(store.count().await.unwrap() >= 1);
}

#[tokio::test]
async fn test_blocked_engine_falls_back_to_next() {
    let web = FixtureWeb::new()
        .page("one", "Page One", &paragraph("glaciers"))
        .result("glaciers", &["one"])
        .blocked_engine("captcha")
        .start()
        .await;
    let ctx = context(&web, &["captcha", "good"], None);

    // engine order is shuffled, so try a few times
    for _ in 0..4 {
        let resp = bulk_retrieve(&ctx, &json!({"queries": ["glaciers"]}))
            .await
            .unwrap();
        assert_eq!(resp.sources.len(), 1);
        assert_eq!(resp.total_results_found, 1);
    }
}

#[tokio::test]
async fn test_all_engines_blocked_degrades_to_empty() {
    let web = FixtureWeb::new()
        .page("one", "Page One", &paragraph("volcanoes"))
        .result("volcanoes", &["one"])
        .blocked_engine("captcha")
        .start()
        .await;
    let ctx = context(&web, &["captcha"], None);

    let resp = bulk_retrieve(&ctx, &json!({"queries": ["volcanoes"]}))
        .await
        .unwrap();
    assert!(resp.sources.is_empty());
    assert_eq!(resp.source_count, 0);
    assert_eq!(resp.total_results_found, 0);
    assert_eq!(resp.merged_text, "");
    assert_eq!(resp.character_count, 0);
}

#[tokio::test]
async fn test_duplicate_and_missing_pages() {
    let web = FixtureWeb::new()
        .page("one", "Page One", &paragraph("bees"))
        .result("a", &["one", "missing"])
        .result("b", &["one"])
        .start()
        .await;
    let ctx = context(&web, &["good"], None);

    let resp = bulk_retrieve(&ctx, &json!({"queries": ["a", "b"]}))
        .await
        .unwrap();
    assert_eq!(resp.total_results_found, 3);
    assert_eq!(resp.sources.len(), 1);
    assert_eq!(resp.sources[0].url, web.url("one"));
}

#[tokio::test]
async fn test_fresh_page_is_not_rewritten() {
    let web = FixtureWeb::new()
        .page("one", "Page One", &paragraph("coral reefs"))
        .result("reefs", &["one"])
        .start()
        .await;
    let (cache, store) = memory_cache().await;
    let ctx = context(&web, &["good"], Some(cache));
    let key = normalize_url(&web.url("one"));

    bulk_retrieve(&ctx, &json!({"queries": ["reefs"]})).await.unwrap();
    let first = store.find_by_url(&key, 1).await.unwrap();
    assert_eq!(first.len(), 1);
    let count = store.count().await.unwrap();

    bulk_retrieve(&ctx, &json!({"queries": ["reefs"]})).await.unwrap();
    let second = store.find_by_url(&key, 1).await.unwrap();
    assert_eq!(second[0].fetched_at, first[0].fetched_at);
    assert_eq!(store.count().await.unwrap(), count);
}

#[tokio::test]
async fn test_scored_cache_hit_outranks_unscored_live_source() {
    let web = FixtureWeb::new()
        .page("one", "Live Page", &paragraph("solar panel efficiency"))
        .result("solar panel efficiency", &["one"])
        .start()
        .await;
    let (cache, store) = memory_cache().await;
    cache
        .cache_page(
            "https://archive.test/solar",
            &paragraph("solar panel efficiency in winter"),
            "Archived",
            "archive.test",
            chrono::Utc::now(),
        )
        .await
        .unwrap();
    let ctx = context(&web, &["good"], Some(cache));

    let resp = bulk_retrieve(
        &ctx,
        &json!({"queries": ["solar panel efficiency"], "claim": "solar panel efficiency"}),
    )
    .await
    .unwrap();

    // one live source, one surviving cache hit; the list is cut to the live count
    assert_eq!(resp.source_count, 2);
    assert_eq!(resp.sources.len(), 1);
    let top = &resp.sources[0];
    assert_eq!(top.status, SourceStatus::FromVectorCache);
    assert_eq!(top.url, "https://archive.test/solar");
    assert!(top.score.unwrap() > 0.0);
    assert!(matches!(top.id, SourceId::Cached(_)));

    // merged text is built from live sources only
    assert!(resp.merged_text.contains("[SOURCE 1] Live Page"));
    assert!(store.count().await.unwrap() >= 2);
}

#[tokio::test]
async fn test_free_text_prompt_is_normalized() {
    let web = FixtureWeb::new()
        .page("one", "Page One", &paragraph("octopus cognition"))
        .result("octopus cognition", &["one"])
        .result("octopus tool use", &["one"])
        .start()
        .await;
    let ctx = context(&web, &["good"], None);

    let prompt = "QUERIES:\n- octopus cognition\n- octopus tool use\nCLAIM: octopuses use tools";
    let resp = bulk_retrieve(&ctx, &json!({ "prompt": prompt })).await.unwrap();

    assert_eq!(resp.queries, vec!["octopus cognition", "octopus tool use"]);
    assert_eq!(resp.claim.as_deref(), Some("octopuses use tools"));
    assert_eq!(resp.total_results_found, 2);
    assert_eq!(resp.sources.len(), 1);
}

/// Never answers.
struct HangingEmbedder;

#[async_trait]
impl EmbeddingProvider for HangingEmbedder {
    fn model_name(&self) -> &str {
        "hanging"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

async fn cache_with(embedder: Arc<dyn EmbeddingProvider>, timeout: Duration) -> VectorCache {
    let settings = CacheSettings {
        embed_timeout: Some(timeout),
        ..CacheSettings::default()
    };
    let cache = VectorCache::new(Arc::new(InMemoryStore::new()), embedder, settings);
    cache.ensure().await.unwrap();
    cache
}

#[tokio::test]
async fn test_unreachable_embedder_does_not_stall_retrieval() {
    let web = FixtureWeb::new()
        .page("one", "Page One", &paragraph("river deltas"))
        .result("a", &["one"])
        .start()
        .await;
    let ollama = OllamaProvider::new(&EmbeddingConfig {
        url: Some("http://127.0.0.1:1".to_string()),
        dims: DIMS,
        max_retries: 3,
        ..EmbeddingConfig::default()
    })
    .unwrap();
    let cache = cache_with(Arc::new(ollama), Duration::from_millis(500)).await;
    let ctx = context(&web, &["good"], Some(cache));

    let started = Instant::now();
    let resp = bulk_retrieve(&ctx, &json!({"queries": ["a"]})).await.unwrap();
    let took = started.elapsed();

    assert_eq!(resp.source_count, 1);
    assert!(took < Duration::from_secs(3), "retrieval took {:?}", took);
}

#[tokio::test]
async fn test_hanging_embedder_is_cut_off() {
    let web = FixtureWeb::new()
        .page("one", "Page One", &paragraph("lichens"))
        .result("a", &["one"])
        .start()
        .await;
    let cache = cache_with(Arc::new(HangingEmbedder), Duration::from_millis(200)).await;
    let ctx = context(&web, &["good"], Some(cache));

    let started = Instant::now();
    let resp = bulk_retrieve(&ctx, &json!({"queries": ["a"], "claim": "lichens grow slowly"}))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(resp.sources.len(), 1);
    assert!(resp.merged_text.contains("[SOURCE 1] Page One"));
}

#[tokio::test]
async fn test_garbage_pdf_fails_only_its_own_source() {
    let web = FixtureWeb::new()
        .page("one", "Page One", &paragraph("peat bogs"))
        .raw("broken.pdf", "application/pdf", b"%PDF-1.4\n%\xff\xff garbage xref".to_vec())
        .result("bogs", &["broken.pdf", "one"])
        .start()
        .await;
    let ctx = context(&web, &["good"], None);

    let resp = bulk_retrieve(&ctx, &json!({"queries": ["bogs"]})).await.unwrap();
    assert_eq!(resp.total_results_found, 2);
    assert_eq!(resp.sources.len(), 1);
    assert_eq!(resp.sources[0].url, web.url("one"));
}

#[tokio::test]
async fn test_cache_hit_ids_are_dense_after_dedup() {
    let web = FixtureWeb::new()
        .page("one", "Live One", &paragraph("kelp forests"))
        .page("two", "Live Two", &paragraph("kelp canopy"))
        .page("three", "Live Three", &paragraph("kelp holdfasts"))
        .result("kelp forests", &["one", "two", "three"])
        .start()
        .await;
    let (cache, _store) = memory_cache().await;
    // reef.test appears twice; only its best chunk survives dedup
    for (url, site, sentence) in [
        ("https://reef.test/a", "reef.test", "Kelp forests shelter juvenile rockfish among swaying fronds. "),
        ("https://reef.test/b", "reef.test", "Kelp forests feed abalone while otters hunt nearby urchins. "),
        ("https://ocean.test/c", "ocean.test", "Kelp forests decline when warm currents strip nutrients away. "),
    ] {
        cache
            .cache_page(url, &sentence.repeat(5), "Cached", site, chrono::Utc::now())
            .await
            .unwrap();
    }
    let ctx = context(&web, &["good"], Some(cache));

    let resp = bulk_retrieve(&ctx, &json!({"queries": ["kelp forests"], "claim": "kelp forests"}))
        .await
        .unwrap();

    // three live sources plus one hit per cached site
    assert_eq!(resp.source_count, 5);
    assert_eq!(resp.sources.len(), 3);
    let mut ids: Vec<String> = resp
        .sources
        .iter()
        .filter_map(|s| match &s.id {
            SourceId::Cached(v) => Some(v.clone()),
            SourceId::Live(_) => None,
        })
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["V1", "V2"]);
}
