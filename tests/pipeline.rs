//! End-to-end pipeline tests against the SQLite-backed index and catalog.
//!
//! These drive the real storage layer with deterministic fake embedding
//! and chat services, so they exercise schema provisioning, upserts,
//! filtered search, and the full ingest → query flow without any network.

mod common;

use std::sync::Arc;

use tempfile::TempDir;

use common::{document, CannedChat, FakeEmbedder, DIMS};
use lorekeeper::answer::{Answerer, NO_CONTEXT_ANSWER};
use lorekeeper::catalog::{Catalog, SqliteCatalog};
use lorekeeper::config::{ChunkingConfig, EmbeddingConfig};
use lorekeeper::db;
use lorekeeper::error::PipelineError;
use lorekeeper::index::{SqliteIndex, VectorIndex};
use lorekeeper::models::SourceType;
use lorekeeper::pipeline::{IngestPipeline, QueryPipeline};
use lorekeeper::retrieve::Retriever;

struct TestEnv {
    _tmp: TempDir,
    index: Arc<SqliteIndex>,
    catalog: Arc<SqliteCatalog>,
    ingest: IngestPipeline,
    query: QueryPipeline,
}

async fn setup() -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect(&tmp.path().join("lore.sqlite")).await.unwrap();

    let index = Arc::new(SqliteIndex::new(pool.clone(), "fake-bag-of-words", DIMS));
    let catalog = Arc::new(SqliteCatalog::new(pool));
    index.ensure_schema().await.unwrap();
    catalog.ensure_schema().await.unwrap();

    let embedder = Arc::new(FakeEmbedder);

    let ingest = IngestPipeline::new(
        ChunkingConfig {
            max_chunk_size: 200,
            overlap: 40,
        },
        &EmbeddingConfig {
            batch_size: 8,
            ..EmbeddingConfig::default()
        },
        embedder.clone(),
        index.clone(),
        catalog.clone(),
    );

    let query = QueryPipeline::new(
        Retriever::new(embedder, index.clone()),
        Answerer::new(Arc::new(CannedChat("Grounded answer with citations."))),
    );

    TestEnv {
        _tmp: tmp,
        index,
        catalog,
        ingest,
        query,
    }
}

fn long_text(topic: &str, sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("Sentence {i} explains how the {topic} works in detail."))
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::test]
async fn ensure_schema_is_idempotent() {
    let env = setup().await;
    // Second provisioning against the same database is a no-op.
    env.index.ensure_schema().await.unwrap();
    env.catalog.ensure_schema().await.unwrap();
}

#[tokio::test]
async fn ensure_schema_rejects_changed_dimension() {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect(&tmp.path().join("lore.sqlite")).await.unwrap();

    let index = SqliteIndex::new(pool.clone(), "fake-bag-of-words", DIMS);
    index.ensure_schema().await.unwrap();

    // Reopening with a different dimension must fail loudly, not mix
    // vector spaces.
    let reopened = SqliteIndex::new(pool.clone(), "fake-bag-of-words", DIMS * 2);
    let err = reopened.ensure_schema().await.unwrap_err();
    assert!(matches!(err, PipelineError::DimensionMismatch { .. }));

    // Same for a different model at the same dimension.
    let remodeled = SqliteIndex::new(pool, "some-other-model", DIMS);
    assert!(remodeled.ensure_schema().await.is_err());
}

#[tokio::test]
async fn too_short_document_writes_to_neither_store() {
    let env = setup().await;

    let err = env
        .ingest
        .ingest(&document("tiny", SourceType::Wiki, "Tiny", "  nope  "))
        .await
        .unwrap_err();
    assert!(matches!(err.root(), PipelineError::DocumentTooShort { .. }));

    let stats = env.index.source_stats().await.unwrap();
    assert_eq!(stats.total_chunks, 0);
    assert!(env.catalog.lookup("tiny").await.unwrap().is_none());
}

#[tokio::test]
async fn ingest_twice_leaves_single_copy() {
    let env = setup().await;

    let doc = document(
        "runbook",
        SourceType::Wiki,
        "Incident Runbook",
        &long_text("incident response process", 30),
    );

    let first = env.ingest.ingest(&doc).await.unwrap();
    let second = env.ingest.ingest(&doc).await.unwrap();
    assert_eq!(first.chunks_written, second.chunks_written);

    let stats = env.index.source_stats().await.unwrap();
    assert_eq!(stats.total_chunks, first.chunks_written as u64);
    assert_eq!(stats.sources.get(&SourceType::Wiki), Some(&1));

    // Query results after double ingestion contain no duplicate chunks.
    let out = env
        .query
        .query("incident response process", 10, None)
        .await
        .unwrap();
    let snippets: Vec<&str> = out.sources.iter().map(|s| s.snippet.as_str()).collect();
    let mut deduped = snippets.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), snippets.len(), "duplicate chunks in results");
}

#[tokio::test]
async fn reingest_with_fewer_chunks_reconciles_catalog() {
    let env = setup().await;

    let long = document(
        "doc",
        SourceType::Tracker,
        "Flaky Test",
        &long_text("flaky integration test", 40),
    );
    let first = env.ingest.ingest(&long).await.unwrap();
    assert!(first.chunks_written > 1);

    let short = document(
        "doc",
        SourceType::Tracker,
        "Flaky Test",
        "The flaky test was quarantined and the suite is green again.",
    );
    let second = env.ingest.ingest(&short).await.unwrap();
    assert_eq!(second.chunks_written, 1);

    let entry = env.catalog.lookup("doc").await.unwrap().unwrap();
    assert_eq!(entry.total_chunks, 1);
    assert_eq!(entry.chunk_ids, vec!["doc_chunk_0".to_string()]);
}

#[tokio::test]
async fn search_respects_top_k_and_score_order() {
    let env = setup().await;

    for i in 0..5 {
        env.ingest
            .ingest(&document(
                &format!("d{i}"),
                SourceType::Wiki,
                &format!("Doc {i}"),
                &long_text("deployment pipeline", 20),
            ))
            .await
            .unwrap();
    }

    let vector = common::hash_embed("deployment pipeline");
    let results = env.index.search(&vector, 3, None).await.unwrap();
    assert_eq!(results.len(), 3);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score, "scores not non-increasing");
    }

    // Asking for more than exist returns all available, without error.
    let all = env.index.search(&vector, 10_000, None).await.unwrap();
    let stats = env.index.source_stats().await.unwrap();
    assert_eq!(all.len() as u64, stats.total_chunks);
}

#[tokio::test]
async fn source_filter_is_a_hard_constraint() {
    let env = setup().await;

    env.ingest
        .ingest(&document(
            "w1",
            SourceType::Wiki,
            "Wiki Doc",
            &long_text("database migration", 25),
        ))
        .await
        .unwrap();
    env.ingest
        .ingest(&document(
            "c1",
            SourceType::Chat,
            "Chat Thread",
            &long_text("database migration", 25),
        ))
        .await
        .unwrap();

    let vector = common::hash_embed("database migration");

    let chat_only = env
        .index
        .search(&vector, 50, Some(&[SourceType::Chat]))
        .await
        .unwrap();
    assert!(!chat_only.is_empty());
    for r in &chat_only {
        assert_eq!(r.chunk.meta.source_type(), SourceType::Chat);
    }

    // Enough chat chunks exist to fill top_k even though wiki chunks
    // score just as high: the filter constrains candidates, it doesn't
    // post-filter a truncated list.
    let chat_count = chat_only.len();
    let top = env
        .index
        .search(&vector, chat_count, Some(&[SourceType::Chat]))
        .await
        .unwrap();
    assert_eq!(top.len(), chat_count);
}

#[tokio::test]
async fn query_with_no_context_returns_fallback_without_model() {
    let env = setup().await;

    let out = env.query.query("anything indexed?", 5, None).await.unwrap();
    assert_eq!(out.answer, NO_CONTEXT_ANSWER);
    assert!(out.sources.is_empty());

    // Filter that matches nothing behaves the same.
    env.ingest
        .ingest(&document(
            "w1",
            SourceType::Wiki,
            "Wiki Doc",
            &long_text("search relevance", 20),
        ))
        .await
        .unwrap();
    let out = env
        .query
        .query("search relevance", 5, Some(&[SourceType::Repo]))
        .await
        .unwrap();
    assert_eq!(out.answer, NO_CONTEXT_ANSWER);
    assert!(out.sources.is_empty());
}

#[tokio::test]
async fn end_to_end_query_prefers_related_document() {
    let env = setup().await;

    env.ingest
        .ingest(&document(
            "oncall",
            SourceType::Wiki,
            "On-call Handbook",
            "When an alert fires, the on-call engineer acknowledges the page, \
             checks the dashboard, and escalates to the service owner if the \
             alert does not resolve within fifteen minutes.",
        ))
        .await
        .unwrap();
    env.ingest
        .ingest(&document(
            "recipes",
            SourceType::Chat,
            "Lunch Thread",
            "The sourdough starter needs feeding twice a day and the loaves \
             proof overnight in the refrigerator before baking.",
        ))
        .await
        .unwrap();

    let out = env
        .query
        .query("what should the on-call engineer do when an alert fires?", 2, None)
        .await
        .unwrap();

    assert!(!out.answer.is_empty());
    assert_ne!(out.answer, NO_CONTEXT_ANSWER);
    assert_eq!(out.sources[0].source_type, SourceType::Wiki);
    assert_eq!(out.sources[0].title, "On-call Handbook");

    let related = out.sources[0].relevance_score;
    let control = out
        .sources
        .iter()
        .find(|s| s.source_type == SourceType::Chat)
        .map(|s| s.relevance_score);
    if let Some(control) = control {
        assert!(related > control, "related {related} <= control {control}");
    }

    // Snippets never exceed the 200-char budget plus ellipsis.
    for s in &out.sources {
        assert!(s.snippet.chars().count() <= 203);
    }
}

#[tokio::test]
async fn upsert_dimension_mismatch_writes_nothing() {
    let env = setup().await;

    use chrono::Utc;
    use lorekeeper::models::{Chunk, IndexedChunk};

    let good = IndexedChunk {
        chunk: Chunk {
            chunk_id: "d_chunk_0".to_string(),
            document_id: "d".to_string(),
            chunk_index: 0,
            text: "text".to_string(),
            meta: common::meta_for(SourceType::Repo, "Repo Doc", "https://example.com/r"),
        },
        vector: vec![0.5; DIMS],
        indexed_at: Utc::now(),
    };
    let bad = IndexedChunk {
        vector: vec![0.5; DIMS + 1],
        ..good.clone()
    };

    let err = env.index.upsert(&[good, bad]).await.unwrap_err();
    assert!(matches!(err, PipelineError::DimensionMismatch { .. }));

    let stats = env.index.source_stats().await.unwrap();
    assert_eq!(stats.total_chunks, 0, "partial batch was committed");
}
