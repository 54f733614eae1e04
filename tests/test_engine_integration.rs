//! End-to-end tests over a real store: SQLite, HNSW and Tantivy, with
//! placeholder embeddings so no model or network is needed

use coursemate::config::{Config, ProviderKind};
use coursemate::model::{ChunkSpan, DocumentSource};
use coursemate::retrieval::SearchMode;
use coursemate::{CourseMateError, Engine};
use tempfile::TempDir;

const LECTURE: &str = "Dijkstra's algorithm finds shortest paths with non-negative weights.

Bellman-Ford handles negative edge weights and detects negative cycles.

Prim's algorithm grows a minimum spanning tree from a single vertex.

Kruskal's algorithm sorts edges and joins components with union-find.";

fn test_config(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = temp.path().to_path_buf();
    config.embedding.provider = ProviderKind::Placeholder;
    config.indexing.vector_dim = 32;
    config.indexing.hnsw_max_elements = 1_000;
    config
}

fn lecture() -> DocumentSource {
    DocumentSource::Text {
        title: "Graph algorithms".to_string(),
        source: Some("graphs.txt".to_string()),
        text: LECTURE.to_string(),
    }
}

#[tokio::test]
async fn test_ingest_populates_both_indexes() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::open(&test_config(&temp)).await.unwrap();

    let report = engine.ingest(&lecture()).await.unwrap();
    assert_eq!(report.chunk_count, 4);
    assert!(!report.is_degraded());

    let status = engine.status().unwrap();
    assert_eq!(status.documents, 1);
    assert_eq!(status.chunks, 4);
    assert_eq!(status.dense_entries, 4);
    assert_eq!(status.lexical_entries, 4);
    assert_eq!(status.pending_writes, 0);
    assert_eq!(status.failed_writes, 0);
    assert_eq!(status.embedding_model, "placeholder");

    let document = engine.document(report.document_id).unwrap().unwrap();
    assert_eq!(document.title, "Graph algorithms");
    assert_eq!(document.source.as_deref(), Some("graphs.txt"));
}

#[tokio::test]
async fn test_lookup_returns_what_was_chunked() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::open(&test_config(&temp)).await.unwrap();

    let source = DocumentSource::Pages {
        title: "Slides".to_string(),
        source: None,
        pages: vec![
            "Week 3\n\nHeaps and priority queues".to_string(),
            "Heap sort\nruns in n log n".to_string(),
        ],
    };
    let report = engine.ingest(&source).await.unwrap();
    let chunks = engine.document_chunks(report.document_id).unwrap();

    let summary: Vec<(&str, Option<ChunkSpan>)> =
        chunks.iter().map(|c| (c.text.as_str(), c.span)).collect();
    assert_eq!(
        summary,
        vec![
            (
                "Week 3",
                Some(ChunkSpan {
                    page: 1,
                    line_start: 1,
                    line_end: 1
                })
            ),
            (
                "Heaps and priority queues",
                Some(ChunkSpan {
                    page: 1,
                    line_start: 3,
                    line_end: 3
                })
            ),
            (
                "Heap sort\nruns in n log n",
                Some(ChunkSpan {
                    page: 2,
                    line_start: 1,
                    line_end: 2
                })
            ),
        ]
    );

    let ids: Vec<i64> = chunks.iter().map(|c| c.id).collect();
    let by_id = engine.chunks(&ids).unwrap();
    assert_eq!(by_id.len(), chunks.len());
    for chunk in &chunks {
        let fetched = by_id.iter().find(|c| c.id == chunk.id).unwrap();
        assert_eq!(fetched, chunk);
        assert_eq!(fetched.embedding.len(), 32);
    }
}

#[tokio::test]
async fn test_hybrid_search_finds_keyword_match() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::open(&test_config(&temp)).await.unwrap();
    engine.ingest(&lecture()).await.unwrap();

    let response = engine
        .search("Kruskal union-find", Some(2), SearchMode::Hybrid)
        .await
        .unwrap();

    assert!(!response.is_degraded());
    assert!(response.hits.len() <= 2);
    let kruskal = response
        .hits
        .iter()
        .find(|h| h.text.starts_with("Kruskal"))
        .expect("lexical match should survive fusion");
    assert_eq!(kruskal.lexical_rank, Some(1));
    assert!(kruskal.page.is_none());
}

#[tokio::test]
async fn test_dense_search_ranks_identical_text_first() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::open(&test_config(&temp)).await.unwrap();
    engine.ingest(&lecture()).await.unwrap();

    let query = "Prim's algorithm grows a minimum spanning tree from a single vertex.";
    let response = engine
        .search(query, Some(3), SearchMode::Dense)
        .await
        .unwrap();

    assert_eq!(response.hits.len(), 3);
    assert_eq!(response.hits[0].text, query);
    assert!(response.hits[0].score > 0.99);
}

#[tokio::test]
async fn test_default_k_applies() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.retrieval.default_k = 1;
    let engine = Engine::open(&config).await.unwrap();
    engine.ingest(&lecture()).await.unwrap();

    let response = engine
        .search("algorithm", None, SearchMode::Hybrid)
        .await
        .unwrap();
    assert_eq!(response.hits.len(), 1);
}

#[tokio::test]
async fn test_reopen_rebuilds_dense_index() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);

    {
        let engine = Engine::open(&config).await.unwrap();
        engine.ingest(&lecture()).await.unwrap();
    }

    let engine = Engine::open(&config).await.unwrap();
    let status = engine.status().unwrap();
    assert_eq!(status.dense_entries, 4);
    assert_eq!(status.lexical_entries, 4);
    assert_eq!(status.pending_writes, 0);

    let response = engine
        .search("Bellman-Ford negative cycles", Some(4), SearchMode::Hybrid)
        .await
        .unwrap();
    assert!(response.hits.iter().any(|h| h.text.starts_with("Bellman-Ford")));

    let report = engine.reindex(None).await.unwrap();
    assert_eq!(report.attempted, 0);
}

#[tokio::test]
async fn test_two_engines_share_one_store() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);

    let writer = Engine::open(&config).await.unwrap();
    writer.ingest(&lecture()).await.unwrap();

    // A second engine opens and searches while the first still holds the writer
    let reader = Engine::open(&config).await.unwrap();
    assert_eq!(reader.health().unwrap().chunks, 4);
    assert_eq!(reader.status().unwrap().dense_entries, 4);

    let response = reader
        .search("Kruskal union-find", Some(2), SearchMode::Hybrid)
        .await
        .unwrap();
    assert!(!response.is_degraded());
    assert!(response.hits.iter().any(|h| h.text.starts_with("Kruskal")));

    // Its own ingest lands degraded: stored and dense-indexed, lexical owed
    let notes = DocumentSource::Text {
        title: "Flows".to_string(),
        source: None,
        text: "Ford-Fulkerson augments flow along residual paths.".to_string(),
    };
    let report = reader.ingest(&notes).await.unwrap();
    assert!(report.is_degraded());
    assert!(report
        .warnings
        .iter()
        .all(|w| w.backend == coursemate::index::Backend::Lexical));

    drop(writer);
    let reindexed = reader.reindex(None).await.unwrap();
    assert_eq!(reindexed.attempted, 1);
    assert_eq!(reindexed.indexed, 1);
    assert_eq!(reader.status().unwrap().lexical_entries, 5);
}

#[tokio::test]
async fn test_rejected_inputs_leave_store_empty() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::open(&test_config(&temp)).await.unwrap();

    let blank = DocumentSource::Text {
        title: "Blank".to_string(),
        source: None,
        text: " \n\n\t\n".to_string(),
    };
    assert!(matches!(
        engine.ingest(&blank).await,
        Err(CourseMateError::EmptyInput)
    ));

    let scanned = DocumentSource::Pages {
        title: "Scan".to_string(),
        source: None,
        pages: vec![String::new(), "   ".to_string()],
    };
    assert!(matches!(
        engine.ingest(&scanned).await,
        Err(CourseMateError::NoExtractableText { pages: 2 })
    ));

    let health = engine.health().unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.documents, 0);
    assert_eq!(health.chunks, 0);
}

#[tokio::test]
async fn test_provider_dimension_must_match_config() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let provider = std::sync::Arc::new(coursemate::embedding::PlaceholderProvider::new(8));

    let result = Engine::open_with_provider(&config, provider).await;
    assert!(matches!(
        result,
        Err(CourseMateError::DimensionMismatch {
            expected: 32,
            actual: 8
        })
    ));
}
