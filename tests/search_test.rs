mod helpers;

use helpers::{seed, temp_store, test_service, DownEmbedder, DownReranker, HashEmbedder, OverlapReranker};
use mnemo::ingest::IngestOptions;
use mnemo::memory::search::{perform_semantic_search, try_semantic_search, SearchParams};

fn params(initial_k: usize, final_k: usize) -> SearchParams {
    SearchParams {
        initial_k,
        final_k,
        ..Default::default()
    }
}

#[test]
fn empty_corpus_returns_empty() {
    let (_tmp, store) = temp_store();
    assert!(!store.is_ready());
    let hits = perform_semantic_search(
        &store,
        &HashEmbedder::new(32),
        Some(&OverlapReranker),
        "anything",
        &params(20, 3),
    );
    assert!(hits.is_empty());
}

#[test]
fn dimension_mismatch_is_configuration_error() {
    let (_tmp, store) = temp_store();
    seed(&store, &HashEmbedder::new(768), &[("stored with a wide model", "agent_response")]);

    let narrow = HashEmbedder::new(384);
    let err = try_semantic_search(&store, &narrow, Some(&OverlapReranker), "query", &params(20, 3))
        .unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(narrow.texts_embedded(), 1);

    let hits = perform_semantic_search(&store, &narrow, Some(&OverlapReranker), "query", &params(20, 3));
    assert!(hits.is_empty());
}

#[test]
fn single_qualifying_candidate_is_not_padded() {
    let (_tmp, store) = temp_store();
    let provider = HashEmbedder::new(32);
    seed(
        &store,
        &provider,
        &[
            ("user asked about caching", "user_input"),
            ("the cache is invalidated on every write", "agent_response"),
            ("user asked about backups", "user_input"),
            ("uploaded design notes", "file_upload"),
        ],
    );

    let hits = try_semantic_search(&store, &provider, Some(&OverlapReranker), "cache write", &params(20, 3))
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "mem-1");
    assert_eq!(hits[0].source, "agent_response");
    assert!(hits[0].rerank_score.is_some());
}

#[test]
fn rerank_score_decides_order() {
    let (_tmp, store) = temp_store();
    let provider = HashEmbedder::new(64);
    seed(
        &store,
        &provider,
        &[
            ("rust borrow checker rules", "agent_response"),
            ("python garbage collector", "agent_response"),
            ("rust async runtime tokio", "agent_response"),
        ],
    );

    let hits = try_semantic_search(&store, &provider, Some(&OverlapReranker), "rust tokio async", &params(20, 3))
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].content, "rust async runtime tokio");
    assert_eq!(hits[0].rerank_score, Some(3.0));
    assert_eq!(hits[1].content, "rust borrow checker rules");
    assert!(hits
        .windows(2)
        .all(|w| w[0].rerank_score.unwrap() >= w[1].rerank_score.unwrap()));
    for hit in &hits {
        assert!(hit.faiss_score >= 0.0);
        assert!(!hit.uid.is_empty());
    }
}

#[test]
fn fallback_returns_raw_candidates_in_distance_order() {
    let (_tmp, store) = temp_store();
    let provider = HashEmbedder::new(64);
    seed(
        &store,
        &provider,
        &[
            ("completely unrelated words", "user_input"),
            ("deploy pipeline steps", "user_input"),
            ("deploy pipeline", "file_upload"),
        ],
    );

    let hits = try_semantic_search(&store, &provider, Some(&OverlapReranker), "deploy pipeline", &params(20, 2))
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "mem-2", "exact match has distance zero");
    assert!(hits[0].faiss_score <= hits[1].faiss_score);
    assert!(hits.iter().all(|h| h.rerank_score.is_none()));
}

#[test]
fn final_k_above_initial_k_returns_all_candidates() {
    let (_tmp, store) = temp_store();
    let provider = HashEmbedder::new(32);
    let records: Vec<(String, &str)> = (0..6)
        .map(|i| (format!("agent answer number {i}"), "agent_response"))
        .collect();
    let refs: Vec<(&str, &str)> = records.iter().map(|(c, s)| (c.as_str(), *s)).collect();
    seed(&store, &provider, &refs);

    let hits = try_semantic_search(&store, &provider, Some(&OverlapReranker), "agent answer", &params(4, 10))
        .unwrap();
    assert_eq!(hits.len(), 4);
}

#[test]
fn duplicates_are_not_collapsed_at_query_time() {
    let (_tmp, store) = temp_store();
    let provider = HashEmbedder::new(32);
    seed(
        &store,
        &provider,
        &[
            ("restart the worker", "agent_response"),
            ("restart the worker", "agent_response"),
        ],
    );

    let hits = try_semantic_search(&store, &provider, Some(&OverlapReranker), "restart worker", &params(20, 3))
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].content, hits[1].content);
    assert_eq!(hits[0].id, "mem-0", "ties keep distance order");
}

#[test]
fn backend_failures_fail_closed() {
    let (_tmp, store) = temp_store();
    let provider = HashEmbedder::new(32);
    seed(&store, &provider, &[("some agent answer", "agent_response")]);

    let err = try_semantic_search(&store, &DownEmbedder(32), None, "answer", &params(20, 3)).unwrap_err();
    assert!(err.is_backend());
    assert!(perform_semantic_search(&store, &DownEmbedder(32), None, "answer", &params(20, 3)).is_empty());

    let err = try_semantic_search(&store, &provider, Some(&DownReranker), "answer", &params(20, 3)).unwrap_err();
    assert!(err.is_backend());
    assert!(perform_semantic_search(&store, &provider, Some(&DownReranker), "answer", &params(20, 3)).is_empty());
}

#[test]
fn quality_source_is_configurable() {
    let (_tmp, store) = temp_store();
    let provider = HashEmbedder::new(32);
    seed(
        &store,
        &provider,
        &[
            ("agent says hello", "agent_response"),
            ("user says hello", "user_input"),
        ],
    );

    let params = SearchParams {
        quality_source: "user_input".into(),
        ..params(20, 3)
    };
    let hits = try_semantic_search(&store, &provider, Some(&OverlapReranker), "hello", &params).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source, "user_input");
}

#[test]
fn service_searches_what_it_ingested() {
    let (_tmp, service) = test_service(64);
    let body = b"{\"content\": \"the index is rebuilt after every delete\", \"source\": \"agent_response\"}\n\
{\"content\": \"backups are written before any replace\", \"source\": \"agent_response\"}\n\
{\"content\": \"how are backups made?\", \"source\": \"user_input\"}\n";
    service
        .ingest_bytes("answers.jsonl", body, &IngestOptions::default())
        .unwrap();

    let hits = service.search("when are backups written");
    assert!(!hits.is_empty());
    assert_eq!(hits[0].content, "backups are written before any replace");
    assert!(hits.iter().all(|h| h.source == "agent_response"));
}
