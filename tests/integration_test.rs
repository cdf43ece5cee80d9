//! Integration tests for the corpus-match pipeline.
//!
//! These exercise the full analysis and search flows against the real
//! vector store, cache and corpus graph, with a keyword-count embedder in
//! place of a running LLM.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use tempfile::TempDir;

use corpus_match::analysis::AnalysisRequest;
use corpus_match::cancel::CancellationToken;
use corpus_match::config::{AnalysisOptions, Config, QueryOptions};
use corpus_match::graph::JsonCorpusGraph;
use corpus_match::llm::{CompletionProvider, EmbeddingProvider};
use corpus_match::models::{Granularity, Origin};
use corpus_match::search::vector::{IndexedChunk, VectorStore};
use corpus_match::state::{AppState, Collaborators};

const VOCABULARY: &[&str] = &[
    "bloom",
    "taxonomy",
    "cognitive",
    "feedback",
    "assessment",
    "peer",
    "rubric",
    "motivation",
];

/// Embeds text as keyword counts over a small fixed vocabulary.
#[derive(Default)]
struct KeywordEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        Ok(VOCABULARY
            .iter()
            .map(|word| lower.matches(word).count() as f32)
            .collect())
    }
}

/// Ranks candidates in reverse of the order it is shown them.
struct ReverseRanker;

#[async_trait]
impl CompletionProvider for ReverseRanker {
    async fn complete(&self, prompt: &str, _context_items: &[String]) -> Result<String> {
        let shown = prompt
            .lines()
            .filter(|l| l.split_once(". ").is_some_and(|(n, _)| n.parse::<usize>().is_ok()))
            .count();
        Ok((1..=shown).rev().map(|n| n.to_string()).collect::<Vec<_>>().join(", "))
    }
}

/// Corpus: Bloom's taxonomy, two chunks on feedback, one on motivation.
fn corpus() -> Vec<(&'static str, &'static str, &'static str, &'static str)> {
    vec![
        (
            "bloom#0",
            "bloom",
            "Taxonomy of Educational Objectives",
            "Bloom's taxonomy classifies cognitive objectives from recall to evaluation.",
        ),
        (
            "hattie#0",
            "hattie",
            "The Power of Feedback",
            "Feedback is among the most powerful influences on learning and assessment.",
        ),
        (
            "hattie#1",
            "hattie",
            "The Power of Feedback",
            "Peer feedback improves rubric use.",
        ),
        (
            "deci#0",
            "deci",
            "Self-Determination Theory",
            "Intrinsic motivation depends on autonomy and competence.",
        ),
    ]
}

const GRAPH_JSON: &str = r#"{
    "citations": [
        {"from": "anderson", "to": "bloom"},
        {"from": "bloom", "to": "tyler"}
    ],
    "documents": [
        {"item_id": "bloom", "title": "Taxonomy of Educational Objectives",
         "summary": "A hierarchy of cognitive learning objectives."},
        {"item_id": "anderson", "title": "A Taxonomy for Learning, Teaching, and Assessing",
         "summary": "A revision of Bloom's taxonomy."}
    ]
}"#;

struct Harness {
    _dir: TempDir,
    embedder: Arc<KeywordEmbedder>,
    store: Arc<VectorStore>,
    state: AppState,
}

async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Config::default()
    };

    let embedder = Arc::new(KeywordEmbedder::default());
    let store = Arc::new(VectorStore::open_or_create(&config.vector_dir()).unwrap());
    let mut chunks = Vec::new();
    for (chunk_id, item_id, title, content) in corpus() {
        chunks.push(IndexedChunk {
            chunk_id: chunk_id.to_string(),
            item_id: item_id.to_string(),
            title: title.to_string(),
            authors: vec![],
            content: content.to_string(),
            page_number: Some(1),
            external_key: None,
            embedding: embedder.embed(content).await.unwrap(),
        });
    }
    store.add_chunks(chunks).unwrap();
    embedder.calls.store(0, Ordering::SeqCst);

    std::fs::write(config.graph_path(), GRAPH_JSON).unwrap();
    let graph = Arc::new(JsonCorpusGraph::open(&config.graph_path()).unwrap());

    let llm_config = Arc::new(RwLock::new(config.llm.clone()));
    let state = AppState::with_collaborators(
        config,
        reqwest::Client::new(),
        llm_config,
        Collaborators {
            embedder: embedder.clone(),
            index: store.clone(),
            completion: Arc::new(ReverseRanker),
            graph: graph.clone(),
            catalog: graph,
        },
    )
    .unwrap();

    Harness {
        _dir: dir,
        embedder,
        store,
        state,
    }
}

const DRAFT: &str = "# Teaching Notes\n\n\
                     We sequence tasks using Bloom's taxonomy of cognitive levels.\n\n\
                     Students receive peer feedback on every draft using a rubric.\n\n\
                     Motivation matters.";

fn analysis_request() -> AnalysisRequest {
    AnalysisRequest {
        scope: "course-notes".to_string(),
        text: DRAFT.to_string(),
        options: AnalysisOptions {
            granularity: Granularity::Paragraph,
            max_results: 5,
            similarity_threshold: 0.12,
            use_reranking: false,
            use_multilingual: true,
        },
    }
}

fn query_options(h: &Harness) -> QueryOptions {
    QueryOptions::from(&h.state.config.retrieval)
}

#[tokio::test]
async fn test_analysis_end_to_end_with_cache() {
    let h = harness().await;
    let analyzer = &h.state.analyzer;

    let results = analyzer
        .analyze_document(&analysis_request(), CancellationToken::new(), |_| {})
        .await
        .unwrap();

    // The heading and "Motivation matters." are below the minimum unit length
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].recommendations[0].item_id, "bloom");
    assert_eq!(results[1].recommendations[0].item_id, "hattie");
    assert_eq!(results[1].recommendations[0].chunk_id, "hattie#1");
    assert!(results
        .iter()
        .all(|r| r.recommendations.iter().all(|rec| rec.similarity >= 0.12)));

    let calls = h.embedder.calls.load(Ordering::SeqCst);
    let cached = analyzer
        .analyze_document(&analysis_request(), CancellationToken::new(), |_| {})
        .await
        .unwrap();
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), calls);
    assert_eq!(cached, results);

    assert_eq!(analyzer.all_cached_results("course-notes"), results);
    let unit = analyzer
        .results_for_unit("course-notes", &results[1].unit_id)
        .unwrap();
    assert_eq!(unit, results[1]);
}

#[tokio::test]
async fn test_corpus_change_invalidates_cache() {
    let h = harness().await;
    let analyzer = &h.state.analyzer;
    analyzer
        .analyze_document(&analysis_request(), CancellationToken::new(), |_| {})
        .await
        .unwrap();
    let calls = h.embedder.calls.load(Ordering::SeqCst);

    h.store.delete_item("deci").unwrap();
    analyzer
        .analyze_document(&analysis_request(), CancellationToken::new(), |_| {})
        .await
        .unwrap();
    assert!(h.embedder.calls.load(Ordering::SeqCst) > calls);
}

#[tokio::test]
async fn test_clear_cache_forces_rerun() {
    let h = harness().await;
    let analyzer = &h.state.analyzer;
    analyzer
        .analyze_document(&analysis_request(), CancellationToken::new(), |_| {})
        .await
        .unwrap();
    assert!(analyzer.clear_cache("course-notes"));
    assert!(analyzer.all_cached_results("course-notes").is_empty());
}

#[tokio::test]
async fn test_multilingual_expansion_raises_similarity() {
    let h = harness().await;
    let mut options = query_options(&h);

    options.use_multilingual = false;
    let plain = h.state.query.search("la taxonomie de bloom", &options).await.unwrap();

    options.use_multilingual = true;
    let expanded = h.state.query.search("la taxonomie de bloom", &options).await.unwrap();

    assert_eq!(plain.recommendations[0].item_id, "bloom");
    assert_eq!(expanded.recommendations[0].item_id, "bloom");
    assert!(expanded.recommendations[0].similarity > plain.recommendations[0].similarity);
}

#[tokio::test]
async fn test_fallback_when_nothing_passes_threshold() {
    let h = harness().await;
    let result = h
        .state
        .query
        .search("quantum chromodynamics", &query_options(&h))
        .await
        .unwrap();
    assert!(result.fallback_applied);
    assert_eq!(result.recommendations.len(), 3);

    let strict = QueryOptions {
        fallback_enabled: false,
        ..query_options(&h)
    };
    let result = h.state.query.search("quantum chromodynamics", &strict).await.unwrap();
    assert!(result.recommendations.is_empty());
    assert!(!result.fallback_applied);
}

#[tokio::test]
async fn test_graph_expansion_and_summaries() {
    let h = harness().await;
    let options = QueryOptions {
        graph_expansion: true,
        summaries: true,
        ..query_options(&h)
    };
    let result = h
        .state
        .query
        .search("bloom taxonomy cognitive", &options)
        .await
        .unwrap();

    assert_eq!(result.recommendations.len(), 1);
    assert_eq!(
        result.recommendations[0].preview,
        "A hierarchy of cognitive learning objectives."
    );
    // "tyler" is cited but has no catalog entry
    assert_eq!(result.related.len(), 1);
    assert_eq!(result.related[0].item_id, "anderson");
    assert_eq!(result.related[0].origin, Origin::Related);
    assert_eq!(result.related[0].preview, "A revision of Bloom's taxonomy.");
}

#[tokio::test]
async fn test_reranked_search_keeps_items() {
    let h = harness().await;
    let options = QueryOptions {
        use_reranking: true,
        chunk_level: true,
        similarity_threshold: 0.0,
        ..query_options(&h)
    };
    let plain = h
        .state
        .query
        .search(
            "feedback and assessment",
            &QueryOptions {
                use_reranking: false,
                ..options.clone()
            },
        )
        .await
        .unwrap();
    let reranked = h.state.query.search("feedback and assessment", &options).await.unwrap();

    let mut before: Vec<_> = plain.recommendations.iter().map(|r| r.chunk_id.clone()).collect();
    let after: Vec<_> = reranked.recommendations.iter().map(|r| r.chunk_id.clone()).collect();
    let mut reversed = before.clone();
    reversed.reverse();
    assert_eq!(after, reversed);

    let mut after_sorted = after;
    before.sort();
    after_sorted.sort();
    assert_eq!(before, after_sorted);
    assert!((reranked.recommendations[0].similarity - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_cancelled_run_writes_no_cache() {
    let h = harness().await;
    let analyzer = h.state.analyzer.clone();
    let token = CancellationToken::new();
    let held = token.clone();
    let err = h
        .state
        .analyzer
        .analyze_document(&analysis_request(), token, move |_| held.cancel())
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(analyzer.all_cached_results("course-notes").is_empty());
}
