//! Integration tests for the search API.
//!
//! These drive the router in-process with a deterministic keyword embedder,
//! so they need neither model files nor a network.

use aixplore::{
    api_router, AppState, Config, Embedder, Result, SearchEngine, SessionSlots, SqliteCatalog,
    ToolRecord,
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use rusqlite::{params, Connection};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const VOCABULARY: [&str; 5] = ["image", "chat", "video", "code", "music"];

/// One axis per vocabulary word plus a small constant axis.
struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn encode_batch(&self, texts: &[String]) -> Result<Array2<f32>> {
        let mut out = Array2::zeros((texts.len(), VOCABULARY.len() + 1));
        for (i, text) in texts.iter().enumerate() {
            let text = text.to_lowercase();
            for (axis, word) in VOCABULARY.iter().enumerate() {
                if text.contains(word) {
                    out[[i, axis]] = 1.0;
                }
            }
            out[[i, VOCABULARY.len()]] = 0.05;
        }
        Ok(out)
    }
}

/// Keyword embedder behind a single session: one batch of two texts at a
/// time, each batch holding the session for a few milliseconds.
struct SingleSessionEmbedder {
    slots: SessionSlots,
}

impl SingleSessionEmbedder {
    fn new() -> Self {
        Self {
            slots: SessionSlots::new(1, Duration::from_secs(5)),
        }
    }
}

impl Embedder for SingleSessionEmbedder {
    fn encode_batch(&self, texts: &[String]) -> Result<Array2<f32>> {
        let mut batches = Vec::new();
        for chunk in texts.chunks(2) {
            let _slot = self.slots.acquire()?;
            std::thread::sleep(Duration::from_millis(15));
            batches.push(KeywordEmbedder.encode_batch(chunk)?);
        }
        let views: Vec<ArrayView2<'_, f32>> = batches.iter().map(|b| b.view()).collect();
        Ok(concatenate(Axis(0), &views).unwrap())
    }
}

fn catalog_rows() -> Vec<ToolRecord> {
    vec![
        ToolRecord::new("Runway", "https://runwayml.com", "AI video editing")
            .with_category("Video")
            .with_popularity("40,000+")
            .with_pricing("Freemium"),
        ToolRecord::new("ChatGPT", "https://chat.openai.com", "General chat assistant")
            .with_category("Chatbots")
            .with_popularity("1,000,000+")
            .with_pricing("Free"),
        ToolRecord::new("Pika", "https://pika.art", "Text to video generation")
            .with_category("Video")
            .with_popularity("200"),
        ToolRecord::new("Claude Bot", "", "Chat with documents").with_category("Chatbots"),
        ToolRecord::new("Suno", "https://suno.ai", "Music and song creation")
            .with_category("Audio")
            .with_popularity("n/a"),
    ]
}

fn write_catalog(path: &Path, tools: &[ToolRecord]) {
    let conn = Connection::open(path).unwrap();
    conn.execute(
        "CREATE TABLE ai_tools (
            name TEXT, url TEXT, description TEXT, category TEXT,
            popularity TEXT, pricing TEXT, tags TEXT
        )",
        [],
    )
    .unwrap();
    for t in tools {
        conn.execute(
            "INSERT INTO ai_tools VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![t.name, t.url, t.description, t.category, t.popularity, t.pricing, t.tags],
        )
        .unwrap();
    }
}

/// A ready app backed by a temp SQLite catalog, plus the temp dir keeping it alive.
fn create_test_app() -> (Router, Arc<AppState>, TempDir) {
    create_test_app_with(Arc::new(KeywordEmbedder), 2)
}

fn create_test_app_with(
    embedder: Arc<dyn Embedder>,
    pool_size: usize,
) -> (Router, Arc<AppState>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("ai_tools.db");
    write_catalog(&db_path, &catalog_rows());

    let catalog = SqliteCatalog::new(&db_path);
    let engine = SearchEngine::build(catalog.load().unwrap(), embedder).unwrap();

    let config = Config {
        catalog_db_path: db_path,
        snapshot_path: dir.path().join("snapshots").join("index.bin"),
        pool_size: Some(pool_size),
        ..Config::default()
    };

    let state = Arc::new(AppState::with_engine(engine, catalog, config));
    state.mark_ready();

    (api_router(Arc::clone(&state)), state, dir)
}

async fn request(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(req).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));

    (status, body)
}

fn names(body: &Value) -> Vec<String> {
    body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_reports_tool_count() {
    let (app, _state, _dir) = create_test_app();

    let (status, body) = request(app, "GET", "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["tools_count"], 5);
}

#[tokio::test]
async fn test_ready_before_and_after_publish() {
    let dir = tempfile::tempdir().unwrap();
    let engine = SearchEngine::build(catalog_rows(), Arc::new(KeywordEmbedder)).unwrap();
    let state = Arc::new(AppState::with_engine(
        engine,
        SqliteCatalog::new(dir.path().join("unused.db")),
        Config::default(),
    ));

    let (status, body) = request(api_router(Arc::clone(&state)), "GET", "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "not_ready");

    state.mark_ready();
    let (status, _) = request(api_router(state), "GET", "/ready").await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Search modes
// ============================================================================

#[tokio::test]
async fn test_semantic_search_with_hebrew_query() {
    let (app, _state, _dir) = create_test_app();

    // "עריכת וידאו" -> "עריכת video"
    let uri = "/search?q=%D7%A2%D7%A8%D7%99%D7%9B%D7%AA%20%D7%95%D7%99%D7%93%D7%90%D7%95&top_k=2";
    let (status, body) = request(app, "GET", uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "semantic");
    // Equal relevance; Runway's popularity bonus puts it ahead of Pika
    assert_eq!(names(&body), vec!["Runway", "Pika"]);
    assert_eq!(body["results"][0]["rank"], 1);
    assert!(body["results"][0]["final_score"].as_f64().unwrap()
        > body["results"][1]["final_score"].as_f64().unwrap());
}

#[tokio::test]
async fn test_popularity_cannot_beat_relevance() {
    let (app, _state, _dir) = create_test_app();

    let (status, body) = request(app, "GET", "/search?q=music&top_k=2").await;

    assert_eq!(status, StatusCode::OK);
    // ChatGPT has the maximum bonus but no overlap with the query
    assert_eq!(names(&body)[0], "Suno");
}

#[tokio::test]
async fn test_punctuation_only_query_falls_back_to_random() {
    let (app, _state, _dir) = create_test_app();

    let (status, body) = request(app, "GET", "/search?q=%20%20%20").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "random");
    assert_eq!(body["results"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_semantic_search_of_symbols_is_empty() {
    let (app, _state, _dir) = create_test_app();

    let (status, body) = request(app, "GET", "/search?q=%21%21%3F").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "semantic");
    assert!(body["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_popular_action() {
    let (app, _state, _dir) = create_test_app();

    let (status, body) = request(app, "GET", "/search?action=popular").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "popular");
    assert_eq!(names(&body), vec!["ChatGPT", "Runway", "Pika"]);
    assert_eq!(body["results"][0]["relevance_score"], 1.0);
}

#[tokio::test]
async fn test_random_action_respects_count() {
    let (app, _state, _dir) = create_test_app();

    let (status, body) = request(app, "GET", "/search?action=random&top_k=3").await;

    assert_eq!(status, StatusCode::OK);
    let mut returned = names(&body);
    assert_eq!(returned.len(), 3);
    returned.sort();
    returned.dedup();
    assert_eq!(returned.len(), 3);
}

#[tokio::test]
async fn test_category_search() {
    let (app, _state, _dir) = create_test_app();

    let (status, body) = request(app, "GET", "/search?category=video").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "category");
    assert_eq!(names(&body), vec!["Pika", "Runway"]);
}

#[tokio::test]
async fn test_zero_top_k_returns_400() {
    let (app, _state, _dir) = create_test_app();

    let (status, body) = request(app, "GET", "/search?q=chat&top_k=0").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("top_k"));
}

#[tokio::test]
async fn test_categories_listing() {
    let (app, _state, _dir) = create_test_app();

    let (status, body) = request(app, "GET", "/categories").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["categories"], json!(["Audio", "Chatbots", "Video"]));
}

// ============================================================================
// Index maintenance
// ============================================================================

#[tokio::test]
async fn test_rebuild_picks_up_catalog_changes() {
    let (app, state, _dir) = create_test_app();

    let conn = Connection::open(&state.config.catalog_db_path).unwrap();
    conn.execute(
        "INSERT INTO ai_tools (name, url, description, category) VALUES ('Lovable', '', 'Code apps by chatting', 'Coding')",
        [],
    )
    .unwrap();

    let (status, body) = request(app.clone(), "POST", "/index/rebuild").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tools_count"], 6);
    assert_eq!(state.engine.corpus_size(), 6);
    assert!(state.config.snapshot_path.exists());

    let (_, body) = request(app, "GET", "/search?q=code&top_k=1").await;
    assert_eq!(names(&body), vec!["Lovable"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queries_during_rebuild_share_one_session() {
    let (app, _state, _dir) = create_test_app_with(Arc::new(SingleSessionEmbedder::new()), 1);

    let rebuild = tokio::spawn(request(app.clone(), "POST", "/index/rebuild"));
    let searches: Vec<_> = ["video", "chat", "music", "code"]
        .into_iter()
        .map(|q| {
            let app = app.clone();
            tokio::spawn(async move {
                let uri = format!("/search?q={q}&top_k=2");
                request(app, "GET", &uri).await
            })
        })
        .collect();

    let (status, body) = rebuild.await.unwrap();
    assert_eq!(status, StatusCode::OK, "rebuild failed: {body}");
    assert_eq!(body["tools_count"], 5);

    for search in searches {
        let (status, body) = search.await.unwrap();
        assert_eq!(status, StatusCode::OK, "search failed: {body}");
        assert_eq!(body["results"].as_array().unwrap().len(), 2);
    }
}

#[tokio::test]
async fn test_save_then_restore_snapshot() {
    let (app, state, _dir) = create_test_app();

    let (status, body) = request(app, "POST", "/index/save").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tools_count"], 5);

    let restored =
        SearchEngine::from_snapshot(&state.config.snapshot_path, Arc::new(KeywordEmbedder)).unwrap();
    assert_eq!(restored.corpus_size(), 5);
    assert_eq!(restored.current().corpus(), state.engine.current().corpus());
}
