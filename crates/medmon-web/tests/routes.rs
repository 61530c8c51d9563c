use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use medmon_core::{AiFields, NewMediaItem};
use medmon_storage::{MediaStore, MemoryStore};
use medmon_sync::testing::{ScriptedAnalyzer, StaticFetcher};
use medmon_sync::{AnalysisPipeline, Scraper, Supervisor};
use medmon_web::{app, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const FEED_URL: &str = "https://desk.test/rss";
const FEED: &str = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Desk</title>
    <link>https://desk.test</link><description>d</description>
    <item><title>Campus leagues</title><link>https://desk.test/campus</link></item>
    </channel></rss>"#;

fn analyzer() -> ScriptedAnalyzer {
    ScriptedAnalyzer::new(AiFields {
        industry_name: "Alcohol".into(),
        geographical_focus: "Kenya".into(),
        ..AiFields::default()
    })
    .relevant_for("Alcohol watch")
    .matching("Sponsorship")
}

fn router(store: &Arc<MemoryStore>) -> Router {
    let fetcher = StaticFetcher::new().with_page(FEED_URL, FEED);
    let scraper = Scraper::new(store.clone(), Arc::new(fetcher));
    let pipeline = AnalysisPipeline::new(store.clone(), Arc::new(analyzer()));
    app(AppState::new(scraper, pipeline, Supervisor::new().registry()))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn linked_item(store: &MemoryStore, source: Uuid, project: Uuid, url: &str) -> Uuid {
    let id = store
        .insert_item(&NewMediaItem {
            source_id: source,
            title: "Campus leagues".into(),
            text: "Brewers sponsor campus football.".into(),
            url: url.into(),
            published_at: None,
            scraped_at: Utc::now(),
        })
        .await
        .unwrap()
        .id();
    store.link_item(project, id).await.unwrap();
    id
}

#[tokio::test]
async fn banner_and_health() {
    let store = Arc::new(MemoryStore::new());
    let app = router(&store);

    let (status, body) = call(&app, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("running"));

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "ok");

    store.set_unavailable(true);
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unavailable");
}

#[tokio::test]
async fn manual_rss_scrape_validates_source() {
    let store = Arc::new(MemoryStore::new());
    let project = store.add_project("Alcohol watch", "alcohol marketing");
    let with_url = store.add_source("Desk", None, Some(FEED_URL));
    let without_url = store.add_source("Radio", Some("radio"), None);
    store.subscribe(project, with_url);
    let app = router(&store);

    let uri = |source: Uuid| format!("/scrape/rss?project_id={project}&source_id={source}");

    let (status, _) = call(&app, "POST", &uri(Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, "POST", &uri(without_url), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, "POST", &uri(with_url), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["source"], "Desk");
    assert_eq!(body["feed_url"], FEED_URL);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["url"], "https://desk.test/campus");
}

#[tokio::test]
async fn run_all_reports_empty_without_sources() {
    let store = Arc::new(MemoryStore::new());
    let (status, body) = call(&router(&store), "GET", "/scrape/run-all", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "empty");
}

#[tokio::test]
async fn run_all_scrapes_each_subscription() {
    let store = Arc::new(MemoryStore::new());
    let project = store.add_project("Alcohol watch", "alcohol marketing");
    let source = store.add_source("Desk", None, Some(FEED_URL));
    store.subscribe(project, source);

    let (status, body) = call(&router(&store), "GET", "/scrape/run-all", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_sources"], 1);
    assert_eq!(body["total_scrapes"], 1);
    assert_eq!(body["details"][0]["method"], "rss");
    assert_eq!(body["details"][0]["outcome"]["new_items"], 1);
}

#[tokio::test]
async fn process_item_maps_domain_errors() {
    let store = Arc::new(MemoryStore::new());
    let source = store.add_source("Desk", None, None);
    let orphan = store
        .insert_item(&NewMediaItem {
            source_id: source,
            title: "Orphan".into(),
            text: String::new(),
            url: "https://desk.test/orphan".into(),
            published_at: None,
            scraped_at: Utc::now(),
        })
        .await
        .unwrap()
        .id();
    let app = router(&store);

    let (status, body) = call(&app, "POST", &format!("/process/media-item/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("not found"));

    let (status, _) = call(&app, "POST", &format!("/process/media-item/{orphan}"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "POST", "/process/media-item/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn processed_items_show_up_in_listing_and_reports() {
    let store = Arc::new(MemoryStore::new());
    let project = store.add_project("Alcohol watch", "alcohol marketing");
    let source = store.add_source("Desk", Some("newspaper"), None);
    store.subscribe(project, source);
    store.add_theme(project, "Sponsorship", &["Track campus deals"]);
    let article = linked_item(&store, source, project, "https://desk.test/campus").await;
    let video = linked_item(&store, source, project, "https://www.youtube.com/watch?v=1").await;
    linked_item(&store, source, project, "https://desk.test/pending").await;
    let app = router(&store);

    for id in [article, video] {
        let (status, body) = call(&app, "POST", &format!("/process/media-item/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["final_relevant"], true);
        let outcome = &body["per_project_results"][project.to_string()];
        assert_eq!(outcome["status"], "analyzed");
        assert_eq!(outcome["ai_fields"]["industry_name"], "Alcohol");
        assert_eq!(outcome["semantic_area_ids"].as_array().unwrap().len(), 1);
    }

    let (status, body) = call(&app, "GET", "/process/all", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["items"][0]["project_name"], "Alcohol watch");

    let (status, body) = call(&app, "GET", &format!("/project/{project}/reports"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    let rows = body["items"].as_array().unwrap();
    let video_row = rows.iter().find(|r| r["id"] == video.to_string()).unwrap();
    let article_row = rows.iter().find(|r| r["id"] == article.to_string()).unwrap();
    assert_eq!(video_row["media_format"], "video");
    assert_eq!(article_row["media_format"], "article");
    assert_eq!(article_row["thematic_area"], "Sponsorship");
    assert_eq!(article_row["objectives"], json!(["Track campus deals"]));
    assert_eq!(article_row["media_category"], "newspaper");
    assert_eq!(article_row["status"], "Verified");

    let (status, _) = call(&app, "GET", &format!("/project/{}/reports", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn setup_project_stores_everything_and_reports_unscrapable_sources() {
    let store = Arc::new(MemoryStore::new());
    let app = router(&store);
    let project_id = Uuid::new_v4();
    let payload = json!({
        "id": project_id,
        "title": "Alcohol watch",
        "description": "alcohol marketing",
        "client": { "id": Uuid::new_v4(), "name_of_organisation": "Health NGO" },
        "media_sources": [
            { "name": "Radio One", "category_name": "radio" },
            { "name": "Desk", "category_name": "newspaper", "base_url": FEED_URL }
        ],
        "thematic_areas": [
            { "id": Uuid::new_v4(), "title": "Sponsorship", "monitoring_objectives": ["Track deals"] }
        ]
    });

    let (status, body) = call(&app, "POST", "/setup/project", Some(payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project_id"], project_id.to_string());
    let scraping = body["scraping"].as_array().unwrap();
    assert_eq!(scraping.len(), 2);
    let radio = scraping.iter().find(|s| s["source"] == "Radio One").unwrap();
    assert_eq!(radio["method"], "none");
    assert_eq!(radio["reason"], "No base_url");
    let desk = scraping.iter().find(|s| s["source"] == "Desk").unwrap();
    assert_eq!(desk["method"], "rss");
    assert_eq!(desk["result"]["new_items"], 1);

    assert_eq!(store.clients().len(), 1);
    let details = store.project_details(project_id).await.unwrap().unwrap();
    assert_eq!(details.thematic_areas[0].monitoring_objectives, vec!["Track deals".to_string()]);
}
