use chrono::{Duration, Utc};
use medmon_core::{AnalysisStatus, NewMediaItem};
use medmon_storage::{MediaStore, MemoryStore, SqlValue, UpsertSpec};
use uuid::Uuid;

fn item(source_id: Uuid, url: &str, minutes_ago: i64) -> NewMediaItem {
    NewMediaItem {
        source_id,
        title: format!("title for {url}"),
        text: "body".into(),
        url: url.into(),
        published_at: None,
        scraped_at: Utc::now() - Duration::minutes(minutes_ago),
    }
}

#[tokio::test]
async fn claims_oldest_raw_item_once() {
    let store = MemoryStore::new();
    let source = store.add_source("Wire", None, Some("https://wire.test/feed.xml"));
    let older = store.insert_item(&item(source, "https://wire.test/1", 30)).await.unwrap().id();
    let newer = store.insert_item(&item(source, "https://wire.test/2", 5)).await.unwrap().id();

    assert_eq!(store.claim_next_raw_item().await.unwrap(), Some(older));
    assert_eq!(store.item(older).unwrap().analysis_status, AnalysisStatus::Processing);
    assert_eq!(store.claim_next_raw_item().await.unwrap(), Some(newer));
    assert_eq!(store.claim_next_raw_item().await.unwrap(), None);
}

#[tokio::test]
async fn failing_source_listing_leaves_other_calls_working() {
    let store = MemoryStore::new();
    store.add_source("Wire", None, Some("https://wire.test/feed.xml"));
    store.fail_source_listing(true);

    assert!(store.scrapable_sources().await.is_err());
    assert!(store.ping().await.is_ok());

    store.fail_source_listing(false);
    assert_eq!(store.scrapable_sources().await.unwrap().len(), 1);
}

#[tokio::test]
async fn linking_twice_is_a_no_op() {
    let store = MemoryStore::new();
    let project = store.add_project("Tobacco watch", "industry interference");
    let source = store.add_source("Wire", None, Some("https://wire.test/feed.xml"));
    let id = store.insert_item(&item(source, "https://wire.test/1", 1)).await.unwrap().id();

    store.link_item(project, id).await.unwrap();
    store.link_item(project, id).await.unwrap();

    assert_eq!(store.linked_projects(id).await.unwrap(), vec![project]);
    assert_eq!(store.project_items(project).await.unwrap().len(), 1);
}

#[tokio::test]
async fn scrapable_sources_skip_blank_urls_and_sort_by_name() {
    let store = MemoryStore::new();
    store.add_source("Zeta", None, Some("https://zeta.test"));
    store.add_source("Alpha", None, Some("  "));
    store.add_source("Beta", None, Some("https://beta.test/rss"));
    store.add_source("Gamma", None, None);

    let names = store
        .scrapable_sources()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Beta", "Zeta"]);
}

#[tokio::test]
async fn project_details_collects_sources_and_themes() {
    let store = MemoryStore::new();
    let project = Uuid::new_v4();
    let source = Uuid::new_v4();
    let theme = Uuid::new_v4();
    let specs = vec![
        UpsertSpec::new("projects", &["id"])
            .set("id", SqlValue::Uuid(project))
            .set("client_id", SqlValue::OptUuid(None))
            .set("title", SqlValue::Text("Alcohol policy".into()))
            .set("description", SqlValue::OptText(Some("marketing to minors".into()))),
        UpsertSpec::new("media_sources", &["name"])
            .set("id", SqlValue::Uuid(source))
            .set("name", SqlValue::Text("City Paper".into()))
            .set("type", SqlValue::OptText(Some("newspaper".into())))
            .set("base_url", SqlValue::OptText(Some("https://city.test".into()))),
        UpsertSpec::new("project_media_sources", &["project_id", "media_source_id"])
            .set("project_id", SqlValue::Uuid(project))
            .set("media_source_id", SqlValue::Uuid(source)),
        UpsertSpec::new("thematic_areas", &["id"])
            .set("id", SqlValue::Uuid(theme))
            .set("project_id", SqlValue::Uuid(project))
            .set("name", SqlValue::Text("Advertising".into()))
            .set("description", SqlValue::OptText(None))
            .set("monitoring_objectives", SqlValue::Json(serde_json::json!(["track sponsorships"]))),
    ];
    store.upsert_all(&specs).await.unwrap();

    let details = store.project_details(project).await.unwrap().unwrap();
    assert_eq!(details.project.title, "Alcohol policy");
    assert_eq!(details.media_sources[0].id, source);
    assert_eq!(details.thematic_areas[0].monitoring_objectives, vec!["track sponsorships"]);
    assert!(store.project_details(Uuid::new_v4()).await.unwrap().is_none());
}
