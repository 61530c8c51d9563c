use std::sync::Arc;

use chrono::Utc;
use medmon_core::{NewMediaItem, ScrapeMethod, ScrapeStatus};
use medmon_storage::{MediaStore, MemoryStore};
use medmon_sync::scheduler::{SCHEDULER_SOURCE_ID, SCRAPE_WORKER};
use medmon_sync::testing::StaticFetcher;
use medmon_sync::{ScrapeError, ScrapeScheduler, Scraper};

const FEED_URL: &str = "https://desk.test/feed.xml";

fn feed(links: &[&str]) -> String {
    let items = links
        .iter()
        .map(|link| format!("<item><title>Story at {link}</title><link>{link}</link></item>"))
        .collect::<String>();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Desk</title>
        <link>https://desk.test</link><description>d</description>{items}</channel></rss>"#
    )
}

const ARTICLE: &str = "<html><body><article><h1>Marketing push</h1>\
    <p>Alcohol brands are sponsoring university sports events across the region this season.</p>\
    </article></body></html>";

struct Fixture {
    store: Arc<MemoryStore>,
    fetcher: Arc<StaticFetcher>,
    scraper: Scraper,
}

fn fixture(fetcher: StaticFetcher) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(fetcher);
    let scraper = Scraper::new(store.clone(), fetcher.clone());
    Fixture {
        store,
        fetcher,
        scraper,
    }
}

async fn seed_item(store: &MemoryStore, source_id: uuid::Uuid, url: &str) -> uuid::Uuid {
    store
        .insert_item(&NewMediaItem {
            source_id,
            title: "Already stored".into(),
            text: "old body".into(),
            url: url.into(),
            published_at: None,
            scraped_at: Utc::now(),
        })
        .await
        .unwrap()
        .id()
}

#[tokio::test]
async fn one_new_and_one_known_entry_link_to_every_subscriber() {
    let f = fixture(
        StaticFetcher::new()
            .with_page(FEED_URL, &feed(&["https://desk.test/old", "https://desk.test/new"]))
            .with_page("https://desk.test/new", ARTICLE),
    );
    let project_a = f.store.add_project("Alcohol watch", "alcohol marketing");
    let project_b = f.store.add_project("Youth health", "youth exposure");
    let source = f.store.add_source("Desk", Some("newspaper"), Some(FEED_URL));
    f.store.subscribe(project_a, source);
    f.store.subscribe(project_b, source);
    let old_id = seed_item(&f.store, source, "https://desk.test/old").await;

    let outcome = f.scraper.scrape_rss(project_a, source, FEED_URL).await.unwrap();

    assert_eq!((outcome.new_items, outcome.reused_items), (1, 1));
    assert_eq!(outcome.items.len(), 1);
    let new_id = outcome.items[0].media_id;
    for project in [project_a, project_b] {
        assert!(f.store.is_linked(project, old_id));
        assert!(f.store.is_linked(project, new_id));
    }

    let stored = f.store.item(new_id).unwrap();
    assert!(stored.raw_text.starts_with("Marketing push\nAlcohol brands"));
    assert_eq!(f.fetcher.request_count("https://desk.test/old"), 0);

    let logs = f.store.scrape_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].method, ScrapeMethod::Rss);
    assert_eq!(logs[0].status, ScrapeStatus::Success);
    assert_eq!((logs[0].new_items, logs[0].reused_items), (1, 1));
    assert_eq!(logs[0].source_name, FEED_URL);
}

#[tokio::test]
async fn rescraping_an_unchanged_feed_creates_nothing() {
    let f = fixture(
        StaticFetcher::new()
            .with_page(FEED_URL, &feed(&["https://desk.test/a", "https://desk.test/b"]))
            .with_page("https://desk.test/a", ARTICLE),
    );
    let project = f.store.add_project("Alcohol watch", "alcohol marketing");
    let source = f.store.add_source("Desk", None, Some(FEED_URL));
    f.store.subscribe(project, source);

    let first = f.scraper.scrape_rss(project, source, FEED_URL).await.unwrap();
    let second = f.scraper.scrape_rss(project, source, FEED_URL).await.unwrap();

    assert_eq!(first.new_items, 2);
    assert_eq!((second.new_items, second.reused_items), (0, 2));
    assert!(second.items.is_empty());
    assert_eq!(f.store.items().len(), 2);
    // b has no page: stored with an empty body rather than skipped
    assert!(f
        .store
        .items()
        .iter()
        .any(|i| i.url == "https://desk.test/b" && i.raw_text.is_empty()));
}

#[tokio::test]
async fn unreachable_feed_is_logged_with_zero_counts() {
    let f = fixture(StaticFetcher::new());
    let project = f.store.add_project("Alcohol watch", "alcohol marketing");
    let source = f.store.add_source("Desk", None, Some(FEED_URL));

    let err = f.scraper.scrape_rss(project, source, FEED_URL).await.unwrap_err();

    assert!(matches!(err, ScrapeError::Fetch(_)));
    let logs = f.store.scrape_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, ScrapeStatus::Error);
    assert_eq!((logs[0].new_items, logs[0].reused_items), (0, 0));
}

#[tokio::test]
async fn webpage_scrape_reuses_known_links_and_links_only_the_requester() {
    let landing = r##"<html><body>
        <a href="#main">Skip</a>
        <a href="/politics/tax">Tax hike debated</a>
        <a href="https://paper.test/health/ads">Ad ban extended</a>
        </body></html>"##;
    let f = fixture(
        StaticFetcher::new()
            .with_page("https://paper.test", landing)
            .with_page("https://paper.test/politics/tax", ARTICLE),
    );
    let requester = f.store.add_project("Alcohol watch", "alcohol marketing");
    let other = f.store.add_project("Youth health", "youth exposure");
    let source = f.store.add_source("Paper", None, Some("https://paper.test"));
    f.store.subscribe(requester, source);
    f.store.subscribe(other, source);
    let known = seed_item(&f.store, source, "https://paper.test/health/ads").await;

    let outcome = f.scraper.scrape_webpage(requester, source).await.unwrap();

    assert_eq!((outcome.new_items, outcome.reused_items), (1, 1));
    assert_eq!(outcome.items.len(), 2);
    assert_eq!(outcome.items[0].url, "https://paper.test/politics/tax");
    assert_eq!(outcome.items[1].media_id, known);
    assert!(f.store.is_linked(requester, known));
    assert!(!f.store.is_linked(other, known));

    let created = f.store.item(outcome.items[0].media_id).unwrap();
    assert!(created.published_at.is_some());
    assert_eq!(f.store.scrape_logs()[0].method, ScrapeMethod::Web);
}

#[tokio::test]
async fn webpage_scrape_of_source_without_url_is_a_silent_no_op() {
    let f = fixture(StaticFetcher::new());
    let project = f.store.add_project("Alcohol watch", "alcohol marketing");
    let source = f.store.add_source("Radio", Some("radio"), None);

    let outcome = f.scraper.scrape_webpage(project, source).await.unwrap();

    assert_eq!(outcome.new_items + outcome.reused_items, 0);
    assert!(f.store.scrape_logs().is_empty());
    assert!(f.fetcher.requests().is_empty());
}

#[tokio::test]
async fn scheduler_rotates_one_source_per_tick_and_survives_failures() {
    let f = fixture(StaticFetcher::new());
    let project = f.store.add_project("Alcohol watch", "alcohol marketing");
    for (name, url) in [
        ("Beta", "https://beta.test/landing"),
        ("Alpha", "https://alpha.test/rss"),
    ] {
        let id = f.store.add_source(name, None, Some(url));
        f.store.subscribe(project, id);
    }
    f.store.add_source("Gamma", None, None);

    let mut scheduler = ScrapeScheduler::new(f.scraper.clone());
    let mut seen = Vec::new();
    for _ in 0..3 {
        let tick = scheduler.tick().await.unwrap().unwrap();
        assert_eq!(tick.total, 2);
        assert!(tick.runs[0].error.is_some());
        seen.push((tick.source_name, tick.runs[0].method));
    }

    assert_eq!(
        seen,
        vec![
            ("Alpha".to_string(), ScrapeMethod::Rss),
            ("Beta".to_string(), ScrapeMethod::Web),
            ("Alpha".to_string(), ScrapeMethod::Rss),
        ]
    );
    assert_eq!(scheduler.next_index(), 1);
}

#[tokio::test]
async fn scheduler_tick_failures_do_not_escape() {
    let f = fixture(StaticFetcher::new());
    f.store.set_unavailable(true);
    let mut scheduler = ScrapeScheduler::new(f.scraper.clone());

    assert!(matches!(scheduler.tick().await, Err(ScrapeError::Store(_))));
    assert!(scheduler.run_tick().await.is_none());
}

#[tokio::test]
async fn failed_tick_writes_a_scheduler_audit_row() {
    let f = fixture(StaticFetcher::new());
    f.store.add_source("Desk", None, Some(FEED_URL));
    f.store.fail_source_listing(true);
    let mut scheduler = ScrapeScheduler::new(f.scraper.clone());

    assert!(scheduler.run_tick().await.is_none());

    let logs = f.store.scrape_logs();
    assert_eq!(logs.len(), 1);
    let entry = &logs[0];
    assert_eq!(entry.status, ScrapeStatus::Error);
    assert_eq!(entry.source_id, SCHEDULER_SOURCE_ID);
    assert_eq!(entry.source_name, SCRAPE_WORKER);
    assert_eq!(entry.method, ScrapeMethod::System);
    assert_eq!((entry.new_items, entry.reused_items), (0, 0));
    assert!(entry.project_id.is_none());
    assert!(entry.message.contains("source listing rejected"));
    assert_eq!(scheduler.next_index(), 0);
}

#[tokio::test]
async fn run_all_covers_every_source_and_subscriber() {
    let f = fixture(
        StaticFetcher::new().with_page(FEED_URL, &feed(&["https://desk.test/a"])),
    );
    let a = f.store.add_project("Alcohol watch", "alcohol marketing");
    let b = f.store.add_project("Youth health", "youth exposure");
    let source = f.store.add_source("Desk", None, Some(FEED_URL));
    f.store.subscribe(a, source);
    f.store.subscribe(b, source);

    let report = f.scraper.run_all().await.unwrap();

    assert_eq!(report.total_sources, 1);
    assert_eq!(report.runs.len(), 2);
    let totals = report
        .runs
        .iter()
        .map(|r| r.outcome.as_ref().map(|o| (o.new_items, o.reused_items)))
        .collect::<Vec<_>>();
    assert!(totals.contains(&Some((1, 0))));
    assert!(totals.contains(&Some((0, 1))));
    assert_eq!(f.store.items().len(), 1);
}
