//! RSS and webpage scrape flows: fetch, dedup by URL, store, link, audit.

use std::sync::Arc;

use chrono::Utc;
use medmon_adapters::{extract_article_text, extract_links, parse_feed, AdapterError};
use medmon_core::{
    FetchMethod, MediaSource, NewMediaItem, ScrapeLogEntry, ScrapeMethod, ScrapeOutcome,
    ScrapeStatus, ScrapedItem,
};
use medmon_storage::{FetchError, InsertOutcome, MediaStore, PageFetcher, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("media source {0} not found")]
    SourceNotFound(Uuid),
    #[error("media source {0} has no url")]
    MissingUrl(Uuid),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] AdapterError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of scraping one source on behalf of one project.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRun {
    pub source_id: Uuid,
    pub source_name: String,
    pub project_id: Uuid,
    pub url: String,
    pub method: ScrapeMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ScrapeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunAllReport {
    pub total_sources: usize,
    pub runs: Vec<SourceRun>,
}

#[derive(Clone)]
pub struct Scraper {
    store: Arc<dyn MediaStore>,
    fetcher: Arc<dyn PageFetcher>,
}

impl Scraper {
    pub fn new(store: Arc<dyn MediaStore>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { store, fetcher }
    }

    pub fn store(&self) -> &Arc<dyn MediaStore> {
        &self.store
    }

    /// Readable text of an article; fetch failures degrade to an empty body.
    async fn article_text(&self, source_key: &str, url: &str) -> String {
        match self.fetcher.fetch_text(source_key, url).await {
            Ok(html) => extract_article_text(&html),
            Err(err) => {
                warn!(url, error = %err, "article fetch failed");
                String::new()
            }
        }
    }

    async fn record(&self, entry: ScrapeLogEntry) {
        if let Err(err) = self.store.append_scrape_log(&entry).await {
            warn!(source_id = %entry.source_id, error = %err, "could not write scrape log");
        }
    }

    async fn link_all(&self, projects: &[Uuid], item_id: Uuid) -> Result<(), StoreError> {
        for project_id in projects {
            self.store.link_item(*project_id, item_id).await?;
        }
        Ok(())
    }

    /// Scrapes a feed and links every entry to all projects subscribed to the source.
    ///
    /// Known URLs are relinked without refetching; `items` lists new items only.
    pub async fn scrape_rss(
        &self,
        project_id: Uuid,
        source_id: Uuid,
        feed_url: &str,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let span = info_span!("scrape_rss", %project_id, %source_id, feed_url);
        async move {
            match self.rss_items(source_id, feed_url).await {
                Ok(None) => {
                    info!("feed has no entries");
                    Ok(ScrapeOutcome::default())
                }
                Ok(Some(outcome)) => {
                    info!(new = outcome.new_items, reused = outcome.reused_items, "rss scrape complete");
                    self.record(ScrapeLogEntry::new(
                        source_id.to_string(),
                        feed_url,
                        Some(project_id),
                        ScrapeMethod::Rss,
                        outcome.new_items,
                        outcome.reused_items,
                        ScrapeStatus::Success,
                        "RSS scrape completed",
                    ))
                    .await;
                    Ok(outcome)
                }
                Err(err) => {
                    warn!(error = %err, "rss scrape failed");
                    self.record(ScrapeLogEntry::new(
                        source_id.to_string(),
                        feed_url,
                        Some(project_id),
                        ScrapeMethod::Rss,
                        0,
                        0,
                        ScrapeStatus::Error,
                        err.to_string(),
                    ))
                    .await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn rss_items(
        &self,
        source_id: Uuid,
        feed_url: &str,
    ) -> Result<Option<ScrapeOutcome>, ScrapeError> {
        let source_key = source_id.to_string();
        let feed = self.fetcher.fetch(&source_key, feed_url).await?;
        let entries = parse_feed(&feed.body)?;
        if entries.is_empty() {
            return Ok(None);
        }

        let projects = self.store.projects_for_source(source_id).await?;
        let mut outcome = ScrapeOutcome::default();

        for entry in entries {
            if let Some(existing) = self.store.find_item_id_by_url(&entry.link).await? {
                self.link_all(&projects, existing).await?;
                outcome.reused_items += 1;
                continue;
            }

            let text = self.article_text(&source_key, &entry.link).await;
            let inserted = self
                .store
                .insert_item(&NewMediaItem {
                    source_id,
                    title: entry.title.clone(),
                    text,
                    url: entry.link.clone(),
                    published_at: entry.published_at,
                    scraped_at: Utc::now(),
                })
                .await?;
            self.link_all(&projects, inserted.id()).await?;

            match inserted {
                InsertOutcome::Created(media_id) => {
                    outcome.new_items += 1;
                    outcome.items.push(ScrapedItem {
                        media_id,
                        title: entry.title,
                        url: entry.link,
                        published_at: entry.published_at,
                    });
                }
                // another writer stored the URL between lookup and insert
                InsertOutcome::Existing(_) => outcome.reused_items += 1,
            }
        }

        Ok(Some(outcome))
    }

    /// Follows up to ten links from the source's landing page, linking each to `project_id`.
    ///
    /// A missing source or one without a URL yields an empty outcome and no audit row.
    pub async fn scrape_webpage(
        &self,
        project_id: Uuid,
        source_id: Uuid,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let Some(source) = self.store.media_source(source_id).await? else {
            return Ok(ScrapeOutcome::default());
        };
        let Some(base_url) = source.scrape_url().map(str::to_string) else {
            return Ok(ScrapeOutcome::default());
        };

        let span = info_span!("scrape_webpage", %project_id, %source_id, base_url = %base_url);
        async move {
            match self.web_items(project_id, source_id, &base_url).await {
                Ok(outcome) => {
                    info!(new = outcome.new_items, reused = outcome.reused_items, "web scrape complete");
                    self.record(ScrapeLogEntry::new(
                        source_id.to_string(),
                        source.name.clone(),
                        Some(project_id),
                        ScrapeMethod::Web,
                        outcome.new_items,
                        outcome.reused_items,
                        ScrapeStatus::Success,
                        "Web scraping complete",
                    ))
                    .await;
                    Ok(outcome)
                }
                Err(err) => {
                    warn!(error = %err, "web scrape failed");
                    self.record(ScrapeLogEntry::new(
                        source_id.to_string(),
                        source.name.clone(),
                        Some(project_id),
                        ScrapeMethod::Web,
                        0,
                        0,
                        ScrapeStatus::Error,
                        err.to_string(),
                    ))
                    .await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn web_items(
        &self,
        project_id: Uuid,
        source_id: Uuid,
        base_url: &str,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let source_key = source_id.to_string();
        let landing = self.fetcher.fetch_text(&source_key, base_url).await?;
        let links = extract_links(&landing, base_url)?;
        let mut outcome = ScrapeOutcome::default();

        for link in links {
            let media_id = match self.store.find_item_id_by_url(&link.url).await? {
                Some(existing) => {
                    outcome.reused_items += 1;
                    existing
                }
                None => {
                    let text = self.article_text(&source_key, &link.url).await;
                    let now = Utc::now();
                    let inserted = self
                        .store
                        .insert_item(&NewMediaItem {
                            source_id,
                            title: link.title.clone(),
                            text,
                            url: link.url.clone(),
                            published_at: Some(now),
                            scraped_at: now,
                        })
                        .await?;
                    if inserted.is_created() {
                        outcome.new_items += 1;
                    } else {
                        outcome.reused_items += 1;
                    }
                    inserted.id()
                }
            };

            self.store.link_item(project_id, media_id).await?;
            outcome.items.push(ScrapedItem {
                media_id,
                title: link.title,
                url: link.url,
                published_at: None,
            });
        }

        Ok(outcome)
    }

    /// Looks up a source and its trimmed URL for a manually triggered scrape.
    pub async fn resolve_source(&self, source_id: Uuid) -> Result<(MediaSource, String), ScrapeError> {
        let source = self
            .store
            .media_source(source_id)
            .await?
            .ok_or(ScrapeError::SourceNotFound(source_id))?;
        let url = source
            .scrape_url()
            .map(str::to_string)
            .ok_or(ScrapeError::MissingUrl(source_id))?;
        Ok((source, url))
    }

    /// Runs the fetcher matching the source's URL shape for one project.
    pub async fn scrape_for_project(&self, project_id: Uuid, source: &MediaSource) -> SourceRun {
        let url = source.scrape_url().unwrap_or_default().to_string();
        let method = FetchMethod::for_url(&url);
        let result = match method {
            FetchMethod::Rss => self.scrape_rss(project_id, source.id, &url).await,
            FetchMethod::Web => self.scrape_webpage(project_id, source.id).await,
        };
        let (outcome, error) = match result {
            Ok(outcome) => (Some(outcome), None),
            Err(err) => (None, Some(err.to_string())),
        };
        SourceRun {
            source_id: source.id,
            source_name: source.name.clone(),
            project_id,
            url,
            method: method.scrape_method(),
            outcome,
            error,
        }
    }

    /// Scrapes `source` once for every subscribed project.
    pub async fn scrape_source(&self, source: &MediaSource) -> Result<Vec<SourceRun>, ScrapeError> {
        let projects = self.store.projects_for_source(source.id).await?;
        let mut runs = Vec::with_capacity(projects.len());
        for project_id in projects {
            runs.push(self.scrape_for_project(project_id, source).await);
        }
        Ok(runs)
    }

    /// Every source with a URL, for every subscribed project.
    pub async fn run_all(&self) -> Result<RunAllReport, ScrapeError> {
        let sources = self.store.scrapable_sources().await?;
        let mut runs = Vec::new();
        for source in &sources {
            runs.extend(self.scrape_source(source).await?);
        }
        Ok(RunAllReport {
            total_sources: sources.len(),
            runs,
        })
    }
}
