//! Project import: client, project, sources, and thematic areas in one transaction, then a first scrape.

use std::collections::BTreeMap;

use medmon_core::ScrapeOutcome;
use medmon_storage::{SqlValue, StoreError, UpsertSpec};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::scrape::Scraper;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid project payload: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientPayload {
    pub id: Uuid,
    #[serde(alias = "name")]
    pub name_of_organisation: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcePayload {
    pub name: String,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default, alias = "url")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThemePayload {
    pub id: Uuid,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub monitoring_objectives: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSetupRequest {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub client: ClientPayload,
    #[serde(default)]
    pub media_sources: Vec<SourcePayload>,
    #[serde(default)]
    pub thematic_areas: Vec<ThemePayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupScrape {
    pub source: String,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ScrapeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSetupReport {
    pub project_id: Uuid,
    pub scraping: Vec<SetupScrape>,
}

/// Builds the upserts for a project import. `source_ids` maps trimmed source names to ids.
pub fn setup_upserts(
    request: &ProjectSetupRequest,
    source_ids: &BTreeMap<String, Uuid>,
) -> Result<Vec<UpsertSpec>, SetupError> {
    let mut specs = vec![
        UpsertSpec::new("clients", &["id"])
            .set("id", SqlValue::Uuid(request.client.id))
            .set("name", SqlValue::Text(request.client.name_of_organisation.clone()))
            .set("contact_email", SqlValue::OptText(request.client.email.clone())),
        UpsertSpec::new("projects", &["id"])
            .set("id", SqlValue::Uuid(request.id))
            .set("client_id", SqlValue::OptUuid(Some(request.client.id)))
            .set("title", SqlValue::Text(request.title.clone()))
            .set("description", SqlValue::OptText(request.description.clone())),
    ];

    for source in &request.media_sources {
        let name = source.name.trim();
        let id = *source_ids
            .get(name)
            .ok_or_else(|| SetupError::Invalid(format!("unresolved media source {name}")))?;
        let mut spec = UpsertSpec::new("media_sources", &["name"])
            .set("id", SqlValue::Uuid(id))
            .set("name", SqlValue::Text(name.to_string()))
            .set("type", SqlValue::OptText(source.category_name.clone()));
        // an import without a URL must not clear one configured earlier
        if let Some(url) = source.base_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            spec = spec.set("base_url", SqlValue::OptText(Some(url.to_string())));
        }
        specs.push(spec);
        specs.push(
            UpsertSpec::new("project_media_sources", &["project_id", "media_source_id"])
                .set("project_id", SqlValue::Uuid(request.id))
                .set("media_source_id", SqlValue::Uuid(id)),
        );
    }

    for theme in &request.thematic_areas {
        specs.push(
            UpsertSpec::new("thematic_areas", &["id"])
                .set("id", SqlValue::Uuid(theme.id))
                .set("project_id", SqlValue::Uuid(request.id))
                .set("name", SqlValue::Text(theme.title.clone()))
                .set("description", SqlValue::OptText(theme.description.clone()))
                .set(
                    "monitoring_objectives",
                    SqlValue::Json(serde_json::json!(theme.monitoring_objectives)),
                ),
        );
    }

    Ok(specs)
}

/// Stores the project and scrapes each of its sources once.
pub async fn setup_project(
    scraper: &Scraper,
    request: &ProjectSetupRequest,
) -> Result<ProjectSetupReport, SetupError> {
    let store = scraper.store();

    let mut source_ids = BTreeMap::new();
    for source in &request.media_sources {
        let name = source.name.trim();
        if name.is_empty() {
            return Err(SetupError::Invalid("media source name is empty".to_string()));
        }
        if source_ids.contains_key(name) {
            continue;
        }
        let id = match store.media_source_by_name(name).await? {
            Some(existing) => existing.id,
            None => Uuid::new_v4(),
        };
        source_ids.insert(name.to_string(), id);
    }

    let specs = setup_upserts(request, &source_ids)?;
    store.upsert_all(&specs).await?;
    info!(
        project_id = %request.id,
        sources = source_ids.len(),
        themes = request.thematic_areas.len(),
        "project stored"
    );

    let mut scraping = Vec::new();
    for source in store.sources_for_project(request.id).await? {
        if source.scrape_url().is_none() {
            scraping.push(SetupScrape {
                source: source.name.clone(),
                method: "none",
                result: None,
                error: None,
                reason: Some("No base_url"),
            });
            continue;
        }
        let run = scraper.scrape_for_project(request.id, &source).await;
        scraping.push(SetupScrape {
            source: run.source_name,
            method: run.method.as_str(),
            result: run.outcome,
            error: run.error,
            reason: None,
        });
    }

    Ok(ProjectSetupReport {
        project_id: request.id,
        scraping,
    })
}
