//! In-process [`MediaStore`] with the same dedup and linking rules as the Postgres schema.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use medmon_core::{
    AnalysisListing, AnalysisRecord, AnalysisStatus, Client, MediaItem, MediaItemWithSource,
    MediaSource, NewMediaItem, Project, ScrapeLogEntry, ThematicArea,
};
use uuid::Uuid;

use crate::store::{
    InsertOutcome, MediaStore, SqlValue, StoreError, StoreResult, UpsertSpec,
};

#[derive(Debug, Default, Clone)]
struct State {
    clients: BTreeMap<Uuid, Client>,
    projects: BTreeMap<Uuid, Project>,
    sources: BTreeMap<Uuid, MediaSource>,
    project_sources: BTreeSet<(Uuid, Uuid)>,
    themes: BTreeMap<Uuid, ThematicArea>,
    items: Vec<MediaItem>,
    project_items: BTreeSet<(Uuid, Uuid)>,
    analyses: Vec<AnalysisRecord>,
    scrape_logs: Vec<ScrapeLogEntry>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: Mutex<bool>,
    failing_source_listing: Mutex<bool>,
    failing_analysis_projects: Mutex<HashSet<Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, State>> {
        if *self.unavailable.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(StoreError::Unavailable {
                attempts: 1,
                last_error: "memory store marked unavailable".to_string(),
            });
        }
        Ok(self.state.lock().unwrap_or_else(|p| p.into_inner()))
    }

    /// Makes every call fail as if the database pool were exhausted.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap_or_else(|p| p.into_inner()) = unavailable;
    }

    /// Fails source listing only; every other call keeps working.
    pub fn fail_source_listing(&self, failing: bool) {
        *self.failing_source_listing.lock().unwrap_or_else(|p| p.into_inner()) = failing;
    }

    /// Rejects analysis inserts for one project.
    pub fn fail_analysis_for(&self, project_id: Uuid) {
        self.failing_analysis_projects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(project_id);
    }

    pub fn add_project(&self, title: &str, description: &str) -> Uuid {
        let id = Uuid::new_v4();
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.projects.insert(
            id,
            Project {
                id,
                client_id: None,
                title: title.to_string(),
                description: Some(description.to_string()),
            },
        );
        id
    }

    pub fn add_source(&self, name: &str, category: Option<&str>, base_url: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.sources.insert(
            id,
            MediaSource {
                id,
                name: name.to_string(),
                category: category.map(str::to_string),
                base_url: base_url.map(str::to_string),
            },
        );
        id
    }

    pub fn subscribe(&self, project_id: Uuid, source_id: Uuid) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.project_sources.insert((project_id, source_id));
    }

    pub fn add_theme(&self, project_id: Uuid, name: &str, objectives: &[&str]) -> Uuid {
        let id = Uuid::new_v4();
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.themes.insert(
            id,
            ThematicArea {
                id,
                project_id,
                name: name.to_string(),
                description: Some(format!("{name} coverage")),
                monitoring_objectives: objectives.iter().map(|o| o.to_string()).collect(),
            },
        );
        id
    }

    pub fn items(&self) -> Vec<MediaItem> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).items.clone()
    }

    pub fn item(&self, id: Uuid) -> Option<MediaItem> {
        self.items().into_iter().find(|item| item.id == id)
    }

    pub fn analyses(&self) -> Vec<AnalysisRecord> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).analyses.clone()
    }

    pub fn scrape_logs(&self) -> Vec<ScrapeLogEntry> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).scrape_logs.clone()
    }

    pub fn clients(&self) -> Vec<Client> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clients
            .values()
            .cloned()
            .collect()
    }

    pub fn is_linked(&self, project_id: Uuid, item_id: Uuid) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .project_items
            .contains(&(project_id, item_id))
    }
}

fn with_source(state: &State, item: &MediaItem) -> MediaItemWithSource {
    MediaItemWithSource {
        item: item.clone(),
        source_name: state
            .sources
            .get(&item.source_id)
            .map(|s| s.name.clone())
            .unwrap_or_default(),
    }
}

fn uuid_of(spec: &UpsertSpec, column: &'static str) -> StoreResult<Uuid> {
    spec.require(column)?
        .as_uuid()
        .ok_or(StoreError::Decode {
            column,
            message: format!("expected uuid for {}.{column}", spec.table),
        })
}

fn text_of(spec: &UpsertSpec, column: &'static str) -> Option<String> {
    spec.value(column).and_then(SqlValue::as_text).map(str::to_string)
}

fn updates(spec: &UpsertSpec, column: &str) -> bool {
    spec.update_columns().contains(&column)
}

fn apply_upsert(state: &mut State, spec: &UpsertSpec) -> StoreResult<u64> {
    match spec.table {
        "clients" => {
            let id = uuid_of(spec, "id")?;
            let incoming = Client {
                id,
                name: text_of(spec, "name").unwrap_or_default(),
                contact_email: text_of(spec, "contact_email"),
            };
            match state.clients.get_mut(&id) {
                Some(existing) => {
                    if updates(spec, "name") {
                        existing.name = incoming.name;
                    }
                    if updates(spec, "contact_email") {
                        existing.contact_email = incoming.contact_email;
                    }
                }
                None => {
                    state.clients.insert(id, incoming);
                }
            }
            Ok(1)
        }
        "projects" => {
            let id = uuid_of(spec, "id")?;
            let client_id = spec.value("client_id").and_then(SqlValue::as_uuid);
            let incoming = Project {
                id,
                client_id,
                title: text_of(spec, "title").unwrap_or_default(),
                description: text_of(spec, "description"),
            };
            match state.projects.get_mut(&id) {
                Some(existing) => {
                    if updates(spec, "client_id") {
                        existing.client_id = incoming.client_id;
                    }
                    if updates(spec, "title") {
                        existing.title = incoming.title;
                    }
                    if updates(spec, "description") {
                        existing.description = incoming.description;
                    }
                }
                None => {
                    state.projects.insert(id, incoming);
                }
            }
            Ok(1)
        }
        "media_sources" => {
            let name = text_of(spec, "name").ok_or(StoreError::MissingColumn {
                table: spec.table,
                column: "name",
            })?;
            let existing = state.sources.values_mut().find(|s| s.name == name);
            match existing {
                Some(source) => {
                    if updates(spec, "type") {
                        source.category = text_of(spec, "type");
                    }
                    if updates(spec, "base_url") {
                        source.base_url = text_of(spec, "base_url");
                    }
                }
                None => {
                    let id = uuid_of(spec, "id")?;
                    state.sources.insert(
                        id,
                        MediaSource {
                            id,
                            name,
                            category: text_of(spec, "type"),
                            base_url: text_of(spec, "base_url"),
                        },
                    );
                }
            }
            Ok(1)
        }
        "project_media_sources" => {
            let pair = (
                uuid_of(spec, "project_id")?,
                uuid_of(spec, "media_source_id")?,
            );
            Ok(u64::from(state.project_sources.insert(pair)))
        }
        "thematic_areas" => {
            let id = uuid_of(spec, "id")?;
            let objectives = match spec.value("monitoring_objectives") {
                Some(SqlValue::Json(value)) => serde_json::from_value(value.clone()).map_err(|e| {
                    StoreError::Decode {
                        column: "monitoring_objectives",
                        message: e.to_string(),
                    }
                })?,
                _ => Vec::new(),
            };
            state.themes.insert(
                id,
                ThematicArea {
                    id,
                    project_id: uuid_of(spec, "project_id")?,
                    name: text_of(spec, "name").unwrap_or_default(),
                    description: text_of(spec, "description"),
                    monitoring_objectives: objectives,
                },
            );
            Ok(1)
        }
        other => Err(StoreError::UnsupportedTable(other.to_string())),
    }
}

#[async_trait]
impl MediaStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.state().map(|_| ())
    }

    async fn scrapable_sources(&self) -> StoreResult<Vec<MediaSource>> {
        if *self.failing_source_listing.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(StoreError::Decode {
                column: "base_url",
                message: "source listing rejected".to_string(),
            });
        }
        let state = self.state()?;
        let mut sources = state
            .sources
            .values()
            .filter(|s| s.scrape_url().is_some())
            .cloned()
            .collect::<Vec<_>>();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sources)
    }

    async fn media_source(&self, id: Uuid) -> StoreResult<Option<MediaSource>> {
        Ok(self.state()?.sources.get(&id).cloned())
    }

    async fn media_source_by_name(&self, name: &str) -> StoreResult<Option<MediaSource>> {
        Ok(self
            .state()?
            .sources
            .values()
            .find(|s| s.name == name)
            .cloned())
    }

    async fn projects_for_source(&self, source_id: Uuid) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .state()?
            .project_sources
            .iter()
            .filter(|(_, sid)| *sid == source_id)
            .map(|(pid, _)| *pid)
            .collect())
    }

    async fn sources_for_project(&self, project_id: Uuid) -> StoreResult<Vec<MediaSource>> {
        let state = self.state()?;
        let mut sources = state
            .project_sources
            .iter()
            .filter(|(pid, _)| *pid == project_id)
            .filter_map(|(_, sid)| state.sources.get(sid).cloned())
            .collect::<Vec<_>>();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sources)
    }

    async fn find_item_id_by_url(&self, url: &str) -> StoreResult<Option<Uuid>> {
        Ok(self
            .state()?
            .items
            .iter()
            .find(|item| item.url == url)
            .map(|item| item.id))
    }

    async fn insert_item(&self, item: &NewMediaItem) -> StoreResult<InsertOutcome> {
        let mut state = self.state()?;
        if let Some(existing) = state.items.iter().find(|i| i.url == item.url) {
            return Ok(InsertOutcome::Existing(existing.id));
        }
        let id = Uuid::new_v4();
        state.items.push(MediaItem {
            id,
            source_id: item.source_id,
            raw_title: item.title.clone(),
            raw_text: item.text.clone(),
            url: item.url.clone(),
            published_at: item.published_at,
            scraped_at: item.scraped_at,
            analysis_status: AnalysisStatus::Raw,
        });
        Ok(InsertOutcome::Created(id))
    }

    async fn link_item(&self, project_id: Uuid, item_id: Uuid) -> StoreResult<()> {
        self.state()?.project_items.insert((project_id, item_id));
        Ok(())
    }

    async fn set_status(&self, item_id: Uuid, status: AnalysisStatus) -> StoreResult<()> {
        let mut state = self.state()?;
        if let Some(item) = state.items.iter_mut().find(|i| i.id == item_id) {
            item.analysis_status = status;
        }
        Ok(())
    }

    async fn item_with_source(&self, item_id: Uuid) -> StoreResult<Option<MediaItemWithSource>> {
        let state = self.state()?;
        Ok(state
            .items
            .iter()
            .find(|i| i.id == item_id)
            .map(|item| with_source(&state, item)))
    }

    async fn linked_projects(&self, item_id: Uuid) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .state()?
            .project_items
            .iter()
            .filter(|(_, iid)| *iid == item_id)
            .map(|(pid, _)| *pid)
            .collect())
    }

    async fn claim_next_raw_item(&self) -> StoreResult<Option<Uuid>> {
        let mut state = self.state()?;
        let next = state
            .items
            .iter_mut()
            .filter(|i| i.analysis_status == AnalysisStatus::Raw)
            .min_by_key(|i| i.scraped_at);
        Ok(next.map(|item| {
            item.analysis_status = AnalysisStatus::Processing;
            item.id
        }))
    }

    async fn project_items(&self, project_id: Uuid) -> StoreResult<Vec<MediaItemWithSource>> {
        let state = self.state()?;
        let mut items = state
            .items
            .iter()
            .filter(|i| state.project_items.contains(&(project_id, i.id)))
            .map(|i| with_source(&state, i))
            .collect::<Vec<_>>();
        items.sort_by(|a, b| b.item.scraped_at.cmp(&a.item.scraped_at));
        Ok(items)
    }

    async fn project(&self, id: Uuid) -> StoreResult<Option<Project>> {
        Ok(self.state()?.projects.get(&id).cloned())
    }

    async fn thematic_areas(&self, project_id: Uuid) -> StoreResult<Vec<ThematicArea>> {
        let mut themes = self
            .state()?
            .themes
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect::<Vec<_>>();
        themes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(themes)
    }

    async fn insert_analysis(&self, record: &AnalysisRecord) -> StoreResult<()> {
        let failing = self
            .failing_analysis_projects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&record.project_id);
        if failing {
            return Err(StoreError::Decode {
                column: "ai_fields",
                message: "analysis insert rejected".to_string(),
            });
        }
        self.state()?.analyses.push(record.clone());
        Ok(())
    }

    async fn latest_analysis(
        &self,
        item_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<Option<AnalysisRecord>> {
        Ok(self
            .state()?
            .analyses
            .iter()
            .filter(|a| a.media_item_id == item_id && a.project_id == project_id)
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn list_analyses(&self) -> StoreResult<Vec<AnalysisListing>> {
        let state = self.state()?;
        let mut rows = state
            .analyses
            .iter()
            .map(|record| AnalysisListing {
                record: record.clone(),
                media_item_title: state
                    .items
                    .iter()
                    .find(|i| i.id == record.media_item_id)
                    .map(|i| i.raw_title.clone()),
                project_name: state.projects.get(&record.project_id).map(|p| p.title.clone()),
            })
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));
        Ok(rows)
    }

    async fn append_scrape_log(&self, entry: &ScrapeLogEntry) -> StoreResult<()> {
        self.state()?.scrape_logs.push(entry.clone());
        Ok(())
    }

    async fn upsert_all(&self, specs: &[UpsertSpec]) -> StoreResult<u64> {
        let mut state = self.state()?;
        let mut draft = state.clone();
        let mut affected = 0;
        for spec in specs {
            affected += apply_upsert(&mut draft, spec)?;
        }
        *state = draft;
        Ok(affected)
    }
}
