//! Persistence seam shared by the fetchers, the analysis pipeline, and the web layer.

use async_trait::async_trait;
use medmon_core::{
    AnalysisListing, AnalysisRecord, AnalysisStatus, MediaItemWithSource, MediaSource,
    NewMediaItem, Project, ProjectDetails, ScrapeLogEntry, ThematicArea,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database unavailable after {attempts} attempts: {last_error}")]
    Unavailable { attempts: usize, last_error: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("could not decode column {column}: {message}")]
    Decode { column: &'static str, message: String },
    #[error("unsupported upsert target {0}")]
    UnsupportedTable(String),
    #[error("missing value for column {column} in upsert into {table}")]
    MissingColumn { table: &'static str, column: &'static str },
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of inserting a media item; a URL collision yields the existing id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(Uuid),
    Existing(Uuid),
}

impl InsertOutcome {
    pub fn id(self) -> Uuid {
        match self {
            Self::Created(id) | Self::Existing(id) => id,
        }
    }

    pub fn is_created(self) -> bool {
        matches!(self, Self::Created(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Uuid(Uuid),
    OptUuid(Option<Uuid>),
    Text(String),
    OptText(Option<String>),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(id) => Some(*id),
            Self::OptUuid(id) => *id,
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::OptText(s) => s.as_deref(),
            _ => None,
        }
    }
}

/// Insert-or-update of one row, keyed by `key` columns.
///
/// Non-key columns (except `id`) are overwritten on conflict; when there are none
/// the conflict is ignored, which makes join-table inserts idempotent.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertSpec {
    pub table: &'static str,
    pub key: &'static [&'static str],
    pub values: Vec<(&'static str, SqlValue)>,
}

impl UpsertSpec {
    pub fn new(table: &'static str, key: &'static [&'static str]) -> Self {
        Self {
            table,
            key,
            values: Vec::new(),
        }
    }

    pub fn set(mut self, column: &'static str, value: SqlValue) -> Self {
        self.values.push((column, value));
        self
    }

    pub fn value(&self, column: &str) -> Option<&SqlValue> {
        self.values
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    pub fn require(&self, column: &'static str) -> StoreResult<&SqlValue> {
        self.value(column).ok_or(StoreError::MissingColumn {
            table: self.table,
            column,
        })
    }

    pub fn update_columns(&self) -> Vec<&'static str> {
        self.values
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| *name != "id" && !self.key.contains(name))
            .collect()
    }

    /// Postgres statement text; placeholders follow the order of `values`.
    pub fn to_sql(&self) -> String {
        let columns = self
            .values
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();
        let placeholders = (1..=columns.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>();
        let update = self.update_columns();
        let conflict = if update.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!(
                "DO UPDATE SET {}",
                update
                    .iter()
                    .map(|c| format!("{c} = EXCLUDED.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
            self.table,
            columns.join(", "),
            placeholders.join(", "),
            self.key.join(", "),
            conflict
        )
    }
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    /// Sources with a non-empty base URL, ordered by name.
    async fn scrapable_sources(&self) -> StoreResult<Vec<MediaSource>>;
    async fn media_source(&self, id: Uuid) -> StoreResult<Option<MediaSource>>;
    async fn media_source_by_name(&self, name: &str) -> StoreResult<Option<MediaSource>>;
    async fn projects_for_source(&self, source_id: Uuid) -> StoreResult<Vec<Uuid>>;
    async fn sources_for_project(&self, project_id: Uuid) -> StoreResult<Vec<MediaSource>>;

    async fn find_item_id_by_url(&self, url: &str) -> StoreResult<Option<Uuid>>;
    async fn insert_item(&self, item: &NewMediaItem) -> StoreResult<InsertOutcome>;
    /// Idempotent: linking an already-linked pair is a no-op.
    async fn link_item(&self, project_id: Uuid, item_id: Uuid) -> StoreResult<()>;
    async fn set_status(&self, item_id: Uuid, status: AnalysisStatus) -> StoreResult<()>;
    async fn item_with_source(&self, item_id: Uuid) -> StoreResult<Option<MediaItemWithSource>>;
    async fn linked_projects(&self, item_id: Uuid) -> StoreResult<Vec<Uuid>>;
    /// Moves the oldest `raw` item (by scrape time) to `processing` and returns its id.
    ///
    /// Atomic: concurrent callers never claim the same item.
    async fn claim_next_raw_item(&self) -> StoreResult<Option<Uuid>>;
    /// Items linked to a project, newest scrape first.
    async fn project_items(&self, project_id: Uuid) -> StoreResult<Vec<MediaItemWithSource>>;

    async fn project(&self, id: Uuid) -> StoreResult<Option<Project>>;
    async fn thematic_areas(&self, project_id: Uuid) -> StoreResult<Vec<ThematicArea>>;

    async fn project_details(&self, project_id: Uuid) -> StoreResult<Option<ProjectDetails>> {
        let Some(project) = self.project(project_id).await? else {
            return Ok(None);
        };
        let media_sources = self.sources_for_project(project_id).await?;
        let thematic_areas = self.thematic_areas(project_id).await?;
        Ok(Some(ProjectDetails {
            project,
            media_sources,
            thematic_areas,
        }))
    }

    async fn insert_analysis(&self, record: &AnalysisRecord) -> StoreResult<()>;
    async fn latest_analysis(
        &self,
        item_id: Uuid,
        project_id: Uuid,
    ) -> StoreResult<Option<AnalysisRecord>>;
    /// Every analysis row, newest first.
    async fn list_analyses(&self) -> StoreResult<Vec<AnalysisListing>>;

    async fn append_scrape_log(&self, entry: &ScrapeLogEntry) -> StoreResult<()>;

    /// Applies all upserts atomically; returns the number of affected rows.
    async fn upsert_all(&self, specs: &[UpsertSpec]) -> StoreResult<u64>;
}
