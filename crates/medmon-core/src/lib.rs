//! Core domain model for the media monitoring backend.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "medmon-core";

/// Configured origin (RSS feed or webpage) producing media items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    pub id: Uuid,
    pub name: String,
    /// Media category shown in reports (newspaper, TV, blog, ...).
    #[serde(rename = "type")]
    pub category: Option<String>,
    pub base_url: Option<String>,
}

impl MediaSource {
    /// Base URL with surrounding whitespace removed, `None` when unset or blank.
    pub fn scrape_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub client_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
}

/// Project-defined topical bucket articles are classified against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThematicArea {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub monitoring_objectives: Vec<String>,
}

/// Project plus the denormalized metadata the reporting view needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDetails {
    pub project: Project,
    pub media_sources: Vec<MediaSource>,
    pub thematic_areas: Vec<ThematicArea>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Raw,
    Processing,
    Done,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant `{}`", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for AnalysisStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "raw" => Ok(Self::Raw),
            "processing" => Ok(Self::Processing),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// One stored article. The URL is the global dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: Uuid,
    pub source_id: Uuid,
    pub raw_title: String,
    pub raw_text: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
    pub analysis_status: AnalysisStatus,
}

impl MediaItem {
    /// Text handed to the AI collaborator: the body, or the title when no body was extracted.
    pub fn article_text(&self) -> &str {
        if self.raw_text.trim().is_empty() {
            &self.raw_title
        } else {
            &self.raw_text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItemWithSource {
    #[serde(flatten)]
    pub item: MediaItem,
    pub source_name: String,
}

/// Insert contract from the fetchers into the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMediaItem {
    pub source_id: Uuid,
    pub title: String,
    pub text: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
}

/// Structured fields extracted once per article by the AI collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiFields {
    pub industry_name: String,
    pub industry_tactic: String,
    #[serde(deserialize_with = "string_or_list")]
    pub stakeholders: Vec<String>,
    pub targeted_policy: String,
    pub geographical_focus: String,
    pub outcome_impact: String,
}

impl AiFields {
    pub fn stakeholders_text(&self) -> String {
        self.stakeholders.join(", ")
    }
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Missing(Option<()>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.trim().is_empty() => Vec::new(),
        OneOrMany::One(s) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        OneOrMany::Many(items) => items,
        OneOrMany::Missing(_) => Vec::new(),
    })
}

/// Free-text relevance judgment for one (project, article) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceVerdict {
    pub relevant: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedTheme {
    pub id: Uuid,
    pub name: String,
}

/// Persisted relevance + classification of one item for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub media_item_id: Uuid,
    pub project_id: Uuid,
    pub relevant: bool,
    pub relevance_confidence: f64,
    pub relevance_reason: String,
    pub semantic_area_ids: Vec<Uuid>,
    pub matched_thematic_areas: Vec<MatchedTheme>,
    pub ai_fields: AiFields,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

/// Analysis row joined with display names for the listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisListing {
    #[serde(flatten)]
    pub record: AnalysisRecord,
    pub media_item_title: Option<String>,
    pub project_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMethod {
    Rss,
    Web,
    System,
}

impl ScrapeMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rss => "rss",
            Self::Web => "web",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeStatus {
    Success,
    Error,
}

impl ScrapeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Append-only audit row, one per scrape attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Source id, or `"scheduler"` for loop-level failures.
    pub source_id: String,
    pub source_name: String,
    pub project_id: Option<Uuid>,
    pub method: ScrapeMethod,
    pub new_items: u32,
    pub reused_items: u32,
    pub status: ScrapeStatus,
    pub message: String,
}

impl ScrapeLogEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        project_id: Option<Uuid>,
        method: ScrapeMethod,
        new_items: u32,
        reused_items: u32,
        status: ScrapeStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source_id: source_id.into(),
            source_name: source_name.into(),
            project_id,
            method,
            new_items,
            reused_items,
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedItem {
    pub media_id: Uuid,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// Counts and items produced by a single fetcher run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScrapeOutcome {
    pub new_items: u32,
    pub reused_items: u32,
    pub items: Vec<ScrapedItem>,
}

/// Fetcher chosen for a source, decided by the shape of its URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    Rss,
    Web,
}

impl FetchMethod {
    pub fn for_url(url: &str) -> Self {
        let lower = url.trim().to_ascii_lowercase();
        if lower.ends_with(".xml") || lower.contains("rss") {
            Self::Rss
        } else {
            Self::Web
        }
    }

    pub fn scrape_method(self) -> ScrapeMethod {
        match self {
            Self::Rss => ScrapeMethod::Rss,
            Self::Web => ScrapeMethod::Web,
        }
    }
}
