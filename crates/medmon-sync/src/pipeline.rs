//! Per-item analysis: AI extraction once, then relevance and themes per linked project.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use medmon_ai::{AiAnalyzer, AiError};
use medmon_core::{AiFields, AnalysisRecord, AnalysisStatus, MatchedTheme, MediaItemWithSource};
use medmon_storage::{MediaStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("media item {0} not found")]
    NotFound(Uuid),
    #[error("media item {0} is not linked to any project")]
    Unlinked(Uuid),
    #[error("no analysis could be stored for media item {0}")]
    NothingAnalyzed(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ai(#[from] AiError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProjectOutcome {
    Analyzed {
        analysis_id: Uuid,
        relevant: bool,
        ai_relevant: bool,
        confidence: f64,
        reason: String,
        matched_thematic_areas: Vec<MatchedTheme>,
        semantic_area_ids: Vec<Uuid>,
        ai_fields: AiFields,
        summary: String,
    },
    Failed {
        error: String,
    },
    Skipped {
        reason: String,
    },
}

impl ProjectOutcome {
    fn analyzed(record: &AnalysisRecord, ai_relevant: bool) -> Self {
        Self::Analyzed {
            analysis_id: record.id,
            relevant: record.relevant,
            ai_relevant,
            confidence: record.relevance_confidence,
            reason: record.relevance_reason.clone(),
            matched_thematic_areas: record.matched_thematic_areas.clone(),
            semantic_area_ids: record.semantic_area_ids.clone(),
            ai_fields: record.ai_fields.clone(),
            summary: record.summary.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub media_id: Uuid,
    pub final_relevant: bool,
    pub per_project_results: BTreeMap<Uuid, ProjectOutcome>,
}

impl PipelineReport {
    pub fn analyzed_count(&self) -> usize {
        self.per_project_results
            .values()
            .filter(|o| matches!(o, ProjectOutcome::Analyzed { .. }))
            .count()
    }
}

/// Sentence stored with each analysis naming the matched areas, or stating there were none.
pub fn summarize(
    title: &str,
    source_name: &str,
    fields: &AiFields,
    matched: &[MatchedTheme],
) -> String {
    let lead = format!(
        "'{title}' from {source_name} covers {} in {}.",
        fields.industry_name, fields.geographical_focus
    );
    if matched.is_empty() {
        format!("{lead} However, it does not match any thematic areas for this project.")
    } else {
        let names = matched
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{lead} It is relevant to these thematic areas: {names}.")
    }
}

#[derive(Clone)]
pub struct AnalysisPipeline {
    store: Arc<dyn MediaStore>,
    ai: Arc<dyn AiAnalyzer>,
}

impl AnalysisPipeline {
    pub fn new(store: Arc<dyn MediaStore>, ai: Arc<dyn AiAnalyzer>) -> Self {
        Self { store, ai }
    }

    /// Analyzes one item against every project it is linked to.
    ///
    /// The item ends `done` when at least one analysis row was stored and `failed`
    /// otherwise. A failing project does not stop the others.
    pub async fn process(&self, media_id: Uuid) -> Result<PipelineReport, PipelineError> {
        let span = info_span!("analyze_item", %media_id);
        async move {
            self.mark(media_id, AnalysisStatus::Processing).await;
            match self.analyze(media_id).await {
                Ok(report) => {
                    self.mark(media_id, AnalysisStatus::Done).await;
                    info!(
                        final_relevant = report.final_relevant,
                        analyzed = report.analyzed_count(),
                        projects = report.per_project_results.len(),
                        "analysis complete"
                    );
                    Ok(report)
                }
                Err(err) => {
                    self.mark(media_id, AnalysisStatus::Failed).await;
                    error!(error = %err, "analysis failed");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn mark(&self, media_id: Uuid, status: AnalysisStatus) {
        if let Err(err) = self.store.set_status(media_id, status).await {
            warn!(%media_id, %status, error = %err, "could not update analysis status");
        }
    }

    async fn analyze(&self, media_id: Uuid) -> Result<PipelineReport, PipelineError> {
        let item = self
            .store
            .item_with_source(media_id)
            .await?
            .ok_or(PipelineError::NotFound(media_id))?;

        let projects = self.store.linked_projects(media_id).await?;
        if projects.is_empty() {
            return Err(PipelineError::Unlinked(media_id));
        }

        let text = item.item.article_text().to_string();
        let fields = self.ai.extract_fields(&text).await?;

        let mut report = PipelineReport {
            media_id,
            final_relevant: false,
            per_project_results: BTreeMap::new(),
        };

        for project_id in projects {
            let outcome = match self.analyze_project(&item, &text, &fields, project_id).await {
                Ok(Some((record, ai_relevant))) => {
                    report.final_relevant |= record.relevant;
                    ProjectOutcome::analyzed(&record, ai_relevant)
                }
                Ok(None) => {
                    warn!(%project_id, "linked project not found; skipping");
                    ProjectOutcome::Skipped {
                        reason: "project not found".to_string(),
                    }
                }
                Err(err) => {
                    warn!(%project_id, error = %err, "project analysis failed");
                    ProjectOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            };
            report.per_project_results.insert(project_id, outcome);
        }

        if report.analyzed_count() == 0 {
            return Err(PipelineError::NothingAnalyzed(media_id));
        }
        Ok(report)
    }

    async fn analyze_project(
        &self,
        item: &MediaItemWithSource,
        text: &str,
        fields: &AiFields,
        project_id: Uuid,
    ) -> Result<Option<(AnalysisRecord, bool)>, PipelineError> {
        let Some(project) = self.store.project(project_id).await? else {
            return Ok(None);
        };

        let verdict = self
            .ai
            .relevance_check(
                &project.title,
                project.description.as_deref().unwrap_or(""),
                &item.item.raw_title,
                text,
            )
            .await?;

        let themes = self.store.thematic_areas(project_id).await?;
        let matched_ids = if themes.is_empty() {
            Vec::new()
        } else {
            self.ai.classify_themes(text, &themes).await?
        };

        let mut matched: Vec<MatchedTheme> = Vec::new();
        for id in matched_ids {
            if matched.iter().any(|m| m.id == id) {
                continue;
            }
            if let Some(theme) = themes.iter().find(|t| t.id == id) {
                matched.push(MatchedTheme {
                    id: theme.id,
                    name: theme.name.clone(),
                });
            }
        }

        let record = AnalysisRecord {
            id: Uuid::new_v4(),
            media_item_id: item.item.id,
            project_id,
            relevant: verdict.relevant && !matched.is_empty(),
            relevance_confidence: verdict.confidence,
            relevance_reason: verdict.reason,
            semantic_area_ids: matched.iter().map(|m| m.id).collect(),
            summary: summarize(&item.item.raw_title, &item.source_name, fields, &matched),
            matched_thematic_areas: matched,
            ai_fields: fields.clone(),
            created_at: Utc::now(),
        };
        self.store.insert_analysis(&record).await?;
        Ok(Some((record, verdict.relevant)))
    }
}
