//! Scripted collaborators for exercising the pipeline without network or model access.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use medmon_ai::{AiAnalyzer, AiError};
use medmon_core::{AiFields, RelevanceVerdict, ThematicArea};
use medmon_storage::{FetchError, FetchedResponse, PageFetcher};
use uuid::Uuid;

/// Serves canned bodies by URL; unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    pages: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, body: &str) -> Self {
        self.set_page(url, body);
        self
    }

    pub fn set_page(&self, url: &str, body: &str) {
        self.pages
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(url.to_string(), body.to_string());
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, _source_key: &str, url: &str) -> Result<FetchedResponse, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(url.to_string());
        let page = self
            .pages
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(url)
            .cloned();
        match page {
            Some(body) => Ok(FetchedResponse {
                status: 200,
                final_url: url.to_string(),
                body: body.into_bytes(),
            }),
            None => Err(FetchError::HttpStatus {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

/// Deterministic [`AiAnalyzer`]: relevance and theme matches are keyed by project title
/// and theme name.
#[derive(Debug, Default)]
pub struct ScriptedAnalyzer {
    fields: AiFields,
    relevant_projects: HashSet<String>,
    failing_projects: HashSet<String>,
    matching_themes: HashSet<String>,
    fail_extraction: bool,
}

impl ScriptedAnalyzer {
    pub fn new(fields: AiFields) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    pub fn relevant_for(mut self, project_title: &str) -> Self {
        self.relevant_projects.insert(project_title.to_string());
        self
    }

    pub fn failing_for(mut self, project_title: &str) -> Self {
        self.failing_projects.insert(project_title.to_string());
        self
    }

    pub fn matching(mut self, theme_name: &str) -> Self {
        self.matching_themes.insert(theme_name.to_string());
        self
    }

    pub fn failing_extraction(mut self) -> Self {
        self.fail_extraction = true;
        self
    }
}

#[async_trait]
impl AiAnalyzer for ScriptedAnalyzer {
    async fn extract_fields(&self, _text: &str) -> Result<AiFields, AiError> {
        if self.fail_extraction {
            return Err(AiError::EmptyResponse);
        }
        Ok(self.fields.clone())
    }

    async fn relevance_check(
        &self,
        project_title: &str,
        _project_description: &str,
        _article_title: &str,
        _article_text: &str,
    ) -> Result<RelevanceVerdict, AiError> {
        if self.failing_projects.contains(project_title) {
            return Err(AiError::Api {
                status: 500,
                body: "scripted failure".to_string(),
            });
        }
        let relevant = self.relevant_projects.contains(project_title);
        Ok(RelevanceVerdict {
            relevant,
            confidence: if relevant { 0.9 } else { 0.1 },
            reason: format!("scripted verdict for {project_title}"),
        })
    }

    async fn classify_themes(
        &self,
        _text: &str,
        themes: &[ThematicArea],
    ) -> Result<Vec<Uuid>, AiError> {
        Ok(themes
            .iter()
            .filter(|t| self.matching_themes.contains(&t.name))
            .map(|t| t.id)
            .collect())
    }
}
