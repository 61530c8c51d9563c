//! AI collaborator used by the analysis pipeline.

mod openai;
pub mod prompts;

use async_trait::async_trait;
use medmon_core::{AiFields, RelevanceVerdict, ThematicArea};
use thiserror::Error;
use uuid::Uuid;

pub use openai::{AiConfig, OpenAiAnalyzer, DEFAULT_MODEL, OPENAI_API_URL};

pub const CRATE_NAME: &str = "medmon-ai";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
    #[error("api key is not a valid header value")]
    InvalidApiKey,
    #[error("ai request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("ai api error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("ai response had no content")]
    EmptyResponse,
    #[error("could not decode ai {what} response: {message}")]
    Decode { what: &'static str, message: String },
}

/// The three judgments the pipeline asks of a language model.
#[async_trait]
pub trait AiAnalyzer: Send + Sync {
    async fn extract_fields(&self, text: &str) -> Result<AiFields, AiError>;

    async fn relevance_check(
        &self,
        project_title: &str,
        project_description: &str,
        article_title: &str,
        article_text: &str,
    ) -> Result<RelevanceVerdict, AiError>;

    /// Ids of the areas the text belongs to; only ids from `themes` are returned.
    async fn classify_themes(
        &self,
        text: &str,
        themes: &[ThematicArea],
    ) -> Result<Vec<Uuid>, AiError>;
}

/// Stand-in used when no API key is configured; every call fails with [`AiError::MissingApiKey`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

#[async_trait]
impl AiAnalyzer for Unconfigured {
    async fn extract_fields(&self, _text: &str) -> Result<AiFields, AiError> {
        Err(AiError::MissingApiKey)
    }

    async fn relevance_check(
        &self,
        _project_title: &str,
        _project_description: &str,
        _article_title: &str,
        _article_text: &str,
    ) -> Result<RelevanceVerdict, AiError> {
        Err(AiError::MissingApiKey)
    }

    async fn classify_themes(
        &self,
        _text: &str,
        _themes: &[ThematicArea],
    ) -> Result<Vec<Uuid>, AiError> {
        Err(AiError::MissingApiKey)
    }
}
