use std::time::Duration;

use async_trait::async_trait;
use medmon_core::{AiFields, RelevanceVerdict, ThematicArea};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{prompts, AiAnalyzer, AiError};

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENAI_API_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl AiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            model: std::env::var("MEDMON_AI_MODEL").unwrap_or(defaults.model),
            base_url: std::env::var("MEDMON_AI_BASE_URL").unwrap_or(defaults.base_url),
            timeout: defaults.timeout,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// [`AiAnalyzer`] backed by an OpenAI-compatible chat-completions endpoint in JSON mode.
#[derive(Debug, Clone)]
pub struct OpenAiAnalyzer {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiAnalyzer {
    pub fn new(config: AiConfig) -> Result<Self, AiError> {
        let api_key = config.api_key.ok_or(AiError::MissingApiKey)?;
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            api_key,
            model: config.model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn headers(&self) -> Result<HeaderMap, AiError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| AiError::InvalidApiKey)?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn complete_json(&self, system: &str, user: String) -> Result<String, AiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: system.to_string(),
                },
                WireMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        debug!(model = %self.model, "chat completion request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api { status, body });
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AiError::EmptyResponse)
    }
}

#[async_trait]
impl AiAnalyzer for OpenAiAnalyzer {
    async fn extract_fields(&self, text: &str) -> Result<AiFields, AiError> {
        let reply = self
            .complete_json(prompts::EXTRACT_SYSTEM, prompts::extract_user(text))
            .await?;
        prompts::parse_fields(&reply)
    }

    async fn relevance_check(
        &self,
        project_title: &str,
        project_description: &str,
        article_title: &str,
        article_text: &str,
    ) -> Result<RelevanceVerdict, AiError> {
        let reply = self
            .complete_json(
                prompts::RELEVANCE_SYSTEM,
                prompts::relevance_user(project_title, project_description, article_title, article_text),
            )
            .await?;
        prompts::parse_relevance(&reply)
    }

    async fn classify_themes(
        &self,
        text: &str,
        themes: &[ThematicArea],
    ) -> Result<Vec<Uuid>, AiError> {
        if themes.is_empty() {
            return Ok(Vec::new());
        }
        let reply = self
            .complete_json(prompts::CLASSIFY_SYSTEM, prompts::classify_user(text, themes))
            .await?;
        prompts::parse_theme_ids(&reply, themes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyzer_requires_an_api_key() {
        assert!(matches!(
            OpenAiAnalyzer::new(AiConfig::default()),
            Err(AiError::MissingApiKey)
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let analyzer = OpenAiAnalyzer::new(AiConfig {
            api_key: Some("sk-test".into()),
            base_url: "http://localhost:9999/v1/".into(),
            ..AiConfig::default()
        })
        .unwrap();
        assert_eq!(analyzer.base_url, "http://localhost:9999/v1");
        assert_eq!(analyzer.model(), DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn no_themes_means_no_request() {
        let analyzer = OpenAiAnalyzer::new(AiConfig {
            api_key: Some("sk-test".into()),
            base_url: "http://127.0.0.1:1".into(),
            ..AiConfig::default()
        })
        .unwrap();
        assert!(analyzer.classify_themes("text", &[]).await.unwrap().is_empty());
    }
}
