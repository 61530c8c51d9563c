//! Prompt text and tolerant decoding of model replies.

use medmon_core::{AiFields, RelevanceVerdict, ThematicArea};
use serde::Deserialize;
use uuid::Uuid;

use crate::AiError;

/// Articles are cut to this many characters before being sent.
pub const MAX_ARTICLE_CHARS: usize = 6000;

pub const EXTRACT_SYSTEM: &str = "You analyse news articles for a public-health media monitoring team. \
Reply with a single JSON object with the string keys industry_name, industry_tactic, \
targeted_policy, geographical_focus, outcome_impact and a list of strings under stakeholders. \
Use an empty string or empty list when the article says nothing about a field.";

pub const RELEVANCE_SYSTEM: &str = "You decide whether a news article is relevant to a monitoring project. \
Reply with a single JSON object: {\"relevant\": bool, \"confidence\": number between 0 and 1, \
\"reason\": short explanation}.";

pub const CLASSIFY_SYSTEM: &str = "You classify news articles into a project's thematic areas. \
Reply with a single JSON object: {\"matched_ids\": [ids of every area the article clearly belongs to]}. \
Use only ids from the list you are given; reply with an empty list when none apply.";

pub fn truncate(text: &str) -> &str {
    match text.char_indices().nth(MAX_ARTICLE_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn extract_user(text: &str) -> String {
    format!("Article:\n{}", truncate(text))
}

pub fn relevance_user(
    project_title: &str,
    project_description: &str,
    article_title: &str,
    article_text: &str,
) -> String {
    format!(
        "Project: {project_title}\nProject description: {project_description}\n\n\
         Article title: {article_title}\nArticle:\n{}",
        truncate(article_text)
    )
}

pub fn classify_user(text: &str, themes: &[ThematicArea]) -> String {
    let mut out = String::from("Thematic areas:\n");
    for theme in themes {
        out.push_str(&format!(
            "- id: {} | name: {} | description: {}",
            theme.id,
            theme.name,
            theme.description.as_deref().unwrap_or("")
        ));
        if !theme.monitoring_objectives.is_empty() {
            out.push_str(&format!(" | objectives: {}", theme.monitoring_objectives.join("; ")));
        }
        out.push('\n');
    }
    out.push_str(&format!("\nArticle:\n{}", truncate(text)));
    out
}

/// Strips a surrounding markdown code fence, which some models add despite JSON mode.
fn json_body(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn decode<T: for<'de> Deserialize<'de>>(what: &'static str, reply: &str) -> Result<T, AiError> {
    serde_json::from_str(json_body(reply)).map_err(|e| AiError::Decode {
        what,
        message: e.to_string(),
    })
}

pub fn parse_fields(reply: &str) -> Result<AiFields, AiError> {
    decode("fields", reply)
}

pub fn parse_relevance(reply: &str) -> Result<RelevanceVerdict, AiError> {
    let mut verdict: RelevanceVerdict = decode("relevance", reply)?;
    verdict.confidence = verdict.confidence.clamp(0.0, 1.0);
    Ok(verdict)
}

#[derive(Debug, Deserialize)]
struct ThemeReply {
    #[serde(default)]
    matched_ids: Vec<String>,
}

/// Matched ids in the order the areas were listed; unknown or malformed ids are dropped.
pub fn parse_theme_ids(reply: &str, themes: &[ThematicArea]) -> Result<Vec<Uuid>, AiError> {
    let parsed: ThemeReply = decode("classification", reply)?;
    let matched = parsed
        .matched_ids
        .iter()
        .filter_map(|id| id.trim().parse::<Uuid>().ok())
        .collect::<Vec<_>>();
    Ok(themes
        .iter()
        .map(|t| t.id)
        .filter(|id| matched.contains(id))
        .collect())
}
