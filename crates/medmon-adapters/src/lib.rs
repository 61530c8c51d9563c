//! Parsing of feeds, landing pages, and article bodies into plain records.

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "medmon-adapters";

/// Upper bound on links followed from one landing page.
pub const MAX_PAGE_LINKS: usize = 10;

/// Minimum length for the main-content extraction to be trusted over the fallback.
const MIN_MAIN_CONTENT_CHARS: usize = 50;

const CONTENT_CANDIDATES: &str = "article, main, section, div";
const BOILERPLATE_TAGS: &[&str] = &["nav", "header", "footer", "aside", "form", "script", "style"];

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid selector {selector}: {message}")]
    InvalidSelector { selector: &'static str, message: String },
    #[error("feed parse failed: {0}")]
    Feed(#[from] feed_rs::parser::ParseFeedError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub title: String,
    pub url: String,
}

fn selector(css: &'static str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::InvalidSelector {
        selector: css,
        message: e.to_string(),
    })
}

fn clean_text(el: ElementRef<'_>) -> String {
    el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

fn in_boilerplate(el: ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| BOILERPLATE_TAGS.contains(&a.value().name()))
}

/// Entries of an RSS, Atom, or JSON feed. Entries without a link are dropped.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedEntry>, AdapterError> {
    let feed = feed_rs::parser::parse(bytes)?;
    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.trim().to_string())
                .filter(|href| !href.is_empty())?;
            Some(FeedEntry {
                title: entry
                    .title
                    .map(|t| t.content.trim().to_string())
                    .unwrap_or_default(),
                link,
                published_at: entry.published,
            })
        })
        .collect())
}

fn resolve_href(base_url: &str, href: &str) -> String {
    if let Some(rest) = href.strip_prefix("//") {
        let scheme = base_url.split("://").next().unwrap_or("https");
        format!("{scheme}://{rest}")
    } else if href.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), href)
    } else {
        href.to_string()
    }
}

/// Candidate article links on a landing page, in document order, capped at [`MAX_PAGE_LINKS`].
///
/// Anchors need visible text and a non-fragment href; root-relative hrefs are
/// resolved against `base_url`, everything else is kept verbatim.
pub fn extract_links(html: &str, base_url: &str) -> Result<Vec<PageLink>, AdapterError> {
    let document = Html::parse_document(html);
    let anchors = selector("a[href]")?;
    Ok(document
        .select(&anchors)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            let title = clean_text(a);
            if href.is_empty() || title.is_empty() || href.starts_with('#') {
                return None;
            }
            Some(PageLink {
                title,
                url: resolve_href(base_url, href),
            })
        })
        .take(MAX_PAGE_LINKS)
        .collect())
}

fn content_score(candidate: ElementRef<'_>, paragraphs: &Selector, anchors: &Selector) -> usize {
    let text_len: usize = candidate
        .select(paragraphs)
        .filter(|p| !in_boilerplate(*p))
        .map(|p| clean_text(p).len())
        .sum();
    let link_len: usize = candidate.select(anchors).map(|a| clean_text(a).len()).sum();
    text_len.saturating_sub(link_len / 2)
}

fn main_content_text(document: &Html) -> Result<Option<String>, AdapterError> {
    let candidates = selector(CONTENT_CANDIDATES)?;
    let paragraphs = selector("p")?;
    let anchors = selector("a")?;
    let blocks = selector("p, h1, h2")?;

    let mut best: Option<(usize, ElementRef<'_>)> = None;
    for candidate in document.select(&candidates) {
        if in_boilerplate(candidate) {
            continue;
        }
        let score = content_score(candidate, &paragraphs, &anchors);
        // ties go to the later, more deeply nested container
        if score > 0 && best.map_or(true, |(top, _)| score >= top) {
            best = Some((score, candidate));
        }
    }

    Ok(best.map(|(_, el)| {
        el.select(&blocks)
            .filter(|b| !in_boilerplate(*b))
            .map(clean_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }))
}

fn paragraph_text(document: &Html) -> Result<String, AdapterError> {
    let paragraphs = selector("p")?;
    Ok(document
        .select(&paragraphs)
        .map(clean_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string())
}

/// Readable body text of an article page.
///
/// Picks the container with the most paragraph text and joins its paragraphs and
/// headings with newlines; when that yields too little, falls back to every `<p>`
/// on the page joined with spaces. Never fails: unusable markup yields `""`.
pub fn extract_article_text(html: &str) -> String {
    let document = Html::parse_document(html);
    match main_content_text(&document) {
        Ok(Some(text)) if text.chars().count() > MIN_MAIN_CONTENT_CHARS => text,
        _ => paragraph_text(&document).unwrap_or_default(),
    }
}
