//! Flattens an item and its latest analysis into the row shape served by the reports endpoint.

use medmon_core::{AnalysisRecord, MediaItemWithSource, ProjectDetails};
use serde::Serialize;
use uuid::Uuid;

pub const NO_MATCH_AREA: &str = "AI FOUND NO MATCH";
pub const NO_MATCH_DESCRIPTION: &str = "AI did not classify this article into any thematic area";
pub const UNKNOWN_CATEGORY: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub id: Uuid,
    pub date: String,
    pub title: String,
    pub content: String,
    pub source: String,
    pub media_category: String,
    pub media_format: &'static str,
    pub thematic_area: String,
    pub thematic_description: String,
    pub objectives: Vec<String>,
    pub link: String,
    pub status: &'static str,
}

/// `"video"` for YouTube links, `"article"` for everything else.
pub fn media_format(url: &str) -> &'static str {
    if url.contains("youtube.com") {
        "video"
    } else {
        "article"
    }
}

fn media_category(item: &MediaItemWithSource, project: &ProjectDetails) -> String {
    project
        .media_sources
        .iter()
        .find(|s| s.id == item.item.source_id || s.name == item.source_name)
        .map(|s| s.category.clone().unwrap_or_default())
        .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string())
}

pub fn format_report(
    item: &MediaItemWithSource,
    analysis: &AnalysisRecord,
    project: &ProjectDetails,
) -> ReportRow {
    let (thematic_area, thematic_description, objectives) =
        match analysis.matched_thematic_areas.first() {
            Some(first) => project
                .thematic_areas
                .iter()
                .find(|t| t.id == first.id)
                .map(|t| {
                    (
                        t.name.clone(),
                        t.description.clone().unwrap_or_default(),
                        t.monitoring_objectives.clone(),
                    )
                })
                // the area was matched but has since been removed from the project
                .unwrap_or_default(),
            None => (
                NO_MATCH_AREA.to_string(),
                NO_MATCH_DESCRIPTION.to_string(),
                Vec::new(),
            ),
        };

    ReportRow {
        id: item.item.id,
        date: item.item.scraped_at.to_rfc3339(),
        title: item.item.raw_title.clone(),
        content: item.item.raw_text.clone(),
        source: item.source_name.clone(),
        media_category: media_category(item, project),
        media_format: media_format(&item.item.url),
        thematic_area,
        thematic_description,
        objectives,
        link: item.item.url.clone(),
        status: if analysis.relevant { "Verified" } else { "Unverified" },
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use medmon_core::{
        AiFields, AnalysisStatus, MatchedTheme, MediaItem, MediaSource, Project, ThematicArea,
    };

    use super::*;

    fn project(source_id: Uuid, theme_id: Uuid) -> ProjectDetails {
        let project_id = Uuid::new_v4();
        ProjectDetails {
            project: Project {
                id: project_id,
                client_id: None,
                title: "Alcohol watch".into(),
                description: None,
            },
            media_sources: vec![MediaSource {
                id: source_id,
                name: "Daily Desk".into(),
                category: Some("newspaper".into()),
                base_url: None,
            }],
            thematic_areas: vec![ThematicArea {
                id: theme_id,
                project_id,
                name: "Sponsorship".into(),
                description: Some("Industry sponsorship of events".into()),
                monitoring_objectives: vec!["Track campus deals".into()],
            }],
        }
    }

    fn item(source_id: Uuid, source_name: &str, url: &str) -> MediaItemWithSource {
        MediaItemWithSource {
            item: MediaItem {
                id: Uuid::new_v4(),
                source_id,
                raw_title: "Campus leagues".into(),
                raw_text: "Brewers sponsor campus football.".into(),
                url: url.into(),
                published_at: None,
                scraped_at: Utc::now(),
                analysis_status: AnalysisStatus::Done,
            },
            source_name: source_name.into(),
        }
    }

    fn analysis(relevant: bool, matched: Vec<MatchedTheme>) -> AnalysisRecord {
        AnalysisRecord {
            id: Uuid::new_v4(),
            media_item_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            relevant,
            relevance_confidence: 0.8,
            relevance_reason: String::new(),
            semantic_area_ids: matched.iter().map(|m| m.id).collect(),
            matched_thematic_areas: matched,
            ai_fields: AiFields::default(),
            summary: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn matched_row_uses_first_area_and_source_category() {
        let (source_id, theme_id) = (Uuid::new_v4(), Uuid::new_v4());
        let details = project(source_id, theme_id);
        let item = item(source_id, "Daily Desk", "https://desk.test/story");
        let record = analysis(
            true,
            vec![MatchedTheme {
                id: theme_id,
                name: "Sponsorship".into(),
            }],
        );

        let row = format_report(&item, &record, &details);

        assert_eq!(row.media_category, "newspaper");
        assert_eq!(row.media_format, "article");
        assert_eq!(row.thematic_area, "Sponsorship");
        assert_eq!(row.thematic_description, "Industry sponsorship of events");
        assert_eq!(row.objectives, vec!["Track campus deals".to_string()]);
        assert_eq!(row.status, "Verified");
        assert_eq!(row.link, "https://desk.test/story");
    }

    #[test]
    fn unmatched_row_carries_placeholders() {
        let details = project(Uuid::new_v4(), Uuid::new_v4());
        let item = item(Uuid::new_v4(), "Elsewhere", "https://www.youtube.com/watch?v=x");

        let row = format_report(&item, &analysis(false, vec![]), &details);

        assert_eq!(row.thematic_area, NO_MATCH_AREA);
        assert_eq!(row.thematic_description, NO_MATCH_DESCRIPTION);
        assert!(row.objectives.is_empty());
        assert_eq!(row.media_category, UNKNOWN_CATEGORY);
        assert_eq!(row.media_format, "video");
        assert_eq!(row.status, "Unverified");
    }

    #[test]
    fn category_falls_back_to_source_name_match() {
        let details = project(Uuid::new_v4(), Uuid::new_v4());
        let item = item(Uuid::new_v4(), "Daily Desk", "https://desk.test/a");
        let row = format_report(&item, &analysis(false, vec![]), &details);
        assert_eq!(row.media_category, "newspaper");
    }
}
