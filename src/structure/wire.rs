//! Payloads exchanged with the sidecar. Field names follow its camelCase JSON.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerLesson {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub video: Option<String>,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerChapter {
    pub id: String,
    pub title: String,
    pub position: i64,
    #[serde(default)]
    pub lessons: Vec<ServerLesson>,
}

/// The subset of `course.get` the structure editor needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseStructure {
    pub id: String,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub chapters: Vec<ServerChapter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: String,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderChaptersInput {
    pub course_id: String,
    pub chapters: Vec<PositionUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderLessonsInput {
    pub course_id: String,
    pub chapter_id: String,
    pub lessons: Vec<PositionUpdate>,
}
