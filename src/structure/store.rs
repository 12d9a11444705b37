//! Client-held view of a course's chapters and lessons.
//!
//! The store owns display order. It is derived from the last known server
//! state and only diverges from it while an optimistic reorder is in flight.

use std::collections::HashMap;

use crate::structure::wire::{ServerChapter, ServerLesson};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonItem {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub video: Option<String>,
    pub position: i64,
}

impl From<&ServerLesson> for LessonItem {
    fn from(l: &ServerLesson) -> Self {
        Self {
            id: l.id.clone(),
            title: l.title.clone(),
            description: l.description.clone(),
            thumbnail: l.thumbnail.clone(),
            video: l.video.clone(),
            position: l.position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterItem {
    pub id: String,
    pub title: String,
    pub position: i64,
    /// Expanded in the editor. Local only, never persisted.
    pub is_open: bool,
    pub lessons: Vec<LessonItem>,
}

/// Maps server chapters 1:1 into local items, keeping each chapter's
/// `is_open` flag from `previous` when the id matches. New chapters start open.
pub fn build(server: &[ServerChapter], previous: &[ChapterItem]) -> Vec<ChapterItem> {
    let open_by_id: HashMap<&str, bool> = previous
        .iter()
        .map(|c| (c.id.as_str(), c.is_open))
        .collect();
    server
        .iter()
        .map(|c| ChapterItem {
            id: c.id.clone(),
            title: c.title.clone(),
            position: c.position,
            is_open: open_by_id.get(c.id.as_str()).copied().unwrap_or(true),
            lessons: c.lessons.iter().map(LessonItem::from).collect(),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructureStore {
    chapters: Vec<ChapterItem>,
}

impl StructureStore {
    pub fn new(server: &[ServerChapter]) -> Self {
        Self {
            chapters: build(server, &[]),
        }
    }

    pub fn chapters(&self) -> &[ChapterItem] {
        &self.chapters
    }

    pub fn chapter(&self, chapter_id: &str) -> Option<&ChapterItem> {
        self.chapters.iter().find(|c| c.id == chapter_id)
    }

    pub fn chapter_index(&self, chapter_id: &str) -> Option<usize> {
        self.chapters.iter().position(|c| c.id == chapter_id)
    }

    /// Flips the chapter's expanded flag. Unknown ids are ignored.
    pub fn toggle_chapter_open(&mut self, chapter_id: &str) {
        if let Some(chapter) = self.chapters.iter_mut().find(|c| c.id == chapter_id) {
            chapter.is_open = !chapter.is_open;
        }
    }

    pub fn replace_all(&mut self, chapters: Vec<ChapterItem>) {
        self.chapters = chapters;
    }

    /// Re-derives the store from fresh server data, e.g. after a refetch.
    pub fn rebuild(&mut self, server: &[ServerChapter]) {
        let next = build(server, &self.chapters);
        self.replace_all(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson(id: &str, position: i64) -> ServerLesson {
        ServerLesson {
            id: id.to_string(),
            title: format!("Lesson {}", id),
            description: None,
            thumbnail: None,
            video: Some(format!("videos/{}.mp4", id)),
            position,
        }
    }

    fn chapter(id: &str, position: i64, lessons: Vec<ServerLesson>) -> ServerChapter {
        ServerChapter {
            id: id.to_string(),
            title: format!("Chapter {}", id),
            position,
            lessons,
        }
    }

    #[test]
    fn build_defaults_to_open_and_keeps_order() {
        let server = vec![
            chapter("a", 1, vec![lesson("l1", 1), lesson("l2", 2)]),
            chapter("b", 2, vec![]),
        ];
        let items = build(&server, &[]);
        assert_eq!(
            items.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert!(items.iter().all(|c| c.is_open));
        assert_eq!(items[0].lessons[1].video.as_deref(), Some("videos/l2.mp4"));
    }

    #[test]
    fn rebuild_preserves_open_flag_by_id() {
        let mut store = StructureStore::new(&[chapter("a", 1, vec![]), chapter("b", 2, vec![])]);
        store.toggle_chapter_open("b");

        store.rebuild(&[
            chapter("c", 1, vec![]),
            chapter("b", 2, vec![lesson("l9", 1)]),
            chapter("a", 3, vec![]),
        ]);
        let open: Vec<(&str, bool)> = store
            .chapters()
            .iter()
            .map(|c| (c.id.as_str(), c.is_open))
            .collect();
        assert_eq!(open, vec![("c", true), ("b", false), ("a", true)]);
        assert_eq!(store.chapter("b").map(|c| c.lessons.len()), Some(1));
    }

    #[test]
    fn toggle_touches_only_the_flag() {
        let server = vec![chapter("a", 1, vec![lesson("l1", 1)]), chapter("b", 2, vec![])];
        let mut store = StructureStore::new(&server);
        let before = store.clone();

        store.toggle_chapter_open("a");
        store.toggle_chapter_open("missing");

        for (after, prior) in store.chapters().iter().zip(before.chapters()) {
            assert_eq!(after.position, prior.position);
            assert_eq!(after.lessons, prior.lessons);
        }
        assert!(!store.chapters()[0].is_open);
        assert!(store.chapters()[1].is_open);

        store.toggle_chapter_open("a");
        assert_eq!(store, before);
    }
}
