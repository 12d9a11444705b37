//! Order mutations and the optimistic command that carries them.

use crate::structure::store::{ChapterItem, LessonItem, StructureStore};
use crate::structure::wire::{PositionUpdate, ReorderChaptersInput, ReorderLessonsInput};

/// Removes the element at `from` and reinserts it at `to`; everything else
/// keeps its relative order. Out-of-range indices leave the slice as is.
fn relocate<T: Clone>(items: &[T], from: usize, to: usize) -> Vec<T> {
    let mut out = items.to_vec();
    if from >= out.len() || to >= out.len() || from == to {
        return out;
    }
    let moved = out.remove(from);
    out.insert(to, moved);
    out
}

pub fn move_chapter(chapters: &[ChapterItem], from: usize, to: usize) -> Vec<ChapterItem> {
    let mut out = relocate(chapters, from, to);
    for (i, chapter) in out.iter_mut().enumerate() {
        chapter.position = i as i64 + 1;
    }
    out
}

pub fn move_lesson(lessons: &[LessonItem], from: usize, to: usize) -> Vec<LessonItem> {
    let mut out = relocate(lessons, from, to);
    for (i, lesson) in out.iter_mut().enumerate() {
        lesson.position = i as i64 + 1;
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderKind {
    Chapters,
    Lessons,
}

impl ReorderKind {
    pub fn noun(self) -> &'static str {
        match self {
            Self::Chapters => "chapters",
            Self::Lessons => "lessons",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Chapters => "Chapters",
            Self::Lessons => "Lessons",
        }
    }
}

/// Persistence request for one sibling group. Always the full group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderRequest {
    Chapters(ReorderChaptersInput),
    Lessons(ReorderLessonsInput),
}

impl ReorderRequest {
    pub fn kind(&self) -> ReorderKind {
        match self {
            Self::Chapters(_) => ReorderKind::Chapters,
            Self::Lessons(_) => ReorderKind::Lessons,
        }
    }
}

/// A computed reorder: the state before, the state after, and the request
/// that makes the server agree with the state after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticReorder {
    snapshot: Vec<ChapterItem>,
    applied: Vec<ChapterItem>,
    request: ReorderRequest,
}

impl OptimisticReorder {
    pub fn chapters(course_id: &str, current: &[ChapterItem], from: usize, to: usize) -> Self {
        let applied = move_chapter(current, from, to);
        let request = ReorderRequest::Chapters(ReorderChaptersInput {
            course_id: course_id.to_string(),
            chapters: applied
                .iter()
                .map(|c| PositionUpdate {
                    id: c.id.clone(),
                    position: c.position,
                })
                .collect(),
        });
        Self {
            snapshot: current.to_vec(),
            applied,
            request,
        }
    }

    /// `chapter` indexes `current`; `from`/`to` index that chapter's lessons.
    pub fn lessons(
        course_id: &str,
        current: &[ChapterItem],
        chapter: usize,
        from: usize,
        to: usize,
    ) -> Option<Self> {
        let target = current.get(chapter)?;
        let lessons = move_lesson(&target.lessons, from, to);
        let request = ReorderRequest::Lessons(ReorderLessonsInput {
            course_id: course_id.to_string(),
            chapter_id: target.id.clone(),
            lessons: lessons
                .iter()
                .map(|l| PositionUpdate {
                    id: l.id.clone(),
                    position: l.position,
                })
                .collect(),
        });
        let mut applied = current.to_vec();
        applied[chapter].lessons = lessons;
        Some(Self {
            snapshot: current.to_vec(),
            applied,
            request,
        })
    }

    pub fn request(&self) -> &ReorderRequest {
        &self.request
    }

    pub fn kind(&self) -> ReorderKind {
        self.request.kind()
    }

    pub fn snapshot(&self) -> &[ChapterItem] {
        &self.snapshot
    }

    pub fn apply(&self, store: &mut StructureStore) {
        store.replace_all(self.applied.clone());
    }

    pub fn undo(&self, store: &mut StructureStore) {
        store.replace_all(self.snapshot.clone());
    }
}
