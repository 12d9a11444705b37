//! Drag-and-drop reorder coordinator.
//!
//! Turns drag gestures into order changes on a [`StructureStore`], applies
//! them optimistically, and reconciles with the server once the persistence
//! request settles. A drag end yields a [`PendingReorder`] ticket; the caller
//! sends its request and hands the outcome back to [`ReorderCoordinator::settle`].
//! Tickets are independent, so a new drag may start before an earlier one
//! has settled.

use crate::structure::client::ReorderTransport;
use crate::structure::command::{OptimisticReorder, ReorderKind, ReorderRequest};
use crate::structure::error::{ReorderError, TransportError};
use crate::structure::store::StructureStore;
use crate::structure::wire::ServerChapter;

/// Handle onto whatever caches course data for the surrounding application.
pub trait CourseCache {
    fn invalidate_course(&mut self, course_id: &str);
}

/// Transient user-facing messages.
pub trait Notifier {
    fn loading(&mut self, message: &str);
    fn success(&mut self, message: &str);
    fn error(&mut self, message: &str);
}

/// Notifier for headless hosts: messages go to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn loading(&mut self, message: &str) {
        tracing::debug!(message, "reorder notice");
    }

    fn success(&mut self, message: &str) {
        tracing::info!(message, "reorder notice");
    }

    fn error(&mut self, message: &str) {
        tracing::warn!(message, "reorder notice");
    }
}

/// Payload attached to a draggable or droppable element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragData {
    Chapter { id: String },
    Lesson { id: String, chapter_id: Option<String> },
    Other { id: String },
}

impl DragData {
    pub fn chapter(id: impl Into<String>) -> Self {
        Self::Chapter { id: id.into() }
    }

    pub fn lesson(id: impl Into<String>, chapter_id: impl Into<String>) -> Self {
        Self::Lesson {
            id: id.into(),
            chapter_id: Some(chapter_id.into()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Chapter { id } | Self::Lesson { id, .. } | Self::Other { id } => id,
        }
    }
}

/// What is being dragged right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragItem {
    Chapter { id: String },
    Lesson { id: String, chapter_id: String },
}

/// An optimistic reorder awaiting the server's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a pending reorder must be settled"]
pub struct PendingReorder {
    course_id: String,
    reorder: OptimisticReorder,
}

impl PendingReorder {
    pub fn request(&self) -> &ReorderRequest {
        self.reorder.request()
    }

    pub fn kind(&self) -> ReorderKind {
        self.reorder.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragOutcome {
    /// Nothing changed and nothing needs to be sent.
    Ignored,
    Pending(PendingReorder),
}

pub struct ReorderCoordinator<C, N> {
    course_id: String,
    store: StructureStore,
    active: Option<DragItem>,
    cache: C,
    notifier: N,
}

impl<C: CourseCache, N: Notifier> ReorderCoordinator<C, N> {
    pub fn new(course_id: impl Into<String>, store: StructureStore, cache: C, notifier: N) -> Self {
        Self {
            course_id: course_id.into(),
            store,
            active: None,
            cache,
            notifier,
        }
    }

    pub fn course_id(&self) -> &str {
        &self.course_id
    }

    pub fn store(&self) -> &StructureStore {
        &self.store
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// The item recorded by [`Self::drag_start`], for rendering a drag
    /// overlay. Display state only: [`Self::drag_end`] works from its own
    /// arguments.
    pub fn active_item(&self) -> Option<&DragItem> {
        self.active.as_ref()
    }

    pub fn toggle_chapter_open(&mut self, chapter_id: &str) {
        self.store.toggle_chapter_open(chapter_id);
    }

    /// Feeds refetched server data into the store.
    pub fn refresh(&mut self, server: &[ServerChapter]) {
        self.store.rebuild(server);
    }

    /// Records the drag item. Returns false (and stays idle) for anything
    /// that is neither a chapter nor a lesson with a known chapter.
    pub fn drag_start(&mut self, data: &DragData) -> bool {
        self.active = match data {
            DragData::Chapter { id } => Some(DragItem::Chapter { id: id.clone() }),
            DragData::Lesson {
                id,
                chapter_id: Some(chapter_id),
            } => Some(DragItem::Lesson {
                id: id.clone(),
                chapter_id: chapter_id.clone(),
            }),
            _ => None,
        };
        self.active.is_some()
    }

    pub fn drag_cancel(&mut self) {
        self.active = None;
    }

    /// Classifies a drop from the `active` and `over` payloads the drag
    /// surface reports, whether or not `drag_start` saw the gesture begin.
    /// Always clears the recorded drag item.
    pub fn drag_end(
        &mut self,
        active: &DragData,
        over: Option<&DragData>,
    ) -> Result<DragOutcome, ReorderError> {
        self.active = None;
        let Some(over) = over else {
            return Ok(DragOutcome::Ignored);
        };
        if active.id() == over.id() {
            return Ok(DragOutcome::Ignored);
        }

        let reorder = match active {
            DragData::Chapter { id } => self.plan_chapter_move(id, over)?,
            DragData::Lesson { id, chapter_id } => {
                self.plan_lesson_move(id, chapter_id.as_deref(), over)?
            }
            DragData::Other { .. } => None,
        };
        let Some(reorder) = reorder else {
            return Ok(DragOutcome::Ignored);
        };

        reorder.apply(&mut self.store);
        let kind = reorder.kind();
        self.notifier.loading(&format!("Reordering {}...", kind.noun()));
        tracing::debug!(
            course_id = %self.course_id,
            kind = kind.noun(),
            "optimistic reorder applied"
        );
        Ok(DragOutcome::Pending(PendingReorder {
            course_id: self.course_id.clone(),
            reorder,
        }))
    }

    fn plan_chapter_move(
        &mut self,
        active_id: &str,
        over: &DragData,
    ) -> Result<Option<OptimisticReorder>, ReorderError> {
        let target = match over {
            DragData::Chapter { id } => Some(id.as_str()),
            DragData::Lesson { chapter_id, .. } => chapter_id.as_deref(),
            DragData::Other { .. } => None,
        };
        let indices = target.and_then(|target| {
            Some((
                self.store.chapter_index(active_id)?,
                self.store.chapter_index(target)?,
            ))
        });
        let Some((from, to)) = indices else {
            return Err(self.reject(ReorderError::Resolution));
        };
        if from == to {
            return Ok(None);
        }
        Ok(Some(OptimisticReorder::chapters(
            &self.course_id,
            self.store.chapters(),
            from,
            to,
        )))
    }

    fn plan_lesson_move(
        &mut self,
        active_id: &str,
        active_chapter: Option<&str>,
        over: &DragData,
    ) -> Result<Option<OptimisticReorder>, ReorderError> {
        let same_chapter = match (active_chapter, over) {
            (
                Some(source),
                DragData::Lesson {
                    chapter_id: Some(target),
                    ..
                },
            ) if source == target => Some(source),
            _ => None,
        };
        let Some(chapter_id) = same_chapter else {
            return Err(self.reject(ReorderError::ScopeViolation));
        };

        let Some(chapter) = self.store.chapter_index(chapter_id) else {
            return Ok(None);
        };
        let lessons = &self.store.chapters()[chapter].lessons;
        let from = lessons.iter().position(|l| l.id == active_id);
        let to = lessons.iter().position(|l| l.id == over.id());
        let (Some(from), Some(to)) = (from, to) else {
            return Ok(None);
        };
        if from == to {
            return Ok(None);
        }
        Ok(OptimisticReorder::lessons(
            &self.course_id,
            self.store.chapters(),
            chapter,
            from,
            to,
        ))
    }

    fn reject(&mut self, error: ReorderError) -> ReorderError {
        tracing::debug!(course_id = %self.course_id, %error, "drag rejected");
        self.notifier.error(&error.to_string());
        error
    }

    /// Reconciles a pending reorder with the server's answer. On failure the
    /// store goes back to the ticket's snapshot; there is no retry.
    pub fn settle(
        &mut self,
        pending: PendingReorder,
        result: Result<(), TransportError>,
    ) -> Result<(), ReorderError> {
        let kind = pending.kind();
        match result {
            Ok(()) => {
                self.cache.invalidate_course(&pending.course_id);
                self.notifier
                    .success(&format!("{} reordered successfully", kind.title()));
                Ok(())
            }
            Err(source) => {
                pending.reorder.undo(&mut self.store);
                tracing::warn!(
                    course_id = %pending.course_id,
                    kind = kind.noun(),
                    error = %source,
                    "reorder rolled back"
                );
                let error = ReorderError::Persistence {
                    kind: kind.noun(),
                    source,
                };
                self.notifier.error(&error.to_string());
                Err(error)
            }
        }
    }

    /// `drag_end`, then send and settle in one go. Returns whether a request
    /// was sent.
    pub fn drop_and_persist<T: ReorderTransport + ?Sized>(
        &mut self,
        active: &DragData,
        over: Option<&DragData>,
        transport: &mut T,
    ) -> Result<bool, ReorderError> {
        let DragOutcome::Pending(pending) = self.drag_end(active, over)? else {
            return Ok(false);
        };
        let result = match pending.request() {
            ReorderRequest::Chapters(input) => transport.reorder_chapters(input),
            ReorderRequest::Lessons(input) => transport.reorder_lessons(input),
        };
        self.settle(pending, result)?;
        Ok(true)
    }
}
