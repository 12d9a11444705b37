//! Client-side course structure editing: the ordered chapter/lesson store and
//! the drag-and-drop coordinator that reorders it against the sidecar.

pub mod client;
pub mod command;
pub mod coordinator;
pub mod error;
pub mod store;
pub mod wire;

pub use client::{LocalClient, ReorderTransport};
pub use command::{OptimisticReorder, ReorderKind, ReorderRequest};
pub use coordinator::{
    CourseCache, DragData, DragItem, DragOutcome, LogNotifier, Notifier, PendingReorder,
    ReorderCoordinator,
};
pub use error::{ReorderError, TransportError};
pub use store::{ChapterItem, LessonItem, StructureStore};
