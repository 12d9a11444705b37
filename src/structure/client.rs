//! Persistence transport for reorder requests.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::ipc::{self, AppState, Request};
use crate::structure::error::TransportError;
use crate::structure::wire::{CourseStructure, ReorderChaptersInput, ReorderLessonsInput};

/// Sends reorder requests. Each call carries a complete sibling group.
pub trait ReorderTransport {
    fn reorder_chapters(&mut self, input: &ReorderChaptersInput) -> Result<(), TransportError>;
    fn reorder_lessons(&mut self, input: &ReorderLessonsInput) -> Result<(), TransportError>;
}

/// Drives the RPC router in-process, without the stdio framing.
pub struct LocalClient<'a> {
    state: &'a mut AppState,
    next_id: u64,
}

impl<'a> LocalClient<'a> {
    pub fn new(state: &'a mut AppState) -> Self {
        Self { state, next_id: 1 }
    }

    /// Calls `method` and returns the `result` member of a successful response.
    pub fn call(&mut self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = format!("local-{}", self.next_id);
        self.next_id += 1;
        let response = ipc::handle_request(self.state, Request::new(id, method, params));
        if response.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(response.get("result").cloned().unwrap_or(Value::Null));
        }
        let error = response.get("error");
        let field = |k: &str| {
            error
                .and_then(|e| e.get(k))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Err(TransportError::Rejected {
            code: field("code"),
            message: field("message"),
        })
    }

    fn send<T: Serialize>(&mut self, method: &str, input: &T) -> Result<(), TransportError> {
        let params = serde_json::to_value(input).map_err(|e| TransportError::Io(e.to_string()))?;
        self.call(method, params).map(|_| ())
    }

    fn decode<T: DeserializeOwned>(value: Value) -> Result<T, TransportError> {
        serde_json::from_value(value).map_err(|e| TransportError::Io(e.to_string()))
    }

    /// Loads a course with its ordered chapters and lessons.
    pub fn fetch_course(&mut self, course_id: &str) -> Result<CourseStructure, TransportError> {
        let mut result = self.call("course.get", serde_json::json!({ "id": course_id }))?;
        let course = result
            .get_mut("course")
            .map(Value::take)
            .ok_or_else(|| TransportError::Io("course.get returned no course".to_string()))?;
        Self::decode(course)
    }
}

impl ReorderTransport for LocalClient<'_> {
    fn reorder_chapters(&mut self, input: &ReorderChaptersInput) -> Result<(), TransportError> {
        self.send("chapter.reorder", input)
    }

    fn reorder_lessons(&mut self, input: &ReorderLessonsInput) -> Result<(), TransportError> {
        self.send("lesson.reorder", input)
    }
}
