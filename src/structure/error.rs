//! Failures surfaced by the course-structure editor.

/// Failure reported by a [`crate::structure::client::ReorderTransport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The server answered with an error envelope.
    #[error("{code}: {message}")]
    Rejected { code: String, message: String },

    /// The request never produced a usable answer.
    #[error("transport failed: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReorderError {
    /// Source or target of a drag could not be located. Nothing was mutated.
    #[error("Could not determine the chapter")]
    Resolution,

    /// A lesson was dropped outside its own chapter. Nothing was mutated.
    #[error("Lessons can only be reordered within the same chapter")]
    ScopeViolation,

    /// The optimistic change was rolled back after the server refused it.
    #[error("Failed to reorder {kind}")]
    Persistence {
        kind: &'static str,
        #[source]
        source: TransportError,
    },
}
