use crate::change::Position;
use crate::session::{CommandKind, Mode};

/// A stored change record could not be turned back into a [`crate::Change`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("corrupt change record at {field}: {reason}")]
pub struct CorruptChangeError {
    pub field: String,
    pub reason: String,
}

impl CorruptChangeError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::new(field, "missing")
    }
}

/// Failures reported by a [`crate::DocumentHost`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("failed to apply edits: {0}")]
    ApplyEdit(String),
    #[error("failed to apply selections: {0}")]
    ApplySelection(String),
    #[error("edits overlap and cannot be applied as one batch")]
    OverlappingEdits,
    #[error("position {}:{} is outside the document", .0.line, .0.character)]
    PositionOutOfBounds(Position),
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("no active editor to play into")]
    NoActiveEditor,
    #[error("nothing to play")]
    NoPlayData,
    #[error("unknown breakpoint: {0}")]
    UnknownBreakpoint(String),
    #[error("failed to prepare the editor for playback: {0}")]
    Host(#[from] HostError),
}

#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("no active editor to record from")]
    NoActiveEditor,
    #[error("no project selected for recording")]
    NoActiveProject,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("project {0} already exists")]
    ProjectNameConflict(String),
    #[error("failed to persist projects: {0}")]
    PersistenceWriteFailure(String),
    #[error("failed to load projects: {0}")]
    Load(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{command:?} is not available while {mode}")]
    InvalidTransition { mode: Mode, command: CommandKind },
    #[error("unknown project: {0}")]
    UnknownProject(String),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
