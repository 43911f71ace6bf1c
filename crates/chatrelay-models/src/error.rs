//! Error types for the data model

use thiserror::Error;

/// Data model error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("conversation history is empty")]
    EmptyHistory,

    #[error("turn {index} has empty content")]
    EmptyContent { index: usize },

    #[error("unknown transcript entry")]
    UnknownEntry,

    #[error("transcript entry is frozen")]
    FrozenEntry,

    #[error("a streaming entry is already open")]
    EntryAlreadyOpen,
}
