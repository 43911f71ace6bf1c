//! Shared conversation data model for ChatRelay.

mod error;
mod history;
mod transcript;

pub use error::ModelError;
pub use history::{ConversationHistory, Role, Turn};
pub use transcript::{EntryId, EntryState, Transcript, TranscriptEntry};
