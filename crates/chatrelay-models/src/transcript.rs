//! The client-side transcript: an append-only sequence of entries with
//! handle-addressed mutation.
//!
//! Entries are addressed by the [`EntryId`] returned at append time, never
//! by position, so a handle stays valid while other entries are appended
//! or removed around it. At most one entry is ever open for mutation: the
//! assistant placeholder being filled by an in-progress stream.

use serde::Serialize;

use crate::error::ModelError;
use crate::history::{ConversationHistory, Role, Turn};

/// Opaque handle to a transcript entry, issued at append time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EntryId(u64);

/// Mutability state of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryState {
    /// Content may still be replaced (the in-progress placeholder).
    Open,
    /// Content is final.
    Frozen,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub id: EntryId,
    pub role: Role,
    pub content: String,
    pub state: EntryState,
}

/// Ordered conversation transcript.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, role: Role, content: String, state: EntryState) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        self.entries.push(TranscriptEntry {
            id,
            role,
            content,
            state,
        });
        id
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> EntryId {
        self.push(Role::User, content.into(), EntryState::Frozen)
    }

    pub fn push_system(&mut self, content: impl Into<String>) -> EntryId {
        self.push(Role::System, content.into(), EntryState::Frozen)
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) -> EntryId {
        self.push(Role::Assistant, content.into(), EntryState::Frozen)
    }

    /// Append the empty assistant placeholder that an open stream will
    /// fill. Fails while another placeholder is still open.
    pub fn push_placeholder(&mut self) -> Result<EntryId, ModelError> {
        if self.open_entry().is_some() {
            return Err(ModelError::EntryAlreadyOpen);
        }
        Ok(self.push(Role::Assistant, String::new(), EntryState::Open))
    }

    fn entry_mut(&mut self, id: EntryId) -> Result<&mut TranscriptEntry, ModelError> {
        self.entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(ModelError::UnknownEntry)
    }

    /// Replace the full content of an open entry.
    pub fn set_content(&mut self, id: EntryId, content: String) -> Result<(), ModelError> {
        let entry = self.entry_mut(id)?;
        if entry.state == EntryState::Frozen {
            return Err(ModelError::FrozenEntry);
        }
        entry.content = content;
        Ok(())
    }

    /// Make an entry final; no further mutation is possible.
    pub fn freeze(&mut self, id: EntryId) -> Result<(), ModelError> {
        self.entry_mut(id)?.state = EntryState::Frozen;
        Ok(())
    }

    /// Remove an entry entirely (rollback of a failed placeholder).
    pub fn remove(&mut self, id: EntryId) -> Result<(), ModelError> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(ModelError::UnknownEntry)?;
        self.entries.remove(index);
        Ok(())
    }

    pub fn get(&self, id: EntryId) -> Option<&TranscriptEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn open_entry(&self) -> Option<&TranscriptEntry> {
        self.entries
            .iter()
            .find(|entry| entry.state == EntryState::Open)
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the provider-facing history from the frozen entries. The open
    /// placeholder, if any, is excluded: it is output, not input.
    pub fn to_history(&self) -> Result<ConversationHistory, ModelError> {
        let turns: Vec<Turn> = self
            .entries
            .iter()
            .filter(|entry| entry.state == EntryState::Frozen)
            .map(|entry| Turn {
                role: entry.role,
                content: entry.content.clone(),
            })
            .collect();
        ConversationHistory::new(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_lifecycle() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi");
        let id = transcript.push_placeholder().expect("no open entry yet");

        transcript
            .set_content(id, "partial".to_string())
            .expect("open entry accepts content");
        transcript
            .set_content(id, "partial answer".to_string())
            .expect("full replace is repeatable");
        transcript.freeze(id).expect("entry exists");

        assert_eq!(
            transcript.set_content(id, "late".to_string()),
            Err(ModelError::FrozenEntry)
        );
        assert_eq!(transcript.get(id).map(|e| e.content.as_str()), Some("partial answer"));
    }

    #[test]
    fn only_one_placeholder_at_a_time() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi");
        let _open = transcript.push_placeholder().expect("first placeholder");
        assert_eq!(
            transcript.push_placeholder(),
            Err(ModelError::EntryAlreadyOpen)
        );
    }

    #[test]
    fn remove_rolls_back_placeholder_only() {
        let mut transcript = Transcript::new();
        let user = transcript.push_user("question");
        let placeholder = transcript.push_placeholder().expect("placeholder");
        transcript
            .set_content(placeholder, "half an ans".to_string())
            .expect("entry is open");

        transcript.remove(placeholder).expect("entry exists");

        assert_eq!(transcript.len(), 1);
        assert!(transcript.get(user).is_some());
        assert!(transcript.get(placeholder).is_none());
        assert_eq!(transcript.remove(placeholder), Err(ModelError::UnknownEntry));
    }

    #[test]
    fn handles_survive_removal_of_other_entries() {
        let mut transcript = Transcript::new();
        let first = transcript.push_user("one");
        let second = transcript.push_assistant("two");
        let third = transcript.push_user("three");

        transcript.remove(second).expect("entry exists");

        assert_eq!(transcript.get(first).map(|e| e.content.as_str()), Some("one"));
        assert_eq!(transcript.get(third).map(|e| e.content.as_str()), Some("three"));
    }

    #[test]
    fn history_excludes_open_placeholder() {
        let mut transcript = Transcript::new();
        transcript.push_user("question");
        transcript.push_placeholder().expect("placeholder");

        let history = transcript.to_history().expect("user turn remains");
        assert_eq!(history.len(), 1);
        assert_eq!(history.turns()[0].role, Role::User);
    }
}
