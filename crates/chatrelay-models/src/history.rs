//! Conversation turns and validated histories.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Chat message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    /// Create a system turn
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// An ordered, validated sequence of turns.
///
/// Validation happens at construction: the history is non-empty and no
/// turn carries empty content. Once built a history never changes, so a
/// value of this type is always well-formed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<Turn>", into = "Vec<Turn>")]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new(turns: Vec<Turn>) -> Result<Self, ModelError> {
        if turns.is_empty() {
            return Err(ModelError::EmptyHistory);
        }
        for (index, turn) in turns.iter().enumerate() {
            if turn.content.trim().is_empty() {
                return Err(ModelError::EmptyContent { index });
            }
        }
        Ok(Self { turns })
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn has_system(&self) -> bool {
        self.turns.iter().any(|turn| turn.role == Role::System)
    }

    /// Prepend a system turn unless the history already carries one.
    pub fn with_system_prefix(mut self, content: impl Into<String>) -> Self {
        if !self.has_system() {
            self.turns.insert(0, Turn::system(content));
        }
        self
    }
}

impl TryFrom<Vec<Turn>> for ConversationHistory {
    type Error = ModelError;

    fn try_from(turns: Vec<Turn>) -> Result<Self, Self::Error> {
        Self::new(turns)
    }
}

impl From<ConversationHistory> for Vec<Turn> {
    fn from(history: ConversationHistory) -> Self {
        history.turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_history() {
        assert_eq!(
            ConversationHistory::new(vec![]),
            Err(ModelError::EmptyHistory)
        );
    }

    #[test]
    fn rejects_blank_content() {
        let turns = vec![Turn::user("hello"), Turn::user("   ")];
        assert_eq!(
            ConversationHistory::new(turns),
            Err(ModelError::EmptyContent { index: 1 })
        );
    }

    #[test]
    fn accepts_well_formed_history() {
        let history =
            ConversationHistory::new(vec![Turn::user("hello")]).expect("history is valid");
        assert_eq!(history.len(), 1);
        assert_eq!(history.turns()[0].role, Role::User);
    }

    #[test]
    fn deserialization_enforces_validation() {
        let result: Result<ConversationHistory, _> = serde_json::from_str("[]");
        assert!(result.is_err());

        let result: Result<ConversationHistory, _> =
            serde_json::from_str(r#"[{"role": "user", "content": ""}]"#);
        assert!(result.is_err());

        let history: ConversationHistory =
            serde_json::from_str(r#"[{"role": "user", "content": "hi"}]"#)
                .expect("valid payload deserializes");
        assert_eq!(history.turns()[0].content, "hi");
    }

    #[test]
    fn system_prefix_is_added_once() {
        let history = ConversationHistory::new(vec![Turn::user("hi")])
            .expect("history is valid")
            .with_system_prefix("You are a helpful assistant.");
        assert_eq!(history.turns()[0].role, Role::System);

        let unchanged = history.clone().with_system_prefix("other prompt");
        assert_eq!(unchanged, history);
    }
}
