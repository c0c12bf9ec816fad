//! Conversation history types

use serde::{Deserialize, Serialize};

/// Prefix that marks a system entry carrying retrieved knowledge rather than
/// the persona prompt
pub const RELEVANT_CONTEXT_PREFIX: &str = "Relevant context:";

/// Role in a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

/// One entry in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::System,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
        }
    }
}

/// Ordered conversation history for one call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::assistant(text));
    }

    /// Install or refresh the persona system prompt.
    ///
    /// If the history is empty the prompt becomes the first entry. Otherwise
    /// the existing persona entry (the system entry that does not carry the
    /// relevant-context prefix) is replaced in place; if none exists the
    /// prompt is inserted at the front.
    pub fn set_system(&mut self, text: impl Into<String>) {
        let text = text.into();
        let existing = self.turns.iter_mut().find(|t| {
            t.role == TurnRole::System && !t.text.starts_with(RELEVANT_CONTEXT_PREFIX)
        });
        match existing {
            Some(turn) => turn.text = text,
            None => self.turns.insert(0, Turn::system(text)),
        }
    }

    /// The persona system prompt, if installed
    pub fn system_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .find(|t| t.role == TurnRole::System && !t.text.starts_with(RELEVANT_CONTEXT_PREFIX))
            .map(|t| t.text.as_str())
    }

    /// The most recent `limit` non-system turns, oldest first
    pub fn recent_dialogue(&self, limit: usize) -> Vec<&Turn> {
        let dialogue: Vec<&Turn> = self
            .turns
            .iter()
            .filter(|t| t.role != TurnRole::System)
            .collect();
        let skip = dialogue.len().saturating_sub(limit);
        dialogue.into_iter().skip(skip).collect()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
