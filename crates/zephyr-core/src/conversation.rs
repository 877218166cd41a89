//! Conversation construction

use crate::{location::is_location_related, request::GenerationRequest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Ordered turns handed to the engine's chat template.
///
/// Holds at most one system turn, always first, and exactly one user turn,
/// always last. The constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    /// A conversation made of the user prompt alone
    pub fn user(prompt: impl Into<String>) -> Self {
        Self { turns: vec![ConversationTurn::user(prompt)] }
    }

    /// A conversation with system framing ahead of the user prompt
    pub fn with_system(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![ConversationTurn::system(system), ConversationTurn::user(prompt)],
        }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The system turn, if present
    pub fn system(&self) -> Option<&ConversationTurn> {
        self.turns.first().filter(|turn| turn.role == Role::System)
    }

    /// The user turn
    pub fn user_turn(&self) -> &ConversationTurn {
        // Both constructors put the user turn last.
        &self.turns[self.turns.len() - 1]
    }

    pub fn has_system(&self) -> bool {
        self.system().is_some()
    }
}

/// System framing used when the prompt is about the user's surroundings
pub fn location_context(nearby_place: &str) -> String {
    format!("User is near {}. Answer the questions concisely", nearby_place)
}

/// Build the conversation for a request.
///
/// The prompt is passed through verbatim; the only addition is the location
/// system turn when the prompt is location related.
pub fn build_conversation(request: &GenerationRequest) -> Conversation {
    let location_related = is_location_related(&request.prompt, request.nearby_place());
    compose_conversation(request, location_related)
}

/// Build the conversation from an already evaluated location decision
pub(crate) fn compose_conversation(request: &GenerationRequest, location_related: bool) -> Conversation {
    match request.nearby_place() {
        Some(place) if location_related => {
            Conversation::with_system(location_context(place), request.prompt.clone())
        }
        _ => Conversation::user(request.prompt.clone()),
    }
}
