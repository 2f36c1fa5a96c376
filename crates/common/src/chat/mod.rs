//! Chat orchestration
//!
//! Turns a caller-supplied conversation into a streamed reply:
//! embed the latest user turn, retrieve the closest corpus passages, compose
//! a prompt with context and history, then forward the generator's
//! fragments as they arrive.

mod orchestrator;
mod prompt;

pub use orchestrator::ChatOrchestrator;
pub use prompt::{build_context_block, build_history_block, build_prompt, RetrievedPassage};

use serde::{Deserialize, Serialize};

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used in the prompt transcript
    pub fn speaker(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Phil",
        }
    }
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
