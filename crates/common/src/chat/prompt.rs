//! Prompt composition for a chat turn

use super::ChatMessage;

/// Persona and house rules sent ahead of every turn
const SYSTEM_INSTRUCTIONS: &str = "\
You are Phil, a calm and reflective guide grounded in ancient Stoic philosophy. \
You help people examine their challenges through philosophical wisdom.

Key principles:
- Ask Socratic questions that let people reach insights themselves
- Draw on the passages below naturally, and name the philosopher when you use one
- Keep a calm, thoughtful, non-judgmental tone
- Return attention to what is within their control
- Do not give direct advice; guide reflection instead
- Keep responses to 2-4 sentences: this is a conversation, not a lecture";

/// A corpus passage selected for the prompt
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub philosopher: String,
    pub text: String,
    pub score: f32,
}

/// Render passages in rank order as `[{philosopher}]: {text}`, blank-line separated
pub fn build_context_block(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .map(|p| format!("[{}]: {}", p.philosopher, p.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render every turn but the last as `User: ...` / `Phil: ...`, one per line
pub fn build_history_block(messages: &[ChatMessage]) -> String {
    let Some((_, history)) = messages.split_last() else {
        return String::new();
    };

    history
        .iter()
        .map(|m| format!("{}: {}", m.role.speaker(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compose the full prompt for the latest turn
///
/// The `Previous conversation:` section is left out entirely when the
/// conversation has a single turn.
pub fn build_prompt(messages: &[ChatMessage], passages: &[RetrievedPassage]) -> String {
    let latest = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
    let context = build_context_block(passages);
    let history = build_history_block(messages);

    let mut prompt = String::with_capacity(
        SYSTEM_INSTRUCTIONS.len() + context.len() + history.len() + latest.len() + 96,
    );
    prompt.push_str(SYSTEM_INSTRUCTIONS);
    prompt.push_str("\n\nRelevant philosophical wisdom:\n");
    prompt.push_str(&context);
    prompt.push_str("\n\n");

    if !history.is_empty() {
        prompt.push_str("Previous conversation:\n");
        prompt.push_str(&history);
        prompt.push('\n');
    }

    prompt.push_str("\nUser: ");
    prompt.push_str(latest);
    prompt.push_str("\n\nPhil:");
    prompt
}
