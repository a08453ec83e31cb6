//! Builds the message sequence sent to the chat backend for one user turn.
//!
//! The backend keeps no conversation state, so the whole sequence is rebuilt
//! on every call from the role, the knowledge base and the recorded turns.

use crate::prompts::{knowledge_base_guidance, Role, PRIMING_ACK};
use services::knowledge_base::KnowledgeBase;
use shared::agent_api::{ChatMessage, ConversationTurn, Speaker};

/// Role instruction, plus the knowledge-base section when there is one.
pub fn instruction(role: &Role, knowledge_base: &KnowledgeBase) -> String {
    let mut text = role.instruction.to_string();
    if !knowledge_base.is_empty() {
        text.push_str(&knowledge_base_guidance(&knowledge_base.text()));
    }
    text
}

/// Turns the model actually took part in. An error-marked turn is dropped
/// together with the user turn that triggered it.
fn completed_turns(history: &[ConversationTurn]) -> Vec<&ConversationTurn> {
    let mut kept: Vec<&ConversationTurn> = Vec::with_capacity(history.len());
    for turn in history {
        if turn.is_error {
            if kept.last().map_or(false, |t| t.speaker == Speaker::User) {
                kept.pop();
            }
            continue;
        }
        kept.push(turn);
    }
    kept
}

/// `history` holds the turns recorded before `user_text`.
///
/// A fresh conversation is primed: the instruction as a user message, a fixed
/// acknowledgement, then the instruction again ahead of the question. Later
/// turns replay the completed history verbatim and send the user text
/// unchanged. A conversation whose only turns failed still counts as fresh.
pub fn assemble(
    role: &Role,
    knowledge_base: &KnowledgeBase,
    history: &[ConversationTurn],
    user_text: &str,
) -> Vec<ChatMessage> {
    let history = completed_turns(history);
    if history.is_empty() {
        let instruction = instruction(role, knowledge_base);
        return vec![
            ChatMessage::user(instruction.clone()),
            ChatMessage::assistant(PRIMING_ACK),
            ChatMessage::user(format!("{}\n\nUser question: {}", instruction, user_text)),
        ];
    }

    history
        .into_iter()
        .map(ConversationTurn::to_message)
        .chain(std::iter::once(ChatMessage::user(user_text)))
        .collect()
}
