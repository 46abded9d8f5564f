//! Interactive Q&A over the analyzed material
//!
//! Every turn re-sends the full material and the whole conversation so far.
//! History is passed by value: `ask` never mutates its input snapshot.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ai_client::{ChatMessage, CompletionClient, CompletionRequest};

pub const NO_MATERIAL_MESSAGE: &str = "Please analyze some material first.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// Ordered (question, answer) pairs; order defines replay order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory(Vec<Turn>);

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// New snapshot with one more turn appended
    pub fn with_turn(&self, question: impl Into<String>, answer: impl Into<String>) -> Self {
        let mut turns = self.0.clone();
        turns.push(Turn { question: question.into(), answer: answer.into() });
        Self(turns)
    }

    /// History flattened into alternating user/assistant messages
    fn to_messages(&self) -> impl Iterator<Item = ChatMessage> + '_ {
        self.0.iter().flat_map(|turn| {
            [ChatMessage::user(turn.question.clone()), ChatMessage::assistant(turn.answer.clone())]
        })
    }
}

/// Result of one `ask`: the new contents of the question box and the history snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskOutcome {
    pub input: String,
    pub history: ConversationHistory,
}

#[derive(Debug, Clone)]
pub struct QaOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub struct QaSession {
    client: Arc<dyn CompletionClient>,
    options: QaOptions,
}

impl QaSession {
    pub fn new(client: Arc<dyn CompletionClient>, options: QaOptions) -> Self {
        Self { client, options }
    }

    pub fn system_prompt(material: &str) -> String {
        format!(
            "You are an assistant that answers questions based on the following teaching material.\n\nMaterial:\n{}",
            material
        )
    }

    pub async fn ask(
        &self,
        question: &str,
        history: &ConversationHistory,
        material: Option<&str>,
    ) -> AskOutcome {
        if question.is_empty() {
            return AskOutcome { input: String::new(), history: history.clone() };
        }

        let Some(material) = material.filter(|m| !m.is_empty()) else {
            // guidance goes to the input box, the chat stays untouched
            return AskOutcome { input: NO_MATERIAL_MESSAGE.to_string(), history: history.clone() };
        };

        let mut messages = vec![ChatMessage::system(Self::system_prompt(material))];
        messages.extend(history.to_messages());
        messages.push(ChatMessage::user(question));

        let request = CompletionRequest {
            model: self.options.model.clone(),
            messages,
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        let reply = match self.client.complete(request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Q&A completion failed: {}", e);
                format!("An error occurred: {}", e)
            }
        };

        AskOutcome { input: String::new(), history: history.with_turn(question, reply) }
    }
}
