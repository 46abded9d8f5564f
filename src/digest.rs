//! Digest generation: one completion call summarizing the material text

use std::sync::Arc;

use crate::ai_client::{ChatMessage, CompletionClient, CompletionRequest, LlmError};

pub const DIGEST_PERSONA: &str =
    "You are an assistant that analyzes teaching material and provides a detailed digest.";
pub const NO_TEXT_MESSAGE: &str = "Could not extract text from the provided file.";
pub const STATUS_NO_TEXT: &str = "Error: text extraction failed.";
pub const STATUS_DONE: &str = "Analysis complete.";

#[derive(Debug, Clone, PartialEq)]
pub enum DigestOutcome {
    Ready(String),
    NoText,
}

impl DigestOutcome {
    /// Text shown in the digest area
    pub fn message(&self) -> &str {
        match self {
            DigestOutcome::Ready(digest) => digest,
            DigestOutcome::NoText => NO_TEXT_MESSAGE,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            DigestOutcome::Ready(_) => STATUS_DONE,
            DigestOutcome::NoText => STATUS_NO_TEXT,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, DigestOutcome::Ready(_))
    }
}

#[derive(Debug, Clone)]
pub struct DigestOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub struct Digester {
    client: Arc<dyn CompletionClient>,
    options: DigestOptions,
}

impl Digester {
    pub fn new(client: Arc<dyn CompletionClient>, options: DigestOptions) -> Self {
        Self { client, options }
    }

    /// Summarize `text`. Empty or absent text short-circuits without a model call;
    /// transport errors are returned to the caller untouched.
    pub async fn digest(&self, text: Option<&str>) -> Result<DigestOutcome, LlmError> {
        let Some(text) = text.filter(|t| !t.is_empty()) else {
            return Ok(DigestOutcome::NoText);
        };

        let request = CompletionRequest {
            model: self.options.model.clone(),
            messages: vec![
                ChatMessage::system(DIGEST_PERSONA),
                ChatMessage::user(format!(
                    "Provide a detailed digest of the following material:\n\n{}",
                    text
                )),
            ],
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        let reply = self.client.complete(request).await?;
        tracing::info!(chars = reply.chars().count(), "digest generated");
        Ok(DigestOutcome::Ready(reply))
    }
}
