//! Multiple-choice quiz generation and grading

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::ai_client::{ChatMessage, CompletionClient, CompletionRequest, LlmError};
use crate::qa::NO_MATERIAL_MESSAGE;
use crate::utils::safe_truncate;

pub const QUIZ_PERSONA: &str = "You are an assistant that generates quizzes.";
pub const NO_SELECTION_MESSAGE: &str = "Please select an answer first.";

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("no material has been analyzed")]
    NoMaterial,
    #[error("{0}")]
    Completion(#[from] LlmError),
    #[error("malformed model output: {0}")]
    MalformedOutput(String),
}

/// One multiple-choice question; `answer` is expected (not guaranteed) to be one of `options`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizItem {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
}

impl QuizItem {
    /// Collapse a failure into the question channel, with no options and no answer
    pub fn from_error(error: &QuizError) -> Self {
        let question = match error {
            QuizError::NoMaterial => NO_MATERIAL_MESSAGE.to_string(),
            other => format!("An error occurred while generating the quiz: {}", other),
        };
        Self { question, options: Vec::new(), answer: String::new() }
    }

    /// Four options with the answer among them
    pub fn is_well_formed(&self) -> bool {
        self.options.len() == 4 && self.options.contains(&self.answer)
    }
}

/// Parse the model reply into a quiz item.
///
/// The reply must be a JSON object (optionally inside a Markdown code fence);
/// missing keys default to empty values.
pub fn parse_quiz_reply(text: &str) -> Result<QuizItem, QuizError> {
    let trimmed = text.trim();
    let json_text = if trimmed.starts_with("```") {
        trimmed
            .lines()
            .skip(1)
            .take_while(|l| !l.starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        trimmed.to_string()
    };

    let json: serde_json::Value = serde_json::from_str(&json_text)
        .map_err(|e| QuizError::MalformedOutput(e.to_string()))?;
    if !json.is_object() {
        return Err(QuizError::MalformedOutput("expected a JSON object".to_string()));
    }

    let field = |key: &str| {
        json.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };

    let options: Vec<String> = json
        .get("options")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    Ok(QuizItem { question: field("question"), options, answer: field("answer") })
}

#[derive(Debug, Clone)]
pub struct QuizOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub struct QuizGenerator {
    client: Arc<dyn CompletionClient>,
    options: QuizOptions,
}

impl QuizGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, options: QuizOptions) -> Self {
        Self { client, options }
    }

    pub fn prompt(material: &str) -> String {
        format!(
            "Based on the following teaching material, generate one multiple-choice quiz question. \
             Output the question, four options and the correct answer in JSON format.\n\n\
             Material:\n{}\n\n\
             Example:\n{{\"question\": \"Question text\", \"options\": [\"Option A\", \"Option B\", \"Option C\", \"Option D\"], \"answer\": \"Option A\"}}",
            material
        )
    }

    pub async fn generate(&self, material: Option<&str>) -> Result<QuizItem, QuizError> {
        let material = material.filter(|m| !m.is_empty()).ok_or(QuizError::NoMaterial)?;

        let request = CompletionRequest {
            model: self.options.model.clone(),
            messages: vec![ChatMessage::system(QUIZ_PERSONA), ChatMessage::user(Self::prompt(material))],
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        let reply = self.client.complete(request).await?;
        let item = parse_quiz_reply(&reply).inspect_err(|e| {
            tracing::warn!(reply = safe_truncate(&reply, 200), "quiz reply rejected: {}", e);
        })?;

        if !item.is_well_formed() {
            tracing::warn!(
                options = item.options.len(),
                "quiz item is missing options or its answer is not among them"
            );
        }
        Ok(item)
    }
}

/// Grade a selection by exact string equality
pub fn check_answer(selected: &str, correct: &str) -> String {
    if selected == correct {
        format!("Correct! {} is the right answer.", correct)
    } else {
        format!("Incorrect. You selected {}. The correct answer is {}.", selected, correct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompletion;

    const GOOD_REPLY: &str = r#"{"question": "What does ATP store?", "options": ["Energy", "Water", "Light", "Salt"], "answer": "Energy"}"#;

    fn generator(client: Arc<ScriptedCompletion>) -> QuizGenerator {
        QuizGenerator::new(
            client,
            QuizOptions { model: "gpt-4.1-nano".to_string(), temperature: 0.7, max_tokens: 500 },
        )
    }

    #[test]
    fn test_parse_plain_json() {
        let item = parse_quiz_reply(GOOD_REPLY).unwrap();
        assert_eq!(item.question, "What does ATP store?");
        assert_eq!(item.options, vec!["Energy", "Water", "Light", "Salt"]);
        assert_eq!(item.answer, "Energy");
        assert!(item.is_well_formed());
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = format!("```json\n{}\n```", GOOD_REPLY);
        assert_eq!(parse_quiz_reply(&reply).unwrap().answer, "Energy");
    }

    #[test]
    fn test_missing_keys_default_to_empty() {
        let item = parse_quiz_reply(r#"{"question": "Q?", "options": ["a", "b", "c", "d"]}"#).unwrap();
        assert_eq!(item.answer, "");
        assert!(!item.is_well_formed());

        let item = parse_quiz_reply("{}").unwrap();
        assert_eq!(item, QuizItem::default());
    }

    #[test]
    fn test_non_json_is_malformed() {
        assert!(matches!(
            parse_quiz_reply("Sure! Here is your quiz: ..."),
            Err(QuizError::MalformedOutput(_))
        ));
        assert!(matches!(parse_quiz_reply("[1, 2, 3]"), Err(QuizError::MalformedOutput(_))));
    }

    #[tokio::test]
    async fn test_generate_without_material() {
        let client = Arc::new(ScriptedCompletion::replying(GOOD_REPLY));
        let err = generator(client.clone()).generate(Some("")).await.unwrap_err();

        assert!(matches!(err, QuizError::NoMaterial));
        let item = QuizItem::from_error(&err);
        assert_eq!(item.question, NO_MATERIAL_MESSAGE);
        assert!(item.options.is_empty());
        assert_eq!(item.answer, "");
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_generate_sends_material_in_prompt() {
        let client = Arc::new(ScriptedCompletion::replying(GOOD_REPLY));
        let item = generator(client.clone()).generate(Some("mitochondria notes")).await.unwrap();

        assert_eq!(item.answer, "Energy");
        let request = &client.requests()[0];
        assert_eq!(request.messages[0].content, QUIZ_PERSONA);
        assert!(request.messages[1].content.contains("Material:\nmitochondria notes\n"));
        assert_eq!(request.temperature, 0.7);
        assert_eq!(request.max_tokens, 500);
    }

    #[tokio::test]
    async fn test_transport_and_parse_failures_share_the_question_channel() {
        let client = Arc::new(ScriptedCompletion::script(vec![Err("bad gateway"), Ok("not json at all")]));
        let quiz = generator(client);

        let transport = quiz.generate(Some("notes")).await.unwrap_err();
        assert!(matches!(transport, QuizError::Completion(_)));
        let malformed = quiz.generate(Some("notes")).await.unwrap_err();
        assert!(matches!(malformed, QuizError::MalformedOutput(_)));

        for err in [transport, malformed] {
            let item = QuizItem::from_error(&err);
            assert!(item.question.starts_with("An error occurred while generating the quiz: "));
            assert!(item.options.is_empty());
            assert!(item.answer.is_empty());
        }
    }

    #[tokio::test]
    async fn test_missing_answer_grades_everything_incorrect() {
        let client = Arc::new(ScriptedCompletion::replying(
            r#"{"question": "Pick one", "options": ["A", "B", "C", "D"]}"#,
        ));
        let item = generator(client).generate(Some("notes")).await.unwrap();

        assert_eq!(item.answer, "");
        for option in &item.options {
            assert!(check_answer(option, &item.answer).starts_with("Incorrect."));
        }
    }

    #[test]
    fn test_check_answer() {
        let correct = check_answer("A", "A");
        assert!(correct.starts_with("Correct!"));
        assert!(correct.contains('A'));

        let wrong = check_answer("B", "A");
        assert!(wrong.starts_with("Incorrect."));
        assert!(wrong.contains("You selected B"));
        assert!(wrong.contains("correct answer is A"));
    }

    #[test]
    fn test_check_answer_is_exact() {
        assert!(check_answer("energy", "Energy").starts_with("Incorrect."));
        assert!(check_answer("Energy ", "Energy").starts_with("Incorrect."));
    }
}
