//! Request and response bodies for the two backend families

use super::prompt::ConversationTurn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct NativeRequest {
    pub contents: Vec<NativeContent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct NativeContent {
    #[serde(default)]
    pub parts: Vec<NativePart>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct NativePart {
    #[serde(default)]
    pub text: String,
}

impl NativeRequest {
    pub fn from_prompt(prompt: String) -> Self {
        Self {
            contents: vec![NativeContent {
                parts: vec![NativePart { text: prompt }],
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct NativeResponse {
    #[serde(default)]
    candidates: Vec<NativeCandidate>,
}

#[derive(Debug, Deserialize)]
struct NativeCandidate {
    content: Option<NativeContent>,
}

impl NativeResponse {
    /// Text of the first part of the first candidate
    pub fn into_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ConversationTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatResponse {
    pub fn into_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
    }
}
