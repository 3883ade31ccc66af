use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of the in-memory session history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

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

/// Everything a backend needs to answer one question
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub instructions: String,
    pub business_data: String,
    pub history: Vec<ConversationTurn>,
    pub question: String,
}

impl PromptContext {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    fn system_text(&self) -> String {
        match (self.instructions.trim(), self.business_data.trim()) {
            (i, "") => i.to_string(),
            ("", d) => format!("BUSINESS INFORMATION:\n{}", d),
            (i, d) => format!("{}\n\nBUSINESS INFORMATION:\n{}", i, d),
        }
    }

    /// Chat-style message list: system, history, then the question
    pub fn messages(&self) -> Vec<ConversationTurn> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        let system = self.system_text();
        if !system.is_empty() {
            messages.push(ConversationTurn::system(system));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(ConversationTurn::user(self.question.clone()));
        messages
    }

    /// Single text prompt for backends without a message list
    pub fn flattened(&self) -> String {
        let mut prompt = self.system_text();
        if !self.history.is_empty() {
            prompt.push_str("\n\nCONVERSATION SO FAR:");
            for turn in &self.history {
                let who = match turn.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                    Role::System => "System",
                };
                prompt.push_str(&format!("\n{}: {}", who, turn.content));
            }
        }
        if !prompt.is_empty() {
            prompt.push_str("\n\n");
        }
        prompt.push_str("USER QUESTION:\n");
        prompt.push_str(&self.question);
        prompt
    }
}
