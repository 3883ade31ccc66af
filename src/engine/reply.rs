use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    /// Backend answer or direct knowledge match
    Answer,
    /// "Did you mean" list
    Suggestion,
    /// No match; fallback phrase plus handoff link
    Fallback,
    /// Visible admission denial (wait time, quota)
    Notice,
    /// Unrecovered failure; apology plus handoff link
    Apology,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub kind: ReplyKind,
    pub text: String,
}

impl Reply {
    pub fn new(kind: ReplyKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    /// Whether this reply counts against the session quota
    pub fn is_delivery(&self) -> bool {
        matches!(self.kind, ReplyKind::Answer | ReplyKind::Suggestion | ReplyKind::Fallback)
    }
}

/// Whatever renders replies: a terminal, a chat widget, a test buffer
pub trait ReplySink {
    fn deliver(&mut self, reply: &Reply);
}

impl ReplySink for Vec<Reply> {
    fn deliver(&mut self, reply: &Reply) {
        self.push(reply.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_sink_collects_in_order() {
        let mut sink: Vec<Reply> = Vec::new();
        sink.deliver(&Reply::new(ReplyKind::Answer, "first"));
        sink.deliver(&Reply::new(ReplyKind::Notice, "second"));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink[1].text, "second");
    }

    #[test]
    fn test_only_answers_count_as_deliveries() {
        assert!(Reply::new(ReplyKind::Fallback, "").is_delivery());
        assert!(!Reply::new(ReplyKind::Notice, "").is_delivery());
        assert!(!Reply::new(ReplyKind::Apology, "").is_delivery());
    }
}
