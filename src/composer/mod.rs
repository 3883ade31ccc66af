//! Response Composer
//!
//! Renders display text from a match result. Phrase selection uses an
//! injected `StdRng` so output is reproducible under a fixed seed.

use crate::config::{ComposerConfig, HandoffConfig};
use crate::knowledge::{Category, PersonalityPool};
use crate::matcher::MatchResult;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

pub struct ResponseComposer {
    config: ComposerConfig,
    handoff: HandoffConfig,
    rng: Mutex<StdRng>,
}

impl ResponseComposer {
    pub fn new(config: ComposerConfig, handoff: HandoffConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, handoff, rng)
    }

    pub fn with_rng(config: ComposerConfig, handoff: HandoffConfig, rng: StdRng) -> Self {
        Self {
            config,
            handoff,
            rng: Mutex::new(rng),
        }
    }

    pub fn compose(&self, result: &MatchResult, personality: &PersonalityPool, raw_query: &str) -> String {
        match result {
            MatchResult::Direct { answer, .. } => self.direct(answer, personality),
            MatchResult::Suggest(ids) if !ids.is_empty() => self.suggestions(ids),
            MatchResult::Suggest(_) | MatchResult::None => self.fallback(personality, raw_query),
        }
    }

    /// `{handoff.base_url}?text={prefix + query, url-encoded}`
    pub fn handoff_link(&self, raw_query: &str) -> String {
        let message = format!("{}{}", self.handoff.prefill_prefix, raw_query);
        format!("{}?text={}", self.handoff.base_url, urlencoding::encode(&message))
    }

    pub fn handoff_line(&self, raw_query: &str) -> String {
        format!("{}: {}", self.handoff.label, self.handoff_link(raw_query))
    }

    /// Fixed message followed by the handoff link
    pub fn with_handoff(&self, message: &str, raw_query: &str) -> String {
        if message.is_empty() {
            self.handoff_line(raw_query)
        } else {
            format!("{}\n{}", message, self.handoff_line(raw_query))
        }
    }

    /// Replaces the handoff marker in a backend answer and appends the link.
    pub fn apply_handoff_marker(&self, answer: &str, raw_query: &str) -> String {
        if self.handoff.marker.is_empty() || !answer.contains(&self.handoff.marker) {
            return answer.to_string();
        }
        let cleaned = answer.replace(&self.handoff.marker, &self.handoff.label);
        format!("{}\n{}", cleaned.trim_end(), self.handoff_line(raw_query))
    }

    fn direct(&self, answer: &str, personality: &PersonalityPool) -> String {
        let greeting = self.pick(personality, Category::Greeting);
        let closing = if self.roll(self.config.closing_probability) {
            self.pick(personality, Category::Closing)
        } else {
            String::new()
        };

        [greeting.as_str(), answer, closing.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn suggestions(&self, ids: &[String]) -> String {
        let mut text = self.config.suggestion_header.clone();
        for id in ids {
            text.push_str("\n• ");
            text.push_str(self.title_for(id));
        }
        text
    }

    fn fallback(&self, personality: &PersonalityPool, raw_query: &str) -> String {
        let phrase = self.pick(personality, Category::Fallback);
        self.with_handoff(&phrase, raw_query)
    }

    /// Quick-reply title whose action is `id`, or the id itself
    fn title_for<'a>(&'a self, id: &'a str) -> &'a str {
        self.config
            .quick_replies
            .iter()
            .find(|reply| reply.action == id)
            .map(|reply| reply.title.as_str())
            .unwrap_or(id)
    }

    fn pick(&self, personality: &PersonalityPool, category: Category) -> String {
        let mut rng = match self.rng.lock() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        };
        personality
            .phrases(category)
            .choose(&mut *rng)
            .cloned()
            .unwrap_or_default()
    }

    fn roll(&self, probability: f64) -> bool {
        let mut rng = match self.rng.lock() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.gen_bool(probability.clamp(0.0, 1.0))
    }
}
