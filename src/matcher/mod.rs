//! Fuzzy Matcher
//!
//! Information Hiding:
//! - Index layout (pre-lowered keyword char vectors) hidden
//! - Scoring scheme hidden; callers only see scores in [0, 1], 0 = exact
//! - Tier thresholds come from `MatcherConfig`

pub mod distance;

use crate::config::MatcherConfig;
use crate::knowledge::KnowledgeRecord;
use once_cell::sync::Lazy;
use regex::Regex;

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s,]+").expect("separator pattern is valid"));

/// Outcome of matching one query
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Direct { rule_id: String, answer: String },
    Suggest(Vec<String>),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub rule_id: String,
    pub score: f64,
}

struct IndexedRule {
    id: String,
    keywords: Vec<Vec<char>>,
    answer: String,
}

pub struct FuzzyMatcher {
    config: MatcherConfig,
    rules: Vec<IndexedRule>,
}

impl FuzzyMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            config,
            rules: Vec::new(),
        }
    }

    pub fn build_index(&mut self, rules: &[KnowledgeRecord]) {
        self.rules = rules
            .iter()
            .map(|rule| IndexedRule {
                id: rule.id.clone(),
                keywords: rule
                    .keywords
                    .iter()
                    .map(|k| k.to_lowercase().chars().collect())
                    .collect(),
                answer: rule.answer.clone(),
            })
            .collect();
        tracing::debug!("[FuzzyMatcher] Indexed {} rules", self.rules.len());
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Lower-cased tokens long enough to be meaningful
    pub fn tokenize(&self, text: &str) -> Vec<Vec<char>> {
        SEPARATORS
            .split(&text.to_lowercase())
            .filter(|t| t.chars().count() >= self.config.min_token_length)
            .map(|t| t.chars().collect())
            .collect()
    }

    /// Best-first candidates for the OR of all query tokens.
    pub fn search(&self, text: &str) -> Vec<Candidate> {
        let tokens = self.tokenize(text);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<Candidate> = self
            .rules
            .iter()
            .filter_map(|rule| {
                let best = tokens
                    .iter()
                    .flat_map(|token| rule.keywords.iter().map(move |kw| distance::score(token, kw)))
                    .fold(1.0_f64, f64::min);
                (best < 1.0).then(|| Candidate {
                    rule_id: rule.id.clone(),
                    score: best,
                })
            })
            .collect();

        candidates.sort_by(|a, b| a.score.total_cmp(&b.score));
        candidates.truncate(self.config.max_candidates);
        candidates
    }

    pub fn query(&self, text: &str) -> MatchResult {
        let candidates = self.search(text);
        let result = self.classify(&candidates);
        tracing::debug!(
            "[FuzzyMatcher] '{}' -> best {:?}, {:?}",
            text,
            candidates.first().map(|c| c.score),
            result
        );
        result
    }

    /// Maps ranked candidates onto Direct / Suggest / None.
    pub fn classify(&self, candidates: &[Candidate]) -> MatchResult {
        let Some(best) = candidates.first() else {
            return MatchResult::None;
        };

        if best.score < self.config.direct_threshold {
            return match self.rules.iter().find(|r| r.id == best.rule_id) {
                Some(rule) => MatchResult::Direct {
                    rule_id: rule.id.clone(),
                    answer: rule.answer.clone(),
                },
                None => MatchResult::None,
            };
        }

        if best.score < self.config.suggest_threshold {
            let ids: Vec<String> = candidates
                .iter()
                .filter(|c| c.score < self.config.suggestion_cutoff)
                .take(self.config.max_suggestions)
                .map(|c| c.rule_id.clone())
                .collect();
            return MatchResult::Suggest(ids);
        }

        MatchResult::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, keywords: &[&str], answer: &str) -> KnowledgeRecord {
        KnowledgeRecord {
            id: id.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            answer: answer.to_string(),
        }
    }

    fn matcher() -> FuzzyMatcher {
        let mut matcher = FuzzyMatcher::new(MatcherConfig::default());
        matcher.build_index(&[
            rule("price", &["precio", "costo"], "Cuesta 10 soles"),
            rule("delivery", &["delivery", "envio"], "Enviamos a todo Lima"),
            rule("hours", &["horario", "hora de atencion"], "De 9 a 6"),
            rule("payment", &["yape", "tarjeta"], "Aceptamos Yape y tarjeta"),
        ]);
        matcher
    }

    fn candidate(id: &str, score: f64) -> Candidate {
        Candidate {
            rule_id: id.to_string(),
            score,
        }
    }

    #[test]
    fn test_score_below_direct_threshold_returns_answer_verbatim() {
        let matcher = matcher();
        let result = matcher.classify(&[candidate("price", 0.35), candidate("hours", 0.5)]);
        assert_eq!(
            result,
            MatchResult::Direct {
                rule_id: "price".into(),
                answer: "Cuesta 10 soles".into()
            }
        );
    }

    #[test]
    fn test_middle_score_suggests_up_to_three() {
        let matcher = matcher();
        let result = matcher.classify(&[
            candidate("price", 0.5),
            candidate("hours", 0.55),
            candidate("delivery", 0.6),
            candidate("payment", 0.62),
            candidate("other", 0.63),
        ]);
        assert_eq!(
            result,
            MatchResult::Suggest(vec!["price".into(), "hours".into(), "delivery".into()])
        );

        let filtered = matcher.classify(&[candidate("price", 0.5), candidate("hours", 0.7)]);
        assert_eq!(filtered, MatchResult::Suggest(vec!["price".into()]));
    }

    #[test]
    fn test_high_score_or_no_candidates_is_none() {
        let matcher = matcher();
        assert_eq!(matcher.classify(&[candidate("price", 0.8)]), MatchResult::None);
        assert_eq!(matcher.classify(&[candidate("price", 0.6)]), MatchResult::None);
        assert_eq!(matcher.classify(&[]), MatchResult::None);
    }

    #[test]
    fn test_exact_keyword_is_direct() {
        let result = matcher().query("Cual es el precio?");
        assert!(matches!(result, MatchResult::Direct { ref rule_id, .. } if rule_id == "price"));
    }

    #[test]
    fn test_typo_still_matches_directly() {
        let result = matcher().query("hacen delivey a miraflores");
        assert!(matches!(result, MatchResult::Direct { ref rule_id, .. } if rule_id == "delivery"));
    }

    #[test]
    fn test_short_tokens_are_noise() {
        let matcher = matcher();
        assert!(matcher.tokenize("a la de yo").is_empty());
        assert_eq!(matcher.query("a la de yo"), MatchResult::None);
    }

    #[test]
    fn test_search_ranks_ascending_and_caps_results() {
        let matcher = matcher();
        let candidates = matcher.search("horario, envio");
        assert!(candidates.len() <= 5);
        assert_eq!(candidates[0].score, 0.0);
        assert!(candidates.windows(2).all(|w| w[0].score <= w[1].score));
    }

    #[test]
    fn test_unrelated_query_is_none() {
        assert_eq!(matcher().query("zzzzqqqq"), MatchResult::None);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let mut strict = FuzzyMatcher::new(MatcherConfig {
            direct_threshold: 0.1,
            ..MatcherConfig::default()
        });
        strict.build_index(&[rule("price", &["precio"], "Diez")]);

        // one typo in seven letters scores ~0.14
        assert!(matches!(strict.query("precios"), MatchResult::Suggest(_)));
    }
}
