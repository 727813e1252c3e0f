//! Chain tuning knobs. Everything has a fixed default; deployments mostly
//! touch only the token budget and the lexical ranker.

use std::sync::Arc;

/// Pure lexical scorer over `(query, content)`. Scores above zero count as a
/// match; the default ranker returns the fraction of query tokens found in
/// the content.
pub type LexicalRanker = Arc<dyn Fn(&str, &str) -> f64 + Send + Sync>;

#[derive(Clone)]
pub struct ChainConfig {
    /// Default recall token budget when the caller does not pass one.
    pub max_tokens_default: usize,
    /// Half-life, in days, of the recency term in the recall score.
    pub recall_half_life_days: f64,
    /// Entries touched or created within this many days are `hot`.
    pub decay_hot_days: f64,
    /// Entries within this many days are `warm`; older are `cold`.
    pub decay_warm_days: f64,
    /// Optional replacement for the built-in lexical ranker.
    pub lexical_ranker: Option<LexicalRanker>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_tokens_default: 2048,
            recall_half_life_days: 7.0,
            decay_hot_days: 7.0,
            decay_warm_days: 30.0,
            lexical_ranker: None,
        }
    }
}

impl ChainConfig {
    pub fn lexical_score(&self, query: &str, content: &str) -> f64 {
        match &self.lexical_ranker {
            Some(ranker) => ranker(query, content),
            None => token_overlap(query, content),
        }
    }
}

/// Default lexical ranker: the fraction of query tokens that appear in the
/// content, case-insensitively, as substrings. Pure in `(query, content)`.
pub fn token_overlap(query: &str, content: &str) -> f64 {
    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let haystack = content.to_lowercase();
    let hits = tokens
        .iter()
        .filter(|t| haystack.contains(&t.to_lowercase()))
        .count();
    hits as f64 / tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_overlap_is_case_insensitive() {
        assert_eq!(token_overlap("DARK", "user prefers dark mode"), 1.0);
        assert_eq!(token_overlap("dark theme", "user prefers dark mode"), 0.5);
        assert_eq!(token_overlap("absent", "user prefers dark mode"), 0.0);
        assert_eq!(token_overlap("", "anything"), 0.0);
    }

    #[test]
    fn plugged_ranker_wins() {
        let config = ChainConfig {
            lexical_ranker: Some(Arc::new(|_, _| 0.25)),
            ..ChainConfig::default()
        };
        assert_eq!(config.lexical_score("q", "c"), 0.25);
    }
}
