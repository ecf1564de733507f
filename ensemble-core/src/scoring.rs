//! Quality Scorer: derives the six dimensions of
//! [`crate::model::QualityDimensions`] for a single response.
//!
//! Each heuristic produces a 0..1 value with the factors that contributed
//! to it attached for audit. The toxicity dimension reuses
//! [`crate::guardrails::BlocklistGuardrail`]'s keyword-list approach.

use std::collections::HashSet;

use crate::guardrails::{BlocklistGuardrail, Guardrail};
use crate::model::{DimensionScore, ProviderResponse, QualityDimensions};

const DEFAULT_TOXIC_TERMS: &[&str] = &[
    "stupid", "idiot", "kill yourself", "hate you", "worthless", "shut up",
];

/// Stateless scorer; holds only the configuration needed to score a
/// response against its prompt.
pub struct QualityScorer {
    toxicity_guard: BlocklistGuardrail,
    weights: DimensionWeights,
}

/// Weights used to combine the six dimensions into a composite score.
#[derive(Debug, Clone, Copy)]
pub struct DimensionWeights {
    pub relevance: f64,
    pub completeness: f64,
    pub plausibility: f64,
    pub structure: f64,
    pub readability: f64,
    pub toxicity: f64,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            relevance: 0.3,
            completeness: 0.2,
            plausibility: 0.2,
            structure: 0.1,
            readability: 0.1,
            toxicity: 0.1,
        }
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self {
            toxicity_guard: BlocklistGuardrail::new(
                DEFAULT_TOXIC_TERMS.iter().map(|s| s.to_string()).collect(),
            ),
            weights: DimensionWeights::default(),
        }
    }
}

impl QualityScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: DimensionWeights) -> Self {
        Self { weights, ..Self::default() }
    }

    /// Score `response` against the `prompt` text it answers.
    pub fn score(&self, prompt_text: &str, response: &ProviderResponse) -> QualityDimensions {
        let relevance = self.relevance(prompt_text, &response.content);
        let completeness = self.completeness(&response.content);
        let plausibility = self.plausibility(&response.content);
        let structure = self.structure(&response.content);
        let readability = self.readability(&response.content);
        let toxicity = self.toxicity(&response.content);

        let composite = self.weights.relevance * relevance.value
            + self.weights.completeness * completeness.value
            + self.weights.plausibility * plausibility.value
            + self.weights.structure * structure.value
            + self.weights.readability * readability.value
            + self.weights.toxicity * (1.0 - toxicity.value);

        QualityDimensions {
            relevance,
            completeness,
            plausibility,
            structure,
            readability,
            toxicity,
            composite: composite.clamp(0.0, 1.0),
        }
    }

    /// Token-overlap between prompt and response, as a cheap relevance proxy.
    fn relevance(&self, prompt_text: &str, content: &str) -> DimensionScore {
        let prompt_terms = significant_terms(prompt_text);
        if prompt_terms.is_empty() {
            return DimensionScore::new(0.5);
        }
        let response_terms = significant_terms(content);
        let overlap = prompt_terms.intersection(&response_terms).count();
        let value = overlap as f64 / prompt_terms.len() as f64;
        DimensionScore::new(value).with_factor("term_overlap", value)
    }

    /// Length and paragraph count as a completeness proxy: very short
    /// answers are penalized, answers past a reasonable length plateau.
    fn completeness(&self, content: &str) -> DimensionScore {
        let word_count = content.split_whitespace().count();
        let length_score = (word_count as f64 / 150.0).min(1.0);
        let paragraph_count = content.split("\n\n").filter(|p| !p.trim().is_empty()).count();
        let structure_bonus = if paragraph_count > 1 { 0.1 } else { 0.0 };
        let value = (length_score + structure_bonus).min(1.0);
        DimensionScore::new(value)
            .with_factor("word_count", word_count as f64)
            .with_factor("paragraph_count", paragraph_count as f64)
    }

    /// Penalizes hedging/contradiction markers as a plausibility proxy.
    fn plausibility(&self, content: &str) -> DimensionScore {
        let lower = content.to_lowercase();
        let hedge_markers = ["i'm not sure", "i don't know", "might be wrong", "as an ai"];
        let hedges = hedge_markers.iter().filter(|m| lower.contains(*m)).count();
        let value = (1.0 - 0.2 * hedges as f64).max(0.0);
        DimensionScore::new(value).with_factor("hedge_markers", hedges as f64)
    }

    /// Detects headings, lists, and numbered steps.
    fn structure(&self, content: &str) -> DimensionScore {
        let has_headings = content.lines().any(|l| l.trim_start().starts_with('#'));
        let has_lists = content
            .lines()
            .any(|l| { let t = l.trim_start(); t.starts_with("- ") || t.starts_with("* ") });
        let has_numbered = content
            .lines()
            .any(|l| l.trim_start().chars().next().is_some_and(|c| c.is_ascii_digit()));
        let hits = [has_headings, has_lists, has_numbered].iter().filter(|b| **b).count();
        let value = hits as f64 / 3.0;
        DimensionScore::new(value)
            .with_factor("has_headings", has_headings as u8 as f64)
            .with_factor("has_lists", has_lists as u8 as f64)
    }

    /// Average sentence length, penalizing both extremely short and
    /// extremely long sentences.
    fn readability(&self, content: &str) -> DimensionScore {
        let sentences: Vec<&str> = content
            .split(['.', '!', '?'])
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if sentences.is_empty() {
            return DimensionScore::new(0.0);
        }
        let avg_words = sentences
            .iter()
            .map(|s| s.split_whitespace().count())
            .sum::<usize>() as f64
            / sentences.len() as f64;
        let value = if (8.0..=25.0).contains(&avg_words) {
            1.0
        } else if avg_words < 8.0 {
            (avg_words / 8.0).max(0.0)
        } else {
            (1.0 - (avg_words - 25.0) / 50.0).max(0.0)
        };
        DimensionScore::new(value).with_factor("avg_sentence_words", avg_words)
    }

    /// Blocklist-based toxicity proxy; value is the *toxicity* level, so
    /// 0 is clean and 1 is maximally toxic (inverted before combining).
    fn toxicity(&self, content: &str) -> DimensionScore {
        let result = self.toxicity_guard.validate(content);
        let value = if result.is_success() { 0.0 } else { 1.0 };
        DimensionScore::new(value).with_factor("blocklist_hit", 1.0 - value)
    }
}

fn significant_terms(text: &str) -> HashSet<String> {
    const STOPWORDS: &[&str] = &[
        "the", "a", "an", "is", "are", "was", "were", "of", "to", "in", "on", "for", "and", "or",
        "it", "this", "that", "with", "as", "be", "by", "at",
    ];
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResponseStatus, RoleTag};

    fn response(content: &str) -> ProviderResponse {
        ProviderResponse {
            role: RoleTag::new("gpt4o"),
            provider_name: "openai".into(),
            model_name: "gpt-4o-mini".into(),
            status: ResponseStatus::Fulfilled,
            content: content.to_string(),
            response_time_ms: 500,
            prompt_tokens: 10,
            response_tokens: 20,
            raw_confidence: 0.7,
        }
    }

    #[test]
    fn relevant_response_scores_higher_than_off_topic() {
        let scorer = QualityScorer::new();
        let on_topic = scorer.score(
            "Explain how photosynthesis works in plants",
            &response("Photosynthesis in plants converts sunlight into chemical energy."),
        );
        let off_topic = scorer.score(
            "Explain how photosynthesis works in plants",
            &response("The stock market closed lower today amid inflation concerns."),
        );
        assert!(on_topic.relevance.value > off_topic.relevance.value);
    }

    #[test]
    fn toxic_content_is_flagged() {
        let scorer = QualityScorer::new();
        let scored = scorer.score("hi", &response("You are so stupid and worthless."));
        assert_eq!(scored.toxicity.value, 1.0);
    }

    #[test]
    fn structured_response_scores_higher_structure() {
        let scorer = QualityScorer::new();
        let structured = scorer.score("list steps", &response("# Steps\n- one\n- two\n1. three"));
        let plain = scorer.score("list steps", &response("one two three"));
        assert!(structured.structure.value > plain.structure.value);
    }

    #[test]
    fn composite_is_bounded() {
        let scorer = QualityScorer::new();
        let scored = scorer.score("hi", &response("A reasonably complete and calm answer."));
        assert!(scored.composite >= 0.0 && scored.composite <= 1.0);
    }
}
