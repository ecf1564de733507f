//! Validator: post-synthesis gate over four dimensions, with
//! strict/standard/lenient threshold profiles.

use std::collections::{HashMap, HashSet};

use crate::model::{IssueSeverity, ScoredResponse, SynthesizedAnswer, ValidationIssue, ValidationReport};

/// Threshold profile selected per tier or per caller preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    Strict,
    Standard,
    Lenient,
}

#[derive(Debug, Clone, Copy)]
struct Thresholds {
    relevance: f64,
    completeness: f64,
    plausibility: f64,
    cross_response_consistency: f64,
}

impl Strictness {
    fn thresholds(&self) -> Thresholds {
        match self {
            Strictness::Strict => {
                Thresholds { relevance: 0.7, completeness: 0.7, plausibility: 0.7, cross_response_consistency: 0.8 }
            }
            Strictness::Standard => {
                Thresholds { relevance: 0.5, completeness: 0.5, plausibility: 0.5, cross_response_consistency: 0.6 }
            }
            Strictness::Lenient => {
                Thresholds { relevance: 0.3, completeness: 0.3, plausibility: 0.3, cross_response_consistency: 0.4 }
            }
        }
    }
}

pub struct Validator {
    strictness: Strictness,
}

impl Validator {
    pub fn new(strictness: Strictness) -> Self {
        Self { strictness }
    }

    /// Validate `answer` (the Synthesizer's output for `prompt_text`)
    /// against the other scored responses that did not win the vote, so
    /// cross-response consistency can be checked for contradictions.
    pub fn validate(
        &self,
        prompt_text: &str,
        answer: &SynthesizedAnswer,
        others: &[ScoredResponse],
    ) -> ValidationReport {
        let thresholds = self.strictness.thresholds();

        let relevance = relevance_score(prompt_text, &answer.text);
        let completeness = completeness_score(&answer.text);
        let plausibility = plausibility_score(&answer.text);
        let cross_response_consistency = cross_response_consistency_score(&answer.text, others);

        let mut dimension_scores = HashMap::new();
        dimension_scores.insert("relevance".to_string(), (relevance, thresholds.relevance));
        dimension_scores.insert("completeness".to_string(), (completeness, thresholds.completeness));
        dimension_scores.insert("plausibility".to_string(), (plausibility, thresholds.plausibility));
        dimension_scores.insert(
            "cross_response_consistency".to_string(),
            (cross_response_consistency, thresholds.cross_response_consistency),
        );

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let mut passed = true;

        for (name, (score, threshold)) in dimension_scores.iter() {
            if *score < *threshold {
                passed = false;
                issues.push(ValidationIssue {
                    dimension: name.clone(),
                    severity: if *score < threshold * 0.6 { IssueSeverity::Error } else { IssueSeverity::Warning },
                    message: format!("{} scored {:.2}, below the {:.2} threshold", name, score, threshold),
                });
                recommendations.push(recommendation_for(name));
            }
        }

        ValidationReport { passed, dimension_scores, issues, recommendations }
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

/// Token-overlap between the original prompt and the synthesized answer.
fn relevance_score(prompt_text: &str, answer_text: &str) -> f64 {
    let prompt_terms = significant_terms(prompt_text);
    if prompt_terms.is_empty() {
        return 0.5;
    }
    let answer_terms = significant_terms(answer_text);
    let overlap = prompt_terms.intersection(&answer_terms).count();
    (overlap as f64 / prompt_terms.len() as f64).min(1.0)
}

/// Length-based completeness proxy: very short answers are penalized,
/// answers past a reasonable length plateau.
fn completeness_score(answer_text: &str) -> f64 {
    let word_count = answer_text.split_whitespace().count();
    (word_count as f64 / 150.0).min(1.0)
}

/// Penalizes hedging markers as a plausibility proxy.
fn plausibility_score(answer_text: &str) -> f64 {
    let lower = answer_text.to_lowercase();
    let hedge_markers = ["i'm not sure", "i don't know", "might be wrong", "as an ai"];
    let hedges = hedge_markers.iter().filter(|m| lower.contains(*m)).count();
    (1.0 - 0.2 * hedges as f64).max(0.0)
}

/// Pairs of terms that, when one appears in the synthesized answer and
/// the opposing term appears in an un-synthesized response, suggest the
/// synthesis contradicts another model rather than merely omitting it.
const OPPOSING_TERM_PAIRS: &[(&str, &str)] = &[
    ("is safe", "is not safe"),
    ("is true", "is false"),
    ("does", "does not"),
    ("can", "cannot"),
    ("will", "will not"),
    ("increases", "decreases"),
    ("supports", "contradicts"),
];

/// Checks the answer text against the other responses that did not win
/// the vote: penalizes direct contradictions (an opposing-term pair
/// split across the two texts) and rewards shared key phrases (the
/// synthesis agreeing with what other models also said).
fn cross_response_consistency_score(answer_text: &str, others: &[ScoredResponse]) -> f64 {
    if others.is_empty() {
        return 1.0;
    }
    let answer_lower = answer_text.to_lowercase();
    let answer_terms = significant_terms(answer_text);

    let mut contradictions = 0usize;
    let mut agreement_hits = 0usize;

    for other in others {
        let other_lower = other.response.content.to_lowercase();
        for (a, b) in OPPOSING_TERM_PAIRS {
            if (answer_lower.contains(a) && other_lower.contains(b))
                || (answer_lower.contains(b) && other_lower.contains(a))
            {
                contradictions += 1;
            }
        }
        let other_terms = significant_terms(&other.response.content);
        if answer_terms.intersection(&other_terms).count() >= 3 {
            agreement_hits += 1;
        }
    }

    if contradictions > 0 {
        let contradiction_penalty = (contradictions as f64 * 0.25).min(1.0);
        return (1.0 - contradiction_penalty).clamp(0.0, 1.0);
    }
    let agreement_bonus = 0.2 * (agreement_hits as f64 / others.len() as f64);
    (1.0 + agreement_bonus).clamp(0.0, 1.0)
}

fn recommendation_for(dimension: &str) -> String {
    match dimension {
        "relevance" => "Keep the synthesized answer anchored to the prompt's own terms.".to_string(),
        "completeness" => "Raise the section budget or relax the redundancy threshold.".to_string(),
        "plausibility" => "Strip hedging language before returning the answer.".to_string(),
        "cross_response_consistency" => "Reconcile or explain the contradiction against other responses.".to_string(),
        other => format!("Review the {} dimension.", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DimensionScore, ProviderResponse, QualityDimensions, ResponseStatus, RoleTag, SectionType};

    fn answer(text: &str, roles: Vec<&str>, sections: usize) -> SynthesizedAnswer {
        SynthesizedAnswer {
            text: text.to_string(),
            contributing_roles: roles.into_iter().map(RoleTag::new).collect(),
            section_plan: vec![SectionType::Introduction; sections],
            quality_improvement: 0.1,
        }
    }

    fn other_response(role: &str, content: &str) -> ScoredResponse {
        ScoredResponse {
            response: ProviderResponse {
                role: RoleTag::new(role),
                provider_name: "openai".into(),
                model_name: "gpt-4o-mini".into(),
                status: ResponseStatus::Fulfilled,
                content: content.to_string(),
                response_time_ms: 500,
                prompt_tokens: 10,
                response_tokens: 20,
                raw_confidence: 0.7,
            },
            quality: QualityDimensions { structure: DimensionScore::new(0.5), ..Default::default() },
            embedding_uniqueness: 0.5,
            calibrated_confidence: 0.7,
        }
    }

    #[test]
    fn strict_profile_has_higher_thresholds_than_lenient() {
        let strict = Strictness::Strict.thresholds();
        let lenient = Strictness::Lenient.thresholds();
        assert!(strict.relevance > lenient.relevance);
        assert!(strict.completeness > lenient.completeness);
    }

    #[test]
    fn answer_unrelated_to_prompt_fails_relevance() {
        let validator = Validator::new(Strictness::Standard);
        let a = answer(
            "The stock market closed lower today amid inflation concerns.",
            vec!["gpt4o"],
            1,
        );
        let report = validator.validate("Explain how photosynthesis works", &a, &[]);
        assert!(!report.passed);
        assert!(report.issues.iter().any(|i| i.dimension == "relevance"));
    }

    #[test]
    fn well_formed_answer_passes_lenient_profile() {
        let validator = Validator::new(Strictness::Lenient);
        let text = "Photosynthesis converts sunlight into chemical energy that plants use to grow. Plants rely on chlorophyll, a pigment found in chloroplasts, to capture light and drive the reaction. This process combines carbon dioxide from the air with water drawn up through the roots, producing glucose the plant uses for energy and releasing oxygen as a byproduct into the surrounding atmosphere. The rate of photosynthesis depends on light intensity, temperature, and the concentration of carbon dioxide available to the leaf.";
        let a = answer(text, vec!["gpt4o"], 2);
        let report = validator.validate("Explain how photosynthesis works in plants", &a, &[]);
        assert!(report.passed);
    }

    #[test]
    fn direct_contradiction_fails_consistency() {
        let validator = Validator::new(Strictness::Strict);
        let a = answer("This approach is safe for production use.", vec!["gpt4o"], 1);
        let others = vec![other_response("gemini", "This approach is not safe for production use.")];
        let report = validator.validate("is this approach safe", &a, &others);
        assert!(report.issues.iter().any(|i| i.dimension == "cross_response_consistency"));
    }
}
