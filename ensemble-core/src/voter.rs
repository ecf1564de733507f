//! Voter: combines each response's quality, calibrated confidence,
//! intent alignment, structure, and response time into a base weight per
//! role, then applies a historical/diversity "hybrid adjustment" on top
//! before normalizing and picking a winner.
//!
//! The per-factor weighted sum mirrors how
//! [`crate::telemetry::PerformanceMonitor`] rolls several raw counters
//! into one derived view; here the inputs are quality dimensions rather
//! than latency counters.

use std::collections::HashMap;

use crate::intent::Intent;
use crate::model::{ComponentContribution, ConsensusLevel, RoleTag, ScoredResponse, VoteOutcome};

/// Weights applied to each base component before the hybrid adjustment.
/// Defaults mirror the emphasis the Quality Scorer itself places on
/// content.
#[derive(Debug, Clone, Copy)]
pub struct VoterWeights {
    pub content_quality: f64,
    pub calibrated_confidence: f64,
    pub intent_alignment: f64,
    pub structure: f64,
    pub response_time: f64,
}

impl Default for VoterWeights {
    fn default() -> Self {
        Self {
            content_quality: 0.40,
            calibrated_confidence: 0.25,
            intent_alignment: 0.20,
            structure: 0.10,
            response_time: 0.05,
        }
    }
}

/// How much the normalized embedding-uniqueness score contributes to a
/// role's adjusted weight, on top of the base weighted sum.
pub const DIVERSITY_BONUS_COEFFICIENT: f64 = 0.05;

/// Re-tabulates the base weight table for prompts of a given intent.
/// Most intents use the default table; a few shift emphasis toward the
/// component that best predicts quality for that kind of request.
pub fn weights_for_intent(intent: Intent) -> VoterWeights {
    match intent {
        Intent::Technical => VoterWeights {
            content_quality: 0.50,
            calibrated_confidence: 0.25,
            intent_alignment: 0.20,
            structure: 0.05,
            response_time: 0.0,
        },
        Intent::Creative => VoterWeights {
            content_quality: 0.35,
            calibrated_confidence: 0.15,
            intent_alignment: 0.25,
            structure: 0.20,
            response_time: 0.05,
        },
        Intent::Comparative => VoterWeights {
            content_quality: 0.35,
            calibrated_confidence: 0.20,
            intent_alignment: 0.25,
            structure: 0.15,
            response_time: 0.05,
        },
        Intent::Factual
        | Intent::Explanatory
        | Intent::ProblemSolving
        | Intent::Analytical
        | Intent::Instructional
        | Intent::General => VoterWeights::default(),
    }
}

#[derive(Default)]
pub struct Voter {
    /// `None` (the default) means the per-intent table from
    /// [`weights_for_intent`] is used for every vote. `Some` only when a
    /// caller explicitly overrides the table via [`Voter::with_weights`],
    /// pinning every vote to that one table regardless of intent.
    weights: Option<VoterWeights>,
}

impl Voter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: VoterWeights) -> Self {
        Self { weights: Some(weights) }
    }

    /// Run one vote over `responses`. `historical_multiplier` and
    /// `intent` are looked up by the caller (from the Voting History
    /// Store's rolling win rates and the Intent Classifier respectively)
    /// and passed in so the Voter itself stays free of I/O.
    pub fn vote(
        &self,
        responses: &[ScoredResponse],
        intent: Intent,
        historical_multiplier: impl Fn(&RoleTag) -> f64,
    ) -> VoteOutcome {
        if responses.is_empty() {
            return VoteOutcome {
                winner_role: None,
                normalized_weights: HashMap::new(),
                consensus_level: ConsensusLevel::VeryWeak,
                winner_confidence: 0.0,
                tie_breaker_used: None,
                meta_voter_used: false,
                abstain: true,
                component_contributions: HashMap::new(),
            };
        }

        let weights = self.weights.unwrap_or_else(|| weights_for_intent(intent));

        let fastest_ms = responses
            .iter()
            .map(|r| r.response.response_time_ms)
            .min()
            .unwrap_or(1)
            .max(1) as f64;

        let mut adjusted_weights: HashMap<RoleTag, f64> = HashMap::new();
        let mut contributions: HashMap<RoleTag, ComponentContribution> = HashMap::new();

        for response in responses {
            let role = response.role().clone();
            let content_quality = response.quality.composite;
            let calibrated_confidence = response.calibrated_confidence;
            let intent_alignment = intent_alignment_for(intent, response);
            let structure = response.quality.structure.value;
            let response_time = (fastest_ms / response.response.response_time_ms.max(1) as f64).min(1.0);
            let historical = historical_multiplier(&role).clamp(0.5, 2.0);
            let diversity = response.embedding_uniqueness;

            let base_weighted_sum = weights.content_quality * content_quality
                + weights.calibrated_confidence * calibrated_confidence
                + weights.intent_alignment * intent_alignment
                + weights.structure * structure
                + weights.response_time * response_time;

            let adjusted = base_weighted_sum * historical + DIVERSITY_BONUS_COEFFICIENT * diversity;

            adjusted_weights.insert(role.clone(), adjusted.max(0.0));
            contributions.insert(
                role,
                ComponentContribution {
                    content_quality,
                    calibrated_confidence,
                    intent_alignment,
                    structure,
                    response_time,
                    historical_multiplier: historical,
                    diversity_bonus: diversity,
                },
            );
        }

        let total: f64 = adjusted_weights.values().sum();
        let normalized_weights: HashMap<RoleTag, f64> = if total > 0.0 {
            adjusted_weights.iter().map(|(role, w)| (role.clone(), w / total)).collect()
        } else {
            let uniform = 1.0 / adjusted_weights.len() as f64;
            adjusted_weights.keys().map(|role| (role.clone(), uniform)).collect()
        };

        let mut sorted: Vec<(&RoleTag, &f64)> = normalized_weights.iter().collect();
        sorted.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap());

        let (winner_role, winner_weight, consensus_level) = if sorted.len() == 1 {
            (Some(sorted[0].0.clone()), *sorted[0].1, ConsensusLevel::Weak)
        } else {
            let w1 = *sorted[0].1;
            let margin = sorted[0].1 - sorted[1].1;
            (Some(sorted[0].0.clone()), w1, consensus_from_margin(w1, margin))
        };

        VoteOutcome {
            winner_role,
            normalized_weights,
            consensus_level,
            winner_confidence: winner_weight,
            tie_breaker_used: None,
            meta_voter_used: false,
            abstain: false,
            component_contributions: contributions,
        }
    }
}

fn intent_alignment_for(intent: Intent, response: &ScoredResponse) -> f64 {
    crate::intent::IntentClassifier::new().alignment(intent, &response.response.content)
}

/// Maps the winner's weight (`w1`) and its margin over the runner-up to
/// a qualitative consensus label via a compound table: the stronger
/// labels require both a high absolute weight and a wide margin, while
/// the weaker labels only require a minimum absolute weight.
fn consensus_from_margin(w1: f64, margin: f64) -> ConsensusLevel {
    if w1 >= 0.70 && margin >= 0.30 {
        ConsensusLevel::VeryStrong
    } else if w1 >= 0.60 && margin >= 0.20 {
        ConsensusLevel::Strong
    } else if w1 >= 0.45 {
        ConsensusLevel::Moderate
    } else if w1 >= 0.35 {
        ConsensusLevel::Weak
    } else {
        ConsensusLevel::VeryWeak
    }
}

/// A margin this small (or smaller) between the top two candidates is
/// considered a tie requiring escalation.
pub const TIE_MARGIN_THRESHOLD: f64 = 0.05;

pub fn is_tie(outcome: &VoteOutcome) -> bool {
    if outcome.normalized_weights.len() < 2 {
        return false;
    }
    let mut sorted: Vec<&f64> = outcome.normalized_weights.values().collect();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
    (sorted[0] - sorted[1]) <= TIE_MARGIN_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DimensionScore, QualityDimensions, ResponseStatus, RoleTag};

    fn scored(role: &str, composite: f64, calibrated: f64, time_ms: u64, uniqueness: f64) -> ScoredResponse {
        ScoredResponse {
            response: crate::model::ProviderResponse {
                role: RoleTag::new(role),
                provider_name: "openai".into(),
                model_name: "gpt-4o-mini".into(),
                status: ResponseStatus::Fulfilled,
                content: "A clear structured answer.".into(),
                response_time_ms: time_ms,
                prompt_tokens: 10,
                response_tokens: 20,
                raw_confidence: 0.7,
            },
            quality: QualityDimensions {
                composite,
                structure: DimensionScore::new(0.5),
                ..Default::default()
            },
            embedding_uniqueness: uniqueness,
            calibrated_confidence: calibrated,
        }
    }

    #[test]
    fn empty_responses_abstain() {
        let voter = Voter::new();
        let outcome = voter.vote(&[], Intent::Factual, |_| 1.0);
        assert!(outcome.abstain);
        assert!(outcome.winner_role.is_none());
    }

    #[test]
    fn higher_quality_response_wins() {
        let voter = Voter::new();
        let responses = vec![
            scored("gpt4o", 0.95, 0.9, 500, 0.6),
            scored("gemini", 0.1, 0.1, 500, 0.6),
        ];
        let outcome = voter.vote(&responses, Intent::Factual, |_| 1.0);
        assert_eq!(outcome.winner_role, Some(RoleTag::new("gpt4o")));
        assert_eq!(outcome.consensus_level, ConsensusLevel::VeryStrong);
    }

    #[test]
    fn close_scores_are_detected_as_a_tie() {
        let voter = Voter::new();
        let responses = vec![
            scored("gpt4o", 0.70, 0.70, 500, 0.5),
            scored("gemini", 0.705, 0.705, 500, 0.5),
        ];
        let outcome = voter.vote(&responses, Intent::Factual, |_| 1.0);
        assert!(is_tie(&outcome));
    }

    #[test]
    fn weights_sum_to_one() {
        let voter = Voter::new();
        let responses = vec![
            scored("gpt4o", 0.8, 0.7, 400, 0.5),
            scored("gemini", 0.6, 0.5, 600, 0.4),
            scored("claude", 0.7, 0.6, 500, 0.6),
        ];
        let outcome = voter.vote(&responses, Intent::Factual, |_| 1.0);
        assert!((outcome.weights_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn single_response_is_always_weak_consensus() {
        let voter = Voter::new();
        let responses = vec![scored("gpt4o", 0.95, 0.9, 500, 0.6)];
        let outcome = voter.vote(&responses, Intent::Factual, |_| 1.0);
        assert_eq!(outcome.consensus_level, ConsensusLevel::Weak);
    }

    #[test]
    fn low_weight_wide_margin_is_not_very_strong() {
        assert_eq!(consensus_from_margin(0.35, 0.33), ConsensusLevel::Weak);
    }

    #[test]
    fn technical_intent_raises_content_quality_and_zeroes_response_time() {
        let weights = weights_for_intent(Intent::Technical);
        assert_eq!(weights.content_quality, 0.50);
        assert_eq!(weights.response_time, 0.0);
    }
}
