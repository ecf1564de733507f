//! Escalation chain run when the Voter reports a tie: Tie-Breaker first,
//! Meta-Voter second, Abstention last.

use std::collections::HashMap;

use crate::model::{RoleTag, ScoredResponse, TieBreakStrategy, VoteOutcome};

/// Per-role long-term win rate, consulted by the Tie-Breaker's first
/// strategy.
pub trait HistoricalWinRates {
    fn win_rate(&self, role: &RoleTag) -> Option<f64>;
}

/// A `HistoricalWinRates` source with no data, so the Tie-Breaker always
/// falls through to its next strategy.
pub struct NoHistory;

impl HistoricalWinRates for NoHistory {
    fn win_rate(&self, _role: &RoleTag) -> Option<f64> {
        None
    }
}

/// Deterministic tie-breaking strategies, tried in order.
pub struct TieBreaker;

impl TieBreaker {
    /// Attempt to resolve a tie deterministically via historical win rate,
    /// calibrated probability, or embedding uniqueness, in that order.
    /// Returns `None` when none of the three separate the candidates,
    /// leaving the caller to escalate to the Meta-Voter.
    pub fn resolve(
        outcome: &VoteOutcome,
        responses: &[ScoredResponse],
        history: &dyn HistoricalWinRates,
    ) -> Option<(RoleTag, TieBreakStrategy)> {
        let candidates = top_candidates(outcome);
        if candidates.len() < 2 {
            return outcome.winner_role.clone().map(|r| (r, TieBreakStrategy::LexicographicRoleTag));
        }

        if let Some(role) = best_by(&candidates, |role| history.win_rate(role)) {
            return Some((role, TieBreakStrategy::HistoricalWinRate));
        }

        let calibrated: HashMap<&RoleTag, f64> = responses
            .iter()
            .map(|r| (r.role(), r.calibrated_confidence))
            .collect();
        if let Some(role) = best_by(&candidates, |role| calibrated.get(role).copied()) {
            return Some((role, TieBreakStrategy::CalibratedProbability));
        }

        let uniqueness: HashMap<&RoleTag, f64> = responses
            .iter()
            .map(|r| (r.role(), r.embedding_uniqueness))
            .collect();
        if let Some(role) = best_by(&candidates, |role| uniqueness.get(role).copied()) {
            return Some((role, TieBreakStrategy::EmbeddingUniqueness));
        }

        None
    }

    /// Lexicographic role tag order. Always succeeds given at least one
    /// candidate, so it is used as the deterministic floor once the
    /// Meta-Voter has also failed to separate the candidates, rather than
    /// as a tie-break strategy in its own right.
    fn lexicographic(candidates: &[RoleTag]) -> Option<RoleTag> {
        let mut sorted = candidates.to_vec();
        sorted.sort();
        sorted.into_iter().next()
    }
}

fn top_candidates(outcome: &VoteOutcome) -> Vec<RoleTag> {
    let mut sorted: Vec<(&RoleTag, &f64)> = outcome.normalized_weights.iter().collect();
    sorted.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap());
    if sorted.is_empty() {
        return Vec::new();
    }
    let top_weight = *sorted[0].1;
    sorted
        .into_iter()
        .take_while(|(_, w)| (**w - top_weight).abs() <= crate::voter::TIE_MARGIN_THRESHOLD)
        .map(|(role, _)| role.clone())
        .collect()
}

/// Picks the candidate with the strictly-highest value of `f`, requiring
/// every candidate to report a value and a clear (non-tied) maximum,
/// otherwise this strategy is skipped in favor of the next.
fn best_by(candidates: &[RoleTag], f: impl Fn(&RoleTag) -> Option<f64>) -> Option<RoleTag> {
    let mut values: Vec<(RoleTag, f64)> = Vec::new();
    for role in candidates {
        values.push((role.clone(), f(role)?));
    }
    values.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    if values.len() >= 2 && (values[0].1 - values[1].1).abs() < 1e-9 {
        return None;
    }
    values.into_iter().next().map(|(role, _)| role)
}

/// A synthetic "judge" vote, invoked only when the Tie-Breaker's
/// deterministic strategies all fail to separate the candidates. The
/// gateway asks a single fixed rubric prompt and expects a
/// role tag back; the prompt template itself lives with the Orchestrator
/// since it needs the candidate texts to fill it in.
pub const META_VOTER_RUBRIC: &str = "\
You are judging which of the following candidate answers best addresses \
the user's prompt. Consider accuracy, completeness, and clarity. \
Respond with only the role tag of the single best candidate.";

/// Parses a Meta-Voter response, matching it against the known
/// candidate role tags case-insensitively and ignoring surrounding
/// punctuation/whitespace.
pub fn parse_meta_voter_choice(raw: &str, candidates: &[RoleTag]) -> Option<RoleTag> {
    let cleaned = raw.trim().trim_matches(|c: char| !c.is_alphanumeric());
    candidates.iter().find(|c| c.0.eq_ignore_ascii_case(cleaned)).cloned()
}

/// Escalation outcome once the full chain (Tie-Breaker -> Meta-Voter ->
/// Abstention) has run.
#[derive(Debug, Clone)]
pub enum EscalationResult {
    Resolved { role: RoleTag, strategy: TieBreakStrategy },
    MetaVoterResolved { role: RoleTag },
    Abstained,
}

/// Runs the full chain for a vote the Voter has already flagged as tied
/// (callers should check [`crate::voter::is_tie`] before invoking this;
/// calling it on a clear winner just re-derives the same winner via
/// lexicographic tie-break over a one-candidate set). `meta_voter` is
/// called only if the Tie-Breaker cannot resolve the tie deterministically.
pub fn escalate(
    outcome: &VoteOutcome,
    responses: &[ScoredResponse],
    history: &dyn HistoricalWinRates,
    meta_voter: impl FnOnce(&[RoleTag]) -> Option<RoleTag>,
) -> EscalationResult {
    if outcome.abstain {
        return EscalationResult::Abstained;
    }

    if let Some((role, strategy)) = TieBreaker::resolve(outcome, responses, history) {
        return EscalationResult::Resolved { role, strategy };
    }

    let candidates = top_candidates(outcome);
    if let Some(role) = meta_voter(&candidates) {
        return EscalationResult::MetaVoterResolved { role };
    }

    match TieBreaker::lexicographic(&candidates) {
        Some(role) => EscalationResult::Resolved { role, strategy: TieBreakStrategy::LexicographicRoleTag },
        None => EscalationResult::Abstained,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    struct FixedHistory(StdHashMap<String, f64>);
    impl HistoricalWinRates for FixedHistory {
        fn win_rate(&self, role: &RoleTag) -> Option<f64> {
            self.0.get(&role.0).copied()
        }
    }

    fn tied_outcome() -> VoteOutcome {
        let mut weights = HashMap::new();
        weights.insert(RoleTag::new("gpt4o"), 0.501);
        weights.insert(RoleTag::new("gemini"), 0.499);
        VoteOutcome {
            winner_role: Some(RoleTag::new("gpt4o")),
            normalized_weights: weights,
            consensus_level: crate::model::ConsensusLevel::VeryWeak,
            winner_confidence: 0.501,
            tie_breaker_used: None,
            meta_voter_used: false,
            abstain: false,
            component_contributions: HashMap::new(),
        }
    }

    #[test]
    fn tie_breaker_uses_historical_win_rate_first() {
        let outcome = tied_outcome();
        let mut rates = StdHashMap::new();
        rates.insert("gpt4o".to_string(), 0.4);
        rates.insert("gemini".to_string(), 0.6);
        let history = FixedHistory(rates);
        let (role, strategy) = TieBreaker::resolve(&outcome, &[], &history).unwrap();
        assert_eq!(role, RoleTag::new("gemini"));
        assert_eq!(strategy, TieBreakStrategy::HistoricalWinRate);
    }

    #[test]
    fn escalation_falls_through_to_meta_voter() {
        let outcome = tied_outcome();
        let history = NoHistory;
        let result = escalate(&outcome, &[], &history, |candidates| {
            Some(candidates[0].clone())
        });
        assert!(matches!(result, EscalationResult::MetaVoterResolved { .. }));
    }

    #[test]
    fn escalation_abstains_when_nothing_resolves() {
        let outcome = VoteOutcome {
            winner_role: None,
            normalized_weights: HashMap::new(),
            consensus_level: crate::model::ConsensusLevel::VeryWeak,
            winner_confidence: 0.0,
            tie_breaker_used: None,
            meta_voter_used: false,
            abstain: true,
            component_contributions: HashMap::new(),
        };
        let history = NoHistory;
        let result = escalate(&outcome, &[], &history, |_| None);
        assert!(matches!(result, EscalationResult::Abstained));
    }

    #[test]
    fn meta_voter_choice_parses_role_tag() {
        let candidates = vec![RoleTag::new("gpt4o"), RoleTag::new("gemini")];
        assert_eq!(
            parse_meta_voter_choice(" gemini.\n", &candidates),
            Some(RoleTag::new("gemini"))
        );
        assert_eq!(parse_meta_voter_choice("unknown", &candidates), None);
    }
}
