//! Ensemble Orchestrator: coordinates one request through admission,
//! parallel fan-out, scoring, calibration, voting, escalation,
//! synthesis, and validation, and is the only component allowed to
//! surface an [`EnsembleError`] to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::admission::AdmissionQueue;
use crate::cache::ResponseCache;
use crate::calibration::CalibrationStore;
use crate::config::GatewayConfig;
use crate::error::EnsembleError;
use crate::escalation::{self, EscalationResult};
use crate::intent::IntentClassifier;
use crate::model::{
    CalibrationSample, Outcome, Prompt, ProviderResponse, QualityDimensions, RoleTag,
    ScoredResponse, SynthesizedAnswer, ValidationReport, VoteOutcome, VotingHistoryRecord,
};
use crate::provider::ProviderClient;
use crate::scoring::QualityScorer;
use crate::synthesis::Synthesizer;
use crate::telemetry::{TelemetryCollector, TelemetryEvent, TelemetryEventType};
use crate::validator::{Strictness, Validator};
use crate::voter::{is_tie, Voter};
use crate::voting_history::VotingHistoryStore;

/// How many completed votes the Voting History Store keeps on its
/// record log, independent of how far back its per-role rollups reach.
const VOTING_HISTORY_WINDOW: usize = 500;

/// Fire-and-forget telemetry sink: pipeline stages push events onto an
/// unbounded channel so the request path never blocks on the shared
/// `TelemetryCollector`'s lock; a background task drains the channel and
/// folds events into it.
struct TelemetrySink {
    tx: mpsc::UnboundedSender<TelemetryEvent>,
}

impl TelemetrySink {
    fn spawn(collector: Arc<TelemetryCollector>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<TelemetryEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                collector.record(event);
            }
        });
        Self { tx }
    }

    fn stage(&self, stage: &str, duration: Duration) {
        let event = TelemetryEvent::new(TelemetryEventType::Custom(stage.to_string()))
            .with_duration(duration);
        // The receiver only ever disconnects if the drain task panicked;
        // dropping the event in that case is preferable to propagating a
        // telemetry failure into the request path.
        let _ = self.tx.send(event);
    }
}

/// The unified, caller-facing result of one ensemble request, carrying
/// the winning answer alongside diagnostics for every pipeline stage.
#[derive(Debug, Clone)]
pub struct EnsembleEnvelope {
    pub answer: SynthesizedAnswer,
    pub vote: VoteOutcome,
    pub validation: ValidationReport,
    /// Every fulfilled response plus its derived scores, for per-role
    /// reporting at the external interface boundary.
    pub scored_responses: Vec<ScoredResponse>,
    /// Raw responses that did not fulfill, kept for per-role reporting.
    pub rejected: Vec<ProviderResponse>,
    pub served_from_cache: bool,
    pub providers_responded: usize,
    pub providers_queried: usize,
    pub total_latency_ms: u64,
}

/// Caller-supplied policy deciding, per response, what [`Outcome`] a
/// calibration sample should record. The default labels the vote's
/// winner `Won` and everyone else `Lost`; a caller with a product
/// signal (a thumbs-up, a follow-up reformulation) can swap in its own.
pub type OutcomePolicy = dyn Fn(&ScoredResponse, &RoleTag) -> Outcome + Send + Sync;

/// Coordinates the full pipeline for one tier's provider set.
pub struct EnsembleOrchestrator {
    config: GatewayConfig,
    providers: HashMap<String, Arc<dyn ProviderClient>>,
    scorer: QualityScorer,
    intent_classifier: IntentClassifier,
    calibration: CalibrationStore,
    voter: Voter,
    voting_history: VotingHistoryStore,
    admission: AdmissionQueue,
    cache: ResponseCache,
    synthesizer: Synthesizer,
    strictness: Strictness,
    outcome_policy: Arc<OutcomePolicy>,
    telemetry_collector: Arc<TelemetryCollector>,
    telemetry: TelemetrySink,
}

impl EnsembleOrchestrator {
    pub fn new(config: GatewayConfig, providers: Vec<Arc<dyn ProviderClient>>) -> Self {
        let calibration = CalibrationStore::new(&config.calibration);
        let admission = AdmissionQueue::new(&config.admission);
        let cache = ResponseCache::new(&config.cache);
        let synthesizer = Synthesizer::new(&config.synthesis);
        let providers = providers.into_iter().map(|p| (p.role().to_string(), p)).collect();
        let telemetry_collector = Arc::new(TelemetryCollector::new());
        Self {
            config,
            providers,
            scorer: QualityScorer::new(),
            intent_classifier: IntentClassifier::new(),
            calibration,
            voter: Voter::new(),
            voting_history: VotingHistoryStore::new(VOTING_HISTORY_WINDOW),
            admission,
            cache,
            synthesizer,
            strictness: Strictness::Standard,
            outcome_policy: Arc::new(|response, winner_role| {
                if response.role() == winner_role { Outcome::Won } else { Outcome::Lost }
            }),
            telemetry: TelemetrySink::spawn(telemetry_collector.clone()),
            telemetry_collector,
        }
    }

    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    /// Override how a calibration sample's [`Outcome`] is derived for
    /// each response. Defaults to won-by-vote-winner / lost-otherwise.
    pub fn with_outcome_policy(
        mut self,
        policy: impl Fn(&ScoredResponse, &RoleTag) -> Outcome + Send + Sync + 'static,
    ) -> Self {
        self.outcome_policy = Arc::new(policy);
        self
    }

    /// Telemetry events recorded across every request this orchestrator
    /// has served, for diagnostics and dashboards.
    pub fn telemetry_events(&self) -> Vec<TelemetryEvent> {
        self.telemetry_collector.events()
    }

    /// Run the full pipeline for `prompt`. The only error variants that
    /// escape are admission refusal, input validation, and "no provider
    /// produced a usable response with no cache fallback" — everything
    /// else degrades into diagnostics carried on the envelope.
    pub async fn process(&self, prompt: Prompt) -> Result<EnsembleEnvelope, EnsembleError> {
        self.process_with_cancellation(prompt, CancellationToken::new()).await
    }

    /// Same as [`Self::process`], but `cancellation` is observed by every
    /// provider invocation in the fan-out. Callers sitting in front of a
    /// connection that can drop (HTTP, a CLI Ctrl-C handler) should cancel
    /// this token when that happens so in-flight provider calls stop
    /// promptly instead of running to their full deadline.
    #[instrument(skip(self, prompt, cancellation), fields(correlation_id = %prompt.correlation_id, tier = prompt.tier.as_str()))]
    pub async fn process_with_cancellation(
        &self,
        prompt: Prompt,
        cancellation: CancellationToken,
    ) -> Result<EnsembleEnvelope, EnsembleError> {
        let started = Instant::now();
        let tier_config = self.config.tier(prompt.tier);

        if prompt.text.trim().is_empty() {
            return Err(EnsembleError::ValidationError {
                message: "prompt text must not be empty".to_string(),
            });
        }
        if prompt.text.len() > tier_config.max_prompt_len {
            return Err(EnsembleError::ValidationError {
                message: format!(
                    "prompt length {} exceeds the {} tier limit of {}",
                    prompt.text.len(),
                    prompt.tier.as_str(),
                    tier_config.max_prompt_len
                ),
            });
        }

        let now_secs = unix_now_secs(started);
        let fingerprint = ResponseCache::fingerprint(&prompt.text, prompt.tier);
        if let Some(entry) = self.cache.get(&fingerprint, now_secs) {
            info!("served from exact cache fingerprint");
            return Ok(self.envelope_from_cache(entry, started));
        }
        if let Some(entry) = self.cache.semantic_lookup(&prompt.text, prompt.tier, now_secs) {
            info!("served from semantic cache match");
            return Ok(self.envelope_from_cache(entry, started));
        }

        let admission_started = Instant::now();
        let admission_signal = self
            .admission
            .try_admit(prompt.tier)
            .map_err(|_| EnsembleError::AdmissionRefused {
                message: "admission queue at capacity".to_string(),
                retry_after_secs: 2,
            })?;
        self.telemetry.stage("admission", admission_started.elapsed());
        if admission_signal.autoscale_recommended {
            warn!(queue_length = admission_signal.queue_length, "autoscale signal fired");
        }

        let result = self.run_pipeline(&prompt, tier_config, cancellation).await;
        self.admission.complete(started.elapsed());
        let mut envelope = result?;
        envelope.total_latency_ms = started.elapsed().as_millis() as u64;

        self.cache.insert(
            &prompt.text,
            prompt.tier,
            envelope.answer.clone(),
            envelope.answer.quality_improvement + 0.5,
            now_secs,
        );

        Ok(envelope)
    }

    async fn run_pipeline(
        &self,
        prompt: &Prompt,
        tier_config: &crate::config::TierConfig,
        cancellation: CancellationToken,
    ) -> Result<EnsembleEnvelope, EnsembleError> {
        let analysis = self.intent_classifier.classify(&prompt.text);

        let overhead = Duration::from_millis(self.config.overhead_budget_ms);
        let per_provider_deadline = prompt
            .deadline
            .saturating_sub(overhead)
            .mul_f64(analysis.urgency.deadline_factor());

        let fan_out_started = Instant::now();
        let invocations = tier_config.providers.iter().filter_map(|p| {
            let client = self.providers.get(&p.role)?.clone();
            let deadline = Duration::from_millis(p.deadline_ms).min(per_provider_deadline.max(Duration::from_millis(500)));
            Some(invoke_one(client, prompt.clone(), deadline, cancellation.clone()))
        });

        let raw_responses: Vec<ProviderResponse> = join_all(invocations).await;
        self.telemetry.stage("fan_out", fan_out_started.elapsed());
        let providers_queried = raw_responses.len();

        let scoring_started = Instant::now();
        let fulfilled: Vec<&ProviderResponse> = raw_responses.iter().filter(|r| r.is_fulfilled()).collect();
        let rejected: Vec<ProviderResponse> =
            raw_responses.iter().filter(|r| !r.is_fulfilled()).cloned().collect();
        let scored: Vec<ScoredResponse> = self.score_and_calibrate(prompt, &fulfilled);
        self.telemetry.stage("scoring", scoring_started.elapsed());
        let providers_responded = scored.len();

        if scored.is_empty() {
            return Err(EnsembleError::NoProvidersResponded);
        }

        let voting_started = Instant::now();
        let mut vote = self
            .voter
            .vote(&scored, analysis.intent, |role| self.voting_history.historical_multiplier(role));

        if is_tie(&vote) {
            match escalation::escalate(&vote, &scored, &self.voting_history, |_candidates| None) {
                EscalationResult::Resolved { role, strategy } => {
                    vote.winner_confidence = vote.normalized_weights.get(&role).copied().unwrap_or(vote.winner_confidence);
                    vote.winner_role = Some(role);
                    vote.tie_breaker_used = Some(strategy);
                }
                EscalationResult::MetaVoterResolved { role } => {
                    vote.winner_confidence = vote.normalized_weights.get(&role).copied().unwrap_or(vote.winner_confidence);
                    vote.winner_role = Some(role);
                    vote.meta_voter_used = true;
                }
                EscalationResult::Abstained => {
                    vote.abstain = true;
                    vote.winner_role = None;
                }
            }
        }
        self.telemetry.stage("voting", voting_started.elapsed());

        let Some(winner_role) = vote.winner_role.clone() else {
            return Err(EnsembleError::NoProvidersResponded);
        };

        let winner_idx = scored.iter().position(|r| r.role() == &winner_role).unwrap_or(0);
        let winner = scored[winner_idx].clone();
        let others: Vec<ScoredResponse> =
            scored.iter().enumerate().filter(|(i, _)| *i != winner_idx).map(|(_, r)| r.clone()).collect();

        let synthesis_started = Instant::now();
        let section_budget = analysis.intent.default_section_budget() + analysis.complexity.extra_sections();
        let synthesis_client = self.providers.get(&self.config.synthesis.synthesis_role).map(Arc::as_ref);
        let answer = self
            .synthesizer
            .synthesize(&prompt.text, &winner, &others, section_budget, synthesis_client)
            .await;
        self.telemetry.stage("synthesis", synthesis_started.elapsed());

        let validation_started = Instant::now();
        let validator = Validator::new(self.strictness);
        let validation = validator.validate(&prompt.text, &answer, &others);
        self.telemetry.stage("validation", validation_started.elapsed());

        for response in &scored {
            self.calibration.record(CalibrationSample {
                model_name: response.response.model_name.clone(),
                predicted_prob: response.response.raw_confidence,
                actual: (self.outcome_policy)(response, &winner_role),
                timestamp_secs: unix_now_secs(Instant::now()),
                metadata: None,
            });
        }

        let mean_diversity = if scored.is_empty() {
            0.0
        } else {
            scored.iter().map(|r| r.embedding_uniqueness).sum::<f64>() / scored.len() as f64
        };
        self.voting_history.append(VotingHistoryRecord {
            winner: vote.winner_role.clone(),
            weights: vote.normalized_weights.clone(),
            participating_models: scored.iter().map(|r| r.role().clone()).collect(),
            consensus: vote.consensus_level,
            diversity: mean_diversity,
            tie_breaker_used: vote.tie_breaker_used.is_some() || vote.meta_voter_used,
            processing_time_ms: voting_started.elapsed().as_millis() as u64,
            timestamp_secs: unix_now_secs(Instant::now()),
        });

        Ok(EnsembleEnvelope {
            answer,
            vote,
            validation,
            scored_responses: scored,
            rejected,
            served_from_cache: false,
            providers_responded,
            providers_queried,
            total_latency_ms: 0,
        })
    }

    fn score_and_calibrate(&self, prompt: &Prompt, fulfilled: &[&ProviderResponse]) -> Vec<ScoredResponse> {
        let term_vectors: Vec<Vec<(String, f64)>> =
            fulfilled.iter().map(|r| term_frequency_vector(&r.content)).collect();

        fulfilled
            .iter()
            .enumerate()
            .map(|(idx, response)| {
                let quality: QualityDimensions = self.scorer.score(&prompt.text, response);
                let calibrated_confidence =
                    self.calibration.calibrate(&response.model_name, response.raw_confidence);
                let embedding_uniqueness = uniqueness_against_others(idx, &term_vectors);
                ScoredResponse {
                    response: (*response).clone(),
                    quality,
                    embedding_uniqueness,
                    calibrated_confidence,
                }
            })
            .collect()
    }

    fn envelope_from_cache(&self, entry: crate::model::CacheEntry, started: Instant) -> EnsembleEnvelope {
        let winner_role = entry.answer.contributing_roles.first().cloned();
        EnsembleEnvelope {
            answer: entry.answer,
            scored_responses: Vec::new(),
            rejected: Vec::new(),
            vote: VoteOutcome {
                winner_role,
                normalized_weights: HashMap::new(),
                consensus_level: crate::model::ConsensusLevel::VeryStrong,
                winner_confidence: 1.0,
                tie_breaker_used: None,
                meta_voter_used: false,
                abstain: false,
                component_contributions: HashMap::new(),
            },
            validation: ValidationReport {
                passed: true,
                dimension_scores: HashMap::new(),
                issues: Vec::new(),
                recommendations: Vec::new(),
            },
            served_from_cache: true,
            providers_responded: 0,
            providers_queried: 0,
            total_latency_ms: started.elapsed().as_millis() as u64,
        }
    }
}

async fn invoke_one(
    client: Arc<dyn ProviderClient>,
    prompt: Prompt,
    deadline: Duration,
    cancellation: CancellationToken,
) -> ProviderResponse {
    client.invoke(&prompt, deadline, cancellation).await
}

fn unix_now_secs(_started: Instant) -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Bag-of-words term-frequency vector, used as a deterministic, offline
/// stand-in for a real embedding so uniqueness scoring never depends on
/// a network call. Combined via cosine similarity the same way a dense
/// embedding vector would be.
pub(crate) fn term_frequency_vector(text: &str) -> Vec<(String, f64)> {
    let mut counts: HashMap<String, f64> = HashMap::new();
    for word in text.to_lowercase().split_whitespace() {
        *counts.entry(word.to_string()).or_insert(0.0) += 1.0;
    }
    counts.into_iter().collect()
}

pub(crate) fn sparse_cosine(a: &[(String, f64)], b: &[(String, f64)]) -> f64 {
    let map_b: HashMap<&str, f64> = b.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    let dot: f64 = a.iter().filter_map(|(k, v)| map_b.get(k.as_str()).map(|bv| v * bv)).sum();
    let norm_a = a.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// 1 minus the highest similarity to any other response: a response
/// that says something no one else said scores close to 1.
fn uniqueness_against_others(idx: usize, vectors: &[Vec<(String, f64)>]) -> f64 {
    if vectors.len() <= 1 {
        return 1.0;
    }
    let max_similarity = vectors
        .iter()
        .enumerate()
        .filter(|(other_idx, _)| *other_idx != idx)
        .map(|(_, other)| sparse_cosine(&vectors[idx], other))
        .fold(0.0_f64, f64::max);
    (1.0 - max_similarity).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProviderClient;

    fn test_config() -> GatewayConfig {
        let mut config = GatewayConfig::new();
        let tier = config.tiers.get_mut("free").unwrap();
        tier.providers.truncate(2);
        config
    }

    #[tokio::test]
    async fn process_returns_no_providers_responded_when_all_fail() {
        let config = test_config();
        let providers: Vec<Arc<dyn ProviderClient>> = vec![
            Arc::new(MockProviderClient::rejected("gpt4o", crate::model::RejectKind::Timeout)),
            Arc::new(MockProviderClient::rejected("gemini", crate::model::RejectKind::Quota)),
        ];
        let orchestrator = EnsembleOrchestrator::new(config, providers);
        let prompt = Prompt::new("Explain how photosynthesis works in detail please.");
        let result = orchestrator.process(prompt).await;
        assert!(matches!(result, Err(EnsembleError::NoProvidersResponded)));
    }

    #[tokio::test]
    async fn process_rejects_empty_prompt() {
        let config = test_config();
        let providers: Vec<Arc<dyn ProviderClient>> = vec![];
        let orchestrator = EnsembleOrchestrator::new(config, providers);
        let prompt = Prompt::new("   ");
        let result = orchestrator.process(prompt).await;
        assert!(matches!(result, Err(EnsembleError::ValidationError { .. })));
    }

    #[tokio::test]
    async fn process_synthesizes_an_answer_from_fulfilled_responses() {
        let config = test_config();
        let providers: Vec<Arc<dyn ProviderClient>> = vec![
            Arc::new(MockProviderClient::fulfilled(
                "gpt4o",
                "# Introduction\nPhotosynthesis converts sunlight into chemical energy for plants to grow.",
            )),
            Arc::new(MockProviderClient::fulfilled(
                "gemini",
                "# Details\nChlorophyll absorbs light in the chloroplasts of plant leaf cells to enable this.",
            )),
        ];
        let orchestrator = EnsembleOrchestrator::new(config, providers);
        let prompt = Prompt::new("Explain how photosynthesis works in detail please.");
        let envelope = orchestrator.process(prompt).await.unwrap();
        assert!(!envelope.answer.text.is_empty());
        assert!(!envelope.served_from_cache);
    }

    #[tokio::test]
    async fn repeated_prompt_is_served_from_cache() {
        let config = test_config();
        let providers: Vec<Arc<dyn ProviderClient>> = vec![Arc::new(MockProviderClient::fulfilled(
            "gpt4o",
            "# Introduction\nPhotosynthesis converts sunlight into chemical energy for plants to grow well.",
        ))];
        let orchestrator = EnsembleOrchestrator::new(config, providers);
        let prompt = Prompt::new("Explain how photosynthesis works in detail please.");
        let first = orchestrator.process(prompt.clone()).await.unwrap();
        assert!(!first.served_from_cache);
        let second = orchestrator.process(prompt).await.unwrap();
        assert!(second.served_from_cache);
    }
}
