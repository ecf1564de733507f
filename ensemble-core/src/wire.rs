//! External interface envelopes: the JSON request/response/error shapes a
//! caller-facing HTTP layer would serialize directly, plus the fixed-table
//! cost estimator. No HTTP framework is wired in here; these are plain
//! `serde` types constructed from the internal pipeline result.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TierConfig;
use crate::error::EnsembleError;
use crate::model::{Prompt, QualityDimensions, ResponseStatus, Tier};
use crate::orchestrator::{sparse_cosine, term_frequency_vector, EnsembleEnvelope};

/// `X-Correlation-ID` is always set on the response.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";
/// If present on the request, overrides the body's `userId`.
pub const USER_ID_HEADER: &str = "X-User-Id";
/// Set on 429/503 error responses.
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

/// Inbound request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub prompt: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl RequestEnvelope {
    /// Build the internal [`Prompt`] this envelope describes. `user_id`
    /// is `header_user_id` when present, since the `X-User-Id` header
    /// overrides the body field.
    pub fn into_prompt(self, deadline: Duration, header_user_id: Option<String>) -> Prompt {
        let mut prompt = Prompt::new(self.prompt).tier(self.tier).deadline(deadline);
        if let Some(id) = self.correlation_id {
            prompt = prompt.correlation_id(id);
        }
        prompt.session_id = self.session_id;
        prompt.user_id = header_user_id.or(self.user_id);
        prompt
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidencePayload {
    pub score: f64,
    pub level: String,
}

fn confidence_level(score: f64) -> &'static str {
    if score >= 0.8 {
        "high"
    } else if score >= 0.5 {
        "moderate"
    } else {
        "low"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityPayload {
    pub relevance: f64,
    pub completeness: f64,
    pub plausibility: f64,
    pub structure: f64,
    pub readability: f64,
    pub toxicity: f64,
    pub composite: f64,
}

impl From<&QualityDimensions> for QualityPayload {
    fn from(q: &QualityDimensions) -> Self {
        Self {
            relevance: q.relevance.value,
            completeness: q.completeness.value,
            plausibility: q.plausibility.value,
            structure: q.structure.value,
            readability: q.readability.value,
            toxicity: q.toxicity.value,
            composite: q.composite,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisPayload {
    pub content: String,
    pub model: String,
    pub provider: String,
    pub confidence: ConfidencePayload,
    pub quality_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePayload {
    pub role: String,
    pub content: String,
    pub model: String,
    pub provider: String,
    pub status: String,
    pub confidence: ConfidencePayload,
    pub quality: QualityPayload,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceAnalysisPayload {
    pub consensus_level: String,
    pub winner_confidence: f64,
    pub tie_breaker_used: Option<String>,
    pub meta_voter_used: bool,
    pub abstained: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCostEstimate {
    pub model: String,
    pub estimated_input_tokens: u64,
    pub estimated_output_tokens: u64,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimatePayload {
    pub per_model: HashMap<String, ModelCostEstimate>,
    pub total_estimated_cost: f64,
}

/// Fixed-table cost estimate for `prompt_text` under `tier_config`: one
/// entry per provider, using its configured per-1k-token rates and a
/// fixed assumed completion length (actual usage is not yet known at
/// estimate time).
pub fn estimate_cost(prompt_text: &str, tier_config: &TierConfig) -> CostEstimatePayload {
    const ASSUMED_OUTPUT_TOKENS: u64 = 500;
    let estimated_input_tokens = estimate_tokens(prompt_text);
    let per_model: HashMap<String, ModelCostEstimate> = tier_config
        .providers
        .iter()
        .map(|p| {
            let input_cost = estimated_input_tokens as f64 / 1000.0 * p.cost_per_1k_input;
            let output_cost = ASSUMED_OUTPUT_TOKENS as f64 / 1000.0 * p.cost_per_1k_output;
            (
                p.role.clone(),
                ModelCostEstimate {
                    model: p.model.clone(),
                    estimated_input_tokens,
                    estimated_output_tokens: ASSUMED_OUTPUT_TOKENS,
                    estimated_cost: input_cost + output_cost,
                },
            )
        })
        .collect();
    let total_estimated_cost = per_model.values().map(|m| m.estimated_cost).sum();
    CostEstimatePayload { per_model, total_estimated_cost }
}

/// ~4 characters per token, the usual rough heuristic when no tokenizer
/// for the target model is available at estimate time.
fn estimate_tokens(text: &str) -> u64 {
    ((text.len() as f64 / 4.0).ceil() as u64).max(1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsPayload {
    pub embedding_similarity_matrix: HashMap<String, HashMap<String, f64>>,
    pub model_calibrated_prob: HashMap<String, f64>,
    pub toxicity_score: f64,
    pub readability: f64,
    pub semantic_quality: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadataPayload {
    pub total_roles: usize,
    pub successful_roles: usize,
    pub failed_roles: usize,
    pub processing_time_ms: u64,
    pub confidence_analysis: ConfidenceAnalysisPayload,
    pub cost_estimate: CostEstimatePayload,
    pub diagnostics: DiagnosticsPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDataPayload {
    pub synthesis: SynthesisPayload,
    pub roles: Vec<RolePayload>,
    pub metadata: ResponseMetadataPayload,
}

/// Outbound success envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub status: String,
    pub data: ResponseDataPayload,
    pub timestamp: String,
    pub correlation_id: String,
}

impl ResponseEnvelope {
    pub fn from_envelope(
        envelope: &EnsembleEnvelope,
        tier_config: &TierConfig,
        prompt_text: &str,
        correlation_id: impl Into<String>,
    ) -> Self {
        let correlation_id = correlation_id.into();
        let winner = envelope
            .vote
            .winner_role
            .as_ref()
            .and_then(|role| envelope.scored_responses.iter().find(|s| s.role() == role));

        let synthesis = SynthesisPayload {
            content: envelope.answer.text.clone(),
            model: winner.map(|w| w.response.model_name.clone()).unwrap_or_else(|| "cache".to_string()),
            provider: winner
                .map(|w| w.response.provider_name.clone())
                .unwrap_or_else(|| "cache".to_string()),
            confidence: ConfidencePayload {
                score: envelope.vote.winner_confidence,
                level: confidence_level(envelope.vote.winner_confidence).to_string(),
            },
            quality_score: winner.map(|w| w.quality.composite).unwrap_or(0.0),
        };

        let mut roles: Vec<RolePayload> = envelope
            .scored_responses
            .iter()
            .map(|s| RolePayload {
                role: s.role().to_string(),
                content: s.response.content.clone(),
                model: s.response.model_name.clone(),
                provider: s.response.provider_name.clone(),
                status: "fulfilled".to_string(),
                confidence: ConfidencePayload {
                    score: s.calibrated_confidence,
                    level: confidence_level(s.calibrated_confidence).to_string(),
                },
                quality: QualityPayload::from(&s.quality),
                metadata: HashMap::from([
                    ("promptTokens".to_string(), s.response.prompt_tokens.to_string()),
                    ("responseTokens".to_string(), s.response.response_tokens.to_string()),
                    ("embeddingUniqueness".to_string(), format!("{:.4}", s.embedding_uniqueness)),
                ]),
            })
            .collect();

        roles.extend(envelope.rejected.iter().map(|r| {
            let reason = match &r.status {
                ResponseStatus::Rejected { reason } => reason.to_string(),
                ResponseStatus::Fulfilled => "unknown".to_string(),
            };
            RolePayload {
                role: r.role.to_string(),
                content: String::new(),
                model: r.model_name.clone(),
                provider: r.provider_name.clone(),
                status: "rejected".to_string(),
                confidence: ConfidencePayload { score: 0.0, level: confidence_level(0.0).to_string() },
                quality: QualityPayload::default(),
                metadata: HashMap::from([("rejectReason".to_string(), reason)]),
            }
        }));

        let total_roles = roles.len();
        let successful_roles = envelope.scored_responses.len();
        let failed_roles = envelope.rejected.len();

        let confidence_analysis = ConfidenceAnalysisPayload {
            consensus_level: envelope.vote.consensus_level.to_string(),
            winner_confidence: envelope.vote.winner_confidence,
            tie_breaker_used: envelope.vote.tie_breaker_used.map(|t| format!("{:?}", t)),
            meta_voter_used: envelope.vote.meta_voter_used,
            abstained: envelope.vote.abstain,
        };

        let diagnostics = DiagnosticsPayload {
            embedding_similarity_matrix: similarity_matrix(&envelope.scored_responses),
            model_calibrated_prob: envelope
                .scored_responses
                .iter()
                .map(|s| (s.role().to_string(), s.calibrated_confidence))
                .collect(),
            toxicity_score: mean(envelope.scored_responses.iter().map(|s| s.quality.toxicity.value)),
            readability: mean(envelope.scored_responses.iter().map(|s| s.quality.readability.value)),
            semantic_quality: mean(envelope.scored_responses.iter().map(|s| s.quality.composite)),
        };

        let metadata = ResponseMetadataPayload {
            total_roles,
            successful_roles,
            failed_roles,
            processing_time_ms: envelope.total_latency_ms,
            confidence_analysis,
            cost_estimate: estimate_cost(prompt_text, tier_config),
            diagnostics,
        };

        ResponseEnvelope {
            status: "success".to_string(),
            data: ResponseDataPayload { synthesis, roles, metadata },
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id,
        }
    }
}

fn similarity_matrix(scored: &[crate::model::ScoredResponse]) -> HashMap<String, HashMap<String, f64>> {
    let vectors: Vec<(String, Vec<(String, f64)>)> = scored
        .iter()
        .map(|s| (s.role().to_string(), term_frequency_vector(&s.response.content)))
        .collect();
    let mut matrix = HashMap::new();
    for (role_a, vec_a) in &vectors {
        let mut row = HashMap::new();
        for (role_b, vec_b) in &vectors {
            if role_a == role_b {
                continue;
            }
            row.insert(role_b.clone(), sparse_cosine(vec_a, vec_b));
        }
        matrix.insert(role_a.clone(), row);
    }
    matrix
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Outbound error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub status: String,
    pub message: String,
    pub retryable: bool,
    pub correlation_id: String,
    pub timestamp: String,
}

impl ErrorEnvelope {
    pub fn from_ensemble_error(err: &EnsembleError, correlation_id: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: err.to_string(),
            retryable: err.retryable(),
            correlation_id: correlation_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// `Retry-After` seconds for 429/503 errors; `None` for errors that
    /// should not be retried.
    pub fn retry_after_secs(err: &EnsembleError) -> Option<u64> {
        match err {
            EnsembleError::AdmissionRefused { retry_after_secs, .. } => Some(*retry_after_secs),
            EnsembleError::NoProvidersResponded => Some(2),
            EnsembleError::ValidationError { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::model::{
        ConsensusLevel, DimensionScore, ProviderResponse, QualityDimensions, RejectKind, RoleTag,
        ScoredResponse, SynthesizedAnswer, ValidationReport, VoteOutcome,
    };
    use std::collections::HashMap as Map;

    #[test]
    fn request_envelope_round_trips_camel_case() {
        let json = r#"{"prompt":"hi","tier":"premium","correlationId":"abc"}"#;
        let req: RequestEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(req.tier, Tier::Premium);
        let prompt = req.into_prompt(Duration::from_secs(10), None);
        assert_eq!(prompt.correlation_id, "abc");
    }

    #[test]
    fn header_user_id_overrides_body_user_id() {
        let req = RequestEnvelope {
            prompt: "hi".into(),
            session_id: None,
            user_id: Some("body-user".into()),
            tier: Tier::Free,
            correlation_id: None,
        };
        let prompt = req.into_prompt(Duration::from_secs(10), Some("header-user".into()));
        assert_eq!(prompt.user_id.as_deref(), Some("header-user"));
    }

    #[test]
    fn error_envelope_carries_retry_after_on_admission_refusal() {
        let err = EnsembleError::AdmissionRefused { message: "full".into(), retry_after_secs: 5 };
        let envelope = ErrorEnvelope::from_ensemble_error(&err, "corr-1");
        assert_eq!(envelope.status, "error");
        assert!(envelope.retryable);
        assert_eq!(ErrorEnvelope::retry_after_secs(&err), Some(5));
    }

    #[test]
    fn validation_error_is_not_retryable_and_has_no_retry_after() {
        let err = EnsembleError::ValidationError { message: "bad".into() };
        let envelope = ErrorEnvelope::from_ensemble_error(&err, "corr-2");
        assert!(!envelope.retryable);
        assert_eq!(ErrorEnvelope::retry_after_secs(&err), None);
    }

    fn scored(role: &str) -> ScoredResponse {
        ScoredResponse {
            response: ProviderResponse {
                role: RoleTag::new(role),
                provider_name: "openai".into(),
                model_name: "gpt-4o-mini".into(),
                status: ResponseStatus::Fulfilled,
                content: "A structured, on-topic answer.".into(),
                response_time_ms: 400,
                prompt_tokens: 12,
                response_tokens: 30,
                raw_confidence: 0.8,
            },
            quality: QualityDimensions {
                composite: 0.8,
                structure: DimensionScore::new(0.6),
                ..Default::default()
            },
            embedding_uniqueness: 0.5,
            calibrated_confidence: 0.75,
        }
    }

    #[test]
    fn response_envelope_reports_successful_and_failed_roles() {
        let winner = scored("gpt4o");
        let envelope = EnsembleEnvelope {
            answer: SynthesizedAnswer {
                text: "final answer".into(),
                contributing_roles: vec![RoleTag::new("gpt4o")],
                section_plan: vec![],
                quality_improvement: 0.1,
            },
            vote: VoteOutcome {
                winner_role: Some(RoleTag::new("gpt4o")),
                normalized_weights: Map::new(),
                consensus_level: ConsensusLevel::Strong,
                winner_confidence: 0.9,
                tie_breaker_used: None,
                meta_voter_used: false,
                abstain: false,
                component_contributions: Map::new(),
            },
            validation: ValidationReport {
                passed: true,
                dimension_scores: Map::new(),
                issues: vec![],
                recommendations: vec![],
            },
            scored_responses: vec![winner],
            rejected: vec![ProviderResponse {
                role: RoleTag::new("gemini"),
                provider_name: "google".into(),
                model_name: "gemini-1.5-flash".into(),
                status: ResponseStatus::Rejected { reason: RejectKind::Timeout },
                content: String::new(),
                response_time_ms: 0,
                prompt_tokens: 0,
                response_tokens: 0,
                raw_confidence: 0.0,
            }],
            served_from_cache: false,
            providers_responded: 1,
            providers_queried: 2,
            total_latency_ms: 250,
        };

        let config = GatewayConfig::new();
        let tier_config = config.tier(Tier::Free);
        let response = ResponseEnvelope::from_envelope(&envelope, tier_config, "hi", "corr-3");

        assert_eq!(response.data.metadata.total_roles, 2);
        assert_eq!(response.data.metadata.successful_roles, 1);
        assert_eq!(response.data.metadata.failed_roles, 1);
        assert_eq!(response.data.synthesis.model, "gpt-4o-mini");
        let rejected_role = response.data.roles.iter().find(|r| r.role == "gemini").unwrap();
        assert_eq!(rejected_role.status, "rejected");
    }

    #[test]
    fn cost_estimate_scales_with_prompt_length() {
        let config = GatewayConfig::new();
        let tier_config = config.tier(Tier::Free);
        let short = estimate_cost("hi", tier_config);
        let long = estimate_cost(&"word ".repeat(500), tier_config);
        assert!(long.total_estimated_cost > short.total_estimated_cost);
        assert_eq!(short.per_model.len(), tier_config.providers.len());
    }
}
