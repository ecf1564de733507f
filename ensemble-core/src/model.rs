//! Data model shared across pipeline stages.
//!
//! Every type here is immutable once constructed except where the type's
//! own doc comment says otherwise; stages build new values rather than
//! mutating ones handed to them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Request tier. Drives provider set, deadlines, and prompt length limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Premium,
}

impl Tier {
    /// Config-table key for this tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
        }
    }
}

/// A stable identifier for a provider's position in the ensemble
/// (e.g. `gpt4o`, `gemini`, `claude`), independent of the underlying
/// model name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleTag(pub String);

impl RoleTag {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl std::fmt::Display for RoleTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoleTag {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoleTag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Immutable request: a natural-language prompt plus routing context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub text: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub tier: Tier,
    pub correlation_id: String,
    /// Wall-clock deadline for the whole request, relative to admission.
    pub deadline: Duration,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: None,
            user_id: None,
            tier: Tier::Free,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            deadline: Duration::from_secs(20),
        }
    }

    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn user_id_or_anonymous(&self) -> &str {
        self.user_id.as_deref().unwrap_or("anonymous")
    }
}

/// Reasons a Provider Client invocation can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectKind {
    Timeout,
    Quota,
    Transport,
    Malformed,
    Upstream5xx,
    Upstream4xx,
    Cancelled,
}

impl std::fmt::Display for RejectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectKind::Timeout => "timeout",
            RejectKind::Quota => "quota",
            RejectKind::Transport => "transport",
            RejectKind::Malformed => "malformed",
            RejectKind::Upstream5xx => "upstream_5xx",
            RejectKind::Upstream4xx => "upstream_4xx",
            RejectKind::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Outcome status of a single Provider Client invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResponseStatus {
    Fulfilled,
    Rejected { reason: RejectKind },
}

impl ResponseStatus {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, ResponseStatus::Fulfilled)
    }
}

/// A single provider's outcome for one request. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub role: RoleTag,
    pub provider_name: String,
    pub model_name: String,
    pub status: ResponseStatus,
    pub content: String,
    pub response_time_ms: u64,
    pub prompt_tokens: u32,
    pub response_tokens: u32,
    /// Raw, uncalibrated confidence as reported/estimated for this response.
    pub raw_confidence: f64,
}

impl ProviderResponse {
    pub fn is_fulfilled(&self) -> bool {
        self.status.is_fulfilled()
    }
}

/// A scored dimension with the sub-factors that contributed to it, for
/// audit/validator output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DimensionScore {
    pub value: f64,
    pub factors: HashMap<String, f64>,
}

impl DimensionScore {
    pub fn new(value: f64) -> Self {
        Self { value: value.clamp(0.0, 1.0), factors: HashMap::new() }
    }

    pub fn with_factor(mut self, name: impl Into<String>, value: f64) -> Self {
        self.factors.insert(name.into(), value);
        self
    }
}

/// Six quality dimensions plus composite, as produced by the Quality Scorer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityDimensions {
    pub relevance: DimensionScore,
    pub completeness: DimensionScore,
    pub plausibility: DimensionScore,
    pub structure: DimensionScore,
    pub readability: DimensionScore,
    pub toxicity: DimensionScore,
    pub composite: f64,
}

/// A ProviderResponse plus derived scores. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResponse {
    pub response: ProviderResponse,
    pub quality: QualityDimensions,
    /// Cosine-distance-derived uniqueness relative to the other responses.
    pub embedding_uniqueness: f64,
    /// Empirically calibrated confidence, in [0, 1].
    pub calibrated_confidence: f64,
}

impl ScoredResponse {
    pub fn role(&self) -> &RoleTag {
        &self.response.role
    }
}

/// Qualitative consensus label over the Voter's top weight and margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsensusLevel {
    VeryWeak,
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl std::fmt::Display for ConsensusLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConsensusLevel::VeryWeak => "very-weak",
            ConsensusLevel::Weak => "weak",
            ConsensusLevel::Moderate => "moderate",
            ConsensusLevel::Strong => "strong",
            ConsensusLevel::VeryStrong => "very-strong",
        };
        write!(f, "{}", s)
    }
}

/// Strategy that produced a strict winner during tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakStrategy {
    HistoricalWinRate,
    CalibratedProbability,
    EmbeddingUniqueness,
    LexicographicRoleTag,
}

/// Per-role component contributions to its final weight, for audit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentContribution {
    pub content_quality: f64,
    pub calibrated_confidence: f64,
    pub intent_alignment: f64,
    pub structure: f64,
    pub response_time: f64,
    pub historical_multiplier: f64,
    pub diversity_bonus: f64,
}

/// Outcome of a single vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub winner_role: Option<RoleTag>,
    pub normalized_weights: HashMap<RoleTag, f64>,
    pub consensus_level: ConsensusLevel,
    pub winner_confidence: f64,
    pub tie_breaker_used: Option<TieBreakStrategy>,
    pub meta_voter_used: bool,
    pub abstain: bool,
    pub component_contributions: HashMap<RoleTag, ComponentContribution>,
}

impl VoteOutcome {
    pub fn weights_sum(&self) -> f64 {
        self.normalized_weights.values().sum()
    }
}

/// Section type used both by the Synthesizer's canonical ordering and the
/// Quality Scorer's structural-completeness detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Introduction,
    Explanation,
    Examples,
    Applications,
    Details,
    Conclusion,
}

impl SectionType {
    /// Canonical ordering position.
    pub fn order(&self) -> u8 {
        match self {
            SectionType::Introduction => 0,
            SectionType::Explanation => 1,
            SectionType::Examples => 2,
            SectionType::Applications => 3,
            SectionType::Details => 4,
            SectionType::Conclusion => 5,
        }
    }
}

/// The final combined answer produced by the Synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedAnswer {
    pub text: String,
    pub contributing_roles: Vec<RoleTag>,
    pub section_plan: Vec<SectionType>,
    /// Synthesis quality minus mean input quality.
    pub quality_improvement: f64,
}

/// Severity of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

/// A single validation finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub dimension: String,
    pub severity: IssueSeverity,
    pub message: String,
}

/// Post-synthesis validation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    /// dimension name -> (score, threshold)
    pub dimension_scores: HashMap<String, (f64, f64)>,
    pub issues: Vec<ValidationIssue>,
    pub recommendations: Vec<String>,
}

/// Caller-supplied ground-truth/proxy outcome for a calibration sample.
/// The gateway does not infer this itself; the caller supplies whatever
/// definition of `actual` fits its product (a user thumbs-up, a
/// follow-up reformulation, an explicit rating).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Won,
    Lost,
    ValidationPass,
    ValidationFail,
}

impl Outcome {
    pub fn as_actual(&self) -> u8 {
        match self {
            Outcome::Won | Outcome::ValidationPass => 1,
            Outcome::Lost | Outcome::ValidationFail => 0,
        }
    }
}

/// A single (predicted, actual) calibration observation for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub model_name: String,
    pub predicted_prob: f64,
    pub actual: Outcome,
    pub timestamp_secs: u64,
    pub metadata: Option<HashMap<String, String>>,
}

/// One bin of a piecewise-linear calibration map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub lo: f64,
    pub hi: f64,
    pub mean_predicted: f64,
    pub mean_actual: f64,
    pub count: usize,
}

/// Ordered sequence of calibration bins for one model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationMap {
    pub bins: Vec<CalibrationBin>,
}

/// Reliability label derived from the most recent 20 Brier scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReliabilityLabel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ReliabilityLabel {
    pub fn from_brier(mean: f64) -> Self {
        if mean <= 0.1 {
            ReliabilityLabel::Excellent
        } else if mean <= 0.2 {
            ReliabilityLabel::Good
        } else if mean <= 0.3 {
            ReliabilityLabel::Fair
        } else {
            ReliabilityLabel::Poor
        }
    }
}

/// A content-addressed cached ensemble result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub prompt_fingerprint: String,
    pub tier: Tier,
    pub answer: SynthesizedAnswer,
    pub created_at_secs: u64,
    pub ttl_secs: u64,
    pub popularity_score: u64,
    /// Keyword set used for semantic-similarity lookups.
    pub keywords: Vec<String>,
}

impl CacheEntry {
    pub fn is_expired(&self, now_secs: u64) -> bool {
        now_secs.saturating_sub(self.created_at_secs) > self.ttl_secs
    }
}

/// Record of a single completed vote, used to derive per-model
/// long-term weight adjustments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingHistoryRecord {
    pub winner: Option<RoleTag>,
    pub weights: HashMap<RoleTag, f64>,
    pub participating_models: Vec<RoleTag>,
    pub consensus: ConsensusLevel,
    pub diversity: f64,
    pub tie_breaker_used: bool,
    pub processing_time_ms: u64,
    pub timestamp_secs: u64,
}
