//! Ensemble Gateway Core
//!
//! Fans a single prompt out to several heterogeneous model back-ends in
//! parallel, scores and calibrates each response, votes on a winner,
//! synthesizes a combined answer, validates it, and returns a unified
//! result with diagnostics.
//!
//! # Architecture
//!
//! - **Provider**: adapter to a single upstream model back-end
//! - **Calibration**: learns per-model reliability from historical outcomes
//! - **Scoring**: computes per-response quality dimensions
//! - **Intent**: classifies the prompt to adjust downstream weighting
//! - **Voting**: multi-factor weighted vote with tie-breaking and abstention
//! - **Synthesis**: combines winning and near-winning responses into one answer
//! - **Validation**: post-synthesis quality and consistency gates
//! - **Orchestrator**: coordinates the full pipeline for one request
//! - **Admission**: bounded request-admission queue with backpressure
//! - **Cache**: content-addressed cache of prior ensemble results

pub mod admission;
pub mod cache;
pub mod calibration;
pub mod config;
pub mod error;
pub mod escalation;
pub mod guardrails;
pub mod intent;
pub mod llm;
pub mod model;
pub mod orchestrator;
pub mod provider;
pub mod scoring;
pub mod synthesis;
pub mod telemetry;
pub mod validator;
pub mod voter;
pub mod voting_history;
pub mod wire;

pub use config::GatewayConfig;
pub use error::{EnsembleError, Error, Result};
pub use model::{
    CacheEntry, CalibrationMap, CalibrationSample, Prompt, ProviderResponse, ResponseStatus,
    RoleTag, ScoredResponse, SynthesizedAnswer, Tier, ValidationReport, VoteOutcome,
    VotingHistoryRecord,
};
pub use orchestrator::{EnsembleEnvelope, EnsembleOrchestrator};
pub use provider::{ProviderClient, RejectKind};
pub use wire::{ErrorEnvelope, RequestEnvelope, ResponseEnvelope};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        EnsembleEnvelope, EnsembleError, EnsembleOrchestrator, Error, GatewayConfig, Prompt,
        ProviderClient, ProviderResponse, Result, ScoredResponse, VoteOutcome,
    };
}
