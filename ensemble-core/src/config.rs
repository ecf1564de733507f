//! Configuration types for the ensemble gateway.
//!
//! Follows the `XConfig` naming convention: one struct per concern, each
//! with a `Default` impl and a builder-style `with_*`/setter API, loaded
//! from TOML at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::Tier;

/// Per-provider configuration entry within a tier's provider list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Stable role tag (e.g. "gpt4o", "gemini", "claude").
    pub role: String,
    /// Upstream provider name.
    pub provider: String,
    /// Upstream model name.
    pub model: String,
    /// Cost per 1k input tokens, in the gateway's billing currency unit.
    pub cost_per_1k_input: f64,
    /// Cost per 1k output tokens.
    pub cost_per_1k_output: f64,
    /// Per-provider deadline, in milliseconds.
    pub deadline_ms: u64,
}

/// Per-tier configuration: provider set, admission concurrency, prompt limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Providers queried for requests in this tier.
    pub providers: Vec<ProviderConfig>,
    /// Maximum number of requests admitted concurrently for this tier.
    pub admission_concurrency: usize,
    /// Maximum prompt length (characters) accepted for this tier.
    pub max_prompt_len: usize,
}

fn default_free_tier() -> TierConfig {
    TierConfig {
        providers: vec![
            ProviderConfig {
                role: "gpt4o".into(),
                provider: "openai".into(),
                model: "gpt-4o-mini".into(),
                cost_per_1k_input: 0.15,
                cost_per_1k_output: 0.6,
                deadline_ms: 8_000,
            },
            ProviderConfig {
                role: "gemini".into(),
                provider: "google".into(),
                model: "gemini-1.5-flash".into(),
                cost_per_1k_input: 0.075,
                cost_per_1k_output: 0.3,
                deadline_ms: 8_000,
            },
            ProviderConfig {
                role: "claude".into(),
                provider: "anthropic".into(),
                model: "claude-3-haiku".into(),
                cost_per_1k_input: 0.25,
                cost_per_1k_output: 1.25,
                deadline_ms: 8_000,
            },
        ],
        admission_concurrency: 50,
        max_prompt_len: 4_000,
    }
}

fn default_premium_tier() -> TierConfig {
    TierConfig {
        providers: vec![
            ProviderConfig {
                role: "gpt4o".into(),
                provider: "openai".into(),
                model: "gpt-4o".into(),
                cost_per_1k_input: 2.5,
                cost_per_1k_output: 10.0,
                deadline_ms: 15_000,
            },
            ProviderConfig {
                role: "gemini".into(),
                provider: "google".into(),
                model: "gemini-1.5-pro".into(),
                cost_per_1k_input: 1.25,
                cost_per_1k_output: 5.0,
                deadline_ms: 15_000,
            },
            ProviderConfig {
                role: "claude".into(),
                provider: "anthropic".into(),
                model: "claude-3-5-sonnet".into(),
                cost_per_1k_input: 3.0,
                cost_per_1k_output: 15.0,
                deadline_ms: 15_000,
            },
        ],
        admission_concurrency: 20,
        max_prompt_len: 16_000,
    }
}

/// Calibration subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Rolling sample window size per model.
    #[serde(default = "default_sample_window")]
    pub sample_window: usize,
    /// Number of bins in a calibration map.
    #[serde(default = "default_bin_count")]
    pub bin_count: usize,
    /// Minimum samples required before calibration is available.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Rebuild the calibration map every N new samples.
    #[serde(default = "default_rebuild_every")]
    pub rebuild_every: usize,
    /// Brier rolling window size.
    #[serde(default = "default_brier_window")]
    pub brier_window: usize,
    /// Brier summary window (most recent N scores).
    #[serde(default = "default_brier_summary")]
    pub brier_summary_window: usize,
}

fn default_sample_window() -> usize { 500 }
fn default_bin_count() -> usize { 10 }
fn default_min_samples() -> usize { 20 }
fn default_rebuild_every() -> usize { 10 }
fn default_brier_window() -> usize { 100 }
fn default_brier_summary() -> usize { 20 }

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            sample_window: default_sample_window(),
            bin_count: default_bin_count(),
            min_samples: default_min_samples(),
            rebuild_every: default_rebuild_every(),
            brier_window: default_brier_window(),
            brier_summary_window: default_brier_summary(),
        }
    }
}

/// Admission queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum number of queued+in-flight requests.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    /// Queue-length threshold above which an autoscale signal fires.
    #[serde(default = "default_queue_threshold")]
    pub length_threshold: usize,
    /// p95 processing time (ms) above which an autoscale signal fires.
    #[serde(default = "default_p95_threshold_ms")]
    pub p95_threshold_ms: u64,
}

fn default_queue_capacity() -> usize { 10 }
fn default_queue_threshold() -> usize { 10 }
fn default_p95_threshold_ms() -> u64 { 8_000 }

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            length_threshold: default_queue_threshold(),
            p95_threshold_ms: default_p95_threshold_ms(),
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Base TTL in seconds (quality score 0.5 maps to this).
    #[serde(default = "default_base_ttl")]
    pub base_ttl_secs: u64,
    /// Minimum TTL in seconds.
    #[serde(default = "default_min_ttl")]
    pub min_ttl_secs: u64,
    /// Maximum TTL in seconds.
    #[serde(default = "default_max_ttl")]
    pub max_ttl_secs: u64,
    /// Maximum number of entries retained locally.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Semantic-similarity hit threshold (Jaccard over keyword sets).
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_base_ttl() -> u64 { 7_200 }
fn default_min_ttl() -> u64 { 3_600 }
fn default_max_ttl() -> u64 { 10_800 }
fn default_capacity() -> usize { 10_000 }
fn default_similarity_threshold() -> f64 { 0.4 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_ttl_secs: default_base_ttl(),
            min_ttl_secs: default_min_ttl(),
            max_ttl_secs: default_max_ttl(),
            capacity: default_capacity(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Synthesizer configuration. Redundancy threshold and synthesis
/// model name are configuration, not hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Word-set Jaccard similarity above which a candidate section is
    /// rejected as redundant with an already-selected one.
    #[serde(default = "default_redundancy_threshold")]
    pub redundancy_threshold: f64,
    /// Default max sections selected (overridden per intent).
    #[serde(default = "default_max_sections")]
    pub max_sections: usize,
    /// Role tag of the provider invoked to perform synthesis.
    #[serde(default = "default_synthesis_role")]
    pub synthesis_role: String,
    /// Minimum section length (words) to be considered.
    #[serde(default = "default_min_section_words")]
    pub min_section_words: usize,
}

fn default_redundancy_threshold() -> f64 { 0.45 }
fn default_max_sections() -> usize { 6 }
fn default_synthesis_role() -> String { "gpt4o".to_string() }
fn default_min_section_words() -> usize { 8 }

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            redundancy_threshold: default_redundancy_threshold(),
            max_sections: default_max_sections(),
            synthesis_role: default_synthesis_role(),
            min_section_words: default_min_section_words(),
        }
    }
}

/// Top-level gateway configuration, loaded from TOML at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Tier name -> tier configuration.
    pub tiers: HashMap<String, TierConfig>,
    /// Calibration subsystem configuration.
    #[serde(default)]
    pub calibration: CalibrationConfig,
    /// Admission queue configuration.
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Response cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Synthesizer configuration.
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    /// Overhead budget subtracted from the request deadline to derive
    /// per-provider deadlines, in milliseconds.
    #[serde(default = "default_overhead_budget_ms")]
    pub overhead_budget_ms: u64,
}

fn default_overhead_budget_ms() -> u64 { 1_500 }

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut tiers = HashMap::new();
        tiers.insert("free".to_string(), default_free_tier());
        tiers.insert("premium".to_string(), default_premium_tier());
        Self {
            tiers,
            calibration: CalibrationConfig::default(),
            admission: AdmissionConfig::default(),
            cache: CacheConfig::default(),
            synthesis: SynthesisConfig::default(),
            overhead_budget_ms: default_overhead_budget_ms(),
        }
    }
}

impl GatewayConfig {
    /// Create a new config with default tiers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config from a TOML string.
    pub fn from_toml(s: &str) -> crate::error::Result<Self> {
        toml::from_str(s).map_err(|e| crate::error::Error::config(e.to_string()))
    }

    /// Look up the tier configuration, falling back to `free` if unknown.
    pub fn tier(&self, tier: Tier) -> &TierConfig {
        let key = tier.as_str();
        self.tiers
            .get(key)
            .or_else(|| self.tiers.get("free"))
            .expect("default config always carries a free tier")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_both_tiers() {
        let config = GatewayConfig::new();
        assert_eq!(config.tier(Tier::Free).providers.len(), 3);
        assert_eq!(config.tier(Tier::Premium).providers.len(), 3);
        assert!(config.tier(Tier::Premium).max_prompt_len > config.tier(Tier::Free).max_prompt_len);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = GatewayConfig::new();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = GatewayConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.tiers.len(), config.tiers.len());
    }
}
