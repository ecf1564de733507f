pub mod bench;
pub mod config;
pub mod run;

use std::sync::Arc;

use ensemble_core::provider::{LlmProviderClient, ProviderClient};
use ensemble_core::llm::{LlmConfig, OpenAiProvider};
use ensemble_core::{GatewayConfig, Tier};

/// Parse a tier name from the CLI, defaulting to `free` on anything else.
pub fn parse_tier(name: &str) -> Tier {
    match name {
        "premium" => Tier::Premium,
        _ => Tier::Free,
    }
}

/// Load a [`GatewayConfig`] from `path` if given, otherwise the built-in
/// defaults.
pub fn load_config(path: &Option<String>) -> anyhow::Result<GatewayConfig> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("reading {}: {}", path, e))?;
            GatewayConfig::from_toml(&contents).map_err(|e| anyhow::anyhow!(e.to_string()))
        }
        None => Ok(GatewayConfig::new()),
    }
}

/// Build one [`ProviderClient`] per provider configured for `tier`,
/// wired to OpenAI-compatible endpoints via each provider's own API key
/// environment variable (e.g. `OPENAI_API_KEY`, `GOOGLE_API_KEY`,
/// `ANTHROPIC_API_KEY`).
pub fn build_providers(config: &GatewayConfig, tier: Tier) -> Vec<Arc<dyn ProviderClient>> {
    config
        .tier(tier)
        .providers
        .iter()
        .map(|p| {
            let env_var = format!("{}_API_KEY", p.provider.to_uppercase());
            let mut llm_config = LlmConfig::new(p.model.clone());
            if let Ok(key) = std::env::var(&env_var) {
                llm_config = llm_config.api_key(key);
            }
            let transport = OpenAiProvider::new(llm_config);
            Arc::new(LlmProviderClient::new(p.role.clone(), p.provider.clone(), transport))
                as Arc<dyn ProviderClient>
        })
        .collect()
}
