//! Run a single prompt through the ensemble pipeline.

use anyhow::Result;
use ensemble_core::{EnsembleOrchestrator, Prompt};

use super::{build_providers, load_config, parse_tier};

pub async fn run(text: String, tier: String, config_path: Option<String>) -> Result<()> {
    let config = load_config(&config_path)?;
    let tier = parse_tier(&tier);
    let providers = build_providers(&config, tier);

    let orchestrator = EnsembleOrchestrator::new(config, providers);
    let prompt = Prompt::new(text).tier(tier);

    match orchestrator.process(prompt).await {
        Ok(envelope) => {
            println!("{}", envelope.answer.text);
            println!(
                "\n--- diagnostics ---\nconsensus: {} | providers responded: {}/{} | latency: {}ms | cache hit: {}",
                envelope.vote.consensus_level,
                envelope.providers_responded,
                envelope.providers_queried,
                envelope.total_latency_ms,
                envelope.served_from_cache,
            );
            if !envelope.validation.passed {
                println!("validation issues:");
                for issue in &envelope.validation.issues {
                    println!("  - [{}] {}", issue.dimension, issue.message);
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.http_status() as i32 % 256);
        }
    }
}
