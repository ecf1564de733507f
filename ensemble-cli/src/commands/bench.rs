//! Replay prompts from a file through the ensemble and report latency.

use anyhow::{Context, Result};
use ensemble_core::{EnsembleOrchestrator, Prompt};

use super::{build_providers, load_config, parse_tier};

pub async fn run(file: String, tier: String, config_path: Option<String>) -> Result<()> {
    let prompts = std::fs::read_to_string(&file)
        .with_context(|| format!("reading prompt file {}", file))?
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>();

    if prompts.is_empty() {
        anyhow::bail!("{} contained no prompts", file);
    }

    let config = load_config(&config_path)?;
    let tier = parse_tier(&tier);
    let providers = build_providers(&config, tier);
    let orchestrator = EnsembleOrchestrator::new(config, providers);

    let mut latencies_ms = Vec::with_capacity(prompts.len());
    let mut failures = 0usize;

    for text in prompts {
        let prompt = Prompt::new(text).tier(tier);
        match orchestrator.process(prompt).await {
            Ok(envelope) => latencies_ms.push(envelope.total_latency_ms),
            Err(e) => {
                failures += 1;
                eprintln!("prompt failed: {}", e);
            }
        }
    }

    latencies_ms.sort_unstable();
    let total = latencies_ms.len();
    println!("ran {} prompts, {} failed", total + failures, failures);
    if total > 0 {
        println!("p50: {}ms", percentile(&latencies_ms, 0.50));
        println!("p95: {}ms", percentile(&latencies_ms, 0.95));
        println!("max: {}ms", latencies_ms[total - 1]);
    }

    Ok(())
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() as f64) * p).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
