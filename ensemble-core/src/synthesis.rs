//! Synthesizer: combines the winning response with non-redundant
//! sections drawn from the other responses into a single answer.
//!
//! The primary path calls a Provider Client with a synthesis prompt
//! built from the prompt and every response; the template-concatenation
//! path below only runs as a fallback when that call fails, is
//! rejected, or returns empty content. Section extraction treats
//! markdown headings and paragraph breaks as section boundaries, the
//! same coarse split the Quality Scorer's structure heuristic already
//! uses over markdown-ish text.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::model::{Prompt, RoleTag, ScoredResponse, SectionType, SynthesizedAnswer};
use crate::provider::ProviderClient;

const SYNTHESIS_DEADLINE: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
struct Section {
    role: RoleTag,
    heading: Option<String>,
    body: String,
    section_type: SectionType,
    quality: f64,
}

pub struct Synthesizer {
    redundancy_threshold: f64,
    max_sections: usize,
    min_section_words: usize,
}

impl Synthesizer {
    pub fn new(config: &crate::config::SynthesisConfig) -> Self {
        Self {
            redundancy_threshold: config.redundancy_threshold,
            max_sections: config.max_sections,
            min_section_words: config.min_section_words,
        }
    }

    /// Build a synthesized answer for `prompt_text` from `winner` plus
    /// `others`. When `synthesis_client` is given, it is tried first with
    /// a constructed synthesis prompt; the template-concatenation
    /// fallback only runs when that call fails, is rejected, or returns
    /// empty content.
    pub async fn synthesize(
        &self,
        prompt_text: &str,
        winner: &ScoredResponse,
        others: &[ScoredResponse],
        section_budget: usize,
        synthesis_client: Option<&dyn ProviderClient>,
    ) -> SynthesizedAnswer {
        if let Some(client) = synthesis_client {
            if let Some(answer) = self.synthesize_via_provider(client, prompt_text, winner, others).await {
                return answer;
            }
        }
        self.synthesize_via_template(winner, others, section_budget)
    }

    /// Primary synthesis path: ask a Provider Client to combine the
    /// responses directly. Returns `None` on rejection or empty content
    /// so the caller falls back to the template path.
    async fn synthesize_via_provider(
        &self,
        client: &dyn ProviderClient,
        prompt_text: &str,
        winner: &ScoredResponse,
        others: &[ScoredResponse],
    ) -> Option<SynthesizedAnswer> {
        let synthesis_prompt = build_synthesis_prompt(prompt_text, winner, others);
        let request = Prompt::new(synthesis_prompt);
        let response = client.invoke(&request, SYNTHESIS_DEADLINE, CancellationToken::new()).await;
        if !response.is_fulfilled() || response.content.trim().is_empty() {
            return None;
        }

        let mut contributing_roles: Vec<RoleTag> =
            std::iter::once(winner.role().clone()).chain(others.iter().map(|r| r.role().clone())).collect();
        contributing_roles.sort();
        contributing_roles.dedup();

        Some(SynthesizedAnswer {
            text: response.content,
            contributing_roles,
            section_plan: Vec::new(),
            quality_improvement: 0.0,
        })
    }

    /// Fallback synthesis path: mine non-redundant sections out of the
    /// winner and the other responses and concatenate them, capped at
    /// `max_sections` (or the intent's own budget if smaller).
    fn synthesize_via_template(
        &self,
        winner: &ScoredResponse,
        others: &[ScoredResponse],
        section_budget: usize,
    ) -> SynthesizedAnswer {
        let budget = section_budget.min(self.max_sections).max(1);

        let mut sections: Vec<Section> = extract_sections(winner, self.min_section_words);
        for other in others {
            sections.extend(extract_sections(other, self.min_section_words));
        }

        sections.sort_by(|a, b| b.quality.partial_cmp(&a.quality).unwrap());

        let mut selected: Vec<Section> = Vec::new();
        for candidate in sections {
            if selected.len() >= budget {
                break;
            }
            let redundant = selected
                .iter()
                .any(|s| jaccard_similarity(&s.body, &candidate.body) >= self.redundancy_threshold);
            if !redundant {
                selected.push(candidate);
            }
        }

        selected.sort_by_key(|s| s.section_type.order());

        let contributing_roles: Vec<RoleTag> = {
            let mut roles: Vec<RoleTag> = selected.iter().map(|s| s.role.clone()).collect();
            roles.sort();
            roles.dedup();
            roles
        };
        let section_plan: Vec<SectionType> = selected.iter().map(|s| s.section_type).collect();

        let text = selected
            .iter()
            .map(|s| match &s.heading {
                Some(h) => format!("{}\n{}", h, s.body),
                None => s.body.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let mean_input_quality = {
            let mut all = others.iter().map(|r| r.quality.composite).collect::<Vec<_>>();
            all.push(winner.quality.composite);
            all.iter().sum::<f64>() / all.len() as f64
        };
        let synthesis_quality = selected.iter().map(|s| s.quality).sum::<f64>()
            / selected.len().max(1) as f64;

        SynthesizedAnswer {
            text,
            contributing_roles,
            section_plan,
            quality_improvement: synthesis_quality - mean_input_quality,
        }
    }
}

/// Builds the prompt handed to the synthesis Provider Client: the
/// original request plus every response, asking it to produce one
/// combined answer.
fn build_synthesis_prompt(prompt_text: &str, winner: &ScoredResponse, others: &[ScoredResponse]) -> String {
    let mut out = String::new();
    out.push_str("Combine the following model responses into a single, coherent answer ");
    out.push_str("to the user's original prompt. Prefer the highest-quality content and ");
    out.push_str("resolve any redundancy; do not simply concatenate.\n\n");
    out.push_str(&format!("Original prompt: {}\n\n", prompt_text));
    out.push_str(&format!("Response from {} (top-ranked):\n{}\n\n", winner.role(), winner.response.content));
    for other in others {
        out.push_str(&format!("Response from {}:\n{}\n\n", other.role(), other.response.content));
    }
    out
}

/// Splits a response's content on blank lines / markdown headings into
/// candidate sections, tagging each with a [`SectionType`] guessed from
/// its heading text or position.
fn extract_sections(response: &ScoredResponse, min_words: usize) -> Vec<Section> {
    let content = &response.response.content;
    let raw_paragraphs: Vec<&str> = content.split("\n\n").map(|p| p.trim()).filter(|p| !p.is_empty()).collect();

    if raw_paragraphs.is_empty() {
        return Vec::new();
    }

    raw_paragraphs
        .iter()
        .enumerate()
        .filter_map(|(idx, &paragraph)| {
            if paragraph.split_whitespace().count() < min_words {
                return None;
            }
            let (heading, body) = split_heading(paragraph);
            let section_type = classify_section(heading.as_deref(), idx, raw_paragraphs.len());
            Some(Section {
                role: response.role().clone(),
                heading,
                body: body.to_string(),
                section_type,
                quality: response.quality.composite,
            })
        })
        .collect()
}

fn split_heading(paragraph: &str) -> (Option<String>, &str) {
    let mut lines = paragraph.lines();
    if let Some(first) = lines.next() {
        if first.trim_start().starts_with('#') {
            let rest = paragraph.split_once('\n').map(|x| x.1).unwrap_or("");
            return (Some(first.trim().to_string()), rest);
        }
    }
    (None, paragraph)
}

fn classify_section(heading: Option<&str>, idx: usize, total: usize) -> SectionType {
    if let Some(h) = heading {
        let lower = h.to_lowercase();
        if lower.contains("intro") {
            return SectionType::Introduction;
        }
        if lower.contains("example") {
            return SectionType::Examples;
        }
        if lower.contains("application") || lower.contains("use case") {
            return SectionType::Applications;
        }
        if lower.contains("conclu") || lower.contains("summary") {
            return SectionType::Conclusion;
        }
        if lower.contains("detail") {
            return SectionType::Details;
        }
    }
    if idx == 0 {
        SectionType::Introduction
    } else if idx + 1 == total {
        SectionType::Conclusion
    } else {
        SectionType::Explanation
    }
}

/// Word-set Jaccard similarity between two pieces of text.
fn jaccard_similarity(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DimensionScore, ProviderResponse, QualityDimensions, ResponseStatus, RoleTag};
    use crate::provider::MockProviderClient;

    fn scored(role: &str, content: &str, quality: f64) -> ScoredResponse {
        ScoredResponse {
            response: ProviderResponse {
                role: RoleTag::new(role),
                provider_name: "openai".into(),
                model_name: "gpt-4o-mini".into(),
                status: ResponseStatus::Fulfilled,
                content: content.to_string(),
                response_time_ms: 500,
                prompt_tokens: 10,
                response_tokens: 20,
                raw_confidence: 0.7,
            },
            quality: QualityDimensions { composite: quality, structure: DimensionScore::new(0.5), ..Default::default() },
            embedding_uniqueness: 0.5,
            calibrated_confidence: quality,
        }
    }

    #[tokio::test]
    async fn synthesis_drops_redundant_sections() {
        let config = crate::config::SynthesisConfig::default();
        let synthesizer = Synthesizer::new(&config);
        let winner = scored(
            "gpt4o",
            "# Introduction\nPhotosynthesis converts sunlight into chemical energy in plants.\n\n# Examples\nLeaves use chlorophyll to capture light for this process.",
            0.9,
        );
        let other = scored(
            "gemini",
            "# Introduction\nPhotosynthesis converts sunlight into chemical energy for plants to use.",
            0.6,
        );
        let answer = synthesizer.synthesize("explain photosynthesis", &winner, &[other], 6, None).await;
        assert_eq!(answer.contributing_roles, vec![RoleTag::new("gpt4o")]);
    }

    #[tokio::test]
    async fn synthesis_respects_section_budget() {
        let config = crate::config::SynthesisConfig::default();
        let synthesizer = Synthesizer::new(&config);
        let winner = scored(
            "gpt4o",
            "# Introduction\nFirst section body text here with enough words.\n\n# Details\nSecond section body text with plenty of distinct words.\n\n# Conclusion\nThird section wraps everything up nicely indeed.",
            0.8,
        );
        let answer = synthesizer.synthesize("anything", &winner, &[], 2, None).await;
        assert!(answer.section_plan.len() <= 2);
    }

    #[tokio::test]
    async fn sections_are_ordered_canonically() {
        let config = crate::config::SynthesisConfig::default();
        let synthesizer = Synthesizer::new(&config);
        let winner = scored(
            "gpt4o",
            "# Conclusion\nWrapping up the discussion with final thoughts and takeaways.\n\n# Introduction\nStarting off by framing the problem we are solving here.",
            0.8,
        );
        let answer = synthesizer.synthesize("anything", &winner, &[], 6, None).await;
        if answer.section_plan.len() == 2 {
            assert!(answer.section_plan[0].order() <= answer.section_plan[1].order());
        }
    }

    #[tokio::test]
    async fn provider_client_output_is_used_when_it_succeeds() {
        let config = crate::config::SynthesisConfig::default();
        let synthesizer = Synthesizer::new(&config);
        let winner = scored("gpt4o", "Plants use sunlight to make energy.", 0.8);
        let other = scored("gemini", "Chlorophyll absorbs light for photosynthesis.", 0.7);
        let client = MockProviderClient::fulfilled("gpt4o", "A single combined explanation of photosynthesis.");
        let answer = synthesizer
            .synthesize("explain photosynthesis", &winner, &[other], 4, Some(&client))
            .await;
        assert_eq!(answer.text, "A single combined explanation of photosynthesis.");
        assert!(answer.section_plan.is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_template_when_provider_client_rejects() {
        let config = crate::config::SynthesisConfig::default();
        let synthesizer = Synthesizer::new(&config);
        let winner = scored(
            "gpt4o",
            "# Introduction\nPlants use sunlight to make energy from carbon dioxide and water.",
            0.8,
        );
        let client = MockProviderClient::rejected("gpt4o", crate::model::RejectKind::Timeout);
        let answer = synthesizer.synthesize("explain photosynthesis", &winner, &[], 4, Some(&client)).await;
        assert!(answer.text.contains("Plants use sunlight"));
    }
}
