//! Intent Classifier: a cheap keyword-based classifier that tags a
//! prompt with its intent, domain, complexity, and urgency so downstream
//! stages (Voter weighting, per-provider timeouts, Synthesizer section
//! budget) can adjust behavior accordingly.

use std::collections::HashMap;

/// Coarse intent categories the gateway distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Factual,
    Creative,
    Technical,
    Comparative,
    Explanatory,
    ProblemSolving,
    Analytical,
    Instructional,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Factual => "factual",
            Intent::Creative => "creative",
            Intent::Technical => "technical",
            Intent::Comparative => "comparative",
            Intent::Explanatory => "explanatory",
            Intent::ProblemSolving => "problem_solving",
            Intent::Analytical => "analytical",
            Intent::Instructional => "instructional",
            Intent::General => "general",
        }
    }

    /// Default section budget for this intent, used by the Synthesizer
    /// when no explicit override is configured.
    pub fn default_section_budget(&self) -> usize {
        match self {
            Intent::Factual => 3,
            Intent::Creative => 2,
            Intent::Technical => 4,
            Intent::Comparative => 5,
            Intent::Explanatory => 4,
            Intent::ProblemSolving => 5,
            Intent::Analytical => 4,
            Intent::Instructional => 6,
            Intent::General => 3,
        }
    }
}

/// Subject-matter domain, used alongside intent to shape section
/// selection and (eventually) provider routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Technology,
    Science,
    Business,
    Education,
    Health,
    Arts,
    General,
}

/// How much depth a prompt seems to call for, from a quick lexical proxy
/// (length, sentence structure, and explicit complexity markers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    VerySimple,
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl Complexity {
    /// Extra sections the Synthesizer should budget for beyond the
    /// intent's default, scaling with how much depth the prompt implies.
    pub fn extra_sections(&self) -> usize {
        match self {
            Complexity::VerySimple | Complexity::Simple => 0,
            Complexity::Moderate => 1,
            Complexity::Complex => 2,
            Complexity::VeryComplex => 3,
        }
    }
}

/// How time-sensitive the request appears, from explicit urgency
/// language in the prompt. Drives per-provider deadline scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    High,
    Medium,
    Low,
}

impl Urgency {
    /// Multiplier applied to the per-provider deadline: urgent requests
    /// trade patience for speed.
    pub fn deadline_factor(&self) -> f64 {
        match self {
            Urgency::High => 0.6,
            Urgency::Medium => 0.85,
            Urgency::Low => 1.0,
        }
    }
}

/// Full classification of a prompt: the four signals downstream stages
/// consult.
#[derive(Debug, Clone, Copy)]
pub struct IntentAnalysis {
    pub intent: Intent,
    pub domain: Domain,
    pub complexity: Complexity,
    pub urgency: Urgency,
}

/// Per-intent rule: keywords that contribute to a match.
struct IntentRule {
    intent: Intent,
    keywords: &'static [&'static str],
}

const INTENT_RULES: &[IntentRule] = &[
    IntentRule { intent: Intent::Technical, keywords: &["code", "function", "implement", "bug", "compile", "debug", "syntax", "algorithm", "database", "api"] },
    IntentRule { intent: Intent::ProblemSolving, keywords: &["fix", "solve", "troubleshoot", "not working", "broken", "resolve this"] },
    IntentRule { intent: Intent::Instructional, keywords: &["how do i", "how to", "steps to", "guide", "tutorial", "set up", "walk me through"] },
    IntentRule { intent: Intent::Comparative, keywords: &["vs", "versus", "compare", "difference between", "better than"] },
    IntentRule { intent: Intent::Explanatory, keywords: &["explain", "why does", "why is", "what causes", "describe how"] },
    IntentRule { intent: Intent::Analytical, keywords: &["analyze", "evaluate", "pros and cons", "implications", "assess"] },
    IntentRule { intent: Intent::Creative, keywords: &["write a story", "poem", "imagine", "creative", "fictional"] },
    IntentRule { intent: Intent::Factual, keywords: &["what is", "who is", "when did", "where is", "define"] },
];

struct DomainRule {
    domain: Domain,
    keywords: &'static [&'static str],
}

const DOMAIN_RULES: &[DomainRule] = &[
    DomainRule { domain: Domain::Technology, keywords: &["software", "computer", "programming", "algorithm", "database", "network", "code", "server"] },
    DomainRule { domain: Domain::Science, keywords: &["physics", "chemistry", "biology", "experiment", "theory", "hypothesis", "molecule"] },
    DomainRule { domain: Domain::Business, keywords: &["revenue", "market", "company", "strategy", "invest", "customer", "startup"] },
    DomainRule { domain: Domain::Education, keywords: &["learn", "teach", "school", "student", "curriculum", "lesson", "exam"] },
    DomainRule { domain: Domain::Health, keywords: &["medical", "disease", "symptom", "treatment", "doctor", "patient", "diagnosis"] },
    DomainRule { domain: Domain::Arts, keywords: &["art", "music", "paint", "novel", "poem", "film", "sculpture"] },
];

const COMPLEXITY_MARKERS: &[&str] = &["comprehensive", "nuanced", "in-depth", "advanced", "intricate", "multifaceted", "thorough"];
const SIMPLICITY_MARKERS: &[&str] = &["simple", "basic", "briefly", "quick", "short", "in one sentence"];
const URGENT_MARKERS: &[&str] = &["urgent", "asap", "immediately", "emergency", "critical", "right now"];
const SOON_MARKERS: &[&str] = &["soon", "today", "quickly", "by tomorrow"];

/// Stateless keyword-based intent/domain/complexity/urgency classifier.
#[derive(Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> IntentAnalysis {
        IntentAnalysis {
            intent: self.classify_intent(text),
            domain: self.classify_domain(text),
            complexity: self.classify_complexity(text),
            urgency: self.classify_urgency(text),
        }
    }

    fn classify_intent(&self, text: &str) -> Intent {
        let lower = text.to_lowercase();
        let mut scores: HashMap<Intent, usize> = HashMap::new();
        for rule in INTENT_RULES {
            let hits = rule.keywords.iter().filter(|kw| lower.contains(*kw)).count();
            if hits > 0 {
                *scores.entry(rule.intent).or_insert(0) += hits;
            }
        }
        scores
            .into_iter()
            .max_by_key(|(_, score)| *score)
            .map(|(intent, _)| intent)
            .unwrap_or(Intent::General)
    }

    fn classify_domain(&self, text: &str) -> Domain {
        let lower = text.to_lowercase();
        let mut scores: HashMap<Domain, usize> = HashMap::new();
        for rule in DOMAIN_RULES {
            let hits = rule.keywords.iter().filter(|kw| lower.contains(*kw)).count();
            if hits > 0 {
                *scores.entry(rule.domain).or_insert(0) += hits;
            }
        }
        scores
            .into_iter()
            .max_by_key(|(_, score)| *score)
            .map(|(domain, _)| domain)
            .unwrap_or(Domain::General)
    }

    fn classify_complexity(&self, text: &str) -> Complexity {
        let lower = text.to_lowercase();
        let words = text.split_whitespace().count();
        let sentences = text.split(['.', '!', '?']).filter(|s| !s.trim().is_empty()).count().max(1);
        let avg_sentence_len = words as f64 / sentences as f64;
        let complex_hits = COMPLEXITY_MARKERS.iter().filter(|m| lower.contains(*m)).count();
        let simple_hits = SIMPLICITY_MARKERS.iter().filter(|m| lower.contains(*m)).count();

        let mut score: i32 = 0;
        score += if words > 60 {
            2
        } else if words > 30 {
            1
        } else if words < 8 {
            -1
        } else {
            0
        };
        score += if avg_sentence_len > 25.0 { 1 } else { 0 };
        score += complex_hits as i32 - simple_hits as i32;

        match score {
            s if s <= -1 => Complexity::VerySimple,
            0 => Complexity::Simple,
            1 => Complexity::Moderate,
            2 => Complexity::Complex,
            _ => Complexity::VeryComplex,
        }
    }

    fn classify_urgency(&self, text: &str) -> Urgency {
        let lower = text.to_lowercase();
        if URGENT_MARKERS.iter().any(|m| lower.contains(m)) {
            Urgency::High
        } else if SOON_MARKERS.iter().any(|m| lower.contains(m)) {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }

    /// How well `content` matches the expected shape of a response to
    /// `intent` (fenced code for technical prompts, numbered steps for
    /// instructional/problem-solving ones).
    pub fn alignment(&self, intent: Intent, content: &str) -> f64 {
        match intent {
            Intent::Technical => {
                if content.contains("```") {
                    1.0
                } else {
                    0.4
                }
            }
            Intent::Instructional | Intent::ProblemSolving => {
                let has_steps = content
                    .lines()
                    .any(|l| l.trim_start().chars().next().is_some_and(|c| c.is_ascii_digit()));
                if has_steps {
                    1.0
                } else {
                    0.5
                }
            }
            Intent::Comparative => {
                let lower = content.to_lowercase();
                let has_comparison = ["however", "whereas", "on the other hand", "in contrast"]
                    .iter()
                    .any(|c| lower.contains(c));
                if has_comparison {
                    0.9
                } else {
                    0.6
                }
            }
            _ => 0.7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_technical_intent() {
        let classifier = IntentClassifier::new();
        assert_eq!(classifier.classify("How do I fix this bug in my function?").intent, Intent::Technical);
    }

    #[test]
    fn classifies_comparative_intent() {
        let classifier = IntentClassifier::new();
        assert_eq!(classifier.classify("Python vs Rust for systems programming").intent, Intent::Comparative);
    }

    #[test]
    fn falls_back_to_general() {
        let classifier = IntentClassifier::new();
        assert_eq!(classifier.classify("Tell me something interesting.").intent, Intent::General);
    }

    #[test]
    fn code_alignment_rewards_fenced_blocks() {
        let classifier = IntentClassifier::new();
        assert!(
            classifier.alignment(Intent::Technical, "```rust\nfn main() {}\n```")
                > classifier.alignment(Intent::Technical, "just text")
        );
    }

    #[test]
    fn classifies_health_domain() {
        let classifier = IntentClassifier::new();
        assert_eq!(classifier.classify("What treatment does the doctor recommend for this symptom?").domain, Domain::Health);
    }

    #[test]
    fn short_plain_prompt_is_simple() {
        let classifier = IntentClassifier::new();
        assert!(classifier.classify("What is the capital of France?").complexity <= Complexity::Simple);
    }

    #[test]
    fn long_detailed_prompt_is_more_complex() {
        let classifier = IntentClassifier::new();
        let long_prompt = "Give me a comprehensive, in-depth, and nuanced analysis of the economic, social, and political implications of renewable energy adoption across developing nations, considering historical context, current trends, and future projections.";
        assert!(classifier.classify(long_prompt).complexity > Complexity::Simple);
    }

    #[test]
    fn urgent_language_is_detected() {
        let classifier = IntentClassifier::new();
        assert_eq!(classifier.classify("I need this fixed immediately, it's an emergency!").urgency, Urgency::High);
    }

    #[test]
    fn plain_prompt_has_low_urgency() {
        let classifier = IntentClassifier::new();
        assert_eq!(classifier.classify("What is the capital of France?").urgency, Urgency::Low);
    }
}
