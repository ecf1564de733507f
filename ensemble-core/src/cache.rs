//! Response Cache: content-addressed cache of prior ensemble results,
//! with TTL scaled by answer quality and a keyword-similarity secondary
//! lookup for near-duplicate prompts.

use std::sync::Mutex;

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;

use crate::model::{CacheEntry, SynthesizedAnswer, Tier};

pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    base_ttl_secs: u64,
    min_ttl_secs: u64,
    max_ttl_secs: u64,
    similarity_threshold: f64,
}

impl ResponseCache {
    pub fn new(config: &crate::config::CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity.max(1)).unwrap();
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            base_ttl_secs: config.base_ttl_secs,
            min_ttl_secs: config.min_ttl_secs,
            max_ttl_secs: config.max_ttl_secs,
            similarity_threshold: config.similarity_threshold,
        }
    }

    /// Content-addressed fingerprint for `prompt_text` under `tier`
    /// (tiers never share cache entries, since provider sets differ).
    pub fn fingerprint(prompt_text: &str, tier: Tier) -> String {
        let mut hasher = Sha256::new();
        hasher.update(tier.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(normalize(prompt_text).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Exact fingerprint lookup.
    pub fn get(&self, fingerprint: &str, now_secs: u64) -> Option<CacheEntry> {
        let mut entries = self.entries.lock().unwrap();
        let hit = entries.get(fingerprint)?;
        if hit.is_expired(now_secs) {
            entries.pop(fingerprint);
            return None;
        }
        let hit = hit.clone();
        if let Some(e) = entries.peek_mut(fingerprint) {
            e.popularity_score += 1;
        }
        Some(hit)
    }

    /// Secondary lookup: when the exact fingerprint misses, scan for an
    /// entry whose keyword set is Jaccard-similar enough to `prompt_text`.
    /// O(n) over the resident set; acceptable at the cache sizes this
    /// gateway targets (thousands, not millions, of entries).
    pub fn semantic_lookup(&self, prompt_text: &str, tier: Tier, now_secs: u64) -> Option<CacheEntry> {
        let query_keywords = keywords_of(prompt_text);
        let mut entries = self.entries.lock().unwrap();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now_secs))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }

        let best = entries
            .iter()
            .filter(|(_, e)| e.tier == tier)
            .map(|(key, e)| (key.clone(), jaccard(&query_keywords, &e.keywords)))
            .filter(|(_, score)| *score >= self.similarity_threshold)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        let (key, _) = best?;
        entries.get(&key).cloned()
    }

    /// Insert a freshly synthesized answer, scaling its TTL by the
    /// answer's `quality_improvement`-adjusted composite quality: higher
    /// quality earns a longer TTL, within `[min_ttl, max_ttl]`.
    pub fn insert(
        &self,
        prompt_text: &str,
        tier: Tier,
        answer: SynthesizedAnswer,
        quality: f64,
        now_secs: u64,
    ) {
        let fingerprint = Self::fingerprint(prompt_text, tier);
        let ttl_secs = self.scaled_ttl(quality);
        let keywords = keywords_of(prompt_text);
        let entry = CacheEntry {
            prompt_fingerprint: fingerprint.clone(),
            tier,
            answer,
            created_at_secs: now_secs,
            ttl_secs,
            popularity_score: 0,
            keywords,
        };
        self.entries.lock().unwrap().put(fingerprint, entry);
    }

    fn scaled_ttl(&self, quality: f64) -> u64 {
        let quality = quality.clamp(0.0, 1.0);
        let scaled = self.base_ttl_secs as f64 * (0.5 + quality);
        (scaled as u64).clamp(self.min_ttl_secs, self.max_ttl_secs)
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn keywords_of(text: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &["the", "a", "an", "is", "are", "of", "to", "in", "on", "and", "for"];
    let mut words: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect();
    words.sort();
    words.dedup();
    words
}

fn jaccard(a: &[String], b: &[String]) -> f64 {
    use std::collections::HashSet;
    let set_a: HashSet<&String> = a.iter().collect();
    let set_b: HashSet<&String> = b.iter().collect();
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
    use crate::model::RoleTag;

    fn answer(text: &str) -> SynthesizedAnswer {
        SynthesizedAnswer {
            text: text.to_string(),
            contributing_roles: vec![RoleTag::new("gpt4o")],
            section_plan: vec![],
            quality_improvement: 0.05,
        }
    }

    #[test]
    fn exact_fingerprint_round_trips() {
        let config = crate::config::CacheConfig::default();
        let cache = ResponseCache::new(&config);
        cache.insert("What is Rust?", Tier::Free, answer("Rust is a systems language."), 0.8, 1000);
        let fp = ResponseCache::fingerprint("What is Rust?", Tier::Free);
        let hit = cache.get(&fp, 1100).unwrap();
        assert_eq!(hit.answer.text, "Rust is a systems language.");
    }

    #[test]
    fn expired_entry_is_not_returned() {
        let mut config = crate::config::CacheConfig::default();
        config.min_ttl_secs = 10;
        config.base_ttl_secs = 10;
        config.max_ttl_secs = 10;
        let cache = ResponseCache::new(&config);
        cache.insert("hello", Tier::Free, answer("hi"), 0.5, 1000);
        let fp = ResponseCache::fingerprint("hello", Tier::Free);
        assert!(cache.get(&fp, 2000).is_none());
    }

    #[test]
    fn semantic_lookup_finds_similar_prompt() {
        let config = crate::config::CacheConfig::default();
        let cache = ResponseCache::new(&config);
        cache.insert(
            "Explain how photosynthesis works in plants",
            Tier::Free,
            answer("Photosynthesis converts sunlight into energy."),
            0.8,
            1000,
        );
        let hit = cache.semantic_lookup("How does photosynthesis work in plants", Tier::Free, 1100);
        assert!(hit.is_some());
    }

    #[test]
    fn higher_quality_earns_longer_ttl() {
        let config = crate::config::CacheConfig::default();
        let cache = ResponseCache::new(&config);
        assert!(cache.scaled_ttl(0.9) > cache.scaled_ttl(0.1));
    }
}
