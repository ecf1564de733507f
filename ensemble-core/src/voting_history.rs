//! Voting History Store: a rolling record of completed votes, used to
//! derive per-model historical win rates (consulted by the Tie-Breaker)
//! and a short-term/long-term win-rate ratio (consulted by the Voter's
//! hybrid adjustment).
//!
//! Shaped the same way as the teacher's telemetry bookkeeping: an outer
//! `RwLock<HashMap<...>>` for the per-role rollups plus a bounded
//! `VecDeque` log, mirroring [`crate::telemetry::TelemetryCollector`]'s
//! `RwLock<VecDeque<TelemetryEvent>>` event buffer.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use crate::escalation::HistoricalWinRates;
use crate::model::{RoleTag, VotingHistoryRecord};

const RECENT_WINDOW: usize = 20;
const MIN_VOTES_FOR_MULTIPLIER: u64 = 5;

/// Per-role win/vote counters: an all-time tally plus a bounded recent
/// window, so the Voter's hybrid adjustment can compare "how this model
/// is doing lately" against "how it has done overall."
#[derive(Default)]
struct ModelHistory {
    total_wins: u64,
    total_votes: u64,
    recent: VecDeque<bool>,
}

impl ModelHistory {
    fn record(&mut self, won: bool) {
        self.total_votes += 1;
        if won {
            self.total_wins += 1;
        }
        self.recent.push_back(won);
        if self.recent.len() > RECENT_WINDOW {
            self.recent.pop_front();
        }
    }

    fn long_term_win_rate(&self) -> Option<f64> {
        if self.total_votes == 0 {
            return None;
        }
        Some(self.total_wins as f64 / self.total_votes as f64)
    }

    fn recent_win_rate(&self) -> Option<f64> {
        if self.recent.is_empty() {
            return None;
        }
        let wins = self.recent.iter().filter(|w| **w).count();
        Some(wins as f64 / self.recent.len() as f64)
    }
}

/// Bounded log of completed votes plus per-role win/vote rollups.
pub struct VotingHistoryStore {
    models: RwLock<HashMap<String, ModelHistory>>,
    records: RwLock<VecDeque<VotingHistoryRecord>>,
    record_window: usize,
}

impl VotingHistoryStore {
    pub fn new(record_window: usize) -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            records: RwLock::new(VecDeque::new()),
            record_window,
        }
    }

    /// Append a completed vote, updating both the per-role rollups and
    /// the bounded record log.
    pub fn append(&self, record: VotingHistoryRecord) {
        {
            let mut models = self.models.write().unwrap();
            for role in &record.participating_models {
                let won = record.winner.as_ref() == Some(role);
                models.entry(role.0.clone()).or_default().record(won);
            }
        }
        let mut records = self.records.write().unwrap();
        records.push_back(record);
        if records.len() > self.record_window {
            records.pop_front();
        }
    }

    /// Ratio of `role`'s recent win rate to its long-term win rate,
    /// clamped to `[0.5, 2.0]`. Defaults to `1.0` (no adjustment) when
    /// the role has fewer than [`MIN_VOTES_FOR_MULTIPLIER`] recorded
    /// votes, since a ratio from too few samples is noise rather than
    /// signal.
    pub fn historical_multiplier(&self, role: &RoleTag) -> f64 {
        let models = self.models.read().unwrap();
        let Some(history) = models.get(&role.0) else {
            return 1.0;
        };
        if history.total_votes < MIN_VOTES_FOR_MULTIPLIER {
            return 1.0;
        }
        let (Some(recent), Some(long_term)) = (history.recent_win_rate(), history.long_term_win_rate()) else {
            return 1.0;
        };
        if long_term <= 0.0 {
            return 1.0;
        }
        (recent / long_term).clamp(0.5, 2.0)
    }
}

impl HistoricalWinRates for VotingHistoryStore {
    fn win_rate(&self, role: &RoleTag) -> Option<f64> {
        let models = self.models.read().unwrap();
        models.get(&role.0)?.long_term_win_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConsensusLevel;

    fn record(winner: &str, participants: &[&str]) -> VotingHistoryRecord {
        VotingHistoryRecord {
            winner: Some(RoleTag::new(winner)),
            weights: HashMap::new(),
            participating_models: participants.iter().map(|r| RoleTag::new(*r)).collect(),
            consensus: ConsensusLevel::Moderate,
            diversity: 0.5,
            tie_breaker_used: false,
            processing_time_ms: 100,
            timestamp_secs: 0,
        }
    }

    #[test]
    fn unknown_role_has_no_win_rate() {
        let store = VotingHistoryStore::new(100);
        assert_eq!(store.win_rate(&RoleTag::new("gpt4o")), None);
    }

    #[test]
    fn win_rate_reflects_recorded_outcomes() {
        let store = VotingHistoryStore::new(100);
        for _ in 0..3 {
            store.append(record("gpt4o", &["gpt4o", "gemini"]));
        }
        store.append(record("gemini", &["gpt4o", "gemini"]));
        assert_eq!(store.win_rate(&RoleTag::new("gpt4o")), Some(0.75));
    }

    #[test]
    fn historical_multiplier_defaults_to_one_before_minimum_votes() {
        let store = VotingHistoryStore::new(100);
        store.append(record("gpt4o", &["gpt4o", "gemini"]));
        assert_eq!(store.historical_multiplier(&RoleTag::new("gpt4o")), 1.0);
    }

    #[test]
    fn historical_multiplier_rewards_recent_improvement() {
        let store = VotingHistoryStore::new(100);
        for _ in 0..20 {
            store.append(record("gemini", &["gpt4o", "gemini"]));
        }
        for _ in 0..10 {
            store.append(record("gpt4o", &["gpt4o", "gemini"]));
        }
        assert!(store.historical_multiplier(&RoleTag::new("gpt4o")) > 1.0);
    }

    #[test]
    fn record_log_is_bounded() {
        let store = VotingHistoryStore::new(2);
        for _ in 0..5 {
            store.append(record("gpt4o", &["gpt4o", "gemini"]));
        }
        assert_eq!(store.records.read().unwrap().len(), 2);
    }
}
