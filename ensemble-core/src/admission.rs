//! Request Admission Queue: bounded, priority-aware gate in front of the
//! Orchestrator, with backpressure signaling.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::Tier;

/// Priority derives from tier; premium requests jump ahead of free-tier
/// ones in the queue but never preempt an already-admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Free,
    Premium,
}

impl From<Tier> for Priority {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Free => Priority::Free,
            Tier::Premium => Priority::Premium,
        }
    }
}

struct QueuedTicket {
    priority: Priority,
}

/// Rolling processing-time samples used to compute the p95 the
/// autoscale signal watches.
struct LatencySamples {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl LatencySamples {
    fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    fn record(&mut self, d: Duration) {
        self.samples.push_back(d);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    fn p95(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<Duration> = self.samples.iter().copied().collect();
        sorted.sort();
        let idx = ((sorted.len() as f64) * 0.95).floor() as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }
}

struct QueueState {
    /// Every ticket here is either queued or currently in flight;
    /// `complete` is what removes one.
    tickets: VecDeque<QueuedTicket>,
    latencies: LatencySamples,
}

/// Admission decision returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionSignal {
    pub queue_length: usize,
    pub autoscale_recommended: bool,
}

/// Bounded admission gate shared across concurrent requests.
pub struct AdmissionQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    length_threshold: usize,
    p95_threshold: Duration,
}

impl AdmissionQueue {
    pub fn new(config: &crate::config::AdmissionConfig) -> Self {
        Self {
            state: Mutex::new(QueueState {
                tickets: VecDeque::new(),
                latencies: LatencySamples::new(200),
            }),
            capacity: config.capacity,
            length_threshold: config.length_threshold,
            p95_threshold: Duration::from_millis(config.p95_threshold_ms),
        }
    }

    /// Attempt to admit a request of `tier`. Returns
    /// `Err(Error::Admission)` when the queue is at capacity; callers map
    /// this to `EnsembleError::AdmissionRefused` at the Orchestrator
    /// boundary.
    pub fn try_admit(&self, tier: Tier) -> Result<AdmissionSignal> {
        let mut state = self.state.lock().unwrap();
        let total = state.tickets.len();
        if total >= self.capacity {
            return Err(Error::admission(format!(
                "queue at capacity ({}/{})",
                total, self.capacity
            )));
        }

        let priority = Priority::from(tier);
        let insert_at = state
            .tickets
            .iter()
            .position(|t| t.priority < priority)
            .unwrap_or(state.tickets.len());
        state.tickets.insert(insert_at, QueuedTicket { priority });

        let queue_length = state.tickets.len();
        let p95_exceeded = state.latencies.p95().is_some_and(|p| p > self.p95_threshold);
        let autoscale_recommended = queue_length >= self.length_threshold || p95_exceeded;

        Ok(AdmissionSignal { queue_length, autoscale_recommended })
    }

    /// Mark one admitted request complete, recording its processing time
    /// for the rolling p95.
    pub fn complete(&self, processing_time: Duration) {
        let mut state = self.state.lock().unwrap();
        if !state.tickets.is_empty() {
            state.tickets.pop_front();
        }
        state.latencies.record(processing_time);
    }

    pub fn queue_length(&self) -> usize {
        self.state.lock().unwrap().tickets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(capacity: usize) -> crate::config::AdmissionConfig {
        crate::config::AdmissionConfig { capacity, length_threshold: 2, p95_threshold_ms: 1000 }
    }

    #[test]
    fn admits_until_capacity_then_refuses() {
        let queue = AdmissionQueue::new(&config(2));
        assert!(queue.try_admit(Tier::Free).is_ok());
        assert!(queue.try_admit(Tier::Free).is_ok());
        assert!(queue.try_admit(Tier::Free).is_err());
    }

    #[test]
    fn premium_jumps_ahead_of_free_in_queue_order() {
        let queue = AdmissionQueue::new(&config(10));
        queue.try_admit(Tier::Free).unwrap();
        queue.try_admit(Tier::Free).unwrap();
        queue.try_admit(Tier::Premium).unwrap();
        let state = queue.state.lock().unwrap();
        assert_eq!(state.tickets[0].priority, Priority::Premium);
    }

    #[test]
    fn autoscale_recommended_past_length_threshold() {
        let queue = AdmissionQueue::new(&config(10));
        let s1 = queue.try_admit(Tier::Free).unwrap();
        assert!(!s1.autoscale_recommended);
        queue.try_admit(Tier::Free).unwrap();
        let s3 = queue.try_admit(Tier::Free).unwrap();
        assert!(s3.autoscale_recommended);
    }

    #[test]
    fn completing_frees_capacity() {
        let queue = AdmissionQueue::new(&config(1));
        queue.try_admit(Tier::Free).unwrap();
        assert!(queue.try_admit(Tier::Free).is_err());
        queue.complete(Duration::from_millis(50));
        assert!(queue.try_admit(Tier::Free).is_ok());
    }
}
