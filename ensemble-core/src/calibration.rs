//! Calibration Store: learns, per model, the mapping from a raw
//! confidence value to an empirically-grounded probability, and tracks
//! each model's Brier score over time.
//!
//! Generalizes the teacher's `Arc<RwLock<HashMap<String, ApiStats>>>`
//! telemetry pattern from latency/success-rate bookkeeping to
//! calibration bookkeeping, adding a per-model [`Mutex`] inside the
//! outer `RwLock` so updates to different models never block each
//! other: the outer lock is only ever held briefly (as a read lock for
//! the common case, a write lock only to insert a model seen for the
//! first time), while the actual record/rebuild work is serialized
//! per-model by its own `Mutex`.
//!
//! Bin construction pools adjacent bins with pool-adjacent-violators
//! (PAV) isotonic regression so `mean_actual` is non-decreasing across
//! bins; lookup still follows the bin-containment procedure exactly
//! (find the bin whose half-open `[lo, hi)` range contains the raw
//! confidence and return its `mean_actual`), not interpolation between
//! bins.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};

use crate::model::{CalibrationBin, CalibrationMap, CalibrationSample, ReliabilityLabel};

/// Per-model calibration state: a rolling sample window, the current
/// calibration map built from it, and a rolling Brier-score window.
struct ModelCalibration {
    samples: VecDeque<CalibrationSample>,
    map: CalibrationMap,
    brier_scores: VecDeque<f64>,
    samples_since_rebuild: usize,
}

impl ModelCalibration {
    fn new() -> Self {
        Self {
            samples: VecDeque::new(),
            map: CalibrationMap::default(),
            brier_scores: VecDeque::new(),
            samples_since_rebuild: 0,
        }
    }
}

/// Store of per-model calibration maps, safe to share across the
/// Orchestrator's concurrent requests.
pub struct CalibrationStore {
    models: RwLock<HashMap<String, Mutex<ModelCalibration>>>,
    sample_window: usize,
    bin_count: usize,
    min_samples: usize,
    rebuild_every: usize,
    brier_window: usize,
    brier_summary_window: usize,
}

impl CalibrationStore {
    pub fn new(config: &crate::config::CalibrationConfig) -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            sample_window: config.sample_window,
            bin_count: config.bin_count,
            min_samples: config.min_samples,
            rebuild_every: config.rebuild_every,
            brier_window: config.brier_window,
            brier_summary_window: config.brier_summary_window,
        }
    }

    /// Record an outcome for `model_name`, updating its Brier window and
    /// triggering a calibration-map rebuild every `rebuild_every` samples.
    pub fn record(&self, sample: CalibrationSample) {
        if let Some(state_lock) = self.models.read().unwrap().get(&sample.model_name) {
            self.record_locked(&mut state_lock.lock().unwrap(), sample);
            return;
        }
        let mut models = self.models.write().unwrap();
        let state_lock =
            models.entry(sample.model_name.clone()).or_insert_with(|| Mutex::new(ModelCalibration::new()));
        self.record_locked(state_lock.get_mut().unwrap(), sample);
    }

    fn record_locked(&self, state: &mut ModelCalibration, sample: CalibrationSample) {
        let brier = brier_term(sample.predicted_prob, sample.actual.as_actual());
        state.brier_scores.push_back(brier);
        if state.brier_scores.len() > self.brier_window {
            state.brier_scores.pop_front();
        }

        state.samples.push_back(sample);
        if state.samples.len() > self.sample_window {
            state.samples.pop_front();
        }

        state.samples_since_rebuild += 1;
        if state.samples.len() >= self.min_samples && state.samples_since_rebuild >= self.rebuild_every {
            state.map = build_calibration_map(state.samples.iter(), self.bin_count);
            state.samples_since_rebuild = 0;
        }
    }

    /// Map a raw confidence through `model_name`'s calibration map. Falls
    /// back to the raw value unchanged when the model has no calibration
    /// map yet (fewer than `min_samples` observations).
    pub fn calibrate(&self, model_name: &str, raw_confidence: f64) -> f64 {
        let models = self.models.read().unwrap();
        let Some(state_lock) = models.get(model_name) else {
            return raw_confidence;
        };
        let state = state_lock.lock().unwrap();
        if state.map.bins.is_empty() {
            return raw_confidence;
        }
        apply_calibration_map(&state.map, raw_confidence)
    }

    /// Mean of the most recent `brier_summary_window` scores for
    /// `model_name`, and the reliability label derived from it.
    pub fn reliability(&self, model_name: &str) -> Option<(f64, ReliabilityLabel)> {
        let models = self.models.read().unwrap();
        let state_lock = models.get(model_name)?;
        let state = state_lock.lock().unwrap();
        if state.brier_scores.is_empty() {
            return None;
        }
        let recent: Vec<f64> = state
            .brier_scores
            .iter()
            .rev()
            .take(self.brier_summary_window)
            .copied()
            .collect();
        let mean = recent.iter().sum::<f64>() / recent.len() as f64;
        Some((mean, ReliabilityLabel::from_brier(mean)))
    }
}

fn brier_term(predicted: f64, actual: u8) -> f64 {
    let actual = actual as f64;
    (predicted - actual).powi(2)
}

/// Build bin means from raw samples, then apply PAV to force the
/// sequence of bin means monotonically non-decreasing.
fn build_calibration_map<'a>(
    samples: impl Iterator<Item = &'a CalibrationSample>,
    bin_count: usize,
) -> CalibrationMap {
    let mut sorted: Vec<&CalibrationSample> = samples.collect();
    sorted.sort_by(|a, b| a.predicted_prob.partial_cmp(&b.predicted_prob).unwrap());
    if sorted.is_empty() {
        return CalibrationMap::default();
    }

    let chunk_size = (sorted.len() / bin_count.max(1)).max(1);
    let mut raw_bins: Vec<CalibrationBin> = Vec::new();
    for chunk in sorted.chunks(chunk_size) {
        let lo = chunk.first().unwrap().predicted_prob;
        let hi = chunk.last().unwrap().predicted_prob;
        let mean_predicted = chunk.iter().map(|s| s.predicted_prob).sum::<f64>() / chunk.len() as f64;
        let mean_actual =
            chunk.iter().map(|s| s.actual.as_actual() as f64).sum::<f64>() / chunk.len() as f64;
        raw_bins.push(CalibrationBin { lo, hi, mean_predicted, mean_actual, count: chunk.len() });
    }

    pool_adjacent_violators(&mut raw_bins);
    CalibrationMap { bins: raw_bins }
}

/// Pool-adjacent-violators: merges adjacent bins whose `mean_actual` is
/// out of non-decreasing order, weighting the merged mean by count, until
/// the whole sequence is monotonic.
fn pool_adjacent_violators(bins: &mut Vec<CalibrationBin>) {
    let mut i = 0;
    while i + 1 < bins.len() {
        if bins[i].mean_actual > bins[i + 1].mean_actual {
            let merged_count = bins[i].count + bins[i + 1].count;
            let merged_actual = (bins[i].mean_actual * bins[i].count as f64
                + bins[i + 1].mean_actual * bins[i + 1].count as f64)
                / merged_count as f64;
            let merged_predicted = (bins[i].mean_predicted * bins[i].count as f64
                + bins[i + 1].mean_predicted * bins[i + 1].count as f64)
                / merged_count as f64;
            let merged = CalibrationBin {
                lo: bins[i].lo,
                hi: bins[i + 1].hi,
                mean_predicted: merged_predicted,
                mean_actual: merged_actual,
                count: merged_count,
            };
            bins.splice(i..i + 2, [merged]);
            i = i.saturating_sub(1);
        } else {
            i += 1;
        }
    }
}

/// Finds the bin whose `[lo, hi)` range contains `raw_confidence` (closed
/// at the low end, half-open at the high end; the last bin is closed at
/// both ends) and returns its `mean_actual`, clamped to `[0, 1]`. Outside
/// the observed range, clamps to the nearest bin's `mean_actual`. The map
/// is not guaranteed to be globally monotonic across bins; callers must
/// tolerate non-monotonicity.
fn apply_calibration_map(map: &CalibrationMap, raw_confidence: f64) -> f64 {
    let bins = &map.bins;
    if raw_confidence < bins[0].lo {
        return bins[0].mean_actual.clamp(0.0, 1.0);
    }
    let last = bins.len() - 1;
    for (idx, bin) in bins.iter().enumerate() {
        let in_range = if idx == last {
            raw_confidence >= bin.lo && raw_confidence <= bin.hi
        } else {
            raw_confidence >= bin.lo && raw_confidence < bin.hi
        };
        if in_range {
            return bin.mean_actual.clamp(0.0, 1.0);
        }
    }
    bins[last].mean_actual.clamp(0.0, 1.0)
}
