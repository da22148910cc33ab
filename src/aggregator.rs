//! # Index Aggregator (C5)
//!
//! Normalizes raw HRV inputs onto a common [0, 100] stress-score scale via
//! documented piecewise-linear curves, combines them into SNS/PSNS autonomic
//! balance scores, and from those derives the Stress, Energy, and Health
//! composite indices. Each index carries its own bounded smoothing history
//! and an adaptive exponential weight so that large swings track quickly
//! while small fluctuations are damped.

use crate::hrv::HrvSnapshot;
use crate::timeseries::RingBuffer;
use crate::types::VulnerabilityLabel;

const SMOOTHING_HISTORY_CAPACITY: usize = 20;
const MIN_WINDOW_FOR_EMISSION: usize = 5;

/// One smoothed composite index, with bounded history for observability and
/// an adaptive-weight blend between the raw and previously emitted value.
struct SmoothedIndex {
    history: RingBuffer<f64>,
    last_emitted: Option<f64>,
}

impl SmoothedIndex {
    fn new() -> Self {
        Self {
            history: RingBuffer::new(SMOOTHING_HISTORY_CAPACITY),
            last_emitted: None,
        }
    }

    /// Blend `raw` with the previous emission using an adaptive exponential
    /// weight: `alpha = clamp(0.5 + delta/200, 0.5, 0.8)`. First emission
    /// passes through unsmoothed.
    fn blend(&mut self, raw: f64) -> f64 {
        let value = match self.last_emitted {
            None => raw,
            Some(prev) => {
                let delta = (raw - prev).abs();
                let alpha = (0.5 + delta / 200.0).clamp(0.5, 0.8);
                alpha * raw + (1.0 - alpha) * prev
            }
        };
        self.last_emitted = Some(value);
        self.history.push(value);
        value
    }

    fn held_value(&self) -> f64 {
        self.last_emitted.unwrap_or(0.0)
    }

    /// The bounded history of smoothed values, oldest first.
    fn history(&self) -> impl Iterator<Item = &f64> {
        self.history.iter()
    }
}

/// C5: holds one smoothing history per composite index.
pub struct IndexAggregator {
    stress: SmoothedIndex,
    energy: SmoothedIndex,
    health: SmoothedIndex,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeIndices {
    pub sns_score: f64,
    pub psns_score: f64,
    pub stress_index: f64,
    pub energy_index: f64,
    pub health_index: f64,
    pub vulnerability: VulnerabilityLabel,
    pub gated: bool,
}

impl Default for IndexAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexAggregator {
    pub fn new() -> Self {
        Self {
            stress: SmoothedIndex::new(),
            energy: SmoothedIndex::new(),
            health: SmoothedIndex::new(),
        }
    }

    /// The bounded history of smoothed stress-index values, oldest first.
    /// Exposed for consumers that want a short sparkline without re-deriving
    /// it from the raw metric stream.
    pub fn stress_history(&self) -> Vec<f64> {
        self.stress.history().copied().collect()
    }

    /// Produce the composite indices for the current HRV snapshot. Below the
    /// minimum-data gate (|W| < 5), holds the last emitted value for each
    /// index (0 on cold start) and reports `gated = true`.
    pub fn update(&mut self, snapshot: &HrvSnapshot) -> CompositeIndices {
        if snapshot.window_len < MIN_WINDOW_FOR_EMISSION {
            return CompositeIndices {
                sns_score: 0.0,
                psns_score: 0.0,
                stress_index: self.stress.held_value(),
                energy_index: self.energy.held_value(),
                health_index: self.health.held_value(),
                vulnerability: VulnerabilityLabel::from_health_index(self.health.held_value()),
                gated: true,
            };
        }

        let n_lfhf = normalize_lf_hf(snapshot.lf_hf_ratio);
        let n_sdnn = normalize_sdnn(snapshot.sdnn_ms);
        let n_rmssd = normalize_rmssd(snapshot.rmssd_ms);
        let n_tp = normalize_total_power(snapshot.total_power);

        let sns = 0.5 * n_lfhf + 0.25 * n_sdnn + 0.25 * n_rmssd;
        let psns = 0.4 * (100.0 - n_lfhf) + 0.2 * (100.0 - n_sdnn) + 0.2 * (100.0 - n_rmssd) + 0.2 * (100.0 - n_tp);

        let raw_stress = (0.7 * sns + 0.2 * (100.0 - psns) + 0.1 * (sns - psns).abs() / 25.0 * 10.0).clamp(0.0, 100.0);
        let raw_energy = (0.5 * psns + 0.2 * (100.0 - n_sdnn) + 0.2 * (100.0 - n_rmssd) + 0.1 * (100.0 - n_tp)).clamp(0.0, 100.0);

        let immunity = (100.0 - n_sdnn).clamp(0.0, 100.0);
        let recovery = (100.0 - n_rmssd).clamp(0.0, 100.0);
        let balance = (100.0 - (sns - psns).abs()).clamp(0.0, 100.0);
        let raw_health = (0.3 * immunity + 0.3 * recovery + 0.2 * balance + 0.1 * (100.0 - raw_stress) + 0.1 * raw_energy)
            .clamp(0.0, 100.0);

        let stress_index = self.stress.blend(raw_stress).clamp(0.0, 100.0);
        let energy_index = self.energy.blend(raw_energy).clamp(0.0, 100.0);
        let health_index = self.health.blend(raw_health).clamp(0.0, 100.0);

        CompositeIndices {
            sns_score: sns.clamp(0.0, 100.0),
            psns_score: psns.clamp(0.0, 100.0),
            stress_index,
            energy_index,
            health_index,
            vulnerability: VulnerabilityLabel::from_health_index(health_index),
            gated: false,
        }
    }
}

fn lerp(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    if (x1 - x0).abs() <= f64::EPSILON {
        return y0;
    }
    let t = ((x - x0) / (x1 - x0)).clamp(0.0, 1.0);
    y0 + t * (y1 - y0)
}

fn normalize_lf_hf(ratio: f64) -> f64 {
    if ratio <= 0.5 {
        10.0
    } else if ratio <= 1.0 {
        lerp(ratio, 0.5, 1.0, 20.0, 30.0)
    } else if ratio <= 2.0 {
        lerp(ratio, 1.0, 2.0, 30.0, 50.0)
    } else if ratio <= 3.0 {
        lerp(ratio, 2.0, 3.0, 50.0, 70.0)
    } else {
        100.0
    }
}

fn normalize_sdnn(sdnn_ms: f64) -> f64 {
    if sdnn_ms <= 20.0 {
        100.0
    } else if sdnn_ms <= 50.0 {
        lerp(sdnn_ms, 20.0, 50.0, 80.0, 40.0)
    } else if sdnn_ms <= 100.0 {
        lerp(sdnn_ms, 50.0, 100.0, 40.0, 10.0)
    } else {
        0.0
    }
}

fn normalize_rmssd(rmssd_ms: f64) -> f64 {
    if rmssd_ms <= 10.0 {
        100.0
    } else if rmssd_ms <= 30.0 {
        lerp(rmssd_ms, 10.0, 30.0, 80.0, 40.0)
    } else if rmssd_ms <= 50.0 {
        lerp(rmssd_ms, 30.0, 50.0, 40.0, 15.0)
    } else {
        0.0
    }
}

fn normalize_total_power(total_power: f64) -> f64 {
    if total_power <= 500.0 {
        90.0
    } else if total_power <= 1000.0 {
        lerp(total_power, 500.0, 1000.0, 70.0, 50.0)
    } else if total_power <= 2000.0 {
        lerp(total_power, 1000.0, 2000.0, 50.0, 30.0)
    } else {
        (30.0 * (2000.0 / total_power)).clamp(0.0, 30.0)
    }
}
