//! # HRV Engine (C4)
//!
//! Maintains the bounded R-R sliding window and computes every time- and
//! frequency-domain heart-rate-variability metric from it. Per the module
//! DAG design: every metric is a pure function of the current window, keyed
//! by a `MetricKind` sum type, rather than a dispatch table of calculator
//! objects — `compute(kind, window)` has no hidden state beyond the window
//! itself.

use crate::config::BandNormalization;
use crate::timeseries::RingBuffer;
use crate::types::RrInterval;
use std::f64::consts::PI;

const MAX_LAG: usize = 20;
const MIN_SAMPLES_FOR_CV: usize = 5;
const MIN_SAMPLES_FOR_SPECTRAL: usize = 5;

/// Every scalar the HRV engine can produce. `compute` is the single place
/// that knows how to turn a window into a value for a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Sdnn,
    Rmssd,
    PNn50,
    MxDMn,
    Amo50,
    Cv,
    VlfPower,
    LfPower,
    HfPower,
    TotalPower,
    LfHfRatio,
}

/// Frequency band boundaries in Hz: very-low, low, and high frequency.
#[derive(Debug, Clone, Copy)]
struct Band {
    lo_hz: f64,
    hi_hz: f64,
}

const VLF_BAND: Band = Band { lo_hz: 0.003, hi_hz: 0.04 };
const LF_BAND: Band = Band { lo_hz: 0.04, hi_hz: 0.15 };
const HF_BAND: Band = Band { lo_hz: 0.15, hi_hz: 0.4 };

/// C4: owns the bounded R-R window and the per-band normalization table.
pub struct HrvEngine {
    window: RingBuffer<f64>,
    band_normalization: BandNormalization,
}

/// One full snapshot of every metric, recomputed on each accepted R-R.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HrvSnapshot {
    pub sdnn_ms: f64,
    pub rmssd_ms: f64,
    pub pnn50_pct: f64,
    pub mxdmn_ms: f64,
    pub amo50_pct: f64,
    pub cv_pct: f64,
    pub vlf_power: f64,
    pub lf_power: f64,
    pub hf_power: f64,
    pub total_power: f64,
    pub lf_hf_ratio: f64,
    pub window_len: usize,
}

impl HrvEngine {
    pub fn new(window_capacity: usize, band_normalization: BandNormalization) -> Self {
        Self {
            window: RingBuffer::new(window_capacity),
            band_normalization,
        }
    }

    pub fn accept_rr(&mut self, rr: RrInterval) -> HrvSnapshot {
        self.window.push(rr.ms());
        self.snapshot()
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Recompute every metric. Time-domain first (cheap), then
    /// frequency-domain.
    pub fn snapshot(&mut self) -> HrvSnapshot {
        let values: Vec<f64> = self.window.iter().copied().collect();

        HrvSnapshot {
            sdnn_ms: compute(MetricKind::Sdnn, &values),
            rmssd_ms: compute(MetricKind::Rmssd, &values),
            pnn50_pct: compute(MetricKind::PNn50, &values),
            mxdmn_ms: compute(MetricKind::MxDMn, &values),
            amo50_pct: compute(MetricKind::Amo50, &values),
            cv_pct: compute(MetricKind::Cv, &values),
            vlf_power: band_power(&values, VLF_BAND, self.band_normalization.vlf),
            lf_power: band_power(&values, LF_BAND, self.band_normalization.lf),
            hf_power: band_power(&values, HF_BAND, self.band_normalization.hf),
            total_power: {
                let vlf = band_power(&values, VLF_BAND, self.band_normalization.vlf);
                let lf = band_power(&values, LF_BAND, self.band_normalization.lf);
                let hf = band_power(&values, HF_BAND, self.band_normalization.hf);
                vlf + lf + hf
            },
            lf_hf_ratio: {
                let lf = band_power(&values, LF_BAND, self.band_normalization.lf);
                let hf = band_power(&values, HF_BAND, self.band_normalization.hf);
                if hf <= f64::EPSILON {
                    0.0
                } else {
                    lf / hf
                }
            },
            window_len: values.len(),
        }
    }
}

/// Pure dispatch: a window of R-R values in ms in, a single metric value out.
pub fn compute(kind: MetricKind, window: &[f64]) -> f64 {
    match kind {
        MetricKind::Sdnn => sdnn(window),
        MetricKind::Rmssd => rmssd(window),
        MetricKind::PNn50 => pnn50(window),
        MetricKind::MxDMn => mxdmn(window),
        MetricKind::Amo50 => amo50(window),
        MetricKind::Cv => cv(window),
        MetricKind::VlfPower => band_power(window, VLF_BAND, 1.0),
        MetricKind::LfPower => band_power(window, LF_BAND, 1.0),
        MetricKind::HfPower => band_power(window, HF_BAND, 1.0),
        MetricKind::TotalPower => {
            band_power(window, VLF_BAND, 1.0) + band_power(window, LF_BAND, 1.0) + band_power(window, HF_BAND, 1.0)
        }
        MetricKind::LfHfRatio => {
            let lf = band_power(window, LF_BAND, 1.0);
            let hf = band_power(window, HF_BAND, 1.0);
            if hf <= f64::EPSILON {
                0.0
            } else {
                lf / hf
            }
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divisor N).
fn sdnn(window: &[f64]) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let m = mean(window);
    let variance = window.iter().map(|v| (v - m).powi(2)).sum::<f64>() / window.len() as f64;
    variance.sqrt()
}

fn successive_diffs(window: &[f64]) -> Vec<f64> {
    window.windows(2).map(|w| w[1] - w[0]).collect()
}

fn rmssd(window: &[f64]) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let diffs = successive_diffs(window);
    let mean_sq = diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64;
    mean_sq.sqrt()
}

fn pnn50(window: &[f64]) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let diffs = successive_diffs(window);
    let count = diffs.iter().filter(|d| d.abs() > 50.0).count();
    100.0 * count as f64 / diffs.len() as f64
}

fn mxdmn(window: &[f64]) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let max = window.iter().cloned().fold(f64::MIN, f64::max);
    let min = window.iter().cloned().fold(f64::MAX, f64::min);
    max - min
}

fn amo50(window: &[f64]) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let m = mean(window);
    let count = window.iter().filter(|v| (**v - m).abs() <= 50.0).count();
    100.0 * count as f64 / window.len() as f64
}

fn cv(window: &[f64]) -> f64 {
    if window.len() < MIN_SAMPLES_FOR_CV {
        return 0.0;
    }
    let m = mean(window);
    if m.abs() <= f64::EPSILON {
        return 0.0;
    }
    sdnn(window) / m * 100.0
}

/// Estimate power in `[band.lo_hz, band.hi_hz]` via biased autocovariance, a
/// Hamming window, and a periodogram approximation.
fn band_power(window: &[f64], band: Band, normalization: f64) -> f64 {
    if window.len() < MIN_SAMPLES_FOR_SPECTRAL || normalization.abs() <= f64::EPSILON {
        return 0.0;
    }

    let n = window.len();
    let mu = mean(window);
    if mu.abs() <= f64::EPSILON {
        return 0.0;
    }

    let y: Vec<f64> = window.iter().map(|v| (v - mu) / mu).collect();

    let k_max = MAX_LAG.min(n - 1);
    if k_max == 0 {
        return 0.0;
    }

    let mut r = vec![0.0; k_max + 1];
    for (k, r_k) in r.iter_mut().enumerate() {
        let mut sum = 0.0;
        for i in 0..(n - k) {
            sum += y[i] * y[i + k];
        }
        *r_k = sum / (n - k) as f64;
    }

    for (k, r_k) in r.iter_mut().enumerate() {
        let w = 0.54 - 0.46 * (2.0 * PI * k as f64 / k_max as f64).cos();
        *r_k *= w;
    }

    let step_hz = 1.0 / (2.0 * k_max as f64);
    let mut power_sum = 0.0;
    let mut f = band.lo_hz;
    while f <= band.hi_hz {
        let mut s_f = r[0];
        for (k, r_k) in r.iter().enumerate().skip(1) {
            s_f += 2.0 * r_k * (2.0 * PI * f * k as f64 * mu / 1000.0).cos();
        }
        power_sum += s_f.max(0.0);
        f += step_hz;
    }

    (power_sum * mu * mu) / normalization
}
