//! # ECG Conditioner + Fiducial Detector (C3)
//!
//! Runs a conditioning pipeline (moving-average smoothing, baseline removal)
//! over a trailing window of the motion-filtered ECG buffer, then locates
//! the four fiducial points per cardiac cycle: R-peak, Q-point, T-peak, and
//! T-end, emitting a QT interval when all three hold the required ordering
//! and duration bounds.
//!
//! This is the most numerically involved component in the pipeline; each
//! search stage below is named after the description it implements rather
//! than given a generic name, so the algorithm stays legible next to the
//! waveform geometry it is walking.

use crate::types::{FiducialKind, FiducialPoint, QtEvent};
use std::collections::HashSet;

/// Fixed parameters the conditioner consumes from `PipelineConfig` plus
/// derived constants fixed by the waveform physiology (not user-tunable).
#[derive(Debug, Clone, Copy)]
pub struct ConditionerParams {
    pub fs_hz: f64,
}

const REFRACTORY_S: f64 = 0.400;
const R_REFINEMENT_WINDOW_S: f64 = 0.020;
const T_START_OFFSET_S: f64 = 0.100;
const EXPECTED_T_OFFSET_S: f64 = 0.300;

/// C3: holds cross-window state (the smoothing carry value and the set of
/// R-indices already emitted as a QT event) so that overlapping trailing
/// windows never reprocess the same beat.
pub struct EcgConditioner {
    params: ConditionerParams,
    smoothing_carry: Option<f64>,
    processed_r_indices: HashSet<u64>,
}

/// Everything the conditioner produces for one trailing-window pass.
#[derive(Debug, Clone)]
pub struct ConditioningOutput {
    pub smoothed: Vec<f64>,
    pub fiducials: Vec<FiducialPoint>,
    pub qt_events: Vec<QtEvent>,
    pub heart_rate_bpm: Option<f64>,
}

impl EcgConditioner {
    pub fn new(params: ConditionerParams) -> Self {
        Self {
            params,
            smoothing_carry: None,
            processed_r_indices: HashSet::new(),
        }
    }

    /// Process one trailing window. `raw` and `global_indices` are parallel
    /// slices (global ring-buffer indices for each raw sample); `timestamps`
    /// likewise. All three must be the same length.
    pub fn process_window(
        &mut self,
        raw: &[f64],
        global_indices: &[u64],
        timestamps: &[f64],
    ) -> ConditioningOutput {
        if raw.len() < 16 || raw.len() != global_indices.len() || raw.len() != timestamps.len() {
            return ConditioningOutput {
                smoothed: Vec::new(),
                fiducials: Vec::new(),
                qt_events: Vec::new(),
                heart_rate_bpm: None,
            };
        }

        let smoothed = self.moving_average_smooth(raw);
        let conditioned = self.remove_baseline(&smoothed);

        let r_candidates = self.detect_r_peaks(&conditioned);
        let r_refined: Vec<usize> = r_candidates
            .iter()
            .map(|&i| self.refine_r_peak(raw, i))
            .collect();

        let heart_rate_bpm = self.estimate_heart_rate(&r_refined, timestamps);
        let mean_rr_s = heart_rate_bpm.map(|bpm| 60.0 / bpm);

        let mut fiducials = Vec::new();
        let mut qt_events = Vec::new();

        for &r_idx in &r_refined {
            let r_global = global_indices[r_idx];
            fiducials.push(FiducialPoint {
                kind: FiducialKind::R,
                global_index: r_global,
                time_s: timestamps[r_idx],
                value: raw[r_idx],
            });

            if self.processed_r_indices.contains(&r_global) {
                continue;
            }

            let q_idx = self.find_q_point(&conditioned, r_idx, mean_rr_s);
            let t_peak_idx = self.find_t_peak(&conditioned, r_idx);
            let t_end_idx = t_peak_idx.and_then(|tp| self.find_t_end(&conditioned, tp));

            if let (Some(q_idx), Some(t_peak_idx), Some(t_end_idx)) = (q_idx, t_peak_idx, t_end_idx) {
                if let Some(event) = QtEvent::new(
                    global_indices[q_idx],
                    global_indices[t_peak_idx],
                    global_indices[t_end_idx],
                    timestamps[q_idx],
                    r_global,
                    timestamps[r_idx],
                    timestamps[t_end_idx],
                ) {
                    fiducials.push(FiducialPoint {
                        kind: FiducialKind::Q,
                        global_index: global_indices[q_idx],
                        time_s: timestamps[q_idx],
                        value: raw[q_idx],
                    });
                    fiducials.push(FiducialPoint {
                        kind: FiducialKind::Tpeak,
                        global_index: global_indices[t_peak_idx],
                        time_s: timestamps[t_peak_idx],
                        value: raw[t_peak_idx],
                    });
                    fiducials.push(FiducialPoint {
                        kind: FiducialKind::Tend,
                        global_index: global_indices[t_end_idx],
                        time_s: timestamps[t_end_idx],
                        value: raw[t_end_idx],
                    });
                    qt_events.push(event);
                    self.processed_r_indices.insert(r_global);
                } else {
                    log::debug!("conditioner: QT interval out of bounds for R at index {r_global}, skipping emission");
                }
            }
        }

        ConditioningOutput {
            smoothed: conditioned,
            fiducials,
            qt_events,
            heart_rate_bpm,
        }
    }

    /// Moving-average smoothing, window ≈ 10 ms, carrying the trailing
    /// average from the previous window for continuity at the boundary.
    fn moving_average_smooth(&mut self, raw: &[f64]) -> Vec<f64> {
        let window = ((0.01 * self.params.fs_hz).round() as usize).max(3);
        let mut out = Vec::with_capacity(raw.len());
        let mut sum = 0.0;
        let mut count = 0usize;

        for (i, &value) in raw.iter().enumerate() {
            sum += value;
            count += 1;
            if i >= window {
                sum -= raw[i - window];
                count -= 1;
            }
            let avg = if i < window && self.smoothing_carry.is_some() && count < window {
                // blend in carried context from the previous window's tail
                let carry = self.smoothing_carry.unwrap();
                (sum + carry * (window - count) as f64) / window as f64
            } else {
                sum / count as f64
            };
            out.push(avg);
        }

        self.smoothing_carry = out.last().copied();
        out
    }

    /// Baseline removal: overlapping half-second segments, lowest-20% mean
    /// per segment, linearly interpolated across the window, subtracted.
    fn remove_baseline(&self, smoothed: &[f64]) -> Vec<f64> {
        let seg_len = ((0.5 * self.params.fs_hz).round() as usize).max(8);
        let hop = (seg_len / 2).max(1);
        let n = smoothed.len();

        let mut anchors: Vec<(usize, f64)> = Vec::new();
        let mut start = 0;
        while start < n {
            let end = (start + seg_len).min(n);
            let mut segment: Vec<f64> = smoothed[start..end].to_vec();
            segment.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let take = (segment.len() as f64 * 0.2).ceil().max(1.0) as usize;
            let baseline = segment[..take.min(segment.len())].iter().sum::<f64>() / take.min(segment.len()) as f64;
            anchors.push((start + (end - start) / 2, baseline));
            if end == n {
                break;
            }
            start += hop;
        }

        if anchors.len() == 1 {
            let b = anchors[0].1;
            return smoothed.iter().map(|v| v - b).collect();
        }

        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let baseline = interpolate_anchors(&anchors, i);
            out.push(smoothed[i] - baseline);
        }
        out
    }

    /// Dynamic-threshold R-peak detection with ±5 sample local-max test,
    /// derivative confirmation, and refractory-based replace/accept logic.
    fn detect_r_peaks(&self, conditioned: &[f64]) -> Vec<usize> {
        let n = conditioned.len();
        if n < 11 {
            return Vec::new();
        }

        let mut sorted: Vec<f64> = conditioned.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let p90_idx = ((sorted.len() as f64) * 0.9) as usize;
        let p90 = sorted[p90_idx.min(sorted.len() - 1)];
        let above: Vec<f64> = conditioned.iter().copied().filter(|&v| v >= p90).collect();
        let above_mean = if above.is_empty() {
            p90
        } else {
            above.iter().sum::<f64>() / above.len() as f64
        };
        let threshold = 0.5 * p90 + 0.5 * above_mean;

        let mut deriv = vec![0.0; n];
        for i in 1..n {
            deriv[i] = conditioned[i] - conditioned[i - 1];
        }

        let mut candidates: Vec<(usize, f64)> = Vec::new();
        for i in 5..n - 5 {
            let v = conditioned[i];
            if v <= threshold {
                continue;
            }
            let is_local_max = (i - 5..=i + 5).all(|j| conditioned[j] <= v);
            if !is_local_max {
                continue;
            }
            let rising = deriv[i] > threshold / 15.0;
            let falling_after = i + 1 < n && deriv[i + 1] < -threshold / 15.0;
            if rising || falling_after {
                candidates.push((i, v));
            }
        }

        let refractory_samples = (REFRACTORY_S * self.params.fs_hz).round() as usize;
        let mut accepted: Vec<(usize, f64)> = Vec::new();
        for (idx, amp) in candidates {
            if let Some(last) = accepted.last_mut() {
                if idx - last.0 < refractory_samples {
                    if amp > last.1 * 1.10 {
                        *last = (idx, amp);
                    }
                    continue;
                }
            }
            accepted.push((idx, amp));
        }

        accepted.into_iter().map(|(i, _)| i).collect()
    }

    /// Relocate a detected peak to the argmax of the unfiltered signal in a
    /// ±20 ms window around it.
    fn refine_r_peak(&self, raw: &[f64], idx: usize) -> usize {
        let span = (R_REFINEMENT_WINDOW_S * self.params.fs_hz).round() as usize;
        let lo = idx.saturating_sub(span);
        let hi = (idx + span).min(raw.len() - 1);
        let mut best = idx;
        let mut best_val = raw[idx];
        for i in lo..=hi {
            if raw[i] > best_val {
                best_val = raw[i];
                best = i;
            }
        }
        best
    }

    fn estimate_heart_rate(&self, r_indices: &[usize], timestamps: &[f64]) -> Option<f64> {
        if r_indices.len() < 2 {
            return None;
        }
        let mut rr_sum = 0.0;
        let mut rr_count = 0;
        for w in r_indices.windows(2) {
            let rr = timestamps[w[1]] - timestamps[w[0]];
            if rr > 0.0 {
                rr_sum += rr;
                rr_count += 1;
            }
        }
        if rr_count == 0 {
            return None;
        }
        let mean_rr_s = rr_sum / rr_count as f64;
        Some(60.0 / mean_rr_s)
    }

    /// Q-point search: steepest negative-slope segment, second-derivative
    /// inflection fallback, argmin fallback.
    fn find_q_point(&self, conditioned: &[f64], r_idx: usize, mean_rr_s: Option<f64>) -> Option<usize> {
        let max_back_s = match mean_rr_s {
            Some(rr) => (0.120_f64).min(0.12 * rr),
            None => 0.120,
        };
        let span = (max_back_s * self.params.fs_hz).round() as usize;
        let lo = r_idx.saturating_sub(span);
        if lo >= r_idx || r_idx < 2 {
            return None;
        }

        // steepest negative-slope segment satisfying |slope| > 0.5
        let mut steepest_idx = None;
        let mut steepest_slope = 0.0;
        for i in (lo + 1)..r_idx {
            let slope = conditioned[i] - conditioned[i - 1];
            if slope < 0.0 && slope.abs() > 0.5 && slope.abs() > steepest_slope {
                steepest_slope = slope.abs();
                steepest_idx = Some(i);
            }
        }
        if let Some(idx) = steepest_idx {
            let refine_span = (0.010 * self.params.fs_hz).round().max(1.0) as usize;
            let hi = (idx + refine_span).min(r_idx);
            return (idx..=hi).min_by(|&a, &b| conditioned[a].partial_cmp(&conditioned[b]).unwrap());
        }

        // second-derivative inflection fallback
        for i in (lo + 1)..(r_idx - 1) {
            let d2_prev = conditioned[i] - 2.0 * conditioned[i - 1] + conditioned[i.saturating_sub(2).max(lo)];
            let d2_next = conditioned[i + 1] - 2.0 * conditioned[i] + conditioned[i - 1];
            if d2_prev < 0.0 && d2_next >= 0.0 {
                return Some(i);
            }
        }

        // final fallback: argmin in a >= 40ms window immediately before R
        let min_span = (0.040 * self.params.fs_hz).round().max(1.0) as usize;
        let fallback_lo = r_idx.saturating_sub(min_span.max(span));
        (fallback_lo..r_idx).min_by(|&a, &b| conditioned[a].partial_cmp(&conditioned[b]).unwrap())
    }

    /// T-peak search: "second local maximum" strategy between R+100ms and
    /// the end of the window, falling back to a proximity-weighted argmax.
    fn find_t_peak(&self, conditioned: &[f64], r_idx: usize) -> Option<usize> {
        let start = r_idx + (T_START_OFFSET_S * self.params.fs_hz).round() as usize;
        if start >= conditioned.len() {
            return None;
        }
        let end = conditioned.len();

        let mut local_maxima = Vec::new();
        for i in (start + 1)..(end.saturating_sub(1)) {
            if conditioned[i] > conditioned[i - 1] && conditioned[i] >= conditioned[i + 1] {
                local_maxima.push((i, conditioned[i]));
            }
        }

        if local_maxima.len() >= 2 {
            local_maxima.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
            let mut top_two: Vec<(usize, f64)> = local_maxima.into_iter().take(2).collect();
            top_two.sort_by_key(|&(idx, _)| idx);
            return Some(top_two[0].0);
        }
        if local_maxima.len() == 1 {
            return Some(local_maxima[0].0);
        }

        // fallback: argmax weighted by proximity to expected T location
        let expected = r_idx + (EXPECTED_T_OFFSET_S * self.params.fs_hz).round() as usize;
        (start..end)
            .max_by(|&a, &b| {
                let score_a = conditioned[a] - 0.001 * (a as f64 - expected as f64).abs();
                let score_b = conditioned[b] - 0.001 * (b as f64 - expected as f64).abs();
                score_a.partial_cmp(&score_b).unwrap()
            })
    }

    /// T-end search via the trapezium's-area method.
    fn find_t_end(&self, conditioned: &[f64], t_peak_idx: usize) -> Option<usize> {
        let fs = self.params.fs_hz;
        let n = conditioned.len();

        let steep_end = (t_peak_idx + (0.200 * fs).round() as usize).min(n - 1);
        if steep_end <= t_peak_idx {
            return None;
        }
        let mut deriv = vec![0.0; n];
        for i in 1..n {
            deriv[i] = conditioned[i] - conditioned[i - 1];
        }

        let xm = ((t_peak_idx + 1)..=steep_end).max_by(|&a, &b| deriv[a].abs().partial_cmp(&deriv[b].abs()).unwrap())?;

        let quiet_start = (t_peak_idx + (0.2 * fs).round() as usize).min(n - 1);
        let quiet_end = (t_peak_idx + (0.4 * fs).round() as usize).min(n - 1);
        if quiet_end <= quiet_start {
            return self.t_end_amplitude_fallback(conditioned, t_peak_idx, n);
        }
        let xr = (quiet_start..=quiet_end).min_by(|&a, &b| deriv[a].abs().partial_cmp(&deriv[b].abs()).unwrap())?;

        if xr <= xm {
            return self.t_end_amplitude_fallback(conditioned, t_peak_idx, n);
        }

        let s_xm = conditioned[xm];
        let best = (xm..=xr).max_by(|&a, &b| {
            let area_a = 0.5 * (s_xm - conditioned[a]) * (xr - a) as f64;
            let area_b = 0.5 * (s_xm - conditioned[b]) * (xr - b) as f64;
            area_a.partial_cmp(&area_b).unwrap()
        });

        best.or_else(|| self.t_end_amplitude_fallback(conditioned, t_peak_idx, n))
    }

    fn t_end_amplitude_fallback(&self, conditioned: &[f64], t_peak_idx: usize, n: usize) -> Option<usize> {
        let baseline = 0.0; // baseline already removed by remove_baseline
        let amplitude = conditioned[t_peak_idx] - baseline;
        if amplitude.abs() < f64::EPSILON {
            return None;
        }
        let target = baseline + 0.15 * amplitude;
        ((t_peak_idx + 1)..n).find(|&i| (conditioned[i] - target).abs() <= (0.15 * amplitude).abs())
    }
}

fn interpolate_anchors(anchors: &[(usize, f64)], position: usize) -> f64 {
    if position <= anchors[0].0 {
        return anchors[0].1;
    }
    if position >= anchors[anchors.len() - 1].0 {
        return anchors[anchors.len() - 1].1;
    }
    for w in anchors.windows(2) {
        let (x0, y0) = w[0];
        let (x1, y1) = w[1];
        if position >= x0 && position <= x1 {
            if x1 == x0 {
                return y0;
            }
            let t = (position - x0) as f64 / (x1 - x0) as f64;
            return y0 + t * (y1 - y0);
        }
    }
    anchors.last().unwrap().1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn synth_ecg(fs: f64, duration_s: f64) -> (Vec<f64>, Vec<u64>, Vec<f64>) {
        let n = (fs * duration_s) as usize;
        let mut raw = Vec::with_capacity(n);
        let mut idx = Vec::with_capacity(n);
        let mut ts = Vec::with_capacity(n);
        for i in 0..n {
            let t = i as f64 / fs;
            // a 1 Hz beat-like waveform: sharp R spike plus a slower T bump
            let phase = (t % 1.0) / 1.0;
            let r_spike = (-((phase - 0.0).powi(2)) / (2.0 * 0.002_f64.powi(2))).exp() * 4.0;
            let t_bump = (-((phase - 0.3).powi(2)) / (2.0 * 0.05_f64.powi(2))).exp() * 1.0;
            let r_spike_wrapped = r_spike
                + (-((phase - 1.0).powi(2)) / (2.0 * 0.002_f64.powi(2))).exp() * 4.0;
            raw.push(r_spike_wrapped + t_bump + 0.01 * (2.0 * PI * 0.2 * t).sin());
            idx.push(i as u64);
            ts.push(t);
        }
        (raw, idx, ts)
    }

    #[test]
    fn test_short_window_returns_empty() {
        let mut conditioner = EcgConditioner::new(ConditionerParams { fs_hz: 130.0 });
        let out = conditioner.process_window(&[1.0, 2.0, 3.0], &[0, 1, 2], &[0.0, 0.1, 0.2]);
        assert!(out.fiducials.is_empty());
        assert!(out.qt_events.is_empty());
    }

    #[test]
    fn test_detects_r_peaks_on_synthetic_beats() {
        let (raw, idx, ts) = synth_ecg(130.0, 4.0);
        let mut conditioner = EcgConditioner::new(ConditionerParams { fs_hz: 130.0 });
        let out = conditioner.process_window(&raw, &idx, &ts);
        let r_count = out.fiducials.iter().filter(|f| f.kind == FiducialKind::R).count();
        assert!(r_count >= 2, "expected at least 2 R-peaks, found {r_count}");
    }

    #[test]
    fn test_refractory_enforced() {
        let (raw, idx, ts) = synth_ecg(130.0, 4.0);
        let mut conditioner = EcgConditioner::new(ConditionerParams { fs_hz: 130.0 });
        let out = conditioner.process_window(&raw, &idx, &ts);
        let r_times: Vec<f64> = out
            .fiducials
            .iter()
            .filter(|f| f.kind == FiducialKind::R)
            .map(|f| f.time_s)
            .collect();
        for w in r_times.windows(2) {
            assert!(w[1] - w[0] >= REFRACTORY_S - 1.0 / 130.0);
        }
    }

    #[test]
    fn test_duplicate_qt_suppressed_across_calls() {
        let (raw, idx, ts) = synth_ecg(130.0, 4.0);
        let mut conditioner = EcgConditioner::new(ConditionerParams { fs_hz: 130.0 });
        let first = conditioner.process_window(&raw, &idx, &ts);
        let second = conditioner.process_window(&raw, &idx, &ts);
        assert!(second.qt_events.len() <= first.qt_events.len().max(1));
        // second pass over identical data should not re-emit already-processed R indices
        if !first.qt_events.is_empty() {
            assert!(second.qt_events.is_empty());
        }
    }

    #[test]
    fn test_qt_events_satisfy_bounds() {
        let (raw, idx, ts) = synth_ecg(130.0, 6.0);
        let mut conditioner = EcgConditioner::new(ConditionerParams { fs_hz: 130.0 });
        let out = conditioner.process_window(&raw, &idx, &ts);
        for event in &out.qt_events {
            assert!(event.qt_ms >= QtEvent::MIN_MS && event.qt_ms <= QtEvent::MAX_MS);
            assert!(event.q_index < event.tend_index);
        }
    }

    #[test]
    fn test_interpolate_anchors_clamps_at_ends() {
        let anchors = vec![(10, 1.0), (30, 2.0), (50, 3.0)];
        assert_eq!(interpolate_anchors(&anchors, 0), 1.0);
        assert_eq!(interpolate_anchors(&anchors, 100), 3.0);
        assert!((interpolate_anchors(&anchors, 20) - 1.5).abs() < 1e-9);
    }
}
