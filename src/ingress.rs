//! # Ingress Adapter (C1)
//!
//! Accepts raw batches from whatever sensor transport the caller wires up
//! (this crate does not talk to a transport itself — see Non-goals) and
//! turns them into timestamped samples in the bounded ring buffers that
//! every downstream component reads from.
//!
//! ## Timestamp Reconstruction
//! Each stream keeps its own running `t_last`, starting at 0 for the first
//! sample. A batch of N samples is assigned `t_k = t_last + k·(1/fs)` for
//! `k` in `0..N`, and `t_last` advances to the final assigned timestamp. A
//! caller that already has per-sample timestamps (e.g. from a transport that
//! carries its own clock) can supply them directly instead, which both
//! bypasses the self-generated timebase for that batch and re-anchors it for
//! the next one.
//!
//! ## Failure Semantics
//! Every `accept_*` method is infallible at the boundary: malformed or
//! out-of-range input is dropped and logged, counted in `IngressStats`, and
//! never returned as an error (see the crate's error-handling policy).

use crate::timeseries::{RingBuffer, Timestamped};
use crate::types::{AccSample, EcgSample, RrInterval, SamplingRate};

impl Timestamped for AccSample {
    fn time_s(&self) -> f64 {
        self.time_s
    }
}

impl Timestamped for EcgSample {
    fn time_s(&self) -> f64 {
        self.time_s
    }
}

/// Running counters of accepted and rejected samples, surfaced so a caller
/// can notice a misbehaving sensor feed without the ingress adapter itself
/// raising an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngressStats {
    pub ecg_accepted: u64,
    pub acc_accepted: u64,
    pub rr_accepted: u64,
    pub rr_rejected: u64,
}

/// C1: buffers raw samples and reconstructs per-sample timestamps for
/// batched arrivals.
pub struct IngressAdapter {
    rates: SamplingRate,
    acc_scale_factor: f64,
    ecg: RingBuffer<EcgSample>,
    acc: RingBuffer<AccSample>,
    ecg_t_last: f64,
    acc_t_last: f64,
    stats: IngressStats,
}

impl IngressAdapter {
    pub fn new(rates: SamplingRate, acc_scale_factor: f64, ecg_capacity: usize, acc_capacity: usize) -> Self {
        Self {
            rates,
            acc_scale_factor,
            ecg: RingBuffer::new(ecg_capacity),
            acc: RingBuffer::new(acc_capacity),
            ecg_t_last: 0.0,
            acc_t_last: 0.0,
            stats: IngressStats::default(),
        }
    }

    pub fn stats(&self) -> IngressStats {
        self.stats
    }

    pub fn ecg_buffer(&self) -> &RingBuffer<EcgSample> {
        &self.ecg
    }

    pub fn ecg_buffer_mut(&mut self) -> &mut RingBuffer<EcgSample> {
        &mut self.ecg
    }

    pub fn acc_buffer(&self) -> &RingBuffer<AccSample> {
        &self.acc
    }

    /// Accept a batch of raw ECG counts. By default, per-sample timestamps
    /// are reconstructed forward from this stream's own running clock:
    /// `t_k = t_last + k·(1/fs)`, `t_last` starting at 0 before the first
    /// sample and advancing by one batch's worth of `dt` on every call. Pass
    /// `timestamps` to override this for a batch whose samples already carry
    /// their own clock; doing so also re-anchors the self-generated timebase
    /// to the last supplied timestamp for the next batch.
    pub fn accept_ecg_batch(&mut self, raw: &[i32], timestamps: Option<&[f64]>) {
        let n = raw.len();
        if n == 0 {
            return;
        }
        let dt = 1.0 / self.rates.ecg_hz;

        match timestamps {
            Some(ts) if ts.len() == n => {
                for (&value, &time_s) in raw.iter().zip(ts.iter()) {
                    self.ecg.push(EcgSample { raw: value, time_s });
                    self.stats.ecg_accepted += 1;
                }
                self.ecg_t_last = *ts.last().expect("n > 0 guarantees a last timestamp");
            }
            Some(ts) => {
                log::warn!(
                    "ingress: ecg batch of {n} samples given {} explicit timestamps, dropping batch",
                    ts.len()
                );
            }
            None => {
                for (k, &value) in raw.iter().enumerate() {
                    let time_s = self.ecg_t_last + k as f64 * dt;
                    self.ecg.push(EcgSample { raw: value, time_s });
                    self.stats.ecg_accepted += 1;
                }
                self.ecg_t_last += n as f64 * dt;
            }
        }
    }

    /// Accept one tri-axial accelerometer frame, applying the configured
    /// device-unit-to-g scale factor before storing. Per-sample timestamps
    /// are reconstructed forward from this stream's own running clock the
    /// same way `accept_ecg_batch` does, unless `time_s` is supplied.
    pub fn accept_acc_frame(&mut self, x: f64, y: f64, z: f64, time_s: Option<f64>) {
        let dt = 1.0 / self.rates.acc_hz;
        let time_s = time_s.unwrap_or(self.acc_t_last);
        self.acc.push(AccSample {
            x: x * self.acc_scale_factor,
            y: y * self.acc_scale_factor,
            z: z * self.acc_scale_factor,
            time_s,
        });
        self.acc_t_last = time_s + dt;
        self.stats.acc_accepted += 1;
    }

    /// Accept a raw R-R interval in milliseconds. Rejected (and counted, not
    /// propagated) if outside the physiological range [300, 2000] ms.
    pub fn accept_rr(&mut self, ms: f64) -> Option<RrInterval> {
        match RrInterval::new(ms) {
            Some(rr) => {
                self.stats.rr_accepted += 1;
                Some(rr)
            }
            None => {
                log::debug!("ingress: rejecting out-of-range RR interval {ms} ms");
                self.stats.rr_rejected += 1;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> IngressAdapter {
        IngressAdapter::new(SamplingRate::default(), 0.01, 100, 100)
    }

    #[test]
    fn test_ecg_batch_timestamp_spacing_is_self_generated() {
        let mut adapter = adapter();
        let dt = 1.0 / adapter.rates.ecg_hz;
        adapter.accept_ecg_batch(&[1, 2, 3], None);

        let buf = adapter.ecg_buffer();
        let samples: Vec<_> = buf.iter().copied().collect();
        assert_eq!(samples.len(), 3);
        assert!((samples[0].time_s - 0.0).abs() < 1e-9);
        assert!((samples[1].time_s - dt).abs() < 1e-9);
        assert!((samples[2].time_s - 2.0 * dt).abs() < 1e-9);
        assert_eq!(samples.iter().map(|s| s.raw).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_ecg_batch_timestamps_advance_across_calls() {
        let mut adapter = adapter();
        let dt = 1.0 / adapter.rates.ecg_hz;
        adapter.accept_ecg_batch(&[1, 2, 3], None);
        adapter.accept_ecg_batch(&[4], None);

        let buf = adapter.ecg_buffer();
        let last = buf.last().unwrap();
        assert!((last.time_s - 3.0 * dt).abs() < 1e-9);
    }

    #[test]
    fn test_ecg_batch_explicit_timestamps_override_and_reanchor() {
        let mut adapter = adapter();
        let dt = 1.0 / adapter.rates.ecg_hz;
        adapter.accept_ecg_batch(&[1, 2], Some(&[5.0, 5.1]));
        adapter.accept_ecg_batch(&[3], None);

        let buf = adapter.ecg_buffer();
        let samples: Vec<_> = buf.iter().copied().collect();
        assert!((samples[0].time_s - 5.0).abs() < 1e-9);
        assert!((samples[1].time_s - 5.1).abs() < 1e-9);
        assert!((samples[2].time_s - (5.1 + dt)).abs() < 1e-9);
    }

    #[test]
    fn test_ecg_batch_length_mismatch_is_dropped() {
        let mut adapter = adapter();
        adapter.accept_ecg_batch(&[1, 2, 3], Some(&[1.0, 2.0]));
        assert_eq!(adapter.stats().ecg_accepted, 0);
    }

    #[test]
    fn test_empty_ecg_batch_is_noop() {
        let mut adapter = adapter();
        adapter.accept_ecg_batch(&[], None);
        assert_eq!(adapter.stats().ecg_accepted, 0);
    }

    #[test]
    fn test_acc_frame_accepted_and_scaled() {
        let mut adapter = adapter();
        adapter.accept_acc_frame(0.0, 0.0, 100.0, Some(0.5));
        assert_eq!(adapter.stats().acc_accepted, 1);
        assert_eq!(adapter.acc_buffer().len(), 1);
        let sample = adapter.acc_buffer().last().unwrap();
        assert!((sample.z - 1.0).abs() < 1e-9, "100 device units * 0.01 scale factor should read as 1g");
    }

    #[test]
    fn test_acc_frame_timestamp_self_generated_when_omitted() {
        let mut adapter = adapter();
        let dt = 1.0 / adapter.rates.acc_hz;
        adapter.accept_acc_frame(0.0, 0.0, 100.0, None);
        adapter.accept_acc_frame(0.0, 0.0, 100.0, None);

        let buf = adapter.acc_buffer();
        let samples: Vec<_> = buf.iter().copied().collect();
        assert!((samples[0].time_s - 0.0).abs() < 1e-9);
        assert!((samples[1].time_s - dt).abs() < 1e-9);
    }

    #[test]
    fn test_rr_accept_and_reject() {
        let mut adapter = adapter();
        assert!(adapter.accept_rr(800.0).is_some());
        assert!(adapter.accept_rr(100.0).is_none());
        assert!(adapter.accept_rr(5000.0).is_none());
        let stats = adapter.stats();
        assert_eq!(stats.rr_accepted, 1);
        assert_eq!(stats.rr_rejected, 2);
    }
}
