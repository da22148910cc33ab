//! # Pipeline Orchestrator
//!
//! Wires the five components (C1-C5) and the central store together, and
//! implements the single-threaded cooperative concurrency model: an
//! event-driven fast path for inbound samples with no suspension points, and
//! a periodic slow-path tick that recomputes the display window and fiducial
//! set over the current buffer state.

use crate::aggregator::{CompositeIndices, IndexAggregator};
use crate::canceller::MotionCanceller;
use crate::conditioner::{ConditionerParams, EcgConditioner};
use crate::config::{PipelineConfig, QtcFormula};
use crate::hrv::{HrvEngine, HrvSnapshot};
use crate::ingress::IngressAdapter;
use crate::store::MetricStore;
use crate::types::{MetricUnit, MetricValue, SamplingRate};

/// Top-level, embeddable pipeline. Owns every component; the caller drives
/// it by calling `accept_*` for inbound events and `tick` on a periodic
/// timer (default every `display_tick_ms`).
pub struct Pipeline {
    config: PipelineConfig,
    rates: SamplingRate,
    ingress: IngressAdapter,
    canceller: MotionCanceller,
    conditioner: EcgConditioner,
    hrv: HrvEngine,
    aggregator: IndexAggregator,
    store: MetricStore,
    mean_rr_s: Option<f64>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, rates: SamplingRate) -> Self {
        Self {
            ingress: IngressAdapter::new(
                rates,
                config.acc_scale_factor,
                config.ecg_buffer_capacity,
                config.acc_buffer_capacity,
            ),
            canceller: MotionCanceller::new(config.lms_filter_order, config.lms_step_size, config.motion_threshold_g),
            conditioner: EcgConditioner::new(ConditionerParams { fs_hz: rates.ecg_hz }),
            hrv: HrvEngine::new(config.rr_window_count, config.band_normalization),
            aggregator: IndexAggregator::new(),
            store: MetricStore::new(),
            rates,
            config,
            mean_rr_s: None,
        }
    }

    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fast-path event: a batch of raw ECG counts. Per-sample timestamps are
    /// self-generated from the stream's own running clock unless `timestamps`
    /// is supplied (see `IngressAdapter::accept_ecg_batch`).
    pub fn accept_ecg_batch(&mut self, raw: &[i32], timestamps: Option<&[f64]>) {
        self.ingress.accept_ecg_batch(raw, timestamps);
    }

    /// Fast-path event: one accelerometer frame in device units. The ingress
    /// adapter applies the configured device-unit-to-g scale factor before
    /// storing it.
    pub fn accept_acc_frame(&mut self, x: f64, y: f64, z: f64, time_s: Option<f64>) {
        self.ingress.accept_acc_frame(x, y, z, time_s);
    }

    /// Fast-path event: a sensor-reported R-R interval in milliseconds.
    /// Forwards straight to the HRV engine and publishes the resulting
    /// snapshot and composite indices; this is the primary R-R source.
    pub fn accept_rr(&mut self, ms: f64) {
        if let Some(rr) = self.ingress.accept_rr(ms) {
            self.mean_rr_s = Some(rr.ms() / 1000.0);
            let snapshot = self.hrv.accept_rr(rr);
            self.publish_hrv_snapshot(&snapshot);
            let indices = self.aggregator.update(&snapshot);
            self.publish_indices(&indices);
        }
    }

    /// Slow-path tick: recompute the conditioned ECG window and fiducial set
    /// over the trailing `conditioner_window_seconds` of the current ECG
    /// buffer, motion cancelling each sample first against the accelerometer
    /// buffer. `history_seconds` is display-facing only and plays no part in
    /// this analysis window.
    pub fn tick(&mut self) {
        // Snapshot the (bounded, cheap-to-clone) accelerometer buffer before
        // taking a mutable borrow on the ECG buffer below; the two buffers
        // are independent so this keeps the borrow checker happy without
        // reaching for interior mutability.
        let acc_snapshot = self.ingress.acc_buffer().clone();

        let window_samples = (self.config.conditioner_window_seconds * self.rates.ecg_hz).round() as usize;
        let ecg_buffer = self.ingress.ecg_buffer_mut();
        let total = ecg_buffer.len();
        if total == 0 {
            return;
        }
        let take = window_samples.min(total);
        let samples = ecg_buffer.last_n_contiguous(take).to_vec();
        if samples.len() < 16 {
            return;
        }

        let oldest_in_window = ecg_buffer.total_pushed() - samples.len() as u64;

        let mut raw = Vec::with_capacity(samples.len());
        let mut global_indices = Vec::with_capacity(samples.len());
        let mut timestamps = Vec::with_capacity(samples.len());

        for (i, sample) in samples.iter().enumerate() {
            let cancelled = self.canceller.process(sample.raw as f64, sample.time_s, &acc_snapshot);
            raw.push(cancelled.value);
            global_indices.push(oldest_in_window + i as u64);
            timestamps.push(sample.time_s);
        }

        let output = self.conditioner.process_window(&raw, &global_indices, &timestamps);

        for fiducial in &output.fiducials {
            self.store.publish_fiducial(*fiducial);
        }
        for event in &output.qt_events {
            self.store.publish_qt_event(*event);
            let qtc = self.qtc_ms(event.qt_ms);
            self.store.publish_metric("qtc_ms", MetricValue::new(qtc, MetricUnit::Milliseconds, 1));
        }
        if let Some(bpm) = output.heart_rate_bpm {
            self.store.publish_metric("heart_rate_bpm", MetricValue::new(bpm, MetricUnit::Bpm, 0));
        }
        if let Some(variance) = self.canceller.convergence_variance() {
            self.store.publish_metric(
                "canceller_convergence_variance",
                MetricValue::new(variance, MetricUnit::Ratio, 4),
            );
        }
    }

    /// Rate-corrected QT, using the most recently accepted R-R as the RR
    /// term. Display-facing only; raw QT acceptance is unaffected.
    fn qtc_ms(&self, qt_ms: f64) -> f64 {
        let rr_s = self.mean_rr_s.unwrap_or(1.0).max(0.001);
        match self.config.qtc_formula {
            QtcFormula::Bazett => qt_ms / rr_s.sqrt(),
            QtcFormula::Fridericia => qt_ms / rr_s.cbrt(),
        }
    }

    fn publish_hrv_snapshot(&mut self, snapshot: &HrvSnapshot) {
        self.store.publish_metric("sdnn_ms", MetricValue::new(snapshot.sdnn_ms, MetricUnit::Milliseconds, 1));
        self.store.publish_metric("rmssd_ms", MetricValue::new(snapshot.rmssd_ms, MetricUnit::Milliseconds, 1));
        self.store.publish_metric("pnn50_pct", MetricValue::new(snapshot.pnn50_pct, MetricUnit::Percent, 1));
        self.store.publish_metric("mxdmn_ms", MetricValue::new(snapshot.mxdmn_ms, MetricUnit::Milliseconds, 1));
        self.store.publish_metric("amo50_pct", MetricValue::new(snapshot.amo50_pct, MetricUnit::Percent, 1));
        self.store.publish_metric("cv_pct", MetricValue::new(snapshot.cv_pct, MetricUnit::Percent, 1));
        self.store.publish_metric("vlf_power", MetricValue::new(snapshot.vlf_power, MetricUnit::MsSquared, 1));
        self.store.publish_metric("lf_power", MetricValue::new(snapshot.lf_power, MetricUnit::MsSquared, 1));
        self.store.publish_metric("hf_power", MetricValue::new(snapshot.hf_power, MetricUnit::MsSquared, 1));
        self.store.publish_metric("total_power", MetricValue::new(snapshot.total_power, MetricUnit::MsSquared, 1));
        self.store.publish_metric("lf_hf_ratio", MetricValue::new(snapshot.lf_hf_ratio, MetricUnit::Ratio, 2));
    }

    fn publish_indices(&mut self, indices: &CompositeIndices) {
        self.store.publish_metric("sns_score", MetricValue::new(indices.sns_score, MetricUnit::Score, 1));
        self.store.publish_metric("psns_score", MetricValue::new(indices.psns_score, MetricUnit::Score, 1));
        self.store.publish_metric("stress_index", MetricValue::new(indices.stress_index, MetricUnit::Score, 1));
        self.store.publish_metric("energy_index", MetricValue::new(indices.energy_index, MetricUnit::Score, 1));
        self.store.publish_metric("health_index", MetricValue::new(indices.health_index, MetricUnit::Score, 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> Pipeline {
        Pipeline::new(PipelineConfig::default(), SamplingRate::default())
    }

    #[test]
    fn test_accept_rr_publishes_hrv_metrics() {
        let mut pipeline = pipeline();
        for i in 0..10 {
            let ms = if i % 2 == 0 { 900.0 } else { 1100.0 };
            pipeline.accept_rr(ms);
        }
        assert!(pipeline.store().latest("sdnn_ms").is_some());
        assert!(pipeline.store().latest("stress_index").is_some());
    }

    #[test]
    fn test_out_of_range_rr_does_not_publish() {
        let mut pipeline = pipeline();
        pipeline.accept_rr(50.0);
        assert!(pipeline.store().latest("sdnn_ms").is_none());
    }

    #[test]
    fn test_tick_with_empty_buffer_is_noop() {
        let mut pipeline = pipeline();
        pipeline.tick(); // should not panic on empty buffers
        assert!(pipeline.store().latest("heart_rate_bpm").is_none());
    }

    #[test]
    fn test_ecg_batch_then_tick_emits_no_panic() {
        let mut pipeline = pipeline();
        let samples: Vec<i32> = (0..200).map(|i| (i % 50) as i32).collect();
        pipeline.accept_ecg_batch(&samples, None);
        pipeline.tick();
    }
}
