//! Demo binary: synthesizes ECG, accelerometer, and R-R streams and drives
//! a [`cardiosync_core::Pipeline`] with them, logging each metric update as
//! it is published. This stands in for whatever sensor transport a real
//! deployment would wire up (out of scope for the core crate itself).

use cardiosync_core::{PipelineConfig, SamplingRate};
use std::f64::consts::PI;
use std::time::Duration;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match PipelineConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("failed to load config, using defaults: {e}");
            PipelineConfig::default()
        }
    };

    let rates = SamplingRate::default();
    let acc_scale_factor = config.acc_scale_factor;
    let mut pipeline = cardiosync_core::Pipeline::new(config, rates);

    let metric_rx_handle = pipeline.store().subscribe_metrics();

    let duration_s = 30.0;
    let batch_size = 26; // ~200ms batches at 130Hz
    let mut t = 0.0;
    let mut rr_clock = 0.0;

    while t < duration_s {
        let batch: Vec<i32> = (0..batch_size)
            .map(|k| {
                let sample_t = t + k as f64 / rates.ecg_hz;
                synth_ecg_count(sample_t)
            })
            .collect();
        t += batch_size as f64 / rates.ecg_hz;
        pipeline.accept_ecg_batch(&batch, None);

        let acc_samples = (batch_size as f64 * rates.acc_hz / rates.ecg_hz).round() as usize;
        for k in 0..acc_samples {
            let sample_t = t - (acc_samples - k) as f64 / rates.acc_hz;
            let z_g = 1.0 + 0.02 * (2.0 * PI * 0.5 * sample_t).sin();
            pipeline.accept_acc_frame(0.0, 0.0, z_g / acc_scale_factor, Some(sample_t));
        }

        if t - rr_clock >= 0.8 {
            rr_clock = t;
            pipeline.accept_rr(800.0 + 40.0 * (2.0 * PI * 0.1 * t).sin());
        }

        pipeline.tick();

        while let Ok(update) = metric_rx_handle.try_recv() {
            log::info!("{} = {:.3} {}", update.name, update.value.value, update.value.unit);
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    log::info!("demo run complete");
}

fn synth_ecg_count(t: f64) -> i32 {
    let phase = t % 0.8;
    let r_spike = (-((phase).powi(2)) / (2.0 * 0.002_f64.powi(2))).exp() * 4000.0;
    let t_bump = (-((phase - 0.24).powi(2)) / (2.0 * 0.05_f64.powi(2))).exp() * 800.0;
    (r_spike + t_bump) as i32
}
