//! # Configuration Management Module
//!
//! Persistent pipeline settings stored in a platform-appropriate location.
//! Handles loading, saving, validating, and defaulting every tunable knob:
//! the R-R window count, the QTc formula, the display window, the
//! conditioner's analysis window, the accelerometer scale factor, the
//! canceller's filter order and step size, the motion threshold, and the
//! tick period.
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/cardiosync/config.toml
//! - Linux: ~/.config/cardiosync/config.toml
//! - Windows: %APPDATA%\cardiosync\config.toml
//!
//! ## Why TOML
//! Human-readable format allows manual editing if needed. Serde provides
//! automatic serialization/deserialization.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// QT-correction formula selector (affects only display-facing QTc, never
/// the raw QT acceptance window, which is fixed at [230, 660] ms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QtcFormula {
    Bazett,
    Fridericia,
}

impl Default for QtcFormula {
    fn default() -> Self {
        QtcFormula::Fridericia
    }
}

/// Per-band normalization divisors used by the HRV engine's spectral
/// estimator. These constants vary across published HRV references; kept as
/// a configuration table so the ambiguity has one place to live instead of
/// being baked into the math.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandNormalization {
    pub vlf: f64,
    pub lf: f64,
    pub hf: f64,
    pub total: f64,
}

impl Default for BandNormalization {
    fn default() -> Self {
        Self {
            vlf: 1.0,
            lf: 4.5,
            hf: 9.0,
            total: 8.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of R-R intervals retained in the HRV sliding window.
    pub rr_window_count: usize,
    /// QTc correction formula used for display-facing QTc only.
    pub qtc_formula: QtcFormula,
    /// Seconds of history kept for display-facing emissions. Windowing only;
    /// has no effect on the conditioner's own analysis window.
    pub history_seconds: f64,
    /// Trailing window, in seconds, the conditioner re-analyzes on each tick.
    pub conditioner_window_seconds: f64,
    /// Device-unit-to-g scale factor applied to every accelerometer sample
    /// as it's ingested.
    pub acc_scale_factor: f64,
    /// Number of taps in the motion-artifact canceller's adaptive filter.
    pub lms_filter_order: usize,
    /// Nominal LMS/NLMS step size (tripled automatically in high motion).
    pub lms_step_size: f64,
    /// Motion-component threshold (g) above which the canceller is considered
    /// in "high motion" mode.
    pub motion_threshold_g: f64,
    /// Cooperative slow-path tick period, milliseconds.
    pub display_tick_ms: u64,
    /// ECG ring-buffer capacity in samples.
    pub ecg_buffer_capacity: usize,
    /// Accelerometer alignment-buffer capacity in samples.
    pub acc_buffer_capacity: usize,
    /// Per-band spectral normalization divisors.
    pub band_normalization: BandNormalization,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rr_window_count: 60,
            qtc_formula: QtcFormula::Fridericia,
            history_seconds: 30.0,
            conditioner_window_seconds: 5.0,
            acc_scale_factor: 0.01,
            lms_filter_order: 15,
            lms_step_size: 0.005,
            motion_threshold_g: 0.15,
            display_tick_ms: 50,
            ecg_buffer_capacity: 5000,
            acc_buffer_capacity: 500,
            band_normalization: BandNormalization::default(),
        }
    }
}

impl PipelineConfig {
    const RR_WINDOW_MIN: usize = 2;
    const RR_WINDOW_MAX: usize = 1000;

    /// Get the path to the config file.
    fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("cardiosync").join("config.toml")
    }

    /// Load config from file, or create the default if it doesn't exist.
    /// Always returns a validated config (out-of-range fields clamped).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Save config to file.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Load from an explicit path, same read-or-create-default behavior as
    /// `load()`. Split out so tests can exercise the real filesystem logic
    /// against a temp directory instead of the platform config directory.
    fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let config = match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(ConfigError::ParseFailed)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save_to(path)?;
                config
            }
            Err(e) => return Err(ConfigError::ReadFailed(e)),
        };

        Ok(config.validated())
    }

    /// Save to an explicit path.
    fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    /// Clamp any out-of-range field to its documented limits, logging a
    /// warning for each one clamped. A configuration error is never fatal.
    pub fn validated(mut self) -> Self {
        if !(Self::RR_WINDOW_MIN..=Self::RR_WINDOW_MAX).contains(&self.rr_window_count) {
            log::warn!(
                "rr_window_count {} out of range [{}, {}], clamping",
                self.rr_window_count,
                Self::RR_WINDOW_MIN,
                Self::RR_WINDOW_MAX
            );
            self.rr_window_count = self
                .rr_window_count
                .clamp(Self::RR_WINDOW_MIN, Self::RR_WINDOW_MAX);
        }
        if self.lms_filter_order == 0 {
            log::warn!("lms_filter_order 0 is invalid, clamping to 1");
            self.lms_filter_order = 1;
        }
        if self.display_tick_ms == 0 {
            log::warn!("display_tick_ms 0 is invalid, clamping to 1");
            self.display_tick_ms = 1;
        }
        if self.ecg_buffer_capacity == 0 {
            log::warn!("ecg_buffer_capacity 0 is invalid, clamping to 1");
            self.ecg_buffer_capacity = 1;
        }
        if self.acc_buffer_capacity == 0 {
            log::warn!("acc_buffer_capacity 0 is invalid, clamping to 1");
            self.acc_buffer_capacity = 1;
        }
        if self.conditioner_window_seconds <= 0.0 {
            log::warn!("conditioner_window_seconds {} is invalid, clamping to 1.0", self.conditioner_window_seconds);
            self.conditioner_window_seconds = 1.0;
        }
        if self.acc_scale_factor <= 0.0 {
            log::warn!("acc_scale_factor {} is invalid, clamping to 1.0", self.acc_scale_factor);
            self.acc_scale_factor = 1.0;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.rr_window_count, 60);
        assert_eq!(config.qtc_formula, QtcFormula::Fridericia);
        assert_eq!(config.lms_filter_order, 15);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = PipelineConfig {
            rr_window_count: 120,
            ..PipelineConfig::default()
        };

        let toml_str = toml::to_string(&config).expect("failed to serialize");
        let parsed: PipelineConfig = toml::from_str(&toml_str).expect("failed to deserialize");
        assert_eq!(parsed.rr_window_count, 120);
    }

    #[test]
    fn test_validated_clamps_rr_window_count() {
        let config = PipelineConfig {
            rr_window_count: 5000,
            ..PipelineConfig::default()
        }
        .validated();
        assert_eq!(config.rr_window_count, PipelineConfig::RR_WINDOW_MAX);

        let config = PipelineConfig {
            rr_window_count: 1,
            ..PipelineConfig::default()
        }
        .validated();
        assert_eq!(config.rr_window_count, PipelineConfig::RR_WINDOW_MIN);
    }

    #[test]
    fn test_validated_is_noop_for_defaults() {
        let config = PipelineConfig::default().validated();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_load_from_missing_path_creates_default() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("config.toml");
        assert!(!path.exists());

        let config = PipelineConfig::load_from(&path).expect("load_from should create a default");
        assert_eq!(config, PipelineConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_save_then_load_from_roundtrips() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("config.toml");

        let original = PipelineConfig {
            rr_window_count: 90,
            ..PipelineConfig::default()
        };
        original.save_to(&path).expect("save_to should succeed");

        let loaded = PipelineConfig::load_from(&path).expect("load_from should succeed");
        assert_eq!(loaded.rr_window_count, 90);
    }

    #[test]
    fn test_load_from_malformed_file_returns_parse_error() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "not valid toml {{{").expect("failed to write malformed file");

        let result = PipelineConfig::load_from(&path);
        assert!(matches!(result, Err(ConfigError::ParseFailed(_))));
    }
}
