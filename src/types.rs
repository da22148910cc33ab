//! # Core Data Model
//!
//! Shared value types that flow between the pipeline's components: inbound
//! samples, fiducial points, QT events, and the metric snapshot that
//! downstream consumers read from.
//!
//! ## Why Separate from the Components
//! Every component (ingress, canceller, conditioner, HRV engine, aggregator)
//! needs these types without depending on each other's internals. Keeping
//! them here, with no component-specific logic, is what lets the modules
//! stay a DAG instead of a cyclic graph.

use std::fmt;

/// Per-stream sampling rate in Hz. Immutable once a stream is opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingRate {
    pub ecg_hz: f64,
    pub acc_hz: f64,
}

impl Default for SamplingRate {
    fn default() -> Self {
        Self {
            ecg_hz: 130.0,
            acc_hz: 200.0,
        }
    }
}

/// A single ECG sample: raw signed count plus a monotonic session-relative
/// timestamp in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EcgSample {
    pub raw: i32,
    pub time_s: f64,
}

/// A single tri-axial accelerometer sample in device units, plus timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub time_s: f64,
}

impl AccSample {
    /// Vector magnitude √(x²+y²+z²), in whatever unit x/y/z carry.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Motion component: |magnitude − 1.0|, removing the 1g gravity baseline.
    /// Only meaningful once x/y/z are in g-units (see `IngressAdapter`'s scale factor).
    pub fn motion_component(&self) -> f64 {
        (self.magnitude() - 1.0).abs()
    }
}

/// An accepted R-R interval in milliseconds. Construction validates the
/// physiological range [300, 2000] ms; out-of-range values are rejected by
/// the ingress adapter before this type is ever produced.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct RrInterval(f64);

impl RrInterval {
    pub const MIN_MS: f64 = 300.0;
    pub const MAX_MS: f64 = 2000.0;

    /// Construct a validated RR interval. Returns `None` if outside [300, 2000] ms.
    pub fn new(ms: f64) -> Option<Self> {
        if (Self::MIN_MS..=Self::MAX_MS).contains(&ms) {
            Some(Self(ms))
        } else {
            None
        }
    }

    pub fn ms(&self) -> f64 {
        self.0
    }
}

/// Kind of fiducial point located on the ECG waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiducialKind {
    R,
    Q,
    Tpeak,
    Tend,
}

impl fmt::Display for FiducialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FiducialKind::R => "R",
            FiducialKind::Q => "Q",
            FiducialKind::Tpeak => "Tpeak",
            FiducialKind::Tend => "Tend",
        };
        write!(f, "{s}")
    }
}

/// A located fiducial point: kind, global sample index into the ECG buffer,
/// timestamp, and the sample value at that index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiducialPoint {
    pub kind: FiducialKind,
    pub global_index: u64,
    pub time_s: f64,
    pub value: f64,
}

/// One accepted QT interval: the three fiducial indices involved plus the
/// derived interval in milliseconds. Only ever constructed by the conditioner
/// after checking ordering and bounds (see `QtEvent::new`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QtEvent {
    pub q_index: u64,
    pub tend_index: u64,
    pub r_index: u64,
    pub qt_ms: f64,
    pub q_time_s: f64,
    pub r_time_s: f64,
    pub tend_time_s: f64,
}

impl QtEvent {
    pub const MIN_MS: f64 = 230.0;
    pub const MAX_MS: f64 = 660.0;

    /// Build a QT event, enforcing the ordering and bounds invariants.
    /// Returns `None` if `q_index < tpeak_index < tend_index` does not hold,
    /// or if the derived interval falls outside [230, 660] ms.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        q_index: u64,
        tpeak_index: u64,
        tend_index: u64,
        q_time_s: f64,
        r_index: u64,
        r_time_s: f64,
        tend_time_s: f64,
    ) -> Option<Self> {
        if !(q_index < tpeak_index && tpeak_index < tend_index) {
            return None;
        }
        let qt_ms = (tend_time_s - q_time_s) * 1000.0;
        if !(Self::MIN_MS..=Self::MAX_MS).contains(&qt_ms) {
            return None;
        }
        Some(Self {
            q_index,
            tend_index,
            r_index,
            qt_ms,
            q_time_s,
            r_time_s,
            tend_time_s,
        })
    }
}

/// Unit annotation carried alongside a metric value, purely informational for
/// downstream consumers (UI labels, logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricUnit {
    Milliseconds,
    Percent,
    Ratio,
    MsSquared,
    Score,
    Bpm,
}

impl fmt::Display for MetricUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricUnit::Milliseconds => "ms",
            MetricUnit::Percent => "%",
            MetricUnit::Ratio => "ratio",
            MetricUnit::MsSquared => "ms^2",
            MetricUnit::Score => "score",
            MetricUnit::Bpm => "bpm",
        };
        write!(f, "{s}")
    }
}

/// A single published metric value: name, value, unit, and display precision.
/// This is the unit of replacement in the central `MetricStore` (see `store.rs`) —
/// each key's value is replaced atomically, with no cross-key transaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricValue {
    pub value: f64,
    pub unit: MetricUnit,
    pub precision: u8,
}

impl MetricValue {
    pub fn new(value: f64, unit: MetricUnit, precision: u8) -> Self {
        Self {
            value,
            unit,
            precision,
        }
    }
}

/// Vulnerability label derived solely from the health index's range, via the
/// fixed thresholds the index aggregator applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VulnerabilityLabel {
    Optimal,
    Slight,
    Moderate,
    High,
    Severe,
}

impl VulnerabilityLabel {
    /// Determine the label solely from the health index value (already
    /// clamped to [0, 100] by the caller).
    pub fn from_health_index(health: f64) -> Self {
        if health >= 95.0 {
            VulnerabilityLabel::Optimal
        } else if health >= 80.0 {
            VulnerabilityLabel::Slight
        } else if health >= 60.0 {
            VulnerabilityLabel::Moderate
        } else if health >= 40.0 {
            VulnerabilityLabel::High
        } else {
            VulnerabilityLabel::Severe
        }
    }
}

impl fmt::Display for VulnerabilityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VulnerabilityLabel::Optimal => "Optimal",
            VulnerabilityLabel::Slight => "Slight",
            VulnerabilityLabel::Moderate => "Moderate",
            VulnerabilityLabel::High => "High",
            VulnerabilityLabel::Severe => "Severe",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rr_interval_bounds() {
        assert!(RrInterval::new(299.0).is_none());
        assert!(RrInterval::new(2001.0).is_none());
        assert_eq!(RrInterval::new(300.0).map(|r| r.ms()), Some(300.0));
        assert_eq!(RrInterval::new(2000.0).map(|r| r.ms()), Some(2000.0));
    }

    #[test]
    fn test_acc_motion_component_removes_gravity() {
        let at_rest = AccSample {
            x: 0.0,
            y: 0.0,
            z: 1.0,
            time_s: 0.0,
        };
        assert!((at_rest.motion_component()).abs() < 1e-9);

        let moving = AccSample {
            x: 0.0,
            y: 0.0,
            z: 1.3,
            time_s: 0.0,
        };
        assert!((moving.motion_component() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_qt_event_ordering_and_bounds() {
        // Q < Tpeak < Tend holds, QT = 400 ms -> accepted
        let ev = QtEvent::new(100, 150, 200, 1.000, 90, 0.980, 1.400);
        assert!(ev.is_some());
        assert!((ev.unwrap().qt_ms - 400.0).abs() < 1e-9);

        // ordering violated
        assert!(QtEvent::new(150, 100, 200, 1.000, 90, 0.980, 1.400).is_none());

        // out of bounds: 229 ms
        assert!(QtEvent::new(100, 150, 200, 1.000, 90, 0.980, 1.229).is_none());
        // out of bounds: 661 ms
        assert!(QtEvent::new(100, 150, 200, 1.000, 90, 0.980, 1.661).is_none());
    }

    #[test]
    fn test_vulnerability_label_thresholds() {
        assert_eq!(VulnerabilityLabel::from_health_index(100.0), VulnerabilityLabel::Optimal);
        assert_eq!(VulnerabilityLabel::from_health_index(95.0), VulnerabilityLabel::Optimal);
        assert_eq!(VulnerabilityLabel::from_health_index(94.9), VulnerabilityLabel::Slight);
        assert_eq!(VulnerabilityLabel::from_health_index(80.0), VulnerabilityLabel::Slight);
        assert_eq!(VulnerabilityLabel::from_health_index(79.9), VulnerabilityLabel::Moderate);
        assert_eq!(VulnerabilityLabel::from_health_index(60.0), VulnerabilityLabel::Moderate);
        assert_eq!(VulnerabilityLabel::from_health_index(59.9), VulnerabilityLabel::High);
        assert_eq!(VulnerabilityLabel::from_health_index(40.0), VulnerabilityLabel::High);
        assert_eq!(VulnerabilityLabel::from_health_index(39.9), VulnerabilityLabel::Severe);
        assert_eq!(VulnerabilityLabel::from_health_index(0.0), VulnerabilityLabel::Severe);
    }
}
