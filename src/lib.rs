//! # cardiosync-core
//!
//! A streaming ECG/HRV signal-processing pipeline. Ingests ECG, accelerometer,
//! and R-R interval streams; produces a motion-filtered ECG signal with
//! annotated fiducial points, a continuously updated panel of heart-rate-
//! variability metrics, and three composite physiological indices.
//!
//! The pipeline does not talk to any sensor transport, renderer, or
//! persistence layer — it is handed three inbound streams and exposes a set
//! of outbound streams (see [`store::MetricStore`]) through a single
//! [`pipeline::Pipeline`] entry point.

pub mod aggregator;
pub mod canceller;
pub mod conditioner;
pub mod config;
pub mod error;
pub mod hrv;
pub mod ingress;
pub mod pipeline;
pub mod store;
pub mod timeseries;
pub mod types;

pub use config::{BandNormalization, PipelineConfig, QtcFormula};
pub use error::ConfigError;
pub use pipeline::Pipeline;
pub use store::{MetricStore, MetricUpdate};
pub use types::{
    AccSample, EcgSample, FiducialKind, FiducialPoint, MetricUnit, MetricValue, QtEvent, RrInterval, SamplingRate,
    VulnerabilityLabel,
};
