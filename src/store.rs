//! # Central Metric Store
//!
//! Single-writer, multi-reader fan-out point. The pipeline's components never
//! talk to each other directly — each publishes into this store, and anyone
//! downstream (a demo binary, a future UI, a logger) subscribes to the
//! channel it cares about, using a single producer/multi-consumer channel
//! per stream so nothing is consumed out from under another subscriber.
//!
//! ## Single-Writer Discipline
//! Only the `Pipeline` orchestrator holds a `&mut MetricStore`. Every other
//! consumer holds a `crossbeam_channel::Receiver` clone and never touches the
//! store's internal maps directly.

use crate::types::{FiducialPoint, MetricValue, QtEvent};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;

/// One named scalar replacement. The store keeps only the latest value per
/// key — history, if a consumer wants it, is reconstructed client-side from
/// the stream of `MetricUpdate`s received over the channel, not from the store.
#[derive(Debug, Clone)]
pub struct MetricUpdate {
    pub name: &'static str,
    pub value: MetricValue,
}

/// Central store: latest-value table plus three outbound broadcast channels.
/// `crossbeam_channel`'s multi-consumer semantics mean every `subscribe_*`
/// call gets its own full copy of the stream; nothing is consumed out from
/// under another subscriber.
pub struct MetricStore {
    latest: HashMap<&'static str, MetricValue>,
    metric_tx: Sender<MetricUpdate>,
    metric_rx: Receiver<MetricUpdate>,
    fiducial_tx: Sender<FiducialPoint>,
    fiducial_rx: Receiver<FiducialPoint>,
    qt_tx: Sender<QtEvent>,
    qt_rx: Receiver<QtEvent>,
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricStore {
    pub fn new() -> Self {
        let (metric_tx, metric_rx) = unbounded();
        let (fiducial_tx, fiducial_rx) = unbounded();
        let (qt_tx, qt_rx) = unbounded();
        Self {
            latest: HashMap::new(),
            metric_tx,
            metric_rx,
            fiducial_tx,
            fiducial_rx,
            qt_tx,
            qt_rx,
        }
    }

    /// Replace a metric's latest value and publish the update. Dropped
    /// silently (with a trace log) if there are no subscribers — an unbounded
    /// channel with no receivers still accepts sends, it just has no one to
    /// deliver to.
    pub fn publish_metric(&mut self, name: &'static str, value: MetricValue) {
        self.latest.insert(name, value);
        if self.metric_tx.send(MetricUpdate { name, value }).is_err() {
            log::trace!("metric store: no subscribers for '{name}'");
        }
    }

    pub fn publish_fiducial(&self, point: FiducialPoint) {
        if self.fiducial_tx.send(point).is_err() {
            log::trace!("metric store: no fiducial subscribers");
        }
    }

    pub fn publish_qt_event(&self, event: QtEvent) {
        if self.qt_tx.send(event).is_err() {
            log::trace!("metric store: no QT event subscribers");
        }
    }

    pub fn latest(&self, name: &str) -> Option<MetricValue> {
        self.latest.get(name).copied()
    }

    pub fn subscribe_metrics(&self) -> Receiver<MetricUpdate> {
        self.metric_rx.clone()
    }

    pub fn subscribe_fiducials(&self) -> Receiver<FiducialPoint> {
        self.fiducial_rx.clone()
    }

    pub fn subscribe_qt_events(&self) -> Receiver<QtEvent> {
        self.qt_rx.clone()
    }
}
