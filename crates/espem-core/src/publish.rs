//! Periodic push of the latest reading to connected UI clients
//!
//! The push channel (websocket feeders or similar) and the scheduler are
//! external. [`FeedSink`] is where snapshots go and [`PeriodicTrigger`] is the
//! cadence that calls [`Espem::publish`]; [`UiUpdater`] maps the user-facing
//! "update every N seconds" setting onto that trigger.

use embassy_time::Duration;
use log::{debug, info};
use serde::Serialize;

use crate::collector::{Clock, Espem};
use crate::metrics::{Metrics, Quantity};
use crate::producer::MeterProducer;

/// Default UI update period, seconds
pub const DEFAULT_WS_UPD_RATE: u8 = 2;

/// Latest reading as pushed to UI clients
///
/// Values are raw meter registers; clients scale them for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snapshot {
    pub stale: bool,
    pub age: u64,
    #[serde(rename = "U")]
    pub voltage: u32,
    #[serde(rename = "I")]
    pub current: u32,
    #[serde(rename = "P")]
    pub power: u32,
    /// Raw energy plus the configured offset
    #[serde(rename = "W")]
    pub energy: i64,
    #[serde(rename = "freq", skip_serializing_if = "Option::is_none")]
    pub freq: Option<u32>,
    #[serde(rename = "Pf", skip_serializing_if = "Option::is_none")]
    pub pf: Option<u32>,
}

impl Snapshot {
    pub fn from_producer<P: MeterProducer>(pz: &P, nrg_offset: i32) -> Self {
        let m = pz.metrics();
        let raw = |q: Quantity| m.raw(q).unwrap_or_default();
        Self {
            stale: pz.data_stale(),
            age: pz.data_age(),
            voltage: raw(Quantity::Voltage),
            current: raw(Quantity::Current),
            power: raw(Quantity::Power),
            energy: i64::from(raw(Quantity::Energy)) + i64::from(nrg_offset),
            freq: m.raw(Quantity::Frequency),
            pf: m.raw(Quantity::PowerFactor),
        }
    }
}

/// Outgoing channel to UI clients
pub trait FeedSink {
    /// Whether any client is listening
    fn available(&self) -> bool;

    fn send(&mut self, snapshot: &Snapshot);
}

/// Repeating task handle owned by the host scheduler
pub trait PeriodicTrigger {
    fn set_interval(&mut self, interval: Duration);

    fn interval(&self) -> Duration;

    /// (Re)start the task, first run one interval from now
    fn restart_delayed(&mut self);

    fn disable(&mut self);

    fn is_enabled(&self) -> bool;
}

impl<P: MeterProducer, C: Clock> Espem<P, C> {
    /// Push the latest reading to `feed`.
    ///
    /// Returns false without doing anything if nobody listens or there is no
    /// meter.
    pub fn publish<F: FeedSink + ?Sized>(&self, feed: &mut F) -> bool {
        if !feed.available() {
            return false;
        }
        let Some(pz) = self.meter() else {
            return false;
        };

        let snapshot = Snapshot::from_producer(pz, self.energy_offset());
        feed.send(&snapshot);
        true
    }
}

/// UI update rate control over a [`PeriodicTrigger`]
pub struct UiUpdater<T> {
    trigger: T,
}

impl<T: PeriodicTrigger> UiUpdater<T> {
    /// Wrap `trigger` and start it at [`DEFAULT_WS_UPD_RATE`]
    pub fn new(trigger: T) -> Self {
        let mut updater = Self { trigger };
        updater.set_uirate(DEFAULT_WS_UPD_RATE);
        updater
    }

    /// Set the update period in seconds, 0 stops updates
    pub fn set_uirate(&mut self, seconds: u8) -> u8 {
        if seconds > 0 {
            self.trigger.set_interval(Duration::from_secs(u64::from(seconds)));
            self.trigger.restart_delayed();
            debug!("UI update every {}s", seconds);
        } else {
            self.trigger.disable();
            info!("UI updates disabled");
        }
        seconds
    }

    /// Current period in seconds, 0 when stopped
    pub fn uirate(&self) -> u8 {
        if self.trigger.is_enabled() {
            u8::try_from(self.trigger.interval().as_secs()).unwrap_or(u8::MAX)
        } else {
            0
        }
    }

    pub fn trigger(&self) -> &T {
        &self.trigger
    }

    pub fn trigger_mut(&mut self) -> &mut T {
        &mut self.trigger
    }
}
