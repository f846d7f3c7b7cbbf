//! In-memory meter producer
//!
//! Stands in for a real PZEM on a serial line: readings are either fed in
//! explicitly or synthesized on `poll()`. Used by the desktop simulator and
//! the collector tests.

use log::trace;

use super::{MeterProducer, RxCallback, RxEvent, RxMessage, Subscription};
use crate::metrics::{Metrics, Pz003Metrics, Pz004Metrics};

/// Modbus "read input registers" function code
const CMD_RIR: u8 = 0x04;

/// Seconds after which an un-refreshed reading is reported stale
const DEFAULT_STALE_AFTER: u32 = 5;

/// Placeholder transport for the dummy meter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyPort {
    pub name: &'static str,
}

/// Metrics that can be synthesized for simulation
pub trait Synthetic: Metrics {
    /// Plausible reading number `step`; energy grows with `step`
    fn synthetic(step: u32) -> Self;
}

/// Small LCG noise in `-span..=span`
fn jitter(step: u32, span: u32) -> i32 {
    let x = step.wrapping_mul(1_103_515_245).wrapping_add(12_345) >> 8;
    (x % (2 * span + 1)) as i32 - span as i32
}

impl Synthetic for Pz004Metrics {
    fn synthetic(step: u32) -> Self {
        let voltage = (2300 + jitter(step, 50)) as u16;
        let current = (1500 + jitter(step.rotate_left(7), 400)) as u32;
        let power = u32::from(voltage) * current / 1000;
        let freq = (500 + jitter(step.rotate_left(13), 2)) as u16;
        Self::new(voltage, current, power, 1_000 + step / 10, freq, 95)
    }
}

impl Synthetic for Pz003Metrics {
    fn synthetic(step: u32) -> Self {
        let voltage = (1250 + jitter(step, 30)) as u16;
        let current = (320 + jitter(step.rotate_left(7), 40)) as u16;
        let power = u32::from(voltage) * u32::from(current) / 1000;
        Self::new(voltage, current, power, 500 + step / 20)
    }
}

/// Producer with a single callback slot and a settable clock
pub struct DummyMeter<M> {
    id: u8,
    port: Option<DummyPort>,
    autopoll: bool,
    metrics: M,
    message: RxMessage,
    last_update: Option<u32>,
    now: u32,
    stale: bool,
    stale_after: u32,
    callback: Option<(u32, RxCallback<M>)>,
    next_token: u32,
    attach_count: usize,
    step: u32,
}

impl<M: Metrics> DummyMeter<M> {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            port: None,
            autopoll: false,
            metrics: M::default(),
            message: RxMessage::default(),
            last_update: None,
            now: 0,
            stale: true,
            stale_after: DEFAULT_STALE_AFTER,
            callback: None,
            next_token: 0,
            attach_count: 0,
            step: 0,
        }
    }

    /// Freshness window in seconds
    pub fn with_stale_after(mut self, secs: u32) -> Self {
        self.stale_after = secs;
        self
    }

    /// Deliver a fresh reading as if it was just decoded
    pub fn feed(&mut self, metrics: M, now: u32) {
        self.metrics = metrics;
        self.now = now;
        self.last_update = Some(now);
        self.stale = false;
        self.message = RxMessage {
            addr: self.id,
            cmd: CMD_RIR,
            valid: true,
            data: heapless::Vec::new(),
        };
        self.dispatch();
    }

    /// Report a communication timeout: the callback fires with a stale reading
    pub fn timeout(&mut self, now: u32) {
        self.now = now;
        self.stale = true;
        self.message = RxMessage {
            addr: self.id,
            cmd: CMD_RIR,
            valid: false,
            data: heapless::Vec::new(),
        };
        self.dispatch();
    }

    /// Advance the meter clock without new data
    pub fn tick(&mut self, now: u32) {
        self.now = now;
    }

    pub fn port(&self) -> Option<&DummyPort> {
        self.port.as_ref()
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// How many times a callback was registered over the meter's lifetime
    pub fn attach_count(&self) -> usize {
        self.attach_count
    }

    fn dispatch(&mut self) {
        let stale = self.data_stale();
        if let Some((_, cb)) = self.callback.as_mut() {
            let event = RxEvent {
                source: self.id,
                message: Some(&self.message),
                metrics: &self.metrics,
                stale,
            };
            cb(&event);
        }
    }
}

impl<M: Synthetic> DummyMeter<M> {
    /// Produce one synthetic reading if polling is on and a port is attached
    pub fn poll(&mut self, now: u32) -> bool {
        if !self.autopoll || self.port.is_none() {
            return false;
        }

        self.step = self.step.wrapping_add(1);
        let m = M::synthetic(self.step);
        trace!("Dummy meter {} polled: {:?}", self.id, m);
        self.feed(m, now);
        true
    }
}

impl<M: Metrics> MeterProducer for DummyMeter<M> {
    type Metrics = M;
    type Port = DummyPort;

    fn attach_port(&mut self, port: DummyPort) {
        self.port = Some(port);
    }

    fn detach_port(&mut self) -> Option<DummyPort> {
        self.port.take()
    }

    fn autopoll(&mut self, enable: bool) -> bool {
        self.autopoll = enable;
        self.autopoll
    }

    fn is_autopolling(&self) -> bool {
        self.autopoll
    }

    fn metrics(&self) -> &M {
        &self.metrics
    }

    fn data_stale(&self) -> bool {
        match self.last_update {
            Some(t) => self.stale || self.now.saturating_sub(t) > self.stale_after,
            None => true,
        }
    }

    fn data_age(&self) -> u64 {
        self.last_update
            .map_or(0, |t| u64::from(self.now.saturating_sub(t)))
    }

    fn attach_rx_callback(&mut self, callback: RxCallback<M>) -> Subscription {
        self.next_token = self.next_token.wrapping_add(1);
        self.attach_count += 1;
        self.callback = Some((self.next_token, callback));
        Subscription::new(self.next_token)
    }

    fn detach_rx_callback(&mut self, token: Subscription) {
        if matches!(&self.callback, Some((id, _)) if *id == token.id()) {
            self.callback = None;
        }
    }
}
