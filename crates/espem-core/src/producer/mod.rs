//! Protocol ingestion bridge
//!
//! The PZEM protocol driver lives outside this crate. It is seen through the
//! [`MeterProducer`] trait: something that owns a serial port, decodes meter
//! replies into [`Metrics`] samples and invokes at most one registered
//! callback for every received frame.

#[cfg(feature = "dummy-meter")]
mod dummy;

#[cfg(feature = "dummy-meter")]
pub use dummy::{DummyMeter, DummyPort, Synthetic};

use alloc::boxed::Box;

use crate::metrics::Metrics;

/// Maximum raw frame length kept in an [`RxMessage`]
pub const RX_FRAME_LEN: usize = 32;

/// Raw reply frame as received from the meter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RxMessage {
    /// Modbus slave address of the sender
    pub addr: u8,
    /// Function code
    pub cmd: u8,
    /// CRC check passed
    pub valid: bool,
    pub data: heapless::Vec<u8, RX_FRAME_LEN>,
}

/// What a producer hands to the registered callback for every frame
#[derive(Debug)]
pub struct RxEvent<'a, M> {
    /// Opaque id of the meter that produced the frame
    pub source: u8,
    /// Raw frame, if the producer keeps it
    pub message: Option<&'a RxMessage>,
    /// Latest decoded sample
    pub metrics: &'a M,
    /// Reading is older than the producer's freshness window
    pub stale: bool,
}

pub type RxCallback<M> = Box<dyn FnMut(&RxEvent<'_, M>)>;

/// Token for a registered rx callback.
///
/// Returned by [`MeterProducer::attach_rx_callback`] and consumed by
/// [`MeterProducer::detach_rx_callback`]; it is neither `Clone` nor `Copy`, so
/// a registration can be released only once.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription(u32);

impl Subscription {
    /// Producers mint tokens with their own counter
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u32 {
        self.0
    }
}

/// A meter driver that delivers decoded samples
pub trait MeterProducer {
    type Metrics: Metrics;
    /// Transport the driver talks over (UART queue, TCP bridge, ...)
    type Port;

    /// Attach a transport and start its queues
    fn attach_port(&mut self, port: Self::Port);

    /// Detach the current transport, handing it back
    fn detach_port(&mut self) -> Option<Self::Port>;

    /// Enable or disable periodic polling, returns the resulting state
    fn autopoll(&mut self, enable: bool) -> bool;

    fn is_autopolling(&self) -> bool;

    /// Latest decoded sample
    fn metrics(&self) -> &Self::Metrics;

    /// Whether the latest sample is older than the freshness window
    fn data_stale(&self) -> bool;

    /// Age of the latest sample in seconds
    fn data_age(&self) -> u64;

    /// Register the rx callback, replacing any previous one
    fn attach_rx_callback(&mut self, callback: RxCallback<Self::Metrics>) -> Subscription;

    /// Remove the callback registered under `token`. Tokens of an already
    /// replaced registration are ignored.
    fn detach_rx_callback(&mut self, token: Subscription);
}
