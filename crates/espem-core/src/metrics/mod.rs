//! Meter sample types
//!
//! A sample is a plain copyable record of raw fixed-point register values as
//! decoded from a PZEM power meter. The [`Metrics`] trait is the capability
//! set shared by every meter model: which quantities it measures and how to
//! turn each raw value into a normalized float.

mod pz003;
mod pz004;

pub use pz003::Pz003Metrics;
pub use pz004::Pz004Metrics;

/// A measured quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    /// Volts
    Voltage,
    /// Amperes
    Current,
    /// Watts
    Power,
    /// Watt-hours, cumulative counter
    Energy,
    /// Hertz
    Frequency,
    /// Power factor, 0..1
    PowerFactor,
}

impl Quantity {
    /// Key used for this quantity in JSON output
    pub const fn json_key(self) -> &'static str {
        match self {
            Self::Voltage => "U",
            Self::Current => "I",
            Self::Power => "P",
            Self::Energy => "W",
            Self::Frequency => "hz",
            Self::PowerFactor => "pF",
        }
    }

    /// Decimal places in a history record
    pub const fn sample_precision(self) -> usize {
        match self {
            Self::Voltage | Self::Current | Self::PowerFactor => 2,
            Self::Power | Self::Energy => 0,
            Self::Frequency => 1,
        }
    }

    /// Decimal places in the latest-reading object
    pub const fn latest_precision(self) -> usize {
        match self {
            Self::Voltage | Self::Frequency => 1,
            Self::Current | Self::PowerFactor => 2,
            Self::Power | Self::Energy => 0,
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            Self::Voltage => "V",
            Self::Current => "A",
            Self::Power => "W",
            Self::Energy => "Wh",
            Self::Frequency => "Hz",
            Self::PowerFactor => "",
        }
    }
}

/// Capability set of one meter model.
///
/// Implementors are small `Copy` records; the time-series store keeps them by
/// value and never looks inside. Everything that renders a sample goes through
/// [`Metrics::as_float`] driven by [`Metrics::QUANTITIES`], so a model without
/// frequency or power factor simply leaves them out of the list.
pub trait Metrics: Copy + Default + core::fmt::Debug + 'static {
    /// Quantities this model measures, in output order
    const QUANTITIES: &'static [Quantity];

    /// Normalized value of `q`, or `None` if the model lacks it
    fn as_float(&self, q: Quantity) -> Option<f32>;

    /// Raw register value of `q`, or `None` if the model lacks it
    fn raw(&self, q: Quantity) -> Option<u32>;

    /// Whether this model measures `q`
    fn has(q: Quantity) -> bool {
        Self::QUANTITIES.contains(&q)
    }

    /// Value as reported to clients, with the energy offset (Wh) applied to
    /// [`Quantity::Energy`].
    ///
    /// Energy is taken from the raw counter so that every `u32` reading plus
    /// any `i32` offset stays exact.
    fn calibrated(&self, q: Quantity, nrg_offset: i32) -> Option<f64> {
        match q {
            Quantity::Energy => self
                .raw(q)
                .map(|wh| f64::from(wh) + f64::from(nrg_offset)),
            _ => self.as_float(q).map(f64::from),
        }
    }
}

/// Combine a low/high register pair into a 32-bit value (PZEM sends low word first)
#[inline]
pub(crate) fn join_words(lo: u16, hi: u16) -> u32 {
    (u32::from(hi) << 16) | u32::from(lo)
}
