//! In-RAM multi-resolution sample history
//!
//! Samples are kept in a set of fixed-capacity ring buffers ("tiers"), each
//! expecting one sample per `interval` seconds. Timestamps are not stored per
//! sample; they are derived from the slot position and the tier interval.

pub mod container;
pub mod data;
pub mod tier;

pub use container::TieredStore;
pub use data::{DataStorage, SharedStorage};
pub use tier::{Cursor, Tier, TierIter};

use serde::{Deserialize, Serialize};

/// Maximum number of tiers in one store
pub const MAX_TIERS: usize = 8;

/// Maximum tier label length in bytes
pub const LABEL_LEN: usize = 16;

pub type TierLabel = heapless::String<LABEL_LEN>;

pub const TS_T1_CNT: usize = 900;
pub const TS_T1_INTERVAL: u32 = 1;
pub const TS_T2_CNT: usize = 1000;
pub const TS_T2_INTERVAL: u32 = 15;
pub const TS_T3_CNT: usize = 1000;
pub const TS_T3_INTERVAL: u32 = 300;

/// Configuration of a single tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSpec {
    /// Tier identifier used for lookups
    pub id: u8,
    /// Maximum number of samples held
    pub capacity: usize,
    /// Expected seconds between samples
    pub interval: u32,
    /// Human readable name
    pub label: TierLabel,
}

impl TierSpec {
    /// Create a spec, truncating `label` to [`LABEL_LEN`] bytes
    pub fn new(id: u8, capacity: usize, interval: u32, label: &str) -> Self {
        Self {
            id,
            capacity,
            interval,
            label: truncated_label(label),
        }
    }
}

/// The stock three-tier layout: 15 min @ 1 s, ~4 h @ 15 s, ~3.5 days @ 5 min
pub fn default_tiers() -> heapless::Vec<TierSpec, MAX_TIERS> {
    let mut specs = heapless::Vec::new();
    // Three entries always fit into MAX_TIERS
    let _ = specs.push(TierSpec::new(1, TS_T1_CNT, TS_T1_INTERVAL, "Tier 1"));
    let _ = specs.push(TierSpec::new(2, TS_T2_CNT, TS_T2_INTERVAL, "Tier 2"));
    let _ = specs.push(TierSpec::new(3, TS_T3_CNT, TS_T3_INTERVAL, "Tier 3"));
    specs
}

fn truncated_label(label: &str) -> TierLabel {
    let mut out = TierLabel::new();
    for c in label.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
