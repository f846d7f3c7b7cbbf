//! Persisted monitor settings
//!
//! Where the blob lives (NVS, a file on flash) is up to the host; this module
//! only defines the settings and their `postcard` encoding.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::collector::CollectorState;
use crate::error::ConfigError;
use crate::publish::DEFAULT_WS_UPD_RATE;
use crate::storage::{MAX_TIERS, TierSpec, default_tiers};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EspemConfig {
    /// Tier layout applied on the next storage reset
    pub tiers: heapless::Vec<TierSpec, MAX_TIERS>,
    /// Energy offset in Wh added to every reported energy value
    pub energy_offset: i32,
    /// UI update period in seconds, 0 disables
    pub ui_rate: u8,
    /// Collector state to enter on boot
    pub collector: CollectorState,
    /// Poll the meter on boot
    pub poll: bool,
}

impl Default for EspemConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            energy_offset: 0,
            ui_rate: DEFAULT_WS_UPD_RATE,
            collector: CollectorState::Running,
            poll: true,
        }
    }
}

impl EspemConfig {
    pub fn to_vec(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(ConfigError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        postcard::from_bytes(bytes).map_err(ConfigError::Decode)
    }
}
