//! Metrics collector: the ingestion state machine
//!
//! [`Espem`] owns the meter producer and the shared sample storage. While the
//! collector is [`CollectorState::Running`] a callback registered on the
//! producer copies every fresh reading into all tiers; pausing or disabling
//! the collector releases that callback again.

use alloc::boxed::Box;
use alloc::rc::Rc;

use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::config::EspemConfig;
use crate::error::EspemError;
use crate::producer::{MeterProducer, RxEvent, Subscription};
use crate::storage::{DataStorage, SharedStorage};

/// Source of wall-clock time, seconds since epoch
pub trait Clock {
    fn now(&self) -> u32;
}

impl<F: Fn() -> u32> Clock for F {
    fn now(&self) -> u32 {
        self()
    }
}

/// Metrics collector state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollectorState {
    /// No ingestion, history purged
    #[default]
    Disabled = 0,
    /// Fresh readings are pushed into the store
    Running,
    /// No ingestion, history kept
    Paused,
}

impl From<u8> for CollectorState {
    /// Unknown values map to `Disabled`
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Paused,
            _ => Self::Disabled,
        }
    }
}

impl From<CollectorState> for u8 {
    fn from(value: CollectorState) -> Self {
        value as u8
    }
}

/// Energy monitor: meter producer plus time-series storage
pub struct Espem<P: MeterProducer, C: Clock> {
    pz: Option<P>,
    ds: SharedStorage<P::Metrics>,
    clock: C,
    ts_state: CollectorState,
    subscription: Option<Subscription>,
}

impl<P: MeterProducer, C: Clock> Espem<P, C> {
    /// Monitor without a meter, using the default tier layout
    pub fn new(clock: C) -> Self {
        Self::with_storage(DataStorage::default(), clock)
    }

    pub fn with_storage(ds: DataStorage<P::Metrics>, clock: C) -> Self {
        Self {
            pz: None,
            ds: ds.into_shared(),
            clock,
            ts_state: CollectorState::Disabled,
            subscription: None,
        }
    }

    /// Bring the meter up on `port`.
    ///
    /// Idempotent: if a meter already exists only its port is swapped (see
    /// [`Espem::rebind`]); otherwise `make_meter` creates it and polling is
    /// switched on.
    pub fn begin(&mut self, port: P::Port, make_meter: impl FnOnce() -> P) {
        if self.pz.is_some() {
            // Cannot fail with a meter present
            let _ = self.rebind(port);
            return;
        }

        let mut pz = make_meter();
        pz.attach_port(port);
        if pz.autopoll(true) {
            info!("Autopolling enabled");
        } else {
            warn!("Sorry, can't autopoll somehow :(");
        }
        self.pz = Some(pz);
    }

    /// Swap the meter's transport, dropping the old one
    pub fn rebind(&mut self, port: P::Port) -> Result<(), EspemError> {
        let pz = self.pz.as_mut().ok_or(EspemError::NoMeter)?;
        if pz.detach_port().is_some() {
            debug!("Released previous meter port");
        }
        pz.attach_port(port);
        Ok(())
    }

    pub fn meter(&self) -> Option<&P> {
        self.pz.as_ref()
    }

    pub fn meter_mut(&mut self) -> Option<&mut P> {
        self.pz.as_mut()
    }

    /// Switch meter polling, false without a meter
    pub fn meter_polling(&mut self, active: bool) -> bool {
        self.pz.as_mut().is_some_and(|pz| pz.autopoll(active))
    }

    pub fn is_meter_polling(&self) -> bool {
        self.pz.as_ref().is_some_and(P::is_autopolling)
    }

    pub fn collector_state(&self) -> CollectorState {
        self.ts_state
    }

    pub fn storage(&self) -> &SharedStorage<P::Metrics> {
        &self.ds
    }

    pub fn set_energy_offset(&self, offset: i32) {
        self.ds.lock(|ds| ds.borrow_mut().set_energy_offset(offset));
    }

    pub fn energy_offset(&self) -> i32 {
        self.ds.lock(|ds| ds.borrow().energy_offset())
    }

    /// Number of samples in tier `id`, `None` for an unknown tier
    pub fn tier_size(&self, id: u8) -> Option<usize> {
        self.ds.lock(|ds| ds.borrow().size(id))
    }

    /// Wipe history and rebuild the tiers from the configured layout
    pub fn reset_storage(&self) -> Result<(), EspemError> {
        let now = self.clock.now();
        self.ds.lock(|ds| ds.borrow_mut().reset(now))?;
        Ok(())
    }

    /// Take over tier layout and energy offset from `cfg`.
    ///
    /// The new layout is applied on the next reset. A rejected layout leaves
    /// the current one in place; the offset is taken over either way.
    pub fn apply_config(&self, cfg: &EspemConfig) -> Result<(), EspemError> {
        self.ds.lock(|ds| {
            let mut ds = ds.borrow_mut();
            ds.set_energy_offset(cfg.energy_offset);
            ds.configure(&cfg.tiers)
        })?;
        Ok(())
    }

    fn detach_collector(&mut self) {
        if let (Some(pz), Some(token)) = (self.pz.as_mut(), self.subscription.take()) {
            pz.detach_rx_callback(token);
        }
    }
}

impl<P, C> Espem<P, C>
where
    P: MeterProducer,
    C: Clock + Clone + 'static,
{
    /// Drive the collector state machine, returns the resulting state.
    ///
    /// Without a meter the collector is always `Disabled`.
    pub fn set_collector_state(&mut self, state: CollectorState) -> CollectorState {
        if self.pz.is_none() {
            self.subscription = None;
            self.ts_state = CollectorState::Disabled;
            return self.ts_state;
        }

        match state {
            CollectorState::Running => {
                if self.ts_state == CollectorState::Running {
                    return self.ts_state;
                }

                let empty = self.ds.lock(|ds| ds.borrow().total_capacity() == 0);
                if empty {
                    // Never initialized: build the tiers first
                    if let Err(e) = self.reset_storage() {
                        error!("TimeSeries DB setup incomplete: {}", e);
                    }
                }

                self.attach_collector();
                self.ts_state = CollectorState::Running;
            }
            CollectorState::Paused => {
                self.detach_collector();
                self.ts_state = CollectorState::Paused;
            }
            CollectorState::Disabled => {
                self.detach_collector();
                self.ds.lock(|ds| ds.borrow_mut().purge());
                self.ts_state = CollectorState::Disabled;
            }
        }

        info!("Metrics collector: {:?}", self.ts_state);
        self.ts_state
    }

    fn attach_collector(&mut self) {
        // Drop any leftover registration before taking a new one
        self.detach_collector();

        let Some(pz) = self.pz.as_mut() else {
            return;
        };

        let ds = Rc::clone(&self.ds);
        let clock = self.clock.clone();
        let token = pz.attach_rx_callback(Box::new(move |ev: &RxEvent<'_, P::Metrics>| {
            if !ev.stale {
                let now = clock.now();
                ds.lock(|ds| ds.borrow_mut().push(*ev.metrics, now));
            }

            if let Some(m) = ev.message {
                trace!(
                    "RX from {}: addr {:#04x} cmd {:#04x} valid {} len {}",
                    ev.source,
                    m.addr,
                    m.cmd,
                    m.valid,
                    m.data.len()
                );
            }
        }));
        self.subscription = Some(token);
    }
}

impl<P: MeterProducer, C: Clock> Drop for Espem<P, C> {
    fn drop(&mut self) {
        self.detach_collector();
    }
}
