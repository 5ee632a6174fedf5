//! Pump bank: the relay driver plus the authoritative set of running pumps.
//!
//! Timed activations own their pump through a token. Any later start, stop
//! or broadcast stop of that pump revokes the token, so a timer that wakes
//! up late never switches off a pump someone else has since taken over.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use pour_traits::SharedClock;

use crate::error::PourResult;
use crate::relay::{RelayDriver, pump_bit};

#[derive(Clone)]
pub struct PumpBank {
    relay: RelayDriver,
    active: Arc<Mutex<BTreeSet<u8>>>,
    // pump -> token of the timed activation that may still switch it off
    timers: Arc<Mutex<BTreeMap<u8, u64>>>,
    next_token: Arc<AtomicU64>,
    clock: SharedClock,
}

impl std::fmt::Debug for PumpBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PumpBank")
            .field("relay", &self.relay)
            .field("active", &self.active())
            .finish_non_exhaustive()
    }
}

impl PumpBank {
    pub fn new(relay: RelayDriver, clock: SharedClock) -> Self {
        Self {
            relay,
            active: Arc::new(Mutex::new(BTreeSet::new())),
            timers: Arc::new(Mutex::new(BTreeMap::new())),
            next_token: Arc::new(AtomicU64::new(0)),
            clock,
        }
    }

    fn active_set(&self) -> MutexGuard<'_, BTreeSet<u8>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timers(&self) -> MutexGuard<'_, BTreeMap<u8, u64>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn relay(&self) -> &RelayDriver {
        &self.relay
    }

    pub fn start(&self, pump: u8) -> PourResult<()> {
        self.timers().remove(&pump);
        self.relay.set_pump(pump, true)?;
        self.active_set().insert(pump);
        tracing::info!(pump, "pump on");
        Ok(())
    }

    /// De-energize one pump. It leaves the active set even if the write fails.
    pub fn stop(&self, pump: u8) -> PourResult<()> {
        pump_bit(pump)?;
        self.timers().remove(&pump);
        self.active_set().remove(&pump);
        self.relay.set_pump(pump, false)?;
        tracing::info!(pump, "pump off");
        Ok(())
    }

    /// Broadcast safety stop: all eight relays off regardless of bookkeeping.
    pub fn all_off(&self) -> PourResult<()> {
        self.timers().clear();
        self.active_set().clear();
        self.relay.all_off()
    }

    /// Pumps currently believed to be running.
    pub fn active(&self) -> BTreeSet<u8> {
        self.active_set().clone()
    }

    /// Run a pump for `duration` on a background thread.
    ///
    /// The pump is energized before this returns; the handle may be dropped.
    /// When the time is up the pump is switched off only if this activation
    /// still owns it.
    pub fn activate_for(&self, pump: u8, duration: Duration) -> PourResult<JoinHandle<()>> {
        self.start(pump)?;
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.timers().insert(pump, token);
        let bank = self.clone();
        Ok(std::thread::spawn(move || {
            bank.clock.sleep(duration);
            // Held across the stop so no start can slip in between.
            let mut timers = bank.timers();
            if timers.get(&pump) != Some(&token) {
                tracing::debug!(pump, "timed activation superseded, leaving pump alone");
                return;
            }
            timers.remove(&pump);
            bank.active_set().remove(&pump);
            match bank.relay.set_pump(pump, false) {
                Ok(_) => tracing::info!(pump, "pump off"),
                Err(e) => tracing::warn!(pump, error = %e, "timed activation: stop failed"),
            }
        }))
    }
}
