//! Shared, bounded-wait access to the bus.
//!
//! The relay driver, the scale driver, the status monitor and the periodic
//! feeds all talk through one `SharedBus`. Every transaction holds the lock
//! for exactly one bus call; waiting for the lock is bounded by the op
//! timeout so a wedged transaction surfaces as `PourError::Timeout`.
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

use pour_traits::{Bus, BusResult, DeviceMap};

use crate::error::{PourError, PourResult};
use crate::hw_error::map_hw_error;

const LOCK_RETRY: Duration = Duration::from_millis(1);

#[derive(Clone)]
pub struct SharedBus {
    inner: Arc<Mutex<Box<dyn Bus + Send>>>,
    devices: DeviceMap,
    op_timeout: Duration,
    simulated: bool,
}

impl std::fmt::Debug for SharedBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBus")
            .field("devices", &self.devices)
            .field("op_timeout", &self.op_timeout)
            .field("simulated", &self.simulated)
            .finish_non_exhaustive()
    }
}

impl SharedBus {
    pub fn new(bus: Box<dyn Bus + Send>, devices: DeviceMap, op_timeout: Duration) -> Self {
        let simulated = bus.is_simulated();
        Self {
            inner: Arc::new(Mutex::new(bus)),
            devices,
            op_timeout,
            simulated,
        }
    }

    pub fn devices(&self) -> DeviceMap {
        self.devices
    }

    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    /// Run one transaction against the bus.
    pub fn with<T>(
        &self,
        f: impl FnOnce(&mut (dyn Bus + Send)) -> BusResult<T>,
    ) -> PourResult<T> {
        let deadline = Instant::now() + self.op_timeout;
        loop {
            match self.inner.try_lock() {
                Ok(mut guard) => return f(&mut **guard).map_err(|e| map_hw_error(&*e)),
                Err(TryLockError::Poisoned(poisoned)) => {
                    // A panicking holder cannot leave the bus half-written; reuse it.
                    let mut guard = poisoned.into_inner();
                    return f(&mut **guard).map_err(|e| map_hw_error(&*e));
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        tracing::warn!(
                            timeout_ms = self.op_timeout.as_millis(),
                            "bus lock wait exceeded op timeout"
                        );
                        return Err(PourError::Timeout);
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
            }
        }
    }

    /// Single-byte read used as a liveness probe.
    pub fn probe(&self, address: u8) -> bool {
        match self.with(|b| b.read_byte(address)) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(address, error = %e, "probe failed");
                false
            }
        }
    }

    pub fn close(&self) -> PourResult<()> {
        self.with(|b| b.close())
    }
}
