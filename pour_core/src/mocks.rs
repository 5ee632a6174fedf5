//! Scriptable in-memory bus for tests and dry runs.
//!
//! `MockBus` keeps a real relay register and records every relay write;
//! scale reads replay a script of readings (the last entry repeats once
//! the script runs out). A cloned [`MockHandle`] inspects and steers the bus
//! after it has been handed to a `SharedBus`.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pour_traits::{Bus, BusResult, DeviceMap};

use crate::relay::ALL_OFF;

/// One scripted scale response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Grams(f32),
    /// Transient transport error.
    Fail,
    /// Transaction timeout.
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("mock device 0x{0:02x} offline")]
    Offline(u8),
    #[error("scripted read failure")]
    Scripted,
    #[error("mock bus timeout")]
    Timeout,
}

#[derive(Debug)]
struct MockState {
    relay: u8,
    relay_writes: Vec<u8>,
    readings: VecDeque<Reading>,
    last: Reading,
    weight_reads: usize,
    tares: usize,
    relay_offline: bool,
    relay_read_fails: bool,
    scale_offline: bool,
    closed: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            relay: ALL_OFF,
            relay_writes: Vec::new(),
            readings: VecDeque::new(),
            last: Reading::Grams(0.0),
            weight_reads: 0,
            tares: 0,
            relay_offline: false,
            relay_read_fails: false,
            scale_offline: false,
            closed: false,
        }
    }
}

#[derive(Debug)]
pub struct MockBus {
    devices: DeviceMap,
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBus {
    pub fn new() -> Self {
        Self {
            devices: DeviceMap::default(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn with_devices(mut self, devices: DeviceMap) -> Self {
        self.devices = devices;
        self
    }

    /// Script scale responses in order.
    pub fn with_readings(self, readings: impl IntoIterator<Item = Reading>) -> Self {
        lock(&self.state).readings.extend(readings);
        self
    }

    /// Script successful weight samples in order.
    pub fn with_weights(self, grams: impl IntoIterator<Item = f32>) -> Self {
        self.with_readings(grams.into_iter().map(Reading::Grams))
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl MockHandle {
    pub fn relay_register(&self) -> u8 {
        lock(&self.state).relay
    }

    /// Every value written to the relay register, oldest first.
    pub fn relay_writes(&self) -> Vec<u8> {
        lock(&self.state).relay_writes.clone()
    }

    pub fn tare_count(&self) -> usize {
        lock(&self.state).tares
    }

    pub fn weight_reads(&self) -> usize {
        lock(&self.state).weight_reads
    }

    pub fn push_readings(&self, readings: impl IntoIterator<Item = Reading>) {
        lock(&self.state).readings.extend(readings);
    }

    /// Make the relay board stop answering entirely.
    pub fn set_relay_offline(&self, offline: bool) {
        lock(&self.state).relay_offline = offline;
    }

    /// Fail relay reads while still accepting writes.
    pub fn set_relay_read_fails(&self, fails: bool) {
        lock(&self.state).relay_read_fails = fails;
    }

    pub fn set_scale_offline(&self, offline: bool) {
        lock(&self.state).scale_offline = offline;
    }

    /// Force the register behind the driver's back.
    pub fn poke_relay(&self, value: u8) {
        lock(&self.state).relay = value;
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

impl Bus for MockBus {
    fn read_byte(&mut self, address: u8) -> BusResult<u8> {
        let s = lock(&self.state);
        if address == self.devices.relay_address && !s.relay_offline {
            if s.relay_read_fails {
                return Err(Box::new(MockError::Scripted));
            }
            Ok(s.relay)
        } else if address == self.devices.scale_address && !s.scale_offline {
            Ok(0)
        } else {
            Err(Box::new(MockError::Offline(address)))
        }
    }

    fn write_byte(&mut self, address: u8, value: u8) -> BusResult<()> {
        let mut s = lock(&self.state);
        if address != self.devices.relay_address || s.relay_offline {
            return Err(Box::new(MockError::Offline(address)));
        }
        s.relay = value;
        s.relay_writes.push(value);
        Ok(())
    }

    fn read_block(&mut self, address: u8, register: u8, len: usize) -> BusResult<Vec<u8>> {
        let mut s = lock(&self.state);
        if address != self.devices.scale_address
            || register != self.devices.weight_register
            || s.scale_offline
        {
            return Err(Box::new(MockError::Offline(address)));
        }
        s.weight_reads += 1;
        let reading = match s.readings.pop_front() {
            Some(r) => {
                s.last = r;
                r
            }
            None => s.last,
        };
        match reading {
            Reading::Grams(g) => Ok(g
                .to_le_bytes()
                .into_iter()
                .chain(std::iter::repeat(0))
                .take(len)
                .collect()),
            Reading::Fail => Err(Box::new(MockError::Scripted)),
            Reading::Timeout => Err(Box::new(MockError::Timeout)),
        }
    }

    fn write_block(&mut self, address: u8, register: u8, bytes: &[u8]) -> BusResult<()> {
        let mut s = lock(&self.state);
        if address != self.devices.scale_address
            || register != self.devices.tare_register
            || s.scale_offline
        {
            return Err(Box::new(MockError::Offline(address)));
        }
        if bytes.first() == Some(&0x01) {
            s.tares += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> BusResult<()> {
        lock(&self.state).closed = true;
        Ok(())
    }
}
