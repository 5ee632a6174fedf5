//! 8-channel relay board driver.
//!
//! Register layout: bit `i` drives pump `i + 1`; a cleared bit energizes the
//! relay. `0xFF` is the safe state. Every change to a single pump is a
//! read-modify-write of the whole register, so bits for other pumps are
//! carried over exactly.
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::bus::SharedBus;
use crate::error::{PourError, PourResult};

/// Number of relay channels / pump slots.
pub const PUMP_COUNT: u8 = 8;
/// Register value with every relay de-energized.
pub const ALL_OFF: u8 = 0xFF;

/// Bit mask for a 1-based pump number.
pub fn pump_bit(pump: u8) -> PourResult<u8> {
    if (1..=PUMP_COUNT).contains(&pump) {
        Ok(1 << (pump - 1))
    } else {
        Err(PourError::InvalidPump(pump))
    }
}

/// Register value after switching exactly one pump.
pub fn apply(register: u8, pump: u8, on: bool) -> PourResult<u8> {
    let bit = pump_bit(pump)?;
    Ok(if on { register & !bit } else { register | bit })
}

/// Pumps energized in a register value.
pub fn energized(register: u8) -> BTreeSet<u8> {
    (1..=PUMP_COUNT)
        .filter(|p| register & (1 << (p - 1)) == 0)
        .collect()
}

#[derive(Debug, Clone)]
pub struct RelayDriver {
    bus: SharedBus,
    // Also serializes read-modify-write cycles across clones.
    last_known: Arc<Mutex<u8>>,
}

impl RelayDriver {
    pub fn new(bus: SharedBus) -> Self {
        Self {
            bus,
            last_known: Arc::new(Mutex::new(ALL_OFF)),
        }
    }

    fn address(&self) -> u8 {
        self.bus.devices().relay_address
    }

    /// Energize (`on = true`) or de-energize one pump, leaving the others untouched.
    ///
    /// Returns the register value written.
    pub fn set_pump(&self, pump: u8, on: bool) -> PourResult<u8> {
        pump_bit(pump)?;
        let addr = self.address();
        let mut last = self
            .last_known
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let current = match self.bus.with(|b| b.read_byte(addr)) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(pump, error = %e, fallback = *last, "relay read failed, using last known state");
                *last
            }
        };
        let next = apply(current, pump, on)?;
        self.bus.with(|b| b.write_byte(addr, next))?;
        *last = next;
        tracing::debug!(pump, on, from = current, to = next, "relay write");
        Ok(next)
    }

    /// De-energize every pump. Does not depend on the current register.
    pub fn all_off(&self) -> PourResult<()> {
        let addr = self.address();
        let mut last = self
            .last_known
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *last = ALL_OFF;
        self.bus.with(|b| b.write_byte(addr, ALL_OFF))?;
        tracing::debug!("relay all off");
        Ok(())
    }

    /// Current register, or `None` when the board does not answer.
    pub fn read_state(&self) -> Option<u8> {
        let addr = self.address();
        match self.bus.with(|b| b.read_byte(addr)) {
            Ok(v) => {
                *self
                    .last_known
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = v;
                Some(v)
            }
            Err(e) => {
                tracing::debug!(error = %e, "relay unreadable");
                None
            }
        }
    }

    /// Last register value written or read.
    pub fn last_known(&self) -> u8 {
        *self
            .last_known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 0b0000_0001)]
    #[case(4, 0b0000_1000)]
    #[case(8, 0b1000_0000)]
    fn pump_number_maps_to_bit(#[case] pump: u8, #[case] bit: u8) {
        assert_eq!(pump_bit(pump).unwrap(), bit);
    }

    #[rstest]
    #[case(0)]
    #[case(9)]
    fn out_of_range_pump_is_rejected(#[case] pump: u8) {
        assert_eq!(pump_bit(pump), Err(PourError::InvalidPump(pump)));
    }

    #[test]
    fn apply_touches_one_bit() {
        assert_eq!(apply(ALL_OFF, 1, true).unwrap(), 0xFE);
        assert_eq!(apply(0xFE, 3, true).unwrap(), 0xFA);
        assert_eq!(apply(0xFA, 1, false).unwrap(), 0xFB);
        assert_eq!(apply(0xFB, 1, false).unwrap(), 0xFB);
    }

    #[test]
    fn energized_lists_cleared_bits() {
        assert!(energized(ALL_OFF).is_empty());
        assert_eq!(energized(0xFA).into_iter().collect::<Vec<_>>(), vec![1, 3]);
    }
}
