//! Seam traits shared by the pour controller crates.
//!
//! `Bus` is the only way any component touches the relay board or the
//! scale; `Clock` is the only way any component waits.
pub mod clock;

pub use clock::{Clock, MonotonicClock, SharedClock};

/// Error type crossing the `Bus` boundary. Implementations box their own
/// typed errors; the core maps them back with a downcast.
pub type BusError = Box<dyn std::error::Error + Send + Sync>;

pub type BusResult<T> = Result<T, BusError>;

/// Raw access to peripherals on a shared two-wire bus (I2C/SMBus style).
///
/// All calls are blocking and bounded by the implementation's own
/// per-transaction timeout.
pub trait Bus {
    /// Receive a single byte from the device at `address` (no register).
    fn read_byte(&mut self, address: u8) -> BusResult<u8>;

    /// Send a single byte to the device at `address` (no register).
    fn write_byte(&mut self, address: u8, value: u8) -> BusResult<()>;

    /// Read `len` bytes starting at `register`.
    fn read_block(&mut self, address: u8, register: u8, len: usize) -> BusResult<Vec<u8>>;

    /// Write `bytes` starting at `register`.
    fn write_block(&mut self, address: u8, register: u8, bytes: &[u8]) -> BusResult<()>;

    /// Release the underlying channel. Further calls may fail.
    fn close(&mut self) -> BusResult<()> {
        Ok(())
    }

    /// True when this bus fabricates device responses instead of talking to hardware.
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Addresses and registers of the two peripherals on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMap {
    /// PCF8574-style 8-bit relay expander. bit i = pump i+1, 0 = energized.
    pub relay_address: u8,
    /// Digital scale.
    pub scale_address: u8,
    /// 4-byte little-endian f32 weight in grams.
    pub weight_register: u8,
    /// Writing 0x01 here zeroes the scale.
    pub tare_register: u8,
}

impl Default for DeviceMap {
    fn default() -> Self {
        Self {
            relay_address: 0x20,
            scale_address: 0x26,
            weight_register: 0x10,
            tare_register: 0x50,
        }
    }
}
