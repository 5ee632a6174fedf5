//! Linux I2C transport via `rppal`.
use std::time::Duration;

use pour_traits::{Bus, BusResult};
use rppal::i2c::I2c;
use tracing::{trace, warn};

use crate::error::{HwError, Result};

impl From<rppal::i2c::Error> for HwError {
    fn from(e: rppal::i2c::Error) -> Self {
        match e {
            rppal::i2c::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
                HwError::Timeout
            }
            rppal::i2c::Error::Io(io) => HwError::Io(io),
            other => HwError::I2c(other.to_string()),
        }
    }
}

pub struct I2cBus {
    i2c: Option<I2c>,
    // Last slave address programmed into the adapter
    selected: Option<u8>,
}

impl I2cBus {
    /// Open `/dev/i2c-<device>` and apply the per-transaction timeout.
    pub fn open(device: u8, timeout: Duration) -> Result<Self> {
        let i2c = I2c::with_bus(device)?;
        let ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        if let Err(e) = i2c.set_timeout(ms) {
            // Not every adapter supports it; the kernel default applies then.
            warn!(error = %e, timeout_ms = ms, "i2c adapter rejected timeout");
        }
        Ok(Self {
            i2c: Some(i2c),
            selected: None,
        })
    }

    fn select(&mut self, address: u8) -> Result<&mut I2c> {
        let i2c = self.i2c.as_mut().ok_or(HwError::Closed)?;
        if self.selected != Some(address) {
            i2c.set_slave_address(u16::from(address))?;
            self.selected = Some(address);
        }
        Ok(i2c)
    }
}

impl Bus for I2cBus {
    fn read_byte(&mut self, address: u8) -> BusResult<u8> {
        let i2c = self.select(address)?;
        let mut buf = [0u8; 1];
        i2c.read(&mut buf).map_err(HwError::from)?;
        trace!(address, value = buf[0], "i2c read byte");
        Ok(buf[0])
    }

    fn write_byte(&mut self, address: u8, value: u8) -> BusResult<()> {
        let i2c = self.select(address)?;
        i2c.write(&[value]).map_err(HwError::from)?;
        trace!(address, value, "i2c write byte");
        Ok(())
    }

    fn read_block(&mut self, address: u8, register: u8, len: usize) -> BusResult<Vec<u8>> {
        let i2c = self.select(address)?;
        let mut buf = vec![0u8; len];
        i2c.block_read(register, &mut buf).map_err(HwError::from)?;
        trace!(address, register, ?buf, "i2c block read");
        Ok(buf)
    }

    fn write_block(&mut self, address: u8, register: u8, bytes: &[u8]) -> BusResult<()> {
        let i2c = self.select(address)?;
        i2c.block_write(register, bytes).map_err(HwError::from)?;
        trace!(address, register, ?bytes, "i2c block write");
        Ok(())
    }

    fn close(&mut self) -> BusResult<()> {
        // Dropping the handle closes the device file.
        self.i2c = None;
        self.selected = None;
        Ok(())
    }
}
