//! Bus implementations for the pour controller.
//!
//! `open_bus` tries the physical I2C adapter first (feature `hardware`,
//! Linux only) and falls back to [`SimulatedBus`] when it cannot be opened.
pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod i2c;
pub mod sim;

use std::time::Duration;

use pour_traits::{Bus, DeviceMap};

pub use sim::SimulatedBus;

/// Which transport `open_bus` ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusMode {
    Hardware,
    Simulated,
}

impl BusMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BusMode::Hardware => "hardware",
            BusMode::Simulated => "simulated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BusOptions {
    /// I2C adapter number (`/dev/i2c-N`).
    pub device: u8,
    /// Upper bound for a single bus transaction.
    pub op_timeout: Duration,
    /// Skip the hardware attempt entirely.
    pub simulate: bool,
    pub devices: DeviceMap,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            device: 1,
            op_timeout: Duration::from_millis(3000),
            simulate: false,
            devices: DeviceMap::default(),
        }
    }
}

/// Open the bus, never failing: an unavailable adapter yields a simulated bus.
pub fn open_bus(opts: &BusOptions) -> (Box<dyn Bus + Send>, BusMode) {
    if !opts.simulate
        && let Some(bus) = open_hardware(opts)
    {
        return (bus, BusMode::Hardware);
    }
    tracing::info!("using simulated bus");
    (
        Box::new(SimulatedBus::from_env(opts.devices)),
        BusMode::Simulated,
    )
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn open_hardware(opts: &BusOptions) -> Option<Box<dyn Bus + Send>> {
    match i2c::I2cBus::open(opts.device, opts.op_timeout) {
        Ok(bus) => {
            tracing::info!(device = opts.device, "i2c bus opened");
            Some(Box::new(bus))
        }
        Err(e) => {
            tracing::warn!(error = %e, device = opts.device, "i2c bus unavailable, falling back to simulation");
            None
        }
    }
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn open_hardware(_opts: &BusOptions) -> Option<Box<dyn Bus + Send>> {
    tracing::warn!("built without hardware support, falling back to simulation");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulate_flag_skips_hardware() {
        let opts = BusOptions {
            simulate: true,
            ..BusOptions::default()
        };
        let (bus, mode) = open_bus(&opts);
        assert_eq!(mode, BusMode::Simulated);
        assert!(bus.is_simulated());
    }
}
