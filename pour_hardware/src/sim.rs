//! In-process stand-in for the relay board and the scale.
//!
//! Used whenever the physical bus cannot be opened. The simulated scale
//! integrates a constant flow while any relay bit is energized, so a
//! simulated pour converges on its target the same way a real one does.
use std::time::Instant;

use pour_traits::{Bus, BusResult, DeviceMap};
use tracing::{debug, trace};

use crate::error::HwError;

/// Default simulated pump throughput in grams per second.
pub const DEFAULT_FLOW_G_PER_S: f32 = 20.0;

/// Env override for the simulated flow (grams per second).
pub const ENV_FLOW: &str = "POUR_SIM_FLOW_G_PER_S";
/// Env switch listing simulated devices that do not answer: "relay", "scale" or both.
pub const ENV_OFFLINE: &str = "POUR_SIM_OFFLINE";

// Small fixed noise pattern so idle readings hover around zero.
const JITTER_G: [f32; 6] = [0.0, 0.03, -0.02, 0.01, -0.03, 0.02];

#[derive(Debug)]
pub struct SimulatedBus {
    devices: DeviceMap,
    relay: u8,
    net_g: f32,
    flow_g_per_s: f32,
    last_tick: Instant,
    jitter_idx: usize,
    relay_offline: bool,
    scale_offline: bool,
}

impl SimulatedBus {
    pub fn new(devices: DeviceMap) -> Self {
        Self {
            devices,
            relay: 0xFF,
            net_g: 0.0,
            flow_g_per_s: DEFAULT_FLOW_G_PER_S,
            last_tick: Instant::now(),
            jitter_idx: 0,
            relay_offline: false,
            scale_offline: false,
        }
    }

    /// Build from `POUR_SIM_*` environment overrides.
    pub fn from_env(devices: DeviceMap) -> Self {
        let mut bus = Self::new(devices);
        if let Some(flow) = std::env::var(ENV_FLOW)
            .ok()
            .and_then(|s| s.trim().parse::<f32>().ok())
            .filter(|f| f.is_finite() && *f >= 0.0)
        {
            bus.flow_g_per_s = flow;
        }
        if let Ok(list) = std::env::var(ENV_OFFLINE) {
            for dev in list.split(',').map(str::trim) {
                match dev {
                    "relay" => bus.relay_offline = true,
                    "scale" => bus.scale_offline = true,
                    _ => {}
                }
            }
        }
        debug!(
            flow_g_per_s = bus.flow_g_per_s,
            relay_offline = bus.relay_offline,
            scale_offline = bus.scale_offline,
            "simulated bus ready"
        );
        bus
    }

    pub fn with_flow(mut self, flow_g_per_s: f32) -> Self {
        self.flow_g_per_s = flow_g_per_s.max(0.0);
        self
    }

    pub fn with_relay_offline(mut self, offline: bool) -> Self {
        self.relay_offline = offline;
        self
    }

    pub fn with_scale_offline(mut self, offline: bool) -> Self {
        self.scale_offline = offline;
        self
    }

    /// Current simulated relay register.
    pub fn relay_register(&self) -> u8 {
        self.relay
    }

    // Integrate flow for the time elapsed since the last bus access.
    fn advance(&mut self) {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last_tick).as_secs_f32();
        self.last_tick = now;
        let energized = (!self.relay).count_ones();
        if energized > 0 {
            self.net_g += self.flow_g_per_s * dt * energized as f32;
        }
    }

    fn next_jitter(&mut self) -> f32 {
        let j = JITTER_G[self.jitter_idx % JITTER_G.len()];
        self.jitter_idx = self.jitter_idx.wrapping_add(1);
        j
    }

    fn is_relay(&self, address: u8) -> bool {
        address == self.devices.relay_address && !self.relay_offline
    }

    fn is_scale(&self, address: u8) -> bool {
        address == self.devices.scale_address && !self.scale_offline
    }
}

impl Bus for SimulatedBus {
    fn read_byte(&mut self, address: u8) -> BusResult<u8> {
        self.advance();
        if self.is_relay(address) {
            Ok(self.relay)
        } else if self.is_scale(address) {
            Ok(0)
        } else {
            Err(Box::new(HwError::Nack { address }))
        }
    }

    fn write_byte(&mut self, address: u8, value: u8) -> BusResult<()> {
        if !self.is_relay(address) {
            return Err(Box::new(HwError::Nack { address }));
        }
        // Account flow under the old register before switching.
        self.advance();
        trace!(from = self.relay, to = value, "sim relay write");
        self.relay = value;
        Ok(())
    }

    fn read_block(&mut self, address: u8, register: u8, len: usize) -> BusResult<Vec<u8>> {
        if !self.is_scale(address) || register != self.devices.weight_register {
            return Err(Box::new(HwError::Nack { address }));
        }
        self.advance();
        let w = self.net_g + self.next_jitter();
        trace!(weight_g = w, "sim scale read");
        Ok(w.to_le_bytes()
            .into_iter()
            .chain(std::iter::repeat(0))
            .take(len)
            .collect())
    }

    fn write_block(&mut self, address: u8, register: u8, bytes: &[u8]) -> BusResult<()> {
        if !self.is_scale(address) || register != self.devices.tare_register {
            return Err(Box::new(HwError::Nack { address }));
        }
        self.advance();
        if bytes.first() == Some(&0x01) {
            debug!(previous_g = self.net_g, "sim scale tared");
            self.net_g = 0.0;
        }
        Ok(())
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight(bus: &mut SimulatedBus) -> f32 {
        let d = DeviceMap::default();
        let b = bus.read_block(d.scale_address, d.weight_register, 4).unwrap();
        f32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    #[test]
    fn idle_scale_hovers_near_zero() {
        let mut bus = SimulatedBus::new(DeviceMap::default());
        for _ in 0..12 {
            assert!(weight(&mut bus).abs() < 0.05);
        }
    }

    #[test]
    fn energized_relay_drives_weight_up_and_tare_resets() {
        let d = DeviceMap::default();
        let mut bus = SimulatedBus::new(d).with_flow(1000.0);
        bus.write_byte(d.relay_address, 0xFE).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        bus.write_byte(d.relay_address, 0xFF).unwrap();
        assert!(weight(&mut bus) > 5.0);

        bus.write_block(d.scale_address, d.tare_register, &[0x01])
            .unwrap();
        assert!(weight(&mut bus).abs() < 0.05);
    }

    #[test]
    fn offline_devices_nack() {
        let d = DeviceMap::default();
        let mut bus = SimulatedBus::new(d)
            .with_relay_offline(true)
            .with_scale_offline(true);
        assert!(bus.read_byte(d.relay_address).is_err());
        assert!(bus.read_byte(d.scale_address).is_err());
        assert!(bus.read_block(d.scale_address, d.weight_register, 4).is_err());
    }
}
