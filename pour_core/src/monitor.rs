//! Device liveness and the aggregate readiness snapshot.
//!
//! Nothing here returns an error: every failed probe reads as `false` and a
//! missing weight reads as 0.
use std::collections::BTreeSet;
use std::net::{SocketAddr, UdpSocket};
use std::time::Instant;

use pour_traits::SharedClock;
use serde::Serialize;

use crate::bus::SharedBus;
use crate::pumps::PumpBank;
use crate::relay::PUMP_COUNT;
use crate::scale::ScaleDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    /// Relay board and scale both answer.
    Ready,
    /// Exactly one of them answers.
    Partial,
    /// Neither answers.
    Offline,
}

impl Aggregate {
    pub fn from_links(relay_ok: bool, scale_ok: bool) -> Self {
        match (relay_ok, scale_ok) {
            (true, true) => Aggregate::Ready,
            (false, false) => Aggregate::Offline,
            _ => Aggregate::Partial,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Aggregate::Ready => "ready",
            Aggregate::Partial => "partial",
            Aggregate::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub relay_connected: bool,
    pub scale_connected: bool,
    pub wifi_connected: bool,
    pub current_weight: f32,
    pub active_pumps: BTreeSet<u8>,
    pub aggregate: Aggregate,
    /// "hardware" or "simulated".
    pub bus_mode: &'static str,
    pub relay_address: u8,
    pub scale_address: u8,
    pub total_pumps: u8,
    /// Milliseconds since the machine started.
    pub timestamp_ms: u64,
}

pub struct StatusMonitor {
    bus: SharedBus,
    scale: ScaleDriver,
    pumps: PumpBank,
    network_probe: Option<SocketAddr>,
    clock: SharedClock,
    epoch: Instant,
}

impl std::fmt::Debug for StatusMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusMonitor")
            .field("bus", &self.bus)
            .field("network_probe", &self.network_probe)
            .finish_non_exhaustive()
    }
}

impl StatusMonitor {
    pub fn new(
        bus: SharedBus,
        scale: ScaleDriver,
        pumps: PumpBank,
        network_probe: Option<SocketAddr>,
        clock: SharedClock,
    ) -> Self {
        let epoch = clock.now();
        Self {
            bus,
            scale,
            pumps,
            network_probe,
            clock,
            epoch,
        }
    }

    /// True only if the device at `address` acknowledges a one-byte read.
    pub fn probe(&self, address: u8) -> bool {
        self.bus.probe(address)
    }

    /// Best-effort local network check: can a UDP socket be routed to the probe address.
    pub fn network_ok(&self) -> bool {
        let Some(addr) = self.network_probe else {
            return false;
        };
        let bind = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        UdpSocket::bind(bind)
            .and_then(|s| s.connect(addr))
            .map_err(|e| tracing::debug!(error = %e, %addr, "network probe failed"))
            .is_ok()
    }

    /// Milliseconds since the monitor (and so the machine) was created.
    pub fn uptime_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    pub fn status(&self) -> DeviceStatus {
        let d = self.bus.devices();
        let relay_connected = self.probe(d.relay_address);
        let scale_connected = self.probe(d.scale_address);
        let current_weight = if scale_connected {
            self.scale.read_weight_or_zero()
        } else {
            0.0
        };
        let status = DeviceStatus {
            relay_connected,
            scale_connected,
            wifi_connected: self.network_ok(),
            current_weight,
            active_pumps: self.pumps.active(),
            aggregate: Aggregate::from_links(relay_connected, scale_connected),
            bus_mode: if self.bus.is_simulated() {
                "simulated"
            } else {
                "hardware"
            },
            relay_address: d.relay_address,
            scale_address: d.scale_address,
            total_pumps: PUMP_COUNT,
            timestamp_ms: self.uptime_ms(),
        };
        tracing::debug!(
            relay = status.relay_connected,
            scale = status.scale_connected,
            aggregate = status.aggregate.as_str(),
            "status"
        );
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(true, true, Aggregate::Ready)]
    #[case(true, false, Aggregate::Partial)]
    #[case(false, true, Aggregate::Partial)]
    #[case(false, false, Aggregate::Offline)]
    fn aggregate_from_links(#[case] relay: bool, #[case] scale: bool, #[case] expected: Aggregate) {
        assert_eq!(Aggregate::from_links(relay, scale), expected);
    }
}
