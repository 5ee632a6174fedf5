//! Digital scale driver: tare command and 4-byte float weight reads.
use std::time::Duration;

use pour_traits::SharedClock;

use crate::bus::SharedBus;
use crate::error::{PourError, PourResult};
use crate::util::round2;

const TARE_COMMAND: u8 = 0x01;
const WEIGHT_LEN: usize = 4;

#[derive(Clone)]
pub struct ScaleDriver {
    bus: SharedBus,
    clock: SharedClock,
    settle: Duration,
}

impl std::fmt::Debug for ScaleDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScaleDriver")
            .field("bus", &self.bus)
            .field("settle", &self.settle)
            .finish_non_exhaustive()
    }
}

impl ScaleDriver {
    pub fn new(bus: SharedBus, clock: SharedClock, settle: Duration) -> Self {
        Self { bus, clock, settle }
    }

    /// Zero the scale and wait out the settle delay.
    pub fn tare(&self) -> PourResult<()> {
        let d = self.bus.devices();
        self.bus
            .with(|b| b.write_block(d.scale_address, d.tare_register, &[TARE_COMMAND]))
            .map_err(|e| PourError::TareFailed(e.to_string()))?;
        self.clock.sleep(self.settle);
        tracing::info!(settle_ms = self.settle.as_millis(), "scale tared");
        Ok(())
    }

    /// One weight sample in grams, rounded to 0.01 g. Errors propagate.
    pub fn read_weight(&self) -> PourResult<f32> {
        let d = self.bus.devices();
        let bytes = self
            .bus
            .with(|b| b.read_block(d.scale_address, d.weight_register, WEIGHT_LEN))?;
        let raw: [u8; WEIGHT_LEN] = bytes
            .get(..WEIGHT_LEN)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| PourError::Transport(format!("short weight read: {} bytes", bytes.len())))?;
        let grams = f32::from_le_bytes(raw);
        if !grams.is_finite() {
            return Err(PourError::Transport(format!(
                "scale returned non-finite weight {grams}"
            )));
        }
        let grams = round2(grams);
        tracing::trace!(weight_g = grams, "scale read");
        Ok(grams)
    }

    /// Weight for passive displays: failures read as 0.
    pub fn read_weight_or_zero(&self) -> f32 {
        self.read_weight().unwrap_or_else(|e| {
            tracing::debug!(error = %e, "weight unavailable, reporting 0");
            0.0
        })
    }
}
