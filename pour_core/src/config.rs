//! Runtime configuration for the pour engine.
//!
//! Separate from the TOML schema in `pour_config`; see `conversions` for
//! the mapping.
use std::net::SocketAddr;
use std::time::Duration;

/// Minimum per-ingredient time budget when it is derived from the volume.
pub const MIN_INGREDIENT_BUDGET: Duration = Duration::from_secs(5);
/// Derived budget per millilitre.
pub const BUDGET_PER_ML: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct PourCfg {
    /// Scale polling interval while a pump runs.
    pub poll_ms: u64,
    pub tare_settle_ms: u64,
    /// Pause between stopping one pump and starting the next.
    pub ingredient_settle_ms: u64,
    /// Per-ingredient time budget; 0 derives it from the volume.
    pub max_ingredient_ms: u64,
    /// Consecutive failed reads tolerated before aborting.
    pub max_read_failures: u32,
}

impl Default for PourCfg {
    fn default() -> Self {
        Self {
            poll_ms: 150,
            tare_settle_ms: 200,
            ingredient_settle_ms: 200,
            max_ingredient_ms: 0,
            max_read_failures: 3,
        }
    }
}

impl PourCfg {
    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }

    /// How long one ingredient may take before it counts as underfilled.
    pub fn ingredient_budget(&self, ml: f32) -> Duration {
        if self.max_ingredient_ms > 0 {
            return Duration::from_millis(self.max_ingredient_ms);
        }
        let per_ml_ms = BUDGET_PER_ML.as_millis() as f64;
        let ms = (f64::from(ml.max(0.0)) * per_ml_ms).ceil() as u64;
        Duration::from_millis(ms).max(MIN_INGREDIENT_BUDGET)
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryCfg {
    /// Weight feed period; 0 disables it.
    pub weight_feed_ms: u64,
    /// Status feed period; 0 disables it.
    pub status_feed_ms: u64,
    pub channel_capacity: usize,
    pub network_probe: Option<SocketAddr>,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            weight_feed_ms: 500,
            status_feed_ms: 5000,
            channel_capacity: 16,
            network_probe: None,
        }
    }
}
