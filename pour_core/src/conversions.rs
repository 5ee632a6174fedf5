//! Conversions from the TOML schema (`pour_config`) to runtime types.
use std::collections::BTreeSet;
use std::time::Duration;

use pour_traits::DeviceMap;

use crate::config::{PourCfg, TelemetryCfg};
use crate::error::PourError;
use crate::recipe::{PumpMap, Recipe, RecipeBook};

impl From<&pour_config::PourCfg> for PourCfg {
    fn from(c: &pour_config::PourCfg) -> Self {
        Self {
            poll_ms: c.poll_ms,
            tare_settle_ms: c.tare_settle_ms,
            ingredient_settle_ms: c.ingredient_settle_ms,
            max_ingredient_ms: c.max_ingredient_ms,
            max_read_failures: c.max_read_failures,
        }
    }
}

impl TryFrom<&pour_config::TelemetryCfg> for TelemetryCfg {
    type Error = PourError;

    fn try_from(c: &pour_config::TelemetryCfg) -> Result<Self, Self::Error> {
        let network_probe = c
            .network_probe
            .as_deref()
            .map(|s| {
                s.parse::<std::net::SocketAddr>()
                    .map_err(|e| PourError::Config(format!("network_probe {s:?}: {e}")))
            })
            .transpose()?;
        Ok(Self {
            weight_feed_ms: c.weight_feed_ms,
            status_feed_ms: c.status_feed_ms,
            channel_capacity: c.channel_capacity,
            network_probe,
        })
    }
}

impl TryFrom<&pour_config::RecipeCfg> for Recipe {
    type Error = PourError;

    fn try_from(c: &pour_config::RecipeCfg) -> Result<Self, Self::Error> {
        Recipe::new(c.id.clone(), c.ingredients.iter().cloned(), c.post_add.clone())
    }
}

impl TryFrom<&pour_config::Config> for RecipeBook {
    type Error = PourError;

    fn try_from(c: &pour_config::Config) -> Result<Self, Self::Error> {
        let recipes = c
            .recipes
            .iter()
            .map(Recipe::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        RecipeBook::new(recipes)
    }
}

impl TryFrom<&pour_config::Config> for PumpMap {
    type Error = PourError;

    fn try_from(c: &pour_config::Config) -> Result<Self, Self::Error> {
        PumpMap::new(c.pumps.clone())
    }
}

/// Bus addresses and registers from the `[bus]` section.
pub fn device_map(c: &pour_config::BusCfg) -> DeviceMap {
    DeviceMap {
        relay_address: c.relay_address,
        scale_address: c.scale_address,
        weight_register: c.weight_register,
        tare_register: c.tare_register,
    }
}

pub fn op_timeout(c: &pour_config::BusCfg) -> Duration {
    Duration::from_millis(c.op_timeout_ms)
}

/// Enabled ingredients, or `None` when the config does not restrict them.
pub fn enabled_set(c: &pour_config::Config) -> Option<BTreeSet<String>> {
    c.enabled.as_ref().map(|v| v.iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_into_runtime_types() {
        let cfg = pour_config::load_toml(
            r#"
enabled = ["vodka"]

[bus]
scale_address = 0x27

[pour]
poll_ms = 50

[telemetry]
network_probe = "127.0.0.1:9"

[pumps]
vodka = 1
lime = 2

[[recipes]]
id = "mule"
ingredients = [["vodka", 40.0], ["lime", 10.0]]
"#,
        )
        .unwrap();
        let pour = PourCfg::from(&cfg.pour);
        assert_eq!(pour.poll_ms, 50);
        let tel = TelemetryCfg::try_from(&cfg.telemetry).unwrap();
        assert_eq!(tel.network_probe, Some("127.0.0.1:9".parse().unwrap()));
        let book = RecipeBook::try_from(&cfg).unwrap();
        assert_eq!(book.get("mule").unwrap().total_ml(), 50.0);
        let map = PumpMap::try_from(&cfg).unwrap();
        assert_eq!(map.pump_for("lime"), Some(2));
        assert_eq!(device_map(&cfg.bus).scale_address, 0x27);
        assert_eq!(enabled_set(&cfg).unwrap().len(), 1);
    }
}
