#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the pour controller.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - Recipes keep their declared ingredient order; ingredients accept
//!   either `["vodka", 40.0]` tuples or `{ name = "vodka", ml = 40.0 }` tables.
//! - The ingredient→pump map can also be imported from a strict
//!   `ingredient,pump` CSV.
use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde::de::Deserializer;

/// Number of relay channels on the board; pump slots are `1..=PUMP_SLOTS`.
pub const PUMP_SLOTS: u8 = 8;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BusCfg {
    /// I2C adapter number (`/dev/i2c-N`).
    pub device: u8,
    pub relay_address: u8,
    pub scale_address: u8,
    pub weight_register: u8,
    pub tare_register: u8,
    /// Upper bound for a single bus transaction (ms).
    pub op_timeout_ms: u64,
    /// Force the simulated bus even when hardware support is compiled in.
    pub simulate: bool,
}

impl Default for BusCfg {
    fn default() -> Self {
        Self {
            device: 1,
            relay_address: 0x20,
            scale_address: 0x26,
            weight_register: 0x10,
            tare_register: 0x50,
            op_timeout_ms: 3000,
            simulate: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PourCfg {
    /// Scale polling interval while a pump runs (ms).
    pub poll_ms: u64,
    /// Wait after the tare command before trusting readings (ms).
    pub tare_settle_ms: u64,
    /// Pause between one ingredient's pump stop and the next start (ms).
    pub ingredient_settle_ms: u64,
    /// Per-ingredient time budget (ms). 0 derives it from the volume.
    pub max_ingredient_ms: u64,
    /// Consecutive failed weight reads tolerated before aborting.
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TelemetryCfg {
    /// Live weight feed period (ms). 0 disables the feed.
    pub weight_feed_ms: u64,
    /// Periodic status feed period (ms). 0 disables the feed.
    pub status_feed_ms: u64,
    /// Per-subscriber queue depth; samples beyond it are dropped.
    pub channel_capacity: usize,
    /// `host:port` used for the best-effort network reachability check.
    pub network_probe: Option<String>,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            weight_feed_ms: 500,
            status_feed_ms: 5000,
            channel_capacity: 16,
            network_probe: Some("1.1.1.1:53".to_string()),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// One recipe as written in the config.
#[derive(Debug, Deserialize, Clone)]
pub struct RecipeCfg {
    pub id: String,
    /// Ordered (ingredient, millilitres) pairs.
    #[serde(deserialize_with = "de_ingredients")]
    pub ingredients: Vec<(String, f32)>,
    /// Ingredient the operator adds by hand after pumping.
    #[serde(default)]
    pub post_add: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Ingredients currently loaded in the machine. Absent = all mapped ones.
    #[serde(default)]
    pub enabled: Option<Vec<String>>,
    #[serde(default)]
    pub bus: BusCfg,
    #[serde(default)]
    pub pour: PourCfg,
    #[serde(default)]
    pub telemetry: TelemetryCfg,
    #[serde(default)]
    pub logging: Logging,
    /// ingredient -> pump slot (1..=8)
    #[serde(default)]
    pub pumps: BTreeMap<String, u8>,
    #[serde(default)]
    pub recipes: Vec<RecipeCfg>,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IngredientToml {
    Tuple((String, f32)),
    Table {
        name: String,
        #[serde(alias = "amount")]
        ml: f32,
    },
}

fn de_ingredients<'de, D>(deserializer: D) -> Result<Vec<(String, f32)>, D::Error>
where
    D: Deserializer<'de>,
{
    let items: Vec<IngredientToml> = Vec::deserialize(deserializer)?;
    Ok(items
        .into_iter()
        .map(|i| match i {
            IngredientToml::Tuple(pair) => pair,
            IngredientToml::Table { name, ml } => (name, ml),
        })
        .collect())
}

/// Pump map CSV schema.
///
/// Expected headers:
/// ingredient,pump
///
/// Example:
/// ingredient,pump
/// vodka,1
/// lime_juice,2
#[derive(Debug, Deserialize, Clone)]
pub struct PumpMapRow {
    pub ingredient: String,
    pub pump: u8,
}

/// Validate a pump map: slots within range and at most one ingredient per slot.
pub fn check_pump_map(pumps: &BTreeMap<String, u8>) -> eyre::Result<()> {
    let mut owners: BTreeMap<u8, &str> = BTreeMap::new();
    for (ingredient, &slot) in pumps {
        if ingredient.trim().is_empty() {
            eyre::bail!("pumps: ingredient name must not be empty");
        }
        if !(1..=PUMP_SLOTS).contains(&slot) {
            eyre::bail!("pumps.{ingredient}: pump slot {slot} out of range 1..={PUMP_SLOTS}");
        }
        if let Some(prev) = owners.insert(slot, ingredient) {
            eyre::bail!("pumps: slot {slot} assigned to both {prev} and {ingredient}");
        }
    }
    Ok(())
}

pub fn load_pump_map_csv(path: &std::path::Path) -> eyre::Result<BTreeMap<String, u8>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open pump map CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["ingredient", "pump"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "pump map CSV must have headers 'ingredient,pump', got: {}",
            actual.join(",")
        );
    }

    let mut map = BTreeMap::new();
    for (idx, rec) in rdr.deserialize::<PumpMapRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if map.insert(row.ingredient.clone(), row.pump).is_some() {
            eyre::bail!(
                "pump map CSV row {}: ingredient {} listed twice",
                idx + 2,
                row.ingredient
            );
        }
    }
    check_pump_map(&map)?;
    Ok(map)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Bus
        if self.bus.op_timeout_ms == 0 {
            eyre::bail!("bus.op_timeout_ms must be >= 1");
        }
        if self.bus.op_timeout_ms > 10_000 {
            eyre::bail!("bus.op_timeout_ms is unreasonably large (>10s)");
        }
        if self.bus.relay_address == self.bus.scale_address {
            eyre::bail!("bus.relay_address and bus.scale_address must differ");
        }
        for (name, addr) in [
            ("relay_address", self.bus.relay_address),
            ("scale_address", self.bus.scale_address),
        ] {
            if !(0x08..=0x77).contains(&addr) {
                eyre::bail!("bus.{name} 0x{addr:02x} is outside the 7-bit device range");
            }
        }

        // Pour
        if self.pour.poll_ms == 0 {
            eyre::bail!("pour.poll_ms must be >= 1");
        }
        if self.pour.max_read_failures == 0 {
            eyre::bail!("pour.max_read_failures must be >= 1");
        }

        // Telemetry
        if self.telemetry.channel_capacity == 0 {
            eyre::bail!("telemetry.channel_capacity must be >= 1");
        }
        if let Some(probe) = &self.telemetry.network_probe
            && probe.parse::<std::net::SocketAddr>().is_err()
        {
            eyre::bail!("telemetry.network_probe must be an ip:port pair, got {probe}");
        }

        // Logging
        if let Some(r) = &self.logging.rotation
            && !matches!(r.as_str(), "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        check_pump_map(&self.pumps)?;

        // Recipes
        let mut ids = BTreeSet::new();
        for r in &self.recipes {
            if r.id.trim().is_empty() {
                eyre::bail!("recipe id must not be empty");
            }
            if !ids.insert(r.id.as_str()) {
                eyre::bail!("recipe {} defined twice", r.id);
            }
            if r.ingredients.is_empty() && r.post_add.is_none() {
                eyre::bail!("recipe {} has no ingredients", r.id);
            }
            let mut seen = BTreeSet::new();
            for (name, ml) in &r.ingredients {
                if !seen.insert(name.as_str()) {
                    eyre::bail!("recipe {}: ingredient {name} listed twice", r.id);
                }
                if !ml.is_finite() || *ml < 0.0 {
                    eyre::bail!("recipe {}: {name} volume must be a finite number >= 0", r.id);
                }
            }
        }

        Ok(())
    }

    /// Recipe ingredients with no pump mapping. These are not a config error
    /// (the pour fails on reaching them) but are worth reporting up front.
    pub fn unmapped_ingredients(&self) -> BTreeSet<String> {
        self.recipes
            .iter()
            .flat_map(|r| r.ingredients.iter().map(|(n, _)| n))
            .filter(|n| !self.pumps.contains_key(*n))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_hardware_register_map() {
        let bus = BusCfg::default();
        assert_eq!(bus.relay_address, 0x20);
        assert_eq!(bus.scale_address, 0x26);
        assert_eq!(bus.weight_register, 0x10);
        assert_eq!(bus.tare_register, 0x50);
    }

    #[test]
    fn empty_config_is_valid() {
        let cfg = load_toml("").expect("parse");
        cfg.validate().expect("defaults validate");
        assert!(cfg.recipes.is_empty());
    }

    #[test]
    fn unmapped_ingredients_are_listed() {
        let cfg = load_toml(
            r#"
[pumps]
vodka = 1

[[recipes]]
id = "green_fairy"
ingredients = [["vodka", 20.0], ["absinthe", 20.0]]
"#,
        )
        .expect("parse");
        let missing = cfg.unmapped_ingredients();
        assert_eq!(missing.into_iter().collect::<Vec<_>>(), vec!["absinthe"]);
    }
}
