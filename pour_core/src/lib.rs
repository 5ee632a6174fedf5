#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Pour orchestration engine (hardware-agnostic).
//!
//! All hardware access goes through `pour_traits::Bus`, shared by every
//! component via [`SharedBus`].
//!
//! ## Architecture
//!
//! - **Drivers**: [`RelayDriver`] (read-modify-write of the 8-bit relay
//!   register) and [`ScaleDriver`] (tare, little-endian f32 weight)
//! - **Pumps**: [`PumpBank`] tracks which pumps are running
//! - **Monitor**: [`StatusMonitor`] probes devices and aggregates readiness
//! - **Pour**: [`Pour`] is the per-recipe state machine, driven by
//!   [`runner::run_session`]
//! - **Boundary**: [`Machine`] exposes the commands and the telemetry hub
//!
//! ## Safety
//!
//! At most one pump runs during a pour, and every abort path leaves the
//! relay register at `0xFF` before the error is reported.

pub mod bus;
pub mod config;
pub mod conversions;
pub mod error;
pub mod feeds;
pub mod hw_error;
pub mod machine;
pub mod mocks;
pub mod monitor;
pub mod pour;
pub mod pumps;
pub mod recipe;
pub mod relay;
pub mod runner;
pub mod scale;
pub mod session;
pub mod status;
pub mod telemetry;
pub mod util;

pub use bus::SharedBus;
pub use config::{PourCfg, TelemetryCfg};
pub use error::{AbortReason, PourError, PourResult, Report, Result};
pub use machine::{Machine, MachineBuilder};
pub use monitor::{Aggregate, DeviceStatus, StatusMonitor};
pub use pour::{Pour, PourState};
pub use pumps::PumpBank;
pub use recipe::{Ingredient, PumpMap, Recipe, RecipeBook};
pub use relay::{ALL_OFF, PUMP_COUNT, RelayDriver};
pub use runner::RunControl;
pub use scale::ScaleDriver;
pub use session::{PourFault, PourProgress, PourSession};
pub use status::PourStatus;
pub use telemetry::{Broadcast, Event, Telemetry, WeightSample};
