//! The command/telemetry boundary.
//!
//! `Machine` owns the drivers, the one optional pour worker and the
//! periodic feeds. Every command takes `&self`, so a machine can be shared
//! (for example with a Ctrl-C handler) behind an `Arc`.
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel as xch;
use pour_traits::{Bus, MonotonicClock, SharedClock};

use crate::bus::SharedBus;
use crate::config::{PourCfg, TelemetryCfg};
use crate::conversions::{device_map, enabled_set, op_timeout};
use crate::error::{PourError, PourResult, Report, Result};
use crate::feeds::Feed;
use crate::monitor::{DeviceStatus, StatusMonitor};
use crate::pour::Pour;
use crate::pumps::PumpBank;
use crate::recipe::{PumpMap, Recipe, RecipeBook};
use crate::relay::RelayDriver;
use crate::runner::{RunControl, run_session};
use crate::scale::ScaleDriver;
use crate::session::PourProgress;
use crate::telemetry::{Event, Telemetry, WeightSample};
use crate::util::period;

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker {
    ctl: RunControl,
    outcome: xch::Receiver<PourResult<PourProgress>>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

pub struct Machine {
    bus: SharedBus,
    pumps: PumpBank,
    scale: ScaleDriver,
    monitor: Arc<StatusMonitor>,
    recipes: RecipeBook,
    pump_map: Mutex<PumpMap>,
    enabled: Option<BTreeSet<String>>,
    pour_cfg: PourCfg,
    clock: SharedClock,
    telemetry: Arc<Telemetry>,
    progress: Arc<Mutex<PourProgress>>,
    worker: Mutex<Option<Worker>>,
    feeds: Mutex<Vec<Feed>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("bus", &self.bus)
            .field("recipes", &self.recipes.len())
            .field("serving", &self.is_serving())
            .finish_non_exhaustive()
    }
}

// ── Type-state builder ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct Missing;
pub struct Set;

pub struct MachineBuilder<B> {
    bus: Option<SharedBus>,
    recipes: RecipeBook,
    pump_map: PumpMap,
    enabled: Option<BTreeSet<String>>,
    pour_cfg: PourCfg,
    telemetry_cfg: TelemetryCfg,
    clock: Option<SharedClock>,
    _bus: PhantomData<B>,
}

impl Default for MachineBuilder<Missing> {
    fn default() -> Self {
        Self {
            bus: None,
            recipes: RecipeBook::default(),
            pump_map: PumpMap::default(),
            enabled: None,
            pour_cfg: PourCfg::default(),
            telemetry_cfg: TelemetryCfg::default(),
            clock: None,
            _bus: PhantomData,
        }
    }
}

impl<B> MachineBuilder<B> {
    pub fn with_bus(self, bus: SharedBus) -> MachineBuilder<Set> {
        MachineBuilder {
            bus: Some(bus),
            recipes: self.recipes,
            pump_map: self.pump_map,
            enabled: self.enabled,
            pour_cfg: self.pour_cfg,
            telemetry_cfg: self.telemetry_cfg,
            clock: self.clock,
            _bus: PhantomData,
        }
    }

    pub fn with_recipes(mut self, recipes: RecipeBook) -> Self {
        self.recipes = recipes;
        self
    }

    pub fn with_pump_map(mut self, pump_map: PumpMap) -> Self {
        self.pump_map = pump_map;
        self
    }

    /// Restrict availability to these ingredients.
    pub fn with_enabled(mut self, enabled: Option<BTreeSet<String>>) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_pour_cfg(mut self, cfg: PourCfg) -> Self {
        self.pour_cfg = cfg;
        self
    }

    pub fn with_telemetry_cfg(mut self, cfg: TelemetryCfg) -> Self {
        self.telemetry_cfg = cfg;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }
}

impl MachineBuilder<Set> {
    /// Assemble the machine, force the relays off, take a first weight
    /// sample and start the periodic feeds.
    pub fn build(self) -> Result<Machine> {
        let bus = self
            .bus
            .ok_or_else(|| Report::new(PourError::Config("bus not set".into())))?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let relay = RelayDriver::new(bus.clone());
        let pumps = PumpBank::new(relay, Arc::clone(&clock));
        let scale = ScaleDriver::new(
            bus.clone(),
            Arc::clone(&clock),
            Duration::from_millis(self.pour_cfg.tare_settle_ms),
        );
        let monitor = Arc::new(StatusMonitor::new(
            bus.clone(),
            scale.clone(),
            pumps.clone(),
            self.telemetry_cfg.network_probe,
            Arc::clone(&clock),
        ));

        if let Err(e) = pumps.all_off() {
            tracing::warn!(error = %e, "relay board did not accept the initial all-off");
        }
        match scale.read_weight() {
            Ok(w) => tracing::info!(weight_g = w, simulated = bus.is_simulated(), "scale online"),
            Err(e) => tracing::warn!(error = %e, "scale not answering at startup"),
        }

        let machine = Machine {
            bus,
            pumps,
            scale,
            monitor,
            recipes: self.recipes,
            pump_map: Mutex::new(self.pump_map),
            enabled: self.enabled,
            pour_cfg: self.pour_cfg,
            clock,
            telemetry: Arc::new(Telemetry::new(self.telemetry_cfg.channel_capacity)),
            progress: Arc::new(Mutex::new(PourProgress::default())),
            worker: Mutex::new(None),
            feeds: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        };
        machine.start_feeds(&self.telemetry_cfg);
        Ok(machine)
    }
}

impl Machine {
    pub fn builder() -> MachineBuilder<Missing> {
        MachineBuilder::default()
    }

    /// Build from a validated config and an opened bus.
    pub fn from_config(cfg: &pour_config::Config, bus: Box<dyn Bus + Send>) -> Result<Self> {
        let shared = SharedBus::new(bus, device_map(&cfg.bus), op_timeout(&cfg.bus));
        Machine::builder()
            .with_bus(shared)
            .with_recipes(RecipeBook::try_from(cfg)?)
            .with_pump_map(PumpMap::try_from(cfg)?)
            .with_enabled(enabled_set(cfg))
            .with_pour_cfg(PourCfg::from(&cfg.pour))
            .with_telemetry_cfg(TelemetryCfg::try_from(&cfg.telemetry)?)
            .build()
    }

    fn start_feeds(&self, cfg: &TelemetryCfg) {
        let mut feeds = locked(&self.feeds);
        if let Some(p) = period(cfg.weight_feed_ms) {
            let scale = self.scale.clone();
            let monitor = Arc::clone(&self.monitor);
            let hub = Arc::clone(&self.telemetry);
            feeds.push(Feed::spawn("weight", p, move || {
                if let Ok(grams) = scale.read_weight() {
                    hub.publish(Event::Weight(WeightSample {
                        grams,
                        at_ms: monitor.uptime_ms(),
                    }));
                }
            }));
        }
        if let Some(p) = period(cfg.status_feed_ms) {
            let monitor = Arc::clone(&self.monitor);
            let hub = Arc::clone(&self.telemetry);
            feeds.push(Feed::spawn("status", p, move || {
                hub.publish(Event::Status(monitor.status()));
            }));
        }
    }

    fn ensure_open(&self) -> PourResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PourError::Transport("machine is shut down".into()));
        }
        Ok(())
    }

    /// Manual commands are refused while a pour owns the pumps.
    fn ensure_idle(&self) -> PourResult<()> {
        self.ensure_open()?;
        if self.is_serving() {
            return Err(PourError::AlreadyServing);
        }
        Ok(())
    }

    pub fn is_serving(&self) -> bool {
        locked(&self.worker)
            .as_ref()
            .is_some_and(Worker::is_running)
    }

    // ── Pour lifecycle ───────────────────────────────────────────────────────

    /// Start pouring `recipe_id` on a worker thread and return immediately.
    pub fn start_serving(&self, recipe_id: &str) -> Result<()> {
        self.ensure_open()?;
        let mut slot = locked(&self.worker);
        if slot.as_ref().is_some_and(Worker::is_running) {
            return Err(Report::new(PourError::AlreadyServing));
        }
        if let Some(done) = slot.take() {
            let _ = done.handle.join();
        }
        // A pour never shares the relay board with manually started pumps.
        let manual = self.pumps.active();
        if !manual.is_empty() {
            return Err(Report::new(PourError::PumpsActive(manual)));
        }

        let recipe = self.recipes.get(recipe_id)?.clone();
        let pump_map = locked(&self.pump_map).clone();
        let mut pour = Pour::new(
            recipe,
            self.scale.clone(),
            self.pumps.clone(),
            pump_map,
            self.pour_cfg.clone(),
            Arc::clone(&self.clock),
        );

        let ctl = RunControl::new();
        let (tx, outcome) = xch::bounded(1);
        let progress = Arc::clone(&self.progress);
        let hub = Arc::clone(&self.telemetry);
        let worker_ctl = ctl.clone();
        let handle = std::thread::spawn(move || {
            let result = run_session(&mut pour, &worker_ctl, |p| {
                *locked(&progress) = p.clone();
                hub.publish(Event::Progress(p.clone()));
            });
            let _ = tx.send(result);
        });

        tracing::info!(recipe = recipe_id, "serving started");
        *slot = Some(Worker {
            ctl,
            outcome,
            handle,
        });
        Ok(())
    }

    /// Safety stop: abort any pour, switch all eight pumps off, reset progress.
    ///
    /// Valid at any time; calling it repeatedly has the same effect as once.
    pub fn stop_serving(&self) -> Result<()> {
        let worker = locked(&self.worker).take();
        if let Some(w) = &worker {
            w.ctl.request_stop();
        }
        if let Err(e) = self.pumps.all_off() {
            tracing::warn!(error = %e, "immediate all-off failed");
        }
        if let Some(w) = worker
            && w.handle.join().is_err()
        {
            tracing::error!("pour worker panicked");
        }

        let idle = PourProgress::default();
        *locked(&self.progress) = idle.clone();
        self.telemetry.publish(Event::Progress(idle));

        self.pumps.all_off()?;
        tracing::info!("serving stopped, all pumps off");
        Ok(())
    }

    /// Operator confirmed the post-add ingredient.
    pub fn acknowledge_post_add(&self) -> Result<()> {
        match locked(&self.worker).as_ref() {
            Some(w) if w.is_running() => {
                w.ctl.acknowledge();
                Ok(())
            }
            _ => Err(Report::new(PourError::NotServing)),
        }
    }

    /// Block until the current pour ends, up to `timeout`.
    pub fn wait_for_outcome(&self, timeout: Duration) -> Result<PourProgress> {
        let rx = match locked(&self.worker).as_ref() {
            Some(w) => w.outcome.clone(),
            None => return Err(Report::new(PourError::NotServing)),
        };
        match rx.recv_timeout(timeout) {
            Ok(Ok(progress)) => Ok(progress),
            Ok(Err(e)) => Err(Report::new(e)),
            Err(xch::RecvTimeoutError::Timeout) => Err(Report::new(PourError::Timeout)),
            Err(xch::RecvTimeoutError::Disconnected) => Err(Report::new(PourError::NotServing)),
        }
    }

    pub fn progress(&self) -> PourProgress {
        locked(&self.progress).clone()
    }

    // ── Scale ────────────────────────────────────────────────────────────────

    pub fn tare_scale(&self) -> Result<()> {
        self.ensure_idle()?;
        self.scale.tare()?;
        Ok(())
    }

    pub fn get_weight(&self) -> Result<f32> {
        self.ensure_open()?;
        Ok(self.scale.read_weight()?)
    }

    // ── Status ───────────────────────────────────────────────────────────────

    pub fn get_status(&self) -> DeviceStatus {
        self.monitor.status()
    }

    pub fn is_simulated(&self) -> bool {
        self.bus.is_simulated()
    }

    // ── Manual pump control ──────────────────────────────────────────────────

    /// Run `pump` for `duration` and return without waiting.
    pub fn activate_pump(&self, pump: u8, duration: Duration) -> Result<JoinHandle<()>> {
        self.ensure_idle()?;
        tracing::info!(pump, duration_ms = duration.as_millis(), "timed activation");
        Ok(self.pumps.activate_for(pump, duration)?)
    }

    pub fn start_pump(&self, pump: u8) -> Result<()> {
        self.ensure_idle()?;
        self.pumps.start(pump)?;
        Ok(())
    }

    /// Always allowed, even mid-pour.
    pub fn stop_pump(&self, pump: u8) -> Result<()> {
        self.ensure_open()?;
        self.pumps.stop(pump)?;
        Ok(())
    }

    pub fn active_pumps(&self) -> BTreeSet<u8> {
        self.pumps.active()
    }

    /// Last relay register seen, `None` if the board does not answer.
    pub fn relay_state(&self) -> Option<u8> {
        self.pumps.relay().read_state()
    }

    // ── Configuration ────────────────────────────────────────────────────────

    pub fn recipes(&self) -> &RecipeBook {
        &self.recipes
    }

    pub fn available_recipes(&self) -> Vec<Recipe> {
        let map = locked(&self.pump_map);
        self.recipes
            .available(&map, self.enabled.as_ref())
            .cloned()
            .collect()
    }

    pub fn pump_map(&self) -> PumpMap {
        locked(&self.pump_map).clone()
    }

    /// Replace the pump map. Takes effect for the next pour.
    pub fn set_pump_map(&self, map: PumpMap) -> Result<()> {
        self.ensure_idle()?;
        *locked(&self.pump_map) = map;
        Ok(())
    }

    // ── Telemetry ────────────────────────────────────────────────────────────

    pub fn subscribe(&self) -> xch::Receiver<Event> {
        self.telemetry.subscribe()
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    // ── Shutdown ─────────────────────────────────────────────────────────────

    /// Stop feeds and any pour, switch everything off and close the bus.
    /// Later calls are no-ops.
    pub fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for mut feed in locked(&self.feeds).drain(..) {
            feed.stop();
        }
        if let Err(e) = self.stop_serving() {
            tracing::warn!(error = %e, "safety stop during shutdown failed");
        }
        self.bus.close()?;
        tracing::info!("machine shut down");
        Ok(())
    }
}

impl Drop for Machine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "shutdown on drop failed");
        }
    }
}
