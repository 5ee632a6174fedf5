//! The pour state machine.
//!
//! `Idle → Taring → Dispensing(i) … → PostAddWait → Complete`, with any
//! failure ending in `Error`. The scale is tared once per session, so each
//! ingredient is measured against the cumulative target of everything
//! poured before it. Each `step()` does one unit of work (tare, start a
//! pump, or take a sample and react to it); the runner supplies the
//! polling delay between steps.
use std::time::Instant;

use pour_traits::SharedClock;

use crate::config::PourCfg;
use crate::error::{AbortReason, PourError};
use crate::pumps::PumpBank;
use crate::recipe::{PumpMap, Recipe};
use crate::scale::ScaleDriver;
use crate::session::{PourProgress, PourSession};
use crate::status::PourStatus;
use crate::util::delivered_since;

#[derive(Debug, Clone, PartialEq)]
pub enum PourState {
    Idle,
    Taring,
    Dispensing { index: usize },
    PostAddWait,
    Complete,
    Error(PourError),
}

pub struct Pour {
    session: PourSession,
    state: PourState,
    scale: ScaleDriver,
    pumps: PumpBank,
    pump_map: PumpMap,
    cfg: PourCfg,
    clock: SharedClock,
    ingredient_started: Option<Instant>,
    read_failures: u32,
    relay_touched: bool,
}

impl std::fmt::Debug for Pour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pour")
            .field("recipe", &self.session.recipe.id())
            .field("state", &self.state)
            .field("active_pump", &self.session.active_pump)
            .finish_non_exhaustive()
    }
}

impl Pour {
    /// Create a session for `recipe`. The first `step()` tares the scale.
    pub fn new(
        recipe: Recipe,
        scale: ScaleDriver,
        pumps: PumpBank,
        pump_map: PumpMap,
        cfg: PourCfg,
        clock: SharedClock,
    ) -> Self {
        Self {
            session: PourSession::new(recipe),
            state: PourState::Taring,
            scale,
            pumps,
            pump_map,
            cfg,
            clock,
            ingredient_started: None,
            read_failures: 0,
            relay_touched: false,
        }
    }

    pub fn state(&self) -> &PourState {
        &self.state
    }

    pub fn session(&self) -> &PourSession {
        &self.session
    }

    pub fn cfg(&self) -> &PourCfg {
        &self.cfg
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn progress(&self) -> PourProgress {
        self.session.progress()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, PourState::Complete | PourState::Error(_))
    }

    /// Advance the machine by one action.
    pub fn step(&mut self) -> PourStatus {
        let index = match &self.state {
            PourState::Taring => return self.tare(),
            PourState::Dispensing { index } => *index,
            PourState::PostAddWait => return PourStatus::AwaitingPostAdd,
            PourState::Complete => return PourStatus::Complete,
            PourState::Error(e) => return PourStatus::Aborted(e.clone()),
            PourState::Idle => return PourStatus::Aborted(PourError::NotServing),
        };
        self.dispense(index)
    }

    /// Operator confirmed the post-add ingredient. Returns false outside `PostAddWait`.
    pub fn acknowledge_post_add(&mut self) -> bool {
        if self.state != PourState::PostAddWait {
            return false;
        }
        tracing::info!(recipe = self.session.recipe.id(), "post-add acknowledged");
        self.complete();
        true
    }

    /// Abort the session. Always ends with every relay de-energized.
    ///
    /// A session that already finished keeps its outcome.
    pub fn abort(&mut self, reason: AbortReason) -> PourStatus {
        if self.is_terminal() {
            if let Err(e) = self.pumps.all_off() {
                tracing::warn!(error = %e, "safety stop failed");
            }
            return self.step();
        }
        let err = PourError::Abort {
            ingredient: self.current_ingredient_name(),
            reason,
        };
        self.relay_touched = true;
        self.fail(err)
    }

    fn current_ingredient_name(&self) -> Option<String> {
        match self.state {
            PourState::Dispensing { .. } => self.session.current().map(|i| i.name.clone()),
            _ => None,
        }
    }

    fn tare(&mut self) -> PourStatus {
        match self.scale.tare() {
            Ok(()) => self.enter(0),
            Err(e) => self.fail(e),
        }
    }

    fn enter(&mut self, index: usize) -> PourStatus {
        self.session.index = index;
        self.session.delivered_g = 0.0;
        self.session.active_pump = None;
        self.ingredient_started = None;
        self.read_failures = 0;
        match self.session.current() {
            Some(ingredient) => {
                self.session.cumulative_target_g = self.session.cumulative_before_g + ingredient.ml;
                self.state = PourState::Dispensing { index };
                PourStatus::Running
            }
            None => self.finish(),
        }
    }

    fn finish(&mut self) -> PourStatus {
        if let Some(extra) = self.session.recipe.post_add() {
            tracing::info!(
                recipe = self.session.recipe.id(),
                post_add = extra,
                "pumping done, waiting for post-add"
            );
            self.state = PourState::PostAddWait;
            PourStatus::AwaitingPostAdd
        } else {
            self.complete()
        }
    }

    fn complete(&mut self) -> PourStatus {
        self.session.complete = true;
        self.state = PourState::Complete;
        tracing::info!(
            recipe = self.session.recipe.id(),
            total_g = self.session.measured_g,
            "pour complete"
        );
        PourStatus::Complete
    }

    fn dispense(&mut self, index: usize) -> PourStatus {
        let Some(ingredient) = self.session.current().cloned() else {
            return self.finish();
        };

        let Some(pump) = self.session.active_pump else {
            if ingredient.ml <= 0.0 {
                tracing::debug!(ingredient = %ingredient.name, "zero volume, skipping");
                return self.enter(index + 1);
            }
            let Some(pump) = self.pump_map.pump_for(&ingredient.name) else {
                return self.fail(PourError::NoPump {
                    ingredient: ingredient.name,
                });
            };
            self.relay_touched = true;
            if let Err(e) = self.pumps.start(pump) {
                return self.abort(AbortReason::Transport(e.to_string()));
            }
            self.session.active_pump = Some(pump);
            self.ingredient_started = Some(self.clock.now());
            tracing::info!(
                ingredient = %ingredient.name,
                pump,
                target_g = self.session.cumulative_target_g,
                "dispensing"
            );
            return PourStatus::Running;
        };

        match self.scale.read_weight() {
            Ok(weight) => {
                self.read_failures = 0;
                self.session.measured_g = weight;
                self.session.delivered_g =
                    delivered_since(weight, self.session.cumulative_before_g);
                tracing::trace!(
                    ingredient = %ingredient.name,
                    weight_g = weight,
                    delivered_g = self.session.delivered_g,
                    "sample"
                );
                if weight >= self.session.cumulative_target_g {
                    return self.ingredient_done(pump, &ingredient.name, index);
                }
            }
            Err(PourError::Timeout) => {
                return self.abort(AbortReason::Transport(PourError::Timeout.to_string()));
            }
            Err(e) => {
                self.read_failures += 1;
                tracing::warn!(
                    ingredient = %ingredient.name,
                    failures = self.read_failures,
                    error = %e,
                    "weight read failed"
                );
                if self.read_failures >= self.cfg.max_read_failures {
                    return self.abort(AbortReason::ReadFailures(self.read_failures));
                }
            }
        }

        let budget = self.cfg.ingredient_budget(ingredient.ml);
        let elapsed = self
            .ingredient_started
            .map(|t| self.clock.now().saturating_duration_since(t))
            .unwrap_or_default();
        if elapsed > budget {
            return self.abort(AbortReason::Underfill {
                measured_g: self.session.delivered_g,
                target_g: ingredient.ml,
            });
        }
        PourStatus::Running
    }

    fn ingredient_done(&mut self, pump: u8, name: &str, index: usize) -> PourStatus {
        if let Err(e) = self.pumps.stop(pump) {
            return self.abort(AbortReason::Transport(e.to_string()));
        }
        self.session.active_pump = None;
        self.session.cumulative_before_g = self.session.cumulative_target_g;
        self.session
            .poured
            .push((name.to_string(), self.session.delivered_g));
        tracing::info!(
            ingredient = name,
            pump,
            delivered_g = self.session.delivered_g,
            "ingredient done"
        );
        if index + 1 < self.session.recipe.ingredients().len() {
            self.clock
                .sleep(std::time::Duration::from_millis(self.cfg.ingredient_settle_ms));
        }
        self.enter(index + 1)
    }

    fn fail(&mut self, err: PourError) -> PourStatus {
        if self.relay_touched {
            if let Err(e) = self.pumps.all_off() {
                tracing::error!(error = %e, "safety stop failed");
            }
            self.session.active_pump = None;
        }
        tracing::error!(recipe = self.session.recipe.id(), error = %err, "pour aborted");
        self.session.error = Some(err.clone());
        self.state = PourState::Error(err.clone());
        PourStatus::Aborted(err)
    }
}
