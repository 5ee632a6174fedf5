use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{AbortReason, PourError, PourResult};
use crate::pour::{Pour, PourState};
use crate::session::PourProgress;
use crate::status::PourStatus;

/// Flags the caller flips while a session runs on another thread.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    stop: Arc<AtomicBool>,
    ack: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to abort at the next poll boundary.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Confirm the post-add ingredient was added.
    pub fn acknowledge(&self) {
        self.ack.store(true, Ordering::SeqCst);
    }

    fn take_ack(&self) -> bool {
        self.ack.swap(false, Ordering::SeqCst)
    }
}

/// Drive `pour` until it completes, aborts or is stopped.
///
/// `publish` sees every distinct progress snapshot, including the final one.
/// On every error path the relays are already in the safe state when this
/// returns.
pub fn run_session(
    pour: &mut Pour,
    ctl: &RunControl,
    mut publish: impl FnMut(&PourProgress),
) -> PourResult<PourProgress> {
    let poll = pour.cfg().poll();
    let clock = Arc::clone(pour.clock());
    tracing::info!(
        recipe = pour.session().recipe.id(),
        poll_ms = poll.as_millis(),
        "pour start"
    );

    let mut last = pour.progress();
    publish(&last);

    loop {
        let status = if ctl.stop_requested() {
            tracing::warn!(recipe = pour.session().recipe.id(), "pour stopped");
            pour.abort(AbortReason::Stopped)
        } else {
            // An early acknowledgement is held until the pour reaches the post-add step.
            if *pour.state() == PourState::PostAddWait && ctl.take_ack() {
                pour.acknowledge_post_add();
            }
            pour.step()
        };

        let progress = pour.progress();
        if progress != last {
            publish(&progress);
            last = progress;
        }

        match status {
            PourStatus::Running | PourStatus::AwaitingPostAdd => clock.sleep(poll),
            PourStatus::Complete => return Ok(last),
            PourStatus::Aborted(e) => return Err(e),
        }
    }
}

/// True when the error came from an explicit stop rather than a fault.
pub fn is_stop(e: &PourError) -> bool {
    matches!(
        e,
        PourError::Abort {
            reason: AbortReason::Stopped,
            ..
        }
    )
}
