//! `serve`: start a pour, render its progress, and settle the outcome.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use pour_core::error::{AbortReason, PourError};
use pour_core::{Event, Machine, PourProgress};

const TICK: Duration = Duration::from_millis(50);

pub struct ServeOpts {
    pub yes: bool,
    pub timeout: Duration,
    pub json: bool,
}

/// A pour is waiting for the operator once every pumped ingredient is done.
fn awaiting_post_add(p: &PourProgress) -> bool {
    p.is_serving
        && !p.is_complete
        && p.error.is_none()
        && p.current_ingredient.is_none()
        && p.post_add_ingredient.is_some()
}

fn render(p: &PourProgress, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(&Event::Progress(p.clone())) {
            println!("{line}");
        }
        return;
    }
    if let Some(name) = &p.current_ingredient {
        println!("{name}: {:.1} / {:.1} ml", p.current_amount, p.target_amount);
    }
}

fn ask_operator(ingredient: &str) -> xch::Receiver<()> {
    let (tx, rx) = xch::bounded(1);
    eprintln!("Add {ingredient} by hand, then press Enter to finish.");
    std::thread::spawn(move || {
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_ok() {
            let _ = tx.send(());
        }
    });
    rx
}

/// A pour that already ended has nothing to confirm; its outcome is reported below.
fn acknowledge(machine: &Machine) {
    if let Err(e) = machine.acknowledge_post_add() {
        tracing::debug!(error = %e, "post-add acknowledgement not delivered");
    }
}

pub fn run_serve(
    machine: &Arc<Machine>,
    recipe: &str,
    opts: &ServeOpts,
    interrupted: &Arc<AtomicBool>,
) -> eyre::Result<PourProgress> {
    let rx = machine.subscribe();
    machine.start_serving(recipe)?;
    if opts.yes && machine.recipes().get(recipe)?.post_add().is_some() {
        // held by the runner until the pumped part is done
        acknowledge(machine);
    }

    let deadline = Instant::now() + opts.timeout;
    let mut operator: Option<xch::Receiver<()>> = None;
    let mut last: Option<PourProgress> = None;

    while machine.is_serving() {
        if interrupted.load(Ordering::SeqCst) {
            break;
        }
        if Instant::now() >= deadline {
            tracing::warn!(recipe, "serve timed out, stopping");
            machine.stop_serving()?;
            eyre::bail!(
                "serving {recipe} did not finish within {}s; all pumps switched off",
                opts.timeout.as_secs()
            );
        }
        if let Some(ack) = &operator
            && ack.try_recv().is_ok()
        {
            acknowledge(machine);
        }
        match rx.recv_timeout(TICK) {
            Ok(Event::Progress(p)) => {
                if last.as_ref() != Some(&p) {
                    render(&p, opts.json);
                }
                if !opts.yes
                    && operator.is_none()
                    && awaiting_post_add(&p)
                    && let Some(extra) = &p.post_add_ingredient
                {
                    operator = Some(ask_operator(extra));
                }
                last = Some(p);
            }
            Ok(_) | Err(xch::RecvTimeoutError::Timeout) => {}
            Err(xch::RecvTimeoutError::Disconnected) => break,
        }
    }

    // The worker has exited, so every snapshot it published is already queued.
    for ev in rx.try_iter() {
        if let Event::Progress(p) = ev {
            if last.as_ref() != Some(&p) {
                render(&p, opts.json);
            }
            last = Some(p);
        }
    }

    if interrupted.load(Ordering::SeqCst) {
        return Err(eyre::Report::new(PourError::Abort {
            ingredient: last.and_then(|p| p.current_ingredient),
            reason: AbortReason::Stopped,
        }));
    }
    machine.wait_for_outcome(Duration::from_secs(5))
}

pub fn render_outcome(recipe: &str, p: &PourProgress, json: bool) {
    if json {
        let line = serde_json::json!({
            "recipe": recipe,
            "complete": p.is_complete,
            "post_add": p.post_add_ingredient,
        });
        println!("{line}");
    } else if let Some(extra) = &p.post_add_ingredient {
        println!("{recipe} complete (with {extra})");
    } else {
        println!("{recipe} complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_add_wait_is_detected_from_progress() {
        let mut p = PourProgress {
            cocktail_id: Some("buck".into()),
            is_serving: true,
            post_add_ingredient: Some("ginger_ale".into()),
            current_ingredient: Some("vodka".into()),
            ..PourProgress::default()
        };
        assert!(!awaiting_post_add(&p));
        p.current_ingredient = None;
        assert!(awaiting_post_add(&p));
        p.is_complete = true;
        assert!(!awaiting_post_add(&p));
        p.is_complete = false;
        p.is_serving = false;
        assert!(!awaiting_post_add(&p));
    }
}
