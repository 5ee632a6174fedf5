//! Periodic background feeds (live weight, status).
//!
//! Each `Feed` owns exactly one thread, which is signalled and joined when
//! the feed is stopped or dropped.
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel as xch;

pub struct Feed {
    name: &'static str,
    stop_tx: Option<xch::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("name", &self.name)
            .field("running", &self.join_handle.is_some())
            .finish()
    }
}

impl Feed {
    /// Call `tick` immediately and then every `period` until stopped.
    pub fn spawn(
        name: &'static str,
        period: Duration,
        mut tick: impl FnMut() + Send + 'static,
    ) -> Self {
        let (stop_tx, stop_rx) = xch::bounded::<()>(1);
        let join_handle = std::thread::spawn(move || {
            tracing::debug!(feed = name, period_ms = period.as_millis(), "feed started");
            loop {
                tick();
                match stop_rx.recv_timeout(period) {
                    Err(xch::RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(xch::RecvTimeoutError::Disconnected) => break,
                }
            }
            tracing::trace!(feed = name, "feed thread exiting cleanly");
        });
        Self {
            name,
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the thread and wait for it. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.join_handle.take()
            && handle.join().is_err()
        {
            tracing::warn!(feed = self.name, "feed thread panicked");
        }
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn ticks_until_stopped_then_joins() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut feed = Feed::spawn("test", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(40));
        feed.stop();
        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop >= 1);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
        feed.stop();
    }
}
