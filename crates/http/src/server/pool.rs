//! Bounded spawner of worker threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::protocol::error::ServerError;
use crate::server::sync::SlotRunner;

/// Spawns one named thread per [`SlotRunner`], refusing once the number of
/// live workers reaches the cap. Workers run a single task and exit, so the
/// pool's job is the bound and the thread naming, not recycling.
#[derive(Debug)]
pub struct WorkerPool {
    prefix: String,
    max_workers: usize,
    live: Arc<AtomicUsize>,
    sequence: AtomicUsize,
}

impl WorkerPool {
    pub fn new(prefix: impl Into<String>, max_workers: usize) -> Self {
        Self {
            prefix: prefix.into(),
            max_workers,
            live: Arc::new(AtomicUsize::new(0)),
            sequence: AtomicUsize::new(0),
        }
    }

    /// Number of worker threads currently alive.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Spawns a thread for `runner`, or fails with
    /// [`ServerError::Exhausted`] at the cap.
    pub fn execute(&self, runner: SlotRunner) -> Result<(), ServerError> {
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < self.max_workers).then_some(live + 1)
            })
            .map_err(|_full| ServerError::Exhausted)?;

        let name = format!("{}{}", self.prefix, self.sequence.fetch_add(1, Ordering::Relaxed));
        let live = Arc::clone(&self.live);
        let spawned = thread::Builder::new().name(name).spawn(move || {
            let _live = LiveGuard(live);
            runner.run();
        });

        if let Err(e) = spawned {
            self.live.fetch_sub(1, Ordering::AcqRel);
            debug!(error = %e, "worker spawn failed");
            return Err(ServerError::io(e));
        }
        Ok(())
    }
}

/// Decrements the live count however the worker ends.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use crate::server::sync::Slot;

    use super::*;

    #[test]
    fn capacity_is_enforced_and_recovered() {
        let pool = WorkerPool::new("pool-test-", 2);

        let (first, first_runner) = Slot::new();
        let (second, second_runner) = Slot::new();
        pool.execute(first_runner).unwrap();
        pool.execute(second_runner).unwrap();

        // both workers are parked on their slots
        let (_, third_runner) = Slot::new();
        assert!(matches!(pool.execute(third_runner), Err(ServerError::Exhausted)));

        let (done_tx, done_rx) = mpsc::channel();
        first
            .assign(Box::new(move || {
                let _ = done_tx.send(());
            }))
            .unwrap_or_else(|_task| panic!("must accept"));
        done_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        second.release();

        // freed capacity becomes usable again
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while pool.live() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let (fourth, fourth_runner) = Slot::new();
        pool.execute(fourth_runner).unwrap();
        fourth.release();
    }
}
