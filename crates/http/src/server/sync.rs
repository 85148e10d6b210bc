//! Blocking primitives of the concurrency engine.
//!
//! [`Slot`] is the one-shot handoff between dispatch and a pre-warmed worker
//! thread: the worker waits for exactly one task, runs it, and exits.
//! [`Barrier`] counts in-flight tasks and lets `hangup` wait until all of
//! them drain. [`Latch`] is a one-shot gate used for startup signalling.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Condvar, Mutex};

/// Unit of work handed to a worker slot.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// One-shot gate: threads in [`wait`](Latch::wait) block until
/// [`open`](Latch::open) fires once.
#[derive(Debug, Default)]
pub struct Latch {
    opened: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let mut opened = self.opened.lock().expect("latch poisoned");
        *opened = true;
        self.cond.notify_all();
    }

    pub fn wait(&self) {
        let mut opened = self.opened.lock().expect("latch poisoned");
        while !*opened {
            opened = self.cond.wait(opened).expect("latch poisoned");
        }
    }
}

/// Assignment side of a single-task worker handoff.
///
/// Created together with its [`SlotRunner`]; the runner blocks on a worker
/// thread until the slot is assigned one task or released. Either way the
/// worker exits afterwards, so a slot is never reused.
pub struct Slot {
    sender: Mutex<Option<SyncSender<Task>>>,
}

impl Slot {
    pub fn new() -> (Self, SlotRunner) {
        let (sender, receiver) = mpsc::sync_channel(1);
        (Self { sender: Mutex::new(Some(sender)) }, SlotRunner { receiver })
    }

    /// Hands `task` to the waiting worker.
    ///
    /// Fails, returning the task to the caller, when the slot is already
    /// occupied or its worker is gone.
    pub fn assign(&self, task: Task) -> Result<(), Task> {
        let mut sender = self.sender.lock().expect("slot poisoned");
        match sender.take() {
            Some(sender) => sender.send(task).map_err(|mpsc::SendError(task)| task),
            None => Err(task),
        }
    }

    /// Lets an unassigned worker exit; harmless on an occupied slot.
    pub fn release(&self) {
        let mut sender = self.sender.lock().expect("slot poisoned");
        drop(sender.take());
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let occupied = self.sender.lock().map(|s| s.is_none()).unwrap_or(true);
        f.debug_struct("Slot").field("occupied", &occupied).finish()
    }
}

/// Worker side of the handoff: waits for at most one task, runs it, exits.
pub struct SlotRunner {
    receiver: Receiver<Task>,
}

impl SlotRunner {
    /// Blocks until assigned or released. Panics out of the task are
    /// contained so a failing task never tears down anything but itself.
    pub fn run(self) {
        if let Ok(task) = self.receiver.recv() {
            drop(catch_unwind(AssertUnwindSafe(task)));
        }
    }
}

impl fmt::Debug for SlotRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotRunner").finish_non_exhaustive()
    }
}

/// In-flight task counter with a blocking wait for zero.
///
/// The counter may rise again while waiters resume; `wait_idle` only
/// guarantees the count *was* zero at some moment after the call began.
#[derive(Debug, Default)]
pub struct Barrier {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Barrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        let mut count = self.count.lock().expect("barrier poisoned");
        *count += 1;
    }

    pub fn dec(&self) {
        let mut count = self.count.lock().expect("barrier poisoned");
        debug_assert!(*count > 0, "barrier underflow");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    pub fn active(&self) -> usize {
        *self.count.lock().expect("barrier poisoned")
    }

    /// Blocks until the count reaches zero.
    pub fn wait_idle(&self) {
        let mut count = self.count.lock().expect("barrier poisoned");
        while *count > 0 {
            count = self.idle.wait(count).expect("barrier poisoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn slot_runs_exactly_one_task() {
        let (slot, runner) = Slot::new();
        let worker = thread::spawn(move || runner.run());

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        slot.assign(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap_or_else(|_task| panic!("fresh slot must accept"));

        worker.join().unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        // the slot is spent now
        assert!(slot.assign(Box::new(|| {})).is_err());
    }

    #[test]
    fn released_slot_lets_the_worker_exit() {
        let (slot, runner) = Slot::new();
        let worker = thread::spawn(move || runner.run());

        slot.release();
        worker.join().unwrap();
        assert!(slot.assign(Box::new(|| {})).is_err());
    }

    #[test]
    fn runner_contains_task_panics() {
        let (slot, runner) = Slot::new();
        let worker = thread::spawn(move || runner.run());

        slot.assign(Box::new(|| panic!("boom"))).unwrap_or_else(|_task| panic!("must accept"));
        worker.join().unwrap();
    }

    #[test]
    fn barrier_waits_for_zero() {
        let barrier = Arc::new(Barrier::new());
        barrier.inc();
        barrier.inc();

        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait_idle())
        };

        barrier.dec();
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        barrier.dec();
        waiter.join().unwrap();
        assert_eq!(barrier.active(), 0);
    }

    #[test]
    fn latch_releases_all_waiters() {
        let latch = Arc::new(Latch::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let latch = Arc::clone(&latch);
                thread::spawn(move || latch.wait())
            })
            .collect();

        latch.open();
        for w in waiters {
            w.join().unwrap();
        }
    }
}
