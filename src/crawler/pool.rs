//! Resizable worker pool
//!
//! A pool runs N OS threads that all execute the same task. Stopping is cooperative:
//! the task polls [`WorkerHandle::should_stop`] between iterations and returns when it
//! says so. Shrinking hands out a retire quota that exactly `live - k` units claim, and
//! the caller waits on a condition variable until the live count reaches `k`.
//!
//! Every unit must retire exactly once. A task may call [`WorkerHandle::retire_with`]
//! itself to run wrap-up work as the last live unit; if it returns without retiring (or
//! panics) the unit is retired when its handle guard drops.

use crate::CrawlError;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Closure executed by every unit of a pool
pub type Task = Arc<dyn Fn(&WorkerHandle) + Send + Sync>;

/// Lifecycle of a single execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    NotStarted,
    Running,
    Terminated,
}

impl UnitState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => UnitState::NotStarted,
            1 => UnitState::Running,
            _ => UnitState::Terminated,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            UnitState::NotStarted => 0,
            UnitState::Running => 1,
            UnitState::Terminated => 2,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    stop_requested: AtomicBool,
    // units that still have to leave to satisfy a pending shrink
    retire_quota: AtomicUsize,
    live: Mutex<usize>,
    live_changed: Condvar,
}

impl Shared {
    fn live(&self) -> MutexGuard<'_, usize> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A running unit's view of its pool
#[derive(Debug)]
pub struct WorkerHandle {
    id: usize,
    shared: Arc<Shared>,
    state: Arc<AtomicU8>,
    claimed_retire: AtomicBool,
    retired: AtomicBool,
}

impl WorkerHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns true when this unit should leave its loop
    ///
    /// That is the case after a pool-wide stop, or once this unit has claimed a slot
    /// of a pending shrink. A claim is permanent for the unit.
    pub fn should_stop(&self) -> bool {
        if self.shared.stop_requested.load(Ordering::SeqCst) {
            return true;
        }
        if self.claimed_retire.load(Ordering::SeqCst) {
            return true;
        }

        let claimed = self
            .shared
            .retire_quota
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |quota| {
                quota.checked_sub(1)
            })
            .is_ok();
        if claimed {
            self.claimed_retire.store(true, Ordering::SeqCst);
        }
        claimed
    }

    /// Removes this unit from the live count
    ///
    /// Same as [`WorkerHandle::retire_with`] with nothing to run.
    pub fn retire(&self) -> bool {
        self.retire_with(|| {})
    }

    /// Removes this unit from the live count, running `on_last` first if it is the last
    ///
    /// The last unit stays live until `on_last` returns, so the pool does not report
    /// itself terminated while wrap-up work is still running. Only the first call has an
    /// effect. A unit that leaves without having claimed a shrink slot still counts
    /// towards a pending shrink.
    ///
    /// # Returns
    ///
    /// True if this was the last live unit of the pool
    pub fn retire_with<F: FnOnce()>(&self, on_last: F) -> bool {
        if self.retired.swap(true, Ordering::SeqCst) {
            return false;
        }
        if !self.claimed_retire.load(Ordering::SeqCst) {
            let _ = self
                .shared
                .retire_quota
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |quota| {
                    quota.checked_sub(1)
                });
        }

        let last = {
            let mut live = self.shared.live();
            if *live > 1 {
                self.leave(&mut live);
                false
            } else {
                true
            }
        };
        if last {
            let _leave = LeaveOnDrop(self);
            on_last();
        }
        last
    }

    fn leave(&self, live: &mut usize) {
        self.state
            .store(UnitState::Terminated.as_u8(), Ordering::SeqCst);
        *live = live.saturating_sub(1);
        self.shared.live_changed.notify_all();
    }
}

// leaves the live count even if the last unit's wrap-up panics
struct LeaveOnDrop<'a>(&'a WorkerHandle);

impl Drop for LeaveOnDrop<'_> {
    fn drop(&mut self) {
        let mut live = self.0.shared.live();
        self.0.leave(&mut live);
    }
}

struct RetireOnDrop(WorkerHandle);

impl Drop for RetireOnDrop {
    fn drop(&mut self) {
        if !self.0.retired.load(Ordering::SeqCst) {
            tracing::trace!("worker {} retired on exit", self.0.id);
            self.0.retire();
        }
    }
}

struct Unit {
    id: usize,
    state: Arc<AtomicU8>,
    thread: JoinHandle<()>,
}

/// Set of threads sharing one task
pub struct WorkerPool {
    shared: Arc<Shared>,
    task: Mutex<Option<Task>>,
    size: AtomicUsize,
    next_id: AtomicUsize,
    units: Mutex<Vec<Unit>>,
}

impl WorkerPool {
    /// Creates a pool that will start `size` units
    pub fn new(size: usize) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            task: Mutex::new(None),
            size: AtomicUsize::new(size),
            next_id: AtomicUsize::new(1),
            units: Mutex::new(Vec::new()),
        }
    }

    fn units(&self) -> MutexGuard<'_, Vec<Unit>> {
        self.units.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_task(&self) -> Option<Task> {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Sets the task run by units spawned from now on
    pub fn set_task<F>(&self, task: F)
    where
        F: Fn(&WorkerHandle) + Send + Sync + 'static,
    {
        let task: Task = Arc::new(task);
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
    }

    /// Clears the stop flag and spawns the configured number of units
    ///
    /// Fails with `InvalidState` when no task is set or units are still alive.
    pub fn start(&self) -> Result<(), CrawlError> {
        let task = self
            .current_task()
            .ok_or_else(|| CrawlError::InvalidState("worker pool has no task".to_string()))?;
        if !self.all_terminated() {
            return Err(CrawlError::InvalidState(
                "worker pool is already running".to_string(),
            ));
        }

        self.reap();
        self.shared.stop_requested.store(false, Ordering::SeqCst);
        self.shared.retire_quota.store(0, Ordering::SeqCst);

        let size = self.size();
        let mut units = self.units();
        for _ in 0..size {
            self.spawn_unit(&task, &mut units)?;
        }
        tracing::debug!("worker pool started with {} units", size);
        Ok(())
    }

    /// Asks every unit to leave its loop at the next iteration boundary
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop_requested.load(Ordering::SeqCst)
    }

    /// Grows the pool to `total` live units
    ///
    /// Nothing is spawned while a stop is pending.
    ///
    /// # Returns
    ///
    /// The number of units spawned
    pub fn add_more_threads(&self, total: usize) -> Result<usize, CrawlError> {
        let task = self
            .current_task()
            .ok_or_else(|| CrawlError::InvalidState("worker pool has no task".to_string()))?;
        if self.is_stop_requested() {
            tracing::debug!("stop pending, not growing the worker pool");
            return Ok(0);
        }

        self.reap();
        let live = self.live_count();
        if total <= live {
            return Ok(0);
        }

        let mut units = self.units();
        for _ in live..total {
            self.spawn_unit(&task, &mut units)?;
        }
        self.size.store(total, Ordering::SeqCst);
        tracing::debug!("worker pool grown from {} to {} units", live, total);
        Ok(total - live)
    }

    /// Shrinks the pool to `target` live units and blocks until it has
    ///
    /// Must not be called from inside a unit of this pool.
    pub fn decrease_threads_to(&self, target: usize) {
        {
            let mut live = self.shared.live();
            if *live > target {
                self.shared
                    .retire_quota
                    .store(*live - target, Ordering::SeqCst);
                while *live > target {
                    live = self
                        .shared
                        .live_changed
                        .wait(live)
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
            self.shared.retire_quota.store(0, Ordering::SeqCst);
            self.shared.stop_requested.store(false, Ordering::SeqCst);
        }

        self.size.store(target, Ordering::SeqCst);
        self.reap();
        tracing::debug!("worker pool shrunk to {} units", target);
    }

    /// Returns true when no unit is alive
    pub fn all_terminated(&self) -> bool {
        self.live_count() == 0
    }

    /// Returns true when exactly one unit is alive
    pub fn is_last_thread(&self) -> bool {
        self.live_count() == 1
    }

    pub fn live_count(&self) -> usize {
        *self.shared.live()
    }

    /// Configured number of units
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// States of the units that have not been joined yet
    pub fn unit_states(&self) -> Vec<(usize, UnitState)> {
        self.units()
            .iter()
            .map(|unit| (unit.id, UnitState::from_u8(unit.state.load(Ordering::SeqCst))))
            .collect()
    }

    /// Waits for every unit, including units spawned while waiting
    pub fn join(&self) {
        loop {
            let units: Vec<Unit> = self.units().drain(..).collect();
            if units.is_empty() {
                return;
            }
            for unit in units {
                join_unit(unit);
            }
        }
    }

    // joins finished units outside the lock
    fn reap(&self) {
        let finished: Vec<Unit> = {
            let mut units = self.units();
            let (finished, running): (Vec<Unit>, Vec<Unit>) =
                units.drain(..).partition(|unit| unit.thread.is_finished());
            *units = running;
            finished
        };
        for unit in finished {
            join_unit(unit);
        }
    }

    fn spawn_unit(&self, task: &Task, units: &mut Vec<Unit>) -> Result<(), CrawlError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let state = Arc::new(AtomicU8::new(UnitState::NotStarted.as_u8()));
        let handle = WorkerHandle {
            id,
            shared: Arc::clone(&self.shared),
            state: Arc::clone(&state),
            claimed_retire: AtomicBool::new(false),
            retired: AtomicBool::new(false),
        };

        *self.shared.live() += 1;
        let task = Arc::clone(task);
        let spawned = thread::Builder::new()
            .name(format!("crawler-worker-{}", id))
            .spawn(move || {
                let guard = RetireOnDrop(handle);
                guard
                    .0
                    .state
                    .store(UnitState::Running.as_u8(), Ordering::SeqCst);
                task(&guard.0);
            });

        match spawned {
            Ok(thread) => {
                units.push(Unit { id, state, thread });
                Ok(())
            }
            Err(e) => {
                let mut live = self.shared.live();
                *live = live.saturating_sub(1);
                self.shared.live_changed.notify_all();
                Err(CrawlError::Io(e))
            }
        }
    }
}

fn join_unit(unit: Unit) {
    if unit.thread.join().is_err() {
        tracing::error!("worker {} panicked", unit.id);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size())
            .field("live", &self.live_count())
            .field("stop_requested", &self.is_stop_requested())
            .finish_non_exhaustive()
    }
}
