//! Cooperative scheduler multiplexing test threads over one clock.
//!
//! Every test thread runs on its own host thread, but exactly one is ever
//! runnable: all others are parked on a private semaphore (while waiting
//! for a step) or on a host-thread join (while joining). Hand-off is a
//! release of the next thread's semaphore followed by an acquire of one's
//! own, so the underlying simulator only ever sees sequential access.
//!
//! Within a tick, eligible threads are resumed in depth-first pre-order
//! over the fork tree. Simulation time only advances through
//! [`Scheduler::step`] and the injected step callback; the callback is
//! never invoked while scheduler internals are locked.

use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::TestError;
use crate::order::ThreadOrderTree;

/// Identifier of a test thread; the main thread is 0.
pub type SimThreadId = usize;

/// A counting semaphore used for thread hand-off.
struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
    }

    fn release(&self) {
        *self.permits.lock() += 1;
        self.available.notify_one();
    }
}

/// What a test thread is currently doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Running on its host thread.
    Active,
    /// Parked until the given thread finishes.
    WaitingForJoin(SimThreadId),
    /// Parked until the simulation reaches the given step.
    WaitingUntil(u64),
    /// Done; its host thread has exited or is exiting.
    Finished,
}

struct ThreadInfo {
    name: String,
    status: ThreadStatus,
    sem: Arc<Semaphore>,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    threads: Vec<ThreadInfo>,
    /// Parent of each thread ever forked; outlives the order tree's nodes
    /// so ancestry checks still work for finished threads.
    parents: Vec<SimThreadId>,
    active: SimThreadId,
    current_step: u64,
    order: ThreadOrderTree,
    failure: Option<TestError>,
    panic: Option<Box<dyn Any + Send>>,
}

/// Callback advancing the simulation: `(from_step, cycles) -> delta`.
type StepFn = dyn Fn(u64, u64) -> Result<u64, TestError> + Send + Sync;

/// The cooperative test-thread scheduler.
pub struct Scheduler {
    inner: Mutex<Inner>,
    step_fn: Box<StepFn>,
}

impl Scheduler {
    /// Creates a scheduler whose simulation time is advanced by `step_fn`.
    ///
    /// The callback receives the current step and a cycle count and returns
    /// the cycles actually taken, which may be fewer when a timeout window
    /// clamps the request.
    pub fn new(
        step_fn: impl Fn(u64, u64) -> Result<u64, TestError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        let main = ThreadInfo {
            name: "main".to_string(),
            status: ThreadStatus::Active,
            sem: Arc::new(Semaphore::new(0)),
            handle: None,
        };
        Arc::new(Self {
            inner: Mutex::new(Inner {
                threads: vec![main],
                parents: vec![0],
                active: 0,
                current_step: 0,
                order: ThreadOrderTree::new(),
                failure: None,
                panic: None,
            }),
            step_fn: Box::new(step_fn),
        })
    }

    /// The current simulation step.
    pub fn current_step(&self) -> u64 {
        self.inner.lock().current_step
    }

    /// The id of the thread currently running.
    pub fn active_thread(&self) -> SimThreadId {
        self.inner.lock().active
    }

    /// Whether `a` is `b` or an ancestor of `b` in the fork tree.
    ///
    /// Ancestry persists after a thread finishes, so a parent that joined
    /// a child is still related to it for access checking.
    pub fn is_ancestor_of(&self, a: SimThreadId, b: SimThreadId) -> bool {
        let inner = self.inner.lock();
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            if current == 0 {
                return false;
            }
            current = inner.parents[current];
        }
    }

    /// The status of a thread, for inspection.
    pub fn status(&self, id: SimThreadId) -> ThreadStatus {
        self.inner.lock().threads[id].status
    }

    /// The name a thread was forked with.
    pub fn thread_name(&self, id: SimThreadId) -> String {
        self.inner.lock().threads[id].name.clone()
    }

    /// Number of threads ever created, including finished ones.
    pub fn thread_count(&self) -> usize {
        self.inner.lock().threads.len()
    }

    fn record_failure(&self, error: TestError) {
        let mut inner = self.inner.lock();
        if inner.failure.is_none() {
            inner.failure = Some(error);
        }
    }

    /// Re-raises a failure or panic recorded by a finished thread.
    fn take_failure(&self) -> Result<(), TestError> {
        let mut inner = self.inner.lock();
        if let Some(payload) = inner.panic.take() {
            drop(inner);
            panic::resume_unwind(payload);
        }
        match inner.failure.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Advances the simulation; never called with `inner` locked.
    fn do_step(&self, cycles: u64) -> Result<(), TestError> {
        let from = self.current_step();
        let delta = (self.step_fn)(from, cycles)?;
        self.inner.lock().current_step += delta;
        Ok(())
    }

    /// Advances the simulation to the nearest step a parked thread waits
    /// for; a no-op when nothing is parked on time.
    fn advance_to_nearest_wait(&self) -> Result<(), TestError> {
        let delta = {
            let inner = self.inner.lock();
            match Self::nearest_wait(&inner) {
                Some(wake) if wake > inner.current_step => wake - inner.current_step,
                _ => 0,
            }
        };
        if delta > 0 {
            self.do_step(delta)?;
        }
        Ok(())
    }

    fn nearest_wait(inner: &Inner) -> Option<u64> {
        inner
            .threads
            .iter()
            .filter_map(|t| match t.status {
                ThreadStatus::WaitingUntil(step) => Some(step),
                _ => None,
            })
            .min()
    }

    /// Picks the first schedulable thread in depth-first tree order: parked
    /// until the current step, or joining a thread that has finished.
    fn find_next_thread(inner: &mut Inner) -> Option<SimThreadId> {
        let order = inner.order.order().to_vec();
        for id in order {
            match inner.threads[id].status {
                ThreadStatus::WaitingUntil(step) if step == inner.current_step => return Some(id),
                ThreadStatus::WaitingForJoin(target)
                    if inner.threads[target].status == ThreadStatus::Finished =>
                {
                    return Some(id)
                }
                _ => {}
            }
        }
        None
    }

    fn mark_active(&self, id: SimThreadId) {
        let mut inner = self.inner.lock();
        inner.active = id;
        inner.threads[id].status = ThreadStatus::Active;
    }

    /// Hands control to the next schedulable thread and blocks the caller.
    ///
    /// With `mark` set, the caller is still Active and is parked with that
    /// status after the search; with `mark` unset the caller already parked
    /// itself (the step window case) and may be picked again immediately.
    /// Raises [`TestError::Deadlock`] and stays Active when nothing is
    /// schedulable.
    fn hand_off(&self, mark: Option<ThreadStatus>) -> Result<(), TestError> {
        let me;
        let wake = {
            let mut inner = self.inner.lock();
            me = inner.active;
            let Some(next) = Self::find_next_thread(&mut inner) else {
                inner.threads[me].status = ThreadStatus::Active;
                return Err(TestError::Deadlock);
            };
            if let Some(status) = mark {
                inner.threads[me].status = status;
            }
            if next == me {
                inner.threads[me].status = ThreadStatus::Active;
                return Ok(());
            }
            log::trace!(
                "hand-off: {} -> {} at step {}",
                inner.threads[me].name,
                inner.threads[next].name,
                inner.current_step
            );
            match inner.threads[next].status {
                ThreadStatus::WaitingUntil(_) => Some(inner.threads[next].sem.clone()),
                // A satisfied joiner resumes through its host-thread join;
                // no semaphore is involved.
                _ => None,
            }
        };
        if let Some(sem) = wake {
            sem.release();
        }
        let my_sem = { self.inner.lock().threads[me].sem.clone() };
        my_sem.acquire();
        self.mark_active(me);
        Ok(())
    }

    /// Parks the caller for `cycles` and lets the next thread run.
    fn yield_for(&self, cycles: u64) -> Result<(), TestError> {
        let until = self.inner.lock().current_step + cycles;
        self.hand_off(Some(ThreadStatus::WaitingUntil(until)))
    }

    /// Forks a new test thread under the active thread.
    ///
    /// The newborn starts parked at the current step and the caller yields
    /// for zero cycles, so the child body runs before `fork` returns.
    pub fn fork<F>(self: &Arc<Self>, name: Option<&str>, body: F) -> Result<SimThreadId, TestError>
    where
        F: FnOnce() -> Result<(), TestError> + Send + 'static,
    {
        let sem = Arc::new(Semaphore::new(0));
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.threads.len();
            let parent = inner.active;
            let name = name
                .map(str::to_string)
                .unwrap_or_else(|| format!("thread-{id}"));
            let current_step = inner.current_step;
            inner.order.add_thread(parent, id);
            inner.parents.push(parent);
            inner.threads.push(ThreadInfo {
                name: name.clone(),
                status: ThreadStatus::WaitingUntil(current_step),
                sem: sem.clone(),
                handle: None,
            });
            let sched = Arc::clone(self);
            let child_sem = sem.clone();
            let handle = thread::Builder::new()
                .name(name)
                .spawn(move || {
                    child_sem.acquire();
                    sched.mark_active(id);
                    sched.run_to_finish(id, body);
                })
                .unwrap_or_else(|e| panic!("failed to spawn host thread: {e}"));
            inner.threads[id].handle = Some(handle);
            id
        };
        self.yield_for(0)?;
        Ok(id)
    }

    /// Body wrapper for forked threads: record the outcome, join any live
    /// children, then finish.
    fn run_to_finish<F>(self: Arc<Self>, id: SimThreadId, body: F)
    where
        F: FnOnce() -> Result<(), TestError> + Send,
    {
        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => self.record_failure(error),
            Err(payload) => {
                let mut inner = self.inner.lock();
                if inner.panic.is_none() {
                    inner.panic = Some(payload);
                }
            }
        }
        // A thread may not finish while descendants are alive.
        let children = { self.inner.lock().order.children_of(id) };
        if !children.is_empty() {
            if let Err(error) = self.join(&children) {
                self.record_failure(error);
            }
        }
        self.finish_self(id);
    }

    /// Steps the active thread by `cycles` (at least 1).
    ///
    /// If no other thread would become eligible inside the window the
    /// simulation advances directly; otherwise the caller parks at the end
    /// of its window, time advances to the nearest wake-up and control is
    /// handed off.
    pub fn step(&self, cycles: u64) -> Result<(), TestError> {
        if cycles == 0 {
            return Ok(());
        }
        let advance = {
            let mut inner = self.inner.lock();
            let me = inner.active;
            let current = inner.current_step;
            match Self::nearest_wait(&inner) {
                None => None,
                Some(wake) if wake > current + cycles => None,
                Some(wake) => {
                    inner.threads[me].status = ThreadStatus::WaitingUntil(current + cycles);
                    Some(wake - current)
                }
            }
        };
        match advance {
            None => self.do_step(cycles),
            Some(advance) => {
                if advance > 0 {
                    if let Err(error) = self.do_step(advance) {
                        let mut inner = self.inner.lock();
                        let me = inner.active;
                        inner.threads[me].status = ThreadStatus::Active;
                        return Err(error);
                    }
                }
                self.hand_off(None)
            }
        }
    }

    /// Joins the given threads in order, handing control away while each
    /// unfinished target runs to completion.
    ///
    /// Failures and panics recorded by finished threads are re-raised here
    /// when the caller is the main thread.
    pub fn join(&self, ids: &[SimThreadId]) -> Result<(), TestError> {
        for &target in ids {
            let finished = {
                let inner = self.inner.lock();
                inner.threads[target].status == ThreadStatus::Finished
            };
            if !finished {
                self.advance_to_nearest_wait()?;
                let blocked = {
                    let mut inner = self.inner.lock();
                    let me = inner.active;
                    if inner.threads[target].status == ThreadStatus::Finished {
                        None
                    } else {
                        let Some(next) = Self::find_next_thread(&mut inner) else {
                            return Err(TestError::Deadlock);
                        };
                        let Some(handle) = inner.threads[target].handle.take() else {
                            return Err(TestError::NotSupported(
                                "joining a thread that is already being joined",
                            ));
                        };
                        inner.threads[me].status = ThreadStatus::WaitingForJoin(target);
                        let sem = match inner.threads[next].status {
                            ThreadStatus::WaitingUntil(_) => Some(inner.threads[next].sem.clone()),
                            _ => None,
                        };
                        Some((me, handle, sem))
                    }
                };
                if let Some((me, handle, sem)) = blocked {
                    if let Some(sem) = sem {
                        sem.release();
                    }
                    // The target's host thread exits right after marking
                    // itself finished; panics were already captured.
                    let _ = handle.join();
                    self.mark_active(me);
                }
            }
            if self.active_thread() == 0 {
                self.take_failure()?;
            }
        }
        Ok(())
    }

    /// Marks the exiting thread finished and passes control on.
    ///
    /// A satisfied joiner resumes by itself once this host thread exits;
    /// otherwise time advances to the nearest wait and the next runnable
    /// thread is woken. With every thread finished there is nothing to do.
    fn finish_self(&self, id: SimThreadId) {
        {
            let mut inner = self.inner.lock();
            inner.threads[id].status = ThreadStatus::Finished;
            inner.order.finish_thread(id);
            // Drop our own handle if nobody claimed it for a join.
            let _ = inner.threads[id].handle.take();
            let joined = inner
                .threads
                .iter()
                .any(|t| t.status == ThreadStatus::WaitingForJoin(id));
            let all_finished = inner
                .threads
                .iter()
                .all(|t| t.status == ThreadStatus::Finished);
            if joined || all_finished {
                return;
            }
        }
        if let Err(error) = self.advance_to_nearest_wait() {
            self.record_failure(error);
        }
        let wake = {
            let mut inner = self.inner.lock();
            match Self::find_next_thread(&mut inner) {
                Some(next) => match inner.threads[next].status {
                    ThreadStatus::WaitingUntil(_) => Some(inner.threads[next].sem.clone()),
                    _ => None,
                },
                None => {
                    inner.failure.get_or_insert(TestError::Deadlock);
                    None
                }
            }
        };
        if let Some(sem) = wake {
            sem.release();
        }
    }

    /// Joins every live thread, then finishes the main thread itself.
    pub fn finish_main(&self) -> Result<(), TestError> {
        let live: Vec<SimThreadId> = {
            let inner = self.inner.lock();
            (1..inner.threads.len())
                .filter(|&i| inner.threads[i].status != ThreadStatus::Finished)
                .collect()
        };
        let joined = self.join(&live);
        {
            let mut inner = self.inner.lock();
            inner.threads[0].status = ThreadStatus::Finished;
            inner.order.finish_thread(0);
        }
        joined?;
        self.take_failure()
    }
}
