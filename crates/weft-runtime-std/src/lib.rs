//! Standard scheduler for the weft reconciler.
//!
//! [`StdScheduler`] implements [`weft_core::Scheduler`] with a
//! deadline-ordered task heap and a frame budget measured with
//! [`std::time::Instant`]. It runs on the thread that owns the root; the
//! embedder drives it from its own loop with [`StdScheduler::run_until_idle`]
//! or [`StdScheduler::run_for`].

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use log::trace;
use weft_core::collections::map::HashSet;
use weft_core::{Scheduler, SchedulerPriority, TaskCallback, TaskHandle, TaskStatus};

/// Time a task may run before [`Scheduler::should_yield`] says so.
pub const DEFAULT_FRAME_BUDGET: Duration = Duration::from_millis(5);

/// How long a task of each priority may wait before it is run without
/// yielding. `None` never times out.
fn timeout_for(priority: SchedulerPriority) -> Option<Duration> {
    match priority {
        SchedulerPriority::Immediate => Some(Duration::ZERO),
        SchedulerPriority::UserBlocking => Some(Duration::from_millis(250)),
        SchedulerPriority::Normal => Some(Duration::from_secs(5)),
        SchedulerPriority::Low => Some(Duration::from_secs(10)),
        SchedulerPriority::Idle => None,
    }
}

struct QueuedTask {
    handle: TaskHandle,
    /// `None` sorts after every deadline.
    deadline: Option<Instant>,
    sequence: u64,
    callback: TaskCallback,
}

impl QueuedTask {
    fn sort_key(&self) -> (bool, Option<Instant>, u64) {
        (self.deadline.is_none(), self.deadline, self.sequence)
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // Reversed: `BinaryHeap` is a max-heap and the earliest deadline wins.
    fn cmp(&self, other: &Self) -> Ordering {
        other.sort_key().cmp(&self.sort_key())
    }
}

/// Single-threaded scheduler backed by `std` time.
pub struct StdScheduler {
    tasks: RefCell<BinaryHeap<QueuedTask>>,
    microtasks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    cancelled: RefCell<HashSet<TaskHandle>>,
    next_handle: Cell<u64>,
    next_sequence: Cell<u64>,
    frame_budget: Duration,
    slice_start: Cell<Option<Instant>>,
}

impl StdScheduler {
    pub fn new() -> Self {
        Self::with_frame_budget(DEFAULT_FRAME_BUDGET)
    }

    pub fn with_frame_budget(frame_budget: Duration) -> Self {
        Self {
            tasks: RefCell::new(BinaryHeap::new()),
            microtasks: RefCell::new(VecDeque::new()),
            cancelled: RefCell::new(HashSet::default()),
            next_handle: Cell::new(1),
            next_sequence: Cell::new(0),
            frame_budget,
            slice_start: Cell::new(None),
        }
    }

    pub fn has_pending_work(&self) -> bool {
        !self.tasks.borrow().is_empty() || !self.microtasks.borrow().is_empty()
    }

    pub fn run_microtasks(&self) {
        loop {
            let next = self.microtasks.borrow_mut().pop_front();
            match next {
                Some(task) => task(),
                None => return,
            }
        }
    }

    /// Runs one slice of the most urgent task. Returns `false` when idle.
    pub fn run_next_task(&self) -> bool {
        self.run_microtasks();
        let next = self.tasks.borrow_mut().pop();
        let Some(mut task) = next else {
            return false;
        };
        if self.cancelled.borrow_mut().remove(&task.handle) {
            return true;
        }
        let now = Instant::now();
        let did_timeout = task.deadline.is_some_and(|deadline| deadline <= now);
        self.slice_start.set(Some(now));
        let status = (task.callback)(did_timeout);
        self.slice_start.set(None);
        let cancelled = self.cancelled.borrow_mut().remove(&task.handle);
        if status == TaskStatus::Continue && !cancelled {
            trace!("task {:?} yielded", task.handle);
            self.tasks.borrow_mut().push(task);
        }
        self.run_microtasks();
        true
    }

    /// Runs tasks until none are left.
    pub fn run_until_idle(&self) {
        while self.run_next_task() {}
        self.run_microtasks();
    }

    /// Runs tasks for at most `duration`, e.g. one frame of an event loop.
    /// Returns whether work is left.
    pub fn run_for(&self, duration: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < duration {
            if !self.run_next_task() {
                return false;
            }
        }
        self.has_pending_work()
    }
}

impl Default for StdScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field("tasks", &self.tasks.borrow().len())
            .field("microtasks", &self.microtasks.borrow().len())
            .field("frame_budget", &self.frame_budget)
            .finish()
    }
}

impl Scheduler for StdScheduler {
    fn schedule_callback(&self, priority: SchedulerPriority, callback: TaskCallback) -> TaskHandle {
        let handle = TaskHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        let sequence = self.next_sequence.get();
        self.next_sequence.set(sequence + 1);
        let deadline = timeout_for(priority).map(|timeout| Instant::now() + timeout);
        self.tasks.borrow_mut().push(QueuedTask {
            handle,
            deadline,
            sequence,
            callback,
        });
        handle
    }

    fn cancel_callback(&self, handle: TaskHandle) {
        self.cancelled.borrow_mut().insert(handle);
    }

    fn should_yield(&self) -> bool {
        self.slice_start
            .get()
            .is_some_and(|start| start.elapsed() >= self.frame_budget)
    }

    fn schedule_microtask(&self, task: Box<dyn FnOnce()>) {
        self.microtasks.borrow_mut().push_back(task);
    }
}
