//! A scheduler driven by hand, for tests and embedders that own their loop.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::collections::map::HashSet;
use crate::platform::{Scheduler, SchedulerPriority, TaskCallback, TaskHandle, TaskStatus};

struct Task {
    handle: TaskHandle,
    priority: SchedulerPriority,
    callback: Option<TaskCallback>,
}

/// Runs nothing until asked.
///
/// Tasks run in priority order, first come first served within a priority.
/// A yield budget makes [`Scheduler::should_yield`] answer `true` after a
/// fixed number of calls per task run, which makes time slicing
/// deterministic.
#[derive(Default)]
pub struct ManualScheduler {
    tasks: RefCell<Vec<Task>>,
    microtasks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    cancelled: RefCell<HashSet<TaskHandle>>,
    next_handle: Cell<u64>,
    yield_budget: Cell<Option<usize>>,
    yield_checks: Cell<usize>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(n)`: each task run may process `n` units before it is asked to
    /// yield. `None`: never yield.
    pub fn set_yield_budget(&self, budget: Option<usize>) {
        self.yield_budget.set(budget);
    }

    pub fn pending_task_count(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn pending_microtask_count(&self) -> usize {
        self.microtasks.borrow().len()
    }

    pub fn has_pending_work(&self) -> bool {
        self.pending_task_count() > 0 || self.pending_microtask_count() > 0
    }

    /// Drains the microtask queue, including microtasks queued meanwhile.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.microtasks.borrow_mut().pop_front();
            let Some(task) = next else {
                return ran;
            };
            task();
            ran += 1;
        }
    }

    /// Runs microtasks, then one slice of the most urgent task. Returns
    /// `false` when there was no task.
    pub fn run_next_task(&self) -> bool {
        self.run_task(false)
    }

    /// Like [`ManualScheduler::run_next_task`], telling the task its
    /// deadline has passed.
    pub fn run_next_task_timed_out(&self) -> bool {
        self.run_task(true)
    }

    /// Runs everything, including work queued by the work that runs.
    pub fn run_until_idle(&self) {
        loop {
            self.run_microtasks();
            if !self.run_task(false) {
                break;
            }
        }
        self.run_microtasks();
    }

    fn run_task(&self, did_timeout: bool) -> bool {
        self.run_microtasks();
        let taken = {
            let mut tasks = self.tasks.borrow_mut();
            let position = tasks
                .iter()
                .enumerate()
                .min_by_key(|(_, task)| task.priority)
                .map(|(index, _)| index);
            position.map(|index| tasks.remove(index))
        };
        let Some(mut task) = taken else {
            return false;
        };
        let Some(mut callback) = task.callback.take() else {
            return true;
        };
        self.yield_checks.set(0);
        let status = callback(did_timeout);
        let cancelled = self.cancelled.borrow_mut().remove(&task.handle);
        if status == TaskStatus::Continue && !cancelled {
            task.callback = Some(callback);
            // A continuation keeps its place ahead of later tasks of the same
            // priority.
            self.tasks.borrow_mut().insert(0, task);
        }
        self.run_microtasks();
        true
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_callback(&self, priority: SchedulerPriority, callback: TaskCallback) -> TaskHandle {
        let handle = TaskHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        self.tasks.borrow_mut().push(Task {
            handle,
            priority,
            callback: Some(callback),
        });
        handle
    }

    fn cancel_callback(&self, handle: TaskHandle) {
        let mut tasks = self.tasks.borrow_mut();
        let before = tasks.len();
        tasks.retain(|task| task.handle != handle);
        if tasks.len() == before {
            // Possibly the running task; it is dropped when it returns.
            self.cancelled.borrow_mut().insert(handle);
        }
    }

    fn should_yield(&self) -> bool {
        let Some(budget) = self.yield_budget.get() else {
            return false;
        };
        let used = self.yield_checks.get();
        if used >= budget {
            return true;
        }
        self.yield_checks.set(used + 1);
        false
    }

    fn schedule_microtask(&self, task: Box<dyn FnOnce()>) {
        self.microtasks.borrow_mut().push_back(task);
    }
}
