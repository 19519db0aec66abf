//! Platform abstraction traits for the reconciler.
//!
//! The reconciler never owns an event loop. It asks the embedder to run
//! callbacks at a priority, to run microtasks, and to say when a time slice
//! is used up.

/// Coarse priority levels understood by the task scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchedulerPriority {
    Immediate,
    UserBlocking,
    Normal,
    Low,
    Idle,
}

/// Opaque handle to a scheduled callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(pub u64);

/// What a task callback wants to happen next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// Done; drop the callback.
    Complete,
    /// Yielded; call the same callback again later.
    Continue,
}

/// Task body. The flag is `true` when the task's deadline has passed and it
/// must finish without yielding.
pub type TaskCallback = Box<dyn FnMut(bool) -> TaskStatus + 'static>;

/// Schedules work for the reconciler.
///
/// All methods are called from the thread that owns the root. Callbacks may
/// call back into the scheduler, so implementations must not hold interior
/// borrows while running them.
pub trait Scheduler {
    /// Queue `callback` as a macrotask at `priority`.
    fn schedule_callback(&self, priority: SchedulerPriority, callback: TaskCallback)
        -> TaskHandle;

    /// Drop a callback that has not finished. Cancelling an unknown or
    /// finished handle is a no-op.
    fn cancel_callback(&self, handle: TaskHandle);

    /// Whether the running task has used up its time slice.
    fn should_yield(&self) -> bool;

    /// Run `task` after the current call stack unwinds, before any macrotask.
    fn schedule_microtask(&self, task: Box<dyn FnOnce() + 'static>);
}
