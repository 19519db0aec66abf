//! A mounted tree and the glue between its updates and the scheduler.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use log::{debug, error, trace, warn};

use crate::element::Child;
use crate::error::ReconcileError;
use crate::hooks::UpdateTarget;
use crate::host::{Host, HostId};
use crate::lanes::{next_lanes, Lane, Lanes, NO_LANES};
use crate::platform::{Scheduler, SchedulerPriority, TaskHandle, TaskStatus};
use crate::sync_queue::SyncQueue;
use crate::update_queue::{Action, SharedQueue, Update};
use crate::work_loop::{RenderExit, RootState};
use crate::work_node::{NodeSnapshot, WorkId};

/// Knobs of a root.
#[derive(Clone, Debug)]
pub struct RootOptions {
    /// Lane for updates issued outside [`Root::run_with_priority`].
    pub default_lane: Lane,
    /// Whether non-blocking renders yield between nodes.
    pub time_slicing: bool,
    /// Name used in log lines.
    pub label: Option<String>,
}

impl Default for RootOptions {
    fn default() -> Self {
        Self {
            default_lane: Lanes::SYNC,
            time_slicing: true,
            label: None,
        }
    }
}

impl RootOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_lane(mut self, lane: Lane) -> Self {
        self.default_lane = lane;
        self
    }

    pub fn time_slicing(mut self, enabled: bool) -> Self {
        self.time_slicing = enabled;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[derive(Clone, Copy, Debug)]
struct ScheduledCallback {
    lane: Lane,
    /// `None` for work queued on the sync queue.
    handle: Option<TaskHandle>,
    token: u64,
}

struct RootInner<H: Host + 'static> {
    weak_self: Weak<RootInner<H>>,
    host: RefCell<H>,
    state: RefCell<RootState>,
    scheduler: Rc<dyn Scheduler>,
    options: RootOptions,
    container: HostId,
    root_node: WorkId,
    root_queue: SharedQueue<Child>,
    pending_lanes: Cell<Lanes>,
    /// Updates not yet folded into the tree; applied when a render starts.
    marks: RefCell<Vec<(WorkId, Lane)>>,
    callback: Cell<Option<ScheduledCallback>>,
    next_token: Cell<u64>,
    sync_queue: SyncQueue,
    microtask_scheduled: Cell<bool>,
    update_lane: Cell<Option<Lane>>,
    passive_scheduled: Cell<bool>,
    last_error: RefCell<Option<ReconcileError>>,
    commits: Cell<u64>,
}

impl<H: Host + 'static> UpdateTarget for RootInner<H> {
    fn request_update_lane(&self) -> Lane {
        self.update_lane.get().unwrap_or(self.options.default_lane)
    }

    fn schedule_update(&self, node: WorkId, lane: Lane) {
        trace!("{}: update on {} at {:?}", self.label(), node, lane);
        self.marks.borrow_mut().push((node, lane));
        self.pending_lanes.set(self.pending_lanes.get() | lane);
        self.ensure_root_is_scheduled();
    }
}

impl<H: Host + 'static> RootInner<H> {
    fn label(&self) -> &str {
        self.options.label.as_deref().unwrap_or("root")
    }

    fn target(&self) -> Weak<dyn UpdateTarget> {
        self.weak_self.clone()
    }

    fn is_current(&self, token: u64) -> bool {
        self.callback.get().is_some_and(|cb| cb.token == token)
    }

    fn cancel(&self, callback: ScheduledCallback) {
        if let Some(handle) = callback.handle {
            self.scheduler.cancel_callback(handle);
        }
    }

    /// Makes sure exactly one callback is queued for the highest pending lane.
    fn ensure_root_is_scheduled(&self) {
        let next = next_lanes(self.pending_lanes.get());
        let existing = self.callback.get();
        if next.is_empty() {
            if let Some(existing) = existing {
                self.cancel(existing);
            }
            self.callback.set(None);
            return;
        }
        if existing.is_some_and(|cb| cb.lane == next) {
            return;
        }
        if let Some(existing) = existing {
            trace!("{}: {:?} replaces scheduled {:?}", self.label(), next, existing.lane);
            self.cancel(existing);
        }

        let token = self.next_token.get() + 1;
        self.next_token.set(token);
        let weak = self.weak_self.clone();
        let handle = if next == Lanes::SYNC {
            self.sync_queue.push(Box::new(move || match weak.upgrade() {
                Some(root) => root.perform_sync_work_on_root(),
                None => Ok(()),
            }));
            self.schedule_sync_flush();
            None
        } else {
            let priority = next.to_scheduler_priority();
            Some(self.scheduler.schedule_callback(
                priority,
                Box::new(move |did_timeout| match weak.upgrade() {
                    Some(root) => root.perform_concurrent_work_on_root(token, did_timeout),
                    None => TaskStatus::Complete,
                }),
            ))
        };
        self.callback.set(Some(ScheduledCallback {
            lane: next,
            handle,
            token,
        }));
    }

    fn schedule_sync_flush(&self) {
        if self.microtask_scheduled.replace(true) {
            return;
        }
        let weak = self.weak_self.clone();
        self.scheduler.schedule_microtask(Box::new(move || {
            if let Some(root) = weak.upgrade() {
                root.microtask_scheduled.set(false);
                if let Err(err) = root.sync_queue.flush() {
                    root.report(err);
                }
            }
        }));
    }

    fn schedule_passive_flush(&self) {
        if self.passive_scheduled.replace(true) {
            return;
        }
        let weak = self.weak_self.clone();
        self.scheduler.schedule_callback(
            SchedulerPriority::Normal,
            Box::new(move |_| {
                if let Some(root) = weak.upgrade() {
                    root.passive_scheduled.set(false);
                    if let Err(err) = root.flush_passive_effects() {
                        root.report(err);
                    }
                }
                TaskStatus::Complete
            }),
        );
    }

    fn report(&self, err: ReconcileError) {
        error!("{}: {}", self.label(), err);
        *self.last_error.borrow_mut() = Some(err);
    }

    /// Runs passive effects left by earlier commits, then any synchronous
    /// work they scheduled. Returns whether there was anything to run.
    fn flush_passive_effects(&self) -> Result<bool, ReconcileError> {
        let effects = {
            let mut state = self
                .state
                .try_borrow_mut()
                .map_err(|_| ReconcileError::Reentrant)?;
            std::mem::take(&mut state.passive)
        };
        if effects.is_empty() {
            return Ok(false);
        }
        effects.run();
        self.sync_queue.flush()?;
        Ok(true)
    }

    fn perform_sync_work_on_root(&self) -> Result<(), ReconcileError> {
        if self.callback.get().is_some_and(|cb| cb.lane == Lanes::SYNC) {
            self.callback.set(None);
        }
        self.flush_passive_effects()?;
        let lanes = next_lanes(self.pending_lanes.get());
        if lanes != Lanes::SYNC {
            self.ensure_root_is_scheduled();
            return Ok(());
        }
        let result = self.render_and_commit(lanes, false);
        self.ensure_root_is_scheduled();
        result
    }

    fn perform_concurrent_work_on_root(&self, token: u64, did_timeout: bool) -> TaskStatus {
        if !self.is_current(token) {
            return TaskStatus::Complete;
        }
        match self.flush_passive_effects() {
            Ok(true) if !self.is_current(token) => return TaskStatus::Complete,
            Ok(_) => {}
            Err(err) => self.report(err),
        }
        let lanes = next_lanes(self.pending_lanes.get());
        if lanes.is_empty() {
            self.callback.set(None);
            return TaskStatus::Complete;
        }
        let time_slice =
            self.options.time_slicing && !did_timeout && !lanes.includes_blocking_lane();
        if let Err(err) = self.render_and_commit(lanes, time_slice) {
            self.report(err);
        }
        self.ensure_root_is_scheduled();
        if self.is_current(token) {
            TaskStatus::Continue
        } else {
            TaskStatus::Complete
        }
    }

    /// Renders `lanes`, resuming an in-progress tree at the same lanes, and
    /// commits when the walk finishes. A failed render is discarded and its
    /// lanes are dropped from the pending set.
    fn render_and_commit(&self, lanes: Lanes, time_slice: bool) -> Result<(), ReconcileError> {
        let mut state = self
            .state
            .try_borrow_mut()
            .map_err(|_| ReconcileError::Reentrant)?;
        let mut host = self
            .host
            .try_borrow_mut()
            .map_err(|_| ReconcileError::Reentrant)?;

        // Updates at the rendering lanes that arrived while the walk was
        // suspended invalidate what was already walked.
        let interrupted = self
            .marks
            .borrow()
            .iter()
            .any(|&(_, lane)| lanes.intersects(lane));
        if !state.has_work_in_progress() || state.wip_lanes != lanes || interrupted {
            if state.has_work_in_progress() {
                debug!(
                    "{}: restarting render at {:?}, previous walk was at {:?}",
                    self.label(),
                    lanes,
                    state.wip_lanes
                );
            }
            let marks = self.marks.take();
            state.prepare_fresh_stack(lanes, marks);
            debug!("{}: render at {:?}", self.label(), lanes);
        }

        let slice: Option<&dyn Scheduler> = if time_slice {
            Some(&*self.scheduler)
        } else {
            None
        };
        match state.render(&mut *host, self.target(), slice) {
            Err(err) => {
                state.discard_work();
                self.pending_lanes.set(self.pending_lanes.get() - lanes);
                warn!("{}: render at {:?} failed", self.label(), lanes);
                Err(err)
            }
            Ok(RenderExit::Yielded) => Ok(()),
            Ok(RenderExit::Completed(finished)) => {
                self.callback.set(None);
                let remaining = state.commit(&mut *host, finished);
                let marked = self
                    .marks
                    .borrow()
                    .iter()
                    .fold(NO_LANES, |acc, &(_, lane)| acc | lane);
                self.pending_lanes.set(remaining | marked);
                self.commits.set(self.commits.get() + 1);
                let has_passive = !state.passive.is_empty();
                drop(host);
                drop(state);
                if has_passive {
                    self.schedule_passive_flush();
                }
                Ok(())
            }
        }
    }
}

/// Handle to a mounted tree.
///
/// Rendering happens on the scheduler: [`Root::render`] and state dispatches
/// only queue work. Dropping the handle stops all further work; callbacks
/// already queued on the scheduler become no-ops.
pub struct Root<H: Host + 'static> {
    inner: Rc<RootInner<H>>,
}

/// Creates a root rendering into `container` with default options.
pub fn create_root<H: Host + 'static>(
    host: H,
    container: HostId,
    scheduler: Rc<dyn Scheduler>,
) -> Root<H> {
    Root::with_options(host, container, scheduler, RootOptions::default())
}

impl<H: Host + 'static> Root<H> {
    pub fn with_options(
        host: H,
        container: HostId,
        scheduler: Rc<dyn Scheduler>,
        options: RootOptions,
    ) -> Self {
        let mut options = options;
        if let Err(err) = Lanes::lane_from_bits(options.default_lane.bits()) {
            warn!("invalid default lane ({err}); using the sync lane");
            options.default_lane = Lanes::SYNC;
        }
        let root_queue = SharedQueue::new();
        let state = RootState::new(container, root_queue.clone());
        let root_node = state.current;
        let inner = Rc::new_cyclic(|weak_self| RootInner {
            weak_self: weak_self.clone(),
            host: RefCell::new(host),
            state: RefCell::new(state),
            scheduler,
            options,
            container,
            root_node,
            root_queue,
            pending_lanes: Cell::new(NO_LANES),
            marks: RefCell::new(Vec::new()),
            callback: Cell::new(None),
            next_token: Cell::new(0),
            sync_queue: SyncQueue::default(),
            microtask_scheduled: Cell::new(false),
            update_lane: Cell::new(None),
            passive_scheduled: Cell::new(false),
            last_error: RefCell::new(None),
            commits: Cell::new(0),
        });
        debug!("{}: created on container {}", inner.label(), container);
        Root { inner }
    }

    /// Queues `child` as the new top-level description.
    pub fn render(&self, child: impl Into<Child>) {
        let lane = self.inner.request_update_lane();
        self.inner.root_queue.enqueue(Update {
            lane,
            action: Action::Replace(child.into()),
        });
        self.inner.schedule_update(self.inner.root_node, lane);
    }

    /// Queues removal of everything under the container.
    pub fn unmount(&self) {
        self.render(Child::Empty);
    }

    /// Runs queued synchronous work now instead of waiting for the microtask.
    pub fn flush_sync(&self) -> Result<(), ReconcileError> {
        self.inner.sync_queue.flush()
    }

    /// Runs pending passive effects now. Returns whether any ran.
    pub fn flush_passive_effects(&self) -> Result<bool, ReconcileError> {
        self.inner.flush_passive_effects()
    }

    /// Runs `f` with every update it issues assigned to `lane`.
    pub fn run_with_priority<R>(&self, lane: Lane, f: impl FnOnce() -> R) -> Result<R, ReconcileError> {
        let lane = Lanes::lane_from_bits(lane.bits())?;
        let previous = self.inner.update_lane.replace(Some(lane));
        let result = f();
        self.inner.update_lane.set(previous);
        Ok(result)
    }

    /// Read access to the host. Fails while the root is committing.
    pub fn with_host<R>(&self, f: impl FnOnce(&H) -> R) -> Result<R, ReconcileError> {
        let host = self
            .inner
            .host
            .try_borrow()
            .map_err(|_| ReconcileError::Reentrant)?;
        Ok(f(&host))
    }

    pub fn container(&self) -> HostId {
        self.inner.container
    }

    pub fn pending_lanes(&self) -> Lanes {
        self.inner.pending_lanes.get()
    }

    /// Whether a render was started and has not finished yet.
    pub fn has_work_in_progress(&self) -> bool {
        self.inner
            .state
            .try_borrow()
            .map(|state| state.has_work_in_progress())
            .unwrap_or(true)
    }

    /// Last error raised by work that ran on the scheduler.
    pub fn take_error(&self) -> Option<ReconcileError> {
        self.inner.last_error.borrow_mut().take()
    }

    pub fn commit_count(&self) -> u64 {
        self.inner.commits.get()
    }

    /// Copy of the committed tree, starting at the host root.
    pub fn snapshot(&self) -> Result<NodeSnapshot, ReconcileError> {
        let state = self
            .inner
            .state
            .try_borrow()
            .map_err(|_| ReconcileError::Reentrant)?;
        NodeSnapshot::capture(&state.arena, state.current).ok_or(ReconcileError::RootUnavailable)
    }

    /// Number of live work nodes across both generations.
    pub fn node_count(&self) -> usize {
        self.inner
            .state
            .try_borrow()
            .map(|state| state.arena.live_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "tests/root_tests.rs"]
mod tests;
