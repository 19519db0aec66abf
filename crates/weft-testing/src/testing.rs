use std::rc::Rc;

use weft_core::{
    Child, HostId, HostJournal, HostOp, Lanes, ManualScheduler, MemoryHost, NodeSnapshot,
    ReconcileError, Root, RootOptions, Scheduler,
};

/// Headless harness for exercising a root in tests.
///
/// `ReconcileTestRule` owns an in-memory host and a manually driven
/// scheduler, so a test decides exactly when microtasks and time slices run.
/// Every host call is journaled and can be inspected with [`Self::ops`].
pub struct ReconcileTestRule {
    root: Root<MemoryHost>,
    scheduler: Rc<ManualScheduler>,
    journal: HostJournal,
}

impl ReconcileTestRule {
    /// Create a rule with the default root options.
    pub fn new() -> Self {
        Self::with_options(RootOptions::new().label("test"))
    }

    pub fn with_options(options: RootOptions) -> Self {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let journal = host.journal();
        let scheduler = Rc::new(ManualScheduler::new());
        let root = Root::with_options(
            host,
            container,
            scheduler.clone() as Rc<dyn Scheduler>,
            options,
        );
        Self {
            root,
            scheduler,
            journal,
        }
    }

    /// Render `child` at the top level and run everything it schedules.
    pub fn set_content(&self, child: impl Into<Child>) -> Result<(), ReconcileError> {
        self.root.render(child);
        self.pump_until_idle()
    }

    /// Run `f`, then drain all work it scheduled. Errors raised by scheduled
    /// work are returned instead of being left on the root.
    pub fn act<R>(&self, f: impl FnOnce() -> R) -> Result<R, ReconcileError> {
        let result = f();
        self.pump_until_idle()?;
        Ok(result)
    }

    /// Drain microtasks and tasks until the scheduler is idle.
    pub fn pump_until_idle(&self) -> Result<(), ReconcileError> {
        self.scheduler.run_until_idle();
        match self.root.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Let the next scheduled task run for `units` units of work before it is
    /// told to yield. `None` removes the limit.
    pub fn set_yield_budget(&self, units: Option<usize>) {
        self.scheduler.set_yield_budget(units);
    }

    pub fn root(&self) -> &Root<MemoryHost> {
        &self.root
    }

    pub fn scheduler(&self) -> &ManualScheduler {
        &self.scheduler
    }

    pub fn container(&self) -> HostId {
        self.root.container()
    }

    /// Every host call since the last [`Self::clear_ops`].
    pub fn ops(&self) -> Vec<HostOp> {
        self.journal.ops()
    }

    /// Host calls that touched the attached tree.
    pub fn mutations(&self) -> Vec<HostOp> {
        self.journal
            .ops()
            .into_iter()
            .filter(HostOp::is_mutation)
            .collect()
    }

    /// Shared handle to the host journal, for callbacks that record when
    /// they ran relative to host calls.
    pub fn journal(&self) -> HostJournal {
        self.journal.clone()
    }

    pub fn clear_ops(&self) {
        self.journal.clear();
    }

    /// Concatenated text of everything under the container.
    pub fn text(&self) -> String {
        self.with_host(|host| host.text_content(self.container()))
    }

    /// Indented dump of the host tree.
    pub fn tree_string(&self) -> String {
        self.with_host(|host| host.dump_tree(self.container()))
    }

    /// Host ids directly under the container.
    pub fn top_level(&self) -> Vec<HostId> {
        self.with_host(|host| host.children_of(self.container()))
    }

    pub fn with_host<R>(&self, f: impl FnOnce(&MemoryHost) -> R) -> R {
        match self.root.with_host(f) {
            Ok(value) => value,
            Err(err) => panic!("host is busy: {err}"),
        }
    }

    /// Committed work tree.
    pub fn snapshot(&self) -> NodeSnapshot {
        match self.root.snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => panic!("no committed tree: {err}"),
        }
    }

    /// Host id of the committed node carrying `key`.
    pub fn host_of(&self, key: &str) -> Option<HostId> {
        self.snapshot().find_key(key).and_then(|node| node.host)
    }

    pub fn pending_lanes(&self) -> Lanes {
        self.root.pending_lanes()
    }
}

impl Default for ReconcileTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `ReconcileTestRule`.
pub fn run_test_root<R>(f: impl FnOnce(&ReconcileTestRule) -> R) -> R {
    let rule = ReconcileTestRule::new();
    f(&rule)
}
