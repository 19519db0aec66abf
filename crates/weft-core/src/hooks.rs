//! Per-component state cells.
//!
//! A component's hooks are identified by call order. The committed
//! generation's cells are read back position by position; a render that asks
//! for a different sequence fails.

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::element::{Context, ContextId, PropValue};
use crate::error::ReconcileError;
use crate::flags::{Flags, HookFlags};
use crate::lanes::{Lane, Lanes, NO_LANES};
use crate::update_queue::{Action, SharedQueue, Update, UpdateQueue};
use crate::work_node::WorkId;

/// Where dispatchers send their updates.
pub(crate) trait UpdateTarget {
    fn request_update_lane(&self) -> Lane;
    fn schedule_update(&self, node: WorkId, lane: Lane);
}

/// Cleanup returned by an effect setup.
pub struct Teardown(Option<Box<dyn FnOnce()>>);

impl Teardown {
    pub fn none() -> Self {
        Teardown(None)
    }

    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Teardown(Some(Box::new(f)))
    }
}

impl From<()> for Teardown {
    fn from(_: ()) -> Self {
        Teardown::none()
    }
}

/// Teardown slot shared by every render's record of the same effect cell.
#[derive(Default)]
pub(crate) struct EffectInstance {
    destroy: RefCell<Option<Box<dyn FnOnce()>>>,
}

pub(crate) struct Effect {
    pub tag: HookFlags,
    create: RefCell<Option<Box<dyn FnOnce() -> Teardown>>>,
    deps: Option<Vec<PropValue>>,
    inst: Rc<EffectInstance>,
}

impl Effect {
    /// Whether this record is of `kind` and must run in this commit.
    pub(crate) fn needs_run(&self, kind: HookFlags) -> bool {
        self.tag.contains(kind | HookFlags::HAS_EFFECT)
    }

    pub(crate) fn is(&self, kind: HookFlags) -> bool {
        self.tag.contains(kind)
    }

    pub(crate) fn run_destroy(&self) {
        let destroy = self.inst.destroy.borrow_mut().take();
        if let Some(destroy) = destroy {
            destroy();
        }
    }

    pub(crate) fn run_create(&self) {
        let create = self.create.borrow_mut().take();
        if let Some(create) = create {
            let Teardown(destroy) = create();
            *self.inst.destroy.borrow_mut() = destroy;
        }
    }
}

pub(crate) trait StateSlot {
    fn clone_box(&self) -> Box<dyn StateSlot>;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl Clone for Box<dyn StateSlot> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

struct StateCell<T> {
    memoized: T,
    queue: UpdateQueue<T>,
    dispatch: Dispatch<T>,
}

impl<T: Clone + 'static> StateSlot for StateCell<T> {
    fn clone_box(&self) -> Box<dyn StateSlot> {
        Box::new(StateCell {
            memoized: self.memoized.clone(),
            queue: self.queue.clone(),
            dispatch: self.dispatch.clone(),
        })
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Clone)]
pub(crate) enum HookCell {
    State(Box<dyn StateSlot>),
    Effect(Rc<Effect>),
    Ref(Rc<dyn Any>),
    Memo {
        value: Rc<dyn Any>,
        deps: Vec<PropValue>,
    },
}

impl HookCell {
    fn kind_name(&self) -> &'static str {
        match self {
            HookCell::State(_) => "state",
            HookCell::Effect(effect) if effect.is(HookFlags::LAYOUT) => "layout effect",
            HookCell::Effect(_) => "effect",
            HookCell::Ref(_) => "ref",
            HookCell::Memo { .. } => "memo",
        }
    }
}

fn effect_kind_name(kind: HookFlags) -> &'static str {
    if kind.contains(HookFlags::LAYOUT) {
        "layout effect"
    } else {
        "effect"
    }
}

fn deps_equal(next: Option<&[PropValue]>, prev: Option<&[PropValue]>) -> bool {
    match (next, prev) {
        (Some(next), Some(prev)) => {
            next.len() == prev.len() && next.iter().zip(prev).all(|(a, b)| a == b)
        }
        _ => false,
    }
}

/// Provider values visible at the current point of the walk.
#[derive(Default)]
pub(crate) struct ContextStack {
    entries: Vec<ContextEntry>,
    changed: usize,
}

struct ContextEntry {
    id: ContextId,
    value: Option<Rc<dyn Any>>,
    changed: bool,
}

impl ContextStack {
    pub(crate) fn push(&mut self, id: ContextId, value: Option<Rc<dyn Any>>, changed: bool) {
        if changed {
            self.changed += 1;
        }
        self.entries.push(ContextEntry { id, value, changed });
    }

    pub(crate) fn pop(&mut self) {
        if let Some(entry) = self.entries.pop() {
            if entry.changed {
                self.changed -= 1;
            }
        }
    }

    /// Whether some enclosing provider changed its value in this pass.
    pub(crate) fn has_changed(&self) -> bool {
        self.changed > 0
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.changed = 0;
    }

    fn read(&self, id: ContextId) -> Option<Rc<dyn Any>> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.id == id)
            .and_then(|entry| entry.value.clone())
    }
}

/// Sends updates to one state cell. Detached from any render: it can be
/// stored and called at any time while the root is alive.
pub struct Dispatch<T> {
    queue: SharedQueue<T>,
    node: WorkId,
    target: Weak<dyn UpdateTarget>,
}

impl<T> Clone for Dispatch<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            node: self.node,
            target: self.target.clone(),
        }
    }
}

impl<T: 'static> Dispatch<T> {
    /// Replaces the state at the lane the root currently hands out.
    pub fn set(&self, value: T) -> Result<(), ReconcileError> {
        self.dispatch(None, Action::Replace(value))
    }

    /// Derives the next state from the previous one.
    pub fn update(&self, f: impl Fn(&T) -> T + 'static) -> Result<(), ReconcileError> {
        self.dispatch(None, Action::transform(f))
    }

    pub fn set_with_lane(&self, lane: Lane, value: T) -> Result<(), ReconcileError> {
        self.dispatch(Some(lane), Action::Replace(value))
    }

    pub fn update_with_lane(
        &self,
        lane: Lane,
        f: impl Fn(&T) -> T + 'static,
    ) -> Result<(), ReconcileError> {
        self.dispatch(Some(lane), Action::transform(f))
    }

    fn dispatch(&self, lane: Option<Lane>, action: Action<T>) -> Result<(), ReconcileError> {
        let target = self.target.upgrade().ok_or(ReconcileError::RootUnavailable)?;
        let lane = match lane {
            Some(lane) => Lanes::lane_from_bits(lane.bits())?,
            None => target.request_update_lane(),
        };
        self.queue.enqueue(Update { lane, action });
        target.schedule_update(self.node, lane);
        Ok(())
    }
}

/// What a finished component render leaves behind.
pub(crate) struct HooksOutput {
    pub cells: Vec<HookCell>,
    pub flags: Flags,
    pub skipped_lanes: Lanes,
}

/// Hook cursor handed to a component function.
pub struct Hooks<'a> {
    component: &'static str,
    node: WorkId,
    render_lanes: Lanes,
    target: Weak<dyn UpdateTarget>,
    previous: Option<Vec<HookCell>>,
    previous_len: Option<usize>,
    previous_touched: bool,
    cells: Vec<HookCell>,
    flags: Flags,
    skipped_lanes: Lanes,
    contexts: &'a ContextStack,
}

impl<'a> Hooks<'a> {
    pub(crate) fn new(
        component: &'static str,
        node: WorkId,
        render_lanes: Lanes,
        target: Weak<dyn UpdateTarget>,
        previous: Option<Vec<HookCell>>,
        contexts: &'a ContextStack,
    ) -> Self {
        Self {
            component,
            node,
            render_lanes,
            target,
            previous_len: previous.as_ref().map(Vec::len),
            previous,
            previous_touched: false,
            cells: Vec::new(),
            flags: Flags::empty(),
            skipped_lanes: NO_LANES,
            contexts,
        }
    }

    pub fn component_name(&self) -> &'static str {
        self.component
    }

    /// Takes the committed cell at the cursor, or `None` on mount.
    fn previous_cell(&self) -> Result<Option<HookCell>, ReconcileError> {
        let index = self.cells.len();
        match &self.previous {
            None => Ok(None),
            Some(previous) => match previous.get(index) {
                Some(cell) => Ok(Some(cell.clone())),
                None => Err(ReconcileError::HookCountMismatch {
                    component: self.component,
                    previous: previous.len(),
                    current: index + 1,
                }),
            },
        }
    }

    fn kind_mismatch(&self, expected: &'static str, found: &HookCell) -> ReconcileError {
        ReconcileError::HookKindMismatch {
            component: self.component,
            index: self.cells.len(),
            expected,
            found: found.kind_name(),
        }
    }

    fn type_mismatch<T>(&self) -> ReconcileError {
        ReconcileError::HookTypeMismatch {
            component: self.component,
            index: self.cells.len(),
            expected: type_name::<T>(),
        }
    }

    /// A state cell. Returns the value for this render and its dispatcher.
    pub fn use_state<T: Clone + 'static>(
        &mut self,
        init: impl FnOnce() -> T,
    ) -> Result<(T, Dispatch<T>), ReconcileError> {
        let index = self.cells.len();
        let mut slot: Box<dyn StateSlot> = match self.previous_cell()? {
            None => {
                let value = init();
                let queue = UpdateQueue::new(value.clone());
                let dispatch = Dispatch {
                    queue: queue.shared.clone(),
                    node: self.node,
                    target: self.target.clone(),
                };
                Box::new(StateCell {
                    memoized: value,
                    queue,
                    dispatch,
                })
            }
            Some(HookCell::State(slot)) => slot,
            Some(other) => return Err(self.kind_mismatch("state", &other)),
        };
        let render_lanes = self.render_lanes;
        let mut merged = None;
        let mut skipped = NO_LANES;
        let (value, dispatch) = {
            let cell = slot
                .as_any_mut()
                .downcast_mut::<StateCell<T>>()
                .ok_or_else(|| self.type_mismatch::<T>())?;
            if self.previous.is_some() {
                merged = cell.queue.merge_pending();
                let processed = cell.queue.process(render_lanes);
                skipped = processed.skipped_lanes;
                cell.memoized = processed.memoized;
            }
            (cell.memoized.clone(), cell.dispatch.clone())
        };
        if let Some(merged) = merged {
            self.write_back_queue::<T>(index, merged);
        }
        self.skipped_lanes |= skipped;
        self.cells.push(HookCell::State(slot));
        Ok((value, dispatch))
    }

    /// Records merged updates on the committed cell so a discarded render
    /// cannot drop them.
    fn write_back_queue<T: Clone + 'static>(&mut self, index: usize, merged: Vec<Update<T>>) {
        let Some(HookCell::State(slot)) = self.previous.as_mut().and_then(|p| p.get_mut(index))
        else {
            return;
        };
        if let Some(cell) = slot.as_any_mut().downcast_mut::<StateCell<T>>() {
            cell.queue.base_queue = merged;
            self.previous_touched = true;
        }
    }

    /// Passive effect: runs after commit in a separate task. `None` deps
    /// re-run it after every render.
    pub fn use_effect<F>(&mut self, deps: Option<Vec<PropValue>>, create: F) -> Result<(), ReconcileError>
    where
        F: FnOnce() -> Teardown + 'static,
    {
        self.push_effect(HookFlags::PASSIVE, deps, Box::new(create))
    }

    /// Layout effect: teardown in the mutation pass, setup in the layout pass,
    /// both inside commit.
    pub fn use_layout_effect<F>(
        &mut self,
        deps: Option<Vec<PropValue>>,
        create: F,
    ) -> Result<(), ReconcileError>
    where
        F: FnOnce() -> Teardown + 'static,
    {
        self.push_effect(HookFlags::LAYOUT, deps, Box::new(create))
    }

    fn push_effect(
        &mut self,
        kind: HookFlags,
        deps: Option<Vec<PropValue>>,
        create: Box<dyn FnOnce() -> Teardown>,
    ) -> Result<(), ReconcileError> {
        let (tag, inst) = match self.previous_cell()? {
            None => (kind | HookFlags::HAS_EFFECT, Rc::new(EffectInstance::default())),
            Some(HookCell::Effect(prev)) if prev.is(kind) => {
                if deps_equal(deps.as_deref(), prev.deps.as_deref()) {
                    (kind, prev.inst.clone())
                } else {
                    (kind | HookFlags::HAS_EFFECT, prev.inst.clone())
                }
            }
            Some(other) => return Err(self.kind_mismatch(effect_kind_name(kind), &other)),
        };
        if tag.contains(HookFlags::HAS_EFFECT) {
            self.flags |= if kind.contains(HookFlags::LAYOUT) {
                Flags::LAYOUT
            } else {
                Flags::PASSIVE
            };
        }
        self.cells.push(HookCell::Effect(Rc::new(Effect {
            tag,
            create: RefCell::new(Some(create)),
            deps,
            inst,
        })));
        Ok(())
    }

    /// A mutable box that survives re-renders. Writing to it does not schedule
    /// anything.
    pub fn use_ref<T: 'static>(
        &mut self,
        init: impl FnOnce() -> T,
    ) -> Result<Rc<RefCell<T>>, ReconcileError> {
        let value = match self.previous_cell()? {
            None => Rc::new(RefCell::new(init())),
            Some(HookCell::Ref(any)) => any
                .downcast::<RefCell<T>>()
                .map_err(|_| self.type_mismatch::<T>())?,
            Some(other) => return Err(self.kind_mismatch("ref", &other)),
        };
        let any: Rc<dyn Any> = value.clone();
        self.cells.push(HookCell::Ref(any));
        Ok(value)
    }

    /// Recomputes only when `deps` changed.
    pub fn use_memo<T: 'static>(
        &mut self,
        deps: Vec<PropValue>,
        compute: impl FnOnce() -> T,
    ) -> Result<Rc<T>, ReconcileError> {
        let cached = match self.previous_cell()? {
            None => None,
            Some(HookCell::Memo { value, deps: prev }) => {
                if deps_equal(Some(deps.as_slice()), Some(prev.as_slice())) {
                    Some(
                        value
                            .downcast::<T>()
                            .map_err(|_| self.type_mismatch::<T>())?,
                    )
                } else {
                    None
                }
            }
            Some(other) => return Err(self.kind_mismatch("memo", &other)),
        };
        let value = cached.unwrap_or_else(|| Rc::new(compute()));
        let any: Rc<dyn Any> = value.clone();
        self.cells.push(HookCell::Memo { value: any, deps });
        Ok(value)
    }

    /// Nearest provided value of `context`, or its default. Does not occupy a
    /// hook slot.
    pub fn use_context<T: 'static>(&self, context: &Context<T>) -> Rc<T> {
        self.contexts
            .read(context.id())
            .and_then(|value| value.downcast::<T>().ok())
            .unwrap_or_else(|| context.default_value())
    }

    /// The committed cells, once pending updates were moved into their base
    /// queues. They replace the committed node's cells whether or not the
    /// render succeeds; the shared queues are already drained.
    pub(crate) fn take_written_back(&mut self) -> Option<Vec<HookCell>> {
        if !std::mem::replace(&mut self.previous_touched, false) {
            return None;
        }
        self.previous.take()
    }

    pub(crate) fn finish(self) -> Result<HooksOutput, ReconcileError> {
        if let Some(previous) = self.previous_len {
            if previous != self.cells.len() {
                return Err(ReconcileError::HookCountMismatch {
                    component: self.component,
                    previous,
                    current: self.cells.len(),
                });
            }
        }
        Ok(HooksOutput {
            cells: self.cells,
            flags: self.flags,
            skipped_lanes: self.skipped_lanes,
        })
    }
}

/// Effects recorded on a component's cells, in call order.
pub(crate) fn effects_of(cells: &[HookCell]) -> impl Iterator<Item = &Rc<Effect>> {
    cells.iter().filter_map(|cell| match cell {
        HookCell::Effect(effect) => Some(effect),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Props;
    use crate::work_node::{NodeArena, NodeKind, WorkNode};
    use std::cell::Cell;

    struct Recorder {
        scheduled: RefCell<Vec<(WorkId, Lane)>>,
    }

    impl UpdateTarget for Recorder {
        fn request_update_lane(&self) -> Lane {
            Lanes::DEFAULT
        }

        fn schedule_update(&self, node: WorkId, lane: Lane) {
            self.scheduled.borrow_mut().push((node, lane));
        }
    }

    fn node_id() -> WorkId {
        let mut arena = NodeArena::new();
        arena.alloc(WorkNode::new(NodeKind::Fragment, None, Props::new()))
    }

    fn detached() -> Weak<dyn UpdateTarget> {
        Weak::<Recorder>::new()
    }

    #[test]
    fn state_updates_replay_on_next_render() {
        let target = Rc::new(Recorder {
            scheduled: RefCell::new(Vec::new()),
        });
        let weak: Weak<dyn UpdateTarget> = Rc::downgrade(&target) as Weak<dyn UpdateTarget>;
        let contexts = ContextStack::default();
        let node = node_id();

        let mut hooks = Hooks::new("Counter", node, Lanes::SYNC, weak.clone(), None, &contexts);
        let (value, set) = hooks.use_state(|| 1).unwrap();
        assert_eq!(value, 1);
        let mounted = hooks.finish().unwrap();

        set.update(|n| n + 1).unwrap();
        set.update_with_lane(Lanes::SYNC, |n| n * 10).unwrap();
        assert_eq!(
            *target.scheduled.borrow(),
            vec![(node, Lanes::DEFAULT), (node, Lanes::SYNC)]
        );

        let mut hooks = Hooks::new(
            "Counter",
            node,
            Lanes::SYNC,
            weak.clone(),
            Some(mounted.cells),
            &contexts,
        );
        let (value, _) = hooks.use_state(|| 0).unwrap();
        assert_eq!(value, 10);
        assert!(hooks.take_written_back().is_some());
        assert!(hooks.take_written_back().is_none());
        let output = hooks.finish().unwrap();
        assert_eq!(output.skipped_lanes, Lanes::DEFAULT);

        let mut hooks = Hooks::new(
            "Counter",
            node,
            Lanes::DEFAULT,
            weak,
            Some(output.cells),
            &contexts,
        );
        let (value, _) = hooks.use_state(|| 0).unwrap();
        assert_eq!(value, 20);
    }

    #[test]
    fn explicit_lane_must_be_single() {
        let target = Rc::new(Recorder {
            scheduled: RefCell::new(Vec::new()),
        });
        let weak: Weak<dyn UpdateTarget> = Rc::downgrade(&target) as Weak<dyn UpdateTarget>;
        let contexts = ContextStack::default();
        let mut hooks = Hooks::new("C", node_id(), Lanes::SYNC, weak, None, &contexts);
        let (_, set) = hooks.use_state(|| 0).unwrap();
        assert_eq!(
            set.set_with_lane(Lanes::SYNC | Lanes::DEFAULT, 1),
            Err(ReconcileError::UnknownLane { bits: 0b101 })
        );
        assert!(target.scheduled.borrow().is_empty());
    }

    #[test]
    fn dispatch_after_root_drop_fails() {
        let contexts = ContextStack::default();
        let mut hooks = Hooks::new("C", node_id(), Lanes::SYNC, detached(), None, &contexts);
        let (_, set) = hooks.use_state(|| 0).unwrap();
        assert_eq!(set.set(1), Err(ReconcileError::RootUnavailable));
    }

    #[test]
    fn changing_hook_order_is_rejected() {
        let contexts = ContextStack::default();
        let node = node_id();
        let mut hooks = Hooks::new("Flip", node, Lanes::SYNC, detached(), None, &contexts);
        hooks.use_state(|| 0).unwrap();
        hooks.use_ref(|| 0).unwrap();
        let mounted = hooks.finish().unwrap();

        let mut hooks = Hooks::new(
            "Flip",
            node,
            Lanes::SYNC,
            detached(),
            Some(mounted.cells.clone()),
            &contexts,
        );
        let err = hooks.use_ref(|| 0).err();
        assert_eq!(
            err,
            Some(ReconcileError::HookKindMismatch {
                component: "Flip",
                index: 0,
                expected: "ref",
                found: "state",
            })
        );

        let mut hooks = Hooks::new(
            "Flip",
            node,
            Lanes::SYNC,
            detached(),
            Some(mounted.cells),
            &contexts,
        );
        hooks.use_state(|| 0).unwrap();
        assert_eq!(
            hooks.finish().err(),
            Some(ReconcileError::HookCountMismatch {
                component: "Flip",
                previous: 2,
                current: 1,
            })
        );
    }

    #[test]
    fn effect_reruns_only_when_deps_change() {
        let contexts = ContextStack::default();
        let node = node_id();
        let runs = Rc::new(Cell::new(0));

        let render = |previous: Option<Vec<HookCell>>, dep: i64| {
            let mut hooks = Hooks::new("E", node, Lanes::SYNC, detached(), previous, &contexts);
            let runs = runs.clone();
            hooks
                .use_effect(Some(vec![dep.into()]), move || {
                    runs.set(runs.get() + 1);
                    Teardown::none()
                })
                .unwrap();
            hooks.finish().unwrap()
        };

        let first = render(None, 1);
        assert!(first.flags.contains(Flags::PASSIVE));
        let same = render(Some(first.cells.clone()), 1);
        assert!(!same.flags.contains(Flags::PASSIVE));
        assert!(effects_of(&same.cells).all(|e| !e.needs_run(HookFlags::PASSIVE)));
        let changed = render(Some(same.cells), 2);
        assert!(changed.flags.contains(Flags::PASSIVE));
        for effect in effects_of(&changed.cells) {
            effect.run_create();
        }
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn memo_keeps_value_until_deps_change() {
        let contexts = ContextStack::default();
        let node = node_id();
        let mut hooks = Hooks::new("M", node, Lanes::SYNC, detached(), None, &contexts);
        let first = hooks.use_memo(vec![1.into()], || String::from("one")).unwrap();
        let cells = hooks.finish().unwrap().cells;

        let mut hooks = Hooks::new("M", node, Lanes::SYNC, detached(), Some(cells), &contexts);
        let again = hooks.use_memo(vec![1.into()], || String::from("other")).unwrap();
        assert!(Rc::ptr_eq(&first, &again));
        let cells = hooks.finish().unwrap().cells;

        let mut hooks = Hooks::new("M", node, Lanes::SYNC, detached(), Some(cells), &contexts);
        let changed = hooks.use_memo(vec![2.into()], || String::from("two")).unwrap();
        assert_eq!(*changed, "two");
    }
}
