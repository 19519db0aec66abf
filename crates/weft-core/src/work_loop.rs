//! Render state of one root and the loop that drives begin/complete.

use std::rc::Weak;

use log::{debug, trace, warn};

use crate::begin_work::{begin_work, RenderCx};
use crate::commit::{
    clear_flags, commit_layout_effects, commit_mutation_effects, CommitCx, PassiveEffects,
};
use crate::complete_work::complete_work;
use crate::element::{Child, Props};
use crate::error::ReconcileError;
use crate::hooks::{ContextStack, UpdateTarget};
use crate::host::{Host, HostId};
use crate::lanes::{Lane, Lanes, NO_LANES};
use crate::platform::Scheduler;
use crate::update_queue::{SharedQueue, UpdateQueue};
use crate::work_node::{NodeArena, NodeKind, WorkId, WorkNode};

pub(crate) enum RenderExit {
    /// The time slice ran out; the walk resumes from where it stopped.
    Yielded,
    /// The whole tree was walked; the argument is the finished host root.
    Completed(WorkId),
}

pub(crate) struct RootState {
    pub arena: NodeArena,
    pub current: WorkId,
    pub wip_root: Option<WorkId>,
    pub work: Option<WorkId>,
    pub wip_lanes: Lanes,
    pub contexts: ContextStack,
    pub passive: PassiveEffects,
}

impl RootState {
    pub(crate) fn new(container: HostId, queue: SharedQueue<Child>) -> Self {
        let mut arena = NodeArena::new();
        let mut node = WorkNode::new(NodeKind::HostRoot, None, Props::new());
        node.host = Some(container);
        node.root_queue = Some(UpdateQueue {
            base_state: Child::Empty,
            base_queue: Vec::new(),
            shared: queue,
        });
        let current = arena.alloc(node);
        arena.settle();
        Self {
            arena,
            current,
            wip_root: None,
            work: None,
            wip_lanes: NO_LANES,
            contexts: ContextStack::default(),
            passive: PassiveEffects::default(),
        }
    }

    pub(crate) fn has_work_in_progress(&self) -> bool {
        self.wip_root.is_some()
    }

    /// Throws away any in-progress tree and starts a new one at `lanes`.
    /// `marks` are update lanes recorded since the last render started.
    pub(crate) fn prepare_fresh_stack(&mut self, lanes: Lanes, marks: Vec<(WorkId, Lane)>) {
        self.discard_work();
        for (node, lane) in marks {
            if !mark_update_lane(&mut self.arena, node, lane) {
                warn!("update on unmounted node {} dropped", node);
            }
        }
        let props = self.arena[self.current].pending_props.clone();
        let wip = self.arena.clone_for_work(self.current, props);
        self.wip_root = Some(wip);
        self.work = Some(wip);
        self.wip_lanes = lanes;
    }

    pub(crate) fn discard_work(&mut self) {
        self.arena.discard_recent();
        self.wip_root = None;
        self.work = None;
        self.wip_lanes = NO_LANES;
        self.contexts.clear();
    }

    /// Walks until the tree is finished or `slice` asks to yield. Without a
    /// slice the walk never yields.
    pub(crate) fn render(
        &mut self,
        host: &mut dyn Host,
        target: Weak<dyn UpdateTarget>,
        slice: Option<&dyn Scheduler>,
    ) -> Result<RenderExit, ReconcileError> {
        let Some(wip_root) = self.wip_root else {
            return Err(ReconcileError::render("no render in progress"));
        };
        let mut cx = RenderCx {
            arena: &mut self.arena,
            host,
            contexts: &mut self.contexts,
            render_lanes: self.wip_lanes,
            target,
        };
        while let Some(unit) = self.work {
            if slice.is_some_and(|scheduler| scheduler.should_yield()) {
                trace!("yielding before {}", unit);
                return Ok(RenderExit::Yielded);
            }
            self.work = perform_unit_of_work(&mut cx, unit, wip_root)?;
        }
        Ok(RenderExit::Completed(wip_root))
    }

    /// Applies a finished tree. Returns the lanes still pending on it.
    pub(crate) fn commit(&mut self, host: &mut dyn Host, finished: WorkId) -> Lanes {
        debug!("commit {} at {:?}", finished, self.wip_lanes);
        let mut cx = CommitCx {
            arena: &mut self.arena,
            host,
            passive: &mut self.passive,
            released: Vec::new(),
        };
        commit_mutation_effects(&mut cx, finished);
        self.current = finished;
        commit_layout_effects(&mut cx, finished);
        let released = cx.released;

        clear_flags(&mut self.arena, finished);
        self.arena.settle();
        for node in released {
            self.arena.free(node);
        }
        self.wip_root = None;
        self.work = None;
        self.wip_lanes = NO_LANES;
        let root = &self.arena[finished];
        root.lanes | root.child_lanes
    }
}

fn perform_unit_of_work(
    cx: &mut RenderCx<'_>,
    unit: WorkId,
    wip_root: WorkId,
) -> Result<Option<WorkId>, ReconcileError> {
    let next = begin_work(cx, unit)?;
    let node = &mut cx.arena[unit];
    node.memoized_props = node.pending_props.clone();
    match next {
        Some(child) => Ok(Some(child)),
        None => Ok(complete_unit_of_work(cx, unit, wip_root)),
    }
}

/// Completes `unit` and its ancestors until one has an unvisited sibling.
fn complete_unit_of_work(cx: &mut RenderCx<'_>, unit: WorkId, wip_root: WorkId) -> Option<WorkId> {
    let mut node = unit;
    loop {
        complete_work(cx, node);
        if node == wip_root {
            return None;
        }
        if let Some(sibling) = cx.arena[node].sibling {
            return Some(sibling);
        }
        node = cx.arena[node].parent?;
    }
}

/// Records `lane` on `node` and `child_lanes` on every ancestor, in both
/// generations. Returns `false` when the node is gone.
pub(crate) fn mark_update_lane(arena: &mut NodeArena, node: WorkId, lane: Lane) -> bool {
    let Some(target) = arena.get_mut(node) else {
        return false;
    };
    target.lanes |= lane;
    if let Some(alternate) = target.alternate {
        if let Some(alt) = arena.get_mut(alternate) {
            alt.lanes |= lane;
        }
    }
    let mut cursor = node;
    while let Some(parent) = live_parent(arena, cursor) {
        let up = &mut arena[parent];
        up.child_lanes |= lane;
        if let Some(alternate) = up.alternate {
            if let Some(alt) = arena.get_mut(alternate) {
                alt.child_lanes |= lane;
            }
        }
        cursor = parent;
    }
    true
}

/// Parent link of `node`, falling back to its alternate's when the node's own
/// link points at a slot freed by a discarded render.
fn live_parent(arena: &NodeArena, node: WorkId) -> Option<WorkId> {
    let wip = arena.get(node)?;
    wip.parent.filter(|&p| arena.contains(p)).or_else(|| {
        wip.alternate
            .and_then(|alt| arena.get(alt))
            .and_then(|alt| alt.parent)
            .filter(|&p| arena.contains(p))
    })
}
