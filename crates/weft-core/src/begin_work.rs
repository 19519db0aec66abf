//! Downward half of the render walk.
//!
//! `begin_work` either bails out on a node whose inputs did not change or
//! recomputes its children from its props, state and context.

use std::any::Any;
use std::rc::{Rc, Weak};

use log::{trace, warn};

use crate::child_reconciler::ChildReconciler;
use crate::element::{
    same_ref, Child, Component, ContextId, PropValue, Props, OFFSCREEN_HIDDEN, PROVIDER_VALUE,
    SUSPENSE_FALLBACK, SUSPENSE_SUSPENDED,
};
use crate::error::ReconcileError;
use crate::flags::Flags;
use crate::hooks::{ContextStack, Hooks, UpdateTarget};
use crate::host::Host;
use crate::lanes::{Lanes, NO_LANES};
use crate::work_node::{NodeArena, NodeKind, WorkId, WorkNode};

/// Borrowed state of one render pass.
pub(crate) struct RenderCx<'a> {
    pub arena: &'a mut NodeArena,
    pub host: &'a mut dyn Host,
    pub contexts: &'a mut ContextStack,
    pub render_lanes: Lanes,
    pub target: Weak<dyn UpdateTarget>,
}

/// Processes `wip` and returns its first child to descend into, if any.
pub(crate) fn begin_work(
    cx: &mut RenderCx<'_>,
    wip: WorkId,
) -> Result<Option<WorkId>, ReconcileError> {
    trace!("begin {} {}", cx.arena[wip].kind.describe(), wip);
    let current = cx.arena[wip].alternate;
    if let Some(current) = current {
        let unchanged =
            Props::ptr_eq(&cx.arena[current].memoized_props, &cx.arena[wip].pending_props)
                && same_ref(
                    cx.arena[current].element_ref.as_ref(),
                    cx.arena[wip].element_ref.as_ref(),
                );
        if unchanged
            && !cx.contexts.has_changed()
            && !cx.arena[wip].lanes.intersects(cx.render_lanes)
        {
            if let NodeKind::ContextProvider(id) = cx.arena[wip].kind {
                let value = provider_value(&cx.arena[wip].pending_props);
                cx.contexts.push(id, value, false);
            }
            return Ok(bailout(cx, wip));
        }
    }

    cx.arena[wip].lanes = NO_LANES;
    let kind = cx.arena[wip].kind.clone();
    if current.is_none()
        && cx.arena[wip].element_ref.is_some()
        && !matches!(kind, NodeKind::HostElement(_))
    {
        warn!("ref on {} is ignored; refs attach to host elements only", kind.describe());
    }
    match kind {
        NodeKind::HostRoot => update_host_root(cx, wip),
        NodeKind::HostElement(_) => {
            mark_ref(cx.arena, wip);
            let children = cx.arena[wip].pending_props.children().clone();
            Ok(reconcile_children(cx, wip, &children))
        }
        NodeKind::HostText => Ok(None),
        NodeKind::Component(component) => update_component(cx, wip, &component),
        NodeKind::Fragment | NodeKind::Offscreen => {
            let children = cx.arena[wip].pending_props.children().clone();
            Ok(reconcile_children(cx, wip, &children))
        }
        NodeKind::ContextProvider(id) => update_provider(cx, wip, id),
        NodeKind::Suspense => update_suspense(cx, wip),
    }
}

/// Skips `wip`. Its children are cloned only when one of them has work at
/// the render lanes; otherwise the committed subtree is shared as is.
fn bailout(cx: &mut RenderCx<'_>, wip: WorkId) -> Option<WorkId> {
    if !cx.arena[wip].child_lanes.intersects(cx.render_lanes) {
        trace!("skip subtree of {}", wip);
        return None;
    }
    clone_child_nodes(cx.arena, wip);
    cx.arena[wip].child
}

fn clone_child_nodes(arena: &mut NodeArena, wip: WorkId) {
    let current_children: Vec<WorkId> = arena.siblings(arena[wip].child).collect();
    let mut first = None;
    let mut previous: Option<WorkId> = None;
    for current in current_children {
        let props = arena[current].pending_props.clone();
        let child = arena.clone_for_work(current, props);
        arena[child].parent = Some(wip);
        match previous {
            Some(prev) => arena[prev].sibling = Some(child),
            None => first = Some(child),
        }
        previous = Some(child);
    }
    arena[wip].child = first;
}

fn reconcile_children(cx: &mut RenderCx<'_>, wip: WorkId, children: &Child) -> Option<WorkId> {
    let (reconciler, current_first) = match cx.arena[wip].alternate {
        Some(current) => (ChildReconciler::UPDATE, cx.arena[current].child),
        None => (ChildReconciler::MOUNT, None),
    };
    let first = reconciler.reconcile(cx.arena, wip, current_first, children);
    cx.arena[wip].child = first;
    first
}

fn update_host_root(
    cx: &mut RenderCx<'_>,
    wip: WorkId,
) -> Result<Option<WorkId>, ReconcileError> {
    let current = cx.arena[wip].alternate;
    let Some(mut queue) = cx.arena[wip].root_queue.take() else {
        warn!("host root {} has no update queue", wip);
        return Ok(None);
    };
    if let (Some(merged), Some(current)) = (queue.merge_pending(), current) {
        if let Some(committed) = cx.arena[current].root_queue.as_mut() {
            committed.base_queue = merged;
        }
    }
    let processed = queue.process(cx.render_lanes);
    let node = &mut cx.arena[wip];
    node.root_queue = Some(queue);
    node.lanes |= processed.skipped_lanes;
    let previous = std::mem::replace(&mut node.root_state, processed.memoized.clone());
    if current.is_some() && previous.same(&processed.memoized) {
        return Ok(bailout(cx, wip));
    }
    Ok(reconcile_children(cx, wip, &processed.memoized))
}

fn mark_ref(arena: &mut NodeArena, wip: WorkId) {
    let changed = match arena[wip].alternate {
        None => arena[wip].element_ref.is_some(),
        Some(current) => !same_ref(
            arena[current].element_ref.as_ref(),
            arena[wip].element_ref.as_ref(),
        ),
    };
    if changed {
        arena[wip].flags |= Flags::REF;
    }
}

fn update_component(
    cx: &mut RenderCx<'_>,
    wip: WorkId,
    component: &Component,
) -> Result<Option<WorkId>, ReconcileError> {
    let current = cx.arena[wip].alternate;
    let previous = current.map(|c| cx.arena[c].hooks.clone());
    let props = cx.arena[wip].pending_props.clone();

    let mut hooks = Hooks::new(
        component.name(),
        wip,
        cx.render_lanes,
        cx.target.clone(),
        previous,
        &*cx.contexts,
    );
    let rendered = component
        .call(&mut hooks, &props)
        .map_err(|err| err.with_component(component.name()));
    if let (Some(current), Some(committed)) = (current, hooks.take_written_back()) {
        cx.arena[current].hooks = committed;
    }
    let child = rendered?;
    let output = hooks.finish()?;

    let node = &mut cx.arena[wip];
    node.hooks = output.cells;
    node.flags |= output.flags;
    node.lanes |= output.skipped_lanes;
    Ok(reconcile_children(cx, wip, &child))
}

fn provider_value(props: &Props) -> Option<Rc<dyn Any>> {
    match props.get(PROVIDER_VALUE) {
        Some(PropValue::Any(value)) => Some(value.clone()),
        _ => None,
    }
}

fn same_value(a: &Option<Rc<dyn Any>>, b: &Option<Rc<dyn Any>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
        (None, None) => true,
        _ => false,
    }
}

fn update_provider(
    cx: &mut RenderCx<'_>,
    wip: WorkId,
    id: ContextId,
) -> Result<Option<WorkId>, ReconcileError> {
    let value = provider_value(&cx.arena[wip].pending_props);
    let changed = match cx.arena[wip].alternate {
        Some(current) => !same_value(&provider_value(&cx.arena[current].memoized_props), &value),
        None => false,
    };
    if changed {
        trace!("provider {} changed its value", wip);
    }
    cx.contexts.push(id, value, changed);
    let children = cx.arena[wip].pending_props.children().clone();
    Ok(reconcile_children(cx, wip, &children))
}

/// A suspense boundary always keeps its primary children under an offscreen
/// node so their state survives while the fallback is shown next to it.
fn update_suspense(
    cx: &mut RenderCx<'_>,
    wip: WorkId,
) -> Result<Option<WorkId>, ReconcileError> {
    let props = cx.arena[wip].pending_props.clone();
    let suspended = props.bool_attr(SUSPENSE_SUSPENDED).unwrap_or(false);
    let offscreen_props =
        Props::from_children(props.children().clone()).with_attr(OFFSCREEN_HIDDEN, suspended);

    let current = cx.arena[wip].alternate;
    let current_offscreen = current.and_then(|c| cx.arena[c].child);
    let current_fallback = current_offscreen.and_then(|o| cx.arena[o].sibling);

    let offscreen = match current_offscreen {
        Some(existing) => cx.arena.clone_for_work(existing, offscreen_props),
        None => {
            let node = cx.arena.alloc(WorkNode::new(NodeKind::Offscreen, None, offscreen_props));
            if current.is_some() {
                cx.arena[node].flags |= Flags::PLACEMENT;
            }
            node
        }
    };
    let node = &mut cx.arena[offscreen];
    node.parent = Some(wip);
    node.index = 0;
    node.sibling = None;

    if suspended {
        let fallback = match props.get(SUSPENSE_FALLBACK) {
            Some(PropValue::Children(children)) => (**children).clone(),
            _ => Child::Empty,
        };
        let fallback_props = Props::from_children(fallback);
        let fragment = match current_fallback {
            Some(existing) => cx.arena.clone_for_work(existing, fallback_props),
            None => {
                let node = cx.arena.alloc(WorkNode::new(NodeKind::Fragment, None, fallback_props));
                if current.is_some() {
                    cx.arena[node].flags |= Flags::PLACEMENT;
                }
                node
            }
        };
        let node = &mut cx.arena[fragment];
        node.parent = Some(wip);
        node.index = 1;
        node.sibling = None;
        cx.arena[offscreen].sibling = Some(fragment);
    } else if let Some(fallback) = current_fallback {
        let node = &mut cx.arena[wip];
        node.deletions.push(fallback);
        node.flags |= Flags::CHILD_DELETION;
    }

    cx.arena[wip].child = Some(offscreen);
    Ok(Some(offscreen))
}

#[cfg(test)]
#[path = "tests/begin_work_tests.rs"]
mod tests;
