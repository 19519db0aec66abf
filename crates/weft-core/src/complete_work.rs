//! Upward half of the render walk: host instances and effect bubbling.

use log::trace;

use crate::begin_work::RenderCx;
use crate::element::{Props, OFFSCREEN_HIDDEN};
use crate::flags::Flags;
use crate::host::HostId;
use crate::lanes::NO_LANES;
use crate::work_node::{NodeArena, NodeKind, WorkId};

pub(crate) fn complete_work(cx: &mut RenderCx<'_>, wip: WorkId) {
    trace!("complete {} {}", cx.arena[wip].kind.describe(), wip);
    let current = cx.arena[wip].alternate;
    let kind = cx.arena[wip].kind.clone();
    match kind {
        NodeKind::HostElement(tag) => match (current, cx.arena[wip].host) {
            (Some(current), Some(_)) => {
                let same = cx.arena[current]
                    .memoized_props
                    .same_attributes(&cx.arena[wip].pending_props);
                if !same {
                    cx.arena[wip].flags |= Flags::UPDATE;
                }
            }
            _ => {
                let props = cx.arena[wip].pending_props.clone();
                let instance = cx.host.create_instance(&tag, &props);
                append_all_children(cx, instance, wip);
                cx.arena[wip].host = Some(instance);
            }
        },
        NodeKind::HostText => match (current, cx.arena[wip].host) {
            (Some(current), Some(_)) => {
                let old = cx.arena[current].memoized_props.text_content();
                if old != cx.arena[wip].pending_props.text_content() {
                    cx.arena[wip].flags |= Flags::UPDATE;
                }
            }
            _ => {
                let props = cx.arena[wip].pending_props.clone();
                let instance = cx.host.create_text_instance(props.text_content());
                cx.arena[wip].host = Some(instance);
            }
        },
        NodeKind::ContextProvider(_) => cx.contexts.pop(),
        NodeKind::Offscreen => {
            let hidden = is_hidden(&cx.arena[wip].pending_props);
            let was_hidden = current
                .map(|c| is_hidden(&cx.arena[c].memoized_props))
                .unwrap_or(false);
            if hidden != was_hidden {
                cx.arena[wip].flags |= Flags::VISIBILITY;
            }
        }
        NodeKind::HostRoot | NodeKind::Component(_) | NodeKind::Fragment | NodeKind::Suspense => {}
    }
    bubble_properties(cx.arena, wip);
}

pub(crate) fn is_hidden(props: &Props) -> bool {
    props.bool_attr(OFFSCREEN_HIDDEN).unwrap_or(false)
}

/// Attaches the nearest host descendants of `wip` to its fresh instance.
fn append_all_children(cx: &mut RenderCx<'_>, parent: HostId, wip: WorkId) {
    let mut next = cx.arena[wip].child;
    while let Some(node) = next {
        if cx.arena[node].kind.is_host() {
            if let Some(child) = cx.arena[node].host {
                cx.host.append_initial_child(parent, child);
            }
        } else if let Some(child) = cx.arena[node].child {
            next = Some(child);
            continue;
        }
        let mut cursor = node;
        next = loop {
            if let Some(sibling) = cx.arena[cursor].sibling {
                break Some(sibling);
            }
            match cx.arena[cursor].parent {
                Some(up) if up != wip => cursor = up,
                _ => break None,
            }
        };
    }
}

/// Folds the children's lanes and effect flags into `wip`. A subtree shared
/// with the committed tree contributes lanes only; its flags were consumed by
/// an earlier commit.
fn bubble_properties(arena: &mut NodeArena, wip: WorkId) {
    let shared = arena[wip]
        .alternate
        .is_some_and(|current| arena[current].child == arena[wip].child);
    let mut subtree_flags = Flags::empty();
    let mut child_lanes = NO_LANES;
    let mut next = arena[wip].child;
    while let Some(child) = next {
        let node = &arena[child];
        child_lanes |= node.lanes | node.child_lanes;
        if !shared {
            subtree_flags |= node.subtree_flags | node.flags;
        }
        next = node.sibling;
    }
    let node = &mut arena[wip];
    node.subtree_flags |= subtree_flags;
    node.child_lanes = child_lanes;
}
