//! Commit passes over a finished work tree.
//!
//! The mutation pass applies deletions, placements, host updates and layout
//! teardowns. The tree pointer is then switched, and the layout pass attaches
//! refs and runs layout setups. Passive effects are only collected here; the
//! root flushes them later.

use std::rc::Rc;

use log::{debug, warn};

use crate::complete_work::is_hidden;
use crate::flags::{Flags, HookFlags};
use crate::hooks::{effects_of, Effect};
use crate::host::{Host, HostId};
use crate::work_node::{NodeArena, NodeKind, WorkId};

/// Passive effects collected by commits and not yet flushed.
#[derive(Default)]
pub(crate) struct PassiveEffects {
    /// Teardowns of deleted components. Run before anything in `update`.
    pub unmount: Vec<Rc<Effect>>,
    /// Effects whose deps changed: teardown, then setup.
    pub update: Vec<Rc<Effect>>,
}

impl PassiveEffects {
    pub(crate) fn is_empty(&self) -> bool {
        self.unmount.is_empty() && self.update.is_empty()
    }

    pub(crate) fn run(self) {
        debug!(
            "flushing passive effects: {} unmounted, {} updated",
            self.unmount.len(),
            self.update.len()
        );
        for effect in &self.unmount {
            effect.run_destroy();
        }
        for effect in &self.update {
            effect.run_destroy();
        }
        for effect in &self.update {
            effect.run_create();
        }
    }
}

pub(crate) struct CommitCx<'a> {
    pub arena: &'a mut NodeArena,
    pub host: &'a mut dyn Host,
    pub passive: &'a mut PassiveEffects,
    /// Deleted nodes and their alternates, freed once the commit is done.
    pub released: Vec<WorkId>,
}

pub(crate) fn commit_mutation_effects(cx: &mut CommitCx<'_>, node: WorkId) {
    let deletions = std::mem::take(&mut cx.arena[node].deletions);
    for deleted in deletions {
        commit_deletion(cx, node, deleted);
    }
    // Passive effects are collected on the same walk.
    if cx.arena[node]
        .subtree_flags
        .intersects(Flags::MUTATION_MASK.union(Flags::PASSIVE_MASK))
    {
        let mut next = cx.arena[node].child;
        while let Some(child) = next {
            commit_mutation_effects(cx, child);
            next = cx.arena[child].sibling;
        }
    }

    let flags = cx.arena[node].flags;
    if flags.contains(Flags::PLACEMENT) {
        commit_placement(cx, node);
    }
    let kind = cx.arena[node].kind.clone();
    match kind {
        NodeKind::HostElement(tag) => {
            if flags.contains(Flags::REF) {
                let old_ref = cx.arena[node]
                    .alternate
                    .and_then(|current| cx.arena[current].element_ref.clone());
                if let Some(old_ref) = old_ref {
                    old_ref.set(None);
                }
            }
            if flags.contains(Flags::UPDATE) {
                let wip = &cx.arena[node];
                if let (Some(id), Some(current)) = (wip.host, wip.alternate) {
                    let old_props = cx.arena[current].memoized_props.clone();
                    let new_props = wip.memoized_props.clone();
                    cx.host.commit_update(id, &tag, &old_props, &new_props);
                }
            }
        }
        NodeKind::HostText => {
            if flags.contains(Flags::UPDATE) {
                let wip = &cx.arena[node];
                if let (Some(id), Some(current)) = (wip.host, wip.alternate) {
                    let old_text = cx.arena[current].memoized_props.clone();
                    let new_text = wip.memoized_props.clone();
                    cx.host
                        .commit_text_update(id, old_text.text_content(), new_text.text_content());
                }
            }
        }
        NodeKind::Component(_) => {
            if flags.contains(Flags::LAYOUT) {
                let effects: Vec<Rc<Effect>> = effects_of(&cx.arena[node].hooks)
                    .filter(|effect| effect.needs_run(HookFlags::LAYOUT))
                    .cloned()
                    .collect();
                for effect in effects {
                    effect.run_destroy();
                }
            }
            if flags.contains(Flags::PASSIVE) {
                let effects = effects_of(&cx.arena[node].hooks)
                    .filter(|effect| effect.needs_run(HookFlags::PASSIVE))
                    .cloned();
                cx.passive.update.extend(effects);
            }
        }
        NodeKind::Offscreen => {
            if flags.contains(Flags::VISIBILITY) {
                let hidden = is_hidden(&cx.arena[node].memoized_props);
                hide_or_unhide(cx, node, hidden);
            }
        }
        NodeKind::HostRoot
        | NodeKind::Fragment
        | NodeKind::ContextProvider(_)
        | NodeKind::Suspense => {}
    }
}

pub(crate) fn commit_layout_effects(cx: &mut CommitCx<'_>, node: WorkId) {
    if cx.arena[node].subtree_flags.intersects(Flags::LAYOUT_MASK) {
        let mut next = cx.arena[node].child;
        while let Some(child) = next {
            commit_layout_effects(cx, child);
            next = cx.arena[child].sibling;
        }
    }
    let flags = cx.arena[node].flags;
    match &cx.arena[node].kind {
        NodeKind::HostElement(_) if flags.contains(Flags::REF) => {
            let wip = &cx.arena[node];
            if let (Some(node_ref), Some(id)) = (wip.element_ref.clone(), wip.host) {
                node_ref.set(Some(id));
            }
        }
        NodeKind::Component(_) if flags.contains(Flags::LAYOUT) => {
            let effects: Vec<Rc<Effect>> = effects_of(&cx.arena[node].hooks)
                .filter(|effect| effect.needs_run(HookFlags::LAYOUT))
                .cloned()
                .collect();
            for effect in effects {
                effect.run_create();
            }
        }
        _ => {}
    }
}

/// Resets effect bookkeeping on every node the passes visited.
pub(crate) fn clear_flags(arena: &mut NodeArena, node: WorkId) {
    let had_subtree = {
        let wip = &mut arena[node];
        let had = !wip.subtree_flags.is_empty();
        wip.flags = Flags::empty();
        wip.subtree_flags = Flags::empty();
        had
    };
    if had_subtree {
        let mut next = arena[node].child;
        while let Some(child) = next {
            clear_flags(arena, child);
            next = arena[child].sibling;
        }
    }
}

/// Host instance that children of `start` are inserted into.
fn host_parent(arena: &NodeArena, start: Option<WorkId>) -> Option<HostId> {
    let mut next = start;
    while let Some(node) = next {
        let wip = &arena[node];
        if wip.kind.is_host_parent() {
            return wip.host;
        }
        next = wip.parent;
    }
    None
}

/// First host instance after `node` in tree order that is already attached
/// and stays put in this commit. Parent links crossed on the way are pointed
/// at the finished tree.
fn host_sibling(arena: &mut NodeArena, node: WorkId) -> Option<HostId> {
    let mut node = node;
    'siblings: loop {
        while arena[node].sibling.is_none() {
            match arena[node].parent {
                Some(parent) if !arena[parent].kind.is_host_parent() => node = parent,
                _ => return None,
            }
        }
        let parent = arena[node].parent;
        let Some(sibling) = arena[node].sibling else {
            return None;
        };
        arena[sibling].parent = parent;
        node = sibling;
        while !arena[node].kind.is_host() {
            if arena[node].flags.contains(Flags::PLACEMENT) {
                continue 'siblings;
            }
            let Some(child) = arena[node].child else {
                continue 'siblings;
            };
            arena[child].parent = Some(node);
            node = child;
        }
        if !arena[node].flags.contains(Flags::PLACEMENT) {
            return arena[node].host;
        }
    }
}

fn commit_placement(cx: &mut CommitCx<'_>, node: WorkId) {
    let Some(parent) = host_parent(cx.arena, cx.arena[node].parent) else {
        warn!("placed node {} has no host parent", node);
        return;
    };
    let before = host_sibling(cx.arena, node);
    insert_or_append(cx, node, parent, before);
}

fn insert_or_append(cx: &mut CommitCx<'_>, node: WorkId, parent: HostId, before: Option<HostId>) {
    if cx.arena[node].kind.is_host() {
        if let Some(id) = cx.arena[node].host {
            match before {
                Some(before) => cx.host.insert_before(parent, id, before),
                None => cx.host.append_child(parent, id),
            }
        }
        return;
    }
    let mut next = cx.arena[node].child;
    while let Some(child) = next {
        insert_or_append(cx, child, parent, before);
        next = cx.arena[child].sibling;
    }
}

/// Unmounts the committed subtree at `deleted`: refs are detached, layout
/// teardowns run, passive teardowns are queued, and the topmost host
/// instances are removed from their parent.
fn commit_deletion(cx: &mut CommitCx<'_>, parent: WorkId, deleted: WorkId) {
    let host_parent = host_parent(cx.arena, Some(parent));
    let mut roots = Vec::new();
    unmount_subtree(cx, deleted, false, &mut roots);
    match host_parent {
        Some(host_parent) => {
            for id in roots {
                cx.host.remove_child(host_parent, id);
            }
        }
        None => warn!("deleted node {} has no host parent", deleted),
    }
}

fn unmount_subtree(cx: &mut CommitCx<'_>, node: WorkId, inside_host: bool, roots: &mut Vec<HostId>) {
    cx.released.push(node);
    if let Some(alternate) = cx.arena[node].alternate {
        cx.released.push(alternate);
    }
    let kind = cx.arena[node].kind.clone();
    let mut inside_host = inside_host;
    match kind {
        NodeKind::HostElement(_) | NodeKind::HostText => {
            if let Some(node_ref) = cx.arena[node].element_ref.clone() {
                node_ref.set(None);
            }
            if !inside_host {
                if let Some(id) = cx.arena[node].host {
                    roots.push(id);
                }
            }
            inside_host = true;
        }
        NodeKind::Component(_) => {
            let effects: Vec<Rc<Effect>> = effects_of(&cx.arena[node].hooks).cloned().collect();
            for effect in effects {
                if effect.is(HookFlags::LAYOUT) {
                    effect.run_destroy();
                } else if effect.is(HookFlags::PASSIVE) {
                    cx.passive.unmount.push(effect);
                }
            }
        }
        _ => {}
    }
    let mut next = cx.arena[node].child;
    while let Some(child) = next {
        unmount_subtree(cx, child, inside_host, roots);
        next = cx.arena[child].sibling;
    }
}

/// Hides or reveals the topmost host instances under an offscreen node.
fn hide_or_unhide(cx: &mut CommitCx<'_>, node: WorkId, hidden: bool) {
    let mut next = cx.arena[node].child;
    while let Some(child) = next {
        if cx.arena[child].kind.is_host() {
            if let Some(id) = cx.arena[child].host {
                if hidden {
                    cx.host.hide_instance(id);
                } else {
                    cx.host.unhide_instance(id);
                }
            }
        } else {
            hide_or_unhide(cx, child, hidden);
        }
        next = cx.arena[child].sibling;
    }
}

#[cfg(test)]
#[path = "tests/commit_tests.rs"]
mod tests;
