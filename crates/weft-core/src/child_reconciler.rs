//! Keyed child diffing.
//!
//! Produces the work-in-progress child list of a parent from a new child
//! description and the parent's committed children. Reused children are
//! cloned from the committed ones; moved and new children get
//! [`Flags::PLACEMENT`]; removed ones are queued on the parent.

use std::rc::Rc;

use crate::collections::map::{HashMap, HashSet};
use crate::element::{Child, Element, ElementKind, Key, Props};
use crate::flags::Flags;
use crate::work_node::{NodeArena, NodeKind, WorkId, WorkNode};

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
enum ChildKey {
    Explicit(Key),
    Index(usize),
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct ChildReconciler {
    track_effects: bool,
}

impl ChildReconciler {
    /// For parents that have a committed counterpart.
    pub(crate) const UPDATE: ChildReconciler = ChildReconciler {
        track_effects: true,
    };
    /// For parents mounting for the first time: nothing to delete, and the
    /// whole subtree is inserted by its nearest placed ancestor.
    pub(crate) const MOUNT: ChildReconciler = ChildReconciler {
        track_effects: false,
    };

    /// Returns the first child of the new list.
    pub(crate) fn reconcile(
        &self,
        arena: &mut NodeArena,
        parent: WorkId,
        current_first: Option<WorkId>,
        new_child: &Child,
    ) -> Option<WorkId> {
        let new_child = match new_child {
            Child::Element(element)
                if matches!(element.kind, ElementKind::Fragment) && element.key.is_none() =>
            {
                element.props.children()
            }
            other => other,
        };
        match new_child {
            Child::Element(element) => {
                let wip = self.reconcile_single_element(arena, parent, current_first, element);
                Some(self.place_single(arena, wip))
            }
            Child::Text(text) => {
                let wip = self.reconcile_single_text(arena, parent, current_first, text);
                Some(self.place_single(arena, wip))
            }
            Child::List(items) => self.reconcile_array(arena, parent, current_first, items),
            Child::Empty => {
                self.delete_remaining(arena, parent, current_first);
                None
            }
        }
    }

    fn reconcile_single_element(
        &self,
        arena: &mut NodeArena,
        parent: WorkId,
        current_first: Option<WorkId>,
        element: &Element,
    ) -> WorkId {
        let mut current = current_first;
        while let Some(candidate) = current {
            let next = arena[candidate].sibling;
            if arena[candidate].key == element.key {
                if arena[candidate].kind.matches_element(&element.kind) {
                    self.delete_remaining(arena, parent, next);
                    let wip = use_existing_element(arena, candidate, element);
                    arena[wip].parent = Some(parent);
                    return wip;
                }
                self.delete_remaining(arena, parent, Some(candidate));
                break;
            }
            self.delete_child(arena, parent, candidate);
            current = next;
        }
        let wip = create_from_element(arena, element);
        arena[wip].parent = Some(parent);
        wip
    }

    fn reconcile_single_text(
        &self,
        arena: &mut NodeArena,
        parent: WorkId,
        current_first: Option<WorkId>,
        text: &Rc<str>,
    ) -> WorkId {
        if let Some(first) = current_first.filter(|&c| matches!(arena[c].kind, NodeKind::HostText))
        {
            let next = arena[first].sibling;
            self.delete_remaining(arena, parent, next);
            let wip = use_existing(arena, first, text_props(text));
            arena[wip].parent = Some(parent);
            return wip;
        }
        self.delete_remaining(arena, parent, current_first);
        let wip = create_text(arena, text);
        arena[wip].parent = Some(parent);
        wip
    }

    fn reconcile_array(
        &self,
        arena: &mut NodeArena,
        parent: WorkId,
        current_first: Option<WorkId>,
        items: &[Child],
    ) -> Option<WorkId> {
        let old: Vec<WorkId> = arena.siblings(current_first).collect();
        let mut existing: HashMap<ChildKey, WorkId> = HashMap::default();
        let mut shadowed = Vec::new();
        for &node in &old {
            let key = match &arena[node].key {
                Some(key) => ChildKey::Explicit(key.clone()),
                None => ChildKey::Index(arena[node].index),
            };
            if let Some(previous) = existing.insert(key, node) {
                shadowed.push(previous);
            }
        }

        let mut new_keys: HashSet<Key> = HashSet::default();
        let mut last_placed_index = 0;
        let mut first = None;
        let mut previous: Option<WorkId> = None;
        for (index, item) in items.iter().enumerate() {
            if let Child::Element(Element { key: Some(key), .. }) = item {
                if !new_keys.insert(key.clone()) {
                    log::warn!("duplicate child key {key} under {parent}; the later one is remounted");
                }
            }
            let Some(wip) = update_from_map(arena, &mut existing, index, item) else {
                continue;
            };
            arena[wip].index = index;
            arena[wip].parent = Some(parent);
            if self.track_effects {
                match arena[wip].alternate {
                    Some(current) => {
                        let old_index = arena[current].index;
                        if old_index < last_placed_index {
                            arena[wip].flags |= Flags::PLACEMENT;
                        } else {
                            last_placed_index = old_index;
                        }
                    }
                    None => arena[wip].flags |= Flags::PLACEMENT,
                }
            }
            match previous {
                Some(prev) => arena[prev].sibling = Some(wip),
                None => first = Some(wip),
            }
            previous = Some(wip);
        }

        if self.track_effects {
            let leftover: HashSet<WorkId> = existing.into_values().chain(shadowed).collect();
            for node in old {
                if leftover.contains(&node) {
                    self.delete_child(arena, parent, node);
                }
            }
        }
        first
    }

    fn place_single(&self, arena: &mut NodeArena, wip: WorkId) -> WorkId {
        if self.track_effects && arena[wip].alternate.is_none() {
            arena[wip].flags |= Flags::PLACEMENT;
        }
        wip
    }

    fn delete_child(&self, arena: &mut NodeArena, parent: WorkId, child: WorkId) {
        if !self.track_effects {
            return;
        }
        let node = &mut arena[parent];
        node.deletions.push(child);
        node.flags |= Flags::CHILD_DELETION;
    }

    fn delete_remaining(&self, arena: &mut NodeArena, parent: WorkId, first: Option<WorkId>) {
        if !self.track_effects {
            return;
        }
        let doomed: Vec<WorkId> = arena.siblings(first).collect();
        for child in doomed {
            self.delete_child(arena, parent, child);
        }
    }
}

fn update_from_map(
    arena: &mut NodeArena,
    existing: &mut HashMap<ChildKey, WorkId>,
    index: usize,
    item: &Child,
) -> Option<WorkId> {
    match item {
        Child::Empty => None,
        Child::Text(text) => {
            let key = ChildKey::Index(index);
            let matched = existing
                .get(&key)
                .copied()
                .filter(|&c| matches!(arena[c].kind, NodeKind::HostText));
            Some(match matched {
                Some(current) => {
                    existing.remove(&key);
                    use_existing(arena, current, text_props(text))
                }
                None => create_text(arena, text),
            })
        }
        Child::Element(element) => {
            let key = match &element.key {
                Some(key) => ChildKey::Explicit(key.clone()),
                None => ChildKey::Index(index),
            };
            let matched = existing
                .get(&key)
                .copied()
                .filter(|&c| arena[c].kind.matches_element(&element.kind));
            Some(match matched {
                Some(current) => {
                    existing.remove(&key);
                    use_existing_element(arena, current, element)
                }
                None => create_from_element(arena, element),
            })
        }
        Child::List(items) => {
            let key = ChildKey::Index(index);
            let props = Props::from_children(Child::List(items.clone()));
            let matched = existing
                .get(&key)
                .copied()
                .filter(|&c| matches!(arena[c].kind, NodeKind::Fragment));
            Some(match matched {
                Some(current) => {
                    existing.remove(&key);
                    use_existing(arena, current, props)
                }
                None => arena.alloc(WorkNode::new(NodeKind::Fragment, None, props)),
            })
        }
    }
}

fn use_existing(arena: &mut NodeArena, current: WorkId, props: Props) -> WorkId {
    let wip = arena.clone_for_work(current, props);
    let node = &mut arena[wip];
    node.index = 0;
    node.sibling = None;
    wip
}

/// Reuses `current` for `element`. The component function is taken from the
/// element: closures of the same kind may capture different state.
fn use_existing_element(arena: &mut NodeArena, current: WorkId, element: &Element) -> WorkId {
    let wip = use_existing(arena, current, element.props.clone());
    let node = &mut arena[wip];
    node.element_ref = element.node_ref.clone();
    if let ElementKind::Component(component) = &element.kind {
        node.kind = NodeKind::Component(component.clone());
    }
    wip
}

fn create_from_element(arena: &mut NodeArena, element: &Element) -> WorkId {
    let mut node = WorkNode::new(
        NodeKind::from_element(&element.kind),
        element.key.clone(),
        element.props.clone(),
    );
    node.element_ref = element.node_ref.clone();
    arena.alloc(node)
}

fn create_text(arena: &mut NodeArena, text: &Rc<str>) -> WorkId {
    arena.alloc(WorkNode::new(NodeKind::HostText, None, text_props(text)))
}

fn text_props(text: &Rc<str>) -> Props {
    Props::from_children(Child::Text(text.clone()))
}

#[cfg(test)]
#[path = "tests/child_reconciler_tests.rs"]
mod tests;
