//! Work nodes and the generational arena that stores both tree generations.
//!
//! A logical tree position owns at most two slots: the committed node and its
//! alternate. Links between nodes are ids, never owning references.

use std::fmt;
use std::rc::Rc;

use crate::element::{Child, Component, ContextId, ElementKind, ElementRef, Key, Props};
use crate::flags::Flags;
use crate::hooks::HookCell;
use crate::host::HostId;
use crate::lanes::{Lanes, NO_LANES};
use crate::update_queue::UpdateQueue;

/// Slot index plus generation; a freed slot never answers to an old id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId {
    index: u32,
    generation: u32,
}

impl WorkId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

#[derive(Clone, Debug)]
pub(crate) enum NodeKind {
    HostRoot,
    HostElement(Rc<str>),
    HostText,
    Component(Component),
    Fragment,
    ContextProvider(ContextId),
    Suspense,
    Offscreen,
}

impl NodeKind {
    pub(crate) fn from_element(kind: &ElementKind) -> Self {
        match kind {
            ElementKind::Host(tag) => NodeKind::HostElement(tag.clone()),
            ElementKind::Component(component) => NodeKind::Component(component.clone()),
            ElementKind::Fragment => NodeKind::Fragment,
            ElementKind::Provider(id) => NodeKind::ContextProvider(*id),
            ElementKind::Suspense => NodeKind::Suspense,
        }
    }

    pub(crate) fn matches_element(&self, kind: &ElementKind) -> bool {
        match (self, kind) {
            (NodeKind::HostElement(a), ElementKind::Host(b)) => a == b,
            (NodeKind::Component(a), ElementKind::Component(b)) => a.same_kind(b),
            (NodeKind::Fragment, ElementKind::Fragment) => true,
            (NodeKind::ContextProvider(a), ElementKind::Provider(b)) => a == b,
            (NodeKind::Suspense, ElementKind::Suspense) => true,
            _ => false,
        }
    }

    pub(crate) fn is_host(&self) -> bool {
        matches!(self, NodeKind::HostElement(_) | NodeKind::HostText)
    }

    pub(crate) fn is_host_parent(&self) -> bool {
        matches!(self, NodeKind::HostElement(_) | NodeKind::HostRoot)
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            NodeKind::HostRoot => "#root".to_owned(),
            NodeKind::HostElement(tag) => tag.to_string(),
            NodeKind::HostText => "#text".to_owned(),
            NodeKind::Component(component) => component.name().to_owned(),
            NodeKind::Fragment => "#fragment".to_owned(),
            NodeKind::ContextProvider(_) => "#provider".to_owned(),
            NodeKind::Suspense => "#suspense".to_owned(),
            NodeKind::Offscreen => "#offscreen".to_owned(),
        }
    }
}

pub(crate) struct WorkNode {
    pub kind: NodeKind,
    pub key: Option<Key>,
    pub element_ref: Option<ElementRef>,
    pub pending_props: Props,
    pub memoized_props: Props,
    pub host: Option<HostId>,

    pub parent: Option<WorkId>,
    pub child: Option<WorkId>,
    pub sibling: Option<WorkId>,
    pub index: usize,
    pub alternate: Option<WorkId>,

    pub flags: Flags,
    pub subtree_flags: Flags,
    pub deletions: Vec<WorkId>,
    pub lanes: Lanes,
    pub child_lanes: Lanes,

    /// Host roots only: queue of top-level descriptions and the last result.
    pub root_queue: Option<UpdateQueue<Child>>,
    pub root_state: Child,
    /// Component nodes only.
    pub hooks: Vec<HookCell>,
}

impl WorkNode {
    pub(crate) fn new(kind: NodeKind, key: Option<Key>, props: Props) -> Self {
        Self {
            kind,
            key,
            element_ref: None,
            pending_props: props.clone(),
            memoized_props: props,
            host: None,
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            alternate: None,
            flags: Flags::empty(),
            subtree_flags: Flags::empty(),
            deletions: Vec::new(),
            lanes: NO_LANES,
            child_lanes: NO_LANES,
            root_queue: None,
            root_state: Child::Empty,
            hooks: Vec::new(),
        }
    }
}

struct Slot {
    generation: u32,
    node: Option<WorkNode>,
}

/// Slot storage for work nodes.
#[derive(Default)]
pub(crate) struct NodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Nodes allocated since the last [`NodeArena::settle`].
    recent: Vec<WorkId>,
}

impl NodeArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc(&mut self, node: WorkNode) -> WorkId {
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                WorkId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                WorkId {
                    index,
                    generation: 0,
                }
            }
        };
        self.recent.push(id);
        id
    }

    pub(crate) fn get(&self, id: WorkId) -> Option<&WorkNode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: WorkId) -> Option<&mut WorkNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub(crate) fn contains(&self, id: WorkId) -> bool {
        self.get(id).is_some()
    }

    /// Frees a slot. Freeing a stale id is a no-op.
    pub(crate) fn free(&mut self, id: WorkId) {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return;
        };
        if slot.generation != id.generation || slot.node.is_none() {
            return;
        }
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
    }

    /// Accepts every allocation made since the last settle.
    pub(crate) fn settle(&mut self) {
        self.recent.clear();
    }

    /// Frees every allocation made since the last settle and unlinks live
    /// nodes that named one of them as their alternate.
    pub(crate) fn discard_recent(&mut self) {
        let recent = std::mem::take(&mut self.recent);
        for &id in &recent {
            let Some(alternate) = self.get(id).and_then(|node| node.alternate) else {
                continue;
            };
            if let Some(node) = self.get_mut(alternate) {
                if node.alternate == Some(id) {
                    node.alternate = None;
                }
            }
        }
        for id in recent {
            self.free(id);
        }
    }

    pub(crate) fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count()
    }

    /// Returns the work copy of `current` for a new render, creating it on
    /// first use. Effect state is reset; everything else starts as a copy of
    /// the committed node.
    pub(crate) fn clone_for_work(&mut self, current: WorkId, pending_props: Props) -> WorkId {
        let Some(cur) = self.get(current) else {
            return current;
        };
        let kind = cur.kind.clone();
        let key = cur.key.clone();
        let host = cur.host;
        let element_ref = cur.element_ref.clone();
        let child = cur.child;
        let memoized_props = cur.memoized_props.clone();
        let root_queue = cur.root_queue.clone();
        let root_state = cur.root_state.clone();
        let hooks = cur.hooks.clone();
        let lanes = cur.lanes;
        let child_lanes = cur.child_lanes;
        let index = cur.index;
        let existing = cur.alternate.filter(|&alt| self.contains(alt));

        let wip = match existing {
            Some(wip) => wip,
            None => {
                let wip = self.alloc(WorkNode::new(kind.clone(), key.clone(), pending_props.clone()));
                if let Some(cur) = self.get_mut(current) {
                    cur.alternate = Some(wip);
                }
                wip
            }
        };
        if let Some(node) = self.get_mut(wip) {
            node.kind = kind;
            node.key = key;
            node.host = host;
            node.element_ref = element_ref;
            node.pending_props = pending_props;
            node.memoized_props = memoized_props;
            node.child = child;
            node.sibling = None;
            node.index = index;
            node.alternate = Some(current);
            node.flags = Flags::empty();
            node.subtree_flags = Flags::empty();
            node.deletions.clear();
            node.lanes = lanes;
            node.child_lanes = child_lanes;
            node.root_queue = root_queue;
            node.root_state = root_state;
            node.hooks = hooks;
        }
        wip
    }

    /// Iterates the sibling list starting at `first`.
    pub(crate) fn siblings(&self, first: Option<WorkId>) -> Siblings<'_> {
        Siblings {
            arena: self,
            next: first,
        }
    }
}

impl std::ops::Index<WorkId> for NodeArena {
    type Output = WorkNode;

    fn index(&self, id: WorkId) -> &WorkNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("work node {id:?} is not live"),
        }
    }
}

impl std::ops::IndexMut<WorkId> for NodeArena {
    fn index_mut(&mut self, id: WorkId) -> &mut WorkNode {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("work node {id:?} is not live"),
        }
    }
}

pub(crate) struct Siblings<'a> {
    arena: &'a NodeArena,
    next: Option<WorkId>,
}

impl Iterator for Siblings<'_> {
    type Item = WorkId;

    fn next(&mut self) -> Option<WorkId> {
        let id = self.next?;
        self.next = self.arena.get(id).and_then(|node| node.sibling);
        Some(id)
    }
}

/// Read-only view of a committed node, for diagnostics and tests.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeSnapshot {
    pub id: WorkId,
    pub kind: String,
    pub key: Option<Key>,
    pub host: Option<HostId>,
    pub text: Option<String>,
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    pub(crate) fn capture(arena: &NodeArena, id: WorkId) -> Option<NodeSnapshot> {
        let node = arena.get(id)?;
        let text = match node.kind {
            NodeKind::HostText => Some(node.memoized_props.text_content().to_owned()),
            _ => None,
        };
        let children = arena
            .siblings(node.child)
            .filter_map(|child| NodeSnapshot::capture(arena, child))
            .collect();
        Some(NodeSnapshot {
            id,
            kind: node.kind.describe(),
            key: node.key.clone(),
            host: node.host,
            text,
            children,
        })
    }

    /// Depth-first search by key.
    pub fn find_key(&self, key: &str) -> Option<&NodeSnapshot> {
        if self.key.as_ref().is_some_and(|k| k.as_str() == key) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_key(key))
    }

    /// Host ids of the nearest host nodes below this one, in tree order.
    pub fn host_children(&self) -> Vec<HostId> {
        let mut out = Vec::new();
        for child in &self.children {
            match child.host {
                Some(host) => out.push(host),
                None => out.extend(child.host_children()),
            }
        }
        out
    }
}
