//! Host primitives and an in-memory host.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::element::Props;

/// Opaque reference to a host object.
pub type HostId = usize;

/// Primitive operations of a rendering target.
///
/// The reconciler calls these only from the commit phase, except for
/// `create_*` and `append_initial_child`, which build detached subtrees
/// during the render phase.
pub trait Host {
    fn create_instance(&mut self, tag: &str, props: &Props) -> HostId;
    fn create_text_instance(&mut self, text: &str) -> HostId;

    /// Appends into a detached parent that is still being built.
    fn append_initial_child(&mut self, parent: HostId, child: HostId);
    /// Appends `child` to `parent`, moving it if it is already attached.
    fn append_child(&mut self, parent: HostId, child: HostId);
    /// Inserts `child` before `before`, moving it if it is already attached.
    fn insert_before(&mut self, parent: HostId, child: HostId, before: HostId);
    fn remove_child(&mut self, parent: HostId, child: HostId);

    fn commit_update(&mut self, id: HostId, tag: &str, old_props: &Props, new_props: &Props);
    fn commit_text_update(&mut self, id: HostId, old_text: &str, new_text: &str);

    fn hide_instance(&mut self, _id: HostId) {}
    fn unhide_instance(&mut self, _id: HostId) {}
}

/// One call recorded by [`MemoryHost`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostOp {
    CreateInstance { id: HostId, tag: String },
    CreateText { id: HostId, text: String },
    AppendInitial { parent: HostId, child: HostId },
    Append { parent: HostId, child: HostId },
    InsertBefore { parent: HostId, child: HostId, before: HostId },
    Remove { parent: HostId, child: HostId },
    UpdateProps { id: HostId },
    UpdateText { id: HostId, text: String },
    Hide { id: HostId },
    Unhide { id: HostId },
}

impl HostOp {
    /// Whether the op touched an attached tree, as opposed to building a
    /// detached one.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            HostOp::CreateInstance { .. } | HostOp::CreateText { .. } | HostOp::AppendInitial { .. }
        )
    }
}

/// Shared view of the calls a [`MemoryHost`] received.
#[derive(Clone, Default, Debug)]
pub struct HostJournal(Rc<RefCell<Vec<HostOp>>>);

impl HostJournal {
    pub fn ops(&self) -> Vec<HostOp> {
        self.0.borrow().clone()
    }

    pub fn take(&self) -> Vec<HostOp> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    fn push(&self, op: HostOp) {
        self.0.borrow_mut().push(op);
    }
}

#[derive(Debug)]
enum HostNodeKind {
    Container,
    Element { tag: Rc<str>, props: Props },
    Text(String),
}

#[derive(Debug)]
struct HostNode {
    kind: HostNodeKind,
    parent: Option<HostId>,
    children: Vec<HostId>,
    hidden: bool,
}

/// Host target that keeps a plain node tree in memory and journals every call.
#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<Option<HostNode>>,
    journal: HostJournal,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a root container. Not journaled.
    pub fn create_container(&mut self) -> HostId {
        self.insert(HostNodeKind::Container)
    }

    pub fn journal(&self) -> HostJournal {
        self.journal.clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: HostId) -> bool {
        self.node(id).is_some()
    }

    pub fn children_of(&self, id: HostId) -> Vec<HostId> {
        self.node(id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn parent_of(&self, id: HostId) -> Option<HostId> {
        self.node(id).and_then(|node| node.parent)
    }

    pub fn tag_of(&self, id: HostId) -> Option<&str> {
        match self.node(id).map(|node| &node.kind) {
            Some(HostNodeKind::Element { tag, .. }) => Some(tag),
            _ => None,
        }
    }

    pub fn props_of(&self, id: HostId) -> Option<&Props> {
        match self.node(id).map(|node| &node.kind) {
            Some(HostNodeKind::Element { props, .. }) => Some(props),
            _ => None,
        }
    }

    pub fn is_hidden(&self, id: HostId) -> bool {
        self.node(id).is_some_and(|node| node.hidden)
    }

    /// Concatenated text of every text node below `id`.
    pub fn text_content(&self, id: HostId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: HostId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        if let HostNodeKind::Text(text) = &node.kind {
            out.push_str(text);
        }
        for &child in &node.children {
            self.collect_text(child, out);
        }
    }

    pub fn dump_tree(&self, root: HostId) -> String {
        let mut output = String::new();
        self.dump_node(&mut output, root, 0);
        output
    }

    fn dump_node(&self, output: &mut String, id: HostId, depth: usize) {
        let indent = "  ".repeat(depth);
        let Some(node) = self.node(id) else {
            let _ = writeln!(output, "{indent}[{id}] (missing)");
            return;
        };
        let hidden = if node.hidden { " hidden" } else { "" };
        let _ = match &node.kind {
            HostNodeKind::Container => writeln!(output, "{indent}[{id}] #container"),
            HostNodeKind::Element { tag, props } => {
                let mut attrs = String::new();
                for (name, value) in props.attributes() {
                    let _ = write!(attrs, " {name}={value:?}");
                }
                writeln!(output, "{indent}[{id}] <{tag}{attrs}>{hidden}")
            }
            HostNodeKind::Text(text) => writeln!(output, "{indent}[{id}] {text:?}{hidden}"),
        };
        for &child in &node.children {
            self.dump_node(output, child, depth + 1);
        }
    }

    fn insert(&mut self, kind: HostNodeKind) -> HostId {
        let id = self.nodes.len();
        self.nodes.push(Some(HostNode {
            kind,
            parent: None,
            children: Vec::new(),
            hidden: false,
        }));
        id
    }

    fn node(&self, id: HostId) -> Option<&HostNode> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: HostId) -> Option<&mut HostNode> {
        self.nodes.get_mut(id).and_then(Option::as_mut)
    }

    fn detach(&mut self, child: HostId) {
        let Some(parent) = self.node(child).and_then(|node| node.parent) else {
            return;
        };
        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.retain(|&c| c != child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = None;
        }
    }

    fn attach(&mut self, parent: HostId, child: HostId, before: Option<HostId>) {
        if self.node(parent).is_none() || self.node(child).is_none() {
            log::warn!("memory host: attach of {child} into {parent} refers to a missing node");
            return;
        }
        self.detach(child);
        if let Some(parent_node) = self.node_mut(parent) {
            let position = before
                .and_then(|before| parent_node.children.iter().position(|&c| c == before))
                .unwrap_or(parent_node.children.len());
            parent_node.children.insert(position, child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
    }

    fn release(&mut self, id: HostId) {
        let children = match self.nodes.get_mut(id).and_then(Option::take) {
            Some(node) => node.children,
            None => return,
        };
        for child in children {
            self.release(child);
        }
    }
}

impl Host for MemoryHost {
    fn create_instance(&mut self, tag: &str, props: &Props) -> HostId {
        let id = self.insert(HostNodeKind::Element {
            tag: Rc::from(tag),
            props: props.clone(),
        });
        self.journal.push(HostOp::CreateInstance {
            id,
            tag: tag.to_owned(),
        });
        id
    }

    fn create_text_instance(&mut self, text: &str) -> HostId {
        let id = self.insert(HostNodeKind::Text(text.to_owned()));
        self.journal.push(HostOp::CreateText {
            id,
            text: text.to_owned(),
        });
        id
    }

    fn append_initial_child(&mut self, parent: HostId, child: HostId) {
        self.attach(parent, child, None);
        self.journal.push(HostOp::AppendInitial { parent, child });
    }

    fn append_child(&mut self, parent: HostId, child: HostId) {
        self.attach(parent, child, None);
        self.journal.push(HostOp::Append { parent, child });
    }

    fn insert_before(&mut self, parent: HostId, child: HostId, before: HostId) {
        self.attach(parent, child, Some(before));
        self.journal.push(HostOp::InsertBefore {
            parent,
            child,
            before,
        });
    }

    fn remove_child(&mut self, parent: HostId, child: HostId) {
        if self.node(child).and_then(|node| node.parent) != Some(parent) {
            log::warn!("memory host: {child} is not a child of {parent}");
        }
        self.detach(child);
        self.release(child);
        self.journal.push(HostOp::Remove { parent, child });
    }

    fn commit_update(&mut self, id: HostId, _tag: &str, _old_props: &Props, new_props: &Props) {
        if let Some(HostNode {
            kind: HostNodeKind::Element { props, .. },
            ..
        }) = self.node_mut(id)
        {
            *props = new_props.clone();
        }
        self.journal.push(HostOp::UpdateProps { id });
    }

    fn commit_text_update(&mut self, id: HostId, _old_text: &str, new_text: &str) {
        if let Some(HostNode {
            kind: HostNodeKind::Text(text),
            ..
        }) = self.node_mut(id)
        {
            *text = new_text.to_owned();
        }
        self.journal.push(HostOp::UpdateText {
            id,
            text: new_text.to_owned(),
        });
    }

    fn hide_instance(&mut self, id: HostId) {
        if let Some(node) = self.node_mut(id) {
            node.hidden = true;
        }
        self.journal.push(HostOp::Hide { id });
    }

    fn unhide_instance(&mut self, id: HostId) {
        if let Some(node) = self.node_mut(id) {
            node.hidden = false;
        }
        self.journal.push(HostOp::Unhide { id });
    }
}
