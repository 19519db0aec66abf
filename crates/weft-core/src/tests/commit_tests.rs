use super::*;
use crate::element::{Child, Component, Element, ElementRef, PropValue};
use crate::hooks::Teardown;
use crate::host::{HostJournal, HostOp, MemoryHost};
use crate::platform::Scheduler;
use crate::root::{create_root, Root};
use crate::runtime::ManualScheduler;
use std::cell::RefCell;

struct Fixture {
    root: Root<MemoryHost>,
    scheduler: Rc<ManualScheduler>,
    journal: HostJournal,
}

impl Fixture {
    fn new() -> Self {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let journal = host.journal();
        let scheduler = Rc::new(ManualScheduler::new());
        let root = create_root(host, container, scheduler.clone() as Rc<dyn Scheduler>);
        Self {
            root,
            scheduler,
            journal,
        }
    }

    fn render(&self, child: impl Into<Child>) {
        self.root.render(child);
        self.scheduler.run_until_idle();
        assert_eq!(self.root.take_error(), None);
    }

    fn text(&self) -> String {
        self.root
            .with_host(|host| host.text_content(self.root.container()))
            .unwrap()
    }

    fn mutations(&self) -> Vec<HostOp> {
        self.journal
            .take()
            .into_iter()
            .filter(HostOp::is_mutation)
            .collect()
    }
}

fn list(keys: &[&str]) -> Element {
    Element::host("ul").children(
        keys.iter()
            .map(|key| Element::host("li").key(*key).child(*key))
            .collect::<Vec<_>>(),
    )
}

fn host_of(fixture: &Fixture, key: &str) -> usize {
    let snapshot = fixture.root.snapshot().unwrap();
    snapshot.find_key(key).and_then(|node| node.host).unwrap()
}

#[test]
fn moved_children_are_appended_after_the_stable_one() {
    let f = Fixture::new();
    f.render(list(&["a", "b", "c"]));
    let ul = f.root.with_host(|h| h.children_of(f.root.container())[0]).unwrap();
    let (a, b) = (host_of(&f, "a"), host_of(&f, "b"));
    f.journal.clear();

    f.render(list(&["c", "a", "b"]));
    assert_eq!(f.text(), "cab");
    assert_eq!(
        f.mutations(),
        [
            HostOp::Append { parent: ul, child: a },
            HostOp::Append { parent: ul, child: b },
        ]
    );
}

#[test]
fn new_child_is_inserted_before_its_next_stable_sibling() {
    let f = Fixture::new();
    f.render(list(&["a", "c"]));
    let ul = f.root.with_host(|h| h.children_of(f.root.container())[0]).unwrap();
    let c = host_of(&f, "c");
    f.journal.clear();

    f.render(list(&["a", "b", "c"]));
    assert_eq!(f.text(), "abc");
    let b = host_of(&f, "b");
    assert_eq!(
        f.mutations(),
        [HostOp::InsertBefore {
            parent: ul,
            child: b,
            before: c,
        }]
    );
}

#[test]
fn component_children_are_placed_in_order_before_a_sibling() {
    let pair = Component::new("Pair", |_, _| {
        Ok(Element::fragment(vec![
            Element::host("i").child("1"),
            Element::host("i").child("2"),
        ])
        .into())
    });
    let f = Fixture::new();
    f.render(Element::host("div").child(vec![Element::host("b").key("tail").child("3")]));
    f.render(Element::host("div").child(vec![
        Element::component(&pair).key("pair"),
        Element::host("b").key("tail").child("3"),
    ]));
    assert_eq!(f.text(), "123");
}

#[test]
fn removed_children_are_removed_once_at_the_top() {
    let f = Fixture::new();
    f.render(Element::host("div").child(vec![
        Element::host("section")
            .key("gone")
            .child(Element::host("p").child("deep")),
        Element::host("span").key("kept").child("kept"),
    ]));
    let div = f.root.with_host(|h| h.children_of(f.root.container())[0]).unwrap();
    let section = host_of(&f, "gone");
    f.journal.clear();

    f.render(Element::host("div").child(vec![Element::host("span").key("kept").child("kept")]));
    assert_eq!(
        f.mutations(),
        [HostOp::Remove {
            parent: div,
            child: section,
        }]
    );
    assert_eq!(f.text(), "kept");
}

#[test]
fn ref_is_cleared_before_its_host_is_removed() {
    let f = Fixture::new();
    let calls: Rc<RefCell<Vec<(Option<usize>, usize)>>> = Rc::new(RefCell::new(Vec::new()));
    let node_ref = {
        let calls = calls.clone();
        let journal = f.journal.clone();
        ElementRef::callback(move |host| calls.borrow_mut().push((host, journal.len())))
    };
    f.render(Element::host("div").child(Element::host("input").with_ref(node_ref.clone())));
    let input = host_of_first_grandchild(&f);
    assert_eq!(calls.borrow().last().map(|call| call.0), Some(Some(input)));

    f.render(Element::host("div").child(Element::host("input").with_ref(node_ref)));
    assert_eq!(calls.borrow().len(), 1);

    let before_removal = f.journal.len();
    f.render(Element::host("div"));
    let (cleared, journal_len) = calls.borrow()[1];
    assert_eq!(cleared, None);
    assert_eq!(journal_len, before_removal);
    assert!(f
        .journal
        .ops()
        .iter()
        .any(|op| matches!(op, HostOp::Remove { child, .. } if *child == input)));
}

fn host_of_first_grandchild(f: &Fixture) -> usize {
    f.root
        .with_host(|h| {
            let div = h.children_of(f.root.container())[0];
            h.children_of(div)[0]
        })
        .unwrap()
}

#[test]
fn changed_ref_detaches_old_and_attaches_new() {
    let f = Fixture::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let make = |name: &'static str| {
        let log = log.clone();
        ElementRef::callback(move |host| log.borrow_mut().push((name, host.is_some())))
    };
    f.render(Element::host("input").with_ref(make("first")));
    f.render(Element::host("input").with_ref(make("second")));
    assert_eq!(
        *log.borrow(),
        [("first", true), ("first", false), ("second", true)]
    );
}

#[test]
fn layout_effects_run_inside_commit_in_teardown_then_setup_order() {
    let f = Fixture::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let widget = {
        let log = log.clone();
        Component::new("Widget", move |hooks, props| {
            let value = props.int_attr("value").unwrap_or(0);
            let log = log.clone();
            hooks.use_layout_effect(Some(vec![PropValue::Int(value)]), move || {
                log.borrow_mut().push(format!("setup {value}"));
                let log = log.clone();
                Teardown::new(move || log.borrow_mut().push(format!("teardown {value}")))
            })?;
            Ok(Child::Empty)
        })
    };
    f.root.render(Element::component(&widget).prop("value", 1));
    f.scheduler.run_microtasks();
    assert_eq!(*log.borrow(), ["setup 1"]);

    f.render(Element::component(&widget).prop("value", 1));
    assert_eq!(*log.borrow(), ["setup 1"]);

    f.render(Element::component(&widget).prop("value", 2));
    assert_eq!(*log.borrow(), ["setup 1", "teardown 1", "setup 2"]);

    f.render(Child::Empty);
    assert_eq!(
        *log.borrow(),
        ["setup 1", "teardown 1", "setup 2", "teardown 2"]
    );
}

#[test]
fn passive_flush_runs_unmounts_before_updates() {
    let f = Fixture::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let tracked = |label: &'static str| {
        let log = log.clone();
        Component::new(label, move |hooks, props| {
            let dep = props.int_attr("dep").unwrap_or(0);
            let log = log.clone();
            hooks.use_effect(Some(vec![dep.into()]), move || {
                log.borrow_mut().push(format!("{label} setup {dep}"));
                let log = log.clone();
                Teardown::new(move || log.borrow_mut().push(format!("{label} teardown {dep}")))
            })?;
            Ok(Child::Empty)
        })
    };
    let removed = tracked("removed");
    let changed = tracked("changed");
    f.render(vec![
        Element::component(&removed).key("r"),
        Element::component(&changed).key("c").prop("dep", 1),
    ]);
    log.borrow_mut().clear();

    f.render(vec![Element::component(&changed).key("c").prop("dep", 2)]);
    assert_eq!(
        *log.borrow(),
        ["removed teardown 0", "changed teardown 1", "changed setup 2"]
    );
}
