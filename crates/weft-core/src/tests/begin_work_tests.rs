use super::*;
use crate::element::{Context, Element};
use crate::host::{HostOp, MemoryHost};
use crate::lanes::Lane;
use crate::update_queue::{Action, SharedQueue, Update};
use crate::work_loop::{RenderExit, RootState};
use std::cell::Cell;

struct Detached;

impl UpdateTarget for Detached {
    fn request_update_lane(&self) -> Lane {
        Lanes::SYNC
    }

    fn schedule_update(&self, _node: WorkId, _lane: Lane) {}
}

struct Harness {
    state: RootState,
    host: MemoryHost,
    queue: SharedQueue<Child>,
    container: usize,
}

impl Harness {
    fn new() -> Self {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let queue = SharedQueue::new();
        Self {
            state: RootState::new(container, queue.clone()),
            host,
            queue,
            container,
        }
    }

    fn render(&mut self, child: impl Into<Child>) -> Result<(), ReconcileError> {
        self.queue.enqueue(Update {
            lane: Lanes::SYNC,
            action: Action::Replace(child.into()),
        });
        let root = self.state.current;
        self.state
            .prepare_fresh_stack(Lanes::SYNC, vec![(root, Lanes::SYNC)]);
        let target: Weak<dyn UpdateTarget> = Weak::<Detached>::new();
        match self.state.render(&mut self.host, target, None) {
            Ok(RenderExit::Completed(finished)) => {
                self.state.commit(&mut self.host, finished);
                Ok(())
            }
            Ok(RenderExit::Yielded) => panic!("render without a slice yielded"),
            Err(err) => {
                self.state.discard_work();
                Err(err)
            }
        }
    }

    fn text(&self) -> String {
        self.host.text_content(self.container)
    }
}

fn counting(name: &'static str, renders: &Rc<Cell<usize>>) -> Component {
    let renders = renders.clone();
    Component::new(name, move |_, _| {
        renders.set(renders.get() + 1);
        Ok(Element::host("span").child("leaf").into())
    })
}

#[test]
fn unchanged_props_skip_the_component() {
    let mut h = Harness::new();
    let renders = Rc::new(Cell::new(0));
    let leaf = Element::component(&counting("Leaf", &renders));

    h.render(Element::host("div").child(leaf.clone())).unwrap();
    assert_eq!(renders.get(), 1);
    let journal = h.host.journal();
    journal.clear();

    h.render(Element::host("div").child(leaf.clone())).unwrap();
    assert_eq!(renders.get(), 1);
    assert!(journal.ops().iter().all(|op| !op.is_mutation()));

    h.render(Element::host("div").child(Element::component(&counting("Leaf", &renders))))
        .unwrap();
    assert_eq!(renders.get(), 2);
}

#[test]
fn identical_top_level_description_does_no_work() {
    let mut h = Harness::new();
    let renders = Rc::new(Cell::new(0));
    let app = Element::host("div").child(Element::component(&counting("Leaf", &renders)));
    h.render(app.clone()).unwrap();
    let live = h.state.arena.live_count();
    let journal = h.host.journal();
    journal.clear();

    h.render(app).unwrap();
    assert_eq!(renders.get(), 1);
    assert!(journal.is_empty());
    assert_eq!(h.state.arena.live_count(), live);
}

#[test]
fn provider_change_reaches_consumers_below_a_skipped_parent() {
    let mut h = Harness::new();
    let theme = Context::new(String::from("light"));
    let reader = {
        let theme = theme.clone();
        Component::new("Reader", move |hooks, _| {
            let value = hooks.use_context(&theme);
            Ok(Child::text(&*value))
        })
    };
    let wrapper = Element::host("section").child(Element::component(&reader));

    h.render(wrapper.clone()).unwrap();
    assert_eq!(h.text(), "light");

    h.render(Element::provider(&theme, Rc::new("dark".to_owned()), wrapper.clone()))
        .unwrap();
    assert_eq!(h.text(), "dark");

    h.render(Element::provider(&theme, Rc::new("dim".to_owned()), wrapper)).unwrap();
    assert_eq!(h.text(), "dim");
}

#[test]
fn suspense_keeps_primary_children_mounted_while_hidden() {
    let mut h = Harness::new();
    let content = Element::host("p").child("content");
    h.render(Element::suspense("loading", content.clone())).unwrap();
    let journal = h.host.journal();
    let p = h.host.children_of(h.container)[0];
    assert_eq!(h.text(), "content");
    journal.clear();

    h.render(Element::suspense("loading", content.clone()).suspended(true))
        .unwrap();
    assert!(h.host.is_hidden(p));
    assert_eq!(h.host.children_of(h.container).len(), 2);
    assert!(journal.ops().contains(&HostOp::Hide { id: p }));
    assert!(!journal
        .ops()
        .iter()
        .any(|op| matches!(op, HostOp::Remove { child, .. } if *child == p)));

    h.render(Element::suspense("loading", content)).unwrap();
    assert!(!h.host.is_hidden(p));
    assert_eq!(h.host.children_of(h.container), vec![p]);
}

#[test]
fn suspense_mounted_suspended_inserts_fallback_once() {
    let mut h = Harness::new();
    h.render(Element::suspense("loading", Element::host("p").child("content")).suspended(true))
        .unwrap();
    let children = h.host.children_of(h.container);
    assert_eq!(children.len(), 2);
    assert!(h.host.is_hidden(children[0]));
    assert_eq!(h.host.text_content(children[1]), "loading");
}

#[test]
fn component_error_names_the_component() {
    let mut h = Harness::new();
    let broken = Component::new("Broken", |_, _| Err(ReconcileError::render("no data")));
    let err = h.render(Element::component(&broken)).unwrap_err();
    assert_eq!(
        err,
        ReconcileError::Component {
            component: Some("Broken"),
            message: "no data".to_owned(),
        }
    );
    assert!(h.host.children_of(h.container).is_empty());
    assert_eq!(h.state.arena.live_count(), 1);
}
