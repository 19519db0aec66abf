use super::*;
use crate::element::{Component, Element};
use crate::hooks::{Dispatch, Teardown};
use crate::host::MemoryHost;
use crate::runtime::ManualScheduler;

type Slot<T> = Rc<RefCell<Option<Dispatch<T>>>>;

fn setup_with(options: RootOptions) -> (Root<MemoryHost>, Rc<ManualScheduler>) {
    let mut host = MemoryHost::new();
    let container = host.create_container();
    let scheduler = Rc::new(ManualScheduler::new());
    let root = Root::with_options(
        host,
        container,
        scheduler.clone() as Rc<dyn Scheduler>,
        options,
    );
    (root, scheduler)
}

fn setup() -> (Root<MemoryHost>, Rc<ManualScheduler>) {
    setup_with(RootOptions::new().label("test"))
}

fn text(root: &Root<MemoryHost>) -> String {
    root.with_host(|host| host.text_content(root.container()))
        .unwrap()
}

/// Component showing a piece of state and exposing its dispatcher.
fn stateful<T>(initial: T, slot: &Slot<T>) -> Component
where
    T: Clone + std::fmt::Display + 'static,
{
    let slot = slot.clone();
    Component::new("Stateful", move |hooks, _| {
        let (value, set) = hooks.use_state(|| initial.clone())?;
        *slot.borrow_mut() = Some(set);
        Ok(Child::text(value))
    })
}

fn dispatcher<T>(slot: &Slot<T>) -> Dispatch<T> {
    slot.borrow().clone().unwrap()
}

#[test]
fn render_commits_in_the_microtask() {
    let (root, scheduler) = setup();
    root.render(Element::host("p").child("hello"));
    assert_eq!(text(&root), "");
    assert_eq!(root.pending_lanes(), Lanes::SYNC);
    scheduler.run_microtasks();
    assert_eq!(text(&root), "hello");
    assert_eq!(root.commit_count(), 1);
    assert!(root.pending_lanes().is_empty());
}

#[test]
fn sync_updates_in_one_tick_are_batched() {
    let (root, scheduler) = setup();
    let slot: Slot<i64> = Rc::default();
    root.render(Element::component(&stateful(0, &slot)));
    scheduler.run_until_idle();

    let set = dispatcher(&slot);
    set.update(|n| n + 1).unwrap();
    set.update(|n| n + 2).unwrap();
    set.update(|n| n + 3).unwrap();
    assert_eq!(scheduler.pending_microtask_count(), 1);
    scheduler.run_until_idle();
    assert_eq!(text(&root), "6");
    assert_eq!(root.commit_count(), 2);
}

#[test]
fn flush_sync_renders_without_waiting() {
    let (root, _scheduler) = setup();
    root.render(Element::host("p").child("now"));
    root.flush_sync().unwrap();
    assert_eq!(text(&root), "now");
}

#[test]
fn sync_update_preempts_a_suspended_default_render_and_both_apply() {
    let (root, scheduler) = setup();
    let slot: Slot<String> = Rc::default();
    root.render(Element::host("div").child(vec![
        Element::host("span").child("x"),
        Element::component(&stateful(String::new(), &slot)),
    ]));
    scheduler.run_until_idle();
    let set = dispatcher(&slot);

    scheduler.set_yield_budget(Some(1));
    set.update_with_lane(Lanes::DEFAULT, |s| format!("{s}a")).unwrap();
    assert!(scheduler.run_next_task());
    assert!(root.has_work_in_progress());
    assert_eq!(text(&root), "x");

    set.update_with_lane(Lanes::SYNC, |s| format!("{s}b")).unwrap();
    scheduler.run_microtasks();
    assert_eq!(text(&root), "xb");
    assert_eq!(root.pending_lanes(), Lanes::DEFAULT);

    scheduler.set_yield_budget(None);
    scheduler.run_until_idle();
    assert_eq!(text(&root), "xab");
}

#[test]
fn time_sliced_render_resumes_where_it_yielded() {
    let (root, scheduler) = setup_with(RootOptions::new().default_lane(Lanes::DEFAULT));
    let items: Vec<Element> = (0..8)
        .map(|i| Element::host("li").key(i).child(Child::text(i)))
        .collect();
    root.render(Element::host("ul").children(items));
    scheduler.set_yield_budget(Some(3));

    let mut slices = 0;
    while scheduler.run_next_task() {
        slices += 1;
    }
    assert!(slices > 1);
    assert_eq!(text(&root), "01234567");
    assert_eq!(root.commit_count(), 1);
}

#[test]
fn timed_out_task_finishes_without_yielding() {
    let (root, scheduler) = setup_with(RootOptions::new().default_lane(Lanes::DEFAULT));
    root.render(Element::host("p").child("late"));
    scheduler.set_yield_budget(Some(0));
    assert!(scheduler.run_next_task_timed_out());
    assert_eq!(text(&root), "late");
}

#[test]
fn disabled_time_slicing_never_yields() {
    let options = RootOptions::new()
        .default_lane(Lanes::TRANSITION)
        .time_slicing(false);
    let (root, scheduler) = setup_with(options);
    root.render(Element::host("p").child("whole"));
    scheduler.set_yield_budget(Some(0));
    assert!(scheduler.run_next_task());
    assert_eq!(text(&root), "whole");
}

#[test]
fn higher_priority_lane_replaces_the_scheduled_task() {
    let (root, scheduler) = setup();
    let slot: Slot<i64> = Rc::default();
    root.render(Element::component(&stateful(0, &slot)));
    scheduler.run_until_idle();
    let set = dispatcher(&slot);

    set.set_with_lane(Lanes::IDLE, 1).unwrap();
    assert_eq!(scheduler.pending_task_count(), 1);
    set.set_with_lane(Lanes::INPUT_CONTINUOUS, 2).unwrap();
    assert_eq!(scheduler.pending_task_count(), 1);
    assert!(scheduler.run_next_task());
    assert_eq!(text(&root), "2");
    assert_eq!(root.pending_lanes(), Lanes::IDLE);
    scheduler.run_until_idle();
    assert_eq!(text(&root), "2");
    assert!(root.pending_lanes().is_empty());
}

#[test]
fn failed_render_keeps_the_committed_tree_and_reports() {
    let (root, scheduler) = setup();
    root.render(Element::host("p").child("good"));
    scheduler.run_until_idle();

    let broken = Component::new("Broken", |_, _| Err(ReconcileError::render("boom")));
    root.render(Element::component(&broken));
    scheduler.run_until_idle();
    assert_eq!(
        root.take_error(),
        Some(ReconcileError::Component {
            component: Some("Broken"),
            message: "boom".to_owned(),
        })
    );
    assert_eq!(text(&root), "good");
    assert!(root.pending_lanes().is_empty());

    root.render(Element::host("p").child("recovered"));
    scheduler.run_until_idle();
    assert_eq!(text(&root), "recovered");
}

#[test]
fn flush_sync_returns_render_errors() {
    let (root, _scheduler) = setup();
    let broken = Component::new("Broken", |_, _| Err(ReconcileError::render("boom")));
    root.render(Element::component(&broken));
    assert!(matches!(
        root.flush_sync(),
        Err(ReconcileError::Component { .. })
    ));
}

#[test]
fn updates_taken_by_a_failed_render_are_replayed() {
    let (root, scheduler) = setup();
    let slot: Slot<i64> = Rc::default();
    // 0 renders normally, 1 fails, 2 skips the second hook.
    let mode = Rc::new(Cell::new(0u8));
    let flaky = {
        let slot = slot.clone();
        let mode = mode.clone();
        Component::new("Flaky", move |hooks, _| {
            let (value, set) = hooks.use_state(|| 0i64)?;
            *slot.borrow_mut() = Some(set);
            match mode.get() {
                1 => return Err(ReconcileError::render("boom")),
                2 => {}
                _ => {
                    hooks.use_ref(|| ())?;
                }
            }
            Ok(Child::text(value))
        })
    };
    root.render(Element::component(&flaky));
    scheduler.run_until_idle();
    let set = dispatcher(&slot);

    mode.set(1);
    set.update(|n| n + 5).unwrap();
    scheduler.run_until_idle();
    assert!(matches!(
        root.take_error(),
        Some(ReconcileError::Component { .. })
    ));
    assert_eq!(text(&root), "0");

    mode.set(2);
    set.update(|n| n * 10).unwrap();
    scheduler.run_until_idle();
    assert_eq!(
        root.take_error(),
        Some(ReconcileError::HookCountMismatch {
            component: "Flaky",
            previous: 2,
            current: 1,
        })
    );
    assert_eq!(text(&root), "0");

    mode.set(0);
    set.update(|n| n + 1).unwrap();
    scheduler.run_until_idle();
    assert_eq!(root.take_error(), None);
    assert_eq!(text(&root), "51");
    assert!(root.pending_lanes().is_empty());
}

#[test]
fn conditional_hook_is_reported() {
    let (root, scheduler) = setup();
    let flaky = Component::new("Flaky", |hooks, props| {
        if props.bool_attr("extra").unwrap_or(false) {
            hooks.use_ref(|| 0)?;
        }
        hooks.use_state(|| 0)?;
        Ok(Child::Empty)
    });
    root.render(Element::component(&flaky));
    scheduler.run_until_idle();
    root.render(Element::component(&flaky).prop("extra", true));
    scheduler.run_until_idle();
    assert_eq!(
        root.take_error(),
        Some(ReconcileError::HookKindMismatch {
            component: "Flaky",
            index: 0,
            expected: "ref",
            found: "state",
        })
    );
}

#[test]
fn effect_can_update_state_after_mount() {
    let (root, scheduler) = setup();
    let loader = Component::new("Loader", |hooks, _| {
        let (value, set) = hooks.use_state(|| String::from("loading"))?;
        hooks.use_effect(Some(Vec::new()), move || {
            set.set(String::from("ready")).unwrap();
            Teardown::none()
        })?;
        Ok(Child::text(value))
    });
    root.render(Element::component(&loader));
    scheduler.run_microtasks();
    assert_eq!(text(&root), "loading");
    scheduler.run_until_idle();
    assert_eq!(text(&root), "ready");
}

#[test]
fn pending_passive_effects_flush_before_the_next_render() {
    let (root, scheduler) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    let logger = {
        let log = log.clone();
        Component::new("Logger", move |hooks, _| {
            let log = log.clone();
            hooks.use_effect(None, move || {
                log.borrow_mut().push("effect");
                Teardown::none()
            })?;
            Ok(Child::Empty)
        })
    };
    root.render(Element::component(&logger));
    scheduler.run_microtasks();
    assert!(log.borrow().is_empty());

    root.render(Element::component(&logger));
    scheduler.run_microtasks();
    assert_eq!(*log.borrow(), ["effect"]);
    assert!(root.flush_passive_effects().unwrap());
    assert_eq!(*log.borrow(), ["effect", "effect"]);
}

#[test]
fn unmount_clears_the_container_and_runs_teardowns() {
    let (root, scheduler) = setup();
    let torn_down = Rc::new(Cell::new(false));
    let widget = {
        let torn_down = torn_down.clone();
        Component::new("Widget", move |hooks, _| {
            let torn_down = torn_down.clone();
            hooks.use_effect(Some(Vec::new()), move || {
                Teardown::new(move || torn_down.set(true))
            })?;
            Ok(Element::host("div").child("w").into())
        })
    };
    root.render(Element::component(&widget));
    scheduler.run_until_idle();
    let live = root.node_count();

    root.unmount();
    scheduler.run_until_idle();
    assert!(torn_down.get());
    assert_eq!(text(&root), "");
    assert!(root.with_host(|h| h.children_of(root.container()).is_empty()).unwrap());
    assert!(root.node_count() < live);
}

#[test]
fn run_with_priority_rejects_lane_sets() {
    let (root, _scheduler) = setup();
    assert_eq!(
        root.run_with_priority(Lanes::SYNC | Lanes::DEFAULT, || ()),
        Err(ReconcileError::UnknownLane { bits: 0b101 })
    );
}

#[test]
fn run_with_priority_assigns_the_lane_to_updates() {
    let (root, scheduler) = setup();
    root.run_with_priority(Lanes::TRANSITION, || root.render(Element::host("p")))
        .unwrap();
    assert_eq!(root.pending_lanes(), Lanes::TRANSITION);
    assert_eq!(scheduler.pending_microtask_count(), 0);
    scheduler.run_until_idle();
    assert_eq!(root.commit_count(), 1);
}

#[test]
fn dispatch_after_the_root_is_dropped_fails() {
    let (root, scheduler) = setup();
    let slot: Slot<i64> = Rc::default();
    root.render(Element::component(&stateful(0, &slot)));
    scheduler.run_until_idle();
    let set = dispatcher(&slot);
    drop(root);
    assert_eq!(set.set(1), Err(ReconcileError::RootUnavailable));
    scheduler.run_until_idle();
}
