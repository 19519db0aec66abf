use std::cell::RefCell;
use std::rc::Rc;

use weft_testing::prelude::*;

type Log = Rc<RefCell<Vec<String>>>;

fn tracked(label: &'static str, log: &Log) -> Component {
    let log = log.clone();
    Component::new(label, move |hooks, props| {
        let log = log.clone();
        hooks.use_effect(Some(Vec::new()), move || {
            log.borrow_mut().push(format!("{label} setup"));
            let log = log.clone();
            Teardown::new(move || log.borrow_mut().push(format!("{label} teardown")))
        })?;
        Ok(props.children().clone())
    })
}

#[test]
fn deleted_subtree_tears_down_before_new_effects_set_up() {
    let rule = ReconcileTestRule::new();
    let log: Log = Rc::default();
    let outer = tracked("outer", &log);
    let inner = tracked("inner", &log);
    let fresh = tracked("fresh", &log);

    rule.set_content(Element::host("div").children(vec![Element::component(&outer)
        .key("old")
        .child(Element::host("section").child(Element::component(&inner)))]))
        .unwrap();
    log.borrow_mut().clear();

    rule.set_content(
        Element::host("div").children(vec![Element::component(&fresh).key("new")]),
    )
    .unwrap();
    let log = log.borrow();
    let setup = log.iter().position(|entry| entry == "fresh setup").unwrap();
    assert!(log[..setup].contains(&"outer teardown".to_owned()));
    assert!(log[..setup].contains(&"inner teardown".to_owned()));
    assert_eq!(log.len(), 3);
}

#[test]
fn layout_teardown_of_a_removed_node_precedes_layout_setup_of_a_new_one() {
    let rule = ReconcileTestRule::new();
    let log: Log = Rc::default();
    let layout = |label: &'static str| {
        let log = log.clone();
        Component::new(label, move |hooks, _| {
            let log = log.clone();
            hooks.use_layout_effect(Some(Vec::new()), move || {
                log.borrow_mut().push(format!("{label} setup"));
                let log = log.clone();
                Teardown::new(move || log.borrow_mut().push(format!("{label} teardown")))
            })?;
            Ok(Child::Empty)
        })
    };
    let first = layout("first");
    let second = layout("second");
    rule.set_content(Element::component(&first).key("first")).unwrap();
    rule.set_content(Element::component(&second).key("second")).unwrap();
    assert_eq!(
        *log.borrow(),
        ["first setup", "first teardown", "second setup"]
    );
}

#[test]
fn ref_is_cleared_once_before_the_host_removal() {
    let rule = ReconcileTestRule::new();
    let calls = Rc::new(RefCell::new(Vec::new()));
    let object = RefObject::new();
    let callback = {
        let calls = calls.clone();
        let journal = rule.journal();
        ElementRef::callback(move |host| calls.borrow_mut().push((host, journal.len())))
    };

    rule.set_content(Element::host("form").children(vec![
        Element::host("input").key("cb").with_ref(callback.clone()),
        Element::host("input").key("obj").with_ref(object.clone()),
    ]))
    .unwrap();
    let cb_host = rule.host_of("cb").unwrap();
    assert_eq!(object.get(), rule.host_of("obj"));
    assert_eq!(calls.borrow().len(), 1);
    rule.clear_ops();

    rule.set_content(Element::host("form")).unwrap();
    let calls = calls.borrow();
    assert_eq!(calls.len(), 2);
    let (cleared, ops_before) = calls[1];
    assert_eq!(cleared, None);
    assert_eq!(object.get(), None);
    let removal = rule
        .ops()
        .iter()
        .position(|op| matches!(op, HostOp::Remove { child, .. } if *child == cb_host))
        .unwrap();
    assert!(ops_before <= removal);
}

#[test]
fn unmount_tears_down_every_effect() {
    let rule = ReconcileTestRule::new();
    let log: Log = Rc::default();
    let a = tracked("a", &log);
    let b = tracked("b", &log);
    rule.set_content(vec![Element::component(&a).key("a"), Element::component(&b).key("b")])
        .unwrap();
    log.borrow_mut().clear();

    rule.act(|| rule.root().unmount()).unwrap();
    let mut log = log.borrow().clone();
    log.sort();
    assert_eq!(log, ["a teardown", "b teardown"]);
    assert!(rule.top_level().is_empty());
}
