use std::cell::RefCell;
use std::rc::Rc;

use log::info;
use weft_core::{
    Component, Dispatch, Element, Lanes, MemoryHost, PropValue, Root, RootOptions, Scheduler,
    Teardown,
};
use weft_runtime_std::StdScheduler;

type Items = Vec<(u32, String)>;

/// Keyed list whose order and contents are driven from outside.
fn todo_list(slot: Rc<RefCell<Option<Dispatch<Items>>>>) -> Component {
    Component::new("TodoList", move |hooks, _| {
        let (items, set_items) = hooks.use_state(|| {
            vec![
                (1, String::from("write parser")),
                (2, String::from("fix layout")),
                (3, String::from("ship it")),
            ]
        })?;
        *slot.borrow_mut() = Some(set_items);
        let count = items.len();
        hooks.use_effect(Some(vec![count.into()]), move || {
            info!("list now has {count} items");
            Teardown::none()
        })?;
        let rows: Vec<Element> = items
            .iter()
            .map(|(id, label)| Element::host("li").key(*id as usize).child(label.as_str()))
            .collect();
        Ok(Element::host("ul").children(rows).into())
    })
}

fn header() -> Component {
    Component::new("Header", |hooks, props| {
        let (clicks, set_clicks) = hooks.use_state(|| 0i64)?;
        let title = props.str_attr("title").unwrap_or("untitled").to_owned();
        let bump = move || {
            let _ = set_clicks.update(|n| n + 1);
        };
        Ok(Element::host("h1")
            .prop("onclick", PropValue::callback(bump))
            .child(format!("{title} ({clicks})"))
            .into())
    })
}

fn print_tree(label: &str, root: &Root<MemoryHost>) {
    let dump = root
        .with_host(|host| host.dump_tree(root.container()))
        .unwrap_or_default();
    println!("--- {label} ---");
    print!("{dump}");
}

fn main() {
    env_logger::init();

    println!("=== weft keyed list demo ===");
    println!("Renders a keyed list into an in-memory host, then reorders it,");
    println!("appends with a transition update and removes an item.");
    println!();

    let scheduler = Rc::new(StdScheduler::new());
    let mut host = MemoryHost::new();
    let container = host.create_container();
    let journal = host.journal();
    let root = Root::with_options(
        host,
        container,
        scheduler.clone() as Rc<dyn Scheduler>,
        RootOptions::new().label("demo"),
    );

    let slot = Rc::new(RefCell::new(None));
    let list = todo_list(slot.clone());
    let header = header();
    let app = Element::host("main").children(vec![
        Element::component(&header).prop("title", "Todo"),
        Element::component(&list),
    ]);

    root.render(app.clone());
    scheduler.run_until_idle();
    print_tree("mount", &root);

    let Some(set_items) = slot.borrow().clone() else {
        eprintln!("list did not render");
        return;
    };

    journal.clear();
    let _ = set_items.update(|items| items.iter().rev().cloned().collect());
    scheduler.run_until_idle();
    print_tree("reversed", &root);
    println!("host calls: {}", journal.take().len());

    let _ = set_items.update_with_lane(Lanes::TRANSITION, |items| {
        let mut next = items.clone();
        next.push((4, String::from("write docs")));
        next
    });
    scheduler.run_until_idle();
    print_tree("appended (transition)", &root);

    let _ = set_items.update(|items| items.iter().filter(|(id, _)| *id != 2).cloned().collect());
    scheduler.run_until_idle();
    print_tree("removed #2", &root);

    root.render(app);
    scheduler.run_until_idle();
    println!("re-render with identical description: {} host calls", journal.take().len());

    if let Some(err) = root.take_error() {
        eprintln!("render failed: {err}");
    }
    info!("{} commits", root.commit_count());
}
