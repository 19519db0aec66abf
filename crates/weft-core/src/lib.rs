#![doc = r"Incremental reconciliation of a described UI tree against a host tree, with lane-based scheduling."]

mod begin_work;
mod child_reconciler;
pub mod collections;
mod commit;
mod complete_work;
pub mod element;
pub mod error;
pub mod flags;
pub mod hooks;
pub mod host;
pub mod lanes;
pub mod platform;
pub mod root;
pub mod runtime;
mod sync_queue;
pub mod update_queue;
mod work_loop;
pub mod work_node;

pub use element::{
    Child, Component, Context, Element, ElementKind, ElementRef, Key, PropValue, Props, RefObject,
};
pub use error::ReconcileError;
pub use hooks::{Dispatch, Hooks, Teardown};
pub use host::{Host, HostId, HostJournal, HostOp, MemoryHost};
pub use lanes::{next_lanes, Lane, Lanes, NO_LANES};
pub use platform::{Scheduler, SchedulerPriority, TaskCallback, TaskHandle, TaskStatus};
pub use root::{create_root, Root, RootOptions};
pub use runtime::ManualScheduler;
pub use update_queue::{process_update_queue, Action, Processed, Update};
pub use work_node::{NodeSnapshot, WorkId};
