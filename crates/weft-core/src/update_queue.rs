//! Lane-tagged state transitions.
//!
//! Dispatchers push into a [`SharedQueue`] that both generations of a node
//! see. A render moves the pending updates behind the node's base queue and
//! replays the whole list from the base state, skipping updates outside the
//! render lanes. Everything from the first skipped update onwards stays in the
//! new base queue so a later pass at the skipped lane replays it in order.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::lanes::{Lane, Lanes, NO_LANES};

/// A single transition.
pub enum Action<S> {
    Replace(S),
    Transform(Rc<dyn Fn(&S) -> S>),
}

impl<S> Action<S> {
    pub fn transform(f: impl Fn(&S) -> S + 'static) -> Self {
        Action::Transform(Rc::new(f))
    }

    fn apply(&self, state: &S) -> S
    where
        S: Clone,
    {
        match self {
            Action::Replace(value) => value.clone(),
            Action::Transform(f) => f(state),
        }
    }
}

impl<S: Clone> Clone for Action<S> {
    fn clone(&self) -> Self {
        match self {
            Action::Replace(value) => Action::Replace(value.clone()),
            Action::Transform(f) => Action::Transform(f.clone()),
        }
    }
}

/// An action tagged with the lane it was requested at.
pub struct Update<S> {
    pub lane: Lane,
    pub action: Action<S>,
}

impl<S: Clone> Clone for Update<S> {
    fn clone(&self) -> Self {
        Self {
            lane: self.lane,
            action: self.action.clone(),
        }
    }
}

impl<S> fmt::Debug for Update<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.action {
            Action::Replace(_) => "replace",
            Action::Transform(_) => "transform",
        };
        write!(f, "Update({kind} @ {:?})", self.lane)
    }
}

/// Pending updates not yet seen by a render. Cheap to clone; clones share the
/// same list.
pub struct SharedQueue<S>(Rc<RefCell<Vec<Update<S>>>>);

impl<S> SharedQueue<S> {
    pub fn new() -> Self {
        SharedQueue(Rc::new(RefCell::new(Vec::new())))
    }

    pub fn enqueue(&self, update: Update<S>) {
        self.0.borrow_mut().push(update);
    }

    pub fn take_pending(&self) -> Vec<Update<S>> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub fn has_pending(&self) -> bool {
        !self.0.borrow().is_empty()
    }
}

impl<S> Default for SharedQueue<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for SharedQueue<S> {
    fn clone(&self) -> Self {
        SharedQueue(self.0.clone())
    }
}

/// Per-node queue: replay starting point plus the updates still to replay.
pub struct UpdateQueue<S> {
    pub base_state: S,
    pub base_queue: Vec<Update<S>>,
    pub shared: SharedQueue<S>,
}

impl<S: Clone> UpdateQueue<S> {
    pub fn new(initial: S) -> Self {
        Self {
            base_state: initial,
            base_queue: Vec::new(),
            shared: SharedQueue::new(),
        }
    }

    /// Moves pending updates behind the base queue and returns the merged
    /// list. The caller must store the merged list on the committed
    /// generation too, or a discarded render would lose the moved updates.
    pub fn merge_pending(&mut self) -> Option<Vec<Update<S>>> {
        let pending = self.shared.take_pending();
        if pending.is_empty() {
            return None;
        }
        self.base_queue.extend(pending);
        Some(self.base_queue.clone())
    }

    /// Replays the base queue at `render_lanes`, leaving the new base state
    /// and skipped updates in place. Returns the computed state.
    pub fn process(&mut self, render_lanes: Lanes) -> Processed<S> {
        let queue = std::mem::take(&mut self.base_queue);
        let processed = process_update_queue(self.base_state.clone(), queue, render_lanes);
        self.base_state = processed.base_state.clone();
        self.base_queue = processed.base_queue.clone();
        processed
    }
}

impl<S: Clone> Clone for UpdateQueue<S> {
    fn clone(&self) -> Self {
        Self {
            base_state: self.base_state.clone(),
            base_queue: self.base_queue.clone(),
            shared: self.shared.clone(),
        }
    }
}

/// Result of replaying a queue.
#[derive(Debug)]
pub struct Processed<S> {
    pub memoized: S,
    pub base_state: S,
    pub base_queue: Vec<Update<S>>,
    pub skipped_lanes: Lanes,
}

/// Applies `updates` in order on top of `base_state`.
///
/// Updates whose lane is outside `render_lanes` are skipped. The state just
/// before the first skip becomes the new base state, and every update from
/// that point on is kept; applied ones are kept with no lane so any later
/// pass reapplies them.
pub fn process_update_queue<S: Clone>(
    base_state: S,
    updates: Vec<Update<S>>,
    render_lanes: Lanes,
) -> Processed<S> {
    let mut state = base_state;
    let mut new_base_state: Option<S> = None;
    let mut new_base_queue: Vec<Update<S>> = Vec::new();
    let mut skipped_lanes = NO_LANES;

    for update in updates {
        if !render_lanes.contains(update.lane) {
            if new_base_state.is_none() {
                new_base_state = Some(state.clone());
            }
            skipped_lanes |= update.lane;
            new_base_queue.push(update);
            continue;
        }
        state = update.action.apply(&state);
        if new_base_state.is_some() {
            new_base_queue.push(Update {
                lane: NO_LANES,
                action: update.action,
            });
        }
    }

    Processed {
        base_state: new_base_state.unwrap_or_else(|| state.clone()),
        memoized: state,
        base_queue: new_base_queue,
        skipped_lanes,
    }
}
