//! Update Scheduler
//!
//! The scheduler serializes external events and determines which nodes a
//! change affects. Each event drives one sweep:
//!
//! 1. Apply the mutation (set an input, invalidate a node, toggle an output)
//! 2. Mark every transitive dependent "maybe dirty" in one breadth-first pass
//! 3. Evaluate the visible outputs in topological order, skipping clean ones
//!    - "maybe dirty" nodes compare the fingerprint of their inputs first
//!    - "dirty" nodes recompute
//!
//! Events submitted while a sweep is running land in the queue and are
//! processed strictly after it. Sweeps are never cancelled.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::value::NodeValue;

use super::builder::GraphInner;
use super::node::{NodeId, NodeState};

/// Scheduler state. A session is either between sweeps or inside one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Evaluating,
}

/// The value carried by a [`Event::Set`].
#[derive(Debug)]
pub enum EventValue {
    /// A value of the input's own type.
    Typed(Box<dyn NodeValue>),
    /// A JSON document decoded into the input's type on arrival.
    Json(serde_json::Value),
}

/// An external event, as delivered by the hosting UI layer.
#[derive(Debug)]
pub enum Event {
    /// Overwrite an input.
    Set { input: String, value: EventValue },
    /// Force a node to recompute on the next evaluation.
    Invalidate { node: String },
    /// Show or hide an output. Hidden outputs are skipped by sweeps.
    SetVisible { output: String, visible: bool },
    /// Run a sweep without mutating anything.
    Refresh,
}

impl Event {
    /// Set an input to a typed value.
    pub fn set<T: NodeValue>(input: impl Into<String>, value: T) -> Self {
        Event::Set {
            input: input.into(),
            value: EventValue::Typed(Box::new(value)),
        }
    }

    /// Set an input from JSON.
    pub fn set_json(input: impl Into<String>, value: serde_json::Value) -> Self {
        Event::Set {
            input: input.into(),
            value: EventValue::Json(value),
        }
    }

    pub fn invalidate(node: impl Into<String>) -> Self {
        Event::Invalidate { node: node.into() }
    }

    pub fn show(output: impl Into<String>) -> Self {
        Event::SetVisible {
            output: output.into(),
            visible: true,
        }
    }

    pub fn hide(output: impl Into<String>) -> Self {
        Event::SetVisible {
            output: output.into(),
            visible: false,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Set { input, .. } => write!(f, "set {input}"),
            Event::Invalidate { node } => write!(f, "invalidate {node}"),
            Event::SetVisible { output, visible: true } => write!(f, "show {output}"),
            Event::SetVisible { output, visible: false } => write!(f, "hide {output}"),
            Event::Refresh => f.write_str("refresh"),
        }
    }
}

/// Handle for submitting events to a session's queue.
///
/// Cloneable and `Send`: render sinks, node functions and other threads may
/// hold one. Submitted events are applied by the session owner, in order,
/// after any sweep in progress.
#[derive(Clone, Default)]
pub struct EventSender {
    queue: Arc<Mutex<VecDeque<Event>>>,
}

impl EventSender {
    /// Queue an event.
    pub fn send(&self, event: Event) {
        self.queue.lock().push_back(event);
    }

    /// Number of queued events.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) fn pop(&self) -> Option<Event> {
        self.queue.lock().pop_front()
    }
}

impl fmt::Debug for EventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Sweep bookkeeping for one session.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    state: SchedulerState,
    sweeps: u64,
    events: EventSender,
}

impl Scheduler {
    pub(crate) fn state(&self) -> SchedulerState {
        self.state
    }

    pub(crate) fn sweeps(&self) -> u64 {
        self.sweeps
    }

    pub(crate) fn events(&self) -> &EventSender {
        &self.events
    }

    /// Enter a sweep. Returns the sweep number, or `None` if one is running.
    pub(crate) fn begin(&mut self) -> Option<u64> {
        match self.state {
            SchedulerState::Evaluating => None,
            SchedulerState::Idle => {
                self.state = SchedulerState::Evaluating;
                self.sweeps += 1;
                Some(self.sweeps)
            }
        }
    }

    pub(crate) fn finish(&mut self) {
        self.state = SchedulerState::Idle;
    }
}

/// Mark every transitive dependent of `source` as maybe dirty.
///
/// Single breadth-first pass over the dependent edges. Returns the marked
/// nodes in visit order.
pub(crate) fn mark_changed(
    graph: &GraphInner,
    states: &mut [NodeState],
    source: NodeId,
) -> Vec<NodeId> {
    let mut marked = Vec::new();
    let mut visited = vec![false; states.len()];
    let mut queue: VecDeque<NodeId> = graph.def(source).dependents.iter().copied().collect();

    while let Some(node_id) = queue.pop_front() {
        if visited[node_id.index()] {
            continue;
        }
        visited[node_id.index()] = true;

        states[node_id.index()].mark_maybe_dirty();
        marked.push(node_id);

        queue.extend(graph.def(node_id).dependents.iter().copied());
    }

    marked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use crate::graph::{DirtyState, GraphBuilder};
    use crate::reactive::Reads;

    fn constant(_: &Reads<'_>) -> Result<i32, EvalError> {
        Ok(0)
    }

    #[test]
    fn mark_changed_propagates_transitively() {
        // Create a chain: source -> derived1 -> derived2, plus an unrelated memo
        let mut builder = GraphBuilder::new();
        builder.input("source", 0).unwrap();
        builder.input("other", 0).unwrap();
        builder.memo("derived1", &["source"], constant).unwrap();
        builder.memo("derived2", &["derived1"], constant).unwrap();
        builder.memo("unrelated", &["other"], constant).unwrap();
        let graph = builder.build().unwrap();
        let inner = &graph.inner;

        let mut states: Vec<NodeState> = inner
            .nodes
            .iter()
            .map(|_| {
                let mut state = NodeState::computed();
                state.mark_clean();
                state
            })
            .collect();

        let source = graph.node_id("source").unwrap();
        let marked = mark_changed(inner, &mut states, source);

        let derived1 = graph.node_id("derived1").unwrap();
        let derived2 = graph.node_id("derived2").unwrap();
        assert_eq!(marked, vec![derived1, derived2]);
        assert_eq!(states[derived1.index()].dirty_state(), DirtyState::MaybeDirty);
        assert_eq!(states[derived2.index()].dirty_state(), DirtyState::MaybeDirty);

        let unrelated = graph.node_id("unrelated").unwrap();
        assert!(states[unrelated.index()].is_clean());
        assert!(states[source.index()].is_clean());
    }

    #[test]
    fn diamond_is_visited_once() {
        let mut builder = GraphBuilder::new();
        builder.input("a", 0).unwrap();
        builder.memo("b", &["a"], constant).unwrap();
        builder.memo("c", &["a"], constant).unwrap();
        builder.memo("d", &["b", "c"], constant).unwrap();
        let graph = builder.build().unwrap();

        let mut states: Vec<NodeState> =
            graph.inner.nodes.iter().map(|_| NodeState::computed()).collect();
        let marked = mark_changed(&graph.inner, &mut states, graph.node_id("a").unwrap());
        assert_eq!(marked.len(), 3);
    }

    #[test]
    fn scheduler_refuses_nested_sweeps() {
        let mut scheduler = Scheduler::default();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.begin(), Some(1));
        assert_eq!(scheduler.state(), SchedulerState::Evaluating);
        assert_eq!(scheduler.begin(), None);
        scheduler.finish();
        assert_eq!(scheduler.begin(), Some(2));
        assert_eq!(scheduler.sweeps(), 2);
    }

    #[test]
    fn sender_queues_in_order() {
        let sender = EventSender::default();
        sender.send(Event::set("bins", 25_u32));
        sender.send(Event::Refresh);
        assert_eq!(sender.pending(), 2);
        assert_eq!(sender.pop().unwrap().to_string(), "set bins");
        assert_eq!(sender.pop().unwrap().to_string(), "refresh");
        assert!(sender.pop().is_none());
    }
}
