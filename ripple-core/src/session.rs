//! Sessions
//!
//! A [`Session`] is one user's view of a [`Graph`]: it owns the cached value
//! and dirty state of every node, the visibility of every output, the event
//! queue and the render sink. Sessions built from the same graph share
//! nothing mutable.
//!
//! # How a Sweep Works
//!
//! 1. Pop one event and apply it. Setting an input replaces its value and
//!    marks every transitive dependent "maybe dirty"; an unchanged value
//!    marks nothing.
//!
//! 2. Mark volatile memos dirty and their dependents "maybe dirty".
//!
//! 3. Walk the visible outputs in topological order. Each non-clean output
//!    pulls its dependencies first, then fingerprints their values:
//!    - "maybe dirty" with a matching fingerprint: keep the cache, go clean
//!    - otherwise: recompute, store, and (for outputs) render
//!
//! 4. Return a [`SweepReport`] with what ran and what failed.
//!
//! Failures are contained. A failed node stays dirty and keeps no new value;
//! its dependents report an upstream error; unrelated outputs still render.
//! An output that rendered an error stays dirty until it renders again.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, debug_span, info, info_span, trace, warn};

use crate::config::SessionConfig;
use crate::error::{EvalError, GraphError};
use crate::graph::{
    mark_changed, DirtyState, Evaluator, Event, EventSender, EventValue, Graph, NodeId, NodeKind,
    NodeState, Scheduler, SchedulerState,
};
use crate::reactive::{
    ChunkStream, Download, Frame, Input, NodeHandle, Reads, RenderSink, TaskRunner,
};
use crate::value::{downcast, Fingerprint, NodeValue};

/// The outcome of one sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Sweep number within the session, starting at 1.
    pub sweep: u64,
    /// The event that caused the sweep.
    pub cause: String,
    /// Nodes marked by the event and by volatile refresh.
    pub marked: usize,
    /// Nodes whose functions ran, in evaluation order.
    pub recomputed: Vec<String>,
    /// Outputs rendered, in evaluation order.
    pub rendered: Vec<String>,
    /// The event's own error, if rejected, followed by evaluation errors.
    pub errors: Vec<GraphError>,
}

impl SweepReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Default)]
struct Trail {
    recomputed: Vec<NodeId>,
    rendered: Vec<NodeId>,
    /// Nodes that failed earlier in this sweep are not retried.
    failed: Vec<(NodeId, EvalError)>,
}

/// Per-user evaluation state over a shared [`Graph`].
pub struct Session {
    graph: Graph,
    config: SessionConfig,
    states: Vec<NodeState>,
    visible: Vec<bool>,
    scheduler: Scheduler,
    sink: Box<dyn RenderSink>,
    tasks: Option<TaskRunner>,
}

impl Session {
    pub(crate) fn new(
        graph: Graph,
        config: SessionConfig,
        sink: Box<dyn RenderSink>,
    ) -> Result<Self, GraphError> {
        let states: Vec<NodeState> = graph
            .inner
            .nodes
            .iter()
            .map(|def| match &def.evaluator {
                Evaluator::Input { initial, .. } => NodeState::input(initial.clone_value()),
                _ => NodeState::computed(),
            })
            .collect();
        let tasks = if graph.has_tasks() {
            Some(TaskRunner::new()?)
        } else {
            None
        };
        debug!(nodes = states.len(), tasks = tasks.is_some(), "session created");

        Ok(Self {
            visible: vec![true; states.len()],
            states,
            graph,
            config,
            scheduler: Scheduler::default(),
            sink,
            tasks,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// A sender for this session's event queue.
    pub fn events(&self) -> EventSender {
        self.scheduler.events().clone()
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Number of sweeps run so far.
    pub fn sweeps(&self) -> u64 {
        self.scheduler.sweeps()
    }

    pub fn dirty_state(&self, node: impl Into<NodeId>) -> DirtyState {
        self.states[node.into().index()].dirty_state()
    }

    /// Whether the node is anything other than clean.
    pub fn is_dirty(&self, node: impl Into<NodeId>) -> bool {
        !self.states[node.into().index()].is_clean()
    }

    /// How many times the node's function has completed successfully.
    pub fn evaluations(&self, node: impl Into<NodeId>) -> u64 {
        self.states[node.into().index()].evaluations()
    }

    pub fn is_visible(&self, output: impl Into<NodeId>) -> bool {
        self.visible[output.into().index()]
    }

    /// The cached value, without evaluating. May be stale if the node is
    /// not clean.
    pub fn peek<H: NodeHandle>(&self, handle: H) -> Option<&H::Value> {
        self.states[handle.id().index()]
            .value()
            .and_then(|value| value.as_any().downcast_ref())
    }

    /// Bring a node up to date and return its value.
    ///
    /// Reading an output that recomputes renders it.
    pub fn get<H: NodeHandle>(&mut self, handle: H) -> Result<&H::Value, GraphError> {
        let id = handle.id();
        let graph = Arc::clone(&self.graph.inner);
        let def = graph.def(id);
        let mut trail = Trail::default();
        self.ensure(id, &mut trail)
            .map_err(|source| GraphError::Evaluation {
                node: def.name.clone(),
                source,
            })?;
        self.states[id.index()]
            .value()
            .ok_or_else(|| EvalError::Unavailable(def.name.clone()))
            .and_then(|value| downcast(&def.name, value))
            .map_err(|source| GraphError::Evaluation {
                node: def.name.clone(),
                source,
            })
    }

    /// Bring a node up to date and return its JSON projection.
    pub fn get_json(&mut self, name: &str) -> Result<serde_json::Value, GraphError> {
        let graph = Arc::clone(&self.graph.inner);
        let def = graph.lookup(name)?;
        if !def.kind.is_cached() {
            return Err(GraphError::WrongKind {
                node: def.name.clone(),
                expected: "a cached node",
            });
        }
        let mut trail = Trail::default();
        self.ensure(def.id, &mut trail)
            .map_err(|source| GraphError::Evaluation {
                node: def.name.clone(),
                source,
            })?;
        Ok(self.states[def.id.index()]
            .value()
            .map(|value| value.to_json())
            .unwrap_or(serde_json::Value::Null))
    }

    /// Set an input directly, outside a sweep.
    ///
    /// Returns whether the value changed. Dependents are marked but nothing
    /// is evaluated until the next read or sweep.
    pub fn set<T: NodeValue>(&mut self, input: Input<T>, value: T) -> Result<bool, GraphError> {
        Ok(self.apply_set(input.id(), Box::new(value))?.is_some())
    }

    /// Set an input by name from JSON, outside a sweep.
    pub fn set_json(&mut self, name: &str, json: serde_json::Value) -> Result<bool, GraphError> {
        let id = self.graph.inner.lookup(name)?.id;
        let value = self.decode(id, json)?;
        Ok(self.apply_set(id, value)?.is_some())
    }

    /// Force a computed node to recompute when next evaluated.
    pub fn invalidate(&mut self, name: &str) -> Result<usize, GraphError> {
        let graph = Arc::clone(&self.graph.inner);
        let def = graph.lookup(name)?;
        if !matches!(
            def.kind,
            NodeKind::Derived | NodeKind::Output | NodeKind::Task
        ) {
            return Err(GraphError::WrongKind {
                node: def.name.clone(),
                expected: "a computed node",
            });
        }
        self.states[def.id.index()].mark_dirty();
        let marked = mark_changed(&graph, &mut self.states, def.id);
        debug!(node = %def.name, marked = marked.len(), "invalidated");
        Ok(marked.len() + 1)
    }

    /// Show or hide an output. Hidden outputs keep their dirty state and
    /// are brought up to date when shown again.
    pub fn set_visible(&mut self, name: &str, visible: bool) -> Result<(), GraphError> {
        let def = self.graph.inner.lookup(name)?;
        if def.kind != NodeKind::Output {
            return Err(GraphError::WrongKind {
                node: def.name.clone(),
                expected: NodeKind::Output.label(),
            });
        }
        self.visible[def.id.index()] = visible;
        Ok(())
    }

    /// Queue an event and drain the queue.
    pub fn dispatch(&mut self, event: Event) -> Vec<SweepReport> {
        self.scheduler.events().send(event);
        self.run_pending()
    }

    /// Run one sweep per queued event, up to the configured drain limit.
    pub fn run_pending(&mut self) -> Vec<SweepReport> {
        let mut reports = Vec::new();
        while reports.len() < self.config.max_events_per_drain {
            let Some(event) = self.scheduler.events().pop() else {
                break;
            };
            let Some(sweep) = self.scheduler.begin() else {
                // Re-entered from inside a sweep; leave the event for later.
                self.scheduler.events().send(event);
                break;
            };
            let report = self.sweep(sweep, event);
            self.scheduler.finish();
            reports.push(report);
        }
        reports
    }

    /// Produce a fresh stream from a download node.
    pub fn download(&mut self, handle: Download) -> Result<ChunkStream, GraphError> {
        self.download_node(handle.id())
    }

    /// Produce a fresh stream from a download node, by name.
    pub fn download_named(&mut self, name: &str) -> Result<ChunkStream, GraphError> {
        let id = self.graph.inner.lookup(name)?.id;
        self.download_node(id)
    }

    fn download_node(&mut self, id: NodeId) -> Result<ChunkStream, GraphError> {
        let graph = Arc::clone(&self.graph.inner);
        let def = graph.def(id);
        let Evaluator::Download {
            filename,
            content_type,
            produce,
        } = &def.evaluator
        else {
            return Err(GraphError::WrongKind {
                node: def.name.clone(),
                expected: NodeKind::Download.label(),
            });
        };

        let mut trail = Trail::default();
        for &dep in &def.dependencies {
            self.ensure(dep, &mut trail)
                .map_err(|source| GraphError::Evaluation {
                    node: def.name.clone(),
                    source: EvalError::Upstream {
                        node: graph.def(dep).name.clone(),
                        source: Box::new(source),
                    },
                })?;
        }

        let reads = Reads::new(&graph, &self.states, id, self.config.strict_reads);
        let stream = produce(&reads).map_err(|source| GraphError::Evaluation {
            node: def.name.clone(),
            source,
        })?;
        debug!(node = %def.name, %filename, "download started");
        Ok(stream.with_meta(filename, content_type))
    }

    fn sweep(&mut self, sweep: u64, event: Event) -> SweepReport {
        let span = info_span!("sweep", sweep, cause = %event);
        let _enter = span.enter();

        let mut report = SweepReport {
            sweep,
            cause: event.to_string(),
            ..SweepReport::default()
        };
        match self.apply(event) {
            Ok(marked) => report.marked = marked,
            Err(error) => {
                warn!(%error, "event rejected");
                report.errors.push(error);
            }
        }

        let graph = Arc::clone(&self.graph.inner);
        for &id in &graph.volatile {
            self.states[id.index()].mark_dirty();
            report.marked += mark_changed(&graph, &mut self.states, id).len() + 1;
        }

        let mut trail = Trail::default();
        for &output in &graph.outputs {
            if !self.visible[output.index()] || self.states[output.index()].is_clean() {
                continue;
            }
            if let Err(source) = self.ensure(output, &mut trail) {
                report.errors.push(GraphError::Evaluation {
                    node: graph.def(output).name.clone(),
                    source,
                });
            }
        }

        let names = |ids: &[NodeId]| -> Vec<String> {
            ids.iter().map(|id| graph.def(*id).name.clone()).collect()
        };
        report.recomputed = names(&trail.recomputed);
        report.rendered = names(&trail.rendered);

        info!(
            marked = report.marked,
            recomputed = report.recomputed.len(),
            rendered = report.rendered.len(),
            errors = report.errors.len(),
            "sweep complete"
        );
        report
    }

    /// Apply an event's mutation. Returns the number of nodes it marked.
    fn apply(&mut self, event: Event) -> Result<usize, GraphError> {
        match event {
            Event::Set { input, value } => {
                let id = self.graph.inner.lookup(&input)?.id;
                let value = match value {
                    EventValue::Typed(value) => value,
                    EventValue::Json(json) => self.decode(id, json)?,
                };
                Ok(self.apply_set(id, value)?.unwrap_or(0))
            }
            Event::Invalidate { node } => self.invalidate(&node),
            Event::SetVisible { output, visible } => {
                self.set_visible(&output, visible)?;
                Ok(0)
            }
            Event::Refresh => Ok(0),
        }
    }

    fn decode(&self, id: NodeId, json: serde_json::Value) -> Result<Box<dyn NodeValue>, GraphError> {
        let def = self.graph.inner.def(id);
        match &def.evaluator {
            Evaluator::Input { decode, .. } => decode(json).map_err(|source| GraphError::Decode {
                node: def.name.clone(),
                source,
            }),
            _ => Err(GraphError::WrongKind {
                node: def.name.clone(),
                expected: NodeKind::Input.label(),
            }),
        }
    }

    /// Replace an input's value. `None` means the value was unchanged.
    fn apply_set(
        &mut self,
        id: NodeId,
        value: Box<dyn NodeValue>,
    ) -> Result<Option<usize>, GraphError> {
        let graph = Arc::clone(&self.graph.inner);
        let def = graph.def(id);
        if def.kind != NodeKind::Input {
            return Err(GraphError::WrongKind {
                node: def.name.clone(),
                expected: NodeKind::Input.label(),
            });
        }

        let state = &mut self.states[id.index()];
        if let Some(current) = state.value() {
            if std::any::Any::type_id(current.as_any()) != std::any::Any::type_id(value.as_any()) {
                return Err(GraphError::TypeMismatch {
                    node: def.name.clone(),
                    expected: current.type_name(),
                    actual: value.type_name(),
                });
            }
            if current.dyn_eq(value.as_ref()) {
                trace!(input = %def.name, "value unchanged");
                return Ok(None);
            }
        }
        state.replace(value);

        let marked = mark_changed(&graph, &mut self.states, id);
        debug!(input = %def.name, marked = marked.len(), "input changed");
        Ok(Some(marked.len()))
    }

    /// Bring `id` up to date. Failures leave the node dirty and are
    /// rendered if the node is an output.
    fn ensure(&mut self, id: NodeId, trail: &mut Trail) -> Result<(), EvalError> {
        if let Some((_, error)) = trail.failed.iter().find(|(failed, _)| *failed == id) {
            return Err(error.clone());
        }
        let result = self.evaluate(id, trail);
        if let Err(error) = &result {
            trail.failed.push((id, error.clone()));
            let graph = Arc::clone(&self.graph.inner);
            let def = graph.def(id);
            match error {
                EvalError::Upstream { .. } => debug!(node = %def.name, %error, "upstream failed"),
                _ => {
                    self.states[id.index()].mark_dirty();
                    warn!(node = %def.name, %error, "evaluation failed");
                }
            }
            if def.kind == NodeKind::Output {
                // A shown error is only replaced by a fresh render.
                self.states[id.index()].mark_dirty();
                self.sink.render_error(&def.name, error);
            }
        }
        result
    }

    fn evaluate(&mut self, id: NodeId, trail: &mut Trail) -> Result<(), EvalError> {
        let graph = Arc::clone(&self.graph.inner);
        let def = graph.def(id);
        let mut dirty = self.states[id.index()].dirty_state();
        // Volatile nodes run on every pull, at most once per sweep.
        if def.volatile && dirty == DirtyState::Clean && !trail.recomputed.contains(&id) {
            dirty = DirtyState::Dirty;
        }
        if dirty == DirtyState::Clean || !def.kind.is_cached() || def.kind == NodeKind::Input {
            return Ok(());
        }

        let span = debug_span!("evaluate", node = %def.name);
        let _enter = span.enter();

        for &dep in &def.dependencies {
            self.ensure(dep, trail).map_err(|source| EvalError::Upstream {
                node: graph.def(dep).name.clone(),
                source: Box::new(source),
            })?;
        }

        let mut values = Vec::with_capacity(def.dependencies.len());
        for &dep in &def.dependencies {
            let value = self.states[dep.index()]
                .value()
                .ok_or_else(|| EvalError::Unavailable(graph.def(dep).name.clone()))?;
            values.push((dep, value));
        }
        let fingerprint = Fingerprint::of(values)?;

        let state = &self.states[id.index()];
        if dirty == DirtyState::MaybeDirty
            && !def.volatile
            && state.value().is_some()
            && state.fingerprint() == Some(fingerprint)
        {
            trace!("dependencies unchanged, keeping cached value");
            self.states[id.index()].mark_clean();
            return Ok(());
        }

        let reads = Reads::new(&graph, &self.states, id, self.config.strict_reads);
        let value = match &def.evaluator {
            Evaluator::Compute(compute) => compute.compute(&reads)?,
            Evaluator::Task(task) => {
                let future = task.start(&reads)?;
                let runner = self
                    .tasks
                    .as_ref()
                    .ok_or_else(|| EvalError::failed("no task runtime"))?;
                self.sink.busy(&def.name, true);
                let result = runner.run(&def.name, self.config.task_timeout(), future);
                self.sink.busy(&def.name, false);
                result?
            }
            Evaluator::Input { .. } | Evaluator::Download { .. } => return Ok(()),
        };

        debug!(evaluations = self.states[id.index()].evaluations() + 1, "recomputed");
        self.states[id.index()].store(value, fingerprint);
        trail.recomputed.push(id);
        if def.volatile && self.scheduler.state() == SchedulerState::Idle {
            mark_changed(&graph, &mut self.states, id);
        }

        if def.kind == NodeKind::Output {
            if let Some(value) = self.states[id.index()].value() {
                self.sink.render(Frame::new(&def.name, value));
                trail.rendered.push(id);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("nodes", &self.states.len())
            .field("state", &self.scheduler.state())
            .field("sweeps", &self.scheduler.sweeps())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
