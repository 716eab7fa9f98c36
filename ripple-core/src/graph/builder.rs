//! Graph Construction
//!
//! Nodes are registered by name together with the names of the nodes they
//! read. Names may refer to nodes registered later, so dependencies are only
//! resolved in [`GraphBuilder::build`], which also checks that the edge set
//! is acyclic. A graph that fails to build is never evaluated.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use smallvec::SmallVec;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::{EvalError, GraphError};
use crate::reactive::{ChunkStream, Download, Input, Memo, Output, Reads, RenderSink, Task};
use crate::session::Session;
use crate::value::NodeValue;

use super::node::{DecodeFn, DownloadFn, Evaluator, FnCompute, FnTask, NodeDef, NodeId, NodeKind};

/// A node registered but not yet resolved.
struct PendingNode {
    name: String,
    kind: NodeKind,
    dependencies: Vec<String>,
    volatile: bool,
    evaluator: Evaluator,
}

/// Collects node registrations and validates them into a [`Graph`].
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<PendingNode>,
    names: IndexMap<String, NodeId>,
}

impl GraphBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an input node with its initial value.
    pub fn input<T>(&mut self, name: impl Into<String>, initial: T) -> Result<Input<T>, GraphError>
    where
        T: NodeValue + Clone + DeserializeOwned,
    {
        let decode: Arc<DecodeFn> = Arc::new(|json: serde_json::Value| {
            serde_json::from_value::<T>(json).map(|value| Box::new(value) as Box<dyn NodeValue>)
        });
        let id = self.register(
            name.into(),
            NodeKind::Input,
            &[],
            false,
            Evaluator::Input {
                initial: Box::new(initial),
                decode,
            },
        )?;
        Ok(Input::new(id))
    }

    /// Register a memo: a cached pure function of its declared dependencies.
    pub fn memo<T, F>(
        &mut self,
        name: impl Into<String>,
        dependencies: &[&str],
        compute: F,
    ) -> Result<Memo<T>, GraphError>
    where
        T: NodeValue,
        F: Fn(&Reads<'_>) -> Result<T, EvalError> + Send + Sync + 'static,
    {
        let id = self.register(
            name.into(),
            NodeKind::Derived,
            dependencies,
            false,
            Evaluator::Compute(Arc::new(FnCompute::new(compute))),
        )?;
        Ok(Memo::new(id))
    }

    /// Register a memo that is non-deterministic or side-effecting.
    ///
    /// It is never served from cache: every sweep re-evaluates it once, and
    /// its dependents are re-checked against the fresh value.
    pub fn volatile_memo<T, F>(
        &mut self,
        name: impl Into<String>,
        dependencies: &[&str],
        compute: F,
    ) -> Result<Memo<T>, GraphError>
    where
        T: NodeValue,
        F: Fn(&Reads<'_>) -> Result<T, EvalError> + Send + Sync + 'static,
    {
        let id = self.register(
            name.into(),
            NodeKind::Derived,
            dependencies,
            true,
            Evaluator::Compute(Arc::new(FnCompute::new(compute))),
        )?;
        Ok(Memo::new(id))
    }

    /// Register an output: a memo whose every recomputation is rendered.
    pub fn output<T, F>(
        &mut self,
        name: impl Into<String>,
        dependencies: &[&str],
        compute: F,
    ) -> Result<Output<T>, GraphError>
    where
        T: NodeValue,
        F: Fn(&Reads<'_>) -> Result<T, EvalError> + Send + Sync + 'static,
    {
        let id = self.register(
            name.into(),
            NodeKind::Output,
            dependencies,
            false,
            Evaluator::Compute(Arc::new(FnCompute::new(compute))),
        )?;
        Ok(Output::new(id))
    }

    /// Register a task: a memo whose value comes from a future.
    ///
    /// `start` reads the dependencies synchronously and returns a `'static`
    /// future, which the session drives to completion inside the sweep.
    pub fn task<T, F, Fut>(
        &mut self,
        name: impl Into<String>,
        dependencies: &[&str],
        start: F,
    ) -> Result<Task<T>, GraphError>
    where
        T: NodeValue,
        F: Fn(&Reads<'_>) -> Result<Fut, EvalError> + Send + Sync + 'static,
        Fut: Future<Output = Result<T, EvalError>> + Send + 'static,
    {
        let id = self.register(
            name.into(),
            NodeKind::Task,
            dependencies,
            false,
            Evaluator::Task(Arc::new(FnTask::new(start))),
        )?;
        Ok(Task::new(id))
    }

    /// Register a download: a fresh single-pass byte stream per request.
    pub fn download<F>(
        &mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        dependencies: &[&str],
        produce: F,
    ) -> Result<Download, GraphError>
    where
        F: Fn(&Reads<'_>) -> Result<ChunkStream, EvalError> + Send + Sync + 'static,
    {
        let produce: Arc<DownloadFn> = Arc::new(produce);
        let id = self.register(
            name.into(),
            NodeKind::Download,
            dependencies,
            false,
            Evaluator::Download {
                filename: filename.into(),
                content_type: content_type.into(),
                produce,
            },
        )?;
        Ok(Download::new(id))
    }

    fn register(
        &mut self,
        name: String,
        kind: NodeKind,
        dependencies: &[&str],
        volatile: bool,
        evaluator: Evaluator,
    ) -> Result<NodeId, GraphError> {
        if self.names.contains_key(&name) {
            return Err(GraphError::DuplicateNode(name));
        }
        let id = NodeId::from(self.nodes.len() as u32);
        self.names.insert(name.clone(), id);
        self.nodes.push(PendingNode {
            name,
            kind,
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            volatile,
            evaluator,
        });
        Ok(id)
    }

    /// Resolve dependencies, check acyclicity and produce the graph.
    pub fn build(self) -> Result<Graph, GraphError> {
        let GraphBuilder { nodes, names } = self;

        let mut defs = Vec::with_capacity(nodes.len());
        for (index, pending) in nodes.into_iter().enumerate() {
            let mut dependencies: SmallVec<[NodeId; 4]> = SmallVec::new();
            for dep_name in &pending.dependencies {
                let dep = *names
                    .get(dep_name)
                    .ok_or_else(|| GraphError::UnknownNode(dep_name.clone()))?;
                if !dependencies.contains(&dep) {
                    dependencies.push(dep);
                }
            }
            defs.push(NodeDef {
                id: NodeId::from(index as u32),
                name: pending.name,
                kind: pending.kind,
                dependencies,
                dependents: SmallVec::new(),
                volatile: pending.volatile,
                evaluator: pending.evaluator,
            });
        }

        // Reject edges into leaf kinds once every kind is known.
        for def in &defs {
            for dep in &def.dependencies {
                let target = &defs[dep.index()];
                if !target.kind.is_readable() {
                    return Err(GraphError::InvalidDependency {
                        node: def.name.clone(),
                        dependency: target.name.clone(),
                        reason: match target.kind {
                            NodeKind::Output => "outputs are leaves",
                            _ => "downloads are leaves",
                        },
                    });
                }
            }
        }

        // Reverse edges
        for index in 0..defs.len() {
            let id = defs[index].id;
            let dependencies = defs[index].dependencies.clone();
            for dep in dependencies {
                defs[dep.index()].dependents.push(id);
            }
        }

        let order = topological_order(&defs)?;
        let outputs = order
            .iter()
            .copied()
            .filter(|id| defs[id.index()].kind == NodeKind::Output)
            .collect();
        let volatile = defs.iter().filter(|d| d.volatile).map(|d| d.id).collect();

        debug!(nodes = defs.len(), "graph built");

        Ok(Graph {
            inner: Arc::new(GraphInner {
                nodes: defs,
                names,
                order,
                outputs,
                volatile,
            }),
        })
    }
}

/// Order all nodes so that dependencies come before dependents.
///
/// Kahn's algorithm. Nodes left over have an in-degree that never reaches
/// zero; those still left after repeatedly discarding the ones no leftover
/// node depends on are the nodes on cycles.
fn topological_order(nodes: &[NodeDef]) -> Result<Vec<NodeId>, GraphError> {
    let mut in_degree: Vec<usize> = nodes.iter().map(|n| n.dependencies.len()).collect();
    let mut queue: VecDeque<NodeId> = nodes
        .iter()
        .filter(|n| n.dependencies.is_empty())
        .map(|n| n.id)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(id) = queue.pop_front() {
        order.push(id);
        for dependent in &nodes[id.index()].dependents {
            let degree = &mut in_degree[dependent.index()];
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(*dependent);
            }
        }
    }

    if order.len() == nodes.len() {
        return Ok(order);
    }

    let mut remaining: Vec<bool> = in_degree.iter().map(|d| *d > 0).collect();
    loop {
        let mut pruned = false;
        for node in nodes {
            if remaining[node.id.index()]
                && !node.dependents.iter().any(|d| remaining[d.index()])
            {
                remaining[node.id.index()] = false;
                pruned = true;
            }
        }
        if !pruned {
            break;
        }
    }

    Err(GraphError::Cycle {
        nodes: nodes
            .iter()
            .filter(|n| remaining[n.id.index()])
            .map(|n| n.name.clone())
            .collect(),
    })
}

/// The resolved node set shared by sessions.
#[derive(Debug)]
pub(crate) struct GraphInner {
    pub(crate) nodes: Vec<NodeDef>,
    pub(crate) names: IndexMap<String, NodeId>,
    /// Every node, dependencies first.
    pub(crate) order: Vec<NodeId>,
    /// Output nodes in topological order.
    pub(crate) outputs: Vec<NodeId>,
    pub(crate) volatile: Vec<NodeId>,
}

impl GraphInner {
    pub(crate) fn def(&self, id: NodeId) -> &NodeDef {
        &self.nodes[id.index()]
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<&NodeDef, GraphError> {
        self.names
            .get(name)
            .map(|id| self.def(*id))
            .ok_or_else(|| GraphError::UnknownNode(name.to_string()))
    }
}

/// A validated, acyclic graph definition.
///
/// Cheap to clone. Each [`Session`] built from it owns its own node state.
#[derive(Debug, Clone)]
pub struct Graph {
    pub(crate) inner: Arc<GraphInner>,
}

impl Graph {
    /// Start a new session over this graph.
    pub fn session<S>(&self, config: SessionConfig, sink: S) -> Result<Session, GraphError>
    where
        S: RenderSink + 'static,
    {
        Session::new(self.clone(), config, Box::new(sink))
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.inner.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.inner.nodes.is_empty()
    }

    /// Look up a node by name.
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.inner.names.get(name).copied()
    }

    /// Name of a node.
    pub fn name(&self, id: NodeId) -> &str {
        &self.inner.def(id).name
    }

    /// Kind of a node.
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.inner.def(id).kind
    }

    /// Declared dependencies of a node.
    pub fn dependencies(&self, id: NodeId) -> &[NodeId] {
        &self.inner.def(id).dependencies
    }

    /// Nodes that declare a dependency on `id`.
    pub fn dependents(&self, id: NodeId) -> &[NodeId] {
        &self.inner.def(id).dependents
    }

    /// All nodes, dependencies before dependents.
    pub fn topological_order(&self) -> &[NodeId] {
        &self.inner.order
    }

    /// Output nodes, in the order sweeps evaluate them.
    pub fn outputs(&self) -> &[NodeId] {
        &self.inner.outputs
    }

    /// Node names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.names.keys().map(String::as_str)
    }

    pub(crate) fn has_tasks(&self) -> bool {
        self.inner.nodes.iter().any(|n| n.kind == NodeKind::Task)
    }
}
