//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph:
//! the immutable [`NodeDef`] shared by every session built from a graph,
//! and the per-session [`NodeState`] holding the cached value.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use smallvec::SmallVec;

use crate::error::EvalError;
use crate::reactive::{ChunkStream, Reads};
use crate::value::{Fingerprint, NodeValue};

/// Identifier for a node: its registration index within the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// An input node. These are the roots of the graph.
    /// They have no dependencies and change only through external events.
    Input,

    /// A derived node (memo). Cached against its dependency fingerprint.
    Derived,

    /// An output node. A memo whose recomputation is pushed to the render sink.
    /// Outputs are leaves: nothing may depend on them.
    Output,

    /// A memo whose evaluation awaits a future.
    Task,

    /// A producer of single-pass byte streams. Never cached; a leaf.
    Download,
}

impl NodeKind {
    /// Whether other nodes may declare a dependency on this kind.
    pub fn is_readable(&self) -> bool {
        matches!(self, NodeKind::Input | NodeKind::Derived | NodeKind::Task)
    }

    /// Whether this kind caches a value in the session.
    pub fn is_cached(&self) -> bool {
        !matches!(self, NodeKind::Download)
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            NodeKind::Input => "an input",
            NodeKind::Derived => "a memo",
            NodeKind::Output => "an output",
            NodeKind::Task => "a task",
            NodeKind::Download => "a download",
        }
    }
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// The node might need to recompute. One of its dependencies changed,
    /// but we have not yet verified if the actual input values are different.
    MaybeDirty,

    /// The node definitely needs to recompute: it was never evaluated, was
    /// invalidated, or its last evaluation failed.
    Dirty,
}

/// A node function producing an erased value.
pub(crate) trait Compute: Send + Sync {
    fn compute(&self, reads: &Reads<'_>) -> Result<Box<dyn NodeValue>, EvalError>;
}

/// A node function starting a future that produces an erased value.
pub(crate) trait StartTask: Send + Sync {
    fn start(
        &self,
        reads: &Reads<'_>,
    ) -> Result<BoxFuture<'static, Result<Box<dyn NodeValue>, EvalError>>, EvalError>;
}

/// Adapts a typed closure to [`Compute`].
pub(crate) struct FnCompute<F, T> {
    f: F,
    _value: PhantomData<fn() -> T>,
}

impl<F, T> FnCompute<F, T> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _value: PhantomData,
        }
    }
}

impl<F, T> Compute for FnCompute<F, T>
where
    T: NodeValue,
    F: Fn(&Reads<'_>) -> Result<T, EvalError> + Send + Sync,
{
    fn compute(&self, reads: &Reads<'_>) -> Result<Box<dyn NodeValue>, EvalError> {
        (self.f)(reads).map(|value| Box::new(value) as Box<dyn NodeValue>)
    }
}

/// Adapts a typed future-returning closure to [`StartTask`].
pub(crate) struct FnTask<F, T, Fut> {
    f: F,
    _value: PhantomData<fn() -> (T, Fut)>,
}

impl<F, T, Fut> FnTask<F, T, Fut> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _value: PhantomData,
        }
    }
}

impl<F, T, Fut> StartTask for FnTask<F, T, Fut>
where
    T: NodeValue,
    F: Fn(&Reads<'_>) -> Result<Fut, EvalError> + Send + Sync,
    Fut: Future<Output = Result<T, EvalError>> + Send + 'static,
{
    fn start(
        &self,
        reads: &Reads<'_>,
    ) -> Result<BoxFuture<'static, Result<Box<dyn NodeValue>, EvalError>>, EvalError> {
        let future = (self.f)(reads)?;
        Ok(future
            .map(|result| result.map(|value| Box::new(value) as Box<dyn NodeValue>))
            .boxed())
    }
}

pub(crate) type DownloadFn = dyn Fn(&Reads<'_>) -> Result<ChunkStream, EvalError> + Send + Sync;

pub(crate) type DecodeFn =
    dyn Fn(serde_json::Value) -> Result<Box<dyn NodeValue>, serde_json::Error> + Send + Sync;

/// How a node produces its value.
pub(crate) enum Evaluator {
    Input {
        initial: Box<dyn NodeValue>,
        decode: Arc<DecodeFn>,
    },
    Compute(Arc<dyn Compute>),
    Task(Arc<dyn StartTask>),
    Download {
        filename: String,
        content_type: String,
        produce: Arc<DownloadFn>,
    },
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluator::Input { initial, .. } => {
                f.debug_struct("Input").field("initial", initial).finish()
            }
            Evaluator::Compute(_) => f.write_str("Compute"),
            Evaluator::Task(_) => f.write_str("Task"),
            Evaluator::Download { filename, .. } => {
                f.debug_struct("Download").field("filename", filename).finish()
            }
        }
    }
}

/// A node definition, resolved and validated by the graph builder.
#[derive(Debug)]
pub(crate) struct NodeDef {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) kind: NodeKind,

    /// Nodes that this node reads from, in declaration order.
    pub(crate) dependencies: SmallVec<[NodeId; 4]>,

    /// Nodes that read from this node.
    pub(crate) dependents: SmallVec<[NodeId; 4]>,

    /// Re-evaluated once per sweep regardless of its dependencies.
    pub(crate) volatile: bool,

    pub(crate) evaluator: Evaluator,
}

impl NodeDef {
    pub(crate) fn declares(&self, dependency: NodeId) -> bool {
        self.dependencies.contains(&dependency)
    }
}

/// Per-session state of one node.
#[derive(Debug)]
pub(crate) struct NodeState {
    dirty: DirtyState,
    value: Option<Box<dyn NodeValue>>,
    fingerprint: Option<Fingerprint>,
    evaluations: u64,
}

impl NodeState {
    /// State for an input holding its initial value.
    pub(crate) fn input(value: Box<dyn NodeValue>) -> Self {
        Self {
            dirty: DirtyState::Clean,
            value: Some(value),
            fingerprint: None,
            evaluations: 0,
        }
    }

    /// State for a computed node. Starts dirty to ensure first computation.
    pub(crate) fn computed() -> Self {
        Self {
            dirty: DirtyState::Dirty,
            value: None,
            fingerprint: None,
            evaluations: 0,
        }
    }

    pub(crate) fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Mark the node as maybe dirty (a dependency might have changed).
    pub(crate) fn mark_maybe_dirty(&mut self) {
        if self.dirty == DirtyState::Clean {
            self.dirty = DirtyState::MaybeDirty;
        }
    }

    /// Mark the node as definitely dirty (needs recomputation).
    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    pub(crate) fn value(&self) -> Option<&dyn NodeValue> {
        self.value.as_deref()
    }

    pub(crate) fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }

    pub(crate) fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Replace an input's value.
    pub(crate) fn replace(&mut self, value: Box<dyn NodeValue>) {
        self.value = Some(value);
    }

    /// Store a freshly computed value and the fingerprint it was computed against.
    pub(crate) fn store(&mut self, value: Box<dyn NodeValue>, fingerprint: Fingerprint) {
        self.value = Some(value);
        self.fingerprint = Some(fingerprint);
        self.evaluations += 1;
        self.dirty = DirtyState::Clean;
    }
}
