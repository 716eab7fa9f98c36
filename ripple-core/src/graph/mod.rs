//! Dependency Graph
//!
//! This module implements the computational dependency graph that tracks
//! relationships between inputs and the computations reading them.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent inputs, memos, outputs, tasks and downloads
//! - Edges represent dependencies: if A reads B, there is an edge from B to A
//!
//! When an input changes, we traverse the graph to find all affected nodes
//! and mark them as maybe dirty. Evaluation then decides, by comparing the
//! fingerprint of each node's dependency values, which of them actually
//! recompute.
//!
//! The graph definition is immutable once built and shared by every session.
//! We maintain both forward (dependencies) and reverse (dependents) edges
//! to enable efficient traversal in both directions.

mod builder;
mod node;
mod scheduler;

pub use builder::{Graph, GraphBuilder};
pub use node::{DirtyState, NodeId, NodeKind};
pub use scheduler::{Event, EventSender, EventValue, SchedulerState};

pub(crate) use builder::GraphInner;
pub(crate) use node::{Evaluator, NodeState};
pub(crate) use scheduler::{mark_changed, Scheduler};
