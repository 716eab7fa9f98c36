//! Ripple Core
//!
//! This crate provides a session-scoped reactive recomputation graph. It
//! implements:
//!
//! - Input nodes: named values mutated by external events
//! - Memo nodes: cached derivations keyed by a fingerprint of their inputs
//! - Output nodes: memos that push their value to a render sink
//! - Task nodes: memos whose evaluation awaits a future under a timeout
//! - Download nodes: lazily produced, single-pass byte streams
//! - A sweep scheduler that serializes external events per session
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: node definitions, graph construction, dirty propagation
//! - `reactive`: typed handles, read contexts, render sinks, tasks, downloads
//! - `session`: per-user node state and the sweep loop
//! - `registry`: host-side map of isolated sessions
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{Event, GraphBuilder, NullSink, SessionConfig};
//!
//! let mut builder = GraphBuilder::new();
//! let count = builder.input("count", 1_i64)?;
//! let doubled = builder.memo("doubled", &["count"], move |reads| {
//!     Ok(reads.get(count)? * 2)
//! })?;
//! let graph = builder.build()?;
//!
//! let mut session = graph.session(SessionConfig::default(), NullSink)?;
//! assert_eq!(*session.get(doubled)?, 2);
//!
//! session.dispatch(Event::set("count", 21_i64));
//! assert_eq!(*session.get(doubled)?, 42);
//! # Ok::<(), ripple_core::GraphError>(())
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod registry;
pub mod session;
pub mod value;

pub use config::SessionConfig;
pub use error::{EvalError, GraphError};
pub use graph::{
    DirtyState, Event, EventSender, EventValue, Graph, GraphBuilder, NodeId, NodeKind,
    SchedulerState,
};
pub use reactive::{
    ChunkStream, Download, Frame, Input, Memo, NodeHandle, NullSink, Output, Reads, RecordingSink,
    RenderSink, Rendered, Task,
};
pub use registry::{SessionId, SessionRegistry};
pub use session::{Session, SweepReport};
pub use value::{Fingerprint, NodeValue};
