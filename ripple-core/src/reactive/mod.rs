//! Reactive Primitives
//!
//! This module holds the typed surface of the graph: handles returned by
//! the builder, the read context node functions receive, the render sink
//! outputs push to, and the runtime pieces for tasks and downloads.
//!
//! # Concepts
//!
//! ## Inputs
//!
//! An input is a named value owned by the session and changed only by
//! external events. Setting it to an equal value does nothing.
//!
//! ## Memos
//!
//! A memo is a derived value that caches its result together with a
//! fingerprint of the dependency values it was computed from. It
//! re-evaluates only when that fingerprint changes.
//!
//! ## Outputs
//!
//! An output is a memo whose recomputation is pushed to a [`RenderSink`].
//! A cache hit renders nothing.
//!
//! ## Tasks and downloads
//!
//! A task is a memo whose function returns a future; the session awaits it
//! inside the sweep. A download produces a fresh [`ChunkStream`] per request.

mod context;
mod download;
mod input;
mod memo;
mod output;
mod task;

pub use context::Reads;
pub use download::{ChunkStream, Download};
pub use input::Input;
pub use memo::Memo;
pub use output::{Frame, NullSink, Output, RecordingSink, RenderSink, Rendered};
pub use task::Task;

pub(crate) use task::TaskRunner;

use crate::graph::NodeId;

/// A typed reference to a readable or cached node.
pub trait NodeHandle: Copy {
    /// The type of value the node holds.
    type Value: 'static;

    /// The node's id within its graph.
    fn id(&self) -> NodeId;
}

/// Declares a `Copy` handle type for nodes holding a `T`.
macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name<T> {
            id: $crate::graph::NodeId,
            _value: ::std::marker::PhantomData<fn() -> T>,
        }

        impl<T> $name<T> {
            pub(crate) fn new(id: $crate::graph::NodeId) -> Self {
                Self {
                    id,
                    _value: ::std::marker::PhantomData,
                }
            }

            /// The node's id within its graph.
            pub fn id(&self) -> $crate::graph::NodeId {
                self.id
            }
        }

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $name<T> {}

        impl<T> ::std::fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.id).finish()
            }
        }

        impl<T: 'static> $crate::reactive::NodeHandle for $name<T> {
            type Value = T;

            fn id(&self) -> $crate::graph::NodeId {
                self.id
            }
        }

        impl<T> From<$name<T>> for $crate::graph::NodeId {
            fn from(handle: $name<T>) -> Self {
                handle.id
            }
        }
    };
}

pub(crate) use typed_handle;
