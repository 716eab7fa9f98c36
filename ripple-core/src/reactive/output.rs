//! Output nodes and render sinks.
//!
//! An output is rendered exactly when it recomputes. A cache hit after a
//! "maybe dirty" check renders nothing, and a failed evaluation reports the
//! error instead of a value.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::EvalError;
use crate::value::{downcast, NodeValue};

use super::typed_handle;

typed_handle! {
    /// Handle to an output node holding a `T`.
    Output
}

/// A freshly computed output value, borrowed for the duration of a render.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    node: &'a str,
    value: &'a dyn NodeValue,
}

impl<'a> Frame<'a> {
    pub(crate) fn new(node: &'a str, value: &'a dyn NodeValue) -> Self {
        Self { node, value }
    }

    /// Name of the output.
    pub fn node(&self) -> &'a str {
        self.node
    }

    pub fn value(&self) -> &'a dyn NodeValue {
        self.value
    }

    /// The value as its concrete type.
    pub fn downcast<T: 'static>(&self) -> Result<&'a T, EvalError> {
        downcast(self.node, self.value)
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.value.to_json()
    }
}

/// Receives output renders from a session.
///
/// Called synchronously from inside a sweep. Implementations must not call
/// back into the session; they may queue events through an
/// [`EventSender`](crate::EventSender).
pub trait RenderSink: Send {
    /// An output recomputed.
    fn render(&mut self, frame: Frame<'_>);

    /// An output failed to evaluate.
    fn render_error(&mut self, _node: &str, _error: &EvalError) {}

    /// A task node started (`true`) or finished (`false`) awaiting its future.
    fn busy(&mut self, _node: &str, _busy: bool) {}
}

/// Discards every render.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn render(&mut self, _frame: Frame<'_>) {}
}

/// One entry in a [`RecordingSink`] log.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Value {
        node: String,
        value: serde_json::Value,
    },
    Error {
        node: String,
        message: String,
    },
    Busy {
        node: String,
        busy: bool,
    },
}

impl Rendered {
    pub fn node(&self) -> &str {
        match self {
            Rendered::Value { node, .. }
            | Rendered::Error { node, .. }
            | Rendered::Busy { node, .. } => node,
        }
    }
}

/// Records everything it receives. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<Rendered>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the log.
    pub fn entries(&self) -> Vec<Rendered> {
        self.log.lock().clone()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<Rendered> {
        std::mem::take(&mut *self.log.lock())
    }

    /// Number of value renders of `node`.
    pub fn renders(&self, node: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|entry| matches!(entry, Rendered::Value { node: n, .. } if n == node))
            .count()
    }

    /// Number of error renders of `node`.
    pub fn errors(&self, node: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|entry| matches!(entry, Rendered::Error { node: n, .. } if n == node))
            .count()
    }

    /// The most recent value rendered for `node`.
    pub fn last_value(&self, node: &str) -> Option<serde_json::Value> {
        self.log.lock().iter().rev().find_map(|entry| match entry {
            Rendered::Value { node: n, value } if n == node => Some(value.clone()),
            _ => None,
        })
    }
}

impl RenderSink for RecordingSink {
    fn render(&mut self, frame: Frame<'_>) {
        self.log.lock().push(Rendered::Value {
            node: frame.node().to_string(),
            value: frame.to_json(),
        });
    }

    fn render_error(&mut self, node: &str, error: &EvalError) {
        self.log.lock().push(Rendered::Error {
            node: node.to_string(),
            message: error.to_string(),
        });
    }

    fn busy(&mut self, node: &str, busy: bool) {
        self.log.lock().push(Rendered::Busy {
            node: node.to_string(),
            busy,
        });
    }
}
