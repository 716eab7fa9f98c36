//! Error types for graph construction and evaluation.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while evaluating a single node.
///
/// An evaluation error never leaves a partial value behind: the node stays
/// dirty and the error surfaces to whoever triggered the evaluation.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// The node's own function failed.
    #[error("{0}")]
    Failed(String),

    /// The node read a dependency it did not declare.
    #[error("node `{node}` read undeclared dependency `{dependency}`")]
    StaleRead { node: String, dependency: String },

    /// A task node did not finish in time.
    #[error("node `{node}` timed out after {after:?}")]
    Timeout { node: String, after: Duration },

    /// A dependency value could not be encoded for fingerprinting.
    #[error("cannot fingerprint dependency values: {0}")]
    Fingerprint(String),

    /// A dependency failed, so this node could not be evaluated.
    #[error("dependency `{node}` failed: {source}")]
    Upstream {
        node: String,
        source: Box<EvalError>,
    },

    /// A value had a different concrete type than the reader asked for.
    #[error("node `{node}` holds {actual}, not {expected}")]
    TypeMismatch {
        node: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A node was read before it had ever produced a value.
    #[error("node `{0}` has no value yet")]
    Unavailable(String),
}

impl EvalError {
    /// Build a [`EvalError::Failed`] from a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Wrap any displayable error as a failure.
    pub fn from_display(error: impl std::fmt::Display) -> Self {
        Self::Failed(error.to_string())
    }

    /// The innermost error, following `Upstream` links.
    pub fn root_cause(&self) -> &EvalError {
        match self {
            Self::Upstream { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Errors raised by graph construction and the session API.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The declared edges contain a cycle. Construction aborts.
    #[error("dependency cycle among nodes: {}", nodes.join(", "))]
    Cycle { nodes: Vec<String> },

    #[error("node `{0}` is registered twice")]
    DuplicateNode(String),

    #[error("unknown node `{0}`")]
    UnknownNode(String),

    #[error("node `{node}` cannot depend on `{dependency}`: {reason}")]
    InvalidDependency {
        node: String,
        dependency: String,
        reason: &'static str,
    },

    /// The node exists but is the wrong kind for the operation.
    #[error("node `{node}` is not {expected}")]
    WrongKind { node: String, expected: &'static str },

    #[error("input `{node}` expects {expected}, got {actual}")]
    TypeMismatch {
        node: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("cannot decode value for input `{node}`: {source}")]
    Decode {
        node: String,
        #[source]
        source: serde_json::Error,
    },

    /// A node failed to evaluate.
    #[error("evaluation of `{node}` failed: {source}")]
    Evaluation {
        node: String,
        #[source]
        source: EvalError,
    },

    #[error("cannot start task runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GraphError {
    /// Name of the node the error is about, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::DuplicateNode(node) | Self::UnknownNode(node) => Some(node),
            Self::InvalidDependency { node, .. }
            | Self::WrongKind { node, .. }
            | Self::TypeMismatch { node, .. }
            | Self::Decode { node, .. }
            | Self::Evaluation { node, .. } => Some(node),
            Self::Cycle { .. } | Self::Runtime(_) | Self::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_follows_upstream_chain() {
        let err = EvalError::Upstream {
            node: "raw".into(),
            source: Box::new(EvalError::Upstream {
                node: "source".into(),
                source: Box::new(EvalError::failed("bad csv")),
            }),
        };
        assert!(matches!(err.root_cause(), EvalError::Failed(msg) if msg == "bad csv"));
        assert_eq!(
            err.to_string(),
            "dependency `raw` failed: dependency `source` failed: bad csv"
        );
    }

    #[test]
    fn cycle_message_lists_nodes() {
        let err = GraphError::Cycle {
            nodes: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle among nodes: a, b");
        assert_eq!(err.node(), None);
    }
}
