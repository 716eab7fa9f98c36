//! Read Context
//!
//! Node functions receive a [`Reads`] scoped to the node being evaluated.
//! By the time a function runs, every declared dependency has been brought
//! up to date, so reads never trigger evaluation themselves.

use crate::error::EvalError;
use crate::graph::{GraphInner, NodeId, NodeState};
use crate::value::downcast;

use super::NodeHandle;

/// Dependency values visible to one node evaluation.
pub struct Reads<'a> {
    graph: &'a GraphInner,
    states: &'a [NodeState],
    node: NodeId,
    strict: bool,
}

impl<'a> Reads<'a> {
    pub(crate) fn new(
        graph: &'a GraphInner,
        states: &'a [NodeState],
        node: NodeId,
        strict: bool,
    ) -> Self {
        Self {
            graph,
            states,
            node,
            strict,
        }
    }

    /// Name of the node being evaluated.
    pub fn node(&self) -> &'a str {
        &self.graph.def(self.node).name
    }

    /// Read a dependency through its handle.
    pub fn get<H: NodeHandle>(&self, handle: H) -> Result<&'a H::Value, EvalError> {
        self.read(handle.id())
    }

    /// Read a dependency by name.
    pub fn named<T: 'static>(&self, name: &str) -> Result<&'a T, EvalError> {
        match self.graph.names.get(name) {
            Some(id) => self.read(*id),
            None => Err(EvalError::StaleRead {
                node: self.node().to_string(),
                dependency: name.to_string(),
            }),
        }
    }

    fn read<T: 'static>(&self, id: NodeId) -> Result<&'a T, EvalError> {
        let dependency = self.graph.def(id);
        if self.strict && !self.graph.def(self.node).declares(id) {
            return Err(EvalError::StaleRead {
                node: self.node().to_string(),
                dependency: dependency.name.clone(),
            });
        }
        let value = self.states[id.index()]
            .value()
            .ok_or_else(|| EvalError::Unavailable(dependency.name.clone()))?;
        downcast(&dependency.name, value)
    }
}

impl std::fmt::Debug for Reads<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reads")
            .field("node", &self.node())
            .field("strict", &self.strict)
            .finish()
    }
}
