//! Node Values
//!
//! Every value stored in the graph is type-erased behind [`NodeValue`] so a
//! single session arena can hold inputs and derivations of different types.
//! The trait provides what the graph needs from a value:
//!
//! - deep equality, so setting an input to its current value is a no-op
//! - a stable byte encoding, so dependency values can be fingerprinted
//! - a JSON projection, so render sinks can forward values to a host
//!
//! Any `Clone + PartialEq + Serialize + Debug + Send + Sync + 'static` type
//! implements it through the blanket impl below.

use std::any::Any;
use std::fmt::{self, Debug};

use serde::Serialize;

use crate::error::EvalError;
use crate::graph::NodeId;

/// A type-erased value held by a graph node.
pub trait NodeValue: Any + Debug + Send + Sync {
    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Deep equality against another erased value.
    ///
    /// Values of different concrete types are never equal.
    fn dyn_eq(&self, other: &dyn NodeValue) -> bool;

    /// Clone into a new box.
    fn clone_value(&self) -> Box<dyn NodeValue>;

    /// MessagePack encoding used for fingerprinting.
    fn encode(&self) -> Result<Vec<u8>, rmp_serde::encode::Error>;

    /// JSON projection for hosts. Unrepresentable values become `null`.
    fn to_json(&self) -> serde_json::Value;

    /// Name of the concrete type, for error messages.
    fn type_name(&self) -> &'static str;
}

impl<T> NodeValue for T
where
    T: Clone + PartialEq + Serialize + Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn NodeValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn clone_value(&self) -> Box<dyn NodeValue> {
        Box::new(self.clone())
    }

    fn encode(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Downcast an erased value, naming the node in the error.
pub(crate) fn downcast<'a, T: 'static>(
    node: &str,
    value: &'a dyn NodeValue,
) -> Result<&'a T, EvalError> {
    value
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| EvalError::TypeMismatch {
            node: node.to_string(),
            expected: std::any::type_name::<T>(),
            actual: value.type_name(),
        })
}

/// Digest of the dependency values a node was last evaluated against.
///
/// Computed as BLAKE3 over, for each declared dependency in order, the
/// dependency id, the encoded length and the MessagePack encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint a sequence of `(dependency, value)` pairs.
    pub fn of<'a, I>(values: I) -> Result<Self, EvalError>
    where
        I: IntoIterator<Item = (NodeId, &'a dyn NodeValue)>,
    {
        let mut hasher = blake3::Hasher::new();
        for (id, value) in values {
            let bytes = value
                .encode()
                .map_err(|e| EvalError::Fingerprint(e.to_string()))?;
            hasher.update(&id.raw().to_le_bytes());
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }
        Ok(Self(*hasher.finalize().as_bytes()))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint(")?;
        for byte in &self.0[..6] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}
