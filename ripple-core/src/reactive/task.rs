//! Task nodes.
//!
//! A task is a memo whose function starts a future, typically a network
//! call. The session drives the future on its own current-thread runtime,
//! so the sweep is suspended until it resolves or the configured timeout
//! expires. A timed-out task stays dirty and caches nothing.

use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::error::EvalError;
use crate::value::NodeValue;

use super::typed_handle;

typed_handle! {
    /// Handle to a task node holding a `T`.
    Task
}

/// Executes task futures for one session.
#[derive(Debug)]
pub(crate) struct TaskRunner {
    runtime: tokio::runtime::Runtime,
}

impl TaskRunner {
    pub(crate) fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { runtime })
    }

    /// Block on `future`, failing with a timeout error after `timeout`.
    ///
    /// Must not be called from within another tokio runtime.
    pub(crate) fn run(
        &self,
        node: &str,
        timeout: Option<Duration>,
        future: BoxFuture<'static, Result<Box<dyn NodeValue>, EvalError>>,
    ) -> Result<Box<dyn NodeValue>, EvalError> {
        match timeout {
            None => self.runtime.block_on(future),
            Some(after) => self
                .runtime
                .block_on(async move { tokio::time::timeout(after, future).await })
                .unwrap_or_else(|_elapsed| {
                    Err(EvalError::Timeout {
                        node: node.to_string(),
                        after,
                    })
                }),
        }
    }
}
