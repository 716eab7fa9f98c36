//! Error types for the demo apps and their host.

use std::path::PathBuf;

use ripple_core::GraphError;
use thiserror::Error;

use crate::openai::CompletionError;
use crate::table::TableError;

#[derive(Debug, Error)]
pub enum DemoError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// The summarizer cannot start without a key.
    #[error("OpenAI API key is not configured; set OPENAI_API_KEY in the environment or a .env file")]
    MissingApiKey,

    #[error("invalid command `{line}`: {source}")]
    Command {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot read `{}`: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read commands: {0}")]
    Input(#[source] std::io::Error),

    #[error("cannot write output: {0}")]
    Write(#[from] std::io::Error),
}
