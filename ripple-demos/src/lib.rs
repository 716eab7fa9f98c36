//! Ripple Demos
//!
//! Three small reactive apps built on `ripple-core`, each exposed as a
//! [`Graph`](ripple_core::Graph) plus typed handles to its nodes:
//!
//! - `csv_dashboard`: upload or generate a CSV, filter it, chart it, export it
//! - `summarizer`: summarize markdown and extract keywords with a hosted model
//! - `viz`: histogram, filtered table and upload preview over a fixed dataset
//!
//! The `host` module drives any of them from a JSON-lines stream, which is
//! what the `ripple-demo` binary does over stdin and stdout.

pub mod csv_dashboard;
pub mod error;
pub mod host;
pub mod openai;
pub mod settings;
pub mod summarizer;
pub mod table;
pub mod viz;

use serde::{Deserialize, Serialize};

pub use error::DemoError;
pub use settings::Settings;
pub use table::{Column, ColumnData, Histogram, Stats, Table, TableError};

/// A file handed over by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// What an output shows: a prompt for missing input, or a value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum View<T> {
    Prompt { message: String },
    Ready { value: T },
}

impl<T> View<T> {
    pub fn prompt(message: impl Into<String>) -> Self {
        View::Prompt {
            message: message.into(),
        }
    }

    pub fn ready(value: T) -> Self {
        View::Ready { value }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            View::Ready { value } => Some(value),
            View::Prompt { .. } => None,
        }
    }

    pub fn is_prompt(&self) -> bool {
        matches!(self, View::Prompt { .. })
    }
}
