//! Download nodes.
//!
//! A download is never cached. Each request brings its dependencies up to
//! date, then asks the node for a new [`ChunkStream`]. The stream is lazy:
//! chunks are produced as the consumer pulls them, and a stream can be
//! consumed once.

use std::fmt;

use crate::error::EvalError;
use crate::graph::NodeId;

/// Handle to a download node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Download {
    id: NodeId,
}

impl Download {
    pub(crate) fn new(id: NodeId) -> Self {
        Self { id }
    }

    /// The node's id within its graph.
    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl From<Download> for NodeId {
    fn from(handle: Download) -> Self {
        handle.id
    }
}

type Chunks = Box<dyn Iterator<Item = Result<Vec<u8>, EvalError>> + Send>;

/// A single-pass sequence of byte chunks with download metadata.
pub struct ChunkStream {
    filename: String,
    content_type: String,
    chunks: Chunks,
}

impl ChunkStream {
    /// Stream the chunks yielded by `chunks`.
    pub fn new<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Result<Vec<u8>, EvalError>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            filename: String::new(),
            content_type: String::new(),
            chunks: Box::new(chunks.into_iter()),
        }
    }

    /// A stream with one chunk. Empty input yields no chunks.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let chunk = (!bytes.is_empty()).then_some(Ok(bytes));
        Self::new(chunk)
    }

    pub(crate) fn with_meta(mut self, filename: &str, content_type: &str) -> Self {
        self.filename = filename.to_string();
        self.content_type = content_type.to_string();
        self
    }

    /// Suggested file name.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// MIME type of the content.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Drain the stream into one buffer, stopping at the first failed chunk.
    pub fn collect_bytes(self) -> Result<Vec<u8>, EvalError> {
        let mut out = Vec::new();
        for chunk in self {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}

impl Iterator for ChunkStream {
    type Item = Result<Vec<u8>, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks.next()
    }
}

impl fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkStream")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}
