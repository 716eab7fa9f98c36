//! Markdown Summarizer
//!
//! Paste or upload a markdown note and get a short summary plus keywords
//! from a chat completion model.
//!
//! # How the Summary Is Cached
//!
//! The `summary` task depends only on `document`, so editing the text area
//! to something that resolves to the same document never calls the model
//! again. Asking for a fresh answer is an explicit invalidation of the task
//! (see [`Summarizer::rerun`]), which re-runs it against the same document.
//!
//! ```text
//! upload ─┬─ document ─┬─ summary (task) ─┬─ summary_text, keywords, save
//! text ───┘            └─ excerpt         │
//! ```

use std::sync::Arc;

use ripple_core::{
    ChunkStream, Download, EvalError, Event, Graph, GraphBuilder, Input, Memo, Output, Task,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DemoError;
use crate::openai::{ChatMessage, ChatRequest, CompletionClient, CompletionError, OpenAiClient, ResponseFormat};
use crate::settings::Settings;
use crate::{Upload, View};

/// Characters of the document shown by the excerpt.
pub const EXCERPT_CHARS: usize = 2000;

const PROMPT: &str = "Enter or upload markdown to see a summary";

pub const SYSTEM_PROMPT: &str = "You are a skilled editor.\n\
Summarize the markdown note the user sends in at most 300 characters and extract at most 10 key terms.\n\
Reply with JSON of the form {\"summary\": ..., \"keywords\": [...]}.";

pub const SAMPLE_MARKDOWN: &str = "\
# Release Notes 2.4

## Highlights
- Incremental rebuilds now skip unchanged modules
- The cache directory moved to `~/.cache/ripple`
- Startup is about 40% faster on large projects

## Breaking changes
| Area | Change |
| --- | --- |
| CLI | `--watch` is now the default |
| Config | `timeout` is given in milliseconds |

## Upgrading
Run `ripple migrate` once, then delete the old cache directory.
";

/// The text to summarize, if the user gave any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DocumentSource {
    NoInput,
    Available { text: String },
}

impl DocumentSource {
    pub fn text(&self) -> Option<&str> {
        match self {
            DocumentSource::Available { text } => Some(text),
            DocumentSource::NoInput => None,
        }
    }
}

/// The model's structured answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
    pub keywords: Vec<String>,
}

/// An uploaded file wins; otherwise the text area, unless it is blank.
pub fn resolve_document(upload: Option<&Upload>, text: &str) -> Result<DocumentSource, EvalError> {
    if let Some(file) = upload {
        let text = std::str::from_utf8(&file.bytes).map_err(|e| {
            EvalError::failed(format!("`{}` is not valid UTF-8: {e}", file.name))
        })?;
        return Ok(DocumentSource::Available {
            text: text.to_string(),
        });
    }
    if text.trim().is_empty() {
        return Ok(DocumentSource::NoInput);
    }
    Ok(DocumentSource::Available {
        text: text.to_string(),
    })
}

/// The first [`EXCERPT_CHARS`] characters, with ` …` when cut.
pub fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{} …", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn request_for(model: &str, text: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(text)],
        temperature: 0.3,
        response_format: Some(ResponseFormat::json_object()),
        max_tokens: Some(600),
    }
}

/// Ask the model and decode its answer. Missing content decodes as `{}`,
/// which is rejected for lacking both fields.
pub async fn summarize(
    client: &dyn CompletionClient,
    model: &str,
    text: &str,
) -> Result<SummaryResponse, CompletionError> {
    let content = client.complete(request_for(model, text)).await?;
    let content = content.as_deref().unwrap_or("{}");
    Ok(serde_json::from_str(content)?)
}

/// Handles to the summarizer's nodes.
#[derive(Debug, Clone)]
pub struct Summarizer {
    pub graph: Graph,
    pub upload: Input<Option<Upload>>,
    pub text: Input<String>,
    pub document: Memo<DocumentSource>,
    pub summary: Task<Option<SummaryResponse>>,
    pub excerpt: Output<View<String>>,
    pub summary_text: Output<View<String>>,
    pub keywords: Output<View<String>>,
    pub save: Download,
}

impl Summarizer {
    /// Build against the configured OpenAI endpoint. Fails without a key.
    pub fn new(settings: &Settings) -> Result<Self, DemoError> {
        let key = settings.api_key()?;
        let client = OpenAiClient::new(key, settings.openai_base_url.clone())?;
        Self::with_client(Arc::new(client), settings.model.clone())
    }

    pub fn with_client(
        client: Arc<dyn CompletionClient>,
        model: impl Into<String>,
    ) -> Result<Self, DemoError> {
        let model = model.into();
        let mut builder = GraphBuilder::new();

        let upload = builder.input("upload", None::<Upload>)?;
        let text = builder.input("text", SAMPLE_MARKDOWN.to_string())?;

        let document = builder.memo("document", &["upload", "text"], move |reads| {
            resolve_document(reads.get(upload)?.as_ref(), reads.get(text)?)
        })?;

        let summary = builder.task("summary", &["document"], move |reads| {
            let text = reads.get(document)?.text().map(str::to_string);
            let client = Arc::clone(&client);
            let model = model.clone();
            Ok(async move {
                let Some(text) = text else {
                    return Ok(None);
                };
                debug!(chars = text.chars().count(), %model, "summarizing document");
                summarize(client.as_ref(), &model, &text)
                    .await
                    .map(Some)
                    .map_err(EvalError::from_display)
            })
        })?;

        let excerpt = builder.output("excerpt", &["document"], move |reads| {
            Ok(match reads.get(document)?.text() {
                Some(text) => View::ready(self::excerpt(text)),
                None => View::prompt(PROMPT),
            })
        })?;

        let summary_text = builder.output("summary_text", &["summary"], move |reads| {
            Ok(match reads.get(summary)? {
                Some(response) => View::ready(response.summary.clone()),
                None => View::prompt(PROMPT),
            })
        })?;

        let keywords = builder.output("keywords", &["summary"], move |reads| {
            Ok(match reads.get(summary)? {
                Some(response) => View::ready(response.keywords.join(", ")),
                None => View::prompt(PROMPT),
            })
        })?;

        let save = builder.download(
            "save",
            "summary.txt",
            "text/plain",
            &["summary"],
            move |reads| match reads.get(summary)? {
                Some(response) => Ok(ChunkStream::from_bytes(response.summary.clone().into_bytes())),
                None => Err(EvalError::failed("nothing to download: no summary yet")),
            },
        )?;

        Ok(Self {
            graph: builder.build()?,
            upload,
            text,
            document,
            summary,
            excerpt,
            summary_text,
            keywords,
            save,
        })
    }

    /// Throw away the cached summary and ask the model again.
    pub fn rerun(&self) -> Event {
        Event::invalidate(self.graph.name(self.summary.id()))
    }
}
