//! JSON-lines host.
//!
//! Drives one demo session from a line-oriented command stream and writes
//! everything the session shows as one JSON object per line.
//!
//! # Commands
//!
//! ```text
//! {"set": "<input>", "value": <json>}
//! {"upload": "<input>", "path": "<file>"}
//! {"invalidate": "<node>"}
//! {"show": "<output>"}    {"hide": "<output>"}
//! {"download": "<node>"}
//! ```
//!
//! # Output Lines
//!
//! ```text
//! {"render": "<output>", "value": <json>}
//! {"error": "<node>", "message": "..."}
//! {"busy": "<task>", "state": true|false}
//! {"download": "<node>", "filename": "...", "content_type": "...", "content": "..."}
//! {"rejected": "<command>", "message": "..."}
//! {"sweep": n, "cause": "...", "recomputed": [...], "rendered": [...]}
//! ```

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use ripple_core::{
    EvalError, Event, Frame, Graph, GraphError, RenderSink, Session, SessionConfig, SweepReport,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::csv_dashboard::CsvDashboard;
use crate::error::DemoError;
use crate::settings::Settings;
use crate::summarizer::Summarizer;
use crate::viz::Viz;
use crate::Upload;

/// Which demo to host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DemoKind {
    Csv,
    Summarize,
    Viz,
}

impl DemoKind {
    pub fn build(self, settings: &Settings) -> Result<Graph, DemoError> {
        Ok(match self {
            DemoKind::Csv => CsvDashboard::build()?.graph,
            DemoKind::Summarize => Summarizer::new(settings)?.graph,
            DemoKind::Viz => Viz::build()?.graph,
        })
    }
}

/// One line of input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Command {
    Set { set: String, value: Value },
    Upload { upload: String, path: PathBuf },
    Invalidate { invalidate: String },
    Show { show: String },
    Hide { hide: String },
    Download { download: String },
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, DemoError> {
        serde_json::from_str(line).map_err(|source| DemoError::Command {
            line: line.to_string(),
            source,
        })
    }
}

/// A JSON-lines writer. Clones share the underlying writer.
#[derive(Clone)]
pub struct JsonLines {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl JsonLines {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    pub fn emit(&self, line: &Value) -> std::io::Result<()> {
        let mut out = self.out.lock();
        serde_json::to_writer(&mut *out, line)?;
        out.write_all(b"\n")?;
        out.flush()
    }

    fn emit_or_warn(&self, line: &Value) {
        if let Err(error) = self.emit(line) {
            warn!(%error, "cannot write frame");
        }
    }
}

impl std::fmt::Debug for JsonLines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLines").finish_non_exhaustive()
    }
}

impl RenderSink for JsonLines {
    fn render(&mut self, frame: Frame<'_>) {
        self.emit_or_warn(&json!({ "render": frame.node(), "value": frame.to_json() }));
    }

    fn render_error(&mut self, node: &str, error: &EvalError) {
        self.emit_or_warn(&json!({ "error": node, "message": error.to_string() }));
    }

    fn busy(&mut self, node: &str, busy: bool) {
        self.emit_or_warn(&json!({ "busy": node, "state": busy }));
    }
}

/// A session wired to a JSON-lines writer.
pub struct Host {
    session: Session,
    out: JsonLines,
}

impl Host {
    pub fn new(graph: &Graph, config: SessionConfig, out: JsonLines) -> Result<Self, DemoError> {
        let session = graph.session(config, out.clone())?;
        Ok(Self { session, out })
    }

    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Render every visible output once.
    pub fn start(&mut self) -> Result<(), DemoError> {
        let reports = self.session.dispatch(Event::Refresh);
        self.report(&reports)
    }

    /// Handle lines until the input ends. Bad commands, including lines
    /// that are not UTF-8, are answered with a `rejected` line; only I/O
    /// failures stop the loop.
    pub fn run(&mut self, input: impl BufRead) -> Result<(), DemoError> {
        for line in input.lines() {
            let line = match line {
                Ok(line) => line,
                Err(error) if error.kind() == io::ErrorKind::InvalidData => {
                    self.reject("", &error.to_string())?;
                    continue;
                }
                Err(error) => return Err(DemoError::Input(error)),
            };
            match self.handle_line(&line) {
                Ok(()) => {}
                Err(DemoError::Write(error)) => return Err(DemoError::Write(error)),
                Err(error) => self.reject(line.trim(), &error.to_string())?,
            }
        }
        Ok(())
    }

    pub fn handle_line(&mut self, line: &str) -> Result<(), DemoError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let event = match Command::parse(line)? {
            Command::Set { set, value } => Event::set_json(set, value),
            Command::Upload { upload, path } => Event::set(upload, Some(read_upload(&path)?)),
            Command::Invalidate { invalidate } => Event::invalidate(invalidate),
            Command::Show { show } => Event::show(show),
            Command::Hide { hide } => Event::hide(hide),
            Command::Download { download } => return self.download(&download),
        };
        debug!(%event, "dispatching");
        let reports = self.session.dispatch(event);
        self.report(&reports)
    }

    fn download(&mut self, node: &str) -> Result<(), DemoError> {
        let stream = self.session.download_named(node)?;
        let filename = stream.filename().to_string();
        let content_type = stream.content_type().to_string();
        let bytes = stream.collect_bytes().map_err(|source| GraphError::Evaluation {
            node: node.to_string(),
            source,
        })?;
        self.out.emit(&json!({
            "download": node,
            "filename": filename,
            "content_type": content_type,
            "content": String::from_utf8_lossy(&bytes),
        }))?;
        Ok(())
    }

    /// Evaluation failures were already rendered by the sink; anything else
    /// means the event itself was refused.
    fn report(&self, reports: &[SweepReport]) -> Result<(), DemoError> {
        for report in reports {
            for error in &report.errors {
                if !matches!(error, GraphError::Evaluation { .. }) {
                    self.reject(&report.cause, &error.to_string())?;
                }
            }
            self.out.emit(&json!({
                "sweep": report.sweep,
                "cause": report.cause,
                "recomputed": report.recomputed,
                "rendered": report.rendered,
            }))?;
        }
        Ok(())
    }

    fn reject(&self, command: &str, message: &str) -> Result<(), DemoError> {
        warn!(command, message, "command rejected");
        self.out
            .emit(&json!({ "rejected": command, "message": message }))?;
        Ok(())
    }
}

fn read_upload(path: &Path) -> Result<Upload, DemoError> {
    let bytes = std::fs::read(path).map_err(|source| DemoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Upload::new(name, bytes))
}
