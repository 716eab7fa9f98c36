use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ripple_core::{Event, RecordingSink, Rendered, SessionConfig};
use ripple_demos::openai::{ChatRequest, CompletionClient, CompletionError, OpenAiClient};
use ripple_demos::summarizer::{DocumentSource, Summarizer};
use ripple_demos::{DemoError, Settings, Upload, View};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Answers with the length of the user message; counts calls.
struct FakeModel {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl CompletionClient for FakeModel {
    async fn complete(&self, request: ChatRequest) -> Result<Option<String>, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CompletionError::Status {
                status: 500,
                body: "model unavailable".into(),
            });
        }
        let text = &request.messages[1].content;
        Ok(Some(
            json!({
                "summary": format!("{} characters", text.chars().count()),
                "keywords": ["alpha", "beta"],
            })
            .to_string(),
        ))
    }
}

fn summarizer(fail: bool) -> (Summarizer, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let model = FakeModel {
        calls: calls.clone(),
        fail,
    };
    (Summarizer::with_client(Arc::new(model), "test-model").unwrap(), calls)
}

#[test]
fn summary_is_cached_until_the_document_changes() {
    let (app, calls) = summarizer(false);
    let sink = RecordingSink::new();
    let mut session = app.graph.session(SessionConfig::default(), sink.clone()).unwrap();

    session.dispatch(Event::Refresh);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.get(app.keywords).unwrap(), &View::ready("alpha, beta".to_string()));
    assert!(sink
        .entries()
        .contains(&Rendered::Busy { node: "summary".into(), busy: true }));

    session.dispatch(Event::set("text", "# Title\n\nBody".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        session.get(app.summary_text).unwrap(),
        &View::ready("13 characters".to_string())
    );

    // Same document again: nothing to do
    let reports = session.dispatch(Event::set("text", "# Title\n\nBody".to_string()));
    assert!(reports[0].recomputed.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Rerun asks again; the answer is identical so nothing re-renders
    let renders = sink.renders("summary_text");
    session.dispatch(app.rerun());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(sink.renders("summary_text"), renders);

    let saved = session.download(app.save).unwrap();
    assert_eq!(saved.filename(), "summary.txt");
    assert_eq!(saved.collect_bytes().unwrap(), b"13 characters");
}

#[test]
fn blank_text_shows_the_prompt() {
    let (app, calls) = summarizer(false);
    let mut session = app.graph.session(SessionConfig::default(), RecordingSink::new()).unwrap();
    session.dispatch(Event::Refresh);

    session.dispatch(Event::set("text", "  \n ".to_string()));
    assert_eq!(session.get(app.document).unwrap(), &DocumentSource::NoInput);
    assert!(session.get(app.excerpt).unwrap().is_prompt());
    assert!(session.get(app.summary_text).unwrap().is_prompt());
    assert!(session.get(app.keywords).unwrap().is_prompt());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(session.download(app.save).is_err());

    session.dispatch(Event::set("upload", Some(Upload::new("note.md", "uploaded"))));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        session.get(app.excerpt).unwrap(),
        &View::ready("uploaded".to_string())
    );
}

#[test]
fn model_failure_reaches_both_views_once() {
    let (app, calls) = summarizer(true);
    let sink = RecordingSink::new();
    let mut session = app.graph.session(SessionConfig::default(), sink.clone()).unwrap();

    let report = session.dispatch(Event::Refresh).remove(0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.errors.len(), 2);
    assert_eq!(sink.errors("summary_text"), 1);
    assert_eq!(sink.errors("keywords"), 1);
    assert_eq!(sink.renders("excerpt"), 1);
    assert!(report.errors[0].to_string().contains("model unavailable"));
}

#[test]
fn invalid_utf8_upload_is_an_error() {
    let (app, calls) = summarizer(false);
    let sink = RecordingSink::new();
    let mut session = app.graph.session(SessionConfig::default(), sink.clone()).unwrap();
    session.dispatch(Event::Refresh);

    session.dispatch(Event::set("upload", Some(Upload::new("bin.md", vec![0xc3, 0x28]))));
    assert_eq!(sink.errors("excerpt"), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn missing_api_key_refuses_to_start() {
    assert!(matches!(
        Summarizer::new(&Settings::default()),
        Err(DemoError::MissingApiKey)
    ));
    let settings = Settings::from_vars([("OPENAI_API_KEY", "sk-test")]);
    assert!(Summarizer::new(&settings).is_ok());
}

#[test]
fn sessions_share_one_http_client() {
    // The mock server lives on its own runtime; sessions bring their own.
    let server_runtime = tokio::runtime::Runtime::new().unwrap();
    let server = server_runtime.block_on(MockServer::start());
    server_runtime.block_on(
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {
                    "role": "assistant",
                    "content": "{\"summary\": \"short\", \"keywords\": [\"k\"]}"
                }}]
            })))
            .expect(3)
            .mount(&server),
    );

    let client = OpenAiClient::new("sk-test", format!("{}/v1", server.uri())).unwrap();
    let app = Summarizer::with_client(Arc::new(client), "test-model").unwrap();
    let config = SessionConfig {
        task_timeout_ms: Some(5_000),
        ..SessionConfig::default()
    };
    let mut first = app.graph.session(config.clone(), RecordingSink::new()).unwrap();
    let mut second = app.graph.session(config, RecordingSink::new()).unwrap();

    assert!(first.dispatch(Event::Refresh).remove(0).is_ok());
    assert!(second.dispatch(Event::Refresh).remove(0).is_ok());
    assert!(first.dispatch(app.rerun()).remove(0).is_ok());
    assert_eq!(
        second.get(app.summary_text).unwrap(),
        &View::ready("short".to_string())
    );

    drop((first, second));
    server_runtime.block_on(server.verify());
}
