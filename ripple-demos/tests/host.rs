use std::io::{Cursor, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use ripple_core::SessionConfig;
use ripple_demos::host::{DemoKind, Host, JsonLines};
use ripple_demos::{DemoError, Settings};
use serde_json::Value;

/// A writer whose bytes the test can read back.
#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Buffer {
    fn lines(&self) -> Vec<Value> {
        let bytes = std::mem::take(&mut *self.0.lock());
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

fn host(kind: DemoKind) -> (Host, Buffer) {
    let graph = kind.build(&Settings::default()).unwrap();
    let buffer = Buffer::default();
    let host = Host::new(&graph, SessionConfig::default(), JsonLines::new(buffer.clone())).unwrap();
    (host, buffer)
}

fn rendered<'a>(lines: &'a [Value], node: &str) -> Vec<&'a Value> {
    lines
        .iter()
        .filter(|line| line["render"] == node)
        .map(|line| &line["value"])
        .collect()
}

#[test]
fn start_renders_every_output() {
    let (mut host, out) = host(DemoKind::Viz);
    host.start().unwrap();
    let lines = out.lines();

    assert_eq!(rendered(&lines, "hist").len(), 1);
    assert_eq!(rendered(&lines, "hist")[0]["title"], "lifeExp distribution");
    assert_eq!(rendered(&lines, "tbl").len(), 1);
    assert_eq!(rendered(&lines, "preview").len(), 1);
    let sweep = lines.last().unwrap();
    assert_eq!(sweep["sweep"], 1);
    assert_eq!(sweep["cause"], "refresh");
}

#[test]
fn commands_drive_the_session() {
    let (mut host, out) = host(DemoKind::Viz);
    host.start().unwrap();
    out.lines();

    let script = concat!(
        "{\"set\": \"bins\", \"value\": 30}\n",
        "\n",
        "{\"hide\": \"tbl\"}\n",
        "{\"set\": \"continent\", \"value\": \"Oceania\"}\n",
        "{\"show\": \"tbl\"}\n",
        "{\"download\": \"dl\"}\n",
    );
    host.run(Cursor::new(script)).unwrap();
    let lines = out.lines();

    assert_eq!(rendered(&lines, "hist").len(), 1);
    assert_eq!(rendered(&lines, "hist")[0]["histogram"]["counts"].as_array().unwrap().len(), 30);
    // Hidden while the continent changed, rendered once when shown again
    assert_eq!(rendered(&lines, "tbl").len(), 1);

    let download = lines.iter().find(|line| line["download"] == "dl").unwrap();
    assert_eq!(download["filename"], "filtered.csv");
    assert_eq!(download["content_type"], "text/csv");
    let content = download["content"].as_str().unwrap();
    assert!(content.lines().skip(1).all(|row| row.ends_with(",Oceania")));
}

#[test]
fn bad_commands_are_rejected_and_skipped() {
    let (mut host, out) = host(DemoKind::Csv);
    host.start().unwrap();
    out.lines();

    let script = concat!(
        "not json\n",
        "{\"set\": \"nope\", \"value\": 1}\n",
        "{\"set\": \"sample_seed\", \"value\": \"seven\"}\n",
        "{\"upload\": \"upload\", \"path\": \"/nonexistent/ripple/data.csv\"}\n",
        "{\"download\": \"download\"}\n",
        "{\"set\": \"sample_seed\", \"value\": 3}\n",
    );
    host.run(Cursor::new(script)).unwrap();
    let lines = out.lines();

    let rejected: Vec<&Value> = lines.iter().filter(|line| line.get("rejected").is_some()).collect();
    assert_eq!(rejected.len(), 5);
    assert_eq!(rejected[0]["rejected"], "not json");
    assert_eq!(rejected[1]["rejected"], "set nope");
    assert!(rejected[2]["message"].as_str().unwrap().contains("sample_seed"));
    assert!(rejected[4]["message"].as_str().unwrap().contains("nothing to download"));

    let status = rendered(&lines, "status");
    assert_eq!(status.last().unwrap()["value"]["rows"], 50);
}

#[test]
fn non_utf8_line_is_rejected() {
    let (mut host, out) = host(DemoKind::Csv);
    host.start().unwrap();
    out.lines();

    let mut script = b"{\"set\": \"sample_seed\", \"value\": \xff}\n".to_vec();
    script.extend_from_slice(b"{\"set\": \"sample_seed\", \"value\": 3}\n");
    host.run(Cursor::new(script)).unwrap();
    let lines = out.lines();

    let rejected: Vec<&Value> = lines.iter().filter(|line| line.get("rejected").is_some()).collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rendered(&lines, "status").last().unwrap()["value"]["rows"], 50);
}

#[test]
fn upload_reads_the_file() {
    let path = std::env::temp_dir().join(format!("ripple-host-upload-{}.csv", std::process::id()));
    std::fs::write(&path, "k,v\na,1\nb,2\n").unwrap();

    let (mut host, out) = host(DemoKind::Csv);
    host.start().unwrap();
    out.lines();

    let line = serde_json::json!({"upload": "upload", "path": path}).to_string();
    host.handle_line(&line).unwrap();
    let lines = out.lines();
    std::fs::remove_file(&path).unwrap();

    let status = rendered(&lines, "status");
    assert_eq!(status[0]["state"], "ready");
    assert_eq!(status[0]["value"]["rows"], 2);
}

#[test]
fn summarizer_needs_a_key() {
    assert!(matches!(
        DemoKind::Summarize.build(&Settings::default()),
        Err(DemoError::MissingApiKey)
    ));
}
