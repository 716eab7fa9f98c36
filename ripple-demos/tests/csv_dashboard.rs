use ripple_core::{Event, GraphError, RecordingSink, SessionConfig};
use ripple_demos::csv_dashboard::{CsvDashboard, Kpis, Shape, MAX_CHART_BINS, SAMPLE_ROWS};
use ripple_demos::{Upload, View};
use serde_json::json;

#[test]
fn sample_filter_and_export() {
    let app = CsvDashboard::build().unwrap();
    let sink = RecordingSink::new();
    let mut session = app.graph.session(SessionConfig::default(), sink.clone()).unwrap();

    session.dispatch(Event::Refresh);
    assert!(session.get(app.status).unwrap().is_prompt());
    assert!(session.get(app.kpis).unwrap().is_prompt());
    assert!(session.download(app.download).is_err());

    let report = session.dispatch(Event::set("sample_seed", Some(7_u64))).remove(0);
    assert!(report.is_ok());
    assert_eq!(
        session.get(app.status).unwrap(),
        &View::ready(Shape {
            rows: SAMPLE_ROWS,
            columns: 3
        })
    );
    let status_renders = sink.renders("status");
    let raw_runs = session.evaluations(app.raw);

    session.dispatch(Event::set_json(
        "filters",
        json!({"category": {"kind": "values", "values": ["A"]}}),
    ));
    // Rows 0, 4, ..., 48
    assert_eq!(session.get(app.kpis).unwrap().value().unwrap().as_ref().unwrap().rows, 13);
    assert_eq!(sink.renders("status"), status_renders);
    // The seeded sample is parsed once, however often the filters change
    assert_eq!(session.evaluations(app.raw), raw_runs);

    let csv = session.download(app.download).unwrap();
    assert_eq!(csv.filename(), "filtered.csv");
    assert_eq!(csv.content_type(), "text/csv");
    let text = String::from_utf8(csv.collect_bytes().unwrap()).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("date,category,value"));
    assert_eq!(lines.clone().count(), 13);
    assert!(lines.all(|line| line.split(',').nth(1) == Some("A")));

    session.dispatch(Event::set("chart_column", Some("value".to_string())));
    let chart = session.get(app.chart).unwrap().value().unwrap().clone().unwrap();
    assert_eq!(chart.column, "value");
    assert_eq!(chart.bins(), 13);
    assert_eq!(chart.total(), 13);

    session.dispatch(Event::set_json("filters", json!({})));
    let chart = session.get(app.chart).unwrap().value().unwrap().clone().unwrap();
    assert_eq!(chart.bins(), MAX_CHART_BINS);
}

#[test]
fn upload_replaces_sample() {
    let app = CsvDashboard::build().unwrap();
    let mut session = app.graph.session(SessionConfig::default(), RecordingSink::new()).unwrap();

    session.dispatch(Event::set("sample_seed", Some(1_u64)));
    session.dispatch(Event::set_json(
        "filters",
        json!({"category": {"kind": "values", "values": ["B"]}}),
    ));
    session.dispatch(Event::set(
        "upload",
        Some(Upload::new("sales.csv", "region,amount\nnorth,10\nsouth,\neast,5\n")),
    ));

    assert_eq!(session.get(app.source).unwrap().as_ref().unwrap().name, "sales.csv");
    assert_eq!(
        session.get(app.status).unwrap(),
        &View::ready(Shape { rows: 3, columns: 2 })
    );
    // The category filter no longer applies
    assert_eq!(
        session.get(app.kpis).unwrap(),
        &View::ready(Some(Kpis {
            rows: 3,
            numeric_columns: 1,
            first_numeric_sum: 15.0,
        }))
    );

    session.dispatch(Event::set("upload", None::<Upload>));
    assert_eq!(session.get(app.source).unwrap().as_ref().unwrap().name, "sample.csv");
}

#[test]
fn filters_from_another_schema_are_ignored() {
    let app = CsvDashboard::build().unwrap();
    let mut session = app.graph.session(SessionConfig::default(), RecordingSink::new()).unwrap();

    session.dispatch(Event::set("sample_seed", Some(3_u64)));
    session.dispatch(Event::set_json(
        "filters",
        json!({"category": {"kind": "values", "values": ["A"]}}),
    ));
    // Same column name, numeric this time
    let report = session
        .dispatch(Event::set(
            "upload",
            Some(Upload::new("codes.csv", "category,amount\n1,10\n2,5\n")),
        ))
        .remove(0);
    assert!(report.is_ok());
    assert_eq!(
        session.get(app.kpis).unwrap(),
        &View::ready(Some(Kpis {
            rows: 2,
            numeric_columns: 2,
            first_numeric_sum: 3.0,
        }))
    );
    let csv = session.download(app.download).unwrap();
    let text = String::from_utf8(csv.collect_bytes().unwrap()).unwrap();
    assert_eq!(text, "category,amount\n1,10\n2,5\n");
}

#[test]
fn bad_csv_is_reported_on_every_view() {
    let app = CsvDashboard::build().unwrap();
    let sink = RecordingSink::new();
    let mut session = app.graph.session(SessionConfig::default(), sink.clone()).unwrap();
    session.dispatch(Event::Refresh);

    let report = session
        .dispatch(Event::set("upload", Some(Upload::new("bad.csv", "a,b\n1,2\n3\n"))))
        .remove(0);
    assert!(!report.is_ok());
    assert!(report
        .errors
        .iter()
        .all(|error| matches!(error, GraphError::Evaluation { .. })));
    assert_eq!(sink.errors("status"), 1);
    assert_eq!(sink.errors("chart"), 1);
}
