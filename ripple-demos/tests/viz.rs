use ripple_core::{DirtyState, Event, RecordingSink, SessionConfig};
use ripple_demos::viz::{Viz, DATASET_ROWS};
use ripple_demos::Upload;

#[test]
fn controls_recompute_only_their_views() {
    let app = Viz::build().unwrap();
    let sink = RecordingSink::new();
    let mut session = app.graph.session(SessionConfig::default(), sink.clone()).unwrap();

    session.dispatch(Event::Refresh);
    assert_eq!(sink.renders("hist"), 1);
    assert_eq!(sink.renders("tbl"), 1);
    assert_eq!(sink.renders("preview"), 1);
    let first = session.get(app.hist).unwrap().clone();
    assert_eq!(first.title, "lifeExp distribution");
    assert_eq!(first.histogram.bins(), 20);
    assert_eq!(first.histogram.total(), DATASET_ROWS);

    let report = session.dispatch(Event::set("continent", "Asia".to_string())).remove(0);
    assert_eq!(report.recomputed, vec!["filtered", "tbl"]);
    assert_eq!(session.dirty_state(app.hist), DirtyState::Clean);
    assert_eq!(sink.renders("hist"), 1);
    let asia = session.get(app.tbl).unwrap().len();
    assert!(asia > 0 && asia < DATASET_ROWS);

    let report = session.dispatch(Event::set("bins", 25_u32)).remove(0);
    assert_eq!(report.recomputed, vec!["hist"]);
    assert_eq!(session.get(app.hist).unwrap().histogram.bins(), 25);
    assert_eq!(sink.renders("tbl"), 2);

    session.dispatch(Event::set("col", "pop".to_string()));
    assert_eq!(session.get(app.hist).unwrap().title, "pop distribution");

    let csv = session.download(app.dl).unwrap();
    let text = String::from_utf8(csv.collect_bytes().unwrap()).unwrap();
    assert_eq!(text.lines().count(), asia + 1);
    assert!(text.starts_with("lifeExp,gdpPercap,pop,continent\n"));
}

#[test]
fn out_of_range_bins_fail_only_the_histogram() {
    let app = Viz::build().unwrap();
    let sink = RecordingSink::new();
    let mut session = app.graph.session(SessionConfig::default(), sink.clone()).unwrap();
    session.dispatch(Event::Refresh);

    let report = session.dispatch(Event::set("bins", 80_u32)).remove(0);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(sink.errors("hist"), 1);
    assert!(session.is_dirty(app.hist));

    // The histogram keeps failing until bins is fixed; the table is unaffected
    let report = session.dispatch(Event::set("continent", "Europe".to_string())).remove(0);
    assert!(report.errors.iter().all(|error| error.node() == Some("hist")));
    assert_eq!(sink.renders("tbl"), 2);

    session.dispatch(Event::set("bins", 10_u32));
    assert_eq!(session.get(app.hist).unwrap().histogram.bins(), 10);

    let report = session.dispatch(Event::set("continent", "Atlantis".to_string())).remove(0);
    assert_eq!(sink.errors("tbl"), 1);
    assert_eq!(report.errors.len(), 1);
}

#[test]
fn upload_preview() {
    let app = Viz::build().unwrap();
    let mut session = app.graph.session(SessionConfig::default(), RecordingSink::new()).unwrap();
    session.dispatch(Event::Refresh);
    assert!(session.get(app.preview).unwrap().is_empty());
    assert_eq!(session.get(app.preview).unwrap().width(), 0);

    session.dispatch(Event::set("file", Some(Upload::new("mine.csv", "x,y\n1,2\n3,4\n"))));
    let preview = session.get(app.preview).unwrap();
    assert_eq!(preview.len(), 2);
    assert_eq!(preview.names().collect::<Vec<_>>(), vec!["x", "y"]);
}
