use std::rc::Rc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use screencast_engine::{
    Change, Command, DocumentHost, EditOp, JsonFileBackend, ManualClock, MemoryBackend, Mode,
    PlayFrame, Position, ProjectStore, Rehydrate, RopeDocument, Selection, Session,
    SessionOptions, StoreOptions, TickOutcome, serialize,
};
use tempfile::TempDir;

fn open_session(store: ProjectStore, clock: &ManualClock) -> Session<RopeDocument> {
    let mut session = Session::new(store, Rc::new(clock.clone()), SessionOptions::default());
    session.attach_editor(RopeDocument::new(""));
    session
}

fn type_text(session: &mut Session<RopeDocument>, text: &str) {
    let editor = session.editor_mut().unwrap();
    let edit = editor.replace_selection(text).unwrap();
    let selections = editor.selections().to_vec();
    session.on_document_changed(&[edit]);
    session.on_selection_changed(&selections);
}

/// Play to the end, resuming at every breakpoint. Returns the breakpoint
/// labels seen on the way.
fn play_through(session: &mut Session<RopeDocument>) -> Vec<String> {
    let mut labels = Vec::new();
    session.dispatch(Command::Play).unwrap();
    for _ in 0..1000 {
        match session.tick() {
            TickOutcome::Paused(progress) => {
                labels.push(progress.label());
                session.dispatch(Command::Play).unwrap();
            }
            TickOutcome::Stopped => return labels,
            _ => {}
        }
    }
    panic!("playback did not finish");
}

#[test]
fn demo_scenario_flattens_into_breakpoints_and_changes() {
    let clock = ManualClock::new();
    let mut store =
        ProjectStore::open(MemoryBackend::new(), StoreOptions::default(), Rc::new(clock.clone()))
            .unwrap();
    let project = store.create("demo").unwrap();

    // Given
    project.borrow_mut().add_change(Change::new(
        vec![EditOp::insert(Position::new(0, 0), 0, "hi")],
        vec![Selection::caret(Position::new(0, 2))],
    ));
    project.borrow_mut().add_breakpoint("step2", "hi");
    project.borrow_mut().add_change(Change::new(
        vec![EditOp::insert(Position::new(0, 2), 2, "!")],
        vec![Selection::caret(Position::new(0, 3))],
    ));

    // When
    let play = project.borrow().play_data();

    // Then
    let kinds: Vec<&str> = play
        .frames
        .iter()
        .map(|frame| match frame {
            PlayFrame::Breakpoint { .. } => "breakpoint",
            PlayFrame::Change(_) => "change",
        })
        .collect();
    assert_eq!(kinds, vec!["breakpoint", "change", "breakpoint", "change"]);
    assert!(matches!(&play.frames[2], PlayFrame::Breakpoint { number: 2, name, .. } if name == "step2"));
}

#[test]
fn recorded_session_replays_to_the_same_text() {
    let clock = ManualClock::new();
    let store =
        ProjectStore::open(MemoryBackend::new(), StoreOptions::default(), Rc::new(clock.clone()))
            .unwrap();
    let mut session = open_session(store, &clock);
    session
        .editor_mut()
        .unwrap()
        .replace_all_text("fn main() {\n}")
        .unwrap();

    session.dispatch(Command::CreateProject("demo".into())).unwrap();
    session.dispatch(Command::Record).unwrap();
    session
        .editor_mut()
        .unwrap()
        .set_selections(&[Selection::caret(Position::new(0, 11))])
        .unwrap();
    type_text(&mut session, "\n    ");
    type_text(&mut session, "println!(\"hi\");");
    session.dispatch(Command::AddBreakpoint("printed".into())).unwrap();
    type_text(&mut session, " // done");
    session.dispatch(Command::StopRecording).unwrap();
    let recorded = session.editor().unwrap().text();
    assert_eq!(recorded, "fn main() {\n    println!(\"hi\"); // done\n}");

    session.editor_mut().unwrap().replace_all_text("").unwrap();
    let labels = play_through(&mut session);

    assert_eq!(labels, vec!["1/2", "2/2"]);
    assert_eq!(session.editor().unwrap().text(), recorded);
    assert_eq!(session.mode(), Mode::Idle(screencast_engine::IdleState::ProjectSelected));
}

#[test]
fn rapid_mutations_coalesce_into_one_write() {
    let clock = ManualClock::new();
    let backend = MemoryBackend::new();
    let mut store =
        ProjectStore::open(backend.clone(), StoreOptions::default(), Rc::new(clock.clone()))
            .unwrap();
    let project = store.get("demo");

    for i in 0..10 {
        project.borrow_mut().add_change(Change::cursor_move(vec![Selection::caret(
            Position::new(0, i),
        )]));
        clock.advance(Duration::from_millis(100));
        store.flush_due();
    }
    assert_eq!(backend.writes(), 0);

    clock.advance(Duration::from_millis(400));
    store.flush_due();

    assert_eq!(backend.writes(), 1);
    let stored = &backend.value("projects").unwrap()["demo"]["breakpoints"][0]["changes"];
    assert_eq!(stored.as_array().map(Vec::len), Some(10));
}

#[test]
fn projects_survive_a_restart_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("projects.json");
    let clock = ManualClock::new();

    {
        let store = ProjectStore::open(
            JsonFileBackend::new(&path),
            StoreOptions::default(),
            Rc::new(clock.clone()),
        )
        .unwrap();
        let mut session = open_session(store, &clock);
        session.dispatch(Command::CreateProject("demo".into())).unwrap();
        session.dispatch(Command::Record).unwrap();
        type_text(&mut session, "hello");
        session.dispatch(Command::AddBreakpoint("greeted".into())).unwrap();
        session.shutdown();
    }

    let store = ProjectStore::open(
        JsonFileBackend::new(&path),
        StoreOptions::default(),
        Rc::new(clock.clone()),
    )
    .unwrap();
    let listing = store.list();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].id, "demo");
    assert_eq!(listing[0].total_change_count, 5);
    assert_eq!(
        listing[0]
            .breakpoints
            .iter()
            .map(|b| b.name.as_str())
            .collect::<Vec<_>>(),
        vec!["RECORD START", "greeted"]
    );

    let mut session = open_session(store, &clock);
    session.dispatch(Command::SelectProject("demo".into())).unwrap();
    play_through(&mut session);
    assert_eq!(session.editor().unwrap().text(), "hello");
}

#[test]
fn stored_change_rehydrates_to_the_original() {
    let change = Change::new(
        vec![EditOp {
            range: screencast_engine::Range::new(Position::new(1, 4), Position::new(2, 0)),
            range_offset: 10,
            range_length: 5,
            text: "x".to_string(),
        }],
        vec![Selection::new(Position::new(2, 1), Position::new(1, 4))],
    );

    let stored = serde_json::to_value(serialize(&change)).unwrap();
    let rehydrated = stored.rehydrate().unwrap();

    assert_eq!(rehydrated, change);
    assert_eq!(rehydrated.rehydrate().unwrap(), rehydrated);
}
