use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use dial_api::{
    create_session, load_session, save_session, shared_globals, CreateSessionOptions,
    DirSaveStore, DirScriptSource, HostRequest, LoadSessionOptions, SaveFormat, SaveStore,
    SessionOptions, Status, Value,
};

const CHAPTER: &str = "#Visits += 1#Guide: Visit @DISPLAY Visits@|{{Shop}{Leave}}Done|~";

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should move forward")
        .as_nanos();
    std::env::temp_dir().join(format!("dial-api-{}-{}", name, nanos))
}

fn script_dir(name: &str, scripts: &[(&str, &str)]) -> PathBuf {
    let root = temp_dir(name);
    fs::create_dir_all(&root).expect("root should be created");
    for (script, text) in scripts {
        fs::write(root.join(format!("{}.dial", script)), text).expect("script should be written");
    }
    root
}

fn texts(session: &dial_api::Session) -> Vec<String> {
    session.lines().iter().map(|line| line.text.clone()).collect()
}

fn play_chapter(source: &DirScriptSource) -> dial_api::Session {
    let mut options = CreateSessionOptions::new("chapter");
    options.session.random_seed = Some(99);
    let mut session = create_session(source, options).expect("session should build");
    session.tick();
    session.continue_line().expect("continue should pass");
    session.tick();
    session.choose(0).expect("choose should pass");
    session.tick();
    session
}

#[test]
fn json_save_round_trips_through_the_directory() {
    let root = script_dir("json", &[("chapter", CHAPTER)]);
    let source = DirScriptSource::new(&root);
    let mut store = DirSaveStore::new(root.join("saves"), SaveFormat::Json);

    let session = play_chapter(&source);
    assert_eq!(texts(&session), vec!["Visit 1", "Shop", "Done"]);
    assert_eq!(session.lines()[0].actor_name, "Guide");
    save_session(&session, &mut store, 1).expect("save should pass");
    assert!(store.slot_path("chapter", 1).is_file());

    let loaded = load_session(&source, &store, LoadSessionOptions::new("chapter", 1))
        .expect("load should pass");
    assert_eq!(texts(&loaded), texts(&session));
    assert_eq!(loaded.seed(), 99);
    assert_eq!(loaded.globals().get("Visits"), Some(&Value::Int(1)));
    assert_eq!(loaded.status(), Status::Finished);
}

#[test]
fn flat_save_uses_the_comma_separated_form() {
    let root = script_dir("flat", &[("chapter", CHAPTER)]);
    let source = DirScriptSource::new(&root);
    let mut store = DirSaveStore::new(root.join("saves"), SaveFormat::Flat);

    let session = play_chapter(&source);
    save_session(&session, &mut store, 2).expect("save should pass");
    let raw = fs::read_to_string(store.slot_path("chapter", 2)).expect("save file exists");
    assert!(raw.starts_with("f:chapter,s:99,0,"));
    assert!(raw.contains("v:Visits = 1,"));

    let log = store.read("chapter", 2).expect("read should pass");
    assert_eq!(&log, session.log());
    let loaded = load_session(&source, &store, LoadSessionOptions::new("chapter", 2))
        .expect("load should pass");
    assert_eq!(texts(&loaded), texts(&session));
}

#[test]
fn missing_script_and_slot_are_reported() {
    let root = script_dir("missing", &[]);
    let source = DirScriptSource::new(&root);
    let store = DirSaveStore::new(root.join("saves"), SaveFormat::Json);

    let error = create_session(&source, CreateSessionOptions::new("nowhere"))
        .err()
        .expect("missing script should fail");
    assert_eq!(error.code, "SOURCE_NOT_FOUND");

    let error = load_session(&source, &store, LoadSessionOptions::new("nowhere", 0))
        .err()
        .expect("missing save should fail");
    assert_eq!(error.code, "LOAD_NOT_FOUND");
}

#[test]
fn sessions_composed_over_one_store_share_globals() {
    let root = script_dir(
        "globals",
        &[
            ("give", "#Gold = 5#You found gold|~"),
            ("count", "You have @DISPLAY Gold@ gold|~"),
        ],
    );
    let source = DirScriptSource::new(&root);
    let globals = shared_globals();
    let options = |name: &str| CreateSessionOptions {
        script_name: name.to_string(),
        session: SessionOptions {
            globals: Some(globals.clone()),
            ..SessionOptions::default()
        },
    };

    let mut give = create_session(&source, options("give")).expect("session should build");
    give.tick();
    let mut count = create_session(&source, options("count")).expect("session should build");
    count.tick();
    assert_eq!(texts(&count), vec!["You have 5 gold"]);
}

#[test]
fn special_commands_queue_host_requests() {
    let root = script_dir("requests", &[("rest", "Resting|@SAVE@@WAIT 30@Awake|~")]);
    let source = DirScriptSource::new(&root);
    let mut session =
        create_session(&source, CreateSessionOptions::new("rest")).expect("session should build");
    session.tick();
    assert!(session.take_requests().is_empty());
    session.continue_line().expect("continue should pass");
    session.tick();
    assert_eq!(
        session.take_requests(),
        vec![HostRequest::Save, HostRequest::Wait(30)]
    );
    assert!(session.take_requests().is_empty());
    assert_eq!(texts(&session), vec!["Resting", "Awake"]);
}
