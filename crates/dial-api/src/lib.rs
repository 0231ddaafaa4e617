mod source;
mod store;

pub use source::{DirScriptSource, MemoryScriptSource, ScriptSource, SCRIPT_EXTENSION};
pub use store::{DirSaveStore, MemorySaveStore, SaveFormat, SaveStore};

pub use dial_core::{
    ChoiceObject, DialError, Diagnostic, DiagnosticSink, HostRequest, LogEntry, SaveLog, Severity,
    Status, TextKind, TextObject, Value, SAVE_LOG_SCHEMA,
};
pub use dial_runtime::{
    shared_globals, Session, SessionOptions, SharedGlobals, DEFAULT_TEXT_WIDTH, JUMP_LOOP_LIMIT,
};

#[derive(Clone)]
pub struct CreateSessionOptions {
    pub script_name: String,
    pub session: SessionOptions,
}

impl CreateSessionOptions {
    pub fn new(script_name: impl Into<String>) -> Self {
        Self {
            script_name: script_name.into(),
            session: SessionOptions::default(),
        }
    }
}

#[derive(Clone)]
pub struct LoadSessionOptions {
    pub script_name: String,
    pub slot: u32,
    pub session: SessionOptions,
}

impl LoadSessionOptions {
    pub fn new(script_name: impl Into<String>, slot: u32) -> Self {
        Self {
            script_name: script_name.into(),
            slot,
            session: SessionOptions::default(),
        }
    }
}

pub fn create_session(
    source: &dyn ScriptSource,
    options: CreateSessionOptions,
) -> Result<Session, DialError> {
    let script = source.read_script(&options.script_name)?;
    Session::new(options.script_name, &script, options.session)
}

pub fn save_session(
    session: &Session,
    store: &mut dyn SaveStore,
    slot: u32,
) -> Result<(), DialError> {
    store.write(session.script_name(), slot, session.log())?;
    tracing::info!(
        script = session.script_name(),
        slot,
        entries = session.log().len(),
        "session saved"
    );
    Ok(())
}

pub fn load_session(
    source: &dyn ScriptSource,
    store: &dyn SaveStore,
    options: LoadSessionOptions,
) -> Result<Session, DialError> {
    let log = store.read(&options.script_name, options.slot)?;
    let Some(script_name) = log.script_name() else {
        return Err(DialError::new(
            "LOAD_NO_SCRIPT",
            "The save log doesn't name its script.",
        ));
    };
    let script = source.read_script(script_name)?;
    Session::replay(&script, &log, options.session)
}
