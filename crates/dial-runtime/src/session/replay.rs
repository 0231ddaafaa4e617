use super::*;

impl Session {
    pub fn replay(
        source: &[u8],
        log: &SaveLog,
        options: SessionOptions,
    ) -> Result<Self, DialError> {
        log.validate_schema()?;
        let script_name = log
            .script_name()
            .ok_or_else(|| DialError::new("LOAD_NO_SCRIPT", "The save log doesn't name its script."))?
            .to_string();
        let seed = log
            .seed()
            .ok_or_else(|| DialError::new("LOAD_NO_SEED", "The save log doesn't record a seed."))?;

        let mut session = Self::new(
            script_name,
            source,
            SessionOptions {
                random_seed: Some(seed),
                ..options
            },
        )?;

        let mut pending_vars: Vec<(String, Value)> = Vec::new();
        for (position, entry) in log.entries.iter().enumerate() {
            if matches!(entry, LogEntry::Script { .. } | LogEntry::Seed { .. }) {
                continue;
            }
            session.tick();
            match entry {
                LogEntry::Var { name, value } => pending_vars.push((name.clone(), value.clone())),
                LogEntry::Accent { name } => session.select_accent(name).map_err(|error| {
                    DialError::new(
                        "LOAD_ACCENT",
                        format!("Entry {}: {}", position, error.message),
                    )
                })?,
                LogEntry::Continue => {
                    session.apply_replayed_vars(&mut pending_vars);
                    session
                        .continue_line()
                        .map_err(|error| desync(position, error))?;
                }
                LogEntry::Choice { index: 0 } => {
                    return Err(DialError::new(
                        "LOAD_CHOICE_INDEX",
                        format!("Entry {}: choice numbers start at 1.", position),
                    ));
                }
                LogEntry::Choice { index } => {
                    session.apply_replayed_vars(&mut pending_vars);
                    let choice = index - 1;
                    if !session
                        .is_choice_valid(choice)
                        .map_err(|error| desync(position, error))?
                    {
                        continue;
                    }
                    session.choose(choice).map_err(|error| desync(position, error))?;
                }
                LogEntry::Script { .. } | LogEntry::Seed { .. } => {}
            }
        }
        session.apply_replayed_vars(&mut pending_vars);
        session.tick();

        tracing::info!(
            script = %session.script_name,
            entries = log.len(),
            lines = session.lines.len(),
            "save log replayed"
        );
        Ok(session)
    }

    fn apply_replayed_vars(&mut self, pending: &mut Vec<(String, Value)>) {
        for (name, value) in pending.drain(..) {
            self.store(&name, value);
        }
    }
}

fn desync(position: usize, error: DialError) -> DialError {
    DialError::new(
        "LOAD_DESYNC",
        format!(
            "Entry {} no longer matches the script ({}: {}).",
            position, error.code, error.message
        ),
    )
}

#[cfg(test)]
mod replay_tests {
    use crate::session::session_test_support::*;
    use crate::session::*;

    const NINE_LINES: &str = "Test 1 |\nTest 2 |\nTest 3 |\nTest 4 |\nTest 5 |\nTest 6 |\nTest 7 |\nTest 8 |\nTest 9 |\n|~";

    #[test]
    fn replay_reproduces_the_saved_prefix() {
        let (mut direct, _) = session(NINE_LINES);
        for _ in 0..5 {
            direct.tick();
            direct.continue_line().expect("continue should pass");
        }
        let saved = direct.log().clone();

        let replayed = Session::replay(NINE_LINES.as_bytes(), &saved, SessionOptions::default())
            .expect("replay should pass");
        assert_eq!(replayed.seed(), direct.seed());
        assert_eq!(replayed.script_name(), "test");
        assert_eq!(&replayed.lines()[..5], direct.lines());
        assert_eq!(replayed.lines().len(), 6);
        assert_eq!(replayed.lines()[5].text, "Test 6 ");
    }

    #[test]
    fn replay_follows_choices_and_accents() {
        let script = "Intro|{{|happy: Yay!|sad: Oh.}{Plain}}#Gold += 1#@DISPLAY Gold@ coins|After|~";
        let (mut direct, _) = session(script);
        direct.tick();
        direct.continue_line().expect("continue should pass");
        direct.tick();
        direct.shift_accent(1);
        direct.choose(0).expect("choose should pass");
        direct.tick();
        assert_eq!(texts(&direct), vec!["Intro", "Oh.", "1 coins"]);

        let replayed = Session::replay(script.as_bytes(), direct.log(), SessionOptions::default())
            .expect("replay should pass");
        assert_eq!(texts(&replayed), texts(&direct));
        assert_eq!(replayed.locals().get("sad"), Some(&Value::Int(1)));
        assert_eq!(replayed.status(), Status::WaitForContinuation);
    }

    #[test]
    fn replay_restores_logged_globals() {
        let mut log = SaveLog::new();
        log.push(LogEntry::Script {
            name: "test".to_string(),
        });
        log.push(LogEntry::Seed { seed: 3 });
        log.push(LogEntry::Var {
            name: "Gold".to_string(),
            value: Value::Int(40),
        });
        log.push(LogEntry::Continue);

        let replayed = Session::replay(b"Hi|@DISPLAY Gold@|~", &log, SessionOptions::default())
            .expect("replay should pass");
        assert_eq!(texts(&replayed), vec!["Hi", "40"]);
        assert_eq!(replayed.seed(), 3);
    }

    #[test]
    fn broken_logs_fail_the_load() {
        let mut wrong_schema = SaveLog::new();
        wrong_schema.schema_version = "dial-save.v0".to_string();
        let error = Session::replay(b"Hi|~", &wrong_schema, SessionOptions::default())
            .err()
            .expect("schema should be rejected");
        assert_eq!(error.code, "LOAD_SCHEMA");

        let mut log = SaveLog::new();
        log.push(LogEntry::Script {
            name: "test".to_string(),
        });
        log.push(LogEntry::Seed { seed: 1 });
        let mut zero = log.clone();
        zero.push(LogEntry::Choice { index: 0 });
        let error = Session::replay(b"{{A}}|~", &zero, SessionOptions::default())
            .err()
            .expect("choice zero should be rejected");
        assert_eq!(error.code, "LOAD_CHOICE_INDEX");

        let mut accent = log.clone();
        accent.push(LogEntry::Accent {
            name: "angry".to_string(),
        });
        let error = Session::replay(b"{{|calm: Hm.}}|~", &accent, SessionOptions::default())
            .err()
            .expect("unknown accent should be rejected");
        assert_eq!(error.code, "LOAD_ACCENT");

        let mut desync = log;
        desync.push(LogEntry::Continue);
        let error = Session::replay(b"{{A}{B}}|~", &desync, SessionOptions::default())
            .err()
            .expect("continue at a choice should be rejected");
        assert_eq!(error.code, "LOAD_DESYNC");

        let error = Session::replay(b"Hi|~", &SaveLog::new(), SessionOptions::default())
            .err()
            .expect("a log without a script should be rejected");
        assert_eq!(error.code, "LOAD_NO_SCRIPT");
    }
}
