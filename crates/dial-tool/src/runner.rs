use std::path::Path;

use dial_api::{
    create_session, load_session, save_session, CreateSessionOptions, LoadSessionOptions,
    MemorySaveStore, MemoryScriptSource, Session, Status, TextKind,
};

use crate::source::{read_scripts_from_dir, read_test_case};
use crate::{DialToolError, ExpectedEvent, TestAction, TestCase};

const MAX_STEPS: usize = 5_000;
const SAVE_SLOT: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub observed_events: Vec<ExpectedEvent>,
    pub consumed_actions: usize,
    pub steps: usize,
}

// Drives the case's script until it ends. Every time the session blocks
// on a choice its choice lines are reported again, so an `accent` or
// `saveLoad` action is followed by a fresh `choices` event.
pub fn run_case(case_dir: &Path, case: &TestCase) -> Result<RunReport, DialToolError> {
    let source = read_scripts_from_dir(case_dir)?;
    let mut options = CreateSessionOptions::new(case.script.clone());
    options.session.random_seed = Some(case.seed);
    let mut session = create_session(&source, options)?;
    let mut store = MemorySaveStore::new();

    let mut observed_events = Vec::new();
    let mut seen = 0usize;
    let mut action_index = 0usize;

    for step in 1..=MAX_STEPS {
        session.tick();
        observe_lines(&session, &mut seen, &mut observed_events);

        match session.status() {
            Status::Interpret => {}
            Status::Finished | Status::None => {
                observed_events.push(ExpectedEvent::End);
                if action_index != case.actions.len() {
                    return Err(DialToolError::UnusedActions {
                        used: action_index,
                        total: case.actions.len(),
                    });
                }
                return Ok(RunReport {
                    observed_events,
                    consumed_actions: action_index,
                    steps: step,
                });
            }
            Status::FatalError => {
                return Err(DialToolError::SessionFailed {
                    event_index: observed_events.len(),
                });
            }
            Status::WaitForContinuation => {
                let event_index = observed_events.len().saturating_sub(1);
                let action = next_action(case, action_index, event_index, "continue")?;
                action_index += 1;
                match action {
                    TestAction::Continue => session.continue_line()?,
                    TestAction::SaveLoad => {
                        session = save_and_load(&session, &source, &mut store)?;
                    }
                    _ => return Err(kind_mismatch(event_index, "continue", action)),
                }
            }
            Status::WaitForChoice => {
                observed_events.push(ExpectedEvent::Choices {
                    choices: choice_lines(&session),
                });
                let event_index = observed_events.len() - 1;
                let action = next_action(case, action_index, event_index, "choose")?;
                action_index += 1;
                match action {
                    TestAction::Choose { index } => {
                        if !session.choose(*index)? {
                            return Err(DialToolError::UnavailableChoice {
                                event_index,
                                index: *index,
                            });
                        }
                        // The selected choice's echo is the next line to report.
                        seen = session.lines().len().saturating_sub(1);
                    }
                    TestAction::Accent { delta } => session.shift_accent(*delta),
                    TestAction::SaveLoad => {
                        session = save_and_load(&session, &source, &mut store)?;
                    }
                    TestAction::Continue => {
                        return Err(kind_mismatch(event_index, "choose", action));
                    }
                }
            }
        }
    }

    Err(DialToolError::GuardExceeded {
        max_steps: MAX_STEPS,
    })
}

pub fn assert_case(case_dir: &Path, case_path: &Path) -> Result<(), DialToolError> {
    let case = read_test_case(case_path)?;
    let report = run_case(case_dir, &case)?;

    if report.observed_events.len() != case.expected_events.len() {
        let observed = serde_json::to_string_pretty(&report.observed_events)
            .map_err(DialToolError::EventSerialize)?;
        return Err(DialToolError::EventCountMismatch {
            expected: case.expected_events.len(),
            actual: report.observed_events.len(),
            observed,
        });
    }

    for (index, (expected, actual)) in case
        .expected_events
        .iter()
        .zip(report.observed_events.iter())
        .enumerate()
    {
        if expected != actual {
            let expected =
                serde_json::to_string(expected).map_err(DialToolError::EventSerialize)?;
            let actual = serde_json::to_string(actual).map_err(DialToolError::EventSerialize)?;
            return Err(DialToolError::EventMismatch {
                index,
                expected,
                actual,
            });
        }
    }

    Ok(())
}

fn observe_lines(session: &Session, seen: &mut usize, events: &mut Vec<ExpectedEvent>) {
    let lines = session.lines();
    for line in lines.get(*seen..).unwrap_or_default() {
        if line.kind.is_choice_listing() {
            continue;
        }
        events.push(ExpectedEvent::Line {
            actor: line.actor_name.clone(),
            text: line.text.clone(),
        });
    }
    *seen = lines.len();
}

fn choice_lines(session: &Session) -> Vec<String> {
    let lines = session.lines();
    lines[lines.len().saturating_sub(session.choice_count())..]
        .iter()
        .filter(|line| line.kind != TextKind::Normal)
        .map(|line| line.text.clone())
        .collect()
}

fn next_action<'a>(
    case: &'a TestCase,
    action_index: usize,
    event_index: usize,
    expected_action_kind: &str,
) -> Result<&'a TestAction, DialToolError> {
    case.actions
        .get(action_index)
        .ok_or_else(|| DialToolError::MissingAction {
            event_index,
            expected_action_kind: expected_action_kind.to_string(),
        })
}

fn kind_mismatch(event_index: usize, expected: &str, action: &TestAction) -> DialToolError {
    DialToolError::ActionKindMismatch {
        event_index,
        expected_action_kind: expected.to_string(),
        actual_action_kind: action.kind_name().to_string(),
    }
}

fn save_and_load(
    session: &Session,
    source: &MemoryScriptSource,
    store: &mut MemorySaveStore,
) -> Result<Session, DialToolError> {
    save_session(session, store, SAVE_SLOT)?;
    let loaded = load_session(
        source,
        store,
        LoadSessionOptions::new(session.script_name(), SAVE_SLOT),
    )?;
    tracing::debug!(
        script = session.script_name(),
        entries = session.log().len(),
        "case reloaded its session"
    );
    Ok(loaded)
}

#[cfg(test)]
mod runner_tests {
    use super::*;

    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should move forward")
            .as_nanos();
        std::env::temp_dir().join(format!("dial-tool-runner-{}-{}", name, nanos))
    }

    fn write_file(path: &Path, content: &str) {
        let parent = path.parent().expect("path should have parent");
        fs::create_dir_all(parent).expect("parent dir should be created");
        fs::write(path, content).expect("file should be written");
    }

    fn case_with(actions: Vec<TestAction>) -> TestCase {
        TestCase {
            schema_version: crate::TESTCASE_SCHEMA_V1.to_string(),
            script: "main".to_string(),
            seed: 1,
            actions,
            expected_events: Vec::new(),
        }
    }

    fn line(text: &str) -> ExpectedEvent {
        ExpectedEvent::Line {
            actor: String::new(),
            text: text.to_string(),
        }
    }

    fn choices(items: &[&str]) -> ExpectedEvent {
        ExpectedEvent::Choices {
            choices: items.iter().map(|item| item.to_string()).collect(),
        }
    }

    #[test]
    fn run_case_reports_lines_and_end() {
        let root = temp_dir("lines");
        write_file(&root.join("main.dial"), "Hello|Nurse: World|~");

        let report = run_case(&root, &case_with(vec![TestAction::Continue]))
            .expect("run should pass");
        assert_eq!(report.consumed_actions, 1);
        assert_eq!(
            report.observed_events,
            vec![
                line("Hello"),
                ExpectedEvent::Line {
                    actor: "Nurse".to_string(),
                    text: "World".to_string(),
                },
                ExpectedEvent::End,
            ]
        );
    }

    #[test]
    fn run_case_reports_choices_again_after_an_accent_shift() {
        let root = temp_dir("accent");
        write_file(
            &root.join("main.dial"),
            "Pick|{{Tea}{|calm: Fine.|rude: No.}}Done|~",
        );

        let case = case_with(vec![
            TestAction::Continue,
            TestAction::Accent { delta: 1 },
            TestAction::Choose { index: 1 },
        ]);
        let report = run_case(&root, &case).expect("run should pass");
        assert_eq!(
            report.observed_events,
            vec![
                line("Pick"),
                choices(&["{1} Tea", "{2} Fine."]),
                choices(&["{1} Tea", "{2} No."]),
                line("No."),
                line("Done"),
                ExpectedEvent::End,
            ]
        );
    }

    #[test]
    fn run_case_reports_missing_or_wrong_action_kinds() {
        let root = temp_dir("missing-action");
        write_file(&root.join("main.dial"), "{{A}}|~");

        let missing = run_case(&root, &case_with(vec![])).expect_err("missing action should fail");
        assert!(matches!(missing, DialToolError::MissingAction { .. }));

        let wrong = run_case(&root, &case_with(vec![TestAction::Continue]))
            .expect_err("kind mismatch should fail");
        assert!(matches!(wrong, DialToolError::ActionKindMismatch { .. }));

        let text_root = temp_dir("wrong-continue");
        write_file(&text_root.join("main.dial"), "Hi|There|~");
        let wrong = run_case(&text_root, &case_with(vec![TestAction::Choose { index: 0 }]))
            .expect_err("kind mismatch should fail");
        assert!(matches!(wrong, DialToolError::ActionKindMismatch { .. }));
    }

    #[test]
    fn run_case_reports_unused_actions_and_engine_errors() {
        let root = temp_dir("unused");
        write_file(&root.join("main.dial"), "x|~");
        let unused = run_case(&root, &case_with(vec![TestAction::Continue]))
            .expect_err("unused action should fail");
        assert!(matches!(unused, DialToolError::UnusedActions { used: 0, total: 1 }));

        let choose_root = temp_dir("bad-choose");
        write_file(&choose_root.join("main.dial"), "{{A}}|~");
        let bad = run_case(&choose_root, &case_with(vec![TestAction::Choose { index: 5 }]))
            .expect_err("invalid choose should fail");
        assert!(matches!(bad, DialToolError::Engine(_)));
    }

    #[test]
    fn run_case_stops_on_a_fatal_session() {
        let root = temp_dir("fatal");
        write_file(&root.join("main.dial"), "[[1]]Loop[1]|~");
        let error = run_case(&root, &case_with(vec![])).expect_err("jump loop should fail");
        assert!(matches!(error, DialToolError::SessionFailed { event_index: 0 }));
    }

    #[test]
    fn save_load_keeps_the_dialogue_going() {
        let root = temp_dir("save-load");
        write_file(
            &root.join("main.dial"),
            "#Gold += 2#Gold @DISPLAY Gold@|{{Keep}{Drop}}Left @DISPLAY Gold@|~",
        );

        let case = case_with(vec![
            TestAction::SaveLoad,
            TestAction::Continue,
            TestAction::Choose { index: 0 },
        ]);
        let report = run_case(&root, &case).expect("run should pass");
        assert_eq!(
            report.observed_events,
            vec![
                line("Gold 2"),
                choices(&["{1} Keep", "{2} Drop"]),
                line("Keep"),
                line("Left 2"),
                ExpectedEvent::End,
            ]
        );
    }

    #[test]
    fn assert_case_reports_count_and_value_mismatches() {
        let root = temp_dir("assert");
        write_file(&root.join("main.dial"), "Hello|~");

        let count_case = root.join("count.json");
        write_file(
            &count_case,
            r#"{
  "schemaVersion":"dial-case.v1",
  "expectedEvents":[{"kind":"end"}]
}"#,
        );
        let count_error = assert_case(&root, &count_case).expect_err("count mismatch should fail");
        assert!(matches!(count_error, DialToolError::EventCountMismatch { .. }));

        let value_case = root.join("value.json");
        write_file(
            &value_case,
            r#"{
  "schemaVersion":"dial-case.v1",
  "expectedEvents":[{"kind":"line","text":"Wrong"},{"kind":"end"}]
}"#,
        );
        let value_error = assert_case(&root, &value_case).expect_err("value mismatch should fail");
        assert!(matches!(value_error, DialToolError::EventMismatch { index: 0, .. }));

        let pass_case = root.join("pass.json");
        write_file(
            &pass_case,
            r#"{
  "schemaVersion":"dial-case.v1",
  "expectedEvents":[{"kind":"line","text":"Hello"},{"kind":"end"}]
}"#,
        );
        assert_case(&root, &pass_case).expect("assert should pass");
    }
}
