use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use dial_core::{
    ChoiceObject, DialError, DiagnosticSink, HostRequest, LogEntry, Pos, SaveLog, Severity,
    SourceLocation, Status, TextKind, TextObject, TracingSink, Value,
};
use dial_parser::{apply_escapes, normalize_whitespace, scan_jump_bases, wrap_text, JumpBases, ScriptBuffer};

use crate::expr::{evaluate, EvalContext, EvalError};
use crate::rng::{roll_percent, seed_from_clock};
use crate::vars::{shared_globals, ReservedName, SharedGlobals, VarStore, VarTable};

mod choices;
mod instructions;
mod replay;
mod tick;

pub const DEFAULT_TEXT_WIDTH: usize = 40;
pub const JUMP_LOOP_LIMIT: usize = 100;
pub const UNAVAILABLE_ACCENT_TEXT: &str = "<Unavailable.>";

#[derive(Clone)]
pub struct SessionOptions {
    pub text_width: usize,
    pub random_seed: Option<u32>,
    pub jump_limit: usize,
    pub globals: Option<SharedGlobals>,
    pub diagnostics: Option<Rc<dyn DiagnosticSink>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            text_width: DEFAULT_TEXT_WIDTH,
            random_seed: None,
            jump_limit: JUMP_LOOP_LIMIT,
            globals: None,
            diagnostics: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PersistentCondition {
    target: String,
    condition: String,
}

pub struct Session {
    script_name: String,
    buffer: ScriptBuffer,
    cursor: Pos,
    status: Status,
    display: Vec<u8>,
    actor_name: String,
    actor_captured: bool,
    lines: Vec<TextObject>,

    vars: VarStore,
    globals_shadow: VarTable,
    jump_bases: JumpBases,
    jump_history: Vec<(i64, Pos)>,
    persistent: Vec<PersistentCondition>,
    recurred: BTreeSet<usize>,
    repeat_counts: BTreeMap<usize, i64>,
    else_flags: Vec<bool>,

    choices: Vec<ChoiceObject>,
    accents: Vec<String>,
    accent_index: usize,
    requests: Vec<HostRequest>,

    seed: u32,
    rng_state: u32,
    log: SaveLog,
    text_width: usize,
    jump_limit: usize,
    diagnostics: Rc<dyn DiagnosticSink>,
}

impl Session {
    pub fn new(
        script_name: impl Into<String>,
        source: &[u8],
        options: SessionOptions,
    ) -> Result<Self, DialError> {
        let script_name = script_name.into();
        let diagnostics = options
            .diagnostics
            .unwrap_or_else(|| Rc::new(TracingSink) as Rc<dyn DiagnosticSink>);
        let buffer = ScriptBuffer::load(source, diagnostics.as_ref())?;
        let jump_bases = scan_jump_bases(&buffer, diagnostics.as_ref());
        let seed = options.random_seed.unwrap_or_else(seed_from_clock);
        let globals = options.globals.unwrap_or_else(shared_globals);

        let mut log = SaveLog::new();
        log.push(LogEntry::Script {
            name: script_name.clone(),
        });
        log.push(LogEntry::Seed { seed });

        tracing::info!(
            script = %script_name,
            jump_bases = jump_bases.len(),
            seed,
            "dialogue session created"
        );

        Ok(Self {
            script_name,
            buffer,
            cursor: Pos::default(),
            status: Status::Interpret,
            display: Vec::new(),
            actor_name: String::new(),
            actor_captured: false,
            lines: Vec::new(),
            vars: VarStore::new(globals),
            globals_shadow: VarTable::new(),
            jump_bases,
            jump_history: Vec::new(),
            persistent: Vec::new(),
            recurred: BTreeSet::new(),
            repeat_counts: BTreeMap::new(),
            else_flags: Vec::new(),
            choices: Vec::new(),
            accents: Vec::new(),
            accent_index: 0,
            requests: Vec::new(),
            seed,
            rng_state: seed,
            log,
            text_width: options.text_width,
            jump_limit: options.jump_limit.max(1),
            diagnostics,
        })
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn lines(&self) -> &[TextObject] {
        &self.lines
    }

    pub fn actor_name(&self) -> &str {
        &self.actor_name
    }

    pub fn cursor(&self) -> Pos {
        self.cursor
    }

    pub fn current_location(&self) -> SourceLocation {
        self.buffer.location(self.cursor.offset)
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn log(&self) -> &SaveLog {
        &self.log
    }

    pub fn jump_bases(&self) -> &JumpBases {
        &self.jump_bases
    }

    pub fn set_text_width(&mut self, width: usize) {
        self.text_width = width;
    }

    pub fn locals(&self) -> VarTable {
        self.vars.locals().clone()
    }

    pub fn globals(&self) -> VarTable {
        self.vars.globals_snapshot()
    }

    pub fn variable(&mut self, name: &str) -> Value {
        self.resolve(name)
    }

    pub fn take_requests(&mut self) -> Vec<HostRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn choice_count(&self) -> usize {
        if self.status == Status::WaitForChoice {
            self.choices.len()
        } else {
            0
        }
    }

    pub fn choices(&self) -> &[ChoiceObject] {
        if self.status == Status::WaitForChoice {
            &self.choices
        } else {
            &[]
        }
    }

    pub fn accents(&self) -> &[String] {
        &self.accents
    }

    pub fn current_accent(&self) -> Option<&str> {
        self.accents.get(self.accent_index).map(String::as_str)
    }

    fn pending_choice(&self, index: usize) -> Result<&ChoiceObject, DialError> {
        if self.status != Status::WaitForChoice {
            return Err(DialError::new(
                "ENGINE_NO_PENDING_CHOICE",
                "No pending choice is available.",
            ));
        }
        self.choices.get(index).ok_or_else(|| {
            DialError::new(
                "ENGINE_CHOICE_INDEX",
                format!(
                    "Choice index {} is out of range for {} choices.",
                    index,
                    self.choices.len()
                ),
            )
        })
    }

    pub fn is_choice_valid(&self, index: usize) -> Result<bool, DialError> {
        let choice = self.pending_choice(index)?;
        if choice.kind != TextKind::ChoiceAccented {
            return Ok(true);
        }
        Ok(self
            .current_accent()
            .is_some_and(|accent| choice.accent_variants.contains_key(accent)))
    }

    pub fn has_one_use_choice_recurred(&self, index: usize) -> Result<bool, DialError> {
        let choice = self.pending_choice(index)?;
        Ok(self.recurred.contains(&choice.resume.offset))
    }

    pub fn continue_line(&mut self) -> Result<(), DialError> {
        if self.status != Status::WaitForContinuation {
            return Err(DialError::new(
                "ENGINE_NOT_WAITING",
                format!("Can't continue while the session is {:?}.", self.status),
            ));
        }
        self.log.push(LogEntry::Continue);
        self.status = Status::Interpret;
        Ok(())
    }

    pub fn choose(&mut self, index: usize) -> Result<bool, DialError> {
        let choice = self.pending_choice(index)?.clone();

        if choice.kind == TextKind::ChoiceAccented {
            let Some(accent) = self.current_accent().map(str::to_string) else {
                return Ok(false);
            };
            if !choice.accent_variants.contains_key(&accent) {
                return Ok(false);
            }
            self.vars.set(&accent, Value::Int(1));
            self.log.push(LogEntry::Accent { name: accent });
        }

        self.recurred.insert(choice.resume.offset);
        while self
            .lines
            .last()
            .is_some_and(|line| !matches!(line.kind, TextKind::Normal | TextKind::ChoiceSelected))
        {
            self.lines.pop();
        }
        let text = self.render_text(&choice.display_text);
        self.lines.push(TextObject {
            actor_name: self.actor_name.clone(),
            text,
            kind: TextKind::ChoiceSelected,
        });

        self.cursor = choice.resume;
        self.else_flags.clear();
        self.choices.clear();
        self.accents.clear();
        self.accent_index = 0;
        self.log.push(LogEntry::Choice { index: index + 1 });
        self.status = Status::Interpret;
        tracing::debug!(choice = index + 1, offset = choice.resume.offset, "choice selected");
        Ok(true)
    }

    pub fn shift_accent(&mut self, delta: i32) {
        if self.accents.is_empty() {
            return;
        }
        let len = self.accents.len() as i64;
        let next = (self.accent_index as i64 + i64::from(delta)).rem_euclid(len);
        self.accent_index = next as usize;
        self.refresh_accented_choices();
    }

    pub fn select_accent(&mut self, name: &str) -> Result<(), DialError> {
        let Some(index) = self.accents.iter().position(|accent| accent == name) else {
            return Err(DialError::new(
                "ENGINE_UNKNOWN_ACCENT",
                format!("Accent \"{}\" is not offered by the current choices.", name),
            ));
        };
        self.accent_index = index;
        self.refresh_accented_choices();
        Ok(())
    }

    fn report(&self, severity: Severity, code: &'static str, message: impl Into<String>) {
        self.buffer.report(
            self.diagnostics.as_ref(),
            severity,
            code,
            message,
            self.cursor.offset,
        );
    }

    fn render_text(&self, text: &str) -> String {
        wrap_text(
            &apply_escapes(&normalize_whitespace(text), self.diagnostics.as_ref()),
            self.text_width,
        )
    }

    fn eval(&mut self, segments: &[String]) -> Result<Value, EvalError> {
        evaluate(segments, self)
    }

    fn eval_or_zero(&mut self, segments: &[String]) -> Value {
        match self.eval(segments) {
            Ok(value) => value,
            Err(error) => {
                self.report(Severity::Error, error.code(), error.to_string());
                self.force_else();
                Value::Int(0)
            }
        }
    }

    fn force_else(&mut self) {
        let depth = self.cursor.depth;
        if self.else_flags.len() <= depth {
            self.else_flags.resize(depth + 1, false);
        }
        self.else_flags[depth] = true;
    }

    fn close_scope(&mut self) {
        if self.cursor.depth == 0 {
            self.report(
                Severity::Error,
                "RUNTIME_NEGATIVE_DEPTH",
                "Conditional nesting depth is below zero. There are stray '||' symbols.",
            );
        } else {
            self.cursor.depth -= 1;
        }
    }

    fn repeat_count(&self, offset: usize) -> i64 {
        self.repeat_counts.get(&offset).copied().unwrap_or(0)
    }

    fn record_global_diff(&mut self) {
        let live = self.vars.globals_snapshot();
        let mut changed: Vec<(String, Value)> = live
            .iter()
            .filter(|(name, value)| self.globals_shadow.get(*name) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        changed.extend(
            self.globals_shadow
                .keys()
                .filter(|name| !live.contains_key(*name))
                .map(|name| (name.clone(), Value::Int(0))),
        );
        changed.sort_by(|left, right| left.0.cmp(&right.0));
        for (name, value) in changed {
            self.log.push(LogEntry::Var { name, value });
        }
        self.globals_shadow = live;
    }
}

impl EvalContext for Session {
    fn resolve(&mut self, name: &str) -> Value {
        match ReservedName::parse(name) {
            Some(ReservedName::Repeat) => Value::Int(self.repeat_count(self.cursor.offset)),
            Some(ReservedName::Once) => Value::from(self.repeat_count(self.cursor.offset) == 0),
            Some(ReservedName::True) => Value::Int(1),
            Some(ReservedName::False) => Value::Int(0),
            Some(ReservedName::Random) => Value::Int(roll_percent(&mut self.rng_state)),
            None if name.is_empty() => {
                self.report(
                    Severity::Error,
                    "RUNTIME_EMPTY_NAME",
                    "Could not read a variable as its name is empty.",
                );
                Value::Int(0)
            }
            None => self.vars.get(name).unwrap_or_default(),
        }
    }

    fn warn(&mut self, code: &'static str, message: String) {
        self.report(Severity::Warning, code, message);
    }
}
