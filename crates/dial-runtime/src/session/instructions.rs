use super::*;

use crate::expr::{int_pow, split_segments, AssignOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecialCommand {
    Display,
    Save,
    Reset,
    Wait,
}

impl SpecialCommand {
    const ALL: [Self; 4] = [Self::Display, Self::Save, Self::Reset, Self::Wait];

    fn name(self) -> &'static str {
        match self {
            Self::Display => "DISPLAY",
            Self::Save => "SAVE",
            Self::Reset => "RESET",
            Self::Wait => "WAIT",
        }
    }

    fn parse(word: &str) -> Result<Self, &'static str> {
        if let Some(command) = Self::ALL.iter().find(|command| command.name() == word) {
            return Ok(*command);
        }
        let candidates: Vec<Self> = Self::ALL
            .iter()
            .copied()
            .filter(|command| !word.is_empty() && command.name().starts_with(word))
            .collect();
        match candidates.as_slice() {
            [command] => Ok(*command),
            [] => Err("RUNTIME_UNKNOWN_COMMAND"),
            _ => Err("RUNTIME_AMBIGUOUS_COMMAND"),
        }
    }
}

impl Session {
    pub(super) fn run_variable_instruction(&mut self, body: &str) {
        let segments = split_segments(body);
        match segments.as_slice() {
            [] => self.report(
                Severity::Error,
                "RUNTIME_EMPTY_VARIABLE",
                "The variable instruction is empty.",
            ),
            [single] => self.run_variable_shortcut(single),
            [_, _] => self.report(
                Severity::Error,
                "RUNTIME_VARIABLE_SYNTAX",
                format!("The variable instruction is missing a right-hand side: {}", body),
            ),
            [target, op, rest @ ..] => {
                let Some(op) = AssignOp::parse(op) else {
                    self.report(
                        Severity::Error,
                        "RUNTIME_ASSIGN_OPERATOR",
                        format!("Unknown assignment operator '{}'.", op),
                    );
                    return;
                };
                let value = self.eval_or_zero(rest);
                self.assign(target, op, value);
            }
        }
    }

    fn run_variable_shortcut(&mut self, segment: &str) {
        if let Some(name) = segment.strip_suffix("++") {
            self.step_variable(name, 1);
        } else if let Some(name) = segment.strip_suffix("--") {
            self.step_variable(name, -1);
        } else if let Some(name) = segment.strip_prefix('!') {
            self.store(name, Value::Int(0));
        } else {
            self.store(segment, Value::Int(1));
        }
    }

    fn step_variable(&mut self, name: &str, delta: i64) {
        match self.vars.get(name).unwrap_or_default() {
            Value::Int(current) => self.store(name, Value::Int(current.wrapping_add(delta))),
            Value::Text(_) => self.report(
                Severity::Error,
                "RUNTIME_TEXT_ASSIGN",
                format!("Can't increment or decrement the text variable '{}'.", name),
            ),
        }
    }

    fn assign(&mut self, name: &str, op: AssignOp, value: Value) {
        let current = self.vars.get(name).unwrap_or_default();
        let next = match (op, value) {
            (AssignOp::Set, value) => Some(value),
            (AssignOp::Add, Value::Text(rhs)) => Some(match current {
                Value::Text(lhs) => Value::Text(lhs + &rhs),
                Value::Int(_) => Value::Text(rhs),
            }),
            (_, Value::Text(_)) => {
                self.report(
                    Severity::Error,
                    "RUNTIME_TEXT_ASSIGN",
                    format!("Only '=' and '+=' can assign text to '{}'.", name),
                );
                None
            }
            (op, Value::Int(rhs)) => match current {
                Value::Text(lhs) if op == AssignOp::Add => Some(Value::Text(format!("{}{}", lhs, rhs))),
                Value::Text(_) => {
                    self.report(
                        Severity::Error,
                        "RUNTIME_TEXT_ASSIGN",
                        format!("The text variable '{}' only accepts '=' and '+='.", name),
                    );
                    None
                }
                Value::Int(lhs) => self.combine_ints(name, op, lhs, rhs).map(Value::Int),
            },
        };
        if let Some(next) = next {
            self.store(name, next);
        }
    }

    fn combine_ints(&mut self, name: &str, op: AssignOp, lhs: i64, rhs: i64) -> Option<i64> {
        match op {
            AssignOp::Set => Some(rhs),
            AssignOp::Add => Some(lhs.wrapping_add(rhs)),
            AssignOp::Sub => Some(lhs.wrapping_sub(rhs)),
            AssignOp::Mul => Some(lhs.wrapping_mul(rhs)),
            AssignOp::Div | AssignOp::Mod if rhs == 0 => {
                self.report(
                    Severity::Error,
                    "RUNTIME_DIVISION_BY_ZERO",
                    format!("Division by zero while assigning '{}'; the value is unchanged.", name),
                );
                None
            }
            AssignOp::Div => Some(lhs.wrapping_div(rhs)),
            AssignOp::Mod => Some(lhs.wrapping_rem(rhs)),
            AssignOp::Pow => Some(int_pow(rhs, lhs)),
        }
    }

    pub(super) fn store(&mut self, name: &str, value: Value) {
        if name.is_empty() {
            self.report(
                Severity::Error,
                "RUNTIME_EMPTY_NAME",
                "Could not assign a variable as its name is empty.",
            );
        } else if ReservedName::parse(name).is_some() {
            self.report(
                Severity::Error,
                "RUNTIME_RESERVED_ASSIGN",
                format!("'{}' is computed on every read and can't be assigned.", name),
            );
        } else {
            self.vars.set(name, value);
        }
    }

    pub(super) fn run_special_instruction(&mut self, body: &str) {
        let segments = split_segments(body);
        let Some((word, args)) = segments.split_first() else {
            self.report(
                Severity::Error,
                "RUNTIME_UNKNOWN_COMMAND",
                "Unspecified command inside the special instruction.",
            );
            return;
        };
        let command = match SpecialCommand::parse(word) {
            Ok(command) => command,
            Err(code) => {
                self.report(
                    Severity::Error,
                    code,
                    format!("Command '{}' inside the special instruction is not recognized.", word),
                );
                return;
            }
        };

        if matches!(command, SpecialCommand::Display | SpecialCommand::Wait) && args.is_empty() {
            self.report(
                Severity::Error,
                "RUNTIME_MISSING_ARGUMENT",
                format!("Not enough arguments for {}.", command.name()),
            );
            return;
        }

        match command {
            SpecialCommand::Display => {
                let value = self.eval_or_zero(args);
                self.display.extend_from_slice(value.to_string().as_bytes());
            }
            SpecialCommand::Save => self.requests.push(HostRequest::Save),
            SpecialCommand::Reset => self.vars.clear_locals(),
            SpecialCommand::Wait => match args[0].parse::<u32>() {
                Ok(amount) => self.requests.push(HostRequest::Wait(amount)),
                Err(_) => self.report(
                    Severity::Error,
                    "RUNTIME_WAIT_NUMBER",
                    format!("Following number could not be interpreted: {}", args[0]),
                ),
            },
        }
    }

    pub(super) fn run_persistent_instruction(&mut self, body: &str) {
        let (deregister, text) = match body.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, body),
        };
        let parsed = text.find('[').and_then(|open| {
            let rest = &text[open + 1..];
            rest.find(']')
                .map(|close| (rest[..close].trim(), rest[close + 1..].trim()))
        });
        let Some((target, condition)) = parsed.filter(|(_, condition)| !condition.is_empty()) else {
            self.report(
                Severity::Error,
                "RUNTIME_PERSISTENT_SYNTAX",
                format!("Persistent conditional should look like '[target] condition': {}", body),
            );
            return;
        };

        let entry = PersistentCondition {
            target: target.to_string(),
            condition: condition.to_string(),
        };
        if deregister {
            if let Some(index) = self.persistent.iter().position(|active| *active == entry) {
                self.persistent.remove(index);
            }
        } else {
            self.persistent.push(entry);
        }
    }

    pub(super) fn fire_persistent_condition(&mut self) {
        for index in 0..self.persistent.len() {
            let condition = self.persistent[index].condition.clone();
            if self.run_conditional(&condition) {
                let entry = self.persistent.remove(index);
                tracing::debug!(jump = %entry.target, "persistent conditional fired");
                self.run_jump_instruction(&entry.target);
                return;
            }
        }
    }

    pub(super) fn run_jump_instruction(&mut self, body: &str) {
        let body = body.trim();
        let Some(label_text) = body.strip_prefix('~') else {
            let Some((label, base)) = self.jump_base(body) else {
                return;
            };
            self.jump_history.push((label, self.cursor));
            self.cursor = base;
            self.else_flags.clear();
            return;
        };

        let restored = if label_text.trim().is_empty() {
            let last = self.jump_history.last().map(|(_, pos)| *pos);
            if last.is_none() {
                self.report(
                    Severity::Error,
                    "RUNTIME_EMPTY_JUMP_HISTORY",
                    "There is no earlier jump to return from.",
                );
            }
            last
        } else {
            let Some((label, _)) = self.jump_base(label_text) else {
                return;
            };
            let found = self
                .jump_history
                .iter()
                .rev()
                .find(|(from, _)| *from == label)
                .map(|(_, pos)| *pos);
            if found.is_none() {
                self.report(
                    Severity::Error,
                    "RUNTIME_JUMP_HISTORY",
                    format!("Jump base {} was never jumped to, so there is nothing to return to.", label),
                );
            }
            found
        };

        if let Some(pos) = restored {
            self.cursor = pos;
            self.else_flags.clear();
        }
    }

    fn jump_base(&self, text: &str) -> Option<(i64, Pos)> {
        let Ok(label) = text.trim().parse::<i64>() else {
            self.report(
                Severity::Error,
                "RUNTIME_BAD_JUMP_LABEL",
                format!("Following jump point number could not be interpreted: {}", text),
            );
            return None;
        };
        match self.jump_bases.get(&label) {
            Some(base) => Some((label, *base)),
            None => {
                self.report(
                    Severity::Error,
                    "RUNTIME_UNKNOWN_JUMP_BASE",
                    format!("Couldn't perform the jump, there's no jump base with the number {}.", label),
                );
                None
            }
        }
    }

    pub(super) fn run_conditional(&mut self, body: &str) -> bool {
        let depth = self.cursor.depth;
        let mut flags = std::mem::take(&mut self.else_flags);
        let fired = self.evaluate_conditional(body, depth, &mut flags);
        self.else_flags = flags;
        fired
    }

    pub(super) fn evaluate_conditional(
        &mut self,
        body: &str,
        depth: usize,
        flags: &mut Vec<bool>,
    ) -> bool {
        let body = body.strip_prefix('~').unwrap_or(body);
        let mut segments = split_segments(body);
        if flags.len() <= depth {
            flags.resize(depth + 1, false);
        }

        if segments.first().is_some_and(|segment| segment == "ELSE") {
            if !flags[depth] {
                return false;
            }
            segments.remove(0);
        }
        if segments.is_empty() {
            flags[depth] = false;
            return true;
        }

        let fired = match self.eval(&segments) {
            Ok(value) => value.is_truthy(),
            Err(error) => {
                self.report(Severity::Error, error.code(), error.to_string());
                false
            }
        };
        flags[depth] = !fired;
        fired
    }
}
