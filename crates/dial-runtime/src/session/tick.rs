use super::*;

use dial_parser::is_whitespace;

impl Session {
    pub fn tick(&mut self) {
        self.record_global_diff();
        match self.status {
            Status::Interpret => self.interpret(),
            Status::Finished => {
                tracing::info!(script = %self.script_name, "dialogue finished");
                self.status = Status::None;
            }
            Status::None
            | Status::WaitForContinuation
            | Status::WaitForChoice
            | Status::FatalError => {}
        }
    }

    fn interpret(&mut self) {
        let sink = Rc::clone(&self.diagnostics);
        let mut skip = 0usize;
        let mut jumps = 0usize;
        self.actor_captured = false;

        self.fire_persistent_condition();

        loop {
            let at = self.cursor.offset;
            if self.buffer.is_file_end(at) {
                if self.display_is_visible() {
                    self.flush_display();
                }
                self.display.clear();
                self.cursor.offset = at.min(self.buffer.len());
                self.status = Status::Finished;
                tracing::debug!(lines = self.lines.len(), "reached file end");
                return;
            }

            match self.buffer.byte(at) {
                b'#' => {
                    let (body, next) = self.buffer.scan_text_until(at, b"#");
                    self.cursor.offset = next;
                    self.run_variable_instruction(&body);
                }
                b'@' => {
                    let (body, next) = self.buffer.scan_text_until(at, b"@");
                    self.cursor.offset = next;
                    self.run_special_instruction(&body);
                }
                b'$' => {
                    let (body, next) = self.buffer.scan_text_until(at, b"$");
                    self.cursor.offset = next;
                    self.run_persistent_instruction(&body);
                }
                b'[' if self.buffer.byte(at + 1) == b'[' => {
                    self.cursor.offset = self.buffer.seek_end_of_statement(at, b']');
                }
                b'[' => {
                    let (body, next) = self.buffer.scan_text_until(at, b"]");
                    self.cursor.offset = next;
                    self.run_jump_instruction(&body);
                    skip = 0;
                    jumps += 1;
                    if jumps >= self.jump_limit {
                        self.report(
                            Severity::Fatal,
                            "RUNTIME_JUMP_LOOP",
                            format!("Infinite jump loop detected at jump point: {}", body),
                        );
                        tracing::error!(script = %self.script_name, jumps, "jump loop limit reached");
                        self.status = Status::FatalError;
                        return;
                    }
                }
                b']' | b'}' => self.cursor.offset += 1,
                b'{' => {
                    if self.enter_choice_range() {
                        return;
                    }
                }
                b'&' => {
                    let (body, next) = self.buffer.scan_text_until(at, b"&");
                    self.cursor.offset = next;
                    if self.buffer.is_conditional_choice(next) {
                        // A guarded choice left over from a range the cursor
                        // resumed into.
                        self.cursor.offset = self.buffer.seek_end_of_choice_range(next, sink.as_ref());
                    } else {
                        let fired = self.run_conditional(&body);
                        *self.repeat_counts.entry(next).or_insert(0) += 1;
                        if fired {
                            self.cursor.depth += 1;
                            if body.starts_with('~') {
                                skip += 1;
                            }
                        } else {
                            self.cursor.offset = self.buffer.seek_end_of_conditional(next, sink.as_ref());
                        }
                    }
                }
                b'|' if self.buffer.byte(at + 1) == b'|' => {
                    self.cursor.offset = at + 2;
                    self.close_scope();
                    if skip > 0 {
                        skip -= 1;
                    } else if self.display_is_visible() {
                        self.flush_display();
                        self.status = Status::WaitForContinuation;
                        return;
                    }
                }
                b'|' => {
                    self.cursor.offset = at + 1;
                    if self.display_is_visible() {
                        self.flush_display();
                        self.status = Status::WaitForContinuation;
                        return;
                    }
                }
                b':' if !self.actor_captured && self.display.last() != Some(&b'\\') => {
                    self.actor_captured = true;
                    let raw = String::from_utf8_lossy(&self.display);
                    self.actor_name = normalize_whitespace(&raw).trim_end().to_string();
                    self.display.clear();
                    self.cursor.offset += 1;
                }
                byte => {
                    self.display.push(byte);
                    self.cursor.offset += 1;
                }
            }
        }
    }

    fn display_is_visible(&self) -> bool {
        self.display.iter().any(|byte| !is_whitespace(*byte))
    }

    fn flush_display(&mut self) {
        let raw = String::from_utf8_lossy(&self.display).into_owned();
        let text = self.render_text(&raw);
        self.lines.push(TextObject {
            actor_name: self.actor_name.clone(),
            text,
            kind: TextKind::Normal,
        });
        self.display.clear();
        self.actor_captured = false;
    }
}
