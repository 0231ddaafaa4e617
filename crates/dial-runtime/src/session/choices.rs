use super::*;

impl Session {
    pub(super) fn enter_choice_range(&mut self) -> bool {
        let sink = Rc::clone(&self.diagnostics);
        let start = self.cursor.offset + 1;
        let inner = self.buffer.seek_until(start, b"{}&");
        if self.buffer.byte(inner) == b'}' {
            self.cursor.offset = self.buffer.seek_end_of_choice_range(inner + 1, sink.as_ref());
            return false;
        }

        self.cursor.offset = inner;
        self.choices.clear();
        loop {
            let at = self.buffer.seek_until(self.cursor.offset, b"{}&|");
            self.cursor.offset = at;
            if self.buffer.is_file_end(at) {
                self.report(
                    Severity::Error,
                    "RUNTIME_UNCLOSED_CHOICE_RANGE",
                    "The choice range reached the end of the script without its closing '}'.",
                );
                self.cursor.offset = at.min(self.buffer.len());
                return false;
            }

            match self.buffer.byte(at) {
                b'{' => {
                    let inner = self.buffer.seek_until(at + 1, b"{}");
                    match self.buffer.byte(inner) {
                        b'{' => {
                            self.cursor.offset =
                                self.buffer.seek_end_of_choice_range(inner, sink.as_ref());
                        }
                        b'}' => self.collect_choice(at),
                        _ => self.cursor.offset = inner,
                    }
                }
                b'}' => {
                    if self.choices.is_empty() {
                        self.cursor.offset = at + 1;
                        return false;
                    }
                    self.post_process_choices();
                    self.render_choices();
                    self.status = Status::WaitForChoice;
                    tracing::debug!(choices = self.choices.len(), "waiting for a choice");
                    return true;
                }
                b'&' => self.enter_choice_conditionals(at),
                b'|' if self.buffer.byte(at + 1) == b'|' => {
                    self.cursor.offset = at + 2;
                    self.close_scope();
                }
                _ => self.cursor.offset = at + 1,
            }
        }
    }

    fn collect_choice(&mut self, at: usize) {
        let (body, resume) = self.buffer.scan_text_until(at, b"}");
        self.cursor.offset = resume;
        if body.starts_with('~') && self.recurred.contains(&resume) {
            return;
        }
        self.choices.push(ChoiceObject {
            instruction_text: body,
            display_text: String::new(),
            kind: TextKind::ChoiceNormal,
            accent_variants: BTreeMap::new(),
            resume: Pos::new(resume, self.cursor.depth),
        });
    }

    fn enter_choice_conditionals(&mut self, at: usize) {
        let sink = Rc::clone(&self.diagnostics);
        if !self.buffer.is_conditional_choice(at) {
            let end = self.buffer.seek_end_of_statement(at, b'&');
            self.cursor.offset = self.buffer.seek_end_of_conditional(end, sink.as_ref());
            return;
        }

        loop {
            let (body, next) = self.buffer.scan_text_until(self.cursor.offset, b"&");
            self.cursor.offset = next;
            let fired = self.run_conditional(&body);
            *self.repeat_counts.entry(next).or_insert(0) += 1;
            if !fired {
                self.cursor.offset = self.buffer.seek_end_of_conditional(next, sink.as_ref());
                return;
            }
            self.cursor.depth += 1;
            self.cursor.offset = self.buffer.skip_whitespace(self.cursor.offset);
            if self.buffer.byte(self.cursor.offset) != b'&' {
                return;
            }
        }
    }

    fn post_process_choices(&mut self) {
        let mut choices = std::mem::take(&mut self.choices);
        for choice in &mut choices {
            let body = choice
                .instruction_text
                .strip_prefix('~')
                .unwrap_or(&choice.instruction_text);
            let text = normalize_whitespace(&self.resolve_inline_conditionals(body));
            match text.strip_prefix('|') {
                Some(accented) => {
                    choice.kind = TextKind::ChoiceAccented;
                    choice.accent_variants = self.parse_accent_variants(accented);
                    choice.display_text = String::new();
                }
                None => {
                    choice.kind = TextKind::ChoiceNormal;
                    choice.display_text = text;
                }
            }
        }

        let accents: BTreeSet<String> = choices
            .iter()
            .flat_map(|choice| choice.accent_variants.keys().cloned())
            .collect();
        self.accents = accents.into_iter().collect();
        self.accent_index = 0;
        self.choices = choices;
    }

    fn resolve_inline_conditionals(&mut self, body: &str) -> String {
        if !body.contains('&') {
            return body.to_string();
        }
        let sink = Rc::clone(&self.diagnostics);
        let fragment = ScriptBuffer::fragment(body);
        let mut flags = Vec::new();
        let mut depth = 0usize;
        let mut kept = Vec::with_capacity(body.len());
        let mut at = 0usize;

        while at < fragment.file_end() {
            match fragment.byte(at) {
                b'&' => {
                    let (condition, next) = fragment.scan_text_until(at, b"&");
                    at = next;
                    if fragment.is_conditional_choice(at) {
                        at = fragment.seek_end_of_choice_range(at, sink.as_ref());
                    } else if self.evaluate_conditional(&condition, depth, &mut flags) {
                        depth += 1;
                    } else {
                        at = fragment.seek_end_of_conditional(at, sink.as_ref());
                    }
                }
                b'|' if fragment.byte(at + 1) == b'|' => {
                    at += 2;
                    depth = depth.saturating_sub(1);
                }
                byte => {
                    kept.push(byte);
                    at += 1;
                }
            }
        }
        String::from_utf8_lossy(&kept).into_owned()
    }

    fn parse_accent_variants(&mut self, text: &str) -> BTreeMap<String, String> {
        let mut variants = BTreeMap::new();
        let mut rest = text;
        while !rest.is_empty() {
            let Some(name_end) = rest.find([' ', ':']) else {
                self.report(
                    Severity::Error,
                    "RUNTIME_ACCENT_TEXT",
                    "The accented choice option doesn't have its text; it might be missing a space after the accent's name.",
                );
                break;
            };
            let name = &rest[..name_end];
            let after = rest[name_end..].trim_start_matches([' ', ':']);
            let (variant, next) = match after.find('|') {
                Some(bar) => (&after[..bar], &after[bar + 1..]),
                None => (after, ""),
            };
            if name.is_empty() || name.starts_with(char::is_uppercase) {
                self.report(
                    Severity::Error,
                    "RUNTIME_ACCENT_NAME",
                    format!("Accent name '{}' must start with a lowercase letter.", name),
                );
                break;
            }
            self.vars.set(name, Value::Int(0));
            variants.insert(name.to_string(), variant.trim_end().to_string());
            rest = next;
        }
        variants
    }

    fn render_choices(&mut self) {
        let rendered: Vec<TextObject> = self
            .choices
            .iter()
            .enumerate()
            .map(|(index, choice)| TextObject {
                actor_name: self.actor_name.clone(),
                text: numbered(index, &self.render_text(&choice.display_text)),
                kind: choice.kind,
            })
            .collect();
        self.lines.extend(rendered);
        self.refresh_accented_choices();
    }

    pub(super) fn refresh_accented_choices(&mut self) {
        let accent = self.current_accent().map(str::to_string);
        let first_line = self.lines.len().saturating_sub(self.choices.len());
        for index in 0..self.choices.len() {
            if self.choices[index].kind != TextKind::ChoiceAccented {
                continue;
            }
            let variant = accent
                .as_ref()
                .and_then(|accent| self.choices[index].accent_variants.get(accent))
                .cloned();
            let text = match variant {
                Some(variant) => {
                    let text = self.render_text(&variant);
                    self.choices[index].display_text = variant;
                    text
                }
                None => UNAVAILABLE_ACCENT_TEXT.to_string(),
            };
            if let Some(line) = self.lines.get_mut(first_line + index) {
                line.text = numbered(index, &text);
            }
        }
    }
}

fn numbered(index: usize, text: &str) -> String {
    format!("{{{}}} {}", index + 1, text)
}
