use std::cell::RefCell;
use std::fmt;

use crate::types::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            location: None,
        }
    }

    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(location) => write!(
                f,
                "{} (Line:{}, Col:{}) {}",
                self.code, location.line, location.column, self.message
            ),
            None => write!(f, "{} {}", self.code, self.message),
        }
    }
}

pub trait DiagnosticSink {
    fn report(&self, diagnostic: &Diagnostic);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn report(&self, _diagnostic: &Diagnostic) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        let (line, column) = diagnostic
            .location
            .map(|location| (location.line, location.column))
            .unwrap_or((0, 0));
        match diagnostic.severity {
            Severity::Warning => tracing::warn!(
                code = diagnostic.code,
                line,
                column,
                "{}",
                diagnostic.message
            ),
            Severity::Error | Severity::Fatal => tracing::error!(
                code = diagnostic.code,
                line,
                column,
                fatal = diagnostic.severity == Severity::Fatal,
                "{}",
                diagnostic.message
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct CollectingSink {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.diagnostics
            .borrow()
            .iter()
            .map(|diagnostic| diagnostic.code)
            .collect()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.diagnostics
            .borrow()
            .iter()
            .any(|diagnostic| diagnostic.code == code)
    }

    pub fn clear(&self) {
        self.diagnostics.borrow_mut().clear();
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic.clone());
    }
}
