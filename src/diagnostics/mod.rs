pub mod pretty;

use std::fmt;

use crate::source::{SourceFile, Span};

pub use pretty::RenderOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub span: Span,
    pub severity: Severity,
    pub message: String,
}

/// Append-only message sink shared by every pass of one compilation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    messages: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, span: Span, severity: Severity, message: impl Into<String>) {
        self.messages.push(Diagnostic {
            span,
            severity,
            message: message.into(),
        });
    }

    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        self.report(span, Severity::Error, message);
    }

    pub fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.report(span, Severity::Warning, message);
    }

    pub fn note(&mut self, span: Span, message: impl Into<String>) {
        self.report(span, Severity::Note, message);
    }

    pub fn has_errors(&self) -> bool {
        self.messages
            .iter()
            .any(|message| message.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.severity == Severity::Error)
            .count()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn render(&self, file: &SourceFile, options: RenderOptions) -> String {
        self.messages
            .iter()
            .map(|message| pretty::render(file, message, options))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_do_not_count_as_errors() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.note(Span::new(0, 1), "did you mean to use '->'?");
        diagnostics.warning(Span::new(0, 1), "unused");
        assert!(!diagnostics.has_errors());

        diagnostics.error(Span::new(2, 3), "variable name not in scope");
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(diagnostics.len(), 3);
    }
}
