use crate::source::SourceFile;

use super::{Diagnostic, Severity};

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub color: bool,
}

impl RenderOptions {
    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn colored() -> Self {
        Self { color: true }
    }
}

pub fn render(file: &SourceFile, diagnostic: &Diagnostic, options: RenderOptions) -> String {
    let (line_number, column) = file.location(diagnostic.span.start);
    let line = file.line(line_number);
    let trimmed = line.trim_start();
    let indent = line.chars().count() - trimmed.chars().count();

    format!(
        "{}{}:{}:{}\n{}  {}\n",
        label(diagnostic.severity, options),
        file.name,
        line_number,
        column,
        underline(trimmed, column.saturating_sub(indent), diagnostic.span.len()),
        diagnostic.message
    )
}

fn label(severity: Severity, options: RenderOptions) -> String {
    if !options.color {
        return format!("{}: ", severity);
    }
    let code = match severity {
        Severity::Error => "1;31",
        Severity::Note => "1;34",
        Severity::Warning => "1;33",
    };
    format!("\x1b[{}m{}: \x1b[0m", code, severity)
}

/// The line followed by a caret run starting at the 1-based `column`.
pub fn underline(line: &str, column: usize, width: usize) -> String {
    let mut marker = String::new();
    for _ in 1..column {
        marker.push(' ');
    }
    for _ in 0..width.max(1) {
        marker.push('^');
    }
    format!("{}\n{}", line, marker)
}
