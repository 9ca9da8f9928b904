use std::fmt;

/// Half-open range of character offsets into a single source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A named piece of source text, used to turn spans back into positions.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        for (offset, c) in text.chars().enumerate() {
            if c == '\n' {
                line_starts.push(offset + 1);
            }
        }
        Self {
            name: name.into(),
            text,
            line_starts,
        }
    }

    /// 1-based line and column of a character offset.
    pub fn location(&self, offset: usize) -> (usize, usize) {
        let line_index = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index - 1,
        };
        (line_index + 1, offset - self.line_starts[line_index] + 1)
    }

    /// Text of a 1-based line without its newline; empty when out of range.
    pub fn line(&self, line: usize) -> &str {
        self.text.lines().nth(line.saturating_sub(1)).unwrap_or("")
    }

    pub fn slice(&self, span: Span) -> String {
        self.text
            .chars()
            .skip(span.start)
            .take(span.len())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_are_one_based() {
        let file = SourceFile::new("t.ll", "let a: i64\nlet b: f64\n");
        assert_eq!(file.location(0), (1, 1));
        assert_eq!(file.location(4), (1, 5));
        assert_eq!(file.location(11), (2, 1));
        assert_eq!(file.location(15), (2, 5));
        assert_eq!(file.line(2), "let b: f64");
    }

    #[test]
    fn join_covers_both_spans() {
        let joined = Span::new(4, 6).join(Span::new(1, 3));
        assert_eq!(joined, Span::new(1, 6));
        assert_eq!(joined.len(), 5);
    }

    #[test]
    fn slice_uses_character_offsets() {
        let file = SourceFile::new("t.ll", "x = \"héllo\";");
        assert_eq!(file.slice(Span::new(4, 11)), "\"héllo\"");
    }
}
