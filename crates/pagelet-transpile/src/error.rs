//! Transpile errors.

/// Errors that can occur while transpiling component source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranspileError {
    /// The source does not parse.
    #[error("SyntaxError: {message} ({line}:{column})")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    /// The source parses, but uses a construct the sandbox cannot evaluate.
    #[error("SyntaxError: {construct} is not supported ({line}:{column})")]
    Unsupported {
        construct: String,
        line: usize,
        column: usize,
    },
}

impl TranspileError {
    /// 1-based line and column of the offending construct.
    pub fn position(&self) -> (usize, usize) {
        match self {
            Self::Syntax { line, column, .. } | Self::Unsupported { line, column, .. } => {
                (*line, *column)
            }
        }
    }
}

/// 1-based line/column for a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub(crate) fn of(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        // Snap to a char boundary
        let offset = (0..=offset)
            .rev()
            .find(|&i| source.is_char_boundary(i))
            .unwrap_or(0);
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        Self { line, column }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_counts_lines_and_chars() {
        let source = "const a = 1;\nreturn é + b;";
        assert_eq!(Position::of(source, 0), Position { line: 1, column: 1 });
        let b = source.find('b').unwrap();
        assert_eq!(Position::of(source, b), Position { line: 2, column: 12 });
    }

    #[test]
    fn display_includes_position() {
        let err = TranspileError::Unsupported {
            construct: "class".to_string(),
            line: 3,
            column: 5,
        };
        assert_eq!(err.to_string(), "SyntaxError: class is not supported (3:5)");
        assert_eq!(err.position(), (3, 5));
    }
}
