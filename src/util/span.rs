//! Source location tracking

use std::fmt;

/// Source position (line, column, and byte offset)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed, in chars)
    pub column: usize,
    /// Byte offset from start of the source
    pub offset: usize,
}

impl Position {
    #[inline]
    pub fn new(
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            line,
            column,
            offset: 0,
        }
    }

    #[inline]
    pub fn with_offset(
        line: usize,
        column: usize,
        offset: usize,
    ) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    /// Position of byte `offset` within `source`
    ///
    /// Offsets past the end clamp to the end of the source.
    pub fn locate(
        source: &str,
        offset: usize,
    ) -> Self {
        let offset = offset.min(source.len());
        let mut position = Self::with_offset(1, 1, 0);
        for (at, ch) in source.char_indices() {
            if at >= offset {
                break;
            }
            if ch == '\n' {
                position.line += 1;
                position.column = 1;
            } else {
                position.column += 1;
            }
        }
        position.offset = offset;
        position
    }
}

impl fmt::Display for Position {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
