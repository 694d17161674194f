//! Byte-offset to line/column mapping.
//!
//! Built once per input; lookups are binary searches over the recorded
//! line-start offsets. Columns are 1-based byte columns.

use bagql_ast::SourceLocation;
use memchr::memchr_iter;

/// Maps byte offsets in one source text to [`SourceLocation`]s.
#[derive(Debug, Clone)]
pub struct PositionMap {
    /// Byte offset of the first character of each line. `line_starts[0] == 0`.
    line_starts: Vec<usize>,
}

impl PositionMap {
    /// Scan the source for line boundaries.
    #[must_use]
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(memchr_iter(b'\n', source.as_bytes()).map(|i| i + 1));
        Self { line_starts }
    }

    /// The location of the given byte offset.
    ///
    /// Offsets past the end of input map to one past the last column,
    /// which is where end-of-input errors point.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn lookup(&self, offset: usize) -> SourceLocation {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        SourceLocation::new(
            (line_idx + 1) as u32,
            (offset - self.line_starts[line_idx] + 1) as u32,
        )
    }
}
