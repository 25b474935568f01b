//! Line parser for Codex stdout.
//!
//! The CLI may print partial or non-JSON lines (banners, warnings). Those are
//! dropped here and never surface as errors.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use crate::cli::CodexEvent;

/// Parse a single line of experimental JSON output.
///
/// Returns `None` for blank, malformed or non-object lines.
#[must_use]
pub fn parse_line(line: &str) -> Option<CodexEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<CodexEvent>(trimmed) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!(error = %e, line = trimmed, "Skipping unparseable line");
            None
        }
    }
}

/// Reads events from a line-oriented stream, skipping lines that do not parse.
pub struct EventReader<R> {
    lines: Lines<BufReader<R>>,
    skipped: usize,
}

impl<R: AsyncRead + Unpin> EventReader<R> {
    /// Wrap a reader, usually the child's stdout.
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            skipped: 0,
        }
    }

    /// Next parsed event, or `None` at end of stream.
    ///
    /// Cancel-safe: a line is only consumed once it has been handled.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the underlying stream fails.
    pub async fn next_event(&mut self) -> std::io::Result<Option<CodexEvent>> {
        while let Some(line) = self.lines.next_line().await? {
            if let Some(event) = parse_line(&line) {
                return Ok(Some(event));
            }
            if !line.trim().is_empty() {
                self.skipped += 1;
            }
        }
        Ok(None)
    }

    /// Number of non-blank lines dropped so far.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}
