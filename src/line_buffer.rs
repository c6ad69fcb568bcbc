//! Incremental line decoding over arbitrarily split text fragments.
//!
//! Model servers deliver output in fragments that ignore line boundaries. The
//! [`LineBuffer`] accumulates fragments and hands out each complete line exactly
//! once. It is a plain value: every operation consumes the buffer and returns
//! the next state, so a caller that fails halfway through processing a batch
//! still holds the state it started from.

/// Accumulated-but-unprocessed text plus the number of lines already emitted.
///
/// Only the text after the last consumed newline is kept, so the buffer never
/// grows beyond one partial line between drains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer {
    pending: String,
    processed_lines: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Empty fragments are fine.
    pub fn add_fragment(mut self, fragment: &str) -> Self {
        self.pending.push_str(fragment);
        self
    }

    /// Take every newline-terminated line not emitted before.
    ///
    /// Empty lines are counted but not returned, and a trailing `\r` is
    /// stripped. Calling this again without adding text returns nothing.
    pub fn drain_complete_lines(mut self) -> (Self, Vec<String>) {
        let Some(last_newline) = self.pending.rfind('\n') else {
            return (self, Vec::new());
        };

        let remainder = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, remainder);

        let mut lines = Vec::new();
        for line in complete[..last_newline].split('\n') {
            self.processed_lines += 1;
            let line = line.strip_suffix('\r').unwrap_or(line);
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        (self, lines)
    }

    /// Drain and run a fallible transform over the drained lines.
    ///
    /// On failure the caller keeps `self`, the state from before the drain.
    pub fn try_drain_with<U, E, F>(&self, transform: F) -> Result<(Self, U), E>
    where
        F: FnOnce(Vec<String>) -> Result<U, E>,
    {
        let (next, lines) = self.clone().drain_complete_lines();
        let output = transform(lines)?;
        Ok((next, output))
    }

    /// The unterminated tail once no more fragments will arrive.
    pub fn finish(self) -> Option<String> {
        let tail = self.pending.strip_suffix('\r').unwrap_or(&self.pending);
        if tail.is_empty() {
            None
        } else {
            Some(tail.to_string())
        }
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Complete lines seen so far, empty ones included.
    pub fn processed_lines(&self) -> usize {
        self.processed_lines
    }
}
