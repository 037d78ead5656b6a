//! Ring of the most recent command lines, shown on the diagnostics page
use heapless::Vec;

/// Replaces the password of join commands in the history
pub const REDACTION_MARKER: &[u8] = b"*\"";

/// Fixed depth circular log of command lines
///
/// DEPTH: Number of retained lines
/// WIDTH: Max. stored bytes per line, longer lines get truncated
pub struct History<const DEPTH: usize, const WIDTH: usize> {
    entries: [Vec<u8, WIDTH>; DEPTH],

    /// Index of the most recent entry
    head: usize,

    /// Number of recorded entries, max. DEPTH
    len: usize,
}

impl<const DEPTH: usize, const WIDTH: usize> History<DEPTH, WIDTH> {
    pub fn new() -> Self {
        Self {
            entries: core::array::from_fn(|_| Vec::new()),
            head: DEPTH - 1,
            len: 0,
        }
    }

    /// Records a line, overwriting the oldest entry once full
    pub fn push(&mut self, line: &[u8]) {
        self.head = (self.head + 1) % DEPTH;
        self.len = (self.len + 1).min(DEPTH);

        let entry = &mut self.entries[self.head];
        entry.clear();

        let length = line.len().min(WIDTH);
        // Can not fail, as length is capped to capacity
        let _ = entry.extend_from_slice(&line[..length]);
    }

    /// Cuts the most recent entry at the given offset and appends the redaction marker
    pub fn redact_latest(&mut self, offset: usize) {
        if self.len == 0 {
            return;
        }

        let entry = &mut self.entries[self.head];
        entry.truncate(offset);

        for byte in REDACTION_MARKER {
            if entry.push(*byte).is_err() {
                break;
            }
        }
    }

    /// Returns the most recent entry
    pub fn latest(&self) -> Option<&[u8]> {
        if self.len == 0 {
            return None;
        }

        Some(&self.entries[self.head])
    }

    /// Number of recorded entries
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates the recorded entries from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let oldest = (self.head + DEPTH + 1 - self.len) % DEPTH;
        (0..self.len).map(move |index| self.entries[(oldest + index) % DEPTH].as_slice())
    }
}

impl<const DEPTH: usize, const WIDTH: usize> Default for History<DEPTH, WIDTH> {
    fn default() -> Self {
        Self::new()
    }
}
