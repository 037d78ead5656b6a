//! # Send mode
//!
//! After `AT+CIPSEND=<link_id>,<length>` was accepted, the next `length` serial bytes are payload
//! instead of command lines. Line terminators are payload as well.
use heapless::Vec;

/// Requested payload length is zero or exceeds the buffer size
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SendError;

/// Collects exactly the requested number of bytes for a single link
///
/// SIZE: Max. payload length of a single transmission
pub struct SendMode<const SIZE: usize> {
    /// Target link, None if send mode is idle
    target: Option<usize>,

    /// Requested payload length
    requested: usize,

    /// Collected payload
    buffer: Vec<u8, SIZE>,
}

impl<const SIZE: usize> SendMode<SIZE> {
    pub fn new() -> Self {
        Self {
            target: None,
            requested: 0,
            buffer: Vec::new(),
        }
    }

    /// Starts collecting `length` bytes for the given link
    pub fn arm(&mut self, link_id: usize, length: usize) -> Result<(), SendError> {
        if length == 0 || length > SIZE {
            return Err(SendError);
        }

        self.buffer.clear();
        self.requested = length;
        self.target = Some(link_id);
        Ok(())
    }

    /// True if serial input is currently collected as payload
    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    /// Link receiving the payload
    pub fn target(&self) -> Option<usize> {
        self.target
    }

    /// Number of bytes still missing
    pub fn remaining(&self) -> usize {
        self.requested - self.buffer.len()
    }

    /// Appends a single byte. Returns the target link once the payload is complete.
    /// The payload stays available by [SendMode::payload] until [SendMode::reset] is called.
    pub fn push(&mut self, byte: u8) -> Option<usize> {
        let target = self.target?;

        if self.remaining() == 0 {
            return Some(target);
        }

        // Can not fail, as requested length is limited to buffer size
        let _ = self.buffer.push(byte);

        if self.remaining() == 0 {
            return Some(target);
        }

        None
    }

    /// Collected payload
    pub fn payload(&self) -> &[u8] {
        &self.buffer
    }

    /// Discards the transmission if it targets the given link. Returns true if a transmission was aborted.
    pub fn abort_for(&mut self, link_id: usize) -> bool {
        if self.target != Some(link_id) {
            return false;
        }

        self.reset();
        true
    }

    /// Returns to idle, discarding any collected bytes
    pub fn reset(&mut self) {
        self.target = None;
        self.requested = 0;
        self.buffer.clear();
    }
}

impl<const SIZE: usize> Default for SendMode<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}
