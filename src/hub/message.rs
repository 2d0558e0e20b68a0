//! Chat message payloads
//!
//! A message is normalized once when it enters the relay and then shared by
//! every outbound queue it is fanned out to.

use std::fmt;
use std::sync::Arc;

/// Separator between messages coalesced into one text frame
pub const FRAME_DELIMITER: char = '\n';

/// An immutable, normalized chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(Arc<str>);

impl Message {
    /// Normalize raw inbound text: newlines become spaces, then surrounding
    /// whitespace is trimmed. The result never contains `FRAME_DELIMITER`.
    pub fn normalize(raw: &str) -> Self {
        let flattened = raw.replace(FRAME_DELIMITER, " ");
        Self(Arc::from(flattened.trim()))
    }

    /// Normalize a binary payload, if it is valid UTF-8
    pub fn from_utf8(raw: &[u8]) -> Option<Self> {
        std::str::from_utf8(raw).ok().map(Self::normalize)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Join messages into a single newline-delimited frame payload
    pub fn join_frames(messages: &[Message]) -> String {
        let capacity = messages.iter().map(|m| m.len() + 1).sum();
        let mut frame = String::with_capacity(capacity);
        for (i, message) in messages.iter().enumerate() {
            if i > 0 {
                frame.push(FRAME_DELIMITER);
            }
            frame.push_str(message.as_str());
        }
        frame
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
