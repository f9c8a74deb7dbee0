//! Line framing for the IR firmware protocol.
//!
//! Commands and responses are ASCII lines terminated by a single `\n`.
//! Received lines are trimmed, so a peer that sends `\r\n` still frames
//! correctly, but `\r` alone never ends a frame.

use crate::domain::error::{BridgeError, BridgeResult};
use tracing::warn;

pub const LINE_DELIMITER: u8 = b'\n';
pub const PAYLOAD_PREFIX: &str = "IR_RAW:";
pub const WAITING_LINE: &str = "Waiting for IR signal...";
pub const MAX_FRAME_LEN: usize = 4096;

const RECEIVE_COMMAND: &str = "RECEIVE";
const SEND_PREFIX: &str = "SEND:";

/// Command sent to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Arm the receiver and report the next capture
    Receive,
    /// Replay a previously captured payload
    Send(String),
}

impl Command {
    /// Build a `SEND` command, rejecting payloads that would break framing.
    pub fn send(payload: impl Into<String>) -> BridgeResult<Self> {
        let payload = payload.into();
        if payload.trim().is_empty() {
            return Err(BridgeError::InvalidInput("no signal to send".to_string()));
        }
        if payload.contains(['\n', '\r']) {
            return Err(BridgeError::InvalidInput(
                "payload must not contain line breaks".to_string(),
            ));
        }
        Ok(Command::Send(payload))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Receive => "receive",
            Command::Send(_) => "send",
        }
    }

    /// Wire bytes, delimiter included
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.to_string().into_bytes();
        bytes.push(LINE_DELIMITER);
        bytes
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Receive => write!(f, "{}", RECEIVE_COMMAND),
            Command::Send(payload) => write!(f, "{}{}", SEND_PREFIX, payload),
        }
    }
}

/// Classification of a received line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `IR_RAW:...`, the whole trimmed line
    Payload(String),
    /// Status chatter while the receiver is armed
    Waiting,
    Unrecognized(String),
}

impl Frame {
    pub fn classify(line: &str) -> Self {
        let line = line.trim();
        if line.starts_with(PAYLOAD_PREFIX) {
            Frame::Payload(line.to_string())
        } else if line == WAITING_LINE {
            Frame::Waiting
        } else {
            Frame::Unrecognized(line.to_string())
        }
    }
}

/// Accumulates raw bytes and yields complete lines.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    max_len: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::with_max_len(MAX_FRAME_LEN)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);

        // Only the unterminated tail can grow without bound.
        let tail_start = self
            .buf
            .iter()
            .rposition(|&b| b == LINE_DELIMITER)
            .map_or(0, |pos| pos + 1);
        let tail_len = self.buf.len() - tail_start;
        if tail_len > self.max_len {
            warn!(
                "Discarding {} bytes without a line delimiter (limit {})",
                tail_len, self.max_len
            );
            self.buf.truncate(tail_start);
        }
    }

    /// Next complete line, trimmed. Bytes are decoded only once the whole
    /// line is present so split UTF-8 sequences survive chunking.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|&b| b == LINE_DELIMITER)?;
        let line: Vec<u8> = self.buf.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line[..end]).trim().to_string())
    }

    /// Bytes held that do not yet form a line
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_command_encoding() {
        assert_eq!(Command::Receive.encode(), b"RECEIVE\n".to_vec());
        let send = Command::send("IR_RAW:1,2,3").unwrap();
        assert_eq!(send.encode(), b"SEND:IR_RAW:1,2,3\n".to_vec());
        assert_eq!(send.name(), "send");
    }

    #[test]
    fn test_send_rejects_bad_payloads() {
        assert!(matches!(Command::send(""), Err(BridgeError::InvalidInput(_))));
        assert!(matches!(Command::send("   "), Err(BridgeError::InvalidInput(_))));
        assert!(matches!(
            Command::send("IR_RAW:1\nRECEIVE"),
            Err(BridgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_frame_classification() {
        assert_eq!(
            Frame::classify("  IR_RAW:9000,4500,560 \r"),
            Frame::Payload("IR_RAW:9000,4500,560".to_string())
        );
        assert_eq!(Frame::classify("Waiting for IR signal...\r"), Frame::Waiting);
        assert_eq!(
            Frame::classify("READY"),
            Frame::Unrecognized("READY".to_string())
        );
        // Prefix must start the line
        assert!(matches!(
            Frame::classify("noise IR_RAW:1"),
            Frame::Unrecognized(_)
        ));
    }

    #[test]
    fn test_line_buffer_partial_reads() {
        let mut lines = LineBuffer::new();
        lines.push(b"IR_RA");
        assert_eq!(lines.next_line(), None);
        lines.push(b"W:1,2");
        assert_eq!(lines.next_line(), None);
        lines.push(b",3\r\nWait");
        assert_eq!(lines.next_line(), Some("IR_RAW:1,2,3".to_string()));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.pending(), 4);
    }

    #[test]
    fn test_line_buffer_multiple_lines_in_one_chunk() {
        let mut lines = LineBuffer::new();
        lines.push(b"Waiting for IR signal...\nIR_RAW:5\n");
        assert_eq!(lines.next_line(), Some(WAITING_LINE.to_string()));
        assert_eq!(lines.next_line(), Some("IR_RAW:5".to_string()));
        assert_eq!(lines.next_line(), None);
    }

    #[test]
    fn test_carriage_return_alone_is_not_a_delimiter() {
        let mut lines = LineBuffer::new();
        lines.push(b"IR_RAW:1\r");
        assert_eq!(lines.next_line(), None);
    }

    #[test]
    fn test_line_buffer_overflow_discards_tail() {
        let mut lines = LineBuffer::with_max_len(8);
        lines.push(b"OK\n0123456789");
        assert_eq!(lines.next_line(), Some("OK".to_string()));
        assert_eq!(lines.pending(), 0);

        lines.push(b"IR_RAW:1\n");
        assert_eq!(lines.next_line(), Some("IR_RAW:1".to_string()));
    }

    #[test]
    fn test_split_utf8_sequence() {
        let text = "IR_RAW:é\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut lines = LineBuffer::new();
        lines.push(&text[..split]);
        lines.push(&text[split..]);
        assert_eq!(lines.next_line(), Some("IR_RAW:é".to_string()));
    }

    proptest! {
        #[test]
        fn prop_framing_independent_of_chunking(
            values in proptest::collection::vec(0u32..20_000, 1..40),
            cuts in proptest::collection::vec(1usize..16, 0..30),
        ) {
            let payload = format!(
                "IR_RAW:{}",
                values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
            );
            let stream = format!("{}\r\n{}\r\n", WAITING_LINE, payload).into_bytes();

            let mut lines = LineBuffer::new();
            let mut seen = Vec::new();
            let mut rest: &[u8] = &stream;
            for cut in cuts {
                let n = cut.min(rest.len());
                lines.push(&rest[..n]);
                rest = &rest[n..];
                while let Some(line) = lines.next_line() {
                    seen.push(line);
                }
            }
            lines.push(rest);
            while let Some(line) = lines.next_line() {
                seen.push(line);
            }

            prop_assert_eq!(seen, vec![WAITING_LINE.to_string(), payload]);
        }
    }
}
