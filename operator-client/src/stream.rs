//! Line decoder for `data:`-prefixed streaming responses
//!
//! Chunk boundaries from the transport have nothing to do with line
//! boundaries, so bytes are buffered until a newline arrives. Only complete
//! lines are parsed; the trailing fragment stays in the buffer and is
//! retried with the next chunk.

use operator_core::ChatPayload;
use tracing::{debug, warn};

/// Prefix marking an event line
pub const EVENT_PREFIX: &str = "data:";

/// Longest event line kept; longer lines are dropped
pub const MAX_LINE_LEN: usize = 1 << 20;

/// Incremental decoder from raw byte chunks to chat payloads
#[derive(Debug)]
pub struct EventLineDecoder {
    /// Unterminated tail; never contains a newline between pushes
    buffer: Vec<u8>,
    max_line_len: usize,
    /// Skipping the rest of an oversized line
    discarding: bool,
}

impl Default for EventLineDecoder {
    fn default() -> Self {
        Self::with_max_line_len(MAX_LINE_LEN)
    }
}

impl EventLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_len,
            discarding: false,
        }
    }

    /// Feed one chunk and return payloads from every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ChatPayload> {
        // Only the new bytes can hold a newline
        let mut search_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = self.buffer[search_from..].iter().position(|&b| b == b'\n') {
            let end = search_from + pos;
            if self.discarding {
                self.discarding = false;
            } else if end - consumed > self.max_line_len {
                warn!("[Chat] Dropping event line of {} bytes", end - consumed);
            } else if let Some(payload) = parse_line(&self.buffer[consumed..end]) {
                payloads.push(payload);
            }
            consumed = end + 1;
            search_from = consumed;
        }
        self.buffer.drain(..consumed);

        if self.buffer.len() > self.max_line_len {
            if !self.discarding {
                warn!("[Chat] Dropping event line over {} bytes", self.max_line_len);
            }
            self.buffer.clear();
            self.discarding = true;
        }

        payloads
    }

    /// Flush a final unterminated line at end of stream
    pub fn finish(&mut self) -> Option<ChatPayload> {
        let rest = std::mem::take(&mut self.buffer);
        if std::mem::take(&mut self.discarding) {
            return None;
        }
        parse_line(&rest)
    }

    /// Bytes held back waiting for a line terminator
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn parse_line(line: &[u8]) -> Option<ChatPayload> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.is_empty() {
        return None;
    }

    let line = match std::str::from_utf8(line) {
        Ok(line) => line,
        Err(_) => {
            debug!("[Chat] Skipping non-UTF-8 line");
            return None;
        }
    };

    let data = line.strip_prefix(EVENT_PREFIX)?;
    let data = data.strip_prefix(' ').unwrap_or(data);

    match serde_json::from_str::<ChatPayload>(data) {
        Ok(payload) => Some(payload),
        Err(e) => {
            debug!("[Chat] Skipping unparseable payload ({}): {}", e, data);
            None
        }
    }
}
