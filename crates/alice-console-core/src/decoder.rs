//! Newline-delimited JSON frame decoder for the chat stream.
//!
//! The server writes one JSON event per `\n`-terminated line, but the network
//! delivers arbitrary chunks: a record may be split across chunks and one
//! chunk may hold several records. Bytes are buffered until a full line is
//! assembled, so multi-byte UTF-8 sequences split across chunks are decoded
//! intact.

use bytes::BytesMut;

use crate::diagnostics::Diagnostics;
use crate::types::ServerEvent;

/// Incremental decoder turning byte chunks into [`ServerEvent`]s.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    /// Leading bytes of `buf` already known to hold no line terminator.
    scanned: usize,
    diagnostics: Diagnostics,
    finished: bool,
}

impl FrameDecoder {
    /// Create a decoder reporting malformed lines to `diagnostics`.
    #[must_use]
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            buf: BytesMut::new(),
            scanned: 0,
            diagnostics,
            finished: false,
        }
    }

    /// Feed one chunk and return every event completed by it, in order.
    ///
    /// A trailing partial line stays buffered until a later chunk (or
    /// [`finish`](Self::finish)) completes it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ServerEvent> {
        if self.finished {
            tracing::warn!(len = chunk.len(), "Chunk fed after end of stream, ignoring");
            return Vec::new();
        }

        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + pos;
            let line = self.buf.split_to(end + 1);
            self.scanned = 0;
            if let Some(event) = self.decode_line(&line[..end]) {
                events.push(event);
            }
        }
        self.scanned = self.buf.len();
        events
    }

    /// Signal end of stream and decode whatever remains buffered.
    ///
    /// End of stream terminates an unterminated last line. After this call
    /// the decoder produces no further events.
    pub fn finish(&mut self) -> Option<ServerEvent> {
        if self.finished {
            return None;
        }
        self.finished = true;
        self.scanned = 0;
        let rest = self.buf.split();
        self.decode_line(&rest)
    }

    /// Number of bytes waiting for a line terminator.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn decode_line(&self, raw: &[u8]) -> Option<ServerEvent> {
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text,
            Err(e) => {
                let lossy = String::from_utf8_lossy(raw);
                tracing::warn!(error = %e, "Dropping non UTF-8 frame");
                self.diagnostics.malformed_frame(&lossy, e);
                return None;
            }
        };

        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(error = %e, line = %text, "Failed to parse stream frame");
                self.diagnostics.malformed_frame(text, e);
                None
            }
        }
    }
}
